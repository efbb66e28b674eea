/*!

  Core scalar types shared by the library, the netlist graph, and the
  command layer.

*/

use serde::{Deserialize, Serialize};

/// A process-unique id shared between nets and modules, allocated by a
/// monotonically increasing counter.
pub type Id = u64;

/// The classification of a net, used to decide which ports it may legally
/// connect to.
///
/// The discriminants fix the ordinal used by [`crate::netlist::json`] so
/// that a round-tripped netlist is byte-identical regardless of variant
/// declaration order in future revisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum NetType {
    /// An external clock input, driven by the enclosing world.
    ExtClk = 0,
    /// An internal clock net, downstream of a `EXT_CLK -> CLK` buffer.
    Clk = 1,
    /// An external input, driven by the enclosing world.
    ExtIn = 2,
    /// An external output, exposed to the enclosing world.
    ExtOut = 3,
    /// An internal combinational/sequential logic net.
    Logic = 4,
}

impl NetType {
    /// All variants, in ordinal order.
    pub const ALL: [NetType; 5] = [
        NetType::ExtClk,
        NetType::Clk,
        NetType::ExtIn,
        NetType::ExtOut,
        NetType::Logic,
    ];

    /// The ordinal used for JSON (de)serialization.
    pub fn ordinal(self) -> u8 {
        self as u8
    }

    /// Recovers a [`NetType`] from its ordinal, as written by [`NetType::ordinal`].
    pub fn from_ordinal(v: u8) -> Option<Self> {
        match v {
            0 => Some(NetType::ExtClk),
            1 => Some(NetType::Clk),
            2 => Some(NetType::ExtIn),
            3 => Some(NetType::ExtOut),
            4 => Some(NetType::Logic),
            _ => None,
        }
    }

    /// Parses the string spelling used by the cell-library file. `reset`,
    /// `set`, and `enable` are all treated as `LOGIC`.
    pub fn from_library_str(s: &str) -> Option<Self> {
        match s {
            "clk" => Some(NetType::Clk),
            "ext_clk" => Some(NetType::ExtClk),
            "ext_in" => Some(NetType::ExtIn),
            "ext_out" => Some(NetType::ExtOut),
            "logic" | "reset" | "set" | "enable" => Some(NetType::Logic),
            _ => None,
        }
    }
}

impl Serialize for NetType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u8(self.ordinal())
    }
}

impl<'de> Deserialize<'de> for NetType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let v = u8::deserialize(deserializer)?;
        NetType::from_ordinal(v)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid NetType ordinal: {v}")))
    }
}

/// The direction of a port on a [`crate::library::ModuleSpec`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortDir {
    /// A consumer of a net.
    Input,
    /// A producer of a net.
    Output,
}

impl PortDir {
    /// Returns `true` for [`PortDir::Input`].
    pub fn is_input(self) -> bool {
        matches!(self, PortDir::Input)
    }

    /// Returns `true` for [`PortDir::Output`].
    pub fn is_output(self) -> bool {
        matches!(self, PortDir::Output)
    }
}

/// One bit of one port: the unit of connection in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortBit {
    /// The id of the module owning the port.
    pub module: Id,
    /// The port's name within that module.
    pub port_index: PortIndex,
    /// The bit offset within the (possibly multi-bit) port.
    pub bit: usize,
}

/// Identifies a port within its owning [`crate::netlist::graph::Module`] by
/// direction and position, avoiding a string lookup on every connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortIndex {
    /// The `n`th input port, in declaration order.
    Input(usize),
    /// The `n`th output port, in declaration order.
    Output(usize),
}

impl PortBit {
    /// Creates a new port-bit reference.
    pub fn new(module: Id, port_index: PortIndex, bit: usize) -> Self {
        Self {
            module,
            port_index,
            bit,
        }
    }
}
