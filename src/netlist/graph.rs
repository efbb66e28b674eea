/*!

  The netlist graph: nets, multi-bit ports, module instances, and the
  arena that owns them.

  Memory model: the source this crate is descended from links `Net` and
  `Port` records together with raw pointers (driver/sinks point at ports,
  ports point at nets, modules own ports). That graph of interior
  references does not translate to safe Rust, so here the `Netlist` owns
  dense maps of `Net` and `Module` records keyed by a stable [`Id`], and
  every cross-reference ([`PortBit`]) is an integer handle rather than a
  pointer. `remove_*` operations become plain `HashMap::remove` plus
  fix-up of the handles that pointed at the removed id.

*/

use std::collections::{BTreeMap, HashMap};

use bitvec::vec::BitVec;
use rand::Rng;

use crate::error::{Error, Result};
use crate::library::{CellLibrary, ModuleSpec};
use crate::types::{Id, NetType, PortBit, PortIndex};

/// A wire: zero or one driver, any number of sinks, all of the same
/// [`NetType`].
#[derive(Debug, Clone)]
pub struct Net {
    pub(crate) id: Id,
    pub(crate) name: Option<String>,
    pub(crate) net_type: NetType,
    pub(crate) driver: Option<PortBit>,
    pub(crate) sinks: Vec<PortBit>,
}

impl Net {
    /// The net's id.
    pub fn id(&self) -> Id {
        self.id
    }

    /// The net's explicit name, if any. A net without one is labelled
    /// `_<id>_` at emission time.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The net's type.
    pub fn net_type(&self) -> NetType {
        self.net_type
    }

    /// The port-bit driving this net, if any.
    pub fn driver(&self) -> Option<PortBit> {
        self.driver
    }

    /// The port-bits consuming this net.
    pub fn sinks(&self) -> &[PortBit] {
        &self.sinks
    }

    /// `true` if the net has no driver.
    pub fn is_undriven(&self) -> bool {
        self.driver.is_none()
    }
}

/// One instance of a [`crate::library::PortSpec`] on a [`Module`]: a
/// multi-bit pin, each bit bound (or not) to a [`Net`].
#[derive(Debug, Clone)]
pub struct Port {
    pub(crate) width: usize,
    pub(crate) net_type: NetType,
    pub(crate) nets: Vec<Option<Id>>,
}

impl Port {
    /// The port's bit-width.
    pub fn width(&self) -> usize {
        self.width
    }

    /// The port's net type.
    pub fn net_type(&self) -> NetType {
        self.net_type
    }

    /// The net bound to bit `bit`, if any.
    pub fn net_at(&self, bit: usize) -> Option<Id> {
        self.nets[bit]
    }
}

/// One instance of a [`ModuleSpec`], with owned ports and randomly-drawn
/// parameter values.
#[derive(Debug, Clone)]
pub struct Module {
    pub(crate) id: Id,
    pub(crate) spec_name: String,
    pub(crate) inputs: Vec<Port>,
    pub(crate) outputs: Vec<Port>,
    pub(crate) param_values: HashMap<String, BitVec>,
}

impl Module {
    /// The module's id.
    pub fn id(&self) -> Id {
        self.id
    }

    /// The name of the [`ModuleSpec`] this module instantiates.
    pub fn spec_name(&self) -> &str {
        &self.spec_name
    }

    /// The module's input ports, in declaration order.
    pub fn inputs(&self) -> &[Port] {
        &self.inputs
    }

    /// The module's output ports, in declaration order.
    pub fn outputs(&self) -> &[Port] {
        &self.outputs
    }

    /// The module's randomly-drawn parameter values.
    pub fn param_values(&self) -> &HashMap<String, BitVec> {
        &self.param_values
    }

    pub(crate) fn port(&self, idx: PortIndex) -> &Port {
        match idx {
            PortIndex::Input(i) => &self.inputs[i],
            PortIndex::Output(i) => &self.outputs[i],
        }
    }

    pub(crate) fn port_mut(&mut self, idx: PortIndex) -> &mut Port {
        match idx {
            PortIndex::Input(i) => &mut self.inputs[i],
            PortIndex::Output(i) => &mut self.outputs[i],
        }
    }

    fn random_param_values<R: Rng + ?Sized>(spec: &ModuleSpec, rng: &mut R) -> HashMap<String, BitVec> {
        spec.params
            .iter()
            .map(|p| {
                let bits: BitVec = (0..p.width).map(|_| rng.gen::<bool>()).collect();
                (p.name.clone(), bits)
            })
            .collect()
    }

    pub(crate) fn new<R: Rng + ?Sized>(id: Id, spec: &ModuleSpec, rng: &mut R) -> Self {
        let inputs = spec
            .inputs
            .iter()
            .map(|p| Port {
                width: p.width,
                net_type: p.net_type,
                nets: vec![None; p.width],
            })
            .collect();
        let outputs = spec
            .outputs
            .iter()
            .map(|p| Port {
                width: p.width,
                net_type: p.net_type,
                nets: vec![None; p.width],
            })
            .collect();
        Self {
            id,
            spec_name: spec.name.clone(),
            inputs,
            outputs,
            param_values: Self::random_param_values(spec, rng),
        }
    }
}

/// The mutable netlist graph: a collection of [`Net`]s and [`Module`]s
/// plus the id allocator and the random engine used to grow it.
///
/// `Netlist` borrows its [`CellLibrary`] rather than owning it, so one
/// loaded library can back many generated netlists (and the reducer's
/// repeated reloads of its state document).
pub struct Netlist<'lib, R> {
    pub(crate) library: &'lib CellLibrary,
    pub(crate) nets: HashMap<Id, Net>,
    pub(crate) modules: HashMap<Id, Module>,
    pub(crate) next_id: Id,
    pub(crate) rng: R,
}

impl<'lib, R: Rng> Netlist<'lib, R> {
    /// Creates an empty netlist backed by `library`, drawing all randomness
    /// from `rng`.
    pub fn new(library: &'lib CellLibrary, rng: R) -> Self {
        Self {
            library,
            nets: HashMap::new(),
            modules: HashMap::new(),
            next_id: 1,
            rng,
        }
    }

    /// The library this netlist instantiates cells from.
    pub fn library(&self) -> &'lib CellLibrary {
        self.library
    }

    /// Mutable access to the random engine, for command dispatch.
    pub fn rng_mut(&mut self) -> &mut R {
        &mut self.rng
    }

    pub(crate) fn alloc_id(&mut self) -> Id {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Bumps the id counter so that subsequent allocations never collide
    /// with an id loaded from a snapshot.
    pub(crate) fn observe_id(&mut self, id: Id) {
        if id >= self.next_id {
            self.next_id = id + 1;
        }
    }

    /// Looks up a net by id.
    pub fn net(&self, id: Id) -> Result<&Net> {
        self.nets.get(&id).ok_or(Error::NetNotFound(id))
    }

    /// Looks up a module by id.
    pub fn module(&self, id: Id) -> Result<&Module> {
        self.modules.get(&id).ok_or(Error::ModuleNotFound(id))
    }

    /// The net ids, in ascending order. Emission and any other
    /// deterministic traversal should iterate in this order, since
    /// `HashMap` iteration order is not reproducible across runs.
    pub fn net_ids_sorted(&self) -> Vec<Id> {
        let mut ids: Vec<Id> = self.nets.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// The module ids, in ascending order.
    pub fn module_ids_sorted(&self) -> Vec<Id> {
        let mut ids: Vec<Id> = self.modules.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Allocates and registers a new net of the given type.
    pub fn make_net(&mut self, net_type: NetType, name: Option<String>) -> Id {
        self.make_net_with_id(net_type, name, None)
    }

    pub(crate) fn make_net_with_id(
        &mut self,
        net_type: NetType,
        name: Option<String>,
        id: Option<Id>,
    ) -> Id {
        let id = match id {
            Some(id) => {
                self.observe_id(id);
                id
            }
            None => self.alloc_id(),
        };
        self.nets.insert(
            id,
            Net {
                id,
                name,
                net_type,
                driver: None,
                sinks: Vec::new(),
            },
        );
        id
    }

    /// Allocates and registers a new module instance of `spec_name`,
    /// without connecting any of its ports.
    pub fn instantiate(&mut self, spec_name: &str) -> Result<Id> {
        self.instantiate_with_id(spec_name, None)
    }

    pub(crate) fn instantiate_with_id(&mut self, spec_name: &str, id: Option<Id>) -> Result<Id> {
        let spec = self.library.get(spec_name)?;
        let id = match id {
            Some(id) => {
                self.observe_id(id);
                id
            }
            None => self.alloc_id(),
        };
        let module = Module::new(id, spec, &mut self.rng);
        self.modules.insert(id, module);
        Ok(id)
    }

    /// Binds output bit `(module, out_idx, bit)` as the driver of `net`.
    pub(crate) fn set_driver(&mut self, net: Id, module: Id, out_idx: usize, bit: usize) -> Result<()> {
        let pb = PortBit::new(module, PortIndex::Output(out_idx), bit);
        self.modules
            .get_mut(&module)
            .ok_or(Error::ModuleNotFound(module))?
            .outputs[out_idx]
            .nets[bit] = Some(net);
        self.nets.get_mut(&net).ok_or(Error::NetNotFound(net))?.driver = Some(pb);
        Ok(())
    }

    /// Overwrites a module's parameter values wholesale, used when
    /// restoring an exact snapshot rather than drawing fresh randomness.
    pub(crate) fn set_param_values(&mut self, module: Id, values: HashMap<String, BitVec>) -> Result<()> {
        self.modules
            .get_mut(&module)
            .ok_or(Error::ModuleNotFound(module))?
            .param_values = values;
        Ok(())
    }

    /// Binds input bit `(module, in_idx, bit)` as a sink of `net`.
    pub(crate) fn add_sink(&mut self, net: Id, module: Id, in_idx: usize, bit: usize) -> Result<()> {
        let pb = PortBit::new(module, PortIndex::Input(in_idx), bit);
        self.modules
            .get_mut(&module)
            .ok_or(Error::ModuleNotFound(module))?
            .inputs[in_idx]
            .nets[bit] = Some(net);
        self.nets
            .get_mut(&net)
            .ok_or(Error::NetNotFound(net))?
            .sinks
            .push(pb);
        Ok(())
    }

    /// Returns `true` if `module` is a buffer instance: one of the library
    /// cells with exactly one 1-bit input and one 1-bit output.
    pub fn is_buffer(&self, module: Id) -> Result<bool> {
        let m = self.module(module)?;
        Ok(self.library.get(&m.spec_name)?.is_buffer())
    }

    /// Verifies the invariants documented in the data-model: driver/sink
    /// back-references agree with the ports they claim to bind, external
    /// net rules hold, and after finalisation every internal `LOGIC` net
    /// is driven and consumed.
    pub fn verify(&self, finalised: bool) -> Result<()> {
        for (&id, net) in self.nets.iter() {
            if let Some(pb) = net.driver {
                let m = self.module(pb.module)?;
                let port = m.port(pb.port_index);
                if !matches!(pb.port_index, PortIndex::Output(_)) {
                    return Err(Error::InvalidInput(format!(
                        "net {id} driver is not bound to an output port"
                    )));
                }
                if port.nets[pb.bit] != Some(id) {
                    return Err(Error::InvalidInput(format!(
                        "net {id} driver back-reference mismatch"
                    )));
                }
                if port.net_type != net.net_type {
                    return Err(Error::InvalidInput(format!(
                        "net {id} driver net-type mismatch"
                    )));
                }
            }
            for pb in &net.sinks {
                let m = self.module(pb.module)?;
                let port = m.port(pb.port_index);
                if !matches!(pb.port_index, PortIndex::Input(_)) {
                    return Err(Error::InvalidInput(format!(
                        "net {id} sink is not bound to an input port"
                    )));
                }
                if port.nets[pb.bit] != Some(id) {
                    return Err(Error::InvalidInput(format!(
                        "net {id} sink back-reference mismatch"
                    )));
                }
                if port.net_type != net.net_type {
                    return Err(Error::InvalidInput(format!(
                        "net {id} sink net-type mismatch"
                    )));
                }
            }
            match net.net_type {
                NetType::ExtIn | NetType::ExtClk => {
                    if net.driver.is_some() {
                        return Err(Error::InvalidInput(format!(
                            "external input net {id} has an internal driver"
                        )));
                    }
                }
                NetType::ExtOut => {
                    if !net.sinks.is_empty() {
                        return Err(Error::InvalidInput(format!(
                            "external output net {id} has sinks"
                        )));
                    }
                }
                _ => {}
            }
            if finalised && net.net_type == NetType::Logic {
                if net.driver.is_none() {
                    return Err(Error::InvalidInput(format!(
                        "logic net {id} is undriven after finalisation"
                    )));
                }
                if net.sinks.is_empty() {
                    return Err(Error::InvalidInput(format!(
                        "logic net {id} has no sinks after finalisation"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Counts of input/output/total nets and combinational/sequential/total
    /// modules, used by the `_stats.json` artifact.
    pub fn stats(&self) -> NetlistStats {
        let mut stats = NetlistStats::default();
        for net in self.nets.values() {
            match net.net_type {
                NetType::ExtIn | NetType::ExtClk => stats.input_nets += 1,
                NetType::ExtOut => stats.output_nets += 1,
                _ => {}
            }
        }
        stats.total_nets = self.nets.len();
        for module in self.modules.values() {
            if let Ok(spec) = self.library.get(&module.spec_name) {
                if spec.combinational {
                    stats.comb_modules += 1;
                } else {
                    stats.seq_modules += 1;
                }
            }
        }
        stats.total_modules = self.modules.len();
        stats
    }

    /// The number of decimal digits in the current id counter, used to
    /// zero-pad anonymous net/module labels so they stay a fixed width
    /// across a run.
    pub fn id_width(&self) -> usize {
        let counter = self.next_id.max(1);
        (counter as f64).log10().floor() as usize + 1
    }

    /// Picks a net id uniformly at random among nets satisfying `filter`.
    pub(crate) fn random_net(&mut self, filter: impl Fn(&Net) -> bool) -> Result<Id> {
        let candidates: Vec<Id> = {
            let mut ids: Vec<Id> = self
                .nets
                .values()
                .filter(|n| filter(n))
                .map(|n| n.id)
                .collect();
            ids.sort_unstable();
            ids
        };
        if candidates.is_empty() {
            return Err(Error::NoCandidate(
                "no net satisfies the requested filter".to_string(),
            ));
        }
        let idx = self.rng.gen_range(0..candidates.len());
        Ok(candidates[idx])
    }

    /// A BTreeMap view of modules in ascending-id order, used by emitters.
    pub(crate) fn modules_sorted(&self) -> BTreeMap<Id, &Module> {
        self.modules.iter().map(|(&id, m)| (id, m)).collect()
    }

    /// A BTreeMap view of nets in ascending-id order, used by emitters.
    pub(crate) fn nets_sorted(&self) -> BTreeMap<Id, &Net> {
        self.nets.iter().map(|(&id, n)| (id, n)).collect()
    }
}

/// Summary counts over a netlist, emitted as `_stats.json`.
#[derive(Debug, Default, Clone, Copy, serde::Serialize)]
pub struct NetlistStats {
    /// Number of `EXT_IN`/`EXT_CLK` nets.
    pub input_nets: usize,
    /// Number of `EXT_OUT` nets.
    pub output_nets: usize,
    /// Total number of nets.
    pub total_nets: usize,
    /// Number of instances of combinational cells.
    pub comb_modules: usize,
    /// Number of instances of non-combinational cells.
    pub seq_modules: usize,
    /// Total number of module instances.
    pub total_modules: usize,
}
