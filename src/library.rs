/*!

  The cell library: an immutable catalogue of [`ModuleSpec`]s loaded once
  from a configuration file, with weighted-random and predicate-filtered
  lookup.

*/

use std::collections::{HashMap, HashSet};
use std::path::Path;

use rand::distributions::WeightedIndex;
use rand::prelude::Distribution;
use rand::Rng;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::types::{NetType, PortDir};

/// A port declared on a [`ModuleSpec`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortSpec {
    /// The port's name, unique within its owning cell.
    pub name: String,
    /// Whether the port is driven by, or drives, the instance.
    pub dir: PortDir,
    /// The number of bits of the port. Always `>= 1`.
    pub width: usize,
    /// The [`NetType`] every bit of this port must match.
    pub net_type: NetType,
}

/// A parameter declared on a [`ModuleSpec`], instantiated as a random
/// bitstring of the declared width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    /// The parameter's name.
    pub name: String,
    /// The bit-width of the parameter's value.
    pub width: usize,
}

/// An immutable catalogue entry: one primitive cell type.
///
/// `seq_conns` maps an output port name to the set of input port names that
/// are *registered* against it (a sequential edge). A cell with any entry
/// in `seq_conns` is forced non-combinational, but the per-pair mapping is
/// what the forward-cone BFS (`crate::netlist::cone`) actually consults --
/// a clock-enable input can be combinational to one output while `Q` is
/// sequential to it on the very same cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleSpec {
    /// The cell's name, as referenced by netlist JSON and library lookups.
    pub name: String,
    /// Input ports, in declaration order.
    pub inputs: Vec<PortSpec>,
    /// Output ports, in declaration order.
    pub outputs: Vec<PortSpec>,
    /// Parameters, in declaration order.
    pub params: Vec<ParamSpec>,
    /// `true` iff every output depends only combinationally on every input.
    pub combinational: bool,
    /// `output_port_name -> {input_port_name, ...}` sequential edges.
    pub seq_conns: HashMap<String, HashSet<String>>,
    /// Unused by the core engine; carried through to emitted artifacts.
    pub resource: HashMap<String, i64>,
    /// The integer selection weight. A weight of `0` is never picked.
    pub weight: u32,
}

impl ModuleSpec {
    /// Returns `true` if this cell is a buffer: exactly one 1-bit input and
    /// one 1-bit output.
    pub fn is_buffer(&self) -> bool {
        self.inputs.len() == 1
            && self.outputs.len() == 1
            && self.inputs[0].width == 1
            && self.outputs[0].width == 1
    }

    /// Returns `true` if this cell is a buffer converting `in_type -> out_type`.
    pub fn is_buffer_between(&self, in_type: NetType, out_type: NetType) -> bool {
        self.is_buffer() && self.inputs[0].net_type == in_type && self.outputs[0].net_type == out_type
    }
}

// ---- on-disk format -------------------------------------------------------
//
// The cell library is carried as TOML, an array of cell tables so that port
// and parameter declaration order survives a parse (a bare map has no
// stable order). Each cell looks like:
//
//   [[cell]]
//   name = "DFF"
//   weight = 2
//
//   [[cell.port]]
//   name = "D"
//   dir = "input"
//   width = 1
//   type = "logic"
//
//   [[cell.port]]
//   name = "Q"
//   dir = "output"
//   width = 1
//   type = "logic"
//   seq_inputs = ["D"]
//
//   [[cell.param]]
//   name = "INIT"
//   width = 1
//
//   [cell.resources]
//   ff = 1

#[derive(Debug, Deserialize)]
struct RawFile {
    #[serde(default)]
    cell: Vec<RawCell>,
}

#[derive(Debug, Deserialize)]
struct RawCell {
    name: String,
    #[serde(default)]
    weight: Option<u32>,
    #[serde(default)]
    combinational: Option<bool>,
    #[serde(default)]
    port: Vec<RawPort>,
    #[serde(default)]
    param: Vec<RawParam>,
    #[serde(default)]
    resources: HashMap<String, i64>,
}

#[derive(Debug, Deserialize)]
struct RawPort {
    name: String,
    dir: String,
    #[serde(default = "default_width")]
    width: usize,
    #[serde(rename = "type", default = "default_type")]
    net_type: String,
    #[serde(default)]
    seq_inputs: Option<Vec<String>>,
}

fn default_width() -> usize {
    1
}

fn default_type() -> String {
    "logic".to_string()
}

#[derive(Debug, Deserialize)]
struct RawParam {
    name: String,
    width: usize,
}

impl RawCell {
    fn into_spec(self) -> Result<ModuleSpec> {
        let mut inputs = Vec::new();
        let mut outputs = Vec::new();
        let mut seq_conns: HashMap<String, HashSet<String>> = HashMap::new();
        let mut combinational = self.combinational.unwrap_or(true);

        for p in self.port {
            let net_type = NetType::from_library_str(&p.net_type).ok_or_else(|| {
                Error::InvalidInput(format!(
                    "cell '{}' port '{}' has unknown net type '{}'",
                    self.name, p.name, p.net_type
                ))
            })?;
            if p.width == 0 {
                return Err(Error::InvalidInput(format!(
                    "cell '{}' port '{}' has width 0",
                    self.name, p.name
                )));
            }
            let dir = match p.dir.as_str() {
                "input" => PortDir::Input,
                "output" => PortDir::Output,
                other => {
                    return Err(Error::InvalidInput(format!(
                        "cell '{}' port '{}' has unknown direction '{}'",
                        self.name, p.name, other
                    )))
                }
            };
            let spec = PortSpec {
                name: p.name.clone(),
                dir,
                width: p.width,
                net_type,
            };
            match dir {
                PortDir::Input => inputs.push(spec),
                PortDir::Output => {
                    if let Some(seq_inputs) = p.seq_inputs {
                        combinational = false;
                        seq_conns
                            .entry(p.name.clone())
                            .or_default()
                            .extend(seq_inputs);
                    }
                    outputs.push(spec)
                }
            }
        }

        let params = self
            .param
            .into_iter()
            .map(|p| ParamSpec {
                name: p.name,
                width: p.width,
            })
            .collect();

        Ok(ModuleSpec {
            name: self.name,
            inputs,
            outputs,
            params,
            combinational,
            seq_conns,
            resource: self.resources,
            weight: self.weight.unwrap_or(1),
        })
    }
}

/// The immutable catalogue of primitive cells.
#[derive(Debug)]
pub struct CellLibrary {
    specs: HashMap<String, ModuleSpec>,
    /// Preserves file declaration order for deterministic iteration.
    order: Vec<String>,
}

impl CellLibrary {
    /// Parses a cell library from its in-memory TOML text.
    pub fn from_str(text: &str) -> Result<Self> {
        let raw: RawFile = toml::from_str(text).map_err(|e| Error::Parse(e.to_string()))?;
        let mut specs = HashMap::with_capacity(raw.cell.len());
        let mut order = Vec::with_capacity(raw.cell.len());
        for raw_cell in raw.cell {
            let spec = raw_cell.into_spec()?;
            order.push(spec.name.clone());
            specs.insert(spec.name.clone(), spec);
        }
        Ok(Self { specs, order })
    }

    /// Loads and parses a cell library file from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_str(&text)
    }

    /// Looks up a cell by name.
    pub fn get(&self, name: &str) -> Result<&ModuleSpec> {
        self.specs
            .get(name)
            .ok_or_else(|| Error::UnknownCell(name.to_string()))
    }

    /// The number of cells in the library.
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// Returns `true` if the library has no cells.
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Iterates over cells in file declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &ModuleSpec> {
        self.order.iter().map(move |name| &self.specs[name])
    }

    /// Weighted-random pick over specs satisfying `filter` (if given). A
    /// spec with weight `0` is never picked.
    pub fn random<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        filter: Option<&dyn Fn(&ModuleSpec) -> bool>,
    ) -> Result<&ModuleSpec> {
        let candidates: Vec<&ModuleSpec> = self
            .iter()
            .filter(|ms| filter.map(|f| f(ms)).unwrap_or(true))
            .collect();

        let weights: Vec<u32> = candidates.iter().map(|ms| ms.weight).collect();
        if candidates.is_empty() || weights.iter().all(|w| *w == 0) {
            return Err(Error::NoCandidate(
                "no cell in the library satisfies the requested filter".to_string(),
            ));
        }

        let dist = WeightedIndex::new(&weights)
            .map_err(|e| Error::NoCandidate(format!("weighted pick failed: {e}")))?;
        Ok(candidates[dist.sample(rng)])
    }

    /// Returns a random cell with exactly one 1-bit input port of type
    /// `in_type` and one 1-bit output port of type `out_type`.
    pub fn random_buffer<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        in_type: NetType,
        out_type: NetType,
    ) -> Result<&ModuleSpec> {
        self.random(
            rng,
            Some(&|ms: &ModuleSpec| ms.is_buffer_between(in_type, out_type)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASIC: &str = r#"
        [[cell]]
        name = "IBUF"
        [[cell.port]]
        name = "I"
        dir = "input"
        type = "ext_in"
        [[cell.port]]
        name = "O"
        dir = "output"
        type = "logic"

        [[cell]]
        name = "BUFG"
        [[cell.port]]
        name = "I"
        dir = "input"
        type = "ext_clk"
        [[cell.port]]
        name = "O"
        dir = "output"
        type = "clk"

        [[cell]]
        name = "OBUF"
        [[cell.port]]
        name = "I"
        dir = "input"
        type = "logic"
        [[cell.port]]
        name = "O"
        dir = "output"
        type = "ext_out"

        [[cell]]
        name = "AND"
        weight = 3
        [[cell.port]]
        name = "A"
        dir = "input"
        type = "logic"
        [[cell.port]]
        name = "B"
        dir = "input"
        type = "logic"
        [[cell.port]]
        name = "Y"
        dir = "output"
        type = "logic"

        [[cell]]
        name = "DFF"
        [[cell.port]]
        name = "C"
        dir = "input"
        type = "clk"
        [[cell.port]]
        name = "D"
        dir = "input"
        type = "logic"
        [[cell.port]]
        name = "Q"
        dir = "output"
        type = "logic"
        seq_inputs = ["D"]
    "#;

    #[test]
    fn parses_ports_and_seq_conns() {
        let lib = CellLibrary::from_str(BASIC).unwrap();
        assert_eq!(lib.len(), 5);
        let dff = lib.get("DFF").unwrap();
        assert!(!dff.combinational);
        assert_eq!(
            dff.seq_conns.get("Q").unwrap(),
            &HashSet::from(["D".to_string()])
        );
        let and = lib.get("AND").unwrap();
        assert!(and.combinational);
        assert_eq!(and.weight, 3);
    }

    #[test]
    fn unknown_cell_errors() {
        let lib = CellLibrary::from_str(BASIC).unwrap();
        assert!(matches!(lib.get("NOPE"), Err(Error::UnknownCell(_))));
    }

    #[test]
    fn random_buffer_picks_matching_arity_and_types() {
        let lib = CellLibrary::from_str(BASIC).unwrap();
        let mut rng = rand::rngs::mock::StepRng::new(0, 1);
        let spec = lib
            .random_buffer(&mut rng, NetType::ExtIn, NetType::Logic)
            .unwrap();
        assert_eq!(spec.name, "IBUF");
    }

    #[test]
    fn random_with_empty_filter_errors() {
        let lib = CellLibrary::from_str(BASIC).unwrap();
        let mut rng = rand::rngs::mock::StepRng::new(0, 1);
        let result = lib.random_buffer(&mut rng, NetType::Logic, NetType::Logic);
        assert!(matches!(result, Err(Error::NoCandidate(_))));
    }
}
