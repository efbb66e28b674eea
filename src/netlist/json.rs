/*!

  JSON netlist snapshots: the artifact the generator writes after every
  run and the reducer reads and rewrites on every iteration.

  Every ordered element is produced by iterating net/module ids in
  ascending order ([`Netlist::net_ids_sorted`] /
  [`Netlist::module_ids_sorted`]), so two structurally-isomorphic
  netlists serialize identically regardless of `HashMap` iteration
  order -- a precondition for the fingerprinting in
  [`super::fingerprint`] and for byte-identical reproduction from a
  fixed seed.

*/

use std::collections::HashMap;

use bitvec::vec::BitVec;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::library::CellLibrary;
use crate::types::{Id, NetType};

use super::graph::Netlist;

/// A full netlist snapshot: every net and module instance, with enough
/// information to reconstruct the graph exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetlistSnapshot {
    pub nets: Vec<NetSnapshot>,
    pub modules: Vec<ModuleSnapshot>,
}

/// The artifact a `generate` run writes to `<prefix>.json`: a snapshot
/// wrapped under the same `new` key the reducer's own state document
/// uses, so a freshly-generated netlist can be fed straight into
/// [`crate::reducer::ReducerState::fresh`] without reshaping it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorArtifact {
    pub new: NetlistSnapshot,
}

/// One net: its id, optional name, and type. Driver/sink bindings are
/// not carried here -- they're implied by which module ports reference
/// this id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetSnapshot {
    pub id: Id,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub net_type: NetType,
}

/// One module instance: the cell it instantiates, every port's wiring,
/// and its randomly-drawn parameter values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleSnapshot {
    pub id: Id,
    pub name: String,
    pub ports: HashMap<String, PortSnapshot>,
    /// Parameter name to its value as a `'0'`/`'1'` bitstring, one
    /// character per bit, index 0 first.
    pub params: HashMap<String, String>,
}

/// One port's wiring: its declared width and type, plus the net id
/// bound to each bit (`null` for an unbound bit, which can only occur
/// transiently mid-mutation).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortSnapshot {
    pub width: usize,
    #[serde(rename = "type")]
    pub net_type: NetType,
    pub net_ids: Vec<Option<Id>>,
}

fn bits_to_string(bits: &BitVec) -> String {
    bits.iter().map(|b| if *b { '1' } else { '0' }).collect()
}

fn string_to_bits(s: &str) -> Result<BitVec> {
    s.chars()
        .map(|c| match c {
            '0' => Ok(false),
            '1' => Ok(true),
            other => Err(Error::Parse(format!("invalid bitstring character '{other}'"))),
        })
        .collect()
}

impl<'lib, R: Rng> Netlist<'lib, R> {
    /// Serializes the current graph to its JSON snapshot form.
    pub fn to_snapshot(&self) -> NetlistSnapshot {
        let nets = self
            .net_ids_sorted()
            .into_iter()
            .map(|id| {
                let n = &self.nets[&id];
                NetSnapshot {
                    id,
                    name: n.name().map(str::to_string),
                    net_type: n.net_type(),
                }
            })
            .collect();

        let modules = self
            .module_ids_sorted()
            .into_iter()
            .map(|id| {
                let m = &self.modules[&id];
                let spec = self
                    .library
                    .get(m.spec_name())
                    .expect("instantiated module must reference a known cell");
                let mut ports = HashMap::with_capacity(spec.inputs.len() + spec.outputs.len());
                for (idx, port_spec) in spec.inputs.iter().enumerate() {
                    let port = &m.inputs[idx];
                    ports.insert(
                        port_spec.name.clone(),
                        PortSnapshot {
                            width: port.width(),
                            net_type: port.net_type(),
                            net_ids: port.nets.clone(),
                        },
                    );
                }
                for (idx, port_spec) in spec.outputs.iter().enumerate() {
                    let port = &m.outputs[idx];
                    ports.insert(
                        port_spec.name.clone(),
                        PortSnapshot {
                            width: port.width(),
                            net_type: port.net_type(),
                            net_ids: port.nets.clone(),
                        },
                    );
                }
                let params = m
                    .param_values()
                    .iter()
                    .map(|(name, bits)| (name.clone(), bits_to_string(bits)))
                    .collect();
                ModuleSnapshot {
                    id,
                    name: m.spec_name().to_string(),
                    ports,
                    params,
                }
            })
            .collect();

        NetlistSnapshot { nets, modules }
    }

    /// Rebuilds a netlist from a JSON snapshot, preserving every id,
    /// name, and parameter value exactly as recorded.
    pub fn from_snapshot(library: &'lib CellLibrary, snapshot: &NetlistSnapshot, rng: R) -> Result<Self> {
        let mut nl = Netlist::new(library, rng);

        for n in &snapshot.nets {
            nl.make_net_with_id(n.net_type, n.name.clone(), Some(n.id));
        }
        for m in &snapshot.modules {
            nl.instantiate_with_id(&m.name, Some(m.id))?;
        }

        for m in &snapshot.modules {
            let spec = nl.library.get(&m.name)?.clone();

            let mut values = HashMap::with_capacity(spec.params.len());
            for param in &spec.params {
                if let Some(bits) = m.params.get(&param.name) {
                    values.insert(param.name.clone(), string_to_bits(bits)?);
                }
            }
            nl.set_param_values(m.id, values)?;

            for (idx, port_spec) in spec.inputs.iter().enumerate() {
                let snap = m.ports.get(&port_spec.name).ok_or_else(|| {
                    Error::Parse(format!("module {} missing port '{}'", m.id, port_spec.name))
                })?;
                for (bit, net_id) in snap.net_ids.iter().enumerate() {
                    if let Some(net_id) = net_id {
                        nl.add_sink(*net_id, m.id, idx, bit)?;
                    }
                }
            }
            for (idx, port_spec) in spec.outputs.iter().enumerate() {
                let snap = m.ports.get(&port_spec.name).ok_or_else(|| {
                    Error::Parse(format!("module {} missing port '{}'", m.id, port_spec.name))
                })?;
                for (bit, net_id) in snap.net_ids.iter().enumerate() {
                    if let Some(net_id) = net_id {
                        nl.set_driver(*net_id, m.id, idx, bit)?;
                    }
                }
            }
        }

        Ok(nl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::CellLibrary;
    use crate::types::NetType;
    use rand::SeedableRng;

    const LIB: &str = r#"
        [[cell]]
        name = "AND"
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
    "#;

    #[test]
    fn round_trips_through_json() {
        let lib = CellLibrary::from_str(LIB).unwrap();
        let rng = rand::rngs::StdRng::seed_from_u64(7);
        let mut nl = Netlist::new(&lib, rng);

        let a = nl.make_net(NetType::Logic, Some("a".to_string()));
        let b = nl.make_net(NetType::Logic, None);
        let and = nl.instantiate("AND").unwrap();
        nl.add_sink(a, and, 0, 0).unwrap();
        nl.add_sink(b, and, 1, 0).unwrap();
        let y = nl.make_net(NetType::Logic, None);
        nl.set_driver(y, and, 0, 0).unwrap();

        let snapshot = nl.to_snapshot();
        let text = serde_json::to_string(&snapshot).unwrap();
        let parsed: NetlistSnapshot = serde_json::from_str(&text).unwrap();

        let rng2 = rand::rngs::StdRng::seed_from_u64(0);
        let restored = Netlist::from_snapshot(&lib, &parsed, rng2).unwrap();
        restored.verify(true).unwrap();

        assert_eq!(restored.net(a).unwrap().name(), Some("a"));
        assert_eq!(restored.net(y).unwrap().driver().unwrap().module, and);
        assert_eq!(restored.module(and).unwrap().inputs()[0].net_at(0), Some(a));
    }
}
