/*!

  Structural fingerprinting: a hash of a netlist's shape that is
  invariant under id renumbering and under the nondeterministic
  iteration order of a `HashMap`, but sensitive to any real structural
  difference.

  This is a color-refinement hash (a bounded Weisfeiler-Leman pass):
  every net and module starts with a label built from its own
  attributes, and each round folds in the sorted multiset of its
  neighbors' current labels. After enough rounds the labels stabilize
  into a structural signature; taking the sorted multiset of all final
  labels and hashing that gives a fingerprint that doesn't depend on
  which id happened to land on which net.
*/

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use bitvec::vec::BitVec;
use rand::Rng;

use crate::types::{Id, PortIndex};

use super::graph::Netlist;

fn hash_of<T: Hash>(v: T) -> u64 {
    let mut h = DefaultHasher::new();
    v.hash(&mut h);
    h.finish()
}

fn port_tag(idx: PortIndex) -> (u8, usize) {
    match idx {
        PortIndex::Input(i) => (0, i),
        PortIndex::Output(i) => (1, i),
    }
}

fn bits_key(bits: &BitVec) -> String {
    bits.iter().map(|b| if *b { '1' } else { '0' }).collect()
}

/// The number of refinement rounds to run, bounded so the cost stays
/// linear-ish in graph size without ever genuinely needing more rounds
/// than there are nodes to distinguish.
fn round_count(node_count: usize) -> usize {
    node_count.clamp(1, 8)
}

/// Computes a structural fingerprint, rendered as a fixed-width hex
/// string.
pub fn fingerprint<R: Rng>(netlist: &Netlist<R>) -> String {
    let net_ids = netlist.net_ids_sorted();
    let module_ids = netlist.module_ids_sorted();

    let mut net_labels: HashMap<Id, u64> = net_ids
        .iter()
        .map(|&id| {
            let n = &netlist.nets[&id];
            (id, hash_of((n.net_type().ordinal(), n.name())))
        })
        .collect();

    let mut mod_labels: HashMap<Id, u64> = module_ids
        .iter()
        .map(|&id| {
            let m = &netlist.modules[&id];
            let mut params: Vec<(String, String)> = m
                .param_values()
                .iter()
                .map(|(k, v)| (k.clone(), bits_key(v)))
                .collect();
            params.sort();
            (id, hash_of((m.spec_name(), params)))
        })
        .collect();

    let rounds = round_count(net_ids.len() + module_ids.len());
    for _ in 0..rounds {
        let mut next_net_labels = HashMap::with_capacity(net_labels.len());
        for &id in &net_ids {
            let n = &netlist.nets[&id];
            let mut nbrs: Vec<u64> = Vec::new();
            if let Some(pb) = n.driver() {
                nbrs.push(hash_of((0u8, mod_labels[&pb.module], port_tag(pb.port_index), pb.bit)));
            }
            for pb in n.sinks() {
                nbrs.push(hash_of((1u8, mod_labels[&pb.module], port_tag(pb.port_index), pb.bit)));
            }
            nbrs.sort_unstable();
            next_net_labels.insert(id, hash_of((net_labels[&id], nbrs)));
        }

        let mut next_mod_labels = HashMap::with_capacity(mod_labels.len());
        for &id in &module_ids {
            let m = &netlist.modules[&id];
            let mut nbrs: Vec<u64> = Vec::new();
            for (idx, port) in m.inputs().iter().enumerate() {
                for (bit, net_id) in port.nets.iter().enumerate() {
                    if let Some(net_id) = net_id {
                        nbrs.push(hash_of((0u8, idx, bit, net_labels[net_id])));
                    }
                }
            }
            for (idx, port) in m.outputs().iter().enumerate() {
                for (bit, net_id) in port.nets.iter().enumerate() {
                    if let Some(net_id) = net_id {
                        nbrs.push(hash_of((1u8, idx, bit, net_labels[net_id])));
                    }
                }
            }
            nbrs.sort_unstable();
            next_mod_labels.insert(id, hash_of((mod_labels[&id], nbrs)));
        }

        net_labels = next_net_labels;
        mod_labels = next_mod_labels;
    }

    let mut all: Vec<u64> = net_labels.into_values().chain(mod_labels.into_values()).collect();
    all.sort_unstable();
    format!("{:016x}", hash_of(all))
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

    fn build(seed: u64, swap_ids: bool) -> Netlist<'static, rand::rngs::StdRng> {
        let lib: &'static CellLibrary = Box::leak(Box::new(CellLibrary::from_str(LIB).unwrap()));
        let rng = rand::rngs::StdRng::seed_from_u64(seed);
        let mut nl = Netlist::new(lib, rng);
        if swap_ids {
            let _padding = nl.make_net(NetType::Logic, None);
        }
        let a = nl.make_net(NetType::Logic, None);
        let b = nl.make_net(NetType::Logic, None);
        let and = nl.instantiate("AND").unwrap();
        nl.add_sink(a, and, 0, 0).unwrap();
        nl.add_sink(b, and, 1, 0).unwrap();
        let y = nl.make_net(NetType::Logic, None);
        nl.set_driver(y, and, 0, 0).unwrap();
        nl
    }

    #[test]
    fn identical_structure_fingerprints_equal_despite_id_shift() {
        let plain = build(1, false);
        let shifted = build(1, true);
        assert_eq!(fingerprint(&plain), fingerprint(&shifted));
    }

    #[test]
    fn different_structure_fingerprints_differ() {
        let plain = build(1, false);

        let lib: &'static CellLibrary = Box::leak(Box::new(CellLibrary::from_str(LIB).unwrap()));
        let rng = rand::rngs::StdRng::seed_from_u64(1);
        let mut other = Netlist::new(lib, rng);
        let a = other.make_net(NetType::Logic, None);
        let b = other.make_net(NetType::Logic, None);
        let and1 = other.instantiate("AND").unwrap();
        other.add_sink(a, and1, 0, 0).unwrap();
        other.add_sink(b, and1, 1, 0).unwrap();
        let mid = other.make_net(NetType::Logic, None);
        other.set_driver(mid, and1, 0, 0).unwrap();
        let and2 = other.instantiate("AND").unwrap();
        other.add_sink(mid, and2, 0, 0).unwrap();
        other.add_sink(b, and2, 1, 0).unwrap();
        let y = other.make_net(NetType::Logic, None);
        other.set_driver(y, and2, 0, 0).unwrap();

        assert_ne!(fingerprint(&plain), fingerprint(&other));
    }
}
