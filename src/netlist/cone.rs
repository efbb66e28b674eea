/*!

  Forward-cone reachability: the algorithm that keeps
  [`super::mutate::Netlist::drive_undriven_nets`] from ever wiring a
  combinational cycle.

  The cone of a module is the same for every one of its input ports (the
  seed is the module's own outputs), so callers compute it once per
  driving module and reuse it across all of that module's input bits --
  mirroring the one-combinational-group-per-module shape of the source
  this crate grew out of.

*/

use std::collections::{HashSet, VecDeque};

use rand::Rng;

use crate::error::Result;
use crate::types::{Id, NetType, PortIndex};

use super::graph::Netlist;

/// Computes the set of net ids reachable forward from `module`'s own
/// output nets, by following sink edges into other modules' outputs.
///
/// When `stop_at_sequential` is `true`, an edge `(output_port, input_port)`
/// on the module owning the sink is *not* followed if that pair is listed
/// in that module's `seq_conns` -- i.e. the traversal stops at registered
/// inputs. A single bit of a flip-flop's clock-enable input can still be
/// combinational to one output even while `Q` is sequential to the clock,
/// because the stop decision is keyed on the specific `(output, input)`
/// pair, not on the module's overall `combinational` flag.
pub fn forward_cone<R: Rng>(
    netlist: &Netlist<R>,
    module: Id,
    stop_at_sequential: bool,
) -> Result<HashSet<Id>> {
    let mut visited = HashSet::new();
    let mut queue = VecDeque::new();

    let seed = netlist.module(module)?;
    for out in seed.outputs() {
        if out.net_type() == NetType::Clk {
            continue;
        }
        for bit in 0..out.width() {
            if let Some(net_id) = out.net_at(bit) {
                queue.push_back(net_id);
            }
        }
    }

    while let Some(net_id) = queue.pop_front() {
        if !visited.insert(net_id) {
            continue;
        }
        let net = netlist.net(net_id)?;
        for sink in net.sinks() {
            let next_module = netlist.module(sink.module)?;
            let next_spec = netlist.library().get(next_module.spec_name())?;
            let in_port_name = match sink.port_index {
                PortIndex::Input(i) => next_spec.inputs[i].name.as_str(),
                PortIndex::Output(_) => continue,
            };
            for (out_idx, out_spec) in next_spec.outputs.iter().enumerate() {
                if out_spec.net_type == NetType::Clk {
                    continue;
                }
                if stop_at_sequential {
                    if let Some(seq_inputs) = next_spec.seq_conns.get(&out_spec.name) {
                        if seq_inputs.contains(in_port_name) {
                            continue;
                        }
                    }
                }
                let out_port = &next_module.outputs()[out_idx];
                for bit in 0..out_port.width() {
                    if let Some(next_net) = out_port.net_at(bit) {
                        queue.push_back(next_net);
                    }
                }
            }
        }
    }

    Ok(visited)
}

/// The sequential-only residue of a module's forward cone: nets reachable
/// through some path but not reachable through a purely combinational one.
/// Feedback through these nets is safe because it can only close through a
/// registered (clocked) input.
pub fn seq_only_cone<R: Rng>(netlist: &Netlist<R>, module: Id) -> Result<HashSet<Id>> {
    let full = forward_cone(netlist, module, false)?;
    let comb = forward_cone(netlist, module, true)?;
    Ok(full.difference(&comb).copied().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::CellLibrary;
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
    fn sequential_edge_does_not_close_combinational_cone() {
        let lib = CellLibrary::from_str(LIB).unwrap();
        let rng = rand::rngs::StdRng::seed_from_u64(1);
        let mut nl = Netlist::new(&lib, rng);

        // d_net -[DFF]-> q_net -[AND.A]-> y_net, AND.B fed by an extra net.
        let d_net = nl.make_net(NetType::Logic, None);
        let extra = nl.make_net(NetType::Logic, None);
        let clk = nl.make_net(NetType::Clk, None);

        let dff = nl.instantiate("DFF").unwrap();
        nl.add_sink(clk, dff, 0, 0).unwrap();
        nl.add_sink(d_net, dff, 1, 0).unwrap();
        let q_net = nl.make_net(NetType::Logic, None);
        nl.set_driver(q_net, dff, 0, 0).unwrap();

        let and = nl.instantiate("AND").unwrap();
        nl.add_sink(q_net, and, 0, 0).unwrap();
        nl.add_sink(extra, and, 1, 0).unwrap();
        let y_net = nl.make_net(NetType::Logic, None);
        nl.set_driver(y_net, and, 0, 0).unwrap();

        // DFF's combinational cone should stop at its own registered Q.
        let comb = forward_cone(&nl, dff, true).unwrap();
        assert!(!comb.contains(&q_net));
        assert!(!comb.contains(&y_net));

        // The full cone (not stopping at sequential edges) follows through.
        let full = forward_cone(&nl, dff, false).unwrap();
        assert!(full.contains(&q_net));
        assert!(full.contains(&y_net));

        let seq_only = seq_only_cone(&nl, dff).unwrap();
        assert!(seq_only.contains(&q_net));
        assert!(seq_only.contains(&y_net));
    }
}
