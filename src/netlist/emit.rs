/*!

  Structural emitters: plain Verilog (one flat module, one instance per
  cell, no behavioral constructs) and a Graphviz dot rendering for quick
  visual inspection.

  Anonymous nets and instances are labelled `_<id>_`, zero-padded to
  [`Netlist::id_width`] so labels stay a fixed width for the life of a
  run; a net with an explicit name (such as the mandatory `clk`) keeps
  it verbatim.
*/

use rand::Rng;

use crate::types::{Id, NetType};

use super::graph::{Netlist, Port};

fn net_label<R: Rng>(netlist: &Netlist<R>, width: usize, id: Id) -> String {
    match netlist.net(id).ok().and_then(|n| n.name()) {
        Some(name) => name.to_string(),
        None => format!("_{id:0width$}_"),
    }
}

fn port_expr<R: Rng>(netlist: &Netlist<R>, width: usize, port: &Port) -> String {
    if port.width() == 1 {
        return match port.net_at(0) {
            Some(n) => net_label(netlist, width, n),
            None => "1'b0".to_string(),
        };
    }
    let bits: Vec<String> = (0..port.width())
        .rev()
        .map(|b| match port.net_at(b) {
            Some(n) => net_label(netlist, width, n),
            None => "1'b0".to_string(),
        })
        .collect();
    format!("{{{}}}", bits.join(", "))
}

/// Emits a flat structural Verilog module: one `input`/`output` per
/// external net, one `wire` per internal net, and one instance per
/// module, in ascending-id order.
pub fn emit_verilog<R: Rng>(netlist: &Netlist<R>, module_name: &str) -> String {
    let width = netlist.id_width();

    let mut inputs = Vec::new();
    let mut outputs = Vec::new();
    let mut wires = Vec::new();
    for id in netlist.net_ids_sorted() {
        match netlist.net(id).expect("sorted id must resolve").net_type() {
            NetType::ExtIn | NetType::ExtClk => inputs.push(id),
            NetType::ExtOut => outputs.push(id),
            NetType::Clk | NetType::Logic => wires.push(id),
        }
    }

    let mut out = String::new();
    out.push_str(&format!("module {module_name} (\n"));
    let port_names: Vec<String> = inputs
        .iter()
        .chain(outputs.iter())
        .map(|&id| net_label(netlist, width, id))
        .collect();
    out.push_str("    ");
    out.push_str(&port_names.join(",\n    "));
    out.push_str("\n);\n\n");

    for &id in &inputs {
        out.push_str(&format!("  input wire {};\n", net_label(netlist, width, id)));
    }
    for &id in &outputs {
        out.push_str(&format!("  output wire {};\n", net_label(netlist, width, id)));
    }
    out.push('\n');
    for &id in &wires {
        out.push_str(&format!("  wire {};\n", net_label(netlist, width, id)));
    }
    out.push('\n');

    for mid in netlist.module_ids_sorted() {
        let m = netlist.module(mid).expect("sorted id must resolve");
        let spec = netlist
            .library()
            .get(m.spec_name())
            .expect("instantiated module must reference a known cell");
        let inst_name = format!("_{mid:0width$}_");
        out.push_str(&format!("  {} {} (\n", spec.name, inst_name));

        let mut conns: Vec<String> = Vec::new();
        for (idx, port_spec) in spec.inputs.iter().enumerate() {
            conns.push(format!(
                "    .{}({})",
                port_spec.name,
                port_expr(netlist, width, &m.inputs()[idx])
            ));
        }
        for (idx, port_spec) in spec.outputs.iter().enumerate() {
            conns.push(format!(
                "    .{}({})",
                port_spec.name,
                port_expr(netlist, width, &m.outputs()[idx])
            ));
        }
        out.push_str(&conns.join(",\n"));
        out.push_str("\n  );\n");
    }

    out.push_str("\nendmodule\n");
    out
}

/// Emits a Graphviz dot rendering: one node per module instance, one box
/// node per net, edges following driver/sink direction.
pub fn emit_dot<R: Rng>(netlist: &Netlist<R>, graph_name: &str) -> String {
    let width = netlist.id_width();
    let mut out = String::new();
    out.push_str(&format!("digraph {graph_name} {{\n"));

    for mid in netlist.module_ids_sorted() {
        let m = netlist.module(mid).expect("sorted id must resolve");
        out.push_str(&format!("  m{mid} [label=\"{}\"];\n", m.spec_name()));
    }

    for id in netlist.net_ids_sorted() {
        let n = netlist.net(id).expect("sorted id must resolve");
        let label = net_label(netlist, width, id);
        out.push_str(&format!("  n{id} [shape=box, label=\"{label}\"];\n"));
        if let Some(pb) = n.driver() {
            out.push_str(&format!("  m{} -> n{};\n", pb.module, id));
        }
        for pb in n.sinks() {
            out.push_str(&format!("  n{} -> m{};\n", id, pb.module));
        }
    }

    out.push_str("}\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::CellLibrary;
    use rand::SeedableRng;

    const LIB: &str = r#"
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
    "#;

    #[test]
    fn seed_only_netlist_emits_input_and_clk_ports() {
        let lib = CellLibrary::from_str(LIB).unwrap();
        let rng = rand::rngs::StdRng::seed_from_u64(1);
        let mut nl = Netlist::new(&lib, rng);

        let clk_in = nl.make_net(NetType::ExtClk, Some("clk".to_string()));
        let bufg = nl.instantiate("BUFG").unwrap();
        nl.add_sink(clk_in, bufg, 0, 0).unwrap();
        let clk_out = nl.make_net(NetType::Clk, None);
        nl.set_driver(clk_out, bufg, 0, 0).unwrap();

        let verilog = emit_verilog(&nl, "top");
        assert!(verilog.contains("module top"));
        assert!(verilog.contains("input wire clk;"));
        assert!(verilog.contains("BUFG"));

        let dot = emit_dot(&nl, "top");
        assert!(dot.starts_with("digraph top"));
    }
}
