/*!

  Graph-mutating operations: the six verbs the command layer dispatches,
  plus the structural slicing and cleanup passes the reducer drives.

*/

use std::collections::{HashSet, VecDeque};

use rand::Rng;

use crate::error::{Error, Result};
use crate::library::ModuleSpec;
use crate::types::{Id, NetType, PortIndex};

use super::cone::forward_cone;
use super::graph::Netlist;

impl<'lib, R: Rng> Netlist<'lib, R> {
    /// Instantiates `spec_name`, wiring each input bit to a uniformly-random
    /// existing net of matching type and each output bit to a freshly
    /// allocated net. Because every output is brand new, this can never
    /// introduce a combinational cycle: a new module's inputs can only
    /// reach nets that already existed before it did.
    pub fn wire_random(&mut self, module: Id) -> Result<()> {
        let input_specs: Vec<(usize, usize, NetType)> = {
            let m = self.module(module)?;
            m.inputs()
                .iter()
                .enumerate()
                .map(|(i, p)| (i, p.width(), p.net_type()))
                .collect()
        };
        for (idx, width, net_type) in input_specs {
            for bit in 0..width {
                let net = self.random_net(|n| n.net_type() == net_type)?;
                self.add_sink(net, module, idx, bit)?;
            }
        }

        let output_specs: Vec<(usize, usize, NetType)> = {
            let m = self.module(module)?;
            m.outputs()
                .iter()
                .enumerate()
                .map(|(i, p)| (i, p.width(), p.net_type()))
                .collect()
        };
        for (idx, width, net_type) in output_specs {
            for bit in 0..width {
                let net = self.make_net(net_type, None);
                self.set_driver(net, module, idx, bit)?;
            }
        }
        Ok(())
    }

    /// Instantiates a 1-in/1-out buffer cell, wiring its input to
    /// `drive_net` and returning the freshly-allocated net its output
    /// drives.
    pub fn add_buffer(&mut self, drive_net: Id, spec_name: &str) -> Result<Id> {
        let spec = self.library.get(spec_name)?;
        if spec.inputs.len() != 1
            || spec.outputs.len() != 1
            || spec.inputs[0].width != 1
            || spec.outputs[0].width != 1
        {
            return Err(Error::InvalidInput(format!(
                "cell '{spec_name}' is not a 1-in/1-out buffer"
            )));
        }
        let out_type = spec.outputs[0].net_type;
        let module = self.instantiate(spec_name)?;
        self.add_sink(drive_net, module, 0, 0)?;
        let new_net = self.make_net(out_type, None);
        self.set_driver(new_net, module, 0, 0)?;
        Ok(new_net)
    }

    /// Seeds an empty netlist with the two mandatory external nets: an
    /// `EXT_IN -> LOGIC` buffered input, and a `clk`-named `EXT_CLK ->
    /// CLK` buffered clock.
    pub fn add_initial_nets(&mut self) -> Result<()> {
        let input_net = self.make_net(NetType::ExtIn, None);
        let in_buf = self
            .library
            .random_buffer(&mut self.rng, NetType::ExtIn, NetType::Logic)?
            .name
            .clone();
        self.add_buffer(input_net, &in_buf)?;

        let clk_net = self.make_net(NetType::ExtClk, Some("clk".to_string()));
        let clk_buf = self
            .library
            .random_buffer(&mut self.rng, NetType::ExtClk, NetType::Clk)?
            .name
            .clone();
        self.add_buffer(clk_net, &clk_buf)?;
        Ok(())
    }

    /// Adds `n` more buffered `EXT_IN` nets.
    pub fn add_external_nets(&mut self, n: usize) -> Result<()> {
        for _ in 0..n {
            let net = self.make_net(NetType::ExtIn, None);
            let buf = self
                .library
                .random_buffer(&mut self.rng, NetType::ExtIn, NetType::Logic)?
                .name
                .clone();
            self.add_buffer(net, &buf)?;
        }
        Ok(())
    }

    /// Adds `n` floating nets of `net_type` with no driver and no sinks.
    pub fn add_undriven_nets(&mut self, net_type: NetType, n: usize) {
        for _ in 0..n {
            self.make_net(net_type, None);
        }
    }

    /// Instantiates a library cell chosen uniformly at random (by weight,
    /// unconstrained) and wires it randomly.
    pub fn add_random_module(&mut self) -> Result<Id> {
        let spec_name = self.library.random(&mut self.rng, None)?.name.clone();
        let module = self.instantiate(&spec_name)?;
        self.wire_random(module)?;
        Ok(module)
    }

    /// Drives undriven nets of `net_type` by materialising fresh cells.
    ///
    /// For each candidate net, a cell is drawn whose sole output matches
    /// `net_type`; `seq_mod_prob` biases that draw toward non-combinational
    /// cells. The new cell's inputs are then wired avoiding its own
    /// forward cone -- except that `seq_port_prob` may, per input bit,
    /// deliberately route through the *sequential-only* residue of that
    /// cone, since feedback through a registered input cannot close a
    /// combinational cycle. If `limit_to_one`, only the first candidate
    /// net is driven.
    pub fn drive_undriven_nets(
        &mut self,
        seq_mod_prob: f64,
        seq_port_prob: f64,
        limit_to_one: bool,
        net_type: NetType,
    ) -> Result<()> {
        let candidates: Vec<Id> = {
            let mut ids: Vec<Id> = self
                .nets
                .values()
                .filter(|n| n.is_undriven() && n.net_type() == net_type)
                .map(|n| n.id())
                .collect();
            ids.sort_unstable();
            ids
        };

        for net_id in candidates {
            if !self.net(net_id)?.is_undriven() {
                continue;
            }

            let seq_mod = self.rng.gen::<f64>() < seq_mod_prob;
            let spec_name = {
                let filter = |ms: &ModuleSpec| {
                    ms.outputs.len() == 1
                        && ms.outputs[0].net_type == net_type
                        && ms.outputs[0].width == 1
                        && (!seq_mod || !ms.combinational)
                };
                self.library
                    .random(&mut self.rng, Some(&filter))?
                    .name
                    .clone()
            };

            let module = self.instantiate(&spec_name)?;
            self.set_driver(net_id, module, 0, 0)?;

            let full = forward_cone(self, module, false)?;
            let seq_only: HashSet<Id> = {
                let comb = forward_cone(self, module, true)?;
                full.difference(&comb).copied().collect()
            };

            let input_specs: Vec<(usize, usize, NetType)> = {
                let m = self.module(module)?;
                m.inputs()
                    .iter()
                    .enumerate()
                    .map(|(i, p)| (i, p.width(), p.net_type()))
                    .collect()
            };

            for (idx, width, port_type) in input_specs {
                for bit in 0..width {
                    let chosen = if port_type == NetType::Logic {
                        let seq_port = self.rng.gen::<f64>() < seq_port_prob;
                        let same_seq_only: Vec<Id> = if seq_port {
                            let mut v: Vec<Id> = seq_only
                                .iter()
                                .filter(|&&id| {
                                    self.nets
                                        .get(&id)
                                        .map(|n| n.net_type() == port_type)
                                        .unwrap_or(false)
                                })
                                .copied()
                                .collect();
                            v.sort_unstable();
                            v
                        } else {
                            Vec::new()
                        };
                        if !same_seq_only.is_empty() {
                            let i = self.rng.gen_range(0..same_seq_only.len());
                            same_seq_only[i]
                        } else {
                            self.random_net(|n| n.net_type() == port_type && !full.contains(&n.id()))?
                        }
                    } else {
                        self.random_net(|n| n.net_type() == port_type)?
                    };
                    self.add_sink(chosen, module, idx, bit)?;
                }
            }

            if limit_to_one {
                break;
            }
        }
        Ok(())
    }

    /// Attaches a `LOGIC -> EXT_OUT` buffer to every `LOGIC` net that has a
    /// driver but no sinks.
    pub fn buffer_unconnected_outputs(&mut self) -> Result<()> {
        let candidates: Vec<Id> = {
            let mut v: Vec<Id> = self
                .nets
                .values()
                .filter(|n| n.net_type() == NetType::Logic && n.driver().is_some() && n.sinks().is_empty())
                .map(|n| n.id())
                .collect();
            v.sort_unstable();
            v
        };
        for net_id in candidates {
            let buf = self
                .library
                .random_buffer(&mut self.rng, NetType::Logic, NetType::ExtOut)?
                .name
                .clone();
            self.add_buffer(net_id, &buf)?;
        }
        Ok(())
    }

    /// Slices the netlist down to the backward cone of `output_id`, which
    /// must name an `EXT_OUT` net: everything not needed to drive that one
    /// output is deleted. Any net named `"clk"` always survives, so the
    /// emitted module keeps a clock port even when the cone doesn't use it.
    pub fn remove_other_nets(&mut self, output_id: Id) -> Result<()> {
        if self.net(output_id)?.net_type() != NetType::ExtOut {
            return Err(Error::InvalidInput(format!(
                "net {output_id} is not an EXT_OUT net; remove_other_nets requires one"
            )));
        }

        let mut keep_nets: HashSet<Id> = HashSet::new();
        let mut keep_modules: HashSet<Id> = HashSet::new();
        let mut queue: VecDeque<Id> = VecDeque::new();
        keep_nets.insert(output_id);
        queue.push_back(output_id);

        while let Some(net_id) = queue.pop_front() {
            let driver = self.net(net_id)?.driver();
            if let Some(pb) = driver {
                if keep_modules.insert(pb.module) {
                    let m = self.module(pb.module)?;
                    let input_nets: Vec<Id> = m
                        .inputs()
                        .iter()
                        .flat_map(|p| p.nets.iter().filter_map(|&n| n))
                        .collect();
                    for n in input_nets {
                        if keep_nets.insert(n) {
                            queue.push_back(n);
                        }
                    }
                }
            }
        }

        let clk_ids: Vec<Id> = self
            .nets
            .values()
            .filter(|n| n.name() == Some("clk"))
            .map(|n| n.id())
            .collect();
        keep_nets.extend(clk_ids);

        self.modules.retain(|id, _| keep_modules.contains(id));
        self.nets.retain(|id, _| keep_nets.contains(id));
        for net in self.nets.values_mut() {
            net.sinks.retain(|pb| keep_modules.contains(&pb.module));
        }

        let module_ids: Vec<Id> = self.modules.keys().copied().collect();
        for mid in module_ids {
            let out_info: Vec<(usize, usize, NetType, Vec<Option<Id>>)> = {
                let m = &self.modules[&mid];
                m.outputs()
                    .iter()
                    .enumerate()
                    .map(|(i, p)| (i, p.width(), p.net_type(), p.nets.clone()))
                    .collect()
            };
            for (idx, width, net_type, nets) in out_info {
                for bit in 0..width {
                    let alive = nets[bit].map(|n| self.nets.contains_key(&n)).unwrap_or(false);
                    if !alive {
                        let new_net = self.make_net(net_type, None);
                        self.set_driver(new_net, mid, idx, bit)?;
                    }
                }
            }
        }

        self.buffer_unconnected_outputs()
    }

    /// Picks a module uniformly at random among those for which `filter`
    /// returns `true`, detaches and deletes it, and returns its id -- or
    /// `None` if no module matches.
    pub fn remove_random_module(&mut self, filter: impl Fn(&Self, Id) -> bool) -> Result<Option<Id>> {
        let mut ids: Vec<Id> = self.modules.keys().copied().collect();
        ids.sort_unstable();
        let eligible: Vec<Id> = ids.into_iter().filter(|&id| filter(self, id)).collect();
        if eligible.is_empty() {
            return Ok(None);
        }
        let idx = self.rng.gen_range(0..eligible.len());
        let victim = eligible[idx];
        self.delete_module(victim)?;
        Ok(Some(victim))
    }

    /// Detaches and deletes `module`: every input-bit's sink entry is
    /// removed from the net it was bound to, and every output-bit's net
    /// is either deleted (if it had no other sinks) or marked undriven so
    /// a later pass can redrive it.
    pub fn delete_module(&mut self, id: Id) -> Result<()> {
        let module = self.modules.remove(&id).ok_or(Error::ModuleNotFound(id))?;

        for (idx, port) in module.inputs.iter().enumerate() {
            for (bit, net_id) in port.nets.iter().enumerate() {
                if let Some(net_id) = net_id {
                    if let Some(net) = self.nets.get_mut(net_id) {
                        net.sinks.retain(|pb| {
                            !(pb.module == id && pb.port_index == PortIndex::Input(idx) && pb.bit == bit)
                        });
                    }
                }
            }
        }

        for port in module.outputs.iter() {
            for net_id in port.nets.iter().flatten() {
                let drop_net = self
                    .nets
                    .get(net_id)
                    .map(|n| n.sinks().is_empty())
                    .unwrap_or(false);
                if drop_net {
                    self.nets.remove(net_id);
                } else if let Some(net) = self.nets.get_mut(net_id) {
                    net.driver = None;
                }
            }
        }

        Ok(())
    }

    /// Deduplicates `EXT_OUT` nets that buffer the exact same upstream
    /// net: keeps the lowest-id net, drops the rest along with whichever
    /// output buffer became dead as a result.
    pub fn remove_duplicate_outputs(&mut self) -> Result<()> {
        use std::collections::HashMap;
        let mut by_source: HashMap<Id, Vec<Id>> = HashMap::new();
        for net in self.nets.values() {
            if net.net_type() != NetType::ExtOut {
                continue;
            }
            if let Some(driver) = net.driver() {
                if let Some(buf_module) = self.modules.get(&driver.module) {
                    if let Some(source) = buf_module.inputs().first().and_then(|p| p.net_at(0)) {
                        by_source.entry(source).or_default().push(net.id());
                    }
                }
            }
        }

        for (_, mut group) in by_source {
            if group.len() < 2 {
                continue;
            }
            group.sort_unstable();
            for dup_net in &group[1..] {
                let buf_module = self.nets.get(dup_net).and_then(|n| n.driver()).map(|d| d.module);
                self.nets.remove(dup_net);
                if let Some(mid) = buf_module {
                    self.delete_module(mid)?;
                }
            }
        }
        Ok(())
    }

    /// Collapses a dead pass-through chain: an `EXT_IN` net buffered
    /// straight into a `LOGIC` net whose sole consumer is an output buffer
    /// producing `EXT_OUT`. Collapsed only when no other cell observes
    /// the intermediate net (or the `EXT_IN` net itself).
    pub fn remove_input_output_chains(&mut self) -> Result<()> {
        let chains: Vec<(Id, Id, Id, Id, Id)> = {
            let mut v = Vec::new();
            let mut logic_ids: Vec<Id> = self
                .nets
                .values()
                .filter(|n| n.net_type() == NetType::Logic)
                .map(|n| n.id())
                .collect();
            logic_ids.sort_unstable();

            for logic_id in logic_ids {
                let net = &self.nets[&logic_id];
                if net.sinks().len() != 1 {
                    continue;
                }
                let driver = match net.driver() {
                    Some(d) => d,
                    None => continue,
                };
                let ibuf = match self.modules.get(&driver.module) {
                    Some(m) => m,
                    None => continue,
                };
                if ibuf.inputs().len() != 1 || ibuf.outputs().len() != 1 {
                    continue;
                }
                let ext_in_net = match ibuf.inputs()[0].net_at(0) {
                    Some(n) => n,
                    None => continue,
                };
                if self.nets.get(&ext_in_net).map(|n| n.net_type()) != Some(NetType::ExtIn) {
                    continue;
                }
                if self.nets[&ext_in_net].sinks().len() != 1 {
                    continue;
                }

                let sink = net.sinks()[0];
                let obuf = match self.modules.get(&sink.module) {
                    Some(m) => m,
                    None => continue,
                };
                if obuf.inputs().len() != 1 || obuf.outputs().len() != 1 {
                    continue;
                }
                let ext_out_net = match obuf.outputs()[0].net_at(0) {
                    Some(n) => n,
                    None => continue,
                };
                if self.nets.get(&ext_out_net).map(|n| n.net_type()) != Some(NetType::ExtOut) {
                    continue;
                }

                v.push((ext_in_net, driver.module, logic_id, sink.module, ext_out_net));
            }
            v
        };

        for (ext_in, ibuf, logic, obuf, ext_out) in chains {
            if !self.modules.contains_key(&ibuf) || !self.modules.contains_key(&obuf) {
                continue;
            }
            self.modules.remove(&ibuf);
            self.modules.remove(&obuf);
            self.nets.remove(&ext_in);
            self.nets.remove(&logic);
            self.nets.remove(&ext_out);
        }
        Ok(())
    }
}
