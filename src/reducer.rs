/*!

  The delta-debugging reducer: shrinks a netlist toward a minimal one
  that still reproduces whatever external interestingness test the
  caller is driving -- this crate never runs that test itself, since
  the actual hardware toolchain under test is out of scope here.

  [`Reducer::reduce`] is the whole interface: one call per external
  test run. The caller persists [`ReducerState`] between calls (it
  holds both the current best netlist and the standing, not-yet-judged
  one) and tells each call whether the *previous* candidate turned out
  interesting. A candidate's structural fingerprint is recorded in an
  append-only [`HashLedger`] so a cut identical in shape to one already
  tried is recognized without spending another external test run on it.

*/

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::library::CellLibrary;
use crate::netlist::fingerprint::fingerprint;
use crate::netlist::{Netlist, NetlistSnapshot};
use crate::types::Id;

/// Process exit codes, fixed so a shell driver can branch on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// A candidate was produced (either the initial slice, or one
    /// fewer module than before); `new` holds it.
    Success = 0,
    /// Reserved for the generic "unhandled fault" path; `reduce` itself
    /// never returns this, only the process wrapper around it.
    Failure = 1,
    /// No module was left to remove, and the resulting fingerprint was
    /// already in the ledger.
    AlreadySeen = 2,
    /// No module was left to remove, and its fingerprint is genuinely
    /// new -- this generation has bottomed out.
    NewHashAdded = 3,
}

impl ExitCode {
    /// The process exit status to return for this code.
    pub fn code(self) -> i32 {
        self as i32
    }
}

/// The reducer's persisted state: the last-accepted netlist (`old`),
/// the standing candidate (`new`), and the set of module ids already
/// tried for removal this generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReducerState {
    pub iterations: u64,
    pub new: NetlistSnapshot,
    pub old: NetlistSnapshot,
    pub tried_to_remove_net_ids: HashSet<Id>,
}

impl ReducerState {
    /// Starts a fresh reduction from `seed`: both `new` and `old` begin
    /// identical to it, since the first call copies `new` into `old`
    /// before doing anything else.
    pub fn fresh(seed: NetlistSnapshot) -> Self {
        Self {
            iterations: 0,
            old: seed.clone(),
            new: seed,
            tried_to_remove_net_ids: HashSet::new(),
        }
    }

    /// Loads a state document from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(Error::from)
    }

    /// Persists the state document to disk as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text)?;
        Ok(())
    }
}

/// An append-only set of structural fingerprints, one per line.
pub struct HashLedger {
    path: PathBuf,
    seen: HashSet<String>,
}

impl HashLedger {
    /// Loads the ledger at `path`, or starts an empty one if it doesn't
    /// exist yet.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let seen = match fs::read_to_string(&path) {
            Ok(text) => text.lines().map(str::to_string).collect(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashSet::new(),
            Err(e) => return Err(Error::Io(e)),
        };
        Ok(Self { path, seen })
    }

    /// Returns `true` if `hash` is already recorded.
    pub fn contains(&self, hash: &str) -> bool {
        self.seen.contains(hash)
    }

    /// Records `hash` if it isn't already present, appending a line to
    /// the on-disk ledger. Returns `true` if it was new.
    pub fn insert(&mut self, hash: &str) -> Result<bool> {
        if self.seen.contains(hash) {
            return Ok(false);
        }
        self.seen.insert(hash.to_string());
        let mut text = fs::read_to_string(&self.path).unwrap_or_default();
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(hash);
        text.push('\n');
        fs::write(&self.path, text)?;
        Ok(true)
    }
}

/// Drives one reduction generation against a borrowed library.
pub struct Reducer<'lib> {
    library: &'lib CellLibrary,
}

impl<'lib> Reducer<'lib> {
    /// Creates a reducer over `library`.
    pub fn new(library: &'lib CellLibrary) -> Self {
        Self { library }
    }

    /// Runs one reduction step.
    ///
    /// On the very first call (`state.iterations == 0`) `new` is
    /// copied into `old` to establish the baseline. If `output_id` is
    /// given and this is that first call, the whole graph is sliced
    /// down to the backward cone of that one `EXT_OUT` net
    /// ([`crate::netlist::Netlist::remove_other_nets`]) and returned as
    /// the candidate -- this is a one-time setup step, not part of the
    /// per-module loop.
    ///
    /// Otherwise: if the caller's last candidate was interesting
    /// (`last_success`), it's adopted as the new baseline; if not, the
    /// baseline is left untouched and the graph reverts to it. One
    /// module not yet in `tried_to_remove_net_ids`, and not a buffer,
    /// is removed at random. If none remains, the baseline has
    /// bottomed out for this generation: its fingerprint is checked
    /// against `ledger`, returning [`ExitCode::AlreadySeen`] or
    /// [`ExitCode::NewHashAdded`]. Otherwise the removed module's id is
    /// recorded as tried, duplicate output buffers and input/output
    /// pass-through chains are cleaned up, and the result becomes the
    /// new candidate.
    pub fn reduce(
        &self,
        state: &mut ReducerState,
        ledger: &mut HashLedger,
        output_id: Option<Id>,
        last_success: bool,
        rng_seed: u64,
    ) -> Result<ExitCode> {
        let first_iteration = state.iterations == 0;
        state.iterations += 1;

        if first_iteration {
            state.old = state.new.clone();
        }

        if let Some(output_id) = output_id {
            if first_iteration {
                let rng = StdRng::seed_from_u64(rng_seed);
                let mut nl = Netlist::from_snapshot(self.library, &state.new, rng)?;
                nl.remove_other_nets(output_id)?;
                nl.verify(true)?;
                state.new = nl.to_snapshot();
                return Ok(ExitCode::Success);
            }
        }

        if last_success {
            state.old = state.new.clone();
        }

        let rng = StdRng::seed_from_u64(rng_seed ^ state.iterations);
        let mut nl = Netlist::from_snapshot(self.library, &state.old, rng)?;

        let tried = state.tried_to_remove_net_ids.clone();
        let removed = nl.remove_random_module(|nl, id| !tried.contains(&id) && !nl.is_buffer(id).unwrap_or(false))?;

        match removed {
            None => {
                let hash = fingerprint(&nl);
                if ledger.insert(&hash)? {
                    Ok(ExitCode::NewHashAdded)
                } else {
                    Ok(ExitCode::AlreadySeen)
                }
            }
            Some(id) => {
                state.tried_to_remove_net_ids.insert(id);
                nl.remove_duplicate_outputs()?;
                nl.remove_input_output_chains()?;
                nl.verify(true)?;
                state.new = nl.to_snapshot();
                Ok(ExitCode::Success)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netlist::Netlist;
    use crate::types::NetType;
    use rand::rngs::StdRng;

    const LIB: &str = r#"
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

    fn seed_netlist(lib: &CellLibrary) -> (NetlistSnapshot, Id) {
        let rng = StdRng::seed_from_u64(1);
        let mut nl = Netlist::new(lib, rng);
        nl.add_initial_nets().unwrap();

        let in1 = nl.make_net(NetType::ExtIn, None);
        let ibuf1 = nl.instantiate("IBUF").unwrap();
        nl.add_sink(in1, ibuf1, 0, 0).unwrap();
        let a = nl.make_net(NetType::Logic, None);
        nl.set_driver(a, ibuf1, 0, 0).unwrap();

        let in2 = nl.make_net(NetType::ExtIn, None);
        let ibuf2 = nl.instantiate("IBUF").unwrap();
        nl.add_sink(in2, ibuf2, 0, 0).unwrap();
        let b = nl.make_net(NetType::Logic, None);
        nl.set_driver(b, ibuf2, 0, 0).unwrap();

        let and = nl.instantiate("AND").unwrap();
        nl.add_sink(a, and, 0, 0).unwrap();
        nl.add_sink(b, and, 1, 0).unwrap();
        let y = nl.make_net(NetType::Logic, None);
        nl.set_driver(y, and, 0, 0).unwrap();

        let obuf = nl.instantiate("OBUF").unwrap();
        nl.add_sink(y, obuf, 0, 0).unwrap();
        let out = nl.make_net(NetType::ExtOut, None);
        nl.set_driver(out, obuf, 0, 0).unwrap();

        nl.verify(true).unwrap();
        (nl.to_snapshot(), out)
    }

    #[test]
    fn first_call_with_output_id_slices_and_leaves_old_as_backup() {
        let lib = CellLibrary::from_str(LIB).unwrap();
        let (seed, out) = seed_netlist(&lib);
        let before_nets = seed.nets.len();
        let mut state = ReducerState::fresh(seed);
        let mut ledger = HashLedger { path: PathBuf::from("/dev/null"), seen: HashSet::new() };
        let reducer = Reducer::new(&lib);

        let exit = reducer.reduce(&mut state, &mut ledger, Some(out), false, 1).unwrap();
        assert_eq!(exit, ExitCode::Success);
        assert_eq!(state.iterations, 1);
        assert_eq!(state.old.nets.len(), before_nets);
        assert!(state.new.nets.len() <= before_nets);
    }

    #[test]
    fn rejecting_a_candidate_keeps_the_same_baseline_on_retry() {
        let lib = CellLibrary::from_str(LIB).unwrap();
        let (seed, _) = seed_netlist(&lib);
        let mut state = ReducerState::fresh(seed);
        let mut ledger = HashLedger { path: PathBuf::from("/dev/null"), seen: HashSet::new() };
        let reducer = Reducer::new(&lib);

        reducer.reduce(&mut state, &mut ledger, None, false, 7).unwrap();
        let old_after_first = state.old.clone();
        reducer.reduce(&mut state, &mut ledger, None, false, 7).unwrap();
        assert_eq!(state.old.nets.len(), old_after_first.nets.len());
        assert_eq!(state.old.modules.len(), old_after_first.modules.len());
    }

    #[test]
    fn accepting_a_candidate_adopts_it_as_the_new_baseline() {
        let lib = CellLibrary::from_str(LIB).unwrap();
        let (seed, _) = seed_netlist(&lib);
        let mut state = ReducerState::fresh(seed);
        let mut ledger = HashLedger { path: PathBuf::from("/dev/null"), seen: HashSet::new() };
        let reducer = Reducer::new(&lib);

        reducer.reduce(&mut state, &mut ledger, None, false, 7).unwrap();
        let candidate_modules = state.new.modules.len();
        reducer.reduce(&mut state, &mut ledger, None, true, 7).unwrap();
        assert_eq!(state.old.modules.len(), candidate_modules);
    }

    #[test]
    fn bottoming_out_reports_novelty_then_already_seen() {
        let lib = CellLibrary::from_str(LIB).unwrap();
        let rng = StdRng::seed_from_u64(1);
        let mut nl = Netlist::new(&lib, rng);
        nl.add_initial_nets().unwrap();
        nl.verify(true).unwrap();
        let seed = nl.to_snapshot();

        let mut state = ReducerState::fresh(seed.clone());
        let mut ledger = HashLedger { path: PathBuf::from("/dev/null"), seen: HashSet::new() };
        let reducer = Reducer::new(&lib);

        let exit = reducer.reduce(&mut state, &mut ledger, None, false, 3).unwrap();
        assert_eq!(exit, ExitCode::NewHashAdded);

        let mut state2 = ReducerState::fresh(seed);
        let exit2 = reducer.reduce(&mut state2, &mut ledger, None, false, 3).unwrap();
        assert_eq!(exit2, ExitCode::AlreadySeen);
    }
}
