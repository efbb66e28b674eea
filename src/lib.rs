/*!

  A stochastic netlist fuzzer and delta-debugging reducer for
  digital-hardware toolchains.

  [`library`] loads the catalogue of primitive cells a run may
  instantiate. [`netlist`] is the graph itself -- nets, module
  instances, the mutating verbs, forward-cone reachability, JSON
  snapshots, HDL/dot emission, and structural fingerprinting.
  [`commands`] and [`settings`] make up the weighted command layer the
  [`orchestrator`] drives to grow a netlist from nothing, and
  [`reducer`] shrinks one back down against an external interestingness
  test this crate never runs itself.

*/

pub mod commands;
pub mod error;
pub mod library;
pub mod netlist;
pub mod orchestrator;
pub mod reducer;
pub mod settings;
pub mod types;

pub use error::{Error, Result};
pub use library::CellLibrary;
pub use netlist::{GeneratorArtifact, Netlist, NetlistSnapshot};
pub use orchestrator::{GenerationReport, Orchestrator};
pub use reducer::{ExitCode, Reducer, ReducerState};
pub use settings::Settings;
