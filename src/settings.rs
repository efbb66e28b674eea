/*!

  Orchestrator settings: the command-pick weights and the tunable
  knobs governing how aggressively the generator grows and drives a
  netlist. Carried as TOML so a run's exact configuration can be
  checked in alongside its seed and library for reproduction.

*/

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::commands::Command;
use crate::error::{Error, Result};

/// Mirrors [`Priorities`] with every field optional, so a `[priorities]`
/// table that's present can still be missing individual entries --
/// those are distinguished from the table being absent entirely, which
/// instead falls back to [`Priorities::default`].
#[derive(Debug, Clone, Deserialize)]
struct RawPriorities {
    #[serde(rename = "AddRandomModule")]
    add_random_module: Option<f64>,
    #[serde(rename = "AddExternalNet")]
    add_external_net: Option<f64>,
    #[serde(rename = "AddUndriveNet")]
    add_undrive_net: Option<f64>,
    #[serde(rename = "DriveUndrivenNet")]
    drive_undriven_net: Option<f64>,
    #[serde(rename = "DriveUndrivenNets")]
    drive_undriven_nets: Option<f64>,
    #[serde(rename = "BufferUnconnectedOutputs")]
    buffer_unconnected_outputs: Option<f64>,
}

/// The weight assigned to each of the six command verbs, keyed by
/// command name exactly as written in `[priorities]`. An entry left
/// out of a `[priorities]` table that's otherwise present is logged
/// and treated as a weight of zero -- that command is simply never
/// picked, rather than silently inheriting some other default.
#[derive(Debug, Clone, Serialize)]
pub struct Priorities {
    pub add_random_module: f64,
    pub add_external_net: f64,
    pub add_undrive_net: f64,
    pub drive_undriven_net: f64,
    pub drive_undriven_nets: f64,
    pub buffer_unconnected_outputs: f64,
}

impl<'de> Deserialize<'de> for Priorities {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = RawPriorities::deserialize(deserializer)?;
        let field = |name: &str, value: Option<f64>| -> f64 {
            value.unwrap_or_else(|| {
                warn!(command = name, "priority entry missing, defaulting to 0");
                0.0
            })
        };
        Ok(Priorities {
            add_random_module: field("AddRandomModule", raw.add_random_module),
            add_external_net: field("AddExternalNet", raw.add_external_net),
            add_undrive_net: field("AddUndriveNet", raw.add_undrive_net),
            drive_undriven_net: field("DriveUndrivenNet", raw.drive_undriven_net),
            drive_undriven_nets: field("DriveUndrivenNets", raw.drive_undriven_nets),
            buffer_unconnected_outputs: field("BufferUnconnectedOutputs", raw.buffer_unconnected_outputs),
        })
    }
}

impl Priorities {
    /// The weight of `command`, used by [`crate::commands::pick`].
    pub fn weight(&self, command: Command) -> f64 {
        match command {
            Command::AddRandomModule => self.add_random_module,
            Command::AddExternalNet => self.add_external_net,
            Command::AddUndriveNet => self.add_undrive_net,
            Command::DriveUndrivenNet => self.drive_undriven_net,
            Command::DriveUndrivenNets => self.drive_undriven_nets,
            Command::BufferUnconnectedOutputs => self.buffer_unconnected_outputs,
        }
    }
}

impl Default for Priorities {
    fn default() -> Self {
        Self {
            add_random_module: 1.0,
            add_external_net: 1.0,
            add_undrive_net: 1.0,
            drive_undriven_net: 1.0,
            drive_undriven_nets: 1.0,
            buffer_unconnected_outputs: 1.0,
        }
    }
}

fn default_max_iter() -> u64 {
    1000
}
fn default_stop_iter_lambda() -> f64 {
    50.0
}
fn default_start_input_lambda() -> f64 {
    4.0
}
fn default_start_undriven_lambda() -> f64 {
    2.0
}
fn default_prob_sequential_module() -> f64 {
    0.3
}
fn default_prob_sequential_port() -> f64 {
    0.5
}

/// Tunable knobs for the run, under `[settings]`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Tunables {
    /// Hard ceiling on the number of iterations a single run will attempt,
    /// regardless of the Poisson-drawn stopping point.
    #[serde(default = "default_max_iter")]
    pub max_iter: u64,
    /// Mean of the Poisson distribution the orchestrator draws its actual
    /// iteration count from, capped at `max_iter`.
    #[serde(default = "default_stop_iter_lambda")]
    pub stop_iter_lambda: f64,
    /// Mean of the Poisson distribution used to size the initial batch of
    /// extra `EXT_IN` nets.
    #[serde(default = "default_start_input_lambda")]
    pub start_input_lambda: f64,
    /// Mean of the Poisson distribution used to size the initial batch of
    /// undriven `LOGIC` nets.
    #[serde(default = "default_start_undriven_lambda")]
    pub start_undriven_lambda: f64,
    /// Probability that `DriveUndrivenNet(s)` draws a non-combinational
    /// cell to drive the net.
    #[serde(default = "default_prob_sequential_module")]
    pub prob_sequential_module: f64,
    /// Probability that, per input bit of a newly-driven cell, the wiring
    /// is drawn from the driven net's sequential-only cone residue rather
    /// than from outside its forward cone entirely.
    #[serde(default = "default_prob_sequential_port")]
    pub prob_sequential_port: f64,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            max_iter: default_max_iter(),
            stop_iter_lambda: default_stop_iter_lambda(),
            start_input_lambda: default_start_input_lambda(),
            start_undriven_lambda: default_start_undriven_lambda(),
            prob_sequential_module: default_prob_sequential_module(),
            prob_sequential_port: default_prob_sequential_port(),
        }
    }
}

/// The full settings document: `[priorities]` plus `[settings]`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub priorities: Priorities,
    #[serde(default)]
    pub settings: Tunables,
}

impl Settings {
    /// Parses a settings document from its in-memory TOML text.
    pub fn from_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Parse(e.to_string()))
    }

    /// Loads and parses a settings file from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let settings = Settings::from_str("").unwrap();
        assert_eq!(settings.settings.max_iter, 1000);
        assert_eq!(settings.priorities.add_random_module, 1.0);
    }

    #[test]
    fn partial_overrides_keep_remaining_defaults() {
        let settings = Settings::from_str(
            r#"
            [priorities]
            AddRandomModule = 5.0
            BufferUnconnectedOutputs = 0.1

            [settings]
            max_iter = 200
            "#,
        )
        .unwrap();
        assert_eq!(settings.priorities.add_random_module, 5.0);
        assert_eq!(settings.priorities.buffer_unconnected_outputs, 0.1);
        assert_eq!(settings.priorities.add_external_net, 0.0);
        assert_eq!(settings.settings.max_iter, 200);
        assert_eq!(settings.settings.stop_iter_lambda, 50.0);
    }
}
