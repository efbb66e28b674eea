/*!

  The command layer: the six mutating verbs the orchestrator draws from
  on every iteration, and the weighted pick over them.

*/

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

use crate::error::{Error, Result};
use crate::netlist::Netlist;
use crate::settings::Settings;
use crate::types::NetType;

/// One of the six mutations the orchestrator may apply on a given
/// iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Instantiates a random library cell and wires it randomly.
    AddRandomModule,
    /// Adds one more buffered `EXT_IN` net.
    AddExternalNet,
    /// Adds one floating, undriven `LOGIC` net.
    AddUndriveNet,
    /// Drives at most one undriven `LOGIC` net with a freshly-instantiated
    /// cell.
    DriveUndrivenNet,
    /// Drives every currently undriven `LOGIC` net, each with its own
    /// freshly-instantiated cell.
    DriveUndrivenNets,
    /// Attaches an output buffer to every driven, sink-free `LOGIC` net.
    BufferUnconnectedOutputs,
}

impl Command {
    /// All six verbs, in a fixed order used for weighted sampling.
    pub const ALL: [Command; 6] = [
        Command::AddRandomModule,
        Command::AddExternalNet,
        Command::AddUndriveNet,
        Command::DriveUndrivenNet,
        Command::DriveUndrivenNets,
        Command::BufferUnconnectedOutputs,
    ];

    /// The name used as its `[priorities]` key and in run logs.
    pub fn name(self) -> &'static str {
        match self {
            Command::AddRandomModule => "AddRandomModule",
            Command::AddExternalNet => "AddExternalNet",
            Command::AddUndriveNet => "AddUndriveNet",
            Command::DriveUndrivenNet => "DriveUndrivenNet",
            Command::DriveUndrivenNets => "DriveUndrivenNets",
            Command::BufferUnconnectedOutputs => "BufferUnconnectedOutputs",
        }
    }

    /// Applies this command to `netlist`, drawing whatever extra
    /// randomness it needs from `netlist`'s own engine and whatever
    /// tunables it needs from `settings`.
    pub fn apply<R: Rng>(self, netlist: &mut Netlist<R>, settings: &Settings) -> Result<()> {
        match self {
            Command::AddRandomModule => {
                netlist.add_random_module()?;
            }
            Command::AddExternalNet => netlist.add_external_nets(1)?,
            Command::AddUndriveNet => netlist.add_undriven_nets(NetType::Logic, 1),
            Command::DriveUndrivenNet => netlist.drive_undriven_nets(
                settings.settings.prob_sequential_module,
                settings.settings.prob_sequential_port,
                true,
                NetType::Logic,
            )?,
            Command::DriveUndrivenNets => netlist.drive_undriven_nets(
                settings.settings.prob_sequential_module,
                settings.settings.prob_sequential_port,
                false,
                NetType::Logic,
            )?,
            Command::BufferUnconnectedOutputs => netlist.buffer_unconnected_outputs()?,
        }
        Ok(())
    }
}

/// Draws one [`Command`] by weighted-random pick over
/// [`crate::settings::Priorities`].
pub fn pick<R: Rng + ?Sized>(rng: &mut R, priorities: &crate::settings::Priorities) -> Result<Command> {
    let weights: Vec<f64> = Command::ALL.iter().map(|c| priorities.weight(*c)).collect();
    let dist = WeightedIndex::new(&weights)
        .map_err(|e| Error::NoCandidate(format!("command priorities are invalid: {e}")))?;
    Ok(Command::ALL[dist.sample(rng)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Priorities;
    use rand::rngs::mock::StepRng;

    #[test]
    fn zero_weight_command_is_never_picked() {
        let mut priorities = Priorities::default();
        priorities.add_random_module = 0.0;
        let mut rng = StepRng::new(0, 1 << 20);
        for _ in 0..32 {
            let cmd = pick(&mut rng, &priorities).unwrap();
            assert_ne!(cmd, Command::AddRandomModule);
        }
    }
}
