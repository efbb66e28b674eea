/*!

  `fuznet`: generate random netlists and drive a delta-debugging
  reduction over a failing one, from the command line.

*/

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use netfuzz::library::CellLibrary;
use netfuzz::netlist::{emit, GeneratorArtifact, NetlistSnapshot};
use netfuzz::orchestrator::{GenerationReport, Orchestrator};
use netfuzz::reducer::{HashLedger, Reducer, ReducerState};
use netfuzz::settings::Settings;
use netfuzz::Result;

#[derive(Parser)]
#[command(name = "fuznet", version, about = "A stochastic netlist fuzzer and delta-debugging reducer")]
struct Cli {
    /// Path to the cell-library TOML file.
    #[arg(short = 'l', long)]
    lib: PathBuf,
    /// The seed driving every random decision this run makes.
    #[arg(short = 's', long)]
    seed: u64,
    /// Increases log verbosity; repeatable.
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
    /// Emit machine-readable JSON stats alongside the usual artifacts.
    #[arg(short = 'j', long)]
    json: bool,
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Generates a random netlist and writes its artifacts.
    Generate {
        /// Emit a `.dot` snapshot after every iteration, alongside the
        /// final artifacts.
        #[arg(short = 'a', long)]
        animate: bool,
        /// Path to the orchestrator settings TOML file; defaults are
        /// used if omitted.
        #[arg(short = 'c', long)]
        config: Option<PathBuf>,
        /// Path prefix the generated artifacts are written under:
        /// `<output>.v`, `<output>.json`, and (with `--json`)
        /// `<output>_stats.json`.
        #[arg(short = 'o', long)]
        output: PathBuf,
    },
    /// Runs one delta-debugging reduction step against a persisted
    /// state document.
    Reduce {
        /// Path to the reducer's state document, or a generator's
        /// `<prefix>.json` artifact to start a fresh reduction from.
        #[arg(short = 'i', long)]
        input: PathBuf,
        /// Path to the append-only structural-fingerprint ledger.
        #[arg(long = "hash-file")]
        hash_file: PathBuf,
        /// Where the updated state document is written; defaults to
        /// overwriting `--input`.
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,
        /// On the first call only, slice the netlist down to the
        /// backward cone of this one `EXT_OUT` net id before entering
        /// the per-module reduction loop.
        #[arg(short = 'r', long = "keep-only")]
        keep_only: Option<u64>,
        /// Whether the external test judged the previous candidate
        /// (the standing `new` from the last call) interesting.
        #[arg(long = "last-success")]
        last_success: bool,
    },
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn run(cli: Cli) -> Result<i32> {
    let library = CellLibrary::load(&cli.lib)?;

    match cli.command {
        Cmd::Generate { animate, config, output } => {
            let settings = match config {
                Some(path) => Settings::load(path)?,
                None => Settings::default(),
            };
            let orch = Orchestrator::new(&library, settings.clone());

            let mut frames: Vec<(usize, String)> = Vec::new();
            let netlist = orch.run_with_frames(cli.seed, |i, is_final, nl| {
                if animate || is_final {
                    frames.push((i, emit::emit_dot(nl, &format!("iter{i}"))));
                }
            })?;

            if let Some(parent) = output.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }

            let module_name = output
                .file_name()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "top".to_string());

            let artifact = GeneratorArtifact { new: netlist.to_snapshot() };
            std::fs::write(
                format!("{}.json", output.display()),
                serde_json::to_string_pretty(&artifact)?,
            )?;
            std::fs::write(
                format!("{}.v", output.display()),
                emit::emit_verilog(&netlist, &module_name),
            )?;

            for (i, dot) in &frames {
                std::fs::write(format!("{}_iter{i}.dot", output.display()), dot)?;
            }

            if cli.json {
                let report = GenerationReport { settings: &settings, stats: netlist.stats() };
                std::fs::write(
                    format!("{}_stats.json", output.display()),
                    serde_json::to_string_pretty(&report)?,
                )?;
            }

            tracing::info!(output = %output.display(), "wrote generated netlist artifacts");
            Ok(0)
        }

        Cmd::Reduce { input, hash_file, output, keep_only, last_success } => {
            let mut state = match ReducerState::load(&input) {
                Ok(state) => state,
                Err(_) => {
                    let text = std::fs::read_to_string(&input)?;
                    let seed: NetlistSnapshot = match serde_json::from_str::<GeneratorArtifact>(&text) {
                        Ok(artifact) => artifact.new,
                        Err(_) => serde_json::from_str(&text)?,
                    };
                    ReducerState::fresh(seed)
                }
            };

            let mut ledger = HashLedger::load(&hash_file)?;
            let reducer = Reducer::new(&library);
            let exit = reducer.reduce(&mut state, &mut ledger, keep_only, last_success, cli.seed)?;

            let out_path = output.unwrap_or(input);
            state.save(&out_path)?;
            tracing::info!(?exit, iterations = state.iterations, "reduce step finished");
            Ok(exit.code())
        }
    }
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match run(cli) {
        Ok(code) => std::process::ExitCode::from(code as u8),
        Err(e) => {
            tracing::error!(error = %e, "fuznet failed");
            eprintln!("Error: {e}");
            std::process::ExitCode::FAILURE
        }
    }
}
