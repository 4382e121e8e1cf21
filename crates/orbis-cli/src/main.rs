//! Operator tooling for the simulation kernel.
//!
//! `orbis verify` runs the dual-world determinism check and exits non-zero
//! with one line per diverging tick. `orbis save` replays a script and
//! writes the resulting snapshot; `orbis load` validates a snapshot and
//! optionally continues it.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use orbis_core::config::SimConfig;
use orbis_engine::persist;
use orbis_engine::verify::{self, CommandScript};

#[derive(Parser)]
#[command(
    name = "orbis",
    about = "Deterministic simulation kernel tools: verify, save, load",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a command script through two independent worlds and compare
    /// per-tick state hashes.
    Verify {
        /// World RNG seed shared by both runs.
        #[arg(long)]
        seed: u32,
        /// Number of ticks to simulate.
        #[arg(long)]
        ticks: u64,
        /// Command script file (JSON). Omit for an input-free run.
        #[arg(long)]
        script: Option<PathBuf>,
    },
    /// Replay a script for N ticks and write the snapshot envelope.
    Save {
        #[arg(long)]
        seed: u32,
        #[arg(long)]
        ticks: u64,
        #[arg(long)]
        script: Option<PathBuf>,
        /// Output snapshot file.
        #[arg(long)]
        out: PathBuf,
    },
    /// Validate a snapshot envelope and optionally continue it.
    Load {
        /// Input snapshot file.
        #[arg(long = "in")]
        input: PathBuf,
        /// Extra ticks to run after restoring (input-free).
        #[arg(long, default_value_t = 0)]
        ticks: u64,
    },
}

fn read_script(path: Option<&PathBuf>) -> anyhow::Result<CommandScript> {
    match path {
        None => Ok(CommandScript::default()),
        Some(path) => {
            let json = fs::read_to_string(path)
                .with_context(|| format!("cannot read script {}", path.display()))?;
            CommandScript::from_json(&json)
        }
    }
}

fn cmd_verify(seed: u32, ticks: u64, script: Option<PathBuf>) -> anyhow::Result<ExitCode> {
    let script = read_script(script.as_ref())?;
    let report = verify::run_dual(seed, &script, ticks)?;
    if report.is_certificate() {
        println!(
            "determinism certificate: seed {seed}, {ticks} ticks, final hash {}",
            report.final_hash.as_deref().unwrap_or("<none>")
        );
        Ok(ExitCode::SUCCESS)
    } else {
        for d in &report.divergences {
            println!("tick {}: {} != {}", d.tick, d.hash_a, d.hash_b);
        }
        eprintln!(
            "determinism violation: {} of {ticks} ticks diverged",
            report.divergences.len()
        );
        Ok(ExitCode::FAILURE)
    }
}

fn cmd_save(seed: u32, ticks: u64, script: Option<PathBuf>, out: PathBuf) -> anyhow::Result<ExitCode> {
    let script = read_script(script.as_ref())?;
    let mut session = verify::harness_session(seed)?;
    for tick in 1..=ticks {
        for entry in script.entries.iter().filter(|e| e.tick == tick) {
            verify::issue_op(&mut session, &entry.op)?;
        }
        session.run_tick();
    }

    let config = SimConfig {
        rng_seed: seed,
        ..Default::default()
    };
    let bytes = persist::save(session.world(), &config)?;
    fs::write(&out, &bytes).with_context(|| format!("cannot write {}", out.display()))?;
    println!(
        "saved tick {} ({} units, hash {}) to {}",
        session.world().tick(),
        session.world().unit_count(),
        session.hash(),
        out.display()
    );
    Ok(ExitCode::SUCCESS)
}

fn cmd_load(input: PathBuf, ticks: u64) -> anyhow::Result<ExitCode> {
    let bytes =
        fs::read(&input).with_context(|| format!("cannot read {}", input.display()))?;
    let envelope = persist::load(&bytes)?;

    let mut session = verify::harness_session(envelope.metadata.seed)?;
    envelope.restore_into(session.world_mut());
    println!(
        "loaded snapshot v{}: tick {}, {} units, hash {}",
        envelope.version,
        session.world().tick(),
        session.world().unit_count(),
        session.hash()
    );

    for _ in 0..ticks {
        session.run_tick();
    }
    if ticks > 0 {
        println!(
            "continued to tick {} (hash {})",
            session.world().tick(),
            session.hash()
        );
    }
    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Verify { seed, ticks, script } => cmd_verify(seed, ticks, script),
        Commands::Save {
            seed,
            ticks,
            script,
            out,
        } => cmd_save(seed, ticks, script, out),
        Commands::Load { input, ticks } => cmd_load(input, ticks),
    };
    match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
