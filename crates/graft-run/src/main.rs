//! graft-run
//!
//! Assembles `.gasm` sources, routes their local loads through the mutation
//! hook, executes the result, and dumps the site registry.
//!
//! Usage: `graft-run <files...> [--root DIR] [--arg N] [--mask SLOT=MASK] [--json] [--no-run]`

use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use graft_bytecode::{CodeUnit, Value, execute};
use graft_engine::{Engine, EngineConfig, MaskHook, MutationEnv, StackVm};
use graft_run::asm;

#[derive(Parser, Debug)]
#[command(name = "graft-run")]
#[command(about = "Assemble .gasm units, inject the mutation hook, and run them")]
struct Cli {
    /// .gasm source files to assemble
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Root directory instrumented units must live under
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Call argument for executed units, in parameter order (repeatable).
    /// Missing positions are filled with 1, 2, ...
    #[arg(long = "arg")]
    args: Vec<i64>,

    /// Per-slot XOR mask as SLOT=MASK, mask decimal or 0x-hex (repeatable)
    #[arg(long = "mask", value_parser = parse_mask)]
    masks: Vec<(u64, u64)>,

    /// Emit the site registry as JSON instead of the line dump
    #[arg(long)]
    json: bool,

    /// Assemble and inject only, skip execution
    #[arg(long)]
    no_run: bool,
}

/// Parse a `SLOT=MASK` pair for `--mask`.
fn parse_mask(s: &str) -> Result<(u64, u64), String> {
    let (slot, mask) = s
        .split_once('=')
        .ok_or_else(|| format!("expected SLOT=MASK, got '{s}'"))?;
    let slot = slot
        .trim()
        .parse::<u64>()
        .map_err(|e| format!("bad slot '{slot}': {e}"))?;
    let mask = mask.trim();
    let mask = match mask.strip_prefix("0x").or_else(|| mask.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => mask.parse::<u64>(),
    }
    .map_err(|e| format!("bad mask '{mask}': {e}"))?;
    Ok((slot, mask))
}

/// Call arguments for a unit: given values first, then 1, 2, ... per arity.
fn call_args(unit: &CodeUnit, given: &[i64]) -> Vec<Value> {
    (0..unit.arg_count())
        .map(|i| match given.get(i) {
            Some(v) => Value::Int(*v),
            None => Value::Int(i as i64 + 1),
        })
        .collect()
}

fn fmt_args(args: &[Value]) -> String {
    args.iter()
        .map(Value::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "graft_run=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let root = match cli.root.canonicalize() {
        Ok(p) => p,
        Err(e) => {
            error!("Bad root '{}': {}", cli.root.display(), e);
            process::exit(1);
        }
    };

    let hook = Arc::new(MaskHook::new());
    for (slot, mask) in &cli.masks {
        hook.set_mask(*slot, *mask);
    }
    let engine = Engine::with_hook(StackVm::new(), EngineConfig { root }, hook);

    let mut units: Vec<CodeUnit> = Vec::new();
    for file in &cli.files {
        // Unit paths must be absolute for the scope check against --root.
        let path = match file.canonicalize() {
            Ok(p) => p,
            Err(e) => {
                error!("Cannot resolve '{}': {}", file.display(), e);
                process::exit(1);
            }
        };
        let text = match fs::read_to_string(&path) {
            Ok(t) => t,
            Err(e) => {
                error!("Cannot read '{}': {}", path.display(), e);
                process::exit(1);
            }
        };
        match asm::assemble(&path, &text) {
            Ok(assembled) => {
                info!("Assembled {} unit(s) from {}", assembled.len(), path.display());
                units.extend(assembled);
            }
            Err(e) => {
                error!("{}: {}", path.display(), e);
                process::exit(1);
            }
        }
    }

    let injected: Vec<CodeUnit> = units.iter().map(|unit| engine.inject(unit)).collect();
    info!(
        "Injected {} unit(s), {} site(s) registered",
        injected.len(),
        engine.registry().len()
    );

    if !cli.no_run {
        let env = MutationEnv::new(&engine);
        for unit in &injected {
            if unit.receiver.is_some() {
                info!("Skipping method unit '{}': no receiver to bind", unit.name);
                continue;
            }
            let args = call_args(unit, &cli.args);
            match execute(unit, &args, &env) {
                Ok(value) => println!("{}({}) -> {}", unit.name, fmt_args(&args), value),
                Err(e) => {
                    error!("Unit '{}' failed: {}", unit.name, e);
                    process::exit(1);
                }
            }
        }
    }

    if cli.json {
        match serde_json::to_string_pretty(&engine.registry().snapshot()) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                error!("Cannot serialize registry: {}", e);
                process::exit(1);
            }
        }
    } else {
        engine.dump();
    }
}
