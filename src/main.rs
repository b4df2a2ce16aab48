use std::{fs, path::PathBuf};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use log::info;
use obstacle_groups::{
    BuildConfig, ExpansionReport, GroupDefinitionMgr, ObstacleId, ObstacleType,
    world_file::LoadedWorld,
};
use owo_colors::OwoColorize;

/// Builds obstacle worlds from grouped descriptions
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Expand a world description and optionally write the packed world
    Build {
        world: PathBuf,
        /// TOML build config; defaults apply otherwise
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Print the expanded obstacles
        #[arg(long, conflicts_with = "grouped")]
        flat: bool,
        /// Print the definitions as authored
        #[arg(long)]
        grouped: bool,
        /// Fail on missing or cyclic group references
        #[arg(long)]
        strict: bool,
    },
    /// Summarize a packed world
    Inspect {
        file: PathBuf,
        /// Print one obstacle by id (decimal or 0x-prefixed hex)
        #[arg(long, value_parser = parse_id)]
        id: Option<u32>,
    },
    /// Report every missing or cyclic group reference in a description
    Check { world: PathBuf },
}

fn parse_id(s: &str) -> Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("{s:?} is not an obstacle id: {e}"))
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let level = if args.verbose { "debug" } else { "info" };
    env_logger::init_from_env(env_logger::Env::default().default_filter_or(level));

    match args.command {
        Command::Build { world, config, out, flat, grouped, strict } => {
            let mut cfg = match config {
                Some(path) => BuildConfig::load(path)?,
                None => BuildConfig::default(),
            };
            cfg.strict_references |= strict;

            let mut loaded = LoadedWorld::load(&world)?;
            let report = loaded
                .groups
                .build(&cfg)
                .with_context(|| format!("failed to build {}", world.display()))?;
            print_report(&report);

            if flat {
                let mut s = String::new();
                loaded.groups.get_world().print_flat_file(&mut s, "")?;
                print!("{s}");
            } else if grouped {
                let mut s = String::new();
                loaded.groups.print(&mut s, "")?;
                print!("{s}");
            }

            if let Some(out) = out {
                let bytes = loaded.groups.pack();
                fs::write(&out, &bytes)
                    .with_context(|| format!("failed to write {}", out.display()))?;
                info!("Wrote {} bytes to {}", bytes.len(), out.display());
            }
        }
        Command::Inspect { file, id } => {
            let bytes = fs::read(&file).with_context(|| format!("failed to read {}", file.display()))?;
            let mgr = GroupDefinitionMgr::unpack(&bytes)
                .with_context(|| format!("{} is not a packed world", file.display()))?;

            match id {
                Some(raw) => {
                    let Some(obs) = mgr.get_obstacle_from_id(raw) else {
                        bail!("no obstacle with id {raw:#010x}");
                    };
                    if let Some(id) = ObstacleId::from_raw(raw) {
                        println!("{}", id.bold());
                    }
                    let mut s = String::new();
                    obs.print(&mut s, "")?;
                    print!("{s}");
                }
                None => {
                    for kind in enum_iterator::all::<ObstacleType>() {
                        let n = mgr.get_world().get_list(kind).len();
                        if n > 0 {
                            println!("{:>12} {n}", kind.cyan());
                        }
                    }
                    let names: Vec<_> = mgr.group_defs().iter().map(|d| d.get_name()).collect();
                    println!("{} templates: {}", names.len().bold(), names.join(", "));
                }
            }
        }
        Command::Check { world } => {
            let loaded = LoadedWorld::load(&world)?;
            let problems = loaded.groups.reference_problems();
            for problem in &problems {
                println!("{} {problem}", "error:".red().bold());
            }
            if !problems.is_empty() {
                bail!("{} reference problems in {}", problems.len(), world.display());
            }
            println!("{} {}", "ok".green().bold(), world.display());
        }
    }
    Ok(())
}

fn print_report(report: &ExpansionReport) {
    if report.is_clean() {
        println!("{} {report}", "built".green().bold());
    } else {
        println!("{} {report}", "built with problems".yellow().bold());
    }
}
