// Copyright 2025 Cornell University
// released under MIT License

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::bail;
use cfsm_check::diagnostic::DiagnosticHandler;
use cfsm_check::explorer::{Explorer, Outcome};
use cfsm_check::inputs::expand_all;
use cfsm_check::parser::parse_file;
use cfsm_check::trace::{summary, Layout};
use clap::{ColorChoice, Parser};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use log::info;

// $ cargo run -- "tests/*.cfsm"

/// Args for the deadlock checker CLI
#[derive(Parser, Debug)]
#[command(version, about, long_about = None, disable_version_flag = true)]
struct Cli {
    /// Network description files. A `*` in the file name expands to every
    /// matching file of that directory.
    #[arg(required = true, value_name = "CFSM_FILE")]
    files: Vec<PathBuf>,

    /// Users can specify `-v` or `--verbose` to toggle logging
    #[command(flatten)]
    verbosity: Verbosity<WarnLevel>,

    /// To suppress colors in error messages, pass in `--color never`
    /// Otherwise, by default, error messages are displayed w/ ANSI colors
    #[arg(long, value_name = "COLOR_CHOICE", default_value = "auto")]
    color: ColorChoice,
}

/// Loads and analyzes one file. Returns `false` if the file could not be loaded.
fn check(path: &Path, handler: &mut DiagnosticHandler) -> bool {
    println!("====== Reading {}", path.display());
    let Ok(net) = parse_file(path, handler) else {
        return false;
    };
    println!("{}", summary(&net));

    let start = Instant::now();
    let outcome = Explorer::new(&net).run();
    let elapsed = start.elapsed();

    match outcome {
        Outcome::DeadlockFree { states } => println!("Analyzed {states} states"),
        Outcome::Deadlock { state, trace, states } => {
            info!("deadlock after discovering {states} states");
            let layout = Layout::new(&net);
            println!("Found deadlock at {}", layout.global_state(&state));
            if !trace.is_empty() {
                println!("{}", layout.render(&trace));
            }
        }
    }
    println!("Done in {} ms", elapsed.as_millis());
    true
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // For concision, we disable timestamps in the log
    env_logger::Builder::new()
        .format_timestamp(None)
        .filter_level(cli.verbosity.log_level_filter())
        .init();

    let files = expand_all(&cli.files)?;
    let mut handler = DiagnosticHandler::new(cli.color);

    let failed: Vec<&PathBuf> = files
        .iter()
        .filter(|path| !check(path, &mut handler))
        .collect();

    if !failed.is_empty() {
        let names: Vec<String> = failed.iter().map(|p| p.display().to_string()).collect();
        bail!("failed to load {} of {} files: {}", failed.len(), files.len(), names.join(", "));
    }
    Ok(())
}
