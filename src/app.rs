//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments and starts logging
//! - builds the validated optimizer config and the simulated instrument
//! - runs optimizations (once or in tracking mode)
//! - prints summaries/plots and writes optional exports

use std::path::Path;

use clap::Parser;
use flexi_logger::{Cleanup, Criterion, Duplicate, FileSpec, Logger, LoggerHandle, Naming};
use log::info;

use crate::cli::{Command, HistoryArgs, KeyWatcher, RunArgs, ShowArgs, TrackArgs};
use crate::domain::{Axis, OptimizationRun};
use crate::error::{AppError, EXIT_INTERNAL};
use crate::instrument::{Instrument, SimulatedConfocal};
use crate::io::{PositionHistory, read_run_json, write_run_json, write_scan_csv};
use crate::optimize::{CancelFlag, ReoptimizeTrigger, RunControl, Uninterrupted};

pub mod pipeline;

const SUBCOMMANDS: [&str; 4] = ["run", "track", "show", "history"];

/// Entry point for the `optimize` binary.
pub fn run() -> Result<(), AppError> {
    // `optimize` and `optimize --range-x 0.2` behave like `optimize run ...`.
    let argv = rewrite_args(std::env::args().collect());
    let cli = crate::cli::Cli::parse_from(argv);

    let _logger = setup_logging(&cli.log_level, &cli.log_dir)?;

    match cli.command {
        Command::Run(args) => handle_run(args),
        Command::Track(args) => handle_track(args),
        Command::Show(args) => handle_show(args),
        Command::History(args) => handle_history(args),
    }
}

/// Log to rotating files under `dir`; warnings and errors also go to stderr.
fn setup_logging(level: &str, dir: &Path) -> Result<LoggerHandle, AppError> {
    Logger::try_with_str(level)
        .map_err(|e| AppError::config(format!("Invalid log level '{level}': {e}")))?
        .log_to_file(FileSpec::default().directory(dir))
        .duplicate_to_stderr(Duplicate::Warn)
        .rotate(
            Criterion::Size(1024 * 1024),
            Naming::Timestamps,
            Cleanup::KeepLogFiles(5),
        )
        .start()
        .map_err(|e| AppError::new(EXIT_INTERNAL, format!("Logger initialization failed: {e}")))
}

fn handle_run(args: RunArgs) -> Result<(), AppError> {
    let config = pipeline::load_config(&args.settings)?;
    let mut instrument = SimulatedConfocal::new(pipeline::simulation_config(&args.sim)?);

    let run = if args.watch_keys {
        println!("Optimizing... press q or Esc to cancel.");
        let mut watcher = KeyWatcher::new(CancelFlag::new())?;
        pipeline::run_optimization(&config, &mut instrument, &mut watcher)?
    } else {
        pipeline::run_optimization(&config, &mut instrument, &mut Uninterrupted)?
    };

    println!("{}", crate::report::format_run_summary(&run, &config));

    if args.plot && !args.no_plot && !run.outcomes.is_empty() {
        println!("{}", crate::plot::render_run_plots(&run, args.width, args.height));
    }

    if let Some(path) = &args.export_run {
        write_run_json(path, &run, &config)?;
        info!("run written to {}", path.display());
    }
    if let Some(path) = &args.export_scan {
        write_scan_csv(path, &run)?;
        info!("scan data written to {}", path.display());
    }
    if let Some(path) = &args.history {
        append_history(path, &run)?;
    }

    Ok(())
}

fn handle_track(args: TrackArgs) -> Result<(), AppError> {
    let config = pipeline::load_config(&args.settings)?;
    let mut instrument = SimulatedConfocal::new(pipeline::simulation_config(&args.sim)?);
    let mut trigger = ReoptimizeTrigger::from_config(&config);
    let mut history = match &args.history {
        Some(path) => PositionHistory::load_or_default(path)?,
        None => PositionHistory::new(),
    };

    if args.watch_keys {
        println!("Tracking... press q or Esc to stop.");
    }
    let mut control: Box<dyn RunControl> = if args.watch_keys {
        Box::new(KeyWatcher::new(CancelFlag::new())?)
    } else {
        Box::new(Uninterrupted)
    };

    instrument.prepare_acquisition(config.count_time())?;

    // Raw mode may be active; lines end in "\r\n".
    for cycle in 1..=args.cycles {
        if control.cancelled() {
            print!("stopped before cycle {cycle}\r\n");
            break;
        }

        let count = instrument.acquire_count()?;
        if !trigger.should_reoptimize(count) {
            print!(
                "cycle {cycle:>3}: counts={count} >= threshold {:.1}, position kept\r\n",
                trigger.threshold().unwrap_or(0.0)
            );
            control.yield_now();
            continue;
        }

        let run = pipeline::run_optimization(&config, &mut instrument, control.as_mut())?;
        trigger.record_run(&run);
        history.record_run(&run);
        print!(
            "cycle {cycle:>3}: counts={count}, re-optimized -> {}{}\r\n",
            format_position(&run),
            if run.cancelled { " (cancelled)" } else { "" }
        );
        if run.cancelled {
            break;
        }
    }
    drop(control);

    if let Some(path) = &args.history {
        history.save(path)?;
        info!("history written to {}", path.display());
    }
    Ok(())
}

fn handle_show(args: ShowArgs) -> Result<(), AppError> {
    let file = read_run_json(&args.run)?;
    println!("{}", crate::report::format_run_summary(&file.run, &file.config));
    if !args.no_plot && !file.run.outcomes.is_empty() {
        println!("{}", crate::plot::render_run_plots(&file.run, args.width, args.height));
    }
    Ok(())
}

fn handle_history(args: HistoryArgs) -> Result<(), AppError> {
    let history = PositionHistory::load(&args.file)?;
    if history.is_empty() {
        println!("History '{}' is empty.", args.file.display());
        return Ok(());
    }
    print!("{}", crate::report::format_history(&history, args.last));
    Ok(())
}

fn append_history(path: &Path, run: &OptimizationRun) -> Result<(), AppError> {
    let mut history = PositionHistory::load_or_default(path)?;
    let added = history.record_run(run);
    history.save(path)?;
    info!("{added} positions appended to {}", path.display());
    Ok(())
}

fn format_position(run: &OptimizationRun) -> String {
    let parts: Vec<String> = Axis::ALL
        .into_iter()
        .filter_map(|axis| {
            run.outcome(axis)
                .and_then(|o| o.applied_voltage())
                .map(|v| format!("{axis}={v:.6}"))
        })
        .collect();
    if parts.is_empty() {
        "-".to_string()
    } else {
        parts.join(" ")
    }
}

/// Rewrite argv so `optimize` defaults to `optimize run`.
///
/// Rules:
/// - `optimize`                       -> `optimize run`
/// - `optimize --range-x 0.2 ...`     -> `optimize run --range-x 0.2 ...`
/// - `optimize --help/--version/-h`   -> unchanged (show top-level help/version)
/// - any argv naming a subcommand     -> unchanged
fn rewrite_args(mut argv: Vec<String>) -> Vec<String> {
    let Some(arg1) = argv.get(1).cloned() else {
        argv.push("run".to_string());
        return argv;
    };

    let is_top_level_help_or_version = matches!(
        arg1.as_str(),
        "-h" | "--help" | "-V" | "--version" | "help"
    );
    if is_top_level_help_or_version {
        return argv;
    }

    if argv.iter().skip(1).any(|a| SUBCOMMANDS.contains(&a.as_str())) {
        return argv;
    }

    if arg1.starts_with('-') {
        argv.insert(1, "run".to_string());
    }
    argv
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn bare_invocation_defaults_to_run() {
        assert_eq!(rewrite_args(args(&["optimize"])), args(&["optimize", "run"]));
    }

    #[test]
    fn leading_flags_go_to_run() {
        assert_eq!(
            rewrite_args(args(&["optimize", "--range-x", "0.2"])),
            args(&["optimize", "run", "--range-x", "0.2"])
        );
    }

    #[test]
    fn explicit_subcommands_are_kept() {
        let keep = args(&["optimize", "--log-level", "debug", "track", "--cycles", "3"]);
        assert_eq!(rewrite_args(keep.clone()), keep);
        let help = args(&["optimize", "--help"]);
        assert_eq!(rewrite_args(help.clone()), help);
    }

    #[test]
    fn position_lists_applied_axes() {
        assert_eq!(format_position(&OptimizationRun::new()), "-");
    }
}
