//! jboltctl - VM launcher front end for JBolt.
//!
//! Accepts VM-style options (`-XX:+UseJBolt`, `-XX:JBoltRescheduling=...`,
//! `-Xlog:jbolt*=trace`), brings up the code cache and JBolt exactly as VM
//! startup would, and reports startup failures on stdout with exit status 1.

mod config;
mod error;
mod options;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use jbolt::{
    CodeHeapKind, JBoltLogger, JBoltLoggerConfig, JBoltManager, LogLevel, MethodKey, SystemClock,
};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use config::Config;
use error::{LauncherError, Result};
use options::{LogOutput, LogSettings};

/// jboltctl - start a VM with the JBolt code cache layout optimizer
///
/// VM options (`-XX:...`, `-Xint`, `-Xlog:...`) may appear anywhere on the
/// command line and are applied left to right over the configuration file.
#[derive(Parser, Debug)]
#[command(name = "jboltctl")]
#[command(about = "Start a VM with the JBolt code cache layout optimizer", long_about = None)]
#[command(disable_version_flag = true)]
struct Cli {
    /// Print the version after startup and exit
    #[arg(long)]
    version: bool,

    /// Path to configuration file
    #[arg(short, long, env = "JBOLTCTL_CONFIG")]
    config: Option<PathBuf>,

    /// Print the code cache partitions and JBolt state as JSON
    #[arg(long)]
    status: bool,

    /// Compile this many synthetic methods and run one reordering pass
    #[arg(long, value_name = "METHODS")]
    demo: Option<usize>,

    /// Keep the VM up for this many seconds so scheduled passes can run
    #[arg(long, value_name = "SECONDS")]
    run_for: Option<u64>,
}

fn main() -> ExitCode {
    let (vm_args, launcher_args) = options::split_args(std::env::args());
    let cli = Cli::parse_from(launcher_args);

    match run(cli, &vm_args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            for line in err.report() {
                println!("{}", line);
            }
            ExitCode::from(1)
        }
    }
}

/// Apply options, start the VM, perform the requested actions, shut down.
fn run(cli: Cli, vm_args: &[String]) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;

    let mut vm_options = config.vm.clone();
    let mut log = LogSettings::default();
    options::apply(vm_args, &mut vm_options, &mut log)?;

    init_logging(&log)?;

    let logger = Arc::new(JBoltLogger::new(JBoltLoggerConfig {
        level: log.jbolt_level.unwrap_or(LogLevel::Error),
        forward: log.jbolt_level.is_some(),
        json: config.log.json,
        record: false,
    }));
    let manager = JBoltManager::initialize(vm_options, Arc::new(SystemClock), logger)?;
    tracing::debug!("VM started, JBolt mode {}", manager.mode());

    if let Some(methods) = cli.demo {
        run_demo(&manager, methods)?;
    }

    if let Some(seconds) = cli.run_for {
        std::thread::sleep(Duration::from_secs(seconds));
    }

    if cli.status {
        println!("{}", serde_json::to_string_pretty(&manager.status())?);
    }

    if cli.version {
        println!(
            "jboltctl {} (jbolt {})",
            env!("CARGO_PKG_VERSION"),
            jbolt::VERSION
        );
    }

    if let Some(report) = manager.shutdown()? {
        tracing::debug!("final pass {} recorded {} methods", report.pass, report.ranked);
    }
    Ok(())
}

/// Install the tracing subscriber described by `-Xlog`.
///
/// Without `-Xlog`, `JBOLTCTL_LOG` may supply the filter.
fn init_logging(log: &LogSettings) -> Result<()> {
    let filter = if log.explicit {
        EnvFilter::new(log.filter())
    } else {
        EnvFilter::try_from_env("JBOLTCTL_LOG").unwrap_or_else(|_| EnvFilter::new(log.filter()))
    };

    let layer = fmt::layer()
        .with_ansi(false)
        .with_target(true)
        .with_thread_names(false);
    let layer = match log.output {
        LogOutput::Stdout => layer.with_writer(std::io::stdout).boxed(),
        LogOutput::Stderr => layer.with_writer(std::io::stderr).boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init()
        .map_err(|e| LauncherError::Logging(e.to_string()))
}

fn load_config(config_path: Option<&std::path::Path>) -> Result<Config> {
    match config_path {
        Some(path) => Config::load_from_path(path),
        None => Config::load(),
    }
}

/// Compile `count` methods with a skewed hotness profile and reorder once.
fn run_demo(manager: &JBoltManager, count: usize) -> Result<()> {
    let methods: Vec<MethodKey> = (0..count)
        .map(|i| MethodKey::new("demo/Workload", format!("m{}", i), "()V"))
        .collect();

    for (i, method) in methods.iter().enumerate() {
        let size = 256 + (i * 97) % 3840;
        manager.compile(method.clone(), &vec![0xCC; size], CodeHeapKind::MethodNonProfiled)?;
    }

    if manager.engine().is_none() {
        println!("Compiled {} methods; JBolt is off, nothing to reorder", count);
        return Ok(());
    }

    // Later methods are hotter so the pass has to move them forward
    for (i, method) in methods.iter().enumerate() {
        manager.profiler().record_samples(method, ((i + 1) * 10) as u64);
    }

    let report = manager.reorder_now()?;
    println!(
        "Pass {}: ranked {}, relocated {}, evicted {}, {} bytes moved, {} without space",
        report.pass,
        report.ranked,
        report.relocated,
        report.evicted,
        report.bytes_moved,
        report.capacity_exhausted
    );
    if let Some(path) = &report.dumped {
        println!("Order written to {}", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_version() {
        let cli = Cli::parse_from(["jboltctl", "--version"]);
        assert!(cli.version);
        assert!(!cli.status);
    }

    #[test]
    fn test_cli_parse_demo_and_run_for() {
        let cli = Cli::parse_from(["jboltctl", "--demo", "50", "--run-for", "2"]);
        assert_eq!(cli.demo, Some(50));
        assert_eq!(cli.run_for, Some(2));
    }

    #[test]
    fn test_cli_parse_config() {
        let cli = Cli::parse_from(["jboltctl", "--config", "/tmp/jboltctl.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/jboltctl.toml")));
    }

    #[test]
    fn test_vm_options_do_not_reach_clap() {
        let argv = ["jboltctl", "-XX:+UseJBolt", "--status", "-Xlog:jbolt*=trace"]
            .iter()
            .map(|s| s.to_string());
        let (vm_args, launcher_args) = options::split_args(argv);
        let cli = Cli::parse_from(launcher_args);
        assert!(cli.status);
        assert_eq!(vm_args.len(), 2);
    }

    #[test]
    fn test_cli_rejects_unknown_flag() {
        assert!(Cli::try_parse_from(["jboltctl", "--bogus"]).is_err());
    }
}
