//! VM-style command line options.
//!
//! Arguments starting with `-X` follow the VM's own syntax rather than
//! clap's, so they are split off before clap sees the rest:
//!
//! ```text
//! -XX:+Name           boolean on
//! -XX:-Name           boolean off
//! -XX:Name=value      valued option
//! -Xint               interpreter only
//! -Xlog[:sel[=lvl][:output]]
//! ```

use jbolt::{LogLevel, VmOptions};

use crate::error::{LauncherError, Result};

/// Where log lines are written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
}

/// Log configuration accumulated from `-Xlog` options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    /// `EnvFilter` directives in the order given
    pub directives: Vec<String>,
    /// Level for the `jbolt` target; `None` when logging is off for it
    pub jbolt_level: Option<LogLevel>,
    pub output: LogOutput,
    /// True once any `-Xlog` option was seen
    pub explicit: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            directives: vec![format!("{}=warn", jbolt::logging::LOG_TARGET)],
            jbolt_level: Some(LogLevel::Warn),
            output: LogOutput::Stdout,
            explicit: false,
        }
    }
}

impl LogSettings {
    pub fn filter(&self) -> String {
        self.directives.join(",")
    }

    fn set(&mut self, tag: &str, level: Option<LogLevel>) {
        if !self.explicit {
            self.directives.clear();
            self.explicit = true;
        }
        let prefix = format!("{}=", tag);
        self.directives.retain(|d| !d.starts_with(&prefix));
        let directive = match level {
            Some(level) => format!("{}{}", prefix, directive_level(level)),
            None => format!("{}off", prefix),
        };
        self.directives.push(directive);
        if tag == jbolt::logging::LOG_TARGET {
            self.jbolt_level = level;
        }
    }
}

fn directive_level(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    }
}

/// Separate VM options from launcher arguments, keeping the program name
pub fn split_args<I>(args: I) -> (Vec<String>, Vec<String>)
where
    I: IntoIterator<Item = String>,
{
    let mut vm = Vec::new();
    let mut launcher = Vec::new();
    for (index, arg) in args.into_iter().enumerate() {
        if index > 0 && arg.starts_with("-X") {
            vm.push(arg);
        } else {
            launcher.push(arg);
        }
    }
    (vm, launcher)
}

/// Apply every VM option in `args`, left to right
///
/// Later options override earlier ones, as they do on a VM command line.
pub fn apply(args: &[String], options: &mut VmOptions, log: &mut LogSettings) -> Result<()> {
    for arg in args {
        if let Some(body) = arg.strip_prefix("-XX:") {
            apply_xx(body, options)?;
        } else if arg == "-Xint" {
            options.interpreter_only = true;
        } else if arg == "-Xlog" {
            log.set(jbolt::logging::LOG_TARGET, Some(LogLevel::Info));
        } else if let Some(spec) = arg.strip_prefix("-Xlog:") {
            apply_xlog(spec, log)?;
        } else {
            return Err(LauncherError::UnrecognizedOption(arg.clone()));
        }
    }
    Ok(())
}

fn apply_xx(body: &str, options: &mut VmOptions) -> Result<()> {
    if let Some(name) = body.strip_prefix('+') {
        options.set_bool(name, true)?;
    } else if let Some(name) = body.strip_prefix('-') {
        options.set_bool(name, false)?;
    } else if let Some((name, value)) = body.split_once('=') {
        options.set(name, value)?;
    } else {
        return Err(jbolt::ConfigError::UnrecognizedOption(body.to_string()).into());
    }
    Ok(())
}

/// `-Xlog:` followed by `disable`, or `selectors[=level][:output]`
fn apply_xlog(spec: &str, log: &mut LogSettings) -> Result<()> {
    let invalid = || LauncherError::InvalidLogOption(format!("-Xlog:{}", spec));

    if spec == "disable" {
        log.set(jbolt::logging::LOG_TARGET, None);
        return Ok(());
    }

    let mut parts = spec.splitn(2, ':');
    let selection = parts.next().unwrap_or_default();
    if let Some(output) = parts.next() {
        log.output = match output {
            "stdout" => LogOutput::Stdout,
            "stderr" => LogOutput::Stderr,
            _ => return Err(invalid()),
        };
    }

    for selector in selection.split(',') {
        let (tags, level) = match selector.split_once('=') {
            Some((tags, level)) => (tags, parse_level(level).ok_or_else(invalid)?),
            None => (selector, Some(LogLevel::Info)),
        };
        let tag = tags.trim_end_matches('*');
        if tag.is_empty() || tag.contains('*') {
            return Err(invalid());
        }
        if tag == "all" {
            log.set(jbolt::logging::LOG_TARGET, level);
        } else {
            log.set(tag, level);
        }
    }
    Ok(())
}

/// VM level names; `Some(None)` is `off`
fn parse_level(text: &str) -> Option<Option<LogLevel>> {
    let level = match text {
        "off" => return Some(None),
        "error" => LogLevel::Error,
        "warning" | "warn" => LogLevel::Warn,
        "info" => LogLevel::Info,
        "debug" => LogLevel::Debug,
        "trace" => LogLevel::Trace,
        _ => return None,
    };
    Some(Some(level))
}
