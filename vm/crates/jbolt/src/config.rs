//! Configuration Module - VM Options Consumed by JBolt
//!
//! Holds every option JBolt reads at startup. Options are resolved once into
//! a `VmOptions` value and passed by reference; nothing reads flags globally.
//!
//! JBolt-specific options are `Option`s so that "explicitly set" can be told
//! apart from "left at default". Setting any of them without `UseJBolt` is a
//! startup error, even when the value equals the default.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub(crate) const KB: usize = 1024;
pub(crate) const MB: usize = 1024 * 1024;
pub(crate) const GB: usize = 1024 * 1024 * 1024;

/// Largest size any size option may take
pub const MAX_SIZE_OPTION: usize = isize::MAX as usize;

/// Default size of each JBolt heap (hot and tmp)
pub const DEFAULT_JBOLT_CODE_HEAP_SIZE: usize = 8 * MB;

/// JBolt-dependent options, in the order their preconditions are checked
pub const JBOLT_DEPENDENT_OPTIONS: [&str; 5] = [
    "JBoltDumpMode",
    "JBoltLoadMode",
    "JBoltOrderFile",
    "JBoltCodeHeapSize",
    "JBoltRescheduling",
];

/// Boolean options, settable as `-XX:+Name`, `-XX:-Name` or `-XX:Name=true`
const BOOL_OPTIONS: [&str; 6] = [
    "UseJBolt",
    "JBoltDumpMode",
    "JBoltLoadMode",
    "SegmentedCodeCache",
    "TieredCompilation",
    "UnlockExperimentalVMOptions",
];

/// VM options relevant to JBolt and the segmented code cache
///
/// # Examples
///
/// ```rust
/// use jbolt::VmOptions;
///
/// let mut options = VmOptions::default();
/// options.set_bool("UseJBolt", true).unwrap();
/// options.set("JBoltRescheduling", "07:00,13:30").unwrap();
/// assert!(options.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmOptions {
    /// Master switch for the optimizer
    ///
    /// Default: false
    #[serde(rename = "UseJBolt")]
    pub use_jbolt: bool,

    /// Record placement order to `JBoltOrderFile` instead of relocating
    #[serde(rename = "JBoltDumpMode")]
    pub jbolt_dump_mode: Option<bool>,

    /// Seed the hot heap from `JBoltOrderFile` on the first pass
    #[serde(rename = "JBoltLoadMode")]
    pub jbolt_load_mode: Option<bool>,

    /// Path of the order artifact used by dump and load modes
    #[serde(rename = "JBoltOrderFile")]
    pub jbolt_order_file: Option<PathBuf>,

    /// Size of each JBolt heap in bytes
    ///
    /// Default: 8MB
    #[serde(rename = "JBoltCodeHeapSize")]
    pub jbolt_code_heap_size: Option<usize>,

    /// Comma-separated `HH:MM` list of daily re-optimization times
    #[serde(rename = "JBoltRescheduling")]
    pub jbolt_rescheduling: Option<String>,

    /// Split the code cache into per-kind heaps
    ///
    /// Default: true
    #[serde(rename = "SegmentedCodeCache")]
    pub segmented_code_cache: bool,

    /// Multi-tier compilation
    ///
    /// Default: true
    #[serde(rename = "TieredCompilation")]
    pub tiered_compilation: bool,

    /// Highest compilation tier in use (0-4)
    ///
    /// Default: 4
    #[serde(rename = "TieredStopAtLevel")]
    pub tiered_stop_at_level: u8,

    /// Interpreter-only execution (`-Xint`)
    #[serde(skip)]
    pub interpreter_only: bool,

    /// Default: 8MB
    #[serde(rename = "NonNMethodCodeHeapSize")]
    pub non_nmethod_code_heap_size: usize,

    /// Default: 116MB
    #[serde(rename = "ProfiledCodeHeapSize")]
    pub profiled_code_heap_size: usize,

    /// Default: 116MB
    #[serde(rename = "NonProfiledCodeHeapSize")]
    pub non_profiled_code_heap_size: usize,

    /// Size of the whole code cache when it is not segmented
    ///
    /// Default: 240MB
    #[serde(rename = "ReservedCodeCacheSize")]
    pub reserved_code_cache_size: usize,

    /// Accepted for command-line compatibility
    #[serde(rename = "UnlockExperimentalVMOptions")]
    pub unlock_experimental_vm_options: bool,
}

impl Default for VmOptions {
    fn default() -> Self {
        Self {
            use_jbolt: false,
            jbolt_dump_mode: None,
            jbolt_load_mode: None,
            jbolt_order_file: None,
            jbolt_code_heap_size: None,
            jbolt_rescheduling: None,
            segmented_code_cache: true,
            tiered_compilation: true,
            tiered_stop_at_level: 4,
            interpreter_only: false,
            non_nmethod_code_heap_size: 8 * MB,
            profiled_code_heap_size: 116 * MB,
            non_profiled_code_heap_size: 116 * MB,
            reserved_code_cache_size: 240 * MB,
            unlock_experimental_vm_options: false,
        }
    }
}

impl VmOptions {
    pub fn is_dump_mode(&self) -> bool {
        self.jbolt_dump_mode.unwrap_or(false)
    }

    pub fn is_load_mode(&self) -> bool {
        self.jbolt_load_mode.unwrap_or(false)
    }

    /// Neither dump nor load mode was requested
    pub fn is_auto_mode(&self) -> bool {
        !(self.is_dump_mode() || self.is_load_mode())
    }

    pub fn jbolt_code_heap_size(&self) -> usize {
        self.jbolt_code_heap_size
            .unwrap_or(DEFAULT_JBOLT_CODE_HEAP_SIZE)
    }

    /// The top tier compiler is reachable
    pub fn is_c2_enabled(&self) -> bool {
        !self.interpreter_only && (!self.tiered_compilation || self.tiered_stop_at_level >= 4)
    }

    /// The profiled tier produces code
    pub fn has_profiled_tier(&self) -> bool {
        self.tiered_compilation && self.tiered_stop_at_level > 1
    }

    /// Check whether a JBolt-dependent option was given explicitly
    pub fn is_explicit(&self, name: &str) -> bool {
        match name {
            "JBoltDumpMode" => self.jbolt_dump_mode.is_some(),
            "JBoltLoadMode" => self.jbolt_load_mode.is_some(),
            "JBoltOrderFile" => self.jbolt_order_file.is_some(),
            "JBoltCodeHeapSize" => self.jbolt_code_heap_size.is_some(),
            "JBoltRescheduling" => self.jbolt_rescheduling.is_some(),
            _ => false,
        }
    }

    /// Apply a `-XX:+Name` or `-XX:-Name` option
    pub fn set_bool(&mut self, name: &str, on: bool) -> Result<(), ConfigError> {
        match name {
            "UseJBolt" => self.use_jbolt = on,
            "JBoltDumpMode" => self.jbolt_dump_mode = Some(on),
            "JBoltLoadMode" => self.jbolt_load_mode = Some(on),
            "SegmentedCodeCache" => self.segmented_code_cache = on,
            "TieredCompilation" => self.tiered_compilation = on,
            "UnlockExperimentalVMOptions" => self.unlock_experimental_vm_options = on,
            _ => {
                let sign = if on { '+' } else { '-' };
                return Err(ConfigError::UnrecognizedOption(format!("{}{}", sign, name)));
            }
        }
        Ok(())
    }

    /// Apply a `-XX:Name=value` option
    pub fn set(&mut self, name: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = || ConfigError::InvalidValue {
            option: name.to_string(),
            value: value.to_string(),
        };

        if BOOL_OPTIONS.contains(&name) {
            let on = match value {
                "true" => true,
                "false" => false,
                _ => return Err(invalid()),
            };
            return self.set_bool(name, on);
        }

        match name {
            "JBoltOrderFile" => self.jbolt_order_file = Some(PathBuf::from(value)),
            "JBoltRescheduling" => self.jbolt_rescheduling = Some(value.to_string()),
            "JBoltCodeHeapSize" => {
                self.jbolt_code_heap_size = Some(parse_size(value).ok_or_else(invalid)?)
            }
            "NonNMethodCodeHeapSize" => {
                self.non_nmethod_code_heap_size = parse_size(value).ok_or_else(invalid)?
            }
            "ProfiledCodeHeapSize" => {
                self.profiled_code_heap_size = parse_size(value).ok_or_else(invalid)?
            }
            "NonProfiledCodeHeapSize" => {
                self.non_profiled_code_heap_size = parse_size(value).ok_or_else(invalid)?
            }
            "ReservedCodeCacheSize" => {
                self.reserved_code_cache_size = parse_size(value).ok_or_else(invalid)?
            }
            "TieredStopAtLevel" => {
                let level: u8 = value.parse().map_err(|_| invalid())?;
                if level > 4 {
                    return Err(invalid());
                }
                self.tiered_stop_at_level = level;
            }
            _ => return Err(ConfigError::UnrecognizedOption(format!("{}={}", name, value))),
        }
        Ok(())
    }

    /// Validate option combinations
    ///
    /// Runs, in order: JBolt-dependent options without `UseJBolt`, conflicting
    /// manual modes, compiler and segmentation dependencies. Order file and
    /// rescheduling checks need the file system and the logger and are done
    /// by the manager.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.check_arguments_not_set()?;
        if !self.use_jbolt {
            return Ok(());
        }
        self.check_mode()?;
        self.check_dependency()
    }

    /// Reject JBolt-dependent options when JBolt is off
    pub fn check_arguments_not_set(&self) -> Result<(), ConfigError> {
        if self.use_jbolt {
            return Ok(());
        }
        match JBOLT_DEPENDENT_OPTIONS
            .iter()
            .find(|name| self.is_explicit(name))
        {
            Some(name) => Err(ConfigError::NotSetWithoutUseJBolt(*name)),
            None => Ok(()),
        }
    }

    pub fn check_mode(&self) -> Result<(), ConfigError> {
        if self.is_dump_mode() && self.is_load_mode() {
            return Err(ConfigError::ConflictingModes);
        }
        Ok(())
    }

    pub fn check_dependency(&self) -> Result<(), ConfigError> {
        if !self.is_c2_enabled() {
            return Err(ConfigError::RequiresC2);
        }
        if !self.segmented_code_cache {
            return Err(ConfigError::RequiresSegmentedCodeCache);
        }
        Ok(())
    }

    /// Create configuration from environment variables
    ///
    /// Environment variables:
    /// - JBOLT_USE
    /// - JBOLT_ORDER_FILE
    /// - JBOLT_CODE_HEAP_SIZE
    /// - JBOLT_RESCHEDULING
    ///
    /// # Examples
    ///
    /// ```bash
    /// export JBOLT_USE=1
    /// export JBOLT_RESCHEDULING=07:00,19:00
    /// ```
    pub fn from_env() -> Self {
        let mut options = Self::default();

        if let Ok(val) = std::env::var("JBOLT_USE") {
            options.use_jbolt = val == "1" || val.eq_ignore_ascii_case("true");
        }

        if let Ok(val) = std::env::var("JBOLT_ORDER_FILE") {
            options.jbolt_order_file = Some(PathBuf::from(val));
        }

        if let Ok(val) = std::env::var("JBOLT_CODE_HEAP_SIZE") {
            if let Some(size) = parse_size(&val) {
                options.jbolt_code_heap_size = Some(size);
            }
        }

        if let Ok(val) = std::env::var("JBOLT_RESCHEDULING") {
            options.jbolt_rescheduling = Some(val);
        }

        options
    }
}

/// Parse a size with an optional `K`, `M` or `G` suffix
pub fn parse_size(text: &str) -> Option<usize> {
    let (digits, unit) = match text.char_indices().last()? {
        (idx, 'k' | 'K') => (&text[..idx], KB),
        (idx, 'm' | 'M') => (&text[..idx], MB),
        (idx, 'g' | 'G') => (&text[..idx], GB),
        _ => (text, 1),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits
        .parse::<usize>()
        .ok()?
        .checked_mul(unit)
        .filter(|size| *size <= MAX_SIZE_OPTION)
}

/// Startup configuration errors
///
/// The `Display` text of every variant is the exact diagnostic printed
/// before the VM exits.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Do not set VM option {0} without UseJBolt enabled.")]
    NotSetWithoutUseJBolt(&'static str),

    #[error("Do not set both JBoltDumpMode and JBoltLoadMode!")]
    ConflictingModes,

    #[error("JBolt depends on C2!")]
    RequiresC2,

    #[error("JBolt depends on SegmentedCodeCache!")]
    RequiresSegmentedCodeCache,

    #[error("JBoltOrderFile is not set!")]
    OrderFileNotSet,

    #[error("JBoltOrderFile does not exist or cannot be accessed! file=\"{0}\".")]
    OrderFileInaccessible(String),

    #[error("JBoltRescheduling is set but is null")]
    ReschedulingEmpty,

    #[error("JBoltRescheduling is too long")]
    ReschedulingTooLong,

    #[error("Invalid time {0} in JBoltRescheduling")]
    InvalidTime(String),

    #[error("JBoltCodeHeapSize should be {0} aligned, please adjust")]
    UnalignedJBoltHeap(usize),

    #[error("JBoltCodeHeapSize={0} is too large to split out of the code cache")]
    JBoltHeapTooLarge(usize),

    #[error("Not enough space in non-profiled code heap to split out JBolt heap(s): {non_profiled_kb}K <= {jbolt_total_kb}K")]
    NotEnoughNonProfiledSpace {
        non_profiled_kb: usize,
        jbolt_total_kb: usize,
    },

    #[error("Unrecognized VM option '{0}'")]
    UnrecognizedOption(String),

    #[error("Improperly specified VM option '{option}={value}'")]
    InvalidValue { option: String, value: String },
}

impl ConfigError {
    /// Failure caused by an option set without its enabling feature
    pub fn is_precondition(&self) -> bool {
        matches!(self, ConfigError::NotSetWithoutUseJBolt(_))
    }

    /// Failure caused by malformed option text
    pub fn is_syntax(&self) -> bool {
        matches!(
            self,
            ConfigError::ReschedulingEmpty
                | ConfigError::ReschedulingTooLong
                | ConfigError::InvalidTime(_)
                | ConfigError::UnrecognizedOption(_)
                | ConfigError::InvalidValue { .. }
        )
    }
}
