//! JBolt Logging
//!
//! Typed events for everything JBolt reports. Events are forwarded to the
//! `log` facade under the `jbolt` target and can be kept in memory so that
//! diagnostics and tests can inspect what happened.
//!
//! Log Levels:
//! - WARN: ignored options, full heaps, failed placements
//! - INFO: trigger firings, pass summaries, order file I/O
//! - DEBUG: pass start
//! - TRACE: trigger setup, per-method relocation

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use chrono::{Datelike, NaiveDateTime, Timelike};
use parking_lot::Mutex;

use crate::heap::CodeHeapKind;
use crate::trigger::TimeTrigger;

/// Log target used for every JBolt record
pub const LOG_TARGET: &str = "jbolt";

/// Log level for JBolt events
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl From<LogLevel> for log::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => log::Level::Error,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Info => log::Level::Info,
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Trace => log::Level::Trace,
        }
    }
}

/// JBolt event types
#[derive(Debug, Clone, PartialEq)]
pub enum JBoltEvent {
    /// A rescheduling time was retained
    TriggerSet { time: TimeTrigger },

    /// A rescheduling time appeared more than once
    DuplicatedTime { time: TimeTrigger },

    /// More than the supported number of distinct times were given
    TooManyTriggers,

    /// Rescheduling was configured in a manual mode
    ReschedulingIgnored,

    /// An order file was configured in auto mode
    OrderFileIgnored,

    /// The dump target already exists
    OrderFileOverwritten { path: String },

    /// The control thread computed its next wake-up
    NextTrigger { at: NaiveDateTime },

    /// A trigger was reached
    TriggerFired { time: TimeTrigger },

    /// A reordering pass started
    PassStart { pass: u64, ranked: usize },

    /// A reordering pass completed
    PassEnd {
        pass: u64,
        relocated: usize,
        bytes_moved: usize,
        capacity_exhausted: usize,
        duration_ms: f64,
    },

    /// A method's code moved between partitions
    MethodRelocated {
        method: String,
        from: CodeHeapKind,
        to: CodeHeapKind,
        size: usize,
    },

    /// No viable partition had room for a method
    PlacementFailed {
        method: String,
        target: CodeHeapKind,
        size: usize,
    },

    /// A partition rejected an allocation
    HeapFull { kind: CodeHeapKind },

    /// The JBolt heaps cannot hold every ranked method
    HeapTooSmall { configured: usize, needed: usize },

    /// The order was written to disk
    OrderDumped { path: String, methods: usize },

    /// The order was read from disk
    OrderLoaded { path: String, methods: usize },

    /// Size chosen for each JBolt heap
    CodeHeapSizeSet { size: usize, auto: bool },
}

impl JBoltEvent {
    /// Get log level for event
    pub fn level(&self) -> LogLevel {
        match self {
            JBoltEvent::TriggerSet { .. } | JBoltEvent::MethodRelocated { .. } => LogLevel::Trace,
            JBoltEvent::PassStart { .. } => LogLevel::Debug,
            JBoltEvent::NextTrigger { .. }
            | JBoltEvent::TriggerFired { .. }
            | JBoltEvent::PassEnd { .. }
            | JBoltEvent::OrderDumped { .. }
            | JBoltEvent::OrderLoaded { .. }
            | JBoltEvent::CodeHeapSizeSet { .. } => LogLevel::Info,
            JBoltEvent::DuplicatedTime { .. }
            | JBoltEvent::TooManyTriggers
            | JBoltEvent::ReschedulingIgnored
            | JBoltEvent::OrderFileIgnored
            | JBoltEvent::OrderFileOverwritten { .. }
            | JBoltEvent::PlacementFailed { .. }
            | JBoltEvent::HeapFull { .. }
            | JBoltEvent::HeapTooSmall { .. } => LogLevel::Warn,
        }
    }

    /// Machine-readable form of the event
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            JBoltEvent::TriggerSet { time } => serde_json::json!({
                "type": "trigger_set",
                "time": time.to_string()
            }),
            JBoltEvent::DuplicatedTime { time } => serde_json::json!({
                "type": "duplicated_time",
                "time": time.to_string()
            }),
            JBoltEvent::TooManyTriggers => serde_json::json!({ "type": "too_many_triggers" }),
            JBoltEvent::ReschedulingIgnored => {
                serde_json::json!({ "type": "rescheduling_ignored" })
            }
            JBoltEvent::OrderFileIgnored => serde_json::json!({ "type": "order_file_ignored" }),
            JBoltEvent::OrderFileOverwritten { path } => serde_json::json!({
                "type": "order_file_overwritten",
                "path": path
            }),
            JBoltEvent::NextTrigger { at } => serde_json::json!({
                "type": "next_trigger",
                "at": at.format("%Y-%m-%dT%H:%M:%S").to_string()
            }),
            JBoltEvent::TriggerFired { time } => serde_json::json!({
                "type": "trigger_fired",
                "time": time.to_string()
            }),
            JBoltEvent::PassStart { pass, ranked } => serde_json::json!({
                "type": "pass_start",
                "pass": pass,
                "ranked": ranked
            }),
            JBoltEvent::PassEnd {
                pass,
                relocated,
                bytes_moved,
                capacity_exhausted,
                duration_ms,
            } => serde_json::json!({
                "type": "pass_end",
                "pass": pass,
                "relocated": relocated,
                "bytes_moved": bytes_moved,
                "capacity_exhausted": capacity_exhausted,
                "duration_ms": duration_ms
            }),
            JBoltEvent::MethodRelocated {
                method,
                from,
                to,
                size,
            } => serde_json::json!({
                "type": "method_relocated",
                "method": method,
                "from": from.id(),
                "to": to.id(),
                "size": size
            }),
            JBoltEvent::PlacementFailed {
                method,
                target,
                size,
            } => serde_json::json!({
                "type": "placement_failed",
                "method": method,
                "target": target.id(),
                "size": size
            }),
            JBoltEvent::HeapFull { kind } => serde_json::json!({
                "type": "heap_full",
                "heap": kind.id()
            }),
            JBoltEvent::HeapTooSmall { configured, needed } => serde_json::json!({
                "type": "heap_too_small",
                "configured": configured,
                "needed": needed
            }),
            JBoltEvent::OrderDumped { path, methods } => serde_json::json!({
                "type": "order_dumped",
                "path": path,
                "methods": methods
            }),
            JBoltEvent::CodeHeapSizeSet { size, auto } => serde_json::json!({
                "type": "code_heap_size_set",
                "size": size,
                "auto": auto
            }),
            JBoltEvent::OrderLoaded { path, methods } => serde_json::json!({
                "type": "order_loaded",
                "path": path,
                "methods": methods
            }),
        }
    }
}

impl fmt::Display for JBoltEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JBoltEvent::TriggerSet { time } => write!(f, "Set time trigger at {}", time),
            JBoltEvent::DuplicatedTime { time } => {
                write!(f, "time {} is duplicated in JBoltRescheduling", time)
            }
            JBoltEvent::TooManyTriggers => write!(
                f,
                "JBoltRescheduling support up to 10 time settings, any excess will be ignored."
            ),
            JBoltEvent::ReschedulingIgnored => write!(
                f,
                "JBoltRescheduling is ignored because it is not in auto mode."
            ),
            JBoltEvent::OrderFileIgnored => {
                write!(f, "JBoltOrderFile is ignored because it is in auto mode.")
            }
            JBoltEvent::OrderFileOverwritten { path } => write!(
                f,
                "JBoltOrderFile to dump already exists and will be overwritten: file={}.",
                path
            ),
            JBoltEvent::NextTrigger { at } => write!(
                f,
                "next trigger is at {}.{}.{}.{:02}:{:02}:{:02}",
                at.year(),
                at.month(),
                at.day(),
                at.hour(),
                at.minute(),
                at.second()
            ),
            JBoltEvent::TriggerFired { time } => write!(f, "successfully trigger at {}", time),
            JBoltEvent::PassStart { pass, ranked } => {
                write!(f, "Reordering pass {} started ({} ranked methods)", pass, ranked)
            }
            JBoltEvent::PassEnd {
                pass,
                relocated,
                bytes_moved,
                capacity_exhausted,
                duration_ms,
            } => write!(
                f,
                "Reordering pass {} completed ({:.2}ms, relocated {} methods, {} bytes moved, {} unplaced)",
                pass, duration_ms, relocated, bytes_moved, capacity_exhausted
            ),
            JBoltEvent::MethodRelocated {
                method,
                from,
                to,
                size,
            } => write!(f, "Relocated {} ({} bytes): {} -> {}", method, size, from, to),
            JBoltEvent::PlacementFailed {
                method,
                target,
                size,
            } => write!(
                f,
                "No room for {} ({} bytes) in {} or its overflow heaps, left in place",
                method, size, target
            ),
            JBoltEvent::HeapFull { kind } => write!(f, "{} is full", kind),
            JBoltEvent::HeapTooSmall { configured, needed } => write!(
                f,
                "JBolt reordering not complete because JBolt CodeHeap is too small to place all ordered methods. \
                 Please use -XX:JBoltCodeHeapSize to enlarge. JBoltCodeHeapSize={} B ( need {} B).",
                configured, needed
            ),
            JBoltEvent::OrderDumped { path, methods } => {
                write!(f, "Dumped {} methods to JBoltOrderFile: file={}.", methods, path)
            }
            JBoltEvent::OrderLoaded { path, methods } => {
                write!(f, "Loaded {} methods from JBoltOrderFile: file={}.", methods, path)
            }
            JBoltEvent::CodeHeapSizeSet { size, auto } => write!(
                f,
                "{} set JBoltCodeHeapSize={} B ({} MB).",
                if *auto { "Auto" } else { "Default" },
                size,
                size / 1024 / 1024
            ),
        }
    }
}

/// JBolt logger configuration
#[derive(Debug, Clone)]
pub struct JBoltLoggerConfig {
    /// Minimum log level
    pub level: LogLevel,

    /// Forward events to the `log` facade
    pub forward: bool,

    /// Render forwarded events as JSON
    pub json: bool,

    /// Keep events in memory for `messages` and `count_matching`
    pub record: bool,
}

impl Default for JBoltLoggerConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Trace,
            forward: true,
            json: false,
            record: false,
        }
    }
}

/// JBolt Logger - centralized logging for JBolt operations
pub struct JBoltLogger {
    config: JBoltLoggerConfig,
    events: Mutex<Vec<(Instant, JBoltEvent)>>,
    enabled: AtomicBool,
}

impl JBoltLogger {
    /// Create new logger
    pub fn new(config: JBoltLoggerConfig) -> Self {
        Self {
            config,
            events: Mutex::new(Vec::new()),
            enabled: AtomicBool::new(true),
        }
    }

    /// Logger that only records, for tests
    pub fn silent() -> Self {
        Self::new(JBoltLoggerConfig {
            forward: false,
            record: true,
            ..Default::default()
        })
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Relaxed);
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Log a JBolt event
    pub fn log(&self, event: JBoltEvent) {
        if !self.is_enabled() {
            return;
        }

        let level = event.level();
        if level > self.config.level {
            return;
        }

        if self.config.forward {
            self.forward(level, &event);
        }

        if self.config.record {
            self.events.lock().push((Instant::now(), event));
        }
    }

    fn forward(&self, level: LogLevel, event: &JBoltEvent) {
        let level = log::Level::from(level);
        if !log::log_enabled!(target: LOG_TARGET, level) {
            return;
        }
        if self.config.json {
            if let Ok(json) = serde_json::to_string(&event.to_json()) {
                log::log!(target: LOG_TARGET, level, "{}", json);
            }
        } else {
            log::log!(target: LOG_TARGET, level, "{}", event);
        }
    }

    /// Get all events
    pub fn get_events(&self) -> Vec<(Instant, JBoltEvent)> {
        self.events.lock().clone()
    }

    /// Rendered messages in logging order
    pub fn messages(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .map(|(_, event)| event.to_string())
            .collect()
    }

    /// Count recorded events matching a predicate
    pub fn count_matching(&self, predicate: impl Fn(&JBoltEvent) -> bool) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|(_, event)| predicate(event))
            .count()
    }

    pub fn clear_events(&self) {
        self.events.lock().clear();
    }

    pub fn event_count(&self) -> usize {
        self.events.lock().len()
    }
}

impl Default for JBoltLogger {
    fn default() -> Self {
        Self::new(JBoltLoggerConfig::default())
    }
}
