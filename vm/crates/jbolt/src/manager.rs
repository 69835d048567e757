//! JBolt Manager - startup orchestration
//!
//! Validates options, builds the segmented code cache, loads or prepares the
//! order file, runs the initial pass, and starts the control thread.
//!
//! Startup checks run in a fixed order and the first failure wins:
//!
//! 1. JBolt-dependent options without `UseJBolt`
//! 2. conflicting manual modes
//! 3. C2, then segmented code cache
//! 4. order file
//! 5. `JBoltRescheduling`
//! 6. JBolt heap carving

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use crate::config::{ConfigError, VmOptions, MAX_SIZE_OPTION};
use crate::error::{JBoltError, Result};
use crate::heap::{align_up, CodeBlob, CodeCache, CodeHeapKind, CodeHeapRegistry, CODE_HEAP_ALIGNMENT};
use crate::logging::{JBoltEvent, JBoltLogger, LOG_TARGET};
use crate::method::MethodKey;
use crate::reorder::{HotnessProfiler, OperatingMode, OrderFile, PassReport, ReorderEngine};
use crate::runtime::Safepoint;
use crate::stats::ReorderSummary;
use crate::trigger::{TriggerScheduler, TriggerSet, WallClock};

/// How JBolt runs in this VM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JBoltMode {
    Off,
    /// Profile and reorder on triggers
    Auto,
    /// Record the order to a file
    Dump,
    /// Seed from an order file
    Load,
}

impl JBoltMode {
    pub fn of(options: &VmOptions) -> Self {
        if !options.use_jbolt {
            JBoltMode::Off
        } else if options.is_dump_mode() {
            JBoltMode::Dump
        } else if options.is_load_mode() {
            JBoltMode::Load
        } else {
            JBoltMode::Auto
        }
    }
}

impl fmt::Display for JBoltMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JBoltMode::Off => "off",
            JBoltMode::Auto => "auto",
            JBoltMode::Dump => "dump",
            JBoltMode::Load => "load",
        };
        f.write_str(name)
    }
}

/// One active partition, for status output
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionStatus {
    pub name: &'static str,
    pub capacity: usize,
    pub used: usize,
    pub methods: usize,
}

/// Snapshot of the running configuration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JBoltStatus {
    pub mode: JBoltMode,
    pub partitions: Vec<PartitionStatus>,
    pub triggers: Vec<String>,
    pub scheduler_running: bool,
    pub stats: Option<ReorderSummary>,
}

pub struct JBoltManager {
    options: VmOptions,
    mode: JBoltMode,
    logger: Arc<JBoltLogger>,
    registry: Arc<CodeHeapRegistry>,
    cache: Arc<CodeCache>,
    safepoint: Arc<Safepoint>,
    profiler: Arc<HotnessProfiler>,
    engine: Option<Arc<ReorderEngine>>,
    triggers: Option<TriggerSet>,
    scheduler: Option<TriggerScheduler>,
    initial_pass: Option<PassReport>,
}

impl JBoltManager {
    /// Validate `options` and bring up the code cache and JBolt
    ///
    /// Every error returned here is fatal to VM startup.
    pub fn initialize(
        options: VmOptions,
        clock: Arc<dyn WallClock>,
        logger: Arc<JBoltLogger>,
    ) -> Result<Self> {
        options.check_arguments_not_set()?;
        let mode = JBoltMode::of(&options);
        let safepoint = Arc::new(Safepoint::new());
        let profiler = Arc::new(HotnessProfiler::new());

        if mode == JBoltMode::Off {
            let registry = Arc::new(CodeHeapRegistry::new(&options)?);
            let cache = Arc::new(CodeCache::new(Arc::clone(&registry), Arc::clone(&logger))?);
            return Ok(Self {
                options,
                mode,
                logger,
                registry,
                cache,
                safepoint,
                profiler,
                engine: None,
                triggers: None,
                scheduler: None,
                initial_pass: None,
            });
        }

        options.check_mode()?;
        options.check_dependency()?;
        let order_path = Self::check_order_file(&options, &logger)?;
        let triggers = Self::parse_rescheduling(&options, &logger)?;

        let mut options = options;
        let seed = match (mode, &order_path) {
            (JBoltMode::Load, Some(path)) => Some(Self::load_order(path, &logger)?),
            _ => None,
        };
        Self::size_jbolt_heaps(&mut options, seed.as_ref(), &logger)?;

        let registry = Arc::new(CodeHeapRegistry::new(&options)?);
        let cache = Arc::new(CodeCache::new(Arc::clone(&registry), Arc::clone(&logger))?);

        let operating_mode = if mode == JBoltMode::Dump {
            OperatingMode::Dump
        } else {
            OperatingMode::Use
        };
        let mut engine = ReorderEngine::new(
            operating_mode,
            Arc::clone(&cache),
            Arc::clone(&safepoint),
            Arc::clone(&logger),
        );
        if let (JBoltMode::Dump, Some(path)) = (mode, &order_path) {
            engine = engine.with_dump_path(path);
        }
        if let Some(seed) = seed {
            engine = engine.with_seed(seed);
        }
        let engine = Arc::new(engine);

        let initial_pass = engine.run_with(&*profiler)?;

        let scheduler = match (&triggers, mode) {
            (Some(set), JBoltMode::Auto) if !set.is_empty() => {
                let scheduler = TriggerScheduler::new(set.clone(), clock, Arc::clone(&logger));
                let engine = Arc::clone(&engine);
                let profiler = Arc::clone(&profiler);
                scheduler.start(move |_| {
                    if let Err(e) = engine.run_with(&*profiler) {
                        log::error!(target: LOG_TARGET, "JBolt reordering failed: {}", e);
                    }
                })?;
                Some(scheduler)
            }
            _ => None,
        };

        Ok(Self {
            options,
            mode,
            logger,
            registry,
            cache,
            safepoint,
            profiler,
            engine: Some(engine),
            triggers,
            scheduler,
            initial_pass: Some(initial_pass),
        })
    }

    /// Order file handling per mode; returns the path to use, if any
    fn check_order_file(options: &VmOptions, logger: &JBoltLogger) -> Result<Option<PathBuf>> {
        if options.is_auto_mode() {
            if options.jbolt_order_file.is_some() {
                logger.log(JBoltEvent::OrderFileIgnored);
            }
            return Ok(None);
        }

        let path = options
            .jbolt_order_file
            .clone()
            .ok_or(ConfigError::OrderFileNotSet)?;
        let exists = fs::metadata(&path).is_ok();

        if exists && options.is_dump_mode() {
            logger.log(JBoltEvent::OrderFileOverwritten {
                path: path.display().to_string(),
            });
            fs::remove_file(&path)?;
        } else if !exists && options.is_load_mode() {
            return Err(ConfigError::OrderFileInaccessible(path.display().to_string()).into());
        }
        Ok(Some(path))
    }

    /// Parse `JBoltRescheduling` in auto mode, only length-check it otherwise
    fn parse_rescheduling(options: &VmOptions, logger: &JBoltLogger) -> Result<Option<TriggerSet>> {
        let Some(text) = options.jbolt_rescheduling.as_deref() else {
            return Ok(None);
        };
        TriggerSet::check_length(text)?;
        if !options.is_auto_mode() {
            logger.log(JBoltEvent::ReschedulingIgnored);
            return Ok(None);
        }
        Ok(Some(TriggerSet::parse(text, logger)?))
    }

    fn load_order(path: &Path, logger: &JBoltLogger) -> Result<OrderFile> {
        let order = OrderFile::load(path).map_err(|e| match e {
            JBoltError::Io(_) => ConfigError::OrderFileInaccessible(path.display().to_string()).into(),
            other => other,
        })?;
        logger.log(JBoltEvent::OrderLoaded {
            path: path.display().to_string(),
            methods: order.len(),
        });
        Ok(order)
    }

    /// Pick the JBolt heap size when it was not given
    ///
    /// Load mode sizes each heap to hold the whole order file.
    fn size_jbolt_heaps(
        options: &mut VmOptions,
        seed: Option<&OrderFile>,
        logger: &JBoltLogger,
    ) -> Result<()> {
        if options.jbolt_code_heap_size.is_some() || options.is_dump_mode() {
            return Ok(());
        }
        match seed {
            Some(order) => {
                let total = order.total_padded_size();
                if total > MAX_SIZE_OPTION - CODE_HEAP_ALIGNMENT {
                    return Err(ConfigError::JBoltHeapTooLarge(total).into());
                }
                let size = align_up(total, CODE_HEAP_ALIGNMENT).max(CODE_HEAP_ALIGNMENT);
                options.jbolt_code_heap_size = Some(size);
                logger.log(JBoltEvent::CodeHeapSizeSet { size, auto: true });
            }
            None => logger.log(JBoltEvent::CodeHeapSizeSet {
                size: options.jbolt_code_heap_size(),
                auto: false,
            }),
        }
        Ok(())
    }

    pub fn options(&self) -> &VmOptions {
        &self.options
    }

    pub fn mode(&self) -> JBoltMode {
        self.mode
    }

    pub fn logger(&self) -> &Arc<JBoltLogger> {
        &self.logger
    }

    pub fn registry(&self) -> &Arc<CodeHeapRegistry> {
        &self.registry
    }

    pub fn cache(&self) -> &Arc<CodeCache> {
        &self.cache
    }

    pub fn safepoint(&self) -> &Arc<Safepoint> {
        &self.safepoint
    }

    pub fn profiler(&self) -> &Arc<HotnessProfiler> {
        &self.profiler
    }

    pub fn engine(&self) -> Option<&Arc<ReorderEngine>> {
        self.engine.as_ref()
    }

    pub fn triggers(&self) -> Option<&TriggerSet> {
        self.triggers.as_ref()
    }

    pub fn scheduler(&self) -> Option<&TriggerScheduler> {
        self.scheduler.as_ref()
    }

    pub fn initial_pass(&self) -> Option<&PassReport> {
        self.initial_pass.as_ref()
    }

    /// Install compiled code for `method`
    pub fn compile(&self, method: MethodKey, code: &[u8], kind: CodeHeapKind) -> Result<CodeBlob> {
        match &self.engine {
            Some(engine) => {
                self.profiler.record_compiled(&method);
                engine.register_compiled(method, code, kind)
            }
            None => self.cache.allocate(kind, &method, code),
        }
    }

    /// Run a pass now, outside the trigger schedule
    pub fn reorder_now(&self) -> Result<PassReport> {
        let engine = self
            .engine
            .as_ref()
            .ok_or_else(|| JBoltError::Internal("JBolt is not enabled".to_string()))?;
        engine.run_with(&*self.profiler)
    }

    pub fn status(&self) -> JBoltStatus {
        let partitions = self
            .registry
            .active()
            .iter()
            .filter_map(|kind| self.cache.usage(kind))
            .map(|usage| PartitionStatus {
                name: usage.kind.display_name(),
                capacity: usage.capacity,
                used: usage.used,
                methods: usage.blobs,
            })
            .collect();

        JBoltStatus {
            mode: self.mode,
            partitions,
            triggers: self
                .triggers
                .iter()
                .flat_map(|set| set.triggers().iter().map(ToString::to_string))
                .collect(),
            scheduler_running: self.scheduler.as_ref().is_some_and(TriggerScheduler::is_running),
            stats: self.engine.as_ref().map(|engine| engine.stats().summary()),
        }
    }

    /// Stop the control thread; in dump mode write the final order
    pub fn shutdown(&self) -> Result<Option<PassReport>> {
        if let Some(scheduler) = &self.scheduler {
            scheduler.shutdown();
        }
        match &self.engine {
            Some(engine) if engine.mode() == OperatingMode::Dump => {
                engine.run_with(&*self.profiler).map(Some)
            }
            _ => Ok(None),
        }
    }
}
