//! The dataset: scene, animation time and the services loads run on.

use crate::config::AtomioConfig;
use crate::io::{ExporterRegistry, FormatRegistry, ResourceReader};
use crate::models::TimePoint;
use crate::pipeline::{BackgroundExecutor, SourceContext, TaskManager};
use crate::scene::Scene;
use crate::Result;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Current animation time and the animation interval.
#[derive(Debug)]
pub struct AnimationSettings {
    current_time: AtomicI32,
    interval: Mutex<(TimePoint, TimePoint)>,
}

impl AnimationSettings {
    /// Creates settings at time 0 with an empty interval.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            current_time: AtomicI32::new(0),
            interval: Mutex::new((0, 0)),
        }
    }

    /// The current animation time.
    #[must_use]
    pub fn current_time(&self) -> TimePoint {
        self.current_time.load(Ordering::SeqCst)
    }

    /// Moves the animation to `time`.
    pub fn set_current_time(&self, time: TimePoint) {
        self.current_time.store(time, Ordering::SeqCst);
    }

    /// First and last animation time.
    #[must_use]
    pub fn interval(&self) -> (TimePoint, TimePoint) {
        *self.interval.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sets the animation interval, clamping the current time into it.
    pub fn set_interval(&self, start: TimePoint, end: TimePoint) {
        let (start, end) = (start.min(end), start.max(end));
        *self.interval.lock().unwrap_or_else(PoisonError::into_inner) = (start, end);
        let time = self.current_time().clamp(start, end);
        self.set_current_time(time);
        tracing::debug!(start, end, "Animation interval changed");
    }
}

impl Default for AnimationSettings {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything an import or export works against.
#[derive(Debug)]
pub struct DataSet {
    scene: Scene,
    animation: Arc<AnimationSettings>,
    executor: Arc<BackgroundExecutor>,
    formats: Arc<FormatRegistry>,
    exporters: Arc<ExporterRegistry>,
    reader: ResourceReader,
    config: AtomioConfig,
}

impl DataSet {
    /// Creates a dataset with default configuration and the global registries.
    ///
    /// # Errors
    ///
    /// Returns an error if the background executor cannot be started.
    pub fn new() -> Result<Self> {
        Self::from_config(&AtomioConfig::default())
    }

    /// Creates a dataset from configuration with the global registries.
    ///
    /// # Errors
    ///
    /// Returns an error if the background executor cannot be started.
    pub fn from_config(config: &AtomioConfig) -> Result<Self> {
        Self::with_registries(
            config,
            crate::io::global_format_registry(),
            crate::io::global_exporter_registry(),
        )
    }

    /// Creates a dataset with explicit registries.
    ///
    /// # Errors
    ///
    /// Returns an error if the background executor cannot be started.
    pub fn with_registries(
        config: &AtomioConfig,
        formats: Arc<FormatRegistry>,
        exporters: Arc<ExporterRegistry>,
    ) -> Result<Self> {
        let executor = BackgroundExecutor::new(config.background_threads)?;
        Ok(Self {
            scene: Scene::new(),
            animation: Arc::new(AnimationSettings::new()),
            executor: Arc::new(executor),
            formats,
            exporters,
            reader: ResourceReader::from_config(config),
            config: config.clone(),
        })
    }

    /// Replaces the resource reader, e.g. to install another remote fetcher.
    #[must_use]
    pub fn with_reader(mut self, reader: ResourceReader) -> Self {
        self.reader = reader;
        self
    }

    /// The scene.
    #[must_use]
    pub const fn scene(&self) -> &Scene {
        &self.scene
    }

    /// Animation settings.
    #[must_use]
    pub const fn animation(&self) -> &Arc<AnimationSettings> {
        &self.animation
    }

    /// The current animation time.
    #[must_use]
    pub fn current_time(&self) -> TimePoint {
        self.animation.current_time()
    }

    /// Moves the animation to `time`.
    pub fn set_current_time(&self, time: TimePoint) {
        self.animation.set_current_time(time);
    }

    /// The executor loads run on.
    #[must_use]
    pub const fn executor(&self) -> &Arc<BackgroundExecutor> {
        &self.executor
    }

    /// The manager tracking running operations.
    #[must_use]
    pub fn task_manager(&self) -> Arc<TaskManager> {
        Arc::clone(self.executor.task_manager())
    }

    /// Importer registry.
    #[must_use]
    pub const fn formats(&self) -> &Arc<FormatRegistry> {
        &self.formats
    }

    /// Exporter registry.
    #[must_use]
    pub const fn exporters(&self) -> &Arc<ExporterRegistry> {
        &self.exporters
    }

    /// Reader for locations.
    #[must_use]
    pub const fn reader(&self) -> &ResourceReader {
        &self.reader
    }

    /// Configuration the dataset was created with.
    #[must_use]
    pub const fn config(&self) -> &AtomioConfig {
        &self.config
    }

    /// Services handed to new file sources.
    #[must_use]
    pub fn source_context(&self) -> SourceContext {
        SourceContext {
            executor: Arc::clone(&self.executor),
            formats: Arc::clone(&self.formats),
            reader: self.reader.clone(),
            animation: Arc::clone(&self.animation),
            adjust_animation_interval: self.config.adjust_animation_interval,
        }
    }
}
