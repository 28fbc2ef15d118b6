//! A pipeline source that loads its data from an external file.
//!
//! # State machine
//!
//! ```text
//! Unloaded ──set_source──▶ Loading ──completed──▶ Ready | Failed
//!                             │
//!                             └──canceled──▶ state before the request
//! ```
//!
//! Every load runs as one background operation. Starting a new load
//! supersedes the previous one: it is canceled and awaited before anything
//! else changes. A canceled load restores the complete state the source had
//! before the request (location, importer, frames, data, status), so a
//! source that was unloaded before becomes unloaded again.
//!
//! Terminal state transitions are applied on the background thread before
//! the operation's outcome becomes visible, so a caller returning from a
//! wait always observes them.

use crate::dataset::AnimationSettings;
use crate::io::{FormatRegistry, ImporterRef, ResourceReader};
use crate::models::{DataCollection, FrameDescriptor, Location, OptionMap, PipelineStatus, TimePoint};
use crate::pipeline::{BackgroundExecutor, Outcome, PendingOperation, TaskContext};
use crate::{Error, Result};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Lifecycle state of a [`FileSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    /// No location has been loaded.
    Unloaded,
    /// A load operation is running.
    Loading,
    /// The last load completed without an error status.
    Ready,
    /// The last load completed with an error status.
    Failed,
}

/// What a completed load operation produced.
#[derive(Debug, Clone)]
pub struct LoadResult {
    /// Frames of the source file.
    pub frames: Vec<FrameDescriptor>,
    /// Index of the loaded frame.
    pub frame: usize,
    /// The loaded data.
    pub data: DataCollection,
}

/// Services a [`FileSource`] needs from its dataset.
#[derive(Debug, Clone)]
pub struct SourceContext {
    /// Runs load operations.
    pub executor: Arc<BackgroundExecutor>,
    /// Detects formats on reload.
    pub formats: Arc<FormatRegistry>,
    /// Opens locations.
    pub reader: ResourceReader,
    /// Animation time and interval.
    pub animation: Arc<AnimationSettings>,
    /// Whether loading a multi-frame file resizes the animation interval.
    pub adjust_animation_interval: bool,
}

#[derive(Debug, Clone)]
struct Snapshot {
    location: Option<Location>,
    importer: Option<ImporterRef>,
    frames: Vec<FrameDescriptor>,
    loaded_frame: Option<usize>,
    data: Option<DataCollection>,
    status: PipelineStatus,
    state: SourceState,
    /// Option values to bind back onto `importer`, if a load rebound it.
    importer_options: Option<serde_json::Value>,
}

#[derive(Debug)]
struct SourceInner {
    location: Option<Location>,
    importer: Option<ImporterRef>,
    frames: Vec<FrameDescriptor>,
    loaded_frame: Option<usize>,
    data: Option<DataCollection>,
    status: PipelineStatus,
    state: SourceState,
    pending: Option<PendingOperation<LoadResult>>,
    rollback: Option<Snapshot>,
    generation: u64,
    playback_start_time: TimePoint,
}

impl SourceInner {
    const fn new() -> Self {
        Self {
            location: None,
            importer: None,
            frames: Vec::new(),
            loaded_frame: None,
            data: None,
            status: PipelineStatus::Ok,
            state: SourceState::Unloaded,
            pending: None,
            rollback: None,
            generation: 0,
            playback_start_time: 0,
        }
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            location: self.location.clone(),
            importer: self.importer.clone(),
            frames: self.frames.clone(),
            loaded_frame: self.loaded_frame,
            data: self.data.clone(),
            status: self.status.clone(),
            // A snapshot taken mid-load rolls back to the last settled state.
            state: match self.state {
                SourceState::Loading => self
                    .rollback
                    .as_ref()
                    .map_or(SourceState::Unloaded, |s| s.state),
                other => other,
            },
            importer_options: None,
        }
    }

    fn restore(&mut self, snapshot: Snapshot) {
        if let (Some(importer), Some(values)) = (&snapshot.importer, snapshot.importer_options) {
            if let Err(error) = importer.restore_options(values) {
                tracing::warn!(error = %error, "Failed to restore importer options");
            }
        }
        self.location = snapshot.location;
        self.importer = snapshot.importer;
        self.frames = snapshot.frames;
        self.loaded_frame = snapshot.loaded_frame;
        self.data = snapshot.data;
        self.status = snapshot.status;
        self.state = snapshot.state;
    }

    fn time_to_frame(&self, time: TimePoint) -> usize {
        time_to_frame(time, self.playback_start_time, self.frames.len())
    }
}

fn time_to_frame(time: TimePoint, start: TimePoint, frame_count: usize) -> usize {
    if frame_count == 0 {
        return 0;
    }
    let offset = usize::try_from(i64::from(time) - i64::from(start)).unwrap_or(0);
    offset.min(frame_count - 1)
}

fn lock_inner(inner: &Mutex<SourceInner>) -> MutexGuard<'_, SourceInner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Which frame a load operation should produce.
#[derive(Debug, Clone, Copy)]
enum FrameChoice {
    /// Rescan (if enabled) and load the frame for the animation time.
    Rescan,
    /// Load the given frame of the known frame list.
    Index(usize),
}

/// A data source backed by a file, loaded through an [`Importer`](crate::Importer).
#[derive(Debug)]
pub struct FileSource {
    inner: Arc<Mutex<SourceInner>>,
    serial: Mutex<()>,
    context: SourceContext,
}

impl FileSource {
    /// Creates an unloaded source.
    #[must_use]
    pub fn new(context: SourceContext) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SourceInner::new())),
            serial: Mutex::new(()),
            context,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SourceInner> {
        lock_inner(&self.inner)
    }

    /// Serializes reloads and waits on this source.
    fn serial(&self) -> MutexGuard<'_, ()> {
        self.serial.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Points the source at a new location and starts loading it.
    ///
    /// With `importer == None` the format is detected; the current importer
    /// is kept (with its options) if the detected format is the same.
    /// Returns without waiting for the load.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedFormat`] if detection fails, or
    /// [`Error::ImportFailed`] if the location cannot be read.
    pub fn set_source(
        &self,
        location: Location,
        importer: Option<ImporterRef>,
    ) -> Result<PendingOperation<LoadResult>> {
        let _serial = self.serial();
        self.supersede();
        let importer = match importer {
            Some(importer) => importer,
            None => self.detect_importer(&location)?,
        };
        Ok(self.start_load(Some(location), Some(importer), FrameChoice::Rescan))
    }

    /// Reloads the source from `location` with `options`, blocking until done.
    ///
    /// If the load is canceled, a reused importer gets back the options it
    /// had before the call.
    ///
    /// # Errors
    ///
    /// Returns a detection or binding error before any loading starts,
    /// [`Error::Canceled`] if the load was canceled, or
    /// [`Error::ImportFailed`] if it completed with an error status.
    #[tracing::instrument(skip(self, options), fields(location = %location))]
    pub fn load(&self, location: &Location, options: &OptionMap) -> Result<()> {
        let _serial = self.serial();
        self.supersede();
        let importer = self.detect_importer(location)?;
        let previous_options = importer.options()?;
        importer.bind(options)?;
        {
            let mut inner = self.lock();
            self.spawn_load(
                &mut inner,
                Some(location.clone()),
                Some(importer.clone()),
                FrameChoice::Rescan,
            );
            // The importer is shared with the rollback state when reused.
            if let Some(rollback) = inner
                .rollback
                .as_mut()
                .filter(|r| r.importer.as_ref().is_some_and(|i| i.ptr_eq(&importer)))
            {
                rollback.importer_options = Some(previous_options);
            }
        }
        let time = self.context.animation.current_time();
        if !self.wait_locked(time, "Waiting for the file to load") {
            return Err(Error::Canceled);
        }
        match self.status() {
            PipelineStatus::Error(message) => Err(Error::ImportFailed(message)),
            _ => Ok(()),
        }
    }

    /// The location currently loaded or loading.
    #[must_use]
    pub fn source_path(&self) -> Option<Location> {
        self.lock().location.clone()
    }

    /// Reloads from a new location with format detection.
    ///
    /// # Errors
    ///
    /// See [`set_source`](Self::set_source).
    pub fn set_source_path(&self, location: Location) -> Result<()> {
        self.set_source(location, None).map(|_| ())
    }

    /// The importer used by the current or last load.
    #[must_use]
    pub fn importer(&self) -> Option<ImporterRef> {
        self.lock().importer.clone()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SourceState {
        self.lock().state
    }

    /// Status of the last completed load.
    #[must_use]
    pub fn status(&self) -> PipelineStatus {
        self.lock().status.clone()
    }

    /// Returns true while a load operation is running.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.lock()
            .pending
            .as_ref()
            .is_some_and(|op| !op.is_finished())
    }

    /// The running load operation, if any.
    #[must_use]
    pub fn pending_operation(&self) -> Option<PendingOperation<LoadResult>> {
        self.lock().pending.clone()
    }

    /// Requests cancellation of the running load without waiting.
    pub fn cancel_load(&self) {
        if let Some(op) = &self.lock().pending {
            op.cancel();
        }
    }

    /// Frames found in the source file.
    #[must_use]
    pub fn frames(&self) -> Vec<FrameDescriptor> {
        self.lock().frames.clone()
    }

    /// Number of frames in the source file.
    #[must_use]
    pub fn num_frames(&self) -> usize {
        self.lock().frames.len()
    }

    /// Index of the frame whose data is held.
    #[must_use]
    pub fn loaded_frame(&self) -> Option<usize> {
        self.lock().loaded_frame
    }

    /// Animation time at which frame 0 is shown.
    #[must_use]
    pub fn playback_start_time(&self) -> TimePoint {
        self.lock().playback_start_time
    }

    /// Sets the animation time at which frame 0 is shown.
    pub fn set_playback_start_time(&self, time: TimePoint) {
        self.lock().playback_start_time = time;
    }

    /// Frame shown at an animation time, clamped to the available frames.
    #[must_use]
    pub fn animation_time_to_frame(&self, time: TimePoint) -> usize {
        self.lock().time_to_frame(time)
    }

    /// Animation time at which a frame is shown.
    #[must_use]
    pub fn frame_to_animation_time(&self, frame: usize) -> TimePoint {
        let start = self.lock().playback_start_time;
        start.saturating_add(TimePoint::try_from(frame).unwrap_or(TimePoint::MAX))
    }

    /// Rescans the source file for frames and reloads.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if no location has been set.
    pub fn update_frames(&self) -> Result<PendingOperation<LoadResult>> {
        let _serial = self.serial();
        self.supersede();
        let (location, importer) = self.current_source()?;
        Ok(self.start_load(Some(location), Some(importer), FrameChoice::Rescan))
    }

    /// Reloads one frame from the file, even if it is already loaded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if no location has been set or the
    /// frame does not exist.
    pub fn refresh_from_source(&self, frame: usize) -> Result<PendingOperation<LoadResult>> {
        let _serial = self.serial();
        self.supersede();
        let (location, importer) = self.current_source()?;
        if frame >= self.num_frames() {
            return Err(Error::InvalidInput(format!(
                "frame {frame} does not exist in {}",
                location.display_string()
            )));
        }
        Ok(self.start_load(Some(location), Some(importer), FrameChoice::Index(frame)))
    }

    /// Data for `time` as currently held, without waiting.
    ///
    /// If the held frame does not match `time` and nothing is loading, a
    /// load of the matching frame is started in the background.
    #[must_use]
    pub fn evaluate(&self, time: TimePoint) -> DataCollection {
        self.request_frame(time);
        self.current_data()
    }

    /// Blocks until the data for `time` is loaded or has failed to load.
    ///
    /// Returns false if and only if the wait ended because the load was
    /// canceled.
    #[must_use]
    pub fn wait_until_ready(&self, time: TimePoint, reason: &str) -> bool {
        let _serial = self.serial();
        self.wait_locked(time, reason)
    }

    /// Blocking data access for scripts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Canceled`] if the load was canceled and
    /// [`Error::ImportFailed`] if it completed with an error status.
    pub fn data(&self, time: TimePoint) -> Result<DataCollection> {
        if !self.wait_until_ready(time, "Waiting for data") {
            return Err(Error::Canceled);
        }
        let data = self.current_data();
        if let PipelineStatus::Error(message) = data.status() {
            return Err(Error::ImportFailed(message.clone()));
        }
        Ok(data)
    }

    fn current_data(&self) -> DataCollection {
        let inner = self.lock();
        let mut data = inner.data.clone().unwrap_or_default();
        data.set_status(inner.status.clone());
        data
    }

    fn current_source(&self) -> Result<(Location, ImporterRef)> {
        let inner = self.lock();
        match (&inner.location, &inner.importer) {
            (Some(location), Some(importer)) => Ok((location.clone(), importer.clone())),
            _ => Err(Error::InvalidInput(
                "the source has no file location".to_string(),
            )),
        }
    }

    /// Detects the format of `location`, reusing the current importer when
    /// the format is unchanged.
    fn detect_importer(&self, location: &Location) -> Result<ImporterRef> {
        let descriptor = self
            .context
            .formats
            .detect(location, &self.context.reader)?
            .ok_or_else(|| Error::UnsupportedFormat {
                location: location.display_string(),
            })?;
        if let Some(current) = self.importer() {
            if current.format_name()? == descriptor.name {
                tracing::debug!(format = descriptor.name, "Reusing importer");
                return Ok(current);
            }
        }
        self.context.formats.create_importer(descriptor.name)
    }

    /// Cancels the running load and waits for it to settle.
    fn supersede(&self) {
        let pending = self.lock().pending.clone();
        if let Some(op) = pending {
            if !op.is_finished() {
                tracing::debug!(task = op.id(), "Superseding running load");
                op.cancel();
            }
            let _ = op.join();
            self.clear_pending(&op);
        }
    }

    fn clear_pending(&self, op: &PendingOperation<LoadResult>) {
        let mut inner = self.lock();
        if inner.pending.as_ref().is_some_and(|p| p.id() == op.id()) {
            inner.pending = None;
        }
    }

    fn wait_locked(&self, time: TimePoint, reason: &str) -> bool {
        let mut requested = false;
        loop {
            let pending = self.lock().pending.clone();
            if let Some(op) = pending {
                if op.wait(reason).is_canceled() {
                    return false;
                }
                self.clear_pending(&op);
                continue;
            }
            if requested || !self.request_frame(time) {
                return true;
            }
            requested = true;
        }
    }

    /// Starts loading the frame for `time` unless it is held or a load is
    /// running.
    ///
    /// The check and the spawn happen under one lock. Returns false if
    /// there is nothing to wait for.
    fn request_frame(&self, time: TimePoint) -> bool {
        let mut inner = self.lock();
        if inner.pending.is_some() {
            return true;
        }
        let frame = inner.time_to_frame(time);
        if inner.state != SourceState::Ready || inner.loaded_frame == Some(frame) {
            return false;
        }
        let (Some(location), Some(importer)) = (inner.location.clone(), inner.importer.clone())
        else {
            return false;
        };
        self.spawn_load(&mut inner, Some(location), Some(importer), FrameChoice::Index(frame));
        true
    }

    fn start_load(
        &self,
        location: Option<Location>,
        importer: Option<ImporterRef>,
        choice: FrameChoice,
    ) -> PendingOperation<LoadResult> {
        let mut inner = self.lock();
        self.spawn_load(&mut inner, location, importer, choice)
    }

    /// Spawns a load operation; the caller holds the state lock.
    fn spawn_load(
        &self,
        inner: &mut SourceInner,
        location: Option<Location>,
        importer: Option<ImporterRef>,
        choice: FrameChoice,
    ) -> PendingOperation<LoadResult> {
        let rollback = inner.snapshot();
        inner.generation += 1;
        let generation = inner.generation;
        inner.location.clone_from(&location);
        inner.importer.clone_from(&importer);
        inner.state = SourceState::Loading;
        inner.rollback = Some(rollback);

        let known_frames = match choice {
            FrameChoice::Rescan => None,
            FrameChoice::Index(_) => Some(inner.frames.clone()),
        };
        let start_time = inner.playback_start_time;
        let reader = self.context.reader.clone();
        let animation = Arc::clone(&self.context.animation);
        let label = location
            .as_ref()
            .map_or_else(|| "Loading file".to_string(), |l| format!("Loading {}", l.display_string()));

        let work = move |ctx: &TaskContext| -> Result<LoadResult> {
            let (Some(location), Some(importer)) = (location, importer) else {
                return Err(Error::InvalidInput("the source has no file location".to_string()));
            };
            run_load(&importer, &reader, &location, known_frames, choice, start_time, &animation, ctx)
        };

        let shared = Arc::clone(&self.inner);
        let animation = Arc::clone(&self.context.animation);
        let adjust_interval = self.context.adjust_animation_interval;
        let rescan = matches!(choice, FrameChoice::Rescan);
        let on_complete = move |outcome: &Outcome<LoadResult>| {
            let mut inner = lock_inner(&shared);
            if inner.generation != generation {
                return;
            }
            inner.pending = None;
            match outcome {
                Outcome::Canceled => {
                    if let Some(snapshot) = inner.rollback.take() {
                        inner.restore(snapshot);
                    }
                    metrics::counter!("atomio_loads_total", "outcome" => "canceled").increment(1);
                    tracing::info!("File load canceled; previous state restored");
                },
                Outcome::Completed(Ok(result)) => {
                    inner.rollback = None;
                    inner.frames.clone_from(&result.frames);
                    inner.loaded_frame = Some(result.frame);
                    inner.status = result.data.status().clone();
                    inner.data = Some(result.data.clone());
                    inner.state = if inner.status.is_error() {
                        SourceState::Failed
                    } else {
                        SourceState::Ready
                    };
                    if adjust_interval && rescan && result.frames.len() > 1 {
                        let start = inner.playback_start_time;
                        let last = start.saturating_add(
                            TimePoint::try_from(result.frames.len() - 1).unwrap_or(TimePoint::MAX),
                        );
                        animation.set_interval(start, last);
                    }
                    metrics::counter!("atomio_loads_total", "outcome" => "completed").increment(1);
                },
                Outcome::Completed(Err(error)) => {
                    inner.rollback = None;
                    if rescan {
                        inner.frames.clear();
                        inner.loaded_frame = None;
                    }
                    inner.status = PipelineStatus::error(status_message(error));
                    inner.state = SourceState::Failed;
                    metrics::counter!("atomio_loads_total", "outcome" => "failed").increment(1);
                    tracing::warn!(error = %error, "File load failed");
                },
            }
        };

        let op = self
            .context
            .executor
            .spawn_with_completion(label, work, on_complete);
        // Still holding the lock, so the completion handler cannot run first.
        inner.pending = Some(op.clone());
        op
    }
}

impl Drop for FileSource {
    fn drop(&mut self) {
        if let Some(op) = self.lock().pending.take() {
            op.cancel();
        }
    }
}

/// Body of a load operation.
#[allow(clippy::too_many_arguments)]
fn run_load(
    importer: &ImporterRef,
    reader: &ResourceReader,
    location: &Location,
    known_frames: Option<Vec<FrameDescriptor>>,
    choice: FrameChoice,
    start_time: TimePoint,
    animation: &AnimationSettings,
    ctx: &TaskContext,
) -> Result<LoadResult> {
    let importer = importer.read()?;
    let frames = match known_frames {
        Some(frames) => frames,
        None if importer.multiple_frames() => {
            let mut stream = reader.open(location)?;
            importer.scan_frames(location, &mut *stream, ctx)?
        },
        None => vec![FrameDescriptor::whole_file(location.clone())],
    };
    ctx.checkpoint()?;
    if frames.is_empty() {
        return Err(Error::ImportFailed(format!(
            "{} contains no frames",
            location.display_string()
        )));
    }

    let frame = match choice {
        FrameChoice::Rescan => time_to_frame(animation.current_time(), start_time, frames.len()),
        FrameChoice::Index(index) => index.min(frames.len() - 1),
    };
    let descriptor = &frames[frame];
    let mut stream = reader.open_at(&descriptor.location, descriptor.byte_offset)?;
    let mut data = importer.load_frame(descriptor, &mut *stream, ctx)?;
    data.attributes
        .insert("SourceFrame".to_string(), serde_json::Value::from(frame));
    tracing::debug!(frame, frames = frames.len(), particles = data.particle_count(), "Frame loaded");
    Ok(LoadResult { frames, frame, data })
}

/// User-facing message for a failed load.
fn status_message(error: &Error) -> String {
    match error {
        Error::ImportFailed(message) => message.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_to_frame_clamps() {
        assert_eq!(time_to_frame(5, 0, 0), 0);
        assert_eq!(time_to_frame(-3, 0, 4), 0);
        assert_eq!(time_to_frame(2, 0, 4), 2);
        assert_eq!(time_to_frame(10, 0, 4), 3);
        assert_eq!(time_to_frame(12, 10, 4), 2);
    }

    #[test]
    fn test_status_message_uses_plugin_text() {
        assert_eq!(status_message(&Error::ImportFailed("bad line".into())), "bad line");
        assert!(status_message(&Error::operation("read", "eof")).contains("eof"));
    }

    #[test]
    fn test_snapshot_mid_load_keeps_settled_state() {
        let mut inner = SourceInner::new();
        inner.state = SourceState::Ready;
        let settled = inner.snapshot();
        inner.rollback = Some(settled);
        inner.state = SourceState::Loading;
        assert_eq!(inner.snapshot().state, SourceState::Ready);
    }
}
