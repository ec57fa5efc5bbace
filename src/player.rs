// src/player.rs

use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::PlayerConfig;
use crate::decoder::{self, AudioSource, PlayerEvent, SourceFile};
use crate::engine::buffer::PcmBuffer;
use crate::engine::sink::{CompletionCallback, RenderSink, ScheduleRequest};
use crate::engine::time::{Tick, TimeBase};
use crate::engine::window::{compute_load_window, seconds_to_frame, PlaybackWindow};
use crate::engine::PlaybackState;
use crate::error::{PlayerError, Result};

/// Construction phase of a controller.
///
/// A `Constructing` controller can load and configure its buffer, but every
/// transport operation fails with [`PlayerError::NotReady`] until a render
/// sink has been attached.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    Constructing,
    Active,
}

/// Called once each time playback reaches its natural end (never while looping).
pub type CompletionHandler = Box<dyn FnMut() + Send + 'static>;

// `version` changes on every set/clear so a handler running outside the
// lock can tell whether it was replaced meanwhile.
#[derive(Default)]
struct HandlerSlot {
    handler: Option<CompletionHandler>,
    version: u64,
}

struct WindowReject {
    start: f64,
    end: f64,
    reason: &'static str,
    zero_length: bool,
}

struct PlayerInner {
    lifecycle: Lifecycle,
    source: Box<dyn SourceFile>,
    info: AudioSource,
    window: PlaybackWindow,
    // window + reversed flag the current buffer was built for
    built_for: Option<(PlaybackWindow, bool)>,
    buffer: Option<Arc<PcmBuffer>>,
    state: PlaybackState,
    looping: bool,
    reversed: bool,
    volume: f32,
    pan: f32,
    last_playhead: f64,
    pending_instant: Option<Tick>,
    generation: u64,
    sink: Option<Box<dyn RenderSink>>,
    events_tx: Sender<PlayerEvent>,
    events_rx: Receiver<PlayerEvent>,
}

impl PlayerInner {
    fn sample_rate(&self) -> f64 {
        self.info.sample_rate
    }

    fn duration(&self) -> f64 {
        self.info.duration()
    }

    fn start_time(&self) -> f64 {
        self.window.start_time(self.sample_rate())
    }

    fn end_time(&self) -> f64 {
        self.window.end_time(self.sample_rate())
    }

    fn require_active(&self) -> Result<()> {
        if self.lifecycle == Lifecycle::Active && self.sink.is_some() {
            Ok(())
        } else {
            log::warn!("transport request ignored: no render sink attached yet");
            Err(PlayerError::NotReady)
        }
    }

    fn has_audio(&self) -> bool {
        self.buffer.as_ref().is_some_and(|b| !b.is_empty())
    }

    /// Reset the window to the whole source and build a fresh buffer.
    fn initialize(&mut self) -> Result<()> {
        self.window = PlaybackWindow::full(self.info.total_frames);
        self.built_for = None;
        self.buffer = None;

        if self.info.total_frames == 0 {
            log::warn!("{:?} is an empty file", self.source.path());
            return Ok(());
        }
        self.rebuild()
    }

    fn reject(&self, r: WindowReject) -> PlayerError {
        let err = PlayerError::InvalidWindow {
            requested_start: r.start,
            requested_end: r.end,
            bound: self.duration(),
            reason: r.reason,
        };
        log::warn!(
            "{} (current window {:.6}s..{:.6}s of {:?})",
            err,
            self.start_time(),
            self.end_time(),
            self.source.path()
        );
        err
    }

    /// Resolve requested times to frames. `None` keeps the current edge;
    /// an end of zero means the end of the file.
    fn candidate_window(
        &self,
        start: Option<f64>,
        end: Option<f64>,
    ) -> std::result::Result<PlaybackWindow, WindowReject> {
        let sr = self.sample_rate();
        let total = self.info.total_frames;
        let req_start = start.unwrap_or_else(|| self.start_time());
        let req_end = end.unwrap_or_else(|| self.end_time());
        let reject = |reason, zero_length| WindowReject {
            start: req_start,
            end: req_end,
            reason,
            zero_length,
        };

        if !req_start.is_finite() || !req_end.is_finite() || req_start < 0.0 || req_end < 0.0 {
            return Err(reject("times must be finite and non-negative", false));
        }

        let start_frame = match start {
            Some(s) => seconds_to_frame(s, sr),
            None => self.window.start_frame,
        };
        let end_frame = match end {
            Some(e) if e == 0.0 => total,
            Some(e) => {
                if e > self.duration() {
                    return Err(reject("end is beyond the file duration", false));
                }
                seconds_to_frame(e, sr).min(total)
            }
            None => self.window.end_frame,
        };

        if start_frame > end_frame {
            return Err(reject("start is after end", true));
        }
        if start_frame == end_frame {
            return Err(reject("window is empty", true));
        }
        Ok(PlaybackWindow {
            start_frame,
            end_frame,
        })
    }

    fn apply_window(&mut self, candidate: PlaybackWindow) -> Result<()> {
        if self.window == candidate && self.built_for == Some((candidate, self.reversed)) {
            log::debug!("window {:?} unchanged, keeping current buffer", candidate);
            return Ok(());
        }

        let previous = self.window;
        self.window = candidate;
        if let Err(e) = self.rebuild() {
            self.window = previous;
            return Err(e);
        }
        log::info!(
            "window set to {:.6}s..{:.6}s (frames {}..{})",
            self.start_time(),
            self.end_time(),
            candidate.start_frame,
            candidate.end_frame
        );
        Ok(())
    }

    /// Read the window into a new buffer, reversing it if needed. The
    /// previous buffer stays in place unless every step succeeds.
    fn rebuild(&mut self) -> Result<()> {
        let range = compute_load_window(&self.window, self.reversed, self.info.total_frames);
        if range.is_empty() {
            return Err(self.reject(WindowReject {
                start: self.start_time(),
                end: self.end_time(),
                reason: "window is empty",
                zero_length: true,
            }));
        }

        let mut buffer = PcmBuffer::allocate(range.frames(), self.info.channel_count)?;
        let read = buffer.load_from(self.source.as_mut(), range.start, range.frames())?;
        if self.reversed {
            buffer.reverse_in_place();
        }
        log::info!(
            "read {} frames into buffer (source frames {}..{}{})",
            read,
            range.start,
            range.end,
            if self.reversed { ", reversed" } else { "" }
        );

        self.buffer = Some(Arc::new(buffer));
        self.built_for = Some((self.window, self.reversed));

        // anything already handed to the sink is now stale
        if self.state != PlaybackState::Stopped && self.sink.is_some() {
            if let Err(e) = self.schedule(None) {
                log::warn!("rebuilt buffer cannot be played, stopping: {}", e);
                self.halt();
                return Ok(());
            }
            if self.state == PlaybackState::Playing {
                if let Some(sink) = self.sink.as_mut() {
                    sink.play();
                }
            }
        }
        Ok(())
    }

    /// Hand the buffer to the sink under a new generation.
    fn schedule(&mut self, at: Option<Tick>) -> Result<()> {
        self.generation = self.generation.wrapping_add(1);
        self.send_to_sink(at)
    }

    fn send_to_sink(&mut self, at: Option<Tick>) -> Result<()> {
        let buffer = match &self.buffer {
            Some(b) if !b.is_empty() => b.clone(),
            _ => return Err(PlayerError::EmptyBuffer),
        };
        let generation = self.generation;
        let looping = self.looping;
        let tx = self.events_tx.clone();
        let Some(sink) = self.sink.as_mut() else {
            return Err(PlayerError::NotReady);
        };

        let on_complete: CompletionCallback = Arc::new(move || {
            let _ = tx.send(PlayerEvent::RenderCompleted { generation });
        });

        log::debug!(
            "scheduling {} frames at {:?} (loop: {}, generation {})",
            buffer.frame_length(),
            at,
            looping,
            generation
        );
        sink.schedule(ScheduleRequest { buffer, at, looping }, on_complete);
        Ok(())
    }

    fn current_elapsed(&self) -> f64 {
        if self.state == PlaybackState::Playing {
            if let Some(t) = self.sink.as_ref().and_then(|s| s.elapsed_since_scheduled()) {
                return t;
            }
        }
        self.last_playhead
    }

    fn playhead(&self) -> f64 {
        let start = self.start_time();
        let end = self.end_time();
        if end <= start {
            return 0.0;
        }

        let t = self.current_elapsed();
        let span = end - start;
        if self.looping {
            start + t % span
        } else if t > end {
            // past the end without looping: wraps like the looping case
            (start + t) % span
        } else {
            start + t
        }
    }

    fn start(&mut self) -> Result<()> {
        self.require_active()?;

        if self.state == PlaybackState::Playing {
            log::warn!("start ignored: already playing");
            return Ok(());
        }
        if !self.has_audio() {
            log::warn!("cannot play an empty buffer ({:?})", self.source.path());
            return Err(PlayerError::EmptyBuffer);
        }

        // a paused buffer is still scheduled; rescheduling would restart it
        if self.state != PlaybackState::Paused {
            let at = self.pending_instant.take();
            self.schedule(at)?;
        }
        if let Some(sink) = self.sink.as_mut() {
            sink.play();
        }
        self.state = PlaybackState::Playing;
        log::info!("▶️ Playing {:?}", self.source.path());
        Ok(())
    }

    /// Move to `Stopped`. The remembered position goes back to the window start.
    fn halt(&mut self) {
        self.last_playhead = self.start_time();
        if let Some(sink) = self.sink.as_mut() {
            sink.stop();
        }
        self.state = PlaybackState::Stopped;
    }

    fn stop(&mut self) -> Result<()> {
        self.require_active()?;
        if self.state == PlaybackState::Stopped {
            return Ok(());
        }
        self.halt();
        log::info!("⏹️ Stopped");
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.require_active()?;
        match self.state {
            PlaybackState::Playing => {
                self.last_playhead = self.current_elapsed();
                if let Some(sink) = self.sink.as_mut() {
                    sink.pause();
                }
                self.state = PlaybackState::Paused;
                log::info!("⏸️ Paused at {:.3}s", self.last_playhead);
            }
            PlaybackState::Paused => log::warn!("pause ignored: already paused"),
            PlaybackState::Stopped => log::warn!("pause ignored: not playing"),
        }
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        self.require_active()?;
        if self.state != PlaybackState::Paused {
            log::debug!("resume ignored while {:?}", self.state);
            return Ok(());
        }
        if let Some(sink) = self.sink.as_mut() {
            sink.play();
        }
        self.state = PlaybackState::Playing;
        log::info!("▶️ Resumed");
        Ok(())
    }

    /// Swap in a new source. On failure the previous source and buffer stay.
    fn install_source(&mut self, fresh: Box<dyn SourceFile>) -> Result<()> {
        let old_source = std::mem::replace(&mut self.source, fresh);
        let old = (self.info, self.window, self.built_for, self.buffer.take());

        self.info = self.source.info();
        if let Err(e) = self.initialize() {
            self.source = old_source;
            (self.info, self.window, self.built_for, self.buffer) = old;
            log::error!("could not load {:?}: {}", self.source.path(), e);
            return Err(e);
        }
        self.last_playhead = 0.0;
        Ok(())
    }
}

/// Sample-accurate player for one audio source.
///
/// Every method takes `&self`; all state lives behind one lock, so a shared
/// controller can be driven from a control thread while a render sink
/// reports completions from its own thread. Completions arrive as messages
/// and are applied by [`PlaybackController::process_events`].
///
/// The event queue is unbounded and a looping buffer posts one message per
/// pass, so `process_events` has to be called regularly (once per UI tick
/// is plenty) for as long as the controller is playing.
pub struct PlaybackController {
    inner: Mutex<PlayerInner>,
    completion_handler: Mutex<HandlerSlot>,
}

impl PlaybackController {
    /// Load `source` and build the initial full-length buffer.
    pub fn new(source: Box<dyn SourceFile>) -> Result<Self> {
        let (events_tx, events_rx) = channel();
        let info = source.info();

        let mut inner = PlayerInner {
            lifecycle: Lifecycle::Constructing,
            source,
            info,
            window: PlaybackWindow::full(info.total_frames),
            built_for: None,
            buffer: None,
            state: PlaybackState::Stopped,
            looping: false,
            reversed: false,
            volume: 1.0,
            pan: 0.0,
            last_playhead: 0.0,
            pending_instant: None,
            generation: 0,
            sink: None,
            events_tx,
            events_rx,
        };
        inner.initialize()?;

        Ok(Self {
            inner: Mutex::new(inner),
            completion_handler: Mutex::new(HandlerSlot::default()),
        })
    }

    /// Open and decode a file on disk.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::new(decoder::open(path)?)
    }

    fn lock(&self) -> MutexGuard<'_, PlayerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // --- LIFECYCLE ---

    /// Attach the render sink and become `Active`. A previously attached
    /// sink is stopped and detached first.
    pub fn attach(&self, mut sink: Box<dyn RenderSink>) -> Result<()> {
        if let Err(e) = sink.attach() {
            log::error!("render sink refused to attach: {}", e);
            return Err(e);
        }

        let mut inner = self.lock();
        if inner.state != PlaybackState::Stopped {
            inner.halt();
        }
        if let Some(mut old) = inner.sink.take() {
            old.detach();
        }
        sink.set_volume(inner.volume);
        sink.set_pan(inner.pan);
        inner.sink = Some(sink);
        inner.lifecycle = Lifecycle::Active;
        log::info!("🔌 render sink attached");
        Ok(())
    }

    /// Stop, detach the sink, and fall back to `Constructing`.
    pub fn detach(&self) -> Option<Box<dyn RenderSink>> {
        let mut inner = self.lock();
        if inner.state != PlaybackState::Stopped {
            inner.halt();
        }
        inner.lifecycle = Lifecycle::Constructing;
        let mut sink = inner.sink.take();
        if let Some(s) = sink.as_mut() {
            s.detach();
        }
        sink
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lock().lifecycle
    }

    pub fn is_ready(&self) -> bool {
        self.lifecycle() == Lifecycle::Active
    }

    pub fn apply_config(&self, config: &PlayerConfig) -> Result<()> {
        self.set_looping(config.looping);
        self.set_volume(config.volume);
        self.set_pan(config.pan);
        self.set_reversed(config.reversed)?;
        if config.start_time != 0.0 || config.end_time != 0.0 {
            self.set_window(config.start_time, config.end_time)?;
        }
        self.set_scheduled_time(config.schedule_delay);
        Ok(())
    }

    // --- WINDOW ---

    /// Set both edit points (seconds). An `end` of 0 means the end of the file.
    /// Invalid requests are rejected and leave the current window in place.
    pub fn set_window(&self, start: f64, end: f64) -> Result<()> {
        let mut inner = self.lock();
        let candidate = inner
            .candidate_window(Some(start), Some(end))
            .map_err(|r| inner.reject(r))?;
        inner.apply_window(candidate)
    }

    pub fn set_start_time(&self, start: f64) -> Result<()> {
        let mut inner = self.lock();
        let candidate = inner
            .candidate_window(Some(start), None)
            .map_err(|r| inner.reject(r))?;
        inner.apply_window(candidate)
    }

    /// An `end` of 0 resets the end to the full file length.
    pub fn set_end_time(&self, end: f64) -> Result<()> {
        let mut inner = self.lock();
        let candidate = inner
            .candidate_window(None, Some(end))
            .map_err(|r| inner.reject(r))?;
        inner.apply_window(candidate)
    }

    pub fn window(&self) -> PlaybackWindow {
        self.lock().window
    }

    pub fn start_time(&self) -> f64 {
        self.lock().start_time()
    }

    pub fn end_time(&self) -> f64 {
        self.lock().end_time()
    }

    pub fn set_reversed(&self, reversed: bool) -> Result<()> {
        let mut inner = self.lock();
        if inner.reversed == reversed {
            return Ok(());
        }
        inner.reversed = reversed;
        if inner.info.total_frames == 0 {
            return Ok(());
        }
        if let Err(e) = inner.rebuild() {
            inner.reversed = !reversed;
            return Err(e);
        }
        Ok(())
    }

    pub fn is_reversed(&self) -> bool {
        self.lock().reversed
    }

    pub fn set_looping(&self, looping: bool) {
        self.lock().looping = looping;
    }

    pub fn is_looping(&self) -> bool {
        self.lock().looping
    }

    /// Negative volumes are treated as silence.
    pub fn set_volume(&self, volume: f32) {
        let mut inner = self.lock();
        inner.volume = volume.max(0.0);
        let v = inner.volume;
        if let Some(sink) = inner.sink.as_mut() {
            sink.set_volume(v);
        }
    }

    pub fn volume(&self) -> f32 {
        self.lock().volume
    }

    /// -1 is hard left, +1 hard right.
    pub fn set_pan(&self, pan: f32) {
        let mut inner = self.lock();
        inner.pan = if pan.is_nan() { 0.0 } else { pan.clamp(-1.0, 1.0) };
        let p = inner.pan;
        if let Some(sink) = inner.sink.as_mut() {
            sink.set_pan(p);
        }
    }

    pub fn pan(&self) -> f32 {
        self.lock().pan
    }

    // --- SCHEDULING ---

    /// Delay the next start by `seconds` from now; 0 or less starts immediately.
    pub fn set_scheduled_time(&self, seconds: f64) {
        let at = if seconds > 0.0 {
            Some(TimeBase::to_instant(TimeBase::now(), seconds))
        } else {
            None
        };
        self.lock().pending_instant = at;
    }

    /// Absolute host instant for the next start. Share one instant between
    /// several players to start them together.
    pub fn set_scheduled_instant(&self, at: Option<Tick>) {
        self.lock().pending_instant = at;
    }

    pub fn scheduled_instant(&self) -> Option<Tick> {
        self.lock().pending_instant
    }

    // --- TRANSPORT ---

    pub fn start(&self) -> Result<()> {
        self.lock().start()
    }

    pub fn stop(&self) -> Result<()> {
        self.lock().stop()
    }

    pub fn pause(&self) -> Result<()> {
        self.lock().pause()
    }

    pub fn resume(&self) -> Result<()> {
        self.lock().resume()
    }

    /// Set the window to `start..end` and restart playback at `at`.
    /// An `end` of 0 keeps the current end.
    pub fn play_from(&self, start: f64, end: f64, at: Option<Tick>) -> Result<()> {
        let mut inner = self.lock();
        inner.require_active()?;

        let end_req = if end > 0.0 { Some(end) } else { None };
        let candidate = match inner.candidate_window(Some(start), end_req) {
            Ok(w) => w,
            Err(r) if r.zero_length => {
                let err = PlayerError::EmptyOrTooShortSegment { start, end };
                log::warn!("cannot play {:?}: {}", inner.source.path(), err);
                return Err(err);
            }
            Err(r) => return Err(inner.reject(r)),
        };

        inner.apply_window(candidate)?;
        inner.stop()?;
        inner.pending_instant = at;
        inner.start()
    }

    /// Like [`play_from`](Self::play_from), starting `delay` seconds from now.
    pub fn play_from_after(&self, start: f64, end: f64, delay: f64) -> Result<()> {
        let at = if delay > 0.0 {
            Some(TimeBase::to_instant(TimeBase::now(), delay))
        } else {
            None
        };
        self.play_from(start, end, at)
    }

    // --- COMPLETION ---

    fn handler_slot(&self) -> MutexGuard<'_, HandlerSlot> {
        self.completion_handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// The handler may itself set or clear the completion handler.
    pub fn set_completion_handler<F>(&self, handler: F)
    where
        F: FnMut() + Send + 'static,
    {
        let mut slot = self.handler_slot();
        slot.handler = Some(Box::new(handler));
        slot.version = slot.version.wrapping_add(1);
    }

    pub fn clear_completion_handler(&self) {
        let mut slot = self.handler_slot();
        slot.handler = None;
        slot.version = slot.version.wrapping_add(1);
    }

    /// The current schedule reached its end.
    pub fn on_render_completion(&self) {
        let generation = self.lock().generation;
        self.handle_completion(generation);
    }

    /// Apply every message the render sink has posted. Returns how many were handled.
    pub fn process_events(&self) -> usize {
        let events: Vec<PlayerEvent> = self.lock().events_rx.try_iter().collect();
        for event in &events {
            match *event {
                PlayerEvent::RenderCompleted { generation } => {
                    self.handle_completion(generation);
                }
            }
        }
        events.len()
    }

    fn handle_completion(&self, generation: u64) -> bool {
        let finished = {
            let mut inner = self.lock();
            if inner.state != PlaybackState::Playing {
                log::debug!("ignoring completion while {:?}", inner.state);
                false
            } else if generation != inner.generation {
                log::debug!(
                    "ignoring stale completion (generation {}, current {})",
                    generation,
                    inner.generation
                );
                false
            } else if inner.looping {
                if let Err(e) = inner.send_to_sink(None) {
                    log::warn!("could not re-arm loop: {}", e);
                }
                false
            } else {
                inner.halt();
                log::info!("⏹️ Reached end of {:?}", inner.source.path());
                true
            }
        };

        if finished {
            let (taken, version) = {
                let mut slot = self.handler_slot();
                (slot.handler.take(), slot.version)
            };
            if let Some(mut h) = taken {
                h();
                let mut slot = self.handler_slot();
                if slot.version == version {
                    slot.handler = Some(h);
                }
            }
        }
        finished
    }

    // --- STATUS ---

    pub fn state(&self) -> PlaybackState {
        self.lock().state
    }

    pub fn is_playing(&self) -> bool {
        self.state() == PlaybackState::Playing
    }

    pub fn is_paused(&self) -> bool {
        self.state() == PlaybackState::Paused
    }

    /// Whether the render sink itself reports that it is running.
    pub fn is_started(&self) -> bool {
        self.lock().sink.as_ref().is_some_and(|s| s.is_playing())
    }

    /// Seconds played since the buffer was scheduled; while not playing, the
    /// position remembered by the last pause or stop.
    pub fn current_time(&self) -> f64 {
        self.lock().current_elapsed()
    }

    /// Position within the source file.
    pub fn playhead(&self) -> f64 {
        self.lock().playhead()
    }

    /// Length of the whole source in seconds.
    pub fn duration(&self) -> f64 {
        self.lock().duration()
    }

    pub fn source_info(&self) -> AudioSource {
        self.lock().info
    }

    pub fn path(&self) -> PathBuf {
        self.lock().source.path().to_path_buf()
    }

    pub fn buffer(&self) -> Option<Arc<PcmBuffer>> {
        self.lock().buffer.clone()
    }

    // --- SOURCE ---

    /// Reopen the current source and reset the window to the full file.
    /// Playback restarts if it was running.
    pub fn reload_file(&self) -> Result<()> {
        let fresh = self.lock().source.reopen()?;
        self.swap_source(fresh)
    }

    /// Play `source` instead of the current one.
    pub fn replace(&self, source: Box<dyn SourceFile>) -> Result<()> {
        let path = source.path().to_path_buf();
        self.swap_source(source)?;
        log::info!("source replaced with {:?}", path);
        Ok(())
    }

    fn swap_source(&self, fresh: Box<dyn SourceFile>) -> Result<()> {
        let mut inner = self.lock();
        let was_playing = inner.state == PlaybackState::Playing;
        if inner.state != PlaybackState::Stopped {
            inner.halt();
        }
        inner.install_source(fresh)?;
        if was_playing {
            inner.start()?;
        }
        Ok(())
    }
}
