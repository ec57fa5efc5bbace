// src/engine/sink.rs

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::engine::buffer::PcmBuffer;
use crate::engine::time::{Tick, TimeBase};
use crate::error::Result;

/// Invoked by a render sink each time a scheduled buffer reaches its end.
/// Runs on the sink's own thread.
pub type CompletionCallback = Arc<dyn Fn() + Send + Sync + 'static>;

/// One hand-off to the render sink. Not retained by the controller.
#[derive(Clone)]
pub struct ScheduleRequest {
    pub buffer: Arc<PcmBuffer>,
    /// Host instant at which playback should begin; `None` = as soon as possible.
    pub at: Option<Tick>,
    /// The controller will keep replaying this buffer when it completes.
    pub looping: bool,
}

/// The object that actually emits scheduled buffers on a real-time schedule.
///
/// A new `schedule` always interrupts whatever was scheduled before it.
pub trait RenderSink: Send {
    fn attach(&mut self) -> Result<()>;
    fn detach(&mut self);

    fn schedule(&mut self, request: ScheduleRequest, on_complete: CompletionCallback);

    fn play(&mut self);
    fn stop(&mut self);
    fn pause(&mut self);

    fn is_playing(&self) -> bool;

    /// Seconds rendered since the scheduled buffer began, `None` when nothing
    /// is scheduled.
    fn elapsed_since_scheduled(&self) -> Option<f64>;

    fn set_volume(&mut self, _volume: f32) {}
    fn set_pan(&mut self, _pan: f32) {}
}

struct Scheduled {
    buffer: Arc<PcmBuffer>,
    at: Option<Tick>,
    looping: bool,
    on_complete: CompletionCallback,
    position: u32,
    rendered_frames: u64,
    started: bool,
    finished: bool,
}

struct SinkState {
    attached: bool,
    playing: bool,
    volume: f32,
    pan: f32,
    sample_rate: u32,
    current: Option<Scheduled>,
}

/// Pull-driven render sink: a device callback calls [`SoftwareSink::render`]
/// and the sink copies frames out of the scheduled buffer.
///
/// Cloning yields another handle to the same sink, so one clone can live in
/// the controller and another in the audio callback.
#[derive(Clone)]
pub struct SoftwareSink {
    shared: Arc<Mutex<SinkState>>,
}

impl SoftwareSink {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            shared: Arc::new(Mutex::new(SinkState {
                attached: false,
                playing: false,
                volume: 1.0,
                pan: 0.0,
                sample_rate,
                current: None,
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, SinkState> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn sample_rate(&self) -> u32 {
        self.state().sample_rate
    }

    /// Fill `out` (interleaved, `channels` wide) for the current host time.
    pub fn render(&self, out: &mut [f32], channels: usize) {
        self.render_at(out, channels, TimeBase::now());
    }

    /// Fill `out` as if the block started at host time `now`.
    ///
    /// Completion callbacks fire after the sink lock is released, once per
    /// pass that ended inside this block.
    pub fn render_at(&self, out: &mut [f32], channels: usize, now: Tick) {
        out.fill(0.0);
        if channels == 0 {
            return;
        }

        let mut fired: Option<(CompletionCallback, u32)> = None;
        {
            let mut st = self.state();
            if !st.playing {
                return;
            }

            let frames = out.len() / channels;
            let sample_rate = st.sample_rate;
            let gains = channel_gains(st.volume, st.pan, channels);

            let Some(cur) = st.current.as_mut() else {
                return;
            };
            if cur.finished {
                return;
            }

            let mut frame = 0usize;
            if !cur.started {
                if let Some(at) = cur.at {
                    if at > now {
                        let wait = TimeBase::seconds_between(now, at);
                        let wait_frames = (wait * sample_rate as f64).round() as usize;
                        if wait_frames >= frames {
                            return;
                        }
                        frame = wait_frames;
                    }
                }
                cur.started = true;
            }

            let buffer = cur.buffer.clone();
            let len = buffer.frame_length();
            let n_ch = buffer.channel_count() as usize;
            let mut passes = 0u32;

            if len == 0 || n_ch == 0 {
                cur.finished = true;
                passes = 1;
            } else {
                while frame < frames {
                    if cur.position >= len {
                        passes += 1;
                        if cur.looping {
                            cur.position = 0;
                        } else {
                            cur.finished = true;
                            break;
                        }
                    }

                    let pos = cur.position as usize;
                    let base = frame * channels;
                    for c in 0..channels {
                        if let Some(src) = buffer.channel(c % n_ch) {
                            out[base + c] = src[pos] * gains[c.min(gains.len() - 1)];
                        }
                    }

                    cur.position += 1;
                    cur.rendered_frames += 1;
                    frame += 1;
                }

                if !cur.finished && !cur.looping && cur.position >= len {
                    cur.finished = true;
                    passes += 1;
                }
            }

            if passes > 0 {
                fired = Some((cur.on_complete.clone(), passes));
            }
        }

        if let Some((callback, passes)) = fired {
            for _ in 0..passes {
                callback();
            }
        }
    }
}

/// Per-channel gain with equal-power panning on the first two channels.
fn channel_gains(volume: f32, pan: f32, channels: usize) -> [f32; 3] {
    if channels >= 2 {
        let angle = (pan.clamp(-1.0, 1.0) + 1.0) * 0.25 * std::f32::consts::PI;
        [volume * angle.cos(), volume * angle.sin(), volume]
    } else {
        [volume, volume, volume]
    }
}

impl RenderSink for SoftwareSink {
    fn attach(&mut self) -> Result<()> {
        let mut st = self.state();
        st.attached = true;
        log::debug!("🔌 software sink attached at {} Hz", st.sample_rate);
        Ok(())
    }

    fn detach(&mut self) {
        let mut st = self.state();
        st.attached = false;
        st.playing = false;
        st.current = None;
    }

    fn schedule(&mut self, request: ScheduleRequest, on_complete: CompletionCallback) {
        let mut st = self.state();

        // Same buffer, still looping: keep timing, only swap the callback.
        if let Some(cur) = st.current.as_mut() {
            if request.looping
                && cur.looping
                && !cur.finished
                && Arc::ptr_eq(&cur.buffer, &request.buffer)
            {
                cur.on_complete = on_complete;
                return;
            }
        }

        st.current = Some(Scheduled {
            buffer: request.buffer,
            at: request.at,
            looping: request.looping,
            on_complete,
            position: 0,
            rendered_frames: 0,
            started: false,
            finished: false,
        });
    }

    fn play(&mut self) {
        let mut st = self.state();
        if !st.attached {
            log::warn!("software sink: play() while detached");
            return;
        }
        st.playing = true;
    }

    fn stop(&mut self) {
        let mut st = self.state();
        st.playing = false;
        st.current = None;
    }

    fn pause(&mut self) {
        self.state().playing = false;
    }

    fn is_playing(&self) -> bool {
        self.state().playing
    }

    fn elapsed_since_scheduled(&self) -> Option<f64> {
        let st = self.state();
        let cur = st.current.as_ref()?;
        if st.sample_rate == 0 {
            return Some(0.0);
        }
        Some(cur.rendered_frames as f64 / st.sample_rate as f64)
    }

    fn set_volume(&mut self, volume: f32) {
        self.state().volume = volume.max(0.0);
    }

    fn set_pan(&mut self, pan: f32) {
        self.state().pan = pan.clamp(-1.0, 1.0);
    }
}
