#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use clip_player::decoder::{AudioSource, MemorySource, SourceFile};
use clip_player::engine::buffer::PcmBuffer;
use clip_player::engine::sink::{CompletionCallback, RenderSink, ScheduleRequest};
use clip_player::{PlayerError, Result};

#[derive(Clone, Debug, PartialEq)]
pub enum SinkCall {
    Attach,
    Detach,
    Schedule { frames: u32, looping: bool, at: Option<u64> },
    Play,
    Stop,
    Pause,
}

#[derive(Default)]
struct ScriptState {
    calls: Vec<SinkCall>,
    last_buffer: Option<Arc<PcmBuffer>>,
    on_complete: Option<CompletionCallback>,
    playing: bool,
    elapsed: Option<f64>,
    refuse_attach: bool,
}

/// Render sink that records every call and lets the test drive time and completions.
#[derive(Clone, Default)]
pub struct ScriptedSink {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refusing() -> Self {
        let sink = Self::default();
        sink.state.lock().unwrap().refuse_attach = true;
        sink
    }

    pub fn calls(&self) -> Vec<SinkCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn schedules(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, SinkCall::Schedule { .. }))
            .count()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn last_buffer(&self) -> Option<Arc<PcmBuffer>> {
        self.state.lock().unwrap().last_buffer.clone()
    }

    pub fn set_elapsed(&self, seconds: f64) {
        self.state.lock().unwrap().elapsed = Some(seconds);
    }

    pub fn completion(&self) -> Option<CompletionCallback> {
        self.state.lock().unwrap().on_complete.clone()
    }

    /// Fire the completion callback of the most recent schedule.
    pub fn complete(&self) {
        let cb = self.state.lock().unwrap().on_complete.clone();
        if let Some(cb) = cb {
            cb();
        }
    }
}

impl RenderSink for ScriptedSink {
    fn attach(&mut self) -> Result<()> {
        let mut st = self.state.lock().unwrap();
        if st.refuse_attach {
            return Err(PlayerError::Sink("device unavailable".into()));
        }
        st.calls.push(SinkCall::Attach);
        Ok(())
    }

    fn detach(&mut self) {
        self.state.lock().unwrap().calls.push(SinkCall::Detach);
    }

    fn schedule(&mut self, request: ScheduleRequest, on_complete: CompletionCallback) {
        let mut st = self.state.lock().unwrap();
        st.calls.push(SinkCall::Schedule {
            frames: request.buffer.frame_length(),
            looping: request.looping,
            at: request.at.map(|t| t.as_u64()),
        });
        st.last_buffer = Some(request.buffer);
        st.on_complete = Some(on_complete);
        st.elapsed = Some(0.0);
    }

    fn play(&mut self) {
        let mut st = self.state.lock().unwrap();
        st.playing = true;
        st.calls.push(SinkCall::Play);
    }

    fn stop(&mut self) {
        let mut st = self.state.lock().unwrap();
        st.playing = false;
        st.elapsed = None;
        st.calls.push(SinkCall::Stop);
    }

    fn pause(&mut self) {
        let mut st = self.state.lock().unwrap();
        st.playing = false;
        st.calls.push(SinkCall::Pause);
    }

    fn is_playing(&self) -> bool {
        self.state.lock().unwrap().playing
    }

    fn elapsed_since_scheduled(&self) -> Option<f64> {
        self.state.lock().unwrap().elapsed
    }
}

/// Memory source that counts how often it is read.
pub struct CountingSource {
    inner: MemorySource,
    reads: Arc<AtomicUsize>,
}

impl CountingSource {
    pub fn ramp(frames: u32, sample_rate: f64) -> (Self, Arc<AtomicUsize>) {
        let reads = Arc::new(AtomicUsize::new(0));
        (
            Self {
                inner: MemorySource::ramp("counting", sample_rate, frames),
                reads: reads.clone(),
            },
            reads,
        )
    }
}

impl SourceFile for CountingSource {
    fn path(&self) -> &Path {
        self.inner.path()
    }

    fn info(&self) -> AudioSource {
        self.inner.info()
    }

    fn read(&mut self, from_frame: u32, frame_count: u32, into: &mut PcmBuffer) -> Result<u32> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.read(from_frame, frame_count, into)
    }

    fn reopen(&self) -> Result<Box<dyn SourceFile>> {
        Ok(Box::new(Self {
            inner: self.inner.clone(),
            reads: self.reads.clone(),
        }))
    }
}

/// Source whose reads start failing once `fail` is set.
pub struct FlakySource {
    inner: MemorySource,
    fail: Arc<std::sync::atomic::AtomicBool>,
}

impl FlakySource {
    pub fn ramp(frames: u32, sample_rate: f64) -> (Self, Arc<std::sync::atomic::AtomicBool>) {
        let fail = Arc::new(std::sync::atomic::AtomicBool::new(false));
        (
            Self {
                inner: MemorySource::ramp("flaky", sample_rate, frames),
                fail: fail.clone(),
            },
            fail,
        )
    }
}

impl SourceFile for FlakySource {
    fn path(&self) -> &Path {
        self.inner.path()
    }

    fn info(&self) -> AudioSource {
        self.inner.info()
    }

    fn read(&mut self, from_frame: u32, frame_count: u32, into: &mut PcmBuffer) -> Result<u32> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PlayerError::Read {
                from_frame,
                reason: "simulated I/O failure".into(),
            });
        }
        self.inner.read(from_frame, frame_count, into)
    }

    fn reopen(&self) -> Result<Box<dyn SourceFile>> {
        Err(PlayerError::Open {
            path: self.inner.path().to_path_buf(),
            reason: "simulated reopen failure".into(),
        })
    }
}
