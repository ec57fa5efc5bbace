// src/engine/mod.rs

pub mod buffer;
pub mod sink;
pub mod time;
pub mod window;

pub use buffer::PcmBuffer;
pub use sink::{CompletionCallback, RenderSink, ScheduleRequest, SoftwareSink};
pub use time::{Tick, TimeBase};
pub use window::{compute_load_window, LoadRange, PlaybackWindow};

/// Transport state of a player. Exactly one holds at a time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
    Paused,
}
