// src/lib.rs

pub mod audio;
pub mod config;
pub mod decoder;
pub mod engine;
pub mod error;
mod player;

pub use audio::OutputStream;
pub use config::PlayerConfig;
pub use decoder::{AudioSource, MemorySource, SourceFile, SymphoniaFile};
pub use engine::{PlaybackState, PlaybackWindow, RenderSink, SoftwareSink, Tick, TimeBase};
pub use error::{PlayerError, Result};
pub use player::{CompletionHandler, Lifecycle, PlaybackController};
