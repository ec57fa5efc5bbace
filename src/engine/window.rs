// src/engine/window.rs

/// The `[start, end)` frame range of the source selected for playback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlaybackWindow {
    pub start_frame: u32,
    pub end_frame: u32,
}

impl PlaybackWindow {
    /// The whole source.
    pub fn full(total_frames: u32) -> Self {
        Self {
            start_frame: 0,
            end_frame: total_frames,
        }
    }

    /// `None` unless `start <= end <= total_frames`.
    pub fn new(start_frame: u32, end_frame: u32, total_frames: u32) -> Option<Self> {
        if start_frame <= end_frame && end_frame <= total_frames {
            Some(Self { start_frame, end_frame })
        } else {
            None
        }
    }

    pub fn frames(&self) -> u32 {
        self.end_frame.saturating_sub(self.start_frame)
    }

    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }

    pub fn start_time(&self, sample_rate: f64) -> f64 {
        frame_to_seconds(self.start_frame, sample_rate)
    }

    pub fn end_time(&self, sample_rate: f64) -> f64 {
        frame_to_seconds(self.end_frame, sample_rate)
    }

    pub fn duration(&self, sample_rate: f64) -> f64 {
        frame_to_seconds(self.frames(), sample_rate)
    }
}

/// Frame range fetched from the source before any reversal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoadRange {
    pub start: u32,
    pub end: u32,
}

impl LoadRange {
    pub fn frames(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

pub fn seconds_to_frame(seconds: f64, sample_rate: f64) -> u32 {
    let frames = (seconds * sample_rate).round();
    if frames <= 0.0 {
        0
    } else if frames >= u32::MAX as f64 {
        u32::MAX
    } else {
        frames as u32
    }
}

pub fn frame_to_seconds(frame: u32, sample_rate: f64) -> f64 {
    if sample_rate <= 0.0 {
        return 0.0;
    }
    frame as f64 / sample_rate
}

/// Which part of the source to read so that the loaded buffer, after an
/// optional reversal, starts with the requested window.
///
/// Reversed playback mirrors the edit points around the end of the file:
/// the load range is `[total - end, total - start)`. An end of zero counts
/// as "no end set" and mirrors to the end of the file.
///
/// The mirroring is done on frame counts rather than seconds so that a
/// window maps to the same number of frames in both directions.
pub fn compute_load_window(window: &PlaybackWindow, reversed: bool, total_frames: u32) -> LoadRange {
    if !reversed {
        return LoadRange {
            start: window.start_frame,
            end: window.end_frame,
        };
    }

    let end = total_frames.saturating_sub(window.start_frame);
    let start = if window.end_frame > 0 {
        total_frames.saturating_sub(window.end_frame)
    } else {
        total_frames
    };
    LoadRange { start, end }
}
