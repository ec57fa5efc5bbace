// src/config.rs

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::error::{PlayerError, Result};

/// Initial player settings, stored as JSON next to a session.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PlayerConfig {
    pub looping: bool,
    pub reversed: bool,
    pub volume: f32,
    pub pan: f32,
    /// Window start in seconds.
    pub start_time: f64,
    /// Window end in seconds; 0 plays to the end of the file.
    pub end_time: f64,
    /// Delay before the first start, in seconds; 0 starts immediately.
    pub schedule_delay: f64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            looping: false,
            reversed: false,
            volume: 1.0,
            pan: 0.0,
            start_time: 0.0,
            end_time: 0.0,
            schedule_delay: 0.0,
        }
    }
}

impl PlayerConfig {
    pub fn save_to_disk(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path.as_ref()).map_err(|e| PlayerError::Config(e.to_string()))?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self).map_err(|e| PlayerError::Config(e.to_string()))?;
        Ok(())
    }

    pub fn load_from_disk(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| PlayerError::Config(format!("{}: {}", path.display(), e)))?;
        let reader = BufReader::new(file);
        let config = serde_json::from_reader(reader)
            .map_err(|e| PlayerError::Config(format!("{}: {}", path.display(), e)))?;
        Ok(config)
    }
}
