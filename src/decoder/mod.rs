// src/decoder/mod.rs

pub mod control;
pub mod dsp;

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};

use crate::engine::buffer::PcmBuffer;
use crate::error::{PlayerError, Result};

pub use control::PlayerEvent;

/// Format facts about a loaded source. Replaced wholesale on reload.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AudioSource {
    pub sample_rate: f64,
    pub total_frames: u32,
    pub channel_count: u16,
}

impl AudioSource {
    pub fn duration(&self) -> f64 {
        if self.sample_rate <= 0.0 {
            return 0.0;
        }
        self.total_frames as f64 / self.sample_rate
    }
}

/// An opened, readable audio source.
pub trait SourceFile: Send {
    fn path(&self) -> &Path;

    fn info(&self) -> AudioSource;

    /// Read up to `frame_count` frames starting at `from_frame` into `into`,
    /// beginning at buffer offset 0. Returns frames actually read; fewer than
    /// requested means the source ended.
    fn read(&mut self, from_frame: u32, frame_count: u32, into: &mut PcmBuffer) -> Result<u32>;

    /// Open the same source again from scratch.
    fn reopen(&self) -> Result<Box<dyn SourceFile>>;

    fn sample_rate(&self) -> f64 {
        self.info().sample_rate
    }

    fn channel_count(&self) -> u16 {
        self.info().channel_count
    }

    fn total_frames(&self) -> u32 {
        self.info().total_frames
    }
}

/// Open an audio file on disk for reading.
pub fn open(path: impl AsRef<Path>) -> Result<Box<dyn SourceFile>> {
    Ok(Box::new(SymphoniaFile::open(path)?))
}

/// A file decoded up front with symphonia and served from memory.
pub struct SymphoniaFile {
    path: PathBuf,
    samples: Arc<Vec<f32>>,
    info: AudioSource,
}

impl SymphoniaFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let open_err = |reason: String| PlayerError::Open {
            path: path.clone(),
            reason,
        };

        let (samples, sample_rate, channels) =
            decode_to_vec(&path).map_err(|e| open_err(e.to_string()))?;

        if channels == 0 || sample_rate == 0 {
            return Err(open_err("missing sample rate or channel layout".into()));
        }

        let frames = samples.len() / channels;
        let total_frames = u32::try_from(frames).unwrap_or(u32::MAX);
        let info = AudioSource {
            sample_rate: sample_rate as f64,
            total_frames,
            channel_count: channels as u16,
        };

        log::info!(
            "🎧 File info: {:?} channels: {}, sample_rate: {}, frames: {} ({:.3}s)",
            path,
            info.channel_count,
            sample_rate,
            info.total_frames,
            info.duration()
        );

        Ok(Self {
            path,
            samples: Arc::new(samples),
            info,
        })
    }
}

impl SourceFile for SymphoniaFile {
    fn path(&self) -> &Path {
        &self.path
    }

    fn info(&self) -> AudioSource {
        self.info
    }

    fn read(&mut self, from_frame: u32, frame_count: u32, into: &mut PcmBuffer) -> Result<u32> {
        read_interleaved(&self.samples, self.info, from_frame, frame_count, into)
    }

    fn reopen(&self) -> Result<Box<dyn SourceFile>> {
        open(&self.path)
    }
}

/// In-memory source, for generated material and tests.
#[derive(Clone)]
pub struct MemorySource {
    path: PathBuf,
    samples: Arc<Vec<f32>>,
    info: AudioSource,
}

impl MemorySource {
    /// `interleaved` holds whole frames of `channel_count` samples.
    pub fn new(name: &str, sample_rate: f64, channel_count: u16, interleaved: Vec<f32>) -> Self {
        let ch = channel_count.max(1) as usize;
        let frames = interleaved.len() / ch;
        Self {
            path: PathBuf::from(format!("memory://{name}")),
            info: AudioSource {
                sample_rate,
                total_frames: u32::try_from(frames).unwrap_or(u32::MAX),
                channel_count: ch as u16,
            },
            samples: Arc::new(interleaved),
        }
    }

    /// Mono ramp `0, 1, 2, ...` so every frame is identifiable.
    pub fn ramp(name: &str, sample_rate: f64, frames: u32) -> Self {
        Self::new(name, sample_rate, 1, (0..frames).map(|f| f as f32).collect())
    }
}

impl SourceFile for MemorySource {
    fn path(&self) -> &Path {
        &self.path
    }

    fn info(&self) -> AudioSource {
        self.info
    }

    fn read(&mut self, from_frame: u32, frame_count: u32, into: &mut PcmBuffer) -> Result<u32> {
        read_interleaved(&self.samples, self.info, from_frame, frame_count, into)
    }

    fn reopen(&self) -> Result<Box<dyn SourceFile>> {
        Ok(Box::new(self.clone()))
    }
}

fn read_interleaved(
    samples: &[f32],
    info: AudioSource,
    from_frame: u32,
    frame_count: u32,
    into: &mut PcmBuffer,
) -> Result<u32> {
    if from_frame > info.total_frames {
        return Err(PlayerError::Read {
            from_frame,
            reason: format!("past end of source ({} frames)", info.total_frames),
        });
    }
    let ch = info.channel_count as usize;
    let end = from_frame.saturating_add(frame_count).min(info.total_frames);
    let slice = &samples[from_frame as usize * ch..end as usize * ch];
    Ok(into.write_interleaved(0, slice, info.channel_count))
}

/// Decode a whole file to interleaved f32. Returns (samples, sample_rate, channels).
pub fn decode_to_vec(path: &Path) -> anyhow::Result<(Vec<f32>, u32, usize)> {
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = get_probe().format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())?;
    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| anyhow::anyhow!("no default audio track"))?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let mut decoder = get_codecs().make(&codec_params, &DecoderOptions::default())?;
    let mut sample_buf: Option<SampleBuffer<f32>> = None;
    let mut sample_buf_frames = 0usize;
    let mut out = Vec::<f32>::new();

    let mut sample_rate = codec_params.sample_rate.unwrap_or(0);
    let mut channels = codec_params.channels.map(|c| c.count()).unwrap_or(0);

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(e.into()),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(e)) => {
                log::warn!("skipping undecodable packet in {:?}: {}", path, e);
                continue;
            }
            Err(SymphoniaError::IoError(_)) => continue,
            Err(e) => return Err(e.into()),
        };

        let spec = *decoded.spec();
        let packet_channels = spec.channels.count();
        if channels == 0 {
            channels = packet_channels;
        }
        if sample_rate == 0 {
            sample_rate = spec.rate;
        }

        if sample_buf.is_none() || sample_buf_frames < decoded.capacity() {
            sample_buf_frames = decoded.capacity();
            sample_buf = Some(SampleBuffer::<f32>::new(sample_buf_frames as u64, spec));
        }
        let Some(buf) = sample_buf.as_mut() else {
            continue;
        };
        buf.copy_interleaved_ref(decoded);

        if packet_channels == channels {
            out.extend_from_slice(buf.samples());
        } else {
            out.extend(dsp::updown_mix_interleaved(buf.samples(), packet_channels, channels));
        }
    }

    log::debug!("📊 decoded {} samples from {:?}", out.len(), path);
    Ok((out, sample_rate, channels))
}
