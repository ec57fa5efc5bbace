// src/audio.rs

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    Device, SampleFormat, SampleRate, SizedSample, Stream, StreamConfig, SupportedStreamConfig,
    SupportedStreamConfigRange,
};

use crate::engine::sink::SoftwareSink;
use crate::error::{PlayerError, Result};

/// Output device and the config its stream will be opened with.
pub struct OutputConfig {
    pub device: Device,
    pub config: StreamConfig,
    pub sample_format: SampleFormat,
    pub output_channels: usize,
    pub output_sample_rate: u32,
}

/// Finds the default audio output device and a config running at
/// `sample_rate`. Buffers are never resampled, so a device that cannot run
/// at the source rate is an error.
pub fn setup_output_device(sample_rate: u32) -> Result<OutputConfig> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| PlayerError::Sink("no output device available".into()))?;
    let default_config = device
        .default_output_config()
        .map_err(|e| PlayerError::Sink(e.to_string()))?;

    let default_rate = default_config.sample_rate().0;
    let ranges = device
        .supported_output_configs()
        .map_err(|e| PlayerError::Sink(e.to_string()))?;
    let Some(supported_config) = choose_config(default_config, ranges, sample_rate) else {
        log::warn!(
            "output device runs at {} Hz and cannot be switched to {} Hz",
            default_rate,
            sample_rate
        );
        return Err(PlayerError::Sink(format!(
            "output device does not support {sample_rate} Hz"
        )));
    };
    let sample_format = supported_config.sample_format();
    let config = supported_config.config();
    let output_channels = config.channels as usize;
    let output_sample_rate = config.sample_rate.0;

    log::info!(
        "🔊 Output device: channels: {}, sample_rate: {:?}, format: {:?}",
        output_channels,
        config.sample_rate,
        sample_format
    );

    Ok(OutputConfig {
        device,
        config,
        sample_format,
        output_channels,
        output_sample_rate,
    })
}

/// The default config if it already runs at `sample_rate`, otherwise the
/// supported range that covers it, preferring the default channel layout
/// and then the default sample format.
fn choose_config(
    default_config: SupportedStreamConfig,
    ranges: impl IntoIterator<Item = SupportedStreamConfigRange>,
    sample_rate: u32,
) -> Option<SupportedStreamConfig> {
    if default_config.sample_rate().0 == sample_rate {
        return Some(default_config);
    }

    let wanted = SampleRate(sample_rate);
    ranges
        .into_iter()
        .filter(|range| range.min_sample_rate() <= wanted && wanted <= range.max_sample_rate())
        .filter(|range| {
            matches!(
                range.sample_format(),
                SampleFormat::F32 | SampleFormat::I16 | SampleFormat::U16
            )
        })
        .min_by_key(|range| {
            (
                range.channels() != default_config.channels(),
                range.sample_format() != default_config.sample_format(),
            )
        })
        .map(|range| range.with_sample_rate(wanted))
}

/// A running device stream that pulls audio from a [`SoftwareSink`].
///
/// Dropping it closes the stream.
pub struct OutputStream {
    _stream: Stream,
    channels: usize,
    sample_rate: u32,
}

impl OutputStream {
    /// Open the default device at the sink's sample rate and start pulling
    /// from `sink`.
    pub fn open(sink: &SoftwareSink) -> Result<Self> {
        let OutputConfig {
            device,
            config,
            sample_format,
            output_channels,
            output_sample_rate,
        } = setup_output_device(sink.sample_rate())?;

        let stream = match sample_format {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, sink.clone())?,
            SampleFormat::I16 => build_stream::<i16>(&device, &config, sink.clone())?,
            SampleFormat::U16 => build_stream::<u16>(&device, &config, sink.clone())?,
            other => {
                return Err(PlayerError::Sink(format!(
                    "unsupported output sample format {other:?}"
                )))
            }
        };
        stream.play().map_err(|e| PlayerError::Sink(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            channels: output_channels,
            sample_rate: output_sample_rate,
        })
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// Build a CPAL output stream that renders f32 and converts to `T`.
fn build_stream<T>(device: &Device, config: &StreamConfig, sink: SoftwareSink) -> Result<Stream>
where
    T: cpal::Sample + cpal::FromSample<f32> + SizedSample,
{
    let channels = config.channels as usize;
    let mut scratch: Vec<f32> = Vec::new();
    let err_fn = |err| log::error!("output stream error: {err}");

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                if scratch.len() < data.len() {
                    scratch.resize(data.len(), 0.0);
                }
                let block = &mut scratch[..data.len()];
                sink.render(block, channels);
                for (out, s) in data.iter_mut().zip(block.iter()) {
                    *out = T::from_sample(*s);
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| PlayerError::Sink(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpal::SupportedBufferSize;

    fn range(channels: u16, min: u32, max: u32, format: SampleFormat) -> SupportedStreamConfigRange {
        SupportedStreamConfigRange::new(
            channels,
            SampleRate(min),
            SampleRate(max),
            SupportedBufferSize::Unknown,
            format,
        )
    }

    fn default_48k() -> SupportedStreamConfig {
        SupportedStreamConfig::new(2, SampleRate(48_000), SupportedBufferSize::Unknown, SampleFormat::F32)
    }

    #[test]
    fn default_config_is_kept_when_rates_match() {
        let chosen = choose_config(default_48k(), Vec::new(), 48_000).unwrap();
        assert_eq!(chosen.sample_rate(), SampleRate(48_000));
    }

    #[test]
    fn switches_to_the_source_rate_with_the_default_layout() {
        let ranges = vec![
            range(1, 8_000, 96_000, SampleFormat::F32),
            range(2, 8_000, 96_000, SampleFormat::I16),
            range(2, 8_000, 96_000, SampleFormat::F32),
        ];
        let chosen = choose_config(default_48k(), ranges, 44_100).unwrap();
        assert_eq!(chosen.sample_rate(), SampleRate(44_100));
        assert_eq!(chosen.channels(), 2);
        assert_eq!(chosen.sample_format(), SampleFormat::F32);
    }

    #[test]
    fn unsupported_rate_is_refused() {
        let ranges = vec![range(2, 48_000, 48_000, SampleFormat::F32)];
        assert!(choose_config(default_48k(), ranges, 44_100).is_none());
    }
}
