// src/engine/buffer.rs

use crate::decoder::SourceFile;
use crate::error::{PlayerError, Result};

/// Planar f32 sample storage with a fixed frame capacity.
///
/// `frame_length` is the number of frames last written by a read; everything
/// past it is stale and never handed to a render sink.
#[derive(Clone, Debug, PartialEq)]
pub struct PcmBuffer {
    channels: Vec<Vec<f32>>,
    frame_capacity: u32,
    frame_length: u32,
}

impl PcmBuffer {
    /// Zero-filled storage for `capacity_frames` frames on every channel.
    pub fn allocate(capacity_frames: u32, channel_count: u16) -> Result<Self> {
        let fail = || PlayerError::AllocationFailure {
            frames: capacity_frames,
            channels: channel_count,
        };

        let mut channels = Vec::new();
        channels
            .try_reserve_exact(channel_count as usize)
            .map_err(|_| fail())?;

        for _ in 0..channel_count {
            let mut ch: Vec<f32> = Vec::new();
            ch.try_reserve_exact(capacity_frames as usize)
                .map_err(|_| fail())?;
            ch.resize(capacity_frames as usize, 0.0);
            channels.push(ch);
        }

        Ok(Self {
            channels,
            frame_capacity: capacity_frames,
            frame_length: 0,
        })
    }

    pub fn frame_capacity(&self) -> u32 {
        self.frame_capacity
    }

    pub fn frame_length(&self) -> u32 {
        self.frame_length
    }

    pub fn channel_count(&self) -> u16 {
        self.channels.len() as u16
    }

    pub fn is_empty(&self) -> bool {
        self.frame_length == 0 || self.channels.is_empty()
    }

    /// Valid samples of one channel (`frame_length` long).
    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels
            .get(index)
            .map(|ch| &ch[..self.frame_length as usize])
    }

    pub fn duration_secs(&self, sample_rate: f64) -> f64 {
        if sample_rate <= 0.0 {
            return 0.0;
        }
        self.frame_length as f64 / sample_rate
    }

    /// Copy interleaved frames in at `at_frame`. Returns frames written.
    ///
    /// Output channel `c` takes source channel `c % src_channels`, so a mono
    /// source fills every channel. Writes stop at capacity.
    pub fn write_interleaved(&mut self, at_frame: u32, interleaved: &[f32], src_channels: u16) -> u32 {
        if src_channels == 0 || at_frame >= self.frame_capacity {
            return 0;
        }
        let src_ch = src_channels as usize;
        let available = (self.frame_capacity - at_frame) as usize;
        let frames = (interleaved.len() / src_ch).min(available);
        let start = at_frame as usize;

        for (c, ch) in self.channels.iter_mut().enumerate() {
            let ic = c % src_ch;
            for f in 0..frames {
                ch[start + f] = interleaved[f * src_ch + ic];
            }
        }

        let end = at_frame + frames as u32;
        if end > self.frame_length {
            self.frame_length = end;
        }
        frames as u32
    }

    /// Fill from `source`, starting at `start_frame` in the file.
    ///
    /// The source writes into a staging buffer first, so a failed read leaves
    /// this buffer exactly as it was. On success `frame_length` becomes the
    /// number of frames the source actually delivered, which may be fewer than
    /// requested at end of file.
    pub fn load_from(
        &mut self,
        source: &mut dyn SourceFile,
        start_frame: u32,
        frame_count: u32,
    ) -> Result<u32> {
        let wanted = frame_count.min(self.frame_capacity);
        let mut staging = PcmBuffer::allocate(wanted, self.channel_count())?;

        let read = match source.read(start_frame, wanted, &mut staging) {
            Ok(n) => n.min(staging.frame_length).min(wanted),
            Err(e) => {
                log::warn!(
                    "could not read {} frames from frame {} of {:?}: {}",
                    wanted,
                    start_frame,
                    source.path(),
                    e
                );
                return Err(e);
            }
        };

        let n = read as usize;
        for (dst, src) in self.channels.iter_mut().zip(staging.channels.iter()) {
            dst[..n].copy_from_slice(&src[..n]);
        }
        self.frame_length = read;
        Ok(read)
    }

    /// Reverse the valid region of each channel independently.
    pub fn reverse_in_place(&mut self) {
        if self.frame_length == 0 {
            return;
        }
        let len = self.frame_length as usize;
        for ch in &mut self.channels {
            ch[..len].reverse();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(frames: u32, channels: u16) -> PcmBuffer {
        let mut buf = PcmBuffer::allocate(frames, channels).unwrap();
        let interleaved: Vec<f32> = (0..frames)
            .flat_map(|f| (0..channels).map(move |c| f as f32 + c as f32 * 1000.0))
            .collect();
        buf.write_interleaved(0, &interleaved, channels);
        buf
    }

    #[test]
    fn allocate_is_zeroed_and_empty() {
        let buf = PcmBuffer::allocate(64, 2).unwrap();
        assert_eq!(buf.frame_capacity(), 64);
        assert_eq!(buf.frame_length(), 0);
        assert_eq!(buf.channel_count(), 2);
        assert!(buf.is_empty());
        assert_eq!(buf.channel(0).unwrap().len(), 0);
    }

    #[test]
    fn write_interleaved_deinterleaves_and_caps_at_capacity() {
        let mut buf = PcmBuffer::allocate(3, 2).unwrap();
        let written = buf.write_interleaved(0, &[1.0, -1.0, 2.0, -2.0, 3.0, -3.0, 4.0, -4.0], 2);
        assert_eq!(written, 3);
        assert_eq!(buf.channel(0).unwrap(), &[1.0, 2.0, 3.0]);
        assert_eq!(buf.channel(1).unwrap(), &[-1.0, -2.0, -3.0]);
    }

    #[test]
    fn mono_source_fills_every_channel() {
        let mut buf = PcmBuffer::allocate(2, 2).unwrap();
        buf.write_interleaved(0, &[0.5, 0.25], 1);
        assert_eq!(buf.channel(0).unwrap(), &[0.5, 0.25]);
        assert_eq!(buf.channel(1).unwrap(), &[0.5, 0.25]);
    }

    #[test]
    fn reverse_flips_each_channel_and_keeps_length() {
        let mut buf = ramp(4, 2);
        buf.reverse_in_place();
        assert_eq!(buf.frame_length(), 4);
        assert_eq!(buf.channel(0).unwrap(), &[3.0, 2.0, 1.0, 0.0]);
        assert_eq!(buf.channel(1).unwrap(), &[1003.0, 1002.0, 1001.0, 1000.0]);
    }

    #[test]
    fn reverse_only_touches_valid_frames() {
        let mut buf = PcmBuffer::allocate(6, 1).unwrap();
        buf.write_interleaved(0, &[1.0, 2.0, 3.0], 1);
        buf.reverse_in_place();
        assert_eq!(buf.channel(0).unwrap(), &[3.0, 2.0, 1.0]);
        assert_eq!(buf.channels[0][3..], [0.0, 0.0, 0.0]);
    }

    #[test]
    fn reverse_of_empty_buffer_is_a_no_op() {
        let mut buf = PcmBuffer::allocate(8, 2).unwrap();
        let before = buf.clone();
        buf.reverse_in_place();
        assert_eq!(buf, before);
    }

    #[test]
    fn duration_follows_frame_length() {
        let buf = ramp(480, 1);
        assert!((buf.duration_secs(48_000.0) - 0.01).abs() < 1e-12);
        assert_eq!(buf.duration_secs(0.0), 0.0);
    }
}
