//! Conversion from the decoded format to the output device format.
//!
//! Catalog sources are mostly 44.1kHz while devices commonly run at 48kHz;
//! without resampling playback would be pitched and timed wrong.

use rubato::{FftFixedIn, Resampler as RubatoResampler};

use super::PlayerError;

/// Frames per resampler input block
const CHUNK_FRAMES: usize = 1024;

/// Sample rate converter for interleaved audio.
pub struct Resampler {
    resampler: Option<FftFixedIn<f32>>,
    input_rate: u32,
    output_rate: u32,
    channels: usize,
    /// Per-channel samples waiting for a full block
    pending: Vec<Vec<f32>>,
}

impl Resampler {
    /// Passes samples through untouched when the rates match.
    pub fn new(input_rate: u32, output_rate: u32, channels: u16) -> Result<Self, PlayerError> {
        let channels = usize::from(channels.max(1));

        let resampler = if input_rate == output_rate {
            None
        } else {
            tracing::info!(
                target: "playback",
                "Resampler: {}Hz → {}Hz ({} channels)",
                input_rate,
                output_rate,
                channels
            );
            Some(
                FftFixedIn::<f32>::new(
                    input_rate as usize,
                    output_rate as usize,
                    CHUNK_FRAMES,
                    2,
                    channels,
                )
                .map_err(|e| PlayerError::AudioInit(format!("resampler: {}", e)))?,
            )
        };

        Ok(Self {
            resampler,
            input_rate,
            output_rate,
            channels,
            pending: vec![Vec::new(); channels],
        })
    }

    pub fn needs_resampling(&self) -> bool {
        self.resampler.is_some()
    }

    pub fn ratio(&self) -> f64 {
        self.output_rate as f64 / self.input_rate as f64
    }

    /// Resample interleaved input. Output may lag input by up to one block.
    pub fn process(&mut self, input: &[f32]) -> Vec<f32> {
        let Some(ref mut resampler) = self.resampler else {
            return input.to_vec();
        };

        for (i, sample) in input.iter().enumerate() {
            self.pending[i % self.channels].push(*sample);
        }

        let mut output = Vec::new();
        while self.pending[0].len() >= CHUNK_FRAMES {
            let block: Vec<Vec<f32>> = self
                .pending
                .iter_mut()
                .map(|ch| ch.drain(..CHUNK_FRAMES).collect())
                .collect();

            match resampler.process(&block, None) {
                Ok(resampled) => interleave_into(&resampled, usize::MAX, &mut output),
                Err(e) => tracing::warn!(target: "playback", "Resampling error: {}", e),
            }
        }
        output
    }

    /// Flush buffered samples at end of stream.
    pub fn flush(&mut self) -> Vec<f32> {
        let Some(ref mut resampler) = self.resampler else {
            return Vec::new();
        };

        let remaining = self.pending[0].len();
        if remaining == 0 {
            return Vec::new();
        }

        let block: Vec<Vec<f32>> = self
            .pending
            .iter_mut()
            .map(|ch| {
                let mut padded = std::mem::take(ch);
                padded.resize(CHUNK_FRAMES, 0.0);
                padded
            })
            .collect();

        let mut output = Vec::new();
        let expected_frames = (remaining as f64 * self.output_rate as f64 / self.input_rate as f64)
            .ceil() as usize;
        match resampler.process(&block, None) {
            Ok(resampled) => interleave_into(&resampled, expected_frames, &mut output),
            Err(e) => tracing::warn!(target: "playback", "Resampling flush error: {}", e),
        }
        output
    }

    /// Drop buffered samples (after a seek).
    pub fn reset(&mut self) {
        for ch in &mut self.pending {
            ch.clear();
        }
        if let Some(ref mut resampler) = self.resampler {
            resampler.reset();
        }
    }
}

fn interleave_into(planes: &[Vec<f32>], max_frames: usize, output: &mut Vec<f32>) {
    let Some(first) = planes.first() else {
        return;
    };
    let frames = first.len().min(max_frames);
    output.reserve(frames * planes.len());
    for frame in 0..frames {
        for plane in planes {
            output.push(plane[frame]);
        }
    }
}

/// Map interleaved samples from `from` channels to `to` channels.
///
/// Mono is duplicated to every output channel; extra input channels are
/// dropped and missing ones are filled with silence.
pub fn remap_channels(samples: &[f32], from: usize, to: usize) -> Vec<f32> {
    if from == to || from == 0 || to == 0 {
        return samples.to_vec();
    }

    let mut output = Vec::with_capacity(samples.len() / from * to);
    for frame in samples.chunks_exact(from) {
        for ch in 0..to {
            let sample = if from == 1 {
                frame[0]
            } else {
                frame.get(ch).copied().unwrap_or(0.0)
            };
            output.push(sample);
        }
    }
    output
}
