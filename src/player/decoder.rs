//! Audio decoder using symphonia for multi-format support.
//!
//! Any seekable [`MediaSource`] works: a progressively fetched network
//! stream during playback, or bytes in memory.
//!
//! Supported formats:
//! - FLAC
//! - MP3
//! - AAC (in MP4 container)
//! - OGG Vorbis
//! - WAV/PCM

use std::io::Cursor;
use std::time::Duration;

use symphonia::core::audio::{AudioBufferRef, Signal};
use symphonia::core::codecs::{CODEC_TYPE_NULL, Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::{Time, TimeBase};

use super::PlayerError;

/// Audio decoder wrapper for symphonia.
pub struct AudioDecoder {
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    channels: u16,
    duration: Duration,
    time_base: Option<TimeBase>,
}

impl AudioDecoder {
    /// Open an in-memory source. `extension` is a probe hint only.
    pub fn from_bytes(bytes: Vec<u8>, extension: Option<&str>) -> Result<Self, PlayerError> {
        Self::open(Box::new(Cursor::new(bytes)), extension)
    }

    /// Probe `source` and set up a decoder for its first audio track.
    pub fn open(source: Box<dyn MediaSource>, extension: Option<&str>) -> Result<Self, PlayerError> {
        let mss = MediaSourceStream::new(source, Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = extension {
            hint.with_extension(ext);
        }

        let format_opts = FormatOptions {
            enable_gapless: true,
            ..Default::default()
        };

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &format_opts, &MetadataOptions::default())
            .map_err(|e| PlayerError::UnsupportedFormat(e.to_string()))?;

        let reader = probed.format;

        let track = reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| PlayerError::UnsupportedFormat("No audio track found".to_string()))?;

        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let sample_rate = codec_params
            .sample_rate
            .ok_or_else(|| PlayerError::Decode("Unknown sample rate".to_string()))?;
        let channels = codec_params.channels.map(|c| c.count() as u16).unwrap_or(2);

        let time_base = codec_params.time_base;
        let duration = match (codec_params.n_frames, time_base) {
            (Some(n_frames), Some(tb)) => to_duration(tb.calc_time(n_frames)),
            (Some(n_frames), None) => Duration::from_secs_f64(n_frames as f64 / sample_rate as f64),
            (None, _) => Duration::ZERO,
        };

        let decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| PlayerError::Decode(e.to_string()))?;

        Ok(Self {
            reader,
            decoder,
            track_id,
            sample_rate,
            channels,
            duration,
            time_base,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Total duration, zero when the container does not say.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Seek to an absolute position.
    pub fn seek(&mut self, position: Duration) -> Result<(), PlayerError> {
        let seek_to = SeekTo::Time {
            time: Time::from(position.as_secs_f64()),
            track_id: Some(self.track_id),
        };

        self.reader
            .seek(SeekMode::Accurate, seek_to)
            .map_err(|e| PlayerError::Decode(format!("Seek failed: {}", e)))?;

        self.decoder.reset();
        Ok(())
    }

    /// Decode the next packet into interleaved f32 samples.
    ///
    /// Returns `Ok(None)` at end of stream.
    pub fn decode_next(&mut self) -> Result<Option<DecodedFrame>, PlayerError> {
        loop {
            let packet = match self.reader.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(None);
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => return Err(PlayerError::Decode(e.to_string())),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let timestamp = self
                .time_base
                .map(|tb| to_duration(tb.calc_time(packet.ts())))
                .unwrap_or(Duration::ZERO);

            let decoded = match self.decoder.decode(&packet) {
                Ok(d) => d,
                // Skip bad frame
                Err(SymphoniaError::DecodeError(_)) => continue,
                Err(e) => return Err(PlayerError::Decode(e.to_string())),
            };

            return Ok(Some(DecodedFrame {
                samples: interleave(&decoded),
                timestamp,
            }));
        }
    }
}

fn to_duration(time: Time) -> Duration {
    Duration::from_secs_f64(time.seconds as f64 + time.frac)
}

/// Convert a planar buffer to interleaved f32.
fn interleave(buffer: &AudioBufferRef) -> Vec<f32> {
    fn collect<S: Copy>(
        planes: &[&[S]],
        frames: usize,
        convert: impl Fn(S) -> f32,
    ) -> Vec<f32> {
        let mut output = Vec::with_capacity(frames * planes.len());
        for frame in 0..frames {
            for plane in planes {
                output.push(convert(plane[frame]));
            }
        }
        output
    }

    match buffer {
        AudioBufferRef::F32(buf) => collect(buf.planes().planes(), buf.frames(), |s| s),
        AudioBufferRef::S16(buf) => {
            collect(buf.planes().planes(), buf.frames(), |s| s as f32 / 32768.0)
        }
        AudioBufferRef::S24(buf) => {
            collect(buf.planes().planes(), buf.frames(), |s| s.0 as f32 / 8388608.0)
        }
        AudioBufferRef::S32(buf) => {
            collect(buf.planes().planes(), buf.frames(), |s| s as f32 / 2147483648.0)
        }
        AudioBufferRef::U8(buf) => {
            collect(buf.planes().planes(), buf.frames(), |s| (s as f32 - 128.0) / 128.0)
        }
        _ => Vec::new(),
    }
}

/// One decoded packet.
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    /// Interleaved samples
    pub samples: Vec<f32>,
    /// Timestamp of this frame
    pub timestamp: Duration,
}
