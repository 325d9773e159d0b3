//! Streaming media backend: HTTP loader, decoder thread and cpal output.
//!
//! - A loader thread per `load` opens the source and probes it while a
//!   fetch thread keeps filling the stream buffer behind the decoder
//! - The decoder thread decodes, converts to the device format and feeds
//!   the output callback through a bounded channel
//! - The cpal callback applies gain and reports position
//!
//! Play/pause and gain go through shared state so they take effect even
//! while the decoder thread is waiting on a full buffer.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender, bounded, unbounded};
use parking_lot::RwLock;

use super::PlayerError;
use super::decoder::AudioDecoder;
use super::engine::{LoadId, MediaEngine, MediaEvent};
use super::resampler::{Resampler, remap_channels};
use super::stream::{StreamBuffer, fill};

/// How long the decoder thread waits on a full buffer before checking
/// for commands again.
const SEND_POLL: Duration = Duration::from_millis(20);

/// State shared between the engine, the decoder thread and the callback.
#[derive(Debug)]
struct OutputState {
    playing: bool,
    gain: f32,
    /// Load the events refer to
    load_id: LoadId,
    /// Bumped on every load and seek; older chunks are skipped
    epoch: u64,
    position: Duration,
    underruns: u32,
}

impl Default for OutputState {
    fn default() -> Self {
        Self {
            playing: false,
            gain: 1.0,
            load_id: 0,
            epoch: 0,
            position: Duration::ZERO,
            underruns: 0,
        }
    }
}

/// A chunk of device-format samples.
struct AudioChunk {
    samples: Vec<f32>,
    timestamp: Duration,
    epoch: u64,
}

enum AudioCommand {
    Loaded {
        load_id: LoadId,
        epoch: u64,
        decoder: AudioDecoder,
    },
    LoadFailed {
        load_id: LoadId,
        message: String,
    },
    Seek {
        epoch: u64,
        position: Duration,
    },
    Stop,
    Shutdown,
}

/// cpal + symphonia implementation of [`MediaEngine`].
pub struct StreamingEngine {
    shared: Arc<RwLock<OutputState>>,
    command_tx: Sender<AudioCommand>,
    event_rx: Receiver<MediaEvent>,
    _stream: Stream,
    audio_thread: Option<JoinHandle<()>>,
}

impl StreamingEngine {
    /// Open the output device. An empty `device_name` selects the default.
    pub fn new(device_name: &str) -> Result<Self, PlayerError> {
        let host = cpal::default_host();
        let device = select_device(&host, device_name)?;
        tracing::info!(
            target: "playback",
            "Using audio device: {}",
            device.name().unwrap_or_else(|_| "Unknown".to_string())
        );

        let supported = device
            .default_output_config()
            .map_err(|e| PlayerError::AudioInit(e.to_string()))?;
        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels();
        tracing::info!(target: "playback", "Audio format: {}Hz, {} channels", sample_rate, channels);

        let config = StreamConfig {
            channels,
            sample_rate: supported.sample_rate(),
            buffer_size: cpal::BufferSize::Default,
        };

        let shared = Arc::new(RwLock::new(OutputState::default()));
        let (command_tx, command_rx) = unbounded();
        let (event_tx, event_rx) = unbounded();
        let (audio_tx, audio_rx) = bounded::<AudioChunk>(8);

        let stream = match supported.sample_format() {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, audio_rx, Arc::clone(&shared)),
            SampleFormat::I16 => build_stream::<i16>(&device, &config, audio_rx, Arc::clone(&shared)),
            SampleFormat::U16 => build_stream::<u16>(&device, &config, audio_rx, Arc::clone(&shared)),
            SampleFormat::I32 => build_stream::<i32>(&device, &config, audio_rx, Arc::clone(&shared)),
            format => {
                return Err(PlayerError::AudioInit(format!(
                    "Unsupported sample format: {:?}",
                    format
                )));
            }
        }
        .map_err(|e| PlayerError::AudioInit(e.to_string()))?;

        let thread_shared = Arc::clone(&shared);
        let device_format = DeviceFormat {
            sample_rate,
            channels,
        };
        let audio_thread = thread::Builder::new()
            .name("audio-decoder".to_string())
            .spawn(move || {
                DecoderThread::new(thread_shared, audio_tx, event_tx, device_format).run(command_rx)
            })
            .map_err(|e| PlayerError::AudioInit(e.to_string()))?;

        stream
            .play()
            .map_err(|e| PlayerError::AudioInit(e.to_string()))?;

        Ok(Self {
            shared,
            command_tx,
            event_rx,
            _stream: stream,
            audio_thread: Some(audio_thread),
        })
    }

    fn send(&self, command: AudioCommand) {
        if self.command_tx.send(command).is_err() {
            tracing::error!(target: "playback", "{}", PlayerError::ChannelClosed);
        }
    }
}

impl MediaEngine for StreamingEngine {
    fn load(&mut self, load_id: LoadId, url: &str) {
        let epoch = {
            let mut state = self.shared.write();
            state.playing = false;
            state.load_id = load_id;
            state.epoch += 1;
            state.position = Duration::ZERO;
            state.epoch
        };

        let url = url.to_string();
        let command_tx = self.command_tx.clone();
        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name("audio-loader".to_string())
            .spawn(move || {
                let command = match open_stream(&url, load_id, shared) {
                    Ok(decoder) => AudioCommand::Loaded {
                        load_id,
                        epoch,
                        decoder,
                    },
                    Err(e) => AudioCommand::LoadFailed {
                        load_id,
                        message: e.to_string(),
                    },
                };
                // Engine dropped meanwhile
                let _ = command_tx.send(command);
            });

        if let Err(e) = spawned {
            self.send(AudioCommand::LoadFailed {
                load_id,
                message: format!("could not start loader: {}", e),
            });
        }
    }

    fn play(&mut self) {
        self.shared.write().playing = true;
    }

    fn pause(&mut self) {
        self.shared.write().playing = false;
    }

    fn stop(&mut self) {
        {
            let mut state = self.shared.write();
            state.playing = false;
            state.epoch += 1;
            // No load is current; pending fetches wind down.
            state.load_id = 0;
        }
        self.send(AudioCommand::Stop);
    }

    fn seek(&mut self, position: Duration) {
        let epoch = {
            let mut state = self.shared.write();
            state.epoch += 1;
            state.position = position;
            state.epoch
        };
        self.send(AudioCommand::Seek { epoch, position });
    }

    fn set_gain(&mut self, gain: f32) {
        self.shared.write().gain = gain.clamp(0.0, 1.0);
    }

    fn poll_events(&mut self) -> Vec<MediaEvent> {
        let mut events: Vec<MediaEvent> = self.event_rx.try_iter().collect();
        let state = self.shared.read();
        if state.playing {
            events.push(MediaEvent::Position {
                load_id: state.load_id,
                position: state.position,
            });
        }
        events
    }
}

impl Drop for StreamingEngine {
    fn drop(&mut self) {
        let _ = self.command_tx.send(AudioCommand::Shutdown);
        if let Some(handle) = self.audio_thread.take() {
            let _ = handle.join();
        }
        let underruns = self.shared.read().underruns;
        if underruns > 0 {
            tracing::debug!(target: "playback", underruns, "Audio output closed");
        }
    }
}

fn select_device(host: &cpal::Host, name: &str) -> Result<Device, PlayerError> {
    if !name.is_empty() {
        let found = host
            .output_devices()
            .map_err(|e| PlayerError::AudioInit(e.to_string()))?
            .find(|d| d.name().is_ok_and(|n| n == name));
        match found {
            Some(device) => return Ok(device),
            None => tracing::warn!(target: "playback", "Audio device '{}' not found, using default", name),
        }
    }

    host.default_output_device()
        .ok_or_else(|| PlayerError::AudioInit("No output device found".to_string()))
}

/// Start streaming `url` and open a decoder on it.
///
/// Returns once the container header has been probed; the body keeps
/// arriving on a fetch thread that stops when `load_id` stops being the
/// current load.
fn open_stream(
    url: &str,
    load_id: LoadId,
    shared: Arc<RwLock<OutputState>>,
) -> Result<AudioDecoder, PlayerError> {
    let client = reqwest::blocking::Client::builder()
        .connect_timeout(Duration::from_secs(15))
        .build()
        .map_err(|e| PlayerError::Fetch(e.to_string()))?;
    let response = client
        .get(url)
        .send()
        .and_then(|r| r.error_for_status())
        .map_err(|e| PlayerError::Fetch(e.to_string()))?;

    let content_length = response.content_length();
    tracing::debug!(target: "playback", ?content_length, "Streaming source");

    let buffer = StreamBuffer::new(content_length, move || shared.read().load_id == load_id);
    let fetch_buffer = Arc::clone(&buffer);
    thread::Builder::new()
        .name("audio-fetch".to_string())
        .spawn(move || fill(&fetch_buffer, response))
        .map_err(|e| PlayerError::Fetch(format!("could not start fetch: {}", e)))?;

    AudioDecoder::open(Box::new(buffer.reader()), extension_hint(url))
}

/// File extension in a URL path, ignoring the query string.
fn extension_hint(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let last = path.rsplit('/').next()?;
    let (_, ext) = last.rsplit_once('.')?;
    (!ext.is_empty() && ext.len() <= 5).then_some(ext)
}

/// Build the output stream for any supported sample type.
fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    audio_rx: Receiver<AudioChunk>,
    state: Arc<RwLock<OutputState>>,
) -> Result<Stream, cpal::BuildStreamError>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let mut current: Option<(AudioChunk, usize)> = None;

    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            let silence = T::from_sample(0.0f32);
            let (playing, gain, epoch) = {
                let s = state.read();
                (s.playing, s.gain, s.epoch)
            };

            if current.as_ref().is_some_and(|(c, _)| c.epoch != epoch) {
                current = None;
            }

            if !playing {
                data.fill(silence);
                return;
            }

            let mut written = 0;
            while written < data.len() {
                if current.is_none() {
                    match audio_rx.try_recv() {
                        Ok(chunk) if chunk.epoch != epoch => continue,
                        Ok(chunk) => {
                            state.write().position = chunk.timestamp;
                            current = Some((chunk, 0));
                        }
                        Err(_) => {
                            state.write().underruns += 1;
                            data[written..].fill(silence);
                            return;
                        }
                    }
                }

                if let Some((ref chunk, ref mut offset)) = current {
                    let n = (chunk.samples.len() - *offset).min(data.len() - written);
                    for (out, sample) in data[written..written + n]
                        .iter_mut()
                        .zip(&chunk.samples[*offset..*offset + n])
                    {
                        *out = T::from_sample(sample * gain);
                    }
                    *offset += n;
                    written += n;
                    if *offset >= chunk.samples.len() {
                        current = None;
                    }
                }
            }
        },
        |err| {
            tracing::error!(target: "playback", "Audio stream error: {}", err);
        },
        None,
    )
}

#[derive(Debug, Clone, Copy)]
struct DeviceFormat {
    sample_rate: u32,
    channels: u16,
}

/// The source currently being decoded.
struct ActiveSource {
    load_id: LoadId,
    epoch: u64,
    decoder: AudioDecoder,
    resampler: Resampler,
    /// Decoding finished; waiting for the output to drain
    draining: bool,
}

/// Decoder thread context
struct DecoderThread {
    shared: Arc<RwLock<OutputState>>,
    audio_tx: Sender<AudioChunk>,
    event_tx: Sender<MediaEvent>,
    device: DeviceFormat,
    source: Option<ActiveSource>,
    pending: Option<AudioChunk>,
}

impl DecoderThread {
    fn new(
        shared: Arc<RwLock<OutputState>>,
        audio_tx: Sender<AudioChunk>,
        event_tx: Sender<MediaEvent>,
        device: DeviceFormat,
    ) -> Self {
        Self {
            shared,
            audio_tx,
            event_tx,
            device,
            source: None,
            pending: None,
        }
    }

    fn run(mut self, command_rx: Receiver<AudioCommand>) {
        loop {
            let busy = self.source.is_some() && self.shared.read().playing;

            // Block on commands when idle, poll when playing
            let command = if busy {
                command_rx.try_recv().ok()
            } else {
                match command_rx.recv_timeout(Duration::from_millis(50)) {
                    Ok(cmd) => Some(cmd),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            };

            if let Some(cmd) = command
                && !self.handle_command(cmd)
            {
                break;
            }

            if busy && !self.step() {
                break;
            }
        }
        tracing::debug!(target: "playback", "Decoder thread exiting");
    }

    /// Returns false on shutdown.
    fn handle_command(&mut self, command: AudioCommand) -> bool {
        match command {
            AudioCommand::Loaded {
                load_id,
                epoch,
                decoder,
            } => {
                if self.shared.read().load_id != load_id {
                    return true;
                }
                match Resampler::new(decoder.sample_rate(), self.device.sample_rate, decoder.channels().min(self.device.channels)) {
                    Ok(resampler) => {
                        let duration = decoder.duration();
                        self.pending = None;
                        self.source = Some(ActiveSource {
                            load_id,
                            epoch,
                            decoder,
                            resampler,
                            draining: false,
                        });
                        self.emit(MediaEvent::Ready {
                            load_id,
                            duration: (!duration.is_zero()).then_some(duration),
                        });
                    }
                    Err(e) => self.emit(MediaEvent::Failed {
                        load_id,
                        message: e.to_string(),
                    }),
                }
            }
            AudioCommand::LoadFailed { load_id, message } => {
                if self.shared.read().load_id == load_id {
                    self.source = None;
                    self.emit(MediaEvent::Failed { load_id, message });
                }
            }
            AudioCommand::Seek { epoch, position } => {
                self.pending = None;
                if let Some(source) = self.source.as_mut() {
                    source.epoch = epoch;
                    source.draining = false;
                    source.resampler.reset();
                    if let Err(e) = source.decoder.seek(position) {
                        tracing::warn!(target: "playback", "Seek failed: {}", e);
                    }
                }
            }
            AudioCommand::Stop => {
                self.source = None;
                self.pending = None;
            }
            AudioCommand::Shutdown => return false,
        }
        true
    }

    /// Push one chunk toward the output. Returns false when the output is gone.
    fn step(&mut self) -> bool {
        if let Some(chunk) = self.pending.take() {
            return match self.audio_tx.send_timeout(chunk, SEND_POLL) {
                Ok(()) => true,
                Err(SendTimeoutError::Timeout(chunk)) => {
                    self.pending = Some(chunk);
                    true
                }
                Err(SendTimeoutError::Disconnected(_)) => false,
            };
        }

        let device_channels = usize::from(self.device.channels);
        let Some(source) = self.source.as_mut() else {
            return true;
        };

        if source.draining {
            if self.audio_tx.is_empty() {
                let load_id = source.load_id;
                self.source = None;
                tracing::info!(target: "playback", "Playback finished");
                self.emit(MediaEvent::Ended { load_id });
            } else {
                thread::sleep(SEND_POLL);
            }
            return true;
        }

        let decoded_channels = usize::from(source.decoder.channels());
        let resampled_channels = decoded_channels.min(device_channels);
        match source.decoder.decode_next() {
            Ok(Some(frame)) => {
                let narrowed = remap_channels(&frame.samples, decoded_channels, resampled_channels);
                let resampled = source.resampler.process(&narrowed);
                let samples = remap_channels(&resampled, resampled_channels, device_channels);
                if !samples.is_empty() {
                    self.pending = Some(AudioChunk {
                        samples,
                        timestamp: frame.timestamp,
                        epoch: source.epoch,
                    });
                }
            }
            Ok(None) => {
                let tail = source.resampler.flush();
                let samples = remap_channels(&tail, resampled_channels, device_channels);
                if !samples.is_empty() {
                    self.pending = Some(AudioChunk {
                        samples,
                        timestamp: source.decoder.duration(),
                        epoch: source.epoch,
                    });
                }
                source.draining = true;
            }
            Err(e) => {
                let load_id = source.load_id;
                tracing::error!(target: "playback", "Decode error: {}", e);
                self.source = None;
                self.emit(MediaEvent::Failed {
                    load_id,
                    message: e.to_string(),
                });
            }
        }
        true
    }

    fn emit(&self, event: MediaEvent) {
        let _ = self.event_tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_hint() {
        assert_eq!(extension_hint("https://cdn.example/a/b.flac?token=x"), Some("flac"));
        assert_eq!(extension_hint("https://cdn.example/a/b.mp3"), Some("mp3"));
        assert_eq!(extension_hint("https://cdn.example/stream"), None);
        assert_eq!(extension_hint("https://cdn.example/a/b.verylongext"), None);
    }
}
