//! Audio capture from microphone
//!
//! The capture side of the pipeline: a cpal input stream cut into fixed-size
//! blocks of 16-bit mono PCM, handed to a [`BlockSink`] from the audio thread.

use std::thread::{self, JoinHandle};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, SampleRate, Stream, StreamConfig, StreamError};
use crossbeam_channel::{Receiver, Sender};

use crate::{Error, Result};

/// Sample rate for audio capture (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// Frames per block (0.5s at 16kHz)
pub const BLOCK_SIZE: usize = 8000;

/// Bytes per sample of 16-bit PCM
const BYTES_PER_SAMPLE: usize = 2;

/// One capture period of signed 16-bit little-endian mono PCM
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioBlock {
    bytes: Vec<u8>,
}

impl AudioBlock {
    /// Build a block from PCM samples
    #[must_use]
    pub fn from_samples(samples: &[i16]) -> Self {
        let bytes = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        Self { bytes }
    }

    /// Raw little-endian PCM bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Decode the block back into samples
    #[must_use]
    pub fn samples(&self) -> Vec<i16> {
        self.bytes
            .chunks_exact(BYTES_PER_SAMPLE)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect()
    }

    /// Number of frames in the block
    #[must_use]
    pub fn frames(&self) -> usize {
        self.bytes.len() / BYTES_PER_SAMPLE
    }

    /// Whether the block holds no audio
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// RMS level normalised to `0.0..=1.0`
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn rms(&self) -> f32 {
        let samples = self.samples();
        if samples.is_empty() {
            return 0.0;
        }
        let sum_squares: f32 = samples
            .iter()
            .map(|&s| {
                let v = f32::from(s) / 32768.0;
                v * v
            })
            .sum();
        (sum_squares / samples.len() as f32).sqrt()
    }
}

/// Message travelling from the audio thread to the consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    /// A completed capture block
    Block(AudioBlock),
    /// The device closed or vanished; no further blocks will arrive
    DeviceLost(String),
}

/// Producer end of the capture queue
///
/// Pushing never blocks: the queue is unbounded.
#[derive(Debug, Clone)]
pub struct BlockSink {
    tx: Sender<CaptureEvent>,
}

impl BlockSink {
    /// Create a sink together with the receiving end of its queue
    #[must_use]
    pub fn channel() -> (Self, Receiver<CaptureEvent>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self { tx }, rx)
    }

    /// Hand a completed block to the consumer
    ///
    /// Returns false once the consumer has gone away.
    pub fn push(&self, block: AudioBlock) -> bool {
        self.tx.send(CaptureEvent::Block(block)).is_ok()
    }

    /// Report that the device is gone
    pub fn device_lost(&self, reason: impl Into<String>) {
        let _ = self.tx.send(CaptureEvent::DeviceLost(reason.into()));
    }
}

/// An open capture stream; dropping or closing it releases the device
///
/// `Send` so the owner can close it from a helper thread and bound the wait.
pub trait CaptureStream: Send {
    /// Stop the stream and release the device
    ///
    /// # Errors
    ///
    /// Returns error if the driver refuses to stop the stream. The device is
    /// released regardless.
    fn close(self: Box<Self>) -> Result<()>;
}

/// Something that can open a continuous input stream
pub trait AudioSource {
    /// Open the device and start delivering blocks to `sink`
    ///
    /// # Errors
    ///
    /// Returns error if the device cannot be opened
    fn open(&mut self, sink: BlockSink) -> Result<Box<dyn CaptureStream>>;
}

/// Splits an arbitrary-length callback buffer into fixed-size blocks
#[derive(Debug)]
pub(crate) struct BlockAssembler {
    block_size: usize,
    pending: Vec<i16>,
}

impl BlockAssembler {
    pub(crate) fn new(block_size: usize) -> Self {
        let block_size = block_size.max(1);
        Self {
            block_size,
            pending: Vec::with_capacity(block_size),
        }
    }

    /// Feed mono samples, calling `emit` for every completed block
    pub(crate) fn extend(&mut self, samples: &[i16], mut emit: impl FnMut(AudioBlock)) {
        let mut rest = samples;
        while !rest.is_empty() {
            let room = self.block_size - self.pending.len();
            let take = room.min(rest.len());
            self.pending.extend_from_slice(&rest[..take]);
            rest = &rest[take..];

            if self.pending.len() == self.block_size {
                emit(AudioBlock::from_samples(&self.pending));
                self.pending.clear();
            }
        }
    }
}

/// Captures audio from the default (or a named) input device via cpal
///
/// cpal streams cannot leave the thread that built them, so every opened
/// stream lives on its own `hark-capture` thread until closed.
#[derive(Debug, Clone)]
pub struct CpalSource {
    device_name: Option<String>,
    sample_rate: u32,
    block_size: usize,
}

impl CpalSource {
    /// Create a source for the given device, rate and block size
    #[must_use]
    pub const fn new(device_name: Option<String>, sample_rate: u32, block_size: usize) -> Self {
        Self {
            device_name,
            sample_rate,
            block_size,
        }
    }

    /// Get the sample rate
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// List available input device names
    ///
    /// # Errors
    ///
    /// Returns error if devices cannot be enumerated
    pub fn list_input_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
            .map_err(|e| Error::Audio(format!("cannot enumerate devices: {e}")))?;

        Ok(devices.filter_map(|d| d.name().ok()).collect())
    }

    fn device(&self) -> Result<Device> {
        let host = cpal::default_host();

        match &self.device_name {
            Some(name) => host
                .input_devices()
                .map_err(|e| Error::Audio(format!("cannot enumerate devices: {e}")))?
                .find(|d| d.name().is_ok_and(|n| &n == name))
                .ok_or_else(|| Error::Audio(format!("input device '{name}' not found"))),
            None => host
                .default_input_device()
                .ok_or_else(|| Error::Audio("no input device available".to_string())),
        }
    }

    /// Pick a config at our sample rate, preferring mono
    fn stream_config(&self, device: &Device) -> Result<(StreamConfig, SampleFormat)> {
        let rate = SampleRate(self.sample_rate);
        let ranges: Vec<_> = device
            .supported_input_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .filter(|c| c.min_sample_rate() <= rate && c.max_sample_rate() >= rate)
            .filter(|c| matches!(c.sample_format(), SampleFormat::I16 | SampleFormat::F32))
            .collect();

        let supported = ranges
            .iter()
            .find(|c| c.channels() == 1 && c.sample_format() == SampleFormat::I16)
            .or_else(|| ranges.iter().find(|c| c.channels() == 1))
            .or_else(|| ranges.first())
            .cloned()
            .ok_or_else(|| Error::Audio("no suitable audio config found".to_string()))?
            .with_sample_rate(rate);

        Ok((supported.config(), supported.sample_format()))
    }

    /// Build and start the input stream on the calling thread
    fn build_stream(&self, sink: BlockSink) -> Result<Stream> {
        let device = self.device()?;
        let (config, format) = self.stream_config(&device)?;
        let channels = usize::from(config.channels);

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = self.sample_rate,
            channels,
            block_size = self.block_size,
            ?format,
            "audio capture initialized"
        );

        let error_sink = sink.clone();
        let on_error = move |err: StreamError| handle_stream_error(&err, &error_sink);

        let mut assembler = BlockAssembler::new(self.block_size);
        let stream = match format {
            SampleFormat::I16 => device.build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    let mono = downmix(data, channels);
                    assembler.extend(&mono, |block| {
                        sink.push(block);
                    });
                },
                on_error,
                None,
            ),
            SampleFormat::F32 => device.build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let converted: Vec<i16> = data.iter().map(|&s| f32_to_i16(s)).collect();
                    let mono = downmix(&converted, channels);
                    assembler.extend(&mono, |block| {
                        sink.push(block);
                    });
                },
                on_error,
                None,
            ),
            other => return Err(Error::Audio(format!("unsupported sample format {other:?}"))),
        }
        .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        tracing::debug!("audio capture started");
        Ok(stream)
    }
}

impl AudioSource for CpalSource {
    fn open(&mut self, sink: BlockSink) -> Result<Box<dyn CaptureStream>> {
        let settings = self.clone();
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);

        let thread = thread::Builder::new()
            .name("hark-capture".to_string())
            .spawn(move || {
                let stream = match settings.build_stream(sink) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return Ok(());
                    }
                };
                let _ = ready_tx.send(Ok(()));

                // Nothing is ever sent; the handle closing disconnects us
                let _ = stop_rx.recv();

                let result = stream
                    .pause()
                    .map_err(|e| Error::Audio(format!("failed to pause input stream: {e}")));
                drop(stream);
                tracing::debug!("audio capture stopped");
                result
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Box::new(CpalStream { stop_tx, thread })),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => Err(Error::Audio(
                "capture thread exited during setup".to_string(),
            )),
        }
    }
}

/// Handle to a stream running on its capture thread
struct CpalStream {
    stop_tx: Sender<()>,
    thread: JoinHandle<Result<()>>,
}

impl CaptureStream for CpalStream {
    fn close(self: Box<Self>) -> Result<()> {
        let Self { stop_tx, thread } = *self;
        drop(stop_tx);
        thread
            .join()
            .map_err(|_| Error::Audio("capture thread panicked".to_string()))?
    }
}

/// Driver error policy: losing the device ends the stream, overruns and
/// other hiccups are only logged
fn handle_stream_error(err: &StreamError, sink: &BlockSink) {
    if matches!(err, StreamError::DeviceNotAvailable) {
        tracing::error!("audio input device disappeared");
        sink.device_lost("input device is no longer available");
    } else {
        tracing::warn!(error = %err, "audio capture error");
    }
}

/// Average interleaved frames down to one channel
fn downmix(data: &[i16], channels: usize) -> Vec<i16> {
    if channels <= 1 {
        return data.to_vec();
    }

    data.chunks_exact(channels)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| i32::from(s)).sum();
            #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
            let avg = (sum / channels as i32) as i16;
            avg
        })
        .collect()
}

/// Convert f32 `[-1.0, 1.0]` to i16
#[allow(clippy::cast_possible_truncation)]
fn f32_to_i16(sample: f32) -> i16 {
    (sample * 32767.0).clamp(-32768.0, 32767.0) as i16
}

/// Encode 16-bit PCM samples as WAV bytes
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[i16], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            writer
                .write_sample(sample)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}
