//! WAV file adapters: replay a recording as a pull-model capture source and
//! record rendered triggers to a file. Also the decoder behind
//! [`super::TriggerAsset`].

use super::{
    AudioBackend, AudioFormat, AudioFrame, CaptureHandle, CaptureQueue, DeviceRole, FrameSource,
    ReadOutcome, RenderHandle, RenderSink, SourceClock,
};
use crate::MonitorError;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::fs::File;
use std::io::{BufWriter, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Interleaved samples decoded to `f32`.
pub(crate) type SampleStream = Box<dyn Iterator<Item = Result<f32, hound::Error>> + Send>;

/// Decode lazily. Integer PCM of any width and 32-bit float are supported.
pub(crate) fn decode_wav<R>(reader: WavReader<R>) -> Result<(AudioFormat, SampleStream), String>
where
    R: Read + Send + 'static,
{
    let spec = reader.spec();
    let format = AudioFormat::new(spec.sample_rate, spec.channels);
    let stream: SampleStream = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Float, 32) => Box::new(reader.into_samples::<f32>()),
        (SampleFormat::Int, bits @ 1..=32) => {
            let scale = 1.0 / (1u64 << (bits - 1)) as f32;
            Box::new(
                reader
                    .into_samples::<i32>()
                    .map(move |sample| sample.map(|value| value as f32 * scale)),
            )
        }
        (sample_format, bits) => {
            return Err(format!("unsupported sample format {sample_format:?}/{bits}-bit"))
        }
    };
    Ok((format, stream))
}

/// Capture from a WAV file, render to a WAV file (or nowhere).
#[derive(Debug, Clone, Default)]
pub struct WavBackend {
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    realtime: bool,
}

impl WavBackend {
    pub fn new(input: Option<PathBuf>, output: Option<PathBuf>) -> Self {
        Self {
            input,
            output,
            realtime: false,
        }
    }

    /// Replay at wall-clock speed instead of on demand.
    pub fn realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }
}

impl AudioBackend for WavBackend {
    fn name(&self) -> &'static str {
        "wav"
    }

    fn open_capture(
        &self,
        _device: Option<&str>,
        block_frames: usize,
        _queue: Arc<CaptureQueue>,
    ) -> Result<CaptureHandle, MonitorError> {
        let path = self.input.as_deref().ok_or_else(|| {
            MonitorError::device_unavailable(DeviceRole::Capture, None, "no input WAV configured")
        })?;
        let source = WavSource::open(path, block_frames)?.realtime(self.realtime);
        Ok(CaptureHandle::Pull(Box::new(source)))
    }

    fn open_render(
        &self,
        _device: Option<&str>,
        format: AudioFormat,
    ) -> Result<RenderHandle, MonitorError> {
        match &self.output {
            Some(path) => Ok(RenderHandle::new(Box::new(WavRender::create(path, format)?))),
            None => Ok(RenderHandle::new(Box::new(NullRender::new(format)))),
        }
    }
}

/// Pull-model capture that replays a WAV file block by block. The reader
/// decides the pace; see [`SourceClock`].
pub struct WavSource {
    samples: SampleStream,
    format: AudioFormat,
    block_frames: usize,
    realtime: bool,
    finished: bool,
    /// Decode error held back so the blocks read before it are delivered first.
    pending_error: Option<MonitorError>,
}

impl WavSource {
    pub fn open(path: &Path, block_frames: usize) -> Result<Self, MonitorError> {
        let unavailable = |reason: String| {
            MonitorError::device_unavailable(
                DeviceRole::Capture,
                Some(&path.display().to_string()),
                reason,
            )
        };
        let reader = WavReader::open(path).map_err(|err| unavailable(err.to_string()))?;
        let (format, samples) = decode_wav(reader).map_err(unavailable)?;
        Ok(Self {
            samples,
            format,
            block_frames: block_frames.max(1),
            realtime: false,
            finished: false,
            pending_error: None,
        })
    }

    pub fn realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }

    /// Next block; the final partial block is padded with silence.
    fn next_block(&mut self) -> Result<Option<AudioFrame>, MonitorError> {
        let block_samples = self.block_frames * usize::from(self.format.channels);
        let mut samples = Vec::with_capacity(block_samples);
        while samples.len() < block_samples {
            match self.samples.next() {
                Some(Ok(sample)) => samples.push(sample),
                Some(Err(err)) => return Err(MonitorError::IoFailure(err.to_string())),
                None => {
                    self.finished = true;
                    break;
                }
            }
        }
        if samples.is_empty() {
            return Ok(None);
        }
        samples.resize(block_samples, 0.0);
        Ok(Some(AudioFrame::new(samples, self.format.channels)))
    }
}

impl FrameSource for WavSource {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn clock(&self) -> SourceClock {
        if self.realtime {
            SourceClock::Paced
        } else {
            SourceClock::OnDemand
        }
    }

    fn read_frames(&mut self, max_frames: usize) -> Result<ReadOutcome, MonitorError> {
        if let Some(err) = self.pending_error.take() {
            return Err(err);
        }
        if self.finished {
            return Ok(ReadOutcome::EndOfStream);
        }
        let mut frames = Vec::with_capacity(max_frames.max(1));
        while frames.len() < max_frames.max(1) && !self.finished {
            match self.next_block() {
                Ok(Some(frame)) => frames.push(frame),
                Ok(None) => break,
                Err(err) if frames.is_empty() => return Err(err),
                Err(err) => {
                    self.pending_error = Some(err);
                    break;
                }
            }
        }
        if frames.is_empty() {
            return Ok(ReadOutcome::EndOfStream);
        }
        Ok(ReadOutcome::Frames(frames))
    }
}

/// Writes rendered audio to a 16-bit WAV file.
pub struct WavRender {
    writer: Option<WavWriter<BufWriter<File>>>,
    format: AudioFormat,
}

impl WavRender {
    pub fn create(path: &Path, format: AudioFormat) -> Result<Self, MonitorError> {
        let spec = WavSpec {
            channels: format.channels,
            sample_rate: format.sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let writer = WavWriter::create(path, spec).map_err(|err| {
            MonitorError::device_unavailable(
                DeviceRole::Render,
                Some(&path.display().to_string()),
                err,
            )
        })?;
        Ok(Self {
            writer: Some(writer),
            format,
        })
    }
}

impl RenderSink for WavRender {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn write_frames(&mut self, samples: &[f32]) -> Result<(), MonitorError> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| MonitorError::RenderFailure("render file already closed".to_string()))?;
        for sample in samples {
            let value = (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16;
            writer
                .write_sample(value)
                .map_err(|err| MonitorError::RenderFailure(err.to_string()))?;
        }
        Ok(())
    }

    fn drain(&mut self) -> Result<(), MonitorError> {
        if let Some(writer) = self.writer.as_mut() {
            writer
                .flush()
                .map_err(|err| MonitorError::RenderFailure(err.to_string()))?;
        }
        Ok(())
    }
}

impl Drop for WavRender {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            if let Err(err) = writer.finalize() {
                tracing::warn!(error = %err, "failed to finalize render file");
            }
        }
    }
}

/// Discards rendered audio. Used for offline replays without an output file.
#[derive(Debug)]
pub struct NullRender {
    format: AudioFormat,
}

impl NullRender {
    pub fn new(format: AudioFormat) -> Self {
        Self { format }
    }
}

impl RenderSink for NullRender {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn write_frames(&mut self, _samples: &[f32]) -> Result<(), MonitorError> {
        Ok(())
    }

    fn drain(&mut self) -> Result<(), MonitorError> {
        Ok(())
    }
}
