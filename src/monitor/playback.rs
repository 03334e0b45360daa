//! Streams the trigger asset to the render device.

use crate::audio::{RenderSink, SampleStream, TriggerAsset};
use crate::MonitorError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// PCM frames written per render call.
pub const PLAYBACK_CHUNK_FRAMES: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackReport {
    /// Interleaved samples handed to the render device.
    pub samples_written: u64,
    /// A stop request cut playback short.
    pub interrupted: bool,
    pub elapsed: Duration,
}

/// Plays the trigger asset to completion. Blocks the calling (decision)
/// thread for the duration of the sound, checking `stop` between chunks.
pub struct PlaybackSession {
    chunk_frames: usize,
    stop: Arc<AtomicBool>,
}

impl PlaybackSession {
    pub fn new(stop: Arc<AtomicBool>) -> Self {
        Self {
            chunk_frames: PLAYBACK_CHUNK_FRAMES,
            stop,
        }
    }

    pub fn with_chunk_frames(mut self, chunk_frames: usize) -> Self {
        self.chunk_frames = chunk_frames.max(1);
        self
    }

    /// Play `asset` through `render`, draining before returning.
    ///
    /// Anything already written is drained even when the asset turns out to be
    /// truncated or corrupt part way through.
    pub fn play(
        &self,
        asset: &TriggerAsset,
        render: &mut dyn RenderSink,
    ) -> Result<PlaybackReport, MonitorError> {
        let started = Instant::now();
        let unreadable = |reason: String| MonitorError::AssetUnreadable {
            asset: asset.to_string(),
            reason,
        };
        let (format, samples) = asset.open().map_err(unreadable)?;
        if format != render.format() {
            return Err(unreadable(format!(
                "asset is {} Hz/{} ch but render is {} Hz/{} ch",
                format.sample_rate,
                format.channels,
                render.format().sample_rate,
                render.format().channels
            )));
        }

        let channels = usize::from(format.channels);
        let streamed = self.stream(samples, channels, render)?;
        render.drain()?;

        let report = PlaybackReport {
            samples_written: streamed.samples_written,
            interrupted: streamed.interrupted,
            elapsed: started.elapsed(),
        };
        match streamed.read_error {
            Some(reason) => Err(unreadable(reason)),
            None => Ok(report),
        }
    }

    fn stream(
        &self,
        samples: SampleStream,
        channels: usize,
        render: &mut dyn RenderSink,
    ) -> Result<Streamed, MonitorError> {
        let chunk_samples = self.chunk_frames * channels;
        let mut chunk = Vec::with_capacity(chunk_samples);
        let mut streamed = Streamed::default();

        for sample in samples {
            if chunk.is_empty() && self.stop.load(Ordering::Relaxed) {
                streamed.interrupted = true;
                break;
            }
            match sample {
                Ok(sample) => chunk.push(sample),
                Err(err) => {
                    streamed.read_error = Some(err.to_string());
                    break;
                }
            }
            if chunk.len() == chunk_samples {
                render.write_frames(&chunk)?;
                streamed.samples_written += chunk.len() as u64;
                chunk.clear();
            }
        }

        // Only whole PCM frames go out.
        chunk.truncate(chunk.len() - chunk.len() % channels);
        if !chunk.is_empty() && !streamed.interrupted {
            render.write_frames(&chunk)?;
            streamed.samples_written += chunk.len() as u64;
        }
        Ok(streamed)
    }
}

#[derive(Default)]
struct Streamed {
    samples_written: u64,
    interrupted: bool,
    read_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioFormat;
    use hound::{SampleFormat, WavSpec, WavWriter};
    use std::env;
    use std::fs;
    use std::io::Write;
    use std::path::{Path, PathBuf};
    use std::time::{SystemTime, UNIX_EPOCH};

    #[derive(Default)]
    struct RecordingRender {
        format: Option<AudioFormat>,
        samples: Vec<f32>,
        writes: usize,
        drains: usize,
        fail_after_writes: Option<usize>,
        stop_on_write: Option<Arc<AtomicBool>>,
    }

    impl RecordingRender {
        fn new(format: AudioFormat) -> Self {
            Self {
                format: Some(format),
                ..Self::default()
            }
        }
    }

    impl RenderSink for RecordingRender {
        fn format(&self) -> AudioFormat {
            self.format.unwrap_or_default()
        }

        fn write_frames(&mut self, samples: &[f32]) -> Result<(), MonitorError> {
            if self.fail_after_writes == Some(self.writes) {
                return Err(MonitorError::RenderFailure("device gone".to_string()));
            }
            self.writes += 1;
            self.samples.extend_from_slice(samples);
            if let Some(stop) = &self.stop_on_write {
                stop.store(true, Ordering::Relaxed);
            }
            Ok(())
        }

        fn drain(&mut self) -> Result<(), MonitorError> {
            self.drains += 1;
            Ok(())
        }
    }

    fn temp_path(label: &str) -> PathBuf {
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        env::temp_dir().join(format!("shusher_playback_{label}_{unique}.wav"))
    }

    fn write_asset(label: &str, rate: u32, channels: u16, samples: usize) -> TriggerAsset {
        let path = temp_path(label);
        let spec = WavSpec {
            channels,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        for _ in 0..samples {
            writer.write_sample(8_192i16).unwrap();
        }
        writer.finalize().unwrap();
        TriggerAsset::File(path)
    }

    fn remove(asset: TriggerAsset) {
        if let TriggerAsset::File(path) = asset {
            let _ = fs::remove_file(path);
        }
    }

    fn session() -> PlaybackSession {
        PlaybackSession::new(Arc::new(AtomicBool::new(false))).with_chunk_frames(100)
    }

    #[test]
    fn plays_whole_asset_in_chunks_and_drains() {
        let asset = write_asset("whole", 8_000, 1, 250);
        let mut render = RecordingRender::new(AudioFormat::mono(8_000));
        let report = session().play(&asset, &mut render).unwrap();
        assert_eq!(report.samples_written, 250);
        assert!(!report.interrupted);
        assert_eq!(render.writes, 3);
        assert_eq!(render.drains, 1);
        assert!(render.samples.iter().all(|s| (*s - 0.25).abs() < 1e-6));
        remove(asset);
    }

    #[test]
    fn missing_asset_is_unreadable() {
        let mut render = RecordingRender::new(AudioFormat::mono(8_000));
        let err = session()
            .play(
                &TriggerAsset::from(Path::new("/nonexistent/shush.wav").to_path_buf()),
                &mut render,
            )
            .unwrap_err();
        assert!(matches!(err, MonitorError::AssetUnreadable { .. }));
        assert_eq!(render.writes, 0);
    }

    #[test]
    fn format_mismatch_is_unreadable() {
        let asset = write_asset("mismatch", 8_000, 2, 100);
        let mut render = RecordingRender::new(AudioFormat::mono(8_000));
        let err = session().play(&asset, &mut render).unwrap_err();
        assert!(matches!(err, MonitorError::AssetUnreadable { .. }));
        assert_eq!(render.writes, 0);
        remove(asset);
    }

    #[test]
    fn truncated_asset_still_drains_what_was_written() {
        let asset = write_asset("truncated", 8_000, 1, 400);
        // Chop the data chunk short of what the header promises.
        let TriggerAsset::File(path) = &asset else {
            unreachable!()
        };
        let bytes = fs::read(path).unwrap();
        let cut = bytes.len() - 301;
        let mut file = fs::File::create(path).unwrap();
        file.write_all(&bytes[..cut]).unwrap();
        drop(file);

        let mut render = RecordingRender::new(AudioFormat::mono(8_000));
        let err = session().play(&asset, &mut render).unwrap_err();
        assert!(matches!(err, MonitorError::AssetUnreadable { .. }));
        assert!(!render.samples.is_empty());
        assert_eq!(render.drains, 1);
        remove(asset);
    }

    #[test]
    fn render_failure_is_reported() {
        let asset = write_asset("render_fail", 8_000, 1, 300);
        let mut render = RecordingRender::new(AudioFormat::mono(8_000));
        render.fail_after_writes = Some(1);
        let err = session().play(&asset, &mut render).unwrap_err();
        assert!(matches!(err, MonitorError::RenderFailure(_)));
        assert_eq!(render.writes, 1);
        remove(asset);
    }

    #[test]
    fn stop_request_interrupts_between_chunks() {
        let asset = write_asset("interrupt", 8_000, 1, 1_000);
        let stop = Arc::new(AtomicBool::new(false));
        let session = PlaybackSession::new(stop.clone()).with_chunk_frames(100);
        let mut render = RecordingRender::new(AudioFormat::mono(8_000));
        render.stop_on_write = Some(stop);
        let report = session.play(&asset, &mut render).unwrap();
        assert!(report.interrupted);
        assert_eq!(report.samples_written, 100);
        assert_eq!(render.drains, 1);
        remove(asset);
    }

    #[test]
    fn default_asset_plays_bundled_shush() {
        let asset = TriggerAsset::default();
        let format = asset.header_format().unwrap();
        let mut render = RecordingRender::new(format);
        let report = session().play(&asset, &mut render).unwrap();
        assert!(report.samples_written > 10_000);
        assert_eq!(render.samples.len() as u64, report.samples_written);
        assert!(render.samples.iter().any(|s| s.abs() > 0.05));
        assert_eq!(render.drains, 1);
    }
}
