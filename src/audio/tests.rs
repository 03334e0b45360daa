use super::dispatch::{append_downmixed_samples, FrameDispatcher};
use super::{
    AudioBackend, AudioFormat, AudioFrame, Batch, CaptureHandle, CaptureQueue, FrameSource,
    ReadOutcome, RenderSink, SourceClock, WavBackend, WavRender, WavSource,
};
use crate::MonitorError;
use hound::{SampleFormat, WavSpec, WavWriter};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

fn temp_wav(label: &str) -> PathBuf {
    let unique = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    env::temp_dir().join(format!("shusher_audio_{label}_{unique}.wav"))
}

fn write_i16_wav(path: &PathBuf, rate: u32, channels: u16, samples: &[i16]) {
    let spec = WavSpec {
        channels,
        sample_rate: rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec).unwrap();
    for sample in samples {
        writer.write_sample(*sample).unwrap();
    }
    writer.finalize().unwrap();
}

fn drain_frames(queue: &CaptureQueue) -> Vec<AudioFrame> {
    queue.close();
    let mut frames = Vec::new();
    while let Batch::Frames(batch) = queue.pop_batch(64) {
        frames.extend(batch);
    }
    frames
}

#[test]
fn downmixes_multi_channel_audio() {
    let mut buf = Vec::new();
    let samples = [1.0f32, -1.0, 0.5, 0.5];
    append_downmixed_samples(&mut buf, &samples, 2, |sample| sample);
    assert_eq!(buf, vec![0.0, 0.5]);
}

#[test]
fn preserves_single_channel_audio() {
    let mut buf = Vec::new();
    let samples = [0.1f32, 0.2, 0.3];
    append_downmixed_samples(&mut buf, &samples, 1, |sample| sample);
    assert_eq!(buf, samples);
}

#[test]
fn downmix_averages_trailing_partial_frame() {
    let mut buf = Vec::new();
    append_downmixed_samples(&mut buf, &[0.2f32, 0.4, 0.6], 2, |sample| sample);
    assert_eq!(buf.len(), 2);
    assert!((buf[1] - 0.6).abs() < 1e-6);
}

#[test]
fn dispatcher_cuts_fixed_length_frames() {
    let queue = Arc::new(CaptureQueue::new(16));
    let mut dispatcher = FrameDispatcher::new(4, queue.clone());
    dispatcher.push(&[0.1f32; 6], 1, |s| s);
    assert_eq!(queue.len(), 1);
    dispatcher.push(&[0.2f32; 3], 1, |s| s);
    let frames = drain_frames(&queue);
    assert_eq!(frames.len(), 2);
    assert!(frames.iter().all(|frame| frame.frame_count() == 4));
    assert_eq!(frames[1].samples(), &[0.1, 0.1, 0.2, 0.2]);
}

#[test]
fn dispatcher_converts_and_downmixes_integer_input() {
    let queue = Arc::new(CaptureQueue::new(4));
    let mut dispatcher = FrameDispatcher::new(2, queue.clone());
    dispatcher.push(&[16_384i16, 16_384, -16_384, -16_384], 2, |s| {
        s as f32 / 32_768.0
    });
    let frames = drain_frames(&queue);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].samples(), &[0.5, -0.5]);
    assert_eq!(frames[0].channels(), 1);
}

#[test]
fn dispatcher_stops_when_queue_closes() {
    let queue = Arc::new(CaptureQueue::new(4));
    queue.close();
    let mut dispatcher = FrameDispatcher::new(2, queue.clone());
    dispatcher.push(&[0.0f32; 8], 1, |s| s);
    assert!(queue.is_empty());
}

#[test]
fn format_converts_between_frames_and_time() {
    let format = AudioFormat::mono(16_000);
    assert_eq!(format.frames_for(Duration::from_secs(3)), 48_000);
    assert_eq!(format.duration_of(8_000), Duration::from_millis(500));
}

#[test]
fn wav_source_reads_padded_blocks_then_ends() {
    let path = temp_wav("source");
    write_i16_wav(&path, 8_000, 1, &[16_384; 10]);
    let mut source = WavSource::open(&path, 4).unwrap();
    assert_eq!(source.format(), AudioFormat::mono(8_000));

    let frames = match source.read_frames(8).unwrap() {
        ReadOutcome::Frames(frames) => frames,
        ReadOutcome::EndOfStream => panic!("expected frames"),
    };
    assert_eq!(frames.len(), 3);
    assert_eq!(frames[0].samples(), &[0.5; 4]);
    assert_eq!(frames[2].samples(), &[0.5, 0.5, 0.0, 0.0]);
    assert!(matches!(
        source.read_frames(8).unwrap(),
        ReadOutcome::EndOfStream
    ));
    let _ = std::fs::remove_file(path);
}

#[test]
fn wav_source_delivers_decoded_blocks_before_a_read_error() {
    let path = temp_wav("truncated");
    write_i16_wav(&path, 8_000, 1, &[8_192; 40]);
    let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
    let len = file.metadata().unwrap().len();
    file.set_len(len - 30).unwrap();
    drop(file);

    // 25 samples survive: six whole blocks, then the seventh hits the cut.
    let mut source = WavSource::open(&path, 4).unwrap();
    match source.read_frames(32).unwrap() {
        ReadOutcome::Frames(frames) => {
            assert_eq!(frames.len(), 6);
            assert_eq!(frames[5].samples(), &[0.25; 4]);
        }
        ReadOutcome::EndOfStream => panic!("expected frames"),
    }
    assert!(matches!(
        source.read_frames(32),
        Err(MonitorError::IoFailure(_))
    ));
    let _ = std::fs::remove_file(path);
}

#[test]
fn wav_source_clock_follows_pacing() {
    let path = temp_wav("clock");
    write_i16_wav(&path, 8_000, 1, &[0; 8]);
    let source = WavSource::open(&path, 4).unwrap();
    assert_eq!(source.clock(), SourceClock::OnDemand);
    assert_eq!(source.realtime(true).clock(), SourceClock::Paced);
    let _ = std::fs::remove_file(path);
}

#[test]
fn wav_source_keeps_file_channel_layout() {
    let path = temp_wav("stereo");
    write_i16_wav(&path, 8_000, 2, &[0; 16]);
    let mut source = WavSource::open(&path, 4).unwrap();
    assert_eq!(source.format().channels, 2);
    match source.read_frames(1).unwrap() {
        ReadOutcome::Frames(frames) => {
            assert_eq!(frames[0].channels(), 2);
            assert_eq!(frames[0].frame_count(), 4);
        }
        ReadOutcome::EndOfStream => panic!("expected frames"),
    }
    let _ = std::fs::remove_file(path);
}

#[test]
fn wav_backend_without_input_is_unavailable() {
    let backend = WavBackend::new(None, None);
    let queue = Arc::new(CaptureQueue::new(4));
    let result = backend.open_capture(None, 4, queue);
    assert!(matches!(
        result,
        Err(MonitorError::DeviceUnavailable { .. })
    ));
}

#[test]
fn wav_backend_opens_pull_capture() {
    let path = temp_wav("pull");
    write_i16_wav(&path, 8_000, 1, &[0; 8]);
    let backend = WavBackend::new(Some(path.clone()), None);
    let handle = backend
        .open_capture(None, 4, Arc::new(CaptureQueue::new(4)))
        .unwrap();
    assert!(matches!(handle, CaptureHandle::Pull(_)));
    assert_eq!(handle.format(), AudioFormat::mono(8_000));
    let _ = std::fs::remove_file(path);
}

#[test]
fn wav_render_writes_readable_file() {
    let path = temp_wav("render");
    {
        let mut render = WavRender::create(&path, AudioFormat::mono(8_000)).unwrap();
        render.write_frames(&[0.5, -0.5, 2.0]).unwrap();
        render.drain().unwrap();
    }
    let mut reader = hound::WavReader::open(&path).unwrap();
    let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
    assert_eq!(samples, vec![16_383, -16_383, i16::MAX]);
    let _ = std::fs::remove_file(path);
}
