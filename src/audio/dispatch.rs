use super::{AudioFrame, CaptureQueue, PushOutcome};
use std::sync::Arc;

/// Downmix multi-channel input to mono while applying the provided converter so
/// the meter sees a single channel regardless of the microphone layout.
pub(super) fn append_downmixed_samples<T, F>(
    buf: &mut Vec<f32>,
    data: &[T],
    channels: usize,
    mut convert: F,
) where
    T: Copy,
    F: FnMut(T) -> f32,
{
    if channels <= 1 {
        buf.extend(data.iter().copied().map(&mut convert));
        return;
    }

    // Average each interleaved frame to produce a mono representation.
    let mut acc = 0.0f32;
    let mut count = 0usize;
    for sample in data.iter().copied() {
        acc += convert(sample);
        count += 1;
        if count == channels {
            buf.push(acc / channels as f32);
            acc = 0.0;
            count = 0;
        }
    }
    if count > 0 {
        buf.push(acc / count as f32);
    }
}

/// Cuts arbitrary callback buffers into fixed-length mono frames and hands
/// them to the capture queue. Owned by the capture callback, so it never
/// contends with the decision thread except inside `CaptureQueue::push`.
pub(super) struct FrameDispatcher {
    frame_samples: usize,
    pending: Vec<f32>,
    scratch: Vec<f32>,
    queue: Arc<CaptureQueue>,
}

impl FrameDispatcher {
    pub(super) fn new(frame_samples: usize, queue: Arc<CaptureQueue>) -> Self {
        let frame_samples = frame_samples.max(1);
        Self {
            frame_samples,
            pending: Vec::with_capacity(frame_samples * 2),
            scratch: Vec::new(),
            queue,
        }
    }

    pub(super) fn push<T, F>(&mut self, data: &[T], channels: usize, convert: F)
    where
        T: Copy,
        F: FnMut(T) -> f32,
    {
        self.scratch.clear();
        append_downmixed_samples(&mut self.scratch, data, channels, convert);
        self.pending.extend_from_slice(&self.scratch);

        while self.pending.len() >= self.frame_samples {
            let samples: Vec<f32> = self.pending.drain(..self.frame_samples).collect();
            if self.queue.push(AudioFrame::new(samples, 1)) == PushOutcome::Closed {
                self.pending.clear();
                break;
            }
        }
    }
}
