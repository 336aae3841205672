//! Output frames and the per-session decoded packet buffer.

/// One stereo output frame as consumed by the host mixer.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StereoFrame {
    pub left: f32,
    pub right: f32,
}

impl StereoFrame {
    pub const SILENCE: StereoFrame = StereoFrame {
        left: 0.0,
        right: 0.0,
    };

    pub fn new(left: f32, right: f32) -> Self {
        Self { left, right }
    }

    pub fn is_silent(&self) -> bool {
        self.left == 0.0 && self.right == 0.0
    }
}

/// Fill `out` with silence.
pub fn fill_silence(out: &mut [StereoFrame]) {
    out.fill(StereoFrame::SILENCE);
}

/// Interleaved stereo samples of exactly one decoded packet, plus a read cursor.
///
/// The cursor only ever advances two samples at a time and never passes the end, so
/// `cursor() <= len()` holds at every observation point. The backing allocation is kept
/// across [`release`](Self::release) so steady-state decoding does not allocate.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    samples: Vec<f32>,
    cursor: usize,
}

impl FrameBuffer {
    /// Empty buffer with room for `frames` stereo frames.
    pub fn with_capacity(frames: usize) -> Self {
        Self {
            samples: Vec::with_capacity(frames.saturating_mul(2)),
            cursor: 0,
        }
    }

    /// Number of samples (not frames) held.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Read position in samples.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Whole frames left to read.
    pub fn remaining_frames(&self) -> usize {
        (self.samples.len() - self.cursor) / 2
    }

    /// `true` when no whole frame is left. A trailing odd sample is never played.
    pub fn is_exhausted(&self) -> bool {
        self.remaining_frames() == 0
    }

    /// Consume the next (left, right) pair.
    pub fn next_frame(&mut self) -> Option<StereoFrame> {
        if self.is_exhausted() {
            return None;
        }
        let frame = StereoFrame::new(self.samples[self.cursor], self.samples[self.cursor + 1]);
        self.cursor += 2;
        Some(frame)
    }

    /// Drop the held packet and rewind. Capacity is retained.
    pub fn release(&mut self) {
        self.samples.clear();
        self.cursor = 0;
    }

    /// Storage for the next decoded packet. Only valid on a released buffer.
    pub(crate) fn refill_target(&mut self) -> &mut Vec<f32> {
        debug_assert!(self.samples.is_empty() && self.cursor == 0);
        &mut self.samples
    }
}
