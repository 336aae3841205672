//! Host-side mixer: pulls stereo frames from a playback session and adapts them to the
//! output device rate.
//!
//! When the device runs at the stream's native rate, frames pass straight through. Otherwise
//! a Rubato sinc resampler runs inline in the device callback on fixed input chunks; the
//! surplus of each chunk waits in a preallocated FIFO for the next callback.

use std::collections::VecDeque;

use anyhow::{Result, anyhow};
use audio_stream::{PlaybackSession, StereoFrame};
use audioadapter_buffers::direct::InterleavedSlice;
use rubato::{
    Async, FixedAsync, Indexing, Resampler, SincInterpolationParameters, SincInterpolationType,
    WindowFunction, calculate_cutoff,
};

/// Owns the session on the device thread.
pub struct HostMixer {
    session: PlaybackSession,
    converter: Option<RateConverter>,
}

impl HostMixer {
    pub fn new(session: PlaybackSession, src_rate: u32, dst_rate: u32, chunk_frames: usize) -> Result<Self> {
        let converter = if src_rate == dst_rate || src_rate == 0 {
            None
        } else {
            tracing::info!(src_rate, dst_rate, chunk_frames, "resampling to device rate");
            Some(RateConverter::new(src_rate, dst_rate, chunk_frames)?)
        };
        Ok(Self { session, converter })
    }

    /// Fill `out` with frames at the device rate.
    pub fn render(&mut self, out: &mut [StereoFrame]) {
        match &mut self.converter {
            None => {
                self.session.mix(out);
            }
            Some(converter) => {
                let session = &mut self.session;
                converter.render(out, |chunk| {
                    session.mix(chunk);
                });
            }
        }
    }
}

pub struct RateConverter {
    resampler: Box<dyn Resampler<f32> + Send>,
    chunk: Vec<StereoFrame>,
    input: Vec<f32>,
    output: Vec<f32>,
    pending: VecDeque<f32>,
    indexing: Indexing,
}

impl RateConverter {
    pub fn new(src_rate: u32, dst_rate: u32, chunk_frames: usize) -> Result<Self> {
        let chunk_frames = chunk_frames.max(16);
        let sinc_len = 128;
        let window = WindowFunction::BlackmanHarris2;
        let params = SincInterpolationParameters {
            sinc_len,
            f_cutoff: calculate_cutoff(sinc_len, window),
            interpolation: SincInterpolationType::Cubic,
            oversampling_factor: 256,
            window,
        };
        let resampler = Async::<f32>::new_sinc(
            dst_rate as f64 / src_rate as f64,
            1.1,
            &params,
            chunk_frames,
            2,
            FixedAsync::Input,
        )
        .map_err(|e| anyhow!("resampler init error: {e}"))?;
        let out_frames = resampler.output_frames_max();

        Ok(Self {
            resampler: Box::new(resampler),
            chunk: vec![StereoFrame::SILENCE; chunk_frames],
            input: vec![0.0; chunk_frames * 2],
            output: vec![0.0; out_frames * 2],
            pending: VecDeque::with_capacity((out_frames * 2).max(16_384) * 2),
            indexing: Indexing {
                input_offset: 0,
                output_offset: 0,
                active_channels_mask: None,
                partial_len: None,
            },
        })
    }

    /// Fill `out`, calling `pull` for another input chunk whenever the FIFO runs short.
    pub fn render(&mut self, out: &mut [StereoFrame], mut pull: impl FnMut(&mut [StereoFrame])) {
        while self.pending.len() < out.len() * 2 {
            pull(&mut self.chunk);
            if !self.process_chunk() {
                break;
            }
        }

        for frame in out.iter_mut() {
            *frame = match (self.pending.pop_front(), self.pending.pop_front()) {
                (Some(left), Some(right)) => StereoFrame::new(left, right),
                _ => StereoFrame::SILENCE,
            };
        }
    }

    fn process_chunk(&mut self) -> bool {
        for (dst, frame) in self.input.chunks_exact_mut(2).zip(&self.chunk) {
            dst[0] = frame.left;
            dst[1] = frame.right;
        }
        let frames_in = self.chunk.len();
        let frames_out = self.output.len() / 2;

        let input = match InterleavedSlice::new(&self.input, 2, frames_in) {
            Ok(a) => a,
            Err(e) => {
                tracing::error!("interleaved slice (input) error: {e:#}");
                return false;
            }
        };
        let mut output = match InterleavedSlice::new_mut(&mut self.output, 2, frames_out) {
            Ok(a) => a,
            Err(e) => {
                tracing::error!("interleaved slice (output) error: {e:#}");
                return false;
            }
        };

        match self
            .resampler
            .process_into_buffer(&input, &mut output, Some(&self.indexing))
        {
            Ok((_, produced)) => {
                self.pending.extend(&self.output[..produced * 2]);
                true
            }
            Err(e) => {
                tracing::error!("resampler process error: {e:#}");
                false
            }
        }
    }
}
