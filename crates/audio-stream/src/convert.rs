//! Conversion of decoded buffers to interleaved stereo `f32`.
//!
//! Plays the role of the resampler configured by the load job: sample format and channel
//! layout change, the sample rate does not. Rate conversion to the device belongs to the host.

use symphonia::core::audio::{AudioBufferRef, SampleBuffer, SignalSpec};

/// Reusable converter; the intermediate [`SampleBuffer`] is only reallocated when a packet is
/// larger than any seen before or the signal spec changes.
#[derive(Default)]
pub struct StereoConverter {
    scratch: Option<SampleBuffer<f32>>,
    spec: Option<SignalSpec>,
}

impl StereoConverter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `decoded` to `out` as interleaved stereo.
    pub fn convert(&mut self, decoded: AudioBufferRef<'_>, out: &mut Vec<f32>) {
        let spec = *decoded.spec();
        let capacity = decoded.capacity();
        let reuse = match (&self.scratch, &self.spec) {
            (Some(buf), Some(prev)) => *prev == spec && buf.capacity() >= capacity * spec.channels.count(),
            _ => false,
        };
        if !reuse {
            self.scratch = Some(SampleBuffer::<f32>::new(capacity as u64, spec));
            self.spec = Some(spec);
        }
        let Some(scratch) = self.scratch.as_mut() else {
            return;
        };
        scratch.copy_interleaved_ref(decoded);
        map_to_stereo(scratch.samples(), spec.channels.count(), out);
    }
}

/// Append interleaved `src` with `channels` channels to `out` as stereo.
///
/// - mono: duplicate channel 0
/// - stereo: pass-through
/// - wider layouts: keep the first two channels
pub fn map_to_stereo(src: &[f32], channels: usize, out: &mut Vec<f32>) {
    match channels {
        0 => {}
        1 => {
            out.reserve(src.len() * 2);
            for &s in src {
                out.push(s);
                out.push(s);
            }
        }
        2 => out.extend_from_slice(&src[..src.len() - src.len() % 2]),
        n => {
            out.reserve(src.len() / n * 2);
            for frame in src.chunks_exact(n) {
                out.push(frame[0]);
                out.push(frame[1]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use symphonia::core::audio::{AsAudioBufferRef, AudioBuffer, Channels, Signal};

    #[test]
    fn mono_is_duplicated() {
        let mut out = Vec::new();
        map_to_stereo(&[0.1, 0.2], 1, &mut out);
        assert_eq!(out, vec![0.1, 0.1, 0.2, 0.2]);
    }

    #[test]
    fn stereo_passes_through() {
        let mut out = vec![9.0];
        map_to_stereo(&[0.1, 0.2, 0.3, 0.4], 2, &mut out);
        assert_eq!(out, vec![9.0, 0.1, 0.2, 0.3, 0.4]);
    }

    #[test]
    fn wide_layouts_keep_front_pair() {
        let mut out = Vec::new();
        map_to_stereo(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0, 12.0], 6, &mut out);
        assert_eq!(out, vec![1.0, 2.0, 7.0, 8.0]);
    }

    #[test]
    fn zero_channels_produce_nothing() {
        let mut out = Vec::new();
        map_to_stereo(&[1.0, 2.0], 0, &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn converter_interleaves_planar_buffers() {
        let spec = SignalSpec::new(48_000, Channels::FRONT_LEFT | Channels::FRONT_RIGHT);
        let mut planar = AudioBuffer::<f32>::new(4, spec);
        planar.render_reserved(Some(3));
        for (i, s) in planar.chan_mut(0).iter_mut().enumerate() {
            *s = i as f32;
        }
        for (i, s) in planar.chan_mut(1).iter_mut().enumerate() {
            *s = -(i as f32);
        }

        let mut converter = StereoConverter::new();
        let mut out = Vec::new();
        converter.convert(planar.as_audio_buffer_ref(), &mut out);
        assert_eq!(out, vec![0.0, -0.0, 1.0, -1.0, 2.0, -2.0]);
    }
}
