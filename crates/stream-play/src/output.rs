//! CPAL output stream driving the host mixer from the device callback.

use anyhow::{Result, anyhow};
use audio_stream::StereoFrame;
use cpal::traits::DeviceTrait;

use crate::mixer::HostMixer;

/// Frames the callback can render without growing its scratch buffer.
const SCRATCH_FRAMES: usize = 16_384;

/// Build an output stream in the device's sample format. The mixer moves into the callback.
pub fn build_output_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    mixer: HostMixer,
) -> Result<cpal::Stream> {
    match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(device, config, mixer),
        cpal::SampleFormat::I16 => build_stream::<i16>(device, config, mixer),
        cpal::SampleFormat::I32 => build_stream::<i32>(device, config, mixer),
        cpal::SampleFormat::U16 => build_stream::<u16>(device, config, mixer),
        other => Err(anyhow!("Unsupported sample format: {other:?}")),
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut mixer: HostMixer,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels = (config.channels as usize).max(1);
    let mut frames = vec![StereoFrame::SILENCE; SCRATCH_FRAMES];

    let err_fn = |err| tracing::warn!("stream error: {err}");

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _| {
            let n = data.len() / channels;
            if frames.len() < n {
                frames.resize(n, StereoFrame::SILENCE);
            }
            let block = &mut frames[..n];
            mixer.render(block);
            write_frames(block, data, channels);
        },
        err_fn,
        None,
    )?;
    Ok(stream)
}

/// Write stereo frames into an interleaved device buffer with `channels` channels.
///
/// - mono: average of left and right
/// - stereo: pass-through
/// - wider: left/right on the first two channels, silence elsewhere
fn write_frames<T>(frames: &[StereoFrame], data: &mut [T], channels: usize)
where
    T: cpal::Sample + cpal::FromSample<f32>,
{
    let silence = <T as cpal::Sample>::from_sample::<f32>(0.0);
    for (frame, out) in frames.iter().zip(data.chunks_exact_mut(channels)) {
        match out {
            [mono] => *mono = T::from_sample(0.5 * (frame.left + frame.right)),
            [l, r, rest @ ..] => {
                *l = T::from_sample(frame.left);
                *r = T::from_sample(frame.right);
                rest.fill(silence);
            }
            [] => {}
        }
    }
    let written = frames.len() * channels;
    if data.len() > written {
        data[written..].fill(silence);
    }
}
