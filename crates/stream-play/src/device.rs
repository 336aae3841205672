//! Output device discovery and selection.

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait};

/// First output device whose name contains `needle` (case-insensitive), or the host
/// default when `needle` is `None`.
pub fn pick_device(host: &cpal::Host, needle: Option<&str>) -> Result<cpal::Device> {
    let Some(needle) = needle else {
        return host
            .default_output_device()
            .ok_or_else(|| anyhow!("No default output device"));
    };

    host.output_devices()
        .context("No output devices")?
        .find(|d| {
            d.description()
                .map(|desc| matches_device_name(&desc.name(), needle))
                .unwrap_or(false)
        })
        .ok_or_else(|| anyhow!("No output device matched: {needle}"))
}

/// Output config closest to the stream's native rate.
///
/// Prefers the highest supported rate at or below `source_rate` (ideally equal, so no
/// resampling is needed), then the lowest rate above it; ties go to the better sample format.
pub fn pick_output_config(
    device: &cpal::Device,
    source_rate: u32,
) -> Result<cpal::SupportedStreamConfig> {
    let mut best: Option<(Candidate, cpal::SupportedStreamConfig)> = None;

    for range in device.supported_output_configs()? {
        let rate = clamp_rate(range.min_sample_rate(), range.max_sample_rate(), source_rate);
        let candidate = Candidate {
            below: rate <= source_rate,
            rate,
            format_rank: sample_format_rank(range.sample_format()),
        };
        let replace = best
            .as_ref()
            .map(|(b, _)| candidate.beats(b, source_rate))
            .unwrap_or(true);
        if replace {
            best = Some((candidate, range.with_sample_rate(rate)));
        }
    }

    best.map(|(_, cfg)| cfg)
        .ok_or_else(|| anyhow!("No supported output configs"))
}

/// Largest fixed buffer the device allows, capped to keep latency bounded.
pub fn pick_buffer_size(config: &cpal::SupportedStreamConfig) -> Option<cpal::BufferSize> {
    const MAX_FRAMES: u32 = 4_096;
    match config.buffer_size() {
        cpal::SupportedBufferSize::Range { min, max } => {
            Some(cpal::BufferSize::Fixed((*max).min(MAX_FRAMES).max(*min)))
        }
        cpal::SupportedBufferSize::Unknown => None,
    }
}

/// Print output devices and their rate ranges to stdout.
pub fn list_devices(host: &cpal::Host) -> Result<()> {
    let devices = host.output_devices().context("No output devices")?;
    for (i, d) in devices.enumerate() {
        let name = d.description()?.to_string();
        let rates = d
            .supported_output_configs()
            .map(|ranges| {
                ranges.fold((u32::MAX, 0u32), |(lo, hi), r| {
                    (lo.min(r.min_sample_rate()), hi.max(r.max_sample_rate()))
                })
            })
            .ok()
            .filter(|(lo, hi)| lo <= hi);
        match rates {
            Some((lo, hi)) => println!("#{i}: {name} ({lo}-{hi} Hz)"),
            None => println!("#{i}: {name}"),
        }
    }
    Ok(())
}

#[derive(Clone, Copy, Debug)]
struct Candidate {
    below: bool,
    rate: u32,
    format_rank: u8,
}

impl Candidate {
    fn beats(&self, other: &Candidate, source_rate: u32) -> bool {
        if self.below != other.below {
            return self.below;
        }
        if self.rate != other.rate {
            // Below the source: closer from underneath. Above: closer from above.
            return if self.below {
                self.rate > other.rate
            } else {
                self.rate.abs_diff(source_rate) < other.rate.abs_diff(source_rate)
            };
        }
        self.format_rank < other.format_rank
    }
}

fn clamp_rate(min: u32, max: u32, target: u32) -> u32 {
    target.clamp(min, max.max(min))
}

fn sample_format_rank(format: cpal::SampleFormat) -> u8 {
    match format {
        cpal::SampleFormat::F32 => 0,
        cpal::SampleFormat::I32 => 1,
        cpal::SampleFormat::I16 => 2,
        cpal::SampleFormat::U16 => 3,
        _ => 10,
    }
}

fn matches_device_name(name: &str, needle: &str) -> bool {
    let needle = needle.trim();
    !needle.is_empty() && name.to_lowercase().contains(&needle.to_lowercase())
}
