use std::time::Duration;

use audio_stream::{DecoderConfig, StreamConfig};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "stream-play", version)]
pub struct Args {
    /// Local path, file:// URI or http(s) URL
    #[arg(required_unless_present = "list_devices")]
    pub uri: Option<String>,

    /// List output devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Use a specific output device by substring match
    #[arg(long)]
    pub device: Option<String>,

    /// Start position in seconds
    #[arg(long, default_value_t = 0.0)]
    pub start: f64,

    /// Seek to this position (seconds) once `--seek-after-ms` has elapsed
    #[arg(long)]
    pub seek: Option<f64>,

    #[arg(long, default_value_t = 2000)]
    pub seek_after_ms: u64,

    /// Resampler input chunk size in frames (only used when the device rate differs)
    #[arg(long, default_value_t = 1024)]
    pub chunk_frames: usize,

    /// How long buffering must last before it is reported
    #[arg(long, default_value_t = 10)]
    pub buffering_grace_ms: u64,

    /// Status print interval
    #[arg(long, default_value_t = 1000)]
    pub status_interval_ms: u64,

    /// Print status snapshots as JSON lines on stdout
    #[arg(long)]
    pub json_status: bool,

    /// Seek to the nearest packet instead of the exact sample
    #[arg(long)]
    pub coarse_seek: bool,

    /// Per-request timeout for network sources
    #[arg(long, default_value_t = 10)]
    pub http_timeout_secs: u64,

    /// How far ahead of playback network data is fetched
    #[arg(long, default_value_t = 256)]
    pub http_read_ahead_kib: usize,

    /// Give up if the source is not loaded within this time
    #[arg(long, default_value_t = 30)]
    pub load_timeout_secs: u64,
}

impl Args {
    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            buffering_grace: Duration::from_millis(self.buffering_grace_ms),
            ..StreamConfig::default()
        }
    }

    pub fn decoder_config(&self) -> DecoderConfig {
        DecoderConfig {
            accurate_seek: !self.coarse_seek,
            http_timeout: Duration::from_secs(self.http_timeout_secs.max(1)),
            http_read_ahead: self.http_read_ahead_kib.max(16) * 1024,
            ..DecoderConfig::default()
        }
    }
}
