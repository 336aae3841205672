use std::time::Duration;

/// Tuning for sources and their playback sessions.
#[derive(Clone, Debug)]
pub struct StreamConfig {
    /// How long buffering must persist before `is_buffering` reports it.
    ///
    /// Normal micro-stalls (a seek answered within a callback or two) stay invisible.
    pub buffering_grace: Duration,
    /// Initial frame buffer capacity in frames, so typical packets never grow it
    /// from the mix callback.
    pub frame_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            buffering_grace: Duration::from_millis(10),
            frame_capacity: 4096,
        }
    }
}

/// Options for the Symphonia backend.
#[derive(Clone, Debug)]
pub struct DecoderConfig {
    /// Sample-accurate seeks (slower on some containers) instead of nearest-packet seeks.
    pub accurate_seek: bool,
    /// Bytes per HTTP range request for network sources.
    pub http_block_size: usize,
    /// Bytes past the read position that must be resident before the mix thread decodes
    /// the next packet of a network source. Must exceed the largest packet.
    pub http_read_ahead: usize,
    /// Per-request timeout for network sources.
    pub http_timeout: Duration,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            accurate_seek: true,
            http_block_size: 128 * 1024,
            http_read_ahead: 256 * 1024,
            http_timeout: Duration::from_secs(10),
        }
    }
}
