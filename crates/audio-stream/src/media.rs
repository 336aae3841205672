//! Seam to the media decoding library.
//!
//! A [`MediaBackend`] turns a URI into a [`MediaReader`]: an opened container with a
//! selected audio stream, a decoder, and a converter to interleaved stereo `f32` at the
//! native sample rate. Everything except [`MediaReader::read_packet`] may block on I/O.

use symphonia::core::units::{Time, TimeBase};

use crate::error::{DecodeError, LoadError, SeekError};

/// Properties of the selected audio stream, fixed once the reader is open.
#[derive(Clone, Debug)]
pub struct StreamInfo {
    /// Native sample rate (Hz). Output keeps this rate.
    pub sample_rate: u32,
    /// Channel count before stereo conversion.
    pub source_channels: usize,
    /// Unit of packet timestamps and native seek targets.
    pub time_base: TimeBase,
    /// Declared duration in seconds.
    pub duration: Option<f64>,
    /// Codec label (best-effort).
    pub codec: Option<String>,
}

impl StreamInfo {
    /// Seconds for a native timestamp.
    pub fn seconds_at(&self, ts: u64) -> f64 {
        time_to_seconds(self.time_base.calc_time(ts))
    }

    /// Native timestamp for `seconds` (negative or non-finite map to 0).
    pub fn timestamp_at(&self, seconds: f64) -> u64 {
        if !seconds.is_finite() || seconds <= 0.0 {
            return 0;
        }
        self.time_base.calc_timestamp(Time::from(seconds))
    }
}

/// Flatten Symphonia's split `Time` into seconds.
pub fn time_to_seconds(time: Time) -> f64 {
    time.seconds as f64 + time.frac
}

/// Opens sources. Shared by every load and seek job of a source handle.
pub trait MediaBackend: Send + Sync {
    /// Open `uri`, detect its container, select the first audio stream and prepare decoding.
    fn open(&self, uri: &str) -> Result<Box<dyn MediaReader>, LoadError>;
}

/// Result of one [`MediaReader::read_packet`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PacketRead {
    /// A packet was decoded; timestamp of its first delivered frame, in native units.
    Decoded(u64),
    /// The bytes the next packet needs are still in flight. Nothing was consumed.
    Pending,
    /// End of stream.
    End,
}

/// One demux/decode cursor over a source.
pub trait MediaReader: Send {
    fn info(&self) -> &StreamInfo;

    /// Read and decode the next packet of the selected stream, appending interleaved stereo
    /// samples to `out`. Never waits on I/O: when the data is not resident yet it returns
    /// [`PacketRead::Pending`] without touching the demuxer.
    fn read_packet(&mut self, out: &mut Vec<f32>) -> Result<PacketRead, DecodeError>;

    /// Blocking seek to a native timestamp. Returns the timestamp actually reached.
    fn seek(&mut self, ts: u64) -> Result<u64, SeekError>;
}
