//! On-demand decoding of a compressed audio source for a real-time mixer.
//!
//! ## Layout
//! - [`source::AudioSource`]: shared handle for one URI, loaded once by a background load job.
//! - [`session::PlaybackSession`]: per-playback cursor driven by the mixer through
//!   [`session::PlaybackSession::mix`]; never blocks, degrades to silence.
//! - `seek`: the seek job that runs on the session worker and performs blocking seeks.
//! - [`worker::Worker`]: one long-lived thread per owner, at most one job in flight.
//! - [`media`]: the decoding seam, with the Symphonia backend in [`decode`].

pub mod config;
pub mod convert;
pub mod decode;
pub mod error;
pub mod events;
pub mod frame;
pub mod http;
pub mod media;
mod seek;
pub mod session;
pub mod source;
mod status;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use audio_stream_types::{LoadState, PlaybackEndReason, SessionStatus};
pub use config::{DecoderConfig, StreamConfig};
pub use decode::SymphoniaBackend;
pub use error::{DecodeError, LoadError, SeekError, StreamError};
pub use events::{Notifier, StreamEvent};
pub use frame::{FrameBuffer, StereoFrame};
pub use media::{MediaBackend, MediaReader, PacketRead, StreamInfo};
pub use session::{PlaybackSession, SessionControl};
pub use source::AudioSource;
