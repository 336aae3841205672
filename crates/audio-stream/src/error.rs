//! Error types for the streaming core.
//!
//! Only [`StreamError`] is returned synchronously to callers. The others are produced on
//! worker threads (or inline in the mix callback), logged, forwarded as
//! [`crate::events::StreamEvent`]s, and turned into observable state.

use std::io;

use audio_stream_types::LoadState;
use symphonia::core::errors::Error as SymphoniaError;
use thiserror::Error;

/// Rejections at the call boundary. No worker is started when one is returned.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("source uri is empty")]
    EmptyUri,
    #[error("source already created for {0}")]
    AlreadyCreated(String),
    #[error("no source has been created")]
    NoSource,
    #[error("failed to start worker thread: {0}")]
    Spawn(#[source] io::Error),
}

/// Failure to open, recognize or configure a source. Aborts the load job.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to open {uri}: {source}")]
    Open {
        uri: String,
        #[source]
        source: io::Error,
    },
    #[error("unrecognized container format: {0}")]
    Format(#[source] SymphoniaError),
    #[error("no audio stream found")]
    NoAudioStream,
    #[error("stream does not declare a sample rate")]
    UnknownSampleRate,
    #[error("failed to open decoder: {0}")]
    Decoder(#[source] SymphoniaError),
}

/// Mid-stream failure. Terminates only the session that hit it.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to read packet: {0}")]
    Read(#[source] SymphoniaError),
    #[error("failed to decode packet: {0}")]
    Decode(#[source] SymphoniaError),
}

/// Seek failure. The session stays silent/buffering; a later seek may succeed.
#[derive(Debug, Error)]
pub enum SeekError {
    #[error("source is not ready ({0:?})")]
    SourceUnavailable(LoadState),
    #[error("failed to open a reader: {0}")]
    Reopen(#[source] LoadError),
    #[error("native seek failed: {0}")]
    Native(#[source] SymphoniaError),
    #[error("seek worker stopped")]
    WorkerLost,
}
