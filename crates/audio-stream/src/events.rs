//! Fire-and-forget notifications for the host.
//!
//! Events are never acknowledged and never apply backpressure: a host that does not listen,
//! or stops listening, costs nothing but a dropped message.

use crossbeam_channel::{Receiver, Sender};

use crate::error::{DecodeError, LoadError, SeekError};

/// Notifications emitted by load jobs, seek jobs and the mix callback.
#[derive(Debug)]
pub enum StreamEvent {
    /// The load job finished and the source is ready for playback.
    Loaded { uri: String, duration: f64 },
    /// The load job gave up; the source stays `Failed`.
    LoadFailed { uri: String, error: LoadError },
    /// A seek job failed; the session keeps emitting silence.
    SeekFailed {
        session: u64,
        target: f64,
        error: SeekError,
    },
    /// A decode failure ended a session.
    DecodeFailed { session: u64, error: DecodeError },
    /// A session reached the end of the stream.
    EndOfStream { session: u64 },
}

/// Cloneable sending side of the host notification channel. `Default` drops every event.
#[derive(Clone, Debug, Default)]
pub struct Notifier {
    tx: Option<Sender<StreamEvent>>,
}

impl Notifier {
    /// A notifier plus the receiver the host should drain.
    pub fn channel() -> (Self, Receiver<StreamEvent>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self { tx: Some(tx) }, rx)
    }

    /// Emit `event` without waiting on the receiver.
    pub fn notify(&self, event: StreamEvent) {
        if let Some(tx) = &self.tx {
            if tx.try_send(event).is_err() {
                tracing::trace!("notification dropped; no receiver");
            }
        }
    }
}
