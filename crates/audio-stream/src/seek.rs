//! Seek job: position a session's reader off the mixing thread.
//!
//! The mix callback hands the session's reader (if it has one) to the job and gets it back
//! in the outcome. While the job runs, the callback only polls for the outcome and pads
//! with silence, so the demux cursor is never touched from two threads.

use std::sync::Arc;
use std::time::Instant;

use audio_stream_types::LoadState;

use crate::error::SeekError;
use crate::events::StreamEvent;
use crate::media::MediaReader;
use crate::source::SourceCore;
use crate::status::SessionState;

pub(crate) struct SeekJob {
    /// Target in seconds, already clamped to be finite and non-negative.
    pub(crate) target: f64,
    pub(crate) reader: Option<Box<dyn MediaReader>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SeekLanding {
    /// The reader is positioned at (or just before) the target.
    Positioned,
    /// The target is at or beyond the declared duration.
    PastEnd,
    Failed,
}

pub(crate) struct SeekOutcome {
    pub(crate) reader: Option<Box<dyn MediaReader>>,
    pub(crate) landing: SeekLanding,
}

/// Body of a session's seek worker.
///
/// Waits for the source to finish loading, obtains a reader (the session's own, the one
/// the load job left behind, or a freshly opened one), then seeks it. Buffering is raised
/// for the whole job and only cleared when the reader is usable again.
pub(crate) fn run_seek_job(core: &Arc<SourceCore>, state: &SessionState, job: SeekJob) -> SeekOutcome {
    let SeekJob { target, reader } = job;
    state.begin_buffering();

    let load = core.wait_for_load();
    if load != LoadState::Ready {
        return failed(core, state, target, reader, SeekError::SourceUnavailable(load));
    }

    let started = Instant::now();
    let mut reader = match reader.or_else(|| core.claim_reader()) {
        Some(reader) => reader,
        None => match core.open_reader() {
            Ok(reader) => {
                tracing::debug!(session = state.id, "opened dedicated reader");
                reader
            }
            Err(e) => return failed(core, state, target, None, SeekError::Reopen(e)),
        },
    };

    let info = reader.info();
    if info.duration.is_some_and(|duration| target >= duration) {
        tracing::debug!(session = state.id, target, "seek target past end of stream");
        state.clear_buffering();
        return SeekOutcome {
            reader: Some(reader),
            landing: SeekLanding::PastEnd,
        };
    }

    let ts = info.timestamp_at(target);
    match reader.seek(ts) {
        Ok(actual) => {
            let landed = reader.info().seconds_at(actual);
            state.set_position(landed);
            state.clear_buffering();
            tracing::debug!(
                session = state.id,
                target,
                landed,
                took_ms = started.elapsed().as_millis() as u64,
                "seek complete"
            );
            SeekOutcome {
                reader: Some(reader),
                landing: SeekLanding::Positioned,
            }
        }
        Err(e) => failed(core, state, target, Some(reader), e),
    }
}

fn failed(
    core: &SourceCore,
    state: &SessionState,
    target: f64,
    reader: Option<Box<dyn MediaReader>>,
    error: SeekError,
) -> SeekOutcome {
    tracing::warn!(session = state.id, target, "seek failed: {error}");
    core.notifier().notify(StreamEvent::SeekFailed {
        session: state.id,
        target,
        error,
    });
    SeekOutcome {
        reader,
        landing: SeekLanding::Failed,
    }
}
