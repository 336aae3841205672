use serde::{Deserialize, Serialize};

/// Load progress of a source handle.
///
/// `Ready` and `Failed` are terminal for the load; sessions may still be created
/// and destroyed afterwards.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LoadState {
    /// `create` has not been called yet.
    #[default]
    Unloaded,
    /// The load job is opening the source.
    Loading,
    /// Decode contexts exist and duration/sample rate are known.
    Ready,
    /// The load job gave up; no decode contexts exist.
    Failed,
}

impl LoadState {
    /// `true` once the load job has finished, successfully or not.
    pub fn is_terminal(self) -> bool {
        matches!(self, LoadState::Ready | LoadState::Failed)
    }
}

/// Reason why a playback session went inactive.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackEndReason {
    /// Natural end of stream, or a seek landing past the end.
    Eof,
    /// A decode failure (or a lost worker) terminated the session.
    Error,
    /// Playback was explicitly stopped.
    Stopped,
}

/// Point-in-time view of one playback session.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct SessionStatus {
    /// Process-unique session id.
    pub session_id: u64,
    /// Source URI, once the handle was created.
    pub uri: Option<String>,
    /// Load state of the shared source handle.
    pub load_state: LoadState,
    /// `true` while the session is active.
    pub playing: bool,
    /// `true` when buffering has persisted past the grace period.
    pub buffering: bool,
    /// Timestamp of the last decoded packet, in seconds.
    pub position_secs: f64,
    /// Declared source duration in seconds.
    pub duration_secs: Option<f64>,
    /// Native source sample rate (Hz).
    pub sample_rate: Option<u32>,
    /// Source codec label (for example `FLAC`, `MP3`).
    pub codec: Option<String>,
    /// Frames emitted from decoded audio.
    pub played_frames: u64,
    /// Frames emitted as silence.
    pub silent_frames: u64,
    /// Mix calls that had to pad with silence while active.
    pub underrun_events: u64,
    /// Why the session went inactive, if it did.
    pub end_reason: Option<PlaybackEndReason>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_state_terminal_states() {
        assert!(!LoadState::Unloaded.is_terminal());
        assert!(!LoadState::Loading.is_terminal());
        assert!(LoadState::Ready.is_terminal());
        assert!(LoadState::Failed.is_terminal());
    }

    #[test]
    fn status_serializes_snake_case_enums() {
        let status = SessionStatus {
            session_id: 7,
            load_state: LoadState::Ready,
            end_reason: Some(PlaybackEndReason::Eof),
            ..Default::default()
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["load_state"], "ready");
        assert_eq!(json["end_reason"], "eof");
        assert_eq!(json["session_id"], 7);
    }
}
