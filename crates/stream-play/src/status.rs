//! Status reporting for the CLI.

use anyhow::Result;
use audio_stream_types::SessionStatus;

/// Print one status snapshot: a JSON line on stdout, or a log line.
pub fn report(status: &SessionStatus, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(status)?);
        return Ok(());
    }
    tracing::info!(
        session = status.session_id,
        position = %format_clock(status.position_secs),
        duration = %status.duration_secs.map(format_clock).unwrap_or_else(|| "--:--".into()),
        playing = status.playing,
        buffering = status.buffering,
        played_frames = status.played_frames,
        underruns = status.underrun_events,
        "status"
    );
    Ok(())
}

/// `m:ss` (or `h:mm:ss` past an hour).
pub fn format_clock(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds as u64
    } else {
        0
    };
    let (h, m, s) = (total / 3600, (total / 60) % 60, total % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m}:{s:02}")
    }
}
