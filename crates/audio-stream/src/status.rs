//! Lock-free state shared by a session, its seek job and its controllers.
//!
//! The mix callback only ever loads and stores these atomics; no lock is taken on the
//! mixing thread.

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use audio_stream_types::PlaybackEndReason;

/// Bit pattern meaning "no seek pending". Stored targets are always finite and
/// non-negative, so this NaN pattern never collides with one.
const NO_SEEK: u64 = u64::MAX;

const END_NONE: u8 = 0;
const END_EOF: u8 = 1;
const END_ERROR: u8 = 2;
const END_STOPPED: u8 = 3;

pub(crate) struct SessionState {
    pub(crate) id: u64,
    active: AtomicBool,
    pending_seek: AtomicU64,
    position: AtomicU64,
    buffering: AtomicBool,
    buffering_since_ms: AtomicU64,
    end_reason: AtomicU8,
    played_frames: AtomicU64,
    silent_frames: AtomicU64,
    underrun_events: AtomicU64,
    epoch: Instant,
    grace: Duration,
}

impl SessionState {
    pub(crate) fn new(id: u64, grace: Duration) -> Self {
        Self {
            id,
            active: AtomicBool::new(false),
            pending_seek: AtomicU64::new(NO_SEEK),
            position: AtomicU64::new(0f64.to_bits()),
            buffering: AtomicBool::new(false),
            buffering_since_ms: AtomicU64::new(0),
            end_reason: AtomicU8::new(END_NONE),
            played_frames: AtomicU64::new(0),
            silent_frames: AtomicU64::new(0),
            underrun_events: AtomicU64::new(0),
            epoch: Instant::now(),
            grace,
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub(crate) fn activate(&self) {
        self.end_reason.store(END_NONE, Ordering::Relaxed);
        self.active.store(true, Ordering::Release);
    }

    /// Record the starting target, then go active. Anyone who sees the session active
    /// also sees the target.
    pub(crate) fn begin_playback(&self, from: f64) {
        self.request_seek(from);
        self.activate();
    }

    /// Go inactive. The first reason recorded since the last `activate` sticks.
    pub(crate) fn deactivate(&self, reason: PlaybackEndReason) {
        let code = match reason {
            PlaybackEndReason::Eof => END_EOF,
            PlaybackEndReason::Error => END_ERROR,
            PlaybackEndReason::Stopped => END_STOPPED,
        };
        let _ = self.end_reason.compare_exchange(
            END_NONE,
            code,
            Ordering::Relaxed,
            Ordering::Relaxed,
        );
        self.active.store(false, Ordering::Release);
    }

    pub(crate) fn end_reason(&self) -> Option<PlaybackEndReason> {
        match self.end_reason.load(Ordering::Relaxed) {
            END_EOF => Some(PlaybackEndReason::Eof),
            END_ERROR => Some(PlaybackEndReason::Error),
            END_STOPPED => Some(PlaybackEndReason::Stopped),
            _ => None,
        }
    }

    /// Record a seek target, replacing any target not yet dispatched.
    pub(crate) fn request_seek(&self, seconds: f64) {
        let target = if seconds.is_finite() && seconds > 0.0 {
            seconds
        } else {
            0.0
        };
        self.pending_seek.store(target.to_bits(), Ordering::Release);
    }

    /// Take the pending seek target, if any.
    pub(crate) fn take_pending_seek(&self) -> Option<f64> {
        match self.pending_seek.swap(NO_SEEK, Ordering::AcqRel) {
            NO_SEEK => None,
            bits => Some(f64::from_bits(bits)),
        }
    }

    pub(crate) fn has_pending_seek(&self) -> bool {
        self.pending_seek.load(Ordering::Acquire) != NO_SEEK
    }

    pub(crate) fn position(&self) -> f64 {
        f64::from_bits(self.position.load(Ordering::Relaxed))
    }

    pub(crate) fn set_position(&self, seconds: f64) {
        self.position.store(seconds.to_bits(), Ordering::Relaxed);
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    /// Raise the buffering flag, stamping the start time unless already buffering.
    pub(crate) fn begin_buffering(&self) {
        if !self.buffering.load(Ordering::Acquire) {
            self.buffering_since_ms.store(self.now_ms(), Ordering::Relaxed);
            self.buffering.store(true, Ordering::Release);
        }
    }

    pub(crate) fn clear_buffering(&self) {
        self.buffering.store(false, Ordering::Release);
    }

    /// Raw flag, without the grace period.
    #[cfg(test)]
    pub(crate) fn buffering_raw(&self) -> bool {
        self.buffering.load(Ordering::Acquire)
    }

    /// Buffering as reported to observers: only once it outlasted the grace period.
    pub(crate) fn is_buffering(&self) -> bool {
        if !self.buffering.load(Ordering::Acquire) {
            return false;
        }
        let since = self.buffering_since_ms.load(Ordering::Relaxed);
        self.now_ms().saturating_sub(since) > self.grace.as_millis() as u64
    }

    pub(crate) fn note_played(&self, frames: usize) {
        if frames > 0 {
            self.played_frames.fetch_add(frames as u64, Ordering::Relaxed);
        }
    }

    /// Count `frames` of silence; `underrun` marks a silent pad while active.
    pub(crate) fn note_silence(&self, frames: usize, underrun: bool) {
        if frames == 0 {
            return;
        }
        self.silent_frames.fetch_add(frames as u64, Ordering::Relaxed);
        if underrun {
            self.underrun_events.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn played_frames(&self) -> u64 {
        self.played_frames.load(Ordering::Relaxed)
    }

    pub(crate) fn silent_frames(&self) -> u64 {
        self.silent_frames.load(Ordering::Relaxed)
    }

    pub(crate) fn underrun_events(&self) -> u64 {
        self.underrun_events.load(Ordering::Relaxed)
    }
}
