//! Playback session: the mix callback and its control surface.
//!
//! A [`PlaybackSession`] belongs to the mixing thread. Its [`PlaybackSession::mix`] never
//! blocks: blocking work (waiting for the load, opening a reader, seeking) happens on the
//! session's seek worker, and the callback only polls for the outcome and pads with
//! silence until a reader is back in its hands.
//!
//! [`SessionControl`] is the cloneable, thread-safe side used by the host to start, stop,
//! seek and observe a session.

use std::sync::Arc;

use audio_stream_types::{PlaybackEndReason, SessionStatus};

use crate::error::{DecodeError, SeekError, StreamError};
use crate::events::StreamEvent;
use crate::frame::{FrameBuffer, StereoFrame, fill_silence};
use crate::media::{MediaReader, PacketRead};
use crate::seek::{SeekJob, SeekLanding, SeekOutcome, run_seek_job};
use crate::source::{AudioSource, SourceCore};
use crate::status::SessionState;
use crate::worker::Worker;

/// One playback cursor over an [`AudioSource`].
pub struct PlaybackSession {
    worker: Worker<SeekJob, SeekOutcome>,
    control: SessionControl,
    frame: FrameBuffer,
    reader: Option<Box<dyn MediaReader>>,
    /// Set after a failed seek; cleared by the next successful one.
    stalled: bool,
    inflight_target: f64,
    _source: AudioSource,
}

/// Thread-safe handle to a session's shared state.
#[derive(Clone)]
pub struct SessionControl {
    state: Arc<SessionState>,
    core: Arc<SourceCore>,
}

impl SessionControl {
    pub fn id(&self) -> u64 {
        self.state.id
    }

    /// Activate and seek to `from` seconds.
    pub fn start(&self, from: f64) {
        tracing::debug!(session = self.state.id, from, "start");
        self.state.begin_playback(from);
    }

    /// Deactivate. An in-flight seek is not cancelled.
    pub fn stop(&self) {
        tracing::debug!(session = self.state.id, "stop");
        self.state.deactivate(PlaybackEndReason::Stopped);
    }

    /// Record a seek target in seconds. No-op while inactive; never blocks.
    pub fn seek(&self, to: f64) {
        if !self.state.is_active() {
            return;
        }
        self.state.request_seek(to);
    }

    pub fn is_playing(&self) -> bool {
        self.state.is_active()
    }

    /// Seconds at the timestamp of the last decoded packet (or the last seek landing).
    pub fn get_playback_position(&self) -> f64 {
        self.state.position()
    }

    /// `true` once the session has been without decodable audio for longer than the
    /// configured grace period.
    pub fn is_buffering(&self) -> bool {
        self.state.is_active() && self.state.is_buffering()
    }

    pub fn end_reason(&self) -> Option<PlaybackEndReason> {
        self.state.end_reason()
    }

    pub fn status(&self) -> SessionStatus {
        let info = self.core.info();
        SessionStatus {
            session_id: self.state.id,
            uri: self.core.uri().map(str::to_string),
            load_state: self.core.load_state(),
            playing: self.is_playing(),
            buffering: self.is_buffering(),
            position_secs: self.state.position(),
            duration_secs: info.and_then(|i| i.duration),
            sample_rate: info.map(|i| i.sample_rate),
            codec: info.and_then(|i| i.codec.clone()),
            played_frames: self.state.played_frames(),
            silent_frames: self.state.silent_frames(),
            underrun_events: self.state.underrun_events(),
            end_reason: self.state.end_reason(),
        }
    }
}

impl PlaybackSession {
    pub(crate) fn new(source: AudioSource, id: u64) -> Result<Self, StreamError> {
        let config = source.config().clone();
        let state = Arc::new(SessionState::new(id, config.buffering_grace));
        let core = source.core().clone();

        let job_core = core.clone();
        let job_state = state.clone();
        let worker = Worker::spawn(format!("audio-stream-seek-{id}"), move |job| {
            run_seek_job(&job_core, &job_state, job)
        })
        .map_err(StreamError::Spawn)?;

        Ok(Self {
            worker,
            control: SessionControl { state, core },
            frame: FrameBuffer::with_capacity(config.frame_capacity),
            reader: None,
            stalled: false,
            inflight_target: 0.0,
            _source: source,
        })
    }

    pub fn id(&self) -> u64 {
        self.control.id()
    }

    /// Cloneable control handle for other threads.
    pub fn control(&self) -> SessionControl {
        self.control.clone()
    }

    pub fn start(&self, from: f64) {
        self.control.start(from);
    }

    pub fn stop(&self) {
        self.control.stop();
    }

    pub fn seek(&self, to: f64) {
        self.control.seek(to);
    }

    pub fn is_playing(&self) -> bool {
        self.control.is_playing()
    }

    pub fn get_playback_position(&self) -> f64 {
        self.control.get_playback_position()
    }

    pub fn is_buffering(&self) -> bool {
        self.control.is_buffering()
    }

    pub fn status(&self) -> SessionStatus {
        self.control.status()
    }

    /// Rate of the frames produced by [`mix`](Self::mix); `0` until the source is ready.
    pub fn stream_sample_rate(&self) -> u32 {
        self.control.core.info().map(|i| i.sample_rate).unwrap_or(0)
    }

    /// Looping is not supported.
    pub fn get_loop_count(&self) -> u32 {
        0
    }

    pub fn frame_buffer(&self) -> &FrameBuffer {
        &self.frame
    }

    /// Fill `out` completely and return its length. Never blocks.
    pub fn mix(&mut self, out: &mut [StereoFrame]) -> usize {
        if out.is_empty() {
            return 0;
        }
        if !self.control.state.is_active() {
            return self.pad(out, false);
        }

        if self.worker.is_busy() {
            match self.worker.poll() {
                Some(outcome) => self.finish_seek(outcome),
                None if self.worker.is_busy() => return self.pad(out, true),
                None => self.worker_lost(),
            }
            if !self.control.state.is_active() {
                return self.pad(out, false);
            }
        }

        if let Some(target) = self.control.state.take_pending_seek() {
            self.frame.release();
            self.control.state.begin_buffering();
            self.dispatch_seek(target);
            return self.pad(out, true);
        }

        if self.stalled || self.reader.is_none() {
            return self.pad(out, true);
        }

        self.drain(out)
    }

    fn pad(&self, out: &mut [StereoFrame], underrun: bool) -> usize {
        fill_silence(out);
        self.control.state.note_silence(out.len(), underrun);
        out.len()
    }

    fn dispatch_seek(&mut self, target: f64) {
        self.inflight_target = target;
        let job = SeekJob {
            target,
            reader: self.reader.take(),
        };
        if let Err(job) = self.worker.submit(job) {
            self.reader = job.reader;
            self.worker_lost();
        }
    }

    fn finish_seek(&mut self, outcome: SeekOutcome) {
        self.reader = outcome.reader;
        match outcome.landing {
            SeekLanding::Positioned => self.stalled = false,
            SeekLanding::PastEnd => {
                self.stalled = false;
                // A newer target supersedes the past-end landing.
                if !self.control.state.has_pending_seek() {
                    self.end_of_stream();
                }
            }
            SeekLanding::Failed => self.stalled = true,
        }
    }

    /// Copy decoded frames out, decoding further packets inline as the buffer empties.
    /// When the next packet's data is still in flight the rest is padded and buffering
    /// is raised.
    fn drain(&mut self, out: &mut [StereoFrame]) -> usize {
        let mut written = 0;
        let mut starved = false;
        let mut ended: Option<Result<(), DecodeError>> = None;

        while written < out.len() {
            if let Some(frame) = self.frame.next_frame() {
                out[written] = frame;
                written += 1;
                continue;
            }
            self.frame.release();
            let Some(reader) = self.reader.as_mut() else {
                break;
            };
            match reader.read_packet(self.frame.refill_target()) {
                Ok(PacketRead::Decoded(ts)) => {
                    let seconds = reader.info().seconds_at(ts);
                    self.control.state.set_position(seconds);
                    self.control.state.clear_buffering();
                }
                Ok(PacketRead::Pending) => {
                    starved = true;
                    break;
                }
                Ok(PacketRead::End) => {
                    ended = Some(Ok(()));
                    break;
                }
                Err(e) => {
                    ended = Some(Err(e));
                    break;
                }
            }
        }

        self.control.state.note_played(written);
        let rest = &mut out[written..];
        fill_silence(rest);
        self.control.state.note_silence(rest.len(), starved);
        if starved {
            self.control.state.begin_buffering();
        }

        match ended {
            Some(Ok(())) => self.end_of_stream(),
            Some(Err(e)) => self.decode_failed(e),
            None => {}
        }
        out.len()
    }

    fn end_of_stream(&mut self) {
        self.frame.release();
        let id = self.control.state.id;
        self.control.state.deactivate(PlaybackEndReason::Eof);
        tracing::info!(session = id, "end of stream");
        self.control
            .core
            .notifier()
            .notify(StreamEvent::EndOfStream { session: id });
    }

    fn decode_failed(&mut self, error: DecodeError) {
        self.frame.release();
        let id = self.control.state.id;
        self.control.state.deactivate(PlaybackEndReason::Error);
        tracing::error!(session = id, "decode failed: {error}");
        self.control
            .core
            .notifier()
            .notify(StreamEvent::DecodeFailed { session: id, error });
    }

    fn worker_lost(&mut self) {
        self.stalled = true;
        let id = self.control.state.id;
        self.control.state.deactivate(PlaybackEndReason::Error);
        tracing::error!(session = id, worker = self.worker.name(), "seek worker stopped");
        self.control.core.notifier().notify(StreamEvent::SeekFailed {
            session: id,
            target: self.inflight_target,
            error: SeekError::WorkerLost,
        });
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        self.worker.shutdown();
        self.frame.release();
    }
}
