//! Source handle and load job.
//!
//! An [`AudioSource`] names one URI. [`AudioSource::create`] starts exactly one load job on
//! a dedicated worker; the job opens and inspects the source through the [`MediaBackend`] and
//! either publishes the stream info (`Ready`) or gives up (`Failed`). Accessors never look
//! at contexts that might still be under construction: until `Ready` they return
//! placeholders.
//!
//! The reader built by the load job is handed to the first session that seeks; every other
//! session opens its own reader over the same URI from its seek job, so no two sessions
//! ever advance the same demux cursor.

use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::{Duration, Instant};

use audio_stream_types::LoadState;

use crate::config::StreamConfig;
use crate::error::{LoadError, StreamError};
use crate::events::{Notifier, StreamEvent};
use crate::media::{MediaBackend, MediaReader, StreamInfo};
use crate::session::PlaybackSession;
use crate::worker::Worker;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Shared handle to one source. Clones refer to the same source.
#[derive(Clone)]
pub struct AudioSource {
    inner: Arc<SourceInner>,
}

struct SourceInner {
    // Declared first so the load job is joined before anything else is released.
    loader: Mutex<Option<Worker<String, ()>>>,
    core: Arc<SourceCore>,
    config: StreamConfig,
}

/// The part of a source that load and seek jobs need.
pub(crate) struct SourceCore {
    uri: OnceLock<String>,
    backend: Arc<dyn MediaBackend>,
    notifier: Notifier,
    state: AtomicU8,
    info: OnceLock<StreamInfo>,
    slot: Mutex<LoadSlot>,
    loaded: Condvar,
}

#[derive(Default)]
struct LoadSlot {
    reader: Option<Box<dyn MediaReader>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn encode_state(state: LoadState) -> u8 {
    match state {
        LoadState::Unloaded => 0,
        LoadState::Loading => 1,
        LoadState::Ready => 2,
        LoadState::Failed => 3,
    }
}

fn decode_state(raw: u8) -> LoadState {
    match raw {
        1 => LoadState::Loading,
        2 => LoadState::Ready,
        3 => LoadState::Failed,
        _ => LoadState::Unloaded,
    }
}

impl SourceCore {
    pub(crate) fn uri(&self) -> Option<&str> {
        self.uri.get().map(String::as_str)
    }

    pub(crate) fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub(crate) fn load_state(&self) -> LoadState {
        decode_state(self.state.load(Ordering::Acquire))
    }

    /// Stream info, only once `Ready`.
    pub(crate) fn info(&self) -> Option<&StreamInfo> {
        if self.load_state() == LoadState::Ready {
            self.info.get()
        } else {
            None
        }
    }

    /// Block until the load job has finished. Worker threads only.
    pub(crate) fn wait_for_load(&self) -> LoadState {
        let mut slot = lock(&self.slot);
        while !self.load_state().is_terminal() {
            slot = self
                .loaded
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }
        self.load_state()
    }

    /// Take the reader built by the load job, if no session has claimed it yet.
    pub(crate) fn claim_reader(&self) -> Option<Box<dyn MediaReader>> {
        lock(&self.slot).reader.take()
    }

    /// Open a fresh reader over the same URI. Blocks on I/O.
    pub(crate) fn open_reader(&self) -> Result<Box<dyn MediaReader>, LoadError> {
        let uri = self.uri().unwrap_or_default();
        self.backend.open(uri)
    }

    fn finish(&self, state: LoadState, reader: Option<Box<dyn MediaReader>>) {
        {
            let mut slot = lock(&self.slot);
            slot.reader = reader;
            // Stored under the slot lock so waiters cannot miss the wakeup.
            self.state.store(encode_state(state), Ordering::Release);
        }
        self.loaded.notify_all();
    }
}

/// Body of the load job.
fn run_load_job(core: &SourceCore, uri: String) {
    let started = Instant::now();
    tracing::info!(uri = %uri, "loading source");

    match core.backend.open(&uri) {
        Ok(reader) => {
            let info = reader.info().clone();
            let duration = info.duration.unwrap_or(0.0);
            let _ = core.info.set(info.clone());
            core.finish(LoadState::Ready, Some(reader));
            tracing::info!(
                uri = %uri,
                duration_secs = duration,
                sample_rate = info.sample_rate,
                channels = info.source_channels,
                codec = info.codec.as_deref().unwrap_or("unknown"),
                took_ms = started.elapsed().as_millis() as u64,
                "source loaded"
            );
            core.notifier.notify(StreamEvent::Loaded { uri, duration });
        }
        Err(error) => {
            core.finish(LoadState::Failed, None);
            tracing::error!(uri = %uri, "source load failed: {error}");
            core.notifier.notify(StreamEvent::LoadFailed { uri, error });
        }
    }
}

impl AudioSource {
    /// An unloaded handle. Nothing happens until [`create`](Self::create).
    pub fn new(backend: Arc<dyn MediaBackend>, config: StreamConfig, notifier: Notifier) -> Self {
        Self {
            inner: Arc::new(SourceInner {
                loader: Mutex::new(None),
                core: Arc::new(SourceCore {
                    uri: OnceLock::new(),
                    backend,
                    notifier,
                    state: AtomicU8::new(encode_state(LoadState::Unloaded)),
                    info: OnceLock::new(),
                    slot: Mutex::new(LoadSlot::default()),
                    loaded: Condvar::new(),
                }),
                config,
            }),
        }
    }

    /// Bind the handle to `uri` and start the load job. Returns immediately.
    ///
    /// Rejects an empty URI and a handle that was already created; in both cases no
    /// worker is started.
    pub fn create(&self, uri: &str) -> Result<(), StreamError> {
        if uri.trim().is_empty() {
            return Err(StreamError::EmptyUri);
        }
        let core = &self.inner.core;
        if core.uri.set(uri.to_string()).is_err() {
            return Err(StreamError::AlreadyCreated(
                core.uri().unwrap_or_default().to_string(),
            ));
        }
        core.state
            .store(encode_state(LoadState::Loading), Ordering::Release);

        let job_core = core.clone();
        let spawned = Worker::spawn("audio-stream-load", move |uri: String| {
            run_load_job(&job_core, uri)
        });
        let mut worker = match spawned {
            Ok(w) => w,
            Err(e) => {
                core.finish(LoadState::Failed, None);
                tracing::error!(uri = %uri, "failed to start load job: {e}");
                return Err(StreamError::Spawn(e));
            }
        };
        if worker.submit(uri.to_string()).is_err() {
            core.finish(LoadState::Failed, None);
            tracing::error!(uri = %uri, "load worker refused the job");
            return Err(StreamError::Spawn(std::io::Error::other(
                "load worker stopped",
            )));
        }
        *lock(&self.inner.loader) = Some(worker);
        Ok(())
    }

    /// The URI passed to `create`.
    pub fn source(&self) -> Option<&str> {
        self.inner.core.uri()
    }

    pub fn load_state(&self) -> LoadState {
        self.inner.core.load_state()
    }

    pub fn is_loaded(&self) -> bool {
        self.load_state() == LoadState::Ready
    }

    /// Stream info once `Ready`.
    pub fn info(&self) -> Option<StreamInfo> {
        self.inner.core.info().cloned()
    }

    /// Declared duration in seconds; `0.0` until `Ready` or when undeclared.
    pub fn get_length(&self) -> f64 {
        self.inner
            .core
            .info()
            .and_then(|i| i.duration)
            .unwrap_or(0.0)
    }

    /// Native sample rate; `0` until `Ready`.
    pub fn get_sample_rate(&self) -> u32 {
        self.inner.core.info().map(|i| i.sample_rate).unwrap_or(0)
    }

    /// Block up to `timeout` for the load job to finish. Never call from the mix thread.
    pub fn wait_until_loaded(&self, timeout: Duration) -> LoadState {
        let core = &self.inner.core;
        if core.uri().is_none() {
            return LoadState::Unloaded;
        }
        let deadline = Instant::now() + timeout;
        let mut slot = lock(&core.slot);
        while !core.load_state().is_terminal() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            slot = core
                .loaded
                .wait_timeout(slot, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        core.load_state()
    }

    /// New playback session over this source. Each session owns its seek worker.
    pub fn instance_playback(&self) -> Result<PlaybackSession, StreamError> {
        if self.source().is_none() {
            return Err(StreamError::NoSource);
        }
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        PlaybackSession::new(self.clone(), id)
    }

    pub fn config(&self) -> &StreamConfig {
        &self.inner.config
    }

    pub(crate) fn core(&self) -> &Arc<SourceCore> {
        &self.inner.core
    }
}
