//! Long-lived job worker with at most one job in flight.
//!
//! Each owner (a source for its load job, a session for its seek jobs) gets one named
//! thread. Jobs go in through a bounded(1) channel and results come back through another
//! bounded(1) channel, so neither side ever blocks on a full channel:
//! - [`Worker::submit`] refuses a job while the previous result has not been collected
//! - [`Worker::poll`] collects without blocking (safe from the mix callback)
//! - dropping the worker closes the job channel and joins the thread

use std::io;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, TryRecvError};

pub struct Worker<J, R> {
    name: String,
    jobs: Option<Sender<J>>,
    results: Receiver<R>,
    in_flight: bool,
    handle: Option<JoinHandle<()>>,
}

impl<J, R> Worker<J, R>
where
    J: Send + 'static,
    R: Send + 'static,
{
    /// Start the worker thread. `run` is called once per submitted job, in order.
    pub fn spawn<F>(name: impl Into<String>, mut run: F) -> io::Result<Self>
    where
        F: FnMut(J) -> R + Send + 'static,
    {
        let name = name.into();
        let (job_tx, job_rx) = crossbeam_channel::bounded::<J>(1);
        let (result_tx, result_rx) = crossbeam_channel::bounded::<R>(1);

        let handle = thread::Builder::new().name(name.clone()).spawn(move || {
            for job in job_rx.iter() {
                if result_tx.send(run(job)).is_err() {
                    break;
                }
            }
        })?;

        Ok(Self {
            name,
            jobs: Some(job_tx),
            results: result_rx,
            in_flight: false,
            handle: Some(handle),
        })
    }

    /// Hand `job` to the worker. Returns the job back if one is already in flight or the
    /// worker has shut down. Never blocks.
    pub fn submit(&mut self, job: J) -> Result<(), J> {
        if self.in_flight {
            return Err(job);
        }
        let Some(jobs) = &self.jobs else {
            return Err(job);
        };
        match jobs.try_send(job) {
            Ok(()) => {
                self.in_flight = true;
                Ok(())
            }
            Err(e) => Err(e.into_inner()),
        }
    }

    /// Collect the in-flight result if it is ready. Never blocks.
    ///
    /// If the worker died mid-job (a panic), this clears the in-flight flag and returns
    /// `None`; callers can tell the two cases apart with [`is_busy`](Self::is_busy).
    pub fn poll(&mut self) -> Option<R> {
        if !self.in_flight {
            return None;
        }
        match self.results.try_recv() {
            Ok(result) => {
                self.in_flight = false;
                Some(result)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.in_flight = false;
                tracing::error!(worker = %self.name, "worker stopped before returning a result");
                None
            }
        }
    }

    /// Block until the in-flight result is available. Not for the mix callback.
    pub fn wait(&mut self) -> Option<R> {
        if !self.in_flight {
            return None;
        }
        self.in_flight = false;
        self.results.recv().ok()
    }
}

impl<J, R> Worker<J, R> {
    /// Thread name, for logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `true` from a successful [`submit`](Worker::submit) until the result is collected
    /// (or the worker is known to be gone).
    pub fn is_busy(&self) -> bool {
        self.in_flight
    }

    /// Close the job channel and join the thread. Waits for a running job. Idempotent.
    pub fn shutdown(&mut self) {
        drop(self.jobs.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!(worker = %self.name, "worker thread panicked");
            }
        }
        self.in_flight = false;
    }
}

impl<J, R> Drop for Worker<J, R> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
