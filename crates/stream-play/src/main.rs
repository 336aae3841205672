//! stream-play: plays one source through the on-demand streaming core.
//!
//! ## Flow
//! 1. **Load**: create an [`AudioSource`] and wait for its load job to finish.
//! 2. **Output**: pick a device config close to the stream's native rate and move a
//!    [`mixer::HostMixer`] (owning the playback session) into the CPAL callback.
//! 3. **Control**: start, optionally seek later, report status, and stop on Ctrl-C or at
//!    the end of the stream.

mod cli;
mod device;
mod mixer;
mod output;
mod status;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use audio_stream::{AudioSource, LoadState, Notifier, SessionControl, StreamEvent, SymphoniaBackend};
use clap::Parser;
use cpal::traits::{DeviceTrait, StreamTrait};
use crossbeam_channel::Receiver;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = cli::Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,stream_play=info,audio_stream=info")
        }))
        .init();
    let host = cpal::default_host();

    if args.list_devices {
        device::list_devices(&host)?;
        return Ok(());
    }
    let uri = args.uri.clone().context("missing source uri")?;

    let (notifier, events) = Notifier::channel();
    let backend = Arc::new(SymphoniaBackend::new(args.decoder_config()));
    let source = AudioSource::new(backend, args.stream_config(), notifier);
    source
        .create(&uri)
        .with_context(|| format!("create source {uri}"))?;

    match source.wait_until_loaded(Duration::from_secs(args.load_timeout_secs)) {
        LoadState::Ready => {}
        LoadState::Failed => {
            let reason = load_failure(&events).unwrap_or_else(|| "unknown error".into());
            bail!("failed to load {uri}: {reason}");
        }
        other => bail!("{uri} not loaded after {}s ({other:?})", args.load_timeout_secs),
    }
    let src_rate = source.get_sample_rate();

    let device = device::pick_device(&host, args.device.as_deref())?;
    tracing::info!(device = %device.description()?, "output device");
    let supported = device::pick_output_config(&device, src_rate)?;
    let mut config: cpal::StreamConfig = supported.config();
    if let Some(buffer_size) = device::pick_buffer_size(&supported) {
        config.buffer_size = buffer_size;
    }
    tracing::info!(
        sample_rate = config.sample_rate,
        channels = config.channels,
        format = ?supported.sample_format(),
        "output config"
    );

    let session = source.instance_playback().context("create playback session")?;
    let control = session.control();
    let mixer = mixer::HostMixer::new(session, src_rate, config.sample_rate, args.chunk_frames)?;
    let stream = output::build_output_stream(&device, &config, supported.sample_format(), mixer)?;
    stream.play().context("start output stream")?;
    control.start(args.start);

    let running = Arc::new(AtomicBool::new(true));
    let running_handler = running.clone();
    ctrlc::set_handler(move || running_handler.store(false, Ordering::Relaxed))
        .context("install Ctrl-C handler")?;

    run_until_done(&args, &control, &events, &running)?;

    status::report(&control.status(), args.json_status)?;
    drop(stream);
    Ok(())
}

/// Drive the session from the main thread until it ends or Ctrl-C is pressed.
fn run_until_done(
    args: &cli::Args,
    control: &SessionControl,
    events: &Receiver<StreamEvent>,
    running: &AtomicBool,
) -> Result<()> {
    let started = Instant::now();
    let seek_after = Duration::from_millis(args.seek_after_ms);
    let status_every = Duration::from_millis(args.status_interval_ms.max(50));
    let mut pending_seek = args.seek;
    let mut last_status = Instant::now();

    loop {
        if !running.load(Ordering::Relaxed) {
            tracing::info!("interrupted");
            control.stop();
            return Ok(());
        }

        if let Some(target) = pending_seek {
            if started.elapsed() >= seek_after {
                tracing::info!(target, "seeking");
                control.seek(target);
                pending_seek = None;
            }
        }

        for event in events.try_iter() {
            log_event(&event);
        }
        if !control.is_playing() {
            tracing::info!(reason = ?control.end_reason(), "playback ended");
            return Ok(());
        }

        if last_status.elapsed() >= status_every {
            status::report(&control.status(), args.json_status)?;
            last_status = Instant::now();
        }
        thread::sleep(Duration::from_millis(20));
    }
}

fn log_event(event: &StreamEvent) {
    match event {
        StreamEvent::Loaded { uri, duration } => {
            tracing::debug!(uri = %uri, duration, "loaded")
        }
        StreamEvent::LoadFailed { uri, error } => {
            tracing::error!(uri = %uri, "load failed: {error}")
        }
        StreamEvent::SeekFailed {
            session,
            target,
            error,
        } => tracing::warn!(session, target, "seek failed: {error}"),
        StreamEvent::DecodeFailed { session, error } => {
            tracing::error!(session, "decode failed: {error}")
        }
        StreamEvent::EndOfStream { session } => tracing::info!(session, "end of stream"),
    }
}

fn load_failure(events: &Receiver<StreamEvent>) -> Option<String> {
    let deadline = Instant::now() + Duration::from_secs(1);
    while let Some(left) = deadline.checked_duration_since(Instant::now()) {
        match events.recv_timeout(left) {
            Ok(StreamEvent::LoadFailed { error, .. }) => return Some(error.to_string()),
            Ok(_) => continue,
            Err(_) => break,
        }
    }
    None
}
