//! Test doubles: an in-memory backend with gates and forced failures, WAV fixtures and a
//! local HTTP server that honours byte ranges.

use std::io::{self, BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use symphonia::core::errors::{Error as SymphoniaError, SeekErrorKind};
use symphonia::core::units::TimeBase;

use crate::error::{DecodeError, LoadError, SeekError};
use crate::frame::StereoFrame;
use crate::media::{MediaBackend, MediaReader, PacketRead, StreamInfo};
use crate::session::PlaybackSession;

/// Left/right values every fake packet carries.
pub(crate) const FAKE_LEFT: f32 = 0.25;
pub(crate) const FAKE_RIGHT: f32 = -0.25;

#[derive(Default)]
struct FakeState {
    sample_rate: u32,
    total_frames: u64,
    packet_frames: usize,
    opens: AtomicUsize,
    packets_read: AtomicUsize,
    seeks: Mutex<Vec<u64>>,
    open_gate: Mutex<Option<Receiver<()>>>,
    seek_gate: Mutex<Option<Receiver<()>>>,
    fail_open: bool,
    fail_seek: bool,
    fail_decode: Option<(usize, usize)>,
    /// (open, packet, count): reader `open` reports `count` pending reads before `packet`.
    pending: Option<(usize, usize, usize)>,
}

/// Synthetic source of constant-valued stereo packets.
#[derive(Clone)]
pub(crate) struct FakeBackend {
    state: Arc<FakeState>,
}

pub(crate) struct FakeBuilder {
    state: FakeState,
}

impl FakeBuilder {
    pub(crate) fn packet_frames(mut self, frames: usize) -> Self {
        self.state.packet_frames = frames;
        self
    }

    /// Opens block until the returned sender is dropped.
    pub(crate) fn gate_open(mut self) -> (Self, Sender<()>) {
        let (tx, rx) = crossbeam_channel::bounded(0);
        self.state.open_gate = Mutex::new(Some(rx));
        (self, tx)
    }

    /// Seeks block until the returned sender is dropped.
    pub(crate) fn gate_seeks(mut self) -> (Self, Sender<()>) {
        let (tx, rx) = crossbeam_channel::bounded(0);
        self.state.seek_gate = Mutex::new(Some(rx));
        (self, tx)
    }

    pub(crate) fn fail_open(mut self) -> Self {
        self.state.fail_open = true;
        self
    }

    pub(crate) fn fail_seek(mut self) -> Self {
        self.state.fail_seek = true;
        self
    }

    /// Reader number `open` (0 = the load job's) fails on its `packet`-th read.
    pub(crate) fn fail_decode_at(mut self, open: usize, packet: usize) -> Self {
        self.state.fail_decode = Some((open, packet));
        self
    }

    /// Reader number `open` reports `count` pending reads before its `packet`-th packet.
    pub(crate) fn pending_at(mut self, open: usize, packet: usize, count: usize) -> Self {
        self.state.pending = Some((open, packet, count));
        self
    }

    pub(crate) fn build(self) -> FakeBackend {
        FakeBackend {
            state: Arc::new(self.state),
        }
    }
}

impl FakeBackend {
    pub(crate) fn builder(sample_rate: u32, seconds: f64) -> FakeBuilder {
        FakeBuilder {
            state: FakeState {
                sample_rate,
                total_frames: (sample_rate as f64 * seconds).round() as u64,
                packet_frames: 256,
                ..Default::default()
            },
        }
    }

    pub(crate) fn opens(&self) -> usize {
        self.state.opens.load(Ordering::SeqCst)
    }

    pub(crate) fn packets_read(&self) -> usize {
        self.state.packets_read.load(Ordering::SeqCst)
    }

    pub(crate) fn seeks(&self) -> Vec<u64> {
        self.state.seeks.lock().unwrap().clone()
    }
}

fn wait_gate(gate: &Mutex<Option<Receiver<()>>>) {
    let rx = gate.lock().unwrap().clone();
    if let Some(rx) = rx {
        let _ = rx.recv();
    }
}

impl MediaBackend for FakeBackend {
    fn open(&self, _uri: &str) -> Result<Box<dyn MediaReader>, LoadError> {
        wait_gate(&self.state.open_gate);
        let index = self.state.opens.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_open {
            return Err(LoadError::NoAudioStream);
        }
        let rate = self.state.sample_rate;
        Ok(Box::new(FakeReader {
            state: self.state.clone(),
            index,
            cursor: 0,
            packets: 0,
            pending_left: match self.state.pending {
                Some((open, _, count)) if open == index => count,
                _ => 0,
            },
            info: StreamInfo {
                sample_rate: rate,
                source_channels: 2,
                time_base: TimeBase::new(1, rate),
                duration: Some(self.state.total_frames as f64 / rate as f64),
                codec: Some("FAKE".to_string()),
            },
        }))
    }
}

struct FakeReader {
    state: Arc<FakeState>,
    index: usize,
    cursor: u64,
    packets: usize,
    pending_left: usize,
    info: StreamInfo,
}

impl MediaReader for FakeReader {
    fn info(&self) -> &StreamInfo {
        &self.info
    }

    fn read_packet(&mut self, out: &mut Vec<f32>) -> Result<PacketRead, DecodeError> {
        if self.state.fail_decode == Some((self.index, self.packets)) {
            return Err(DecodeError::Decode(SymphoniaError::DecodeError("forced failure")));
        }
        if self.pending_left > 0
            && self.state.pending.is_some_and(|(_, packet, _)| packet == self.packets)
        {
            self.pending_left -= 1;
            return Ok(PacketRead::Pending);
        }
        if self.cursor >= self.state.total_frames {
            return Ok(PacketRead::End);
        }
        let frames = (self.state.packet_frames as u64).min(self.state.total_frames - self.cursor);
        for _ in 0..frames {
            out.push(FAKE_LEFT);
            out.push(FAKE_RIGHT);
        }
        let ts = self.cursor;
        self.cursor += frames;
        self.packets += 1;
        self.state.packets_read.fetch_add(1, Ordering::SeqCst);
        Ok(PacketRead::Decoded(ts))
    }

    fn seek(&mut self, ts: u64) -> Result<u64, SeekError> {
        wait_gate(&self.state.seek_gate);
        self.state.seeks.lock().unwrap().push(ts);
        if self.state.fail_seek {
            return Err(SeekError::Native(SymphoniaError::SeekError(
                SeekErrorKind::OutOfRange,
            )));
        }
        self.cursor = ts.min(self.state.total_frames);
        Ok(self.cursor)
    }
}

/// Mix `frames` at a time until `done` holds for a mixed block, or panic after two seconds.
/// Returns the block that satisfied `done`.
pub(crate) fn mix_until(
    session: &mut PlaybackSession,
    frames: usize,
    mut done: impl FnMut(&[StereoFrame]) -> bool,
) -> Vec<StereoFrame> {
    let deadline = Instant::now() + Duration::from_secs(2);
    let mut out = vec![StereoFrame::new(9.0, 9.0); frames];
    loop {
        out.fill(StereoFrame::new(9.0, 9.0));
        assert_eq!(session.mix(&mut out), frames);
        if done(&out) {
            return out;
        }
        assert!(Instant::now() < deadline, "condition not reached while mixing");
        thread::sleep(Duration::from_millis(1));
    }
}

/// Unique temp path per process and test.
pub(crate) fn temp_wav_path(name: &str) -> PathBuf {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!(
        "audio-stream-test-{}-{name}-{n}.wav",
        std::process::id()
    ))
}

/// Write a 16-bit PCM WAV with a quiet square wave.
pub(crate) fn write_wav(path: &Path, sample_rate: u32, channels: u16, frames: u32) {
    let block_align = channels as u32 * 2;
    let data_len = frames * block_align;
    let mut bytes = Vec::with_capacity(44 + data_len as usize);
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
    bytes.extend_from_slice(b"WAVE");
    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&channels.to_le_bytes());
    bytes.extend_from_slice(&sample_rate.to_le_bytes());
    bytes.extend_from_slice(&(sample_rate * block_align).to_le_bytes());
    bytes.extend_from_slice(&(block_align as u16).to_le_bytes());
    bytes.extend_from_slice(&16u16.to_le_bytes());
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&data_len.to_le_bytes());
    for i in 0..frames {
        let value: i16 = if (i / 20) % 2 == 0 { 4_000 } else { -4_000 };
        for _ in 0..channels {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
    }
    std::fs::write(path, bytes).unwrap();
}

/// Serves one in-memory resource over HTTP/1.1, one request per connection.
pub(crate) struct RangeServer {
    addr: SocketAddr,
}

type Delay = Arc<dyn Fn(u64) -> Duration + Send + Sync>;

impl RangeServer {
    /// Honour `Range` requests, sleeping `delay(start)` before answering each one.
    pub(crate) fn start(
        data: Vec<u8>,
        delay: impl Fn(u64) -> Duration + Send + Sync + 'static,
    ) -> Self {
        Self::spawn(data, Arc::new(delay), true)
    }

    /// Answer every request with the whole body and a `200`.
    pub(crate) fn start_ignoring_ranges(data: Vec<u8>) -> Self {
        Self::spawn(data, Arc::new(|_| Duration::ZERO), false)
    }

    fn spawn(data: Vec<u8>, delay: Delay, ranges: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let data = Arc::new(data);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { return };
                let data = data.clone();
                let delay = delay.clone();
                thread::spawn(move || {
                    let _ = serve(stream, &data, delay.as_ref(), ranges);
                });
            }
        });
        Self { addr }
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("http://{}/{path}", self.addr)
    }

    /// URL on a port nothing listens on.
    pub(crate) fn unreachable_url() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{addr}/gone.wav")
    }
}

fn serve(
    mut stream: TcpStream,
    data: &[u8],
    delay: &(dyn Fn(u64) -> Duration + Send + Sync),
    ranges: bool,
) -> io::Result<()> {
    let mut request = BufReader::new(stream.try_clone()?);
    let mut range = None;
    loop {
        let mut line = String::new();
        if request.read_line(&mut line)? == 0 {
            return Ok(());
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.eq_ignore_ascii_case("range") {
                range = parse_range(value.trim());
            }
        }
    }

    let len = data.len() as u64;
    let (head, body) = match range.filter(|_| ranges) {
        Some((start, end)) if start < len => {
            thread::sleep(delay(start));
            let end = end.min(len - 1);
            (
                format!("HTTP/1.1 206 Partial Content\r\nContent-Range: bytes {start}-{end}/{len}\r\n"),
                &data[start as usize..=end as usize],
            )
        }
        _ => ("HTTP/1.1 200 OK\r\n".to_string(), data),
    };
    write!(
        stream,
        "{head}Content-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    )?;
    stream.write_all(body)?;
    stream.flush()
}

/// `bytes=start-end` (an open end runs to the last byte).
fn parse_range(value: &str) -> Option<(u64, u64)> {
    let (start, end) = value.strip_prefix("bytes=")?.split_once('-')?;
    let start = start.trim().parse().ok()?;
    let end = match end.trim() {
        "" => u64::MAX,
        end => end.parse().ok()?,
    };
    Some((start, end))
}
