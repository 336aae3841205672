//! HTTP range reader backing network URIs.
//!
//! Symphonia wants `Read + Seek`. Bytes come from fixed-size blocks fetched with `Range`
//! requests by a prefetch thread that stays `read_ahead` bytes ahead of the read position.
//! The mix thread never fetches: before decoding it asks a [`Residency`] handle whether the
//! next `read_ahead` bytes are cached, and skips the packet if not. Reads that do find a
//! block missing (opening and seeking, on worker threads) wait for the prefetcher.

use std::collections::HashMap;
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use symphonia::core::io::MediaSource;

/// `true` for URIs this reader handles.
pub fn is_network_uri(uri: &str) -> bool {
    let lower = uri.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

struct Shared {
    url: String,
    block_size: u64,
    read_ahead: u64,
    timeout: Duration,
    len: u64,
    cache: Mutex<Cache>,
    changed: Condvar,
}

#[derive(Default)]
struct Cache {
    blocks: HashMap<u64, Vec<u8>>,
    /// Byte position of the reader; the prefetch window starts here.
    cursor: u64,
    error: Option<String>,
    closed: bool,
}

fn lock(cache: &Mutex<Cache>) -> MutexGuard<'_, Cache> {
    cache.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    /// Block indices covering `[from, from + span)`, clipped to the stream length.
    fn blocks_for(&self, from: u64, span: u64) -> Option<(u64, u64)> {
        if from >= self.len {
            return None;
        }
        let end = from.saturating_add(span.max(1)).min(self.len);
        Some((from / self.block_size, (end - 1) / self.block_size))
    }

    fn next_missing(&self, cache: &Cache) -> Option<u64> {
        let (first, last) =
            self.blocks_for(cache.cursor, self.read_ahead.saturating_add(self.block_size))?;
        (first..=last).find(|i| !cache.blocks.contains_key(i))
    }

    fn is_ready(&self, cache: &Cache) -> bool {
        if cache.error.is_some() {
            return true;
        }
        match self.blocks_for(cache.cursor, self.read_ahead) {
            Some((first, last)) => (first..=last).all(|i| cache.blocks.contains_key(&i)),
            None => true,
        }
    }

    fn evict(&self, cache: &mut Cache) {
        let first = (cache.cursor / self.block_size).saturating_sub(1);
        let last = (cache.cursor.saturating_add(self.read_ahead) / self.block_size) + 2;
        cache.blocks.retain(|i, _| *i >= first && *i <= last);
    }
}

fn prefetch_loop(shared: Arc<Shared>) {
    loop {
        let index = {
            let mut cache = lock(&shared.cache);
            loop {
                if cache.closed {
                    return;
                }
                if cache.error.is_none() {
                    if let Some(index) = shared.next_missing(&cache) {
                        break index;
                    }
                }
                cache = shared
                    .changed
                    .wait(cache)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        };

        let start = index * shared.block_size;
        let end = (start + shared.block_size).min(shared.len) - 1;
        let fetched = fetch_range(&shared.url, start, end, shared.timeout);

        let mut cache = lock(&shared.cache);
        match fetched {
            Ok(fetched) => {
                let data = fetched.slice(start, end);
                cache.blocks.insert(index, data);
                shared.evict(&mut cache);
            }
            Err(e) => {
                tracing::warn!(url = %shared.url, start, "http prefetch failed: {e}");
                cache.error = Some(e.to_string());
            }
        }
        drop(cache);
        shared.changed.notify_all();
    }
}

/// Cheap handle answering "can the next packet be read without waiting?".
#[derive(Clone)]
pub struct Residency {
    shared: Arc<Shared>,
}

impl Residency {
    /// `true` when the next `read_ahead` bytes are cached (or a fetch error is waiting to
    /// be reported by the next read). Never waits on I/O.
    pub fn is_ready(&self) -> bool {
        self.shared.is_ready(&lock(&self.shared.cache))
    }
}

pub struct HttpRangeSource {
    shared: Arc<Shared>,
    pos: u64,
}

impl HttpRangeSource {
    /// Fetch the first block (learning the total length) and start the prefetcher.
    /// Blocks on the network.
    pub fn open(
        url: impl Into<String>,
        block_size: usize,
        read_ahead: usize,
        timeout: Duration,
    ) -> io::Result<Self> {
        let url = url.into();
        let block_size = block_size.max(1) as u64;
        let first = fetch_range(&url, 0, block_size - 1, timeout)?;
        let len = first
            .total
            .ok_or_else(|| io::Error::other("content length unavailable"))?;

        let mut blocks = HashMap::new();
        if first.partial {
            blocks.insert(0, first.body);
        } else {
            // Range ignored: the whole body is already here.
            for (i, chunk) in first.body.chunks(block_size as usize).enumerate() {
                blocks.insert(i as u64, chunk.to_vec());
            }
        }

        let shared = Arc::new(Shared {
            url,
            block_size,
            read_ahead: read_ahead as u64,
            timeout,
            len,
            cache: Mutex::new(Cache {
                blocks,
                ..Cache::default()
            }),
            changed: Condvar::new(),
        });
        let worker = shared.clone();
        thread::Builder::new()
            .name("audio-stream-http".into())
            .spawn(move || prefetch_loop(worker))?;

        Ok(Self { shared, pos: 0 })
    }

    pub fn residency(&self) -> Residency {
        Residency {
            shared: self.shared.clone(),
        }
    }

    fn move_cursor(&self, cache: &mut Cache) {
        let moved_block = cache.cursor / self.shared.block_size != self.pos / self.shared.block_size;
        cache.cursor = self.pos;
        if moved_block {
            self.shared.changed.notify_all();
        }
    }
}

impl Read for HttpRangeSource {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() || self.pos >= self.shared.len {
            return Ok(0);
        }
        let index = self.pos / self.shared.block_size;
        let offset = (self.pos % self.shared.block_size) as usize;

        let mut cache = lock(&self.shared.cache);
        self.move_cursor(&mut cache);
        loop {
            if let Some(block) = cache.blocks.get(&index) {
                let n = block.len().saturating_sub(offset).min(out.len());
                out[..n].copy_from_slice(&block[offset..offset + n]);
                self.pos += n as u64;
                self.move_cursor(&mut cache);
                return Ok(n);
            }
            if let Some(error) = cache.error.take() {
                self.shared.changed.notify_all();
                return Err(io::Error::other(error));
            }
            if cache.closed {
                return Err(io::Error::other("http source closed"));
            }
            self.shared.changed.notify_all();
            cache = self
                .shared
                .changed
                .wait(cache)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

impl Seek for HttpRangeSource {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.pos = match pos {
            SeekFrom::Start(x) => x,
            SeekFrom::Current(d) => add_signed(self.pos, d),
            SeekFrom::End(d) => add_signed(self.shared.len, d),
        };
        let mut cache = lock(&self.shared.cache);
        self.move_cursor(&mut cache);
        Ok(self.pos)
    }
}

impl MediaSource for HttpRangeSource {
    fn is_seekable(&self) -> bool {
        true
    }

    fn byte_len(&self) -> Option<u64> {
        Some(self.shared.len)
    }
}

impl Drop for HttpRangeSource {
    fn drop(&mut self) {
        // The prefetcher may be mid-request; it exits on its own once that returns.
        lock(&self.shared.cache).closed = true;
        self.shared.changed.notify_all();
    }
}

struct Fetched {
    body: Vec<u8>,
    total: Option<u64>,
    /// `false` when the server ignored the range and sent the whole resource.
    partial: bool,
}

impl Fetched {
    fn slice(self, start: u64, end: u64) -> Vec<u8> {
        if self.partial {
            return self.body;
        }
        let end = (end as usize + 1).min(self.body.len());
        self.body.get(start as usize..end).map(<[u8]>::to_vec).unwrap_or_default()
    }
}

/// Fetch bytes `start..=end`.
fn fetch_range(url: &str, start: u64, end: u64, timeout: Duration) -> io::Result<Fetched> {
    let range = format!("bytes={start}-{end}");
    let started = Instant::now();
    let resp = ureq::get(url)
        .config()
        .timeout_per_call(Some(timeout))
        .build()
        .header("Range", &range)
        .call()
        .map_err(|e| io::Error::other(format!("http range request failed: {e}")))?;

    let status = resp.status();
    let header = |name: &str| {
        resp.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let content_range = header("Content-Range");
    let content_length = header("Content-Length").and_then(|s| s.parse::<u64>().ok());

    let mut body = Vec::new();
    let (_, resp_body) = resp.into_parts();
    resp_body
        .into_reader()
        .read_to_end(&mut body)
        .map_err(|e| io::Error::other(format!("http read failed: {e}")))?;

    let elapsed = started.elapsed();
    if elapsed > Duration::from_millis(250) {
        tracing::warn!(
            took_ms = elapsed.as_millis() as u64,
            bytes = body.len(),
            range = range.as_str(),
            "slow http range fetch"
        );
    }

    let partial = status == ureq::http::StatusCode::PARTIAL_CONTENT;
    let total = if partial {
        content_range.as_deref().and_then(content_range_total)
    } else {
        content_length.or(Some(body.len() as u64))
    };
    Ok(Fetched {
        body,
        total,
        partial,
    })
}

/// Total length from a `Content-Range: bytes start-end/total` header.
fn content_range_total(header: &str) -> Option<u64> {
    let (_, total) = header.split_once('/')?;
    total.trim().parse::<u64>().ok()
}

fn add_signed(base: u64, delta: i64) -> u64 {
    if delta >= 0 {
        base.saturating_add(delta as u64)
    } else {
        base.saturating_sub(delta.unsigned_abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RangeServer;

    fn bytes(n: usize) -> Vec<u8> {
        (0..n).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn network_uri_detection() {
        assert!(is_network_uri("http://host/a.mp3"));
        assert!(is_network_uri("HTTPS://host/a.ogg"));
        assert!(!is_network_uri("/music/a.flac"));
        assert!(!is_network_uri("file:///music/a.flac"));
    }

    #[test]
    fn reads_whole_resource_across_blocks() {
        let data = bytes(10_000);
        let server = RangeServer::start(data.clone(), |_| Duration::ZERO);
        let mut source =
            HttpRangeSource::open(server.url("a.bin"), 1_024, 2_048, Duration::from_secs(5)).unwrap();
        assert_eq!(source.byte_len(), Some(10_000));

        let mut read = Vec::new();
        source.read_to_end(&mut read).unwrap();
        assert_eq!(read, data);
    }

    #[test]
    fn seek_then_read_serves_right_bytes() {
        let data = bytes(10_000);
        let server = RangeServer::start(data.clone(), |_| Duration::ZERO);
        let mut source =
            HttpRangeSource::open(server.url("a.bin"), 1_000, 1_000, Duration::from_secs(5)).unwrap();

        assert_eq!(source.seek(SeekFrom::End(-10)).unwrap(), 9_990);
        let mut buf = [0u8; 32];
        let n = source.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], &data[9_990..9_990 + n]);

        assert_eq!(source.seek(SeekFrom::Start(4_321)).unwrap(), 4_321);
        let n = source.read(&mut buf).unwrap();
        assert!(n > 0);
        assert_eq!(&buf[..n], &data[4_321..4_321 + n]);
        assert_eq!(source.read(&mut []).unwrap(), 0);
    }

    #[test]
    fn residency_waits_for_prefetch_without_blocking() {
        let data = bytes(8_192);
        let server = RangeServer::start(data, |start| {
            if start >= 1_024 {
                Duration::from_millis(300)
            } else {
                Duration::ZERO
            }
        });
        let source =
            HttpRangeSource::open(server.url("a.bin"), 1_024, 2_048, Duration::from_secs(5)).unwrap();
        let residency = source.residency();

        let started = Instant::now();
        assert!(!residency.is_ready());
        assert!(started.elapsed() < Duration::from_millis(100));

        let deadline = Instant::now() + Duration::from_secs(5);
        while !residency.is_ready() {
            assert!(Instant::now() < deadline, "prefetch never caught up");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn server_ignoring_range_is_served_from_first_response() {
        let data = bytes(3_000);
        let server = RangeServer::start_ignoring_ranges(data.clone());
        let mut source =
            HttpRangeSource::open(server.url("a.bin"), 1_024, 1_024, Duration::from_secs(5)).unwrap();
        assert!(source.residency().is_ready());
        let mut read = Vec::new();
        source.read_to_end(&mut read).unwrap();
        assert_eq!(read, data);
    }

    #[test]
    fn full_body_slice_clips_to_block() {
        let fetched = Fetched {
            body: bytes(100),
            total: Some(100),
            partial: false,
        };
        assert_eq!(fetched.slice(90, 109), bytes(100)[90..].to_vec());
    }

    #[test]
    fn content_range_total_parses_total() {
        assert_eq!(content_range_total("bytes 0-99/12345"), Some(12345));
        assert_eq!(content_range_total("bytes 0-99/*"), None);
        assert_eq!(content_range_total("bytes 0-99"), None);
    }

    #[test]
    fn add_signed_saturates() {
        assert_eq!(add_signed(10, 5), 15);
        assert_eq!(add_signed(10, -3), 7);
        assert_eq!(add_signed(5, -10), 0);
        assert_eq!(add_signed(u64::MAX, 10), u64::MAX);
        assert_eq!(add_signed(5, i64::MIN), 0);
    }
}
