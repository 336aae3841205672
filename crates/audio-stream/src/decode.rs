//! Symphonia-backed [`MediaBackend`].
//!
//! Uses Symphonia to:
//! - open a local path, `file://` URI or HTTP(S) URL
//! - detect the container format and select the first decodable audio track
//! - decode packets into interleaved stereo `f32` at the native rate
//! - seek to native timestamps, trimming pre-roll so playback starts at the target

use std::fs::File;
use std::io;
use std::path::Path;

use symphonia::core::codecs::{CODEC_TYPE_NULL, CodecParameters, Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::TimeBase;

use crate::config::DecoderConfig;
use crate::convert::StereoConverter;
use crate::error::{DecodeError, LoadError, SeekError};
use crate::http::{HttpRangeSource, Residency, is_network_uri};
use crate::media::{MediaBackend, MediaReader, PacketRead, StreamInfo, time_to_seconds};

/// Production backend. Cheap to share; every `open` builds independent contexts.
#[derive(Clone, Debug, Default)]
pub struct SymphoniaBackend {
    config: DecoderConfig,
}

impl SymphoniaBackend {
    pub fn new(config: DecoderConfig) -> Self {
        Self { config }
    }

    /// Open the byte source. Network sources come with a residency handle the reader
    /// checks before each packet.
    fn open_media_source(
        &self,
        uri: &str,
    ) -> Result<(Box<dyn MediaSource>, Option<Residency>), LoadError> {
        let open_error = |source| LoadError::Open {
            uri: uri.to_string(),
            source,
        };
        if is_network_uri(uri) {
            let source = HttpRangeSource::open(
                uri.trim(),
                self.config.http_block_size,
                self.config.http_read_ahead,
                self.config.http_timeout,
            )
            .map_err(open_error)?;
            let residency = source.residency();
            return Ok((Box::new(source), Some(residency)));
        }
        let file = File::open(local_path(uri)).map_err(open_error)?;
        Ok((Box::new(file), None))
    }

    fn seek_mode(&self) -> SeekMode {
        if self.config.accurate_seek {
            SeekMode::Accurate
        } else {
            SeekMode::Coarse
        }
    }
}

impl MediaBackend for SymphoniaBackend {
    fn open(&self, uri: &str) -> Result<Box<dyn MediaReader>, LoadError> {
        let (source, residency) = self.open_media_source(uri)?;
        let mut reader = SymphoniaReader::open(source, hint_for_uri(uri), self.seek_mode())?;
        reader.residency = residency;
        Ok(Box::new(reader))
    }
}

/// Demux/decode/convert contexts for one cursor over a source.
pub struct SymphoniaReader {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    converter: StereoConverter,
    track_id: u32,
    seek_mode: SeekMode,
    info: StreamInfo,
    residency: Option<Residency>,
    /// Timestamp the last accurate seek asked for; earlier decoded frames are dropped.
    trim_to: Option<u64>,
}

impl SymphoniaReader {
    /// Detect the container in `source` and prepare the first audio track for decoding.
    pub fn open(
        source: Box<dyn MediaSource>,
        hint: Hint,
        seek_mode: SeekMode,
    ) -> Result<Self, LoadError> {
        let mss = MediaSourceStream::new(source, Default::default());
        let detected = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(LoadError::Format)?;
        let format = detected.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(LoadError::NoAudioStream)?;
        let track_id = track.id;
        let params: CodecParameters = track.codec_params.clone();

        let sample_rate = params.sample_rate.ok_or(LoadError::UnknownSampleRate)?;
        let decoder = symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(LoadError::Decoder)?;

        let time_base = params
            .time_base
            .unwrap_or_else(|| TimeBase::new(1, sample_rate));
        let info = StreamInfo {
            sample_rate,
            source_channels: params.channels.map(|c| c.count()).unwrap_or(2),
            time_base,
            duration: duration_secs(&params, time_base),
            codec: codec_name_from_params(&params),
        };

        Ok(Self {
            format,
            decoder,
            converter: StereoConverter::new(),
            track_id,
            seek_mode,
            info,
            residency: None,
            trim_to: None,
        })
    }
}

impl MediaReader for SymphoniaReader {
    fn info(&self) -> &StreamInfo {
        &self.info
    }

    fn read_packet(&mut self, out: &mut Vec<f32>) -> Result<PacketRead, DecodeError> {
        loop {
            if self.residency.as_ref().is_some_and(|r| !r.is_ready()) {
                return Ok(PacketRead::Pending);
            }
            let packet = match self.format.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    return Ok(PacketRead::End);
                }
                Err(e) => return Err(DecodeError::Read(e)),
            };
            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = self.decoder.decode(&packet).map_err(DecodeError::Decode)?;
            let ts = packet.ts();
            match self.trim_to {
                // Pre-roll entirely before the target: decoded for decoder state only.
                Some(target) if packet.dur() > 0 && ts.saturating_add(packet.dur()) <= target => {
                    continue;
                }
                Some(target) if target > ts => {
                    self.trim_to = None;
                    let start = out.len();
                    self.converter.convert(decoded, out);
                    let decoded_frames = (out.len() - start) / 2;
                    let skip = frames_between(&self.info, ts, target).min(decoded_frames);
                    out.drain(start..start + skip * 2);
                    return Ok(PacketRead::Decoded(target));
                }
                _ => {
                    self.trim_to = None;
                    self.converter.convert(decoded, out);
                    return Ok(PacketRead::Decoded(ts));
                }
            }
        }
    }

    fn seek(&mut self, ts: u64) -> Result<u64, SeekError> {
        let seeked = self
            .format
            .seek(
                self.seek_mode,
                SeekTo::TimeStamp {
                    ts,
                    track_id: self.track_id,
                },
            )
            .map_err(SeekError::Native)?;
        self.decoder.reset();
        if matches!(self.seek_mode, SeekMode::Accurate) && seeked.required_ts > seeked.actual_ts {
            self.trim_to = Some(seeked.required_ts);
            Ok(seeked.required_ts)
        } else {
            self.trim_to = None;
            Ok(seeked.actual_ts)
        }
    }
}

/// Frames at the native rate between two timestamps (`0` when `to` is not after `from`).
fn frames_between(info: &StreamInfo, from: u64, to: u64) -> usize {
    let seconds = info.seconds_at(to) - info.seconds_at(from);
    (seconds * info.sample_rate as f64).round().max(0.0) as usize
}

/// Strip a `file://` scheme; anything else is taken as a path.
fn local_path(uri: &str) -> &Path {
    Path::new(uri.strip_prefix("file://").unwrap_or(uri))
}

/// Container hint from the URI extension, ignoring any query or fragment.
fn hint_for_uri(uri: &str) -> Hint {
    let mut hint = Hint::new();
    let path = uri.split(['?', '#']).next().unwrap_or(uri);
    let file_name = path.rsplit('/').next().unwrap_or(path);
    if let Some((_, ext)) = file_name.rsplit_once('.') {
        if !ext.is_empty() {
            hint.with_extension(ext);
        }
    }
    hint
}

/// Declared duration in seconds, when the container provides a frame count.
fn duration_secs(params: &CodecParameters, time_base: TimeBase) -> Option<f64> {
    let frames = params.n_frames?;
    Some(time_to_seconds(time_base.calc_time(frames)))
}

/// Best-effort codec label for status output.
fn codec_name_from_params(params: &CodecParameters) -> Option<String> {
    use symphonia::core::codecs::*;
    let name = match params.codec {
        CODEC_TYPE_FLAC => "FLAC",
        CODEC_TYPE_MP3 => "MP3",
        CODEC_TYPE_AAC => "AAC",
        CODEC_TYPE_ALAC => "ALAC",
        CODEC_TYPE_VORBIS => "VORBIS",
        CODEC_TYPE_OPUS => "OPUS",
        CODEC_TYPE_PCM_S16LE | CODEC_TYPE_PCM_S16BE => "PCM_S16",
        CODEC_TYPE_PCM_S24LE | CODEC_TYPE_PCM_S24BE => "PCM_S24",
        CODEC_TYPE_PCM_S32LE | CODEC_TYPE_PCM_S32BE => "PCM_S32",
        CODEC_TYPE_PCM_F32LE | CODEC_TYPE_PCM_F32BE => "PCM_F32",
        _ => return None,
    };
    Some(name.to_string())
}
