//! # Audio Decoding
//!
//! Decodes container audio (WebM, WAV, Ogg, FLAC, MP3, MP4/AAC, ...) into mono
//! `f32` samples at the recording's native sample rate.
//!
//! ## Algorithm:
//! 1. Reject empty input outright
//! 2. Spill the bytes into a scoped temp file (suffix = format hint) so the
//!    demuxer can seek freely; the file is removed when the guard drops
//! 3. Probe the container and pick the first decodable audio track
//! 4. Decode every packet of that track, skipping individually corrupt packets
//! 5. Average all channels into one mono channel
//!
//! No resampling happens here: pitch and duration are exactly what was recorded.

use std::io::Write;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::audio::{AnalysisError, FormatHint, RawAudio, Stage, Waveform};

const UNSUPPORTED_HINT: &str = "re-encode the recording as WAV, FLAC, MP3 or Ogg/Vorbis, \
     or install an external audio codec toolkit and convert it before upload";

/// Decode a recording into a mono waveform.
///
/// The temp file backing the decode lives in the system temp directory and is
/// gone by the time this returns, whatever the outcome.
///
/// ## Errors:
/// - `UnsupportedFormat`: no reader/codec for this container or codec
/// - `Decode`: empty input, unreadable stream, or zero decoded samples
/// - `Internal`: the temp file could not be created or written
pub fn decode(raw: RawAudio) -> Result<Waveform, AnalysisError> {
    decode_in(raw, &std::env::temp_dir())
}

/// Same as [`decode`], with the scratch file placed in `scratch_dir`.
pub fn decode_in(raw: RawAudio, scratch_dir: &Path) -> Result<Waveform, AnalysisError> {
    if raw.is_empty() {
        return Err(AnalysisError::decode("audio is empty"));
    }

    let RawAudio { bytes, format } = raw;

    // NamedTempFile deletes itself on drop, including on every early return below
    let mut scratch = tempfile::Builder::new()
        .prefix("sleep-audio-")
        .suffix(&format!(".{}", format.extension()))
        .tempfile_in(scratch_dir)
        .map_err(|e| AnalysisError::internal(Stage::Decode, e))?;

    scratch
        .write_all(&bytes)
        .and_then(|_| scratch.flush())
        .map_err(|e| AnalysisError::internal(Stage::Decode, e))?;
    drop(bytes);

    let file = scratch
        .reopen()
        .map_err(|e| AnalysisError::internal(Stage::Decode, e))?;

    tracing::debug!(
        path = %scratch.path().display(),
        format = %format,
        "Decoding recording from scratch file"
    );

    decode_source(file, &format)
}

/// Probe and decode an already materialized media source.
fn decode_source(file: std::fs::File, format: &FormatHint) -> Result<Waveform, AnalysisError> {
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    hint.with_extension(format.extension());

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| classify("could not open container", e))?;

    let mut reader = probed.format;

    let track = reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| AnalysisError::decode("no audio track found in recording"))?;

    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| classify("no decoder for this codec", e))?;

    let mut samples: Vec<f32> = Vec::new();
    let mut channels = 0usize;
    let mut skipped_packets = 0usize;

    loop {
        let packet = match reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break; // End of stream
            }
            // The container switched tracks mid-stream; what we have so far is the recording
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(classify("error reading packet", e)),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(reason)) => {
                skipped_packets += 1;
                tracing::warn!(reason, "Skipping corrupt packet");
                continue;
            }
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => return Err(classify("error decoding packet", e)),
        };

        let spec = *decoded.spec();
        sample_rate = spec.rate;
        channels = spec.channels.count().max(1);

        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buffer.copy_interleaved_ref(decoded);
        downmix_into(buffer.samples(), channels, &mut samples);
    }

    if samples.is_empty() {
        return Err(AnalysisError::decode(if skipped_packets > 0 {
            format!("every packet failed to decode ({} skipped)", skipped_packets)
        } else {
            "recording contains no audio samples".to_string()
        }));
    }

    if sample_rate == 0 {
        return Err(AnalysisError::decode("recording does not declare a sample rate"));
    }

    tracing::debug!(
        samples = samples.len(),
        sample_rate,
        channels,
        skipped_packets,
        "Audio decoding complete"
    );

    Ok(Waveform::new(samples, sample_rate))
}

/// Average interleaved frames into mono and append them to `out`.
fn downmix_into(interleaved: &[f32], channels: usize, out: &mut Vec<f32>) {
    if channels == 1 {
        out.extend_from_slice(interleaved);
        return;
    }

    out.reserve(interleaved.len() / channels);
    for frame in interleaved.chunks_exact(channels) {
        let sum: f32 = frame.iter().sum();
        out.push(sum / channels as f32);
    }
}

/// Map a symphonia failure onto the pipeline taxonomy.
///
/// `Unsupported` means the build lacks a reader or codec for the input, which is
/// a deployment problem, so the message says how to fix it. Everything else is
/// treated as bad input.
fn classify(context: &str, err: SymphoniaError) -> AnalysisError {
    match err {
        SymphoniaError::Unsupported(what) => AnalysisError::unsupported_with(
            format!("{} ({}); {}", context, what, UNSUPPORTED_HINT),
            SymphoniaError::Unsupported(what),
        ),
        other => AnalysisError::decode_with(context, other),
    }
}
