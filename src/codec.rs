//! Codec Facade (§4.A) — the only place this crate talks to the underlying
//! streaming compressor.
//!
//! zlines locks the wire format to one compressor identity — the header's
//! `alg fzstd` line names it, and readers must reject any other identifier
//! — so there is one facade, not a registry. The shape is one-shot helpers
//! for small buffers (the line-subindex) and streaming helpers for the
//! (possibly huge) block content, both built on `zstd`.

use std::io::{self, BufReader, Read, Write};
use thiserror::Error;

pub use crate::error::CodecError;

/// On-disk algorithm identifier written into the header's `alg` line.
/// §6: "implementations may use any identifier but must reject files
/// bearing an unknown one."
pub const ALGORITHM_ID: &str = "fzstd";

/// Default Zstandard compression level used for both block content and the
/// (optionally compressed) line-subindex / file index.
pub const DEFAULT_LEVEL: i32 = 3;

/// Conservative upper bound on compressed output size for `n` input bytes.
///
/// Mirrors the intent of `ZSTD_COMPRESSBOUND`: compression of adversarial
/// (incompressible) input can grow the payload slightly, so callers sizing
/// a buffer ahead of compression need margin. This crate's actual
/// compress calls return a `Vec<u8>` sized to the real output, so this
/// bound is advisory (used for e.g. deciding whether it is even worth
/// attempting the compressed line-subindex form) rather than load-bearing.
pub fn max_compressed_size(n: usize) -> usize {
    n + n / 255 + 64
}

/// Compress `input` in a single call. Used for the line-subindex and for
/// the (optionally compressed) index section.
pub fn compress_one_shot(input: &[u8], level: i32) -> Result<Vec<u8>, CodecError> {
    zstd::bulk::compress(input, level)
        .map_err(|e| CodecError::Compression(e.to_string()))
}

/// Decompress `input`, which is known to expand to exactly
/// `decompressed_len` bytes.
pub fn decompress_one_shot(input: &[u8], decompressed_len: usize) -> Result<Vec<u8>, CodecError> {
    zstd::bulk::decompress(input, decompressed_len)
        .map_err(|e| CodecError::Decompression(e.to_string()))
}

/// Byte-counting adapter so `stream_compress_to_file` can report how many
/// compressed bytes it actually wrote without requiring the sink to be
/// `Seek`.
struct CountingWriter<W> {
    inner: W,
    count: u64,
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n as u64;
        Ok(n)
    }
    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Initialize a fresh compressor context, feed `input` through it in full,
/// emit end-of-stream, and flush everything to `sink`.
///
/// Returns the number of compressed bytes written. This is the streaming
/// path used for block content (as opposed to `compress_one_shot`, used
/// only for the small line-subindex).
pub fn stream_compress_to_file<W: Write>(
    input: &[u8],
    sink: W,
    level: i32,
) -> Result<u64, CodecError> {
    let counting = CountingWriter { inner: sink, count: 0 };
    let mut encoder = zstd::stream::write::Encoder::new(counting, level)
        .map_err(|e| CodecError::Compression(e.to_string()))?;

    encoder.write_all(input)
        .map_err(|e| CodecError::Compression(e.to_string()))?;

    // `finish()` flushes remaining compressed output and ends the frame;
    // it only returns once every trailing byte has reached `sink`.
    let counting = encoder.finish()
        .map_err(|e| CodecError::Compression(e.to_string()))?;

    Ok(counting.count)
}

/// Initialize a fresh decompressor context, read exactly `compressed_len`
/// bytes from `source`, discard the first `skip_prefix` decompressed
/// bytes, then fill `output` with the next `output.len()` decompressed
/// bytes. Any further decompressed bytes are discarded.
///
/// Returns the number of bytes actually written into `output` (less than
/// `output.len()` only if the stream ran out first).
pub fn stream_decompress_from_file<R: Read>(
    source: R,
    compressed_len: u64,
    skip_prefix: u64,
    output: &mut [u8],
) -> Result<usize, CodecError> {
    let bounded = source.take(compressed_len);
    let mut decoder = zstd::stream::read::Decoder::new(bounded)
        .map_err(|e| CodecError::Decompression(e.to_string()))?;

    skip_exact(&mut decoder, skip_prefix)?;

    let mut written = 0usize;
    while written < output.len() {
        let n = decoder.read(&mut output[written..])
            .map_err(|e| CodecError::Decompression(e.to_string()))?;
        if n == 0 {
            break;
        }
        written += n;
    }
    Ok(written)
}

/// Read and discard exactly `n` bytes from `r`, used to implement
/// `skip_prefix` without materializing the skipped region.
fn skip_exact<R: Read>(r: &mut R, mut n: u64) -> Result<(), CodecError> {
    let mut scratch = [0u8; 8192];
    while n > 0 {
        let chunk = scratch.len().min(n as usize);
        let read = r.read(&mut scratch[..chunk])
            .map_err(|e| CodecError::Decompression(e.to_string()))?;
        if read == 0 {
            return Err(CodecError::ShortRead { expected: chunk, got: 0 });
        }
        n -= read as u64;
    }
    Ok(())
}

/// zstd decoders need `BufRead`; `stream_decompress_from_file` wraps
/// non-buffered readers (e.g. a bare `File`) automatically.
pub fn stream_decompress_from_reader<R: Read>(
    source: R,
    compressed_len: u64,
    skip_prefix: u64,
    output: &mut [u8],
) -> Result<usize, CodecError> {
    stream_decompress_from_file(BufReader::new(source), compressed_len, skip_prefix, output)
}

/// Raised when a header names an algorithm identifier this build does not
/// implement. Kept distinct from `CodecError` because it is a *format*
/// problem (wrong identifier string), not a codec runtime failure.
#[derive(Error, Debug)]
#[error("unknown compression algorithm identifier {0:?} (this build only implements {ALGORITHM_ID:?})")]
pub struct UnknownAlgorithm(pub String);

pub fn check_algorithm(id: &str) -> Result<(), UnknownAlgorithm> {
    if id == ALGORITHM_ID {
        Ok(())
    } else {
        Err(UnknownAlgorithm(id.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_shot_round_trip() {
        let data = b"the quick brown fox jumps over the lazy dog".repeat(50);
        let compressed = compress_one_shot(&data, DEFAULT_LEVEL).unwrap();
        let decompressed = decompress_one_shot(&compressed, data.len()).unwrap();
        assert_eq!(decompressed, data);
    }

    #[test]
    fn stream_round_trip() {
        let data = b"ACGTACGTACGTACGTACGT".repeat(1000);
        let mut sink = Vec::new();
        let written = stream_compress_to_file(&data, &mut sink, DEFAULT_LEVEL).unwrap();
        assert_eq!(written as usize, sink.len());

        let mut out = vec![0u8; data.len()];
        let n = stream_decompress_from_reader(&sink[..], sink.len() as u64, 0, &mut out).unwrap();
        assert_eq!(n, data.len());
        assert_eq!(out, data);
    }

    #[test]
    fn stream_skip_prefix() {
        let data = b"0123456789abcdefghij".to_vec();
        let mut sink = Vec::new();
        stream_compress_to_file(&data, &mut sink, DEFAULT_LEVEL).unwrap();

        let mut out = vec![0u8; 5];
        let n = stream_decompress_from_reader(&sink[..], sink.len() as u64, 10, &mut out).unwrap();
        assert_eq!(n, 5);
        assert_eq!(&out, b"abcde");
    }

    #[test]
    fn algorithm_check() {
        assert!(check_algorithm(ALGORITHM_ID).is_ok());
        assert!(check_algorithm("bzip2").is_err());
    }
}
