//! File Layout Manager (§4.E) — the on-disk byte layout: header, padding,
//! and index-section (de)serialization.
//!
//! The header here is ASCII text, not `sixcy::superblock::Superblock`'s
//! packed binary fields — the spec fixes it that way (§6) — but the shape
//! carries over directly: a fixed-size block at offset 0, written as a
//! placeholder at create time and rewritten in full on close
//! (`examples/byte271-6cy/src/superblock.rs`), parsed strictly (any
//! deviation is a hard `FormatError`, never a best-effort recovery).

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

use crate::block_index::{BlockDescriptor, BlockIndex, BLOCK_DESCRIPTOR_SIZE};
use crate::codec::{self, ALGORITHM_ID};
use crate::error::ZlineError;

/// Fixed on-disk header size (§6).
pub const HEADER_SIZE: usize = 256;

/// Data section always starts immediately after the header.
pub const DATA_SECTION_OFFSET: u64 = HEADER_SIZE as u64;

const VERSION_LINE: &str = "zline v2.0";

/// Parsed form of the 256-byte header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub data_offset: u64,
    pub index_offset: u64,
    pub lines: u64,
    pub blocks: u64,
    pub maxlen: u64,
    pub algorithm: String,
    pub index_compressed: bool,
    /// Configured write-time block content capacity. Not part of the
    /// spec's minimal field list but within its "implementations may add
    /// fields" latitude (§6 header parsing tolerates unknown keys); used on
    /// open to size Read Block and to recognize over-size single-line
    /// blocks without guessing (§4.H).
    pub capacity: u64,
}

impl Header {
    /// The header written immediately after `create` truncates the file,
    /// before anything else is known (§4.F create flow step 2). Rewritten
    /// in full by `write` once real values are known, at `close`.
    pub fn placeholder(capacity: u64) -> Self {
        Self {
            data_offset: DATA_SECTION_OFFSET,
            index_offset: 0,
            lines: 0,
            blocks: 0,
            maxlen: 0,
            algorithm: ALGORITHM_ID.to_owned(),
            index_compressed: false,
            capacity,
        }
    }

    /// Render and write exactly `HEADER_SIZE` bytes: ASCII sub-lines,
    /// a blank-line terminator, then space padding ending in a final `\n`.
    pub fn write<W: Write>(&self, mut w: W) -> io::Result<()> {
        let mut body = String::new();
        body.push_str(VERSION_LINE);
        body.push('\n');
        body.push_str(&format!("data_offset {}\n", self.data_offset));
        body.push_str(&format!("index_offset {}\n", self.index_offset));
        body.push_str(&format!("lines {}\n", self.lines));
        body.push_str(&format!("blocks {}\n", self.blocks));
        body.push_str(&format!("maxlen {}\n", self.maxlen));
        body.push_str(&format!("alg {}\n", self.algorithm));
        body.push_str(&format!("capacity {}\n", self.capacity));
        if self.index_compressed {
            body.push_str("zi\n");
        }
        body.push('\n');

        assert!(
            body.len() < HEADER_SIZE,
            "header body {} bytes does not leave room for padding in a {}-byte header",
            body.len(),
            HEADER_SIZE
        );
        let mut bytes = body.into_bytes();
        // Pad with spaces, final byte must be '\n'.
        bytes.resize(HEADER_SIZE - 1, b' ');
        bytes.push(b'\n');
        w.write_all(&bytes)
    }

    /// Parse a header, rejecting anything that doesn't match §6 exactly
    /// enough to be trusted (unknown fields are tolerated; missing
    /// required fields or a bad version line are not).
    pub fn read<R: Read>(mut r: R, path: &str) -> Result<Self, ZlineError> {
        let mut buf = [0u8; HEADER_SIZE];
        r.read_exact(&mut buf)
            .map_err(|e| ZlineError::io(path, e))?;
        let text = std::str::from_utf8(&buf)
            .map_err(|_| ZlineError::format(path, "header is not valid UTF-8"))?;

        let mut lines = text.split('\n');
        let version = lines
            .next()
            .ok_or_else(|| ZlineError::format(path, "empty header"))?;
        if version != VERSION_LINE {
            return Err(ZlineError::format(
                path,
                format!("unrecognized version line {version:?}"),
            ));
        }

        let mut data_offset = None;
        let mut index_offset = None;
        let mut lines_field = None;
        let mut blocks_field = None;
        let mut maxlen = None;
        let mut algorithm = None;
        let mut capacity = None;
        let mut index_compressed = false;

        for line in lines {
            if line.is_empty() {
                break; // blank line ends the header
            }
            if line == "zi" {
                index_compressed = true;
                continue;
            }
            let (key, value) = line.split_once(' ').ok_or_else(|| {
                ZlineError::format(path, format!("malformed header line {line:?}"))
            })?;
            match key {
                "data_offset" => data_offset = Some(parse_u64(path, value)?),
                "index_offset" => index_offset = Some(parse_u64(path, value)?),
                "lines" => lines_field = Some(parse_u64(path, value)?),
                "blocks" => blocks_field = Some(parse_u64(path, value)?),
                "maxlen" => maxlen = Some(parse_u64(path, value)?),
                "alg" => algorithm = Some(value.to_owned()),
                "capacity" => capacity = Some(parse_u64(path, value)?),
                _ => {} // forward-compatible: unknown fields are ignored
            }
        }

        let algorithm = algorithm
            .ok_or_else(|| ZlineError::format(path, "header missing 'alg' field"))?;
        codec::check_algorithm(&algorithm)
            .map_err(|e| ZlineError::format(path, e.to_string()))?;

        Ok(Header {
            data_offset: data_offset
                .ok_or_else(|| ZlineError::format(path, "header missing 'data_offset' field"))?,
            index_offset: index_offset
                .ok_or_else(|| ZlineError::format(path, "header missing 'index_offset' field"))?,
            lines: lines_field
                .ok_or_else(|| ZlineError::format(path, "header missing 'lines' field"))?,
            blocks: blocks_field
                .ok_or_else(|| ZlineError::format(path, "header missing 'blocks' field"))?,
            maxlen: maxlen.ok_or_else(|| ZlineError::format(path, "header missing 'maxlen' field"))?,
            algorithm,
            index_compressed,
            capacity: capacity
                .ok_or_else(|| ZlineError::format(path, "header missing 'capacity' field"))?,
        })
    }
}

fn parse_u64(path: &str, value: &str) -> Result<u64, ZlineError> {
    value
        .trim()
        .parse()
        .map_err(|_| ZlineError::format(path, format!("expected a decimal integer, got {value:?}")))
}

/// Bytes of `\0`-free alignment padding needed at `pos` to reach the next
/// 8-byte boundary (§4.E "Before the index, the data section is padded to
/// 8-byte alignment").
pub fn align_padding(pos: u64) -> u64 {
    let rem = pos % 8;
    if rem == 0 { 0 } else { 8 - rem }
}

/// Serialize the index section: descriptor array then first-line table,
/// each one-shot-compressed (with an 8-byte length prefix apiece) iff
/// `compress` is set, raw otherwise.
pub fn write_index<W: Write>(
    mut w: W,
    index: &BlockIndex,
    compress: bool,
    level: i32,
) -> Result<(), ZlineError> {
    let mut descriptor_bytes = Vec::with_capacity(index.descriptors.len() * BLOCK_DESCRIPTOR_SIZE);
    for d in &index.descriptors {
        d.write(&mut descriptor_bytes).map_err(|e| ZlineError::io("<index>", e))?;
    }
    let mut first_line_bytes = Vec::with_capacity(index.first_line_of.len() * 8);
    for &f in &index.first_line_of {
        first_line_bytes
            .write_u64::<LittleEndian>(f)
            .map_err(|e| ZlineError::io("<index>", e))?;
    }

    if compress {
        let compressed_descriptors = codec::compress_one_shot(&descriptor_bytes, level)?;
        let compressed_first_line = codec::compress_one_shot(&first_line_bytes, level)?;
        w.write_u64::<LittleEndian>(compressed_descriptors.len() as u64)
            .map_err(|e| ZlineError::io("<index>", e))?;
        w.write_u64::<LittleEndian>(compressed_first_line.len() as u64)
            .map_err(|e| ZlineError::io("<index>", e))?;
        w.write_all(&compressed_descriptors).map_err(|e| ZlineError::io("<index>", e))?;
        w.write_all(&compressed_first_line).map_err(|e| ZlineError::io("<index>", e))?;
    } else {
        w.write_all(&descriptor_bytes).map_err(|e| ZlineError::io("<index>", e))?;
        w.write_all(&first_line_bytes).map_err(|e| ZlineError::io("<index>", e))?;
    }
    Ok(())
}

/// Parse the index section back into a [`BlockIndex`]. `block_count` and
/// `compressed` come from the header.
pub fn read_index<R: Read>(
    mut r: R,
    block_count: u64,
    compressed: bool,
    path: &str,
) -> Result<BlockIndex, ZlineError> {
    let block_count = block_count as usize;
    let first_line_count = block_count.saturating_sub(1);

    let (descriptor_bytes, first_line_bytes) = if compressed {
        let descriptors_len = r.read_u64::<LittleEndian>().map_err(|e| ZlineError::io(path, e))?;
        let first_line_len = r.read_u64::<LittleEndian>().map_err(|e| ZlineError::io(path, e))?;

        let mut compressed_descriptors = vec![0u8; descriptors_len as usize];
        r.read_exact(&mut compressed_descriptors).map_err(|e| ZlineError::io(path, e))?;
        let mut compressed_first_line = vec![0u8; first_line_len as usize];
        r.read_exact(&mut compressed_first_line).map_err(|e| ZlineError::io(path, e))?;

        let descriptor_bytes = codec::decompress_one_shot(
            &compressed_descriptors,
            block_count * BLOCK_DESCRIPTOR_SIZE,
        )?;
        let first_line_bytes =
            codec::decompress_one_shot(&compressed_first_line, first_line_count * 8)?;
        (descriptor_bytes, first_line_bytes)
    } else {
        let mut descriptor_bytes = vec![0u8; block_count * BLOCK_DESCRIPTOR_SIZE];
        r.read_exact(&mut descriptor_bytes).map_err(|e| ZlineError::io(path, e))?;
        let mut first_line_bytes = vec![0u8; first_line_count * 8];
        r.read_exact(&mut first_line_bytes).map_err(|e| ZlineError::io(path, e))?;
        (descriptor_bytes, first_line_bytes)
    };

    let mut descriptors = Vec::with_capacity(block_count);
    let mut cursor = &descriptor_bytes[..];
    for _ in 0..block_count {
        descriptors.push(
            BlockDescriptor::read(&mut cursor).map_err(|e| ZlineError::io(path, e))?,
        );
    }

    let mut first_line_of = Vec::with_capacity(first_line_count);
    let mut cursor = &first_line_bytes[..];
    for _ in 0..first_line_count {
        first_line_of.push(
            cursor
                .read_u64::<LittleEndian>()
                .map_err(|e| ZlineError::io(path, e))?,
        );
    }

    Ok(BlockIndex { descriptors, first_line_of })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block_index::BlockDescriptor;

    #[test]
    fn header_round_trips() {
        let h = Header {
            data_offset: 256,
            index_offset: 9000,
            lines: 42,
            blocks: 3,
            maxlen: 128,
            algorithm: ALGORITHM_ID.to_owned(),
            index_compressed: true,
            capacity: 4 << 20,
        };
        let mut buf = Vec::new();
        h.write(&mut buf).unwrap();
        assert_eq!(buf.len(), HEADER_SIZE);
        assert_eq!(buf[buf.len() - 1], b'\n');

        let back = Header::read(&buf[..], "test").unwrap();
        assert_eq!(h, back);
    }

    #[test]
    fn placeholder_header_is_valid_and_uncompressed() {
        let h = Header::placeholder(4 << 20);
        let mut buf = Vec::new();
        h.write(&mut buf).unwrap();
        let back = Header::read(&buf[..], "test").unwrap();
        assert!(!back.index_compressed);
        assert_eq!(back.lines, 0);
    }

    #[test]
    fn rejects_unknown_algorithm() {
        let mut h = Header::placeholder(4 << 20);
        h.algorithm = "bzip2".to_owned();
        let mut buf = Vec::new();
        h.write(&mut buf).unwrap();
        assert!(Header::read(&buf[..], "test").is_err());
    }

    #[test]
    fn rejects_bad_version_line() {
        let mut buf = vec![b' '; HEADER_SIZE];
        buf[HEADER_SIZE - 1] = b'\n';
        buf[0..4].copy_from_slice(b"nope");
        assert!(Header::read(&buf[..], "test").is_err());
    }

    #[test]
    fn align_padding_rounds_up_to_8() {
        assert_eq!(align_padding(256), 0);
        assert_eq!(align_padding(257), 7);
        assert_eq!(align_padding(264), 0);
        assert_eq!(align_padding(260), 4);
    }

    #[test]
    fn index_round_trips_uncompressed() {
        let mut index = BlockIndex::new();
        index.push_block(BlockDescriptor::new(256, 10, 16, false), 0);
        index.push_block(BlockDescriptor::new(300, 20, 16, false), 4);

        let mut buf = Vec::new();
        write_index(&mut buf, &index, false, 3).unwrap();
        let back = read_index(&buf[..], 2, false, "test").unwrap();
        assert_eq!(back.descriptors, index.descriptors);
        assert_eq!(back.first_line_of, index.first_line_of);
    }

    #[test]
    fn index_round_trips_compressed() {
        let mut index = BlockIndex::new();
        for i in 0..20u64 {
            index.push_block(BlockDescriptor::new(256 + i * 40, 20, 16, false), i.max(1) * 3);
        }

        let mut buf = Vec::new();
        write_index(&mut buf, &index, true, 3).unwrap();
        let back = read_index(&buf[..], 20, true, "test").unwrap();
        assert_eq!(back.descriptors, index.descriptors);
        assert_eq!(back.first_line_of, index.first_line_of);
    }
}
