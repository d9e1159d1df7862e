//! [`LinePosition`] — the line-subindex record type (§3).
//!
//! Fixed 16-byte on-disk record, two little-endian u64 fields, matching
//! the explicit-field-packing style `sixcy::block::BlockHeader` uses for
//! its own header (`examples/byte271-6cy/src/block.rs`), scaled down to
//! the two fields the spec actually needs.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

/// On-disk size of one `LinePosition` record.
pub const LINE_POSITION_SIZE: usize = 16;

/// Describes one line's placement within its owning block's decompressed
/// content buffer.
///
/// Invariant (§3): `offset_in_block + length <= block.decompressed_length`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LinePosition {
    pub offset_in_block: u64,
    pub length: u64,
}

impl LinePosition {
    pub fn new(offset_in_block: u64, length: u64) -> Self {
        Self { offset_in_block, length }
    }

    pub fn end(&self) -> u64 {
        self.offset_in_block + self.length
    }

    pub fn write<W: Write>(&self, mut w: W) -> io::Result<()> {
        w.write_u64::<LittleEndian>(self.offset_in_block)?;
        w.write_u64::<LittleEndian>(self.length)?;
        Ok(())
    }

    pub fn read<R: Read>(mut r: R) -> io::Result<Self> {
        let offset_in_block = r.read_u64::<LittleEndian>()?;
        let length = r.read_u64::<LittleEndian>()?;
        Ok(Self { offset_in_block, length })
    }
}

/// Serialize a full line-subindex (one block's worth of `LinePosition`
/// records, in line order) to its raw 16-bytes-per-record form.
pub fn encode_subindex(positions: &[LinePosition]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(positions.len() * LINE_POSITION_SIZE);
    for p in positions {
        p.write(&mut buf).expect("writing to a Vec<u8> cannot fail");
    }
    buf
}

/// Parse `count` `LinePosition` records out of a raw (already decompressed
/// if necessary) subindex buffer.
pub fn decode_subindex(buf: &[u8], count: usize) -> io::Result<Vec<LinePosition>> {
    if buf.len() < count * LINE_POSITION_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!(
                "line-subindex too short: need {} bytes for {count} records, got {}",
                count * LINE_POSITION_SIZE,
                buf.len()
            ),
        ));
    }
    let mut cursor = buf;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        out.push(LinePosition::read(&mut cursor)?);
    }
    Ok(out)
}
