//! Block Index (§4.B) — [`BlockDescriptor`] array plus the [`FirstLineTable`].
//!
//! The in-band flag-in-a-length-field trick (§9) is confined here:
//! `compressed_length_and_flag` packs the subindex-compressed bit into the
//! top bit of an otherwise-63-bit length, the same pattern
//! `sixcy::block::BlockHeader::flags` uses a dedicated field for — zlines'
//! wire format has no room for a dedicated flags field on a 24-byte
//! descriptor, so the accessor pair `compressed_length()` /
//! `has_compressed_subindex()` keeps the bit trick out of every call site.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

use crate::line_position::LINE_POSITION_SIZE;

/// On-disk size of one `BlockDescriptor` record: three LE u64 fields.
pub const BLOCK_DESCRIPTOR_SIZE: usize = 24;

/// Top bit of `compressed_length_and_flag` marks a compressed line-subindex.
const SUBINDEX_COMPRESSED_BIT: u64 = 1 << 63;
const LENGTH_MASK: u64 = !SUBINDEX_COMPRESSED_BIT;

/// Descriptor of one compressed block on disk (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockDescriptor {
    /// Byte offset from the start of the file to this block's line-subindex
    /// (if it has one) or to its compressed content otherwise.
    pub file_offset: u64,
    compressed_length_and_flag: u64,
    pub decompressed_length: u64,
}

impl BlockDescriptor {
    pub fn new(
        file_offset: u64,
        compressed_length: u64,
        decompressed_length: u64,
        subindex_compressed: bool,
    ) -> Self {
        assert!(
            compressed_length & SUBINDEX_COMPRESSED_BIT == 0,
            "compressed_length {compressed_length} does not fit in 63 bits"
        );
        let flag = if subindex_compressed { SUBINDEX_COMPRESSED_BIT } else { 0 };
        Self {
            file_offset,
            compressed_length_and_flag: compressed_length | flag,
            decompressed_length,
        }
    }

    #[inline]
    pub fn compressed_length(&self) -> u64 {
        self.compressed_length_and_flag & LENGTH_MASK
    }

    #[inline]
    pub fn has_compressed_subindex(&self) -> bool {
        self.compressed_length_and_flag & SUBINDEX_COMPRESSED_BIT != 0
    }

    pub fn write<W: Write>(&self, mut w: W) -> io::Result<()> {
        w.write_u64::<LittleEndian>(self.file_offset)?;
        w.write_u64::<LittleEndian>(self.compressed_length_and_flag)?;
        w.write_u64::<LittleEndian>(self.decompressed_length)?;
        Ok(())
    }

    pub fn read<R: Read>(mut r: R) -> io::Result<Self> {
        let file_offset = r.read_u64::<LittleEndian>()?;
        let compressed_length_and_flag = r.read_u64::<LittleEndian>()?;
        let decompressed_length = r.read_u64::<LittleEndian>()?;
        Ok(Self { file_offset, compressed_length_and_flag, decompressed_length })
    }
}

/// The block index: descriptors plus the first-line table, owned by the
/// store for the lifetime of the file (§4.B, §9 "Open question" — this
/// crate implements only the N−1-entry convention).
#[derive(Debug, Default, Clone)]
pub struct BlockIndex {
    pub descriptors: Vec<BlockDescriptor>,
    /// `first_line_of[i]` is the ordinal index of the first line in
    /// `descriptors[i + 1]`. Length is always `descriptors.len().saturating_sub(1)`.
    pub first_line_of: Vec<u64>,
}

impl BlockIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn block_count(&self) -> usize {
        self.descriptors.len()
    }

    /// Record a newly flushed block. `first_line_of_new_block` is the
    /// ordinal index of the first line living in this block; it is only
    /// recorded (appended to `first_line_of`) for every block after the
    /// first — block 0 implicitly starts at line 0.
    pub fn push_block(&mut self, descriptor: BlockDescriptor, first_line_of_new_block: u64) {
        if !self.descriptors.is_empty() {
            self.first_line_of.push(first_line_of_new_block);
        }
        self.descriptors.push(descriptor);
    }

    /// Find the block owning ordinal line `line_index`, per §4.B:
    /// `first_line_of[b-1] <= L < first_line_of[b]`.
    ///
    /// Returns `None` if `line_index` is not covered by any known block
    /// (including the case where the index is empty).
    pub fn locate(&self, line_index: u64) -> Option<usize> {
        if self.descriptors.is_empty() {
            return None;
        }
        // first_line_of is strictly increasing; binary search for the
        // first entry strictly greater than line_index. That entry's
        // position (0-based within first_line_of) is block (pos + 1);
        // if none is greater, the line lives in the last block.
        let pos = self.first_line_of.partition_point(|&first| first <= line_index);
        Some(pos)
    }

    /// First line index contained in block `b` (0 for block 0).
    pub fn first_line_of_block(&self, b: usize) -> u64 {
        if b == 0 { 0 } else { self.first_line_of[b - 1] }
    }

    /// Number of lines contained in block `b`. `total_flushed_lines` bounds
    /// the last block and must be the count of lines actually flushed into
    /// this index — callers mid-write (a Write Block may hold newer,
    /// unflushed lines) must pass the flushed count, not the store's
    /// overall `line_count`, or this over-counts the last block.
    pub fn line_count_of_block(&self, b: usize, total_flushed_lines: u64) -> u64 {
        let first = self.first_line_of_block(b);
        let next = if b + 1 < self.block_count() {
            self.first_line_of_block(b + 1)
        } else {
            total_flushed_lines
        };
        next - first
    }

    /// Validate the invariants in §3/§8: strictly increasing file_offset,
    /// contiguous layout, and a strictly increasing first-line table whose
    /// last entry is below `line_count`.
    pub fn validate(&self, line_count: u64, index_offset: u64) -> Result<(), String> {
        for w in self.descriptors.windows(2) {
            if w[1].file_offset <= w[0].file_offset {
                return Err(format!(
                    "block descriptors out of order: file_offset {} does not precede {}",
                    w[0].file_offset, w[1].file_offset
                ));
            }
        }
        for w in self.first_line_of.windows(2) {
            if w[1] <= w[0] {
                return Err(format!(
                    "first-line table not strictly increasing: {} then {}",
                    w[0], w[1]
                ));
            }
        }
        if let Some(&last) = self.first_line_of.last() {
            if last >= line_count {
                return Err(format!(
                    "first-line table's last entry {last} is not below line_count {line_count}"
                ));
            }
        }
        if self.first_line_of.len() + 1 != self.descriptors.len() && !self.descriptors.is_empty() {
            return Err(format!(
                "first-line table has {} entries for {} blocks (expected {})",
                self.first_line_of.len(),
                self.descriptors.len(),
                self.descriptors.len().saturating_sub(1),
            ));
        }

        // §3/§8 contiguity: file_offset[i+1] - file_offset[i] must equal
        // line_subindex_size(i) + compressed_length(i) (index_offset plays
        // the role of file_offset[N] for the last block, except that §4.E
        // pads the data section to an 8-byte boundary right before the
        // index, so the last block's gap to index_offset may exceed the
        // exact figure by up to 7 padding bytes). The exact
        // compressed-subindex size lives on disk, not in the descriptor,
        // so a compressed subindex can only be checked for the minimum
        // 8-byte length prefix; a raw subindex has a fully known size and
        // is checked exactly (modulo trailing padding on the last block).
        const MAX_ALIGN_PADDING: u64 = 7;
        let last = self.descriptors.len().saturating_sub(1);
        for (i, d) in self.descriptors.iter().enumerate() {
            let is_last = i == last;
            let next_offset = if i + 1 < self.descriptors.len() {
                self.descriptors[i + 1].file_offset
            } else {
                index_offset
            };
            let span = next_offset.checked_sub(d.file_offset).ok_or_else(|| {
                format!("block {i}: index_offset/next file_offset {next_offset} precedes its own file_offset {}", d.file_offset)
            })?;
            let content_len = d.compressed_length();
            let subindex_bytes = span.checked_sub(content_len).ok_or_else(|| {
                format!("block {i}: span {span} bytes is smaller than its compressed content length {content_len}")
            })?;
            if d.has_compressed_subindex() {
                if subindex_bytes < 8 {
                    return Err(format!(
                        "block {i}: compressed line-subindex region is {subindex_bytes} bytes, too small for the 8-byte length prefix"
                    ));
                }
            } else {
                let lines_in_block = self.line_count_of_block(i, line_count);
                let expected = lines_in_block * LINE_POSITION_SIZE as u64;
                let padding = subindex_bytes.checked_sub(expected).ok_or_else(|| {
                    format!("block {i}: raw line-subindex region is {subindex_bytes} bytes, expected at least {expected} for {lines_in_block} line(s)")
                })?;
                let allowed = if is_last { MAX_ALIGN_PADDING } else { 0 };
                if padding > allowed {
                    return Err(format!(
                        "block {i}: raw line-subindex region is {subindex_bytes} bytes, expected {expected} for {lines_in_block} line(s) (plus up to {allowed} alignment padding byte(s) if last)"
                    ));
                }
            }
        }

        Ok(())
    }
}
