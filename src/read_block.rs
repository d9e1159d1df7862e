//! Read Block (§4.D) — the one-block decompressed cache.
//!
//! Same shape as [`crate::write_block::WriteBlock`] plus the bookkeeping a
//! read-only view needs: how many on-disk bytes the line-subindex occupied
//! (to seek past it to reach compressed content), and the "deferred" state
//! used by the over-size-line path (§4.H).

use crate::line_position::LinePosition;

/// Sentinel "no block loaded" value, mirroring the spec's `block_index = -1`.
pub const NONE_LOADED: i64 = -1;

pub struct ReadBlock {
    pub block_index: i64,
    pub file_offset: u64,
    pub first_line_index: u64,
    pub positions: Vec<LinePosition>,
    pub content: Vec<u8>,
    /// Bytes the line-subindex occupied on disk (possibly compressed),
    /// needed to seek past it to reach the compressed content region.
    pub line_subindex_bytes_on_disk: u64,
    /// Compressed byte length of the content region. Only meaningful (and
    /// only needed) while deferred: materialized blocks decompress their
    /// content up front and never consult this again.
    pub content_compressed_length: u64,
    deferred: bool,
    content_capacity: usize,
}

impl ReadBlock {
    /// `content_capacity` should be sized to the largest decompressed
    /// block in the file (§4.F open-for-read flow), so that ordinary (not
    /// over-size) loads never reallocate.
    pub fn new(content_capacity: usize) -> Self {
        Self {
            block_index: NONE_LOADED,
            file_offset: 0,
            first_line_index: 0,
            positions: Vec::new(),
            content: Vec::with_capacity(content_capacity),
            line_subindex_bytes_on_disk: 0,
            content_compressed_length: 0,
            deferred: false,
            content_capacity,
        }
    }

    pub fn content_capacity(&self) -> usize {
        self.content_capacity
    }

    pub fn is_loaded(&self) -> bool {
        self.block_index != NONE_LOADED
    }

    pub fn holds_block(&self, block_index: usize) -> bool {
        self.is_loaded() && self.block_index as usize == block_index
    }

    /// True once loaded as the §4.H "deferred" case: metadata present,
    /// content not materialized because the block is a single over-size
    /// line. Tracked explicitly rather than inferred from `content.is_empty()`
    /// — a materialized block of all-empty lines also has empty content.
    pub fn is_deferred(&self) -> bool {
        self.is_loaded() && self.deferred
    }

    /// Populate as a fully materialized block (the common case).
    pub fn load_materialized(
        &mut self,
        block_index: usize,
        file_offset: u64,
        first_line_index: u64,
        positions: Vec<LinePosition>,
        content: Vec<u8>,
        line_subindex_bytes_on_disk: u64,
    ) {
        self.block_index = block_index as i64;
        self.file_offset = file_offset;
        self.first_line_index = first_line_index;
        self.positions = positions;
        self.content = content;
        self.line_subindex_bytes_on_disk = line_subindex_bytes_on_disk;
        self.deferred = false;
    }

    /// Populate as a deferred (over-size single-line) block: metadata only.
    pub fn load_deferred(
        &mut self,
        block_index: usize,
        file_offset: u64,
        first_line_index: u64,
        position: LinePosition,
        line_subindex_bytes_on_disk: u64,
        content_compressed_length: u64,
    ) {
        self.block_index = block_index as i64;
        self.file_offset = file_offset;
        self.first_line_index = first_line_index;
        self.positions = vec![position];
        self.content.clear();
        self.line_subindex_bytes_on_disk = line_subindex_bytes_on_disk;
        self.content_compressed_length = content_compressed_length;
        self.deferred = true;
    }

    /// Line positions are relative to the block's own `first_line_index`.
    pub fn position_for(&self, line_index: u64) -> Option<LinePosition> {
        let local = line_index.checked_sub(self.first_line_index)?;
        self.positions.get(local as usize).copied()
    }
}
