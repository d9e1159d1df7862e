//! # zlines — block-compressed random-access line store
//!
//! Format guarantees (frozen in v2.0):
//! - All numeric fields are little-endian; never negotiated
//! - The header is a fixed 256-byte ASCII block at offset 0, rewritten in
//!   full on `close`
//! - Codec identity is a frozen bytestring (`alg fzstd`); readers must
//!   reject any other identifier, there is no multi-codec negotiation
//! - Every line lives entirely in one block; a line-subindex precedes each
//!   block's compressed content and may itself be compressed, signaled by
//!   a bit packed into the block descriptor's length field
//! - A store is write-once: `append_line` is only valid before `close`,
//!   and `close` is mandatory — without it the index is never written and
//!   the file is unreadable

pub mod block_index;
pub mod codec;
pub mod error;
pub mod layout;
pub mod line_position;
pub mod perf;
pub mod progress;
pub mod read_block;
pub mod store;
pub mod write_block;

// Flat re-exports for the most common types.
pub use block_index::{BlockDescriptor, BlockIndex, BLOCK_DESCRIPTOR_SIZE};
pub use codec::{CodecError, ALGORITHM_ID};
pub use error::{Result, StoreMode, ZlineError};
pub use line_position::{LinePosition, LINE_POSITION_SIZE};
pub use perf::sample_lines_parallel;
pub use progress::ProgressFn;
pub use store::{Store, StoreOptions, DEFAULT_BLOCK_CAPACITY, MAX_BLOCK_CAPACITY};
