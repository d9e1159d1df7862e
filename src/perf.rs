//! Ambient concurrency helper: per-thread parallel line sampling.
//!
//! §5 is explicit that one [`crate::store::Store`] is single-threaded and
//! that parallel readers must each open their own handle on the same file.
//! This mirrors `sixcy::perf::compress_chunks_parallel`
//! (`examples/byte271-6cy/src/perf.rs`): an optional `rayon`-gated helper
//! that fans independent work out across threads without sharing mutable
//! state, falling back to sequential execution when the `parallel` feature
//! is off.

use crate::error::Result;
use crate::store::Store;

/// Open one read-only [`Store`] per thread against `path` and fetch
/// `indices` concurrently, returning the sampled lines in the same order
/// as `indices`. `threads` is advisory — with the `parallel` feature
/// enabled, Rayon's global pool sizes itself; without it, the argument is
/// ignored and sampling runs sequentially on the calling thread.
///
/// A `None` entry in the result marks an out-of-range index (§7 sentinel
/// semantics), not a failure of the whole call.
#[cfg(feature = "parallel")]
pub fn sample_lines_parallel(
    path: &str,
    indices: &[u64],
    threads: Option<usize>,
) -> Result<Vec<Option<Vec<u8>>>> {
    use rayon::prelude::*;
    use rayon::ThreadPoolBuilder;

    let pool = match threads {
        Some(n) => ThreadPoolBuilder::new().num_threads(n).build().ok(),
        None => None,
    };

    let run = || -> Result<Vec<Option<Vec<u8>>>> {
        indices
            .par_iter()
            .map(|&index| {
                let mut store = Store::open(path)?;
                store.get_line(index)
            })
            .collect()
    };

    match pool {
        Some(pool) => pool.install(run),
        None => run(),
    }
}

#[cfg(not(feature = "parallel"))]
pub fn sample_lines_parallel(
    path: &str,
    indices: &[u64],
    _threads: Option<usize>,
) -> Result<Vec<Option<Vec<u8>>>> {
    indices
        .iter()
        .map(|&index| {
            let mut store = Store::open(path)?;
            store.get_line(index)
        })
        .collect()
}
