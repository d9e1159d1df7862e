//! Progress reporting (§9) — pushed out as an explicit callback instead of
//! a module-global counter, the same way `sixcy::recovery::scan` takes a
//! `ProgressFn` rather than logging each block it scans.

/// Invoked at the implementer's discretion during a long write, with the
/// running total of lines and content bytes appended so far.
pub type ProgressFn = dyn FnMut(u64, u64) + Send;
