//! Process-wide monotonic version counter.
//!
//! A single global counter, shared by every [`crate::table::BindingsTable`]
//! in the process, so a [`crate::context::RoutingContext`] that happens to
//! pass between two tables can never observe the same version number meaning
//! two different topologies. Overflow wraps and is tolerated — the value is
//! only ever compared for equality, never ordered.

use std::sync::atomic::{AtomicU32, Ordering};

static VERSION: AtomicU32 = AtomicU32::new(0);

/// Produce a version number never previously returned by this process
/// (modulo the 2^32 wraparound, which is an accepted trade-off).
pub fn next_version() -> u32 {
    VERSION.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
}
