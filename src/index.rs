//! Copy-on-write routing index: `routingName -> (ordered binding array,
//! rotating cursor)`.
//!
//! The route path is read-heavy — every message, every session — while
//! add/remove is rare (a management or cluster-topology thread). Readers
//! load an immutable array via an atomic pointer swap and take no locks;
//! writers build a new array by copy-on-write and publish it atomically.
//! The cursor is a separately-allocated atomic cell so it survives array
//! replacement for the same routing name.

use crate::binding::BindingRef;
use arc_swap::ArcSwap;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// One routing group: the bindings sharing a routing name, plus the
/// round-robin cursor for that group.
#[derive(Debug)]
pub struct RoutingGroup {
    bindings: ArcSwap<Vec<BindingRef>>,
    /// Next-to-try position. Readers perform `cursor % len` themselves — a
    /// cursor left pointing past the end after a shrink is simply wrapped on
    /// next use, never reset eagerly.
    cursor: AtomicU32,
}

impl RoutingGroup {
    fn empty() -> Self {
        Self {
            bindings: ArcSwap::from_pointee(Vec::new()),
            cursor: AtomicU32::new(0),
        }
    }

    /// Current immutable snapshot of this group's bindings.
    #[must_use]
    pub fn bindings(&self) -> Arc<Vec<BindingRef>> {
        self.bindings.load_full()
    }

    /// The shared cursor cell for round-robin advancement.
    #[must_use]
    pub fn cursor(&self) -> &AtomicU32 {
        &self.cursor
    }
}

/// Mapping from routing name to `(Binding[], Cursor)`, with wait-free reads
/// and copy-on-write, per-key-serialized writes.
#[derive(Debug, Default)]
pub struct CopyOnWriteRoutingIndex {
    groups: DashMap<String, Arc<RoutingGroup>>,
}

impl CopyOnWriteRoutingIndex {
    /// An empty index.
    #[must_use]
    pub fn new() -> Self {
        Self {
            groups: DashMap::new(),
        }
    }

    /// Look up the group for `routing_name`, if any bindings are registered
    /// under it.
    #[must_use]
    pub fn get(&self, routing_name: &str) -> Option<Arc<RoutingGroup>> {
        self.groups.get(routing_name).map(|g| Arc::clone(&g))
    }

    /// Insert `binding` into the group for `routing_name`, creating the group
    /// (with a fresh cursor at 0) if it doesn't exist yet. A binding already
    /// present by unique name is left untouched (insertion is idempotent).
    pub fn add_if_absent(&self, routing_name: &str, binding: BindingRef) {
        let group = self
            .groups
            .entry(routing_name.to_string())
            .or_insert_with(|| Arc::new(RoutingGroup::empty()));

        let current = group.bindings.load();
        if current.iter().any(|b| b.unique_name() == binding.unique_name()) {
            return;
        }

        let mut next = Vec::with_capacity(current.len() + 1);
        next.extend(current.iter().cloned());
        next.push(binding);
        group.bindings.store(Arc::new(next));
    }

    /// Remove the binding named `unique_name` from the group for
    /// `routing_name`. Returns the removed binding, if found. Order of the
    /// remainder is preserved. Removes the group entirely once its array
    /// becomes empty.
    ///
    /// Holds the map's per-key write guard across the load-modify-store, so
    /// two concurrent removals from the same group serialize instead of
    /// racing their stores (matching `add_if_absent`'s serialization via
    /// `entry`).
    pub fn remove(&self, routing_name: &str, unique_name: &str) -> Option<BindingRef> {
        let group = self.groups.get_mut(routing_name)?;
        let current = group.bindings.load();

        let pos = current.iter().position(|b| b.unique_name() == unique_name)?;
        let removed = current[pos].clone();

        let mut next = Vec::with_capacity(current.len() - 1);
        next.extend(current.iter().take(pos).cloned());
        next.extend(current.iter().skip(pos + 1).cloned());

        let now_empty = next.is_empty();
        group.bindings.store(Arc::new(next));
        drop(group);

        if now_empty {
            self.groups.remove(routing_name);
        }

        Some(removed)
    }

    /// Visit every routing group once, in unspecified order.
    pub fn for_each_bindings(&self, mut f: impl FnMut(&str, &Arc<RoutingGroup>)) {
        for entry in self.groups.iter() {
            f(entry.key(), entry.value());
        }
    }

    /// True if there are no routing groups at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Debug/test-only snapshot: routing name -> ordered unique names.
    #[must_use]
    pub fn copy_as_map(&self) -> std::collections::BTreeMap<String, Vec<String>> {
        let mut out = std::collections::BTreeMap::new();
        for entry in self.groups.iter() {
            let names = entry
                .value()
                .bindings()
                .iter()
                .map(|b| b.unique_name().to_string())
                .collect();
            out.insert(entry.key().clone(), names);
        }
        out
    }
}
