//! Routing context: the accumulator threaded through a single `route` call.
//!
//! The context records which bindings a message was actually routed to (so
//! `Binding::route`/`route_with_ack` implementations have somewhere to append
//! their result) and memoizes the table `version` a decision was made at, so
//! a later call for an unchanged topology can skip re-selection entirely.

use crate::message::RoutableMessage;

/// Accumulator passed through the routing pipeline.
///
/// `record_binding` gives bindings *some* way to append their routing
/// decision to the context they were handed, alongside the
/// `clear`/`set_reusable`/`is_reusable` reuse contract.
pub trait RoutingContext: Send {
    /// Discard any previously recorded routing decision.
    fn clear(&mut self);

    /// Record that `binding_id` received (or will receive) this message.
    fn record_binding(&mut self, binding_id: u64);

    /// Mark whether this invocation's decision may be replayed on a later
    /// call for the same message, at `version` if reusable. Once called with
    /// `false`, later calls with `true` for the same invocation must be a
    /// no-op.
    fn set_reusable(&mut self, reusable: bool, version: Option<u32>);

    /// True if this context's memoized decision is still valid for `msg` at
    /// the table's current `version`. The implementation decides how much of
    /// `msg` to consult; [`ReusableRoutingContext`] only consults `version`.
    fn is_reusable(&self, msg: &dyn RoutableMessage, version: u32) -> bool;

    /// Bindings recorded via `record_binding` since the last `clear`.
    fn routed_binding_ids(&self) -> &[u64];
}

/// A simple [`RoutingContext`] that remembers the table version its decision
/// was computed at, refusing reuse once a mutation has bumped the version.
#[derive(Debug, Default, Clone)]
pub struct ReusableRoutingContext {
    routed: Vec<u64>,
    reusable: bool,
    /// Locked once `set_reusable(false, ..)` fires for this invocation.
    locked_non_reusable: bool,
    version: Option<u32>,
}

impl ReusableRoutingContext {
    /// A fresh context with no memoized decision.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl RoutingContext for ReusableRoutingContext {
    fn clear(&mut self) {
        self.routed.clear();
        self.reusable = false;
        self.locked_non_reusable = false;
        self.version = None;
    }

    fn record_binding(&mut self, binding_id: u64) {
        self.routed.push(binding_id);
    }

    fn set_reusable(&mut self, reusable: bool, version: Option<u32>) {
        if self.locked_non_reusable {
            return;
        }
        if !reusable {
            self.locked_non_reusable = true;
            self.reusable = false;
            self.version = None;
            return;
        }
        self.reusable = true;
        self.version = version;
    }

    fn is_reusable(&self, _msg: &dyn RoutableMessage, version: u32) -> bool {
        self.reusable && self.version == Some(version)
    }

    fn routed_binding_ids(&self) -> &[u64] {
        &self.routed
    }
}
