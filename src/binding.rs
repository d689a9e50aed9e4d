//! Binding: the attachment of a queue (local or remote) or a divert to an
//! address. The core only ever branches on [`Binding::is_local`] /
//! [`BindingKind::Remote`] — everything else about a concrete queue
//! implementation is opaque.

use crate::context::RoutingContext;
use crate::error::Result;
use crate::message::RoutableMessage;
use std::fmt;
use std::sync::Arc;

/// Load-balancing policy for a routing group.
///
/// `OFF` and `STRICT` never fall back to a lower-priority match;
/// `ON_DEMAND` and `OFF_WITH_REDISTRIBUTION` allow `redistribute` to move a
/// message a local consumer didn't accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadBalancingMode {
    /// Never route to remote-queue bindings; redistribution disabled.
    Off,
    /// Any filter-matching binding is acceptable regardless of connectedness;
    /// redistribution disabled.
    Strict,
    /// Prefer a connected, high-priority binding, falling back to a matching
    /// low-priority one (local-over-remote); redistribution enabled.
    OnDemand,
    /// Same selection semantics as `Off`, but redistribution is enabled.
    OffWithRedistribution,
}

impl LoadBalancingMode {
    /// True iff this mode allows [`crate::table::BindingsTable::redistribute`]
    /// to move an undelivered message to a peer.
    #[must_use]
    pub const fn allows_redistribute(self) -> bool {
        matches!(self, Self::OnDemand | Self::OffWithRedistribution)
    }

    /// True iff `RouteSelector::select` should reject remote-queue bindings
    /// outright.
    #[must_use]
    pub const fn excludes_remote(self) -> bool {
        matches!(self, Self::Off)
    }

    /// True iff any filter-matching binding is acceptable without regard to
    /// connectedness (no downgrade to a "low priority" fallback).
    #[must_use]
    pub const fn is_strict(self) -> bool {
        matches!(self, Self::Strict)
    }

    /// Encode for storage in an `AtomicU8` — no lock needed for a single
    /// byte, and updates become visible to readers without synchronization.
    #[must_use]
    pub(crate) const fn to_u8(self) -> u8 {
        match self {
            Self::Off => 0,
            Self::Strict => 1,
            Self::OnDemand => 2,
            Self::OffWithRedistribution => 3,
        }
    }

    /// Inverse of [`LoadBalancingMode::to_u8`]. Panics on an out-of-range
    /// byte, which would indicate memory corruption rather than bad input.
    #[must_use]
    pub(crate) const fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Off,
            1 => Self::Strict,
            2 => Self::OnDemand,
            3 => Self::OffWithRedistribution,
            _ => unreachable!(),
        }
    }
}

/// Variant tag distinguishing the queue families the core must branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    /// A queue owned by this node.
    Local,
    /// A queue owned by a cluster peer.
    Remote {
        /// The id of the queue as known on the remote node.
        remote_queue_id: u64,
        /// The load-balancing mode this remote peer advertises for its view
        /// of the address (overwrites the table's mode on `add`; see
        /// DESIGN.md for the reconciliation rule).
        advertised_mode: LoadBalancingMode,
    },
    /// A divert: forwards without itself holding messages.
    Divert,
}

impl BindingKind {
    /// True for [`BindingKind::Remote`].
    #[must_use]
    pub const fn is_remote(&self) -> bool {
        matches!(self, Self::Remote { .. })
    }
}

/// An opaque predicate over a message, evaluated by the selector and by
/// exclusive/grouped/simple routing alike.
pub trait Filter: Send + Sync + fmt::Debug {
    /// True if `msg` satisfies this filter.
    fn matches(&self, msg: &dyn RoutableMessage) -> bool;
}

/// A binding attached to an address. Implemented by the queue/divert types
/// the post-office owns; the routing core never constructs one itself.
pub trait Binding: Send + Sync + fmt::Debug {
    /// 64-bit id, unique within the table, stable for the binding's life.
    fn id(&self) -> u64;

    /// Opaque string, globally unique among bindings of this table.
    fn unique_name(&self) -> &str;

    /// Grouping key; bindings sharing a routing name load-balance together.
    fn routing_name(&self) -> &str;

    /// Stable cluster-wide identifier, used only by grouping.
    fn cluster_name(&self) -> &str;

    /// Optional predicate over inbound messages.
    fn filter(&self) -> Option<&(dyn Filter)>;

    /// Exclusive bindings receive every matching message and preempt normal
    /// routing.
    fn is_exclusive(&self) -> bool;

    /// True for a binding owned by this node.
    fn is_local(&self) -> bool;

    /// True if this binding currently has an accepting consumer attached at
    /// the transport level (independent of message content).
    fn is_connected(&self) -> bool;

    /// True if this binding would currently accept `msg` with high priority
    /// (i.e. has a consumer ready to take it right now). Used by the
    /// selector's priority test and by `redistribute`'s peer scan.
    fn is_high_accept_priority(&self, msg: &dyn RoutableMessage) -> bool;

    /// Variant tag for the local/remote/divert distinction.
    fn kind(&self) -> BindingKind;

    /// Deliver `msg` to this binding, recording the decision in `ctx`.
    ///
    /// # Errors
    /// Propagates whatever the downstream queue implementation returns;
    /// the core never maps or suppresses these errors.
    fn route(&self, msg: &mut dyn RoutableMessage, ctx: &mut dyn RoutingContext) -> Result<()>;

    /// Like [`Binding::route`], but requests an acknowledging delivery
    /// variant (used for ids listed in `HDR_ROUTE_TO_ACK_IDS`).
    ///
    /// # Errors
    /// Same contract as [`Binding::route`].
    fn route_with_ack(
        &self,
        msg: &mut dyn RoutableMessage,
        ctx: &mut dyn RoutingContext,
    ) -> Result<()>;

    /// Notify this binding that a grouping proposal for `group_id` has been
    /// cleared.
    fn unproposed(&self, group_id: &str);
}

/// Convenience alias used throughout the table for a shared, trait-object
/// binding handle.
pub type BindingRef = Arc<dyn Binding>;
