//! Error Types
//!
//! Comprehensive error handling for all bindings-table operations.

use thiserror::Error;

/// Main error type for bindings-table operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RoutingError {
    /// `HDR_ROUTE_TO_IDS` named a binding id that is not present in the table.
    #[error("route directive references unknown binding id {id} for address {address}")]
    RouteDirectiveUnknownId { id: u64, address: String },

    /// Strict-ordered (grouped) routing exhausted `MAX_GROUP_RETRY` attempts.
    #[error(
        "grouped routing exhausted retries for group {group_id} / routing name {routing_name}"
    )]
    GroupRoutingExhausted {
        group_id: String,
        routing_name: String,
    },

    /// `GroupingHandler::propose` returned no response before its internal timeout.
    #[error("grouping proposal timed out for group {group_id} (attempt {attempt})")]
    GroupingProposalTimeout { group_id: String, attempt: u32 },
}

/// Result type alias for bindings-table operations.
pub type Result<T> = std::result::Result<T, RoutingError>;

impl RoutingError {
    /// True for conditions the core itself recovers from by falling back to a
    /// degraded routing path, rather than surfacing a hard failure to callers.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::GroupRoutingExhausted { .. } | Self::GroupingProposalTimeout { .. }
        )
    }
}
