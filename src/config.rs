//! Configuration knobs owned by the routing core itself.
//!
//! Broker-wide configuration loading (files, CLI flags, management API) is
//! an external collaborator; this struct only carries the handful of values
//! `BindingsTable` needs to construct itself, in the familiar `with_*`
//! builder style.

use crate::binding::LoadBalancingMode;

/// Maximum number of retries the Group Proposal Protocol attempts before
/// falling back to ungrouped simple routing.
pub const DEFAULT_MAX_GROUP_RETRY: u32 = 10;

/// Construction-time configuration for a [`crate::table::BindingsTable`].
#[derive(Debug, Clone, Copy)]
pub struct RoutingTableConfig {
    pub(crate) max_group_retry: u32,
    pub(crate) initial_load_balancing_mode: LoadBalancingMode,
}

impl Default for RoutingTableConfig {
    fn default() -> Self {
        Self {
            max_group_retry: DEFAULT_MAX_GROUP_RETRY,
            initial_load_balancing_mode: LoadBalancingMode::OnDemand,
        }
    }
}

impl RoutingTableConfig {
    /// Start from the defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the grouped-routing retry budget.
    #[must_use]
    pub const fn with_max_group_retry(mut self, max_group_retry: u32) -> Self {
        self.max_group_retry = max_group_retry;
        self
    }

    /// Override the load-balancing mode the table starts in.
    #[must_use]
    pub const fn with_load_balancing_mode(mut self, mode: LoadBalancingMode) -> Self {
        self.initial_load_balancing_mode = mode;
        self
    }
}
