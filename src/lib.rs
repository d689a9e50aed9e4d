//! Bindings Table
//!
//! The concurrent, versioned per-address binding registry at the heart of a
//! clustered message broker's routing layer:
//! - the top-level entity owning all registries (`table`)
//! - a copy-on-write routing-name index with wait-free reads (`index`)
//! - the priority/filter/round-robin selection algorithm (`selector`)
//! - the strict-ordering grouped-routing protocol (`grouping`)
//! - the routing-decision accumulator with reuse caching (`context`)
//! - the binding/filter/message contracts consumed from outside (`binding`,
//!   `message`)
//! - error types (`error`)
#![deny(unsafe_code)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::needless_pass_by_value)]

pub mod binding;
pub mod config;
pub mod context;
pub mod error;
pub mod grouping;
pub mod index;
pub mod message;
pub mod selector;
pub mod table;
pub mod version;

/// A small prelude to make downstream crates ergonomic. Kept minimal to avoid
/// API lock-in.
pub mod prelude {
    pub use crate::binding::{Binding, BindingKind, BindingRef, Filter, LoadBalancingMode};
    pub use crate::config::RoutingTableConfig;
    pub use crate::context::{ReusableRoutingContext, RoutingContext};
    pub use crate::error::{Result, RoutingError};
    pub use crate::grouping::{GroupingHandler, Proposal, Response};
    pub use crate::message::{Message, RoutableMessage};
    pub use crate::table::BindingsTable;
}
