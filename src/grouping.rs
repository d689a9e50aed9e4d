//! Group Proposal Protocol adapter: strict sticky routing for message-group
//! ids.
//!
//! This module resolves *one* proposal/response round for a single routing
//! group. The retry counter, the `forceRemove`/fallback decision, and
//! re-fetching the routing group after a concurrent topology change all live
//! in [`crate::table`], which is the only place with access to the live
//! [`crate::index::CopyOnWriteRoutingIndex`].

use crate::binding::{BindingRef, LoadBalancingMode};
use crate::message::RoutableMessage;
use crate::selector;
use std::sync::atomic::AtomicU32;
use std::sync::Arc;

/// A proposal for `cluster_name` to serve message-group `full_id`.
#[derive(Debug, Clone)]
pub struct Proposal {
    pub full_id: String,
    pub cluster_name: String,
}

/// The grouping handler's answer to a `getProposal`/`propose` call.
#[derive(Debug, Clone)]
pub struct Response {
    pub group_id: String,
    pub cluster_name: String,
    pub chosen_cluster_name: String,
    pub alternative_cluster_name: Option<String>,
}

/// External collaborator that owns cluster-wide consensus on which binding
/// serves a given message-group id. Expected to answer synchronously or time
/// out internally (a timeout surfaces as `None`, never as an error).
pub trait GroupingHandler: Send + Sync {
    /// Look up (optionally from a local cache) the current proposal for
    /// `full_id`.
    fn get_proposal(&self, full_id: &str, use_cache: bool) -> Option<Response>;

    /// Propose `proposal`, returning the cluster's decision or `None` on
    /// timeout.
    fn propose(&self, proposal: Proposal) -> Option<Response>;

    /// Inform the handler that the binding behind `cluster_name` no longer
    /// exists for `group_id`, so a later proposal doesn't keep pointing at it.
    fn force_remove(&self, group_id: &str, cluster_name: &str);
}

/// Result of one proposal/response round for a single routing group.
pub enum ProposalOutcome {
    /// A binding was resolved for this group id.
    Routed(BindingRef),
    /// No candidate existed in this group at all; skip it (not a failure).
    Skipped,
    /// This round failed to land on a present binding. Carries the response
    /// (if any was obtained) so the caller can `forceRemove` before retrying.
    Failed { response: Option<Response> },
}

/// Resolve one proposal/response round for `full_id` against `bindings`.
/// Advances `cursor` exactly when the cache-miss path consults the selector,
/// matching the selector's own single-advance-per-selection guarantee.
pub fn attempt(
    handler: &dyn GroupingHandler,
    full_id: &str,
    bindings: &[BindingRef],
    cursor: &AtomicU32,
    mode: LoadBalancingMode,
    msg: &dyn RoutableMessage,
) -> ProposalOutcome {
    if let Some(response) = handler.get_proposal(full_id, true) {
        return match bindings
            .iter()
            .find(|b| b.cluster_name() == response.chosen_cluster_name)
        {
            Some(b) => ProposalOutcome::Routed(Arc::clone(b)),
            None => ProposalOutcome::Failed {
                response: Some(response),
            },
        };
    }

    let Some(candidate) = selector::select(bindings, cursor, mode, msg) else {
        return ProposalOutcome::Skipped;
    };

    let proposal = Proposal {
        full_id: full_id.to_string(),
        cluster_name: candidate.cluster_name().to_string(),
    };

    match handler.propose(proposal) {
        None => ProposalOutcome::Failed { response: None },
        Some(response) if response.chosen_cluster_name == candidate.cluster_name() => {
            ProposalOutcome::Routed(candidate)
        }
        Some(response) => {
            let alt_binding = response
                .alternative_cluster_name
                .as_deref()
                .and_then(|alt| bindings.iter().find(|b| b.cluster_name() == alt));

            match alt_binding {
                Some(b) => ProposalOutcome::Routed(Arc::clone(b)),
                None => ProposalOutcome::Failed {
                    response: Some(response),
                },
            }
        }
    }
}
