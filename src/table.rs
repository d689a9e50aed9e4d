//! `BindingsTable`: the top-level entity per address. Owns the three
//! registries, the copy-on-write routing index, and the load-balancing mode,
//! and exposes `add`/`removeByUniqueName`/`route`/`redistribute`.

use crate::binding::{Binding, BindingKind, BindingRef, LoadBalancingMode};
use crate::config::RoutingTableConfig;
use crate::context::RoutingContext;
use crate::error::{Result, RoutingError};
use crate::grouping::{self, GroupingHandler, ProposalOutcome};
use crate::index::CopyOnWriteRoutingIndex;
use crate::message::{self, RoutableMessage, HDR_ROUTE_TO_ACK_IDS, HDR_ROUTE_TO_IDS, HDR_SCALEDOWN_TO_IDS};
use crate::selector;
use crate::version;
use dashmap::DashMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Per-address binding registry and router.
///
/// Every public method here is safe to call concurrently from any thread
/// without external locking: the registries are `DashMap`s, the routing
/// index is copy-on-write, and `loadBalancingMode`/`version` are single-word
/// atomics.
pub struct BindingsTable {
    address: String,
    by_id: DashMap<u64, BindingRef>,
    by_unique_name: DashMap<String, BindingRef>,
    exclusive_bindings: DashMap<String, BindingRef>,
    routing_index: CopyOnWriteRoutingIndex,
    load_balancing_mode: AtomicU8,
    version: AtomicU32,
    grouping_handler: Option<Arc<dyn GroupingHandler>>,
    config: RoutingTableConfig,
}

impl BindingsTable {
    /// A fresh, empty table for `address`, with no grouping handler attached.
    #[must_use]
    pub fn new(address: impl Into<String>, config: RoutingTableConfig) -> Self {
        Self::with_grouping_handler(address, config, None)
    }

    /// A fresh table with an external [`GroupingHandler`] for strict-ordering
    /// grouped routing. Without one, messages carrying a group id fall
    /// straight to simple routing (grouping is simply not "enabled").
    #[must_use]
    pub fn with_grouping_handler(
        address: impl Into<String>,
        config: RoutingTableConfig,
        grouping_handler: Option<Arc<dyn GroupingHandler>>,
    ) -> Self {
        Self {
            address: address.into(),
            by_id: DashMap::new(),
            by_unique_name: DashMap::new(),
            exclusive_bindings: DashMap::new(),
            routing_index: CopyOnWriteRoutingIndex::new(),
            load_balancing_mode: AtomicU8::new(config.initial_load_balancing_mode.to_u8()),
            version: AtomicU32::new(version::next_version()),
            grouping_handler,
            config,
        }
    }

    /// The address this table routes for.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// The table's current topology version.
    #[must_use]
    pub fn version(&self) -> u32 {
        self.version.load(Ordering::Acquire)
    }

    fn bump_version(&self) {
        self.version.store(version::next_version(), Ordering::Release);
    }

    /// Current load-balancing mode.
    #[must_use]
    pub fn load_balancing_mode(&self) -> LoadBalancingMode {
        LoadBalancingMode::from_u8(self.load_balancing_mode.load(Ordering::Relaxed))
    }

    /// Overwrite the load-balancing mode.
    pub fn set_load_balancing_mode(&self, mode: LoadBalancingMode) {
        self.load_balancing_mode.store(mode.to_u8(), Ordering::Relaxed);
    }

    /// True iff the current mode allows [`BindingsTable::redistribute`].
    #[must_use]
    pub fn allow_redistribute(&self) -> bool {
        self.load_balancing_mode().allows_redistribute()
    }

    /// Insert `binding`: exclusive bindings go to `exclusiveBindings`,
    /// everything else to the routing index; both registries always gain an
    /// entry. A remote-queue binding overwrites the table's load-balancing
    /// mode with its advertised one (see DESIGN.md for the reconciliation
    /// rule).
    pub fn add(&self, binding: BindingRef) {
        if let BindingKind::Remote { advertised_mode, .. } = binding.kind() {
            self.set_load_balancing_mode(advertised_mode);
        }

        self.by_id.insert(binding.id(), Arc::clone(&binding));
        self.by_unique_name
            .insert(binding.unique_name().to_string(), Arc::clone(&binding));

        if binding.is_exclusive() {
            self.exclusive_bindings
                .insert(binding.unique_name().to_string(), Arc::clone(&binding));
        } else {
            self.routing_index
                .add_if_absent(binding.routing_name(), Arc::clone(&binding));
        }

        self.bump_version();
        debug!(address = %self.address, binding = %binding.unique_name(), "binding added");
    }

    /// Remove the binding named `unique_name`, if present. Bumps `version`
    /// only on success.
    pub fn remove_by_unique_name(&self, unique_name: &str) -> Option<BindingRef> {
        let (_, binding) = self.by_unique_name.remove(unique_name)?;
        self.by_id.remove(&binding.id());

        if binding.is_exclusive() {
            self.exclusive_bindings.remove(unique_name);
        } else {
            self.routing_index.remove(binding.routing_name(), unique_name);
        }

        self.bump_version();
        debug!(address = %self.address, binding = %unique_name, "binding removed");
        Some(binding)
    }

    /// No structural change; just invalidates cached routing contexts by
    /// bumping `version`.
    pub fn on_queue_updated(&self, _binding: &BindingRef) {
        self.bump_version();
        trace!(address = %self.address, "queue updated, version bumped");
    }

    /// Fan out a cleared grouping proposal to every binding in the table.
    pub fn unproposed(&self, group_id: &str) {
        for entry in self.by_id.iter() {
            entry.value().unproposed(group_id);
        }
    }

    fn find_local_id_for_remote(&self, remote_queue_id: u64) -> Option<u64> {
        self.by_id.iter().find_map(|entry| {
            let b = entry.value();
            match b.kind() {
                BindingKind::Remote { remote_queue_id: rid, .. } if rid == remote_queue_id => {
                    Some(b.id())
                }
                _ => None,
            }
        })
    }

    /// Dispatch `msg` through the table's seven ordered clauses. Returns
    /// whatever error a downstream `Binding::route` invocation propagates;
    /// the core itself never fails for user-originated conditions — those
    /// are logged and recovered from in place.
    ///
    /// # Errors
    /// Propagates errors from downstream `Binding::route`/`route_with_ack`
    /// calls unchanged.
    pub fn route(&self, msg: &mut dyn RoutableMessage, ctx: &mut dyn RoutingContext) -> Result<()> {
        let current_version = self.version();

        // 1. Reusable-context fast path.
        if ctx.is_reusable(msg, current_version) {
            trace!(address = %self.address, "reusable context hit, skipping re-selection");
            return Ok(());
        }
        ctx.clear();

        // 2. Scale-down sidechannel.
        if let Some(raw) = msg.remove_property(HDR_SCALEDOWN_TO_IDS) {
            let remote_ids = message::decode_ids(&raw);
            let local_ids: Vec<u64> = remote_ids
                .into_iter()
                .filter_map(|rid| self.find_local_id_for_remote(rid))
                .collect();
            if !local_ids.is_empty() {
                msg.set_property(HDR_ROUTE_TO_IDS, message::encode_ids(&local_ids));
            }
        }

        // 3. Exclusive bindings.
        if !self.exclusive_bindings.is_empty() {
            ctx.clear();
            let mut routed_any = false;
            for entry in self.exclusive_bindings.iter() {
                let binding = Arc::clone(entry.value());
                if binding.filter().map_or(true, |f| f.matches(msg)) {
                    binding.route(msg, ctx)?;
                    ctx.record_binding(binding.id());
                    routed_any = true;
                }
            }
            if routed_any {
                ctx.set_reusable(false, None);
                return Ok(());
            }
        }

        // 4. Explicit cluster directive.
        let route_to_ids = msg.remove_property(HDR_ROUTE_TO_IDS).map(|b| message::decode_ids(&b));
        let route_to_ack_ids = msg
            .remove_property(HDR_ROUTE_TO_ACK_IDS)
            .map(|b| message::decode_ids(&b))
            .unwrap_or_default();

        if let Some(ids) = route_to_ids {
            ctx.set_reusable(false, None);
            for id in &ids {
                let binding = self.by_id.get(id).map(|r| Arc::clone(r.value()));
                match binding {
                    Some(binding) => {
                        if route_to_ack_ids.contains(id) {
                            binding.route_with_ack(msg, ctx)?;
                        } else {
                            binding.route(msg, ctx)?;
                        }
                        ctx.record_binding(binding.id());
                    }
                    None => {
                        let err = RoutingError::RouteDirectiveUnknownId {
                            id: *id,
                            address: self.address.clone(),
                        };
                        warn!(error = %err, "route directive references unknown binding id");
                    }
                }
            }
            return Ok(());
        }

        // 5. Grouped strict ordering.
        if let Some(handler) = self.grouping_handler.as_ref() {
            if let Some(group_id) = msg.group_id().map(<[u8]>::to_vec) {
                let group_id = String::from_utf8_lossy(&group_id).into_owned();
                ctx.set_reusable(false, None);
                return self.route_grouped(handler.as_ref(), &group_id, msg, ctx);
            }
        }

        // 6. Fully-qualified address.
        if let Some(queue_name) = msg.address().split_once("::").map(|(_, q)| q.to_string()) {
            ctx.set_reusable(false, None);
            let binding = self.by_unique_name.get(&queue_name).map(|r| Arc::clone(r.value()));
            if let Some(binding) = binding {
                binding.route(msg, ctx)?;
                ctx.record_binding(binding.id());
            }
            return Ok(());
        }

        // 7. Simple round-robin.
        self.route_simple(msg, ctx, current_version)
    }

    fn route_grouped(
        &self,
        handler: &dyn GroupingHandler,
        group_id: &str,
        msg: &mut dyn RoutableMessage,
        ctx: &mut dyn RoutingContext,
    ) -> Result<()> {
        let mode = self.load_balancing_mode();
        let mut first_err: Option<RoutingError> = None;

        self.routing_index.for_each_bindings(|routing_name, group| {
            if first_err.is_some() {
                return;
            }
            let full_id = format!("{group_id}.{routing_name}");
            let mut tries: u32 = 0;

            loop {
                let bindings = group.bindings();
                match grouping::attempt(handler, &full_id, &bindings, group.cursor(), mode, msg) {
                    ProposalOutcome::Routed(binding) => {
                        if let Err(e) = binding.route(msg, ctx) {
                            first_err = Some(e);
                        } else {
                            ctx.record_binding(binding.id());
                        }
                        return;
                    }
                    ProposalOutcome::Skipped => return,
                    ProposalOutcome::Failed { response } => {
                        if let Some(r) = &response {
                            handler.force_remove(&r.group_id, &r.cluster_name);
                        } else {
                            let err = RoutingError::GroupingProposalTimeout {
                                group_id: full_id.clone(),
                                attempt: tries,
                            };
                            trace!(error = %err, "grouping proposal round timed out");
                        }
                        tries += 1;
                        if tries < self.config.max_group_retry {
                            continue;
                        }

                        let err = RoutingError::GroupRoutingExhausted {
                            group_id: group_id.to_string(),
                            routing_name: routing_name.to_string(),
                        };
                        warn!(error = %err, "falling back to simple routing for this group");
                        if let Some(binding) = selector::select(&bindings, group.cursor(), mode, msg) {
                            if let Err(e) = binding.route(msg, ctx) {
                                first_err = Some(e);
                            } else {
                                ctx.record_binding(binding.id());
                            }
                        }
                        return;
                    }
                }
            }
        });

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn route_simple(
        &self,
        msg: &mut dyn RoutableMessage,
        ctx: &mut dyn RoutingContext,
        current_version: u32,
    ) -> Result<()> {
        let mode = self.load_balancing_mode();
        let mut group_count = 0usize;
        let mut reusable_candidate: Option<BindingRef> = None;
        let mut saw_non_reusable_shape = false;
        let mut first_err: Option<RoutingError> = None;

        self.routing_index.for_each_bindings(|_, group| {
            if first_err.is_some() {
                return;
            }
            group_count += 1;
            let bindings = group.bindings();

            match selector::select(&bindings, group.cursor(), mode, msg) {
                Some(binding) => {
                    let shape_ok = bindings.len() == 1 && binding.filter().is_none() && binding.is_local();
                    if shape_ok {
                        reusable_candidate = Some(Arc::clone(&binding));
                    } else {
                        saw_non_reusable_shape = true;
                    }

                    if let Err(e) = binding.route(msg, ctx) {
                        first_err = Some(e);
                    } else {
                        ctx.record_binding(binding.id());
                    }
                }
                None => saw_non_reusable_shape = true,
            }
        });

        if let Some(e) = first_err {
            return Err(e);
        }

        let reusable = group_count == 1 && !saw_non_reusable_shape && reusable_candidate.is_some();
        ctx.set_reusable(reusable, reusable.then_some(current_version));
        Ok(())
    }

    /// Move a message no local consumer accepted to a peer binding in the
    /// same routing group.
    ///
    /// # Errors
    /// Propagates errors from the chosen binding's `Binding::route` call.
    pub fn redistribute(
        &self,
        msg: &mut dyn RoutableMessage,
        origin_queue_name: &str,
        ctx: &mut dyn RoutingContext,
    ) -> Result<bool> {
        if !self.allow_redistribute() {
            return Ok(false);
        }

        let Some(origin) = self.by_unique_name.get(origin_queue_name).map(|r| Arc::clone(r.value())) else {
            return Ok(false);
        };

        let Some(group) = self.routing_index.get(origin.routing_name()) else {
            return Ok(false);
        };

        let bindings = group.bindings();
        let len = bindings.len();
        if len == 0 {
            return Ok(false);
        }

        let start = (group.cursor().load(Ordering::Relaxed) as usize) % len;
        let mut pos = start;
        let mut chosen: Option<BindingRef> = None;

        for _ in 0..len {
            let candidate = &bindings[pos];
            if candidate.unique_name() != origin.unique_name()
                && candidate.filter().map_or(true, |f| f.matches(msg))
                && candidate.is_high_accept_priority(msg)
            {
                chosen = Some(Arc::clone(candidate));
                group.cursor().store(((pos + 1) % len) as u32, Ordering::Relaxed);
                break;
            }
            pos = (pos + 1) % len;
        }

        match chosen {
            Some(binding) => {
                binding.route(msg, ctx)?;
                ctx.record_binding(binding.id());
                debug!(address = %self.address, from = %origin_queue_name, to = %binding.unique_name(), "redistributed");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Human-readable dump of the table's registries: exclusive bindings (by
    /// unique name), then each routing group (routing name, ordered unique
    /// names, cursor), then version and mode. Performs no I/O; callers decide
    /// where to send it.
    #[must_use]
    pub fn debug_bindings(&self) -> String {
        let mut out = String::new();

        let mut exclusive: Vec<String> = self
            .exclusive_bindings
            .iter()
            .map(|e| e.key().clone())
            .collect();
        exclusive.sort();
        let _ = writeln!(out, "exclusive: {exclusive:?}");

        for (routing_name, names) in self.routing_index.copy_as_map() {
            let cursor = self
                .routing_index
                .get(&routing_name)
                .map(|g| g.cursor().load(Ordering::Relaxed))
                .unwrap_or_default();
            let _ = writeln!(out, "group {routing_name:?}: bindings={names:?} cursor={cursor}");
        }

        let _ = writeln!(
            out,
            "version={} mode={:?}",
            self.version(),
            self.load_balancing_mode()
        );

        out
    }
}
