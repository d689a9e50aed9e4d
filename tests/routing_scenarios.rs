//! End-to-end scenarios for the bindings table's dispatch protocol.

use bindings_table::prelude::*;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug)]
struct ScenarioBinding {
    id: u64,
    name: String,
    routing_name: String,
    kind: BindingKind,
    connected: bool,
    high_priority: bool,
    calls: AtomicU64,
    ack_calls: AtomicU64,
}

impl ScenarioBinding {
    fn local(id: u64, name: &str, routing_name: &str, connected: bool, high_priority: bool) -> Arc<Self> {
        Arc::new(Self {
            id,
            name: name.to_string(),
            routing_name: routing_name.to_string(),
            kind: BindingKind::Local,
            connected,
            high_priority,
            calls: AtomicU64::new(0),
            ack_calls: AtomicU64::new(0),
        })
    }

    fn remote(id: u64, name: &str, routing_name: &str, connected: bool, high_priority: bool) -> Arc<Self> {
        Arc::new(Self {
            id,
            name: name.to_string(),
            routing_name: routing_name.to_string(),
            kind: BindingKind::Remote {
                remote_queue_id: id,
                advertised_mode: LoadBalancingMode::OnDemand,
            },
            connected,
            high_priority,
            calls: AtomicU64::new(0),
            ack_calls: AtomicU64::new(0),
        })
    }

    fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

impl Binding for ScenarioBinding {
    fn id(&self) -> u64 {
        self.id
    }
    fn unique_name(&self) -> &str {
        &self.name
    }
    fn routing_name(&self) -> &str {
        &self.routing_name
    }
    fn cluster_name(&self) -> &str {
        &self.name
    }
    fn filter(&self) -> Option<&(dyn Filter)> {
        None
    }
    fn is_exclusive(&self) -> bool {
        false
    }
    fn is_local(&self) -> bool {
        matches!(self.kind, BindingKind::Local)
    }
    fn is_connected(&self) -> bool {
        self.connected
    }
    fn is_high_accept_priority(&self, _msg: &dyn RoutableMessage) -> bool {
        self.high_priority
    }
    fn kind(&self) -> BindingKind {
        self.kind
    }
    fn route(&self, _msg: &mut dyn RoutableMessage, _ctx: &mut dyn RoutingContext) -> Result<()> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
    fn route_with_ack(&self, _msg: &mut dyn RoutableMessage, _ctx: &mut dyn RoutingContext) -> Result<()> {
        self.ack_calls.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
    fn unproposed(&self, _group_id: &str) {}
}

#[test]
fn scenario_1_off_excludes_remote() {
    let table = BindingsTable::new("orders", RoutingTableConfig::new().with_load_balancing_mode(LoadBalancingMode::Off));
    let local = ScenarioBinding::local(1, "local", "orders", true, true);
    let remote = ScenarioBinding::remote(2, "remote", "orders", true, true);
    table.add(Arc::clone(&local));
    table.add(Arc::clone(&remote));

    for _ in 0..10 {
        let mut msg = Message::new("orders");
        let mut ctx = ReusableRoutingContext::new();
        table.route(&mut msg, &mut ctx).unwrap();
    }

    assert_eq!(local.calls(), 10);
    assert_eq!(remote.calls(), 0);
}

#[test]
fn scenario_2_on_demand_prefers_connected() {
    let table = BindingsTable::new("orders", RoutingTableConfig::new().with_load_balancing_mode(LoadBalancingMode::OnDemand));
    let local_disconnected = ScenarioBinding::local(1, "local-disc", "orders", false, false);
    let remote_connected = ScenarioBinding::remote(2, "remote-conn", "orders", true, true);
    table.add(Arc::clone(&local_disconnected));
    table.add(Arc::clone(&remote_connected));

    let mut msg = Message::new("orders");
    let mut ctx = ReusableRoutingContext::new();
    table.route(&mut msg, &mut ctx).unwrap();

    assert_eq!(remote_connected.calls(), 1);
    assert_eq!(local_disconnected.calls(), 0);
}

#[test]
fn scenario_3_on_demand_local_fallback() {
    let table = BindingsTable::new("orders", RoutingTableConfig::new().with_load_balancing_mode(LoadBalancingMode::OnDemand));
    let remote_low = ScenarioBinding::remote(1, "remote-low", "orders", false, false);
    let local_low = ScenarioBinding::local(2, "local-low", "orders", false, false);
    table.add(Arc::clone(&remote_low));
    table.add(Arc::clone(&local_low));

    let mut msg = Message::new("orders");
    let mut ctx = ReusableRoutingContext::new();
    table.route(&mut msg, &mut ctx).unwrap();

    assert_eq!(local_low.calls(), 1);
    assert_eq!(remote_low.calls(), 0);
}

struct FirstWinsHandler {
    chosen: Mutex<std::collections::HashMap<String, String>>,
}

impl FirstWinsHandler {
    fn new() -> Self {
        Self {
            chosen: Mutex::new(std::collections::HashMap::new()),
        }
    }
}

impl GroupingHandler for FirstWinsHandler {
    fn get_proposal(&self, full_id: &str, _use_cache: bool) -> Option<Response> {
        let map = self.chosen.lock().unwrap();
        map.get(full_id).map(|cluster_name| Response {
            group_id: full_id.to_string(),
            cluster_name: cluster_name.clone(),
            chosen_cluster_name: cluster_name.clone(),
            alternative_cluster_name: None,
        })
    }

    fn propose(&self, proposal: Proposal) -> Option<Response> {
        let mut map = self.chosen.lock().unwrap();
        let cluster_name = map.entry(proposal.full_id.clone()).or_insert(proposal.cluster_name).clone();
        Some(Response {
            group_id: proposal.full_id,
            cluster_name: cluster_name.clone(),
            chosen_cluster_name: cluster_name,
            alternative_cluster_name: None,
        })
    }

    fn force_remove(&self, _group_id: &str, _cluster_name: &str) {}
}

#[test]
fn scenario_4_grouped_stickiness() {
    let handler = Arc::new(FirstWinsHandler::new());
    let table = BindingsTable::with_grouping_handler(
        "orders",
        RoutingTableConfig::new().with_load_balancing_mode(LoadBalancingMode::Strict),
        Some(handler),
    );
    let a = ScenarioBinding::local(1, "a", "orders", true, true);
    let b = ScenarioBinding::local(2, "b", "orders", true, true);
    let c = ScenarioBinding::local(3, "c", "orders", true, true);
    table.add(Arc::clone(&a));
    table.add(Arc::clone(&b));
    table.add(Arc::clone(&c));

    let mut g1_targets: HashSet<u64> = HashSet::new();
    let mut g2_targets: HashSet<u64> = HashSet::new();

    for _ in 0..5 {
        let mut msg = Message::new("orders").with_group_id("g1");
        let mut ctx = ReusableRoutingContext::new();
        table.route(&mut msg, &mut ctx).unwrap();
        g1_targets.insert(ctx.routed_binding_ids()[0]);
    }
    for _ in 0..5 {
        let mut msg = Message::new("orders").with_group_id("g2");
        let mut ctx = ReusableRoutingContext::new();
        table.route(&mut msg, &mut ctx).unwrap();
        g2_targets.insert(ctx.routed_binding_ids()[0]);
    }

    assert_eq!(g1_targets.len(), 1, "all g1 messages should land on the same binding");
    assert_eq!(g2_targets.len(), 1, "all g2 messages should land on the same binding");
}

#[test]
fn scenario_5_explicit_route_to_ids_with_ack_subset() {
    let table = BindingsTable::new("orders", RoutingTableConfig::new());
    let a = ScenarioBinding::local(1, "a", "orders", true, true);
    let b = ScenarioBinding::local(2, "b", "orders", true, true);
    let c = ScenarioBinding::local(3, "c", "orders", true, true);
    table.add(Arc::clone(&a));
    table.add(Arc::clone(&b));
    table.add(Arc::clone(&c));

    let mut msg = Message::new("orders")
        .with_property(message::HDR_ROUTE_TO_IDS, message::encode_ids(&[2, 3]))
        .with_property(message::HDR_ROUTE_TO_ACK_IDS, message::encode_ids(&[3]));
    let mut ctx = ReusableRoutingContext::new();
    table.route(&mut msg, &mut ctx).unwrap();

    assert_eq!(a.calls(), 0);
    assert_eq!(b.calls(), 1);
    assert_eq!(c.ack_calls.load(Ordering::Relaxed), 1);
    assert_eq!(c.calls(), 0, "C should only be routed via the ack variant");
    assert!(msg.get_property(message::HDR_ROUTE_TO_IDS).is_none());
    assert!(msg.get_property(message::HDR_ROUTE_TO_ACK_IDS).is_none());
}

#[test]
fn scenario_6_fully_qualified_address() {
    let table = BindingsTable::new("addr", RoutingTableConfig::new());
    let q1 = ScenarioBinding::local(1, "q1", "rg1", true, true);
    let q2 = ScenarioBinding::local(2, "q2", "rg2", true, true);
    table.add(Arc::clone(&q1));
    table.add(Arc::clone(&q2));

    let mut msg = Message::new("addr::q2");
    let mut ctx = ReusableRoutingContext::new();
    table.route(&mut msg, &mut ctx).unwrap();

    assert_eq!(q2.calls(), 1);
    assert_eq!(q1.calls(), 0);
}

#[test]
fn reusable_context_idempotence_skips_reselection() {
    let table = BindingsTable::new("orders", RoutingTableConfig::new());
    let only = ScenarioBinding::local(1, "only", "orders", true, true);
    table.add(Arc::clone(&only));

    let mut msg = Message::new("orders");
    let mut ctx = ReusableRoutingContext::new();
    table.route(&mut msg, &mut ctx).unwrap();
    table.route(&mut msg, &mut ctx).unwrap();
    table.route(&mut msg, &mut ctx).unwrap();

    assert_eq!(only.calls(), 1, "only the first call should have actually selected/routed");
}

use bindings_table::message;
