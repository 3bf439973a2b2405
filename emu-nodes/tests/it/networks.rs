use std::sync::Arc;

use emu_common::{ObjId, Position, SessionId};
use emu_host::{testing::SimHost, GreTapOptions};
use emu_nodes::{
    HubNode, LinkType, MessageFlags, NetInterface, Network, Node, NodeKind, StartupStatus, SwitchNode, TunnelNode,
};

use crate::helpers::{delay, init_tracing, veth};

#[test]
fn hub_floods_switch_learns() {
    init_tracing();
    let sim = SimHost::new();
    let hub = HubNode::new(sim.host(), SessionId(1), ObjId(5));
    let switch = SwitchNode::new(sim.host(), SessionId(1), ObjId(6));

    hub.startup().unwrap();
    switch.startup().unwrap();

    assert_eq!(sim.bridge(hub.brname()).unwrap().ageing, Some(0));
    assert_eq!(sim.bridge(switch.brname()).unwrap().ageing, None);
}

#[test]
fn hub_ageing_failure_propagates() {
    let sim = SimHost::new();
    sim.fail_matching("setageing");
    let hub = HubNode::new(sim.host(), SessionId(1), ObjId(5));
    assert!(hub.startup().is_err());

    // The bridge is up, so shutdown still releases it.
    hub.shutdown().unwrap();
    assert!(sim.bridge(hub.brname()).is_none());
}

#[test]
fn failed_bridge_setup_leaves_nothing_behind() {
    let sim = SimHost::new();
    sim.fail_matching("brctl stp");
    let switch = SwitchNode::new(sim.host(), SessionId(1), ObjId(6));

    assert!(switch.startup().is_err());
    assert!(!switch.is_up());
    assert!(sim.bridge(switch.brname()).is_none());
    switch.shutdown().unwrap();

    sim.clear_failures();
    assert!(matches!(switch.startup().unwrap(), StartupStatus::Started));
    assert!(sim.bridge(switch.brname()).is_some());
}

#[test]
fn switch_reports_one_record_per_interface() {
    init_tracing();
    let sim = SimHost::new();
    let switch = SwitchNode::new(sim.host(), SessionId(1), ObjId(6)).with_name("lan");
    switch.set_position(Position::new(5.0, 6.0, 0.0));
    let a = veth(&sim, 1, &["10.0.0.1/24"], delay(0));
    let b = veth(&sim, 2, &["10.0.0.2/24"], delay(0));
    switch.attach(a.clone()).unwrap();
    switch.attach(b.clone()).unwrap();

    // Interfaces attached before startup join the bridge on startup.
    assert!(matches!(switch.startup().unwrap(), StartupStatus::Started));
    assert_eq!(sim.bridge(switch.brname()).unwrap().ports, vec!["veth1.0".to_string(), "veth2.0".to_string()]);

    let links = switch.all_link_data(MessageFlags::ADD);
    assert_eq!(links.len(), 2);
    assert!(links.iter().all(|l| l.node1_id == ObjId(6) && l.link_type == Some(LinkType::Wired)));
    assert_eq!(links[1].node2_id, ObjId(2));

    let data = switch.data(MessageFlags::ADD).unwrap();
    assert_eq!(data.kind, NodeKind::Switch);
    assert_eq!(data.kind.api_type(), 4);
    assert_eq!(data.name, "lan");
    assert_eq!(data.position, Some(Position::new(5.0, 6.0, 0.0)));

    switch.detach(a.as_ref()).unwrap();
    assert_eq!(a.net_id(), None);
    assert!(sim.link("veth1.0").unwrap().master.is_none());

    switch.shutdown().unwrap();
    assert_eq!(b.net_id(), None);
    assert!(switch.all_link_data(MessageFlags::ADD).is_empty());
}

#[test]
fn tunnel_is_a_gretap_bridge() {
    init_tracing();
    let sim = SimHost::new();
    let options = GreTapOptions { remote: Some("203.0.113.1".into()), ttl: Some(64), ..Default::default() };
    let tunnel = Arc::new(TunnelNode::new(sim.host(), SessionId(1), ObjId(8), options));
    let net: Arc<dyn Network> = tunnel.clone();

    assert_eq!(net.kind(), NodeKind::Tunnel);
    assert_eq!(net.kind().api_type(), 8);
    net.startup().unwrap();
    assert!(sim.ran("ip link add gt.8.1 type gretap remote 203.0.113.1 ttl 64"));
    assert!(sim.link("gt.8.1").unwrap().up);

    net.shutdown().unwrap();
    assert!(sim.link("gt.8.1").is_none());
}
