use std::sync::Arc;

use emu_common::{ObjId, Position, SessionId};
use emu_host::testing::SimHost;
use emu_nodes::{Error, NetInterface, Network, Node, NodeKind, Rj45Node, Rj45Options, SwitchNode};

use crate::helpers::init_tracing;

fn host_nic(sim: &SimHost) {
    sim.add_link("eth1", true, &[("10.0.0.5/24", Some("10.0.0.255"))]);
}

#[test]
fn second_network_is_rejected() {
    init_tracing();
    let sim = SimHost::new();
    host_nic(&sim);
    let rj45 = Arc::new(Rj45Node::new(sim.host(), ObjId(20), "eth1", Rj45Options::default()));
    let first: Arc<dyn Network> = Arc::new(SwitchNode::new(sim.host(), SessionId(1), ObjId(1)));
    let second: Arc<dyn Network> = Arc::new(SwitchNode::new(sim.host(), SessionId(1), ObjId(2)));

    assert_eq!(rj45.newnetif(Some(&first), &[], None).unwrap(), 0);
    let err = rj45.newnetif(Some(&second), &[], Some(1)).unwrap_err();
    assert!(matches!(err, Error::Capacity { kind: NodeKind::Rj45, max: 1 }));

    assert_eq!(rj45.net_id(), Some(ObjId(1)));
    assert_eq!(rj45.ifindex(), Some(0));
    assert_eq!(first.netifs().len(), 1);
    assert!(second.netifs().is_empty());
    assert!(rj45.netif(None, Some(ObjId(1))).is_some());
    assert!(rj45.netif(Some(1), Some(ObjId(2))).is_none());
}

#[test]
fn failed_address_rolls_back_attachment() {
    init_tracing();
    let sim = SimHost::new();
    host_nic(&sim);
    let rj45 = Arc::new(Rj45Node::new(sim.host(), ObjId(20), "eth1", Rj45Options::default()));
    let switch = Arc::new(SwitchNode::new(sim.host(), SessionId(1), ObjId(1)));
    switch.startup().unwrap();
    let net: Arc<dyn Network> = switch.clone();
    rj45.startup().unwrap();

    sim.fail_matching("192.168.9.2");
    assert!(rj45.newnetif(Some(&net), &["192.168.9.1/24", "192.168.9.2/24"], None).is_err());

    assert_eq!(rj45.net_id(), None);
    assert_eq!(rj45.ifindex(), None);
    assert!(rj45.addrs().is_empty());
    assert!(switch.netifs().is_empty());
    let nic = sim.link("eth1").unwrap();
    assert!(nic.master.is_none());
    assert!(!nic.addrs.iter().any(|(a, _)| a.starts_with("192.168.9.")));

    sim.clear_failures();
    assert_eq!(rj45.newnetif(Some(&net), &["192.168.9.1/24"], None).unwrap(), 0);
    assert_eq!(rj45.net_id(), Some(ObjId(1)));
}

#[test]
fn host_state_survives_a_session() {
    init_tracing();
    let sim = SimHost::new();
    host_nic(&sim);
    let before = sim.link("eth1").unwrap().addrs;

    let rj45 = Arc::new(Rj45Node::new(sim.host(), ObjId(20), "eth1", Rj45Options::default()));
    let switch = Arc::new(SwitchNode::new(sim.host(), SessionId(1), ObjId(1)));
    switch.startup().unwrap();
    let net: Arc<dyn Network> = switch.clone();

    rj45.startup().unwrap();
    rj45.newnetif(Some(&net), &["192.168.9.1/24"], None).unwrap();
    assert_eq!(sim.link("eth1").unwrap().master.as_deref(), Some(switch.brname()));
    assert!(sim.link("eth1").unwrap().addrs.iter().any(|(a, _)| a == "192.168.9.1/24"));

    sim.clear_history();
    rj45.shutdown().unwrap();
    assert!(!rj45.is_up());
    assert!(sim.ran("ip addr flush dev eth1"));
    assert!(sim.ran("ip addr add 10.0.0.5/24 brd 10.0.0.255 dev eth1"));
    assert!(sim.ran("ip link set eth1 up"));

    let after = sim.link("eth1").unwrap();
    assert!(after.up);
    assert_eq!(after.addrs, before);

    // The capture is consumed: a second cycle restores only what it captures itself.
    sim.clear_history();
    rj45.shutdown().unwrap();
    assert!(sim.history().is_empty());
}

#[test]
fn down_nic_stays_down() {
    init_tracing();
    let sim = SimHost::new();
    sim.add_link("eth2", false, &[("10.1.0.5/16", None)]);
    let rj45 = Rj45Node::new(sim.host(), ObjId(21), "eth2", Rj45Options::default().with_mtu(9000));
    assert_eq!(rj45.mtu(), 9000);

    rj45.startup().unwrap();
    assert!(sim.link("eth2").unwrap().up);
    rj45.shutdown().unwrap();

    let after = sim.link("eth2").unwrap();
    assert!(!after.up);
    assert_eq!(after.addrs, vec![("10.1.0.5/16".to_string(), None)]);
}

#[test]
fn position_moves_node_then_fires_hook() {
    let sim = SimHost::new();
    host_nic(&sim);
    let rj45 = Rj45Node::new(sim.host(), ObjId(20), "eth1", Rj45Options::default());

    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let record = Arc::clone(&seen);
    rj45.set_poshook(Some(Arc::new(move |netif: &dyn NetInterface, pos: Position| {
        // The node position is already updated when the hook runs.
        record.lock().push((netif.node_position(), pos));
    })));

    let pos = Position::new(1.0, 2.0, 3.0);
    rj45.set_position(pos);
    assert_eq!(Node::position(&rj45), Some(pos));
    assert_eq!(*seen.lock(), vec![(Some(pos), pos)]);
}

#[test]
fn failed_link_up_leaves_node_down() {
    let sim = SimHost::new();
    host_nic(&sim);
    sim.fail_matching("ip link set eth1 up");
    let rj45 = Rj45Node::new(sim.host(), ObjId(20), "eth1", Rj45Options::default());

    assert!(rj45.startup().is_err());
    assert!(!rj45.is_up());
}
