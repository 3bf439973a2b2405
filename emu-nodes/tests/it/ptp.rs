use std::net::Ipv4Addr;

use emu_common::{ObjId, SessionId};
use emu_host::testing::SimHost;
use emu_nodes::{Error, LinkType, MessageFlags, NetInterface, Network, Node, NodeKind, PtpNet};

use crate::helpers::{delay, init_tracing, veth};

#[test]
fn link_data_requires_two_interfaces() {
    init_tracing();
    let sim = SimHost::new();
    let ptp = PtpNet::new(sim.host(), SessionId(1), ObjId(3));
    assert!(ptp.all_link_data(MessageFlags::ADD).is_empty());

    ptp.attach(veth(&sim, 1, &["10.0.0.1/24"], delay(10))).unwrap();
    assert!(ptp.all_link_data(MessageFlags::ADD).is_empty());

    ptp.attach(veth(&sim, 2, &["10.0.0.2/24"], delay(10))).unwrap();
    let links = ptp.all_link_data(MessageFlags::ADD);
    assert_eq!(links.len(), 1);
    assert!(!links[0].unidirectional);
    assert_eq!(links[0].link_type, Some(LinkType::Wired));
    assert_eq!(links[0].interface1.ipv4, Some(Ipv4Addr::new(10, 0, 0, 1)));
    assert_eq!(links[0].interface2.ipv4, Some(Ipv4Addr::new(10, 0, 0, 2)));
    assert_eq!(links[0].interface2.ipv4_mask, Some(24));
}

#[test]
fn asymmetric_link_yields_forward_and_reverse() {
    init_tracing();
    let sim = SimHost::new();
    let ptp = PtpNet::new(sim.host(), SessionId(1), ObjId(3));
    let if1 = veth(&sim, 1, &["10.0.0.1/24", "2001:db8::1/64"], delay(10));
    let if2 = veth(&sim, 2, &["10.0.0.2/24"], delay(50));
    ptp.attach(if1.clone()).unwrap();
    ptp.attach(if2.clone()).unwrap();

    let links = ptp.all_link_data(MessageFlags::ADD);
    assert_eq!(links.len(), 2);

    let forward = &links[0];
    assert_eq!((forward.node1_id, forward.node2_id), (ObjId(1), ObjId(2)));
    assert_eq!(forward.unidirectional_flag(), 1);
    assert_eq!(forward.params.delay, Some(10));
    assert_eq!(forward.message_type, MessageFlags::ADD);
    assert!(forward.interface1.ipv6.is_some());
    assert_eq!(forward.interface1.mac, if1.hwaddr());

    let reverse = &links[1];
    assert_eq!((reverse.node1_id, reverse.node2_id), (ObjId(2), ObjId(1)));
    assert_eq!(reverse.unidirectional_flag(), 1);
    assert_eq!(reverse.params.delay, Some(10));
    assert_eq!(reverse.message_type, MessageFlags::NONE);
    assert_eq!(reverse.link_type, None);
    assert_eq!(reverse.interface1.id, Some(0));
    assert!(!reverse.interface1.has_addresses());
    assert!(!reverse.interface2.has_addresses());
}

#[test]
fn third_attach_fails_and_keeps_two() {
    init_tracing();
    let sim = SimHost::new();
    let ptp = PtpNet::new(sim.host(), SessionId(1), ObjId(3));
    ptp.startup().unwrap();
    ptp.attach(veth(&sim, 1, &[], delay(0))).unwrap();
    ptp.attach(veth(&sim, 2, &[], delay(0))).unwrap();

    let third = veth(&sim, 4, &[], delay(0));
    let err = ptp.attach(third.clone()).unwrap_err();
    assert!(matches!(err, Error::Capacity { kind: NodeKind::PeerToPeer, max: 2 }));
    assert_eq!(ptp.netifs().len(), 2);
    assert_eq!(sim.bridge(ptp.brname()).unwrap().ports.len(), 2);
    assert!(sim.link("veth4.0").unwrap().master.is_none());
}

#[test]
fn never_reported_as_node() {
    let sim = SimHost::new();
    let ptp = PtpNet::new(sim.host(), SessionId(1), ObjId(3));
    assert!(ptp.data(MessageFlags::ADD).is_none());
}
