//! Link records describing the live topology to the protocol layer.
//!
//! Records are synthesized from in-memory interface state only; nothing here touches the
//! host.

use std::net::{Ipv4Addr, Ipv6Addr};

use emu_common::{IfIndex, MacAddr, ObjId};
use emu_host::ip::split_families;

use crate::{
    api::{LinkType, MessageFlags},
    interface::{LinkParams, NetInterface},
};

/// One side of a link record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkEndpoint {
    pub id: Option<IfIndex>,
    pub mac: Option<MacAddr>,
    pub ipv4: Option<Ipv4Addr>,
    pub ipv4_mask: Option<u8>,
    pub ipv6: Option<Ipv6Addr>,
    pub ipv6_mask: Option<u8>,
}

impl LinkEndpoint {
    /// Endpoint fields taken from an interface. At most one address of each family is kept,
    /// the last one listed.
    pub fn from_netif(netif: &dyn NetInterface) -> Self {
        let (v4, v6) = split_families(&netif.addrs());
        Self {
            id: netif.ifindex(),
            mac: netif.hwaddr(),
            ipv4: v4.map(|(addr, _)| addr),
            ipv4_mask: v4.map(|(_, mask)| mask),
            ipv6: v6.map(|(addr, _)| addr),
            ipv6_mask: v6.map(|(_, mask)| mask),
        }
    }

    /// An endpoint carrying only the interface id.
    pub fn id_only(id: Option<IfIndex>) -> Self {
        Self { id, ..Default::default() }
    }

    pub fn has_addresses(&self) -> bool {
        self.mac.is_some() || self.ipv4.is_some() || self.ipv6.is_some()
    }
}

/// A link record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkData {
    /// Record kind; the reverse record of a unidirectional link carries none.
    pub message_type: MessageFlags,
    pub node1_id: ObjId,
    pub node2_id: ObjId,
    pub link_type: Option<LinkType>,
    pub unidirectional: bool,
    pub params: LinkParams,
    pub interface1: LinkEndpoint,
    pub interface2: LinkEndpoint,
}

impl LinkData {
    /// The unidirectional flag as carried on the wire.
    pub const fn unidirectional_flag(&self) -> u8 {
        self.unidirectional as u8
    }
}

/// The record of an interface attached to a network: node1 is the network, node2 the
/// interface's node.
pub fn attachment(
    flags: MessageFlags,
    link_type: LinkType,
    net: ObjId,
    netif: &dyn NetInterface,
) -> Option<LinkData> {
    let Some(node) = netif.node_id() else {
        tracing::warn!(netif = %netif.name(), "interface has no node, skipping link record");
        return None;
    };

    Some(LinkData {
        message_type: flags,
        node1_id: net,
        node2_id: node,
        link_type: Some(link_type),
        unidirectional: false,
        params: netif.params(),
        interface1: LinkEndpoint::default(),
        interface2: LinkEndpoint::from_netif(netif),
    })
}

/// The records of a link between exactly two interfaces.
///
/// Equal parameters give one symmetric record. Otherwise the link is unidirectional and two
/// records are returned: the forward one with `if1`'s parameters and both endpoints, and a
/// reverse one with nodes and interface ids swapped, the same parameters, no record kind and
/// no addresses.
pub fn point_to_point(
    flags: MessageFlags,
    link_type: LinkType,
    if1: &dyn NetInterface,
    if2: &dyn NetInterface,
) -> Vec<LinkData> {
    let (Some(node1), Some(node2)) = (if1.node_id(), if2.node_id()) else {
        tracing::warn!(if1 = %if1.name(), if2 = %if2.name(), "link endpoint has no node");
        return Vec::new();
    };

    let params = if1.params();
    let unidirectional = params != if2.params();
    let interface1 = LinkEndpoint::from_netif(if1);
    let interface2 = LinkEndpoint::from_netif(if2);

    let forward = LinkData {
        message_type: flags,
        node1_id: node1,
        node2_id: node2,
        link_type: Some(link_type),
        unidirectional,
        params,
        interface1,
        interface2,
    };

    if !unidirectional {
        return vec![forward];
    }

    let reverse = LinkData {
        message_type: MessageFlags::NONE,
        node1_id: node2,
        node2_id: node1,
        link_type: None,
        unidirectional: true,
        params,
        interface1: LinkEndpoint::id_only(forward.interface2.id),
        interface2: LinkEndpoint::id_only(forward.interface1.id),
    };

    vec![forward, reverse]
}
