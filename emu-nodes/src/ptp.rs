use emu_common::{ObjId, SessionId};
use emu_host::Host;

use crate::{
    api::{MessageFlags, NodeKind},
    bridge::{forward_network, forward_node_identity, BridgeNet},
    error::Result,
    link::{self, LinkData},
    node::{Network, Node, NodeData, StartupStatus},
};

/// Maximum number of interfaces on a point-to-point link.
pub const PTP_CAPACITY: usize = 2;

/// A link between exactly two interfaces.
///
/// It is reported through link records only, never as a node.
#[derive(Debug)]
pub struct PtpNet {
    base: BridgeNet,
}

impl PtpNet {
    pub fn new(host: Host, session: SessionId, id: ObjId) -> Self {
        Self { base: BridgeNet::new(host, session, id, NodeKind::PeerToPeer).with_capacity(PTP_CAPACITY) }
    }

    pub fn brname(&self) -> &str {
        self.base.brname()
    }
}

impl Node for PtpNet {
    forward_node_identity!(base);

    fn startup(&self) -> Result<StartupStatus> {
        self.base.startup()
    }

    fn shutdown(&self) -> Result<()> {
        self.base.shutdown()
    }

    fn data(&self, _flags: MessageFlags) -> Option<NodeData> {
        None
    }

    /// One record for a symmetric link, two for a unidirectional one, none unless both ends
    /// are attached.
    fn all_link_data(&self, flags: MessageFlags) -> Vec<LinkData> {
        match self.base.netifs().as_slice() {
            [if1, if2] => link::point_to_point(flags, self.base.link_type(), if1.as_ref(), if2.as_ref()),
            _ => Vec::new(),
        }
    }
}

impl Network for PtpNet {
    forward_network!(base);
}
