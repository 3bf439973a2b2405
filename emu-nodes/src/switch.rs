//! Plain broadcast domains.

use emu_common::{ObjId, SessionId};
use emu_host::Host;
use tracing::debug;

use crate::{
    api::{MessageFlags, NodeKind},
    bridge::{forward_network, forward_node_identity, BridgeNet},
    error::Result,
    link::LinkData,
    node::{Network, Node, StartupStatus},
};

/// A learning switch.
#[derive(Debug)]
pub struct SwitchNode {
    base: BridgeNet,
}

impl SwitchNode {
    pub fn new(host: Host, session: SessionId, id: ObjId) -> Self {
        Self { base: BridgeNet::new(host, session, id, NodeKind::Switch) }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.base = self.base.with_name(name);
        self
    }

    pub fn brname(&self) -> &str {
        self.base.brname()
    }
}

impl Node for SwitchNode {
    forward_node_identity!(base);

    fn startup(&self) -> Result<StartupStatus> {
        self.base.startup()
    }

    fn shutdown(&self) -> Result<()> {
        self.base.shutdown()
    }

    fn all_link_data(&self, flags: MessageFlags) -> Vec<LinkData> {
        self.base.all_link_data(flags)
    }
}

impl Network for SwitchNode {
    forward_network!(base);
}

/// A hub: a bridge that never learns addresses, so every frame floods to every port.
#[derive(Debug)]
pub struct HubNode {
    base: BridgeNet,
}

impl HubNode {
    pub fn new(host: Host, session: SessionId, id: ObjId) -> Self {
        Self { base: BridgeNet::new(host, session, id, NodeKind::Hub) }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.base = self.base.with_name(name);
        self
    }

    pub fn brname(&self) -> &str {
        self.base.brname()
    }
}

impl Node for HubNode {
    forward_node_identity!(base);

    fn startup(&self) -> Result<StartupStatus> {
        if self.base.is_up() {
            return Ok(StartupStatus::Started);
        }

        let status = self.base.startup()?;
        self.base.host().bridge_set_ageing(self.base.brname(), 0)?;
        debug!(bridge = %self.base.brname(), "mac learning disabled");
        Ok(status)
    }

    fn shutdown(&self) -> Result<()> {
        self.base.shutdown()
    }

    fn all_link_data(&self, flags: MessageFlags) -> Vec<LinkData> {
        self.base.all_link_data(flags)
    }
}

impl Network for HubNode {
    forward_network!(base);
}
