//! GRE tunnels to other emulation hosts.

use emu_common::{ObjId, SessionId};
use emu_host::{GreTapOptions, Host};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::{
    api::{MessageFlags, NodeKind},
    bridge::{forward_network, forward_node_identity, BridgeNet},
    error::{Result, Teardown},
    link::LinkData,
    node::{Network, Node, StartupStatus},
};

/// A bridge with a GRE tap device joined to it, extending the broadcast domain to a remote
/// host.
///
/// The tap is created on startup when a remote address is known, and removed on shutdown.
#[derive(Debug)]
pub struct GreTapBridge {
    base: BridgeNet,
    device: String,
    options: Mutex<GreTapOptions>,
    tap_up: Mutex<bool>,
}

impl GreTapBridge {
    pub fn new(host: Host, session: SessionId, id: ObjId, kind: NodeKind, options: GreTapOptions) -> Self {
        Self {
            base: BridgeNet::new(host, session, id, kind),
            device: format!("gt.{id}.{}", session.short()),
            options: Mutex::new(options),
            tap_up: Mutex::new(false),
        }
    }

    pub fn base(&self) -> &BridgeNet {
        &self.base
    }

    /// Host device name of the GRE tap.
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Sets the remote endpoint used by the next startup.
    pub fn set_remote(&self, remote: impl Into<String>) {
        self.options.lock().remote = Some(remote.into());
    }

    pub fn has_tap(&self) -> bool {
        *self.tap_up.lock()
    }

    pub fn startup(&self) -> Result<StartupStatus> {
        if self.base.is_up() {
            return Ok(StartupStatus::Started);
        }
        let status = self.base.startup()?;

        let options = self.options.lock().clone();
        if options.remote.is_none() {
            debug!(bridge = %self.base.brname(), "no remote address, gre tap not created");
            return Ok(status);
        }

        let host = self.base.host();
        host.gretap_add(&self.device, &options)?;
        *self.tap_up.lock() = true;
        host.link_up(&self.device)?;
        host.bridge_add_if(self.base.brname(), &self.device)?;
        info!(device = %self.device, remote = ?options.remote, "gre tap created");

        Ok(status)
    }

    pub fn shutdown(&self) -> Result<()> {
        let mut teardown = Teardown::default();

        if std::mem::take(&mut *self.tap_up.lock()) {
            let host = self.base.host();
            teardown.step(host.bridge_del_if(self.base.brname(), &self.device), "delif", &self.device);
            teardown.step(host.link_down(&self.device), "link down", &self.device);
            teardown.step(host.link_del(&self.device), "link del", &self.device);
        }
        teardown.step(self.base.shutdown(), "bridge shutdown", self.base.brname());

        teardown.finish()
    }
}

/// A tunnel node: a [`GreTapBridge`] with the `tunnel` identity.
#[derive(Debug)]
pub struct TunnelNode {
    bridge: GreTapBridge,
}

impl TunnelNode {
    pub fn new(host: Host, session: SessionId, id: ObjId, options: GreTapOptions) -> Self {
        Self { bridge: GreTapBridge::new(host, session, id, NodeKind::Tunnel, options) }
    }

    pub fn gretap(&self) -> &GreTapBridge {
        &self.bridge
    }
}

impl Node for TunnelNode {
    forward_node_identity!(bridge.base);

    fn startup(&self) -> Result<StartupStatus> {
        self.bridge.startup()
    }

    fn shutdown(&self) -> Result<()> {
        self.bridge.shutdown()
    }

    fn all_link_data(&self, flags: MessageFlags) -> Vec<LinkData> {
        self.bridge.base().all_link_data(flags)
    }
}

impl Network for TunnelNode {
    forward_network!(bridge.base);
}
