//! The bridge every network kind is built on.

use std::sync::Arc;

use emu_common::{ObjId, Position, SessionId};
use emu_host::{command, host::BRIDGE_PREFIX, Host};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::{
    api::{BridgePolicy, LinkType, MessageFlags, NodeKind},
    error::{Error, Result, Teardown},
    interface::{LinkParams, NetInterface},
    link::{self, LinkData},
    node::{NodeData, StartupStatus},
};

#[derive(Debug, Default)]
struct BridgeState {
    up: bool,
    netifs: Vec<Arc<dyn NetInterface>>,
    addrs: Vec<String>,
    position: Option<Position>,
}

/// A host bridge named `b.<objid>.<short session id>` with an ordered registry of attached
/// interfaces.
///
/// The registry lock is never held while a host command runs. Attaching reserves the slot
/// first and releases it again when joining the bridge fails.
#[derive(Debug)]
pub struct BridgeNet {
    id: ObjId,
    name: String,
    kind: NodeKind,
    brname: String,
    host: Host,
    link_type: LinkType,
    policy: BridgePolicy,
    capacity: Option<usize>,
    state: RwLock<BridgeState>,
}

impl BridgeNet {
    pub fn new(host: Host, session: SessionId, id: ObjId, kind: NodeKind) -> Self {
        let (link_type, policy) = match kind {
            NodeKind::Wlan => (LinkType::Wireless, BridgePolicy::Drop),
            _ => (LinkType::Wired, BridgePolicy::Accept),
        };

        Self {
            id,
            name: format!("n{id}"),
            kind,
            brname: format!("{BRIDGE_PREFIX}.{id}.{}", session.short()),
            host,
            link_type,
            policy,
            capacity: None,
            state: RwLock::default(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Limits the number of attached interfaces.
    pub const fn with_capacity(mut self, max: usize) -> Self {
        self.capacity = Some(max);
        self
    }

    pub fn id(&self) -> ObjId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Host device name of the bridge.
    pub fn brname(&self) -> &str {
        &self.brname
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    pub fn link_type(&self) -> LinkType {
        self.link_type
    }

    pub fn policy(&self) -> BridgePolicy {
        self.policy
    }

    pub fn is_up(&self) -> bool {
        self.state.read().up
    }

    pub fn position(&self) -> Option<Position> {
        self.state.read().position
    }

    pub fn set_position(&self, position: Position) {
        self.state.write().position = Some(position);
    }

    /// Addresses configured on the bridge device.
    pub fn addrs(&self) -> Vec<String> {
        self.state.read().addrs.clone()
    }

    pub fn netifs(&self) -> Vec<Arc<dyn NetInterface>> {
        self.state.read().netifs.clone()
    }

    pub fn num_netifs(&self) -> usize {
        self.state.read().netifs.len()
    }

    /// Creates the bridge and joins interfaces that were attached while it was down.
    ///
    /// A pending interface that cannot join is left registered and reported as
    /// [`StartupStatus::Degraded`].
    pub fn startup(&self) -> Result<StartupStatus> {
        if self.is_up() {
            return Ok(StartupStatus::Started);
        }

        self.host.bridge_add(&self.brname)?;
        if let Err(e) = self.host.link_up(&self.brname) {
            if let Err(e) = self.host.bridge_del(&self.brname) {
                warn!(%e, bridge = %self.brname, "failed to remove bridge after link up failure");
            }
            return Err(e.into());
        }
        info!(bridge = %self.brname, kind = %self.kind, "bridge created");

        let pending = {
            let mut state = self.state.write();
            state.up = true;
            state.netifs.clone()
        };

        let mut status = StartupStatus::Started;
        for netif in pending {
            if let Err(e) = self.join(netif.as_ref()) {
                warn!(%e, bridge = %self.brname, netif = %netif.name(), "failed to join pending interface");
                if matches!(status, StartupStatus::Started) {
                    status = StartupStatus::Degraded(e);
                }
            }
        }

        Ok(status)
    }

    /// Detaches every interface and removes the bridge.
    pub fn shutdown(&self) -> Result<()> {
        let netifs = {
            let mut state = self.state.write();
            if !state.up {
                return Ok(());
            }
            state.up = false;
            state.addrs.clear();
            std::mem::take(&mut state.netifs)
        };

        let mut teardown = Teardown::default();
        for netif in &netifs {
            let name = netif.name();
            teardown.step(self.host.bridge_del_if(&self.brname, &name), "delif", &name);
            netif.detach_net();
        }
        teardown.step(self.host.link_down(&self.brname), "link down", &self.brname);
        teardown.step(self.host.bridge_del(&self.brname), "delbr", &self.brname);
        info!(bridge = %self.brname, "bridge removed");

        teardown.finish()
    }

    pub fn attach(&self, netif: Arc<dyn NetInterface>) -> Result<()> {
        let name = netif.name();
        let up = {
            let mut state = self.state.write();
            if state.netifs.iter().any(|n| n.name() == name) {
                return Ok(());
            }
            if let Some(max) = self.capacity {
                if state.netifs.len() >= max {
                    return Err(Error::Capacity { kind: self.kind, max });
                }
            }
            state.netifs.push(Arc::clone(&netif));
            state.up
        };
        netif.attach_net(self.id);

        if up {
            if let Err(e) = self.join(netif.as_ref()) {
                warn!(%e, bridge = %self.brname, netif = %name, "failed to join interface, rolling back");
                self.state.write().netifs.retain(|n| n.name() != name);
                netif.detach_net();
                return Err(e.into());
            }
        }

        debug!(bridge = %self.brname, netif = %name, "attached");
        Ok(())
    }

    pub fn detach(&self, netif: &dyn NetInterface) -> Result<()> {
        let name = netif.name();
        let up = {
            let mut state = self.state.write();
            let Some(pos) = state.netifs.iter().position(|n| n.name() == name) else {
                return Err(Error::NotAttached(name));
            };
            state.netifs.remove(pos);
            state.up
        };
        netif.detach_net();

        if up {
            self.host.bridge_del_if(&self.brname, &name)?;
        }

        debug!(bridge = %self.brname, netif = %name, "detached");
        Ok(())
    }

    /// Adds addresses to the bridge device.
    pub fn addrconfig<S: AsRef<str>>(&self, addrs: &[S]) -> Result<()> {
        for addr in addrs {
            let addr = addr.as_ref();
            self.host.addr_add(&self.brname, addr, None)?;
            self.state.write().addrs.push(addr.to_owned());
        }
        Ok(())
    }

    /// Stores `params` on the interface and shapes its traffic when the bridge is up. Unset
    /// parameters remove the shaping qdisc.
    pub fn link_config(&self, netif: &dyn NetInterface, params: LinkParams) -> Result<()> {
        netif.set_params(params);
        if !self.is_up() {
            return Ok(());
        }

        let name = netif.name();
        let netem = params.to_netem();
        if netem.is_empty() {
            if let Err(e) = self.host.qdisc_del_root(&name) {
                debug!(%e, netif = %name, "no qdisc to remove");
            }
        } else {
            self.host.qdisc_netem(&name, &netem)?;
        }
        Ok(())
    }

    pub fn data(&self, flags: MessageFlags) -> NodeData {
        NodeData {
            message_type: flags,
            id: self.id,
            kind: self.kind,
            name: self.name.clone(),
            position: self.position(),
            model: None,
        }
    }

    /// One record per attached interface.
    pub fn all_link_data(&self, flags: MessageFlags) -> Vec<LinkData> {
        self.netifs()
            .iter()
            .filter_map(|netif| link::attachment(flags, self.link_type, self.id, netif.as_ref()))
            .collect()
    }

    fn join(&self, netif: &dyn NetInterface) -> command::Result<()> {
        let name = netif.name();
        self.host.bridge_add_if(&self.brname, &name)?;
        self.host.link_up(&name)
    }
}

/// Implements the identity and position methods of [`Node`](crate::node::Node) by forwarding
/// to the bridge at the given field path.
macro_rules! forward_node_identity {
    ($($field:ident).+) => {
        fn id(&self) -> ::emu_common::ObjId {
            self$(.$field)+.id()
        }

        fn name(&self) -> &str {
            self$(.$field)+.name()
        }

        fn kind(&self) -> $crate::api::NodeKind {
            self$(.$field)+.kind()
        }

        fn position(&self) -> ::std::option::Option<::emu_common::Position> {
            self$(.$field)+.position()
        }

        fn set_position(&self, position: ::emu_common::Position) {
            self$(.$field)+.set_position(position)
        }

        fn is_up(&self) -> bool {
            self$(.$field)+.is_up()
        }
    };
}

/// Implements [`Network`](crate::node::Network) by forwarding to the bridge at the given field path.
macro_rules! forward_network {
    ($($field:ident).+) => {
        fn attach(
            &self,
            netif: ::std::sync::Arc<dyn $crate::interface::NetInterface>,
        ) -> $crate::error::Result<()> {
            self$(.$field)+.attach(netif)
        }

        fn detach(&self, netif: &dyn $crate::interface::NetInterface) -> $crate::error::Result<()> {
            self$(.$field)+.detach(netif)
        }

        fn netifs(&self) -> ::std::vec::Vec<::std::sync::Arc<dyn $crate::interface::NetInterface>> {
            self$(.$field)+.netifs()
        }

        fn link_config(
            &self,
            netif: &dyn $crate::interface::NetInterface,
            params: $crate::interface::LinkParams,
        ) -> $crate::error::Result<()> {
            self$(.$field)+.link_config(netif, params)
        }
    };
}

pub(crate) use {forward_network, forward_node_identity};
