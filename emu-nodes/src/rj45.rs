//! Physical interface passthrough.
//!
//! An [`Rj45Node`] is both a node and its own single network interface: it stands for one
//! real host NIC pulled into the emulation. The NIC's up flag and addresses are captured on
//! startup and put back on shutdown, so using a host NIC leaves nothing behind.

use std::sync::{Arc, Weak};

use emu_common::{IfIndex, MacAddr, ObjId, Position};
use emu_host::{Host, HostIfState};
use parking_lot::{Mutex, ReentrantMutex};
use tracing::{debug, debug_span, info, warn};

use crate::{
    api::{MessageFlags, NodeKind},
    error::{Error, Result, Teardown},
    interface::{fire_poshook, LinkParams, NetInterface, PosHook},
    link::LinkData,
    node::{Network, Node, StartupStatus},
};

/// Options for an [`Rj45Node`].
#[derive(Debug, Clone, Copy)]
pub struct Rj45Options {
    pub mtu: u32,
}

impl Default for Rj45Options {
    fn default() -> Self {
        Self { mtu: 1500 }
    }
}

impl Rj45Options {
    pub const fn with_mtu(mut self, mtu: u32) -> Self {
        self.mtu = mtu;
        self
    }
}

#[derive(Default)]
struct Rj45State {
    up: bool,
    ifindex: Option<IfIndex>,
    net_id: Option<ObjId>,
    net: Option<Weak<dyn Network>>,
    addrs: Vec<String>,
    params: LinkParams,
    poshook: Option<PosHook>,
    position: Option<Position>,
    /// Host NIC state captured on startup, consumed on shutdown.
    saved: Option<HostIfState>,
}

impl std::fmt::Debug for Rj45State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rj45State")
            .field("up", &self.up)
            .field("ifindex", &self.ifindex)
            .field("net_id", &self.net_id)
            .field("addrs", &self.addrs)
            .field("params", &self.params)
            .field("position", &self.position)
            .field("saved", &self.saved)
            .finish_non_exhaustive()
    }
}

/// A host NIC used as an emulated node.
///
/// Structural operations (startup, shutdown, attaching and detaching the interface, address
/// changes) are serialised by a reentrant operation lock, since attaching re-enters the node
/// through the network.
#[derive(Debug)]
pub struct Rj45Node {
    id: ObjId,
    name: String,
    host: Host,
    options: Rj45Options,
    ops: ReentrantMutex<()>,
    state: Mutex<Rj45State>,
}

impl Rj45Node {
    /// `ifname` is the host NIC to take over.
    pub fn new(host: Host, id: ObjId, ifname: impl Into<String>, options: Rj45Options) -> Self {
        Self {
            id,
            name: ifname.into(),
            host,
            options,
            ops: ReentrantMutex::new(()),
            state: Mutex::default(),
        }
    }

    pub fn mtu(&self) -> u32 {
        self.options.mtu
    }

    /// Attaches the node's interface, optionally to `net`, and configures `addrs` on it.
    ///
    /// The interface index is 0 unless `ifindex` is given. Fails with a capacity error when
    /// the interface is already attached to a network.
    pub fn newnetif(
        self: &Arc<Self>,
        net: Option<&Arc<dyn Network>>,
        addrs: &[&str],
        ifindex: Option<IfIndex>,
    ) -> Result<IfIndex> {
        let _ops = self.ops.lock();
        let _span = debug_span!("newnetif", id = %self.id, name = %self.name).entered();

        let ifindex = {
            let mut state = self.state.lock();
            if state.net_id.is_some() {
                return Err(Error::Capacity { kind: NodeKind::Rj45, max: 1 });
            }
            let ifindex = ifindex.unwrap_or(0);
            state.ifindex = Some(ifindex);
            ifindex
        };

        if let Some(net) = net {
            let netif: Arc<dyn NetInterface> = Arc::clone(self) as Arc<dyn NetInterface>;
            if let Err(e) = net.attach(netif) {
                self.state.lock().ifindex = None;
                return Err(e);
            }
            self.state.lock().net = Some(Arc::downgrade(net));
        }

        let before = self.state.lock().addrs.clone();
        let mut applied = Vec::new();
        for addr in addrs {
            if let Err(e) = self.addaddr(addr) {
                warn!(%e, %addr, "failed to configure address, rolling back interface");
                self.rollback_netif(before, &applied);
                return Err(e);
            }
            applied.push(*addr);
        }

        debug!(ifindex, "interface attached");
        Ok(ifindex)
    }

    /// Undoes a partially applied [`Rj45Node::newnetif`]: restores the address list, removes
    /// the addresses already on the host NIC and detaches from the network.
    fn rollback_netif(&self, addrs: Vec<String>, applied: &[&str]) {
        let (up, net) = {
            let mut state = self.state.lock();
            state.addrs = addrs;
            state.ifindex = None;
            (state.up, state.net.take())
        };

        if up {
            for addr in applied {
                if let Err(e) = self.host.addr_del(&self.name, addr) {
                    warn!(%e, %addr, ifname = %self.name, "failed to remove address during rollback");
                }
            }
        }
        if let Some(net) = net.and_then(|net| net.upgrade()) {
            if let Err(e) = net.detach(self) {
                warn!(%e, ifname = %self.name, "failed to detach during rollback");
            }
        }
        self.detach_net();
    }

    /// Removes the interface `ifindex`, detaching it from its network and shutting the node
    /// down.
    pub fn delnetif(&self, ifindex: IfIndex) -> Result<()> {
        let _ops = self.ops.lock();

        let net = {
            let mut state = self.state.lock();
            if state.ifindex != Some(ifindex) {
                return Err(Error::UnknownIfIndex(ifindex));
            }
            state.ifindex = None;
            state.net.take()
        };

        let mut teardown = Teardown::default();
        if let Some(net) = net.and_then(|net| net.upgrade()) {
            teardown.step(net.detach(self), "detach", &self.name);
        }
        self.detach_net();
        teardown.step(self.shutdown(), "shutdown", &self.name);
        teardown.finish()
    }

    /// Returns this node as an interface when asked for its own index or its network.
    pub fn netif(self: &Arc<Self>, ifindex: Option<IfIndex>, net: Option<ObjId>) -> Option<Arc<dyn NetInterface>> {
        let state = self.state.lock();
        let by_net = net.is_some() && net == state.net_id;
        let by_index = state.ifindex.is_some() && state.ifindex == Some(ifindex.unwrap_or(0));
        drop(state);

        (by_net || by_index).then(|| Arc::clone(self) as Arc<dyn NetInterface>)
    }

    /// The interface index of `netif`, if it is this node.
    pub fn getifindex(&self, netif: &dyn NetInterface) -> Option<IfIndex> {
        let same = std::ptr::eq(netif as *const dyn NetInterface as *const (), self as *const Self as *const ());
        if same {
            self.state.lock().ifindex
        } else {
            None
        }
    }

    /// Records `addr` and, while the node is up, adds it to the host NIC.
    pub fn addaddr(&self, addr: &str) -> Result<()> {
        let _ops = self.ops.lock();
        let up = {
            let mut state = self.state.lock();
            state.addrs.push(addr.to_owned());
            state.up
        };
        if up {
            self.host.addr_add(&self.name, addr, None)?;
        }
        Ok(())
    }

    /// Forgets `addr` and, while the node is up, removes it from the host NIC.
    pub fn deladdr(&self, addr: &str) -> Result<()> {
        let _ops = self.ops.lock();
        let up = {
            let mut state = self.state.lock();
            state.addrs.retain(|a| a != addr);
            state.up
        };
        if up {
            self.host.addr_del(&self.name, addr)?;
        }
        Ok(())
    }

    /// Captures the up flag and addresses of the host NIC. A failed read leaves nothing to
    /// restore.
    pub fn savestate(&self) {
        let saved = match self.host.addr_show(&self.name) {
            Ok(saved) => {
                info!(ifname = %self.name, up = saved.up, addrs = saved.addrs.len(), "host interface captured");
                Some(saved)
            }
            Err(e) => {
                warn!(%e, ifname = %self.name, "failed to read host interface state, it will not be restored");
                None
            }
        };
        self.state.lock().saved = saved;
    }

    /// Puts back the captured addresses and up flag. The capture is consumed.
    pub fn restorestate(&self) -> Result<()> {
        let Some(saved) = self.state.lock().saved.take() else {
            return Ok(());
        };

        let mut teardown = Teardown::default();
        for (addr, brd) in &saved.addrs {
            teardown.step(self.host.addr_add(&self.name, addr, brd.as_deref()), "restore address", &self.name);
        }
        if saved.up {
            teardown.step(self.host.link_up(&self.name), "restore link up", &self.name);
        }
        info!(ifname = %self.name, "host interface restored");

        teardown.finish()
    }

    /// Moves the node, then lets the interface hook see the new position.
    pub fn set_position(&self, position: Position) {
        self.state.lock().position = Some(position);
        fire_poshook(self, position);
    }
}

impl Node for Rj45Node {
    fn id(&self) -> ObjId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Rj45
    }

    fn position(&self) -> Option<Position> {
        self.state.lock().position
    }

    fn set_position(&self, position: Position) {
        Self::set_position(self, position);
    }

    fn is_up(&self) -> bool {
        self.state.lock().up
    }

    fn startup(&self) -> Result<StartupStatus> {
        let _ops = self.ops.lock();
        if self.state.lock().up {
            return Ok(StartupStatus::Started);
        }
        let _span = debug_span!("startup", id = %self.id, name = %self.name).entered();

        self.savestate();
        self.host.link_up(&self.name)?;
        self.state.lock().up = true;
        info!(ifname = %self.name, "host interface taken over");

        Ok(StartupStatus::Started)
    }

    fn shutdown(&self) -> Result<()> {
        let _ops = self.ops.lock();
        {
            let mut state = self.state.lock();
            if !state.up {
                return Ok(());
            }
            state.up = false;
        }
        let _span = debug_span!("shutdown", id = %self.id, name = %self.name).entered();

        let mut teardown = Teardown::default();
        teardown.step(self.host.link_down(&self.name), "link down", &self.name);
        teardown.step(self.host.addr_flush(&self.name), "addr flush", &self.name);
        if let Err(e) = self.host.qdisc_del_root(&self.name) {
            debug!(%e, ifname = %self.name, "no qdisc to remove");
        }
        teardown.step(self.restorestate(), "restore", &self.name);

        teardown.finish()
    }

    /// Links of a passthrough node are reported by its network.
    fn all_link_data(&self, _flags: MessageFlags) -> Vec<LinkData> {
        Vec::new()
    }
}

impl NetInterface for Rj45Node {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn node_id(&self) -> Option<ObjId> {
        Some(self.id)
    }

    fn ifindex(&self) -> Option<IfIndex> {
        self.state.lock().ifindex
    }

    /// The NIC keeps its own hardware address.
    fn hwaddr(&self) -> Option<MacAddr> {
        None
    }

    fn addrs(&self) -> Vec<String> {
        self.state.lock().addrs.clone()
    }

    fn params(&self) -> LinkParams {
        self.state.lock().params
    }

    fn set_params(&self, params: LinkParams) {
        self.state.lock().params = params;
    }

    fn net_id(&self) -> Option<ObjId> {
        self.state.lock().net_id
    }

    fn attach_net(&self, net: ObjId) {
        self.state.lock().net_id = Some(net);
    }

    fn detach_net(&self) {
        self.state.lock().net_id = None;
    }

    fn poshook(&self) -> Option<PosHook> {
        self.state.lock().poshook.clone()
    }

    fn set_poshook(&self, hook: Option<PosHook>) {
        self.state.lock().poshook = hook;
    }

    fn node_position(&self) -> Option<Position> {
        self.state.lock().position
    }

    fn set_position(&self, position: Position) {
        Self::set_position(self, position);
    }
}
