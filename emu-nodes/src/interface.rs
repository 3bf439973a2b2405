//! The network interface model: parameters, addresses, network binding and position hooks.

use std::{fmt, sync::Arc};

use emu_common::{IfIndex, MacAddr, ObjId, Position};
use emu_host::NetemParams;
use parking_lot::Mutex;

/// Link-quality parameters of an interface. `None` means unset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct LinkParams {
    /// Delay in microseconds.
    pub delay: Option<u64>,
    /// Bandwidth in bits per second.
    pub bandwidth: Option<u64>,
    /// Duplication rate in percent.
    pub duplicate: Option<u16>,
    /// Jitter in microseconds.
    pub jitter: Option<u64>,
}

impl LinkParams {
    pub fn to_netem(&self) -> NetemParams {
        NetemParams {
            delay_us: self.delay,
            jitter_us: self.jitter,
            duplicate_pct: self.duplicate,
            rate_bps: self.bandwidth,
        }
    }
}

/// Callback invoked when the node owning an interface moves.
pub type PosHook = Arc<dyn Fn(&dyn NetInterface, Position) + Send + Sync>;

/// An interface that can be attached to a network.
///
/// The owning node holds the interface; a network only keeps an attachment reference and
/// records its own id on the interface through [`NetInterface::attach_net`].
pub trait NetInterface: Send + Sync + fmt::Debug {
    /// Host device name.
    fn name(&self) -> String;

    /// Id of the owning node.
    fn node_id(&self) -> Option<ObjId>;

    fn ifindex(&self) -> Option<IfIndex>;

    fn hwaddr(&self) -> Option<MacAddr>;

    /// Addresses in CIDR notation, in insertion order.
    fn addrs(&self) -> Vec<String>;

    fn params(&self) -> LinkParams;

    fn set_params(&self, params: LinkParams);

    /// Id of the network this interface is attached to.
    fn net_id(&self) -> Option<ObjId>;

    fn attach_net(&self, net: ObjId);

    fn detach_net(&self);

    fn poshook(&self) -> Option<PosHook>;

    fn set_poshook(&self, hook: Option<PosHook>);

    /// Current position of the owning node, if it has one.
    fn node_position(&self) -> Option<Position>;

    /// Records a new node position and invokes the position hook.
    fn set_position(&self, position: Position);
}

/// Invokes the position hook of `netif`, if any. The hook is cloned out first, so it may call
/// back into the interface.
pub(crate) fn fire_poshook(netif: &dyn NetInterface, position: Position) {
    if let Some(hook) = netif.poshook() {
        hook(netif, position);
    }
}

/// Re-announces the current node position to the installed hook.
pub(crate) fn replay_position(netif: &dyn NetInterface) {
    if let Some(position) = netif.node_position() {
        fire_poshook(netif, position);
    }
}

#[derive(Default)]
struct IfState {
    addrs: Vec<String>,
    params: LinkParams,
    net: Option<ObjId>,
    poshook: Option<PosHook>,
    position: Option<Position>,
}

impl fmt::Debug for IfState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IfState")
            .field("addrs", &self.addrs)
            .field("params", &self.params)
            .field("net", &self.net)
            .field("poshook", &self.poshook.is_some())
            .field("position", &self.position)
            .finish()
    }
}

/// A plain interface of a namespace node, e.g. one end of a veth pair.
#[derive(Debug)]
pub struct VirtualIf {
    name: String,
    node: ObjId,
    ifindex: IfIndex,
    hwaddr: MacAddr,
    state: Mutex<IfState>,
}

impl VirtualIf {
    /// Creates an interface with a random hardware address.
    pub fn new(name: impl Into<String>, node: ObjId, ifindex: IfIndex) -> Self {
        Self { name: name.into(), node, ifindex, hwaddr: MacAddr::random(), state: Mutex::default() }
    }

    pub fn with_hwaddr(mut self, hwaddr: MacAddr) -> Self {
        self.hwaddr = hwaddr;
        self
    }

    pub fn with_addrs<S: Into<String>>(self, addrs: impl IntoIterator<Item = S>) -> Self {
        self.state.lock().addrs = addrs.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_params(self, params: LinkParams) -> Self {
        self.state.lock().params = params;
        self
    }

    pub fn add_addr(&self, addr: impl Into<String>) {
        self.state.lock().addrs.push(addr.into());
    }

    pub fn del_addr(&self, addr: &str) -> bool {
        let mut state = self.state.lock();
        let before = state.addrs.len();
        state.addrs.retain(|a| a != addr);
        state.addrs.len() != before
    }
}

impl NetInterface for VirtualIf {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn node_id(&self) -> Option<ObjId> {
        Some(self.node)
    }

    fn ifindex(&self) -> Option<IfIndex> {
        Some(self.ifindex)
    }

    fn hwaddr(&self) -> Option<MacAddr> {
        Some(self.hwaddr)
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
        self.state.lock().net
    }

    fn attach_net(&self, net: ObjId) {
        self.state.lock().net = Some(net);
    }

    fn detach_net(&self) {
        self.state.lock().net = None;
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
        self.state.lock().position = Some(position);
        fire_poshook(self, position);
    }
}
