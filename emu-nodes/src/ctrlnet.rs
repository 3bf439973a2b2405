//! The control network: a bridge connecting the emulation host with its nodes' control
//! interfaces.

use std::path::PathBuf;

use emu_common::{IfIndex, ObjId, SessionId};
use emu_host::{
    ip::{self, PrefixExt as _},
    BridgeClaim, Host,
};
use ipnetwork::Ipv4Network;
use tracing::{debug_span, error, info, warn};

use crate::{
    api::{MessageFlags, NodeKind},
    bridge::{forward_network, forward_node_identity, BridgeNet},
    error::{Result, Teardown},
    link::LinkData,
    node::{Network, Node, StartupStatus},
};

/// Interface index of the first control interface inside a node.
pub const CTRLIF_IDX_BASE: IfIndex = 99;

/// Candidate prefixes for sessions running several control networks, one group per network.
pub const DEFAULT_PREFIX_LIST: [&str; 4] = [
    "172.16.0.0/24 172.16.1.0/24 172.16.2.0/24 172.16.3.0/24 172.16.4.0/24",
    "172.17.0.0/24 172.17.1.0/24 172.17.2.0/24 172.17.3.0/24 172.17.4.0/24",
    "172.18.0.0/24 172.18.1.0/24 172.18.2.0/24 172.18.3.0/24 172.18.4.0/24",
    "172.19.0.0/24 172.19.1.0/24 172.19.2.0/24 172.19.3.0/24 172.19.4.0/24",
];

/// Control network options.
#[derive(Debug, Clone)]
pub struct CtrlNetOptions {
    /// IPv4 prefix in CIDR notation.
    pub prefix: String,
    /// Host part of the bridge address. Defaults to the highest address of the prefix.
    pub host_id: Option<u32>,
    /// Whether to put the address on the bridge.
    pub assign_address: bool,
    /// Script run as `<script> <bridge> startup|shutdown`.
    pub updown_script: Option<PathBuf>,
    /// Host interface to join to the bridge.
    pub server_intf: Option<String>,
}

impl Default for CtrlNetOptions {
    fn default() -> Self {
        Self {
            prefix: "172.16.0.0/24".to_string(),
            host_id: None,
            assign_address: true,
            updown_script: None,
            server_intf: None,
        }
    }
}

impl CtrlNetOptions {
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub const fn with_host_id(mut self, host_id: u32) -> Self {
        self.host_id = Some(host_id);
        self
    }

    pub const fn with_assign_address(mut self, assign: bool) -> Self {
        self.assign_address = assign;
        self
    }

    pub fn with_updown_script(mut self, script: impl Into<PathBuf>) -> Self {
        self.updown_script = Some(script.into());
        self
    }

    pub fn with_server_intf(mut self, intf: impl Into<String>) -> Self {
        self.server_intf = Some(intf.into());
        self
    }
}

#[derive(Debug)]
pub struct CtrlNet {
    base: BridgeNet,
    prefix: Ipv4Network,
    options: CtrlNetOptions,
}

impl CtrlNet {
    /// Fails when the configured prefix is not an IPv4 CIDR.
    pub fn new(host: Host, session: SessionId, id: ObjId, options: CtrlNetOptions) -> Result<Self> {
        let prefix = options
            .prefix
            .trim()
            .parse::<Ipv4Network>()
            .map_err(|e| ip::Error::Cidr(options.prefix.clone(), e))?;

        Ok(Self { base: BridgeNet::new(host, session, id, NodeKind::ControlNet), prefix, options })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.base = self.base.with_name(name);
        self
    }

    pub fn brname(&self) -> &str {
        self.base.brname()
    }

    pub fn prefix(&self) -> Ipv4Network {
        self.prefix
    }

    /// The bridge address in CIDR notation: the configured host id within the prefix, or
    /// the highest usable address.
    pub fn assignment_address(&self) -> Result<String> {
        let addr = match self.options.host_id {
            Some(host_id) => self.prefix.host_addr(host_id)?,
            None => self.prefix.max_addr(),
        };
        Ok(format!("{addr}/{}", self.prefix.prefix()))
    }

    /// Looks for a bridge with this network's id left by another session. A failed lookup is
    /// an error, since the collision check cannot pass without the bridge list.
    pub fn detect_stale_bridge(&self) -> Result<Option<String>> {
        match self.base.host().claim_bridge(&self.base.id().to_string())? {
            BridgeClaim::Free => Ok(None),
            BridgeClaim::Conflict(bridge) => Ok(Some(bridge)),
        }
    }
}

impl Node for CtrlNet {
    forward_node_identity!(base);

    fn startup(&self) -> Result<StartupStatus> {
        if self.base.is_up() {
            return Ok(StartupStatus::Started);
        }
        let _span = debug_span!("startup", id = %self.base.id(), name = %self.base.name()).entered();

        if let Some(bridge) = self.detect_stale_bridge()? {
            error!(%bridge, id = %self.base.id(), "old bridge found, another session may be running");
            return Ok(StartupStatus::Stale { bridge });
        }

        let mut status = self.base.startup()?;
        let host = self.base.host();
        let brname = self.base.brname();

        let addr = self.assignment_address()?;
        if self.options.assign_address {
            self.base.addrconfig(&[addr.as_str()])?;
        }
        info!(bridge = %brname, %addr, assigned = self.options.assign_address, "control network address");

        if let Some(script) = &self.options.updown_script {
            info!(script = %script.display(), bridge = %brname, "running control network startup script");
            host.run_updown(script, brname, "startup")?;
        }

        if let Some(intf) = &self.options.server_intf {
            let joined = host.bridge_add_if(brname, intf).and_then(|_| host.link_up(intf));
            if let Err(e) = joined {
                warn!(%e, bridge = %brname, %intf, "failed to add server interface to control network");
                status = StartupStatus::Degraded(e);
            }
        }

        Ok(status)
    }

    fn shutdown(&self) -> Result<()> {
        if !self.base.is_up() {
            return Ok(());
        }
        let _span = debug_span!("shutdown", id = %self.base.id(), name = %self.base.name()).entered();

        let host = self.base.host();
        let brname = self.base.brname();
        let mut teardown = Teardown::default();

        if let Some(intf) = &self.options.server_intf {
            teardown.step(host.bridge_del_if(brname, intf), "delif server interface", intf);
        }
        if let Some(script) = &self.options.updown_script {
            info!(script = %script.display(), bridge = %brname, "running control network shutdown script");
            teardown.step(host.run_updown(script, brname, "shutdown"), "updown script", brname);
        }
        teardown.step(self.base.shutdown(), "bridge shutdown", brname);

        teardown.finish()
    }

    /// Control networks are never part of the reported topology.
    fn all_link_data(&self, _flags: MessageFlags) -> Vec<LinkData> {
        Vec::new()
    }
}

impl Network for CtrlNet {
    forward_network!(base);
}
