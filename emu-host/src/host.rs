//! Typed wrappers for the bridge, interface and traffic-control commands the emulator needs.
//!
//! The argument order of every command here is fixed, since the host tools are matched
//! positionally. Each wrapper returns a [`command::Result`]; whether a failure is fatal is
//! decided by the caller.

use std::{fmt, path::Path, sync::Arc};

use tracing::warn;

use crate::{
    command::{self, Executor, Output, Runner},
    ip::{parse_cidr, IpAddrExt as _},
};

/// Prefix of every bridge device created by the emulator: `b.<objid>.<session>`.
pub const BRIDGE_PREFIX: &str = "b";

/// Program names used for host commands.
#[derive(Debug, Clone)]
pub struct HostOptions {
    pub ip_bin: String,
    pub brctl_bin: String,
    pub tc_bin: String,
    /// Optional privilege prefix, e.g. `sudo`.
    pub privilege_prefix: Option<String>,
}

impl Default for HostOptions {
    fn default() -> Self {
        Self {
            ip_bin: "ip".to_string(),
            brctl_bin: "brctl".to_string(),
            tc_bin: "tc".to_string(),
            privilege_prefix: None,
        }
    }
}

impl HostOptions {
    pub fn with_ip_bin(mut self, bin: impl Into<String>) -> Self {
        self.ip_bin = bin.into();
        self
    }

    pub fn with_brctl_bin(mut self, bin: impl Into<String>) -> Self {
        self.brctl_bin = bin.into();
        self
    }

    pub fn with_tc_bin(mut self, bin: impl Into<String>) -> Self {
        self.tc_bin = bin.into();
        self
    }

    /// Runs every command through `prefix` (e.g. `sudo`).
    pub fn with_privilege_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.privilege_prefix = Some(prefix.into());
        self
    }
}

/// Result of claiming a bridge name on the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeClaim {
    /// No bridge with the name pattern exists.
    Free,
    /// A bridge left by another (or a previous) session already uses the name pattern.
    Conflict(String),
}

/// The up-state and addresses of a host interface, read before the emulator takes it over.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostIfState {
    pub up: bool,
    /// `(address/prefix, broadcast)` pairs. IPv6 link-local addresses are skipped.
    pub addrs: Vec<(String, Option<String>)>,
}

/// Link-quality parameters for a netem qdisc. `None` leaves a parameter unset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetemParams {
    /// Delay in microseconds.
    pub delay_us: Option<u64>,
    /// Jitter in microseconds, only meaningful with a delay.
    pub jitter_us: Option<u64>,
    /// Duplication rate in percent.
    pub duplicate_pct: Option<u16>,
    /// Rate limit in bits per second.
    pub rate_bps: Option<u64>,
}

impl NetemParams {
    pub fn is_empty(&self) -> bool {
        [self.delay_us, self.jitter_us, self.rate_bps].iter().all(|p| p.unwrap_or(0) == 0)
            && self.duplicate_pct.unwrap_or(0) == 0
    }
}

/// Options for a GRE tap device.
#[derive(Debug, Clone, Default)]
pub struct GreTapOptions {
    pub remote: Option<String>,
    pub local: Option<String>,
    pub ttl: Option<u8>,
    pub key: Option<u32>,
}

/// The host command gateway.
///
/// Cheap to clone; all clones share the same [`Executor`].
#[derive(Clone)]
pub struct Host {
    executor: Arc<dyn Executor>,
    options: HostOptions,
}

impl fmt::Debug for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Host").field("options", &self.options).finish_non_exhaustive()
    }
}

impl Default for Host {
    fn default() -> Self {
        Self::new(HostOptions::default())
    }
}

impl Host {
    /// Creates a gateway that runs real host processes.
    pub fn new(options: HostOptions) -> Self {
        let runner = match &options.privilege_prefix {
            Some(prefix) => Runner::with_prefix(prefix.clone()),
            None => Runner::new(),
        };
        Self { executor: Arc::new(runner), options }
    }

    /// Creates a gateway on top of a custom executor.
    pub fn with_executor(executor: Arc<dyn Executor>, options: HostOptions) -> Self {
        Self { executor, options }
    }

    pub fn options(&self) -> &HostOptions {
        &self.options
    }

    fn ip(&self, args: &[&str]) -> command::Result<Output> {
        self.executor.execute(&self.options.ip_bin, args)
    }

    fn brctl(&self, args: &[&str]) -> command::Result<Output> {
        self.executor.execute(&self.options.brctl_bin, args)
    }

    fn tc(&self, args: &[&str]) -> command::Result<Output> {
        self.executor.execute(&self.options.tc_bin, args)
    }

    // ---------------------------------------------------------------------------------
    // Bridges
    // ---------------------------------------------------------------------------------

    /// Lists the names of all bridges on the host (`brctl show`).
    pub fn bridge_show(&self) -> command::Result<Vec<String>> {
        let output = self.brctl(&["show"])?;
        Ok(parse_bridge_names(&output.stdout))
    }

    /// Looks for a bridge named `b.<objid>.<anything>` left on the host.
    pub fn claim_bridge(&self, objid: &str) -> command::Result<BridgeClaim> {
        let claim = self
            .bridge_show()?
            .into_iter()
            .find(|name| {
                let fields: Vec<&str> = name.split('.').collect();
                fields.len() == 3 && fields[0] == BRIDGE_PREFIX && fields[1] == objid
            })
            .map_or(BridgeClaim::Free, BridgeClaim::Conflict);
        Ok(claim)
    }

    /// Creates a bridge with STP off and no forwarding delay. If configuring the new bridge
    /// fails it is removed again, so an error never leaves a bridge behind.
    pub fn bridge_add(&self, bridge: &str) -> command::Result<()> {
        self.brctl(&["addbr", bridge])?;

        let configured = self
            .brctl(&["stp", bridge, "off"])
            .and_then(|_| self.brctl(&["setfd", bridge, "0"]));
        if let Err(e) = configured {
            if let Err(e) = self.bridge_del(bridge) {
                warn!(%e, %bridge, "failed to remove half-configured bridge");
            }
            return Err(e);
        }
        Ok(())
    }

    pub fn bridge_del(&self, bridge: &str) -> command::Result<()> {
        self.brctl(&["delbr", bridge]).map(drop)
    }

    /// Sets the MAC ageing time; `0` disables learning so every frame floods.
    pub fn bridge_set_ageing(&self, bridge: &str, seconds: u32) -> command::Result<()> {
        self.brctl(&["setageing", bridge, &seconds.to_string()]).map(drop)
    }

    pub fn bridge_add_if(&self, bridge: &str, ifname: &str) -> command::Result<()> {
        self.brctl(&["addif", bridge, ifname]).map(drop)
    }

    pub fn bridge_del_if(&self, bridge: &str, ifname: &str) -> command::Result<()> {
        self.brctl(&["delif", bridge, ifname]).map(drop)
    }

    // ---------------------------------------------------------------------------------
    // Links and addresses
    // ---------------------------------------------------------------------------------

    pub fn link_up(&self, ifname: &str) -> command::Result<()> {
        self.ip(&["link", "set", ifname, "up"]).map(drop)
    }

    pub fn link_down(&self, ifname: &str) -> command::Result<()> {
        self.ip(&["link", "set", ifname, "down"]).map(drop)
    }

    pub fn link_del(&self, ifname: &str) -> command::Result<()> {
        self.ip(&["link", "del", ifname]).map(drop)
    }

    pub fn addr_add(&self, ifname: &str, addr: &str, broadcast: Option<&str>) -> command::Result<()> {
        match broadcast {
            Some(brd) => self.ip(&["addr", "add", addr, "brd", brd, "dev", ifname]),
            None => self.ip(&["addr", "add", addr, "dev", ifname]),
        }
        .map(drop)
    }

    pub fn addr_del(&self, ifname: &str, addr: &str) -> command::Result<()> {
        self.ip(&["addr", "del", addr, "dev", ifname]).map(drop)
    }

    pub fn addr_flush(&self, ifname: &str) -> command::Result<()> {
        self.ip(&["addr", "flush", "dev", ifname]).map(drop)
    }

    /// Reads the up flag and addresses of `ifname` (`ip addr show dev <ifname>`).
    pub fn addr_show(&self, ifname: &str) -> command::Result<HostIfState> {
        let output = self.ip(&["addr", "show", "dev", ifname])?;
        Ok(parse_addr_show(ifname, &output.stdout))
    }

    // ---------------------------------------------------------------------------------
    // Traffic control
    // ---------------------------------------------------------------------------------

    /// Deletes the root qdisc of `ifname`. Fails when none is installed.
    pub fn qdisc_del_root(&self, ifname: &str) -> command::Result<()> {
        self.tc(&["qdisc", "del", "dev", ifname, "root"]).map(drop)
    }

    /// Installs (or replaces) a root netem qdisc with the given parameters.
    pub fn qdisc_netem(&self, ifname: &str, params: &NetemParams) -> command::Result<()> {
        let mut args: Vec<String> = ["qdisc", "replace", "dev", ifname, "root", "handle", "10:", "netem"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        if let Some(delay) = params.delay_us.filter(|d| *d > 0) {
            args.extend(["delay".to_string(), format!("{delay}us")]);
            if let Some(jitter) = params.jitter_us.filter(|j| *j > 0) {
                args.push(format!("{jitter}us"));
            }
        }
        if let Some(dup) = params.duplicate_pct.filter(|d| *d > 0) {
            args.extend(["duplicate".to_string(), format!("{dup}%")]);
        }
        if let Some(rate) = params.rate_bps.filter(|r| *r > 0) {
            args.extend(["rate".to_string(), format!("{rate}bit")]);
        }

        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.tc(&args).map(drop)
    }

    // ---------------------------------------------------------------------------------
    // GRE tap
    // ---------------------------------------------------------------------------------

    pub fn gretap_add(&self, ifname: &str, options: &GreTapOptions) -> command::Result<()> {
        let ttl = options.ttl.map(|t| t.to_string());
        let key = options.key.map(|k| k.to_string());

        let mut args = vec!["link", "add", ifname, "type", "gretap"];
        if let Some(remote) = &options.remote {
            args.extend(["remote", remote.as_str()]);
        }
        if let Some(local) = &options.local {
            args.extend(["local", local.as_str()]);
        }
        if let Some(ttl) = &ttl {
            args.extend(["ttl", ttl.as_str()]);
        }
        if let Some(key) = &key {
            args.extend(["key", key.as_str()]);
        }
        self.ip(&args).map(drop)
    }

    // ---------------------------------------------------------------------------------
    // Scripts
    // ---------------------------------------------------------------------------------

    /// Runs a user supplied up/down script as `<script> <bridge> <action>`.
    pub fn run_updown(&self, script: &Path, bridge: &str, action: &str) -> command::Result<()> {
        self.executor.execute(&script.to_string_lossy(), &[bridge, action]).map(drop)
    }
}

/// Bridge names from `brctl show` output: the first tab-separated column of every line but
/// the header. Continuation lines (extra ports of the previous bridge) start with a tab.
fn parse_bridge_names(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .skip(1)
        .filter_map(|line| line.split('\t').next())
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_owned)
        .collect()
}

fn parse_addr_show(ifname: &str, stdout: &str) -> HostIfState {
    let mut state = HostIfState::default();
    let header = format!("{ifname}:");

    for line in stdout.lines() {
        let items: Vec<&str> = line.split_whitespace().collect();
        if items.len() < 2 {
            continue;
        }

        if items[1] == header {
            let flags = items.get(2).map(|f| f.trim_start_matches('<').trim_end_matches('>'));
            state.up = flags.is_some_and(|f| f.split(',').any(|flag| flag == "UP"));
        } else if items[0] == "inet" {
            let brd = match items.get(2) {
                Some(&"brd") => items.get(3).map(|b| b.to_string()),
                _ => None,
            };
            state.addrs.push((items[1].to_string(), brd));
        } else if items[0] == "inet6" {
            let link_local = parse_cidr(items[1]).map(|net| net.ip().is_link_local_v6()).unwrap_or(false);
            if link_local {
                continue;
            }
            state.addrs.push((items[1].to_string(), None));
        }
    }

    state
}
