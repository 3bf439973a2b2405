//! An in-memory host used to exercise node lifecycles without touching the kernel.
//!
//! [`SimHost`] implements [`Executor`] by interpreting the `brctl`, `ip` and `tc` command forms
//! issued by [`Host`](crate::host::Host). It keeps a model of bridges, links, addresses and
//! qdiscs, records every command line, and can be told to fail commands matching a pattern.

use std::{collections::BTreeMap, sync::Arc};

use parking_lot::Mutex;

use crate::{
    command::{self, Executor, Output},
    host::{Host, HostOptions},
};

/// A simulated bridge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimBridge {
    pub ports: Vec<String>,
    pub ageing: Option<u32>,
    pub stp: bool,
    pub forward_delay: Option<u32>,
}

/// A simulated network device. Bridges are links with `bridge` set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimLink {
    pub up: bool,
    pub addrs: Vec<(String, Option<String>)>,
    /// The arguments of the installed root qdisc, if any.
    pub qdisc: Option<String>,
    pub master: Option<String>,
    pub bridge: Option<SimBridge>,
}

#[derive(Debug, Default)]
struct State {
    links: BTreeMap<String, SimLink>,
    history: Vec<String>,
    failures: Vec<String>,
}

#[derive(Debug, Default)]
pub struct SimHost {
    state: Mutex<State>,
}

impl SimHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A [`Host`] gateway backed by this simulation.
    pub fn host(self: &Arc<Self>) -> Host {
        Host::with_executor(self.clone(), HostOptions::default())
    }

    /// Adds a plain device, e.g. a physical NIC or a veth end.
    pub fn add_link(&self, name: &str, up: bool, addrs: &[(&str, Option<&str>)]) {
        let link = SimLink {
            up,
            addrs: addrs.iter().map(|(a, b)| (a.to_string(), b.map(str::to_owned))).collect(),
            ..Default::default()
        };
        self.state.lock().links.insert(name.to_owned(), link);
    }

    /// Adds a bridge that was not created through [`Host`], e.g. one left by an old session.
    pub fn add_bridge(&self, name: &str) {
        let link = SimLink { bridge: Some(SimBridge::default()), ..Default::default() };
        self.state.lock().links.insert(name.to_owned(), link);
    }

    /// Makes every command whose command line contains `pattern` fail.
    pub fn fail_matching(&self, pattern: &str) {
        self.state.lock().failures.push(pattern.to_owned());
    }

    pub fn clear_failures(&self) {
        self.state.lock().failures.clear();
    }

    pub fn link(&self, name: &str) -> Option<SimLink> {
        self.state.lock().links.get(name).cloned()
    }

    pub fn bridge(&self, name: &str) -> Option<SimBridge> {
        self.link(name).and_then(|link| link.bridge)
    }

    /// Every command line executed so far, in order.
    pub fn history(&self) -> Vec<String> {
        self.state.lock().history.clone()
    }

    /// Whether any executed command line contains `pattern`.
    pub fn ran(&self, pattern: &str) -> bool {
        self.state.lock().history.iter().any(|cmd| cmd.contains(pattern))
    }

    pub fn clear_history(&self) {
        self.state.lock().history.clear();
    }
}

impl Executor for SimHost {
    fn execute(&self, program: &str, args: &[&str]) -> command::Result<Output> {
        let line = std::iter::once(program).chain(args.iter().copied()).collect::<Vec<_>>().join(" ");
        tracing::debug!(cmd = %line, "simulated command");

        let mut state = self.state.lock();
        state.history.push(line.clone());

        let result = if state.failures.iter().any(|f| line.contains(f.as_str())) {
            Err("injected failure".to_string())
        } else {
            match program {
                "brctl" => state.brctl(args),
                "ip" => state.ip(args),
                "tc" => state.tc(args),
                _ => Ok(String::new()),
            }
        };

        match result {
            Ok(stdout) => Ok(Output { status: Some(0), stdout, stderr: String::new() }),
            Err(stderr) => Err(command::Error::NonZero {
                program: program.to_owned(),
                args: args.iter().map(|a| a.to_string()).collect(),
                output: Output { status: Some(1), stdout: String::new(), stderr },
            }),
        }
    }
}

type SimResult = Result<String, String>;

impl State {
    fn link_mut(&mut self, name: &str) -> Result<&mut SimLink, String> {
        self.links.get_mut(name).ok_or_else(|| format!("Cannot find device \"{name}\""))
    }

    fn bridge_mut(&mut self, name: &str) -> Result<&mut SimBridge, String> {
        self.link_mut(name)?.bridge.as_mut().ok_or_else(|| format!("{name} is not a bridge"))
    }

    fn brctl(&mut self, args: &[&str]) -> SimResult {
        match args {
            ["show"] => {
                let mut out = String::from("bridge name\tbridge id\t\tSTP enabled\tinterfaces\n");
                for (name, link) in &self.links {
                    let Some(bridge) = &link.bridge else { continue };
                    let stp = if bridge.stp { "yes" } else { "no" };
                    let first = bridge.ports.first().map(String::as_str).unwrap_or("");
                    out.push_str(&format!("{name}\t\t8000.000000000000\t{stp}\t\t{first}\n"));
                    for port in bridge.ports.iter().skip(1) {
                        out.push_str(&format!("\t\t\t\t\t\t\t{port}\n"));
                    }
                }
                Ok(out)
            }
            ["addbr", name] => {
                if self.links.contains_key(*name) {
                    return Err(format!("device {name} already exists; can't create bridge with the same name"));
                }
                let link = SimLink { bridge: Some(SimBridge { stp: true, ..Default::default() }), ..Default::default() };
                self.links.insert(name.to_string(), link);
                Ok(String::new())
            }
            ["delbr", name] => {
                let link = self.link_mut(name)?;
                if link.bridge.is_none() {
                    return Err(format!("{name} is not a bridge"));
                }
                if link.up {
                    return Err(format!("bridge {name} is still up; can't delete it"));
                }
                let removed = self.links.remove(*name).and_then(|l| l.bridge).unwrap_or_default();
                for port in removed.ports {
                    if let Some(port) = self.links.get_mut(&port) {
                        port.master = None;
                    }
                }
                Ok(String::new())
            }
            ["stp", name, value] => {
                self.bridge_mut(name)?.stp = *value == "on";
                Ok(String::new())
            }
            ["setfd", name, value] => {
                self.bridge_mut(name)?.forward_delay = value.parse().ok();
                Ok(String::new())
            }
            ["setageing", name, value] => {
                let ageing = value.parse().map_err(|_| format!("bad ageing time {value}"))?;
                self.bridge_mut(name)?.ageing = Some(ageing);
                Ok(String::new())
            }
            ["addif", name, port] => {
                self.bridge_mut(name)?;
                let link = self.link_mut(port)?;
                if link.master.is_some() {
                    return Err(format!("device {port} is already a member of a bridge"));
                }
                link.master = Some(name.to_string());
                self.bridge_mut(name)?.ports.push(port.to_string());
                Ok(String::new())
            }
            ["delif", name, port] => {
                let bridge = self.bridge_mut(name)?;
                let before = bridge.ports.len();
                bridge.ports.retain(|p| p != port);
                if bridge.ports.len() == before {
                    return Err(format!("device {port} is not a slave of {name}"));
                }
                if let Some(link) = self.links.get_mut(*port) {
                    link.master = None;
                }
                Ok(String::new())
            }
            _ => Err(format!("unsupported brctl command: {args:?}")),
        }
    }

    fn ip(&mut self, args: &[&str]) -> SimResult {
        match args {
            ["link", "set", name, "up"] => {
                self.link_mut(name)?.up = true;
                Ok(String::new())
            }
            ["link", "set", name, "down"] => {
                self.link_mut(name)?.up = false;
                Ok(String::new())
            }
            ["link", "add", name, "type", "gretap", ..] => {
                if self.links.contains_key(*name) {
                    return Err("RTNETLINK answers: File exists".to_string());
                }
                self.links.insert(name.to_string(), SimLink::default());
                Ok(String::new())
            }
            ["link", "del", name] => {
                let link = self.links.remove(*name).ok_or_else(|| format!("Cannot find device \"{name}\""))?;
                if let Some(bridge) = link.master.and_then(|m| self.links.get_mut(&m)).and_then(|l| l.bridge.as_mut()) {
                    bridge.ports.retain(|p| p != name);
                }
                Ok(String::new())
            }
            ["addr", "add", addr, "brd", brd, "dev", name] => self.addr_add(name, addr, Some(brd)),
            ["addr", "add", addr, "dev", name] => self.addr_add(name, addr, None),
            ["addr", "del", addr, "dev", name] => {
                let link = self.link_mut(name)?;
                let before = link.addrs.len();
                link.addrs.retain(|(a, _)| a != addr);
                if link.addrs.len() == before {
                    return Err("RTNETLINK answers: Cannot assign requested address".to_string());
                }
                Ok(String::new())
            }
            ["addr", "flush", "dev", name] => {
                self.link_mut(name)?.addrs.clear();
                Ok(String::new())
            }
            ["addr", "show", "dev", name] => {
                let index = self.links.keys().position(|k| k == name).map_or(0, |i| i + 2);
                let link = self.link_mut(name)?;
                let flags = if link.up { "BROADCAST,MULTICAST,UP,LOWER_UP" } else { "BROADCAST,MULTICAST" };
                let operstate = if link.up { "UP" } else { "DOWN" };

                let mut out = format!("{index}: {name}: <{flags}> mtu 1500 qdisc noqueue state {operstate}\n");
                out.push_str("    link/ether 02:00:00:00:00:01 brd ff:ff:ff:ff:ff:ff\n");
                for (addr, brd) in &link.addrs {
                    if addr.contains(':') {
                        out.push_str(&format!("    inet6 {addr} scope global\n"));
                    } else if let Some(brd) = brd {
                        out.push_str(&format!("    inet {addr} brd {brd} scope global {name}\n"));
                    } else {
                        out.push_str(&format!("    inet {addr} scope global {name}\n"));
                    }
                    out.push_str("       valid_lft forever preferred_lft forever\n");
                }
                if link.up {
                    out.push_str("    inet6 fe80::ff:fe00:1/64 scope link\n");
                }
                Ok(out)
            }
            _ => Err(format!("unsupported ip command: {args:?}")),
        }
    }

    fn addr_add(&mut self, name: &str, addr: &str, brd: Option<&str>) -> SimResult {
        let link = self.link_mut(name)?;
        if link.addrs.iter().any(|(a, _)| a == addr) {
            return Err("RTNETLINK answers: File exists".to_string());
        }
        link.addrs.push((addr.to_string(), brd.map(str::to_owned)));
        Ok(String::new())
    }

    fn tc(&mut self, args: &[&str]) -> SimResult {
        match args {
            ["qdisc", "del", "dev", name, "root"] => {
                let link = self.link_mut(name)?;
                if link.qdisc.take().is_none() {
                    return Err("Error: Cannot delete qdisc with handle of zero.".to_string());
                }
                Ok(String::new())
            }
            ["qdisc", "replace", "dev", name, "root", rest @ ..] => {
                self.link_mut(name)?.qdisc = Some(rest.join(" "));
                Ok(String::new())
            }
            _ => Err(format!("unsupported tc command: {args:?}")),
        }
    }
}
