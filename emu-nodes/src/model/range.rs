//! A wireless model linking every pair of interfaces within a fixed range.

use std::{
    collections::{BTreeMap, BTreeSet},
    str::FromStr,
    sync::Arc,
};

use emu_common::{IfIndex, ObjId, Position};
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::{BoundModel, ModelConfig, ModelContext, ModelFactory, ModelKind, WirelessModel};
use crate::{
    api::{LinkType, MessageFlags},
    error::{Error, Result},
    interface::{LinkParams, NetInterface},
    link::{LinkData, LinkEndpoint},
    node::Network,
};

pub const BASIC_RANGE: &str = "basic_range";

/// Configuration of [`BasicRangeModel`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BasicRangeConfig {
    /// Maximum distance between two linked interfaces.
    pub range: f64,
    /// Bandwidth in bits per second.
    pub bandwidth: u64,
    /// Delay in microseconds.
    pub delay: u64,
    /// Jitter in microseconds.
    pub jitter: u64,
}

impl Default for BasicRangeConfig {
    fn default() -> Self {
        Self { range: 275.0, bandwidth: 54_000_000, delay: 20_000, jitter: 0 }
    }
}

impl BasicRangeConfig {
    /// Overrides the fields of `self` present in `values`. Unknown keys are ignored.
    pub fn merge(mut self, values: &ModelConfig) -> Result<Self> {
        for (key, value) in values {
            match key.as_str() {
                "range" => self.range = parse(key, value)?,
                "bandwidth" => self.bandwidth = parse(key, value)?,
                "delay" => self.delay = parse(key, value)?,
                "jitter" => self.jitter = parse(key, value)?,
                _ => debug!(%key, "ignoring unknown basic range option"),
            }
        }

        if !self.range.is_finite() || self.range < 0.0 {
            return Err(Error::Model(format!("invalid range {}", self.range)));
        }
        Ok(self)
    }

    pub fn link_params(&self) -> LinkParams {
        LinkParams {
            delay: Some(self.delay),
            bandwidth: Some(self.bandwidth),
            duplicate: None,
            jitter: Some(self.jitter),
        }
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| Error::Model(format!("invalid value {value:?} for {key}")))
}

#[derive(Debug, Clone, Copy)]
struct Tracked {
    node: ObjId,
    ifindex: Option<IfIndex>,
    position: Position,
}

#[derive(Debug, Default)]
struct RangeState {
    config: BasicRangeConfig,
    /// Last known position per interface name.
    tracked: BTreeMap<String, Tracked>,
    /// Linked interface pairs, smaller name first.
    links: BTreeSet<(String, String)>,
}

impl RangeState {
    fn relink(&mut self, name: &str) {
        let Some(me) = self.tracked.get(name).copied() else { return };

        let range = self.config.range;
        let others: Vec<(String, bool)> = self
            .tracked
            .iter()
            .filter(|(other, _)| other.as_str() != name)
            .map(|(other, t)| (other.clone(), t.position.distance(&me.position) <= range))
            .collect();

        for (other, near) in others {
            let key = pair(name, &other);
            if near {
                if self.links.insert(key) {
                    debug!(a = %name, b = %other, "linked");
                }
            } else if self.links.remove(&key) {
                debug!(a = %name, b = %other, "unlinked");
            }
        }
    }

    fn relink_all(&mut self) {
        let names: Vec<String> = self.tracked.keys().cloned().collect();
        for name in names {
            self.relink(&name);
        }
    }
}

fn pair(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_owned(), b.to_owned())
    } else {
        (b.to_owned(), a.to_owned())
    }
}

/// Links two interfaces whenever their nodes are within `range` of each other, and shapes
/// every interface of the network with the same bandwidth, delay and jitter.
#[derive(Debug)]
pub struct BasicRangeModel {
    ctx: ModelContext,
    state: Mutex<RangeState>,
}

impl BasicRangeModel {
    pub fn new(ctx: ModelContext, config: BasicRangeConfig) -> Self {
        Self { ctx, state: Mutex::new(RangeState { config, ..Default::default() }) }
    }

    pub fn context(&self) -> ModelContext {
        self.ctx
    }

    pub fn config(&self) -> BasicRangeConfig {
        self.state.lock().config
    }

    /// Whether the interfaces named `a` and `b` are currently linked.
    pub fn linked(&self, a: &str, b: &str) -> bool {
        self.state.lock().links.contains(&pair(a, b))
    }
}

impl WirelessModel for BasicRangeModel {
    fn name(&self) -> &str {
        BASIC_RANGE
    }

    fn position_callback(&self, netif: &dyn NetInterface, position: Position) {
        let Some(node) = netif.node_id() else { return };
        let name = netif.name();
        let tracked = Tracked { node, ifindex: netif.ifindex(), position };

        let mut state = self.state.lock();
        state.tracked.insert(name.clone(), tracked);
        state.relink(&name);
    }

    fn set_link_params(&self, net: &dyn Network) -> Result<()> {
        let params = self.config().link_params();
        for netif in net.netifs() {
            net.link_config(netif.as_ref(), params)?;
        }
        Ok(())
    }

    fn all_link_data(&self, flags: MessageFlags) -> Vec<LinkData> {
        let state = self.state.lock();
        state
            .links
            .iter()
            .filter_map(|(a, b)| Some((state.tracked.get(a)?, state.tracked.get(b)?)))
            .map(|(a, b)| LinkData {
                message_type: flags,
                node1_id: a.node,
                node2_id: b.node,
                link_type: Some(LinkType::Wireless),
                unidirectional: false,
                params: LinkParams::default(),
                interface1: LinkEndpoint::id_only(a.ifindex),
                interface2: LinkEndpoint::id_only(b.ifindex),
            })
            .collect()
    }

    fn update_config(&self, values: &ModelConfig) -> bool {
        let mut state = self.state.lock();
        match state.config.merge(values) {
            Ok(config) => {
                state.config = config;
                state.relink_all();
                true
            }
            Err(e) => {
                warn!(%e, id = %self.ctx.object_id, "rejected basic range update");
                false
            }
        }
    }

    fn detach(&self, netif: &dyn NetInterface) {
        let name = netif.name();
        let mut state = self.state.lock();
        if state.tracked.remove(&name).is_some() {
            state.links.retain(|(a, b)| *a != name && *b != name);
            debug!(netif = %name, "stopped tracking");
        }
    }

    fn stop(&self) {
        let mut state = self.state.lock();
        state.tracked.clear();
        state.links.clear();
    }
}

/// Builds [`BasicRangeModel`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicRangeFactory;

impl ModelFactory for BasicRangeFactory {
    fn name(&self) -> &str {
        BASIC_RANGE
    }

    fn kind(&self) -> ModelKind {
        ModelKind::Wireless
    }

    fn build(&self, ctx: ModelContext, config: &ModelConfig) -> Result<BoundModel> {
        let config = BasicRangeConfig::default().merge(config)?;
        debug!(id = %ctx.object_id, ?config, "building basic range model");
        Ok(BoundModel::Wireless(Arc::new(BasicRangeModel::new(ctx, config))))
    }
}
