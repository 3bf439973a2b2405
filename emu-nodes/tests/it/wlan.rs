use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use emu_common::{ObjId, Position, SessionId};
use emu_host::testing::SimHost;
use emu_nodes::{
    model::{
        BasicRangeFactory, BasicRangeModel, BoundModel, MobilityModel, ModelConfig, ModelContext, ModelFactory,
        ModelKind, WirelessModel, BASIC_RANGE,
    },
    Error, LinkData, LinkParams, MessageFlags, NetInterface, Network, Node, Result, WlanNode,
};
use parking_lot::Mutex;

use crate::helpers::{delay, init_tracing, veth};

/// A wireless model recording how it is driven.
#[derive(Debug, Default)]
struct Recorder {
    callbacks: Mutex<Vec<(String, Position)>>,
    link_params: AtomicUsize,
    stopped: AtomicUsize,
}

impl WirelessModel for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }

    fn position_callback(&self, netif: &dyn NetInterface, position: Position) {
        self.callbacks.lock().push((netif.name(), position));
    }

    fn set_link_params(&self, net: &dyn Network) -> Result<()> {
        self.link_params.fetch_add(1, Ordering::SeqCst);
        for netif in net.netifs() {
            net.link_config(netif.as_ref(), delay(1000))?;
        }
        Ok(())
    }

    fn all_link_data(&self, _flags: MessageFlags) -> Vec<LinkData> {
        Vec::new()
    }

    fn update_config(&self, values: &ModelConfig) -> bool {
        !values.contains_key("reject")
    }

    fn stop(&self) {
        self.stopped.fetch_add(1, Ordering::SeqCst);
    }
}

/// Hands out one shared [`Recorder`] so the test can inspect it.
struct RecorderFactory(Arc<Recorder>);

impl ModelFactory for RecorderFactory {
    fn name(&self) -> &str {
        "recorder"
    }

    fn kind(&self) -> ModelKind {
        ModelKind::Wireless
    }

    fn build(&self, _ctx: ModelContext, _config: &ModelConfig) -> Result<BoundModel> {
        Ok(BoundModel::Wireless(self.0.clone()))
    }
}

#[derive(Debug)]
struct Walk(Arc<AtomicUsize>);

impl MobilityModel for Walk {
    fn name(&self) -> &str {
        "walk"
    }

    fn update_config(&self, _values: &ModelConfig) -> bool {
        true
    }

    fn stop(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

struct WalkFactory(Arc<AtomicUsize>);

impl ModelFactory for WalkFactory {
    fn name(&self) -> &str {
        "walk"
    }

    fn kind(&self) -> ModelKind {
        ModelKind::Mobility
    }

    fn build(&self, _ctx: ModelContext, _config: &ModelConfig) -> Result<BoundModel> {
        Ok(BoundModel::Mobility(Box::new(Walk(self.0.clone()))))
    }
}

/// Declares a mobility model but builds a wireless one.
struct Liar;

impl ModelFactory for Liar {
    fn name(&self) -> &str {
        "liar"
    }

    fn kind(&self) -> ModelKind {
        ModelKind::Mobility
    }

    fn build(&self, ctx: ModelContext, _config: &ModelConfig) -> Result<BoundModel> {
        Ok(BoundModel::Wireless(Arc::new(BasicRangeModel::new(ctx, Default::default()))))
    }
}

fn values(pairs: &[(&str, &str)]) -> ModelConfig {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

fn wlan_with_two(sim: &Arc<SimHost>) -> (WlanNode, Vec<Arc<dyn NetInterface>>) {
    let wlan = WlanNode::new(sim.host(), SessionId(1), ObjId(10));
    wlan.startup().unwrap();

    let mut netifs: Vec<Arc<dyn NetInterface>> = Vec::new();
    for (node, x) in [(1, 0.0), (2, 100.0)] {
        let netif = veth(sim, node, &[], LinkParams::default());
        netif.set_position(Position::new(x, 0.0, 0.0));
        wlan.attach(netif.clone()).unwrap();
        netifs.push(netif);
    }
    (wlan, netifs)
}

#[test]
fn set_model_wires_every_interface() {
    init_tracing();
    let sim = SimHost::new();
    let (wlan, netifs) = wlan_with_two(&sim);
    let recorder = Arc::new(Recorder::default());

    wlan.set_model(&RecorderFactory(recorder.clone()), &ModelConfig::new()).unwrap();

    let callbacks = recorder.callbacks.lock().clone();
    assert_eq!(
        callbacks,
        vec![("veth1.0".to_string(), Position::new(0.0, 0.0, 0.0)), ("veth2.0".to_string(), Position::new(100.0, 0.0, 0.0))]
    );
    assert_eq!(recorder.link_params.load(Ordering::SeqCst), 1);
    for netif in &netifs {
        assert_eq!(netif.params(), delay(1000));
        assert_eq!(sim.link(&netif.name()).unwrap().qdisc.as_deref(), Some("handle 10: netem delay 1000us"));
    }

    // Moving a node reaches the model through the hook.
    netifs[0].set_position(Position::new(5.0, 5.0, 0.0));
    assert_eq!(recorder.callbacks.lock().len(), 3);
}

#[test]
fn update_model_with_other_name_is_noop() {
    init_tracing();
    let sim = SimHost::new();
    let (wlan, _netifs) = wlan_with_two(&sim);
    let recorder = Arc::new(Recorder::default());
    wlan.set_model(&RecorderFactory(recorder.clone()), &ModelConfig::new()).unwrap();

    assert!(!wlan.update_model(BASIC_RANGE, &values(&[("range", "10")])).unwrap());
    assert_eq!(recorder.callbacks.lock().len(), 2);
    assert_eq!(recorder.link_params.load(Ordering::SeqCst), 1);
    assert_eq!(wlan.wireless_model().unwrap().name(), "recorder");

    // Rejected updates change nothing either.
    assert!(!wlan.update_model("recorder", &values(&[("reject", "1")])).unwrap());
    assert_eq!(recorder.link_params.load(Ordering::SeqCst), 1);
}

#[test]
fn accepted_update_rewires() {
    init_tracing();
    let sim = SimHost::new();
    let (wlan, _netifs) = wlan_with_two(&sim);
    let recorder = Arc::new(Recorder::default());
    wlan.set_model(&RecorderFactory(recorder.clone()), &ModelConfig::new()).unwrap();

    assert!(wlan.update_model("recorder", &values(&[("range", "10")])).unwrap());
    assert_eq!(recorder.link_params.load(Ordering::SeqCst), 2);

    let callbacks = recorder.callbacks.lock().clone();
    assert_eq!(callbacks.len(), 4);
    assert_eq!(callbacks[2].0, "veth1.0");
    assert_eq!(callbacks[3].0, "veth2.0");
}

#[test]
fn update_without_model_is_noop() {
    let sim = SimHost::new();
    let wlan = WlanNode::new(sim.host(), SessionId(1), ObjId(10));
    assert!(!wlan.update_model(BASIC_RANGE, &ModelConfig::new()).unwrap());
}

#[test]
fn rebinding_stops_previous_models() {
    init_tracing();
    let sim = SimHost::new();
    let (wlan, netifs) = wlan_with_two(&sim);
    let recorder = Arc::new(Recorder::default());
    wlan.set_model(&RecorderFactory(recorder.clone()), &ModelConfig::new()).unwrap();

    wlan.set_model(&BasicRangeFactory, &values(&[("range", "50")])).unwrap();
    assert_eq!(recorder.stopped.load(Ordering::SeqCst), 1);
    assert_eq!(wlan.wireless_model().unwrap().name(), BASIC_RANGE);

    // The old model no longer hears about moves.
    let before = recorder.callbacks.lock().len();
    netifs[1].set_position(Position::new(10.0, 0.0, 0.0));
    assert_eq!(recorder.callbacks.lock().len(), before);

    // 0 and 10 are within range 50: two attachments and one wireless link.
    let links = wlan.all_link_data(MessageFlags::ADD);
    assert_eq!(links.len(), 3);

    let stops = Arc::new(AtomicUsize::new(0));
    wlan.set_model(&WalkFactory(stops.clone()), &ModelConfig::new()).unwrap();
    wlan.set_model(&WalkFactory(stops.clone()), &ModelConfig::new()).unwrap();
    assert_eq!(stops.load(Ordering::SeqCst), 1);
    assert_eq!(wlan.mobility_model_name().as_deref(), Some("walk"));
    // Binding a mobility model leaves the wireless model alone.
    assert_eq!(wlan.wireless_model().unwrap().name(), BASIC_RANGE);

    wlan.shutdown().unwrap();
    assert_eq!(stops.load(Ordering::SeqCst), 2);
    assert!(wlan.mobility_model_name().is_none());
}

#[test]
fn factory_kind_mismatch_is_rejected() {
    let sim = SimHost::new();
    let wlan = WlanNode::new(sim.host(), SessionId(1), ObjId(10));
    let err = wlan.set_model(&Liar, &ModelConfig::new()).unwrap_err();
    assert!(matches!(err, Error::Model(_)));
    assert!(wlan.wireless_model().is_none());
}

#[test]
fn bad_model_config_is_rejected() {
    let sim = SimHost::new();
    let wlan = WlanNode::new(sim.host(), SessionId(1), ObjId(10));
    let err = wlan.set_model(&BasicRangeFactory, &values(&[("bandwidth", "lots")])).unwrap_err();
    assert!(matches!(err, Error::Model(_)));
}

#[test]
fn detached_interface_loses_its_wireless_links() {
    init_tracing();
    let sim = SimHost::new();
    let (wlan, netifs) = wlan_with_two(&sim);
    wlan.set_model(&BasicRangeFactory, &ModelConfig::new()).unwrap();

    let links = wlan.all_link_data(MessageFlags::ADD);
    assert_eq!(links.len(), 3);
    assert!(links.iter().any(|l| (l.node1_id, l.node2_id) == (ObjId(1), ObjId(2))));

    wlan.detach(netifs[1].as_ref()).unwrap();
    let links = wlan.all_link_data(MessageFlags::ADD);
    assert_eq!(links.len(), 1);
    assert_eq!((links[0].node1_id, links[0].node2_id), (ObjId(10), ObjId(1)));

    // Moving the remaining interface does not bring the link back.
    netifs[0].set_position(Position::new(1.0, 0.0, 0.0));
    assert_eq!(wlan.all_link_data(MessageFlags::ADD).len(), 1);
}
