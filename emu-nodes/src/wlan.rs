//! Wireless LAN: a bridge whose connectivity is decided by a pluggable wireless model.

use std::sync::Arc;

use emu_common::{ObjId, Position, SessionId};
use emu_host::Host;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, debug_span, info};

use crate::{
    api::{MessageFlags, NodeKind},
    bridge::{forward_node_identity, BridgeNet},
    error::{Error, Result, Teardown},
    interface::{replay_position, LinkParams, NetInterface, PosHook},
    link::LinkData,
    model::{BoundModel, MobilityModel, ModelConfig, ModelContext, ModelFactory, WirelessModel},
    node::{Network, Node, NodeData, StartupStatus},
};

#[derive(Debug)]
pub struct WlanNode {
    base: BridgeNet,
    session: SessionId,
    wireless: RwLock<Option<Arc<dyn WirelessModel>>>,
    mobility: Mutex<Option<Box<dyn MobilityModel>>>,
}

impl WlanNode {
    pub fn new(host: Host, session: SessionId, id: ObjId) -> Self {
        Self {
            base: BridgeNet::new(host, session, id, NodeKind::Wlan),
            session,
            wireless: RwLock::new(None),
            mobility: Mutex::new(None),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.base = self.base.with_name(name);
        self
    }

    pub fn brname(&self) -> &str {
        self.base.brname()
    }

    pub fn wireless_model(&self) -> Option<Arc<dyn WirelessModel>> {
        self.wireless.read().clone()
    }

    pub fn mobility_model_name(&self) -> Option<String> {
        self.mobility.lock().as_ref().map(|m| m.name().to_owned())
    }

    /// Builds a model from `factory` for this network and binds it, replacing and stopping a
    /// previously bound model of the same kind.
    ///
    /// A wireless model gets its position hook installed on every attached interface and its
    /// link parameters applied.
    pub fn set_model(&self, factory: &dyn ModelFactory, config: &ModelConfig) -> Result<()> {
        let ctx = ModelContext { session: self.session, object_id: self.base.id() };
        let model = factory.build(ctx, config)?;
        if model.kind() != factory.kind() {
            return Err(Error::Model(format!(
                "factory {} declares {:?} models but built a {:?} model",
                factory.name(),
                factory.kind(),
                model.kind()
            )));
        }

        match model {
            BoundModel::Wireless(model) => {
                info!(id = %self.base.id(), model = %model.name(), "wireless model bound");
                if let Some(old) = self.wireless.write().replace(Arc::clone(&model)) {
                    debug!(model = %old.name(), "stopping replaced wireless model");
                    old.stop();
                }
                self.wire(&model)
            }
            BoundModel::Mobility(model) => {
                info!(id = %self.base.id(), model = %model.name(), "mobility model bound");
                if let Some(old) = self.mobility.lock().replace(model) {
                    debug!(model = %old.name(), "stopping replaced mobility model");
                    old.stop();
                }
                Ok(())
            }
        }
    }

    /// Updates the bound wireless model named `name`. Returns whether the update was applied;
    /// an accepted update re-installs the position hooks and reapplies link parameters.
    pub fn update_model(&self, name: &str, values: &ModelConfig) -> Result<bool> {
        let Some(model) = self.wireless_model() else {
            return Ok(false);
        };
        if model.name() != name {
            debug!(bound = %model.name(), requested = %name, "ignoring update for unbound model");
            return Ok(false);
        }
        if !model.update_config(values) {
            return Ok(false);
        }

        self.wire(&model)?;
        Ok(true)
    }

    fn wire(&self, model: &Arc<dyn WirelessModel>) -> Result<()> {
        for netif in self.base.netifs() {
            install_hook(model, netif.as_ref());
        }
        model.set_link_params(self)
    }
}

/// Points the interface's position hook at `model` and replays the current position. The
/// hook only holds a weak reference, so a replaced model is not kept alive by interfaces.
fn install_hook(model: &Arc<dyn WirelessModel>, netif: &dyn NetInterface) {
    if !model.wants_position() {
        netif.set_poshook(None);
        return;
    }

    let weak = Arc::downgrade(model);
    let hook: PosHook = Arc::new(move |netif: &dyn NetInterface, position: Position| {
        if let Some(model) = weak.upgrade() {
            model.position_callback(netif, position);
        }
    });
    netif.set_poshook(Some(hook));
    replay_position(netif);
}

impl Node for WlanNode {
    forward_node_identity!(base);

    fn startup(&self) -> Result<StartupStatus> {
        self.base.startup()
    }

    /// Stops the bound models and removes the bridge.
    fn shutdown(&self) -> Result<()> {
        let _span = debug_span!("shutdown", id = %self.base.id(), name = %self.base.name()).entered();

        for netif in self.base.netifs() {
            netif.set_poshook(None);
        }
        if let Some(model) = self.wireless.write().take() {
            model.stop();
        }
        if let Some(model) = self.mobility.lock().take() {
            model.stop();
        }

        let mut teardown = Teardown::default();
        teardown.step(self.base.shutdown(), "bridge shutdown", self.base.brname());
        teardown.finish()
    }

    fn data(&self, flags: MessageFlags) -> Option<NodeData> {
        let mut data = self.base.data(flags);
        data.model = self.wireless_model().map(|m| m.name().to_owned());
        Some(data)
    }

    /// Attachment records followed by the links reported by the wireless model.
    fn all_link_data(&self, flags: MessageFlags) -> Vec<LinkData> {
        let mut links = self.base.all_link_data(flags);
        if let Some(model) = self.wireless_model() {
            links.extend(model.all_link_data(flags));
        }
        links
    }
}

impl Network for WlanNode {
    fn attach(&self, netif: Arc<dyn NetInterface>) -> Result<()> {
        self.base.attach(Arc::clone(&netif))?;
        if let Some(model) = self.wireless_model() {
            install_hook(&model, netif.as_ref());
        }
        Ok(())
    }

    fn detach(&self, netif: &dyn NetInterface) -> Result<()> {
        let res = self.base.detach(netif);
        if !matches!(res, Err(Error::NotAttached(_))) {
            netif.set_poshook(None);
            if let Some(model) = self.wireless_model() {
                model.detach(netif);
            }
        }
        res
    }

    fn netifs(&self) -> Vec<Arc<dyn NetInterface>> {
        self.base.netifs()
    }

    fn link_config(&self, netif: &dyn NetInterface, params: LinkParams) -> Result<()> {
        self.base.link_config(netif, params)
    }
}
