//! Wireless and mobility model plug-ins for WLAN networks.
//!
//! A [`ModelFactory`] declares the [`ModelKind`] it builds and is resolved by name through a
//! [`ModelRegistry`]. Binding a model to a network produces a [`BoundModel`], which the
//! network stores in the slot for that kind.

use std::{collections::BTreeMap, fmt, sync::Arc};

use emu_common::{ObjId, Position, SessionId};
use rustc_hash::FxHashMap;

use crate::{
    api::MessageFlags,
    error::Result,
    interface::NetInterface,
    link::LinkData,
    node::Network,
};

mod range;
pub use range::{BasicRangeConfig, BasicRangeFactory, BasicRangeModel, BASIC_RANGE};

/// Model configuration values by key.
pub type ModelConfig = BTreeMap<String, String>;

/// The configuration class of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelKind {
    Wireless,
    Mobility,
}

impl ModelKind {
    /// The configuration class code carried in configuration messages.
    pub const fn api_class(&self) -> u8 {
        match self {
            Self::Wireless => 0x01,
            Self::Mobility => 0x02,
        }
    }
}

/// The network a model is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelContext {
    pub session: SessionId,
    pub object_id: ObjId,
}

/// A propagation model deciding which interfaces of a WLAN can reach each other.
pub trait WirelessModel: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Whether the model wants [`WirelessModel::position_callback`] installed on interfaces.
    fn wants_position(&self) -> bool {
        true
    }

    /// Called whenever the node owning `netif` moves.
    fn position_callback(&self, netif: &dyn NetInterface, position: Position);

    /// Applies the model's link parameters to the interfaces of `net`.
    fn set_link_params(&self, net: &dyn Network) -> Result<()>;

    /// Links the model knows about beyond plain bridge attachment.
    fn all_link_data(&self, flags: MessageFlags) -> Vec<LinkData>;

    /// Applies new configuration values. Returns whether they were accepted.
    fn update_config(&self, values: &ModelConfig) -> bool;

    /// Forgets `netif` after it left the network.
    fn detach(&self, _netif: &dyn NetInterface) {}

    /// Releases whatever the model holds. Called when it is replaced or the network stops.
    fn stop(&self) {}
}

/// A model moving nodes over time.
pub trait MobilityModel: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn update_config(&self, values: &ModelConfig) -> bool;

    fn stop(&self) {}
}

/// A model instance built for a specific network.
#[derive(Debug)]
pub enum BoundModel {
    Wireless(Arc<dyn WirelessModel>),
    Mobility(Box<dyn MobilityModel>),
}

impl BoundModel {
    pub fn kind(&self) -> ModelKind {
        match self {
            Self::Wireless(_) => ModelKind::Wireless,
            Self::Mobility(_) => ModelKind::Mobility,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Wireless(model) => model.name(),
            Self::Mobility(model) => model.name(),
        }
    }
}

/// Builds model instances of one kind.
pub trait ModelFactory: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> ModelKind;

    fn build(&self, ctx: ModelContext, config: &ModelConfig) -> Result<BoundModel>;
}

/// Model factories by name.
#[derive(Default)]
pub struct ModelRegistry {
    factories: FxHashMap<String, Arc<dyn ModelFactory>>,
}

impl fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.factories.keys().collect();
        names.sort();
        f.debug_struct("ModelRegistry").field("factories", &names).finish()
    }
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in models.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(BasicRangeFactory));
        registry
    }

    /// Registers `factory` under its name, returning the factory it replaced.
    pub fn register(&mut self, factory: Arc<dyn ModelFactory>) -> Option<Arc<dyn ModelFactory>> {
        self.factories.insert(factory.name().to_owned(), factory)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ModelFactory>> {
        self.factories.get(name).cloned()
    }

    /// Sorted names of the registered models of `kind`.
    pub fn names(&self, kind: ModelKind) -> Vec<String> {
        let mut names: Vec<String> =
            self.factories.values().filter(|f| f.kind() == kind).map(|f| f.name().to_owned()).collect();
        names.sort();
        names
    }
}
