use std::{fmt, sync::Arc};

use emu_common::{ObjId, Position};
use emu_host::command;

use crate::{
    api::{MessageFlags, NodeKind},
    error::Result,
    interface::{LinkParams, NetInterface},
    link::LinkData,
};

/// Outcome of a startup that did not fail outright.
#[derive(Debug)]
pub enum StartupStatus {
    Started,
    /// Started, but an optional step failed and was skipped.
    Degraded(command::Error),
    /// A bridge from a previous session holds this node's name pattern. Nothing was created.
    Stale { bridge: String },
}

impl StartupStatus {
    pub const fn is_started(&self) -> bool {
        !matches!(self, Self::Stale { .. })
    }
}

/// A node record.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeData {
    pub message_type: MessageFlags,
    pub id: ObjId,
    pub kind: NodeKind,
    pub name: String,
    pub position: Option<Position>,
    /// Name of the bound wireless model, if any.
    pub model: Option<String>,
}

/// An emulated node.
pub trait Node: Send + Sync + fmt::Debug {
    fn id(&self) -> ObjId;

    fn name(&self) -> &str;

    fn kind(&self) -> NodeKind;

    fn position(&self) -> Option<Position>;

    fn set_position(&self, position: Position);

    fn is_up(&self) -> bool;

    /// Creates the host resources of this node. Calling it on a running node is a no-op.
    fn startup(&self) -> Result<StartupStatus>;

    /// Releases the host resources of this node. Every step is attempted; the first failure
    /// is returned and the node is down afterwards either way.
    fn shutdown(&self) -> Result<()>;

    fn data(&self, flags: MessageFlags) -> Option<NodeData> {
        Some(NodeData {
            message_type: flags,
            id: self.id(),
            kind: self.kind(),
            name: self.name().to_owned(),
            position: self.position(),
            model: None,
        })
    }

    fn all_link_data(&self, flags: MessageFlags) -> Vec<LinkData>;
}

/// A node interfaces attach to.
pub trait Network: Node {
    fn attach(&self, netif: Arc<dyn NetInterface>) -> Result<()>;

    fn detach(&self, netif: &dyn NetInterface) -> Result<()>;

    /// Attached interfaces, in attachment order.
    fn netifs(&self) -> Vec<Arc<dyn NetInterface>>;

    /// Applies link-quality parameters to an attached interface.
    fn link_config(&self, netif: &dyn NetInterface, params: LinkParams) -> Result<()>;
}
