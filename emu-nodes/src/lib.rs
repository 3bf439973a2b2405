#![doc(issue_tracker_base_url = "https://github.com/emu-net/emu/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

//! Node and link model of the emulator.
//!
//! Every network kind is a host bridge ([`BridgeNet`]) with its own attachment rules and
//! lifecycle. Nodes re-describe their live state as [`NodeData`] and [`LinkData`] records
//! for the protocol layer.

pub mod api;
pub mod bridge;
pub mod ctrlnet;
mod error;
pub mod interface;
pub mod link;
pub mod model;
mod node;
pub mod ptp;
pub mod rj45;
pub mod switch;
pub mod tunnel;
pub mod wlan;

pub use api::{BridgePolicy, LinkType, MessageFlags, NodeKind};
pub use bridge::BridgeNet;
pub use ctrlnet::{CtrlNet, CtrlNetOptions, CTRLIF_IDX_BASE, DEFAULT_PREFIX_LIST};
pub use error::{Error, Result};
pub use interface::{LinkParams, NetInterface, PosHook, VirtualIf};
pub use link::{LinkData, LinkEndpoint};
pub use node::{Network, Node, NodeData, StartupStatus};
pub use ptp::PtpNet;
pub use rj45::{Rj45Node, Rj45Options};
pub use switch::{HubNode, SwitchNode};
pub use tunnel::{GreTapBridge, TunnelNode};
pub use wlan::WlanNode;
