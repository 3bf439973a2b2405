//! Enumerations shared with the session and protocol layer.

use std::{fmt, ops::BitOr};

/// The kind of an emulated node or network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    ControlNet,
    PeerToPeer,
    Switch,
    Hub,
    Wlan,
    Rj45,
    Tunnel,
}

impl NodeKind {
    pub const ALL: [Self; 7] =
        [Self::ControlNet, Self::PeerToPeer, Self::Switch, Self::Hub, Self::Wlan, Self::Rj45, Self::Tunnel];

    /// The identity tag used by the session layer to select a node kind on creation.
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::ControlNet => "ctrlnet",
            Self::PeerToPeer => "ptp",
            Self::Switch => "lanswitch",
            Self::Hub => "hub",
            Self::Wlan => "wlan",
            Self::Rj45 => "rj45",
            Self::Tunnel => "tunnel",
        }
    }

    /// The node type code carried in node records.
    pub const fn api_type(&self) -> u8 {
        match self {
            Self::Switch => 4,
            Self::Hub => 5,
            Self::Wlan => 6,
            Self::Rj45 => 7,
            Self::Tunnel => 8,
            Self::PeerToPeer => 12,
            Self::ControlNet => 13,
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.tag() == tag)
    }

    pub fn from_api_type(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.api_type() == code)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkType {
    Wireless = 0,
    Wired = 1,
}

/// Default forwarding policy of a bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BridgePolicy {
    Accept,
    Drop,
}

/// Message flags attached to node and link records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct MessageFlags(pub u8);

impl MessageFlags {
    pub const NONE: Self = Self(0);
    pub const ADD: Self = Self(0x01);
    pub const DELETE: Self = Self(0x02);
    pub const CRI: Self = Self(0x04);
    pub const LOCAL: Self = Self(0x08);
    pub const STRING: Self = Self(0x10);
    pub const TEXT: Self = Self(0x20);
    pub const TTY: Self = Self(0x40);

    pub const fn bits(&self) -> u8 {
        self.0
    }

    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for MessageFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}
