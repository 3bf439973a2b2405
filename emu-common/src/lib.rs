#![doc(issue_tracker_base_url = "https://github.com/emu-net/emu/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

use std::fmt;

mod mac;
pub use mac::{MacAddr, ParseMacError};

/// Identifier of an emulated object (node or network) within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjId(pub u32);

impl fmt::Display for ObjId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for ObjId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// Index of an interface, unique within its node.
pub type IfIndex = u32;

/// Identifier of an emulation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub u32);

impl SessionId {
    /// Returns the short session id used as the suffix of host device names.
    ///
    /// Linux interface names are limited to 15 characters, so the full id is folded to a
    /// single byte-ish hex value: `(id >> 8) ^ (id & 0xff)`.
    pub fn short(&self) -> String {
        format!("{:x}", (self.0 >> 8) ^ (self.0 & 0xff))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A position on the emulation canvas.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance to `other`.
    pub fn distance(&self, other: &Self) -> f64 {
        let (dx, dy, dz) = (self.x - other.x, self.y - other.y, self.z - other.z);
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}
