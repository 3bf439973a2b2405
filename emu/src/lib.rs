#![doc(issue_tracker_base_url = "https://github.com/emu-net/emu/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

pub use emu_common::{IfIndex, MacAddr, ObjId, Position, SessionId};
pub use emu_host::{command, ip, BridgeClaim, GreTapOptions, Host, HostIfState, HostOptions, NetemParams};
pub use emu_nodes::*;

#[cfg(any(test, feature = "test-utils"))]
pub use emu_host::testing;
