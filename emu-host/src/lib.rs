#![doc(issue_tracker_base_url = "https://github.com/emu-net/emu/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

pub mod command;
pub mod host;
pub mod ip;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use host::{BridgeClaim, GreTapOptions, Host, HostIfState, HostOptions, NetemParams};
