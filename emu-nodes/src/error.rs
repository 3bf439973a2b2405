use emu_common::IfIndex;
use emu_host::{command, ip};

use crate::api::NodeKind;

/// Errors raised by node and network operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("host command failed: {0}")]
    Host(#[from] command::Error),
    #[error("address error: {0}")]
    Address(#[from] ip::Error),
    /// A structural limit of the node kind would be exceeded.
    #[error("{kind} supports at most {max} attachment(s)")]
    Capacity { kind: NodeKind, max: usize },
    #[error("interface index {0} does not exist")]
    UnknownIfIndex(IfIndex),
    #[error("interface {0} is not attached")]
    NotAttached(String),
    #[error("model error: {0}")]
    Model(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Runs the steps of a best-effort teardown: every failure is logged and the first one is
/// kept for the caller.
#[derive(Debug, Default)]
pub(crate) struct Teardown {
    first: Option<Error>,
}

impl Teardown {
    pub(crate) fn step<E: Into<Error>>(
        &mut self,
        result: std::result::Result<(), E>,
        step: &'static str,
        target: &str,
    ) {
        if let Err(e) = result {
            let e = e.into();
            tracing::warn!(%e, step, target, "teardown step failed");
            self.first.get_or_insert(e);
        }
    }

    pub(crate) fn finish(self) -> Result<()> {
        self.first.map_or(Ok(()), Err)
    }
}
