//! Single-writer owner of the filter registry.
//!
//! One task owns the [`FilterRegistry`] and applies commands from an mpsc
//! queue in arrival order. Every caller gets its own oneshot reply channel,
//! so replies never cross.

mod client;
mod command;
#[cfg(unix)]
pub mod remote;

pub use client::{BrokerClient, FilterSource};
pub use command::{BrokerCommand, BrokerReply};

use crate::constants;
use crate::registry::{FilterRegistry, RegistryError};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BrokerError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("filter broker is not running")]
    Unavailable,

    #[error("filter broker did not answer within {0} ms")]
    Timeout(u64),

    #[error("unexpected reply to '{0}'")]
    UnexpectedReply(String),

    #[error("broker transport error: {0}")]
    Transport(String),
}

pub type BrokerResult<T> = Result<T, BrokerError>;

/// Items on the broker queue.
pub(crate) enum BrokerMessage {
    Call {
        command: BrokerCommand,
        reply: oneshot::Sender<BrokerResult<BrokerReply>>,
    },
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerState {
    Created,
    Running,
    Stopped,
}

pub struct FilterBroker {
    registry: FilterRegistry,
    queue: mpsc::Receiver<BrokerMessage>,
    state: BrokerState,
}

impl FilterBroker {
    /// Creates a broker around an empty registry and the client that talks to it.
    pub fn new(ask_timeout: Duration) -> (Self, BrokerClient) {
        Self::with_registry(FilterRegistry::new(), ask_timeout)
    }

    pub fn with_registry(registry: FilterRegistry, ask_timeout: Duration) -> (Self, BrokerClient) {
        let (tx, rx) = mpsc::channel(constants::broker::QUEUE_CAPACITY);
        let broker = Self {
            registry,
            queue: rx,
            state: BrokerState::Created,
        };
        (broker, BrokerClient::new(tx, ask_timeout))
    }

    pub fn state(&self) -> BrokerState {
        self.state
    }

    /// Runs the loop on its own task. The handle yields the registry once the
    /// broker has stopped.
    pub fn spawn(self) -> JoinHandle<FilterRegistry> {
        tokio::spawn(self.run())
    }

    /// Processes commands until the shutdown sentinel arrives or every client
    /// is dropped.
    pub async fn run(mut self) -> FilterRegistry {
        self.state = BrokerState::Running;
        tracing::info!("🧩 Filter broker started");

        while let Some(message) = self.queue.recv().await {
            match message {
                BrokerMessage::Shutdown => break,
                BrokerMessage::Call { command, reply } => {
                    let op = command.op_name();
                    let result = self.dispatch(command);
                    if let Err(e) = &result {
                        tracing::debug!(op, error = %e, "broker command failed");
                    }
                    // The caller may have timed out and gone away.
                    if reply.send(result).is_err() {
                        tracing::debug!(op, "broker caller dropped before reply");
                    }
                }
            }
        }

        self.state = BrokerState::Stopped;
        self.queue.close();
        tracing::info!(filters = self.registry.len(), "⏹️ Filter broker stopped");
        self.registry
    }

    fn dispatch(&mut self, command: BrokerCommand) -> BrokerResult<BrokerReply> {
        let reg = &mut self.registry;
        let reply = match command {
            BrokerCommand::AddFilter { filter } => {
                let name = filter.name.clone();
                reg.add(filter)?;
                tracing::info!(filter = %name, "filter registered");
                BrokerReply::Unit
            }
            BrokerCommand::RemoveFilter { name } => {
                reg.remove(&name)?;
                tracing::info!(filter = %name, "filter removed");
                BrokerReply::Unit
            }
            BrokerCommand::GetFilter { name } => BrokerReply::Filter(reg.get(&name)?.clone()),
            BrokerCommand::Subscribe { service, filter } => {
                let service_name = service.name.clone();
                reg.subscribe(service, &filter)?;
                tracing::info!(service = %service_name, filter = %filter, "service subscribed");
                BrokerReply::Unit
            }
            BrokerCommand::Unsubscribe { service, filter } => {
                reg.unsubscribe(&service, &filter)?;
                BrokerReply::Unit
            }
            BrokerCommand::UnsubscribeAll { service } => {
                reg.unsubscribe_all(&service);
                BrokerReply::Unit
            }
            BrokerCommand::SubscribedFilters { service } => {
                BrokerReply::Filters(reg.subscribed_filters(&service))
            }
            BrokerCommand::ListFilters => BrokerReply::Names(reg.list_names()),
            BrokerCommand::SubscriberCount { name } => {
                BrokerReply::Count(reg.subscriber_count(&name)?)
            }
            BrokerCommand::IsSubscribed { service, filter } => {
                BrokerReply::Flag(reg.is_subscribed(&service, &filter))
            }
            BrokerCommand::AllSubscribedServices => {
                BrokerReply::Services(reg.all_subscribed_services())
            }
            BrokerCommand::Clear => {
                reg.clear();
                tracing::info!("all filters cleared");
                BrokerReply::Unit
            }
            BrokerCommand::Exists { name } => BrokerReply::Flag(reg.exists(&name)),
        };
        Ok(reply)
    }
}
