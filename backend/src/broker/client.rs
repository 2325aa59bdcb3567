use super::{BrokerCommand, BrokerError, BrokerMessage, BrokerReply, BrokerResult};
use crate::filter::FilterDefinition;
use crate::service::Service;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Where a relay gets the filters for its service.
#[async_trait]
pub trait FilterSource: Send + Sync {
    async fn subscribed_filters(&self, service: &Service) -> BrokerResult<Vec<FilterDefinition>>;
}

/// In-process stub for the broker. Cheap to clone; every clone feeds the same queue.
#[derive(Clone)]
pub struct BrokerClient {
    tx: mpsc::Sender<BrokerMessage>,
    timeout: Duration,
}

impl BrokerClient {
    pub(crate) fn new(tx: mpsc::Sender<BrokerMessage>, timeout: Duration) -> Self {
        Self { tx, timeout }
    }

    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            tx: self.tx.clone(),
            timeout,
        }
    }

    /// Queues `command` and waits for its reply, bounded by the client's deadline.
    pub async fn ask(&self, command: BrokerCommand) -> BrokerResult<BrokerReply> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let round_trip = async {
            self.tx
                .send(BrokerMessage::Call {
                    command,
                    reply: reply_tx,
                })
                .await
                .map_err(|_| BrokerError::Unavailable)?;
            reply_rx.await.map_err(|_| BrokerError::Unavailable)?
        };

        match tokio::time::timeout(self.timeout, round_trip).await {
            Ok(result) => result,
            Err(_) => Err(BrokerError::Timeout(self.timeout.as_millis() as u64)),
        }
    }

    /// Sends the shutdown sentinel. Commands queued before it are still answered.
    pub async fn shutdown(&self) {
        if self.tx.send(BrokerMessage::Shutdown).await.is_err() {
            tracing::debug!("filter broker already stopped");
        }
    }

    pub async fn add_filter(&self, filter: FilterDefinition) -> BrokerResult<()> {
        unit(self.ask(BrokerCommand::AddFilter { filter }).await?, "add_filter")
    }

    pub async fn remove_filter(&self, name: &str) -> BrokerResult<()> {
        let cmd = BrokerCommand::RemoveFilter {
            name: name.to_string(),
        };
        unit(self.ask(cmd).await?, "remove_filter")
    }

    pub async fn get_filter(&self, name: &str) -> BrokerResult<FilterDefinition> {
        let cmd = BrokerCommand::GetFilter {
            name: name.to_string(),
        };
        match self.ask(cmd).await? {
            BrokerReply::Filter(f) => Ok(f),
            _ => Err(BrokerError::UnexpectedReply("get_filter".into())),
        }
    }

    pub async fn subscribe(&self, service: Service, filter: &str) -> BrokerResult<()> {
        let cmd = BrokerCommand::Subscribe {
            service,
            filter: filter.to_string(),
        };
        unit(self.ask(cmd).await?, "subscribe")
    }

    pub async fn unsubscribe(&self, service: Service, filter: &str) -> BrokerResult<()> {
        let cmd = BrokerCommand::Unsubscribe {
            service,
            filter: filter.to_string(),
        };
        unit(self.ask(cmd).await?, "unsubscribe")
    }

    pub async fn unsubscribe_all(&self, service: Service) -> BrokerResult<()> {
        unit(
            self.ask(BrokerCommand::UnsubscribeAll { service }).await?,
            "unsubscribe_all",
        )
    }

    pub async fn subscribed_filters(&self, service: &Service) -> BrokerResult<Vec<FilterDefinition>> {
        let cmd = BrokerCommand::SubscribedFilters {
            service: service.clone(),
        };
        match self.ask(cmd).await? {
            BrokerReply::Filters(f) => Ok(f),
            _ => Err(BrokerError::UnexpectedReply("subscribed_filters".into())),
        }
    }

    pub async fn list_filters(&self) -> BrokerResult<Vec<String>> {
        match self.ask(BrokerCommand::ListFilters).await? {
            BrokerReply::Names(n) => Ok(n),
            _ => Err(BrokerError::UnexpectedReply("list_filters".into())),
        }
    }

    pub async fn subscriber_count(&self, name: &str) -> BrokerResult<usize> {
        let cmd = BrokerCommand::SubscriberCount {
            name: name.to_string(),
        };
        match self.ask(cmd).await? {
            BrokerReply::Count(c) => Ok(c),
            _ => Err(BrokerError::UnexpectedReply("subscriber_count".into())),
        }
    }

    pub async fn is_subscribed(&self, service: &Service, filter: &str) -> BrokerResult<bool> {
        let cmd = BrokerCommand::IsSubscribed {
            service: service.clone(),
            filter: filter.to_string(),
        };
        flag(self.ask(cmd).await?, "is_subscribed")
    }

    pub async fn all_subscribed_services(&self) -> BrokerResult<Vec<Service>> {
        match self.ask(BrokerCommand::AllSubscribedServices).await? {
            BrokerReply::Services(s) => Ok(s),
            _ => Err(BrokerError::UnexpectedReply("all_subscribed_services".into())),
        }
    }

    pub async fn clear(&self) -> BrokerResult<()> {
        unit(self.ask(BrokerCommand::Clear).await?, "clear")
    }

    pub async fn exists(&self, name: &str) -> BrokerResult<bool> {
        let cmd = BrokerCommand::Exists {
            name: name.to_string(),
        };
        flag(self.ask(cmd).await?, "exists")
    }
}

#[async_trait]
impl FilterSource for BrokerClient {
    async fn subscribed_filters(&self, service: &Service) -> BrokerResult<Vec<FilterDefinition>> {
        BrokerClient::subscribed_filters(self, service).await
    }
}

fn unit(reply: BrokerReply, op: &str) -> BrokerResult<()> {
    match reply {
        BrokerReply::Unit => Ok(()),
        _ => Err(BrokerError::UnexpectedReply(op.to_string())),
    }
}

fn flag(reply: BrokerReply, op: &str) -> BrokerResult<bool> {
    match reply {
        BrokerReply::Flag(b) => Ok(b),
        _ => Err(BrokerError::UnexpectedReply(op.to_string())),
    }
}
