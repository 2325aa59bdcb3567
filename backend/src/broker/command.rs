use crate::filter::FilterDefinition;
use crate::service::Service;
use serde::{Deserialize, Serialize};

/// Every operation the broker understands. Arguments are plain values so a
/// command can be queued in-process or written to the control socket as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum BrokerCommand {
    AddFilter { filter: FilterDefinition },
    RemoveFilter { name: String },
    GetFilter { name: String },
    Subscribe { service: Service, filter: String },
    Unsubscribe { service: Service, filter: String },
    UnsubscribeAll { service: Service },
    SubscribedFilters { service: Service },
    ListFilters,
    SubscriberCount { name: String },
    IsSubscribed { service: Service, filter: String },
    AllSubscribedServices,
    Clear,
    Exists { name: String },
}

impl BrokerCommand {
    pub fn op_name(&self) -> &'static str {
        match self {
            BrokerCommand::AddFilter { .. } => "add_filter",
            BrokerCommand::RemoveFilter { .. } => "remove_filter",
            BrokerCommand::GetFilter { .. } => "get_filter",
            BrokerCommand::Subscribe { .. } => "subscribe",
            BrokerCommand::Unsubscribe { .. } => "unsubscribe",
            BrokerCommand::UnsubscribeAll { .. } => "unsubscribe_all",
            BrokerCommand::SubscribedFilters { .. } => "subscribed_filters",
            BrokerCommand::ListFilters => "list_filters",
            BrokerCommand::SubscriberCount { .. } => "subscriber_count",
            BrokerCommand::IsSubscribed { .. } => "is_subscribed",
            BrokerCommand::AllSubscribedServices => "all_subscribed_services",
            BrokerCommand::Clear => "clear",
            BrokerCommand::Exists { .. } => "exists",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum BrokerReply {
    Unit,
    Filter(FilterDefinition),
    Filters(Vec<FilterDefinition>),
    Names(Vec<String>),
    Count(usize),
    Flag(bool),
    Services(Vec<Service>),
}
