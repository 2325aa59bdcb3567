//! Filter definitions and their local evaluation.
//!
//! A filter is pure data ([`FilterDefinition`]) while it lives in the broker
//! and travels between tasks or processes. The relay that executes it turns
//! the definition into a [`CompiledFilter`] on its own side, so no code is
//! ever shipped across the broker queue.

pub mod rules;

use crate::registry::RegistryError;
use crate::service::Service;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;

pub use rules::{CompiledRule, FilterRule};

/// Number of parameters every filter predicate binds: `(message, context)`.
pub const FILTER_ARITY: usize = 2;

/// Which way a message is travelling through the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    ClientToBackend,
    BackendToClient,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::ClientToBackend => f.write_str("client->backend"),
            Direction::BackendToClient => f.write_str("backend->client"),
        }
    }
}

/// Outcome of evaluating one predicate against one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Block(String),
}

impl Verdict {
    pub fn is_block(&self) -> bool {
        matches!(self, Verdict::Block(_))
    }
}

/// Second predicate parameter: what the filter knows about the connection.
#[derive(Debug, Clone, Copy)]
pub struct FilterContext<'a> {
    pub service: &'a Service,
    pub peer: SocketAddr,
    pub direction: Direction,
}

/// A named filter as stored by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterDefinition {
    pub name: String,
    /// Names the predicate binds to the message and the context, in order.
    pub params: Vec<String>,
    pub rule: FilterRule,
}

impl FilterDefinition {
    pub fn new(name: impl Into<String>, rule: FilterRule) -> Self {
        Self {
            name: name.into(),
            params: vec!["message".to_string(), "context".to_string()],
            rule,
        }
    }

    /// Checks the two-parameter contract and that every pattern compiles.
    pub fn validate(&self) -> Result<(), RegistryError> {
        self.compile().map(|_| ())
    }

    pub fn compile(&self) -> Result<CompiledFilter, RegistryError> {
        if self.params.len() != FILTER_ARITY {
            return Err(RegistryError::InvalidArity {
                name: self.name.clone(),
                found: self.params.len(),
            });
        }
        let rule = self
            .rule
            .compile()
            .map_err(|detail| RegistryError::InvalidRule {
                name: self.name.clone(),
                detail,
            })?;
        Ok(CompiledFilter {
            name: self.name.clone(),
            rule,
        })
    }
}

/// A filter ready to run inside a relay.
#[derive(Debug, Clone)]
pub struct CompiledFilter {
    name: String,
    rule: CompiledRule,
}

impl CompiledFilter {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn evaluate(&self, message: &[u8], ctx: &FilterContext<'_>) -> Verdict {
        match self.rule.matches(message, ctx) {
            Some(reason) => Verdict::Block(reason),
            None => Verdict::Pass,
        }
    }
}

/// Result of running a whole chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainVerdict {
    Pass,
    Blocked { filter: String, reason: String },
}

/// The ordered filters subscribed to one service.
#[derive(Debug, Clone, Default)]
pub struct FilterChain {
    filters: Vec<CompiledFilter>,
}

impl FilterChain {
    /// Compiles definitions handed out by the broker. One bad definition
    /// rejects the whole chain.
    pub fn compile(definitions: &[FilterDefinition]) -> Result<Self, RegistryError> {
        let filters = definitions
            .iter()
            .map(FilterDefinition::compile)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { filters })
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Runs filters in order; the first block wins and later filters are skipped.
    pub fn evaluate(&self, message: &[u8], ctx: &FilterContext<'_>) -> ChainVerdict {
        for filter in &self.filters {
            if let Verdict::Block(reason) = filter.evaluate(message, ctx) {
                return ChainVerdict::Blocked {
                    filter: filter.name().to_string(),
                    reason,
                };
            }
        }
        ChainVerdict::Pass
    }
}
