//! Intrusion-prevention reverse proxy for attack/defence CTF services.
//!
//! Every protected service gets its own listener on the service port. Each
//! accepted connection is relayed to the real service on the backend host,
//! message by message, and every message is run through the filters the
//! service is subscribed to. Filters and subscriptions live in a single
//! broker task that all listeners query.

pub mod bootstrap;
pub mod broker;
pub mod collaborators;
pub mod config;
pub mod constants;
pub mod error;
pub mod filter;
pub mod framing;
pub mod registry;
pub mod relay;
pub mod service;
pub mod service_manager;
pub mod service_process;
