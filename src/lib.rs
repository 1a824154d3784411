//! bq-relay - forwards SQL to BigQuery for workflow automation hosts.
//!
//! A profile binds a project ID to a service-account credential; the
//! forwarder authenticates, submits SQL, and relays the tabular result
//! unmodified.

pub mod auth;
pub mod bq;
pub mod config;
pub mod error;
pub mod forward;
pub mod logging;
pub mod output;
pub mod persistence;
pub mod safety;
