//! Integration test modules.

mod auth_test;
mod config_test;
mod forward_test;
mod persistence_test;
