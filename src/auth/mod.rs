//! Service-account authentication for the relay.
//!
//! Parses Google service-account key documents and exchanges signed JWT
//! assertions for short-lived OAuth2 access tokens. The `TokenSource`
//! trait is the seam the warehouse client depends on, so tests can
//! substitute a static token.

mod key;
mod token;

pub use key::ServiceAccountKey;
pub use token::{ServiceAccountTokenSource, StaticTokenSource, TokenSource};
