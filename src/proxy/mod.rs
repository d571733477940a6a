//! Residential proxy identities and the local authentication relay
//!
//! Each worker owns exactly one identity for its whole lifetime. Routing
//! directives (type, country, session affinity, lifetime) are encoded into
//! the proxy username; a loopback relay injects the credentials Chrome
//! cannot attach itself.

mod config;
mod identity;
mod relay;

pub use config::ProxySettings;
pub use identity::{IdentityBuilder, ProxyIdentity};
pub use relay::{allocate_port, ProxyRelay, RelayError};
