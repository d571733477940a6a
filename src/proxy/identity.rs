//! Proxy identity construction
//!
//! The residential gateway reads routing directives out of the username:
//! traffic type, egress country, optional sticky session token and session
//! lifetime. Building an identity is pure string composition, no I/O.

use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

use super::ProxySettings;

/// One worker's upstream proxy identity, immutable once built
#[derive(Clone)]
pub struct ProxyIdentity {
    /// Proxy gateway host
    pub host: String,
    /// Proxy gateway port
    pub port: u16,
    /// Full directive-encoded username
    pub username: String,
    /// Proxy account password
    pub password: String,
    /// Session token when sticky, `None` in rotating mode
    pub session_token: Option<String>,
}

impl ProxyIdentity {
    /// Gateway URL in the form an HTTP client proxy setting expects
    pub fn server_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Log-safe description (no password)
    pub fn label(&self) -> String {
        format!("{} via {}:{}", self.username, self.host, self.port)
    }
}

impl std::fmt::Debug for ProxyIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyIdentity")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("session_token", &self.session_token)
            .finish()
    }
}

/// Builds per-worker identities from shared proxy settings
#[derive(Debug, Clone)]
pub struct IdentityBuilder {
    settings: ProxySettings,
}

impl IdentityBuilder {
    pub fn new(settings: &ProxySettings) -> Self {
        Self { settings: settings.clone() }
    }

    /// Build the identity for a worker using the current wall clock.
    pub fn build(&self, worker_id: u32) -> ProxyIdentity {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        self.build_at(worker_id, millis)
    }

    /// Build the identity for a worker at an explicit instant.
    ///
    /// Identical `worker_id` and `unix_millis` always produce the identical
    /// identity; different instants mint different session tokens so a rerun
    /// never inherits a previous run's egress IP.
    pub fn build_at(&self, worker_id: u32, unix_millis: u64) -> ProxyIdentity {
        let session_token = if self.settings.sticky {
            Some(format!("worker{}_{}", worker_id, unix_millis))
        } else {
            None
        };
        let username = self.compose_username(session_token.as_deref());

        debug!("Worker {} proxy identity: {}", worker_id, username);

        ProxyIdentity {
            host: self.settings.host.clone(),
            port: self.settings.port,
            username,
            password: self.settings.password.clone(),
            session_token,
        }
    }

    /// Append routing directives to the credential base in gateway order.
    fn compose_username(&self, session_token: Option<&str>) -> String {
        let mut username = format!(
            "{}-type-residential-country-{}",
            self.settings.username,
            self.settings.country.to_lowercase()
        );
        if let Some(token) = session_token {
            username.push_str("-session-");
            username.push_str(token);
        }
        username.push_str("-lifetime-");
        username.push_str(&self.settings.sticky_lifetime_mins.to_string());
        username
    }
}
