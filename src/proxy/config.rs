//! Proxy endpoint settings

/// Default sticky session lifetime in minutes
pub const DEFAULT_STICKY_LIFETIME_MINS: u16 = 10;

/// Residential proxy endpoint and routing settings
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProxySettings {
    /// Credential base username (directives are appended to it)
    pub username: String,
    /// Proxy account password
    pub password: String,
    /// Proxy gateway host
    pub host: String,
    /// Proxy gateway port
    pub port: u16,
    /// Two-letter egress country code
    pub country: String,
    /// Keep one egress IP per worker for the sticky lifetime
    pub sticky: bool,
    /// Sticky session lifetime in minutes
    pub sticky_lifetime_mins: u16,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            host: String::new(),
            port: 0,
            country: "us".to_string(),
            sticky: true,
            sticky_lifetime_mins: DEFAULT_STICKY_LIFETIME_MINS,
        }
    }
}

impl ProxySettings {
    /// Create settings for the given endpoint and credentials
    pub fn new(host: &str, port: u16, username: &str, password: &str) -> Self {
        Self {
            host: host.to_string(),
            port,
            username: username.to_string(),
            password: password.to_string(),
            ..Default::default()
        }
    }

    /// Set the egress country code
    pub fn with_country(mut self, country: &str) -> Self {
        self.country = country.to_lowercase();
        self
    }

    /// Switch between sticky and rotating routing
    pub fn with_sticky(mut self, sticky: bool) -> Self {
        self.sticky = sticky;
        self
    }

    /// Set the sticky session lifetime in minutes
    pub fn with_lifetime(mut self, minutes: u16) -> Self {
        self.sticky_lifetime_mins = minutes;
        self
    }

    /// Whether enough is configured to route through the proxy at all
    pub fn is_configured(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty() && !self.host.is_empty() && self.port != 0
    }
}
