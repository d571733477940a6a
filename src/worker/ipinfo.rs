//! Exit IP lookup through a proxy identity
//!
//! One request per worker before any search traffic, confirming which IP and
//! country the identity egresses through. Purely diagnostic; failure never
//! stops a worker.

use std::time::Duration;

use tracing::warn;

use crate::proxy::ProxyIdentity;

const LOOKUP_URL: &str = "http://ip-api.com/json";
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(20);

/// Geolocation of an egress IP as reported by the lookup service
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IpInfo {
    /// Egress IP address
    pub query: String,
    pub country: String,
    pub region_name: String,
    pub city: String,
}

impl IpInfo {
    /// One-line summary for operator logs
    pub fn summary(&self) -> String {
        format!(
            "IP: {} | Country: {} | Region: {} | City: {}",
            self.query, self.country, self.region_name, self.city
        )
    }
}

/// Resolve the exit IP the identity routes through. `None` on any failure.
pub(crate) async fn lookup_exit_ip(identity: &ProxyIdentity) -> Option<IpInfo> {
    match fetch(identity).await {
        Ok(info) => Some(info),
        Err(e) => {
            warn!("IP check failed: {}", e);
            None
        }
    }
}

async fn fetch(identity: &ProxyIdentity) -> Result<IpInfo, reqwest::Error> {
    let proxy = reqwest::Proxy::all(identity.server_url())?
        .basic_auth(&identity.username, &identity.password);

    let client = reqwest::Client::builder()
        .proxy(proxy)
        .timeout(LOOKUP_TIMEOUT)
        .build()?;

    let response = client.get(LOOKUP_URL).send().await?.error_for_status()?;
    response.json::<IpInfo>().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_format() {
        let info = IpInfo {
            query: "203.0.113.9".into(),
            country: "United States".into(),
            region_name: "Oregon".into(),
            city: "Portland".into(),
        };
        assert_eq!(
            info.summary(),
            "IP: 203.0.113.9 | Country: United States | Region: Oregon | City: Portland"
        );
    }

    #[test]
    fn test_deserializes_lookup_response() {
        let body = r#"{"status":"success","query":"203.0.113.9","country":"Germany","regionName":"Berlin","city":"Berlin","isp":"ExampleNet"}"#;
        let info: IpInfo = serde_json::from_str(body).unwrap();
        assert_eq!(info.query, "203.0.113.9");
        assert_eq!(info.region_name, "Berlin");
    }
}
