//! Client for a single Nextcloud serverinfo endpoint

use crate::config::InstanceConfig;
use crate::error::{truncate_body, PollError, StructureError};
use crate::flatten::{extract_payload, flatten_envelope, FlatRecord};
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, error, info, warn};

const MAX_LOGGED_BODY: usize = 512;

/// A configured Nextcloud server and the HTTP client used to poll it
pub struct NextcloudInstance {
    config: InstanceConfig,
    client: reqwest::Client,
}

impl NextcloudInstance {
    pub fn new(config: InstanceConfig) -> Result<Self, PollError> {
        if !config.verify_ssl {
            warn!(instance = %config.name, "Disabled SSL verification for Nextcloud requests");
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .danger_accept_invalid_certs(!config.verify_ssl)
            .user_agent(concat!("nextcloud-influx/", env!("CARGO_PKG_VERSION")))
            .build()?;

        info!(instance = %config.name, "Initialized for {} ({})", config.name, config.url);
        Ok(Self { config, client })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &InstanceConfig {
        &self.config
    }

    /// GET `{url}?format=json` and decode the body
    pub async fn fetch(&self) -> Result<Value, PollError> {
        let response = self
            .client
            .get(&self.config.url)
            .query(&[("format", "json")])
            .basic_auth(&self.config.user, Some(&self.config.password))
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;

        if status != StatusCode::OK {
            let body = truncate_body(&String::from_utf8_lossy(&body), MAX_LOGGED_BODY);
            return Err(PollError::Remote { status: status.as_u16(), body });
        }

        debug!(instance = %self.config.name, "Got {} bytes", body.len());
        let tree = serde_json::from_slice(&body).map_err(StructureError::from)?;
        Ok(tree)
    }

    /// Fetch and flatten the `ocs.data` payload
    pub async fn report(&self) -> Result<FlatRecord, PollError> {
        let envelope = self.fetch().await?;
        Ok(flatten_envelope(&envelope)?)
    }

    /// Startup check: log which top-level payload sections the server exposes
    pub async fn probe(&self) {
        let keys = self.fetch().await.and_then(|envelope| {
            let data = extract_payload(&envelope)?;
            Ok(data
                .as_object()
                .map(|o| o.keys().cloned().collect::<Vec<_>>())
                .unwrap_or_default())
        });

        match keys {
            Ok(keys) => info!(instance = %self.config.name, "Found keys {}.", keys.join(", ")),
            Err(e) => error!(instance = %self.config.name, "Probe failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config(verify_ssl: bool) -> InstanceConfig {
        InstanceConfig {
            name: "sut".into(),
            user: "username".into(),
            password: "SuperSecr3t".into(),
            url: "http://here.example".into(),
            timeout: Duration::from_secs(10),
            verify_ssl,
        }
    }

    #[test]
    fn test_instance_init() {
        let sut = NextcloudInstance::new(config(true)).unwrap();

        assert_eq!(sut.name(), "sut");
        assert_eq!(sut.config().user, "username");
        assert_eq!(sut.config().password, "SuperSecr3t");
        assert_eq!(sut.config().url, "http://here.example");
        assert_eq!(sut.config().timeout, Duration::from_secs(10));
        assert!(sut.config().verify_ssl);
    }

    #[test]
    fn test_instance_without_ssl_verification() {
        let sut = NextcloudInstance::new(config(false)).unwrap();
        assert!(!sut.config().verify_ssl);
    }

    #[tokio::test]
    async fn test_fetch_unreachable_is_transport_error() {
        let mut cfg = config(true);
        // nothing listens on the discard port
        cfg.url = "http://127.0.0.1:9/info".into();
        cfg.timeout = Duration::from_secs(2);
        let sut = NextcloudInstance::new(cfg).unwrap();

        let err = sut.fetch().await.unwrap_err();
        assert!(matches!(err, PollError::Transport(_)));
    }
}
