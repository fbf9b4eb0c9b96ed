//! Pose service discovery.
//!
//! The pose backend runs on a host whose address changes. A directory service
//! publishes `{ "<service>": {"ip": .., "ipv6": .., "port": ..} }`, optionally
//! wrapped as `{"result": {...}}`. `ServiceLocator` does one lookup, caches the
//! first good answer for the life of the process, and never refreshes on its
//! own. Callers that want a fresh lookup call `invalidate()` first.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use super::{decode_response, HttpResponse, HttpTransport};
use crate::error::{PipelineError, PipelineResult};
use crate::promise::spawn_transfer;

/// Directory record for one service.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct DirectoryEntry {
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub ipv6: String,
    #[serde(default)]
    pub port: u16,
}

/// Resolved pose service endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EndpointDescriptor {
    pub host: String,
    pub port: u16,
}

impl EndpointDescriptor {
    /// `http://host:port/<path>?<query>`, with the query URL-encoded.
    pub fn url_for(&self, path: &str, query: &[(String, String)]) -> PipelineResult<Url> {
        let host = if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        let mut url = Url::parse(&format!("http://{}:{}/", host, self.port)).map_err(|e| {
            PipelineError::Unavailable(format!(
                "invalid endpoint {}:{}: {}",
                self.host, self.port, e
            ))
        })?;
        url.set_path(path);
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }
}

/// Discovery settings.
#[derive(Clone, Debug)]
pub struct LocatorConfig {
    /// Directory URL queried with GET.
    pub directory_url: String,
    /// Record key in the directory response.
    pub service_name: String,
    /// Directory wraps its answer in `{"result": ...}`.
    pub result_envelope: bool,
}

/// Resolves and caches the pose service endpoint.
pub struct ServiceLocator {
    config: LocatorConfig,
    transport: Arc<dyn HttpTransport>,
    cached: Mutex<Option<EndpointDescriptor>>,
}

impl ServiceLocator {
    pub fn new(config: LocatorConfig, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            config,
            transport,
            cached: Mutex::new(None),
        }
    }

    pub fn service_name(&self) -> &str {
        &self.config.service_name
    }

    /// Cached endpoint, or one directory lookup bounded by `timeout`.
    ///
    /// Failures are not cached and not retried.
    pub async fn resolve(&self, timeout: Duration) -> PipelineResult<EndpointDescriptor> {
        if let Some(endpoint) = self.cached() {
            return Ok(endpoint);
        }

        let transport = Arc::clone(&self.transport);
        let url = self.config.directory_url.clone();
        log::debug!("resolving '{}' via {}", self.config.service_name, url);
        let response = spawn_transfer(move || transport.get(&url))
            .with_timeout(timeout)
            .await
            .map_err(|e| match e {
                PipelineError::Timeout(_) => e,
                other => PipelineError::Unavailable(format!("directory lookup failed: {}", other)),
            })?;

        let endpoint = self.parse_directory(&response)?;
        log::info!(
            "resolved '{}' to {}:{}",
            self.config.service_name,
            endpoint.host,
            endpoint.port
        );
        *self.lock_cache() = Some(endpoint.clone());
        Ok(endpoint)
    }

    /// Extract this service's endpoint from a directory response.
    pub fn parse_directory(&self, response: &HttpResponse) -> PipelineResult<EndpointDescriptor> {
        let mut lookup: serde_json::Value = decode_response(response)
            .map_err(|e| PipelineError::Unavailable(format!("directory response: {}", e)))?;
        if self.config.result_envelope {
            lookup = lookup
                .get_mut("result")
                .map(serde_json::Value::take)
                .ok_or_else(|| {
                    PipelineError::Unavailable("directory response missing 'result'".into())
                })?;
        }
        let record = lookup
            .get_mut(&self.config.service_name)
            .map(serde_json::Value::take)
            .filter(|value| !value.is_null())
            .ok_or_else(|| {
                PipelineError::Unavailable(format!(
                    "no directory record for '{}'",
                    self.config.service_name
                ))
            })?;
        let entry: DirectoryEntry = serde_json::from_value(record).map_err(|e| {
            PipelineError::Unavailable(format!(
                "malformed record for '{}': {}",
                self.config.service_name, e
            ))
        })?;

        if entry.ip.trim().is_empty() {
            return Err(PipelineError::Unavailable(format!(
                "'{}' has no address published",
                self.config.service_name
            )));
        }
        if entry.port == 0 {
            return Err(PipelineError::Unavailable(format!(
                "'{}' has no port published",
                self.config.service_name
            )));
        }
        if !entry.ipv6.is_empty() {
            log::debug!("'{}' also published ipv6 {}", self.config.service_name, entry.ipv6);
        }
        Ok(EndpointDescriptor {
            host: entry.ip.trim().to_string(),
            port: entry.port,
        })
    }

    pub fn cached(&self) -> Option<EndpointDescriptor> {
        self.lock_cache().clone()
    }

    /// Forget the cached endpoint so the next `resolve` queries the directory.
    pub fn invalidate(&self) {
        if self.lock_cache().take().is_some() {
            log::info!("dropped cached endpoint for '{}'", self.config.service_name);
        }
    }

    fn lock_cache(&self) -> MutexGuard<'_, Option<EndpointDescriptor>> {
        self.cached
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
