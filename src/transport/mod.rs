//! HTTP transport for discovery and pose upload.
//!
//! `HttpTransport` is the seam between the pipeline and the network. Calls are
//! blocking and run on tokio's blocking pool via `promise::spawn_transfer`.
//! The default implementation uses `ureq` (feature `http-ureq`).

pub mod discovery;
pub mod multipart;
pub mod response;

pub use discovery::{DirectoryEntry, EndpointDescriptor, LocatorConfig, ServiceLocator};
pub use multipart::MultipartForm;
pub use response::decode_response;

use crate::error::PipelineResult;

/// Raw HTTP response as seen by the pipeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub status_text: String,
    pub body: String,
}

impl HttpResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            status_text: "OK".to_string(),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Blocking HTTP client.
///
/// Implementations return `Err(TransferFailed)` only for transport-level
/// failures (DNS, connect, IO). HTTP error statuses come back as a normal
/// `HttpResponse` so the caller can inspect the body.
pub trait HttpTransport: Send + Sync {
    fn get(&self, url: &str) -> PipelineResult<HttpResponse>;

    fn post(&self, url: &str, content_type: &str, body: Vec<u8>) -> PipelineResult<HttpResponse>;
}

#[cfg(feature = "http-ureq")]
pub use self::ureq_transport::UreqTransport;

#[cfg(feature = "http-ureq")]
mod ureq_transport {
    use std::time::Duration;

    use super::{HttpResponse, HttpTransport};
    use crate::error::{PipelineError, PipelineResult};

    /// `ureq`-backed transport with a per-request timeout.
    pub struct UreqTransport {
        agent: ureq::Agent,
    }

    impl UreqTransport {
        pub fn new(timeout: Duration) -> Self {
            let agent = ureq::AgentBuilder::new().timeout(timeout).build();
            Self { agent }
        }

        fn finish(
            &self,
            result: Result<ureq::Response, ureq::Error>,
            url: &str,
        ) -> PipelineResult<HttpResponse> {
            let response = match result {
                Ok(response) => response,
                Err(ureq::Error::Status(_, response)) => response,
                Err(ureq::Error::Transport(e)) => {
                    return Err(PipelineError::TransferFailed(format!("{}: {}", url, e)))
                }
            };
            let status = response.status();
            let status_text = response.status_text().to_string();
            let body = response.into_string().map_err(|e| {
                PipelineError::TransferFailed(format!("read body from {}: {}", url, e))
            })?;
            Ok(HttpResponse {
                status,
                status_text,
                body,
            })
        }
    }

    impl HttpTransport for UreqTransport {
        fn get(&self, url: &str) -> PipelineResult<HttpResponse> {
            log::debug!("GET {}", url);
            self.finish(self.agent.get(url).call(), url)
        }

        fn post(
            &self,
            url: &str,
            content_type: &str,
            body: Vec<u8>,
        ) -> PipelineResult<HttpResponse> {
            log::debug!("POST {} ({} bytes)", url, body.len());
            let result = self
                .agent
                .post(url)
                .set("Content-Type", content_type)
                .send_bytes(&body);
            self.finish(result, url)
        }
    }
}
