//! Response decoding.
//!
//! The backend returns one untyped JSON body for both outcomes. The body is read
//! as an error envelope first; a non-empty `error` wins regardless of HTTP
//! status. Otherwise it must parse as the expected payload.

use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::HttpResponse;
use crate::error::{PipelineError, PipelineResult};

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    error: Option<String>,
}

/// Decode a response body into `T`, honouring the backend's error envelope.
pub fn decode_response<T: DeserializeOwned>(response: &HttpResponse) -> PipelineResult<T> {
    if !response.is_success() && response.body.trim().is_empty() {
        return Err(PipelineError::TransferFailed(format!(
            "HTTP {} {}",
            response.status, response.status_text
        )));
    }

    // A body that is not an envelope at all just means there is no error.
    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(&response.body) {
        if let Some(error) = envelope.error.filter(|e| !e.is_empty()) {
            return Err(PipelineError::ServiceError(error));
        }
    }

    serde_json::from_str(&response.body).map_err(|e| PipelineError::DecodeFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Payload {
        value: u32,
    }

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            status_text: "status".to_string(),
            body: body.to_string(),
        }
    }

    #[test]
    fn success_payload_decodes() {
        let decoded: Payload = decode_response(&response(200, r#"{"value": 3}"#)).unwrap();
        assert_eq!(decoded, Payload { value: 3 });
    }

    #[test]
    fn error_envelope_wins_over_payload() {
        let result: PipelineResult<Payload> =
            decode_response(&response(200, r#"{"error": "no match", "value": 3}"#));
        assert_eq!(result, Err(PipelineError::ServiceError("no match".into())));
    }

    #[test]
    fn error_envelope_wins_over_status() {
        let result: PipelineResult<Payload> =
            decode_response(&response(500, r#"{"error": "boom"}"#));
        assert_eq!(result, Err(PipelineError::ServiceError("boom".into())));
    }

    #[test]
    fn empty_error_is_ignored() {
        let decoded: Payload =
            decode_response(&response(200, r#"{"error": "", "value": 1}"#)).unwrap();
        assert_eq!(decoded.value, 1);
    }

    #[test]
    fn http_error_without_body_is_transfer_failure() {
        let result: PipelineResult<Payload> = decode_response(&response(502, "  "));
        assert!(matches!(result, Err(PipelineError::TransferFailed(msg)) if msg.contains("502")));
    }

    #[test]
    fn unparseable_body_reports_payload_error() {
        let result: PipelineResult<Payload> = decode_response(&response(200, "<html>"));
        assert!(matches!(result, Err(PipelineError::DecodeFailed(_))));

        let result: PipelineResult<Payload> = decode_response(&response(200, r#"{"other": 1}"#));
        match result {
            Err(PipelineError::DecodeFailed(msg)) => assert!(msg.contains("value")),
            other => panic!("unexpected {:?}", other),
        }
    }
}
