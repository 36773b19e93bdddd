use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::CollaboratorError;
use crate::intake::Payload;
use crate::session::ParseRequest;

pub const FALLBACK_ERROR: &str = "certificate parsing failed";

/// The remote service that decodes certificate bytes.
///
/// Implementations return the raw response body; nothing here is trusted
/// until it has gone through [`crate::validate::validate`].
#[async_trait]
pub trait ParseBackend: Send + Sync + 'static {
    async fn parse(&self, request: &ParseRequest) -> Result<Value, CollaboratorError>;
}

/// Multipart HTTP client for the parse service.
#[derive(Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self, with_password: bool) -> String {
        if with_password {
            format!("{}/api/cert/parse/with-password", self.base_url)
        } else {
            format!("{}/api/cert/parse", self.base_url)
        }
    }
}

fn file_part(name: &str, payload: &Payload) -> Result<Part, CollaboratorError> {
    let bytes = payload
        .to_bytes()
        .map_err(|e| CollaboratorError::Transport(format!("corrupt payload: {e}")))?;
    let mime = mime_guess::from_path(name).first_or_octet_stream();
    Part::bytes(bytes)
        .file_name(name.to_string())
        .mime_str(mime.essence_str())
        .map_err(|e| CollaboratorError::Transport(e.to_string()))
}

/// `error` string from a failure body, or the generic message.
pub fn failure_message(body: &[u8]) -> String {
    serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_owned))
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| FALLBACK_ERROR.to_string())
}

#[async_trait]
impl ParseBackend for HttpBackend {
    async fn parse(&self, request: &ParseRequest) -> Result<Value, CollaboratorError> {
        let mut form = Form::new().part("file", file_part(&request.name, &request.payload)?);
        if let Some(secret) = &request.secret {
            form = form.text("password", secret.clone());
        }

        let url = self.endpoint(request.secret.is_some());
        debug!(
            entry_id = %request.ticket.entry,
            seq = request.ticket.seq,
            %url,
            "Dispatching parse"
        );

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| CollaboratorError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| CollaboratorError::Transport(e.to_string()))?;

        if !status.is_success() {
            let message = failure_message(&body);
            warn!(
                entry_id = %request.ticket.entry,
                status = status.as_u16(),
                %message,
                "Parse service rejected file"
            );
            return Err(CollaboratorError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_slice(&body).map_err(|e| CollaboratorError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_message_prefers_service_error() {
        assert_eq!(
            failure_message(br#"{"status":"error","error":"unsupported certificate format"}"#),
            "unsupported certificate format"
        );
        assert_eq!(failure_message(br#"{"status":"error"}"#), FALLBACK_ERROR);
        assert_eq!(failure_message(b"<html>502</html>"), FALLBACK_ERROR);
        assert_eq!(failure_message(br#"{"error":""}"#), FALLBACK_ERROR);
    }

    #[test]
    fn endpoint_depends_on_secret() {
        let backend = HttpBackend::new("http://localhost:8080/");
        assert_eq!(backend.endpoint(false), "http://localhost:8080/api/cert/parse");
        assert_eq!(
            backend.endpoint(true),
            "http://localhost:8080/api/cert/parse/with-password"
        );
    }
}
