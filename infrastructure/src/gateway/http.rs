//! HTTP artifact gateway adapter
//!
//! Speaks the narrow request/response contract of the AI backend: one JSON
//! POST per generation carrying the stage tag, the context snapshot, and the
//! rendered prompt; one JSON object back with the generated content and
//! opaque provider metadata. Transport and HTTP-status failures are mapped
//! onto the gateway error taxonomy; the retry/backoff/dedup discipline
//! lives a layer up in the broker, not here.

use crate::config::FileGatewayConfig;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::json;
use std::time::Duration;
use storm_application::ports::artifact_gateway::{
    ArtifactGateway, GatewayError, GeneratedContent, GenerationRequest,
};
use storm_domain::PromptTemplate;
use tracing::debug;

pub struct HttpArtifactGateway {
    client: reqwest::Client,
    endpoint: String,
    auth_token: Option<String>,
}

impl HttpArtifactGateway {
    pub fn new(config: &FileGatewayConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|err| GatewayError::Unavailable(err.to_string()))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            auth_token: config.auth_token.clone(),
        })
    }

    fn request_body(request: &GenerationRequest) -> serde_json::Value {
        json!({
            "request_id": request.request,
            "stage_tag": request.kind,
            "context": request.context,
            "system": PromptTemplate::system(),
            "prompt": PromptTemplate::for_artifact(request.kind, &request.context),
        })
    }
}

/// Map an HTTP status to a gateway failure; `None` means success.
fn classify_status(status: StatusCode) -> Option<GatewayError> {
    if status.is_success() {
        None
    } else if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        Some(GatewayError::Unavailable(format!("status {status}")))
    } else {
        Some(GatewayError::Rejected(format!("status {status}")))
    }
}

fn classify_transport(err: reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        GatewayError::Timeout
    } else {
        GatewayError::Unavailable(err.to_string())
    }
}

#[async_trait]
impl ArtifactGateway for HttpArtifactGateway {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedContent, GatewayError> {
        debug!(request = %request.request, kind = %request.kind, endpoint = %self.endpoint,
               "dispatching generation request");

        let mut builder = self
            .client
            .post(&self.endpoint)
            .json(&Self::request_body(request));
        if let Some(token) = &self.auth_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await.map_err(classify_transport)?;
        if let Some(err) = classify_status(response.status()) {
            return Err(err);
        }

        let content: GeneratedContent = response
            .json()
            .await
            .map_err(|err| GatewayError::MalformedResponse(err.to_string()))?;
        if content.content.trim().is_empty() {
            return Err(GatewayError::MalformedResponse(
                "empty content field".to_string(),
            ));
        }
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storm_domain::{ArtifactKind, ContextSnapshot, Stage};

    #[test]
    fn test_request_body_shape() {
        let request = GenerationRequest::new(
            ArtifactKind::Agenda,
            ContextSnapshot::new("Retro", None, Stage::Agenda, 3, vec![], vec![]),
        );
        let body = HttpArtifactGateway::request_body(&request);

        assert_eq!(body["stage_tag"], "agenda");
        assert_eq!(body["context"]["title"], "Retro");
        assert_eq!(body["context"]["participant_count"], 3);
        assert!(
            body["prompt"]
                .as_str()
                .unwrap()
                .contains("Generate the agenda now:")
        );
    }

    #[test]
    fn test_status_classification() {
        assert!(classify_status(StatusCode::OK).is_none());
        assert!(matches!(
            classify_status(StatusCode::INTERNAL_SERVER_ERROR),
            Some(GatewayError::Unavailable(_))
        ));
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS),
            Some(GatewayError::Unavailable(_))
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_REQUEST),
            Some(GatewayError::Rejected(_))
        ));
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED),
            Some(GatewayError::Rejected(_))
        ));
    }
}
