//! Request and response types for the Xinference control API.

use serde::{Deserialize, Serialize};

use crate::config::LaunchSpec;

/// Launch request body for `POST /v1/models`.
///
/// Keys the server does not recognise (the performance flags) are forwarded
/// to the model as keyword arguments.
#[derive(Debug, Clone, Serialize)]
pub struct LaunchModelRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_uid: Option<String>,
    pub model_name: String,
    pub model_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_engine: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_in_billions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantization: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layerwise_cast: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_offload: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_offload: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_stream: Option<bool>,
}

impl From<&LaunchSpec> for LaunchModelRequest {
    fn from(spec: &LaunchSpec) -> Self {
        Self {
            model_uid: spec.model_uid.clone(),
            model_name: spec.model_name.clone(),
            model_type: spec.model_type.clone(),
            model_engine: spec.engine.clone(),
            model_format: spec.format.clone(),
            size_in_billions: spec.size_in_billions.clone(),
            quantization: spec.quantization.clone(),
            model_path: spec.model_path.clone(),
            layerwise_cast: spec.layerwise_cast,
            cpu_offload: spec.cpu_offload,
            group_offload: spec.group_offload,
            use_stream: spec.use_stream,
        }
    }
}

/// Successful launch response
#[derive(Debug, Deserialize)]
pub struct LaunchModelResponse {
    pub model_uid: String,
}

/// Error body returned by the control API (`{"detail": ...}`).
#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: serde_json::Value,
}

/// A launch request the server answered with a non-2xx status.
#[derive(Debug, Clone, thiserror::Error)]
#[error("server rejected launch (HTTP {http_status}): {detail}")]
pub struct LaunchRejected {
    pub http_status: u16,
    pub detail: String,
}

impl LaunchRejected {
    /// Build from the raw HTTP status and response body.
    pub fn from_http_response(http_status: u16, body: &str) -> Self {
        let detail = match serde_json::from_str::<ErrorBody>(body) {
            Ok(ErrorBody {
                detail: serde_json::Value::String(text),
            }) => text,
            Ok(ErrorBody { detail }) => detail.to_string(),
            Err(_) if body.trim().is_empty() => "empty response body".to_string(),
            Err(_) => body.trim().to_string(),
        };

        Self {
            http_status,
            detail,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_omits_unset_fields() {
        let spec = LaunchSpec {
            model_name: "Wan2.1-i2v-14B-480p".to_string(),
            model_type: "video".to_string(),
            model_uid: None,
            model_path: Some("/data/m".to_string()),
            engine: None,
            format: None,
            size_in_billions: Some("14".to_string()),
            quantization: None,
            layerwise_cast: None,
            cpu_offload: Some(true),
            group_offload: None,
            use_stream: None,
        };

        let json = serde_json::to_value(LaunchModelRequest::from(&spec)).unwrap();
        assert_eq!(json["model_name"], "Wan2.1-i2v-14B-480p");
        assert_eq!(json["model_type"], "video");
        assert_eq!(json["model_path"], "/data/m");
        assert_eq!(json["size_in_billions"], "14");
        assert_eq!(json["cpu_offload"], true);
        assert!(json.get("model_engine").is_none());
        assert!(json.get("quantization").is_none());
        assert!(json.get("layerwise_cast").is_none());
    }

    #[test]
    fn test_rejection_detail_parsing() {
        let err = LaunchRejected::from_http_response(400, r#"{"detail":"Model not found"}"#);
        assert_eq!(err.detail, "Model not found");
        assert_eq!(err.http_status, 400);

        let err = LaunchRejected::from_http_response(422, r#"{"detail":[{"loc":["body"]}]}"#);
        assert!(err.detail.contains("loc"));

        let err = LaunchRejected::from_http_response(502, "Bad Gateway\n");
        assert_eq!(err.detail, "Bad Gateway");

        let err = LaunchRejected::from_http_response(500, "");
        assert_eq!(err.detail, "empty response body");
        assert!(err.to_string().contains("HTTP 500"));
    }
}
