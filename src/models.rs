//! Wire types for the OpenAI-compatible surface and the Azure upstream.
//!
//! Sampling parameters are kept as raw JSON values so whatever the client sent is
//! forwarded verbatim; only absent or `null` fields are replaced by defaults.
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::deployments::DeploymentMap;
use crate::errors::ProxyError;

pub const DEFAULT_TEMPERATURE: f64 = 1.0;
pub const DEFAULT_MAX_TOKENS: u64 = 4096;
pub const DEFAULT_TOP_P: f64 = 1.0;

/// The body of `POST /v1/chat/completions`, as sent by the client.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatCompletionRequest {
    /// Kept loose so a non-string model is reported as unsupported, not as bad JSON.
    #[serde(default)]
    pub model: Option<Value>,
    #[serde(default)]
    pub messages: Option<Value>,
    #[serde(default)]
    pub temperature: Option<Value>,
    #[serde(default)]
    pub max_tokens: Option<Value>,
    #[serde(default)]
    pub top_p: Option<Value>,
    #[serde(default)]
    pub stream: Option<Value>,
}

impl ChatCompletionRequest {
    /// Parse and validate a raw request body.
    pub fn from_slice(body: &[u8]) -> Result<Self, ProxyError> {
        let request: Self = serde_json::from_slice(body)
            .map_err(|e| ProxyError::InvalidRequest(format!("Invalid JSON body: {e}")))?;

        match &request.messages {
            Some(Value::Array(messages)) if !messages.is_empty() => Ok(request),
            _ => Err(ProxyError::InvalidRequest(
                "Missing or invalid messages array".to_string(),
            )),
        }
    }

    /// Any truthy `stream` value asks for streaming: `false`, `0`, `""` and `null` don't.
    pub fn is_streaming(&self) -> bool {
        match &self.stream {
            None | Some(Value::Null) => false,
            Some(Value::Bool(flag)) => *flag,
            Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
            Some(Value::String(s)) => !s.is_empty(),
            Some(Value::Array(_) | Value::Object(_)) => true,
        }
    }

    /// The requested model as it appears in messages: the string itself, its JSON text for
    /// other values, or `undefined` when absent.
    pub fn model_name(&self) -> String {
        match &self.model {
            None | Some(Value::Null) => "undefined".to_string(),
            Some(Value::String(model)) => model.clone(),
            Some(other) => other.to_string(),
        }
    }

    /// Find the deployment serving this request's model. Only string names can match.
    pub fn resolve<'a>(&self, deployments: &'a DeploymentMap) -> Result<&'a str, ProxyError> {
        match &self.model {
            Some(Value::String(model)) => deployments.resolve(model),
            _ => None,
        }
        .ok_or_else(|| ProxyError::UnsupportedModel(self.model_name()))
    }
}

/// The body forwarded to `/openai/deployments/{deployment}/chat/completions`.
#[derive(Debug, Clone, Serialize)]
pub struct UpstreamChatRequest {
    pub messages: Value,
    pub temperature: Value,
    pub max_tokens: Value,
    pub top_p: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
}

impl From<ChatCompletionRequest> for UpstreamChatRequest {
    fn from(request: ChatCompletionRequest) -> Self {
        let stream = request.is_streaming().then_some(true);
        Self {
            messages: request.messages.unwrap_or(Value::Array(Vec::new())),
            temperature: request
                .temperature
                .unwrap_or_else(|| Value::from(DEFAULT_TEMPERATURE)),
            max_tokens: request
                .max_tokens
                .unwrap_or_else(|| Value::from(DEFAULT_MAX_TOKENS)),
            top_p: request.top_p.unwrap_or_else(|| Value::from(DEFAULT_TOP_P)),
            stream,
        }
    }
}

/// Turn a successful upstream body into an OpenAI chat completion.
///
/// `model` and `object` always reflect this proxy, whatever upstream sent. A body
/// without at least one choice is treated as a failure.
pub fn normalize_completion(body: &[u8], model: &str) -> Result<Map<String, Value>, ProxyError> {
    let mut completion: Map<String, Value> =
        serde_json::from_slice(body).map_err(|e| ProxyError::InvalidUpstreamBody(e.to_string()))?;

    completion.insert("model".into(), Value::String(model.to_owned()));
    completion.insert("object".into(), Value::String("chat.completion".into()));

    match completion.get("choices") {
        Some(Value::Array(choices)) if !choices.is_empty() => Ok(completion),
        _ => Err(ProxyError::EmptyChoices),
    }
}

/// Shape of an Azure error body; only the message is of interest.
#[derive(Debug, Deserialize)]
pub(crate) struct UpstreamErrorEnvelope {
    pub(crate) error: UpstreamErrorDetail,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UpstreamErrorDetail {
    #[serde(default)]
    pub(crate) message: Option<String>,
}

impl UpstreamErrorEnvelope {
    /// Pull a non-empty `error.message` out of an upstream body, if it has one.
    pub(crate) fn message_from(body: &[u8]) -> Option<String> {
        serde_json::from_slice::<Self>(body)
            .ok()
            .and_then(|envelope| envelope.error.message)
            .filter(|message| !message.is_empty())
    }
}

/// OpenAI-style error envelope returned on every failure path.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ErrorBody {
    pub message: String,
    pub r#type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// One entry of the /v1/models response. Each model is a name clients may request.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub(crate) struct Model {
    /// The model identifier, which can be referenced in the API endpoints.
    pub(crate) id: String,
    /// The Unix timestamp (in seconds) when the model was created.
    pub(crate) created: Option<u32>,
    /// The object type, which is always "model".
    pub(crate) object: String,
    /// The organization that owns the model.
    pub(crate) owned_by: String,
}

/// The response from the /v1/models endpoint, which is a list of models.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub(crate) struct ListModelResponse {
    /// The object type, which is always "list".
    pub object: String,
    /// A list of model objects.
    pub data: Vec<Model>,
}

impl ListModelResponse {
    pub(crate) fn from_deployments(deployments: &DeploymentMap) -> Self {
        let data = deployments
            .model_names()
            .into_iter()
            .map(|id| Model {
                id: id.to_owned(),
                created: None,
                object: "model".into(),
                owned_by: "azure".into(),
            })
            .collect();
        ListModelResponse {
            object: "list".into(),
            data,
        }
    }
}
