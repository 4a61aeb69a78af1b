/// Axum handlers for the proxy server
use crate::AppState;
use crate::client::HttpClient;
use crate::errors::ProxyError;
use crate::models::{
    ChatCompletionRequest, ListModelResponse, UpstreamChatRequest, UpstreamErrorEnvelope,
    normalize_completion,
};
use axum::{
    Json,
    body::{Body, Bytes},
    extract::State,
    http::{HeaderValue, Method, Request, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use futures_util::TryStreamExt;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, info, instrument};
use url::Url;

const API_KEY_HEADER: &str = "api-key";

/// Proxies `POST /v1/chat/completions` to the Azure deployment serving the requested model.
#[instrument(skip_all)]
pub async fn chat_completions<T: HttpClient + Clone + Send + Sync + 'static>(
    State(state): State<AppState<T>>,
    req: axum::extract::Request,
) -> Response {
    let result = match axum::body::to_bytes(req.into_body(), usize::MAX).await {
        Ok(body) => proxy_chat_completion(&state, &body).await,
        Err(e) => Err(ProxyError::InvalidRequest(format!(
            "Failed to read request body: {e}"
        ))),
    };

    result.unwrap_or_else(|err| {
        err.log();
        err.into_response()
    })
}

async fn proxy_chat_completion<T: HttpClient + Clone + Send + Sync + 'static>(
    state: &AppState<T>,
    body: &Bytes,
) -> Result<Response, ProxyError> {
    let request = ChatCompletionRequest::from_slice(body)?;
    let deployment = request.resolve(&state.deployments)?;
    let model = request.model_name();
    let streaming = request.is_streaming();

    info!(model = %model, deployment = %deployment, stream = streaming, "Proxying chat completion");

    let url = state.upstream.chat_completions_url(deployment)?;
    let upstream_body = UpstreamChatRequest::from(request);
    let upstream_req = build_upstream_request(state, &url, &upstream_body)?;

    let timeout = state.upstream.timeout;
    let response = with_timeout(timeout, state.http_client.request(upstream_req))
        .await?
        .map_err(|e| ProxyError::Transport(e.to_string()))?;

    debug!(status = %response.status(), "Upstream responded");

    if !response.status().is_success() {
        return Err(upstream_failure(response, timeout).await);
    }

    if streaming {
        return Ok(passthrough_stream(response));
    }

    let bytes = with_timeout(timeout, axum::body::to_bytes(response.into_body(), usize::MAX))
        .await?
        .map_err(|e| ProxyError::Transport(format!("Failed to read upstream body: {e}")))?;

    let completion = normalize_completion(&bytes, &model)?;
    Ok((StatusCode::OK, Json(completion)).into_response())
}

fn build_upstream_request<T: HttpClient>(
    state: &AppState<T>,
    url: &Url,
    body: &UpstreamChatRequest,
) -> Result<axum::extract::Request, ProxyError> {
    let uri = Uri::try_from(url.as_str()).map_err(|e| {
        error!("Invalid URI: {}", url);
        ProxyError::Internal(format!("Invalid upstream URI {url}: {e}"))
    })?;
    let body_bytes = serde_json::to_vec(body)
        .map_err(|e| ProxyError::Internal(format!("Failed to serialize request: {e}")))?;

    let mut req = Request::builder()
        .method(Method::POST)
        .uri(uri.clone())
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body_bytes))
        .map_err(|e| ProxyError::Internal(format!("Failed to build request: {e}")))?;

    // Host must match the Azure resource.
    if let Some(host) = uri.host() {
        let host_value = match uri.port_u16() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        let host_value = HeaderValue::from_str(&host_value)
            .map_err(|_| ProxyError::Internal(format!("Invalid host: {host_value}")))?;
        req.headers_mut().insert(header::HOST, host_value);
    }

    req.headers_mut()
        .insert(API_KEY_HEADER, state.upstream.api_key.header_value()?);

    Ok(req)
}

async fn with_timeout<F: Future>(timeout: Duration, future: F) -> Result<F::Output, ProxyError> {
    tokio::time::timeout(timeout, future)
        .await
        .map_err(|_| ProxyError::Timeout(timeout))
}

/// Convert a non-2xx upstream response into an error, keeping upstream's status and message.
async fn upstream_failure(response: Response, timeout: Duration) -> ProxyError {
    let status = response.status();
    let body = with_timeout(timeout, axum::body::to_bytes(response.into_body(), usize::MAX))
        .await
        .ok()
        .and_then(Result::ok)
        .unwrap_or_default();

    let message = UpstreamErrorEnvelope::message_from(&body)
        .unwrap_or_else(|| format!("Request failed with status code {}", status.as_u16()));

    ProxyError::Upstream { status, message }
}

/// Hand the upstream body to the client frame by frame. Dropping the response (e.g. the client
/// went away) drops the upstream body and closes that connection.
fn passthrough_stream(response: Response) -> Response {
    let stream = response
        .into_body()
        .into_data_stream()
        .inspect_err(|e| error!("Upstream stream failed mid-response: {}", e));

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/event-stream")],
        Body::from_stream(stream),
    )
        .into_response()
}

#[instrument(skip(state))]
pub async fn models<T: HttpClient + Clone + Send + Sync + 'static>(
    State(state): State<AppState<T>>,
) -> impl IntoResponse {
    Json(ListModelResponse::from_deployments(&state.deployments))
}
