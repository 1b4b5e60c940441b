use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tourbook_core::GatewayError;
use tracing::warn;

pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

pub(crate) fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

pub(crate) fn build_client(timeout_ms: u64) -> Result<Client, GatewayError> {
    let timeout = Duration::from_millis(timeout_ms);
    Client::builder()
        .connect_timeout(timeout.min(Duration::from_secs(5)))
        .timeout(timeout)
        .pool_max_idle_per_host(10)
        .build()
        .map_err(|e| GatewayError::NotConfigured(format!("http client: {}", e)))
}

/// Send a provider request; non-2xx answers become typed gateway errors.
pub(crate) async fn send(request: RequestBuilder, context: &str) -> Result<Response, GatewayError> {
    let response = request.send().await.map_err(|e| map_send_error(e, context))?;
    ensure_success(response, context).await
}

pub(crate) async fn send_json<T: DeserializeOwned>(
    request: RequestBuilder,
    context: &str,
) -> Result<T, GatewayError> {
    let response = send(request, context).await?;
    response.json::<T>().await.map_err(|e| {
        if e.is_timeout() {
            GatewayError::Timeout
        } else {
            GatewayError::UnexpectedResponse(format!("{}: {}", context, e))
        }
    })
}

fn map_send_error(err: reqwest::Error, context: &str) -> GatewayError {
    if err.is_timeout() {
        GatewayError::Timeout
    } else {
        GatewayError::Transport(format!("{}: {}", context, err))
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: Option<ErrorDetail>,
    error_description: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorDetail {
    Object { message: Option<String> },
    Code(String),
}

fn provider_message(body: &str) -> Option<String> {
    let envelope: ErrorEnvelope = serde_json::from_str(body).ok()?;
    let from_detail = match envelope.error {
        Some(ErrorDetail::Object { message }) => message,
        Some(ErrorDetail::Code(code)) => Some(code),
        None => None,
    };
    envelope.message.or(envelope.error_description).or(from_detail)
}

async fn ensure_success(response: Response, context: &str) -> Result<Response, GatewayError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = provider_message(&body);
    warn!(status = %status, context = %context, message = ?message, "Payment provider request failed");

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(GatewayError::NotConfigured(format!(
            "{}: provider rejected credentials",
            context
        ))),
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            Err(GatewayError::Transport(format!("{}: {}", context, status)))
        }
        s if s.is_client_error() => Err(GatewayError::Rejected {
            reason: message.unwrap_or_else(|| "Payment was declined".to_string()),
        }),
        _ => Err(GatewayError::Transport(format!("{}: {}", context, status))),
    }
}

/// `3000` -> `"30.00"`
pub(crate) fn format_major_units(amount_cents: i64) -> String {
    let sign = if amount_cents < 0 { "-" } else { "" };
    let abs = amount_cents.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}
