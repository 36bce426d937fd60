//! HTTP utilities for the chat-completions endpoint.

use crate::llm::LlmError;
use reqwest::Client as HttpClient;
use serde_json::Value;
use std::time::Duration;

/// Longest API error body kept in an error message
const MAX_ERROR_BODY_CHARS: usize = 500;

/// Creates an HTTP client with the given request timeout.
///
/// Falls back to a default client if the builder fails.
#[must_use]
pub fn create_http_client(timeout: Duration) -> HttpClient {
    HttpClient::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| HttpClient::new())
}

/// `{base}/chat/completions`, tolerating a trailing slash on `base`.
#[must_use]
pub fn completions_url(base: &str) -> String {
    format!("{}/chat/completions", base.trim_end_matches('/'))
}

/// POST `body` as JSON with bearer auth and parse the JSON reply.
///
/// # Errors
///
/// Returns `LlmError::NetworkError` on connectivity issues,
/// `LlmError::ApiError` on non-success status codes, or
/// `LlmError::JsonError` if the reply is not JSON.
pub async fn send_json_request(
    client: &HttpClient,
    url: &str,
    api_key: &str,
    body: &Value,
) -> Result<Value, LlmError> {
    let response = client
        .post(url)
        .bearer_auth(api_key)
        .json(body)
        .send()
        .await
        .map_err(|e| LlmError::NetworkError(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await.unwrap_or_default();
        return Err(LlmError::ApiError(describe_error_body(
            status.as_u16(),
            &error_text,
        )));
    }

    response
        .json()
        .await
        .map_err(|e| LlmError::JsonError(e.to_string()))
}

/// Human readable summary of a failed response body.
///
/// HTML error pages from proxies are not echoed; long bodies are cut.
fn describe_error_body(status: u16, body: &str) -> String {
    let trimmed = body.trim_start();
    let lowered = trimmed.get(..15).unwrap_or(trimmed).to_ascii_lowercase();
    if lowered.starts_with("<!doctype") || lowered.starts_with("<html") {
        return format!("{status} (server returned an HTML error page)");
    }

    let short = crate::utils::truncate_str(body, MAX_ERROR_BODY_CHARS);
    if short.len() < body.len() {
        format!("{status} - {short}... (truncated)")
    } else {
        format!("{status} - {body}")
    }
}

/// Text of the first choice of a chat-completions reply.
///
/// # Errors
///
/// Returns `LlmError::JsonError` when the reply has no string content and
/// `LlmError::EmptyResponse` when that content is blank.
pub fn completion_text(response: &Value) -> Result<String, LlmError> {
    let content = response
        .get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(Value::as_str)
        .ok_or_else(|| {
            LlmError::JsonError("missing choices[0].message.content".to_string())
        })?;

    if content.trim().is_empty() {
        return Err(LlmError::EmptyResponse);
    }
    Ok(content.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_completion_text_extraction() {
        let reply = json!({"choices": [{"message": {"role": "assistant", "content": "Hi"}}]});
        assert!(matches!(completion_text(&reply), Ok(text) if text == "Hi"));

        let blank = json!({"choices": [{"message": {"content": "  "}}]});
        assert!(matches!(completion_text(&blank), Err(LlmError::EmptyResponse)));

        let malformed = json!({"choices": []});
        assert!(matches!(completion_text(&malformed), Err(LlmError::JsonError(_))));
    }

    #[test]
    fn test_error_body_description() {
        assert_eq!(
            describe_error_body(502, "<!DOCTYPE html><html>Bad gateway</html>"),
            "502 (server returned an HTML error page)"
        );
        assert_eq!(describe_error_body(401, "no auth"), "401 - no auth");

        let long = "x".repeat(600);
        let described = describe_error_body(500, &long);
        assert!(described.ends_with("... (truncated)"));
        assert!(described.len() < 600);
    }

    #[test]
    fn test_completions_url() {
        assert_eq!(
            completions_url("https://openrouter.ai/api/v1/"),
            "https://openrouter.ai/api/v1/chat/completions"
        );
    }
}
