//! Shared HTTP plumbing for provider clients

use checkout_core::{CheckoutError, Result};
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;

/// Longest provider error body kept in error messages
const MAX_ERROR_BODY: usize = 300;

/// Build a client with a request timeout
pub(crate) fn client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| CheckoutError::Config(format!("HTTP client: {}", e)))
}

/// Map a transport failure. Nothing reached the provider or no answer came back.
pub(crate) fn transport(provider: &str, err: &reqwest::Error) -> CheckoutError {
    if err.is_decode() {
        return CheckoutError::ProviderRejected(format!("{} sent an unreadable response: {}", provider, err));
    }
    CheckoutError::ProviderUnavailable(format!("{} request failed: {}", provider, err))
}

/// Pass through 2xx responses; 4xx become `ProviderRejected`, the rest `ProviderUnavailable`
pub(crate) async fn expect_success(provider: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }

    Err(status_error(provider, status, &body))
}

pub(crate) fn status_error(provider: &str, status: StatusCode, body: &str) -> CheckoutError {
    let message = format!("{} answered {}: {}", provider, status, body);
    if status.is_client_error() {
        CheckoutError::ProviderRejected(message)
    } else {
        CheckoutError::ProviderUnavailable(message)
    }
}

/// Read a required environment variable
pub(crate) fn required_env(name: &str) -> Result<String> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| CheckoutError::Config(format!("{} not set", name)))
}

/// Read an optional environment variable, treating blank as unset
pub(crate) fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
