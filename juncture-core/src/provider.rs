//! HTTP client for the calendar provider.
//!
//! Wraps the Nylas-style endpoints: interactive auth, code exchange,
//! primary calendar lookup, event listing (with sync cursor) and event
//! creation. Network and non-2xx failures are converted to
//! [`JunctureError`] values at this boundary; nothing escapes uncaught.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{JunctureError, JunctureResult};
use crate::event::{Event, FetchPage, ListEventsResponse, Participant};

/// Path component of the deep-link callback that carries the exchange code.
const EXCHANGE_PATH: &str = "exchange";

#[derive(Debug, Clone)]
pub struct ProviderClient {
    http: reqwest::Client,
    base_url: Url,
}

/// Body for `POST /nylas/create-event`.
#[derive(Debug, Clone, Serialize)]
pub struct CreateEventRequest {
    pub title: String,
    /// Epoch seconds.
    pub start_time: i64,
    pub end_time: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub participants: Option<Vec<Participant>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

impl ProviderClient {
    pub fn new(base_url: &str) -> JunctureResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| JunctureError::ProviderUnreachable(format!("bad base URL: {e}")))?;
        Ok(ProviderClient {
            http: reqwest::Client::new(),
            base_url,
        })
    }

    fn endpoint(&self, path: &str) -> JunctureResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| JunctureError::ProviderUnreachable(format!("bad endpoint {path}: {e}")))
    }

    /// The browser-based interactive authorization URL.
    pub fn auth_url(&self) -> JunctureResult<Url> {
        self.endpoint("nylas/auth")
    }

    /// Exchange the callback code for an opaque grant token.
    pub async fn exchange_code(&self, code: &str) -> JunctureResult<String> {
        let mut url = self.endpoint("oauth/exchange")?;
        url.query_pairs_mut().append_pair("code", code);

        let response = self.http.get(url).send().await?;
        if !response.status().is_success() {
            return Err(JunctureError::ExchangeFailed(format!(
                "provider returned {}",
                response.status()
            )));
        }
        let grant = response.text().await?;
        let grant = grant.trim().to_string();
        if grant.is_empty() {
            return Err(JunctureError::ExchangeFailed(
                "provider returned an empty grant".to_string(),
            ));
        }
        Ok(grant)
    }

    /// `GET /nylas/primary-calendar` -> calendar id as raw text.
    pub async fn primary_calendar(&self) -> JunctureResult<String> {
        let response = self.http.get(self.endpoint("nylas/primary-calendar")?).send().await?;
        let response = check_status(response)?;
        Ok(response.text().await?.trim().to_string())
    }

    /// `GET /nylas/list-events[?sync_token=...]`.
    ///
    /// Without a cursor the server answers with a full snapshot (bare JSON
    /// array); with one it answers a delta page, possibly carrying a new
    /// token.
    pub async fn list_events(&self, cursor: Option<&str>) -> JunctureResult<FetchPage> {
        let mut url = self.endpoint("nylas/list-events")?;
        if let Some(token) = cursor {
            url.query_pairs_mut().append_pair("sync_token", token);
        }

        let response = self.http.get(url).send().await?;
        let response = check_status(response)?;
        let body: ListEventsResponse = response.json().await.map_err(|e| {
            JunctureError::ProviderUnreachable(format!("malformed list-events body: {e}"))
        })?;
        Ok(body.into_page())
    }

    /// `POST /nylas/create-event`. Non-2xx bodies carry `{"error": ...}`.
    pub async fn create_event(&self, request: &CreateEventRequest) -> JunctureResult<Event> {
        let response = self
            .http
            .post(self.endpoint("nylas/create-event")?)
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let message = match response.json::<ErrorBody>().await {
                Ok(body) => body.error,
                Err(_) => format!("provider returned {status}"),
            };
            return Err(JunctureError::ProviderUnreachable(message));
        }

        let raw: crate::event::RawEvent = response.json().await.map_err(|e| {
            JunctureError::ProviderUnreachable(format!("malformed create-event body: {e}"))
        })?;
        Ok(raw.into_event())
    }
}

fn check_status(response: reqwest::Response) -> JunctureResult<reqwest::Response> {
    match response.status() {
        status if status.is_success() => Ok(response),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(JunctureError::AuthRequired),
        status => Err(JunctureError::ProviderUnreachable(format!(
            "provider returned {status}"
        ))),
    }
}

/// Pull the exchange code out of an auth callback deep link.
///
/// The completion redirect lands on a URL whose path ends in `exchange`
/// with a `code` query parameter (e.g. `myapp://oauth/exchange?code=...`).
pub fn code_from_redirect(redirect_url: &str) -> Option<String> {
    let url = Url::parse(redirect_url).ok()?;

    let on_exchange_path = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .map(|last| last == EXCHANGE_PATH)
        // Custom schemes like myapp://oauth/exchange can parse with an
        // empty path and "exchange" inside the host/opaque part.
        .unwrap_or(false)
        || url.path().trim_end_matches('/').ends_with(EXCHANGE_PATH);

    if !on_exchange_path {
        return None;
    }

    url.query_pairs()
        .find(|(key, _)| key == "code")
        .map(|(_, value)| value.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_from_redirect_accepts_deep_link() {
        assert_eq!(
            code_from_redirect("myapp://oauth/exchange?code=abc123"),
            Some("abc123".to_string())
        );
        assert_eq!(
            code_from_redirect("https://example.com/oauth/exchange?code=xyz&state=1"),
            Some("xyz".to_string())
        );
    }

    #[test]
    fn test_code_from_redirect_rejects_other_paths() {
        assert_eq!(code_from_redirect("myapp://oauth/other?code=abc"), None);
        assert_eq!(code_from_redirect("myapp://oauth/exchange"), None);
        assert_eq!(code_from_redirect("not a url"), None);
    }

    #[test]
    fn test_create_event_request_omits_absent_fields() {
        let request = CreateEventRequest {
            title: "Standup".into(),
            start_time: 1700000000,
            end_time: 1700003600,
            participants: None,
            location: None,
            description: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("location").is_none());
        assert!(json.get("participants").is_none());
    }
}
