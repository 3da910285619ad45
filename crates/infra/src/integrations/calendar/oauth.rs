//! OAuth2 refresh-token grant against Google's token endpoint.
//!
//! Only the refresh leg lives here. The consent flow that produces the first
//! token pair happens outside the sync engine and lands through
//! `connect_calendar`.

use async_trait::async_trait;
use calsync_core::{RefreshError, RefreshedToken, TokenRefresher};
use calsync_domain::{CalSyncError, GoogleConfig};
use reqwest::Method;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::http::HttpClient;

/// Token refresher for Google OAuth clients
pub struct GoogleTokenRefresher {
    http: HttpClient,
    token_url: String,
    client_id: String,
    client_secret: String,
}

impl GoogleTokenRefresher {
    pub fn new(
        http: HttpClient,
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            http,
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    pub fn from_config(config: &GoogleConfig) -> Result<Self, CalSyncError> {
        if config.client_id.trim().is_empty() {
            return Err(CalSyncError::Config("google.client_id is not set".into()));
        }
        let http = HttpClient::from_config(config)?;
        Ok(Self::new(
            http,
            config.token_url.clone(),
            config.client_id.clone(),
            config.client_secret.clone(),
        ))
    }
}

#[async_trait]
impl TokenRefresher for GoogleTokenRefresher {
    #[instrument(skip_all)]
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedToken, RefreshError> {
        let form = [
            ("grant_type", "refresh_token"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", refresh_token),
        ];
        let request = self.http.request(Method::POST, &self.token_url).form(&form);

        let response = self
            .http
            .send(request)
            .await
            .map_err(|err| RefreshError::Unavailable(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = describe_oauth_error(&body)
                .unwrap_or_else(|| format!("token endpoint returned {status}"));
            warn!(status = status.as_u16(), "token refresh failed");
            return Err(if status.is_client_error() {
                RefreshError::Rejected(message)
            } else {
                RefreshError::Unavailable(message)
            });
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|err| RefreshError::Unavailable(format!("malformed token response: {err}")))?;

        debug!(rotated = token.refresh_token.is_some(), expires_in = token.expires_in, "token refreshed");
        Ok(RefreshedToken {
            access_token: token.access_token,
            refresh_token: token.refresh_token.filter(|rotated| !rotated.is_empty()),
            expires_in_secs: token.expires_in,
        })
    }
}

fn describe_oauth_error(body: &str) -> Option<String> {
    let parsed: OAuthErrorBody = serde_json::from_str(body).ok()?;
    Some(match parsed.error_description {
        Some(description) if !description.is_empty() => format!("{}: {description}", parsed.error),
        _ => parsed.error,
    })
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn refresher(server: &MockServer) -> GoogleTokenRefresher {
        let http = HttpClient::builder()
            .max_attempts(2)
            .base_backoff(Duration::from_millis(5))
            .build()
            .expect("http client");
        GoogleTokenRefresher::new(http, format!("{}/token", server.uri()), "client-1", "secret-1")
    }

    #[tokio::test]
    async fn posts_refresh_grant_form() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("client_id=client-1"))
            .and(body_string_contains("client_secret=secret-1"))
            .and(body_string_contains("refresh_token=1%2F%2Fold"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "ya29.new",
                "expires_in": 3599,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let token = refresher(&server).refresh("1//old").await.expect("refresh");

        assert_eq!(token.access_token, "ya29.new");
        assert_eq!(token.expires_in_secs, 3599);
        assert_eq!(token.refresh_token, None);
    }

    #[tokio::test]
    async fn keeps_rotated_refresh_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "ya29.new",
                "refresh_token": "1//rotated",
                "expires_in": 3600
            })))
            .mount(&server)
            .await;

        let token = refresher(&server).refresh("1//old").await.expect("refresh");
        assert_eq!(token.refresh_token.as_deref(), Some("1//rotated"));
    }

    #[tokio::test]
    async fn invalid_grant_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "invalid_grant",
                "error_description": "Token has been expired or revoked."
            })))
            .mount(&server)
            .await;

        let err = refresher(&server).refresh("1//old").await.unwrap_err();
        assert_eq!(
            err,
            RefreshError::Rejected("invalid_grant: Token has been expired or revoked.".into())
        );
    }

    #[tokio::test]
    async fn server_failure_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .expect(2)
            .mount(&server)
            .await;

        let err = refresher(&server).refresh("1//old").await.unwrap_err();
        assert!(matches!(err, RefreshError::Unavailable(_)));
    }

    #[test]
    fn missing_client_id_is_a_config_error() {
        let result = GoogleTokenRefresher::from_config(&GoogleConfig::default());
        assert!(matches!(result, Err(CalSyncError::Config(_))));
    }
}
