//! OAuth client-credentials token acquisition
//!
//! POSTs to the tenant's v2.0 token endpoint with `grant_type=client_credentials`
//! and the Graph `.default` scope. There is no refresh token in this grant; a
//! new token is simply requested when the old one is about to expire.

use common::Secret;
use serde::{Deserialize, Serialize};

use crate::constants::{AUTHORITY_URL, GRAPH_SCOPE};
use crate::error::{Error, Result};

/// Response from the token endpoint.
///
/// `expires_in` is a delta in seconds from the response time.
#[derive(Debug, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    pub expires_in: u64,
}

/// Application registration used for the client-credentials grant.
#[derive(Debug, Clone)]
pub struct AppCredentials {
    pub authority_url: String,
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: Secret<String>,
}

impl AppCredentials {
    pub fn new(tenant_id: String, client_id: String, client_secret: Secret<String>) -> Self {
        Self {
            authority_url: AUTHORITY_URL.to_string(),
            tenant_id,
            client_id,
            client_secret,
        }
    }

    /// Override the authority host (sovereign clouds, tests).
    pub fn with_authority(mut self, authority_url: impl Into<String>) -> Self {
        self.authority_url = authority_url.into();
        self
    }

    /// Tenant-specific v2.0 token endpoint.
    pub fn token_endpoint(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority_url.trim_end_matches('/'),
            self.tenant_id
        )
    }
}

/// Acquire an app-only access token for Microsoft Graph.
pub async fn acquire_token(
    client: &reqwest::Client,
    credentials: &AppCredentials,
) -> Result<TokenResponse> {
    let response = client
        .post(credentials.token_endpoint())
        .form(&[
            ("grant_type", "client_credentials"),
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.expose().as_str()),
            ("scope", GRAPH_SCOPE),
        ])
        .send()
        .await
        .map_err(|e| Error::Http(format!("token request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));

        // invalid_client / unauthorized_client / unknown tenant
        if matches!(status.as_u16(), 400 | 401 | 403) {
            return Err(Error::InvalidCredentials(format!(
                "token endpoint rejected client ({status}): {body}"
            )));
        }

        return Err(Error::TokenRequest(format!(
            "token endpoint returned {status}: {body}"
        )));
    }

    response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::TokenRequest(format!("invalid token response: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_credentials(server: &MockServer) -> AppCredentials {
        AppCredentials::new(
            "contoso-tenant".into(),
            "app-123".into(),
            Secret::new("client-secret".into()),
        )
        .with_authority(server.uri())
    }

    #[test]
    fn token_response_deserializes_identity_platform_shape() {
        let json = r#"{"token_type":"Bearer","expires_in":3599,"ext_expires_in":3599,"access_token":"eyJ0"}"#;
        let token: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(token.access_token, "eyJ0");
        assert_eq!(token.token_type.as_deref(), Some("Bearer"));
        assert_eq!(token.expires_in, 3599);
    }

    #[test]
    fn token_endpoint_is_tenant_scoped() {
        let creds = AppCredentials::new(
            "contoso".into(),
            "app".into(),
            Secret::new("s".into()),
        );
        assert_eq!(
            creds.token_endpoint(),
            "https://login.microsoftonline.com/contoso/oauth2/v2.0/token"
        );
    }

    #[test]
    fn token_endpoint_tolerates_trailing_slash() {
        let creds = AppCredentials::new("t".into(), "app".into(), Secret::new("s".into()))
            .with_authority("http://127.0.0.1:9999/");
        assert_eq!(creds.token_endpoint(), "http://127.0.0.1:9999/t/oauth2/v2.0/token");
    }

    #[tokio::test]
    async fn acquire_token_posts_client_credentials_grant() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/contoso-tenant/oauth2/v2.0/token"))
            .and(body_string_contains("grant_type=client_credentials"))
            .and(body_string_contains("client_id=app-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token_type": "Bearer",
                "expires_in": 3599,
                "access_token": "at_graph"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let token = acquire_token(&reqwest::Client::new(), &test_credentials(&server))
            .await
            .unwrap();
        assert_eq!(token.access_token, "at_graph");
        assert_eq!(token.expires_in, 3599);
    }

    #[tokio::test]
    async fn acquire_token_maps_401_to_invalid_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(401).set_body_string(r#"{"error":"invalid_client"}"#),
            )
            .mount(&server)
            .await;

        let err = acquire_token(&reqwest::Client::new(), &test_credentials(&server))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidCredentials(_)), "got: {err:?}");
        assert!(err.to_string().contains("invalid_client"));
    }

    #[tokio::test]
    async fn acquire_token_maps_5xx_to_token_request_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = acquire_token(&reqwest::Client::new(), &test_credentials(&server))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TokenRequest(_)), "got: {err:?}");
    }
}
