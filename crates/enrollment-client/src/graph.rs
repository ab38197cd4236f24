//! Microsoft Graph implementation of `EnrollmentService`
//!
//! Routes (relative to the configured base URL):
//! - `deviceManagement/depOnboardingSettings` (tokens, sync action, roster)
//! - `deviceManagement/managedDevices` (serial lookup, delete)
//!
//! Every request resolves a bearer token from the shared `TokenSource` first,
//! so long-running sync loops survive token expiry.

use std::sync::Arc;

use graph_auth::TokenSource;
use reqwest::Method;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::model::{Collection, EnrolledDeviceIdentity, EnrollmentToken, ManagedDeviceRecord, Page};
use crate::{BoxFuture, ClientError, EnrollmentService, Result, classify_status};

const TOKENS_PATH: &str = "deviceManagement/depOnboardingSettings";
const MANAGED_DEVICES_PATH: &str = "deviceManagement/managedDevices";

/// Graph-backed remote service client.
pub struct GraphClient {
    http: reqwest::Client,
    base_url: String,
    tokens: Arc<TokenSource>,
}

impl GraphClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, tokens: Arc<TokenSource>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http,
            base_url,
            tokens,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Send an authenticated request and classify non-success statuses.
    async fn send(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, &str)],
        context: &str,
    ) -> Result<reqwest::Response> {
        let bearer = self.tokens.bearer(&self.http).await?;
        debug!(%method, url, "graph request");

        let mut request = self
            .http
            .request(method, url)
            .bearer_auth(bearer.expose());
        if !query.is_empty() {
            request = request.query(query);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ClientError::Http(format!("{context}: {e}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        Err(classify_status(status.as_u16(), &body, context))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
        context: &str,
    ) -> Result<T> {
        self.send(Method::GET, url, query, context)
            .await?
            .json::<T>()
            .await
            .map_err(|e| ClientError::Decode(format!("{context}: {e}")))
    }

    /// Fetch every page of a collection, following `@odata.nextLink`.
    async fn get_all<T: DeserializeOwned>(&self, path: &str, context: &str) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut url = self.url(path);
        loop {
            let page: Collection<T> = self.get_json(&url, &[], context).await?;
            items.extend(page.value);
            match page.next_link {
                Some(next) => url = next,
                None => return Ok(items),
            }
        }
    }
}

/// Escape a value for use inside a single-quoted OData string literal.
fn odata_literal(value: &str) -> String {
    value.replace('\'', "''")
}

impl EnrollmentService for GraphClient {
    fn list_enrollment_tokens(&self) -> BoxFuture<'_, Result<Vec<EnrollmentToken>>> {
        Box::pin(async move { self.get_all(TOKENS_PATH, "list enrollment tokens").await })
    }

    fn get_enrollment_token<'a>(
        &'a self,
        token_id: &'a str,
    ) -> BoxFuture<'a, Result<EnrollmentToken>> {
        Box::pin(async move {
            let url = self.url(&format!("{TOKENS_PATH}/{token_id}"));
            self.get_json(&url, &[], &format!("enrollment token {token_id}"))
                .await
        })
    }

    fn trigger_enrollment_sync<'a>(&'a self, token_id: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let url = self.url(&format!(
                "{TOKENS_PATH}/{token_id}/syncWithAppleDeviceEnrollmentProgram"
            ));
            self.send(
                Method::POST,
                &url,
                &[],
                &format!("sync enrollment token {token_id}"),
            )
            .await?;
            Ok(())
        })
    }

    fn find_managed_device<'a>(
        &'a self,
        serial_number: &'a str,
    ) -> BoxFuture<'a, Result<Option<ManagedDeviceRecord>>> {
        Box::pin(async move {
            let filter = format!("serialNumber eq '{}'", odata_literal(serial_number));
            let url = self.url(MANAGED_DEVICES_PATH);
            let collection: Collection<ManagedDeviceRecord> = self
                .get_json(
                    &url,
                    &[("$filter", filter.as_str())],
                    &format!("managed device lookup {serial_number}"),
                )
                .await?;

            if collection.value.len() > 1 {
                warn!(
                    serial = serial_number,
                    matches = collection.value.len(),
                    "multiple managed device records share this serial, using the first"
                );
            }
            Ok(collection.value.into_iter().next())
        })
    }

    fn delete_managed_device<'a>(&'a self, device_id: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let url = self.url(&format!("{MANAGED_DEVICES_PATH}/{device_id}"));
            self.send(
                Method::DELETE,
                &url,
                &[],
                &format!("managed device {device_id}"),
            )
            .await?;
            Ok(())
        })
    }

    fn list_enrolled_device_identities<'a>(
        &'a self,
        token_id: &'a str,
        next_link: Option<&'a str>,
    ) -> BoxFuture<'a, Result<Page<EnrolledDeviceIdentity>>> {
        Box::pin(async move {
            let url = match next_link {
                Some(link) => link.to_string(),
                None => self.url(&format!(
                    "{TOKENS_PATH}/{token_id}/importedAppleDeviceIdentities"
                )),
            };
            let collection: Collection<EnrolledDeviceIdentity> = self
                .get_json(&url, &[], &format!("roster of enrollment token {token_id}"))
                .await?;
            Ok(collection.into())
        })
    }

    fn remove_enrolled_device_identity<'a>(
        &'a self,
        token_id: &'a str,
        identity_id: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let url = self.url(&format!(
                "{TOKENS_PATH}/{token_id}/importedAppleDeviceIdentities/{identity_id}"
            ));
            self.send(
                Method::DELETE,
                &url,
                &[],
                &format!("identity {identity_id} in enrollment token {token_id}"),
            )
            .await?;
            Ok(())
        })
    }
}
