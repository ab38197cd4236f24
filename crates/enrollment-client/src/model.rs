//! Remote record types
//!
//! Field names follow the Graph JSON (camelCase). Sync timestamps on
//! `EnrollmentToken` stay raw strings: they are parsed per token by the
//! status model so one malformed value cannot fail a whole listing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Absent and `null` both read as an empty string.
fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// One enrollment program token (rate-limited sync resource).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentToken {
    pub id: String,
    #[serde(default)]
    pub token_name: Option<String>,
    /// External program account the token belongs to
    #[serde(default)]
    pub apple_identifier: Option<String>,
    #[serde(default, rename = "lastSuccessfulSyncDateTime")]
    pub last_successful_sync: Option<String>,
    #[serde(default, rename = "lastSyncTriggeredDateTime")]
    pub last_sync_triggered: Option<String>,
    #[serde(default)]
    pub synced_device_count: u64,
}

impl EnrollmentToken {
    /// Display name, falling back to the id for unnamed tokens.
    pub fn display_name(&self) -> &str {
        self.token_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.id)
    }
}

/// A device's registration in the device-management registry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedDeviceRecord {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub serial_number: String,
    #[serde(default)]
    pub device_name: Option<String>,
    #[serde(default)]
    pub operating_system: Option<String>,
    #[serde(default)]
    pub os_version: Option<String>,
    #[serde(default, rename = "enrolledDateTime")]
    pub enrolled_at: Option<DateTime<Utc>>,
}

/// A device identity inside one token's roster.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrolledDeviceIdentity {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub serial_number: String,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl EnrolledDeviceIdentity {
    /// Case-insensitive serial comparison.
    pub fn matches_serial(&self, serial_number: &str) -> bool {
        self.serial_number.eq_ignore_ascii_case(serial_number.trim())
    }
}

/// One page of a paginated collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Absolute continuation URL; `None` on the last page
    pub next_link: Option<String>,
}

/// OData collection envelope (`value` + `@odata.nextLink`).
#[derive(Debug, Deserialize)]
pub(crate) struct Collection<T> {
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
    #[serde(default, rename = "@odata.nextLink")]
    pub next_link: Option<String>,
}

impl<T> From<Collection<T>> for Page<T> {
    fn from(collection: Collection<T>) -> Self {
        Self {
            items: collection.value,
            next_link: collection.next_link,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_deserializes_graph_shape() {
        let json = r#"{
            "id": "dep-1",
            "tokenName": "Contoso ABM",
            "appleIdentifier": "mdm@contoso.com",
            "lastSuccessfulSyncDateTime": "2025-03-01T10:00:00Z",
            "lastSyncTriggeredDateTime": "2025-03-01T09:59:30Z",
            "syncedDeviceCount": 42,
            "tokenExpirationDateTime": "2026-01-01T00:00:00Z"
        }"#;
        let token: EnrollmentToken = serde_json::from_str(json).unwrap();
        assert_eq!(token.id, "dep-1");
        assert_eq!(token.display_name(), "Contoso ABM");
        assert_eq!(token.apple_identifier.as_deref(), Some("mdm@contoso.com"));
        assert_eq!(
            token.last_sync_triggered.as_deref(),
            Some("2025-03-01T09:59:30Z")
        );
        assert_eq!(token.synced_device_count, 42);
    }

    #[test]
    fn token_without_timestamps_deserializes() {
        let token: EnrollmentToken = serde_json::from_str(r#"{"id":"dep-2"}"#).unwrap();
        assert!(token.last_sync_triggered.is_none());
        assert!(token.last_successful_sync.is_none());
        assert_eq!(token.display_name(), "dep-2");
    }

    #[test]
    fn managed_device_parses_enrolled_date() {
        let json = r#"{
            "id": "md-1",
            "serialNumber": "C02ABC123",
            "deviceName": "Kiosk-01",
            "operatingSystem": "iOS",
            "osVersion": "17.4",
            "enrolledDateTime": "2024-11-05T08:30:00Z"
        }"#;
        let record: ManagedDeviceRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.serial_number, "C02ABC123");
        assert_eq!(record.device_name.as_deref(), Some("Kiosk-01"));
        assert!(record.enrolled_at.is_some());
    }

    #[test]
    fn identity_serial_match_ignores_case_and_whitespace() {
        let identity = EnrolledDeviceIdentity {
            id: "i-1".into(),
            serial_number: "F9FXK1ABCD".into(),
            platform: Some("iOS".into()),
            description: None,
        };
        assert!(identity.matches_serial("f9fxk1abcd"));
        assert!(identity.matches_serial(" F9FXK1ABCD "));
        assert!(!identity.matches_serial("F9FXK1ABCE"));
    }

    #[test]
    fn null_serial_reads_as_empty_without_failing_the_page() {
        let json = r#"{"value":[
            {"id":"i-1","serialNumber":null},
            {"id":"i-2"},
            {"id":"i-3","serialNumber":"SN3"}
        ]}"#;
        let collection: Collection<EnrolledDeviceIdentity> = serde_json::from_str(json).unwrap();
        let serials: Vec<&str> = collection
            .value
            .iter()
            .map(|i| i.serial_number.as_str())
            .collect();
        assert_eq!(serials, vec!["", "", "SN3"]);
        assert!(!collection.value[0].matches_serial("SN3"));

        let record: ManagedDeviceRecord =
            serde_json::from_str(r#"{"id":"md-9","serialNumber":null}"#).unwrap();
        assert_eq!(record.serial_number, "");
    }

    #[test]
    fn collection_converts_to_page_with_next_link() {
        let json = r#"{"value":[{"id":"i-1","serialNumber":"A"}],"@odata.nextLink":"https://graph/next"}"#;
        let collection: Collection<EnrolledDeviceIdentity> = serde_json::from_str(json).unwrap();
        let page: Page<EnrolledDeviceIdentity> = collection.into();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.next_link.as_deref(), Some("https://graph/next"));
    }
}
