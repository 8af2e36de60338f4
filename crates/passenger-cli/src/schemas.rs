//! Request and response bodies of the Passenger HTTP API.

use serde::{Deserialize, Serialize};

/// A stored account as returned by the server. The passphrase itself is
/// never part of this view; it is fetched separately.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    #[serde(default)]
    pub id: String,
    pub platform: String,
    pub identifier: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub strength: i32,
}

/// Body for creating an account.
#[derive(Debug, Clone, Serialize)]
pub struct CreateAccountRequest {
    pub platform: String,
    pub identifier: String,
    pub url: String,
    pub notes: String,
    pub passphrase: String,
}

/// Body for updating an account. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UpdateAccountRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passphrase: Option<String>,
}

impl UpdateAccountRequest {
    pub fn is_empty(&self) -> bool {
        self.platform.is_none()
            && self.identifier.is_none()
            && self.url.is_none()
            && self.notes.is_none()
            && self.passphrase.is_none()
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct StatusResponse {
    pub initialized: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterResponse {
    pub recovery: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateResponse {
    pub generated: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlternateResponse {
    pub alternative: String,
}

/// A CSV row the server refused to import.
#[derive(Debug, Clone, Deserialize)]
pub struct FailedImport {
    pub platform: String,
    pub identifier: String,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResponse {
    pub success_count: usize,
    #[serde(default)]
    pub failed_ones: Vec<FailedImport>,
}

/// Error body returned with 4xx/5xx responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn import_response_uses_camel_case() {
        let body = r#"{"successCount":3,"failedOnes":[{"platform":"github","identifier":"me","url":""}]}"#;
        let parsed: ImportResponse = serde_json::from_str(body).unwrap();

        assert_eq!(parsed.success_count, 3);
        assert_eq!(parsed.failed_ones.len(), 1);
        assert_eq!(parsed.failed_ones[0].platform, "github");
    }

    #[test]
    fn account_tolerates_missing_optional_fields() {
        let body = r#"{"id":"a1","platform":"github","identifier":"me"}"#;
        let account: Account = serde_json::from_str(body).unwrap();

        assert_eq!(account.id, "a1");
        assert_eq!(account.strength, 0);
        assert!(account.notes.is_empty());
    }

    #[test]
    fn update_request_omits_unset_fields() {
        let req = UpdateAccountRequest {
            notes: Some("rotated".into()),
            ..Default::default()
        };
        assert!(!req.is_empty());
        assert_eq!(serde_json::to_string(&req).unwrap(), r#"{"notes":"rotated"}"#);
        assert!(UpdateAccountRequest::default().is_empty());
    }
}
