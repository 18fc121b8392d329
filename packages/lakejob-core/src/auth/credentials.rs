//! Bearer token credential produced by the authentication flows.

use serde::{Deserialize, Deserializer, Serialize};

#[derive(Clone, Serialize, Deserialize)]
pub struct TokenCredential {
    pub access_token: String,
    pub token_type: String,
    pub resource: String,
    pub client_id: String,
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
    pub refresh_token: Option<String>,
    /// Signed-in user, when the flow involved one
    pub user_id: Option<String>,
}

impl TokenCredential {
    /// Build a credential from a token endpoint response.
    pub(crate) fn from_response(resp: TokenResponse, client_id: &str, resource: &str) -> Self {
        // Out-of-range values leave the expiry unknown rather than wrapping
        let expires_at = resp
            .expires_on
            .and_then(|secs| i64::try_from(secs).ok())
            .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
            .or_else(|| {
                resp.expires_in
                    .and_then(|secs| i64::try_from(secs).ok())
                    .and_then(chrono::Duration::try_seconds)
                    .and_then(|ttl| chrono::Utc::now().checked_add_signed(ttl))
            });

        Self {
            access_token: resp.access_token,
            token_type: resp.token_type.unwrap_or_else(|| "Bearer".to_string()),
            resource: resp.resource.unwrap_or_else(|| resource.to_string()),
            client_id: client_id.to_string(),
            expires_at,
            refresh_token: resp.refresh_token,
            user_id: None,
        }
    }

    /// Value for the `Authorization` header
    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }

    /// Whether the token has passed its expiry time
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .map(|expires_at| chrono::Utc::now() >= expires_at)
            .unwrap_or(false)
    }
}

impl std::fmt::Debug for TokenCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCredential")
            .field("access_token", &"***")
            .field("token_type", &self.token_type)
            .field("resource", &self.resource)
            .field("client_id", &self.client_id)
            .field("expires_at", &self.expires_at)
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "***"))
            .field("user_id", &self.user_id)
            .finish()
    }
}

/// Successful token endpoint response.
///
/// The v1 endpoint sends numeric fields as JSON strings.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    pub token_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub expires_in: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub expires_on: Option<u64>,
    pub resource: Option<String>,
    pub refresh_token: Option<String>,
}

/// OAuth error body
#[derive(Debug, Deserialize)]
pub(crate) struct TokenErrorResponse {
    pub error: String,
    pub error_description: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(u64),
    String(String),
}

pub(crate) fn lenient_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<NumberOrString>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrString::Number(n)) => Ok(Some(n)),
        Some(NumberOrString::String(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

pub(crate) fn lenient_u64_required<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    lenient_u64(deserializer)?.ok_or_else(|| serde::de::Error::custom("expected a number"))
}
