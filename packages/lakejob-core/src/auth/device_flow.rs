//! OAuth 2.0 Device Authorization Grant flow.
//!
//! The user signs in on a separate device or browser using the displayed code
//! while this process polls the token endpoint.

use crate::auth::credentials::TokenCredential;
use crate::auth::identity::{IdentityClient, TokenRequest};
use crate::auth::AuthError;
use crate::http::HttpClient;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Default poll interval when the provider does not send one
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Extra wait added when the provider answers `slow_down`
const SLOW_DOWN_INCREMENT_SECS: u64 = 5;

/// Event payload for the verification code notification
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceCodeEvent {
    pub verification_url: String,
    pub user_code: String,
    /// Human-readable sign-in instructions from the provider
    pub message: String,
    pub expires_in: u64,
}

/// Response from the device code endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceCodeInfo {
    pub user_code: String,
    pub device_code: String,
    #[serde(alias = "verification_uri")]
    pub verification_url: String,
    #[serde(deserialize_with = "crate::auth::credentials::lenient_u64_required")]
    pub expires_in: u64,
    #[serde(default, deserialize_with = "crate::auth::credentials::lenient_u64")]
    pub interval: Option<u64>,
    #[serde(default)]
    pub message: Option<String>,
}

impl DeviceCodeInfo {
    fn event(&self) -> DeviceCodeEvent {
        let message = self.message.clone().unwrap_or_else(|| {
            format!(
                "To sign in, use a web browser to open the page {} and enter the code {} to authenticate.",
                self.verification_url, self.user_code
            )
        });
        DeviceCodeEvent {
            verification_url: self.verification_url.clone(),
            user_code: self.user_code.clone(),
            message,
            expires_in: self.expires_in,
        }
    }
}

/// Authenticate the end user with the device code flow.
///
/// Requests a user code, hands it to `on_code` for display, then polls the
/// token endpoint until the user completes sign-in or the code expires.
///
/// If the `browser` feature is enabled, this will also attempt to open the
/// verification URL in the default browser.
pub async fn authenticate_device_code<C, F>(
    client: &IdentityClient<C>,
    client_id: &str,
    on_code: Option<F>,
) -> Result<TokenCredential, AuthError>
where
    C: HttpClient,
    F: Fn(&DeviceCodeEvent) + Send + Sync,
{
    let info = client.request_device_code(client_id).await?;
    let event = info.event();

    tracing::info!("Device code issued, verification URL: {}", info.verification_url);

    if let Some(emit) = &on_code {
        emit(&event);
    }

    // Try to open browser automatically (if browser feature enabled)
    #[cfg(all(feature = "browser", not(test)))]
    {
        if let Err(e) = webbrowser::open(&info.verification_url) {
            tracing::warn!(
                "Failed to open browser automatically: {}. User can use the manual link.",
                e
            );
        }
    }

    poll_for_token(client, client_id, &info).await
}

/// Poll the token endpoint until the device code is redeemed or expires.
async fn poll_for_token<C: HttpClient>(
    client: &IdentityClient<C>,
    client_id: &str,
    info: &DeviceCodeInfo,
) -> Result<TokenCredential, AuthError> {
    let mut poll_interval =
        Duration::from_secs(info.interval.unwrap_or(DEFAULT_POLL_INTERVAL_SECS));
    let expires_at = Instant::now() + Duration::from_secs(info.expires_in);

    let form = TokenRequest {
        grant_type: "device_code",
        client_id,
        resource: client.resource(),
        code: Some(info.device_code.as_str()),
        ..Default::default()
    };

    loop {
        if Instant::now() >= expires_at {
            return Err(AuthError::DeviceCodeExpired);
        }

        match client.request_token(&form).await {
            Ok(resp) => {
                let credential = TokenCredential::from_response(resp, client_id, client.resource());
                tracing::info!("Device code sign-in completed");
                return Ok(credential);
            }
            Err(e) => match e.oauth_error() {
                Some("authorization_pending") => {
                    tracing::debug!("Authorization pending, retrying in {:?}", poll_interval);
                }
                Some("slow_down") => {
                    poll_interval += Duration::from_secs(SLOW_DOWN_INCREMENT_SECS);
                    tracing::debug!("Provider asked to slow down, interval now {:?}", poll_interval);
                }
                Some("expired_token") | Some("code_expired") => {
                    return Err(AuthError::DeviceCodeExpired);
                }
                _ => return Err(e),
            },
        }

        sleep(poll_interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::identity::Authority;
    use crate::testing::MockHttp;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn client(mock: &MockHttp) -> IdentityClient<MockHttp> {
        IdentityClient::with_http(
            mock.clone(),
            Authority::new("https://login.example.com", "tenant"),
            "https://management.core.windows.net/",
        )
    }

    fn device_code_body(interval: serde_json::Value) -> serde_json::Value {
        json!({
            "user_code": "ABCD-EFGH",
            "device_code": "device-123",
            "verification_url": "https://microsoft.com/devicelogin",
            "expires_in": "900",
            "interval": interval,
            "message": "To sign in, enter ABCD-EFGH at https://microsoft.com/devicelogin"
        })
    }

    type NoCallback = fn(&DeviceCodeEvent);

    #[tokio::test(start_paused = true)]
    async fn test_device_code_polls_until_authorized() {
        let mock = MockHttp::new();
        mock.push_json(200, device_code_body(json!("5")))
            .push_json(400, json!({"error": "authorization_pending"}))
            .push_json(400, json!({"error": "authorization_pending"}))
            .push_json(
                200,
                json!({"access_token": "tok", "token_type": "Bearer", "expires_in": "3600"}),
            );

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let started = Instant::now();
        let cred = authenticate_device_code(
            &client(&mock),
            "client-app",
            Some(move |event: &DeviceCodeEvent| sink.lock().unwrap().push(event.message.clone())),
        )
        .await
        .unwrap();

        assert_eq!(cred.access_token, "tok");
        assert_eq!(cred.client_id, "client-app");
        assert_eq!(started.elapsed(), Duration::from_secs(10));
        assert_eq!(
            seen.lock().unwrap().as_slice(),
            ["To sign in, enter ABCD-EFGH at https://microsoft.com/devicelogin"]
        );

        let requests = mock.requests();
        assert_eq!(requests.len(), 4);
        assert_eq!(requests[0].uri, "https://login.example.com/tenant/oauth2/devicecode");
        let first = requests[0].form();
        assert_eq!(first["client_id"], "client-app");
        assert_eq!(first["resource"], "https://management.core.windows.net/");
        let poll = requests[1].form();
        assert_eq!(poll["grant_type"], "device_code");
        assert_eq!(poll["code"], "device-123");
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_down_increases_interval() {
        let mock = MockHttp::new();
        mock.push_json(200, device_code_body(json!(2)))
            .push_json(400, json!({"error": "slow_down"}))
            .push_json(200, json!({"access_token": "tok"}));

        let started = Instant::now();
        authenticate_device_code(&client(&mock), "app", None::<NoCallback>)
            .await
            .unwrap();
        assert_eq!(started.elapsed(), Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_device_code_expiry() {
        let mock = MockHttp::new();
        mock.push_json(200, device_code_body(json!(null)))
            .push_json(400, json!({"error": "code_expired"}));

        let err = authenticate_device_code(&client(&mock), "app", None::<NoCallback>)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::DeviceCodeExpired));
    }

    #[tokio::test(start_paused = true)]
    async fn test_declined_sign_in_propagates() {
        let mock = MockHttp::new();
        mock.push_json(200, device_code_body(json!(1)))
            .push_json(
                400,
                json!({"error": "authorization_declined", "error_description": "user said no"}),
            );

        let err = authenticate_device_code(&client(&mock), "app", None::<NoCallback>)
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error(), Some("authorization_declined"));
    }

    #[tokio::test]
    async fn test_device_code_request_rejected() {
        let mock = MockHttp::new();
        mock.push_json(400, json!({"error": "invalid_client"}));

        let err = authenticate_device_code(&client(&mock), "app", None::<NoCallback>)
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error(), Some("invalid_client"));
        assert_eq!(mock.requests().len(), 1);
    }
}
