//! Identity provider authority and the OAuth form client.

use crate::auth::credentials::{TokenErrorResponse, TokenResponse};
use crate::auth::device_flow::DeviceCodeInfo;
use crate::auth::AuthError;
use crate::config::IdentitySettings;
use crate::http::{default_client, HttpClient};
use serde::Serialize;

/// Identity provider authority (`{host}/{tenant}`).
#[derive(Debug, Clone, PartialEq)]
pub struct Authority {
    url: String,
}

impl Authority {
    pub fn new(host: &str, tenant: &str) -> Self {
        Self {
            url: format!("{}/{}", host.trim_end_matches('/'), tenant.trim_matches('/')),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn token_endpoint(&self) -> String {
        format!("{}/oauth2/token", self.url)
    }

    pub fn device_code_endpoint(&self) -> String {
        format!("{}/oauth2/devicecode", self.url)
    }
}

/// Form body for the token endpoint. Unused fields are omitted.
#[derive(Debug, Default, Serialize)]
pub(crate) struct TokenRequest<'a> {
    pub grant_type: &'a str,
    pub client_id: &'a str,
    pub resource: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_assertion_type: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_assertion: Option<String>,
}

#[derive(Debug, Serialize)]
struct DeviceCodeRequest<'a> {
    client_id: &'a str,
    resource: &'a str,
}

/// Client for the identity provider's OAuth endpoints.
#[derive(Debug, Clone)]
pub struct IdentityClient<C = reqwest::Client> {
    http: C,
    authority: Authority,
    resource: String,
}

impl IdentityClient {
    /// Create a client for the configured authority using the default HTTP transport.
    ///
    /// A missing tenant falls back to `common`. That authority only works for the
    /// device code flow; [`authenticate`](crate::auth::authenticate) rejects a
    /// missing tenant for the other methods instead of building a client.
    pub fn new(settings: &IdentitySettings) -> Self {
        let tenant = settings.tenant.as_deref().unwrap_or("common");
        Self::with_http(
            default_client(),
            Authority::new(&settings.authority_host, tenant),
            &settings.resource,
        )
    }
}

impl<C: HttpClient> IdentityClient<C> {
    pub fn with_http(http: C, authority: Authority, resource: &str) -> Self {
        Self {
            http,
            authority,
            resource: resource.to_string(),
        }
    }

    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Request a device code and user code for the device code flow.
    pub(crate) async fn request_device_code(
        &self,
        client_id: &str,
    ) -> Result<DeviceCodeInfo, AuthError> {
        let form = DeviceCodeRequest {
            client_id,
            resource: &self.resource,
        };
        let body = self
            .post_form(&self.authority.device_code_endpoint(), &form)
            .await?;
        serde_json::from_slice(&body)
            .map_err(|e| AuthError::InvalidResponse(format!("device code response: {}", e)))
    }

    /// Exchange a grant at the token endpoint.
    pub(crate) async fn request_token(
        &self,
        form: &TokenRequest<'_>,
    ) -> Result<TokenResponse, AuthError> {
        tracing::debug!(
            "Requesting token (grant_type={}, client_id={})",
            form.grant_type,
            form.client_id
        );
        let body = self
            .post_form(&self.authority.token_endpoint(), form)
            .await?;
        serde_json::from_slice(&body)
            .map_err(|e| AuthError::InvalidResponse(format!("token response: {}", e)))
    }

    async fn post_form<T: Serialize>(&self, url: &str, form: &T) -> Result<Vec<u8>, AuthError> {
        let body = serde_html_form::to_string(form)
            .map_err(|e| AuthError::InvalidResponse(format!("failed to encode request: {}", e)))?;

        let request = http::Request::builder()
            .method(http::Method::POST)
            .uri(url)
            .header(http::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(http::header::ACCEPT, "application/json")
            .body(body.into_bytes())
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        let resp = self
            .http
            .send_http(request)
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        let status = resp.status();
        let body = resp.into_body();
        if status.is_success() {
            return Ok(body);
        }

        match serde_json::from_slice::<TokenErrorResponse>(&body) {
            Ok(err) => Err(AuthError::Rejected {
                status: status.as_u16(),
                error: err.error,
                description: err.error_description.unwrap_or_default(),
            }),
            Err(_) => Err(AuthError::Rejected {
                status: status.as_u16(),
                error: "http_error".to_string(),
                description: String::from_utf8_lossy(&body).into_owned(),
            }),
        }
    }
}
