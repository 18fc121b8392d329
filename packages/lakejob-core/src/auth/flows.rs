//! Non-interactive token flows and flow selection.

use crate::auth::assertion::{ClientCertificate, CLIENT_ASSERTION_TYPE_JWT_BEARER};
use crate::auth::credentials::TokenCredential;
use crate::auth::device_flow::{authenticate_device_code, DeviceCodeEvent};
use crate::auth::identity::{Authority, IdentityClient, TokenRequest};
use crate::auth::AuthError;
use crate::config::IdentitySettings;
use crate::http::HttpClient;
use serde::{Deserialize, Serialize};

/// Authentication flow to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthMethod {
    /// Interactive sign-in on another device
    DeviceCode,
    /// Resource owner password credentials
    UsernamePassword,
    /// Service principal with a client secret
    ClientSecret,
    /// Service principal with a certificate
    ClientCertificate,
}

impl std::fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthMethod::DeviceCode => write!(f, "device code"),
            AuthMethod::UsernamePassword => write!(f, "username/password"),
            AuthMethod::ClientSecret => write!(f, "client secret"),
            AuthMethod::ClientCertificate => write!(f, "client certificate"),
        }
    }
}

/// Authenticate a user with username and password.
///
/// This doesn't work for users or tenants that require multi-factor authentication.
pub async fn authenticate_username_password<C: HttpClient>(
    client: &IdentityClient<C>,
    client_id: &str,
    username: &str,
    password: &str,
) -> Result<TokenCredential, AuthError> {
    let form = TokenRequest {
        grant_type: "password",
        client_id,
        resource: client.resource(),
        username: Some(username),
        password: Some(password),
        scope: Some("openid"),
        ..Default::default()
    };

    let resp = client.request_token(&form).await?;
    let mut credential = TokenCredential::from_response(resp, client_id, client.resource());
    credential.user_id = Some(username.to_string());

    tracing::info!("Authenticated user {}", username);
    Ok(credential)
}

/// Authenticate a service principal with a client secret.
pub async fn authenticate_client_secret<C: HttpClient>(
    client: &IdentityClient<C>,
    client_id: &str,
    client_secret: &str,
) -> Result<TokenCredential, AuthError> {
    let form = TokenRequest {
        grant_type: "client_credentials",
        client_id,
        resource: client.resource(),
        client_secret: Some(client_secret),
        ..Default::default()
    };

    let resp = client.request_token(&form).await?;
    tracing::info!("Authenticated service principal {} with secret", client_id);
    Ok(TokenCredential::from_response(resp, client_id, client.resource()))
}

/// Authenticate a service principal with a certificate.
pub async fn authenticate_client_certificate<C: HttpClient>(
    client: &IdentityClient<C>,
    client_id: &str,
    certificate: &ClientCertificate,
) -> Result<TokenCredential, AuthError> {
    let assertion =
        certificate.create_assertion(client_id, &client.authority().token_endpoint())?;

    let form = TokenRequest {
        grant_type: "client_credentials",
        client_id,
        resource: client.resource(),
        client_assertion_type: Some(CLIENT_ASSERTION_TYPE_JWT_BEARER),
        client_assertion: Some(assertion),
        ..Default::default()
    };

    let resp = client.request_token(&form).await?;
    tracing::info!("Authenticated service principal {} with certificate", client_id);
    Ok(TokenCredential::from_response(resp, client_id, client.resource()))
}

/// Run the selected flow with values from the identity settings.
///
/// `on_code` is only invoked by the device code flow.
pub async fn authenticate<C, F>(
    settings: &IdentitySettings,
    method: AuthMethod,
    http: C,
    on_code: Option<F>,
) -> Result<TokenCredential, AuthError>
where
    C: HttpClient,
    F: Fn(&DeviceCodeEvent) + Send + Sync,
{
    let tenant = match (method, settings.tenant.as_deref()) {
        (_, Some(tenant)) => tenant,
        // Multi-tenant user sign-in is allowed without a tenant
        (AuthMethod::DeviceCode, None) => "common",
        (_, None) => return Err(AuthError::MissingConfig("tenant")),
    };
    let client = IdentityClient::with_http(
        http,
        Authority::new(&settings.authority_host, tenant),
        &settings.resource,
    );

    tracing::debug!("Authenticating against {} using {}", client.authority().url(), method);

    match method {
        AuthMethod::DeviceCode => {
            authenticate_device_code(&client, &settings.device_client_id(), on_code).await
        }
        AuthMethod::UsernamePassword => {
            let client_id = require(&settings.client_id, "client_id")?;
            let username = require(&settings.username, "username")?;
            let password = require(&settings.password, "password")?;
            authenticate_username_password(&client, client_id, username, password).await
        }
        AuthMethod::ClientSecret => {
            let client_id = require(&settings.client_id, "client_id")?;
            let secret = require(&settings.client_secret, "client_secret")?;
            authenticate_client_secret(&client, client_id, secret).await
        }
        AuthMethod::ClientCertificate => {
            let client_id = require(&settings.client_id, "client_id")?;
            let path = settings
                .certificate_path
                .as_deref()
                .ok_or(AuthError::MissingConfig("certificate_path"))?;
            let thumbprint =
                require(&settings.certificate_thumbprint, "certificate_thumbprint")?;
            let certificate = ClientCertificate::from_pem_file(path, thumbprint)?;
            authenticate_client_certificate(&client, client_id, &certificate).await
        }
    }
}

fn require<'a>(value: &'a Option<String>, name: &'static str) -> Result<&'a str, AuthError> {
    value.as_deref().ok_or(AuthError::MissingConfig(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::assertion::tests::{test_key, test_pem, THUMBPRINT};
    use crate::testing::MockHttp;
    use serde_json::json;
    use std::io::Write;

    type NoCallback = fn(&DeviceCodeEvent);

    fn client(mock: &MockHttp) -> IdentityClient<MockHttp> {
        IdentityClient::with_http(
            mock.clone(),
            Authority::new("https://login.example.com", "tenant"),
            "https://management.core.windows.net/",
        )
    }

    fn token_body() -> serde_json::Value {
        json!({
            "token_type": "Bearer",
            "expires_in": "3599",
            "resource": "https://management.core.windows.net/",
            "access_token": "eyJ0eXAi.token",
            "refresh_token": "refresh"
        })
    }

    fn rejection() -> serde_json::Value {
        json!({"error": "invalid_grant", "error_description": "AADSTS50126: Invalid username or password"})
    }

    #[tokio::test]
    async fn test_username_password_flow() {
        let mock = MockHttp::new();
        mock.push_json(200, token_body());

        let cred = authenticate_username_password(&client(&mock), "app", "user@contoso.com", "pw")
            .await
            .unwrap();
        assert_eq!(cred.access_token, "eyJ0eXAi.token");
        assert_eq!(cred.user_id.as_deref(), Some("user@contoso.com"));
        assert_eq!(cred.refresh_token.as_deref(), Some("refresh"));

        let form = mock.requests()[0].form();
        assert_eq!(form["grant_type"], "password");
        assert_eq!(form["username"], "user@contoso.com");
        assert_eq!(form["password"], "pw");
        assert_eq!(form["scope"], "openid");
        assert_eq!(form["resource"], "https://management.core.windows.net/");
    }

    #[tokio::test]
    async fn test_username_password_rejected() {
        let mock = MockHttp::new();
        mock.push_json(400, rejection());

        let err = authenticate_username_password(&client(&mock), "app", "user", "bad")
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error(), Some("invalid_grant"));
    }

    #[tokio::test]
    async fn test_client_secret_flow() {
        let mock = MockHttp::new();
        mock.push_json(200, token_body()).push_json(401, json!({"error": "invalid_client"}));

        let cred = authenticate_client_secret(&client(&mock), "app", "s3cret")
            .await
            .unwrap();
        assert_eq!(cred.client_id, "app");
        assert_eq!(cred.user_id, None);

        let form = mock.requests()[0].form();
        assert_eq!(form["grant_type"], "client_credentials");
        assert_eq!(form["client_secret"], "s3cret");
        assert!(!form.contains_key("client_assertion"));

        let err = authenticate_client_secret(&client(&mock), "app", "wrong")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Rejected { status: 401, .. }));
    }

    #[tokio::test]
    async fn test_client_certificate_flow() {
        let mock = MockHttp::new();
        mock.push_json(200, token_body()).push_json(400, rejection());
        let cert = ClientCertificate::from_pem(&test_pem(&test_key()), THUMBPRINT).unwrap();

        let cred = authenticate_client_certificate(&client(&mock), "app", &cert)
            .await
            .unwrap();
        assert_eq!(cred.access_token, "eyJ0eXAi.token");

        let form = mock.requests()[0].form();
        assert_eq!(form["grant_type"], "client_credentials");
        assert_eq!(form["client_assertion_type"], CLIENT_ASSERTION_TYPE_JWT_BEARER);
        assert_eq!(form["client_assertion"].split('.').count(), 3);
        assert!(!form.contains_key("client_secret"));

        assert!(
            authenticate_client_certificate(&client(&mock), "app", &cert)
                .await
                .is_err()
        );
    }

    fn settings() -> IdentitySettings {
        IdentitySettings {
            authority_host: "https://login.example.com".to_string(),
            resource: "https://management.core.windows.net/".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_dispatch_reports_missing_values() {
        let err = authenticate(&settings(), AuthMethod::ClientSecret, MockHttp::new(), None::<NoCallback>)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::MissingConfig("tenant")));

        let mut with_tenant = settings();
        with_tenant.tenant = Some("contoso".to_string());
        with_tenant.client_id = Some("app".to_string());
        let err = authenticate(&with_tenant, AuthMethod::UsernamePassword, MockHttp::new(), None::<NoCallback>)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::MissingConfig("username")));

        let err = authenticate(&with_tenant, AuthMethod::ClientCertificate, MockHttp::new(), None::<NoCallback>)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::MissingConfig("certificate_path")));
    }

    #[tokio::test]
    async fn test_dispatch_uses_configured_tenant_and_secret() {
        let mock = MockHttp::new();
        mock.push_json(200, token_body());
        let mut settings = settings();
        settings.tenant = Some("contoso".to_string());
        settings.client_id = Some("app".to_string());
        settings.client_secret = Some("s3cret".to_string());

        let cred = authenticate(&settings, AuthMethod::ClientSecret, mock.clone(), None::<NoCallback>)
            .await
            .unwrap();
        assert_eq!(cred.client_id, "app");
        assert_eq!(mock.requests()[0].uri, "https://login.example.com/contoso/oauth2/token");
    }

    #[tokio::test]
    async fn test_dispatch_loads_certificate_file() {
        let mut pem_file = tempfile::NamedTempFile::new().unwrap();
        pem_file.write_all(test_pem(&test_key()).as_bytes()).unwrap();

        let mock = MockHttp::new();
        mock.push_json(200, token_body());
        let mut settings = settings();
        settings.tenant = Some("contoso".to_string());
        settings.client_id = Some("app".to_string());
        settings.certificate_path = Some(pem_file.path().to_path_buf());
        settings.certificate_thumbprint = Some(THUMBPRINT.to_string());

        authenticate(&settings, AuthMethod::ClientCertificate, mock.clone(), None::<NoCallback>)
            .await
            .unwrap();
        let form = mock.requests()[0].form();
        assert_eq!(form["client_assertion_type"], CLIENT_ASSERTION_TYPE_JWT_BEARER);
    }

    #[tokio::test]
    async fn test_device_code_defaults_to_common_tenant() {
        let mock = MockHttp::new();
        mock.push_json(400, json!({"error": "invalid_request"}));

        let err = authenticate(&settings(), AuthMethod::DeviceCode, mock.clone(), None::<NoCallback>)
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error(), Some("invalid_request"));
        let requests = mock.requests();
        assert_eq!(requests[0].uri, "https://login.example.com/common/oauth2/devicecode");
        assert_eq!(
            requests[0].form()["client_id"],
            crate::config::DEFAULT_DEVICE_CLIENT_ID
        );
    }
}
