//! Authentication module.
//!
//! Acquires bearer tokens from Azure Active Directory using one of four flows:
//! device code, username/password, service principal with secret, and
//! service principal with certificate.

mod assertion;
mod credentials;
mod device_flow;
mod flows;
mod identity;

use thiserror::Error;

pub use assertion::ClientCertificate;
pub use credentials::TokenCredential;
pub use device_flow::{authenticate_device_code, DeviceCodeEvent, DeviceCodeInfo};
pub use flows::{
    authenticate, authenticate_client_certificate, authenticate_client_secret,
    authenticate_username_password, AuthMethod,
};
pub use identity::{Authority, IdentityClient};

/// Authentication errors surfaced to callers.
#[derive(Debug, Error)]
pub enum AuthError {
    /// A setting required by the selected flow is not configured
    #[error("Missing configuration value: {0}")]
    MissingConfig(&'static str),

    /// The identity provider answered with an OAuth error
    #[error("Identity provider rejected the request ({status}): {error}: {description}")]
    Rejected {
        status: u16,
        error: String,
        description: String,
    },

    /// The device code expired before the user completed sign-in
    #[error("Device code expired before authorization completed. Please try again.")]
    DeviceCodeExpired,

    /// The client certificate could not be loaded
    #[error("Invalid client certificate: {0}")]
    Certificate(String),

    /// The client assertion could not be signed
    #[error("Failed to sign client assertion: {0}")]
    Signing(String),

    /// The request never produced a response
    #[error("Request to identity provider failed: {0}")]
    Transport(String),

    /// The response could not be understood
    #[error("Unexpected response from identity provider: {0}")]
    InvalidResponse(String),
}

impl AuthError {
    /// OAuth error code when the provider rejected the request
    pub fn oauth_error(&self) -> Option<&str> {
        match self {
            AuthError::Rejected { error, .. } => Some(error),
            _ => None,
        }
    }
}
