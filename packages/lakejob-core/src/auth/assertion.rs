//! Signed JWT client assertions for certificate authentication.

use crate::auth::AuthError;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::RsaPrivateKey;
use serde::Serialize;
use sha2::Sha256;
use std::path::Path;

/// Assertion type sent alongside the signed JWT
pub(crate) const CLIENT_ASSERTION_TYPE_JWT_BEARER: &str =
    "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// Assertion lifetime in seconds
const ASSERTION_LIFETIME_SECS: i64 = 600;

#[derive(Debug, Serialize)]
struct Header<'a> {
    alg: &'a str,
    typ: &'a str,
    x5t: String,
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    aud: &'a str,
    iss: &'a str,
    sub: &'a str,
    jti: String,
    nbf: i64,
    exp: i64,
}

/// Service principal certificate: RSA private key plus the certificate thumbprint.
#[derive(Clone)]
pub struct ClientCertificate {
    key: RsaPrivateKey,
    /// Raw SHA-1 thumbprint bytes
    thumbprint: Vec<u8>,
}

impl ClientCertificate {
    /// Build from a PEM private key (PKCS#8 or PKCS#1) and a hex thumbprint.
    ///
    /// Thumbprints copied from portals often contain spaces or colons; those are ignored.
    pub fn from_pem(private_key_pem: &str, thumbprint_hex: &str) -> Result<Self, AuthError> {
        let key = RsaPrivateKey::from_pkcs8_pem(private_key_pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(private_key_pem))
            .map_err(|e| AuthError::Certificate(format!("unreadable private key: {}", e)))?;

        let cleaned: String = thumbprint_hex
            .chars()
            .filter(|c| !c.is_whitespace() && *c != ':')
            .collect();
        let thumbprint = hex::decode(&cleaned)
            .map_err(|e| AuthError::Certificate(format!("invalid thumbprint: {}", e)))?;
        if thumbprint.len() != 20 {
            return Err(AuthError::Certificate(format!(
                "thumbprint must be 20 bytes (SHA-1), got {}",
                thumbprint.len()
            )));
        }

        Ok(Self { key, thumbprint })
    }

    /// Read the private key from a PEM file.
    pub fn from_pem_file(path: &Path, thumbprint_hex: &str) -> Result<Self, AuthError> {
        let pem = std::fs::read_to_string(path).map_err(|e| {
            AuthError::Certificate(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_pem(&pem, thumbprint_hex)
    }

    /// Thumbprint as sent in the JWT `x5t` header
    pub fn x5t(&self) -> String {
        URL_SAFE_NO_PAD.encode(&self.thumbprint)
    }

    /// Create an RS256-signed client assertion for the given token endpoint.
    pub fn create_assertion(&self, client_id: &str, audience: &str) -> Result<String, AuthError> {
        let now = chrono::Utc::now().timestamp();
        let header = Header {
            alg: "RS256",
            typ: "JWT",
            x5t: self.x5t(),
        };
        let claims = Claims {
            aud: audience,
            iss: client_id,
            sub: client_id,
            jti: uuid::Uuid::new_v4().to_string(),
            nbf: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };

        let header = serde_json::to_vec(&header).map_err(|e| AuthError::Signing(e.to_string()))?;
        let claims = serde_json::to_vec(&claims).map_err(|e| AuthError::Signing(e.to_string()))?;
        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header),
            URL_SAFE_NO_PAD.encode(claims)
        );

        let signing_key = SigningKey::<Sha256>::new(self.key.clone());
        let signature = signing_key
            .try_sign(signing_input.as_bytes())
            .map_err(|e| AuthError::Signing(e.to_string()))?;

        Ok(format!(
            "{}.{}",
            signing_input,
            URL_SAFE_NO_PAD.encode(signature.to_bytes())
        ))
    }
}

impl std::fmt::Debug for ClientCertificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCertificate")
            .field("thumbprint", &hex::encode_upper(&self.thumbprint))
            .finish_non_exhaustive()
    }
}
