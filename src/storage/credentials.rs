//! Credential resolution
//!
//! There is a single resolution path: explicit keys (plain or base64-encoded
//! at rest) when configured, otherwise the ambient provider chain that
//! rust-s3 walks (environment, profile file, instance metadata).

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use s3::creds::Credentials;
use tracing::debug;

use crate::types::{StorageError, StorageResult};

#[derive(Clone, Default)]
pub enum CredentialSource {
    #[default]
    Ambient,
    Static {
        access_key: String,
        secret_key: String,
    },
    Encoded {
        access_key: String,
        secret_key: String,
    },
}

impl std::fmt::Debug for CredentialSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CredentialSource::Ambient => write!(f, "Ambient"),
            CredentialSource::Static { .. } => write!(f, "Static(<redacted>)"),
            CredentialSource::Encoded { .. } => write!(f, "Encoded(<redacted>)"),
        }
    }
}

impl CredentialSource {
    pub fn resolve(&self) -> StorageResult<Credentials> {
        match self {
            CredentialSource::Ambient => {
                debug!("Resolving credentials from the default provider chain");
                Ok(Credentials::default()?)
            }
            CredentialSource::Static {
                access_key,
                secret_key,
            } => static_credentials(access_key, secret_key),
            CredentialSource::Encoded {
                access_key,
                secret_key,
            } => {
                let (access_key, secret_key) = decode_pair(access_key, secret_key)?;
                static_credentials(&access_key, &secret_key)
            }
        }
    }
}

fn static_credentials(access_key: &str, secret_key: &str) -> StorageResult<Credentials> {
    Ok(Credentials::new(
        Some(access_key),
        Some(secret_key),
        None,
        None,
        None,
    )?)
}

/// Decode a base64-encoded access/secret key pair
pub fn decode_pair(access_key: &str, secret_key: &str) -> StorageResult<(String, String)> {
    Ok((
        decode_key("access key", access_key)?,
        decode_key("secret key", secret_key)?,
    ))
}

fn decode_key(label: &str, encoded: &str) -> StorageResult<String> {
    let bytes = BASE64
        .decode(encoded.trim())
        .map_err(|e| StorageError::InvalidCredentials(format!("{} is not valid base64: {}", label, e)))?;
    let decoded = String::from_utf8(bytes)
        .map_err(|_| StorageError::InvalidCredentials(format!("{} is not valid UTF-8", label)))?;
    if decoded.is_empty() {
        return Err(StorageError::InvalidCredentials(format!("{} is empty", label)));
    }
    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_pair() {
        let (access, secret) = decode_pair("QUtJQUVYQU1QTEU=", "c2VjcmV0LWtleQ==").unwrap();
        assert_eq!(access, "AKIAEXAMPLE");
        assert_eq!(secret, "secret-key");
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = decode_pair("not base64!!", "c2VjcmV0").unwrap_err();
        assert!(matches!(err, StorageError::InvalidCredentials(msg) if msg.contains("access key")));

        let err = decode_pair("QUtJQQ==", "").unwrap_err();
        assert!(matches!(err, StorageError::InvalidCredentials(msg) if msg.contains("secret key")));
    }

    #[test]
    fn test_encoded_source_resolves() {
        let source = CredentialSource::Encoded {
            access_key: "QUtJQUVYQU1QTEU=".to_string(),
            secret_key: "c2VjcmV0LWtleQ==".to_string(),
        };
        let creds = source.resolve().unwrap();
        assert_eq!(creds.access_key.as_deref(), Some("AKIAEXAMPLE"));
        assert_eq!(creds.secret_key.as_deref(), Some("secret-key"));
    }

    #[test]
    fn test_debug_redacts_keys() {
        let source = CredentialSource::Static {
            access_key: "AKIAEXAMPLE".to_string(),
            secret_key: "secret-key".to_string(),
        };
        let printed = format!("{:?}", source);
        assert!(!printed.contains("AKIAEXAMPLE"));
        assert!(!printed.contains("secret-key"));
    }
}
