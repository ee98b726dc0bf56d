//! HTTP transport for the vault server API.

use crate::config::ClientConfig;
use crate::session::challenge::Challenge;
use crate::session::keychain::KeychainEnvelope;
use crate::sync::models::{EntityType, SyncRecord};
use crate::transport::{OpenedSession, Transport, TransportError, TransportResult};
use crate::{Result, VaultError};
use async_trait::async_trait;
use reqwest::{RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use std::error::Error as StdError;
use std::time::Duration;
use tracing::debug;

/// Header carrying the session code on every authenticated request.
pub const SESSION_HEADER: &str = "X-API-SESSION";

const API_PREFIX: &str = "/index.php/apps/passwords/api/1.0";

/// HTTP client for the vault server.
///
/// Authenticates with HTTP Basic credentials (user name and app token) and
/// attaches the session code, when there is one, as [`SESSION_HEADER`].
pub struct HttpTransport {
    client: reqwest::Client,
    server_url: String,
    username: String,
    app_token: SecretString,
}

impl HttpTransport {
    /// Create a new transport from client configuration.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| VaultError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            server_url: config.server_url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            app_token: SecretString::from(config.app_token.clone()),
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}/{}", self.server_url, API_PREFIX, endpoint)
    }

    fn authorized(&self, builder: RequestBuilder, session_code: Option<&str>) -> RequestBuilder {
        let builder = builder.basic_auth(&self.username, Some(self.app_token.expose_secret()));
        match session_code {
            Some(code) => builder.header(SESSION_HEADER, code),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> TransportResult<Response> {
        let resp = builder.send().await.map_err(classify)?;
        let status = resp.status();
        if !status.is_success() {
            debug!("Server answered {}", status);
            return Err(TransportError::Status(status.as_u16()));
        }
        Ok(resp)
    }

    async fn json(resp: Response) -> TransportResult<Value> {
        resp.json::<Value>()
            .await
            .map_err(|e| TransportError::Malformed(format!("Invalid JSON body: {}", e)))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request_challenge(&self) -> TransportResult<Challenge> {
        let request = self.authorized(self.client.get(self.url("session/request")), None);
        let body = Self::json(self.send(request).await?).await?;
        parse_challenge(&body)
    }

    async fn open_session(&self, secret: &str) -> TransportResult<OpenedSession> {
        let payload = if secret.is_empty() {
            serde_json::json!({})
        } else {
            serde_json::json!({ "challenge": secret })
        };
        let request = self.authorized(self.client.post(self.url("session/open")), None);
        let resp = self.send(request.json(&payload)).await?;

        let session_code = resp
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        let body = Self::json(resp).await?;
        Ok(OpenedSession {
            session_code,
            keychain: parse_envelope(&body)?,
            lifetime: body
                .get("sessionLifetime")
                .and_then(Value::as_u64)
                .map(Duration::from_secs),
        })
    }

    async fn keep_alive(&self, session_code: &str) -> TransportResult<()> {
        let request = self.authorized(
            self.client.get(self.url("session/keepalive")),
            Some(session_code),
        );
        self.send(request).await?;
        Ok(())
    }

    async fn close_session(&self, session_code: &str) -> TransportResult<()> {
        let request =
            self.authorized(self.client.get(self.url("session/close")), Some(session_code));
        self.send(request).await?;
        Ok(())
    }

    async fn list_entities(
        &self,
        entity_type: EntityType,
        session_code: Option<&str>,
    ) -> TransportResult<Vec<SyncRecord>> {
        let endpoint = format!("{}/list", entity_type.as_str());
        let request = self.authorized(self.client.post(self.url(&endpoint)), session_code);
        let body = Self::json(self.send(request).await?).await?;

        let items = body.as_array().ok_or_else(|| {
            TransportError::Malformed(format!("Expected a {} list", entity_type.as_str()))
        })?;

        items
            .iter()
            .map(|item| SyncRecord::from_json(entity_type, item).map_err(TransportError::Malformed))
            .collect()
    }
}

/// Parse a session request body.
///
/// A body without a `challenge` object (the server sends `[]` or `{}`)
/// means the account has no client-side encryption.
pub fn parse_challenge(body: &Value) -> TransportResult<Challenge> {
    let Some(challenge) = body.get("challenge") else {
        return Ok(Challenge::none());
    };

    let salts = challenge
        .get("salts")
        .and_then(Value::as_array)
        .ok_or_else(|| TransportError::Malformed("Challenge without salts".to_string()))?;

    let salts: Vec<&str> = salts.iter().filter_map(Value::as_str).collect();
    match salts.as_slice() {
        [password, generic_hash_key, password_hash] => Ok(Challenge::new(
            *password,
            *generic_hash_key,
            *password_hash,
        )),
        other => Err(TransportError::Malformed(format!(
            "Expected 3 challenge salts, got {}",
            other.len()
        ))),
    }
}

/// Parse the keychain envelope out of a session open body.
pub fn parse_envelope(body: &Value) -> TransportResult<Option<KeychainEnvelope>> {
    match body.get("keys") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) if items.is_empty() => Ok(None),
        Some(keys) => {
            let envelope: KeychainEnvelope = serde_json::from_value(serde_json::json!({
                "keys": keys,
                "current": body.get("current").cloned().unwrap_or(Value::Null),
            }))
            .map_err(|e| TransportError::Malformed(format!("Invalid keychain: {}", e)))?;
            Ok(Some(envelope).filter(|e| !e.keys.is_empty()))
        }
    }
}

/// Map a reqwest failure onto the transport taxonomy.
fn classify(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        return TransportError::Timeout(err.to_string());
    }

    let mut source: Option<&(dyn StdError + 'static)> = err.source();
    while let Some(cause) = source {
        let text = cause.to_string().to_ascii_lowercase();
        if text.contains("certificate") || text.contains("tls") {
            return TransportError::Tls(cause.to_string());
        }
        source = cause.source();
    }

    TransportError::Connect(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::keychain::CSE_V1R1;

    #[test]
    fn empty_body_means_no_challenge() {
        assert!(!parse_challenge(&serde_json::json!([])).unwrap().requires_password());
        assert!(!parse_challenge(&serde_json::json!({})).unwrap().requires_password());
    }

    #[test]
    fn challenge_salts_are_parsed_in_order() {
        let body = serde_json::json!({
            "challenge": { "type": "PWDv1r1", "salts": ["aa", "bb", "cc"] }
        });
        let challenge = parse_challenge(&body).unwrap();
        let salts = challenge.salts().unwrap();
        assert_eq!(salts.password, "aa");
        assert_eq!(salts.generic_hash_key, "bb");
        assert_eq!(salts.password_hash, "cc");
    }

    #[test]
    fn wrong_salt_count_is_malformed() {
        let body = serde_json::json!({ "challenge": { "salts": ["aa", "bb"] } });
        assert!(matches!(
            parse_challenge(&body),
            Err(TransportError::Malformed(_))
        ));
    }

    #[test]
    fn envelope_parsing() {
        let body = serde_json::json!({ "success": true, "keys": { CSE_V1R1: "abcd", "SSEv2r1": "ef" } });
        let envelope = parse_envelope(&body).unwrap().unwrap();
        assert_eq!(envelope.keys.get(CSE_V1R1).map(String::as_str), Some("abcd"));

        let body = serde_json::json!({ "success": true });
        assert!(parse_envelope(&body).unwrap().is_none());

        let body = serde_json::json!({ "success": true, "keys": [] });
        assert!(parse_envelope(&body).unwrap().is_none());
    }
}
