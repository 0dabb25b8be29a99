//! OAuth authorization-code flow with a file-backed token cache
//!
//! Runs without a browser: the authorize URL is printed, the user pastes
//! the URL they were redirected to, and the embedded code is exchanged for
//! a token. Refresh happens transparently once the cached token expires.

use crate::config;
use crate::{Error, Result};
use chrono::Utc;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use tracing::{debug, info};

const AUTHORIZE_URL: &str = "https://accounts.spotify.com/authorize";
const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

/// Published client id of the original tool; override with SPOTIFY_CLIENT_ID
const DEFAULT_CLIENT_ID: &str = "aba916bbd6214fdc8bc993344439c58e";
const REDIRECT_URI: &str = "http://localhost/";

/// Scopes required across backup, history and restore operations
const SCOPES: &[&str] = &[
    "playlist-read-private",
    "playlist-read-collaborative",
    "user-library-read",
    "user-top-read",
    "user-follow-read",
    "user-read-recently-played",
    "playlist-modify-private",
];

/// Cached token state persisted between runs
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedToken {
    access_token: String,
    refresh_token: String,
    /// Unix timestamp (seconds) at which the access token expires
    expires_at: i64,
    scope: String,
}

impl CachedToken {
    fn is_expired(&self) -> bool {
        // 60 second leeway so a token never expires mid-request
        self.expires_at - 60 <= Utc::now().timestamp()
    }
}

/// Token response from the accounts service
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: i64,
    #[serde(default)]
    scope: String,
}

/// Handles authorization and token refresh against the accounts service
pub struct Authenticator {
    http: reqwest::Client,
    client_id: String,
    client_secret: Option<String>,
    cache_path: PathBuf,
}

impl Authenticator {
    pub fn new(http: reqwest::Client) -> Result<Self> {
        let client_id =
            std::env::var("SPOTIFY_CLIENT_ID").unwrap_or_else(|_| DEFAULT_CLIENT_ID.to_string());
        let client_secret = std::env::var("SPOTIFY_CLIENT_SECRET").ok();
        Ok(Self {
            http,
            client_id,
            client_secret,
            cache_path: config::token_cache_path()?,
        })
    }

    /// Return a valid access token, refreshing or authorizing as needed
    pub async fn access_token(&self) -> Result<String> {
        if let Some(cached) = self.load_cache()? {
            if !cached.is_expired() {
                return Ok(cached.access_token);
            }
            debug!("Cached access token expired, refreshing");
            let token = self.refresh(&cached).await?;
            return Ok(token.access_token);
        }

        info!("No cached token found, starting interactive authorization");
        let token = self.authorize_interactive().await?;
        Ok(token.access_token)
    }

    fn load_cache(&self) -> Result<Option<CachedToken>> {
        if !self.cache_path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&self.cache_path)?;
        let token = serde_json::from_str(&raw)
            .map_err(|e| Error::Auth(format!("Corrupt token cache: {e}")))?;
        Ok(Some(token))
    }

    fn save_cache(&self, token: &CachedToken) -> Result<()> {
        if let Some(parent) = self.cache_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.cache_path, serde_json::to_string_pretty(token)?)?;
        debug!("Token cache written to {}", self.cache_path.display());
        Ok(())
    }

    /// Print the authorize URL, read the pasted redirect URL and exchange
    /// the embedded code
    async fn authorize_interactive(&self) -> Result<CachedToken> {
        let scope = SCOPES.join(",");
        let url = Url::parse_with_params(
            AUTHORIZE_URL,
            &[
                ("client_id", self.client_id.as_str()),
                ("response_type", "code"),
                ("redirect_uri", REDIRECT_URI),
                ("scope", scope.as_str()),
            ],
        )
        .map_err(|e| Error::Auth(format!("Invalid authorize URL: {e}")))?;

        println!("Open this URL in a browser and authorize the application:\n\n{url}\n");
        print!("Paste the URL you were redirected to: ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line)?;
        let code = extract_code(line.trim())?;

        let mut params = vec![
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("redirect_uri", REDIRECT_URI),
            ("client_id", self.client_id.as_str()),
        ];
        if let Some(secret) = &self.client_secret {
            params.push(("client_secret", secret.as_str()));
        }
        let token = self.request_token(&params).await?;
        self.store_response(token, None)
    }

    async fn refresh(&self, cached: &CachedToken) -> Result<CachedToken> {
        let mut params = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", cached.refresh_token.as_str()),
            ("client_id", self.client_id.as_str()),
        ];
        if let Some(secret) = &self.client_secret {
            params.push(("client_secret", secret.as_str()));
        }
        let token = self.request_token(&params).await?;
        // The refresh grant often omits the refresh token; keep the old one
        self.store_response(token, Some(cached.refresh_token.clone()))
    }

    async fn request_token(&self, params: &[(&str, &str)]) -> Result<TokenResponse> {
        let response = self.http.post(TOKEN_URL).form(params).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json().await?)
    }

    fn store_response(
        &self,
        token: TokenResponse,
        fallback_refresh: Option<String>,
    ) -> Result<CachedToken> {
        let refresh_token = token
            .refresh_token
            .or(fallback_refresh)
            .ok_or_else(|| Error::Auth("Token response contained no refresh token".to_string()))?;
        let cached = CachedToken {
            access_token: token.access_token,
            refresh_token,
            expires_at: Utc::now().timestamp() + token.expires_in,
            scope: token.scope,
        };
        self.save_cache(&cached)?;
        Ok(cached)
    }
}

/// Pull the `code` query parameter out of a pasted redirect URL
fn extract_code(redirect: &str) -> Result<String> {
    let url = Url::parse(redirect)
        .map_err(|e| Error::Auth(format!("Could not parse redirect URL: {e}")))?;
    url.query_pairs()
        .find(|(key, _)| key == "code")
        .map(|(_, value)| value.into_owned())
        .ok_or_else(|| Error::Auth("Redirect URL contains no code parameter".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_code_from_redirect() {
        let code = extract_code("http://localhost/?code=AQDx12&state=foo").unwrap();
        assert_eq!(code, "AQDx12");
    }

    #[test]
    fn test_extract_code_missing_parameter() {
        assert!(extract_code("http://localhost/?state=foo").is_err());
    }

    #[test]
    fn test_extract_code_rejects_garbage() {
        assert!(extract_code("not a url").is_err());
    }

    #[test]
    fn test_expired_token_detection() {
        let token = CachedToken {
            access_token: "a".into(),
            refresh_token: "r".into(),
            expires_at: Utc::now().timestamp() + 3600,
            scope: String::new(),
        };
        assert!(!token.is_expired());

        let stale = CachedToken {
            expires_at: Utc::now().timestamp() - 10,
            ..token
        };
        assert!(stale.is_expired());
    }
}
