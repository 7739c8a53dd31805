//! OAuth access tokens for the Google Docs API.
//!
//! Obtaining a token (the consent flow) happens outside this tool; we only
//! pick up an existing one from the environment or a `token.json`.

use std::path::Path;

use serde::Deserialize;

use docscrawl_shared::{DocsCrawlError, GoogleConfig, Result};

/// A bearer token. `Debug` never prints the secret.
#[derive(Clone)]
pub struct AccessToken(String);

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

#[derive(Deserialize)]
struct TokenFile {
    token: Option<String>,
    access_token: Option<String>,
}

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }

    /// Resolve a token using the configured env var, then the token file.
    pub fn from_config(config: &GoogleConfig) -> Result<Self> {
        let from_env = std::env::var(&config.access_token_env).ok();
        Self::resolve(from_env, Path::new(&config.token_file))
    }

    fn resolve(from_env: Option<String>, token_file: &Path) -> Result<Self> {
        if let Some(token) = from_env.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()) {
            return Ok(Self(token));
        }
        if token_file.exists() {
            return Self::from_token_file(token_file);
        }
        Err(DocsCrawlError::GoogleDocs(format!(
            "no access token: set the environment variable or provide {}",
            token_file.display()
        )))
    }

    /// Read a `token.json` holding a `token` or `access_token` field.
    pub fn from_token_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| DocsCrawlError::io(path, e))?;
        let parsed: TokenFile = serde_json::from_str(&raw).map_err(|e| {
            DocsCrawlError::GoogleDocs(format!("invalid token file {}: {e}", path.display()))
        })?;

        parsed
            .token
            .or(parsed.access_token)
            .filter(|t| !t.trim().is_empty())
            .map(Self)
            .ok_or_else(|| {
                DocsCrawlError::GoogleDocs(format!(
                    "token file {} has no token or access_token field",
                    path.display()
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_file(contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("docscrawl-token-{}.json", uuid::Uuid::now_v7()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn env_value_wins() {
        let token = AccessToken::resolve(Some(" ya29.env ".into()), Path::new("/nonexistent/token.json")).unwrap();
        assert_eq!(token.secret(), "ya29.env");
    }

    #[test]
    fn token_file_fields() {
        let path = temp_file(r#"{"token": "ya29.a", "refresh_token": "r"}"#);
        assert_eq!(AccessToken::resolve(None, &path).unwrap().secret(), "ya29.a");
        let _ = std::fs::remove_file(&path);

        let path = temp_file(r#"{"access_token": "ya29.b"}"#);
        assert_eq!(AccessToken::from_token_file(&path).unwrap().secret(), "ya29.b");
        let _ = std::fs::remove_file(&path);

        let path = temp_file(r#"{"refresh_token": "r"}"#);
        assert!(AccessToken::from_token_file(&path).is_err());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn missing_everything_is_an_error() {
        let err = AccessToken::resolve(Some("   ".into()), Path::new("/nonexistent/token.json")).unwrap_err();
        assert!(matches!(err, DocsCrawlError::GoogleDocs(_)));
    }

    #[test]
    fn debug_hides_secret() {
        assert_eq!(format!("{:?}", AccessToken::new("secret")), "AccessToken(***)");
    }
}
