use anyhow::{bail, Result};

const DEFAULT_USER_AGENT: &str = concat!("statblock-feed/", env!("CARGO_PKG_VERSION"));

/// Reddit script-app credentials loaded from the environment (or `.env`).
#[derive(Clone)]
pub struct RedditConfig {
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
    pub totp_secret: Option<String>,
    pub user_agent: String,
}

impl std::fmt::Debug for RedditConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedditConfig")
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("totp", &self.totp_secret.is_some())
            .field("user_agent", &self.user_agent)
            .finish_non_exhaustive()
    }
}

impl RedditConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut missing: Vec<&str> = Vec::new();
        let mut required = |key: &'static str| -> String {
            match lookup(key).filter(|v| !v.trim().is_empty()) {
                Some(v) => v,
                None => {
                    missing.push(key);
                    String::new()
                }
            }
        };

        let client_id = required("REDDIT_CLIENT_ID");
        let client_secret = required("REDDIT_CLIENT_SECRET");
        let username = required("REDDIT_USERNAME");
        let password = required("REDDIT_PASSWORD");

        if !missing.is_empty() {
            bail!("missing required environment variables: {}", missing.join(", "));
        }

        Ok(Self {
            client_id,
            client_secret,
            username,
            password,
            totp_secret: lookup("REDDIT_TOTP_SECRET").filter(|v| !v.trim().is_empty()),
            user_agent: lookup("REDDIT_USER_AGENT").unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn loads_full_config() {
        let cfg = RedditConfig::from_lookup(env_of(&[
            ("REDDIT_CLIENT_ID", "id"),
            ("REDDIT_CLIENT_SECRET", "secret"),
            ("REDDIT_USERNAME", "user"),
            ("REDDIT_PASSWORD", "pw"),
            ("REDDIT_TOTP_SECRET", "JBSWY3DPEHPK3PXP"),
        ]))
        .unwrap();
        assert_eq!(cfg.client_id, "id");
        assert_eq!(cfg.totp_secret.as_deref(), Some("JBSWY3DPEHPK3PXP"));
        assert!(cfg.user_agent.starts_with("statblock-feed/"));
    }

    #[test]
    fn reports_every_missing_variable() {
        let err = RedditConfig::from_lookup(env_of(&[("REDDIT_CLIENT_ID", "id"), ("REDDIT_PASSWORD", "  ")])).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("REDDIT_CLIENT_SECRET"));
        assert!(msg.contains("REDDIT_USERNAME"));
        assert!(msg.contains("REDDIT_PASSWORD"));
        assert!(!msg.contains("REDDIT_CLIENT_ID"));
    }

    #[test]
    fn debug_hides_secrets() {
        let cfg = RedditConfig::from_lookup(env_of(&[
            ("REDDIT_CLIENT_ID", "id"),
            ("REDDIT_CLIENT_SECRET", "topsecret"),
            ("REDDIT_USERNAME", "user"),
            ("REDDIT_PASSWORD", "hunter2"),
        ]))
        .unwrap();
        let dbg = format!("{cfg:?}");
        assert!(!dbg.contains("topsecret"));
        assert!(!dbg.contains("hunter2"));
        assert!(cfg.totp_secret.is_none());
    }
}
