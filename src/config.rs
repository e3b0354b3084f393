use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose, Engine as _};
use std::time::Duration;

/// Runtime configuration, read once at startup from the process environment
/// (after `.env` has been loaded by `dotenvy`).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub session_key: Vec<u8>,
    pub enc_key: Vec<u8>,
    pub openai_api_key: String,
    /// Override for OpenAI-compatible providers.
    pub openai_api_base: Option<String>,
    pub ai_model: String,
    pub ai_timeout: Duration,
    pub ai_retries: u32,
    pub question_cache_ttl: Duration,
    pub adaptive_threshold: usize,
    pub share_ttl_days: i64,
    pub telemetry_endpoint: Option<String>,
    pub telemetry_capacity: usize,
    pub telemetry_timeout: Duration,
    pub bind_addr: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| anyhow!("{key} missing"))
        };

        let enc_key_b64 = required("APP_ENC_KEY")?;
        let enc_key = general_purpose::STANDARD
            .decode(enc_key_b64.trim())
            .context("APP_ENC_KEY must be base64")?;

        // Sessions fall back to the encryption key, same as the old deployment.
        let session_key = match lookup("SESSION_KEY").filter(|v| !v.trim().is_empty()) {
            Some(raw) => general_purpose::STANDARD
                .decode(raw.trim())
                .context("SESSION_KEY must be base64")?,
            None => enc_key.clone(),
        };

        let bind_addr = lookup("BIND_ADDR").unwrap_or_else(|| {
            let port = lookup("PORT").unwrap_or_else(|| "3000".to_string());
            format!("0.0.0.0:{port}")
        });

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            session_key,
            enc_key,
            openai_api_key: required("OPENAI_API_KEY")?,
            openai_api_base: lookup("OPENAI_API_BASE").filter(|v| !v.trim().is_empty()),
            ai_model: lookup("AI_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string()),
            ai_timeout: Duration::from_secs(parse_or(&lookup, "AI_TIMEOUT_SECS", 8)?),
            ai_retries: parse_or(&lookup, "AI_RETRIES", 1)?,
            question_cache_ttl: Duration::from_secs(parse_or(
                &lookup,
                "QUESTION_CACHE_TTL_SECS",
                3600,
            )?),
            adaptive_threshold: parse_or(&lookup, "ADAPTIVE_THRESHOLD", 6)?,
            share_ttl_days: parse_or(&lookup, "SHARE_TTL_DAYS", 30)?,
            telemetry_endpoint: lookup("TELEMETRY_ENDPOINT").filter(|v| !v.trim().is_empty()),
            telemetry_capacity: parse_or(&lookup, "TELEMETRY_CAPACITY", 500)?,
            telemetry_timeout: Duration::from_secs(parse_or(&lookup, "TELEMETRY_TIMEOUT_SECS", 3)?),
            bind_addr,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| anyhow!("{key} has an invalid value: {raw}")),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_env() -> HashMap<&'static str, String> {
        let key = general_purpose::STANDARD.encode([3u8; 32]);
        HashMap::from([
            ("DATABASE_URL", "postgres://localhost/aura".to_string()),
            ("APP_ENC_KEY", key),
            ("OPENAI_API_KEY", "sk-test".to_string()),
        ])
    }

    #[test]
    fn test_defaults() {
        let env = base_env();
        let cfg = AppConfig::from_lookup(|k| env.get(k).cloned()).unwrap();

        assert_eq!(cfg.adaptive_threshold, 6);
        assert_eq!(cfg.share_ttl_days, 30);
        assert_eq!(cfg.question_cache_ttl, Duration::from_secs(3600));
        assert_eq!(cfg.session_key, cfg.enc_key);
        assert_eq!(cfg.bind_addr, "0.0.0.0:3000");
        assert!(cfg.telemetry_endpoint.is_none());
    }

    #[test]
    fn test_overrides_and_port() {
        let mut env = base_env();
        env.insert("PORT", "8080".to_string());
        env.insert("ADAPTIVE_THRESHOLD", "4".to_string());
        env.insert("AI_TIMEOUT_SECS", "2".to_string());
        let cfg = AppConfig::from_lookup(|k| env.get(k).cloned()).unwrap();

        assert_eq!(cfg.bind_addr, "0.0.0.0:8080");
        assert_eq!(cfg.adaptive_threshold, 4);
        assert_eq!(cfg.ai_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_missing_and_invalid() {
        let mut env = base_env();
        env.remove("DATABASE_URL");
        assert!(AppConfig::from_lookup(|k| env.get(k).cloned()).is_err());

        let mut env = base_env();
        env.insert("SHARE_TTL_DAYS", "a month".to_string());
        assert!(AppConfig::from_lookup(|k| env.get(k).cloned()).is_err());
    }
}
