use std::{str::FromStr, time::Duration};

use anyhow::{Context, anyhow};

/// Cloudinary-style media host settings.
#[derive(Debug, Clone)]
pub struct MediaConfig {
    pub base_url: String,
    pub cloud_name: String,
    pub upload_preset: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub public_url: String,
    pub client_secret_path: String,
    pub media: Option<MediaConfig>,
    pub code_attempts: u32,
    pub typing_timeout: Duration,
    pub session_idle_minutes: i64,
    pub reconcile_interval: Option<Duration>,
    pub page_limit: i64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Config> {
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Config> {
        let string = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_owned());

        let media = match (lookup("CLOUDINARY_CLOUD_NAME"), lookup("CLOUDINARY_UPLOAD_PRESET")) {
            (Some(cloud_name), Some(upload_preset)) => Some(MediaConfig {
                base_url: string("CLOUDINARY_BASE_URL", "https://api.cloudinary.com"),
                cloud_name,
                upload_preset,
            }),
            (None, None) => None,
            _ => {
                return Err(anyhow!(
                    "CLOUDINARY_CLOUD_NAME and CLOUDINARY_UPLOAD_PRESET must be set together"
                ));
            }
        };

        let code_attempts: u32 = parse_or(&lookup, "CODE_ATTEMPTS", 8)?;
        if code_attempts == 0 {
            return Err(anyhow!("CODE_ATTEMPTS must be at least 1"));
        }
        let page_limit: i64 = parse_or(&lookup, "PAGE_LIMIT", 200)?;
        if page_limit < 1 {
            return Err(anyhow!("PAGE_LIMIT must be at least 1"));
        }
        let reconcile_secs: u64 = parse_or(&lookup, "RECONCILE_INTERVAL_SECS", 300)?;

        Ok(Config {
            database_url: string("DATABASE_URL", "sqlite://pairchat.db"),
            bind_addr: string("BIND_ADDR", "0.0.0.0:8080"),
            public_url: string("PUBLIC_URL", "http://localhost:8080")
                .trim_end_matches('/')
                .to_owned(),
            client_secret_path: string("CLIENT_SECRET_PATH", "client_secret.json"),
            media,
            code_attempts,
            typing_timeout: Duration::from_millis(parse_or(&lookup, "TYPING_TIMEOUT_MS", 1500)?),
            session_idle_minutes: parse_or(&lookup, "SESSION_IDLE_MINUTES", 60)?,
            reconcile_interval: (reconcile_secs > 0).then(|| Duration::from_secs(reconcile_secs)),
            page_limit,
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value: {raw:?}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.code_attempts, 8);
        assert_eq!(config.typing_timeout, Duration::from_millis(1500));
        assert_eq!(config.reconcile_interval, Some(Duration::from_secs(300)));
        assert!(config.media.is_none());
    }

    #[test]
    fn zero_interval_disables_reconcile() {
        let config = Config::from_lookup(lookup(&[("RECONCILE_INTERVAL_SECS", "0")])).unwrap();
        assert!(config.reconcile_interval.is_none());
    }

    #[test]
    fn bad_numbers_are_rejected() {
        assert!(Config::from_lookup(lookup(&[("CODE_ATTEMPTS", "lots")])).is_err());
        assert!(Config::from_lookup(lookup(&[("CODE_ATTEMPTS", "0")])).is_err());
        assert!(Config::from_lookup(lookup(&[("PAGE_LIMIT", "0")])).is_err());
        assert!(Config::from_lookup(lookup(&[("PAGE_LIMIT", "-5")])).is_err());
        assert_eq!(Config::from_lookup(lookup(&[("PAGE_LIMIT", "1")])).unwrap().page_limit, 1);
    }

    #[test]
    fn media_needs_both_keys() {
        assert!(Config::from_lookup(lookup(&[("CLOUDINARY_CLOUD_NAME", "demo")])).is_err());

        let config = Config::from_lookup(lookup(&[
            ("CLOUDINARY_CLOUD_NAME", "demo"),
            ("CLOUDINARY_UPLOAD_PRESET", "unsigned"),
            ("PUBLIC_URL", "https://chat.example/"),
        ]))
        .unwrap();
        let media = config.media.unwrap();
        assert_eq!(media.base_url, "https://api.cloudinary.com");
        assert_eq!(config.public_url, "https://chat.example");
    }
}
