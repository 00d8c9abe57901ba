//! Environment configuration

use crate::db::ParticipantId;
use crate::dispatch::{DispatchSettings, ImageSource, ImageTrigger};
use regex::Regex;
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_IMAGE_TRIGGERS: &str = "(?i)cat=https://thiscatdoesnotexist.com/?{ts}";
const DEFAULT_FALLBACK_IMAGE: &str = "https://thiscatdoesnotexist.com/?{ts}";
const DEFAULT_API_BASE: &str = "https://api.telegram.org";
const DEFAULT_COOLDOWN_SECS: u64 = 600;
const DEFAULT_POLL_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{var}: invalid participant id {value:?}")]
    InvalidId { var: &'static str, value: String },
    #[error("{var}: invalid number {value:?}")]
    InvalidNumber { var: &'static str, value: String },
    #[error("SANTA_IMAGE_TRIGGERS: expected regex=source, got {0:?}")]
    InvalidTrigger(String),
    #[error("SANTA_IMAGE_TRIGGERS: invalid pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Webhook receiver settings
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub port: u16,
    /// Expected `X-Telegram-Bot-Api-Secret-Token` value
    pub secret: Option<String>,
}

/// Bot configuration
#[derive(Clone)]
pub struct BotConfig {
    pub token: String,
    pub db_path: PathBuf,
    pub api_base: String,
    pub poll_timeout: Duration,
    /// Run the webhook server instead of long polling
    pub webhook: Option<WebhookConfig>,
    pub dispatch: DispatchSettings,
}

impl fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotConfig")
            .field("token", &"<redacted>")
            .field("db_path", &self.db_path)
            .field("api_base", &self.api_base)
            .field("poll_timeout", &self.poll_timeout)
            .field("webhook", &self.webhook.as_ref().map(|w| w.port))
            .field("dispatch", &self.dispatch)
            .finish()
    }
}

impl BotConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let token = lookup("SANTA_BOT_TOKEN")
            .filter(|t| !t.trim().is_empty())
            .ok_or(ConfigError::Missing("SANTA_BOT_TOKEN"))?;

        let db_path = lookup("SANTA_DB_PATH").map_or_else(
            || {
                let home = lookup("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(format!("{home}/.santa-bot/santa.db"))
            },
            PathBuf::from,
        );

        let cooldown = parse_secs(
            "SANTA_NOVELTY_COOLDOWN_SECS",
            lookup("SANTA_NOVELTY_COOLDOWN_SECS"),
            DEFAULT_COOLDOWN_SECS,
        )?;
        let poll_timeout = parse_secs(
            "SANTA_POLL_TIMEOUT_SECS",
            lookup("SANTA_POLL_TIMEOUT_SECS"),
            DEFAULT_POLL_TIMEOUT_SECS,
        )?;

        let image_triggers = parse_triggers(
            &lookup("SANTA_IMAGE_TRIGGERS").unwrap_or_else(|| DEFAULT_IMAGE_TRIGGERS.to_string()),
        )?;
        let fallback_image = lookup("SANTA_FALLBACK_IMAGE")
            .unwrap_or_else(|| DEFAULT_FALLBACK_IMAGE.to_string());
        let fallback_image = match fallback_image.trim() {
            "" => None,
            source => Some(ImageSource::parse(source)),
        };

        let webhook = match lookup("SANTA_WEBHOOK_PORT") {
            Some(port) => Some(WebhookConfig {
                port: port.trim().parse().map_err(|_| ConfigError::InvalidNumber {
                    var: "SANTA_WEBHOOK_PORT",
                    value: port.clone(),
                })?,
                secret: lookup("SANTA_WEBHOOK_SECRET").filter(|s| !s.is_empty()),
            }),
            None => None,
        };

        Ok(Self {
            token,
            db_path,
            api_base: lookup("SANTA_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            poll_timeout,
            webhook,
            dispatch: DispatchSettings {
                admins: parse_ids("SANTA_ADMINS", lookup("SANTA_ADMINS"))?,
                privileged: parse_ids("SANTA_PRIVILEGED_USERS", lookup("SANTA_PRIVILEGED_USERS"))?,
                novelty_stickers: parse_list(lookup("SANTA_NOVELTY_STICKERS").as_deref()),
                novelty_cooldown: cooldown,
                image_triggers,
                fallback_image,
                bot_username: None,
            },
        })
    }
}

/// Comma-separated values with blanks dropped
fn parse_list(value: Option<&str>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(String::from)
        .collect()
}

fn parse_ids(var: &'static str, value: Option<String>) -> Result<HashSet<ParticipantId>, ConfigError> {
    parse_list(value.as_deref())
        .into_iter()
        .map(|item| {
            item.parse()
                .map_err(|_| ConfigError::InvalidId { var, value: item })
        })
        .collect()
}

fn parse_secs(var: &'static str, value: Option<String>, default: u64) -> Result<Duration, ConfigError> {
    match value {
        Some(value) => value
            .trim()
            .parse()
            .map(Duration::from_secs)
            .map_err(|_| ConfigError::InvalidNumber { var, value }),
        None => Ok(Duration::from_secs(default)),
    }
}

/// `regex=source` entries separated by `;`
fn parse_triggers(value: &str) -> Result<Vec<ImageTrigger>, ConfigError> {
    value
        .split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (pattern, image) = entry
                .split_once('=')
                .filter(|(p, s)| !p.is_empty() && !s.trim().is_empty())
                .ok_or_else(|| ConfigError::InvalidTrigger(entry.to_string()))?;
            let regex = Regex::new(pattern).map_err(|source| ConfigError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })?;
            Ok(ImageTrigger::new(regex, ImageSource::parse(image.trim())))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<BotConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        BotConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[("SANTA_BOT_TOKEN", "123:abc"), ("HOME", "/home/santa")]).unwrap();
        assert_eq!(config.db_path, PathBuf::from("/home/santa/.santa-bot/santa.db"));
        assert_eq!(config.api_base, DEFAULT_API_BASE);
        assert_eq!(config.poll_timeout, Duration::from_secs(30));
        assert!(config.webhook.is_none());

        let dispatch = &config.dispatch;
        assert!(dispatch.admins.is_empty());
        assert!(dispatch.novelty_stickers.is_empty());
        assert_eq!(dispatch.novelty_cooldown, Duration::from_secs(600));
        assert_eq!(dispatch.image_triggers.len(), 1);
        assert!(dispatch.image_triggers[0].matches("A CAT!"));
        assert_eq!(
            dispatch.fallback_image,
            Some(ImageSource::Url(DEFAULT_FALLBACK_IMAGE.to_string()))
        );
    }

    #[test]
    fn test_token_required() {
        assert!(matches!(config(&[]), Err(ConfigError::Missing("SANTA_BOT_TOKEN"))));
        assert!(matches!(
            config(&[("SANTA_BOT_TOKEN", "  ")]),
            Err(ConfigError::Missing(_))
        ));
    }

    #[test]
    fn test_id_lists() {
        let config = config(&[
            ("SANTA_BOT_TOKEN", "t"),
            ("SANTA_ADMINS", "1, 2,,3 "),
            ("SANTA_PRIVILEGED_USERS", "-5"),
            ("SANTA_NOVELTY_STICKERS", "a,b"),
        ])
        .unwrap();
        assert_eq!(config.dispatch.admins, HashSet::from([1, 2, 3]));
        assert_eq!(config.dispatch.privileged, HashSet::from([-5]));
        assert_eq!(config.dispatch.novelty_stickers, vec!["a", "b"]);

        assert!(matches!(
            self::config(&[("SANTA_BOT_TOKEN", "t"), ("SANTA_ADMINS", "1,bob")]),
            Err(ConfigError::InvalidId { var: "SANTA_ADMINS", .. })
        ));
    }

    #[test]
    fn test_triggers_and_fallback() {
        let config = config(&[
            ("SANTA_BOT_TOKEN", "t"),
            ("SANTA_IMAGE_TRIGGERS", "(?i)violet=images/kirill.jpg; dog=https://dogs.test/?a=1"),
            ("SANTA_FALLBACK_IMAGE", ""),
        ])
        .unwrap();
        let triggers = &config.dispatch.image_triggers;
        assert_eq!(triggers.len(), 2);
        assert!(triggers[0].matches("Violet"));
        assert_eq!(triggers[0].image, ImageSource::File(PathBuf::from("images/kirill.jpg")));
        assert_eq!(triggers[1].image, ImageSource::Url("https://dogs.test/?a=1".to_string()));
        assert!(config.dispatch.fallback_image.is_none());

        assert!(matches!(
            self::config(&[("SANTA_BOT_TOKEN", "t"), ("SANTA_IMAGE_TRIGGERS", "no-source")]),
            Err(ConfigError::InvalidTrigger(_))
        ));
        assert!(matches!(
            self::config(&[("SANTA_BOT_TOKEN", "t"), ("SANTA_IMAGE_TRIGGERS", "(unclosed=x.jpg")]),
            Err(ConfigError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_numbers_and_webhook() {
        let config = config(&[
            ("SANTA_BOT_TOKEN", "t"),
            ("SANTA_NOVELTY_COOLDOWN_SECS", "5"),
            ("SANTA_WEBHOOK_PORT", "8443"),
            ("SANTA_WEBHOOK_SECRET", "s3cret"),
        ])
        .unwrap();
        assert_eq!(config.dispatch.novelty_cooldown, Duration::from_secs(5));
        let webhook = config.webhook.unwrap();
        assert_eq!(webhook.port, 8443);
        assert_eq!(webhook.secret.as_deref(), Some("s3cret"));

        assert!(matches!(
            self::config(&[("SANTA_BOT_TOKEN", "t"), ("SANTA_POLL_TIMEOUT_SECS", "soon")]),
            Err(ConfigError::InvalidNumber { var: "SANTA_POLL_TIMEOUT_SECS", .. })
        ));
    }

    #[test]
    fn test_debug_hides_token() {
        let config = config(&[("SANTA_BOT_TOKEN", "123:very-secret")]).unwrap();
        assert!(!format!("{config:?}").contains("very-secret"));
    }
}
