use anyhow::{bail, Context, Result};
use reqwest::Url;
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use teloxide::types::{ChatId, Recipient, UserId};

/// A configuration value that must never reach the logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

/// The public channel, addressed either by `@username` or by numeric id.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelRef(Recipient);

impl ChannelRef {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            bail!("channel identity is empty");
        }
        if let Ok(id) = raw.parse::<i64>() {
            return Ok(Self(Recipient::Id(ChatId(id))));
        }
        let username = if raw.starts_with('@') {
            raw.to_string()
        } else {
            format!("@{raw}")
        };
        Ok(Self(Recipient::ChannelUsername(username)))
    }

    pub fn recipient(&self) -> &Recipient {
        &self.0
    }
}

impl fmt::Display for ChannelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Recipient::Id(id) => write!(f, "{}", id.0),
            Recipient::ChannelUsername(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub telegram: TelegramConfig,
    pub publish: PublishConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: Secret,
    pub admin_id: UserId,
    pub channel: ChannelRef,
}

#[derive(Debug, Clone)]
pub struct PublishConfig {
    pub button_url: Url,
    pub button_text: String,
    pub trigger: String,
    pub flush_delay: Duration,
    pub confirmation_ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub public_url: Url,
    pub port: u16,
    /// Shared secret for the admin endpoints. `None` disables them.
    pub admin_secret: Option<Secret>,
}

// ── Raw (partial) configuration, as read from TOML and the environment ──

#[derive(Debug, Deserialize, Default)]
struct RawConfig {
    #[serde(default)]
    telegram: RawTelegram,
    #[serde(default)]
    publish: RawPublish,
    #[serde(default)]
    server: RawServer,
}

#[derive(Debug, Deserialize, Default)]
struct RawTelegram {
    bot_token: Option<String>,
    admin_id: Option<u64>,
    channel: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RawPublish {
    button_url: Option<String>,
    button_text: Option<String>,
    trigger: Option<String>,
    flush_delay_ms: Option<u64>,
    confirmation_ttl_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct RawServer {
    public_url: Option<String>,
    port: Option<u16>,
    admin_secret: Option<String>,
}

fn default_port() -> u16 {
    10000
}

fn default_trigger() -> String {
    "#агрорф".to_string()
}

fn default_button_text() -> String {
    "Каталог продукции".to_string()
}

fn default_flush_delay_ms() -> u64 {
    1000
}

fn default_confirmation_ttl_ms() -> u64 {
    3000
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    match value.trim().parse() {
        Ok(n) => Ok(n),
        Err(_) => bail!("{name} must be a number"),
    }
}

impl RawConfig {
    fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    /// Overlay environment values on top of whatever the file provided.
    fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("BOT_TOKEN") {
            self.telegram.bot_token = Some(v);
        }
        if let Some(v) = lookup("ADMIN_ID") {
            self.telegram.admin_id = Some(parse_number("ADMIN_ID", &v)?);
        }
        if let Some(v) = lookup("CHANNEL_USERNAME") {
            self.telegram.channel = Some(v);
        }
        if let Some(v) = lookup("WEBAPP_URL") {
            self.publish.button_url = Some(v);
        }
        if let Some(v) = lookup("BUTTON_TEXT") {
            self.publish.button_text = Some(v);
        }
        if let Some(v) = lookup("TRIGGER_HASHTAG") {
            self.publish.trigger = Some(v);
        }
        if let Some(v) = lookup("FLUSH_DELAY_MS") {
            self.publish.flush_delay_ms = Some(parse_number("FLUSH_DELAY_MS", &v)?);
        }
        if let Some(v) = lookup("CONFIRMATION_TTL_MS") {
            self.publish.confirmation_ttl_ms = Some(parse_number("CONFIRMATION_TTL_MS", &v)?);
        }
        if let Some(v) = lookup("RENDER_URL") {
            self.server.public_url = Some(v);
        }
        if let Some(v) = lookup("PORT") {
            self.server.port = Some(parse_number("PORT", &v)?);
        }
        if let Some(v) = lookup("ADMIN_SECRET") {
            self.server.admin_secret = Some(v);
        }
        Ok(())
    }

    fn validate(self) -> Result<Config> {
        let RawConfig {
            telegram,
            publish,
            server,
        } = self;

        let mut missing = Vec::new();
        let bot_token = telegram.bot_token.filter(|s| !s.trim().is_empty());
        if bot_token.is_none() {
            missing.push("BOT_TOKEN");
        }
        let admin_id = telegram.admin_id.filter(|id| *id != 0);
        if admin_id.is_none() {
            missing.push("ADMIN_ID");
        }
        let channel = telegram.channel.filter(|s| !s.trim().is_empty());
        if channel.is_none() {
            missing.push("CHANNEL_USERNAME");
        }
        let button_url = publish.button_url.filter(|s| !s.trim().is_empty());
        if button_url.is_none() {
            missing.push("WEBAPP_URL");
        }
        let public_url = server.public_url.filter(|s| !s.trim().is_empty());
        if public_url.is_none() {
            missing.push("RENDER_URL");
        }

        let (Some(bot_token), Some(admin_id), Some(channel), Some(button_url), Some(public_url)) =
            (bot_token, admin_id, channel, button_url, public_url)
        else {
            bail!("missing required settings: {}", missing.join(", "));
        };

        let channel = ChannelRef::parse(&channel).context("CHANNEL_USERNAME is invalid")?;
        let button_url = Url::parse(button_url.trim()).context("WEBAPP_URL is not a valid URL")?;
        let public_url = Url::parse(public_url.trim()).context("RENDER_URL is not a valid URL")?;

        let trigger = publish
            .trigger
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(default_trigger);

        Ok(Config {
            telegram: TelegramConfig {
                bot_token: Secret::new(bot_token.trim()),
                admin_id: UserId(admin_id),
                channel,
            },
            publish: PublishConfig {
                button_url,
                button_text: publish.button_text.unwrap_or_else(default_button_text),
                trigger: trigger.trim().to_string(),
                flush_delay: Duration::from_millis(
                    publish.flush_delay_ms.unwrap_or_else(default_flush_delay_ms),
                ),
                confirmation_ttl: Duration::from_millis(
                    publish
                        .confirmation_ttl_ms
                        .unwrap_or_else(default_confirmation_ttl_ms),
                ),
            },
            server: ServerConfig {
                public_url,
                port: server.port.unwrap_or_else(default_port),
                admin_secret: server
                    .admin_secret
                    .filter(|s| !s.is_empty())
                    .map(Secret::new),
            },
        })
    }
}

impl Config {
    /// Load configuration from an optional TOML file, then the environment.
    /// Environment variables win over file values.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut raw = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file: {}", path.display()))?;
                RawConfig::from_toml_str(&content)?
            }
            None => RawConfig::default(),
        };
        raw.apply_env(|key| std::env::var(key).ok().filter(|v| !v.is_empty()))?;
        raw.validate()
    }

    /// Path the platform posts updates to. Contains the bot token.
    pub fn webhook_path(&self) -> String {
        format!("/{}", self.telegram.bot_token.expose())
    }

    pub fn webhook_url(&self) -> Result<Url> {
        let base = self.server.public_url.as_str().trim_end_matches('/');
        Url::parse(&format!("{base}{}", self.webhook_path()))
            .context("Failed to build webhook URL")
    }

    /// Values the log writer must mask. Short values are skipped so that
    /// ordinary words are not blanked out.
    pub fn redacted_values(&self) -> Vec<String> {
        let mut values = Vec::new();
        let token = self.telegram.bot_token.expose();
        if token.len() > 10 {
            values.push(token.to_string());
        }
        if let Some(secret) = &self.server.admin_secret {
            if secret.expose().len() > 5 {
                values.push(secret.expose().to_string());
            }
        }
        values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn required() -> HashMap<String, String> {
        env(&[
            ("BOT_TOKEN", "123456:ABCDEFtokenvalue"),
            ("ADMIN_ID", "4242"),
            ("CHANNEL_USERNAME", "@agro_news"),
            ("WEBAPP_URL", "https://shop.example.com/catalog"),
            ("RENDER_URL", "https://relay.example.com/"),
        ])
    }

    fn load_from(vars: HashMap<String, String>, toml: &str) -> Result<Config> {
        let mut raw = RawConfig::from_toml_str(toml)?;
        raw.apply_env(|key| vars.get(key).cloned())?;
        raw.validate()
    }

    #[test]
    fn test_defaults_applied() {
        let config = load_from(required(), "").unwrap();
        assert_eq!(config.telegram.admin_id, UserId(4242));
        assert_eq!(config.server.port, 10000);
        assert_eq!(config.publish.trigger, "#агрорф");
        assert_eq!(config.publish.button_text, "Каталог продукции");
        assert_eq!(config.publish.flush_delay, Duration::from_secs(1));
        assert_eq!(config.publish.confirmation_ttl, Duration::from_secs(3));
        assert!(config.server.admin_secret.is_none());
    }

    #[test]
    fn test_missing_values_are_named_not_echoed() {
        let mut vars = required();
        vars.remove("ADMIN_ID");
        vars.remove("WEBAPP_URL");
        let err = load_from(vars, "").unwrap_err().to_string();
        assert!(err.contains("ADMIN_ID"));
        assert!(err.contains("WEBAPP_URL"));
        assert!(!err.contains("ABCDEFtokenvalue"));
    }

    #[test]
    fn test_zero_admin_id_is_missing() {
        let mut vars = required();
        vars.insert("ADMIN_ID".into(), "0".into());
        let err = load_from(vars, "").unwrap_err().to_string();
        assert!(err.contains("ADMIN_ID"));
    }

    #[test]
    fn test_non_numeric_port_rejected() {
        let mut vars = required();
        vars.insert("PORT".into(), "eighty".into());
        let err = load_from(vars, "").unwrap_err().to_string();
        assert_eq!(err, "PORT must be a number");
    }

    #[test]
    fn test_env_overrides_file() {
        let toml = r##"
[telegram]
bot_token = "999:filetokenvalue"
admin_id = 7
channel = "filechannel"

[publish]
button_url = "https://file.example.com"
trigger = "#file"
flush_delay_ms = 250

[server]
public_url = "https://file-host.example.com"
port = 8080
admin_secret = "from-file-secret"
"##;
        let vars = env(&[("ADMIN_ID", "8"), ("TRIGGER_HASHTAG", "#env")]);
        let config = load_from(vars, toml).unwrap();
        assert_eq!(config.telegram.admin_id, UserId(8));
        assert_eq!(config.publish.trigger, "#env");
        assert_eq!(config.publish.flush_delay, Duration::from_millis(250));
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.telegram.channel.to_string(), "@filechannel");
        assert_eq!(
            config.server.admin_secret.as_ref().map(Secret::expose),
            Some("from-file-secret")
        );
    }

    #[test]
    fn test_channel_parsing() {
        assert_eq!(
            ChannelRef::parse("-1001234").unwrap().recipient(),
            &Recipient::Id(ChatId(-1001234))
        );
        assert_eq!(
            ChannelRef::parse("news").unwrap().recipient(),
            &Recipient::ChannelUsername("@news".into())
        );
        assert!(ChannelRef::parse("  ").is_err());
    }

    #[test]
    fn test_webhook_url_joins_without_double_slash() {
        let config = load_from(required(), "").unwrap();
        assert_eq!(
            config.webhook_url().unwrap().as_str(),
            "https://relay.example.com/123456:ABCDEFtokenvalue"
        );
    }

    #[test]
    fn test_secrets_hidden_from_debug() {
        let mut vars = required();
        vars.insert("ADMIN_SECRET".into(), "supersecret".into());
        let config = load_from(vars, "").unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("ABCDEFtokenvalue"));
        assert!(!debug.contains("supersecret"));
        assert_eq!(config.redacted_values().len(), 2);
    }
}
