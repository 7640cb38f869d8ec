use crate::scheduler::{PollConfig, Sequencing, DEFAULT_POLL_INTERVAL, DEFAULT_STALE_AFTER};
use clap::{Parser, ValueEnum};
use nfsmon_core::HiddenSections;
use std::time::Duration;
use thiserror::Error;
use url::Url;

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8080";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid {key} value '{value}': {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("base url cannot carry a path: {0}")]
    OpaqueBaseUrl(String),
}

impl ConfigError {
    fn invalid(key: &'static str, value: &str, reason: impl ToString) -> Self {
        ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum PageSelection {
    #[default]
    All,
    Stats,
    Clients,
}

impl PageSelection {
    pub fn stats(self) -> bool {
        matches!(self, PageSelection::All | PageSelection::Stats)
    }

    pub fn clients(self) -> bool {
        matches!(self, PageSelection::All | PageSelection::Clients)
    }
}

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "nfsmon", about = "Live state monitor for an NFS server")]
pub struct Args {
    /// Server base URL [env: NFSMON_URL]
    #[arg(long)]
    pub url: Option<String>,
    /// Poll period in milliseconds [env: NFSMON_POLL_MS]
    #[arg(long)]
    pub poll_ms: Option<u64>,
    /// Consecutive failures before a feed is marked stale, 0 to disable
    /// [env: NFSMON_STALE_AFTER]
    #[arg(long)]
    pub stale_after: Option<u32>,
    /// ordered | unordered [env: NFSMON_SEQUENCING]
    #[arg(long)]
    pub sequencing: Option<String>,
    /// reshow | sticky [env: NFSMON_HIDDEN_SECTIONS]
    #[arg(long)]
    pub hidden_sections: Option<String>,
    #[arg(long, value_enum, default_value_t = PageSelection::All)]
    pub page: PageSelection,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub base_url: Url,
    pub poll: PollConfig,
    pub pages: PageSelection,
    pub log_stderr: bool,
}

impl Config {
    /// Flags win over environment values, which win over defaults.
    pub fn resolve(args: Args, env: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let lookup = |key: &str| env(key).filter(|value| !value.trim().is_empty());

        let raw_url = args
            .url
            .or_else(|| lookup("NFSMON_URL"))
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = resolve_base_url(&raw_url)?;

        let interval = match args.poll_ms {
            Some(ms) => poll_interval("--poll-ms", &ms.to_string())?,
            None => match lookup("NFSMON_POLL_MS") {
                Some(value) => poll_interval("NFSMON_POLL_MS", &value)?,
                None => DEFAULT_POLL_INTERVAL,
            },
        };

        let stale_after = match args.stale_after {
            Some(count) => count,
            None => match lookup("NFSMON_STALE_AFTER") {
                Some(value) => value
                    .trim()
                    .parse::<u32>()
                    .map_err(|err| ConfigError::invalid("NFSMON_STALE_AFTER", &value, err))?,
                None => DEFAULT_STALE_AFTER,
            },
        };

        let sequencing = parse_choice::<Sequencing>(
            "sequencing",
            args.sequencing.or_else(|| lookup("NFSMON_SEQUENCING")),
        )?;
        let hidden_sections = parse_choice::<HiddenSections>(
            "hidden sections",
            args.hidden_sections.or_else(|| lookup("NFSMON_HIDDEN_SECTIONS")),
        )?;

        let log_stderr = lookup("NFSMON_LOG_STDERR")
            .and_then(|value| parse_bool_flag(&value))
            .unwrap_or(true);

        Ok(Config {
            base_url,
            poll: PollConfig {
                interval,
                sequencing,
                stale_after,
                hidden_sections,
            },
            pages: args.page,
            log_stderr,
        })
    }
}

pub fn load_config(args: Args) -> Result<Config, ConfigError> {
    Config::resolve(args, |key| std::env::var(key).ok())
}

pub fn parse_bool_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn resolve_base_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim()).map_err(|err| ConfigError::invalid("url", raw, err))?;
    if url.cannot_be_a_base() {
        return Err(ConfigError::OpaqueBaseUrl(raw.to_string()));
    }
    Ok(url)
}

fn poll_interval(key: &'static str, value: &str) -> Result<Duration, ConfigError> {
    let ms = value
        .trim()
        .parse::<u64>()
        .map_err(|err| ConfigError::invalid(key, value, err))?;
    if ms == 0 {
        return Err(ConfigError::invalid(key, value, "poll period must be positive"));
    }
    Ok(Duration::from_millis(ms))
}

fn parse_choice<T>(key: &'static str, value: Option<String>) -> Result<T, ConfigError>
where
    T: std::str::FromStr<Err = String> + Default,
{
    match value {
        Some(value) => value
            .parse::<T>()
            .map_err(|reason| ConfigError::invalid(key, &value, reason)),
        None => Ok(T::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_without_flags_or_env() {
        let config = Config::resolve(Args::default(), env_from(&[])).expect("config");
        assert_eq!(config.base_url.as_str(), "http://127.0.0.1:8080/");
        assert_eq!(config.poll, PollConfig::default());
        assert_eq!(config.pages, PageSelection::All);
        assert!(config.log_stderr);
    }

    #[test]
    fn env_overrides_defaults_and_flags_override_env() {
        let env = env_from(&[
            ("NFSMON_URL", "http://nfs-a:9000/admin"),
            ("NFSMON_POLL_MS", "250"),
            ("NFSMON_STALE_AFTER", "0"),
            ("NFSMON_SEQUENCING", "unordered"),
            ("NFSMON_HIDDEN_SECTIONS", "sticky"),
            ("NFSMON_LOG_STDERR", "off"),
        ]);
        let args = Args {
            url: Some("http://nfs-b:9000".to_string()),
            poll_ms: Some(500),
            ..Args::default()
        };
        let config = Config::resolve(args, env).expect("config");

        assert_eq!(config.base_url.host_str(), Some("nfs-b"));
        assert_eq!(config.poll.interval, Duration::from_millis(500));
        assert_eq!(config.poll.stale_after, 0);
        assert_eq!(config.poll.sequencing, Sequencing::Unordered);
        assert_eq!(config.poll.hidden_sections, HiddenSections::Sticky);
        assert!(!config.log_stderr);
    }

    #[test]
    fn blank_env_values_are_ignored() {
        let env = env_from(&[("NFSMON_URL", "  "), ("NFSMON_POLL_MS", "")]);
        let config = Config::resolve(Args::default(), env).expect("config");
        assert_eq!(config.base_url.host_str(), Some("127.0.0.1"));
        assert_eq!(config.poll.interval, DEFAULT_POLL_INTERVAL);
    }

    #[test]
    fn invalid_values_are_reported_with_their_source() {
        let err = Config::resolve(Args::default(), env_from(&[("NFSMON_POLL_MS", "fast")]))
            .expect_err("bad poll");
        assert!(matches!(err, ConfigError::Invalid { key: "NFSMON_POLL_MS", .. }));

        let args = Args {
            poll_ms: Some(0),
            ..Args::default()
        };
        assert!(Config::resolve(args, env_from(&[])).is_err());

        let args = Args {
            sequencing: Some("fifo".to_string()),
            ..Args::default()
        };
        let err = Config::resolve(args, env_from(&[])).expect_err("bad sequencing");
        assert!(err.to_string().contains("fifo"));

        let args = Args {
            url: Some("mailto:ops@example.com".to_string()),
            ..Args::default()
        };
        assert!(matches!(
            Config::resolve(args, env_from(&[])),
            Err(ConfigError::OpaqueBaseUrl(_))
        ));
    }

    #[test]
    fn parse_bool_flag_accepts_common_spellings() {
        assert_eq!(parse_bool_flag("1"), Some(true));
        assert_eq!(parse_bool_flag("On"), Some(true));
        assert_eq!(parse_bool_flag("0"), Some(false));
        assert_eq!(parse_bool_flag("no"), Some(false));
        assert_eq!(parse_bool_flag("maybe"), None);
    }

    #[test]
    fn page_flag_parses() {
        let args = Args::try_parse_from(["nfsmon", "--page", "stats", "--poll-ms", "200"])
            .expect("parse args");
        assert_eq!(args.page, PageSelection::Stats);
        assert!(args.page.stats());
        assert!(!args.page.clients());
        assert_eq!(args.poll_ms, Some(200));
    }
}
