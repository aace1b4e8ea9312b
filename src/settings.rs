use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "https://www.fiverr.com/search/gigs?query=your_keyword_here";
pub const DEFAULT_SETTINGS_FILE: &str = "gigs.toml";

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/14.0.3 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/90.0.4430.93 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; WOW64; Trident/7.0; rv:11.0) like Gecko",
];

// Placeholder pool; point GIGS_PROXIES at a real rotating service.
const PROXIES: &[&str] = &[
    "192.158.29.25:8080",
    "185.37.211.222:5030",
    "89.36.166.54:3128",
    "51.79.50.31:9300",
];

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to load settings: {0}")]
    Load(#[from] config::ConfigError),
    #[error("{field} must be at least 1")]
    Zero { field: &'static str },
    #[error("user agent pool is empty")]
    NoUserAgents,
    #[error("invalid base url {url:?}: {source}")]
    BaseUrl {
        url: String,
        source: url::ParseError,
    },
}

/// Runtime settings: defaults, then settings file, then `GIGS_*` env, then CLI flags.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub base_url: String,
    pub db_path: PathBuf,
    pub pages: u32,
    pub clusters: usize,
    pub seed: u64,
    pub n_init: usize,

    pub rotate_profile_per_page: bool,
    pub persist_raw_pages: bool,
    pub raw_pages_dir: PathBuf,
    pub persist_empty_records: bool,
    pub retry_limit: u32,
    pub retry_backoff_ms: u64,
    pub load_timeout_secs: u64,

    pub user_agents: Vec<String>,
    pub proxies: Vec<String>,
    pub block_indicators: Vec<String>,

    pub card_selector: String,
    pub title_selector: String,
    pub description_selector: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            db_path: PathBuf::from("fiverr_gigs.db"),
            pages: 5,
            clusters: 5,
            seed: 42,
            n_init: 10,
            rotate_profile_per_page: true,
            persist_raw_pages: false,
            raw_pages_dir: PathBuf::from("."),
            persist_empty_records: false,
            retry_limit: 3,
            retry_backoff_ms: 2000,
            load_timeout_secs: 5,
            user_agents: USER_AGENTS.iter().map(|s| s.to_string()).collect(),
            proxies: PROXIES.iter().map(|s| s.to_string()).collect(),
            block_indicators: vec!["captcha".into(), "needs a human touch".into()],
            card_selector: ".gig-wrapper".into(),
            title_selector: r#"a[aria-label="Go to gig"] p"#.into(),
            description_selector: ".gig-description".into(),
        }
    }
}

impl Settings {
    /// Load settings from an optional file plus `GIGS_*` environment variables.
    /// Not validated here: CLI flags are applied on top, then [`Settings::validate`].
    pub fn load(file: Option<&Path>) -> Result<Self, SettingsError> {
        let mut builder = Config::builder();
        builder = match file {
            Some(p) => builder.add_source(File::from(p).required(true)),
            None => builder.add_source(File::with_name(DEFAULT_SETTINGS_FILE).required(false)),
        };
        let settings: Settings = builder
            .add_source(
                Environment::with_prefix("GIGS")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("user_agents")
                    .with_list_parse_key("proxies")
                    .with_list_parse_key("block_indicators"),
            )
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.pages == 0 {
            return Err(SettingsError::Zero { field: "pages" });
        }
        if self.clusters == 0 {
            return Err(SettingsError::Zero { field: "clusters" });
        }
        if self.n_init == 0 {
            return Err(SettingsError::Zero { field: "n_init" });
        }
        if self.user_agents.is_empty() {
            return Err(SettingsError::NoUserAgents);
        }
        url::Url::parse(&self.base_url).map_err(|source| SettingsError::BaseUrl {
            url: self.base_url.clone(),
            source,
        })?;
        Ok(())
    }
}
