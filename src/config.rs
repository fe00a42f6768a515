// src/config.rs

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use url::Url;

use crate::{
    dates::{parse_date, DateRange},
    extract::TableExtractor,
};

pub const DEFAULT_TARGET_URL: &str = "https://bond.sse.com.cn/data/statistics/overview/bondow/";
pub const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:9515";
pub const DEFAULT_OUTPUT: &str = "[200101-240801]spot_bond_market_data.csv";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BrowserKind {
    Edge,
    Chrome,
    Firefox,
}

/// Where things live on the target page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageLayout {
    /// `id` of the date text field.
    pub date_input_id: String,
    /// Class of the query button.
    pub search_button_class: String,
    /// Class tagging the bond-details table.
    pub table_class: String,
    /// Class tagging data rows (as opposed to header/footer rows).
    pub data_row_class: String,
}

impl Default for PageLayout {
    fn default() -> Self {
        Self {
            date_input_id: "tDate".to_string(),
            search_button_class: "search-btn".to_string(),
            table_class: "bond_details_table".to_string(),
            data_row_class: "data".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    pub target_url: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub output_path: PathBuf,
    pub render_timeout_secs: f64,
    pub grace_delay_secs: f64,
    pub headless: bool,
    pub browser: BrowserKind,
    pub webdriver_url: String,
    /// Consecutive render timeouts tolerated before the run is abandoned.
    /// `1` aborts on the first timeout.
    pub max_consecutive_timeouts: u32,
    pub poll_interval_ms: u64,
    pub log_dir: PathBuf,
    pub layout: PageLayout,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            target_url: DEFAULT_TARGET_URL.to_string(),
            start_date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap_or_default(),
            end_date: NaiveDate::from_ymd_opt(2024, 8, 1).unwrap_or_default(),
            output_path: PathBuf::from(DEFAULT_OUTPUT),
            render_timeout_secs: 80.0,
            grace_delay_secs: 1.0,
            headless: true,
            browser: BrowserKind::Edge,
            webdriver_url: DEFAULT_WEBDRIVER_URL.to_string(),
            max_consecutive_timeouts: 3,
            poll_interval_ms: 250,
            log_dir: PathBuf::from("log"),
            layout: PageLayout::default(),
        }
    }
}

impl HarvestConfig {
    /// Load a YAML config; fields absent from the file keep their defaults.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn date_range(&self) -> DateRange {
        DateRange::new(self.start_date, self.end_date)
    }

    pub fn render_timeout(&self) -> Duration {
        secs_to_duration(self.render_timeout_secs)
    }

    pub fn grace_delay(&self) -> Duration {
        secs_to_duration(self.grace_delay_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Reject configurations that would misbehave once a browser is open.
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.target_url)
            .with_context(|| format!("target_url {:?} is not a URL", self.target_url))?;
        Url::parse(&self.webdriver_url)
            .with_context(|| format!("webdriver_url {:?} is not a URL", self.webdriver_url))?;
        if self.start_date > self.end_date {
            bail!(
                "start_date {} is after end_date {}",
                self.start_date,
                self.end_date
            );
        }
        for (name, secs) in [
            ("render_timeout_secs", self.render_timeout_secs),
            ("grace_delay_secs", self.grace_delay_secs),
        ] {
            if Duration::try_from_secs_f64(secs).is_err() {
                bail!("{} must be a non-negative number of seconds, got {}", name, secs);
            }
        }
        for (name, class) in [
            ("search_button_class", &self.layout.search_button_class),
            ("table_class", &self.layout.table_class),
            ("data_row_class", &self.layout.data_row_class),
        ] {
            if !is_plain_class(class) {
                bail!(
                    "{} must be a single class name of [A-Za-z0-9_-], got {:?}",
                    name,
                    class
                );
            }
        }
        if self.max_consecutive_timeouts == 0 {
            bail!("max_consecutive_timeouts must be at least 1");
        }
        if self.poll_interval_ms == 0 {
            bail!("poll_interval_ms must be at least 1");
        }
        TableExtractor::new(&self.layout).map_err(anyhow::Error::msg)?;
        Ok(())
    }
}

/// Seconds to a `Duration`, saturating: negative or NaN is zero, too large
/// is `Duration::MAX`. `validate` rejects both before a run starts.
fn secs_to_duration(secs: f64) -> Duration {
    if secs.is_nan() || secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

/// Class names are spliced into CSS selectors and an XPath, so only
/// characters that need no escaping in either are accepted.
fn is_plain_class(class: &str) -> bool {
    !class.is_empty()
        && class
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[derive(Parser, Debug, Default)]
#[command(
    author,
    version,
    about = "Harvest daily bond market statistics into a single CSV"
)]
pub struct CliArgs {
    /// YAML config file; CLI flags override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub url: Option<String>,
    /// First date (YYYY-MM-DD), inclusive
    #[arg(long, value_parser = parse_date)]
    pub start: Option<NaiveDate>,
    /// Last date (YYYY-MM-DD), inclusive
    #[arg(long, value_parser = parse_date)]
    pub end: Option<NaiveDate>,
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    #[arg(long)]
    pub timeout: Option<f64>,
    #[arg(long)]
    pub grace: Option<f64>,
    /// Show the browser window
    #[arg(long)]
    pub headed: bool,
    #[arg(long, value_enum)]
    pub browser: Option<BrowserKind>,
    #[arg(long, env = "WEBDRIVER_URL")]
    pub webdriver: Option<String>,
    #[arg(long)]
    pub max_timeouts: Option<u32>,
    #[arg(long)]
    pub log_dir: Option<PathBuf>,
}

impl CliArgs {
    /// Defaults, then the config file, then flags.
    pub fn resolve(self) -> Result<HarvestConfig> {
        let mut cfg = match &self.config {
            Some(path) => HarvestConfig::from_yaml_file(path)?,
            None => HarvestConfig::default(),
        };
        if let Some(v) = self.url {
            cfg.target_url = v;
        }
        if let Some(v) = self.start {
            cfg.start_date = v;
        }
        if let Some(v) = self.end {
            cfg.end_date = v;
        }
        if let Some(v) = self.output {
            cfg.output_path = v;
        }
        if let Some(v) = self.timeout {
            cfg.render_timeout_secs = v;
        }
        if let Some(v) = self.grace {
            cfg.grace_delay_secs = v;
        }
        if self.headed {
            cfg.headless = false;
        }
        if let Some(v) = self.browser {
            cfg.browser = v;
        }
        if let Some(v) = self.webdriver {
            cfg.webdriver_url = v;
        }
        if let Some(v) = self.max_timeouts {
            cfg.max_consecutive_timeouts = v;
        }
        if let Some(v) = self.log_dir {
            cfg.log_dir = v;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}
