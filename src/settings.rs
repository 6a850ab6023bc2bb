use anyhow::{Context, Result};
use config::{Config, Environment};
use serde::Deserialize;

use crate::parser::act::DEFAULT_SECTION_DELIMITER;
use crate::parser::continuation::ENTIRE_ACT_PHRASE;

const DEFAULT_DB_PATH: &str = "data/ilcs.sqlite";
const DEFAULT_BASE_URL: &str = "https://www.ilga.gov/legislation/ilcs/";
const DEFAULT_USER_AGENT: &str = concat!("ilcs_scraper/", env!("CARGO_PKG_VERSION"));

/// Runtime settings. Every field can be overridden from the environment with
/// an `ILCS_` prefix, e.g. `ILCS_CONCURRENCY=4`.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub db_path: String,
    pub base_url: String,
    pub concurrency: usize,
    pub max_retries: u32,
    pub base_backoff_ms: u64,
    pub timeout_secs: u64,
    pub user_agent: String,
    pub section_delimiter: String,
    pub entire_act_phrase: String,
}

impl Settings {
    pub fn load() -> Result<Self> {
        Self::from_builder(Config::builder().add_source(
            Environment::with_prefix("ILCS").try_parsing(true),
        ))
    }

    fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self> {
        builder
            .set_default("db_path", DEFAULT_DB_PATH)?
            .set_default("base_url", DEFAULT_BASE_URL)?
            .set_default("concurrency", 8_i64)?
            .set_default("max_retries", 3_i64)?
            .set_default("base_backoff_ms", 2000_i64)?
            .set_default("timeout_secs", 30_i64)?
            .set_default("user_agent", DEFAULT_USER_AGENT)?
            .set_default("section_delimiter", DEFAULT_SECTION_DELIMITER)?
            .set_default("entire_act_phrase", ENTIRE_ACT_PHRASE)?
            .build()?
            .try_deserialize()
            .context("Invalid ILCS_* settings")
    }

    /// Page listing every chapter, grouped by topic.
    pub fn chapter_index_url(&self) -> String {
        format!("{}/ilcs.asp", self.base_url.trim_end_matches('/'))
    }
}
