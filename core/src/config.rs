//! Layered settings: built-in defaults, then an optional TOML file, then
//! `QSUGGEST_`-prefixed environment variables (`QSUGGEST_INDEX__MIN_FREQ=20`).

use crate::error::{Error, Result};
use crate::index::DEFAULT_MIN_FREQ;
use crate::log::ClickFilter;
use crate::search::{Eligibility, SearchConfig, DEFAULT_STOP_SUBSTRINGS};
use crate::tokenizer::{TokenizerKind, DEFAULT_STOP_TOKENS};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub log: ClickFilter,
    pub index: IndexSettings,
    pub cluster: ClusterSettings,
    pub search: SearchSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    pub min_freq: u64,
    pub tokenizers: Vec<TokenizerKind>,
    pub stop_tokens: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterSettings {
    /// Bounds for the click pass; each one is a separate sweep.
    pub diameters: Vec<f64>,
    /// Bounds for the token pass run inside every click clustering.
    pub group_diameters: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub stop_substrings: Vec<String>,
    /// Substrings cut out of a query before it is echoed in batch reports.
    pub strip_substrings: Vec<String>,
    pub rankers: Vec<SearchConfig>,
}

fn sweep() -> Vec<f64> {
    (1..=10).map(|i| i as f64 / 10.0).collect()
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            min_freq: DEFAULT_MIN_FREQ,
            tokenizers: vec![TokenizerKind::Word, TokenizerKind::BIGRAM],
            stop_tokens: DEFAULT_STOP_TOKENS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self { diameters: sweep(), group_diameters: sweep() }
    }
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            stop_substrings: DEFAULT_STOP_SUBSTRINGS.iter().map(|s| s.to_string()).collect(),
            strip_substrings: DEFAULT_STOP_SUBSTRINGS[..1].iter().map(|s| s.to_string()).collect(),
            rankers: SearchConfig::defaults(),
        }
    }
}

impl SearchSettings {
    pub fn eligibility(&self) -> Eligibility {
        Eligibility::new(self.stop_substrings.clone())
    }

    pub fn ranker(&self, name: &str) -> Result<&SearchConfig> {
        self.rankers
            .iter()
            .find(|r| r.name == name)
            .ok_or_else(|| Error::UnknownRanker(name.to_string()))
    }
}

impl Settings {
    /// Defaults overridden by `path` (when given) and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(Settings::default()));
        if let Some(path) = path {
            if !path.exists() {
                return Err(Error::Config(format!("settings file '{}' not found", path.display())));
            }
            figment = figment.merge(Toml::file(path));
        }
        let settings: Settings = figment
            .merge(Env::prefixed("QSUGGEST_").split("__"))
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let settings: Settings = Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::string(content))
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject configurations that could only fail later, at query time.
    pub fn validate(&self) -> Result<()> {
        crate::error::check_unit("min click weight", self.log.min_click_weight)?;
        for d in self.cluster.diameters.iter().chain(&self.cluster.group_diameters) {
            if !d.is_finite() || *d < 0.0 {
                return Err(Error::InvalidDiameter(*d));
            }
        }
        for ranker in &self.search.rankers {
            ranker.condition.validate()?;
            if !self.index.tokenizers.contains(&ranker.tokenizer) {
                return Err(Error::MissingIndex(ranker.tokenizer.to_string()));
            }
        }
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        std::fs::write(path, self.to_toml()?).map_err(|e| Error::io(path, e))
    }
}
