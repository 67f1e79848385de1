use crate::types::{Granularity, RentMeasure};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub assets: AssetsConfig,
    pub datasets: Vec<DatasetConfig>,
    #[serde(default)]
    pub scrape: ScrapeConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Flat files shared between the scrapers, the cleaner and the server.
#[derive(Debug, Deserialize, Clone)]
pub struct AssetsConfig {
    pub kommuner_list: PathBuf,
    pub counties_list: PathBuf,
    pub kommuner_map: PathBuf,
    pub counties_map: PathBuf,
    pub county_kommun_mapping: PathBuf,
    pub kommun_info_texts: PathBuf,
    pub kommun_urls: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatasetConfig {
    pub name: String,
    pub measure: RentMeasure,
    pub granularity: Granularity,
    pub workbook: PathBuf,
    pub sheet: Option<String>, // first sheet when absent
    pub cleaned_csv: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ScrapeConfig {
    pub kommuner_wiki_url: String,
    pub counties_wiki_url: String,
    pub municipalities_list_url: String,
    pub polygons_url: String,
    pub info_base_url: String,
    pub min_delay_secs: u64,
    pub max_delay_secs: u64,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            kommuner_wiki_url: "https://wiki.openstreetmap.org/wiki/Sweden/Kommuner".to_string(),
            counties_wiki_url: "https://wiki.openstreetmap.org/wiki/Sweden/L%C3%A4n".to_string(),
            municipalities_list_url: "https://en.wikipedia.org/wiki/List_of_municipalities_of_Sweden"
                .to_string(),
            polygons_url: "http://polygons.openstreetmap.fr/get_geojson.py".to_string(),
            info_base_url: "https://www.informationsverige.se/en/jag-har-fatt-uppehallstillstand/boende/lan-och-kommuner-i-sverige/".to_string(),
            min_delay_secs: 1,
            max_delay_secs: 3,
            timeout_secs: 30,
            user_agent: concat!("rent-map/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub static_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8050,
            static_dir: None,
        }
    }
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "Failed to parse TOML configuration")?;
        Ok(config)
    }

    /// Relation lookup table (name, relation) for a granularity.
    pub fn relation_list(&self, granularity: Granularity) -> &Path {
        match granularity {
            Granularity::Kommun => &self.assets.kommuner_list,
            Granularity::County => &self.assets.counties_list,
        }
    }

    /// Boundary FeatureCollection for a granularity.
    pub fn boundary_map(&self, granularity: Granularity) -> &Path {
        match granularity {
            Granularity::Kommun => &self.assets.kommuner_map,
            Granularity::County => &self.assets.counties_map,
        }
    }
}
