use geo::MultiPolygon;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Years covered by the Statistics Sweden rent tables.
pub const YEARS: [u16; 6] = [2016, 2017, 2018, 2019, 2020, 2021];

/// Most recent year, used wherever a single snapshot is shown.
pub const LATEST_YEAR: u16 = 2021;

/// Level of the administrative hierarchy a table or map is drawn at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    #[serde(alias = "kommun_view", alias = "municipality")]
    Kommun,
    #[serde(alias = "county_view", alias = "lan")]
    County,
}

impl Default for Granularity {
    fn default() -> Self {
        Granularity::Kommun
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Granularity::Kommun => write!(f, "kommun"),
            Granularity::County => write!(f, "county"),
        }
    }
}

/// Which statistic a rent table carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RentMeasure {
    /// Median annual rent per square meter.
    Median,
    /// Median annual rent increase per square meter.
    Increase,
}

/// One cleaned observation: a place, its relation id, a year and the value.
///
/// A `median_rent_sek` of zero or below is the missing-data sentinel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RentRow {
    pub place: String,
    pub relation: u64,
    pub year: u16,
    pub median_rent_sek: f64,
    pub map_label: String,
}

impl RentRow {
    pub fn is_missing(&self) -> bool {
        self.median_rent_sek <= 0.0
    }
}

/// Place name to OSM relation id, as scraped from the OSM wiki.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceRelation {
    pub name: String,
    pub relation: u64,
}

/// Boundary of a place, keyed by relation id.
#[derive(Debug, Clone)]
pub struct PlaceShape {
    pub relation: u64,
    pub geometry: MultiPolygon<f64>,
}
