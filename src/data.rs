use crate::boundaries::select_features;
use crate::config::AppConfig;
use crate::types::{Granularity, PlaceRelation, PlaceShape, RentMeasure, RentRow};
use anyhow::{anyhow, Context, Result};
use csv::{ReaderBuilder, WriterBuilder};
use geo::MultiPolygon;
use geojson::{feature::Id, Feature, FeatureCollection, GeoJson};
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;
use tracing::{debug, info, warn};

/// County name to the kommuner it contains.
pub type CountyKommuner = BTreeMap<String, Vec<String>>;

/// Every static table the dashboard reads, loaded once at startup.
#[derive(Debug, Default)]
pub struct Assets {
    pub tables: HashMap<(RentMeasure, Granularity), Vec<RentRow>>,
    pub maps: HashMap<Granularity, FeatureCollection>,
    pub shapes: HashMap<Granularity, Vec<PlaceShape>>,
    pub county_kommuner: CountyKommuner,
    pub info_texts: HashMap<String, String>,
    pub info_urls: HashMap<String, String>,
}

impl Assets {
    pub fn load(config: &AppConfig) -> Result<Self> {
        info!("Loading assets...");
        let mut assets = Assets::default();

        for dataset in &config.datasets {
            let rows = load_rows(&dataset.cleaned_csv)?;
            info!("Loaded {} rows for {}", rows.len(), dataset.name);
            assets
                .tables
                .insert((dataset.measure, dataset.granularity), rows);
        }

        for granularity in [Granularity::Kommun, Granularity::County] {
            let mut collection = load_feature_collection(config.boundary_map(granularity))?;
            let used: HashSet<u64> = assets
                .tables
                .iter()
                .filter(|((_, g), _)| *g == granularity)
                .flat_map(|(_, rows)| rows.iter().map(|r| r.relation))
                .collect();
            if !used.is_empty() {
                collection = select_features(&collection, &used);
            }
            let shapes = place_shapes(&collection)?;
            info!("Loaded {} {} boundaries", shapes.len(), granularity);
            assets.shapes.insert(granularity, shapes);
            assets.maps.insert(granularity, collection);
        }

        assets.county_kommuner = load_json_or_default(&config.assets.county_kommun_mapping)?;
        assets.info_texts = load_json_or_default(&config.assets.kommun_info_texts)?;
        assets.info_urls = load_json_or_default(&config.assets.kommun_urls)?;

        Ok(assets)
    }

    pub fn rows(&self, measure: RentMeasure, granularity: Granularity) -> &[RentRow] {
        self.tables
            .get(&(measure, granularity))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn map(&self, granularity: Granularity) -> Option<&FeatureCollection> {
        self.maps.get(&granularity)
    }

    pub fn shapes(&self, granularity: Granularity) -> &[PlaceShape] {
        self.shapes
            .get(&granularity)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Relation ids that a choropleth of this granularity can draw.
    pub fn shape_ids(&self, granularity: Granularity) -> HashSet<u64> {
        self.map(granularity)
            .map(|fc| fc.features.iter().filter_map(feature_relation).collect())
            .unwrap_or_default()
    }

    /// County a kommun belongs to.
    pub fn county_of(&self, kommun: &str) -> Option<&str> {
        self.county_kommuner
            .iter()
            .find(|(_, kommuner)| kommuner.iter().any(|k| k == kommun))
            .map(|(county, _)| county.as_str())
    }

    /// All kommun names in mapping order.
    pub fn kommuner(&self) -> impl Iterator<Item = &str> {
        self.county_kommuner.values().flatten().map(String::as_str)
    }
}

fn load_csv<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file =
        File::open(path).with_context(|| format!("Failed to open CSV file: {:?}", path))?;
    let mut rdr = ReaderBuilder::new().from_reader(file);
    let mut out = Vec::new();
    for result in rdr.deserialize() {
        out.push(result.with_context(|| format!("Malformed row in {:?}", path))?);
    }
    Ok(out)
}

fn write_csv<T: serde::Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {:?}", parent))?;
    }
    let mut wtr = WriterBuilder::new()
        .from_path(path)
        .with_context(|| format!("Failed to create CSV file: {:?}", path))?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn load_rows(path: &Path) -> Result<Vec<RentRow>> {
    load_csv(path)
}

pub fn write_rows(path: &Path, rows: &[RentRow]) -> Result<()> {
    write_csv(path, rows)
}

pub fn load_relations(path: &Path) -> Result<Vec<PlaceRelation>> {
    load_csv(path)
}

pub fn write_relations(path: &Path, relations: &[PlaceRelation]) -> Result<()> {
    write_csv(path, relations)
}

pub fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {:?}", parent))?;
    }
    let content = serde_json::to_string(value)?;
    fs::write(path, content).with_context(|| format!("Failed to write {:?}", path))
}

fn load_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    if !path.exists() {
        warn!("{:?} not found, continuing without it", path);
        return Ok(T::default());
    }
    let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse JSON in {:?}", path))
}

pub fn load_feature_collection(path: &Path) -> Result<FeatureCollection> {
    let file =
        File::open(path).with_context(|| format!("Failed to open GeoJSON file: {:?}", path))?;
    let geojson = GeoJson::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse GeoJSON in {:?}", path))?;

    match geojson {
        GeoJson::FeatureCollection(fc) => Ok(fc),
        _ => Err(anyhow!("{:?} must be a FeatureCollection", path)),
    }
}

/// Relation id of a boundary feature, from its `id` member.
pub fn feature_relation(feature: &Feature) -> Option<u64> {
    match feature.id.as_ref()? {
        Id::Number(n) => n.as_u64(),
        Id::String(s) => s.trim().parse().ok(),
    }
}

/// Polygonal geometry of every feature with a relation id.
pub fn place_shapes(collection: &FeatureCollection) -> Result<Vec<PlaceShape>> {
    let mut shapes = Vec::new();

    for feature in &collection.features {
        let Some(relation) = feature_relation(feature) else {
            debug!("Skipping boundary feature without a relation id");
            continue;
        };

        let geometry = match &feature.geometry {
            Some(geo) => {
                let valid_geo: geo::Geometry<f64> = geo
                    .value
                    .clone()
                    .try_into()
                    .map_err(|e| anyhow!("Failed to convert geometry of {}: {:?}", relation, e))?;

                match valid_geo {
                    geo::Geometry::MultiPolygon(mp) => mp,
                    geo::Geometry::Polygon(p) => MultiPolygon::new(vec![p]),
                    _ => continue,
                }
            }
            None => continue,
        };

        shapes.push(PlaceShape { relation, geometry });
    }

    Ok(shapes)
}

/// Relation ids present in `rows` with no matching boundary, sorted.
pub fn unmatched_relations(rows: &[RentRow], collection: &FeatureCollection) -> Vec<u64> {
    let known: HashSet<u64> = collection.features.iter().filter_map(feature_relation).collect();
    let mut missing: Vec<u64> = rows
        .iter()
        .map(|r| r.relation)
        .filter(|id| !known.contains(id))
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    missing.sort_unstable();
    missing
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::processing::map_label;
    use crate::types::YEARS;
    use serde_json::json;

    /// Unit square boundary at (x, y) with the given relation id.
    pub fn square(relation: u64, x: f64, y: f64) -> Feature {
        let gj = json!({
            "type": "Feature",
            "id": relation,
            "properties": {},
            "geometry": {
                "type": "Polygon",
                "coordinates": [[[x, y], [x + 1.0, y], [x + 1.0, y + 1.0], [x, y + 1.0], [x, y]]]
            }
        });
        serde_json::from_value(gj).unwrap()
    }

    pub fn row(place: &str, relation: u64, year: u16, value: f64) -> RentRow {
        RentRow {
            place: place.to_string(),
            relation,
            year,
            median_rent_sek: value,
            map_label: map_label(value),
        }
    }

    /// Three kommuner in two counties, plus the two counties.
    pub fn sample_assets() -> Assets {
        let mut assets = Assets::default();

        let kommun_values: [(&str, u64, [f64; 6]); 4] = [
            ("Täby", 1, [1500.0, 1520.0, 1540.0, 1560.0, 1580.0, 1700.0]),
            ("Vallentuna", 2, [1400.0, 1450.0, 1500.0, 1550.0, 1600.0, 1800.0]),
            ("Lomma", 3, [1200.0, 1210.0, 1220.0, 0.0, 1240.0, 1250.0]),
            ("Ragunda", 4, [900.0, 910.0, 920.0, 930.0, 0.0, 950.0]),
        ];
        let county_values: [(&str, u64, [f64; 6]); 2] = [
            ("Stockholm county", 10, [1300.0, 1320.0, 1340.0, 1360.0, 1380.0, 1400.0]),
            ("Skåne county", 11, [1000.0, 1010.0, 1020.0, 1030.0, 1040.0, 1050.0]),
        ];

        let long = |places: &[(&str, u64, [f64; 6])], scale: f64| -> Vec<RentRow> {
            YEARS
                .iter()
                .enumerate()
                .flat_map(|(i, year)| {
                    places
                        .iter()
                        .map(move |(name, rel, values)| row(name, *rel, *year, values[i] * scale))
                })
                .collect()
        };

        assets
            .tables
            .insert((RentMeasure::Median, Granularity::Kommun), long(&kommun_values, 1.0));
        assets
            .tables
            .insert((RentMeasure::Increase, Granularity::Kommun), long(&kommun_values, 0.02));
        assets
            .tables
            .insert((RentMeasure::Median, Granularity::County), long(&county_values, 1.0));
        assets
            .tables
            .insert((RentMeasure::Increase, Granularity::County), long(&county_values, 0.02));

        // Ragunda (4) has no boundary
        let kommun_map: FeatureCollection = vec![square(1, 0.0, 0.0), square(2, 1.0, 0.0), square(3, 0.0, 1.0)]
            .into_iter()
            .collect();
        let county_map: FeatureCollection = vec![square(10, 0.0, 0.0), square(11, 5.0, 5.0)]
            .into_iter()
            .collect();
        assets
            .shapes
            .insert(Granularity::Kommun, place_shapes(&kommun_map).unwrap());
        assets
            .shapes
            .insert(Granularity::County, place_shapes(&county_map).unwrap());
        assets.maps.insert(Granularity::Kommun, kommun_map);
        assets.maps.insert(Granularity::County, county_map);

        assets.county_kommuner.insert(
            "Stockholm".to_string(),
            vec!["Täby".to_string(), "Vallentuna".to_string()],
        );
        assets
            .county_kommuner
            .insert("Skåne".to_string(), vec!["Lomma".to_string()]);
        assets
            .county_kommuner
            .insert("Jämtland".to_string(), vec!["Ragunda".to_string()]);
        assets
            .info_texts
            .insert("Täby".to_string(), "Täby is north of Stockholm.".to_string());
        assets
            .info_urls
            .insert("Täby".to_string(), "https://example.org/stockholms-lan/taby".to_string());

        assets
    }

    #[test]
    fn rows_round_trip_through_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("rows.csv");
        let rows = vec![row("Upplands Väsby", 935_492, 2018, 1234.7), row("Vallentuna", 7, 2016, 0.0)];

        write_rows(&path, &rows).unwrap();
        let header = fs::read_to_string(&path).unwrap();
        assert!(header.starts_with("place,relation,year,median_rent_sek,map_label\n"));
        assert_eq!(load_rows(&path).unwrap(), rows);
    }

    #[test]
    fn reads_relation_ids_from_number_and_string_ids() {
        let mut by_string = square(5, 0.0, 0.0);
        by_string.id = Some(Id::String("935492".to_string()));
        assert_eq!(feature_relation(&square(5, 0.0, 0.0)), Some(5));
        assert_eq!(feature_relation(&by_string), Some(935_492));

        let mut no_id = square(5, 0.0, 0.0);
        no_id.id = None;
        assert_eq!(feature_relation(&no_id), None);
    }

    #[test]
    fn builds_shapes_for_polygon_features() {
        let fc: FeatureCollection = vec![square(1, 0.0, 0.0), square(2, 3.0, 3.0)].into_iter().collect();
        let shapes = place_shapes(&fc).unwrap();
        assert_eq!(shapes.iter().map(|s| s.relation).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn reports_relations_without_boundaries() {
        let assets = sample_assets();
        let rows = assets.rows(RentMeasure::Median, Granularity::Kommun);
        assert_eq!(unmatched_relations(rows, assets.map(Granularity::Kommun).unwrap()), vec![4]);
        let counties = assets.rows(RentMeasure::Median, Granularity::County);
        assert!(unmatched_relations(counties, assets.map(Granularity::County).unwrap()).is_empty());
    }

    #[test]
    fn looks_up_county_of_kommun() {
        let assets = sample_assets();
        assert_eq!(assets.county_of("Vallentuna"), Some("Stockholm"));
        assert_eq!(assets.county_of("Atlantis"), None);
        assert_eq!(assets.kommuner().count(), 4);
    }

    #[test]
    fn missing_json_asset_loads_as_default() {
        let dir = tempfile::tempdir().unwrap();
        let texts: HashMap<String, String> =
            load_json_or_default(&dir.path().join("absent.json")).unwrap();
        assert!(texts.is_empty());
    }

    #[test]
    fn loads_assets_from_configured_files() {
        use crate::config::tests::temp_config;

        let dir = tempfile::tempdir().unwrap();
        let config = temp_config(dir.path());

        let kommun_rows = vec![row("Täby", 1, 2021, 1700.0), row("Vallentuna", 2, 2021, 1800.0)];
        let county_rows = vec![row("Stockholm county", 10, 2021, 1400.0)];
        for dataset in &config.datasets {
            let rows = match dataset.granularity {
                Granularity::Kommun => &kommun_rows,
                Granularity::County => &county_rows,
            };
            write_rows(&dataset.cleaned_csv, rows).unwrap();
        }

        // relations 3 and 11 are not used by any table
        let kommun_map: FeatureCollection = vec![square(1, 0.0, 0.0), square(2, 1.0, 0.0), square(3, 2.0, 0.0)]
            .into_iter()
            .collect();
        let county_map: FeatureCollection = vec![square(10, 0.0, 0.0), square(11, 5.0, 5.0)]
            .into_iter()
            .collect();
        write_json(&config.assets.kommuner_map, &kommun_map).unwrap();
        write_json(&config.assets.counties_map, &county_map).unwrap();

        let mut mapping = CountyKommuner::new();
        mapping.insert("Stockholm".to_string(), vec!["Täby".to_string(), "Vallentuna".to_string()]);
        write_json(&config.assets.county_kommun_mapping, &mapping).unwrap();

        let assets = Assets::load(&config).unwrap();

        assert_eq!(assets.rows(RentMeasure::Median, Granularity::Kommun), kommun_rows.as_slice());
        assert_eq!(assets.rows(RentMeasure::Increase, Granularity::County), county_rows.as_slice());

        let kept = |g: Granularity| -> Vec<u64> {
            assets.map(g).unwrap().features.iter().filter_map(feature_relation).collect()
        };
        assert_eq!(kept(Granularity::Kommun), vec![1, 2]);
        assert_eq!(kept(Granularity::County), vec![10]);
        assert_eq!(assets.shapes(Granularity::Kommun).len(), 2);

        assert_eq!(assets.county_of("Täby"), Some("Stockholm"));
        // info JSONs were never written
        assert!(assets.info_texts.is_empty());
        assert!(assets.info_urls.is_empty());
    }

    #[test]
    fn load_fails_without_boundary_file() {
        use crate::config::tests::temp_config;

        let dir = tempfile::tempdir().unwrap();
        let mut config = temp_config(dir.path());
        config.datasets.clear();
        assert!(Assets::load(&config).is_err());
    }
}
