use crate::config::AppConfig;
use crate::data::{feature_relation, write_json, write_relations};
use crate::scrape::{parse_table, Batch, Fetcher, Table};
use crate::types::PlaceRelation;
use anyhow::{anyhow, bail, Context, Result};
use geojson::{feature::Id, Feature, FeatureCollection, GeoJson, Geometry, Value};
use std::collections::HashSet;
use tracing::{info, warn};

/// Table positions on the OSM wiki pages.
const KOMMUN_TABLE: usize = 0;
const COUNTY_TABLE: usize = 1;

pub fn relation_list(table: &Table, name_header: &str) -> Result<Vec<PlaceRelation>> {
    let name_col = table.column_index(name_header)?;
    let relation_col = table.column_index("relation")?;

    let mut out = Vec::with_capacity(table.rows.len());
    for row in &table.rows {
        let name = row.get(name_col).map(|s| s.trim()).unwrap_or_default();
        let digits: String = row
            .get(relation_col)
            .map(|s| s.chars().filter(|c| c.is_ascii_digit()).collect())
            .unwrap_or_default();
        match digits.parse::<u64>() {
            Ok(relation) if !name.is_empty() => out.push(PlaceRelation {
                name: name.to_string(),
                relation,
            }),
            _ => warn!("Skipping wiki row without name or relation: {:?}", row),
        }
    }
    Ok(out)
}

/// Swedish county name in the form the rent tables use.
pub fn county_label(name: &str) -> String {
    name.replace("s län", " county").replace("län", "county")
}

pub fn boundary_url(base: &str, relation: u64) -> String {
    format!("{}?id={}&params=0", base, relation)
}

/// The polygons service answers with a GeometryCollection; keep its first
/// geometry as a Feature keyed by the relation id.
pub fn reshape_boundary(raw: &str, relation: u64) -> Result<Feature> {
    let geojson: GeoJson = raw
        .parse()
        .with_context(|| format!("Relation {} did not return GeoJSON", relation))?;

    let geometry: Geometry = match geojson {
        GeoJson::Geometry(Geometry {
            value: Value::GeometryCollection(geometries),
            ..
        }) => geometries
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Relation {} has an empty GeometryCollection", relation))?,
        GeoJson::Geometry(geometry) => geometry,
        _ => bail!("Relation {} is not a geometry", relation),
    };

    Ok(Feature {
        bbox: None,
        geometry: Some(geometry),
        id: Some(Id::Number(relation.into())),
        properties: None,
        foreign_members: None,
    })
}

pub async fn fetch_boundaries(
    fetcher: &Fetcher,
    base_url: &str,
    relations: &[PlaceRelation],
) -> Batch<Feature> {
    let mut batch = Batch::default();
    for place in relations {
        let url = boundary_url(base_url, place.relation);
        let result = match fetcher.get_text(&url).await {
            Ok(body) => reshape_boundary(&body, place.relation),
            Err(e) => Err(e),
        };
        batch.record(place.relation.to_string(), result);
    }
    info!(
        "Getting boundary data failed {} times out of {}",
        batch.failures.len(),
        relations.len()
    );
    batch
}

pub fn select_features(collection: &FeatureCollection, ids: &HashSet<u64>) -> FeatureCollection {
    collection
        .features
        .iter()
        .filter(|f| feature_relation(f).map_or(false, |id| ids.contains(&id)))
        .cloned()
        .collect()
}

async fn scrape_level(
    fetcher: &Fetcher,
    config: &AppConfig,
    page_url: &str,
    table_index: usize,
    name_header: &str,
) -> Result<(Vec<PlaceRelation>, FeatureCollection)> {
    let page = fetcher.get_text(page_url).await?;
    let table = parse_table(&page, table_index)?;
    let mut relations = relation_list(&table, name_header)?;
    info!("Found {} relations on {}", relations.len(), page_url);

    let batch = fetch_boundaries(fetcher, &config.scrape.polygons_url, &relations).await;
    let failed: HashSet<&str> = batch.failed_keys().into_iter().collect();
    if !failed.is_empty() {
        warn!("Dropping relations without boundaries: {:?}", failed);
    }
    relations.retain(|p| !failed.contains(p.relation.to_string().as_str()));

    let ids = relations.iter().map(|p| p.relation).collect();
    let collection: FeatureCollection = batch.items.into_iter().collect();
    Ok((relations, select_features(&collection, &ids)))
}

pub async fn run(config: &AppConfig) -> Result<()> {
    let fetcher = Fetcher::new(&config.scrape)?;

    let (counties, counties_map) = scrape_level(
        &fetcher,
        config,
        &config.scrape.counties_wiki_url,
        COUNTY_TABLE,
        "county",
    )
    .await?;
    let counties: Vec<PlaceRelation> = counties
        .into_iter()
        .map(|p| PlaceRelation {
            name: county_label(&p.name),
            ..p
        })
        .collect();

    let (kommuner, kommuner_map) = scrape_level(
        &fetcher,
        config,
        &config.scrape.kommuner_wiki_url,
        KOMMUN_TABLE,
        "municipality",
    )
    .await?;

    write_relations(&config.assets.kommuner_list, &kommuner)?;
    write_relations(&config.assets.counties_list, &counties)?;
    write_json(&config.assets.kommuner_map, &kommuner_map)?;
    write_json(&config.assets.counties_map, &counties_map)?;

    info!(
        "Wrote {} kommuner and {} counties with boundaries",
        kommuner.len(),
        counties.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::tests::square;

    const POLYGONS_REPLY: &str = r#"{"type":"GeometryCollection","geometries":[
        {"type":"MultiPolygon","coordinates":[[[[18.0,59.5],[18.1,59.5],[18.1,59.6],[18.0,59.5]]]]}
    ]}"#;

    #[test]
    fn renames_counties_to_table_names() {
        assert_eq!(county_label("Stockholms län"), "Stockholm county");
        assert_eq!(county_label("Västra Götalands län"), "Västra Götaland county");
        assert_eq!(county_label("Skåne län"), "Skåne county");
    }

    #[test]
    fn builds_polygon_service_url() {
        assert_eq!(
            boundary_url("http://polygons.openstreetmap.fr/get_geojson.py", 54391),
            "http://polygons.openstreetmap.fr/get_geojson.py?id=54391&params=0"
        );
    }

    #[test]
    fn reshapes_geometry_collection_into_feature() {
        let feature = reshape_boundary(POLYGONS_REPLY, 935_492).unwrap();
        assert_eq!(feature_relation(&feature), Some(935_492));
        match feature.geometry.map(|g| g.value) {
            Some(Value::MultiPolygon(polygons)) => assert_eq!(polygons.len(), 1),
            other => panic!("unexpected geometry {:?}", other),
        }
    }

    #[test]
    fn rejects_non_geojson_reply() {
        assert!(reshape_boundary("<html>Bad request</html>", 1).is_err());
        assert!(reshape_boundary(r#"{"type":"GeometryCollection","geometries":[]}"#, 1).is_err());
    }

    #[test]
    fn reads_relations_from_wiki_table() {
        let table = Table {
            header: vec!["Kod".into(), "Kommun Municipality".into(), "Relation".into()],
            rows: vec![
                vec!["0114".into(), "Upplands Väsby".into(), "935492".into()],
                vec!["0115".into(), "".into(), "935493".into()],
                vec!["0117".into(), "Österåker".into(), "r 935494".into()],
            ],
        };
        let relations = relation_list(&table, "municipality").unwrap();
        assert_eq!(
            relations,
            vec![
                PlaceRelation { name: "Upplands Väsby".into(), relation: 935_492 },
                PlaceRelation { name: "Österåker".into(), relation: 935_494 },
            ]
        );
    }

    #[test]
    fn selects_only_listed_features() {
        let fc: FeatureCollection = vec![square(1, 0.0, 0.0), square(2, 1.0, 0.0), square(3, 2.0, 0.0)]
            .into_iter()
            .collect();
        let ids: HashSet<u64> = [1, 3].into_iter().collect();
        let selected = select_features(&fc, &ids);
        let kept: Vec<u64> = selected.features.iter().filter_map(feature_relation).collect();
        assert_eq!(kept, vec![1, 3]);
    }
}
