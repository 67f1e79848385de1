use crate::config::AppConfig;
use crate::data::{write_json, CountyKommuner};
use crate::scrape::{element_text, parse_table, Batch, Failure, Fetcher, Table};
use anyhow::{anyhow, Result};
use scraper::{Html, Selector};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// The municipality table on the Wikipedia list page.
const MUNICIPALITY_TABLE: usize = 1;

/// Counties whose URL slug takes no genitive "s".
const UNINFLECTED_COUNTIES: [&str; 5] = ["Blekinge", "Kalmar", "Skåne", "Uppsala", "Örebro"];

/// Kommuner whose URL slug does not follow the general rule.
const KOMMUN_SLUG_EXCEPTIONS: [(&str, &str); 7] = [
    ("Bollebygd", "bollebyggd"),
    ("Gothenburg", "goteborg"),
    ("Hällefors", "hellefors"),
    ("Lilla Edet", "lillaedet"),
    ("Upplands Väsby", "upplandsvasby"),
    ("Ängelholm", "engelholm"),
    ("Östra Göinge", "ostragoinge"),
];

#[derive(Debug, Default)]
pub struct InfoBatch {
    pub texts: BTreeMap<String, String>,
    pub urls: BTreeMap<String, String>,
    pub failures: Vec<Failure>,
}

pub fn county_mapping(table: &Table) -> Result<CountyKommuner> {
    let kommun_col = table.column_index("municipality")?;
    let county_col = table.column_index("county")?;

    let mut mapping = CountyKommuner::new();
    for row in &table.rows {
        let (Some(kommun), Some(county)) = (row.get(kommun_col), row.get(county_col)) else {
            continue;
        };
        let kommun = kommun.replace(" Municipality", "");
        let county = county.replace(" County", "");
        if kommun.is_empty() || county.is_empty() {
            continue;
        }
        mapping.entry(county).or_default().push(kommun);
    }
    Ok(mapping)
}

fn fold_diacritics(s: &str) -> String {
    s.replace('ä', "a").replace('å', "a").replace('ö', "o")
}

pub fn county_slug(county: &str) -> String {
    let slug = if county == "Västra Götaland" {
        "vastra-gotalands".to_string()
    } else if UNINFLECTED_COUNTIES.contains(&county) {
        county.to_lowercase()
    } else {
        format!("{}s", county.to_lowercase())
    };
    fold_diacritics(&slug).replace(' ', "-")
}

pub fn kommun_slug(kommun: &str) -> String {
    KOMMUN_SLUG_EXCEPTIONS
        .iter()
        .find(|(name, _)| *name == kommun)
        .map(|(_, slug)| slug.to_string())
        .unwrap_or_else(|| fold_diacritics(&kommun.to_lowercase()))
}

pub fn info_url(base: &str, county: &str, kommun: &str) -> String {
    format!("{}{}-lan/{}", base, county_slug(county), kommun_slug(kommun))
}

/// Text of the page's lead paragraph (`p.ingress`).
pub fn extract_ingress(html: &str) -> Result<String> {
    let document = Html::parse_document(html);
    let selector =
        Selector::parse("p.ingress").map_err(|e| anyhow!("Bad selector: {:?}", e))?;
    document
        .select(&selector)
        .next()
        .map(element_text)
        .filter(|text| !text.is_empty())
        .ok_or_else(|| anyhow!("Page has no ingress paragraph"))
}

pub async fn fetch_info(fetcher: &Fetcher, base: &str, mapping: &CountyKommuner) -> InfoBatch {
    let mut out = InfoBatch::default();
    let mut batch: Batch<(String, String)> = Batch::default();

    for (county, kommuner) in mapping {
        for kommun in kommuner {
            let url = info_url(base, county, kommun);
            // kept even when the page cannot be read
            out.urls.insert(kommun.clone(), url.clone());

            let result = match fetcher.get_text(&url).await {
                Ok(page) => extract_ingress(&page).map(|text| (kommun.clone(), text)),
                Err(e) => Err(e),
            };
            batch.record(kommun.as_str(), result);
        }
    }

    info!("Getting web data failed {} times", batch.failures.len());
    out.texts = batch.items.into_iter().collect();
    out.failures = batch.failures;
    out
}

pub async fn run(config: &AppConfig) -> Result<()> {
    let fetcher = Fetcher::new(&config.scrape)?;

    let page = fetcher.get_text(&config.scrape.municipalities_list_url).await?;
    let table = parse_table(&page, MUNICIPALITY_TABLE)?;
    let mapping = county_mapping(&table)?;
    info!(
        "Found {} counties with {} kommuner",
        mapping.len(),
        mapping.values().map(Vec::len).sum::<usize>()
    );
    write_json(&config.assets.county_kommun_mapping, &mapping)?;

    let batch = fetch_info(&fetcher, &config.scrape.info_base_url, &mapping).await;
    write_json(&config.assets.kommun_info_texts, &batch.texts)?;
    write_json(&config.assets.kommun_urls, &batch.urls)?;

    if batch.failures.is_empty() {
        info!("All kommun and county data successfully obtained.");
    } else {
        let names: Vec<&str> = batch.failures.iter().map(|f| f.key.as_str()).collect();
        warn!("Failed to get information for: {:?}", names);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://www.informationsverige.se/en/jag-har-fatt-uppehallstillstand/boende/lan-och-kommuner-i-sverige/";

    #[test]
    fn county_slugs_follow_site_rules() {
        assert_eq!(county_slug("Stockholm"), "stockholms");
        assert_eq!(county_slug("Västra Götaland"), "vastra-gotalands");
        assert_eq!(county_slug("Skåne"), "skane");
        assert_eq!(county_slug("Örebro"), "orebro");
        assert_eq!(county_slug("Jämtland"), "jamtlands");
    }

    #[test]
    fn kommun_slugs_fold_diacritics_and_honour_exceptions() {
        assert_eq!(kommun_slug("Täby"), "taby");
        assert_eq!(kommun_slug("Örnsköldsvik"), "ornskoldsvik");
        assert_eq!(kommun_slug("Gothenburg"), "goteborg");
        assert_eq!(kommun_slug("Upplands Väsby"), "upplandsvasby");
        assert_eq!(kommun_slug("Ängelholm"), "engelholm");
    }

    #[test]
    fn builds_info_url() {
        assert_eq!(
            info_url(BASE, "Västernorrland", "Örnsköldsvik"),
            format!("{}vasternorrlands-lan/ornskoldsvik", BASE)
        );
    }

    #[test]
    fn extracts_ingress_paragraph() {
        let page = r#"<html><body><p>Skip</p><p class="ingress">Täby is a
            municipality north of Stockholm.</p></body></html>"#;
        assert_eq!(
            extract_ingress(page).unwrap(),
            "Täby is a municipality north of Stockholm."
        );
        assert!(extract_ingress("<html><body><p>Nothing</p></body></html>").is_err());
    }

    #[test]
    fn maps_counties_to_kommuner() {
        let table = Table {
            header: vec!["Code".into(), "Municipality".into(), "County".into()],
            rows: vec![
                vec!["0114".into(), "Upplands Väsby Municipality".into(), "Stockholm County".into()],
                vec!["0160".into(), "Täby Municipality".into(), "Stockholm County".into()],
                vec!["1262".into(), "Lomma Municipality".into(), "Skåne County".into()],
                vec!["short".into()],
            ],
        };
        let mapping = county_mapping(&table).unwrap();
        assert_eq!(mapping.len(), 2);
        assert_eq!(mapping["Stockholm"], vec!["Upplands Väsby", "Täby"]);
        assert_eq!(mapping["Skåne"], vec!["Lomma"]);
    }
}
