use crate::config::ScrapeConfig;
use anyhow::{anyhow, bail, Context, Result};
use rand::Rng;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

pub struct Fetcher {
    client: Client,
    min_delay: u64,
    max_delay: u64,
}

impl Fetcher {
    pub fn new(config: &ScrapeConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            min_delay: config.min_delay_secs,
            max_delay: config.max_delay_secs.max(config.min_delay_secs),
        })
    }

    async fn pause(&self) {
        let secs = rand::thread_rng().gen_range(self.min_delay..=self.max_delay);
        if secs > 0 {
            tokio::time::sleep(Duration::from_secs(secs)).await;
        }
    }

    pub async fn get_text(&self, url: &str) -> Result<String> {
        self.pause().await;
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", url))?;
        if !response.status().is_success() {
            bail!("HTTP error {}: {}", response.status(), url);
        }
        response
            .text()
            .await
            .with_context(|| format!("Failed to read response body of {}", url))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Failure {
    pub key: String,
    pub reason: String,
}

/// Results of a scraping batch. Items that failed are listed, never raised.
#[derive(Debug)]
pub struct Batch<T> {
    pub items: Vec<T>,
    pub failures: Vec<Failure>,
}

impl<T> Default for Batch<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            failures: Vec::new(),
        }
    }
}

impl<T> Batch<T> {
    pub fn record(&mut self, key: impl Into<String>, result: Result<T>) {
        match result {
            Ok(item) => self.items.push(item),
            Err(e) => self.fail(key, e),
        }
    }

    pub fn fail(&mut self, key: impl Into<String>, error: anyhow::Error) {
        let key = key.into();
        warn!("Failed to get {}: {:#}", key, error);
        self.failures.push(Failure {
            key,
            reason: format!("{:#}", error),
        });
    }

    pub fn failed_keys(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.key.as_str()).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("Bad selector '{}': {:?}", css, e))
}

pub fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// The `index`-th `<table>` of a page. The first row holding `<th>` cells is
/// the header; every later row with `<td>` cells is data.
pub fn parse_table(html: &str, index: usize) -> Result<Table> {
    let document = Html::parse_document(html);
    let table_sel = selector("table")?;
    let row_sel = selector("tr")?;
    let header_sel = selector("th")?;
    let cell_sel = selector("td, th")?;
    let data_sel = selector("td")?;

    let table = document
        .select(&table_sel)
        .nth(index)
        .ok_or_else(|| anyhow!("Page has no table number {}", index))?;

    let mut header = Vec::new();
    let mut rows = Vec::new();
    for tr in table.select(&row_sel) {
        if header.is_empty() && tr.select(&header_sel).next().is_some() {
            header = tr.select(&header_sel).map(element_text).collect();
        } else if tr.select(&data_sel).next().is_some() {
            rows.push(tr.select(&cell_sel).map(element_text).collect());
        }
    }

    if header.is_empty() {
        bail!("Table number {} has no header row", index);
    }
    Ok(Table { header, rows })
}

impl Table {
    /// Index of the first header cell containing `needle`, ignoring case.
    pub fn column_index(&self, needle: &str) -> Result<usize> {
        let needle = needle.to_lowercase();
        self.header
            .iter()
            .position(|h| h.to_lowercase().contains(&needle))
            .ok_or_else(|| anyhow!("No column matching '{}' in {:?}", needle, self.header))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
        <table><tr><th>Ignored</th></tr><tr><td>x</td></tr></table>
        <table class="wikitable">
          <tr><th>Kommun<br>Municipality</th><th>Relation</th><th>Kommentar<br>Comment</th></tr>
          <tr><td>Upplands  Väsby</td><td><a href="/r/1">935492</a></td><td></td></tr>
          <tr><td>Vallentuna</td><td>935493</td><td>note</td></tr>
        </table>
        </body></html>"#;

    #[test]
    fn parses_the_requested_table() {
        let table = parse_table(PAGE, 1).unwrap();
        assert_eq!(table.header, vec!["Kommun Municipality", "Relation", "Kommentar Comment"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0][0], "Upplands Väsby");
        assert_eq!(table.rows[0][1], "935492");
    }

    #[test]
    fn finds_columns_ignoring_case() {
        let table = parse_table(PAGE, 1).unwrap();
        assert_eq!(table.column_index("municipality").unwrap(), 0);
        assert_eq!(table.column_index("RELATION").unwrap(), 1);
        assert!(table.column_index("county").is_err());
    }

    #[test]
    fn missing_table_is_an_error() {
        assert!(parse_table(PAGE, 5).is_err());
    }

    #[test]
    fn batch_collects_failures_and_continues() {
        let mut batch: Batch<u32> = Batch::default();
        batch.record("a", Ok(1));
        batch.record("b", Err(anyhow!("no paragraph")));
        batch.record("c", Ok(3));
        assert_eq!(batch.items, vec![1, 3]);
        assert_eq!(batch.failed_keys(), vec!["b"]);
        assert_eq!(batch.failures[0].reason, "no paragraph");
    }

    #[tokio::test]
    async fn fetcher_builds_without_delay() {
        let config = ScrapeConfig {
            min_delay_secs: 0,
            max_delay_secs: 0,
            ..ScrapeConfig::default()
        };
        let fetcher = Fetcher::new(&config).unwrap();
        fetcher.pause().await;
        assert_eq!(fetcher.max_delay, 0);
    }
}
