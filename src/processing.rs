use crate::config::{AppConfig, DatasetConfig};
use crate::data::{load_feature_collection, load_relations, unmatched_relations, write_rows};
use crate::types::{PlaceRelation, RentRow, YEARS};
use anyhow::{anyhow, bail, Context, Result};
use calamine::{open_workbook_auto, Data, Reader};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Number(f64),
    Text(String),
}

pub type Grid = Vec<Vec<Cell>>;

impl From<&Data> for Cell {
    fn from(data: &Data) -> Self {
        match data {
            Data::Empty => Cell::Empty,
            Data::Int(i) => Cell::Number(*i as f64),
            Data::Float(f) => Cell::Number(*f),
            Data::String(s) if s.trim().is_empty() => Cell::Empty,
            Data::String(s) => Cell::Text(s.clone()),
            other => Cell::Text(other.to_string()),
        }
    }
}

impl Cell {
    fn text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    fn as_year(&self) -> Option<u16> {
        let year = match self {
            Cell::Number(n) if n.fract() == 0.0 => *n as u16,
            Cell::Text(s) => s.trim().parse().ok()?,
            _ => return None,
        };
        YEARS.contains(&year).then_some(year)
    }
}

/// Where the place names and yearly values sit inside a worksheet.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetLayout {
    pub place_column: usize,
    pub year_columns: Vec<(u16, usize)>,
    pub data_rows: std::ops::Range<usize>,
}

pub fn read_sheet(path: &Path, sheet: Option<&str>) -> Result<Grid> {
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("Failed to open workbook: {:?}", path))?;

    let range = match sheet {
        Some(name) => workbook
            .worksheet_range(name)
            .with_context(|| format!("Failed to read sheet '{}' of {:?}", name, path))?,
        None => workbook
            .worksheet_range_at(0)
            .ok_or_else(|| anyhow!("Workbook {:?} has no worksheets", path))?
            .with_context(|| format!("Failed to read first sheet of {:?}", path))?,
    };

    Ok(range
        .rows()
        .map(|row| row.iter().map(Cell::from).collect())
        .collect())
}

fn cell(grid: &Grid, row: usize, col: usize) -> &Cell {
    grid.get(row).and_then(|r| r.get(col)).unwrap_or(&Cell::Empty)
}

/// Find the header, place column and data block by their content rather
/// than by fixed row offsets.
pub fn locate_layout(grid: &Grid) -> Result<SheetLayout> {
    let (header_row, year_columns) = grid
        .iter()
        .enumerate()
        .find_map(|(idx, row)| {
            let years: Vec<(u16, usize)> = row
                .iter()
                .enumerate()
                .filter_map(|(col, c)| c.as_year().map(|y| (y, col)))
                .collect();
            (!years.is_empty()).then_some((idx, years))
        })
        .ok_or_else(|| anyhow!("No header row with a year between {} and {}", YEARS[0], YEARS[YEARS.len() - 1]))?;

    let first_year_col = year_columns.iter().map(|(_, c)| *c).min().unwrap_or(0);
    if first_year_col == 0 {
        bail!("Year columns start at the first column, no room for place names");
    }

    let coded = Regex::new(r"^\s*\d+\s+\S").map_err(|e| anyhow!("Bad place pattern: {}", e))?;
    let place_column = (0..first_year_col)
        .map(|col| {
            let score = (header_row + 1..grid.len())
                .filter(|&r| cell(grid, r, col).text().map_or(false, |t| coded.is_match(t)))
                .count();
            (score, col)
        })
        // ties go to the rightmost column
        .max()
        .filter(|(score, _)| *score > 0)
        .map(|(_, col)| col)
        .ok_or_else(|| anyhow!("No column of coded place names left of the year columns"))?;

    // a coded place name makes a data row, whatever its value cells hold
    let is_data_row = |r: usize| cell(grid, r, place_column).text().map_or(false, |t| coded.is_match(t));

    let start = (header_row + 1..grid.len())
        .find(|&r| is_data_row(r))
        .ok_or_else(|| anyhow!("No data rows below the header at row {}", header_row))?;
    let end = (start..grid.len()).find(|&r| !is_data_row(r)).unwrap_or(grid.len());

    debug!(
        "Sheet layout: header row {}, place column {}, data rows {}..{}",
        header_row, place_column, start, end
    );

    Ok(SheetLayout {
        place_column,
        year_columns,
        data_rows: start..end,
    })
}

pub fn normalize_place_name(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_ascii_digit())
        .collect::<String>()
        .trim()
        .to_string()
}

/// Missing, suppressed and malformed cells all become the `0.0` sentinel.
pub fn parse_value(cell: &Cell) -> f64 {
    let value = match cell {
        Cell::Number(n) => *n,
        Cell::Text(s) => s.trim().parse().unwrap_or(0.0),
        Cell::Empty => 0.0,
    };
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

/// Hover text for a map or chart point.
pub fn map_label(value: f64) -> String {
    if value > 0.0 {
        format!("Median Cost: {} SEK", value.trunc() as i64)
    } else {
        "Missing Data".to_string()
    }
}

/// Turn one worksheet into long-form rows, one per (place, year).
pub fn clean_grid(grid: &Grid, relations: &[PlaceRelation]) -> Result<Vec<RentRow>> {
    let layout = locate_layout(grid)?;
    let lookup: HashMap<&str, u64> = relations
        .iter()
        .map(|r| (r.name.as_str(), r.relation))
        .collect();

    let mut seen = HashSet::new();
    let mut places: Vec<(String, u64, Vec<f64>)> = Vec::new();
    let mut unmatched = 0;

    for r in layout.data_rows.clone() {
        let raw = cell(grid, r, layout.place_column).text().unwrap_or_default();
        let place = normalize_place_name(raw);
        let Some(&relation) = lookup.get(place.as_str()) else {
            debug!("No relation for '{}', dropping row {}", place, r);
            unmatched += 1;
            continue;
        };
        if !seen.insert(place.clone()) {
            warn!("Duplicate place '{}' at row {}, keeping the first", place, r);
            continue;
        }
        let values = layout
            .year_columns
            .iter()
            .map(|(_, c)| parse_value(cell(grid, r, *c)))
            .collect();
        places.push((place, relation, values));
    }

    if unmatched > 0 {
        debug!("Dropped {} rows without a relation id", unmatched);
    }

    let mut rows = Vec::with_capacity(places.len() * layout.year_columns.len());
    for (i, (year, _)) in layout.year_columns.iter().enumerate() {
        for (place, relation, values) in &places {
            let value = values[i];
            rows.push(RentRow {
                place: place.clone(),
                relation: *relation,
                year: *year,
                median_rent_sek: value,
                map_label: map_label(value),
            });
        }
    }
    Ok(rows)
}

pub fn prepare_dataset(config: &AppConfig, dataset: &DatasetConfig) -> Result<usize> {
    info!("Preparing {} from {:?}", dataset.name, dataset.workbook);

    let relations = load_relations(config.relation_list(dataset.granularity))?;
    let grid = read_sheet(&dataset.workbook, dataset.sheet.as_deref())?;
    let rows = clean_grid(&grid, &relations)
        .with_context(|| format!("Failed to clean {:?}", dataset.workbook))?;

    let boundary = config.boundary_map(dataset.granularity);
    if boundary.exists() {
        let shapes = load_feature_collection(boundary)?;
        let missing = unmatched_relations(&rows, &shapes);
        if !missing.is_empty() {
            warn!(
                "{}: {} relation ids have no boundary in {:?}: {:?}",
                dataset.name,
                missing.len(),
                boundary,
                missing
            );
        }
    }

    write_rows(&dataset.cleaned_csv, &rows)?;
    info!("Wrote {} rows to {:?}", rows.len(), dataset.cleaned_csv);
    Ok(rows.len())
}

pub fn prepare_all(config: &AppConfig) -> Result<()> {
    for dataset in &config.datasets {
        prepare_dataset(config, dataset)?;
    }
    Ok(())
}
