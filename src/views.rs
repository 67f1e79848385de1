use crate::data::Assets;
use crate::inflation::{inflation_adjust, round_to_tenth, UnsupportedYear};
use crate::render::{
    cost_label, hover_template, named_scale, two_colour_scale, Axis, BarTrace, Center,
    ChoroplethTrace, ColorMarker, Figure, Layout, Line, Mapbox, Margin, Opacity, ScatterTrace,
    Shape, SizedMarker, Title, Trace, ViolinTrace, Visibility, RENT_SCALE, VIOLIN_COLORS,
    YEAR_BAR_SCALE,
};
use crate::types::{Granularity, RentMeasure, RentRow, LATEST_YEAR, YEARS};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use tracing::debug;

pub const KOMMUN_COLOR_RANGE: [f64; 2] = [700.0, 1850.0];
pub const COUNTY_COLOR_RANGE: [f64; 2] = [850.0, 1350.0];

/// Cheapest and most expensive kommuner shown on the overview bar chart.
const TOP_N: usize = 10;

const RENT_PER_M2: &str = "Median Rent per M<sup>2</sup> (SEK)";
const INCREASE_PER_M2: &str = "Median Annual Rent Increase per M<sup>2</sup> (SEK)";

#[derive(Debug, Clone, Serialize)]
pub struct OverviewView {
    pub bar: Figure,
    pub map: Figure,
}

#[derive(Debug, Clone, Serialize)]
pub struct IncreasesView {
    pub violin: Figure,
    pub scatter: Figure,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlaceCard {
    pub relation: u64,
    pub title: String,
    pub note: &'static str,
    pub figure: Figure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KommunOption {
    pub label: String,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Rank {
    pub position: usize,
    pub ranked: usize,
    pub without_data: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Specifics {
    pub kommun: String,
    pub county: String,
    pub kommuner_in_county: usize,
    pub headline: String,
    pub summary: String,
    pub info_text: Option<String>,
    pub info_url: Option<String>,
    pub rank: Option<Rank>,
    pub percent_change: Option<f64>,
    pub key_statistics: Vec<String>,
    pub comparison_title: String,
    pub location_map: Figure,
    pub county_comparison: Figure,
    pub median_bar: Figure,
    pub increase_bar: Figure,
}

fn color_range(granularity: Granularity) -> [f64; 2] {
    match granularity {
        Granularity::Kommun => KOMMUN_COLOR_RANGE,
        Granularity::County => COUNTY_COLOR_RANGE,
    }
}

pub fn shapes_url(granularity: Granularity) -> String {
    format!("/api/shapes/{}", granularity)
}

fn rows_for_year(rows: &[RentRow], year: u16) -> Vec<&RentRow> {
    rows.iter().filter(|r| r.year == year).collect()
}

fn label_data(rows: &[&RentRow]) -> Vec<Vec<Value>> {
    rows.iter()
        .map(|r| vec![json!(r.place), json!(r.map_label)])
        .collect()
}

fn cost_data(rows: &[&RentRow], values: &[f64]) -> Vec<Vec<Value>> {
    rows.iter()
        .zip(values)
        .map(|(r, v)| vec![json!(r.place), json!(cost_label(*v))])
        .collect()
}

/// Choropleth of `rows`, keeping only places the boundary file can draw.
fn choropleth_trace(
    assets: &Assets,
    granularity: Granularity,
    rows: Vec<&RentRow>,
    z: impl Fn(&RentRow) -> f64,
    colorscale: Value,
    range: Option<[f64; 2]>,
    with_label: bool,
) -> ChoroplethTrace {
    let drawable = assets.shape_ids(granularity);
    let before = rows.len();
    let rows: Vec<&RentRow> = rows
        .into_iter()
        .filter(|r| drawable.contains(&r.relation))
        .collect();
    if rows.len() < before {
        debug!(
            "{} {} rows have no boundary and are left off the map",
            before - rows.len(),
            granularity
        );
    }

    ChoroplethTrace {
        geojson: shapes_url(granularity),
        featureidkey: "id",
        locations: rows.iter().map(|r| r.relation).collect(),
        // missing values sit at the bottom of the scale, the label says why
        z: rows.iter().map(|r| z(*r).max(0.0)).collect(),
        colorscale,
        zmin: range.map(|r| r[0]),
        zmax: range.map(|r| r[1]),
        showscale: false,
        marker: Opacity { opacity: 0.8 },
        customdata: label_data(&rows),
        hovertemplate: hover_template(with_label),
    }
}

fn rent_map(
    assets: &Assets,
    granularity: Granularity,
    year: u16,
    range: Option<[f64; 2]>,
) -> Figure {
    let rows = rows_for_year(assets.rows(RentMeasure::Median, granularity), year);
    let trace = choropleth_trace(
        assets,
        granularity,
        rows,
        |r| r.median_rent_sek,
        named_scale(RENT_SCALE),
        range,
        true,
    );
    Figure {
        data: vec![Trace::Choroplethmapbox(trace)],
        layout: Layout {
            title: Some(Title {
                text: "Median Cost per M<sup>2</sup> (SEK)".to_string(),
            }),
            height: Some(800),
            mapbox: Some(Mapbox::sweden(4.1)),
            margin: Margin { t: 20, ..Margin::default() },
            ..Layout::default()
        },
    }
}

fn bar_marker(values: &[f64], scale: &str, range: Option<[f64; 2]>) -> ColorMarker {
    ColorMarker {
        color: values.to_vec(),
        colorscale: named_scale(scale),
        cmin: range.map(|r| r[0]),
        cmax: range.map(|r| r[1]),
        showscale: false,
        opacity: 0.6,
        line: Line::outline("black", 1.5),
    }
}

fn horizontal_bar(rows: &[&RentRow], labels: Vec<Value>, scale: &str) -> BarTrace {
    let values: Vec<f64> = rows.iter().map(|r| r.median_rent_sek).collect();
    BarTrace {
        x: values.iter().map(|v| json!(v)).collect(),
        y: labels,
        orientation: "h",
        marker: bar_marker(&values, scale, None),
        customdata: label_data(rows),
        hovertemplate: hover_template(true),
    }
}

pub fn overview(assets: &Assets, granularity: Granularity) -> OverviewView {
    let mut ranked: Vec<&RentRow> = rows_for_year(assets.rows(RentMeasure::Median, granularity), LATEST_YEAR)
        .into_iter()
        .filter(|r| !r.is_missing())
        .collect();
    ranked.sort_by(|a, b| a.median_rent_sek.total_cmp(&b.median_rent_sek));

    let (bar_rows, labels, shapes, x_range, map_range) = match granularity {
        Granularity::Kommun => {
            if ranked.len() > 2 * TOP_N {
                let tail = ranked.split_off(ranked.len() - TOP_N);
                ranked.truncate(TOP_N);
                ranked.extend(tail);
            }
            let labels: Vec<Value> = ranked.iter().map(|r| json!(r.place)).collect();
            let divider = vec![Shape::hline(TOP_N as f64 - 0.5)];
            (ranked, labels, divider, Some([0.0, KOMMUN_COLOR_RANGE[1]]), Some(KOMMUN_COLOR_RANGE))
        }
        Granularity::County => {
            let labels: Vec<Value> = ranked
                .iter()
                .map(|r| json!(r.place.trim_end_matches(" county")))
                .collect();
            (ranked, labels, Vec::new(), None, None)
        }
    };

    let bar = Figure {
        data: vec![Trace::Bar(horizontal_bar(&bar_rows, labels, RENT_SCALE))],
        layout: Layout {
            xaxis: Some(Axis {
                range: x_range,
                ..Axis::titled(RENT_PER_M2)
            }),
            yaxis: Some(Axis::titled("")),
            shapes,
            ..Layout::default()
        },
    };

    OverviewView {
        bar,
        map: rent_map(assets, granularity, LATEST_YEAR, map_range),
    }
}

fn complete_places(rows: &[RentRow]) -> Vec<&RentRow> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for r in rows.iter().filter(|r| !r.is_missing()) {
        *counts.entry(r.place.as_str()).or_default() += 1;
    }
    rows.iter()
        .filter(|r| !r.is_missing() && counts.get(r.place.as_str()) == Some(&YEARS.len()))
        .collect()
}

fn displayed_value(row: &RentRow, inflation: bool) -> Result<f64, UnsupportedYear> {
    if inflation {
        Ok(round_to_tenth(inflation_adjust(row.median_rent_sek, row.year)?))
    } else {
        Ok(row.median_rent_sek)
    }
}

/// Overview page: yearly rent increases, optionally in base-year prices.
pub fn increases(assets: &Assets, inflation: bool) -> Result<IncreasesView, UnsupportedYear> {
    let kommuner = complete_places(assets.rows(RentMeasure::Increase, Granularity::Kommun));
    let counties = complete_places(assets.rows(RentMeasure::Increase, Granularity::County));

    let mut violins = Vec::with_capacity(YEARS.len());
    for (idx, year) in YEARS.iter().enumerate() {
        let rows: Vec<&RentRow> = kommuner.iter().copied().filter(|r| r.year == *year).collect();
        let values = rows
            .iter()
            .map(|r| displayed_value(r, inflation))
            .collect::<Result<Vec<_>, _>>()?;
        violins.push(Trace::Violin(ViolinTrace {
            name: year.to_string(),
            x: vec![*year; rows.len()],
            customdata: cost_data(&rows, &values),
            y: values,
            line: Line {
                color: Some(VIOLIN_COLORS[idx].to_string()),
                width: None,
                dash: None,
            },
            points: "all",
            jitter: 0.40,
            scalemode: "count",
            hoveron: "points",
            box_: Visibility { visible: false },
            meanline: Visibility { visible: true },
            hovertemplate: hover_template(true),
        }));
    }

    let mut order: Vec<&str> = Vec::new();
    for r in &counties {
        if !order.contains(&r.place.as_str()) {
            order.push(r.place.as_str());
        }
    }
    let mut lines = Vec::with_capacity(order.len());
    for county in order {
        let mut rows: Vec<&RentRow> = counties.iter().copied().filter(|r| r.place == county).collect();
        rows.sort_by_key(|r| r.year);
        let values = rows
            .iter()
            .map(|r| displayed_value(r, inflation))
            .collect::<Result<Vec<_>, _>>()?;
        lines.push(Trace::Scatter(ScatterTrace {
            name: county.to_string(),
            x: values.iter().map(|v| json!(v)).collect(),
            y: rows.iter().map(|r| json!(r.year)).collect(),
            mode: "lines+markers",
            marker: SizedMarker {
                size: 12.0,
                line: Line::outline("DarkSlateGrey", 2.0),
            },
            customdata: cost_data(&rows, &values),
            hovertemplate: hover_template(true),
        }));
    }

    let margin = Margin { t: 25, ..Margin::default() };
    Ok(IncreasesView {
        violin: Figure {
            data: violins,
            layout: Layout {
                xaxis: Some(Axis::titled("")),
                yaxis: Some(Axis::titled(INCREASE_PER_M2)),
                margin,
                ..Layout::default()
            },
        },
        scatter: Figure {
            data: lines,
            layout: Layout {
                xaxis: Some(Axis::titled(INCREASE_PER_M2)),
                yaxis: Some(Axis::titled("")),
                margin,
                ..Layout::default()
            },
        },
    })
}

pub fn choropleth(
    assets: &Assets,
    granularity: Granularity,
    year: u16,
) -> Result<Figure, UnsupportedYear> {
    if !YEARS.contains(&year) {
        return Err(UnsupportedYear(year));
    }
    let mut figure = rent_map(assets, granularity, year, Some(color_range(granularity)));
    figure.layout.margin = Margin { t: 0, ..Margin::default() };
    Ok(figure)
}

pub fn place_card(assets: &Assets, granularity: Granularity, relation: u64) -> Option<PlaceCard> {
    let mut rows: Vec<&RentRow> = assets
        .rows(RentMeasure::Median, granularity)
        .iter()
        .filter(|r| r.relation == relation)
        .collect();
    let name = rows.first()?.place.clone();
    rows.sort_by_key(|r| r.year);

    let values: Vec<f64> = rows.iter().map(|r| r.median_rent_sek).collect();
    let bar = BarTrace {
        x: rows.iter().map(|r| json!(r.year)).collect(),
        y: values.iter().map(|v| json!(v)).collect(),
        orientation: "v",
        marker: bar_marker(&values, RENT_SCALE, Some(KOMMUN_COLOR_RANGE)),
        customdata: label_data(&rows),
        hovertemplate: hover_template(true),
    };

    Some(PlaceCard {
        relation,
        title: format!("You Have Selected: {}.", name),
        note: "Please note that any missing data (see FAQs tab) will show up as 0 on the bar chart below.",
        figure: Figure {
            data: vec![Trace::Bar(bar)],
            layout: Layout {
                xaxis: Some(Axis::years()),
                yaxis: Some(Axis::titled("Median Rent (SEK)")),
                ..Layout::default()
            },
        },
    })
}

/// Kommun dropdown options matching `search`, case-insensitively. The
/// current selection stays in the list so it never disappears.
pub fn search_kommuner(assets: &Assets, search: Option<&str>, selected: Option<&str>) -> Vec<KommunOption> {
    let needle = search.map(str::trim).unwrap_or_default().to_uppercase();
    assets
        .kommuner()
        .filter(|k| needle.is_empty() || k.to_uppercase().contains(&needle) || Some(*k) == selected)
        .map(|k| KommunOption {
            label: k.to_string(),
            value: k.to_string(),
        })
        .collect()
}

fn value_in(rows: &[RentRow], place: &str, year: u16) -> Option<f64> {
    rows.iter()
        .find(|r| r.place == place && r.year == year && !r.is_missing())
        .map(|r| r.median_rent_sek)
}

/// Position of `kommun` when latest-year rents are sorted most expensive
/// first, ties sharing the lowest position.
pub fn rent_rank(rows: &[RentRow], kommun: &str) -> Option<Rank> {
    let latest = rows_for_year(rows, LATEST_YEAR);
    let value = value_in(rows, kommun, LATEST_YEAR)?;
    let ranked = latest.iter().filter(|r| !r.is_missing()).count();
    Some(Rank {
        position: 1 + latest.iter().filter(|r| r.median_rent_sek > value).count(),
        ranked,
        without_data: latest.len() - ranked,
    })
}

/// Change from the previous year's rent to the latest, in percent.
pub fn percent_change(rows: &[RentRow], kommun: &str) -> Option<f64> {
    let latest = value_in(rows, kommun, LATEST_YEAR)?;
    let previous = value_in(rows, kommun, LATEST_YEAR - 1)?;
    Some(round_to_tenth(latest / previous * 100.0 - 100.0))
}

fn year_bar(rows: &[RentRow], kommun: &str, axis_title: &str) -> Figure {
    let mut rows: Vec<&RentRow> = rows.iter().filter(|r| r.place == kommun).collect();
    rows.sort_by_key(|r| r.year);
    let labels = rows.iter().map(|r| json!(r.year)).collect();
    Figure {
        data: vec![Trace::Bar(horizontal_bar(&rows, labels, YEAR_BAR_SCALE))],
        layout: Layout {
            xaxis: Some(Axis::titled(axis_title)),
            yaxis: Some(Axis::years()),
            ..Layout::default()
        },
    }
}

fn location_map(assets: &Assets, kommun: &str) -> Figure {
    let rows = rows_for_year(assets.rows(RentMeasure::Median, Granularity::Kommun), LATEST_YEAR);
    let trace = choropleth_trace(
        assets,
        Granularity::Kommun,
        rows,
        |r| if r.place == kommun { 1.0 } else { 0.0 },
        two_colour_scale("white", "green"),
        Some([0.0, 1.0]),
        false,
    );
    Figure {
        data: vec![Trace::Choroplethmapbox(trace)],
        layout: Layout {
            title: Some(Title {
                text: format!("{}'s Location", kommun),
            }),
            height: Some(475),
            mapbox: Some(Mapbox {
                center: Center { lat: 63.0, lon: 20.0 },
                ..Mapbox::sweden(3.3)
            }),
            margin: Margin { t: 40, ..Margin::default() },
            ..Layout::default()
        },
    }
}

fn comparison_trace(name: &str, rows: &[&RentRow], size: f64, width: f64) -> Trace {
    let values: Vec<f64> = rows.iter().map(|r| r.median_rent_sek).collect();
    Trace::Scatter(ScatterTrace {
        name: name.to_string(),
        x: rows.iter().map(|r| json!(r.year)).collect(),
        y: values.iter().map(|v| json!(v)).collect(),
        mode: "lines+markers",
        marker: SizedMarker {
            size,
            line: Line::outline("DarkSlateGrey", width),
        },
        customdata: cost_data(rows, &values),
        hovertemplate: hover_template(true),
    })
}

fn county_comparison(assets: &Assets, county: &str, members: &[String]) -> Figure {
    fn present<'a>(rows: &'a [RentRow], place: &str) -> Vec<&'a RentRow> {
        let mut out: Vec<&RentRow> = rows
            .iter()
            .filter(|r| r.place == place && !r.is_missing())
            .collect();
        out.sort_by_key(|r| r.year);
        out
    }

    let county_rows = assets.rows(RentMeasure::Median, Granularity::County);
    let kommun_rows = assets.rows(RentMeasure::Median, Granularity::Kommun);

    let mut data = vec![comparison_trace(
        "County Average",
        &present(county_rows, &format!("{} county", county)),
        18.0,
        4.0,
    )];
    let members: HashSet<&str> = members.iter().map(String::as_str).collect();
    let mut seen = HashSet::new();
    for r in kommun_rows.iter().filter(|r| members.contains(r.place.as_str())) {
        if seen.insert(r.place.as_str()) {
            data.push(comparison_trace(&r.place, &present(kommun_rows, &r.place), 12.0, 2.0));
        }
    }

    Figure {
        data,
        layout: Layout {
            xaxis: Some(Axis::titled("")),
            yaxis: Some(Axis::titled("Median Annual Rent per m<sup>2</sup> (SEK)")),
            ..Layout::default()
        },
    }
}

/// Specifics page for one kommun. `None` when the kommun is unknown.
pub fn kommun_specifics(assets: &Assets, kommun: &str) -> Option<Specifics> {
    let county = assets.county_of(kommun)?.to_string();
    let members = assets.county_kommuner.get(&county).cloned().unwrap_or_default();
    let median = assets.rows(RentMeasure::Median, Granularity::Kommun);
    let increase = assets.rows(RentMeasure::Increase, Granularity::Kommun);

    let rank = rent_rank(median, kommun);
    let change = percent_change(median, kommun);
    let key_statistics = match (rank, change) {
        (Some(rank), Some(change)) => vec![
            format!(
                "{} is ranked {} out of {}, for the most expensive municipality to rent in ({} municipalities of {} do not have data available for this year).",
                kommun,
                rank.position,
                rank.ranked,
                rank.without_data,
                rank.ranked + rank.without_data
            ),
            format!(
                "{} municipalities median rent increased by {}% this year.",
                kommun, change
            ),
        ],
        _ => vec![
            "Unfortunately no statistics can be calculated for this Municipality due to missing data."
                .to_string(),
        ],
    };

    Some(Specifics {
        kommun: kommun.to_string(),
        headline: format!("An Overview of {} Municipality", kommun),
        summary: format!(
            "{} is one of {} Municipalities that make up {} County.",
            kommun,
            members.len(),
            county
        ),
        comparison_title: format!(
            "Compare {} to all {} other members of {} county.",
            kommun,
            members.len().saturating_sub(1),
            county
        ),
        info_text: assets.info_texts.get(kommun).cloned(),
        info_url: assets.info_urls.get(kommun).cloned(),
        rank,
        percent_change: change,
        key_statistics,
        location_map: location_map(assets, kommun),
        county_comparison: county_comparison(assets, &county, &members),
        median_bar: year_bar(median, kommun, "Median Annual Rent per square meter (SEK)"),
        increase_bar: year_bar(
            increase,
            kommun,
            "Median Annual Increase in Rent per square meter (SEK)",
        ),
        kommuner_in_county: members.len(),
        county,
    })
}
