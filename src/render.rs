use serde::Serialize;
use serde_json::Value;

pub const RENT_SCALE: &str = "YlGnBu";
pub const YEAR_BAR_SCALE: &str = "Blues";

/// One colour per dashboard year, 2016 first.
pub const VIOLIN_COLORS: [&str; 6] = [
    "lightseagreen",
    "green",
    "goldenrod",
    "magenta",
    "mediumpurple",
    "red",
];

pub const SWEDEN_CENTER: Center = Center { lat: 62.90, lon: 16.00 };

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Figure {
    pub data: Vec<Trace>,
    pub layout: Layout,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Trace {
    Bar(BarTrace),
    Choroplethmapbox(ChoroplethTrace),
    Violin(ViolinTrace),
    Scatter(ScatterTrace),
}

/// Continuous colour mapping attached to markers.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ColorMarker {
    pub color: Vec<f64>,
    pub colorscale: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cmin: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cmax: Option<f64>,
    pub showscale: bool,
    pub opacity: f64,
    pub line: Line,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Line {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dash: Option<String>,
}

impl Line {
    pub fn outline(color: &str, width: f64) -> Self {
        Line {
            color: Some(color.to_string()),
            width: Some(width),
            dash: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BarTrace {
    pub x: Vec<Value>,
    pub y: Vec<Value>,
    pub orientation: &'static str,
    pub marker: ColorMarker,
    pub customdata: Vec<Vec<Value>>,
    pub hovertemplate: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChoroplethTrace {
    /// URL of the boundary FeatureCollection.
    pub geojson: String,
    pub featureidkey: &'static str,
    pub locations: Vec<u64>,
    pub z: Vec<f64>,
    pub colorscale: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zmin: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zmax: Option<f64>,
    pub showscale: bool,
    pub marker: Opacity,
    pub customdata: Vec<Vec<Value>>,
    pub hovertemplate: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Opacity {
    pub opacity: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ViolinTrace {
    pub name: String,
    pub x: Vec<u16>,
    pub y: Vec<f64>,
    pub line: Line,
    pub points: &'static str,
    pub jitter: f64,
    pub scalemode: &'static str,
    pub hoveron: &'static str,
    #[serde(rename = "box")]
    pub box_: Visibility,
    pub meanline: Visibility,
    pub customdata: Vec<Vec<Value>>,
    pub hovertemplate: String,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct Visibility {
    pub visible: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ScatterTrace {
    pub name: String,
    pub x: Vec<Value>,
    pub y: Vec<Value>,
    pub mode: &'static str,
    pub marker: SizedMarker,
    pub customdata: Vec<Vec<Value>>,
    pub hovertemplate: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SizedMarker {
    pub size: f64,
    pub line: Line,
}

#[derive(Debug, Clone, Serialize, PartialEq, Default)]
pub struct Layout {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<Title>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xaxis: Option<Axis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub yaxis: Option<Axis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapbox: Option<Mapbox>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub shapes: Vec<Shape>,
    pub margin: Margin,
}

#[derive(Debug, Clone, Serialize, PartialEq, Default)]
pub struct Title {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Default)]
pub struct Axis {
    pub title: Title,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<[f64; 2]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tickmode: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tickvals: Option<Vec<u16>>,
}

impl Axis {
    pub fn titled(text: &str) -> Self {
        Axis {
            title: Title {
                text: text.to_string(),
            },
            ..Default::default()
        }
    }

    /// One tick per dashboard year.
    pub fn years() -> Self {
        Axis {
            tickmode: Some("array"),
            tickvals: Some(crate::types::YEARS.to_vec()),
            ..Axis::titled("")
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct Center {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Mapbox {
    pub style: &'static str,
    pub center: Center,
    pub zoom: f64,
}

impl Mapbox {
    pub fn sweden(zoom: f64) -> Self {
        Mapbox {
            style: "white-bg",
            center: SWEDEN_CENTER,
            zoom,
        }
    }
}

/// Straight line across the plot, in paper coordinates along x.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Shape {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub xref: &'static str,
    pub x0: f64,
    pub x1: f64,
    pub y0: f64,
    pub y1: f64,
    pub line: Line,
}

impl Shape {
    pub fn hline(y: f64) -> Self {
        Shape {
            kind: "line",
            xref: "paper",
            x0: 0.0,
            x1: 1.0,
            y0: y,
            y1: y,
            line: Line {
                color: Some("black".to_string()),
                width: Some(3.0),
                dash: Some("dash".to_string()),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct Margin {
    pub r: u32,
    pub t: u32,
    pub l: u32,
    pub b: u32,
}

impl Default for Margin {
    fn default() -> Self {
        Margin { r: 0, t: 30, l: 0, b: 0 }
    }
}

pub fn named_scale(name: &str) -> Value {
    Value::String(name.to_string())
}

/// Two-colour scale from `low` at 0 to `high` at 1.
pub fn two_colour_scale(low: &str, high: &str) -> Value {
    serde_json::json!([[0.0, low], [1.0, high]])
}

/// Hover text: bold title then the label in `customdata[1]`.
pub fn hover_template(with_label: bool) -> String {
    if with_label {
        "<b>%{customdata[0]} </b><br><br>%{customdata[1]}<extra></extra>".to_string()
    } else {
        "<b>%{customdata[0]} </b><extra></extra>".to_string()
    }
}

pub fn cost_label(value: f64) -> String {
    format!("Median Cost: {} SEK", value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn traces_serialize_with_plotly_type_tag() {
        let trace = Trace::Scatter(ScatterTrace {
            name: "Stockholm".to_string(),
            x: vec![json!(1200.0)],
            y: vec![json!(2016)],
            mode: "lines+markers",
            marker: SizedMarker {
                size: 12.0,
                line: Line::outline("DarkSlateGrey", 2.0),
            },
            customdata: vec![vec![json!("Stockholm"), json!("Median Cost: 1200 SEK")]],
            hovertemplate: hover_template(true),
        });
        let value = serde_json::to_value(&trace).unwrap();
        assert_eq!(value["type"], "scatter");
        assert_eq!(value["marker"]["line"]["width"], 2.0);
        assert!(value["marker"]["line"].get("dash").is_none());
    }

    #[test]
    fn violin_nests_box_and_meanline_visibility() {
        let trace = Trace::Violin(ViolinTrace {
            name: "2016".to_string(),
            x: vec![2016],
            y: vec![21.5],
            line: Line::outline("red", 1.0),
            points: "all",
            jitter: 0.4,
            scalemode: "count",
            hoveron: "points",
            box_: Visibility { visible: false },
            meanline: Visibility { visible: true },
            customdata: vec![vec![json!("Täby"), json!("Median Cost: 21.5 SEK")]],
            hovertemplate: hover_template(true),
        });
        let value = serde_json::to_value(&trace).unwrap();
        assert_eq!(value["type"], "violin");
        assert_eq!(value["box"], json!({"visible": false}));
        assert_eq!(value["meanline"], json!({"visible": true}));
        assert!(value.get("box_visible").is_none());
        assert!(value.get("meanline_visible").is_none());
    }

    #[test]
    fn layout_omits_unset_sections() {
        let value = serde_json::to_value(Layout::default()).unwrap();
        assert_eq!(value, json!({"margin": {"r": 0, "t": 30, "l": 0, "b": 0}}));
    }

    #[test]
    fn year_axis_ticks_every_year() {
        let value = serde_json::to_value(Axis::years()).unwrap();
        assert_eq!(value["tickvals"], json!([2016, 2017, 2018, 2019, 2020, 2021]));
        assert_eq!(value["tickmode"], "array");
    }
}
