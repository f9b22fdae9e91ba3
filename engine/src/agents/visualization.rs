//! Visualization performer
//!
//! Turns analysis results into chart descriptors, lays charts out on a
//! dashboard grid and exports a sectioned report.

use async_trait::async_trait;
use sdk::errors::EngineError;
use sdk::performer::{unsupported, TaskPerformer};
use sdk::types::AgentKind;
use serde::Serialize;
use serde_json::{json, Map, Value};

use super::timestamp;

/// Dashboard grid columns
const GRID_COLUMNS: usize = 2;
/// Width and height of one dashboard panel
const PANEL_SIZE: usize = 6;

const SENTIMENT_COLORS: [&str; 3] = ["#90EE90", "#FFCC00", "#FF6666"];

/// One chart descriptor
#[derive(Debug, Clone, Serialize)]
pub struct Chart {
    pub id: &'static str,
    pub title: &'static str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub description: &'static str,
    pub data: Value,
}

#[derive(Debug, Default)]
pub struct VisualizationPerformer;

impl VisualizationPerformer {
    pub fn new() -> Self {
        Self
    }

    fn create_visualizations(&self, input: &Value) -> Result<Value, EngineError> {
        tracing::info!("Creating visualizations for analysis results");

        let empty = Map::new();
        let results = input
            .get("analysis_results")
            .and_then(Value::as_object)
            .unwrap_or(&empty);

        let charts = if results.contains_key("sentiment_distribution") {
            feedback_charts(results)
        } else if results.contains_key("sales_by_region") {
            sales_charts(results)
        } else {
            generic_charts(results)
        };
        let types: Vec<&str> = charts.iter().map(|chart| chart.kind).collect();

        Ok(json!({
            "visualizations": serde_json::to_value(&charts)?,
            "metadata": {
                "source_metadata": source_metadata(input),
                "visualization_timestamp": timestamp(),
                "visualization_types": types,
            },
        }))
    }

    fn generate_dashboard(&self, input: &Value) -> Value {
        let visualizations = visualizations(input);
        tracing::info!(
            "Generating dashboard with {} visualizations",
            visualizations.len()
        );

        let panels: Vec<Value> = visualizations
            .iter()
            .enumerate()
            .map(|(i, viz)| {
                json!({
                    "id": format!("panel-{}", i + 1),
                    "title": title_or_default(viz, i),
                    "type": viz.get("type").and_then(Value::as_str).unwrap_or("chart"),
                    "visualization_id": viz.get("id").cloned().unwrap_or(Value::Null),
                    "position": {
                        "x": (i % GRID_COLUMNS) * PANEL_SIZE,
                        "y": (i / GRID_COLUMNS) * PANEL_SIZE,
                        "w": PANEL_SIZE,
                        "h": PANEL_SIZE,
                    },
                })
            })
            .collect();
        let panel_count = panels.len();

        json!({
            "dashboard": {
                "title": "Data Analysis Dashboard",
                "layout": "grid",
                "panels": panels,
            },
            "visualizations": visualizations,
            "metadata": {
                "source_metadata": source_metadata(input),
                "dashboard_timestamp": timestamp(),
                "panel_count": panel_count,
            },
        })
    }

    fn export_report(&self, input: &Value) -> Value {
        tracing::info!("Exporting report from dashboard");

        let mut sections = vec![json!({
            "title": "Executive Summary",
            "content": "This report presents the analysis of the provided data.",
        })];
        sections.extend(visualizations(input).iter().enumerate().map(|(i, viz)| {
            json!({
                "title": title_or_default(viz, i),
                "content": viz.get("description").and_then(Value::as_str).unwrap_or_default(),
                "visualization_id": viz.get("id").cloned().unwrap_or(Value::Null),
            })
        }));
        let section_count = sections.len();

        json!({
            "report": {
                "title": "Data Analysis Report",
                "sections": sections,
            },
            "format": "json",
            "metadata": {
                "source_metadata": source_metadata(input),
                "export_timestamp": timestamp(),
                "section_count": section_count,
            },
        })
    }
}

#[async_trait]
impl TaskPerformer for VisualizationPerformer {
    fn kind(&self) -> AgentKind {
        AgentKind::Visualization
    }

    fn supported_tasks(&self) -> &[&'static str] {
        &["create_visualizations", "generate_dashboard", "export_report"]
    }

    async fn execute(&self, task: &str, input: &Value) -> Result<Value, EngineError> {
        match task {
            "create_visualizations" => self.create_visualizations(input),
            "generate_dashboard" => Ok(self.generate_dashboard(input)),
            "export_report" => Ok(self.export_report(input)),
            other => Err(unsupported(&self.kind(), other)),
        }
    }
}

fn source_metadata(input: &Value) -> Value {
    input.get("metadata").cloned().unwrap_or_else(|| json!({}))
}

fn visualizations(input: &Value) -> &[Value] {
    input
        .get("visualizations")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

fn title_or_default(viz: &Value, index: usize) -> String {
    viz.get("title")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("Visualization {}", index + 1))
}

fn as_number(value: Option<&Value>) -> f64 {
    value.and_then(Value::as_f64).unwrap_or(0.0)
}

/// Keys and values of an object field, keys sorted
fn sorted_series(results: &Map<String, Value>, key: &str) -> (Vec<String>, Vec<f64>) {
    let mut entries: Vec<(String, f64)> = results
        .get(key)
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .map(|(k, v)| (k.clone(), v.as_f64().unwrap_or(0.0)))
                .collect()
        })
        .unwrap_or_default();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    entries.into_iter().unzip()
}

fn feedback_charts(results: &Map<String, Value>) -> Vec<Chart> {
    let mut charts = Vec::new();

    if let Some(distribution) = results.get("sentiment_distribution") {
        let values: Vec<f64> = ["positive", "neutral", "negative"]
            .iter()
            .map(|key| as_number(distribution.get(*key)) * 100.0)
            .collect();
        charts.push(Chart {
            id: "viz-sentiment-dist",
            title: "Sentiment Distribution",
            kind: "pie_chart",
            description: "Distribution of customer sentiment based on feedback ratings.",
            data: json!({
                "labels": ["Positive", "Neutral", "Negative"],
                "values": values,
                "colors": SENTIMENT_COLORS,
            }),
        });
    }

    if results.contains_key("rating_trend") {
        let (dates, ratings) = sorted_series(results, "rating_trend");
        charts.push(Chart {
            id: "viz-rating-trend",
            title: "Rating Trend Over Time",
            kind: "line_chart",
            description: "Trend of average customer ratings over time.",
            data: json!({
                "x": dates,
                "y": ratings,
                "x_label": "Date",
                "y_label": "Average Rating",
            }),
        });
    }

    charts
}

fn sales_charts(results: &Map<String, Value>) -> Vec<Chart> {
    let mut charts = Vec::new();

    if results.contains_key("sales_by_product") {
        let (products, sales) = sorted_series(results, "sales_by_product");
        charts.push(Chart {
            id: "viz-sales-by-product",
            title: "Sales by Product",
            kind: "bar_chart",
            description: "Comparison of sales performance across different products.",
            data: json!({
                "x": products,
                "y": sales,
                "x_label": "Product",
                "y_label": "Sales ($)",
            }),
        });
    }

    let (regions, sales) = sorted_series(results, "sales_by_region");
    charts.push(Chart {
        id: "viz-sales-by-region",
        title: "Sales by Region",
        kind: "map",
        description: "Geographical distribution of sales across regions.",
        data: json!({
            "regions": regions,
            "values": sales,
            "color_scale": "Blues",
        }),
    });

    if results.contains_key("sales_trend") {
        let (dates, sales) = sorted_series(results, "sales_trend");
        charts.push(Chart {
            id: "viz-sales-trend",
            title: "Sales Trend Over Time",
            kind: "line_chart",
            description: "Trend of sales performance over time.",
            data: json!({
                "x": dates,
                "y": sales,
                "x_label": "Date",
                "y_label": "Sales ($)",
            }),
        });
    }

    charts
}

fn generic_charts(results: &Map<String, Value>) -> Vec<Chart> {
    let measures: Vec<f64> = ["average_value", "min_value", "max_value", "value_range"]
        .iter()
        .map(|key| as_number(results.get(*key)))
        .collect();
    let mut charts = vec![Chart {
        id: "viz-basic-stats",
        title: "Basic Statistics",
        kind: "bar_chart",
        description: "Overview of basic statistical measures.",
        data: json!({
            "x": ["Average", "Minimum", "Maximum", "Range"],
            "y": measures,
            "x_label": "Measure",
            "y_label": "Value",
        }),
    }];

    if let Some(stats) = results
        .get("category_statistics")
        .and_then(Value::as_object)
        .filter(|stats| !stats.is_empty())
    {
        let categories: Vec<&str> = stats.keys().map(String::as_str).collect();
        let averages: Vec<f64> = stats
            .values()
            .map(|s| as_number(s.get("avg_value")))
            .collect();
        charts.push(Chart {
            id: "viz-category-comparison",
            title: "Category Comparison",
            kind: "bar_chart",
            description: "Comparison of average values across different categories.",
            data: json!({
                "x": categories,
                "y": averages,
                "x_label": "Category",
                "y_label": "Average Value",
            }),
        });
    }

    charts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{DataExtractionPerformer, StatisticalAnalysisPerformer};

    async fn analysis(source: &str) -> Value {
        let extracted = DataExtractionPerformer::new()
            .execute("extract_data", &json!({"data_source": source}))
            .await
            .unwrap();
        StatisticalAnalysisPerformer::new()
            .execute("analyze_data", &extracted)
            .await
            .unwrap()
    }

    async fn run(task: &str, input: &Value) -> Value {
        VisualizationPerformer::new().execute(task, input).await.unwrap()
    }

    fn ids(output: &Value) -> Vec<&str> {
        output["visualizations"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v["id"].as_str().unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_feedback_visualizations() {
        let output = run("create_visualizations", &analysis("customer feedback").await).await;

        assert_eq!(ids(&output), vec!["viz-sentiment-dist", "viz-rating-trend"]);
        let pie = &output["visualizations"][0];
        assert_eq!(pie["type"], "pie_chart");
        assert_eq!(pie["data"]["values"][0], 50.0);
        assert_eq!(pie["data"]["colors"][2], "#FF6666");

        let line = &output["visualizations"][1];
        assert_eq!(line["data"]["x"][0], "2023-01-15");
        assert_eq!(line["data"]["x"].as_array().unwrap().len(), 10);

        let types = &output["metadata"]["visualization_types"];
        assert_eq!(types, &json!(["pie_chart", "line_chart"]));
        assert!(output["metadata"]["source_metadata"]["analysis_methods"].is_array());
    }

    #[tokio::test]
    async fn test_sales_visualizations() {
        let output = run("create_visualizations", &analysis("sales").await).await;
        assert_eq!(
            ids(&output),
            vec!["viz-sales-by-product", "viz-sales-by-region", "viz-sales-trend"]
        );
        assert_eq!(output["visualizations"][1]["type"], "map");
        assert_eq!(output["visualizations"][1]["data"]["regions"][0], "East");
    }

    #[tokio::test]
    async fn test_generic_visualizations() {
        let output = run("create_visualizations", &analysis("telemetry").await).await;
        assert_eq!(ids(&output), vec!["viz-basic-stats", "viz-category-comparison"]);
        assert_eq!(output["visualizations"][0]["data"]["y"][3], 90.0);

        let bare = run("create_visualizations", &json!({})).await;
        assert_eq!(ids(&bare), vec!["viz-basic-stats"]);
    }

    #[tokio::test]
    async fn test_every_chart_has_required_fields() {
        for source in ["customer feedback", "sales", "telemetry"] {
            let output = run("create_visualizations", &analysis(source).await).await;
            for viz in output["visualizations"].as_array().unwrap() {
                for field in ["id", "title", "type", "description", "data"] {
                    assert!(viz.get(field).is_some(), "{} missing {}", source, field);
                }
            }
        }
    }

    #[tokio::test]
    async fn test_dashboard_grid() {
        let charts = run("create_visualizations", &analysis("sales").await).await;
        let output = run("generate_dashboard", &charts).await;

        let panels = output["dashboard"]["panels"].as_array().unwrap();
        assert_eq!(panels.len(), 3);
        assert_eq!(panels[1]["position"], json!({"x": 6, "y": 0, "w": 6, "h": 6}));
        assert_eq!(panels[2]["position"]["x"], 0);
        assert_eq!(panels[2]["position"]["y"], 6);
        assert_eq!(panels[2]["visualization_id"], "viz-sales-trend");
        assert_eq!(output["metadata"]["panel_count"], 3);
    }

    #[tokio::test]
    async fn test_export_report() {
        let charts = run("create_visualizations", &analysis("customer feedback").await).await;
        let dashboard = run("generate_dashboard", &charts).await;
        let output = run("export_report", &dashboard).await;

        let sections = output["report"]["sections"].as_array().unwrap();
        assert_eq!(sections[0]["title"], "Executive Summary");
        assert_eq!(sections[1]["visualization_id"], "viz-sentiment-dist");
        assert_eq!(output["format"], "json");
        assert_eq!(output["metadata"]["section_count"], 3);
    }

    #[tokio::test]
    async fn test_untitled_visualization_gets_default_title() {
        let output = run("export_report", &json!({"visualizations": [{"id": "v"}]})).await;
        assert_eq!(output["report"]["sections"][1]["title"], "Visualization 1");
        assert_eq!(output["report"]["sections"][1]["content"], "");
    }
}
