//! Statistical analysis performer
//!
//! `analyze_data` picks one of three analyses from the record shape: feedback
//! (records carry `feedback`), sales (records carry `product_id`) or generic
//! (`value` / `category`). The other tasks work from the same record format or
//! from a previous analysis.

use async_trait::async_trait;
use sdk::errors::EngineError;
use sdk::performer::{unsupported, TaskPerformer};
use sdk::types::AgentKind;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

use super::{number, records, timestamp};

/// Absolute z-score at which a value counts as an anomaly
const ANOMALY_Z_SCORE: f64 = 2.0;

/// Fields inspected for anomalies, in order of preference
const ANOMALY_FIELDS: [&str; 3] = ["value", "rating", "quantity"];

const TOPICS: [(&str, &[&str]); 5] = [
    (
        "Product Quality",
        &["quality", "product", "good", "great", "excellent", "poor"],
    ),
    (
        "Customer Service",
        &["service", "customer", "support", "help", "responsive"],
    ),
    ("Pricing", &["price", "expensive", "cheap", "cost", "worth"]),
    (
        "Delivery",
        &["delivery", "shipping", "late", "fast", "quick", "delay"],
    ),
    (
        "User Experience",
        &["website", "app", "navigate", "easy", "difficult", "interface"],
    ),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataShape {
    Feedback,
    Sales,
    Generic,
}

impl DataShape {
    pub fn detect(data: &[Value]) -> Self {
        let has = |field: &str| data.iter().any(|record| record.get(field).is_some());
        if has("feedback") {
            DataShape::Feedback
        } else if has("product_id") {
            DataShape::Sales
        } else {
            DataShape::Generic
        }
    }
}

#[derive(Debug, Default)]
pub struct StatisticalAnalysisPerformer;

impl StatisticalAnalysisPerformer {
    pub fn new() -> Self {
        Self
    }

    fn analyze_data(&self, input: &Value) -> Value {
        let data = records(input);
        tracing::info!("Analyzing data with {} records", data.len());

        let shape = DataShape::detect(data);
        let analysis_results = match shape {
            DataShape::Feedback => analyze_feedback(data),
            DataShape::Sales => analyze_sales(data),
            DataShape::Generic => analyze_generic(data),
        };
        tracing::debug!("Selected {:?} analysis", shape);

        json!({
            "analysis_results": analysis_results,
            "metadata": {
                "source_metadata": input.get("metadata").cloned().unwrap_or_else(|| json!({})),
                "analysis_timestamp": timestamp(),
                "analysis_methods": ["descriptive_statistics", "trend_analysis", "pattern_recognition"],
            },
        })
    }

    fn detect_anomalies(&self, input: &Value) -> Value {
        let data = records(input);
        tracing::info!("Detecting anomalies in {} records", data.len());

        let field = ANOMALY_FIELDS
            .iter()
            .copied()
            .find(|field| data.iter().any(|r| r.get(*field).is_some_and(Value::is_number)));

        let mut anomalies = Vec::new();
        if let Some(field) = field {
            let measured: Vec<(&Value, f64)> = data
                .iter()
                .filter_map(|r| r.get(field).and_then(Value::as_f64).map(|v| (r, v)))
                .collect();
            let values: Vec<f64> = measured.iter().map(|(_, v)| *v).collect();
            let (mean, std_dev) = mean_and_std_dev(&values);

            if std_dev > 0.0 {
                for (record, value) in measured {
                    let z_score = (value - mean) / std_dev;
                    if z_score.abs() >= ANOMALY_Z_SCORE {
                        let direction = if z_score > 0.0 { "above" } else { "below" };
                        anomalies.push(json!({
                            "item": record,
                            "field": field,
                            "z_score": round2(z_score),
                            "reason": format!(
                                "{} is {:.2} standard deviations {} the mean",
                                field,
                                z_score.abs(),
                                direction
                            ),
                        }));
                    }
                }
            }
        }

        let percentage = if data.is_empty() {
            0.0
        } else {
            anomalies.len() as f64 / data.len() as f64
        };
        json!({
            "anomaly_count": anomalies.len(),
            "anomalies": anomalies,
            "total_items": data.len(),
            "anomaly_percentage": percentage,
        })
    }

    fn generate_insights(&self, input: &Value) -> Value {
        tracing::info!("Generating insights from analysis results");

        let empty = Map::new();
        let results = input
            .get("analysis_results")
            .and_then(Value::as_object)
            .unwrap_or(&empty);

        let insights = if results.contains_key("sentiment_distribution") {
            feedback_insights(results)
        } else if results.contains_key("sales_by_region") {
            sales_insights(results)
        } else {
            generic_insights(results)
        };

        // Fixed per importance so repeated runs agree
        let confidence_scores: Map<String, Value> = insights
            .iter()
            .map(|insight| {
                let score = match insight.importance {
                    "high" => 0.9,
                    _ => 0.8,
                };
                (insight.title.to_string(), json!(score))
            })
            .collect();

        let insights: Vec<Value> = insights
            .iter()
            .map(|insight| {
                json!({
                    "title": insight.title,
                    "description": insight.description,
                    "importance": insight.importance,
                })
            })
            .collect();

        json!({
            "insights": insights,
            "confidence_scores": confidence_scores,
            "generation_timestamp": timestamp(),
        })
    }

    fn cluster_topics(&self, input: &Value) -> Value {
        tracing::info!("Clustering text data into topics");

        let texts: Vec<&str> = records(input)
            .iter()
            .filter_map(|record| record.get("feedback").and_then(Value::as_str))
            .collect();

        let assignments: Vec<Value> = texts
            .iter()
            .enumerate()
            .map(|(document_id, text)| {
                let (topic, hits) = assign_topic(text);
                json!({
                    "document_id": document_id,
                    "text": text,
                    "assigned_topic": topic,
                    "keyword_hits": hits,
                })
            })
            .collect();

        let mut distribution = Map::new();
        for (name, _) in TOPICS {
            let count = assignments
                .iter()
                .filter(|a| a["assigned_topic"] == name)
                .count();
            distribution.insert(name.to_string(), json!(count));
        }

        let topics: Vec<Value> = TOPICS
            .iter()
            .map(|(name, keywords)| json!({"name": name, "keywords": keywords}))
            .collect();

        json!({
            "topics": topics,
            "assignments": assignments,
            "topic_distribution": distribution,
        })
    }
}

#[async_trait]
impl TaskPerformer for StatisticalAnalysisPerformer {
    fn kind(&self) -> AgentKind {
        AgentKind::StatisticalAnalysis
    }

    fn supported_tasks(&self) -> &[&'static str] {
        &[
            "analyze_data",
            "detect_anomalies",
            "generate_insights",
            "cluster_topics",
        ]
    }

    async fn execute(&self, task: &str, input: &Value) -> Result<Value, EngineError> {
        match task {
            "analyze_data" => Ok(self.analyze_data(input)),
            "detect_anomalies" => Ok(self.detect_anomalies(input)),
            "generate_insights" => Ok(self.generate_insights(input)),
            "cluster_topics" => Ok(self.cluster_topics(input)),
            other => Err(unsupported(&self.kind(), other)),
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Population mean and standard deviation
fn mean_and_std_dev(values: &[f64]) -> (f64, f64) {
    let mean = mean(values);
    let variance = if values.is_empty() {
        0.0
    } else {
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64
    };
    (mean, variance.sqrt())
}

fn text_field<'a>(record: &'a Value, field: &str) -> &'a str {
    record.get(field).and_then(Value::as_str).unwrap_or("unknown")
}

/// Group records by a string field, keys sorted
fn group_by<'a>(data: &'a [Value], field: &str) -> BTreeMap<&'a str, Vec<&'a Value>> {
    let mut groups: BTreeMap<&str, Vec<&Value>> = BTreeMap::new();
    for record in data {
        groups.entry(text_field(record, field)).or_default().push(record);
    }
    groups
}

fn revenue(record: &Value) -> f64 {
    number(record, "quantity") * number(record, "price")
}

fn revenue_by(data: &[Value], field: &str) -> Map<String, Value> {
    group_by(data, field)
        .into_iter()
        .map(|(key, items)| {
            let total: f64 = items.iter().map(|r| revenue(r)).sum();
            (key.to_string(), json!(round2(total)))
        })
        .collect()
}

fn analyze_feedback(data: &[Value]) -> Value {
    let ratings: Vec<f64> = data.iter().map(|r| number(r, "rating")).collect();
    let share = |predicate: fn(f64) -> bool| {
        if ratings.is_empty() {
            0.0
        } else {
            ratings.iter().filter(|r| predicate(**r)).count() as f64 / ratings.len() as f64
        }
    };

    let rating_trend: Map<String, Value> = group_by(data, "date")
        .into_iter()
        .map(|(date, items)| {
            let ratings: Vec<f64> = items.iter().map(|r| number(r, "rating")).collect();
            (date.to_string(), json!(mean(&ratings)))
        })
        .collect();

    json!({
        "sentiment_distribution": {
            "positive": share(|r| r >= 3.5),
            "neutral": share(|r| (2.5..3.5).contains(&r)),
            "negative": share(|r| r < 2.5),
        },
        "average_rating": mean(&ratings),
        "rating_trend": rating_trend,
        "sample_size": data.len(),
    })
}

fn analyze_sales(data: &[Value]) -> Value {
    let total: f64 = data.iter().map(revenue).sum();
    json!({
        "total_sales": round2(total),
        "sales_by_product": revenue_by(data, "product_id"),
        "sales_by_region": revenue_by(data, "region"),
        "sales_trend": revenue_by(data, "date"),
        "sample_size": data.len(),
    })
}

fn analyze_generic(data: &[Value]) -> Value {
    let values: Vec<f64> = data
        .iter()
        .filter_map(|r| r.get("value").and_then(Value::as_f64))
        .collect();
    let (min, max) = min_max(&values);

    let categorized: Vec<Value> = data
        .iter()
        .filter(|r| r.get("category").is_some())
        .cloned()
        .collect();
    let mut category_statistics = Map::new();
    for (category, items) in group_by(&categorized, "category") {
        let values: Vec<f64> = items.iter().map(|r| number(r, "value")).collect();
        let (min, max) = min_max(&values);
        category_statistics.insert(
            category.to_string(),
            json!({
                "count": items.len(),
                "avg_value": mean(&values),
                "min_value": min,
                "max_value": max,
            }),
        );
    }

    json!({
        "average_value": mean(&values),
        "min_value": min,
        "max_value": max,
        "value_range": max - min,
        "category_statistics": category_statistics,
        "sample_size": data.len(),
    })
}

fn min_max(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(*v), hi.max(*v))
        })
}

struct Insight {
    title: &'static str,
    description: String,
    importance: &'static str,
}

impl Insight {
    fn high(title: &'static str, description: String) -> Self {
        Self {
            title,
            description,
            importance: "high",
        }
    }

    fn medium(title: &'static str, description: String) -> Self {
        Self {
            title,
            description,
            importance: "medium",
        }
    }
}

fn field_f64(results: &Map<String, Value>, key: &str) -> f64 {
    results.get(key).and_then(Value::as_f64).unwrap_or(0.0)
}

/// Numeric entries of an object field
fn numeric_entries<'a>(results: &'a Map<String, Value>, key: &str) -> Vec<(&'a str, f64)> {
    results
        .get(key)
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| v.as_f64().map(|v| (k.as_str(), v)))
                .collect()
        })
        .unwrap_or_default()
}

/// First and last entries of a date-keyed series, by sorted key
fn series_ends<'a>(results: &'a Map<String, Value>, key: &str) -> Option<((&'a str, f64), (&'a str, f64))> {
    let mut entries = numeric_entries(results, key);
    if entries.len() < 2 {
        return None;
    }
    entries.sort_by(|a, b| a.0.cmp(b.0));
    Some((entries[0], entries[entries.len() - 1]))
}

fn max_entry<'a>(entries: &[(&'a str, f64)]) -> Option<(&'a str, f64)> {
    entries
        .iter()
        .copied()
        .fold(None, |best, entry| match best {
            Some(b) if b.1 >= entry.1 => Some(b),
            _ => Some(entry),
        })
}

fn min_entry<'a>(entries: &[(&'a str, f64)]) -> Option<(&'a str, f64)> {
    entries
        .iter()
        .copied()
        .fold(None, |best, entry| match best {
            Some(b) if b.1 <= entry.1 => Some(b),
            _ => Some(entry),
        })
}

fn feedback_insights(results: &Map<String, Value>) -> Vec<Insight> {
    let average = field_f64(results, "average_rating");
    let mut insights = vec![Insight::high(
        "Overall Customer Satisfaction",
        format!("The overall customer satisfaction rating is {:.2}/5.0.", average),
    )];

    let distribution = results
        .get("sentiment_distribution")
        .and_then(Value::as_object);
    let share = |key: &str| {
        distribution
            .and_then(|d| d.get(key))
            .and_then(Value::as_f64)
            .unwrap_or(0.0)
    };
    let (positive, negative) = (share("positive"), share("negative"));

    if positive > 0.7 {
        insights.push(Insight::high(
            "Strong Positive Sentiment",
            format!(
                "Customer feedback is predominantly positive ({:.1}%), indicating strong product satisfaction.",
                positive * 100.0
            ),
        ));
    } else if negative > 0.3 {
        insights.push(Insight::high(
            "Concerning Negative Sentiment",
            format!(
                "A significant portion of feedback ({:.1}%) is negative, suggesting areas for improvement.",
                negative * 100.0
            ),
        ));
    }

    if let Some(((_, first), (_, last))) = series_ends(results, "rating_trend") {
        let change = last - first;
        if change.abs() >= 0.5 {
            let direction = if change > 0.0 { "improved" } else { "declined" };
            insights.push(Insight::medium(
                "Sentiment Trend",
                format!(
                    "Customer satisfaction has {} by {:.2} points over the analyzed period.",
                    direction,
                    change.abs()
                ),
            ));
        }
    }

    insights
}

fn sales_insights(results: &Map<String, Value>) -> Vec<Insight> {
    let total = field_f64(results, "total_sales");
    let mut insights = vec![Insight::high(
        "Total Sales Performance",
        format!("Total sales for the period amount to ${:.2}.", total),
    )];

    if let Some((product, amount)) = max_entry(&numeric_entries(results, "sales_by_product")) {
        let contribution = if total > 0.0 { amount / total * 100.0 } else { 0.0 };
        insights.push(Insight::high(
            "Top Performing Product",
            format!(
                "Product {} is the top performer, contributing ${:.2} ({:.1}%) to total sales.",
                product, amount, contribution
            ),
        ));
    }

    let regions = numeric_entries(results, "sales_by_region");
    if let (Some(top), Some(bottom)) = (max_entry(&regions), min_entry(&regions)) {
        insights.push(Insight::medium(
            "Regional Performance Variance",
            format!(
                "The {} region leads with ${:.2} in sales, while the {} region has the lowest at ${:.2}.",
                top.0, top.1, bottom.0, bottom.1
            ),
        ));
    }

    if let Some(((first_date, first), (last_date, last))) = series_ends(results, "sales_trend") {
        let change_pct = if first != 0.0 {
            (last - first) / first * 100.0
        } else {
            0.0
        };
        if change_pct.abs() >= 5.0 {
            let direction = if change_pct > 0.0 { "increased" } else { "decreased" };
            insights.push(Insight::high(
                "Sales Trend",
                format!(
                    "Sales have {} by {:.1}% from {} to {}.",
                    direction,
                    change_pct.abs(),
                    first_date,
                    last_date
                ),
            ));
        }
    }

    insights
}

fn generic_insights(results: &Map<String, Value>) -> Vec<Insight> {
    let mut insights = vec![Insight::medium(
        "Data Overview",
        format!(
            "The average value across all data points is {:.2}, with a range of {:.2}.",
            field_f64(results, "average_value"),
            field_f64(results, "value_range")
        ),
    )];

    let averages: Vec<(&str, f64)> = results
        .get("category_statistics")
        .and_then(Value::as_object)
        .map(|stats| {
            stats
                .iter()
                .map(|(category, s)| {
                    (
                        category.as_str(),
                        s.get("avg_value").and_then(Value::as_f64).unwrap_or(0.0),
                    )
                })
                .collect()
        })
        .unwrap_or_default();

    if averages.len() >= 2 {
        if let (Some(top), Some(bottom)) = (max_entry(&averages), min_entry(&averages)) {
            insights.push(Insight::medium(
                "Category Comparison",
                format!(
                    "Category {} has the highest average value at {:.2}, while category {} has the lowest at {:.2}.",
                    top.0, top.1, bottom.0, bottom.1
                ),
            ));
        }
    }

    insights
}

/// Topic with the most keyword hits, ties to the earlier topic
fn assign_topic(text: &str) -> (&'static str, usize) {
    let lowered = text.to_lowercase();
    let mut best = (TOPICS[0].0, 0);
    for (index, (name, keywords)) in TOPICS.iter().enumerate() {
        let hits = keywords.iter().filter(|k| lowered.contains(*k)).count();
        if index == 0 || hits > best.1 {
            best = (*name, hits);
        }
    }
    best
}
