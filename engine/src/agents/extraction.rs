//! Data extraction performer
//!
//! Produces sample records for a named data source. Sources mentioning
//! "customer feedback" yield rated feedback, "sales" yields order lines, and
//! anything else yields generic categorized values.

use async_trait::async_trait;
use sdk::errors::EngineError;
use sdk::performer::{unsupported, TaskPerformer};
use sdk::types::AgentKind;
use serde_json::{json, Value};

use super::{records, timestamp};

const DEFAULT_SOURCE: &str = "sample_data";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    CustomerFeedback,
    Sales,
    Generic,
}

impl SourceKind {
    pub fn classify(data_source: &str) -> Self {
        let lowered = data_source.to_lowercase();
        if lowered.contains("customer feedback") {
            SourceKind::CustomerFeedback
        } else if lowered.contains("sales") {
            SourceKind::Sales
        } else {
            SourceKind::Generic
        }
    }
}

#[derive(Debug, Default)]
pub struct DataExtractionPerformer;

impl DataExtractionPerformer {
    pub fn new() -> Self {
        Self
    }

    fn extract_data(&self, input: &Value) -> Value {
        let data_source = input
            .get("data_source")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_SOURCE);
        tracing::info!("Extracting data from source: {}", data_source);

        let data = match SourceKind::classify(data_source) {
            SourceKind::CustomerFeedback => feedback_records(),
            SourceKind::Sales => sales_records(),
            SourceKind::Generic => generic_records(),
        };

        json!({
            "metadata": {
                "source": data_source,
                "record_count": data.len(),
                "extraction_timestamp": timestamp(),
            },
            "data": data,
        })
    }

    fn validate_data_source(&self, input: &Value) -> Value {
        let data_source = input
            .get("data_source")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let is_valid = !data_source.trim().is_empty();
        tracing::info!("Validating data source: {:?}", data_source);

        let message = if is_valid {
            "Data source is valid and accessible"
        } else {
            "Invalid data source"
        };
        json!({
            "is_valid": is_valid,
            "message": message,
        })
    }

    fn preprocess_data(&self, input: &Value) -> Value {
        let data = records(input);
        tracing::info!("Preprocessing data with {} records", data.len());

        let mut metadata = input
            .get("metadata")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        metadata.insert(
            "preprocessing_applied".to_string(),
            json!(["cleaning", "normalization", "transformation"]),
        );
        metadata.insert("preprocessing_timestamp".to_string(), json!(timestamp()));

        json!({
            "data": data,
            "metadata": metadata,
        })
    }
}

#[async_trait]
impl TaskPerformer for DataExtractionPerformer {
    fn kind(&self) -> AgentKind {
        AgentKind::DataExtraction
    }

    fn supported_tasks(&self) -> &[&'static str] {
        &["extract_data", "validate_data_source", "preprocess_data"]
    }

    async fn execute(&self, task: &str, input: &Value) -> Result<Value, EngineError> {
        match task {
            "extract_data" => Ok(self.extract_data(input)),
            "validate_data_source" => Ok(self.validate_data_source(input)),
            "preprocess_data" => Ok(self.preprocess_data(input)),
            other => Err(unsupported(&self.kind(), other)),
        }
    }
}

fn feedback_records() -> Vec<Value> {
    [
        (1, 101, 4, "Great product, very satisfied!", "2023-01-15"),
        (2, 102, 2, "Product quality could be better", "2023-01-18"),
        (3, 103, 5, "Excellent service and product", "2023-01-20"),
        (4, 104, 3, "Average product, nothing special", "2023-01-25"),
        (5, 105, 1, "Very disappointed with quality", "2023-02-02"),
        (6, 106, 4, "Good product but expensive", "2023-02-05"),
        (7, 107, 5, "Best purchase I've made this year!", "2023-02-10"),
        (8, 108, 2, "Delivery was late and product damaged", "2023-02-15"),
        (9, 109, 4, "Very good customer service", "2023-02-20"),
        (10, 110, 3, "Product is okay but website is hard to navigate", "2023-02-25"),
    ]
    .into_iter()
    .map(|(id, customer_id, rating, feedback, date)| {
        json!({
            "id": id,
            "customer_id": customer_id,
            "rating": rating,
            "feedback": feedback,
            "date": date,
        })
    })
    .collect()
}

fn sales_records() -> Vec<Value> {
    [
        (1, "P001", 5, 29.99, "2023-01-05", "North"),
        (2, "P002", 2, 49.99, "2023-01-10", "South"),
        (3, "P001", 3, 29.99, "2023-01-15", "East"),
        (4, "P003", 1, 99.99, "2023-01-20", "West"),
        (5, "P002", 4, 49.99, "2023-01-25", "North"),
        (6, "P004", 2, 19.99, "2023-02-01", "South"),
        (7, "P001", 6, 29.99, "2023-02-05", "East"),
        (8, "P003", 2, 99.99, "2023-02-10", "West"),
        (9, "P002", 3, 49.99, "2023-02-15", "North"),
        (10, "P004", 5, 19.99, "2023-02-20", "South"),
    ]
    .into_iter()
    .map(|(id, product_id, quantity, price, date, region)| {
        json!({
            "id": id,
            "product_id": product_id,
            "quantity": quantity,
            "price": price,
            "date": date,
            "region": region,
        })
    })
    .collect()
}

fn generic_records() -> Vec<Value> {
    const CATEGORIES: [&str; 3] = ["A", "B", "C"];
    (0..10usize)
        .map(|i| {
            json!({
                "id": i,
                "value": i * 10,
                "category": CATEGORIES[i % CATEGORIES.len()],
                "timestamp": format!("2023-01-{:02}", i + 1),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_sources() {
        assert_eq!(
            SourceKind::classify("Customer Feedback Q1"),
            SourceKind::CustomerFeedback
        );
        assert_eq!(SourceKind::classify("regional sales"), SourceKind::Sales);
        assert_eq!(SourceKind::classify("telemetry"), SourceKind::Generic);
    }

    #[tokio::test]
    async fn test_extract_feedback() {
        let output = DataExtractionPerformer::new()
            .execute("extract_data", &json!({"id": "R-1", "data_source": "customer feedback"}))
            .await
            .unwrap();

        let data = output["data"].as_array().unwrap();
        assert_eq!(data.len(), 10);
        assert_eq!(data[4]["rating"], 1);
        assert_eq!(output["metadata"]["source"], "customer feedback");
        assert_eq!(output["metadata"]["record_count"], 10);
        assert!(output["metadata"]["extraction_timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_extract_defaults_to_generic() {
        let output = DataExtractionPerformer::new()
            .execute("extract_data", &json!({}))
            .await
            .unwrap();
        assert_eq!(output["metadata"]["source"], DEFAULT_SOURCE);
        assert_eq!(output["data"][2]["category"], "C");
        assert_eq!(output["data"][9]["timestamp"], "2023-01-10");
    }

    #[tokio::test]
    async fn test_validate_data_source() {
        let performer = DataExtractionPerformer::new();
        let ok = performer
            .execute("validate_data_source", &json!({"data_source": "sales"}))
            .await
            .unwrap();
        assert_eq!(ok["is_valid"], true);

        let bad = performer
            .execute("validate_data_source", &json!({"data_source": "  "}))
            .await
            .unwrap();
        assert_eq!(bad["is_valid"], false);
        assert_eq!(bad["message"], "Invalid data source");
    }

    #[tokio::test]
    async fn test_preprocess_keeps_metadata() {
        let input = json!({"data": [{"id": 1}], "metadata": {"source": "sales"}});
        let output = DataExtractionPerformer::new()
            .execute("preprocess_data", &input)
            .await
            .unwrap();
        assert_eq!(output["data"], input["data"]);
        assert_eq!(output["metadata"]["source"], "sales");
        assert_eq!(output["metadata"]["preprocessing_applied"][0], "cleaning");
    }

    #[tokio::test]
    async fn test_unsupported_task() {
        let err = DataExtractionPerformer::new()
            .execute("render", &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedTask { .. }));
    }
}
