//! Embedding-based validation
//!
//! An output is embedded and compared against reference outputs for the same
//! (agent, task). The best cosine similarity, scaled to 0-100, is the score.
//! Embeddings are cached by content hash, so references are embedded once.

use async_trait::async_trait;
use sdk::capability::Embedder;
use sdk::errors::EngineError;
use sdk::types::AgentKind;
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{clamp_score, content_hash, TierReport, ValidationSubject, Validator, ValidatorTier};
use crate::state::BoundedLru;

/// Object keys deeper than this are summarized by their parent's kind
const MAX_KEY_DEPTH: usize = 2;

/// Cosine similarity in [-1, 1]
///
/// Vectors of different length, empty vectors and zero vectors all give 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0)
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn collect_tokens(value: &Value, path: &str, depth: usize, tokens: &mut BTreeSet<String>) {
    match value {
        Value::Object(map) => {
            if depth >= MAX_KEY_DEPTH {
                return;
            }
            for (key, child) in map {
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", path, key)
                };
                tokens.insert(format!("key:{}", child_path));
                tokens.insert(format!("kind:{}={}", child_path, kind_of(child)));
                collect_tokens(child, &child_path, depth + 1, tokens);
            }
        }
        Value::Array(items) => {
            let item_path = format!("{}[]", path);
            for item in items {
                tokens.insert(format!("kind:{}={}", item_path, kind_of(item)));
                collect_tokens(item, &item_path, depth, tokens);
            }
        }
        _ => {}
    }
}

/// Deterministic feature-hashing embedder over JSON structure
///
/// Each distinct structural token (key path, value kind at a path) is hashed
/// into one signed bucket. Values themselves are ignored, so two outputs of the
/// same shape embed identically.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Structural tokens of a payload, exposed for diagnostics
    pub fn tokens(value: &Value) -> BTreeSet<String> {
        let mut tokens = BTreeSet::new();
        tokens.insert(format!("root={}", kind_of(value)));
        collect_tokens(value, "", 0, &mut tokens);
        tokens
    }

    fn vectorize(&self, value: &Value) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for token in Self::tokens(value) {
            let digest = blake3::hash(token.as_bytes());
            let bytes = digest.as_bytes();
            let mut index_bytes = [0u8; 8];
            index_bytes.copy_from_slice(&bytes[..8]);
            let index = (u64::from_le_bytes(index_bytes) % self.dimensions as u64) as usize;
            let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[index] += sign;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(128)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn name(&self) -> &str {
        "hashing"
    }

    async fn embed(&self, data: &Value) -> Result<Vec<f32>, EngineError> {
        if self.dimensions == 0 {
            return Err(EngineError::Embedding(
                "Hashing embedder configured with zero dimensions".to_string(),
            ));
        }
        Ok(self.vectorize(data))
    }
}

/// Reference outputs per (agent, task)
#[derive(Debug, Clone, Default)]
pub struct ReferenceLibrary {
    references: HashMap<(AgentKind, String), Vec<Value>>,
}

impl ReferenceLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Library seeded with exemplar shapes of the built-in performers
    pub fn with_defaults() -> Self {
        let mut library = Self::new();

        let extraction_metadata = json!({
            "source": "", "record_count": 0, "extraction_timestamp": ""
        });
        for record in [
            json!({"id": 1, "customer_id": 101, "rating": 4, "feedback": "", "date": ""}),
            json!({"id": 1, "product_id": "", "quantity": 1, "price": 1.0, "date": "", "region": ""}),
            json!({"id": 0, "value": 0, "category": "", "timestamp": ""}),
        ] {
            library.add(
                AgentKind::DataExtraction,
                "extract_data",
                json!({"data": [record], "metadata": extraction_metadata.clone()}),
            );
        }

        let analysis_metadata = json!({
            "source_metadata": {},
            "analysis_timestamp": "",
            "analysis_methods": ["descriptive_statistics"]
        });
        for results in [
            json!({
                "sentiment_distribution": {}, "average_rating": 0.0,
                "rating_trend": {}, "sample_size": 0
            }),
            json!({
                "total_sales": 0.0, "sales_by_product": {}, "sales_by_region": {},
                "sales_trend": {}, "sample_size": 0
            }),
            json!({
                "average_value": 0.0, "min_value": 0.0, "max_value": 0.0, "value_range": 0.0,
                "category_statistics": {}, "sample_size": 0
            }),
        ] {
            library.add(
                AgentKind::StatisticalAnalysis,
                "analyze_data",
                json!({"analysis_results": results, "metadata": analysis_metadata.clone()}),
            );
        }

        for chart in ["pie_chart", "line_chart", "map"] {
            library.add(
                AgentKind::Visualization,
                "create_visualizations",
                json!({
                    "visualizations": [{
                        "id": "", "title": "", "type": chart, "description": "", "data": {}
                    }],
                    "metadata": {
                        "source_metadata": {},
                        "visualization_timestamp": "",
                        "visualization_types": [chart]
                    }
                }),
            );
        }

        library
    }

    pub fn add(&mut self, agent: AgentKind, task: impl Into<String>, exemplar: Value) {
        self.references
            .entry((agent, task.into()))
            .or_default()
            .push(exemplar);
    }

    pub fn references(&self, agent: &AgentKind, task: &str) -> &[Value] {
        self.references
            .get(&(agent.clone(), task.to_string()))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// Closest reference for an output
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BestMatch {
    /// Index into the reference list, `None` when there are no references
    pub reference: Option<usize>,
    pub similarity: f64,
}

/// Embedding tier of the evaluator
pub struct EmbeddingValidator {
    embedder: Arc<dyn Embedder>,
    library: ReferenceLibrary,
    cache: Mutex<BoundedLru<String, Arc<Vec<f32>>>>,
}

impl EmbeddingValidator {
    pub fn new(embedder: Arc<dyn Embedder>, library: ReferenceLibrary, cache_size: usize) -> Self {
        Self {
            embedder,
            library,
            cache: Mutex::new(BoundedLru::new(cache_size)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BoundedLru<String, Arc<Vec<f32>>>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn embed_cached(&self, value: &Value) -> Result<Arc<Vec<f32>>, EngineError> {
        let key = content_hash(value);
        let cached = self.lock().get(&key).cloned();
        if let Some(vector) = cached {
            return Ok(vector);
        }

        let vector = Arc::new(self.embedder.embed(value).await?);
        self.lock().insert(key, Arc::clone(&vector));
        Ok(vector)
    }

    pub async fn best_match(
        &self,
        agent: &AgentKind,
        task: &str,
        output: &Value,
    ) -> Result<BestMatch, EngineError> {
        let references = self.library.references(agent, task);
        if references.is_empty() {
            return Ok(BestMatch {
                reference: None,
                similarity: 0.0,
            });
        }

        let embedding = self.embed_cached(output).await?;
        let mut best = BestMatch {
            reference: None,
            similarity: f64::NEG_INFINITY,
        };
        for (index, reference) in references.iter().enumerate() {
            let reference_embedding = self.embed_cached(reference).await?;
            let similarity = cosine_similarity(&embedding, &reference_embedding);
            if similarity > best.similarity {
                best = BestMatch {
                    reference: Some(index),
                    similarity,
                };
            }
        }
        Ok(best)
    }

    pub fn cached_embeddings(&self) -> usize {
        self.lock().len()
    }
}

#[async_trait]
impl Validator for EmbeddingValidator {
    fn tier(&self) -> ValidatorTier {
        ValidatorTier::Embedding
    }

    async fn validate(&self, subject: &ValidationSubject<'_>) -> Result<TierReport, EngineError> {
        let best = self
            .best_match(subject.agent, subject.task, subject.output)
            .await?;
        let score = clamp_score(best.similarity * 100.0);

        tracing::debug!(
            "Embedding check {}.{} via {}: similarity={:.3}",
            subject.agent,
            subject.task,
            self.embedder.name(),
            best.similarity
        );

        let message = match best.reference {
            Some(index) => format!(
                "Closest reference #{} with similarity {:.3}",
                index, best.similarity
            ),
            None => "No reference outputs".to_string(),
        };

        Ok(TierReport {
            tier: ValidatorTier::Embedding,
            is_valid: best.reference.is_some(),
            score,
            message,
            details: json!({
                "best_match": best.reference.map_or(json!("none"), |i| json!(i)),
                "similarity": best.similarity,
                "embedder": self.embedder.name(),
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_cosine_similarity_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-9);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-9);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_similarity_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_tokens_ignore_values_and_deep_keys() {
        let a = json!({"data": [{"rating": 4}], "metadata": {"source": "x", "deep": {"k": 1}}});
        let b = json!({"data": [{"rating": 1}, {"rating": 5}], "metadata": {"source": "y", "deep": {"z": 2}}});
        assert_eq!(HashingEmbedder::tokens(&a), HashingEmbedder::tokens(&b));
        assert!(HashingEmbedder::tokens(&a).contains("key:data[].rating"));
    }

    #[tokio::test]
    async fn test_hashing_embedder_is_deterministic_and_normalized() {
        let embedder = HashingEmbedder::new(64);
        let value = json!({"data": [1, 2, 3], "metadata": {"source": "s"}});

        let first = embedder.embed(&value).await.unwrap();
        let second = embedder.embed(&value).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);

        let norm: f32 = first.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_matching_shape_scores_high() {
        let validator = EmbeddingValidator::new(
            Arc::new(HashingEmbedder::default()),
            ReferenceLibrary::with_defaults(),
            100,
        );
        let output = json!({
            "data": [
                {"id": 1, "customer_id": 101, "rating": 4, "feedback": "Great", "date": "2023-01-15"},
                {"id": 2, "customer_id": 102, "rating": 2, "feedback": "Meh", "date": "2023-01-18"}
            ],
            "metadata": {"source": "customer feedback", "record_count": 2, "extraction_timestamp": "now"}
        });

        let best = validator
            .best_match(&AgentKind::DataExtraction, "extract_data", &output)
            .await
            .unwrap();
        assert_eq!(best.reference, Some(0));
        assert!(best.similarity > 0.999);
    }

    #[tokio::test]
    async fn test_unrelated_shape_scores_lower() {
        let validator = EmbeddingValidator::new(
            Arc::new(HashingEmbedder::default()),
            ReferenceLibrary::with_defaults(),
            100,
        );
        let best = validator
            .best_match(
                &AgentKind::DataExtraction,
                "extract_data",
                &json!({"unexpected": true}),
            )
            .await
            .unwrap();
        assert!(best.similarity < 0.5);
    }

    #[tokio::test]
    async fn test_no_references_gives_zero() {
        let validator = EmbeddingValidator::new(
            Arc::new(HashingEmbedder::default()),
            ReferenceLibrary::new(),
            10,
        );
        let agent = AgentKind::Visualization;
        let input = json!({});
        let output = json!({"visualizations": []});
        let report = validator
            .validate(&ValidationSubject {
                agent: &agent,
                task: "create_visualizations",
                input: &input,
                output: &output,
            })
            .await
            .unwrap();

        assert_eq!(report.score, 0.0);
        assert_eq!(report.details["best_match"], "none");
    }

    struct CountingEmbedder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        fn name(&self) -> &str {
            "counting"
        }

        async fn embed(&self, data: &Value) -> Result<Vec<f32>, EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            HashingEmbedder::new(16).embed(data).await
        }
    }

    #[tokio::test]
    async fn test_embeddings_are_cached_by_content() {
        let embedder = Arc::new(CountingEmbedder {
            calls: AtomicUsize::new(0),
        });
        let mut library = ReferenceLibrary::new();
        library.add(AgentKind::DataExtraction, "extract_data", json!({"data": []}));
        let validator =
            EmbeddingValidator::new(Arc::clone(&embedder) as Arc<dyn Embedder>, library, 10);

        let output = json!({"data": [1]});
        for _ in 0..3 {
            validator
                .best_match(&AgentKind::DataExtraction, "extract_data", &output)
                .await
                .unwrap();
        }

        // One embedding for the output, one for the reference
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 2);
        assert_eq!(validator.cached_embeddings(), 2);
    }
}
