//! Embedding providers used by the vector store.
//!
//! `OpenAiEmbedder` calls the hosted embeddings endpoint; `HashingEmbedder`
//! is an offline bag-of-words projection that needs no corpus and gives the
//! same vector for the same text on every run.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;

use super::utils::HttpStatusError;

pub const OPENAI_EMBEDDING_MODEL: &str = "text-embedding-3-large";
pub const HASHING_DIMENSIONS: usize = 512;

/// Simple stop words to filter out common English words.
const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "is", "it", "in", "on", "of", "to", "and", "or", "for", "with", "this",
    "that", "be", "are", "was", "were", "been", "being", "have", "has", "had", "do", "does",
    "did", "will", "would", "could", "should", "may", "might", "can", "shall", "not", "no",
    "but", "if", "at", "by", "from", "as", "into", "about", "up", "out", "so", "its", "you",
    "your", "i", "my", "we", "our", "they", "them", "their", "he", "she", "his", "her", "what",
    "say", "says",
];

/// Turns text into vectors for similarity search
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts, returning one vector per input in the same order
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Identifies the embedding space; an index built with one model cannot be queried with another
    fn model(&self) -> &str;
}

pub struct OpenAiEmbedder {
    client: Client,
    host: String,
    api_key: String,
    model: String,
}

impl OpenAiEmbedder {
    pub fn new<H, K, M>(host: H, api_key: K, model: M) -> Result<Self>
    where
        H: Into<String>,
        K: Into<String>,
        M: Into<String>,
    {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            client,
            host: host.into(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/v1/embeddings", self.host.trim_end_matches('/'));
        let payload = json!({
            "model": self.model,
            "input": texts,
        });

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&payload)
            .send()
            .await?;

        let body: Value = match response.status() {
            StatusCode::OK => response.json().await?,
            status => {
                let body = response.text().await.unwrap_or_default();
                return Err(HttpStatusError::new(status.as_u16(), body).into());
            }
        };

        let data = body
            .get("data")
            .and_then(|d| d.as_array())
            .ok_or_else(|| anyhow!("No embedding data in response"))?;

        // the api may return entries out of order, the index field is authoritative
        let mut vectors: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        for (position, item) in data.iter().enumerate() {
            let index = item
                .get("index")
                .and_then(|i| i.as_u64())
                .map(|i| i as usize)
                .unwrap_or(position);
            let embedding = item
                .get("embedding")
                .and_then(|e| e.as_array())
                .ok_or_else(|| anyhow!("Embedding entry {} has no vector", index))?
                .iter()
                .map(|v| v.as_f64().unwrap_or_default() as f32)
                .collect();
            if let Some(slot) = vectors.get_mut(index) {
                *slot = Some(embedding);
            }
        }

        vectors
            .into_iter()
            .enumerate()
            .map(|(i, v)| v.ok_or_else(|| anyhow!("Missing embedding for input {}", i)))
            .collect()
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Feature-hashing embedder: each non stop-word token lands in a fixed bucket.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
    model: String,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        let dimensions = dimensions.max(1);
        Self {
            dimensions,
            model: format!("hashing-{}", dimensions),
        }
    }

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for token in tokenize(text) {
            let bucket = (fnv1a(token.as_bytes()) % self.dimensions as u64) as usize;
            vector[bucket] += 1.0;
        }
        normalize(&mut vector);
        vector
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(HASHING_DIMENSIONS)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Tokenize text: lowercase, split on non-alphanumeric, filter stop words.
fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 1)
        .filter(|w| !STOP_WORDS.contains(w))
        .map(|w| w.to_string())
        .collect()
}

// std's hasher is randomly seeded per process, buckets must be stable across runs
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in bytes {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

/// Normalize a vector to unit length (in-place).
fn normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_tokenize_drops_stop_words() {
        assert_eq!(
            tokenize("What does the CEO say about Culture?"),
            vec!["ceo".to_string(), "culture".to_string()]
        );
    }

    #[tokio::test]
    async fn test_hashing_embedder_is_stable_and_normalized() -> Result<()> {
        let embedder = HashingEmbedder::new(64);
        let texts = vec!["culture drives performance".to_string()];
        let first = embedder.embed(&texts).await?;
        let second = embedder.embed(&texts).await?;
        assert_eq!(first, second);
        assert_eq!(first[0].len(), 64);

        let norm: f32 = first[0].iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
        assert_eq!(embedder.model(), "hashing-64");
        Ok(())
    }

    #[test]
    fn test_hashing_similarity_prefers_shared_terms() {
        let embedder = HashingEmbedder::default();
        let query = embedder.embed_one("culture");
        let related = embedder.embed_one("Our culture is built on integrity");
        let unrelated = embedder.embed_one("Quarterly drilling capital expenditures");
        assert!(cosine_similarity(&query, &related) > cosine_similarity(&query, &unrelated));
    }

    #[test]
    fn test_cosine_similarity_edges() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 2.0], &[2.0, 4.0]) - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_openai_embedder_orders_by_index() -> Result<()> {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    {"index": 1, "embedding": [0.0, 1.0]},
                    {"index": 0, "embedding": [1.0, 0.0]}
                ]
            })))
            .mount(&mock_server)
            .await;

        let embedder = OpenAiEmbedder::new(mock_server.uri(), "k", OPENAI_EMBEDDING_MODEL)?;
        let vectors = embedder
            .embed(&["first".to_string(), "second".to_string()])
            .await?;
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        Ok(())
    }

    #[tokio::test]
    async fn test_openai_embedder_reports_failures() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let embedder = OpenAiEmbedder::new(mock_server.uri(), "k", OPENAI_EMBEDDING_MODEL).unwrap();
        assert!(embedder.embed(&["x".to_string()]).await.is_err());
    }
}
