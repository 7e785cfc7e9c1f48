//! Context retrieval over indexed artifact text
//!
//! Completed analyses are chunked, embedded, and held in memory so the
//! assistant can ground its answers in prior findings. Embeddings come
//! from a pluggable [`Embedder`]; the default is fully deterministic
//! feature hashing, which keeps retrieval reproducible and dependency-free
//! while the trait leaves room for a model-backed implementation.

use chrono::{DateTime, Utc};
use intel_core::{AnalysisSession, StagePayload};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Produces a fixed-dimension embedding for a piece of text
pub trait Embedder: Send + Sync {
    /// Embed the text into a vector of `dimension()` floats
    fn embed(&self, text: &str) -> Vec<f32>;

    /// Output dimension, constant for the lifetime of the embedder
    fn dimension(&self) -> usize;
}

/// Deterministic feature-hashing embedder
///
/// Tokenizes on non-alphanumeric boundaries, lowercases, hashes each token
/// into a bucket, and L2-normalizes the bucket counts. Identical text
/// always produces identical vectors.
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    /// Create an embedder with the given dimension
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn hash_token(token: &str) -> u64 {
        // FNV-1a
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in token.bytes() {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x100_0000_01b3);
        }
        hash
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

impl Embedder for HashEmbedder {
    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let bucket = (Self::hash_token(&token.to_lowercase()) as usize) % self.dimension;
            vector[bucket] += 1.0;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// A chunk of indexed artifact text
#[derive(Debug, Clone)]
pub struct ContextFragment {
    /// Session the fragment came from
    pub session_id: Uuid,
    /// Artifact the text was extracted from
    pub artifact_id: Uuid,
    /// Position of this chunk within the artifact's text
    pub index: usize,
    /// Chunk text
    pub text: String,
    /// Embedding of `text`
    pub embedding: Vec<f32>,
    /// When the fragment was indexed
    pub created_at: DateTime<Utc>,
}

/// A fragment with its similarity to a query
#[derive(Debug, Clone)]
pub struct ScoredFragment {
    /// The matched fragment
    pub fragment: ContextFragment,
    /// Cosine similarity in `[-1, 1]`
    pub score: f32,
}

/// Which sessions a retrieval searches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalScope {
    /// Only fragments from one session
    Session(Uuid),
    /// Fragments from every indexed session
    AllSessions,
}

/// In-memory vector index over artifact fragments
pub struct ContextRetriever {
    embedder: Arc<dyn Embedder>,
    fragments: RwLock<Vec<ContextFragment>>,
    chunk_size: usize,
    similarity_threshold: f32,
}

impl ContextRetriever {
    /// Create a retriever with the given embedder and chunking parameters
    pub fn new(embedder: Arc<dyn Embedder>, chunk_size: usize, similarity_threshold: f32) -> Self {
        Self {
            embedder,
            fragments: RwLock::new(Vec::new()),
            chunk_size,
            similarity_threshold,
        }
    }

    /// Index every usable artifact of a session
    ///
    /// Re-indexing a session replaces its previous fragments, so the call
    /// is idempotent.
    pub async fn index(&self, session: &AnalysisSession) {
        let now = Utc::now();
        let mut new_fragments = Vec::new();

        for artifact in session.artifacts.iter().filter(|a| a.is_usable()) {
            let Some(payload) = &artifact.payload else {
                continue;
            };
            let text = payload_text(payload);
            for (index, chunk) in chunk_text(&text, self.chunk_size).into_iter().enumerate() {
                let embedding = self.embedder.embed(&chunk);
                new_fragments.push(ContextFragment {
                    session_id: session.id,
                    artifact_id: artifact.id,
                    index,
                    text: chunk,
                    embedding,
                    created_at: now,
                });
            }
        }

        debug!(
            "Indexing {} fragments for session {}",
            new_fragments.len(),
            session.id
        );
        let mut fragments = self.fragments.write().await;
        fragments.retain(|f| f.session_id != session.id);
        fragments.extend(new_fragments);
    }

    /// Top-k fragments by cosine similarity to the query
    ///
    /// Ties are broken most-recent-first. An empty index yields an empty
    /// result, never an error.
    pub async fn retrieve(
        &self,
        query: &str,
        scope: RetrievalScope,
        k: usize,
    ) -> Vec<ScoredFragment> {
        if k == 0 {
            return Vec::new();
        }
        let query_embedding = self.embedder.embed(query);

        let fragments = self.fragments.read().await;
        let mut scored: Vec<ScoredFragment> = fragments
            .iter()
            .filter(|f| match scope {
                RetrievalScope::Session(id) => f.session_id == id,
                RetrievalScope::AllSessions => true,
            })
            .map(|f| ScoredFragment {
                score: cosine_similarity(&query_embedding, &f.embedding),
                fragment: f.clone(),
            })
            .filter(|s| s.score >= self.similarity_threshold)
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.fragment.created_at.cmp(&a.fragment.created_at))
        });
        scored.truncate(k);
        scored
    }

    /// Drop all fragments for a session (cascade from session deletion)
    pub async fn remove_session(&self, session_id: Uuid) {
        let mut fragments = self.fragments.write().await;
        fragments.retain(|f| f.session_id != session_id);
    }

    /// Number of indexed fragments
    pub async fn len(&self) -> usize {
        self.fragments.read().await.len()
    }

    /// Check if the index is empty
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Render a stage payload to indexable text
fn payload_text(payload: &StagePayload) -> String {
    match payload {
        StagePayload::Report { markdown } => markdown.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_default(),
    }
}

/// Split text into chunks of at most `chunk_size` characters
///
/// Splits on whitespace so words stay intact; a single oversized word
/// becomes its own chunk.
fn chunk_text(text: &str, chunk_size: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if !current.is_empty() && current.chars().count() + word.chars().count() + 1 > chunk_size {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Cosine similarity of two equal-dimension vectors
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
