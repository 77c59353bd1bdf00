//! Embedding capability.
//!
//! Backends that can embed text implement [`Embedder`] on top of
//! [`Client`] and return themselves from [`Client::as_embedder`].

use async_trait::async_trait;

use crate::backend::Client;
use crate::error::Result;
use crate::options::GenerateOptions;

/// Dense vector embeddings for text.
#[async_trait]
pub trait Embedder: Client {
    /// Embed a single text.
    async fn embedding(
        &self,
        model: &str,
        text: &str,
        options: &GenerateOptions,
    ) -> Result<Vec<f64>>;

    /// Embed several texts, one vector per input in input order.
    ///
    /// Default implementation calls [`Embedder::embedding`] for each text
    /// sequentially. Backends with a native batch endpoint should override it.
    async fn batch_embedding(
        &self,
        model: &str,
        texts: &[String],
        options: &GenerateOptions,
    ) -> Result<Vec<Vec<f64>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embedding(model, text, options).await?);
        }
        Ok(vectors)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Mock Embedder
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(any(test, feature = "testing"))]
pub use mock::MockEmbedder;

#[cfg(any(test, feature = "testing"))]
mod mock {
    use super::*;
    use crate::types::Model;
    use parking_lot::Mutex;

    /// A deterministic embedding backend for tests.
    ///
    /// The same text always maps to the same unit-length vector.
    #[derive(Debug)]
    pub struct MockEmbedder {
        name: String,
        models: Vec<String>,
        dimensions: usize,
        calls: Mutex<Vec<String>>,
    }

    impl MockEmbedder {
        pub fn new(name: impl Into<String>, dimensions: usize) -> Self {
            Self {
                name: name.into(),
                models: Vec::new(),
                dimensions,
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn with_models(mut self, models: &[&str]) -> Self {
            self.models = models.iter().map(|m| m.to_string()).collect();
            self
        }

        /// Texts embedded so far, in call order.
        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }

        fn vector(&self, text: &str) -> Vec<f64> {
            let mut state = text
                .bytes()
                .fold(0xcbf2_9ce4_8422_2325_u64, |h, b| {
                    (h ^ b as u64).wrapping_mul(0x0100_0000_01b3)
                })
                | 1;
            let mut vector: Vec<f64> = (0..self.dimensions)
                .map(|_| {
                    state ^= state << 13;
                    state ^= state >> 7;
                    state ^= state << 17;
                    (state >> 11) as f64 / (1u64 << 52) as f64 - 1.0
                })
                .collect();

            let norm = vector.iter().map(|x| x * x).sum::<f64>().sqrt();
            if norm > 0.0 {
                vector.iter_mut().for_each(|x| *x /= norm);
            }
            vector
        }
    }

    #[async_trait]
    impl Client for MockEmbedder {
        fn name(&self) -> &str {
            &self.name
        }

        async fn list_models(&self) -> Result<Vec<Model>> {
            Ok(self
                .models
                .iter()
                .map(|m| Model::new(&self.name, m))
                .collect())
        }

        fn as_embedder(&self) -> Option<&dyn Embedder> {
            Some(self)
        }
    }

    #[async_trait]
    impl Embedder for MockEmbedder {
        async fn embedding(
            &self,
            _model: &str,
            text: &str,
            _options: &GenerateOptions,
        ) -> Result<Vec<f64>> {
            self.calls.lock().push(text.to_string());
            Ok(self.vector(text))
        }
    }
}
