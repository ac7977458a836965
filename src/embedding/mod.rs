//! Embedding provider implementations.
//!
//! Concrete backends for the core [`EmbeddingProvider`] trait:
//! - **[`DisabledProvider`]**: always fails; every chunk becomes an embedding gap.
//! - **[`OpenAIProvider`]**: any OpenAI-compatible `POST {url}/embeddings` endpoint.
//! - **[`OllamaProvider`]**: a local Ollama instance's `/api/embed` endpoint.
//! - **`LocalProvider`**: fastembed, offline after the first model download
//!   (feature `local-embeddings-fastembed`).
//!
//! Use [`create_provider`] to instantiate the configured backend:
//!
//! ```rust,no_run
//! # use notegraph::config::EmbeddingConfig;
//! # use notegraph::embedding::create_provider;
//! # use notegraph_core::embedding::EmbeddingProvider;
//! let config = EmbeddingConfig::default(); // provider = "disabled"
//! let provider = create_provider(&config).unwrap();
//! assert_eq!(provider.model_name(), "disabled");
//! ```
//!
//! Transport retries follow [`crate::http`].

use anyhow::{bail, Result};
use async_trait::async_trait;

use notegraph_core::embedding::EmbeddingProvider;
use notegraph_core::error::{Error, ServiceKind};

use crate::config::EmbeddingConfig;
use crate::http::JsonClient;

// ============ Disabled Provider ============

/// Provider used when `embedding.provider = "disabled"`.
pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed(&self, _texts: &[String]) -> notegraph_core::Result<Vec<Vec<f32>>> {
        Err(Error::service(
            ServiceKind::Embedding,
            "embedding provider is disabled",
        ))
    }
}

// ============ OpenAI-compatible Provider ============

/// Embedding provider for OpenAI-compatible APIs (OpenAI, DashScope, vLLM, ...).
pub struct OpenAIProvider {
    model: String,
    dims: usize,
    url: String,
    request_dimensions: bool,
    client: JsonClient,
}

impl OpenAIProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for OpenAI provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string())
            .trim_end_matches('/')
            .to_string();

        if config.api_key.is_none() && !config.api_key_env.is_empty() {
            bail!("{} environment variable not set", config.api_key_env);
        }

        let client = JsonClient::new(
            ServiceKind::Embedding,
            config.api_key.clone(),
            config.timeout_secs,
            config.max_retries,
        )?;

        Ok(Self {
            model,
            dims,
            url,
            request_dimensions: config.request_dimensions,
            client,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String]) -> notegraph_core::Result<Vec<Vec<f32>>> {
        let mut body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        if self.request_dimensions {
            body["dimensions"] = serde_json::json!(self.dims);
        }

        let json = self
            .client
            .post_json(&format!("{}/embeddings", self.url), &body)
            .await?;
        parse_openai_response(&json)
    }
}

/// Extract `data[].embedding`, ordered by each item's `index`.
fn parse_openai_response(json: &serde_json::Value) -> notegraph_core::Result<Vec<Vec<f32>>> {
    let invalid = |what: &str| {
        Error::service(
            ServiceKind::Embedding,
            format!("invalid embeddings response: {}", what),
        )
    };

    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| invalid("missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| invalid("missing embedding"))?;
        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        indexed.push((index, vec));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Ollama Provider ============

/// Embedding provider using a local Ollama instance.
///
/// Calls `POST /api/embed` on the configured URL (default `http://localhost:11434`).
pub struct OllamaProvider {
    model: String,
    dims: usize,
    url: String,
    client: JsonClient,
}

impl OllamaProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for Ollama provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for Ollama provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string())
            .trim_end_matches('/')
            .to_string();
        let client = JsonClient::new(
            ServiceKind::Embedding,
            None,
            config.timeout_secs,
            config.max_retries,
        )?;

        Ok(Self {
            model,
            dims,
            url,
            client,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String]) -> notegraph_core::Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let json = self
            .client
            .post_json(&format!("{}/api/embed", self.url), &body)
            .await?;
        parse_ollama_response(&json)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> notegraph_core::Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| {
            Error::service(
                ServiceKind::Embedding,
                "invalid Ollama response: missing embeddings array",
            )
        })?;

    embeddings
        .iter()
        .map(|embedding| {
            embedding
                .as_array()
                .map(|values| {
                    values
                        .iter()
                        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                        .collect()
                })
                .ok_or_else(|| {
                    Error::service(
                        ServiceKind::Embedding,
                        "invalid Ollama response: embedding is not an array",
                    )
                })
        })
        .collect()
}

// ============ Local Provider (fastembed) ============

#[cfg(feature = "local-embeddings-fastembed")]
mod local {
    use std::sync::{Arc, Mutex};

    use anyhow::{bail, Result};
    use async_trait::async_trait;

    use notegraph_core::embedding::EmbeddingProvider;
    use notegraph_core::error::{Error, ServiceKind};

    use crate::config::EmbeddingConfig;

    /// Embedding provider running a fastembed model in-process.
    ///
    /// The model is downloaded from Hugging Face and initialized on first use.
    pub struct LocalProvider {
        model_name: String,
        dims: usize,
        model: fastembed::EmbeddingModel,
        batch_size: usize,
        engine: Arc<Mutex<Option<fastembed::TextEmbedding>>>,
    }

    impl LocalProvider {
        pub fn new(config: &EmbeddingConfig) -> Result<Self> {
            let model_name = config
                .model
                .clone()
                .unwrap_or_else(|| "multilingual-e5-small".to_string());
            let (model, default_dims) = resolve_model(&model_name)?;
            Ok(Self {
                model_name,
                dims: config.dims.unwrap_or(default_dims),
                model,
                batch_size: config.batch_size,
                engine: Arc::new(Mutex::new(None)),
            })
        }
    }

    fn resolve_model(name: &str) -> Result<(fastembed::EmbeddingModel, usize)> {
        use fastembed::EmbeddingModel as M;
        Ok(match name {
            "all-minilm-l6-v2" => (M::AllMiniLML6V2, 384),
            "bge-small-en-v1.5" => (M::BGESmallENV15, 384),
            "bge-base-en-v1.5" => (M::BGEBaseENV15, 768),
            "bge-large-en-v1.5" => (M::BGELargeENV15, 1024),
            "multilingual-e5-small" => (M::MultilingualE5Small, 384),
            "multilingual-e5-base" => (M::MultilingualE5Base, 768),
            "multilingual-e5-large" => (M::MultilingualE5Large, 1024),
            other => bail!(
                "Unknown local embedding model: '{}'. Supported models: \
                 all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, \
                 multilingual-e5-small, multilingual-e5-base, multilingual-e5-large",
                other
            ),
        })
    }

    #[async_trait]
    impl EmbeddingProvider for LocalProvider {
        fn model_name(&self) -> &str {
            &self.model_name
        }
        fn dims(&self) -> usize {
            self.dims
        }
        async fn embed(&self, texts: &[String]) -> notegraph_core::Result<Vec<Vec<f32>>> {
            let engine = Arc::clone(&self.engine);
            let model = self.model.clone();
            let batch_size = self.batch_size;
            let texts = texts.to_vec();
            let fail = |msg: String| Error::service(ServiceKind::Embedding, msg);

            tokio::task::spawn_blocking(move || {
                let mut guard = engine.lock().unwrap_or_else(|e| e.into_inner());
                if guard.is_none() {
                    let initialized = fastembed::TextEmbedding::try_new(
                        fastembed::InitOptions::new(model).with_show_download_progress(true),
                    )
                    .map_err(|e| fail(format!("failed to initialize local model: {}", e)))?;
                    *guard = Some(initialized);
                }
                match guard.as_mut() {
                    Some(engine) => engine
                        .embed(texts, Some(batch_size))
                        .map_err(|e| fail(format!("local embedding failed: {}", e))),
                    None => Err(fail("local model unavailable".to_string())),
                }
            })
            .await
            .map_err(|e| Error::service(ServiceKind::Embedding, e.to_string()))?
        }
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
pub use local::LocalProvider;

/// Create the [`EmbeddingProvider`] selected by configuration.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledProvider`] |
/// | `"openai"` | [`OpenAIProvider`] |
/// | `"ollama"` | [`OllamaProvider`] |
/// | `"local"` | `LocalProvider` (feature `local-embeddings-fastembed`) |
pub fn create_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledProvider)),
        "openai" => Ok(Box::new(OpenAIProvider::new(config)?)),
        "ollama" => Ok(Box::new(OllamaProvider::new(config)?)),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Box::new(LocalProvider::new(config)?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => bail!("Local embedding provider requires --features local-embeddings-fastembed"),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openai_response_sorted_by_index() {
        let json = serde_json::json!({
            "data": [
                {"index": 1, "embedding": [0.0, 1.0]},
                {"index": 0, "embedding": [1.0, 0.0]}
            ]
        });
        let vectors = parse_openai_response(&json).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn openai_response_without_data_is_service_error() {
        let err = parse_openai_response(&serde_json::json!({"error": "nope"})).unwrap_err();
        assert!(err.is_service());
    }

    #[test]
    fn ollama_response_parsed() {
        let json = serde_json::json!({"embeddings": [[0.5, 0.25], [1.0, 0.0]]});
        let vectors = parse_ollama_response(&json).unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[0], vec![0.5, 0.25]);
    }

    #[tokio::test]
    async fn disabled_provider_always_fails() {
        let provider = create_provider(&EmbeddingConfig::default()).unwrap();
        assert_eq!(provider.dims(), 0);
        assert!(provider.embed(&["x".to_string()]).await.is_err());
    }

    #[test]
    fn openai_requires_key_when_env_named() {
        let config = EmbeddingConfig {
            provider: "openai".to_string(),
            model: Some("text-embedding-v3".to_string()),
            dims: Some(1024),
            api_key_env: "NOTEGRAPH_TEST_UNSET_KEY".to_string(),
            api_key: None,
            ..EmbeddingConfig::default()
        };
        assert!(OpenAIProvider::new(&config).is_err());
    }
}
