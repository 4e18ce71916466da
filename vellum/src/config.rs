//! Configuration access through an injected reader.
//!
//! The library never reads files; callers hand it a [`ConfigReader`]
//! (usually [`EnvConfigReader`]) and the router pulls the keys it
//! needs.

/// Source of configuration values.
pub trait ConfigReader {
    /// Fetch a value by key, `None` when unset.
    fn get(&self, key: &str) -> Option<String>;
}

/// Reads configuration from process environment variables.
///
/// Recognized keys include `LLM_MODEL`, `OPENAI_API_KEY`,
/// `OPENAI_BASE_URL`, `AZURE_API_KEY`, `AZURE_API_ENDPOINT`,
/// `AZURE_API_VERSION`, `ANTHROPIC_API_KEY`, `ANTHROPIC_BASE_URL`,
/// `OLLAMA_BASE_URL`, `GOOGLE_API_KEY`, `LANGFUSE_PUBLIC_KEY`, and
/// `LANGFUSE_SECRET_KEY`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvConfigReader;

impl ConfigReader for EnvConfigReader {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.is_empty())
    }
}

/// A fixed map of values, mostly for tests.
#[derive(Debug, Clone, Default)]
pub struct StaticConfigReader {
    values: std::collections::BTreeMap<String, String>,
}

impl StaticConfigReader {
    /// Build from `(key, value)` pairs.
    #[must_use]
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

impl ConfigReader for StaticConfigReader {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}
