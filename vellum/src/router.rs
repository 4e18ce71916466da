//! Model routing: `"prefix/name"` strings to provider clients.

use vellum_provider_anthropic::Anthropic;
use vellum_provider_gemini::Gemini;
use vellum_provider_ollama::Ollama;
use vellum_provider_openai::{AzureOpenAi, OpenAi};
use vellum_types::{LlmError, ProviderClient, Result};

use crate::config::ConfigReader;

/// Default Azure API version when `AZURE_API_VERSION` is unset.
const DEFAULT_AZURE_API_VERSION: &str = "2024-06-01";

/// Build a provider client for a `"prefix/name"` model reference.
///
/// Prefixes: `openai/`, `anthropic/`, `azure/`, `ollama/`,
/// `openrouter/`, `gemini/`. One override: when `OPENAI_BASE_URL`
/// points at `openrouter.ai`, the request routes to OpenRouter
/// regardless of prefix (OpenRouter accepts arbitrary, slash-prefixed
/// model strings).
///
/// # Errors
///
/// [`LlmError::Configuration`] for missing credentials, an unknown
/// prefix, or a reference without a prefix.
pub fn client_for_model(
    model_ref: &str,
    config: &dyn ConfigReader,
) -> Result<Box<dyn ProviderClient>> {
    let (prefix, model) = model_ref.split_once('/').ok_or_else(|| {
        LlmError::Configuration(format!(
            "model reference '{model_ref}' must look like 'provider/model'"
        ))
    })?;

    let openai_base = config.get("OPENAI_BASE_URL");
    if openai_base.as_deref().is_some_and(|b| b.contains("openrouter.ai")) {
        let key = require(config, "OPENAI_API_KEY")?;
        let mut client = OpenAi::openrouter(key).model(model);
        if let Some(base) = openai_base {
            client = client.base_url(base);
        }
        return Ok(Box::new(client));
    }

    match prefix {
        "openai" => {
            let key = require(config, "OPENAI_API_KEY")?;
            let mut client = OpenAi::new(key).model(model);
            if let Some(base) = config.get("OPENAI_BASE_URL") {
                client = client.base_url(base);
            }
            Ok(Box::new(client))
        }
        "openrouter" => {
            let key = require(config, "OPENAI_API_KEY")?;
            Ok(Box::new(OpenAi::openrouter(key).model(model)))
        }
        "azure" => {
            let key = require(config, "AZURE_API_KEY")?;
            let endpoint = require(config, "AZURE_API_ENDPOINT")?;
            let version = config
                .get("AZURE_API_VERSION")
                .unwrap_or_else(|| DEFAULT_AZURE_API_VERSION.to_string());
            Ok(Box::new(AzureOpenAi::new(key, endpoint, model, version)))
        }
        "anthropic" => {
            let key = require(config, "ANTHROPIC_API_KEY")?;
            let mut client = Anthropic::new(key).model(model);
            if let Some(base) = config.get("ANTHROPIC_BASE_URL") {
                client = client.base_url(base);
            }
            Ok(Box::new(client))
        }
        "ollama" => {
            let mut client = Ollama::new().model(model);
            if let Some(base) = config.get("OLLAMA_BASE_URL") {
                client = client.base_url(base);
            }
            Ok(Box::new(client))
        }
        "gemini" => {
            let key = require(config, "GOOGLE_API_KEY")?;
            Ok(Box::new(Gemini::new(key).model(model)))
        }
        other => Err(LlmError::Configuration(format!(
            "unknown provider prefix '{other}' in '{model_ref}'"
        ))),
    }
}

/// Build the client named by the `LLM_MODEL` key.
///
/// # Errors
///
/// [`LlmError::Configuration`] when `LLM_MODEL` is unset, plus the
/// [`client_for_model`] errors.
pub fn client_from_env(config: &dyn ConfigReader) -> Result<Box<dyn ProviderClient>> {
    let model_ref = require(config, "LLM_MODEL")?;
    client_for_model(&model_ref, config)
}

fn require(config: &dyn ConfigReader, key: &str) -> Result<String> {
    config
        .get(key)
        .ok_or_else(|| LlmError::Configuration(format!("missing configuration key {key}")))
}
