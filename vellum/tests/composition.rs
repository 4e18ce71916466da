//! End-to-end scenarios across the facade: router → provider → agent →
//! tools → retrieval, all against a wiremock backend.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use vellum::{
    Agent, AgentStatus, ContextAugmenter, ContextPipeline, ConversationTokenCounter,
    DocumentChunk, FusionStrategy, HeuristicTokenizer, HybridSearcher, InMemoryKeywordIndex,
    InMemoryVectorStore, KeywordIndex, Message, ParameterSchema, PrincipalId, PruneStrategy, RagEngine, Result,
    StaticConfigReader, Tool, ToolRegistry, UserAuthorization, VectorRecord, VectorStore,
    client_for_model,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn chat_response(content: &str) -> serde_json::Value {
    serde_json::json!({
        "id": "chatcmpl-1",
        "created": 1_700_000_000,
        "model": "gpt-4o",
        "choices": [{
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }],
        "usage": { "prompt_tokens": 10, "completion_tokens": 1, "total_tokens": 11 }
    })
}

fn tool_call_response() -> serde_json::Value {
    serde_json::json!({
        "id": "chatcmpl-2",
        "created": 1_700_000_000,
        "model": "gpt-4o",
        "choices": [{
            "message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": {
                        "name": "get_weather",
                        "arguments": "{\"location\":\"Paris\",\"units\":\"celsius\"}"
                    }
                }]
            },
            "finish_reason": "tool_calls"
        }]
    })
}

fn config_for(server: &MockServer) -> StaticConfigReader {
    let uri = server.uri();
    StaticConfigReader::from_pairs([
        ("OPENAI_API_KEY", "sk-test"),
        ("OPENAI_BASE_URL", uri.as_str()),
    ])
}

#[tokio::test]
async fn routed_client_answers_a_simple_question() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_response("4")))
        .mount(&server)
        .await;

    let provider = client_for_model("openai/gpt-4o", &config_for(&server)).unwrap();
    let agent = Agent::new(Arc::from(provider));
    let state = agent
        .run(
            "What is 2+2? Answer with just the number.",
            &ToolRegistry::new(),
        )
        .await
        .unwrap();
    assert_eq!(state.status, AgentStatus::Done);
    assert_eq!(state.final_response(), Some("4"));
}

#[tokio::test]
async fn weather_tool_roundtrip_through_real_wire_format() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(tool_call_response()))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(chat_response("It's 20°C and cloudy in Paris.")),
        )
        .mount(&server)
        .await;

    let mut registry = ToolRegistry::new();
    registry
        .register(Tool::from_fn(
            "get_weather",
            "Current weather for a location",
            ParameterSchema::object(
                [
                    ("location", ParameterSchema::string("City name")),
                    (
                        "units",
                        ParameterSchema::string_enum(&["celsius", "fahrenheit"]),
                    ),
                ],
                &["location", "units"],
            ),
            |_| Ok(serde_json::json!({"temp": 20, "cond": "cloudy"})),
        ))
        .unwrap();

    let provider = client_for_model("openai/gpt-4o", &config_for(&server)).unwrap();
    let agent = Agent::new(Arc::from(provider));
    let state = agent
        .run("Weather in Paris in celsius?", &registry)
        .await
        .unwrap();

    assert_eq!(state.status, AgentStatus::Done);
    let messages = &state.conversation.messages;
    let n = messages.len();
    assert!(matches!(
        &messages[n - 3],
        Message::Assistant { tool_calls, .. } if tool_calls[0].id == "call_1"
    ));
    assert!(matches!(
        &messages[n - 2],
        Message::Tool { content, tool_call_id }
            if content == "{\"temp\":20,\"cond\":\"cloudy\"}" && tool_call_id == "call_1"
    ));
    assert_eq!(state.final_response(), Some("It's 20°C and cloudy in Paris."));
    assert!(state.conversation.validate().is_ok());
}

/// Retrieval augmenter backed by the permissioned RAG engine.
struct RagAugmenter {
    engine: Arc<RagEngine>,
    auth: UserAuthorization,
}

#[async_trait]
impl ContextAugmenter for RagAugmenter {
    async fn augment(&self, _query: &str) -> Result<Option<String>> {
        // A real deployment embeds the query; the corpus here is tiny
        // enough to use a fixed probe vector.
        let hits = self.engine.query(&self.auth, "kb/**", &[1.0, 0.0], 2).await?;
        if hits.is_empty() {
            return Ok(None);
        }
        let snippets: Vec<&str> = hits
            .iter()
            .filter_map(|h| h.record.content.as_deref())
            .collect();
        Ok(Some(format!("Relevant documents:\n{}", snippets.join("\n"))))
    }
}

#[tokio::test]
async fn retrieval_feeds_the_system_prompt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_response("Paris, of course.")))
        .mount(&server)
        .await;

    let engine = Arc::new(RagEngine::new(Arc::new(InMemoryVectorStore::new())));
    engine
        .register_collection("kb/geo", BTreeSet::new(), BTreeMap::new())
        .unwrap();
    engine
        .ingest(
            "kb/geo",
            "capitals",
            vec![DocumentChunk {
                content: "The capital of France is Paris.".into(),
                embedding: vec![1.0, 0.0],
            }],
            BTreeMap::new(),
            BTreeSet::new(),
        )
        .await
        .unwrap();

    let provider = client_for_model("openai/gpt-4o", &config_for(&server)).unwrap();
    let agent = Agent::new(Arc::from(provider)).augmenter(Arc::new(RagAugmenter {
        engine,
        auth: UserAuthorization::for_user(PrincipalId::user(1), []),
    }));
    let state = agent
        .run("What is the capital of France?", &ToolRegistry::new())
        .await
        .unwrap();

    assert_eq!(state.status, AgentStatus::Done);
    // The injected system message precedes the user question.
    assert!(matches!(
        &state.conversation.messages[0],
        Message::System { content } if content.contains("capital of France is Paris")
    ));
}

#[tokio::test]
async fn hybrid_retrieval_composes_with_the_store() {
    let store = Arc::new(InMemoryVectorStore::new());
    let index = Arc::new(InMemoryKeywordIndex::new());
    store
        .upsert(
            VectorRecord::new("scala-guide", vec![0.85, 0.15, 0.0])
                .with_content("Scala functional programming guide"),
        )
        .await
        .unwrap();
    index
        .upsert(
            "scala-guide",
            "Scala functional programming guide",
            BTreeMap::new(),
        )
        .await
        .unwrap();

    let searcher = HybridSearcher::new(store, index);
    let results = searcher
        .search(
            &[0.85, 0.15, 0.0],
            "Scala functional programming",
            3,
            None,
            FusionStrategy::default(),
        )
        .await
        .unwrap();
    assert_eq!(results[0].id, "scala-guide");
    assert!(results[0].vector_score.is_some() && results[0].keyword_score.is_some());
}

#[test]
fn context_pipeline_holds_the_budget_postcondition() {
    let counter = ConversationTokenCounter::new(HeuristicTokenizer::new());
    let messages: Vec<Message> = (0..10)
        .flat_map(|i| {
            vec![
                Message::user(format!("question {i} with plenty of extra words to count")),
                Message::assistant(format!("answer {i} with plenty of extra words to count")),
            ]
        })
        .collect();

    let pipeline = ContextPipeline::new(150, 2, PruneStrategy::OldestPair);
    let result = pipeline.apply(&messages, &counter, 200, 50).unwrap();
    assert!(counter.count_messages(&result) <= 150);
    assert!(!result.is_empty());
}
