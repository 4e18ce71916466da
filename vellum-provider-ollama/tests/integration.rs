//! Integration tests for the Ollama provider using wiremock.

use vellum_provider_ollama::Ollama;
use vellum_types::{CompletionOptions, Conversation, Message, ProviderClient, StreamedChunk};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn conversation() -> Conversation {
    Conversation::from_messages(vec![Message::user("Hello")])
}

#[tokio::test]
async fn complete_posts_to_api_chat() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "model": "llama3.2",
            "message": { "role": "assistant", "content": "Hello! How can I help?" },
            "done": true,
            "done_reason": "stop",
            "prompt_eval_count": 20,
            "eval_count": 10,
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = Ollama::new().base_url(server.uri());
    let completion = client
        .complete(&conversation(), &CompletionOptions::default())
        .await
        .unwrap();
    assert_eq!(completion.content, "Hello! How can I help?");
    assert_eq!(completion.model, "llama3.2");
    assert_eq!(completion.usage.unwrap().prompt_tokens, 20);
}

#[tokio::test]
async fn assistant_content_serialized_as_string_never_null() {
    let server = MockServer::start().await;
    // The matcher asserts the assistant message's content is "" (a string).
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(serde_json::json!({
            "messages": [
                { "role": "user", "content": "Hello" },
                { "role": "assistant", "content": "" }
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "model": "llama3.2",
            "message": { "role": "assistant", "content": "ok" },
            "done": true,
        })))
        .expect(1)
        .mount(&server)
        .await;

    let conv = conversation().with_message(Message::assistant_with_tools(
        "",
        vec![vellum_types::ToolCall::new(
            "ollama_0",
            "search",
            serde_json::json!({"q": "x"}),
        )],
    ));
    let client = Ollama::new().base_url(server.uri());
    client
        .complete(&conv, &CompletionOptions::default())
        .await
        .unwrap();
}

#[tokio::test]
async fn tool_calls_parse_with_synthesized_ids() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "model": "llama3.2",
            "message": {
                "role": "assistant",
                "content": "",
                "tool_calls": [{
                    "function": { "name": "get_weather", "arguments": { "location": "Paris" } }
                }]
            },
            "done": true,
            "done_reason": "tool_calls",
        })))
        .mount(&server)
        .await;

    let client = Ollama::new().base_url(server.uri());
    let completion = client
        .complete(&conversation(), &CompletionOptions::default())
        .await
        .unwrap();
    assert_eq!(completion.tool_calls[0].id, "ollama_0");
    assert_eq!(completion.tool_calls[0].arguments["location"], "Paris");
}

#[tokio::test]
async fn ndjson_stream_folds_into_completion() {
    let ndjson = concat!(
        "{\"model\":\"llama3.2\",\"message\":{\"role\":\"assistant\",\"content\":\"Hel\"},\"done\":false}\n",
        "{\"model\":\"llama3.2\",\"message\":{\"role\":\"assistant\",\"content\":\"lo\"},\"done\":false}\n",
        "{\"model\":\"llama3.2\",\"message\":{\"role\":\"assistant\",\"content\":\"\"},\"done\":true,\"done_reason\":\"stop\",\"eval_count\":4,\"prompt_eval_count\":6}\n",
    );

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(ndjson.as_bytes().to_vec(), "application/x-ndjson"),
        )
        .mount(&server)
        .await;

    let client = Ollama::new().base_url(server.uri());
    let mut streamed = String::new();
    let mut sink = |chunk: StreamedChunk| {
        if let Some(text) = chunk.content {
            streamed.push_str(&text);
        }
    };
    let completion = client
        .stream_complete(&conversation(), &CompletionOptions::default(), &mut sink)
        .await
        .unwrap();
    assert_eq!(streamed, "Hello");
    assert_eq!(completion.content, "Hello");
    assert_eq!(completion.usage.unwrap().total_tokens, 10);
}

#[tokio::test]
async fn server_error_maps_to_service() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(500).set_body_string("model crashed"))
        .mount(&server)
        .await;

    let client = Ollama::new()
        .base_url(server.uri())
        .retry(vellum_types::RetryPolicy::none());
    let err = client
        .complete(&conversation(), &CompletionOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, vellum_types::LlmError::Service { status: 500, .. }));
    assert!(err.is_recoverable());
}
