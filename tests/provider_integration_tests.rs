use textlens::inference::{
    AnthropicProvider, ChatProvider, ChatRequest, Conversation, GeminiProvider, OpenAiProvider,
    ProviderError, StreamChunk, ToolDefinition,
};
use tokio::sync::mpsc;
use wiremock::{
    matchers::{body_partial_json, header, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

// ============================================================================
// Helper Functions
// ============================================================================

fn test_conversation() -> Conversation {
    let mut conversation = Conversation::new();
    conversation.push_user("Hello");
    conversation
}

fn request<'a>(conversation: &'a Conversation, tools: &'a [ToolDefinition], stream: bool) -> ChatRequest<'a> {
    ChatRequest {
        conversation,
        system_prompt: "be brief",
        model: "test-model",
        tools,
        stream,
    }
}

/// Collects streamed content deltas once the sender side has dropped.
async fn collect_content(mut receiver: mpsc::Receiver<StreamChunk>) -> Vec<String> {
    let mut chunks = Vec::new();
    while let Some(StreamChunk::Content(s)) = receiver.recv().await {
        chunks.push(s);
    }
    chunks
}

// ============================================================================
// OpenAI-compatible Provider Tests
// ============================================================================

#[tokio::test]
async fn test_openai_streams_content_deltas() {
    let mock_server = MockServer::start().await;

    let sse_response = "\
data: {\"choices\":[{\"delta\":{\"role\":\"assistant\",\"content\":\"\"}}]}

data: {\"choices\":[{\"delta\":{\"content\":\"Hello\"}}]}

data: {\"choices\":[{\"delta\":{\"content\":\" world\"}}]}

data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}

data: [DONE]
";

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("Authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_string(sse_response))
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::new("test-key".to_string(), Some(mock_server.uri()));
    let conversation = test_conversation();
    let (tx, rx) = mpsc::channel(32);

    let outcome = provider
        .complete(request(&conversation, &[], true), tx)
        .await
        .unwrap();

    assert_eq!(outcome.text, "Hello world");
    assert!(outcome.tool_calls.is_empty());
    assert_eq!(collect_content(rx).await, vec!["Hello", " world"]);
}

#[tokio::test]
async fn test_openai_reassembles_fragmented_tool_call() {
    let mock_server = MockServer::start().await;

    let sse_response = "\
data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"call_1\",\"type\":\"function\",\"function\":{\"name\":\"web_search\",\"arguments\":\"\"}}]}}]}

data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"{\\\"qu\"}}]}}]}

data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"ery\\\":\\\"cats\\\"}\"}}]}}]}

data: [DONE]
";

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_string(sse_response))
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::new("test-key".to_string(), Some(mock_server.uri()));
    let conversation = test_conversation();
    let (tx, _rx) = mpsc::channel(32);

    let outcome = provider
        .complete(request(&conversation, &[], true), tx)
        .await
        .unwrap();

    assert_eq!(outcome.tool_calls.len(), 1);
    assert_eq!(outcome.tool_calls[0].id, "call_1");
    assert_eq!(outcome.tool_calls[0].name, "web_search");
    let args: serde_json::Value =
        serde_json::from_str(&outcome.tool_calls[0].arguments).unwrap();
    assert_eq!(args["query"], "cats");
}

#[tokio::test]
async fn test_openai_malformed_frame_is_skipped() {
    let mock_server = MockServer::start().await;

    let sse_response = "\
data: {\"choices\":[{\"delta\":{\"content\":\"Good\"}}]}

data: {not valid json at all

data: {\"choices\":[{\"delta\":{\"content\":\" still good\"}}]}

data: [DONE]
";

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_string(sse_response))
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::new("test-key".to_string(), Some(mock_server.uri()));
    let conversation = test_conversation();
    let (tx, _rx) = mpsc::channel(32);

    let outcome = provider
        .complete(request(&conversation, &[], true), tx)
        .await
        .unwrap();

    assert_eq!(outcome.text, "Good still good");
}

#[tokio::test]
async fn test_openai_non_streaming_response() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(serde_json::json!({"stream": false})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": "A settled answer.",
                    "tool_calls": [{
                        "id": "call_9",
                        "type": "function",
                        "function": {"name": "web_search", "arguments": "{\"query\":\"gdp\"}"}
                    }]
                }
            }]
        })))
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::new("test-key".to_string(), Some(mock_server.uri()));
    let conversation = test_conversation();
    let (tx, _rx) = mpsc::channel(32);

    let outcome = provider
        .complete(request(&conversation, &[], false), tx)
        .await
        .unwrap();

    assert_eq!(outcome.text, "A settled answer.");
    assert_eq!(outcome.tool_calls.len(), 1);
    assert_eq!(outcome.tool_calls[0].id, "call_9");
}

#[tokio::test]
async fn test_openai_api_error_carries_status_and_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::new("bad-key".to_string(), Some(mock_server.uri()));
    let conversation = test_conversation();
    let (tx, _rx) = mpsc::channel(32);

    let err = provider
        .complete(request(&conversation, &[], true), tx)
        .await
        .unwrap_err();

    match err {
        ProviderError::Api { status, message } => {
            assert_eq!(status, 401);
            assert!(message.contains("invalid api key"));
        }
        other => panic!("expected API error, got {other}"),
    }
}

#[tokio::test]
async fn test_openai_dropped_receiver_reports_channel_closed() {
    let mock_server = MockServer::start().await;

    let sse_response = "\
data: {\"choices\":[{\"delta\":{\"content\":\"Hello\"}}]}

data: {\"choices\":[{\"delta\":{\"content\":\" world\"}}]}

data: [DONE]
";

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_string(sse_response))
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::new("test-key".to_string(), Some(mock_server.uri()));
    let conversation = test_conversation();
    let (tx, rx) = mpsc::channel(32);
    drop(rx);

    let err = provider
        .complete(request(&conversation, &[], true), tx)
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::ChannelClosed));
}

#[tokio::test]
async fn test_openrouter_sends_app_title_header() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("X-Title", "textlens"))
        .respond_with(ResponseTemplate::new(200).set_body_string("data: [DONE]\n"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::openrouter("test-key".to_string(), Some(mock_server.uri()));
    let conversation = test_conversation();
    let (tx, _rx) = mpsc::channel(32);

    let outcome = provider
        .complete(request(&conversation, &[], true), tx)
        .await
        .unwrap();
    assert_eq!(outcome.text, "");
}

// ============================================================================
// Anthropic Provider Tests
// ============================================================================

#[tokio::test]
async fn test_anthropic_streams_text_deltas() {
    let mock_server = MockServer::start().await;

    let sse_response = "\
event: message_start
data: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_1\"}}

event: content_block_start
data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}

event: content_block_delta
data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hello\"}}

event: content_block_delta
data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\" world\"}}

event: message_stop
data: {\"type\":\"message_stop\"}
";

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "test-key"))
        .and(header("anthropic-version", "2023-06-01"))
        .respond_with(ResponseTemplate::new(200).set_body_string(sse_response))
        .mount(&mock_server)
        .await;

    let provider = AnthropicProvider::new("test-key".to_string(), Some(mock_server.uri()));
    let conversation = test_conversation();
    let (tx, rx) = mpsc::channel(32);

    let outcome = provider
        .complete(request(&conversation, &[], true), tx)
        .await
        .unwrap();

    assert_eq!(outcome.text, "Hello world");
    assert_eq!(collect_content(rx).await, vec!["Hello", " world"]);
}

#[tokio::test]
async fn test_anthropic_accumulates_tool_use_block() {
    let mock_server = MockServer::start().await;

    let sse_response = "\
event: content_block_start
data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"tool_use\",\"id\":\"toolu_1\",\"name\":\"web_search\",\"input\":{}}}

event: content_block_delta
data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"{\\\"qu\"}}

event: content_block_delta
data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"ery\\\":\\\"cats\\\"}\"}}

event: message_stop
data: {\"type\":\"message_stop\"}
";

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_string(sse_response))
        .mount(&mock_server)
        .await;

    let provider = AnthropicProvider::new("test-key".to_string(), Some(mock_server.uri()));
    let conversation = test_conversation();
    let (tx, _rx) = mpsc::channel(32);

    let outcome = provider
        .complete(request(&conversation, &[], true), tx)
        .await
        .unwrap();

    assert_eq!(outcome.tool_calls.len(), 1);
    assert_eq!(outcome.tool_calls[0].name, "web_search");
    let args: serde_json::Value =
        serde_json::from_str(&outcome.tool_calls[0].arguments).unwrap();
    assert_eq!(args["query"], "cats");
}

#[tokio::test]
async fn test_anthropic_non_streaming_response() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(body_partial_json(serde_json::json!({"system": "be brief"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "content": [
                {"type": "text", "text": "Checking. "},
                {"type": "tool_use", "id": "toolu_2", "name": "web_search", "input": {"query": "gdp"}}
            ]
        })))
        .mount(&mock_server)
        .await;

    let provider = AnthropicProvider::new("test-key".to_string(), Some(mock_server.uri()));
    let conversation = test_conversation();
    let (tx, _rx) = mpsc::channel(32);

    let outcome = provider
        .complete(request(&conversation, &[], false), tx)
        .await
        .unwrap();

    assert_eq!(outcome.text, "Checking. ");
    assert_eq!(outcome.tool_calls.len(), 1);
    let args: serde_json::Value =
        serde_json::from_str(&outcome.tool_calls[0].arguments).unwrap();
    assert_eq!(args["query"], "gdp");
}

// ============================================================================
// Gemini Provider Tests
// ============================================================================

#[tokio::test]
async fn test_gemini_streams_candidate_parts() {
    let mock_server = MockServer::start().await;

    let sse_response = "\
data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Hello\"}],\"role\":\"model\"}}]}

data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\" world\"}],\"role\":\"model\"}}]}
";

    Mock::given(method("POST"))
        .and(path("/v1beta/models/test-model:streamGenerateContent"))
        .and(query_param("alt", "sse"))
        .and(query_param("key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_string(sse_response))
        .mount(&mock_server)
        .await;

    let provider = GeminiProvider::new("test-key".to_string(), Some(mock_server.uri()));
    let conversation = test_conversation();
    let (tx, rx) = mpsc::channel(32);

    let outcome = provider
        .complete(request(&conversation, &[], true), tx)
        .await
        .unwrap();

    assert_eq!(outcome.text, "Hello world");
    assert!(outcome.tool_calls.is_empty());
    assert_eq!(collect_content(rx).await, vec!["Hello", " world"]);
}

#[tokio::test]
async fn test_gemini_non_streamed_round_withholds_deltas() {
    let mock_server = MockServer::start().await;

    let sse_response =
        "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Quiet answer\"}],\"role\":\"model\"}}]}\n";

    Mock::given(method("POST"))
        .and(path("/v1beta/models/test-model:streamGenerateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_string(sse_response))
        .mount(&mock_server)
        .await;

    let provider = GeminiProvider::new("test-key".to_string(), Some(mock_server.uri()));
    let conversation = test_conversation();
    let (tx, rx) = mpsc::channel(32);

    let outcome = provider
        .complete(request(&conversation, &[], false), tx)
        .await
        .unwrap();

    assert_eq!(outcome.text, "Quiet answer");
    assert!(collect_content(rx).await.is_empty());
}

// ============================================================================
// Stream / Non-stream Equivalence
// ============================================================================

#[tokio::test]
async fn test_openai_stream_and_non_stream_agree() {
    let mock_server = MockServer::start().await;

    let sse_response = "\
data: {\"choices\":[{\"delta\":{\"content\":\"one \"}}]}

data: {\"choices\":[{\"delta\":{\"content\":\"two \"}}]}

data: {\"choices\":[{\"delta\":{\"content\":\"three\"}}]}

data: [DONE]
";

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(serde_json::json!({"stream": true})))
        .respond_with(ResponseTemplate::new(200).set_body_string(sse_response))
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(serde_json::json!({"stream": false})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "one two three"}}]
        })))
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::new("test-key".to_string(), Some(mock_server.uri()));
    let conversation = test_conversation();

    let (tx, _rx) = mpsc::channel(32);
    let streamed = provider
        .complete(request(&conversation, &[], true), tx)
        .await
        .unwrap();

    let (tx, _rx) = mpsc::channel(32);
    let settled = provider
        .complete(request(&conversation, &[], false), tx)
        .await
        .unwrap();

    assert_eq!(streamed.text, settled.text);
}
