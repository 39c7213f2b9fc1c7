//! Fallback-chain tests: providers share one scripted transport, so the
//! script order is the order the chain tries them in.

use std::sync::Arc;

use lens_core::ErrorKind;
use lens_core::config::{LlmBackend, LlmConfig};
use lens_core::error::ProviderFailure;
use lens_core::http::HttpTransport;
use lens_core::mock::ScriptedTransport;
use lens_llm::{CategorySuggester, FallbackChain, LlmError, LlmMessage, LocationDescription};
use serde_json::json;

fn full_config() -> LlmConfig {
    let mut config = LlmConfig::default();
    config.edge.api_url = Some("https://api.cloudflare.com/client/v4/accounts/acct/ai/run/".into());
    config.edge.api_key = Some("cf-token".into());
    config.hosted.api_key = Some("sk-test".into());
    config
}

fn chain(transport: &Arc<ScriptedTransport>, config: &LlmConfig) -> FallbackChain {
    let transport: Arc<dyn HttpTransport> = transport.clone();
    FallbackChain::from_config(config, &transport).expect("providers configured")
}

fn openai_reply(content: &str) -> serde_json::Value {
    json!({"choices": [{"message": {"role": "assistant", "content": content}}]})
}

#[test]
fn default_priority_is_edge_local_hosted() {
    let transport = Arc::new(ScriptedTransport::new());
    let chain = chain(&transport, &full_config());
    assert_eq!(chain.provider_names(), vec!["cloudflare", "ollama", "openai"]);
}

#[test]
fn unconfigured_providers_are_skipped() {
    let transport = Arc::new(ScriptedTransport::new());
    let chain = chain(&transport, &LlmConfig::default());
    assert_eq!(chain.provider_names(), vec!["ollama"]);
}

#[test]
fn no_buildable_provider_is_an_error() {
    let mut config = LlmConfig::default();
    config.priority = vec![LlmBackend::Edge, LlmBackend::Hosted];
    let transport: Arc<dyn HttpTransport> = Arc::new(ScriptedTransport::new());

    let err = FallbackChain::from_config(&config, &transport).expect_err("nothing configured");
    assert!(matches!(err, LlmError::NoProviders));
}

#[tokio::test]
async fn falls_through_to_the_first_success() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push_json(500, &json!({"errors": ["overloaded"]}));
    transport.push_json(200, &json!({"done": true}));
    transport.push_json(200, &openai_reply("<ANSWER>Lighthouse</ANSWER>"));
    let chain = chain(&transport, &full_config());

    let completion = chain.complete(&[LlmMessage::user("a tall tower by the sea")]).await.expect("third provider");

    assert_eq!(completion.provider, "openai");
    assert_eq!(completion.text, "<ANSWER>Lighthouse</ANSWER>");
    assert_eq!(transport.call_count(), 3);
    let urls: Vec<String> = transport.requests().into_iter().map(|r| r.url).collect();
    assert!(urls[0].ends_with("@cf/mistral/mistral-7b-instruct-v0.1"));
    assert_eq!(urls[1], "http://localhost:11434/api/chat");
    assert_eq!(urls[2], "https://api.openai.com/v1/chat/completions");
}

#[tokio::test]
async fn first_success_stops_the_chain() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push_json(200, &json!({"success": true, "result": {"response": "<ANSWER>Mill</ANSWER>"}}));
    let chain = chain(&transport, &full_config());

    let completion = chain.complete(&[LlmMessage::user("x")]).await.expect("edge answers");
    assert_eq!(completion.provider, "cloudflare");
    assert_eq!(transport.call_count(), 1);
}

#[tokio::test]
async fn all_failing_returns_the_last_failure() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push_failure(ProviderFailure::network("dns error"));
    transport.push_json(200, &json!({"message": {}}));
    transport.push_json(200, &json!({"choices": []}));
    let chain = chain(&transport, &full_config());

    let err = chain.complete(&[LlmMessage::user("x")]).await.expect_err("all fail");
    assert_eq!(err.kind, ErrorKind::MalformedResponse);
    assert!(err.detail.contains("choices"));
}

#[tokio::test]
async fn untagged_answer_moves_to_next_provider() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push_json(200, &json!({"success": true, "result": {"response": "Probably a church."}}));
    transport.push_json(200, &json!({"message": {"content": "<ANSWER>Church</ANSWER>"}}));
    let chain = chain(&transport, &full_config());

    let answer = chain
        .ask(&lens_llm::prompt::SystemPrompt::default(), "steeple and pews")
        .await
        .expect("second provider tags its answer");
    assert_eq!(answer, "Church");
    assert_eq!(transport.call_count(), 2);
}

#[tokio::test]
async fn suggester_end_to_end() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push_json(
        200,
        &json!({"success": true, "result": {"response": "Looks like a dry cleaner. <ANSWER>Laundromat</ANSWER>"}}),
    );
    let suggester = CategorySuggester::new(chain(&transport, &full_config()));
    let location = LocationDescription {
        address: Some("312 Western Ave, Guilderland, NY".into()),
        place_name: Some("Master Cleaners".into()),
        ..LocationDescription::default()
    };

    let category = suggester.suggest(&location).await.expect("category");
    assert_eq!(category, "laundromat");

    let sent = &transport.requests()[0];
    let messages = sent.body.as_ref().expect("body")["messages"].clone();
    assert_eq!(messages[0]["role"], "system");
    assert!(messages[0]["content"].as_str().expect("system text").contains("google maps description may be helpful"));
    assert_eq!(messages[1]["role"], "user");
    assert!(messages[1]["content"].as_str().expect("user text").contains("google maps description: Master Cleaners"));
}

#[tokio::test]
async fn suggester_rejects_empty_description_without_calling() {
    let transport = Arc::new(ScriptedTransport::new());
    let suggester = CategorySuggester::new(chain(&transport, &full_config()));

    let err = suggester.suggest(&LocationDescription::default()).await.expect_err("no text");
    assert_eq!(err.kind, ErrorKind::InvalidQuery);
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test]
async fn suggester_rejects_short_categories() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push_json(200, &json!({"success": true, "result": {"response": "<ANSWER>Ok</ANSWER>"}}));
    let suggester = CategorySuggester::new(chain(&transport, &full_config()));
    let location = LocationDescription {
        title: Some("Old mill".into()),
        ..LocationDescription::default()
    };

    let err = suggester.suggest(&location).await.expect_err("too short");
    assert_eq!(err.kind, ErrorKind::MalformedResponse);
}

#[tokio::test]
async fn suggest_or_none_swallows_failures() {
    let transport = Arc::new(ScriptedTransport::new());
    let suggester = CategorySuggester::new(chain(&transport, &full_config()));
    let location = LocationDescription {
        notes: Some("boarded up".into()),
        ..LocationDescription::default()
    };

    assert_eq!(suggester.suggest_or_none(&location).await, None);
    assert_eq!(transport.call_count(), 3, "every provider was tried");
}
