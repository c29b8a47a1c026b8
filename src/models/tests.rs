use super::*;

#[test]
fn message_constructors() {
    assert_eq!(ChatMessage::system("role").role, Role::System);
    assert_eq!(ChatMessage::user("question").content, "question");
    assert_eq!(ChatMessage::assistant("answer").role, Role::Assistant);
}

#[test]
fn message_wire_format() {
    let json = serde_json::to_value(ChatMessage::user("hello")).expect("should serialize");
    assert_eq!(json, serde_json::json!({"role": "user", "content": "hello"}));
}

#[test]
fn provider_from_default_config() {
    let config = Config::default();
    let provider = ModelProvider::from_config(&config).expect("should build provider");
    assert_eq!(provider.embeddings.dimension(), 1536);
    assert!(provider.reranker.is_none());
}

#[test]
fn provider_with_reranker() {
    let config = Config {
        rerank: Some(crate::config::RerankConfig::default()),
        ..Config::default()
    };
    let provider = ModelProvider::from_config(&config).expect("should build provider");
    assert!(provider.reranker.is_some());
}
