use super::*;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(endpoint: &str) -> RerankConfig {
    RerankConfig {
        endpoint: endpoint.to_string(),
        api_key: Some("rerank-key".to_string()),
        model: "rerank-v3.5".to_string(),
        top_n: Some(2),
    }
}

fn docs() -> Vec<String> {
    vec![
        "Porto 2019: 1200 visitors".to_string(),
        "Lisbon 2019: 3400 visitors".to_string(),
        "Faro 2019: 800 visitors".to_string(),
    ]
}

#[test]
fn apply_ranking_reorders_and_filters() {
    let ranking = [
        RerankedDocument {
            index: 2,
            score: 0.9,
        },
        RerankedDocument {
            index: 0,
            score: 0.4,
        },
    ];
    let reordered = apply_ranking(docs(), &ranking);
    assert_eq!(
        reordered,
        vec![
            "Faro 2019: 800 visitors".to_string(),
            "Porto 2019: 1200 visitors".to_string()
        ]
    );
}

#[test]
fn apply_ranking_ignores_duplicates_and_out_of_range() {
    let ranking = [
        RerankedDocument {
            index: 1,
            score: 0.9,
        },
        RerankedDocument {
            index: 1,
            score: 0.8,
        },
        RerankedDocument {
            index: 7,
            score: 0.1,
        },
    ];
    let reordered = apply_ranking(docs(), &ranking);
    assert_eq!(reordered, vec!["Lisbon 2019: 3400 visitors".to_string()]);
}

#[tokio::test(flavor = "multi_thread")]
async fn rerank_request_and_ordering() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/rerank"))
        .and(body_partial_json(json!({
            "model": "rerank-v3.5",
            "query": "Lisbon visitors",
            "top_n": 2
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [
                {"index": 0, "relevance_score": 0.2},
                {"index": 1, "relevance_score": 0.95}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let reranker =
        HttpReranker::new(&config(&format!("{}/v2", server.uri()))).expect("should build");
    let ranking = reranker
        .rerank("Lisbon visitors", &docs())
        .await
        .expect("rerank should succeed");

    assert_eq!(ranking.len(), 2);
    assert_eq!(ranking[0].index, 1);
    assert_eq!(ranking[1].index, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn out_of_range_index_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"index": 9, "relevance_score": 0.5}]
        })))
        .mount(&server)
        .await;

    let reranker = HttpReranker::new(&config(&server.uri())).expect("should build");
    let result = reranker.rerank("query", &docs()).await;
    assert!(matches!(result, Err(RagError::Rerank(_))));
}

#[tokio::test]
async fn empty_documents_skip_the_request() {
    let reranker = HttpReranker::new(&config("http://127.0.0.1:9")).expect("should build");
    let ranking = reranker
        .rerank("query", &[])
        .await
        .expect("empty input should succeed");
    assert!(ranking.is_empty());
}
