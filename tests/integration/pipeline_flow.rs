//! End-to-end query pipeline tests: cache, validation and the strict retry

use super::test_utils::{query_input, StubProvider};
use heyman::cache::CacheStore;
use heyman::error::ApiError;
use heyman::executor::ExecutionMode;
use heyman::pipeline::{QueryPipeline, Warning};
use heyman::prompt::REFUSAL_SENTINEL;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn pipeline(provider: Arc<StubProvider>, cache: Option<CacheStore>) -> QueryPipeline {
    QueryPipeline::new(provider, cache)
}

#[tokio::test]
async fn test_second_identical_query_is_served_from_cache() {
    let temp = TempDir::new().unwrap();
    let provider = Arc::new(StubProvider::new(&["ls -lS"]));
    let cache = CacheStore::new(temp.path(), 30).unwrap();
    let pipeline = pipeline(Arc::clone(&provider), Some(cache));
    let input = query_input("ls", "sort by size", "llama3:8b");
    let cancel = CancellationToken::new();

    let first = pipeline.run(&input, &cancel).await.unwrap();
    assert_eq!(first.parsed.command, "ls -lS");
    assert!(!first.response.cached);

    let second = pipeline.run(&input, &cancel).await.unwrap();
    assert_eq!(second.parsed.command, "ls -lS");
    assert!(second.response.cached);
    assert_eq!(second.response.tokens_input, 100);
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn test_bypass_skips_lookup_but_refreshes_entry() {
    let temp = TempDir::new().unwrap();
    let provider = Arc::new(StubProvider::new(&["ls -l", "ls -lS"]));
    let pipeline = pipeline(
        Arc::clone(&provider),
        Some(CacheStore::new(temp.path(), 30).unwrap()),
    );
    let mut input = query_input("ls", "sort by size", "llama3:8b");
    let cancel = CancellationToken::new();

    pipeline.run(&input, &cancel).await.unwrap();
    input.bypass_cache = true;
    let fresh = pipeline.run(&input, &cancel).await.unwrap();
    assert_eq!(fresh.parsed.command, "ls -lS");
    assert_eq!(provider.calls(), 2);

    input.bypass_cache = false;
    let cached = pipeline.run(&input, &cancel).await.unwrap();
    assert!(cached.response.cached);
    assert_eq!(cached.parsed.command, "ls -lS");
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn test_malformed_answer_retried_once_and_retry_cached() {
    let temp = TempDir::new().unwrap();
    let provider = Arc::new(StubProvider::new(&[
        "You can use the following:\n\ngrep -rn pattern .",
        "grep -rn pattern .",
    ]));
    let pipeline = pipeline(
        Arc::clone(&provider),
        Some(CacheStore::new(temp.path(), 30).unwrap()),
    );
    let input = query_input("grep", "search recursively with line numbers", "gpt-4o-mini");
    let cancel = CancellationToken::new();

    let outcome = pipeline.run(&input, &cancel).await.unwrap();
    assert!(outcome.retried);
    assert_eq!(outcome.parsed.command, "grep -rn pattern .");
    assert_eq!(provider.calls(), 2);

    // The retry carries the original prompt plus the strict instruction
    let requests = provider.requests.lock().unwrap().clone();
    assert!(requests[1].user_prompt.starts_with(&input.user_prompt));
    assert!(requests[1].user_prompt.ends_with(&input.retry_prompt));

    let again = pipeline.run(&input, &cancel).await.unwrap();
    assert!(again.response.cached);
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn test_repeated_refusal_is_not_found() {
    let provider = Arc::new(StubProvider::new(&[REFUSAL_SENTINEL]));
    let pipeline = pipeline(Arc::clone(&provider), None);

    let result = pipeline
        .run(
            &query_input("tar", "upload to s3", "llama3"),
            &CancellationToken::new(),
        )
        .await;
    assert!(matches!(result, Err(ApiError::NotFoundInReference)));
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn test_two_bad_answers_fail_without_caching() {
    let temp = TempDir::new().unwrap();
    let provider = Arc::new(StubProvider::new(&["rm -rf /", "find . -name x"]));
    let cache = CacheStore::new(temp.path(), 30).unwrap();
    let pipeline = pipeline(Arc::clone(&provider), Some(cache));

    let result = pipeline
        .run(
            &query_input("ls", "list files", "llama3"),
            &CancellationToken::new(),
        )
        .await;
    assert!(matches!(result, Err(ApiError::RetryFailed(_))));

    let stats = CacheStore::new(temp.path(), 30).unwrap().stats().unwrap();
    assert_eq!(stats.total_entries, 0);
}

#[tokio::test]
async fn test_blocking_and_progressive_agree() {
    let provider = Arc::new(StubProvider::new(&["du -sh *"]));
    let pipeline = pipeline(Arc::clone(&provider), None);
    let mut input = query_input("du", "size of each entry", "llama3");
    let cancel = CancellationToken::new();

    input.mode = ExecutionMode::Blocking;
    let blocking = pipeline.run(&input, &cancel).await.unwrap();
    input.mode = ExecutionMode::Progressive;
    let progressive = pipeline.run(&input, &cancel).await.unwrap();

    assert_eq!(blocking.parsed, progressive.parsed);
    assert_eq!(blocking.response, progressive.response);
}

#[tokio::test]
async fn test_oversized_prompt_warns_but_still_answers() {
    let provider = Arc::new(StubProvider::new(&["ls -a"]));
    let pipeline = pipeline(provider, None);
    let mut input = query_input("ls", "show hidden files", "llama3");
    input.user_prompt = "x".repeat(4 * 600);
    input.context_window = 512;

    let outcome = pipeline
        .run(&input, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome.parsed.command, "ls -a");
    assert_eq!(
        outcome.warnings,
        vec![Warning::ContextOverrun {
            estimated: 600,
            budget: 512
        }]
    );
}
