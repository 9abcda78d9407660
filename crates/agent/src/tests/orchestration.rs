use std::sync::Arc;
use std::time::Duration;

use gamefi_core::{AppError, ErrorKind};
use gamefi_knowledge::embeddings::providers::MockProvider;
use gamefi_knowledge::{EmbeddingProvider, Sanitizer, SanitizerRules, Store};
use gamefi_prompt::stages::*;
use tokio_util::sync::CancellationToken;

use super::fake::{orchestrator, orchestrator_with, settings, store, tagged_prompts, text, Reply, ScriptedLlm, DIMS};
use crate::gateway::Gateway;
use crate::router::Router;
use crate::runtime::RunContext;
use crate::types::{Question, SubOutcome};
use crate::verifier::{Verdict, Verifier};

fn question(input: &str) -> Question {
    Question::new(input, "llama3").with_conversation_id("test")
}

fn verifier(llm: Arc<ScriptedLlm>, store: Arc<dyn Store>, checks: usize) -> Verifier {
    let gateway = Arc::new(Gateway::new(llm, Arc::new(tagged_prompts())));
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(MockProvider::new(DIMS));
    let router = Arc::new(Router::new(
        Arc::clone(&gateway),
        embedder,
        store,
        Arc::new(Sanitizer::new(SanitizerRules::default()).unwrap()),
    ));
    Verifier::new(gateway, router, checks)
}

fn ctx() -> RunContext {
    RunContext::new("llama3", 5, Duration::from_secs(5), CancellationToken::new())
}

#[tokio::test]
async fn test_sql_question_end_to_end() {
    let llm = ScriptedLlm::new();
    llm.on(DECOMPOSE, vec![text("SUB QUESTIONS:\n1. select * from nft")])
        .on(CLASSIFY, vec![text("sql")])
        .on(SQL, vec![text("SQL: select * from nft;")])
        .on(ANSWER, vec![text("The nft table holds Axie #1 and Pixels Land #7.")])
        .on(HALLUCINATION, vec![text("NO")])
        .on(CORRECTNESS, vec![text("YES")])
        .on(SYNTHESIZE, vec![text("RESPONSE: The nft table lists Axie #1 and Pixels Land #7.")]);

    let orchestrator = orchestrator(Arc::clone(&llm)).await;
    let result = orchestrator.run(&question("select * from nft")).await.unwrap();

    assert_eq!(result.answer, "The nft table lists Axie #1 and Pixels Land #7.");
    assert_eq!(result.sub_answers.len(), 1);
    assert_eq!(
        result.sub_answers[0].outcome,
        SubOutcome::Answered("The nft table holds Axie #1 and Pixels Land #7.".to_string())
    );

    let calls = llm.calls();
    let sql_call = calls.iter().find(|c| c.stage == SQL).unwrap();
    assert!(sql_call.user.contains("\"opensea_slug\":\"axie\""));
    assert!(sql_call.user.contains("nft: collection_slug TEXT"));
    assert!(sql_call.user.ends_with("QUERY:\nselect * from nft\n"));

    let answer_call = calls.iter().find(|c| c.stage == ANSWER).unwrap();
    assert!(answer_call.user.contains("Table: sql_result\n"));
    assert!(answer_call.user.contains("    name: Pixels Land #7\n"));
    assert!(!answer_call.user.contains("embedding"));

    let synth_call = calls.iter().find(|c| c.stage == SYNTHESIZE).unwrap();
    assert!(synth_call.user.contains(
        "SUB QUERIES AND ANSWERS:\n1. Sub-question: select * from nft\nAnswer: The nft table holds"
    ));
    assert_eq!(llm.count(CORRECTNESS), 1);
}

#[tokio::test]
async fn test_documents_question_without_matches_falls_back_to_default() {
    let llm = ScriptedLlm::new();
    llm.on(DECOMPOSE, vec![text("What is GameFi?")])
        .on(CLASSIFY, vec![text("documents")])
        .on(
            ANSWER,
            vec![
                text("GameFi combines games and decentralized finance."),
                text("GameFi games such as Axie reward players with tokens."),
            ],
        )
        .on(HALLUCINATION, vec![text("NO")])
        .on(CORRECTNESS, vec![text("NO")])
        .on(SYNTHESIZE, vec![text("GameFi games reward players with tokens.")]);

    let orchestrator = orchestrator_with(Arc::clone(&llm), store(false).await, settings());
    let result = orchestrator.run(&question("What is GameFi?")).await.unwrap();

    assert_eq!(result.sub_answers.len(), 1);
    assert_eq!(result.sub_answers[0].sub_question, "What is GameFi?");
    assert_eq!(
        result.sub_answers[0].outcome,
        SubOutcome::Answered("GameFi games such as Axie reward players with tokens.".to_string())
    );
    assert_eq!(result.answer, "GameFi games reward players with tokens.");

    let answers: Vec<_> = llm.calls().into_iter().filter(|c| c.stage == ANSWER).collect();
    assert_eq!(answers.len(), 2);
    assert!(answers[0].user.contains("Relevant Documents:\n"));
    assert!(!answers[0].user.contains("Document 1:"));
    assert!(answers[1].user.contains("Table: nft\n"));
    assert_eq!(llm.count(CORRECTNESS), 1);
}

#[tokio::test]
async fn test_fan_out_returns_one_entry_per_sub_question() {
    let llm = ScriptedLlm::new();
    llm.on(
        DECOMPOSE,
        vec![text(
            "SUB QUESTIONS:\n1. What is Axie?\n2. What is Pixels?\n3. What is Illuvium?",
        )],
    )
    .on_when(CLASSIFY, "Axie", vec![text("documents")])
    .on_when(CLASSIFY, "Pixels", vec![Reply::Fail("connection refused".to_string())])
    .on_when(CLASSIFY, "Illuvium", vec![Reply::Panic])
    .on(ANSWER, vec![text("Axie is a pet battler.")])
    .on(HALLUCINATION, vec![text("NO")])
    .on(CORRECTNESS, vec![text("YES")])
    .on(SYNTHESIZE, vec![text("RESPONSE: Only Axie could be answered.")]);

    let orchestrator = orchestrator(Arc::clone(&llm)).await;
    let result = orchestrator
        .run(&question("Compare Axie, Pixels and Illuvium"))
        .await
        .unwrap();

    assert_eq!(result.sub_answers.len(), 3);
    assert_eq!(result.sub_answers[0].sub_question, "What is Axie?");
    assert!(result.sub_answers[0].is_answered());
    assert_eq!(result.sub_answers[1].sub_question, "What is Pixels?");
    assert!(matches!(&result.sub_answers[1].outcome, SubOutcome::Failed(e) if e.contains("connection refused")));
    assert_eq!(result.sub_answers[2].sub_question, "What is Illuvium?");
    assert!(matches!(&result.sub_answers[2].outcome, SubOutcome::Failed(e) if e.contains("panicked")));

    let synth_call = llm.calls().into_iter().find(|c| c.stage == SYNTHESIZE).unwrap();
    assert!(synth_call.user.contains("2. Sub-question: What is Pixels?\nError answering sub-question:"));
    assert!(synth_call.user.contains("\n---\n\n3. Sub-question: What is Illuvium?"));
}

#[tokio::test]
async fn test_fan_out_respects_concurrency_of_one() {
    let llm = ScriptedLlm::new();
    llm.on(DECOMPOSE, vec![text("SUB QUESTIONS:\n1. One?\n2. Two?")])
        .on(CLASSIFY, vec![text("NA")])
        .on_when(DIRECT, "One?", vec![Reply::Slow(Duration::from_millis(50), "first".to_string())])
        .on_when(DIRECT, "Two?", vec![Reply::Slow(Duration::from_millis(10), "second".to_string())])
        .on(SYNTHESIZE, vec![text("both")]);

    let mut config = settings();
    config.max_concurrency = 1;
    let orchestrator = orchestrator_with(Arc::clone(&llm), store(true).await, config);
    let result = orchestrator.run(&question("One and two")).await.unwrap();

    assert_eq!(llm.peak_in_flight(), 1);
    let direct: Vec<_> = llm.calls().into_iter().filter(|c| c.stage == DIRECT).collect();
    assert_eq!(direct.len(), 2);
    assert_eq!(direct[0].user, "One?");
    assert_eq!(result.sub_answers[0].outcome, SubOutcome::Answered("first".to_string()));
    assert_eq!(result.sub_answers[1].outcome, SubOutcome::Answered("second".to_string()));
}

#[tokio::test]
async fn test_fan_out_caps_workers_in_flight() {
    for (max_concurrency, expected_peak) in [(2, 2), (8, 3)] {
        let llm = ScriptedLlm::new();
        llm.on(DECOMPOSE, vec![text("SUB QUESTIONS:\n1. A?\n2. B?\n3. C?")])
            .on(CLASSIFY, vec![text("NA")])
            .on(DIRECT, vec![Reply::Slow(Duration::from_millis(30), "answer".to_string())])
            .on(SYNTHESIZE, vec![text("all")]);

        let mut config = settings();
        config.max_concurrency = max_concurrency;
        let orchestrator = orchestrator_with(Arc::clone(&llm), store(true).await, config);
        let result = orchestrator.run(&question("A, B and C")).await.unwrap();

        assert_eq!(result.sub_answers.len(), 3);
        assert!(result.sub_answers.iter().all(|a| a.is_answered()));
        assert_eq!(
            llm.peak_in_flight(),
            expected_peak,
            "max_concurrency = {}",
            max_concurrency
        );
    }
}

#[tokio::test]
async fn test_decomposition_is_truncated() {
    let llm = ScriptedLlm::new();
    llm.on(
        DECOMPOSE,
        vec![text("SUB QUESTIONS:\n1. A?\n2. B?\n3. C?\n4. D?\n5. E?")],
    )
    .on(CLASSIFY, vec![text("NA")])
    .on(DIRECT, vec![text("answer")])
    .on(SYNTHESIZE, vec![text("done")]);

    let orchestrator = orchestrator(Arc::clone(&llm)).await;
    let result = orchestrator.run(&question("Five things")).await.unwrap();

    let asked: Vec<_> = result.sub_answers.iter().map(|a| a.sub_question.as_str()).collect();
    assert_eq!(asked, vec!["A?", "B?", "C?"]);
    assert_eq!(llm.count(DIRECT), 3);
}

#[tokio::test]
async fn test_na_answers_directly_without_verification() {
    let llm = ScriptedLlm::new();
    llm.on(DECOMPOSE, vec![text("SUB QUESTIONS:\n1. Say hello")])
        .on(CLASSIFY, vec![text("NA")])
        .on(DIRECT, vec![text("Hello!")])
        .on(SYNTHESIZE, vec![text("Hello!")]);

    let orchestrator = orchestrator(Arc::clone(&llm)).await;
    let result = orchestrator.run(&question("Say hello")).await.unwrap();

    assert_eq!(result.sub_answers[0].outcome, SubOutcome::Answered("Hello!".to_string()));
    assert_eq!(llm.count(ANSWER), 0);
    assert_eq!(llm.count(HALLUCINATION), 0);
    assert_eq!(llm.count(CORRECTNESS), 0);
}

#[tokio::test]
async fn test_malformed_classification_uses_default_sources() {
    let llm = ScriptedLlm::new();
    llm.on(DECOMPOSE, vec![text("SUB QUESTIONS:\n1. Tell me about Axie")])
        .on(CLASSIFY, vec![text("I would use sql for this")])
        .on(ANSWER, vec![text("Axie #1 is listed.")])
        .on(HALLUCINATION, vec![text("NO")])
        .on(CORRECTNESS, vec![text("YES")])
        .on(SYNTHESIZE, vec![text("Axie #1 is listed.")]);

    let orchestrator = orchestrator(Arc::clone(&llm)).await;
    let result = orchestrator.run(&question("Tell me about Axie")).await.unwrap();

    assert!(result.sub_answers[0].is_answered());
    let answer_call = llm.calls().into_iter().find(|c| c.stage == ANSWER).unwrap();
    assert!(answer_call.user.contains("Table: nft\n"));
    assert!(answer_call.user.contains("Collection Slug: gamefi"));
    assert_eq!(llm.count(SQL), 0);
}

#[tokio::test]
async fn test_unsafe_query_is_never_executed() {
    let llm = ScriptedLlm::new();
    llm.on(DECOMPOSE, vec![text("SUB QUESTIONS:\n1. Remove the nft table")])
        .on(CLASSIFY, vec![text("sql")])
        .on(SQL, vec![text("SQL: SELECT * FROM nft; DROP TABLE nft")])
        .on(SYNTHESIZE, vec![text("That cannot be done.")]);

    let store = store(true).await;
    let orchestrator = orchestrator_with(Arc::clone(&llm), store.clone(), settings());
    let result = orchestrator.run(&question("Remove the nft table")).await.unwrap();

    match &result.sub_answers[0].outcome {
        SubOutcome::Failed(error) => assert!(error.contains("Unsafe generated query"), "{}", error),
        other => panic!("expected failure, got {:?}", other),
    }
    assert_eq!(llm.count(ANSWER), 0);

    let embedding = MockProvider::new(DIMS).embed("Axie").await.unwrap();
    assert_eq!(store.similar_rows("nft", &embedding, 5).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_failed_sql_source_keeps_other_sources() {
    let llm = ScriptedLlm::new();
    llm.on(DECOMPOSE, vec![text("SUB QUESTIONS:\n1. What is GameFi?")])
        .on(CLASSIFY, vec![text("sql,documents")])
        .on(SQL, vec![text("ERROR")])
        .on(ANSWER, vec![text("GameFi blends games with on-chain finance.")])
        .on(HALLUCINATION, vec![text("NO")])
        .on(CORRECTNESS, vec![text("YES")])
        .on(SYNTHESIZE, vec![text("GameFi blends games with on-chain finance.")]);

    let orchestrator = orchestrator(Arc::clone(&llm)).await;
    let result = orchestrator.run(&question("What is GameFi?")).await.unwrap();

    assert!(result.sub_answers[0].is_answered());
    let answer_call = llm.calls().into_iter().find(|c| c.stage == ANSWER).unwrap();
    assert!(answer_call.user.contains("Collection Slug: gamefi"));
    assert!(!answer_call.user.contains("sql_result"));
}

#[tokio::test]
async fn test_verifier_terminates_when_every_check_fails() {
    let llm = ScriptedLlm::new();
    llm.on(ANSWER, vec![text("draft")])
        .on(HALLUCINATION, vec![text("YES")])
        .on(CORRECTNESS, vec![text("NO")]);

    let verifier = verifier(Arc::clone(&llm), store(true).await, 2);
    let verified = verifier
        .verify_and_answer(&ctx(), "What is Axie?", "DATA")
        .await
        .unwrap();

    assert_eq!(verified.answer, "draft");
    assert_eq!(verified.hallucination_checks, 2);
    assert_eq!(verified.drafts, 4);
    assert!(!verified.grounded);
    assert_eq!(verified.correctness, Verdict::Fail);
    assert!(verified.fell_back);
    assert_eq!(llm.count(ANSWER), 4);
    assert_eq!(llm.count(CORRECTNESS), 1);
}

#[tokio::test]
async fn test_verifier_treats_malformed_and_failed_checks_as_fail() {
    let llm = ScriptedLlm::new();
    llm.on(ANSWER, vec![text("draft")])
        .on(HALLUCINATION, vec![text("Maybe, hard to say"), Reply::Fail("boom".to_string())])
        .on(CORRECTNESS, vec![text("Looks right to me")]);

    let verifier = verifier(Arc::clone(&llm), store(true).await, 2);
    let verified = verifier
        .verify_and_answer(&ctx(), "What is Axie?", "DATA")
        .await
        .unwrap();

    assert!(!verified.answer.is_empty());
    assert_eq!(verified.hallucination_checks, 2);
    assert!(verified.fell_back);
}

#[tokio::test]
async fn test_verifier_passes_first_draft() {
    let llm = ScriptedLlm::new();
    llm.on(ANSWER, vec![text("Axie is a pet battler.")])
        .on(HALLUCINATION, vec![text("no")])
        .on(CORRECTNESS, vec![text("Yes.")]);

    let verifier = verifier(Arc::clone(&llm), store(true).await, 2);
    let verified = verifier
        .verify_and_answer(&ctx(), "What is Axie?", "DATA")
        .await
        .unwrap();

    assert_eq!(verified.drafts, 1);
    assert_eq!(verified.hallucination_checks, 1);
    assert!(verified.grounded);
    assert_eq!(verified.correctness, Verdict::Pass);
    assert!(!verified.fell_back);
}

#[tokio::test]
async fn test_verifier_keeps_draft_when_fallback_fails() {
    let llm = ScriptedLlm::new();
    llm.on(ANSWER, vec![text("first draft"), Reply::Fail("model gone".to_string())])
        .on(HALLUCINATION, vec![text("NO")])
        .on(CORRECTNESS, vec![text("NO")]);

    let verifier = verifier(Arc::clone(&llm), store(true).await, 2);
    let verified = verifier
        .verify_and_answer(&ctx(), "What is Axie?", "DATA")
        .await
        .unwrap();

    assert_eq!(verified.answer, "first draft");
    assert!(!verified.fell_back);
}

#[tokio::test]
async fn test_slow_call_times_out_as_failed_entry() {
    let llm = ScriptedLlm::new();
    llm.on(DECOMPOSE, vec![text("SUB QUESTIONS:\n1. Slow one")])
        .on(CLASSIFY, vec![Reply::Slow(Duration::from_secs(3), "NA".to_string())])
        .on(SYNTHESIZE, vec![text("Nothing could be answered.")]);

    let mut config = settings();
    config.call_timeout_secs = 1;
    let orchestrator = orchestrator_with(Arc::clone(&llm), store(true).await, config);
    let result = orchestrator.run(&question("Slow one")).await.unwrap();

    match &result.sub_answers[0].outcome {
        SubOutcome::Failed(error) => assert!(error.starts_with("Timed out"), "{}", error),
        other => panic!("expected timeout, got {:?}", other),
    }
}

#[tokio::test]
async fn test_cancelled_run() {
    let llm = ScriptedLlm::new();
    llm.on(DECOMPOSE, vec![text("SUB QUESTIONS:\n1. Anything")]);

    let orchestrator = orchestrator(Arc::clone(&llm)).await;
    let token = CancellationToken::new();
    token.cancel();

    let err = orchestrator
        .run_with_cancellation(&question("Anything"), token)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert!(llm.calls().is_empty());
}

#[tokio::test]
async fn test_decomposer_transport_failure_is_fatal() {
    let llm = ScriptedLlm::new();
    llm.on(DECOMPOSE, vec![Reply::Fail("503 Service Unavailable".to_string())]);

    let orchestrator = orchestrator(Arc::clone(&llm)).await;
    let err = orchestrator.run(&question("What is GameFi?")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransportFailure);
}

#[tokio::test]
async fn test_rejects_empty_question() {
    let orchestrator = orchestrator(ScriptedLlm::new()).await;
    let err = orchestrator.run(&question("   ")).await.unwrap_err();
    assert!(matches!(err, AppError::Config(_)));

    let err = orchestrator
        .run(&question("What?").with_search_limit(0))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Config(_)));
}

#[tokio::test]
async fn test_ask_direct() {
    let llm = ScriptedLlm::new();
    llm.on(DIRECT, vec![text("  GameFi is play-to-earn gaming.\n")]);

    let orchestrator = orchestrator(Arc::clone(&llm)).await;
    let answer = orchestrator.ask_direct(&question("What is GameFi?")).await.unwrap();

    assert_eq!(answer, "GameFi is play-to-earn gaming.");
    assert_eq!(llm.calls().len(), 1);
    assert_eq!(llm.calls()[0].user, "What is GameFi?");
}

#[tokio::test]
async fn test_router_answer_sql() {
    let llm = ScriptedLlm::new();
    llm.on(SQL, vec![text("SELECT name FROM nft WHERE collection_slug = 'axie'")]);

    let orchestrator = orchestrator(Arc::clone(&llm)).await;
    let ctx = orchestrator.context(&question("Which Axie NFTs exist?"));
    let answer = orchestrator
        .router()
        .answer_sql(&ctx, "Which Axie NFTs exist?")
        .await
        .unwrap();

    assert_eq!(answer.query.as_str(), "SELECT name FROM nft WHERE collection_slug = 'axie'");
    assert_eq!(answer.rows.len(), 1);
    assert_eq!(answer.rows[0]["name"], serde_json::json!("Axie #1"));
}

#[derive(Debug)]
struct StalledEmbedder;

#[async_trait::async_trait]
impl EmbeddingProvider for StalledEmbedder {
    fn provider_name(&self) -> &str {
        "stalled"
    }

    fn model_name(&self) -> &str {
        "stalled"
    }

    fn dimensions(&self) -> usize {
        DIMS
    }

    async fn embed_batch(&self, _texts: &[String]) -> gamefi_core::AppResult<Vec<Vec<f32>>> {
        std::future::pending().await
    }
}

#[tokio::test]
async fn test_router_search_documents() {
    let llm = ScriptedLlm::new();
    let orchestrator = orchestrator(Arc::clone(&llm)).await;
    let ctx = orchestrator.context(&question("What is GameFi?"));

    let documents = orchestrator
        .router()
        .search_documents(&ctx, "What is GameFi?")
        .await
        .unwrap();

    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0].collection_slug, "gamefi");
    assert!(llm.calls().is_empty());
}

#[tokio::test]
async fn test_router_search_documents_times_out_on_stalled_embedder() {
    let llm = ScriptedLlm::new();
    let gateway = Arc::new(Gateway::new(llm, Arc::new(tagged_prompts())));
    let router = Router::new(
        gateway,
        Arc::new(StalledEmbedder),
        store(true).await,
        Arc::new(Sanitizer::new(SanitizerRules::default()).unwrap()),
    );
    let ctx = RunContext::new("llama3", 5, Duration::from_millis(50), CancellationToken::new());

    let err = router.search_documents(&ctx, "What is GameFi?").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
}
