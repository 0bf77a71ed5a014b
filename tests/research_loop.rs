//! Research loop integration tests
//!
//! Loops run against a scripted oracle with search and fetch served by
//! wiremock.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{registry, search_body, task, test_config, ScriptedOracle};
use fathom::agent::task::Budget;
use fathom::agent::{Decision, ResearchLoop, StopReason, Turn};
use fathom::core::ToolInvocation;
use fathom::tools::ResultEnvelope;
use fathom::FathomError;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn research_loop(oracle: Arc<ScriptedOracle>, server_uri: &str) -> ResearchLoop {
    let config = test_config(server_uri);
    ResearchLoop::builder()
        .oracle(oracle)
        .tools(registry(&config))
        .config(&config)
        .retry_backoff(Duration::from_millis(5))
        .build()
        .unwrap()
}

/// Url of the first hit of the first search in the history
fn top_result(history: &[Turn]) -> Option<String> {
    history
        .iter()
        .flat_map(|turn| turn.outputs())
        .find_map(|envelope| match envelope {
            ResultEnvelope::Search {
                outcome: Ok(results),
                ..
            } => results.results.first().map(|hit| hit.url.clone()),
            _ => None,
        })
}

/// Text of every fetched page in the history
fn fetched_text(history: &[Turn]) -> Vec<String> {
    history
        .iter()
        .flat_map(|turn| turn.outputs())
        .filter_map(|envelope| match envelope {
            ResultEnvelope::Fetch {
                outcome: Ok(page), ..
            } => Some(page.content.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_cheapest_flight_scenario() {
    let server = MockServer::start().await;
    let fares_url = format!("{}/fares/lis-ber", server.uri());

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_body(&[
            ("LIS to BER fares", fares_url.as_str(), "Compare fares for 10-20 May"),
            ("Other deals", "https://other.example/deals", "More"),
        ])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/fares/lis-ber"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            "<html><body><nav>Menu</nav><p>Cheapest: TAP via Porto, 12 May, 49 EUR</p></body></html>",
            "text/html",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let oracle = Arc::new(
        ScriptedOracle::new(|_, history| {
            Ok(match history.len() {
                0 => Decision::Invoke(vec![ToolInvocation::search(
                    "cheapest flight Lisbon Berlin 10-20 May",
                )]),
                _ => match top_result(history) {
                    Some(url) => Decision::Invoke(vec![ToolInvocation::fetch(url)]),
                    None => Decision::Complete("no results".to_string()),
                },
            })
        })
        .with_synthesis(|_, history| {
            Ok(format!(
                "Best option found: {}",
                fetched_text(history).join(" ")
            ))
        }),
    );

    let research = research_loop(oracle.clone(), &server.uri());
    let report = research
        .run(task(
            "Find the cheapest flight route between Lisbon and Berlin between 10 and 20 May",
            Budget::new(2, 5),
        ))
        .await
        .unwrap();

    assert!(report.turns_used <= 2);
    assert!(report.tool_calls_used <= 5);
    assert_eq!(report.tool_calls_used, 2);
    assert_eq!(report.stop_reason, StopReason::TurnLimit);
    assert!(!report.text.is_empty());
    assert!(report.text.contains("49 EUR"));
    assert!(!report.text.contains("Menu"));
    assert_eq!(oracle.decide_calls(), 2);
}

#[tokio::test]
async fn test_ceilings_hold_when_oracle_overreaches() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(search_body(&[("Hit", "https://a.example", "a")])),
        )
        .mount(&server)
        .await;

    // Four fresh searches every turn, forever
    let oracle = Arc::new(ScriptedOracle::new(|_, history| {
        let turn = history.len();
        Ok(Decision::Invoke(
            (0..4)
                .map(|i| ToolInvocation::search(format!("query {} {}", turn, i)))
                .collect(),
        ))
    }));

    let research = research_loop(oracle, &server.uri());
    let report = research
        .run(task("overreach", Budget::new(5, 6)))
        .await
        .unwrap();

    assert_eq!(report.stop_reason, StopReason::ToolCallLimit);
    assert_eq!(report.tool_calls_used, 6);
    assert_eq!(report.turns_used, 2);
    // Refused calls never reach the provider
    assert_eq!(server.received_requests().await.unwrap().len(), 6);
}

#[tokio::test]
async fn test_source_ceiling_stops_loop() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_body(&[])))
        .mount(&server)
        .await;

    let oracle = Arc::new(ScriptedOracle::new(|_, history| {
        Ok(Decision::Invoke(vec![
            ToolInvocation::search(format!("a{}", history.len())),
            ToolInvocation::search(format!("b{}", history.len())),
        ]))
    }));

    let mut budget = Budget::new(10, 50);
    budget.max_sources = 3;

    let report = research_loop(oracle, &server.uri())
        .run(task("sources", budget))
        .await
        .unwrap();

    assert_eq!(report.stop_reason, StopReason::SourceLimit);
    assert_eq!(report.sources_seen, 3);
    assert_eq!(report.turns_used, 2);
}

#[tokio::test]
async fn test_repeated_results_trigger_diminishing_returns() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(search_body(&[("Same", "https://same.example", "same")])),
        )
        .mount(&server)
        .await;

    let oracle = Arc::new(ScriptedOracle::new(|_, _| {
        Ok(Decision::Invoke(vec![ToolInvocation::search("same question")]))
    }));

    let report = research_loop(oracle, &server.uri())
        .run(task("repetitive", Budget::new(10, 10)))
        .await
        .unwrap();

    assert_eq!(report.stop_reason, StopReason::DiminishingReturns);
    assert_eq!(report.turns_used, 3);
    assert_eq!(report.text, "Summary of 3 turns");
}

#[tokio::test]
async fn test_rephrased_queries_with_same_hits_trigger_diminishing_returns() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(search_body(&[("Same", "https://same.example", "same")])),
        )
        .mount(&server)
        .await;

    let oracle = Arc::new(ScriptedOracle::new(|_, history| {
        Ok(Decision::Invoke(vec![ToolInvocation::search(format!(
            "rephrasing {}",
            history.len()
        ))]))
    }));

    let mut budget = Budget::new(8, 20);
    budget.stale_turn_limit = 2;

    let report = research_loop(oracle, &server.uri())
        .run(task("rephrasing", budget))
        .await
        .unwrap();

    assert_eq!(report.stop_reason, StopReason::DiminishingReturns);
    assert_eq!(report.turns_used, 3);
    assert_eq!(report.sources_seen, 3);
}

#[tokio::test]
async fn test_invocations_in_one_turn_run_concurrently() {
    let server = MockServer::start().await;

    for page in ["/slow/a", "/slow/b"] {
        Mock::given(method("GET"))
            .and(path(page))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(format!("<p>page {}</p>", page), "text/html")
                    .set_delay(Duration::from_secs(1)),
            )
            .expect(1)
            .mount(&server)
            .await;
    }

    let uri = server.uri();
    let oracle = Arc::new(
        ScriptedOracle::new(move |_, _| {
            Ok(Decision::Invoke(vec![
                ToolInvocation::fetch(format!("{}/slow/a", uri)),
                ToolInvocation::fetch(format!("{}/slow/b", uri)),
            ]))
        })
        .with_synthesis(|_, history| Ok(fetched_text(history).join(" | "))),
    );

    let research = research_loop(oracle, &server.uri());
    let started = Instant::now();
    let report = research
        .run(task("parallel fetch", Budget::new(1, 5)))
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert!(
        elapsed < Duration::from_millis(1800),
        "turn took {:?}, fetches ran one after another",
        elapsed
    );
    assert_eq!(report.stop_reason, StopReason::TurnLimit);
    assert_eq!(report.tool_calls_used, 2);
    // The turn waited for both fetches, in request order
    assert_eq!(report.text, "page /slow/a | page /slow/b");
}

#[tokio::test]
async fn test_tool_errors_do_not_halt_the_loop() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
        .mount(&server)
        .await;

    let oracle = Arc::new(ScriptedOracle::new(|_, history| {
        match history.last() {
            None => Ok(Decision::Invoke(vec![ToolInvocation::search("blocked")])),
            Some(turn) if turn.outputs().iter().all(|o| o.is_error()) => Ok(Decision::Complete(
                "Search was unavailable; answering from prior knowledge.".to_string(),
            )),
            Some(_) => Ok(Decision::Complete("unexpected".to_string())),
        }
    }));

    let report = research_loop(oracle, &server.uri())
        .run(task("blocked search", Budget::default()))
        .await
        .unwrap();

    assert_eq!(report.stop_reason, StopReason::Completed);
    assert_eq!(report.turns_used, 1);
    assert!(report.text.starts_with("Search was unavailable"));
}

#[tokio::test]
async fn test_oracle_transient_failures_are_retried() {
    let oracle = Arc::new(ScriptedOracle::sequence(vec![
        Err(FathomError::unavailable("ollama restarting")),
        Err(FathomError::oracle("garbled tool call")),
        Ok(Decision::Complete("recovered".to_string())),
    ]));

    let report = research_loop(oracle.clone(), "http://unused")
        .run(task("flaky oracle", Budget::default()))
        .await
        .unwrap();

    assert_eq!(report.text, "recovered");
    assert_eq!(oracle.decide_calls(), 3);
}

#[tokio::test]
async fn test_oracle_retry_exhaustion_fails_loop() {
    let oracle = Arc::new(ScriptedOracle::new(|_, _| {
        Err(FathomError::unavailable("connection refused"))
    }));

    let result = research_loop(oracle.clone(), "http://unused")
        .run(task("dead oracle", Budget::default()))
        .await;

    match result {
        Err(FathomError::OracleRetriesExhausted { attempts, last }) => {
            assert_eq!(attempts, 3);
            assert!(last.contains("connection refused"));
        }
        other => panic!("expected retry exhaustion, got {:?}", other),
    }
    assert_eq!(oracle.decide_calls(), 3);
}
