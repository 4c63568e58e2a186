mod common;

use std::time::Duration;

use urbanshield_portal::search::SearchOutcome;

#[tokio::test]
async fn typing_a_place_suggests_and_selects_it() {
    let api = common::MockApi::start().await;
    let context = api.logged_in_context().await;
    let search = context.search_engine();
    let mut selections = search.selections();

    let outcome = search.query("rishik").await;

    let results = outcome.results().unwrap();
    assert!(matches!(outcome, SearchOutcome::Fetched(_)));
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].name, "Rishikesh");
    assert_eq!((results[0].lat, results[0].lon), (30.12, 78.29));
    assert_eq!(search.current_suggestions(), results.to_vec());

    let chosen = search.activate().unwrap();
    assert_eq!(chosen.name, "Rishikesh");
    assert_eq!(selections.recv().await.unwrap(), chosen);
    assert!(search.current_suggestions().is_empty());
    assert_eq!(*search.text().borrow(), "");
}

#[tokio::test]
async fn repeated_queries_come_from_the_shared_cache() {
    let api = common::MockApi::start().await;
    let context = api.logged_in_context().await;

    let first = context.search_engine();
    assert!(matches!(first.query("Rishik").await, SearchOutcome::Fetched(_)));

    let second = context.search_engine();
    let outcome = second.query("  rishik ").await;
    assert!(matches!(outcome, SearchOutcome::Cached(_)));
    assert_eq!(api.search_calls(), 1);
    assert_eq!(context.search_cache.len(), 1);
}

#[tokio::test]
async fn short_input_clears_without_a_request() {
    let api = common::MockApi::start().await;
    let context = api.logged_in_context().await;
    let search = context.search_engine();
    search.query("deh").await;

    assert_eq!(search.query("d").await, SearchOutcome::Cleared);

    assert!(search.current_suggestions().is_empty());
    assert_eq!(api.search_calls(), 1);
}

#[tokio::test]
async fn debounced_input_settles_on_the_last_text() {
    let api = common::MockApi::start().await;
    let context = api.logged_in_context().await;
    let search = context.search_engine();
    let mut suggestions = search.suggestions();

    search.input("de");
    search.input("deh");
    search.input("dehra");

    tokio::time::timeout(Duration::from_secs(5), suggestions.changed())
        .await
        .unwrap()
        .unwrap();
    let shown = suggestions.borrow().clone();
    assert_eq!(shown.len(), 1);
    assert_eq!(shown[0].name, "Dehradun");
    assert_eq!(api.search_calls(), 1);
    assert!(context.search_cache.get("dehra").is_some());
}
