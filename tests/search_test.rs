mod helpers;

use helpers::{note, open_engine};
use memvault::memory::{
    MatchType, MemoryEngine, MemoryType, SearchMode, SearchQuery, TimelinePosition,
};
use tempfile::TempDir;

fn corpus(engine: &mut MemoryEngine) {
    let notes = [
        ("auth", MemoryType::Feature, "Login authentication", "Password login issues a signed session token"),
        ("cache", MemoryType::Bugfix, "Cache stampede", "Expired entries caused a thundering herd on the cache"),
        ("retry", MemoryType::Bugfix, "Retry storm", "Clients retried without backoff and overloaded the gateway"),
        ("schema", MemoryType::Refactor, "Schema cleanup", "Dropped unused columns from the orders table"),
        ("choice", MemoryType::Decision, "Pick SQLite", "Embedded storage beats running a database server"),
    ];
    for (id, memory_type, title, content) in notes {
        engine.remember(note(id, memory_type, title, content)).unwrap();
    }
}

#[test]
fn hybrid_match_in_both_rankings_wins() {
    let tmp = TempDir::new().unwrap();
    let mut engine = open_engine(&tmp.path().join("s.db"));
    corpus(&mut engine);

    let hits = engine
        .search(&SearchQuery::new("cache stampede"))
        .unwrap();

    assert_eq!(hits[0].id, "cache");
    assert_eq!(hits[0].match_type, MatchType::Both);
    for hit in &hits[1..] {
        assert!(hit.score <= hits[0].score);
        if hit.match_type != MatchType::Both {
            assert!(hit.score < hits[0].score);
        }
    }
}

#[test]
fn vector_mode_respects_type_filter() {
    let tmp = TempDir::new().unwrap();
    let mut engine = open_engine(&tmp.path().join("s.db"));
    corpus(&mut engine);

    let hits = engine
        .search(
            &SearchQuery::new("cache thundering retried backoff gateway")
                .with_mode(SearchMode::Vector)
                .with_type(MemoryType::Bugfix),
        )
        .unwrap();

    assert_eq!(hits.len(), 2);
    assert!(hits.iter().all(|h| h.memory_type == MemoryType::Bugfix));
    assert!(hits.iter().all(|h| h.match_type == MatchType::Vector));
}

#[test]
fn bm25_mode_only_returns_lexical_matches() {
    let tmp = TempDir::new().unwrap();
    let mut engine = open_engine(&tmp.path().join("s.db"));
    corpus(&mut engine);

    let hits = engine
        .search(&SearchQuery::new("orders gateway").with_mode(SearchMode::Bm25))
        .unwrap();
    let mut ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
    ids.sort();
    assert_eq!(ids, vec!["retry", "schema"]);
    assert!(hits.iter().all(|h| h.distance.is_none()));
}

#[test]
fn stopword_only_query_matches_nothing_semantically() {
    let tmp = TempDir::new().unwrap();
    let mut engine = open_engine(&tmp.path().join("s.db"));
    corpus(&mut engine);

    let vector = engine
        .search(&SearchQuery::new("the of and").with_mode(SearchMode::Vector))
        .unwrap();
    assert!(vector.is_empty());

    let hybrid = engine.search(&SearchQuery::new("the of and")).unwrap();
    assert!(hybrid
        .iter()
        .all(|h| h.match_type == MatchType::Bm25 && h.distance.is_none()));
}

#[test]
fn empty_store_returns_empty_in_every_mode() {
    let tmp = TempDir::new().unwrap();
    let engine = open_engine(&tmp.path().join("empty.db"));
    for mode in [SearchMode::Bm25, SearchMode::Vector, SearchMode::Hybrid] {
        let hits = engine.search(&SearchQuery::new("anything").with_mode(mode)).unwrap();
        assert!(hits.is_empty());
    }
}

#[test]
fn search_observes_add_and_forget_immediately() {
    let tmp = TempDir::new().unwrap();
    let mut engine = open_engine(&tmp.path().join("s.db"));
    corpus(&mut engine);

    let query = SearchQuery::new("kubernetes autoscaler");
    assert!(!engine.search(&query).unwrap().iter().any(|h| h.id == "k8s"));

    engine
        .remember(note("k8s", MemoryType::Discovery, "Kubernetes autoscaler", "HPA reacts to CPU only"))
        .unwrap();
    assert_eq!(engine.search(&query).unwrap()[0].id, "k8s");

    assert!(engine.forget("k8s").unwrap());
    assert!(!engine.search(&query).unwrap().iter().any(|h| h.id == "k8s"));
}

#[test]
fn timeline_around_anchor() {
    let tmp = TempDir::new().unwrap();
    let mut engine = open_engine(&tmp.path().join("t.db"));
    for i in 0..10 {
        engine
            .remember(note(&format!("m{i}"), MemoryType::Change, &format!("change {i}"), "step"))
            .unwrap();
    }

    let timeline = engine.timeline("m4", 2).unwrap();
    let anchor: Vec<_> = timeline
        .iter()
        .filter(|e| e.position == TimelinePosition::Anchor)
        .collect();
    assert_eq!(anchor.len(), 1);
    assert_eq!(anchor[0].memory.id, "m4");
    assert_eq!(timeline.len(), 5);
    assert!(timeline
        .windows(2)
        .all(|w| w[0].memory.created_at < w[1].memory.created_at));
}

#[test]
fn details_skip_unknown_ids() {
    let tmp = TempDir::new().unwrap();
    let mut engine = open_engine(&tmp.path().join("d.db"));
    corpus(&mut engine);

    let ids: Vec<String> = ["choice", "nope", "auth", "also-nope"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let details = engine.details(&ids).unwrap();
    let got: Vec<&str> = details.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(got, vec!["choice", "auth"]);

    let none = engine.details(&["ghost".to_string()]).unwrap();
    assert!(none.is_empty());
}

#[test]
fn search_results_survive_restart() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("restart.db");
    let query = SearchQuery::new("retry backoff gateway");

    let before = {
        let mut engine = open_engine(&path);
        corpus(&mut engine);
        let hits = engine.search(&query).unwrap();
        engine.close().unwrap();
        hits
    };

    let engine = open_engine(&path);
    assert_eq!(engine.search(&query).unwrap(), before);
}
