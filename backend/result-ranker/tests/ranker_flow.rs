mod common;

use common::{config, results, titles, CountingModel, FailingStore, ModelEvent, ReadOnlyStore};
use result_ranker::services::storage::InMemorySnapshotStore;
use result_ranker::{
    MlpRankingModel, Owner, RankingError, RankingModel, RankingSnapshot, ResultRanker,
    SearchResult, SnapshotStore,
};
use std::sync::Arc;
use std::time::Duration;

async fn counting_ranker(
    store: Arc<dyn SnapshotStore>,
    output_units: usize,
) -> ResultRanker<CountingModel> {
    ResultRanker::load_or_init(store, Owner::new("alice"), &config(output_units, 20))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_moves_up_chosen_result() {
    let ranker = counting_ranker(Arc::new(InMemorySnapshotStore::new()), 8).await;
    let candidates = results(&["Alpha", "Bravo", "Charlie"]);
    ranker.add_results(&candidates);

    assert!(ranker
        .train_ranking("search", &SearchResult::new("Charlie"))
        .is_some());

    let ranked = ranker.rank("search", candidates);
    assert_eq!(titles(&ranked), vec!["Charlie", "Alpha", "Bravo"]);
}

#[tokio::test]
async fn test_markup_does_not_split_labels() {
    let ranker = counting_ranker(Arc::new(InMemorySnapshotStore::new()), 8).await;
    ranker.add_results(&results(&["<b>Foo</b> Bar", "Baz"]));

    assert!(ranker
        .train_ranking("q", &SearchResult::new("Foo   Bar"))
        .is_some());

    assert_eq!(ranker.known_labels(), vec!["Foo Bar", "Baz"]);
    let ranked = ranker.rank("q", results(&["Baz", "<i>Foo</i> Bar"]));
    assert_eq!(titles(&ranked), vec!["<i>Foo</i> Bar", "Baz"]);
}

#[tokio::test]
async fn test_unknown_candidates_rank_last_in_input_order() {
    let ranker = counting_ranker(Arc::new(InMemorySnapshotStore::new()), 8).await;
    ranker.add_results(&results(&["Alpha", "Bravo"]));
    ranker.train_ranking("q", &SearchResult::new("Bravo"));

    let ranked = ranker.rank("q", results(&["Xray", "Alpha", "Yankee", "Bravo"]));

    assert_eq!(titles(&ranked), vec!["Bravo", "Alpha", "Xray", "Yankee"]);
}

#[tokio::test]
async fn test_unknown_selection_is_not_learned() {
    let store = Arc::new(InMemorySnapshotStore::new());
    let ranker = counting_ranker(store.clone(), 8).await;
    ranker.add_results(&results(&["Alpha"]));

    assert!(ranker
        .train_ranking("q", &SearchResult::new("Nobody"))
        .is_none());

    assert!(ranker.inspect_model(|m| m.events.is_empty()));
    ranker.shutdown(Duration::from_secs(1)).await;
    assert_eq!(store.writes(), 0);
}

#[tokio::test]
async fn test_forgets_least_recently_used() {
    let ranker = counting_ranker(Arc::new(InMemorySnapshotStore::new()), 3).await;

    ranker.add_results(&results(&["a", "b", "c", "d"]));

    assert_eq!(ranker.slot_of("a"), None);
    assert_eq!(ranker.slot_of("d"), Some(0));
    assert_eq!(ranker.known_labels(), vec!["d", "b", "c"]);
}

#[tokio::test]
async fn test_picking_a_result_delays_dropping() {
    let ranker = counting_ranker(Arc::new(InMemorySnapshotStore::new()), 3).await;
    ranker.add_results(&results(&["a", "b", "c"]));

    ranker.train_ranking("q", &SearchResult::new("a"));
    ranker.add_results(&results(&["d"]));

    assert_eq!(ranker.slot_of("a"), Some(0));
    assert_eq!(ranker.slot_of("b"), None);
    assert_eq!(ranker.slot_of("d"), Some(1));
}

#[tokio::test]
async fn test_new_results_do_not_inherit_dropped_ones() {
    let ranker = counting_ranker(Arc::new(InMemorySnapshotStore::new()), 2).await;
    ranker.add_results(&results(&["a", "b"]));

    ranker.train_ranking("q", &SearchResult::new("a"));
    ranker.train_ranking("q", &SearchResult::new("a"));
    ranker.train_ranking("q", &SearchResult::new("b"));

    // "a" is now least recently used and gives its slot to "c"
    ranker.add_results(&results(&["c"]));

    assert_eq!(ranker.slot_of("c"), Some(0));
    assert_eq!(
        ranker.inspect_model(|m| m.events.clone()),
        vec![
            ModelEvent::Train(0),
            ModelEvent::Train(0),
            ModelEvent::Train(1),
            ModelEvent::Reset(0),
        ]
    );
    assert_eq!(ranker.inspect_model(|m| m.score("q", 0)), 0.0);

    let ranked = ranker.rank("q", results(&["c", "b"]));
    assert_eq!(titles(&ranked), vec!["b", "c"]);
}

#[tokio::test]
async fn test_repeated_persisting_stores_latest_snapshot() {
    let store = Arc::new(InMemorySnapshotStore::new());
    let ranker: ResultRanker<CountingModel> =
        ResultRanker::load_or_init(store.clone(), Owner::new("alice"), &config(4, 50))
            .await
            .unwrap();
    ranker.add_results(&results(&["a", "b"]));

    let first = ranker.train_ranking("q", &SearchResult::new("a")).unwrap();
    let second = ranker.train_ranking("q", &SearchResult::new("b")).unwrap();
    let third = ranker.train_ranking("q", &SearchResult::new("a")).unwrap();

    assert!(first.await);
    assert!(!second.await);
    assert!(third.await);
    assert_eq!(store.writes(), 2);

    let stored = store.stored("alice").await.unwrap();
    assert_eq!(stored.eviction_order, vec!["b", "a"]);
    let model = CountingModel::from_bytes(&stored.model).unwrap();
    assert_eq!(model.score("q", 0), 2.0);
    assert_eq!(model.score("q", 1), 1.0);
}

#[tokio::test]
async fn test_owners_do_not_collide() {
    let store = Arc::new(InMemorySnapshotStore::new());
    let alice: ResultRanker<CountingModel> =
        ResultRanker::load_or_init(store.clone(), Owner::new("alice"), &config(4, 10))
            .await
            .unwrap();
    let bob: ResultRanker<CountingModel> =
        ResultRanker::load_or_init(store.clone(), Owner::new("bob"), &config(4, 10))
            .await
            .unwrap();

    alice.add_results(&results(&["Alpha"]));
    bob.add_results(&results(&["Bravo"]));

    let (a, b) = tokio::join!(
        alice.train_ranking("q", &SearchResult::new("Alpha")).unwrap(),
        bob.train_ranking("q", &SearchResult::new("Bravo")).unwrap(),
    );
    assert!(a && b);

    assert_eq!(store.stored("alice").await.unwrap().labels, vec!["Alpha"]);
    assert_eq!(store.stored("bob").await.unwrap().labels, vec!["Bravo"]);
}

#[tokio::test]
async fn test_reload_reproduces_ranking() {
    let store = Arc::new(InMemorySnapshotStore::new());
    let owner = Owner::new("alice");
    let settings = config(16, 10);
    let candidates = results(&["Rust Book", "Cargo Guide", "Tokio Tutorial", "Serde Docs"]);

    let trained: ResultRanker<MlpRankingModel> =
        ResultRanker::load_or_init(store.clone(), owner.clone(), &settings)
            .await
            .unwrap();
    trained.add_results(&candidates);
    for _ in 0..3 {
        trained.train_ranking("async", &SearchResult::new("Tokio Tutorial"));
        trained.train_ranking("serialize", &SearchResult::new("Serde Docs"));
    }
    trained.shutdown(Duration::from_secs(1)).await;

    let reloaded: ResultRanker<MlpRankingModel> =
        ResultRanker::load_or_init(store.clone(), owner, &settings)
            .await
            .unwrap();

    assert_eq!(reloaded.known_labels(), trained.known_labels());
    assert_eq!(reloaded.eviction_order(), trained.eviction_order());

    // Re-adding known results in another order changes nothing
    let mut shuffled = candidates.clone();
    shuffled.reverse();
    assert_eq!(reloaded.add_results(&shuffled), 0);

    for query in ["async", "serialize", "other"] {
        assert_eq!(
            titles(&reloaded.rank(query, candidates.clone())),
            titles(&trained.rank(query, candidates.clone()))
        );
    }
    assert_eq!(titles(&reloaded.rank("async", candidates.clone()))[0], "Tokio Tutorial");
}

#[tokio::test]
async fn test_capacity_mismatch_starts_fresh() {
    let store = Arc::new(InMemorySnapshotStore::new());

    let small = counting_ranker(store.clone(), 4).await;
    small.add_results(&results(&["a", "b"]));
    small.train_ranking("q", &SearchResult::new("a"));
    small.shutdown(Duration::from_secs(1)).await;
    assert_eq!(store.writes(), 1);

    let large = counting_ranker(store.clone(), 8).await;

    assert_eq!(large.output_units(), 8);
    assert!(large.known_labels().is_empty());
    assert_eq!(large.inspect_model(|m| m.output_units()), 8);
}

#[tokio::test]
async fn test_load_failure_is_fatal() {
    let result =
        ResultRanker::<CountingModel>::load_or_init(Arc::new(FailingStore), Owner::new("alice"), &config(4, 10))
            .await;

    assert!(matches!(result, Err(RankingError::Storage(_))));
}

#[tokio::test]
async fn test_unreadable_model_is_fatal() {
    let store = Arc::new(InMemorySnapshotStore::new());
    let owner = Owner::new("alice");
    let corrupt = RankingSnapshot::new(
        &owner,
        4,
        vec!["a".to_string()],
        vec!["a".to_string()],
        b"garbage".to_vec(),
    );
    store.store(&corrupt).await.unwrap();

    let result = ResultRanker::<CountingModel>::load_or_init(store, owner, &config(4, 10)).await;

    assert!(matches!(result, Err(RankingError::Model(_))));
}

#[tokio::test]
async fn test_inconsistent_snapshot_is_fatal() {
    let store = Arc::new(InMemorySnapshotStore::new());
    let owner = Owner::new("alice");
    let model = CountingModel::with_output_units(4, None).to_bytes().unwrap();
    let duplicated = RankingSnapshot::new(
        &owner,
        4,
        vec!["a".to_string(), "a".to_string()],
        Vec::new(),
        model,
    );
    store.store(&duplicated).await.unwrap();

    let result = ResultRanker::<CountingModel>::load_or_init(store, owner, &config(4, 10)).await;

    assert!(matches!(result, Err(RankingError::Buffer(_))));
}

#[tokio::test]
async fn test_store_failure_does_not_fail_training() {
    let ranker = counting_ranker(Arc::new(ReadOnlyStore), 4).await;
    ranker.add_results(&results(&["a", "b"]));

    let handle = ranker.train_ranking("q", &SearchResult::new("b")).unwrap();
    assert!(handle.await);

    let ranked = ranker.rank("q", results(&["a", "b"]));
    assert_eq!(titles(&ranked), vec!["b", "a"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_training_persists_latest_state() {
    const THREADS: usize = 8;
    const PICKS: usize = 50;

    for _ in 0..5 {
        let store = Arc::new(InMemorySnapshotStore::new());
        let ranker: ResultRanker<CountingModel> =
            ResultRanker::load_or_init(store.clone(), Owner::new("alice"), &config(4, 60_000))
                .await
                .unwrap();
        ranker.add_results(&results(&["a", "b"]));

        std::thread::scope(|scope| {
            for worker in 0..THREADS {
                let ranker = &ranker;
                scope.spawn(move || {
                    let pick = if worker % 2 == 0 { "a" } else { "b" };
                    for _ in 0..PICKS {
                        assert!(ranker.train_ranking("q", &SearchResult::new(pick)).is_some());
                    }
                });
            }
        });
        ranker.shutdown(Duration::from_secs(1)).await;

        let stored = store.stored("alice").await.unwrap();
        let model = CountingModel::from_bytes(&stored.model).unwrap();
        let expected = (THREADS / 2 * PICKS) as f32;

        assert_eq!(model.score("q", 0), expected);
        assert_eq!(model.score("q", 1), expected);
        assert_eq!(model.score("q", 0), ranker.inspect_model(|m| m.score("q", 0)));
        assert_eq!(stored.eviction_order, ranker.eviction_order());
    }
}
