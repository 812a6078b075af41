//! Invalidation and refetch behaviour across observers

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use query_cache::{
    Mutation, MutationStatus, QueryClient, QueryFilter, QueryKey, QueryObserver, QueryOptions,
};
use tokio::sync::Notify;

fn versioned(
    label: &'static str,
    calls: Arc<AtomicU32>,
) -> impl Fn() -> BoxFuture<'static, Result<String, String>> + Send + Sync + 'static {
    move || {
        let calls = Arc::clone(&calls);
        async move {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(format!("{}-v{}", label, n))
        }
        .boxed()
    }
}

#[tokio::test]
async fn test_exact_invalidation_only_refetches_matching_key() {
    let client = QueryClient::new();
    let p1_calls = Arc::new(AtomicU32::new(0));
    let p2_calls = Arc::new(AtomicU32::new(0));

    let mut p1: QueryObserver<String> = client.observe(
        QueryKey::new(["listComments", "p1"]),
        QueryOptions::default(),
        versioned("p1", Arc::clone(&p1_calls)),
    );
    let mut p2: QueryObserver<String> = client.observe(
        QueryKey::new(["listComments", "p2"]),
        QueryOptions::default(),
        versioned("p2", Arc::clone(&p2_calls)),
    );
    p1.wait_settled().await.unwrap();
    p2.wait_settled().await.unwrap();

    let invalidated = client.invalidate_queries(&QueryFilter::Exact(QueryKey::new([
        "listComments",
        "p1",
    ])));
    assert_eq!(invalidated, 1);

    let snapshot = p1.wait_for_fetch_count(2).await.unwrap();
    assert_eq!(snapshot.data.as_deref(), Some("p1-v2"));
    assert!(!snapshot.is_invalidated);

    assert_eq!(p2.snapshot().data.as_deref(), Some("p2-v1"));
    assert_eq!(p2_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_prefix_invalidation_refetches_every_post() {
    let client = QueryClient::new();
    let p1_calls = Arc::new(AtomicU32::new(0));
    let p2_calls = Arc::new(AtomicU32::new(0));

    let mut p1: QueryObserver<String> = client.observe(
        QueryKey::new(["listComments", "p1"]),
        QueryOptions::default(),
        versioned("p1", Arc::clone(&p1_calls)),
    );
    let mut p2: QueryObserver<String> = client.observe(
        QueryKey::new(["listComments", "p2"]),
        QueryOptions::default(),
        versioned("p2", Arc::clone(&p2_calls)),
    );
    let mut other: QueryObserver<String> = client.observe(
        QueryKey::new(["getPost", "p1"]),
        QueryOptions::default(),
        || async { Ok::<_, String>("post".to_string()) },
    );
    p1.wait_settled().await.unwrap();
    p2.wait_settled().await.unwrap();
    other.wait_settled().await.unwrap();

    let invalidated =
        client.invalidate_queries(&QueryFilter::Prefix(QueryKey::root("listComments")));
    assert_eq!(invalidated, 2);

    assert_eq!(
        p1.wait_for_fetch_count(2).await.unwrap().data.as_deref(),
        Some("p1-v2")
    );
    assert_eq!(
        p2.wait_for_fetch_count(2).await.unwrap().data.as_deref(),
        Some("p2-v2")
    );
    assert_eq!(other.snapshot().fetch_count, 1);
}

#[tokio::test]
async fn test_unobserved_entry_is_marked_stale_and_refetched_on_next_observe() {
    let client = QueryClient::new();
    let calls = Arc::new(AtomicU32::new(0));
    let key = QueryKey::new(["listComments", "p1"]);
    let options = QueryOptions::default().stale_time(Duration::from_secs(60));

    let mut first: QueryObserver<String> =
        client.observe(key.clone(), options.clone(), versioned("p1", Arc::clone(&calls)));
    first.wait_settled().await.unwrap();
    drop(first);

    client.invalidate_queries(&QueryFilter::Exact(key.clone()));
    tokio::task::yield_now().await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(client.get_query_state(&key).unwrap().is_invalidated);

    let mut second: QueryObserver<String> =
        client.observe(key, options, versioned("p1", Arc::clone(&calls)));
    let snapshot = second.wait_for_fetch_count(2).await.unwrap();
    assert_eq!(snapshot.data.as_deref(), Some("p1-v2"));
}

#[tokio::test]
async fn test_newer_fetch_supersedes_slow_one() {
    let client = QueryClient::new();
    let key = QueryKey::new(["listComments", "p1"]);
    let release_first = Arc::new(Notify::new());
    let calls = Arc::new(AtomicU32::new(0));

    let fetcher = {
        let release_first = Arc::clone(&release_first);
        let calls = Arc::clone(&calls);
        move || {
            let release_first = Arc::clone(&release_first);
            let calls = Arc::clone(&calls);
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n == 1 {
                    release_first.notified().await;
                }
                Ok::<_, String>(format!("v{}", n))
            }
        }
    };

    let mut observer: QueryObserver<String> =
        client.observe(key.clone(), QueryOptions::default(), fetcher);
    tokio::task::yield_now().await;

    assert!(observer.refetch());
    let snapshot = observer.wait_settled().await.unwrap();
    assert_eq!(snapshot.data.as_deref(), Some("v2"));

    release_first.notify_one();
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(observer.snapshot().data.as_deref(), Some("v2"));
    assert_eq!(client.stats().superseded, 1);
}

#[tokio::test]
async fn test_mutation_invalidates_in_success_hook() {
    let client = QueryClient::new();
    let calls = Arc::new(AtomicU32::new(0));
    let key = QueryKey::new(["listComments", "p1"]);

    let mut observer: QueryObserver<String> = client.observe(
        key.clone(),
        QueryOptions::default(),
        versioned("p1", Arc::clone(&calls)),
    );
    observer.wait_settled().await.unwrap();

    let hook_client = client.clone();
    let add = Mutation::builder("addItem", |post_id: String| async move {
        Ok::<_, String>(post_id)
    })
    .on_success(move |post_id: &String, _| {
        hook_client.invalidate_queries(&QueryFilter::Exact(QueryKey::new([
            "listComments",
            post_id.as_str(),
        ])));
    })
    .build();

    tokio_test::assert_ok!(add.mutate("p1".to_string()).await);
    assert_eq!(add.status(), MutationStatus::Success);

    let snapshot = observer.wait_for_fetch_count(2).await.unwrap();
    assert_eq!(snapshot.data.as_deref(), Some("p1-v2"));
}

#[tokio::test]
async fn test_failed_mutation_leaves_cache_untouched() {
    let client = QueryClient::new();
    let calls = Arc::new(AtomicU32::new(0));
    let key = QueryKey::new(["listComments", "p1"]);

    let mut observer: QueryObserver<String> = client.observe(
        key.clone(),
        QueryOptions::default(),
        versioned("p1", Arc::clone(&calls)),
    );
    observer.wait_settled().await.unwrap();

    let hook_client = client.clone();
    let add = Mutation::builder("addItem", |_: String| async {
        Err::<String, _>("network down".to_string())
    })
    .on_success(move |_, _| {
        hook_client.invalidate_queries(&QueryFilter::All);
    })
    .build();

    tokio_test::assert_err!(add.mutate("p1".to_string()).await);
    assert_eq!(add.status(), MutationStatus::Error);

    tokio::task::yield_now().await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!client.get_query_state(&key).unwrap().is_invalidated);
}
