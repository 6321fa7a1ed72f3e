use std::sync::Arc;
use std::time::Duration;

use thumbnails::{
    CacheState, Cancellation, FetchSummary, ThumbnailError, ThumbnailManager, delete,
    fetch_thumbnails,
};

use crate::common::{CountingMetadataStore, EchoProcessor, SOURCE, TestEnv};

/// Three sources on one backend, with `small` generated for the first two.
async fn seeded() -> TestEnv {
    let env = TestEnv::new().await;
    for name in ["photos/dog.png", "photos/owl.png"] {
        env.add_source(name).await;
    }
    for name in [SOURCE, "photos/dog.png"] {
        env.thumbnails.manager(name).get("small").await.unwrap();
    }
    env
}

fn managers(env: &TestEnv) -> Vec<ThumbnailManager> {
    [SOURCE, "photos/dog.png", "photos/owl.png"]
        .into_iter()
        .map(|name| env.thumbnails.manager(name))
        .collect()
}

mod batch_backend {
    use super::*;

    #[tokio::test]
    async fn one_query_then_no_backend_calls() {
        let env = seeded().await;
        let managers = managers(&env);
        let refs: Vec<_> = managers.iter().collect();

        let before = env.metadata.get_many_calls();
        let summary = fetch_thumbnails(&refs, Some(&["small", "large"]), &Cancellation::none())
            .await
            .unwrap();
        assert_eq!(env.metadata.get_many_calls(), before + 1);
        assert_eq!(
            summary,
            FetchSummary {
                groups: 1,
                sources: 3,
                managers: 3,
                skipped: 0,
            }
        );

        let calls = env.calls();
        for manager in &managers {
            manager.find("small").await.unwrap();
            manager.find("large").await.unwrap();
        }
        assert!(managers[0].get("small").await.unwrap().is_stored());
        assert!(managers[2].find("small").await.unwrap().is_absent());
        assert_eq!(env.calls(), calls);
    }

    #[tokio::test]
    async fn merge_leaves_out_of_scope_sizes_untouched() {
        let env = seeded().await;
        let manager = env.thumbnails.manager(SOURCE);
        assert!(manager.find("default").await.unwrap().is_absent());

        fetch_thumbnails(&[&manager], Some(&["small"]), &Cancellation::none())
            .await
            .unwrap();

        let cache = manager.cached_sizes().unwrap();
        assert_eq!(cache.get("small"), Some(&CacheState::Stored));
        assert_eq!(cache.get("default"), Some(&CacheState::Absent));
        assert_eq!(cache.get("large"), None);
    }

    #[tokio::test]
    async fn merge_keeps_cached_thumbnails() {
        let env = seeded().await;
        let manager = env.thumbnails.manager(SOURCE);
        let first = manager.get("small").await.unwrap();
        assert!(delete(&env.thumbnails, SOURCE, Some("small")).await.unwrap());

        fetch_thumbnails(&[&manager], Some(&["small"]), &Cancellation::none())
            .await
            .unwrap();
        assert_eq!(
            manager.cached_sizes().unwrap().get("small"),
            Some(&CacheState::Stored)
        );

        let calls = env.calls();
        assert_eq!(manager.get("small").await.unwrap(), first);
        assert_eq!(env.calls(), calls);
    }

    #[tokio::test]
    async fn without_sizes_every_registry_size_is_resolved() {
        let env = seeded().await;
        let manager = env.thumbnails.manager("photos/owl.png");

        fetch_thumbnails(&[&manager], None, &Cancellation::none())
            .await
            .unwrap();

        let cache = manager.cached_sizes().unwrap();
        assert_eq!(cache.len(), 3);
        assert!(cache.values().all(|state| *state == CacheState::Absent));
    }

    #[tokio::test]
    async fn unbound_managers_are_skipped() {
        let env = seeded().await;
        let bound = env.thumbnails.manager(SOURCE);
        let unbound = env.thumbnails.manager("");

        let summary = fetch_thumbnails(&[&bound, &unbound], None, &Cancellation::none())
            .await
            .unwrap();
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.managers, 1);
        assert_eq!(unbound.cached_sizes(), None);
    }

    #[tokio::test]
    async fn duplicate_sources_share_one_request() {
        let env = seeded().await;
        let first = env.thumbnails.manager(SOURCE);
        let second = env.thumbnails.manager(SOURCE);

        let summary = fetch_thumbnails(&[&first, &second], Some(&["small"]), &Cancellation::none())
            .await
            .unwrap();
        assert_eq!(summary.sources, 1);
        assert_eq!(
            second.cached_sizes().unwrap().get("small"),
            Some(&CacheState::Stored)
        );
    }

    #[tokio::test]
    async fn unknown_size_fails_before_any_query() {
        let env = seeded().await;
        let managers = managers(&env);
        let refs: Vec<_> = managers.iter().collect();
        let before = env.metadata.get_many_calls();

        let result = fetch_thumbnails(&refs, Some(&["small", "huge"]), &Cancellation::none()).await;
        assert!(matches!(result, Err(ThumbnailError::UnknownSize(name)) if name == "huge"));
        assert_eq!(env.metadata.get_many_calls(), before);
    }
}

mod non_batch_backend {
    use super::*;

    #[tokio::test]
    async fn fails_immediately_without_queries() {
        let env = TestEnv::with(
            CountingMetadataStore::non_batching(),
            Arc::new(EchoProcessor),
        )
        .await;
        let managers = managers(&env);
        let refs: Vec<_> = managers.iter().collect();

        let result = fetch_thumbnails(&refs, None, &Cancellation::none()).await;
        assert!(matches!(
            result,
            Err(ThumbnailError::BatchUnsupported { backend: "counting-table" })
        ));
        assert_eq!(env.calls(), 0);
        assert!(managers.iter().all(|m| m.cached_sizes().is_none()));
    }

    #[tokio::test]
    async fn one_non_batch_group_blocks_every_group() {
        let batching = seeded().await;
        let table = Arc::new(CountingMetadataStore::non_batching());

        let on_kv = batching.thumbnails.manager(SOURCE);
        let on_table = batching
            .thumbnails
            .manager("photos/dog.png")
            .with_metadata_store(table.clone());
        let before = batching.metadata.get_many_calls();

        let result =
            fetch_thumbnails(&[&on_kv, &on_table], None, &Cancellation::none()).await;
        assert!(matches!(result, Err(ThumbnailError::BatchUnsupported { .. })));
        assert_eq!(batching.metadata.get_many_calls(), before);
        assert_eq!(table.calls(), 0);
        assert_eq!(on_kv.cached_sizes(), None);
    }
}

mod grouping {
    use super::*;

    #[tokio::test]
    async fn one_query_per_metadata_store() {
        let env = seeded().await;
        let other = Arc::new(CountingMetadataStore::batching());

        let a = env.thumbnails.manager(SOURCE);
        let b = env.thumbnails.manager("photos/dog.png");
        let c = env
            .thumbnails
            .manager("photos/owl.png")
            .with_metadata_store(other.clone());
        let before = env.metadata.get_many_calls();

        let summary = fetch_thumbnails(&[&a, &c, &b], Some(&["small"]), &Cancellation::none())
            .await
            .unwrap();

        assert_eq!(summary.groups, 2);
        assert_eq!(env.metadata.get_many_calls(), before + 1);
        assert_eq!(other.get_many_calls(), 1);
        assert!(c.find("small").await.unwrap().is_absent());
    }
}

mod cancellation {
    use super::*;

    #[tokio::test]
    async fn cancelled_fetch_runs_no_query() {
        let env = seeded().await;
        let managers = managers(&env);
        let refs: Vec<_> = managers.iter().collect();
        let cancellation = Cancellation::none();
        cancellation.cancel();
        let before = env.metadata.get_many_calls();

        let result = fetch_thumbnails(&refs, None, &cancellation).await;
        assert!(matches!(result, Err(ThumbnailError::Cancelled)));
        assert_eq!(env.metadata.get_many_calls(), before);
    }

    #[tokio::test]
    async fn groups_merged_before_cancellation_stay_merged() {
        let env = seeded().await;
        let stalled = Arc::new(CountingMetadataStore::stalling());

        let first = env.thumbnails.manager(SOURCE);
        let second = env.thumbnails.manager("photos/dog.png");
        let blocked = env
            .thumbnails
            .manager("photos/owl.png")
            .with_metadata_store(stalled.clone());

        let cancellation = Cancellation::none();
        let trigger = cancellation.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let result = fetch_thumbnails(
            &[&first, &second, &blocked],
            Some(&["small"]),
            &cancellation,
        )
        .await;
        assert!(matches!(result, Err(ThumbnailError::Cancelled)));
        assert_eq!(stalled.get_many_calls(), 1);

        for manager in [&first, &second] {
            assert_eq!(
                manager.cached_sizes().unwrap().get("small"),
                Some(&CacheState::Stored)
            );
        }
        assert_eq!(blocked.cached_sizes(), None);
    }

    #[tokio::test]
    async fn generous_timeout_does_not_interfere() {
        let env = seeded().await;
        let managers = managers(&env);
        let refs: Vec<_> = managers.iter().collect();
        let cancellation = Cancellation::none().with_timeout(Duration::from_secs(5));

        let summary = fetch_thumbnails(&refs, None, &cancellation).await.unwrap();
        assert_eq!(summary.managers, 3);
    }
}
