use std::collections::HashSet;
use std::sync::Arc;

use thumbnails::{CacheState, Thumbnail, ThumbnailError, delete, exists};

use crate::common::{
    CountingMetadataStore, FailingProcessor, SOURCE, SOURCE_BYTES, TestEnv, registry,
};

mod size_lookup {
    use super::*;

    #[tokio::test]
    async fn unknown_size_fails_on_bound_and_unbound_managers() {
        let env = TestEnv::new().await;
        let bound = env.thumbnails.manager(SOURCE);
        let unbound = env.thumbnails.manager("");

        for manager in [&bound, &unbound] {
            assert!(matches!(
                manager.get("huge").await,
                Err(ThumbnailError::UnknownSize(name)) if name == "huge"
            ));
            assert!(matches!(
                manager.find("huge").await,
                Err(ThumbnailError::UnknownSize(_))
            ));
            assert!(matches!(
                manager.size("huge").await,
                Err(ThumbnailError::UnknownSize(_))
            ));
        }
        assert_eq!(env.calls(), 0);
    }

    #[tokio::test]
    async fn named_access_generates_like_get() {
        let env = TestEnv::new().await;
        let manager = env.thumbnails.manager(SOURCE);

        let by_name = manager.size("large").await.unwrap();
        let by_get = manager.get("large").await.unwrap();
        assert!(by_name.is_stored());
        assert_eq!(by_name, by_get);
        assert_eq!(by_name.read().await.unwrap(), b"400x300|CAT-PIXELS");
    }
}

mod without_source {
    use super::*;

    #[tokio::test]
    async fn size_with_fallback_yields_fallback_url() {
        let env = TestEnv::new().await;
        let manager = env.thumbnails.manager("");

        let thumb = manager.get("small").await.unwrap();
        assert!(matches!(&thumb, Thumbnail::Fallback(_)));
        assert_eq!(thumb.url().unwrap(), "https://cdn.test/static/small.png");
        assert_eq!(env.calls(), 0);
    }

    #[tokio::test]
    async fn size_without_fallback_is_unresolvable_on_access() {
        let env = TestEnv::new().await;
        let manager = env.thumbnails.manager("");

        let thumb = manager.get("large").await.unwrap();
        assert!(thumb.is_absent());
        assert!(matches!(
            thumb.url(),
            Err(ThumbnailError::NoSource { size }) if size == "large"
        ));
        assert!(matches!(
            thumb.read().await,
            Err(ThumbnailError::NoSource { .. })
        ));
        assert_eq!(env.calls(), 0);
    }
}

mod caching {
    use super::*;

    #[tokio::test]
    async fn get_after_create_makes_no_backend_calls() {
        let env = TestEnv::new().await;
        let manager = env.thumbnails.manager(SOURCE);

        let created = manager.create("default").await.unwrap();
        let before = env.calls();

        for _ in 0..3 {
            let again = manager.get("default").await.unwrap();
            assert_eq!(again, created);
            assert_eq!(again.path().unwrap(), created.path().unwrap());
        }
        assert_eq!(env.calls(), before);
    }

    #[tokio::test]
    async fn second_get_is_served_from_cache() {
        let env = TestEnv::new().await;
        let manager = env.thumbnails.manager(SOURCE);

        let first = manager.get("small").await.unwrap();
        let before = env.calls();
        let second = manager.get("small").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(env.calls(), before);
    }

    #[tokio::test]
    async fn existing_thumbnail_is_found_without_generating() {
        let env = TestEnv::new().await;
        let created = env.thumbnails.manager(SOURCE).get("small").await.unwrap();
        let adds = env.metadata.add.load(std::sync::atomic::Ordering::SeqCst);

        let fresh = env.thumbnails.manager(SOURCE);
        let found = fresh.get("small").await.unwrap();
        assert_eq!(found, created);
        assert_eq!(
            env.metadata.add.load(std::sync::atomic::Ordering::SeqCst),
            adds
        );
    }

    #[tokio::test]
    async fn create_replaces_cached_handle() {
        let env = TestEnv::new().await;
        let manager = env.thumbnails.manager(SOURCE);

        let first = manager.get("small").await.unwrap();
        let second = manager.create("small").await.unwrap();
        assert_ne!(first, second);
        assert_eq!(manager.get("small").await.unwrap(), second);
    }

    #[tokio::test]
    async fn failed_generation_leaves_cache_untouched() {
        let env = TestEnv::with(
            CountingMetadataStore::batching(),
            Arc::new(FailingProcessor),
        )
        .await;
        let manager = env.thumbnails.manager(SOURCE);

        assert!(matches!(
            manager.get("small").await,
            Err(ThumbnailError::Generation(_))
        ));
        assert!(
            manager
                .cached_sizes()
                .is_none_or(|cache| !cache.contains_key("small"))
        );
        assert!(!exists(&env.thumbnails, SOURCE, Some("small")).await.unwrap());
    }
}

mod deletion {
    use super::*;

    #[tokio::test]
    async fn deleted_thumbnail_no_longer_exists() {
        let env = TestEnv::new().await;
        let manager = env.thumbnails.manager(SOURCE);
        let thumb = manager.get("default").await.unwrap();
        let path = thumb.path().unwrap().to_string();

        assert!(manager.delete("default").await.unwrap());

        assert!(!exists(&env.thumbnails, SOURCE, Some("default")).await.unwrap());
        assert!(!exists(&env.thumbnails, SOURCE, None).await.unwrap());
        assert!(manager.find("default").await.unwrap().is_absent());
        assert!(!env.storage.inner.paths().contains(&path));
    }

    #[tokio::test]
    async fn deleting_missing_thumbnail_is_silent() {
        let env = TestEnv::new().await;
        let manager = env.thumbnails.manager(SOURCE);

        assert!(!manager.delete("large").await.unwrap());
        assert!(!delete(&env.thumbnails, SOURCE, Some("large")).await.unwrap());
    }

    #[tokio::test]
    async fn free_delete_bypasses_manager_cache() {
        let env = TestEnv::new().await;
        let manager = env.thumbnails.manager(SOURCE);
        manager.get("default").await.unwrap();

        assert!(delete(&env.thumbnails, SOURCE, None).await.unwrap());
        assert!(!exists(&env.thumbnails, SOURCE, None).await.unwrap());

        // The manager still holds its stale handle until told otherwise.
        assert_eq!(
            manager.cached_sizes().unwrap().get("default"),
            Some(&CacheState::Stored)
        );
        manager.reset_cache();
        assert!(manager.find("default").await.unwrap().is_absent());
    }
}

mod listing {
    use super::*;

    #[tokio::test]
    async fn all_returns_exactly_persisted_sizes() {
        let env = TestEnv::new().await;
        let writer = env.thumbnails.manager(SOURCE);
        writer.get("small").await.unwrap();
        writer.get("large").await.unwrap();

        let reader = env.thumbnails.manager(SOURCE);
        // Populate the cache with something unrelated first.
        assert!(reader.find("default").await.unwrap().is_absent());

        let all = reader.all().await.unwrap();
        let sizes: HashSet<_> = all.keys().map(String::as_str).collect();
        assert_eq!(sizes, HashSet::from(["small", "large"]));
        assert!(all.values().all(Thumbnail::is_stored));
    }

    #[tokio::test]
    async fn all_never_generates() {
        let env = TestEnv::new().await;
        let manager = env.thumbnails.manager(SOURCE);

        assert!(manager.all().await.unwrap().is_empty());
        assert_eq!(env.metadata.add.load(std::sync::atomic::Ordering::SeqCst), 0);
        assert_eq!(env.metadata.get_all.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn all_keeps_cached_thumbnails() {
        let env = TestEnv::new().await;
        let manager = env.thumbnails.manager(SOURCE);
        let first = manager.get("small").await.unwrap();

        // Removed behind the manager's back; its cached handle stays authoritative.
        assert!(delete(&env.thumbnails, SOURCE, Some("small")).await.unwrap());
        assert!(manager.all().await.unwrap().is_empty());
        assert_eq!(
            manager.cached_sizes().unwrap().get("small"),
            Some(&CacheState::Stored)
        );

        let adds = env.metadata.add.load(std::sync::atomic::Ordering::SeqCst);
        let again = manager.get("small").await.unwrap();
        assert_eq!(again, first);
        assert_eq!(env.metadata.add.load(std::sync::atomic::Ordering::SeqCst), adds);
    }

    #[tokio::test]
    async fn all_primes_cache_for_find() {
        let env = TestEnv::new().await;
        env.thumbnails.manager(SOURCE).get("small").await.unwrap();

        let manager = env.thumbnails.manager(SOURCE);
        manager.all().await.unwrap();
        let before = env.calls();

        assert!(manager.find("small").await.unwrap().is_stored());
        assert!(manager.find("large").await.unwrap().is_absent());
        assert_eq!(env.calls(), before);
    }
}

mod concurrency {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_creates_leave_one_consistent_descriptor() {
        let env = Arc::new(TestEnv::new().await);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let env = Arc::clone(&env);
            handles.push(tokio::spawn(async move {
                let thumb = env.thumbnails.manager(SOURCE).create("small").await?;
                Ok::<_, ThumbnailError>(thumb.path()?.to_string())
            }));
        }

        let mut paths = HashSet::new();
        for handle in handles {
            paths.insert(handle.await.unwrap().unwrap());
        }
        assert_eq!(paths.len(), 8, "every create writes its own blob");

        let manager = env.thumbnails.manager(SOURCE);
        let all = manager.all().await.unwrap();
        assert_eq!(all.len(), 1);
        let final_thumb = &all["small"];
        assert!(paths.contains(final_thumb.path().unwrap()));

        let mut expected = b"20x20|".to_vec();
        expected.extend_from_slice(SOURCE_BYTES);
        assert_eq!(final_thumb.read().await.unwrap(), expected);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn locked_gets_generate_once() {
        let env = TestEnv::new().await;
        let thumbnails = Arc::new(
            thumbnails::Thumbnails::new(
                registry(),
                env.metadata.clone(),
                env.storage.clone(),
                Arc::new(crate::common::EchoProcessor),
                "thumbs",
            )
            .with_locks(),
        );

        let mut handles = Vec::new();
        for _ in 0..6 {
            let thumbnails = Arc::clone(&thumbnails);
            handles.push(tokio::spawn(async move {
                thumbnails.manager(SOURCE).get("large").await
            }));
        }
        let mut paths = HashSet::new();
        for handle in handles {
            paths.insert(handle.await.unwrap().unwrap().path().unwrap().to_string());
        }

        assert_eq!(paths.len(), 1);
        assert_eq!(env.metadata.add.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
