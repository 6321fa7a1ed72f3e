//! Batch prefetch of thumbnail metadata for many managers at once.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use crate::cancel::Cancellation;
use crate::error::ThumbnailError;
use crate::manager::ThumbnailManager;
use crate::metadata::MetadataStore;

/// What a [`fetch_thumbnails`] call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchSummary {
    /// Metadata stores queried, one `get_many` each.
    pub groups: usize,
    /// Distinct source ids requested across all groups.
    pub sources: usize,
    /// Managers whose cache was populated.
    pub managers: usize,
    /// Managers skipped because no source is bound.
    pub skipped: usize,
}

struct Group<'a> {
    store: &'a Arc<dyn MetadataStore>,
    managers: Vec<&'a ThumbnailManager>,
}

fn same_store(a: &Arc<dyn MetadataStore>, b: &Arc<dyn MetadataStore>) -> bool {
    // Compare data pointers only; vtable pointers are not unique.
    std::ptr::eq(Arc::as_ptr(a).cast::<()>(), Arc::as_ptr(b).cast::<()>())
}

/// Populate the caches of `managers` with one bulk query per metadata store.
///
/// When `sizes` is given only those sizes are fetched and merged; otherwise
/// every size of each manager's registry is. After a successful fetch,
/// resolving any fetched size on those managers needs no backend call.
///
/// Fails with [`ThumbnailError::BatchUnsupported`] before issuing any query
/// if one of the stores cannot batch. Groups merged before a later failure
/// or cancellation stay merged.
pub async fn fetch_thumbnails(
    managers: &[&ThumbnailManager],
    sizes: Option<&[&str]>,
    cancellation: &Cancellation,
) -> Result<FetchSummary, ThumbnailError> {
    if let Some(sizes) = sizes {
        for manager in managers {
            for size in sizes {
                manager.registry().get(size)?;
            }
        }
    }

    let mut summary = FetchSummary::default();
    let mut groups: Vec<Group<'_>> = Vec::new();
    for &manager in managers {
        if manager.source_id().is_none() {
            summary.skipped += 1;
            continue;
        }
        let store = manager.metadata_store();
        match groups.iter_mut().find(|g| same_store(g.store, store)) {
            Some(group) => group.managers.push(manager),
            None => groups.push(Group {
                store,
                managers: vec![manager],
            }),
        }
    }

    if let Some(group) = groups.iter().find(|g| !g.store.supports_batch()) {
        return Err(ThumbnailError::BatchUnsupported {
            backend: group.store.name(),
        });
    }

    let requested: Option<Vec<String>> =
        sizes.map(|sizes| sizes.iter().map(|s| s.to_string()).collect());

    for group in &groups {
        let mut seen = HashSet::new();
        let source_ids: Vec<String> = group
            .managers
            .iter()
            .filter_map(|m| m.source_id())
            .filter(|id| seen.insert(*id))
            .map(str::to_string)
            .collect();

        let found = cancellation
            .guard(group.store.get_many(&source_ids, requested.as_deref()))
            .await?;

        for manager in &group.managers {
            let scope = match &requested {
                Some(sizes) => sizes.clone(),
                None => manager.registry().names().map(str::to_string).collect(),
            };
            let descriptors = manager
                .source_id()
                .and_then(|id| found.get(id))
                .cloned()
                .unwrap_or_default();
            manager.merge_prefetched(descriptors, &scope);
        }

        debug!(
            backend = group.store.name(),
            sources = source_ids.len(),
            managers = group.managers.len(),
            "Prefetched thumbnail metadata"
        );
        summary.groups += 1;
        summary.sources += source_ids.len();
        summary.managers += group.managers.len();
    }

    Ok(summary)
}
