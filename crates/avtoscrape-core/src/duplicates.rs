use futures::future::join_all;

use crate::error::AppError;
use crate::models::VehicleCategory;
use crate::traits::VehicleStore;

/// Collapses every group of records sharing a link down to its first
/// stored member. Returns the number of records deleted.
///
/// Idempotent: a second run finds no groups and deletes nothing.
pub async fn collapse_duplicates<S: VehicleStore>(
    store: &S,
    category: VehicleCategory,
    namespace: Option<&str>,
) -> Result<u64, AppError> {
    let groups = store.duplicate_groups(category, namespace).await?;
    if groups.is_empty() {
        tracing::info!(%category, "No duplicate links");
        return Ok(0);
    }

    let surplus: Vec<_> = groups
        .iter()
        .flat_map(|group| group.ids.iter().skip(1).copied())
        .collect();

    let deleted = store.delete_by_ids(category, &surplus).await?;
    tracing::info!(%category, groups = groups.len(), deleted, "Collapsed duplicate links");
    Ok(deleted)
}

/// Runs [`collapse_duplicates`] for every category concurrently.
pub async fn collapse_all<S: VehicleStore>(
    store: &S,
    namespace: Option<&str>,
) -> Vec<(VehicleCategory, Result<u64, AppError>)> {
    let results = join_all(
        VehicleCategory::ALL
            .iter()
            .map(|category| collapse_duplicates(store, *category, namespace)),
    )
    .await;
    VehicleCategory::ALL.into_iter().zip(results).collect()
}
