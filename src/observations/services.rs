use tracing::{debug, info};
use uuid::Uuid;

use super::{
    dto::CreateObservationRequest,
    repo::ObservationStore,
    repo_types::{NewObservation, Observation},
    validation::{validate_caption, validate_coordinates, validate_image_urls},
};
use crate::error::AppError;

pub const DEFAULT_PAGE_LIMIT: i64 = 100;
pub const MAX_PAGE_LIMIT: i64 = 1000;

pub async fn create_observation(
    store: &dyn ObservationStore,
    user_id: Uuid,
    req: CreateObservationRequest,
) -> Result<Observation, AppError> {
    validate_caption(&req.caption)?;
    validate_image_urls(&req.image_urls)?;
    validate_coordinates(req.longitude, req.latitude)?;

    let obs = store
        .create(&NewObservation {
            user_id,
            caption: req.caption,
            image_urls: req.image_urls,
            longitude: req.longitude,
            latitude: req.latitude,
        })
        .await?;
    info!(observation_id = obs.id, %user_id, "observation created");
    Ok(obs)
}

/// `skip`/`limit` window over published observations. Negative values are
/// rejected and `limit` is capped at [`MAX_PAGE_LIMIT`].
pub async fn list_observations(
    store: &dyn ObservationStore,
    skip: i64,
    limit: i64,
) -> Result<Vec<Observation>, AppError> {
    if skip < 0 || limit < 0 {
        return Err(AppError::validation("skip and limit must be non-negative"));
    }
    Ok(store.list(skip, limit.min(MAX_PAGE_LIMIT)).await?)
}

/// Counts a view unless the viewer owns the observation. Repeat views by the
/// same non-owner count again.
pub async fn increment_if_not_owner(
    store: &dyn ObservationStore,
    observation_id: i64,
    viewer_id: Uuid,
) -> anyhow::Result<Option<Observation>> {
    let Some(obs) = store.get(observation_id).await? else {
        return Ok(None);
    };
    if obs.user_id == viewer_id {
        debug!(observation_id, "owner view not counted");
        return Ok(Some(obs));
    }

    let updated = store.increment_views(observation_id).await?;
    if let Some(o) = &updated {
        debug!(observation_id, %viewer_id, views = o.views, "view counted");
    }
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MemoryObservations;

    fn req(caption: &str, urls: &[&str], lon: f64, lat: f64) -> CreateObservationRequest {
        CreateObservationRequest {
            caption: caption.into(),
            image_urls: urls.iter().map(|u| u.to_string()).collect(),
            longitude: lon,
            latitude: lat,
        }
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let store = MemoryObservations::default();
        let owner = Uuid::new_v4();
        let created = create_observation(
            &store,
            owner,
            req("Great day", &["http://img/1.jpg", "http://img/2.jpg"], -122.0, 37.0),
        )
        .await
        .unwrap();
        assert_eq!(created.views, 0);
        assert_eq!(created.user_id, owner);
        assert!(created.updated_at >= created.created_at);

        let fetched = store.get(created.id).await.unwrap().unwrap();
        assert_eq!(fetched.caption, "Great day");
        assert_eq!(fetched.image_urls, vec!["http://img/1.jpg", "http://img/2.jpg"]);
        assert!((fetched.longitude - -122.0).abs() < 1e-9);
        assert!((fetched.latitude - 37.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn create_rejects_invalid_input_without_side_effects() {
        let store = MemoryObservations::default();
        let owner = Uuid::new_v4();
        for bad in [
            req("", &["http://img/1.jpg"], 0.0, 0.0),
            req("   ", &["http://img/1.jpg"], 0.0, 0.0),
            req("ok", &[], 0.0, 0.0),
            req("ok", &["a", "b", "c", "d", "e", "f"], 0.0, 0.0),
            req("ok", &["http://img/1.jpg"], 181.0, 0.0),
            req("ok", &["http://img/1.jpg"], 0.0, -91.0),
        ] {
            let err = create_observation(&store, owner, bad).await.unwrap_err();
            assert!(matches!(err, AppError::Validation(_)));
        }
        assert_eq!(store.row_count(), 0);
    }

    #[tokio::test]
    async fn list_is_a_sliding_window() {
        let store = MemoryObservations::default();
        let owner = Uuid::new_v4();
        for i in 0..5 {
            create_observation(&store, owner, req(&format!("obs {i}"), &["u"], 0.0, 0.0))
                .await
                .unwrap();
        }

        let page = list_observations(&store, 1, 2).await.unwrap();
        assert_eq!(
            page.iter().map(|o| o.caption.as_str()).collect::<Vec<_>>(),
            ["obs 1", "obs 2"]
        );
        assert_eq!(list_observations(&store, 0, 100).await.unwrap().len(), 5);
        assert!(list_observations(&store, 50, 10).await.unwrap().is_empty());
        assert_eq!(
            list_observations(&store, 0, 2).await.unwrap(),
            list_observations(&store, 0, 2).await.unwrap()
        );
        assert!(list_observations(&store, -1, 10).await.is_err());
        assert!(list_observations(&store, 0, -1).await.is_err());
    }

    #[tokio::test]
    async fn owner_views_change_nothing() {
        let store = MemoryObservations::default();
        let owner = Uuid::new_v4();
        let obs = create_observation(&store, owner, req("mine", &["u"], 0.0, 0.0))
            .await
            .unwrap();

        for _ in 0..3 {
            let seen = increment_if_not_owner(&store, obs.id, owner)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(seen.views, 0);
            assert_eq!(seen.updated_at, obs.updated_at);
        }
    }

    #[tokio::test]
    async fn each_non_owner_view_counts_once() {
        let store = MemoryObservations::default();
        let owner = Uuid::new_v4();
        let obs = create_observation(&store, owner, req("popular", &["u"], 0.0, 0.0))
            .await
            .unwrap();

        let bob = Uuid::new_v4();
        let carol = Uuid::new_v4();
        for viewer in [bob, bob, carol, bob] {
            increment_if_not_owner(&store, obs.id, viewer).await.unwrap();
        }
        let after = store.get(obs.id).await.unwrap().unwrap();
        assert_eq!(after.views, 4);
        assert!(after.updated_at >= obs.updated_at);
    }

    #[tokio::test]
    async fn concurrent_views_are_not_lost() {
        let store = std::sync::Arc::new(MemoryObservations::default());
        let obs = create_observation(store.as_ref(), Uuid::new_v4(), req("hot", &["u"], 0.0, 0.0))
            .await
            .unwrap();

        let mut tasks = Vec::new();
        for _ in 0..20 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                increment_if_not_owner(store.as_ref(), obs.id, Uuid::new_v4())
                    .await
                    .unwrap()
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }
        assert_eq!(store.get(obs.id).await.unwrap().unwrap().views, 20);
    }

    #[tokio::test]
    async fn viewing_unknown_observation_is_none() {
        let store = MemoryObservations::default();
        assert!(increment_if_not_owner(&store, 999, Uuid::new_v4())
            .await
            .unwrap()
            .is_none());
    }
}
