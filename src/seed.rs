//! `climbermap seed [count]`: fills the database with demo observations
//! clustered around Yosemite Valley.

use anyhow::Context;
use rand::{seq::SliceRandom, Rng};
use tracing::info;

use crate::{
    auth::{password::hash_password, repo::UserStore, repo_types::User},
    observations::{
        repo::ObservationStore,
        repo_types::{NewObservation, Observation},
        validation::MAX_IMAGES,
    },
};

pub const DEFAULT_SEED_COUNT: usize = 20;

const CENTER_LAT: f64 = 37.7469;
const CENTER_LON: f64 = -119.5938;
/// Degrees; about 550 m.
const CLUSTER_RADIUS: f64 = 0.005;

const DEMO_USERNAME: &str = "demo";
const DEMO_EMAIL: &str = "demo@climbermap.local";

const CAPTIONS: &[&str] = &[
    "Amazing send on this classic route!",
    "Perfect conditions today, no crowds!",
    "First time here, absolutely stunning views!",
    "Epic climb with great partners!",
    "Challenging route but totally worth it!",
    "Beautiful sunrise from the summit!",
    "New personal best on this route!",
    "The exposure is incredible up here!",
    "Great day at the crag with friends!",
    "Amazing rock quality on this face!",
];

const IMAGE_POOL: &[&str] = &[
    "https://images.unsplash.com/photo-1506905925346-21bda4d32df4",
    "https://images.unsplash.com/photo-1464822759844-d150ad2996e1",
    "https://images.unsplash.com/photo-1470071459604-3b5ec3a7fe05",
    "https://images.unsplash.com/photo-1504280390367-361c6d9f38f4",
    "https://images.unsplash.com/photo-1516567727245-cd7497d7c0ec",
    "https://images.unsplash.com/photo-1532384748853-8f54a8f476e2",
    "https://images.unsplash.com/photo-1544966503-7cc5ac882d5f",
    "https://images.unsplash.com/photo-1551632811-561732d1e306",
];

/// Parses the optional count argument that follows `seed`.
pub fn parse_count(arg: Option<&str>) -> anyhow::Result<usize> {
    match arg {
        None => Ok(DEFAULT_SEED_COUNT),
        Some(raw) => raw
            .parse()
            .with_context(|| format!("seed count must be a positive integer, got {raw:?}")),
    }
}

/// Adds `count` observations owned by the demo user, creating it on first use.
/// Existing observations are left alone.
pub async fn seed_demo<R: Rng>(
    users: &dyn UserStore,
    observations: &dyn ObservationStore,
    count: usize,
    rng: &mut R,
) -> anyhow::Result<Vec<Observation>> {
    let owner = demo_user(users).await?;

    let mut created = Vec::with_capacity(count);
    for _ in 0..count {
        let new = demo_observation(&owner, rng);
        created.push(observations.create(&new).await.context("insert demo observation")?);
    }
    info!(count, owner = %owner.username, "demo observations seeded");
    Ok(created)
}

async fn demo_user(users: &dyn UserStore) -> anyhow::Result<User> {
    if let Some(user) = users.find_by_username(DEMO_USERNAME).await? {
        return Ok(user);
    }
    let secret = uuid::Uuid::new_v4().simple().to_string();
    let user = users
        .create(DEMO_USERNAME, DEMO_EMAIL, &hash_password(&secret)?)
        .await
        .context("create demo user")?;
    info!(user_id = %user.id, "demo user created");
    Ok(user)
}

fn demo_observation<R: Rng>(owner: &User, rng: &mut R) -> NewObservation {
    let mut offset = || rng.gen_range(-CLUSTER_RADIUS..=CLUSTER_RADIUS);
    let latitude = CENTER_LAT + offset();
    let longitude = CENTER_LON + offset();

    let images = rng.gen_range(1..=MAX_IMAGES);
    let image_urls = IMAGE_POOL
        .choose_multiple(rng, images)
        .map(|u| u.to_string())
        .collect();
    let caption = CAPTIONS
        .choose(rng)
        .copied()
        .unwrap_or("Great day out")
        .to_string();

    NewObservation {
        user_id: owner.id,
        caption,
        image_urls,
        longitude,
        latitude,
    }
}
