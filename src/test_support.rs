//! In-memory stores backing `AppState::fake()` and unit tests.

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;
use bytes::Bytes;
use time::OffsetDateTime;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::{
    auth::{
        repo::UserStore,
        repo_types::{DuplicateUser, User},
    },
    observations::{
        repo::ObservationStore,
        repo_types::{NewObservation, Observation, PendingObservation},
    },
    storage::StorageClient,
};

#[derive(Default)]
pub struct MemoryUsers {
    users: Mutex<Vec<User>>,
}

impl MemoryUsers {
    pub fn is_empty(&self) -> bool {
        self.users.lock().unwrap().is_empty()
    }
}

#[async_trait]
impl UserStore for MemoryUsers {
    async fn find_by_username(&self, username: &str) -> anyhow::Result<Option<User>> {
        let users = self.users.lock().unwrap();
        Ok(users.iter().find(|u| u.username == username).cloned())
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let users = self.users.lock().unwrap();
        Ok(users.iter().find(|u| u.email == email).cloned())
    }

    async fn create(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> anyhow::Result<User> {
        let mut users = self.users.lock().unwrap();
        if users.iter().any(|u| u.username == username) {
            return Err(DuplicateUser::Username.into());
        }
        if users.iter().any(|u| u.email == email) {
            return Err(DuplicateUser::Email.into());
        }
        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            created_at: OffsetDateTime::now_utc(),
        };
        users.push(user.clone());
        Ok(user)
    }
}

struct Row {
    user_id: Uuid,
    caption: String,
    image_urls: Option<Vec<String>>,
    longitude: f64,
    latitude: f64,
    views: i64,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl Row {
    fn published(&self, id: i64) -> Option<Observation> {
        Some(Observation {
            id,
            user_id: self.user_id,
            caption: self.caption.clone(),
            image_urls: self.image_urls.clone()?,
            longitude: self.longitude,
            latitude: self.latitude,
            views: self.views,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Default)]
struct Table {
    next_id: i64,
    rows: BTreeMap<i64, Row>,
}

impl Table {
    fn insert(&mut self, row: Row) -> i64 {
        self.next_id += 1;
        self.rows.insert(self.next_id, row);
        self.next_id
    }
}

#[derive(Default)]
pub struct MemoryObservations {
    table: Mutex<Table>,
    lose_reserved: AtomicBool,
}

impl MemoryObservations {
    /// Rows of any state, pending included.
    pub fn row_count(&self) -> usize {
        self.table.lock().unwrap().rows.len()
    }

    /// Reserved rows not yet finalized.
    pub fn pending_count(&self) -> usize {
        let table = self.table.lock().unwrap();
        table.rows.values().filter(|r| r.image_urls.is_none()).count()
    }

    /// Makes `reserve` hand out ids for rows that are never stored.
    pub fn drop_reserved_rows(&self) {
        self.lose_reserved.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ObservationStore for MemoryObservations {
    async fn create(&self, new: &NewObservation) -> anyhow::Result<Observation> {
        let now = OffsetDateTime::now_utc();
        let mut table = self.table.lock().unwrap();
        let id = table.insert(Row {
            user_id: new.user_id,
            caption: new.caption.clone(),
            image_urls: Some(new.image_urls.clone()),
            longitude: new.longitude,
            latitude: new.latitude,
            views: 0,
            created_at: now,
            updated_at: now,
        });
        Ok(table.rows[&id].published(id).expect("row was created published"))
    }

    async fn get(&self, id: i64) -> anyhow::Result<Option<Observation>> {
        let table = self.table.lock().unwrap();
        Ok(table.rows.get(&id).and_then(|r| r.published(id)))
    }

    async fn list(&self, offset: i64, limit: i64) -> anyhow::Result<Vec<Observation>> {
        let table = self.table.lock().unwrap();
        Ok(table
            .rows
            .iter()
            .filter_map(|(id, r)| r.published(*id))
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn reserve(&self, pending: &PendingObservation) -> anyhow::Result<i64> {
        let now = OffsetDateTime::now_utc();
        let mut table = self.table.lock().unwrap();
        if self.lose_reserved.load(Ordering::SeqCst) {
            table.next_id += 1;
            return Ok(table.next_id);
        }
        Ok(table.insert(Row {
            user_id: pending.user_id,
            caption: pending.caption.clone(),
            image_urls: None,
            longitude: pending.longitude,
            latitude: pending.latitude,
            views: 0,
            created_at: now,
            updated_at: now,
        }))
    }

    async fn update_image_urls(
        &self,
        id: i64,
        urls: &[String],
    ) -> anyhow::Result<Option<Observation>> {
        let mut table = self.table.lock().unwrap();
        Ok(table.rows.get_mut(&id).and_then(|r| {
            r.image_urls = Some(urls.to_vec());
            r.updated_at = OffsetDateTime::now_utc();
            r.published(id)
        }))
    }

    async fn delete(&self, id: i64) -> anyhow::Result<bool> {
        Ok(self.table.lock().unwrap().rows.remove(&id).is_some())
    }

    async fn increment_views(&self, id: i64) -> anyhow::Result<Option<Observation>> {
        let mut table = self.table.lock().unwrap();
        Ok(table
            .rows
            .get_mut(&id)
            .filter(|r| r.image_urls.is_some())
            .and_then(|r| {
                r.views += 1;
                r.updated_at = OffsetDateTime::now_utc();
                r.published(id)
            }))
    }
}

#[derive(Default)]
pub struct MemoryStorage {
    objects: Mutex<BTreeMap<String, Bytes>>,
    fail_after: Option<usize>,
}

impl MemoryStorage {
    /// Accepts `n` puts, then fails every further one.
    pub fn failing_after(n: usize) -> Self {
        Self {
            fail_after: Some(n),
            ..Self::default()
        }
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }
}

#[async_trait]
impl StorageClient for MemoryStorage {
    async fn put_object(&self, key: &str, body: Bytes, _content_type: &str) -> anyhow::Result<()> {
        let mut objects = self.objects.lock().unwrap();
        if self.fail_after.is_some_and(|n| objects.len() >= n) {
            anyhow::bail!("injected put failure for {key}");
        }
        objects.insert(key.to_string(), body);
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> anyhow::Result<()> {
        let dir = format!("{}/", prefix.trim_end_matches('/'));
        self.objects
            .lock()
            .unwrap()
            .retain(|k, _| !k.starts_with(&dir));
        Ok(())
    }
}

/// Memory storage whose put number `hold_at` (zero based) parks until
/// [`GatedStorage::release`], then succeeds or fails per `fail_held`.
pub struct GatedStorage {
    inner: MemoryStorage,
    puts: AtomicUsize,
    hold_at: usize,
    fail_held: bool,
    reached: Notify,
    released: Notify,
    prefix_deleted: AtomicBool,
}

impl GatedStorage {
    pub fn new(hold_at: usize, fail_held: bool) -> Self {
        Self {
            inner: MemoryStorage::default(),
            puts: AtomicUsize::new(0),
            hold_at,
            fail_held,
            reached: Notify::new(),
            released: Notify::new(),
            prefix_deleted: AtomicBool::new(false),
        }
    }

    /// Resolves once the held put has started.
    pub async fn reached(&self) {
        self.reached.notified().await;
    }

    pub fn release(&self) {
        self.released.notify_one();
    }

    pub fn keys(&self) -> Vec<String> {
        self.inner.keys()
    }

    pub fn prefix_deleted(&self) -> bool {
        self.prefix_deleted.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StorageClient for GatedStorage {
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()> {
        if self.puts.fetch_add(1, Ordering::SeqCst) == self.hold_at {
            self.reached.notify_one();
            self.released.notified().await;
            if self.fail_held {
                anyhow::bail!("storage went away while writing {key}");
            }
        }
        self.inner.put_object(key, body, content_type).await
    }

    async fn delete_prefix(&self, prefix: &str) -> anyhow::Result<()> {
        self.prefix_deleted.store(true, Ordering::SeqCst);
        self.inner.delete_prefix(prefix).await
    }
}
