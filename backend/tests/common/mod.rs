//! Shared fixtures for the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use oms_server::auth::{JwtSigner, SessionService, SessionSettings, TokenAuthority};
use oms_server::cache::{CredentialCache, MemoryStore};
use oms_server::config::{CacheConfig, JwtConfig};
use oms_server::db::{StoreError, UserStore};
use oms_server::models::{User, UserProjection};

pub const EMAIL: &str = "a@b.com";
pub const PASSWORD: &str = "correct horse battery staple";

/// In-memory user store that counts projection reads and can be made to fail
#[derive(Default)]
pub struct FakeUserStore {
    users: Mutex<HashMap<i64, User>>,
    projection_reads: AtomicUsize,
    last_login_updates: AtomicUsize,
    latency_ms: AtomicU64,
    fail_projections: AtomicBool,
    fail_updates: AtomicBool,
}

impl FakeUserStore {
    pub fn with_user(user: User) -> Self {
        let store = Self::default();
        store.insert(user);
        store
    }

    pub fn insert(&self, user: User) {
        self.users.lock().unwrap().insert(user.id, user);
    }

    pub fn remove(&self, id: i64) -> Option<User> {
        self.users.lock().unwrap().remove(&id)
    }

    pub fn user(&self, id: i64) -> Option<User> {
        self.users.lock().unwrap().get(&id).cloned()
    }

    pub fn projection_reads(&self) -> usize {
        self.projection_reads.load(Ordering::SeqCst)
    }

    pub fn last_login_updates(&self) -> usize {
        self.last_login_updates.load(Ordering::SeqCst)
    }

    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn fail_projections(&self, fail: bool) {
        self.fail_projections.store(fail, Ordering::SeqCst);
    }

    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    async fn delay(&self) {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
    }
}

#[async_trait]
impl UserStore for FakeUserStore {
    async fn get_by_email(&self, email: &str) -> Result<User, StoreError> {
        self.delay().await;
        self.users
            .lock()
            .unwrap()
            .values()
            .find(|u| u.email == email)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn get_by_id(&self, id: i64) -> Result<User, StoreError> {
        self.delay().await;
        self.user(id).ok_or(StoreError::NotFound)
    }

    async fn get_projection(&self, id: i64) -> Result<UserProjection, StoreError> {
        self.delay().await;
        self.projection_reads.fetch_add(1, Ordering::SeqCst);

        if self.fail_projections.load(Ordering::SeqCst) {
            return Err(StoreError::Database("connection reset".to_string()));
        }

        let user = self.user(id).ok_or(StoreError::NotFound)?;
        Ok(UserProjection {
            id: user.id,
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            phone: user.phone,
            profile_pic: user.profile_pic,
            company_id: Some(10),
            company_name: Some("Acme Foods".to_string()),
            business_id: Some(20),
            business_name: Some("Acme".to_string()),
            permissions: Some("fetch.order.all,update.order".to_string()),
            admin: false,
            first_login: user.first_login,
            last_login_at: user.last_login_at,
        })
    }

    async fn update_last_login(&self, id: i64, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.delay().await;

        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(StoreError::Database("read-only replica".to_string()));
        }

        let mut users = self.users.lock().unwrap();
        let user = users.get_mut(&id).ok_or(StoreError::NotFound)?;
        user.last_login_at = Some(at);
        user.first_login = false;
        self.last_login_updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Minimum bcrypt cost keeps the suite fast
pub const TEST_COST: u32 = 4;

pub fn user(id: i64, email: &str) -> User {
    user_with_cost(id, email, TEST_COST)
}

pub fn user_with_cost(id: i64, email: &str, cost: u32) -> User {
    let now = Utc::now();
    User {
        id,
        first_name: "Ada".to_string(),
        last_name: "Lovelace".to_string(),
        email: email.to_string(),
        password_hash: bcrypt::hash(PASSWORD, cost).unwrap(),
        phone: None,
        profile_pic: None,
        last_login_at: None,
        first_login: true,
        created_at: now,
        updated_at: now,
    }
}

pub fn jwt_config() -> JwtConfig {
    JwtConfig {
        access_secret: "test-access-secret".to_string(),
        refresh_secret: "test-refresh-secret".to_string(),
        access_ttl_seconds: 900,
        refresh_ttl_days: 7,
    }
}

/// A session service over in-memory backends, with handles to poke them
pub struct Harness {
    pub service: SessionService,
    pub cache: CredentialCache,
    pub kv: Arc<MemoryStore>,
    pub users: Arc<FakeUserStore>,
    pub signer: Arc<JwtSigner>,
}

pub fn harness() -> Harness {
    harness_with_timeouts(Duration::from_millis(500), Duration::from_millis(500))
}

pub fn settings() -> SessionSettings {
    SessionSettings {
        store_timeout: Duration::from_millis(500),
        request_timeout: Duration::from_secs(5),
        password_cost: TEST_COST,
        ..SessionSettings::default()
    }
}

pub fn harness_with_timeouts(cache_timeout: Duration, store_timeout: Duration) -> Harness {
    harness_with(
        cache_timeout,
        SessionSettings {
            store_timeout,
            ..settings()
        },
        user(1, EMAIL),
    )
}

/// Full control over the service settings and the one seeded user
pub fn harness_with(cache_timeout: Duration, settings: SessionSettings, seeded: User) -> Harness {
    let jwt = jwt_config();
    let keys = CacheConfig::default();

    let kv = Arc::new(MemoryStore::new());
    let cache = CredentialCache::new(kv.clone(), cache_timeout);
    let signer = Arc::new(JwtSigner::from_config(&jwt));
    let users = Arc::new(FakeUserStore::with_user(seeded));

    let tokens = TokenAuthority::new(signer.clone(), cache.clone(), &jwt, &keys);
    let service = SessionService::new(tokens, users.clone(), cache.clone(), settings).unwrap();

    Harness {
        service,
        cache,
        kv,
        users,
        signer,
    }
}
