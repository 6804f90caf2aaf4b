use std::collections::HashMap;
use std::sync::RwLock;

use crate::db::{queries, Db};
use crate::models::{BusinessProfile, ProfileDocument};

/// Synchronous lookup of business profiles by id.
pub trait ProfileStore: Send + Sync {
    /// `Ok(None)` when the business is unknown. Stored documents that fail
    /// validation are errors.
    fn load(&self, business_id: &str) -> anyhow::Result<Option<BusinessProfile>>;

    /// Validates and stores `doc`, returning the parsed profile.
    fn save(&self, business_id: &str, doc: ProfileDocument) -> anyhow::Result<BusinessProfile>;
}

/// Profile for a new call. Lookup failures and unknown businesses fall back to
/// [`BusinessProfile::minimal`] so the call can still be answered.
pub fn resolve_profile(store: &dyn ProfileStore, business_id: &str) -> BusinessProfile {
    match store.load(business_id) {
        Ok(Some(profile)) => profile,
        Ok(None) => {
            tracing::info!(business_id, "no profile stored, using minimal profile");
            BusinessProfile::minimal(business_id)
        }
        Err(e) => {
            tracing::error!(business_id, error = %e, "profile lookup failed, using minimal profile");
            BusinessProfile::minimal(business_id)
        }
    }
}

pub struct SqliteProfileStore {
    db: Db,
}

impl SqliteProfileStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

impl ProfileStore for SqliteProfileStore {
    fn load(&self, business_id: &str) -> anyhow::Result<Option<BusinessProfile>> {
        let doc = {
            let db = self.db.lock().unwrap();
            queries::get_profile_document(&db, business_id)?
        };
        doc.map(|json| BusinessProfile::from_json(business_id, &json))
            .transpose()
    }

    fn save(&self, business_id: &str, doc: ProfileDocument) -> anyhow::Result<BusinessProfile> {
        let json = serde_json::to_string(&doc)?;
        let profile = BusinessProfile::from_document(business_id, doc)?;

        let db = self.db.lock().unwrap();
        queries::upsert_profile_document(&db, business_id, &json)?;
        Ok(profile)
    }
}

/// Profiles held in memory, e.g. loaded from a fixture at startup.
#[derive(Default)]
pub struct StaticProfileStore {
    profiles: RwLock<HashMap<String, BusinessProfile>>,
}

impl StaticProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, profile: BusinessProfile) -> Self {
        self.profiles
            .write()
            .unwrap()
            .insert(profile.business_id.clone(), profile);
        self
    }
}

impl ProfileStore for StaticProfileStore {
    fn load(&self, business_id: &str) -> anyhow::Result<Option<BusinessProfile>> {
        Ok(self.profiles.read().unwrap().get(business_id).cloned())
    }

    fn save(&self, business_id: &str, doc: ProfileDocument) -> anyhow::Result<BusinessProfile> {
        let profile = BusinessProfile::from_document(business_id, doc)?;
        self.profiles
            .write()
            .unwrap()
            .insert(business_id.to_string(), profile.clone());
        Ok(profile)
    }
}
