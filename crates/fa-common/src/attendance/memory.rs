//! DB を使わない実装。テストと `DATABASE_URL` 未設定時の起動に使う。

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::ledger::{AttendanceDay, AttendanceEvent, AttendanceState, Direction};
use crate::directory::{
    AttendanceHistory, BackendError, EnrolledIdentity, EnrolledIdentitySource, IdentityDirectory,
    IdentityProfile, IdentityRegistry, NewIdentity, Organization, OrganizationRegistry,
    RegisterOutcome,
};

#[derive(Debug, Clone)]
struct StoredIdentity {
    profile: IdentityProfile,
    phone: Option<String>,
    embedding: Option<Vec<f32>>,
}

#[derive(Debug, Default)]
struct Inner {
    identities: BTreeMap<String, StoredIdentity>,
    events: Vec<AttendanceEvent>,
    organizations: Vec<Organization>,
}

#[derive(Debug, Default)]
pub struct InMemoryAttendanceLog {
    inner: Mutex<Inner>,
    calls: AtomicUsize,
}

impl InMemoryAttendanceLog {
    /// テスト用に人物を直接登録する
    pub fn seed_identity(&self, profile: IdentityProfile, embedding: Option<Vec<f32>>) {
        let key = profile.identity_key.clone();
        self.inner.lock().identities.insert(
            key,
            StoredIdentity {
                profile,
                phone: None,
                embedding,
            },
        );
    }

    pub fn events(&self) -> Vec<AttendanceEvent> {
        self.inner.lock().events.clone()
    }

    pub fn events_for(&self, identity_key: &str) -> Vec<AttendanceEvent> {
        self.inner
            .lock()
            .events
            .iter()
            .filter(|event| event.identity_key == identity_key)
            .cloned()
            .collect()
    }

    /// trait 経由で呼ばれた回数
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn touch(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

impl EnrolledIdentitySource for InMemoryAttendanceLog {
    async fn load_enrolled_identities(&self) -> Result<Vec<EnrolledIdentity>, BackendError> {
        self.touch();
        let inner = self.inner.lock();
        Ok(inner
            .identities
            .values()
            .filter_map(|stored| {
                stored.embedding.as_ref().map(|embedding| EnrolledIdentity {
                    identity_key: stored.profile.identity_key.clone(),
                    embedding: embedding.clone(),
                    display_name: stored.profile.display_name.clone(),
                    organization: stored.profile.organization.clone(),
                })
            })
            .collect())
    }
}

impl IdentityDirectory for InMemoryAttendanceLog {
    async fn lookup_identity(
        &self,
        identity_key: &str,
    ) -> Result<Option<IdentityProfile>, BackendError> {
        self.touch();
        Ok(self
            .inner
            .lock()
            .identities
            .get(identity_key)
            .map(|stored| stored.profile.clone()))
    }
}

impl Inner {
    fn last_direction(&self, identity_key: &str, day: &AttendanceDay) -> Option<Direction> {
        self.events
            .iter()
            .filter(|event| event.identity_key == identity_key && day.contains(event.recorded_at))
            .max_by_key(|event| event.recorded_at)
            .map(|event| event.direction)
    }
}

impl AttendanceHistory for InMemoryAttendanceLog {
    async fn last_event_today(
        &self,
        identity_key: &str,
        day: &AttendanceDay,
    ) -> Result<Option<Direction>, BackendError> {
        self.touch();
        Ok(self.inner.lock().last_direction(identity_key, day))
    }

    async fn record_toggled_event(
        &self,
        identity_key: &str,
        day: &AttendanceDay,
        recorded_at: DateTime<Utc>,
    ) -> Result<AttendanceEvent, BackendError> {
        self.touch();
        // 読み取りと追加を同じ排他区間で行う
        let mut inner = self.inner.lock();
        let last = inner.last_direction(identity_key, day);
        let event = AttendanceEvent {
            identity_key: identity_key.to_string(),
            direction: AttendanceState::from_last_event(last).next_direction(),
            recorded_at,
        };
        inner.events.push(event.clone());
        Ok(event)
    }
}

impl IdentityRegistry for InMemoryAttendanceLog {
    async fn register_identity(
        &self,
        identity: &NewIdentity,
    ) -> Result<RegisterOutcome, BackendError> {
        self.touch();
        let mut inner = self.inner.lock();

        if let Some(phone) = identity.phone.as_deref() {
            let duplicate = inner
                .identities
                .values()
                .any(|stored| stored.phone.as_deref() == Some(phone));
            if duplicate {
                return Ok(RegisterOutcome::DuplicatePhone);
            }
        }

        let profile = IdentityProfile {
            identity_key: identity.identity_key.clone(),
            display_name: identity.display_name(),
            organization: identity.organization.clone(),
            is_vendor: identity.is_vendor,
        };
        inner.identities.insert(
            identity.identity_key.clone(),
            StoredIdentity {
                profile: profile.clone(),
                phone: identity.phone.clone(),
                embedding: identity.embedding.clone(),
            },
        );

        Ok(RegisterOutcome::Registered(profile))
    }
}

impl OrganizationRegistry for InMemoryAttendanceLog {
    async fn ensure_organization(&self, name: &str) -> Result<(Organization, bool), BackendError> {
        self.touch();
        let mut inner = self.inner.lock();

        if let Some(existing) = inner.organizations.iter().find(|org| org.name == name) {
            return Ok((existing.clone(), false));
        }

        let organization = Organization {
            id: inner.organizations.len() as i64 + 1,
            name: name.to_string(),
            created_at: Utc::now(),
        };
        inner.organizations.push(organization.clone());
        Ok((organization, true))
    }

    async fn list_organizations(&self) -> Result<Vec<Organization>, BackendError> {
        self.touch();
        let mut organizations = self.inner.lock().organizations.clone();
        organizations.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(organizations)
    }
}
