//! In-memory identity provider and profile store for tests

use super::{normalize_email, ActiveSession, IdentityProvider, IssuedSession, Registration};
use crate::bootstrap::ProfileStore;
use crate::db::models::Profile;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

/// Build a profile row
pub fn profile(user_id: Uuid, role: Option<&str>) -> Profile {
    Profile {
        id: user_id,
        role: role.map(String::from),
        name: None,
        created_at: Utc::now().fixed_offset(),
    }
}

fn unavailable() -> AppError {
    AppError::DatabaseConnection {
        message: "store unavailable".to_string(),
    }
}

#[derive(Default)]
pub struct FakeIdentity {
    sessions: Mutex<HashMap<String, Uuid>>,
    /// email -> (password, user id)
    accounts: Mutex<HashMap<String, (String, Uuid)>>,
    signed_out: Mutex<Vec<String>>,
    fail_lookup: bool,
    fail_sign_out: bool,
}

impl FakeIdentity {
    pub fn with_session(self, token: &str, user_id: Uuid) -> Self {
        self.sessions
            .lock()
            .unwrap()
            .insert(token.to_string(), user_id);
        self
    }

    pub fn with_account(self, email: &str, password: &str, user_id: Uuid) -> Self {
        self.accounts
            .lock()
            .unwrap()
            .insert(normalize_email(email), (password.to_string(), user_id));
        self
    }

    /// User id registered under `email`
    pub fn account(&self, email: &str) -> Option<Uuid> {
        self.accounts
            .lock()
            .unwrap()
            .get(&normalize_email(email))
            .map(|(_, user_id)| *user_id)
    }

    pub fn failing(mut self) -> Self {
        self.fail_lookup = true;
        self
    }

    pub fn failing_sign_out(mut self) -> Self {
        self.fail_sign_out = true;
        self
    }

    /// Tokens passed to `sign_out`, in order
    pub fn signed_out(&self) -> Vec<String> {
        self.signed_out.lock().unwrap().clone()
    }

    pub fn is_live(&self, token: &str) -> bool {
        self.sessions.lock().unwrap().contains_key(token)
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentity {
    async fn get_session(&self, token: &str) -> Result<Option<ActiveSession>> {
        if self.fail_lookup {
            return Err(unavailable());
        }

        Ok(self.sessions.lock().unwrap().get(token).map(|user_id| ActiveSession {
            session_id: Uuid::new_v4(),
            user_id: *user_id,
            expires_at: Utc::now() + Duration::hours(1),
        }))
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<IssuedSession> {
        let user_id = match self.accounts.lock().unwrap().get(&normalize_email(email)) {
            Some((stored, user_id)) if stored == password => *user_id,
            _ => return Err(AppError::InvalidCredentials),
        };

        let token = format!("token-{}", Uuid::new_v4());
        self.sessions.lock().unwrap().insert(token.clone(), user_id);

        Ok(IssuedSession {
            token,
            session: ActiveSession {
                session_id: Uuid::new_v4(),
                user_id,
                expires_at: Utc::now() + Duration::hours(1),
            },
        })
    }

    async fn sign_up(&self, registration: Registration) -> Result<Uuid> {
        let email = normalize_email(&registration.email);
        let mut accounts = self.accounts.lock().unwrap();
        if accounts.contains_key(&email) {
            return Err(AppError::DuplicateEmail { email });
        }

        let user_id = Uuid::new_v4();
        accounts.insert(email, (registration.password, user_id));
        Ok(user_id)
    }

    async fn sign_out(&self, token: &str) -> Result<()> {
        self.signed_out.lock().unwrap().push(token.to_string());
        if self.fail_sign_out {
            return Err(unavailable());
        }
        self.sessions.lock().unwrap().remove(token);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeProfiles {
    rows: HashMap<Uuid, Profile>,
    fail: bool,
    lookups: AtomicUsize,
}

impl FakeProfiles {
    pub fn with(mut self, profile: Profile) -> Self {
        self.rows.insert(profile.id, profile);
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProfileStore for FakeProfiles {
    async fn find_profile(&self, user_id: Uuid) -> Result<Option<Profile>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(unavailable());
        }
        Ok(self.rows.get(&user_id).cloned())
    }
}
