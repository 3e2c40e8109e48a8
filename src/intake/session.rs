//! Intake session state and the session store seam
//!
//! Sessions are owned exclusively by the state machine and keyed by the
//! stable transport user id. The store is an explicit get/put/delete
//! interface so production deployments can swap the in-process map for
//! an external key-value store without touching the flow logic.

use crate::models::{Gender, PolicyType, Profile, DEFAULT_ANNUAL_INCOME, DEFAULT_DEBT, DEFAULT_DEPENDENT_COST};
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// The ordered intake steps. Step numbers are stable because sessions
/// may round-trip through external storage as plain integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntakeStep {
    Idle,
    AwaitType,
    AwaitBudget,
    AwaitAge,
    AwaitGender,
    AwaitOccupation,
    AwaitReference,
}

impl IntakeStep {
    pub fn as_step(&self) -> u8 {
        match self {
            IntakeStep::Idle => 0,
            IntakeStep::AwaitType => 1,
            IntakeStep::AwaitBudget => 2,
            IntakeStep::AwaitAge => 3,
            IntakeStep::AwaitGender => 4,
            IntakeStep::AwaitOccupation => 5,
            IntakeStep::AwaitReference => 6,
        }
    }

    /// `None` for out-of-range values — the flow-corruption case.
    pub fn from_step(step: u8) -> Option<Self> {
        match step {
            0 => Some(IntakeStep::Idle),
            1 => Some(IntakeStep::AwaitType),
            2 => Some(IntakeStep::AwaitBudget),
            3 => Some(IntakeStep::AwaitAge),
            4 => Some(IntakeStep::AwaitGender),
            5 => Some(IntakeStep::AwaitOccupation),
            6 => Some(IntakeStep::AwaitReference),
            _ => None,
        }
    }
}

/// One user's in-progress intake. Mutated exactly once per valid
/// inbound message; a rejection leaves it untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub step: u8,
    pub policy_type: Option<PolicyType>,
    pub monthly_budget: Option<u32>,
    pub age: Option<u32>,
    pub gender: Option<Gender>,
    pub occupation_class: Option<u8>,
}

impl Session {
    /// Fresh session at the first intake step, discarding any prior
    /// in-progress profile.
    pub fn start() -> Self {
        Self {
            step: IntakeStep::AwaitType.as_step(),
            policy_type: None,
            monthly_budget: None,
            age: None,
            gender: None,
            occupation_class: None,
        }
    }

    pub fn advance_to(&mut self, step: IntakeStep) {
        self.step = step.as_step();
    }

    /// Build the completed profile. `None` while any field is missing;
    /// partial profiles never leave the session.
    pub fn finalize(&self, product_reference: &str) -> Option<Profile> {
        Some(Profile {
            policy_type: self.policy_type?,
            monthly_budget: self.monthly_budget?,
            age: self.age?,
            gender: self.gender?,
            occupation_class: self.occupation_class?,
            product_reference: product_reference.to_string(),
            annual_income: DEFAULT_ANNUAL_INCOME,
            debt: DEFAULT_DEBT,
            dependent_cost: DEFAULT_DEPENDENT_COST,
        })
    }
}

/// Trait for session persistence
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, user_id: &str) -> Result<Option<Session>>;
    async fn put(&self, user_id: &str, session: Session) -> Result<()>;
    async fn delete(&self, user_id: &str) -> Result<()>;
}

/// In-memory session store for development
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, user_id: &str) -> Result<Option<Session>> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(user_id).cloned())
    }

    async fn put(&self, user_id: &str, session: Session) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(user_id.to_string(), session);
        Ok(())
    }

    async fn delete(&self, user_id: &str) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        sessions.remove(user_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_numbers_round_trip() {
        for step in [
            IntakeStep::Idle,
            IntakeStep::AwaitType,
            IntakeStep::AwaitBudget,
            IntakeStep::AwaitAge,
            IntakeStep::AwaitGender,
            IntakeStep::AwaitOccupation,
            IntakeStep::AwaitReference,
        ] {
            assert_eq!(IntakeStep::from_step(step.as_step()), Some(step));
        }
        assert_eq!(IntakeStep::from_step(7), None);
        assert_eq!(IntakeStep::from_step(255), None);
    }

    #[test]
    fn finalize_requires_every_field() {
        let mut session = Session::start();
        assert!(session.finalize("http://example.test").is_none());

        session.policy_type = Some(PolicyType::Protection);
        session.monthly_budget = Some(3000);
        session.age = Some(30);
        session.gender = Some(Gender::Male);
        assert!(session.finalize("http://example.test").is_none());

        session.occupation_class = Some(2);
        let profile = session.finalize("http://example.test").unwrap();
        assert_eq!(profile.annual_income, DEFAULT_ANNUAL_INCOME);
        assert_eq!(profile.product_reference, "http://example.test");
    }

    #[tokio::test]
    async fn store_isolates_users() {
        let store = InMemorySessionStore::new();

        store.put("user-a", Session::start()).await.unwrap();

        assert!(store.get("user-a").await.unwrap().is_some());
        assert!(store.get("user-b").await.unwrap().is_none());

        store.delete("user-a").await.unwrap();
        assert!(store.get("user-a").await.unwrap().is_none());
    }
}
