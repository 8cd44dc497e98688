use serde_json::Value;
use tracing::debug;
use url::form_urlencoded;

use htb_core::Result;

use crate::challenge::{Challenge, ChallengeKind};
use crate::client::{HtbClient, SessionRef};
use crate::entity::{EntityKind, IdBatch};
use crate::fields;
use crate::machine::{Machine, MachineKind};
use crate::team::{Team, TeamKind};
use crate::user::{User, UserKind};

/// Results of a platform search
///
/// Only ids are returned by the search itself; each category is fetched on
/// first access. Results that no longer exist are dropped.
#[derive(Debug)]
pub struct Search {
    term: String,
    users: IdBatch<UserKind>,
    machines: IdBatch<MachineKind>,
    teams: IdBatch<TeamKind>,
    challenges: IdBatch<ChallengeKind>,
    session: SessionRef,
}

impl Search {
    pub(crate) async fn run(client: &HtbClient, term: &str) -> Result<Self> {
        let query: String = form_urlencoded::byte_serialize(term.as_bytes()).collect();
        let body = client.get_json(&format!("search/fetch?query={query}")).await?;
        debug!("Search for '{}' returned", term);

        Ok(Self {
            term: term.to_string(),
            users: ids_of::<UserKind>(&body, "users")?,
            machines: ids_of::<MachineKind>(&body, "machines")?,
            teams: ids_of::<TeamKind>(&body, "teams")?,
            challenges: ids_of::<ChallengeKind>(&body, "challenges")?,
            session: client.session_ref(),
        })
    }

    pub fn term(&self) -> &str {
        &self.term
    }

    pub async fn users(&self) -> Result<&[User]> {
        self.users.resolve(&self.session).await
    }

    pub async fn machines(&self) -> Result<&[Machine]> {
        self.machines.resolve(&self.session).await
    }

    pub async fn teams(&self) -> Result<&[Team]> {
        self.teams.resolve(&self.session).await
    }

    pub async fn challenges(&self) -> Result<&[Challenge]> {
        self.challenges.resolve(&self.session).await
    }

    /// Number of ids returned, before any are resolved
    pub fn len(&self) -> usize {
        self.users.ids().len()
            + self.machines.ids().len()
            + self.teams.ids().len()
            + self.challenges.ids().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Display for Search {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Search '{}': {} results", self.term, self.len())
    }
}

/// Ids listed under `key`, which may be missing
pub(crate) fn ids_of<K: EntityKind>(body: &Value, key: &str) -> Result<IdBatch<K>> {
    let ids = match body.get(key) {
        Some(Value::Array(items)) => items.iter().map(fields::record_id).collect::<Result<_>>()?,
        _ => Vec::new(),
    };
    Ok(IdBatch::new(ids))
}
