use htb_core::Result;

use crate::challenge::{Challenge, ChallengeKind};
use crate::client::{HtbClient, SessionRef};
use crate::entity::IdBatch;
use crate::fields;
use crate::machine::{Machine, MachineKind};
use crate::search::ids_of;

/// Machines and challenges authored by a user
///
/// Resolved lazily like [`crate::Search`]; deleted items are dropped.
#[derive(Debug)]
pub struct Content {
    user_id: u64,
    machines: IdBatch<MachineKind>,
    challenges: IdBatch<ChallengeKind>,
    session: SessionRef,
}

impl Content {
    pub(crate) async fn fetch(client: &HtbClient, user_id: u64) -> Result<Self> {
        let body = client
            .get_json(&format!("user/profile/content/{user_id}"))
            .await?;
        let content = fields::take_pointer(body, "/profile/content")?;

        Ok(Self {
            user_id,
            machines: ids_of(&content, "machines")?,
            challenges: ids_of(&content, "challenges")?,
            session: client.session_ref(),
        })
    }

    pub fn user_id(&self) -> u64 {
        self.user_id
    }

    pub async fn machines(&self) -> Result<&[Machine]> {
        self.machines.resolve(&self.session).await
    }

    pub async fn challenges(&self) -> Result<&[Challenge]> {
        self.challenges.resolve(&self.session).await
    }

    pub fn len(&self) -> usize {
        self.machines.ids().len() + self.challenges.ids().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
