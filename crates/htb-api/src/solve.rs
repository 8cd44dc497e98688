use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use htb_core::Result;

use crate::challenge::Challenge;
use crate::client::HtbClient;
use crate::endgame::Endgame;
use crate::fields::{flag, number, optional_number, timestamp};
use crate::fortress::Fortress;
use crate::machine::Machine;

/// Completion of a piece of content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Solve {
    /// Id of the solved item
    #[serde(deserialize_with = "number")]
    pub id: u64,
    /// Name of the solved item
    pub name: String,
    #[serde(default, deserialize_with = "timestamp")]
    pub date: Option<DateTime<Utc>>,
    /// First blood
    #[serde(rename(deserialize = "first_blood"), default, deserialize_with = "flag")]
    pub blood: bool,
    #[serde(default, deserialize_with = "optional_number")]
    pub points: Option<u64>,
    #[serde(flatten)]
    pub kind: SolveKind,
}

/// What was solved, tagged by the API's `object_type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "object_type", rename_all = "lowercase")]
pub enum SolveKind {
    Machine {
        /// `user` or `root`
        #[serde(rename = "type")]
        own_type: String,
    },
    Challenge {
        #[serde(rename(deserialize = "challenge_category"))]
        category: String,
    },
    Endgame {
        #[serde(rename(deserialize = "flag_title"))]
        flag_name: String,
    },
    Fortress {
        #[serde(rename(deserialize = "flag_title"))]
        flag_name: String,
    },
}

/// The entity a [`Solve`] refers to
#[derive(Debug, Clone)]
pub enum SolvedItem {
    Machine(Machine),
    Challenge(Challenge),
    Endgame(Endgame),
    Fortress(Fortress),
}

impl Solve {
    /// Machine own recorded as a first blood
    pub(crate) fn machine_blood(
        id: u64,
        name: &str,
        date: Option<DateTime<Utc>>,
        own_type: &str,
    ) -> Self {
        Self {
            id,
            name: name.to_string(),
            date,
            blood: true,
            points: None,
            kind: SolveKind::Machine {
                own_type: own_type.to_string(),
            },
        }
    }

    /// Whether an activity record has a kind this crate understands
    pub(crate) fn is_known(record: &Value) -> bool {
        matches!(
            record.get("object_type").and_then(Value::as_str),
            Some("machine" | "challenge" | "endgame" | "fortress")
        )
    }

    /// Fetch the solved entity
    pub async fn item(&self, client: &HtbClient) -> Result<SolvedItem> {
        Ok(match self.kind {
            SolveKind::Machine { .. } => SolvedItem::Machine(client.get_machine(self.id).await?),
            SolveKind::Challenge { .. } => {
                SolvedItem::Challenge(client.get_challenge(self.id).await?)
            }
            SolveKind::Endgame { .. } => SolvedItem::Endgame(client.get_endgame(self.id).await?),
            SolveKind::Fortress { .. } => {
                SolvedItem::Fortress(client.get_fortress(self.id).await?)
            }
        })
    }
}

impl std::fmt::Display for Solve {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            SolveKind::Machine { own_type } => write!(f, "{own_type}@{}", self.name),
            SolveKind::Challenge { category } => write!(f, "{}@{category}", self.name),
            SolveKind::Endgame { flag_name } | SolveKind::Fortress { flag_name } => {
                write!(f, "{flag_name}@{}", self.name)
            }
        }
    }
}
