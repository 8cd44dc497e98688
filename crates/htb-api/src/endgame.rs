use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::instrument;

use htb_core::{HtbError, Result};

use crate::entity::{EntityKind, LazyEntity, Lookup, Parsed};
use crate::fields::{self, IdRef, flag, number, or_default};
use crate::user::User;

/// A Hack The Box endgame
pub type Endgame = LazyEntity<EndgameKind>;

#[derive(Debug, Clone, Copy)]
pub enum EndgameKind {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndgameInfo {
    pub name: String,
    #[serde(rename(deserialize = "avatar_url"), default, deserialize_with = "or_default")]
    pub avatar: String,
    #[serde(rename(deserialize = "cover_image_url"), default, deserialize_with = "or_default")]
    pub cover_image: String,
    #[serde(default, deserialize_with = "flag")]
    pub retired: bool,
    #[serde(default, deserialize_with = "flag")]
    pub vip: bool,
    #[serde(skip_deserializing)]
    pub author_ids: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndgameDetail {
    #[serde(deserialize_with = "number")]
    pub points: u64,
    #[serde(rename(deserialize = "players_completed"), default, deserialize_with = "number")]
    pub completions: u64,
    #[serde(rename(deserialize = "endgame_reset_votes"), default, deserialize_with = "number")]
    pub reset_votes: u64,
    /// Addresses the endgame is reachable on
    #[serde(default, deserialize_with = "or_default")]
    pub entry_points: Vec<String>,
    /// HTML
    #[serde(default, deserialize_with = "or_default")]
    pub description: String,
}

#[derive(Deserialize)]
struct Creators {
    #[serde(default, deserialize_with = "or_default")]
    creators: Vec<IdRef>,
}

impl EntityKind for EndgameKind {
    const NAME: &'static str = "Endgame";
    const DETAILED_FIELDS: &'static [&'static str] = &[
        "points",
        "completions",
        "reset_votes",
        "entry_points",
        "description",
    ];
    type Common = EndgameInfo;
    type Detail = EndgameDetail;

    fn endpoint(lookup: &Lookup) -> String {
        format!("endgame/{lookup}")
    }

    fn unwrap_response(body: Value) -> Result<Value> {
        fields::take(body, "data")
    }

    fn parse(record: Value, summary: bool) -> Result<Parsed<Self>> {
        let id = fields::record_id(&record)?;
        let mut common = EndgameInfo::deserialize(&record)?;
        common.author_ids = Creators::deserialize(&record)?
            .creators
            .into_iter()
            .map(|creator| creator.id)
            .collect();

        let detail = if summary {
            None
        } else {
            Some(EndgameDetail::deserialize(&record)?)
        };
        Ok(Parsed { id, common, detail })
    }
}

impl Endgame {
    /// Submit a flag; returns the API's message
    #[instrument(skip(self, flag), fields(endgame = %self.name))]
    pub async fn submit(&self, flag: &str) -> Result<String> {
        let client = self.session().upgrade()?;
        let body = client
            .post_json(&format!("endgame/{}/flag", self.id()), json!({"flag": flag}))
            .await?;
        submission_result(&body)
    }

    /// Fetch the endgame's creators
    pub async fn authors(&self) -> Result<Vec<User>> {
        let client = self.session().upgrade()?;
        let mut authors = Vec::with_capacity(self.author_ids.len());
        for &id in &self.author_ids {
            authors.push(client.get_user(id).await?);
        }
        Ok(authors)
    }
}

/// Endgame and fortress flag responses share one rejection message
pub(crate) fn submission_result(body: &Value) -> Result<String> {
    match fields::message(body) {
        "Wrong flag" => Err(HtbError::IncorrectFlag),
        message => Ok(message.to_string()),
    }
}
