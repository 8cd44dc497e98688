use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use htb_core::Result;

use crate::content::Content;
use crate::entity::{EntityKind, LazyEntity, Lookup, Parsed};
use crate::fields::{self, flag, number, number_or_default, optional_number, or_default};
use crate::solve::Solve;

/// A Hack The Box user
pub type User = LazyEntity<UserKind>;

#[derive(Debug, Clone, Copy)]
pub enum UserKind {}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserInfo {
    pub name: String,
    pub avatar: Option<String>,
    /// Position in the Hall of Fame
    pub ranking: u64,
    pub points: u64,
    pub user_owns: u64,
    pub root_owns: u64,
    pub user_bloods: u64,
    pub root_bloods: u64,
    pub rank_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserDetail {
    #[serde(default, deserialize_with = "number")]
    pub respects: u64,
    #[serde(default)]
    pub university: Value,
    #[serde(default)]
    pub university_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub github: Option<String>,
    #[serde(default)]
    pub linkedin: Option<String>,
    #[serde(default)]
    pub twitter: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(rename(deserialize = "isRespected"), default, deserialize_with = "flag")]
    pub respected: bool,
    #[serde(rename(deserialize = "isFollowed"), default, deserialize_with = "flag")]
    pub followed: bool,
    #[serde(rename(deserialize = "current_rank_progress"), default, deserialize_with = "optional_number")]
    pub rank_progress: Option<f64>,
    #[serde(default)]
    pub next_rank: Option<String>,
    #[serde(default, deserialize_with = "optional_number")]
    pub next_rank_points: Option<f64>,
    #[serde(default, deserialize_with = "number")]
    pub rank_ownership: f64,
    #[serde(default, deserialize_with = "optional_number")]
    pub rank_requirement: Option<u64>,
    #[serde(default)]
    pub country_name: Option<String>,
    #[serde(default)]
    pub team: Value,
    #[serde(default, deserialize_with = "flag")]
    pub public: bool,
}

impl UserDetail {
    /// Id of the user's team, if they are in one
    pub fn team_id(&self) -> Option<u64> {
        self.team.get("id").and_then(Value::as_u64)
    }
}

/// `user/profile/basic` record
#[derive(Deserialize)]
struct ProfileRecord {
    name: String,
    #[serde(default)]
    avatar: Option<String>,
    #[serde(default, deserialize_with = "number")]
    ranking: u64,
    #[serde(default, deserialize_with = "number")]
    points: u64,
    #[serde(default, deserialize_with = "number")]
    user_owns: u64,
    #[serde(default, deserialize_with = "number")]
    system_owns: u64,
    #[serde(default, deserialize_with = "number")]
    user_bloods: u64,
    #[serde(default, deserialize_with = "number")]
    system_bloods: u64,
    #[serde(default, deserialize_with = "or_default")]
    rank: String,
}

/// Hall of Fame / search record
#[derive(Deserialize)]
struct RankingRecord {
    name: String,
    #[serde(default)]
    avatar: Option<String>,
    #[serde(default, deserialize_with = "number")]
    rank: u64,
    #[serde(default, deserialize_with = "number")]
    points: u64,
    #[serde(default, deserialize_with = "number")]
    user_owns: u64,
    #[serde(default, deserialize_with = "number")]
    root_owns: u64,
    #[serde(rename = "user_bloods_count", default, deserialize_with = "number_or_default")]
    user_bloods: u64,
    #[serde(rename = "root_bloods_count", default, deserialize_with = "number_or_default")]
    root_bloods: u64,
    #[serde(rename = "rank_text", default, deserialize_with = "or_default")]
    rank_name: String,
}

impl EntityKind for UserKind {
    const NAME: &'static str = "User";
    const DETAILED_FIELDS: &'static [&'static str] = &[
        "respects",
        "university",
        "university_name",
        "description",
        "github",
        "linkedin",
        "twitter",
        "website",
        "respected",
        "followed",
        "rank_progress",
        "next_rank",
        "next_rank_points",
        "rank_ownership",
        "rank_requirement",
        "country_name",
        "team",
        "public",
    ];
    type Common = UserInfo;
    type Detail = UserDetail;

    fn endpoint(lookup: &Lookup) -> String {
        format!("user/profile/basic/{lookup}")
    }

    fn unwrap_response(body: Value) -> Result<Value> {
        fields::take(body, "profile")
    }

    fn parse(record: Value, summary: bool) -> Result<Parsed<Self>> {
        let id = fields::record_id(&record)?;

        // Summaries and profiles name the same counters differently
        if summary {
            let r = RankingRecord::deserialize(&record)?;
            return Ok(Parsed {
                id,
                common: UserInfo {
                    name: r.name,
                    avatar: r.avatar,
                    ranking: r.rank,
                    points: r.points,
                    user_owns: r.user_owns,
                    root_owns: r.root_owns,
                    user_bloods: r.user_bloods,
                    root_bloods: r.root_bloods,
                    rank_name: r.rank_name,
                },
                detail: None,
            });
        }

        let r = ProfileRecord::deserialize(&record)?;
        Ok(Parsed {
            id,
            common: UserInfo {
                name: r.name,
                avatar: r.avatar,
                ranking: r.ranking,
                points: r.points,
                user_owns: r.user_owns,
                root_owns: r.system_owns,
                user_bloods: r.user_bloods,
                root_bloods: r.system_bloods,
                rank_name: r.rank,
            },
            detail: Some(UserDetail::deserialize(&record)?),
        })
    }
}

impl User {
    /// Recent solves, newest first as the API orders them
    ///
    /// Activity of kinds other than machines, challenges, endgames and
    /// fortresses is skipped.
    pub async fn activity(&self) -> Result<Vec<Solve>> {
        let client = self.session().upgrade()?;
        let body = client
            .get_json(&format!("user/profile/activity/{}", self.id()))
            .await?;
        let items = fields::into_list(fields::take_pointer(body, "/profile/activity")?)?;

        let mut solves = Vec::with_capacity(items.len());
        for item in items {
            if !Solve::is_known(&item) {
                debug!("Skipping activity item of unknown type");
                continue;
            }
            solves.push(Solve::deserialize(&item)?);
        }
        Ok(solves)
    }

    /// Machines and challenges this user authored
    pub async fn content(&self) -> Result<Content> {
        let client = self.session().upgrade()?;
        Content::fetch(&client, self.id()).await
    }
}
