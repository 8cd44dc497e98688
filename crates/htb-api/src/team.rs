use serde::{Deserialize, Serialize};
use serde_json::Value;

use htb_core::Result;

use crate::entity::{EntityKind, LazyEntity, Lookup, Parsed};
use crate::fields::{self, IdRef, flag, number, or_default};
use crate::user::User;

/// A Hack The Box team
pub type Team = LazyEntity<TeamKind>;

#[derive(Debug, Clone, Copy)]
pub enum TeamKind {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamInfo {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamDetail {
    #[serde(default, deserialize_with = "number")]
    pub points: u64,
    #[serde(default, deserialize_with = "or_default")]
    pub motto: String,
    #[serde(default, deserialize_with = "or_default")]
    pub description: String,
    #[serde(default)]
    pub country_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub cover_image_url: Option<String>,
    #[serde(default)]
    pub twitter: Option<String>,
    #[serde(default)]
    pub facebook: Option<String>,
    #[serde(default)]
    pub discord: Option<String>,
    #[serde(default, deserialize_with = "flag")]
    pub public: bool,
    #[serde(default, deserialize_with = "flag")]
    pub can_delete_avatar: bool,
    #[serde(rename(deserialize = "captain"), deserialize_with = "captain_id")]
    pub captain_id: u64,
    /// Only meaningful for an authenticated user
    #[serde(default, deserialize_with = "flag")]
    pub is_respected: bool,
    #[serde(default, deserialize_with = "flag")]
    pub join_request_sent: bool,
}

fn captain_id<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    IdRef::deserialize(deserializer).map(|captain| captain.id)
}

impl EntityKind for TeamKind {
    const NAME: &'static str = "Team";
    const DETAILED_FIELDS: &'static [&'static str] = &[
        "points",
        "motto",
        "description",
        "country_name",
        "avatar_url",
        "cover_image_url",
        "twitter",
        "facebook",
        "discord",
        "public",
        "can_delete_avatar",
        "captain_id",
        "is_respected",
        "join_request_sent",
    ];
    type Common = TeamInfo;
    type Detail = TeamDetail;

    fn endpoint(lookup: &Lookup) -> String {
        format!("team/info/{lookup}")
    }

    fn unwrap_response(body: Value) -> Result<Value> {
        Ok(body)
    }

    fn parse(record: Value, summary: bool) -> Result<Parsed<Self>> {
        let id = fields::record_id(&record)?;
        let common = TeamInfo::deserialize(&record)?;
        let detail = if summary {
            None
        } else {
            Some(TeamDetail::deserialize(&record)?)
        };
        Ok(Parsed { id, common, detail })
    }
}

#[derive(Deserialize)]
struct TeamStats {
    #[serde(deserialize_with = "number")]
    rank: u64,
}

impl Team {
    /// The team's captain
    pub async fn captain(&self) -> Result<User> {
        let captain_id = self.detail().await?.captain_id;
        self.session().upgrade()?.get_user(captain_id).await
    }

    /// Global ranking of the team
    pub async fn ranking(&self) -> Result<u64> {
        let client = self.session().upgrade()?;
        let body = client
            .get_json(&format!("team/stats/owns/{}", self.id()))
            .await?;
        Ok(TeamStats::deserialize(&body)?.rank)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::SessionRef;
    use serde_json::json;

    fn record() -> Value {
        json!({
            "id": 2102,
            "name": "WinBoxes",
            "points": 1500,
            "motto": "",
            "description": null,
            "country_name": "Greece",
            "avatar_url": null,
            "cover_image_url": null,
            "twitter": null,
            "facebook": "winboxes-fb",
            "discord": "https://discord.gg/winboxes",
            "public": 1,
            "can_delete_avatar": false,
            "captain": {"id": 1190, "name": "malwarelab"},
            "is_respected": false,
            "join_request_sent": false,
        })
    }

    #[test]
    fn discord_is_read_from_its_own_field() {
        let team = Team::from_record(record(), false, SessionRef::detached()).unwrap();
        let detail = team.loaded_detail().unwrap();
        assert_eq!(detail.discord.as_deref(), Some("https://discord.gg/winboxes"));
        assert_eq!(detail.facebook.as_deref(), Some("winboxes-fb"));
        assert_eq!(detail.captain_id, 1190);
        assert_eq!(detail.description, "");
        assert!(detail.public);
    }

    #[test]
    fn ranking_summaries_only_carry_name() {
        let team = Team::from_record(
            json!({"id": 2102, "name": "WinBoxes", "rank": 3, "points": 1500}),
            true,
            SessionRef::detached(),
        )
        .unwrap();
        assert!(team.is_summary());
        assert_eq!(team.name, "WinBoxes");
    }

    #[test]
    fn detailed_fields_match_detail() {
        let team = Team::from_record(record(), false, SessionRef::detached()).unwrap();
        crate::testing::assert_declared_detail(&team);
    }
}
