use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::OnceCell;
use tracing::{info, instrument};

use htb_core::{ApiRequest, HtbError, Result};

use crate::delta::parse_delta;
use crate::entity::{EntityKind, LazyEntity, Lookup, Parsed};
use crate::fields::{self, IdRef, flag, number, or_default, seconds, timestamp};
use crate::solve::Solve;
use crate::user::User;
use crate::vpn::VpnServer;

/// A Hack The Box machine
pub type Machine = LazyEntity<MachineKind>;

#[derive(Debug, Clone, Copy)]
pub enum MachineKind {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineInfo {
    pub name: String,
    #[serde(default, deserialize_with = "or_default")]
    pub os: String,
    #[serde(default, deserialize_with = "number")]
    pub points: u64,
    #[serde(rename(deserialize = "release"), default, deserialize_with = "timestamp")]
    pub release_date: Option<DateTime<Utc>>,
    #[serde(rename(deserialize = "user_owns_count"), default, deserialize_with = "number")]
    pub user_owns: u64,
    #[serde(rename(deserialize = "root_owns_count"), default, deserialize_with = "number")]
    pub root_owns: u64,
    /// The authenticated user owns user
    #[serde(rename(deserialize = "authUserInUserOwns"), default, deserialize_with = "flag")]
    pub user_owned: bool,
    /// The authenticated user owns root
    #[serde(rename(deserialize = "authUserInRootOwns"), default, deserialize_with = "flag")]
    pub root_owned: bool,
    #[serde(rename(deserialize = "authUserHasReviewed"), default, deserialize_with = "flag")]
    pub reviewed: bool,
    #[serde(default, deserialize_with = "number")]
    pub stars: f64,
    #[serde(default, deserialize_with = "or_default")]
    pub avatar: String,
    #[serde(rename(deserialize = "difficultyText"), default, deserialize_with = "or_default")]
    pub difficulty: String,
    #[serde(default, deserialize_with = "flag")]
    pub free: bool,
    #[serde(default, deserialize_with = "flag")]
    pub retired: bool,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(skip_deserializing)]
    pub author_ids: Vec<u64>,
    /// Address looked up through the machine list
    #[serde(skip)]
    resolved_ip: OnceCell<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MachineDetail {
    pub active: bool,
    /// Time the authenticated user took to own user
    #[serde(serialize_with = "seconds")]
    pub user_own_time: Option<Duration>,
    #[serde(serialize_with = "seconds")]
    pub root_own_time: Option<Duration>,
    pub user_blood: Option<Solve>,
    pub root_blood: Option<Solve>,
    /// Time the first blood took after release
    #[serde(serialize_with = "seconds")]
    pub user_blood_time: Option<Duration>,
    #[serde(serialize_with = "seconds")]
    pub root_blood_time: Option<Duration>,
    pub difficulty_ratings: Value,
}

#[derive(Deserialize)]
struct Makers {
    #[serde(default)]
    maker: Option<IdRef>,
    #[serde(default)]
    maker2: Option<IdRef>,
}

#[derive(Deserialize)]
struct DetailRecord {
    #[serde(default, deserialize_with = "flag")]
    active: bool,
    #[serde(rename = "authUserFirstUserTime", default)]
    user_own_time: Option<String>,
    #[serde(rename = "authUserFirstRootTime", default)]
    root_own_time: Option<String>,
    #[serde(rename = "userBlood", default)]
    user_blood: Option<BloodRecord>,
    #[serde(rename = "rootBlood", default)]
    root_blood: Option<BloodRecord>,
    #[serde(rename = "feedbackForChart", default)]
    difficulty_ratings: Value,
}

#[derive(Deserialize)]
struct BloodRecord {
    #[serde(default, deserialize_with = "timestamp")]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    blood_difference: Option<String>,
}

fn optional_delta(text: Option<String>) -> Result<Option<Duration>> {
    text.filter(|t| !t.trim().is_empty())
        .map(|t| parse_delta(&t))
        .transpose()
}

impl EntityKind for MachineKind {
    const NAME: &'static str = "Machine";
    const DETAILED_FIELDS: &'static [&'static str] = &[
        "active",
        "user_own_time",
        "root_own_time",
        "user_blood",
        "root_blood",
        "user_blood_time",
        "root_blood_time",
        "difficulty_ratings",
    ];
    type Common = MachineInfo;
    type Detail = MachineDetail;

    fn endpoint(lookup: &Lookup) -> String {
        format!("machine/profile/{lookup}")
    }

    fn unwrap_response(body: Value) -> Result<Value> {
        fields::take(body, "info")
    }

    fn parse(record: Value, summary: bool) -> Result<Parsed<Self>> {
        let id = fields::record_id(&record)?;
        let mut common = MachineInfo::deserialize(&record)?;
        let makers = Makers::deserialize(&record)?;
        common.author_ids = makers
            .maker
            .into_iter()
            .chain(makers.maker2)
            .map(|maker| maker.id)
            .collect();

        if summary {
            return Ok(Parsed {
                id,
                common,
                detail: None,
            });
        }

        let raw = DetailRecord::deserialize(&record)?;
        let blood = |blood: Option<BloodRecord>, own_type: &str| -> Result<(Option<Solve>, Option<Duration>)> {
            match blood {
                Some(b) => Ok((
                    Some(Solve::machine_blood(id, &common.name, b.created_at, own_type)),
                    optional_delta(b.blood_difference)?,
                )),
                None => Ok((None, None)),
            }
        };
        let (user_blood, user_blood_time) = blood(raw.user_blood, "user")?;
        let (root_blood, root_blood_time) = blood(raw.root_blood, "root")?;

        let detail = MachineDetail {
            active: raw.active,
            user_own_time: if common.user_owned {
                optional_delta(raw.user_own_time)?
            } else {
                None
            },
            root_own_time: if common.root_owned {
                optional_delta(raw.root_own_time)?
            } else {
                None
            },
            user_blood,
            root_blood,
            user_blood_time,
            root_blood_time,
            difficulty_ratings: raw.difficulty_ratings,
        };

        Ok(Parsed {
            id,
            common,
            detail: Some(detail),
        })
    }
}

/// Flag ratings are 10..=100 in steps of 10
pub(crate) fn check_difficulty(difficulty: u32) -> Result<()> {
    if (10..=100).contains(&difficulty) && difficulty % 10 == 0 {
        Ok(())
    } else {
        Err(HtbError::IncorrectArgument(
            "Difficulty must be a multiple of 10, between 10 and 100".to_string(),
        ))
    }
}

impl Machine {
    /// Submit a user or root flag, rating the machine's difficulty
    ///
    /// Returns the API's confirmation message.
    #[instrument(skip(self, flag), fields(machine = %self.name))]
    pub async fn submit(&self, flag: &str, difficulty: u32) -> Result<String> {
        check_difficulty(difficulty)?;
        let client = self.session().upgrade()?;
        let body = client
            .post_json(
                "machine/own",
                json!({"flag": flag, "id": self.id(), "difficulty": difficulty}),
            )
            .await?;

        let message = fields::message(&body);
        if body.get("status").and_then(Value::as_u64) == Some(400) {
            return Err(if message == "Incorrect flag!" {
                HtbError::IncorrectFlag
            } else if message == format!("{} user is already owned.", self.name) {
                HtbError::UserAlreadySubmitted
            } else if message == format!("{} root is already owned.", self.name) {
                HtbError::RootAlreadySubmitted
            } else {
                HtbError::Solve(message.to_string())
            });
        }
        Ok(message.to_string())
    }

    /// Fetch the machine's creators
    pub async fn authors(&self) -> Result<Vec<User>> {
        let client = self.session().upgrade()?;
        let mut authors = Vec::with_capacity(self.author_ids.len());
        for &id in &self.author_ids {
            authors.push(client.get_user(id).await?);
        }
        Ok(authors)
    }

    /// Address of the machine while it is active
    pub async fn ip(&self) -> Result<String> {
        if let Some(ip) = &self.ip {
            return Ok(ip.clone());
        }

        self.resolved_ip
            .get_or_try_init(|| async {
                let client = self.session().upgrade()?;
                let listing =
                    fields::into_list(fields::take(client.get_json("machine/list").await?, "info")?)?;
                listing
                    .iter()
                    .find(|m| fields::record_id(m).ok() == Some(self.id()))
                    .and_then(|m| m.get("ip").and_then(Value::as_str))
                    .map(str::to_string)
                    .ok_or_else(|| HtbError::Machine(format!("{} has no assigned IP", self.name)))
            })
            .await
            .cloned()
    }

    /// Whether this machine is the one currently in the Release Arena
    pub async fn is_release(&self) -> Result<bool> {
        let client = self.session().upgrade()?;
        let body = client.get_json("connections").await?;
        Ok(body
            .pointer("/data/release_arena/machine/id")
            .and_then(Value::as_u64)
            == Some(self.id()))
    }

    /// Spawn an instance of this machine
    #[instrument(skip(self), fields(machine = %self.name))]
    pub async fn spawn(&self, release_arena: bool) -> Result<MachineInstance> {
        let client = self.session().upgrade()?;

        let (ip, server) = if release_arena {
            if !self.is_release().await? {
                return Err(HtbError::Machine(format!(
                    "{} is not on the Release Arena",
                    self.name
                )));
            }
            let data = client
                .request(&ApiRequest::post("release_arena/spawn"))
                .await?
                .into_json()?;
            if !fields::truthy(data.get("success")) {
                return Err(HtbError::Machine(format!("Failed to spawn: {data}")));
            }
            let active = client.get_json("release_arena/active").await?;
            let ip = fields::take_pointer(active, "/info/ip")?;
            (ip, client.get_current_vpn_server(true).await?)
        } else {
            let data = client
                .post_json("vm/spawn", json!({"machine_id": self.id()}))
                .await?;
            let message = fields::message(&data);
            if !message.contains("Machine deployed") && !message.contains("You have been assigned") {
                return Err(HtbError::Machine(format!("Failed to spawn: {data}")));
            }
            let profile = client
                .get_json(&MachineKind::endpoint(&Lookup::Id(self.id())))
                .await?;
            let ip = fields::take_pointer(profile, "/info/ip")?;
            (ip, client.get_current_vpn_server(false).await?)
        };

        let ip = ip
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| HtbError::Machine(format!("{} was spawned without an IP", self.name)))?;
        info!("Spawned {} at {} on {}", self.name, ip, server.friendly_name);

        Ok(MachineInstance {
            ip,
            server,
            machine: self.clone(),
            release_arena,
        })
    }
}

/// A running instance of a machine
#[derive(Debug, Clone)]
pub struct MachineInstance {
    pub ip: String,
    pub server: VpnServer,
    pub machine: Machine,
    release_arena: bool,
}

impl MachineInstance {
    pub(crate) fn new(ip: String, server: VpnServer, machine: Machine, release_arena: bool) -> Self {
        Self {
            ip,
            server,
            machine,
            release_arena,
        }
    }

    pub fn is_release_arena(&self) -> bool {
        self.release_arena
    }

    /// Stop the instance
    pub async fn stop(self) -> Result<()> {
        let client = self.machine.session().upgrade()?;
        let request = if self.release_arena {
            ApiRequest::post("release_arena/terminate")
        } else {
            ApiRequest::post("vm/terminate").json(json!({"machine_id": self.machine.id()}))
        };
        client.request(&request).await?;
        info!("Stopped {}", self.machine.name);
        Ok(())
    }

    /// Ask for the instance to be reset
    pub async fn reset(&self) -> Result<()> {
        let client = self.machine.session().upgrade()?;
        let endpoint = if self.release_arena {
            "release_arena/reset"
        } else {
            "vm/reset"
        };
        let body = client
            .post_json(endpoint, json!({"machine_id": self.machine.id()}))
            .await?;

        let message = fields::message(&body);
        if message.ends_with(" will be reset in 1 minute.") {
            Ok(())
        } else if message == "Too many reset machine attempts. Try again later!" {
            Err(HtbError::TooManyResetAttempts)
        } else if fields::truthy(body.get("success")) {
            Ok(())
        } else if message.starts_with("You must wait") {
            Err(HtbError::TooManyResetAttempts)
        } else {
            Err(HtbError::Machine(message.to_string()))
        }
    }
}

impl std::fmt::Display for MachineInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}@{} - {}",
            self.machine.name, self.server.friendly_name, self.ip
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::SessionRef;

    fn profile(id: u64) -> Value {
        json!({
            "id": id,
            "name": "Lame",
            "os": "Linux",
            "points": 20,
            "release": "2017-03-14T19:00:00.000000Z",
            "user_owns_count": 100,
            "root_owns_count": "90",
            "authUserInUserOwns": true,
            "authUserInRootOwns": false,
            "authUserHasReviewed": false,
            "stars": "4.5",
            "avatar": "/storage/avatars/lame.png",
            "difficultyText": "Easy",
            "free": 0,
            "retired": 1,
            "ip": "10.10.10.3",
            "maker": {"id": 1},
            "maker2": null,
            "active": 0,
            "authUserFirstUserTime": "1D 02H 03M",
            "authUserFirstRootTime": null,
            "userBlood": {"created_at": "2017-03-14T19:30:00.000000Z", "blood_difference": "0H 30M 00S"},
            "rootBlood": null,
            "feedbackForChart": {"counterCake": 1},
        })
    }

    #[test]
    fn parses_profile() {
        let machine = Machine::from_record(profile(1), false, SessionRef::detached()).unwrap();
        assert_eq!(machine.name, "Lame");
        assert_eq!(machine.root_owns, 90);
        assert_eq!(machine.stars, 4.5);
        assert!(machine.retired);
        assert_eq!(machine.author_ids, vec![1]);

        let detail = machine.loaded_detail().unwrap();
        assert_eq!(detail.user_own_time, Some(Duration::from_secs(93_780)));
        assert_eq!(detail.root_own_time, None);
        assert_eq!(detail.user_blood_time, Some(Duration::from_secs(1_800)));
        assert!(detail.user_blood.as_ref().is_some_and(|s| s.blood && s.id == 1));
        assert!(detail.root_blood.is_none());
    }

    #[test]
    fn summaries_skip_detail() {
        let machine = Machine::from_record(
            json!({"id": 2, "name": "Legacy", "maker": {"id": 1}, "maker2": {"id": "7"}}),
            true,
            SessionRef::detached(),
        )
        .unwrap();
        assert!(machine.is_summary());
        assert_eq!(machine.author_ids, vec![1, 7]);
    }

    #[test]
    fn detailed_fields_match_detail() {
        let machine = Machine::from_record(profile(1), false, SessionRef::detached()).unwrap();
        crate::testing::assert_declared_detail(&machine);
    }

    #[test]
    fn difficulty_rating_bounds() {
        assert!(check_difficulty(10).is_ok());
        assert!(check_difficulty(100).is_ok());
        assert!(check_difficulty(0).is_err());
        assert!(check_difficulty(55).is_err());
        assert!(matches!(check_difficulty(110), Err(HtbError::IncorrectArgument(_))));
    }
}
