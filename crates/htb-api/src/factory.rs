//! Entity lookups on [`HtbClient`]
//!
//! Single-item lookups return full entities; list endpoints return summaries
//! that hydrate on demand.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::instrument;

use htb_core::Result;

use crate::challenge::{Challenge, ChallengeKind};
use crate::client::HtbClient;
use crate::endgame::{Endgame, EndgameKind};
use crate::entity::Lookup;
use crate::fields::{self, truncate};
use crate::fortress::{Fortress, FortressKind};
use crate::leaderboard::{Country, Leaderboard, University};
use crate::machine::{Machine, MachineInstance, MachineKind};
use crate::search::Search;
use crate::team::{Team, TeamKind};
use crate::user::{User, UserKind};
use crate::vpn::{self, VpnServer};

impl HtbClient {
    /// Fetch a machine by id or name
    pub async fn get_machine(&self, lookup: impl Into<Lookup>) -> Result<Machine> {
        self.fetch::<MachineKind>(lookup).await
    }

    /// Active or retired machines, as summaries
    #[instrument(skip(self))]
    pub async fn get_machines(&self, limit: Option<usize>, retired: bool) -> Result<Vec<Machine>> {
        let endpoint = if retired {
            "machine/list/retired"
        } else {
            "machine/list"
        };
        let body = self.get_json(endpoint).await?;
        let mut records = truncate(fields::into_list(fields::take(body, "info")?)?, limit);
        // The list tells which one it is, the records do not
        for record in &mut records {
            if let Value::Object(map) = record {
                map.insert("retired".to_string(), Value::Bool(retired));
            }
        }
        self.summaries(records)
    }

    /// Ids of the machines on the user's to-do list
    pub async fn get_todo_machines(&self, limit: Option<usize>) -> Result<Vec<u64>> {
        let body = self.get_json("home/user/todo").await?;
        let records = fields::into_list(fields::take_pointer(body, "/data/machines")?)?;
        truncate(records, limit)
            .iter()
            .map(fields::record_id)
            .collect()
    }

    /// The machine currently spawned for the user, if any
    #[instrument(skip(self))]
    pub async fn get_active_machine(&self, release_arena: bool) -> Result<Option<MachineInstance>> {
        let endpoint = if release_arena {
            "release_arena/active"
        } else {
            "machine/active"
        };
        let info = fields::take(self.get_json(endpoint).await?, "info")?;
        match &info {
            Value::Object(map) if !map.is_empty() => {}
            _ => return Ok(None),
        }

        let machine = self.get_machine(fields::record_id(&info)?).await?;
        let server = self.get_current_vpn_server(release_arena).await?;
        let ip = machine.ip().await?;
        Ok(Some(MachineInstance::new(ip, server, machine, release_arena)))
    }

    /// Raw tag data for a machine
    pub async fn get_machine_tags(&self, lookup: impl Into<Lookup>) -> Result<Value> {
        let lookup = lookup.into();
        fields::take(self.get_json(&format!("machine/tags/{lookup}")).await?, "info")
    }

    /// Raw rating matrix for a machine
    pub async fn get_machine_matrix(&self, lookup: impl Into<Lookup>) -> Result<Value> {
        let lookup = lookup.into();
        fields::take(
            self.get_json(&format!("machine/graph/matrix/{lookup}")).await?,
            "info",
        )
    }

    /// Raw user difficulty ratings for a machine
    pub async fn get_machine_user_rating(&self, lookup: impl Into<Lookup>) -> Result<Value> {
        let lookup = lookup.into();
        fields::take(
            self.get_json(&format!("machine/graph/owns/difficulty/{lookup}")).await?,
            "info",
        )
    }

    /// Fetch a challenge by id or name
    pub async fn get_challenge(&self, lookup: impl Into<Lookup>) -> Result<Challenge> {
        self.fetch::<ChallengeKind>(lookup).await
    }

    /// Active or retired challenges, as summaries
    pub async fn get_challenges(&self, limit: Option<usize>, retired: bool) -> Result<Vec<Challenge>> {
        let endpoint = if retired {
            "challenge/list/retired"
        } else {
            "challenge/list"
        };
        let records = fields::into_list(fields::take(self.get_json(endpoint).await?, "challenges")?)?;
        self.summaries(truncate(records, limit))
    }

    pub async fn get_endgame(&self, id: u64) -> Result<Endgame> {
        self.fetch::<EndgameKind>(id).await
    }

    pub async fn get_endgames(&self, limit: Option<usize>) -> Result<Vec<Endgame>> {
        let records = fields::into_list(fields::take(self.get_json("endgames").await?, "data")?)?;
        self.summaries(truncate(records, limit))
    }

    pub async fn get_fortress(&self, id: u64) -> Result<Fortress> {
        self.fetch::<FortressKind>(id).await
    }

    /// Fortresses ordered by id
    ///
    /// The API returns them as an object keyed by id.
    pub async fn get_fortresses(&self, limit: Option<usize>) -> Result<Vec<Fortress>> {
        let data = fields::take(self.get_json("fortresses").await?, "data")?;
        let mut records: Vec<(u64, Value)> = match data {
            Value::Object(map) => map
                .into_iter()
                .map(|(key, record)| -> Result<(u64, Value)> {
                    let id = key.parse::<u64>().or_else(|_| fields::record_id(&record))?;
                    Ok((id, record))
                })
                .collect::<Result<_>>()?,
            other => fields::into_list(other)?
                .into_iter()
                .map(|record| -> Result<(u64, Value)> { Ok((fields::record_id(&record)?, record)) })
                .collect::<Result<_>>()?,
        };
        records.sort_by_key(|(id, _)| *id);

        let records: Vec<Value> = records.into_iter().map(|(_, record)| record).collect();
        self.summaries(truncate(records, limit))
    }

    pub async fn get_user(&self, id: u64) -> Result<User> {
        self.fetch::<UserKind>(id).await
    }

    pub async fn get_team(&self, id: u64) -> Result<Team> {
        self.fetch::<TeamKind>(id).await
    }

    /// Top users, optionally from the VIP board
    pub async fn get_hof(&self, vip: bool) -> Result<Leaderboard<User>> {
        let endpoint = if vip {
            "rankings/users?vip=1"
        } else {
            "rankings/users"
        };
        let records = fields::into_list(fields::take(self.get_json(endpoint).await?, "data")?)?;
        Ok(Leaderboard::new(self.summaries(records)?))
    }

    pub async fn get_hof_countries(&self) -> Result<Leaderboard<Country>> {
        self.ranking_records("rankings/countries").await
    }

    pub async fn get_hof_teams(&self) -> Result<Leaderboard<Team>> {
        let records = fields::into_list(fields::take(
            self.get_json("rankings/teams").await?,
            "data",
        )?)?;
        Ok(Leaderboard::new(self.summaries(records)?))
    }

    pub async fn get_hof_universities(&self) -> Result<Leaderboard<University>> {
        self.ranking_records("rankings/universities").await
    }

    async fn ranking_records<T: DeserializeOwned>(&self, endpoint: &str) -> Result<Leaderboard<T>> {
        let records = fields::into_list(fields::take(self.get_json(endpoint).await?, "data")?)?;
        let entries = records
            .into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<Vec<T>, _>>()?;
        Ok(Leaderboard::new(entries))
    }

    /// The VPN server the user is assigned to
    pub async fn get_current_vpn_server(&self, release_arena: bool) -> Result<VpnServer> {
        let server = if release_arena {
            let body = self
                .get_json("connections/servers?product=release_arena")
                .await?;
            fields::take_pointer(body, "/data/assigned")?
        } else {
            let body = self.get_json("connections").await?;
            fields::take_pointer(body, "/data/lab/assigned_server")?
        };
        Ok(VpnServer::deserialize(&server)?)
    }

    /// Every VPN server available for the product
    pub async fn get_all_vpn_servers(&self, release_arena: bool) -> Result<Vec<VpnServer>> {
        let product = if release_arena { "release_arena" } else { "labs" };
        let body = self
            .get_json(&format!("connections/servers?product={product}"))
            .await?;
        vpn::flatten_options(&fields::take_pointer(body, "/data/options")?)
    }

    /// Search users, machines, teams and challenges
    pub async fn search(&self, term: &str) -> Result<Search> {
        Search::run(self, term).await
    }
}
