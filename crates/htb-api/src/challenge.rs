use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, instrument};

use htb_core::{ApiRequest, HtbError, Result};

use crate::client::SessionRef;
use crate::entity::{EntityKind, LazyEntity, Lookup, Parsed};
use crate::fields::{self, flag, number, optional_number, or_default, timestamp};
use crate::machine::check_difficulty;
use crate::user::User;

/// A Hack The Box challenge
pub type Challenge = LazyEntity<ChallengeKind>;

#[derive(Debug, Clone, Copy)]
pub enum ChallengeKind {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeInfo {
    pub name: String,
    #[serde(default, deserialize_with = "flag")]
    pub retired: bool,
    #[serde(default, deserialize_with = "or_default")]
    pub difficulty: String,
    #[serde(default, deserialize_with = "number")]
    pub points: u64,
    #[serde(rename(deserialize = "difficulty_chart"), default)]
    pub difficulty_ratings: Value,
    #[serde(default, deserialize_with = "number")]
    pub solves: u64,
    /// The authenticated user has solved it
    #[serde(rename(deserialize = "authUserSolve"), default, deserialize_with = "flag")]
    pub solved: bool,
    #[serde(default, deserialize_with = "number")]
    pub likes: u64,
    #[serde(default, deserialize_with = "number")]
    pub dislikes: u64,
    #[serde(default, deserialize_with = "timestamp")]
    pub release_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChallengeDetail {
    pub description: String,
    pub category: String,
    pub author_ids: Vec<u64>,
    pub has_download: bool,
    pub has_docker: bool,
    /// Docker instance already running for the authenticated user
    pub instance: Option<DockerEndpoint>,
}

/// Address of a challenge's Docker container
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DockerEndpoint {
    pub ip: String,
    pub port: u16,
}

#[derive(Deserialize)]
struct DetailRecord {
    #[serde(default, deserialize_with = "or_default")]
    description: String,
    #[serde(rename = "category_name", default, deserialize_with = "or_default")]
    category: String,
    #[serde(default, deserialize_with = "optional_number")]
    creator_id: Option<u64>,
    #[serde(default, deserialize_with = "optional_number")]
    creator2_id: Option<u64>,
    #[serde(rename = "download", default, deserialize_with = "flag")]
    has_download: bool,
    #[serde(rename = "docker", default, deserialize_with = "flag")]
    has_docker: bool,
    #[serde(default)]
    docker_ip: Option<String>,
    #[serde(default, deserialize_with = "optional_number")]
    docker_port: Option<u16>,
}

impl EntityKind for ChallengeKind {
    const NAME: &'static str = "Challenge";
    const DETAILED_FIELDS: &'static [&'static str] = &[
        "description",
        "category",
        "author_ids",
        "has_download",
        "has_docker",
        "instance",
    ];
    type Common = ChallengeInfo;
    type Detail = ChallengeDetail;

    fn endpoint(lookup: &Lookup) -> String {
        format!("challenge/info/{lookup}")
    }

    fn unwrap_response(body: Value) -> Result<Value> {
        fields::take(body, "challenge")
    }

    fn parse(record: Value, summary: bool) -> Result<Parsed<Self>> {
        let id = fields::record_id(&record)?;
        let common = ChallengeInfo::deserialize(&record)?;
        if summary {
            return Ok(Parsed {
                id,
                common,
                detail: None,
            });
        }

        let raw = DetailRecord::deserialize(&record)?;
        let instance = match (raw.docker_ip, raw.docker_port) {
            (Some(ip), Some(port)) if !ip.is_empty() => Some(DockerEndpoint { ip, port }),
            _ => None,
        };
        let detail = ChallengeDetail {
            description: raw.description,
            category: raw.category,
            author_ids: raw.creator_id.into_iter().chain(raw.creator2_id).collect(),
            has_download: raw.has_download,
            has_docker: raw.has_docker,
            instance,
        };

        Ok(Parsed {
            id,
            common,
            detail: Some(detail),
        })
    }
}

/// Response of `challenge/start`
#[derive(Deserialize)]
struct StartedInstance {
    #[serde(default, deserialize_with = "or_default")]
    id: String,
    ip: String,
    #[serde(deserialize_with = "number")]
    port: u16,
}

impl Challenge {
    /// Submit a flag, rating the challenge's difficulty
    #[instrument(skip(self, flag), fields(challenge = %self.name))]
    pub async fn submit(&self, flag: &str, difficulty: u32) -> Result<String> {
        check_difficulty(difficulty)?;
        let client = self.session().upgrade()?;
        let body = client
            .post_json(
                "challenge/own",
                json!({"flag": flag, "challenge_id": self.id(), "difficulty": difficulty}),
            )
            .await?;

        match fields::message(&body) {
            "Incorrect flag" => Err(HtbError::IncorrectFlag),
            message => Ok(message.to_string()),
        }
    }

    /// Start the challenge's Docker instance
    pub async fn start(&self) -> Result<DockerInstance> {
        if !self.detail().await?.has_docker {
            return Err(HtbError::NoDocker);
        }

        let client = self.session().upgrade()?;
        let body = client
            .post_json("challenge/start", json!({"challenge_id": self.id()}))
            .await?;
        let started = StartedInstance::deserialize(&body)?;
        info!("Started {} at {}:{}", self.name, started.ip, started.port);

        Ok(DockerInstance {
            container_id: started.id,
            endpoint: DockerEndpoint {
                ip: started.ip,
                port: started.port,
            },
            challenge_id: self.id(),
            session: self.session().clone(),
        })
    }

    /// Handle to an instance that was already running when fetched
    pub async fn instance(&self) -> Result<Option<DockerInstance>> {
        Ok(self.detail().await?.instance.clone().map(|endpoint| DockerInstance {
            container_id: String::new(),
            endpoint,
            challenge_id: self.id(),
            session: self.session().clone(),
        }))
    }

    /// Download the challenge files
    ///
    /// Saved to `path`, or `<name>.zip` in the working directory. Downloads
    /// are limited client-side to one per cooldown period.
    pub async fn download(&self, path: Option<&Path>) -> Result<PathBuf> {
        if !self.detail().await?.has_download {
            return Err(HtbError::NoDownload);
        }

        let client = self.session().upgrade()?;
        client.try_start_download_cooldown().await?;

        let path = match path {
            Some(path) => path.to_path_buf(),
            None => std::env::current_dir()?.join(format!("{}.zip", self.name)),
        };
        let data = client
            .request(&ApiRequest::get(format!("challenge/download/{}", self.id())).binary())
            .await?
            .into_bytes();

        tokio::fs::write(&path, &data).await?;
        info!("Downloaded {} to {}", self.name, path.display());
        Ok(path)
    }

    /// Fetch the challenge's creators
    pub async fn authors(&self) -> Result<Vec<User>> {
        let ids = self.detail().await?.author_ids.clone();
        let client = self.session().upgrade()?;
        let mut authors = Vec::with_capacity(ids.len());
        for id in ids {
            authors.push(client.get_user(id).await?);
        }
        Ok(authors)
    }
}

/// A running Docker container of a challenge
#[derive(Debug, Clone)]
pub struct DockerInstance {
    /// Empty when the container id is unknown
    pub container_id: String,
    pub endpoint: DockerEndpoint,
    pub challenge_id: u64,
    session: SessionRef,
}

impl DockerInstance {
    pub fn ip(&self) -> &str {
        &self.endpoint.ip
    }

    pub fn port(&self) -> u16 {
        self.endpoint.port
    }

    /// Stop the container
    pub async fn stop(self) -> Result<()> {
        let client = self.session.upgrade()?;
        client
            .post_json("challenge/stop", json!({"challenge_id": self.challenge_id}))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> Value {
        json!({
            "id": 143,
            "name": "Weak RSA",
            "retired": 1,
            "difficulty": "Easy",
            "points": "0",
            "difficulty_chart": {"easy": 10},
            "solves": 9000,
            "authUserSolve": true,
            "likes": 300,
            "dislikes": 20,
            "release_date": "2017-03-17 19:00:00",
            "description": "Can you decrypt the message?",
            "category_name": "Crypto",
            "creator_id": 1,
            "creator2_id": null,
            "download": true,
            "docker": false,
            "docker_ip": null,
            "docker_port": null,
        })
    }

    #[test]
    fn parses_info() {
        let challenge =
            Challenge::from_record(info(), false, SessionRef::detached()).unwrap();
        assert!(challenge.retired);
        assert!(challenge.solved);
        assert_eq!(challenge.points, 0);
        assert!(challenge.release_date.is_some());

        let detail = challenge.loaded_detail().unwrap();
        assert_eq!(detail.category, "Crypto");
        assert_eq!(detail.author_ids, vec![1]);
        assert!(detail.has_download);
        assert!(detail.instance.is_none());
    }

    #[test]
    fn running_container_becomes_instance() {
        let mut record = info();
        record["docker"] = json!(true);
        record["docker_ip"] = json!("134.209.176.83");
        record["docker_port"] = json!(31337);

        let challenge = Challenge::from_record(record, false, SessionRef::detached()).unwrap();
        assert_eq!(
            challenge.loaded_detail().unwrap().instance,
            Some(DockerEndpoint {
                ip: "134.209.176.83".into(),
                port: 31337
            })
        );
    }

    #[test]
    fn string_ids_and_ports_are_accepted() {
        let mut record = info();
        record["creator_id"] = json!("1");
        record["creator2_id"] = json!("");
        record["docker_ip"] = json!("10.10.10.3");
        record["docker_port"] = json!("31337");

        let challenge = Challenge::from_record(record, false, SessionRef::detached()).unwrap();
        let detail = challenge.loaded_detail().unwrap();
        assert_eq!(detail.author_ids, vec![1]);
        assert_eq!(detail.instance.as_ref().map(|i| i.port), Some(31337));
    }

    #[tokio::test]
    async fn start_without_docker_fails_before_request() {
        let challenge = Challenge::from_record(info(), false, SessionRef::detached()).unwrap();
        assert!(matches!(challenge.start().await, Err(HtbError::NoDocker)));
    }

    #[test]
    fn detailed_fields_match_detail() {
        let challenge = Challenge::from_record(info(), false, SessionRef::detached()).unwrap();
        crate::testing::assert_declared_detail(&challenge);
    }
}
