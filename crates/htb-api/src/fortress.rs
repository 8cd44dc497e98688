use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::instrument;

use htb_core::Result;

use crate::endgame::submission_result;
use crate::entity::{EntityKind, LazyEntity, Lookup, Parsed};
use crate::fields::{self, number, or_default};

/// A Hack The Box fortress
pub type Fortress = LazyEntity<FortressKind>;

#[derive(Debug, Clone, Copy)]
pub enum FortressKind {}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FortressInfo {
    pub name: String,
    pub image: String,
    pub num_flags: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FortressDetail {
    pub reset_votes: u64,
    /// The authenticated user's progress, out of 100
    pub progress: u64,
    pub flags: Vec<Value>,
    pub company: Company,
    pub ip: String,
}

/// Company a fortress is associated with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    #[serde(deserialize_with = "number")]
    pub id: u64,
    pub name: String,
    #[serde(default, deserialize_with = "or_default")]
    pub description: String,
    #[serde(default, deserialize_with = "or_default")]
    pub url: String,
    #[serde(default, deserialize_with = "or_default")]
    pub image: String,
}

#[derive(Deserialize)]
struct SummaryRecord {
    name: String,
    #[serde(default, deserialize_with = "or_default")]
    image: String,
    #[serde(default, deserialize_with = "number")]
    number_of_flags: usize,
}

#[derive(Deserialize)]
struct FullRecord {
    name: String,
    #[serde(default, deserialize_with = "or_default")]
    image: String,
    #[serde(default, deserialize_with = "or_default")]
    flags: Vec<Value>,
    company: Company,
    #[serde(default, deserialize_with = "number")]
    reset_votes: u64,
    #[serde(rename = "progress_percent", default, deserialize_with = "number")]
    progress: u64,
    #[serde(default, deserialize_with = "or_default")]
    ip: String,
}

impl EntityKind for FortressKind {
    const NAME: &'static str = "Fortress";
    const DETAILED_FIELDS: &'static [&'static str] =
        &["reset_votes", "progress", "flags", "company", "ip"];
    type Common = FortressInfo;
    type Detail = FortressDetail;

    fn endpoint(lookup: &Lookup) -> String {
        format!("fortress/{lookup}")
    }

    fn unwrap_response(body: Value) -> Result<Value> {
        fields::take(body, "data")
    }

    fn parse(record: Value, summary: bool) -> Result<Parsed<Self>> {
        let id = fields::record_id(&record)?;

        // Lists carry a flag count, full records the flags themselves
        if summary {
            let raw = SummaryRecord::deserialize(&record)?;
            return Ok(Parsed {
                id,
                common: FortressInfo {
                    name: raw.name,
                    image: raw.image,
                    num_flags: raw.number_of_flags,
                },
                detail: None,
            });
        }

        let raw = FullRecord::deserialize(&record)?;
        Ok(Parsed {
            id,
            common: FortressInfo {
                name: raw.name,
                image: raw.image,
                num_flags: raw.flags.len(),
            },
            detail: Some(FortressDetail {
                reset_votes: raw.reset_votes,
                progress: raw.progress,
                flags: raw.flags,
                company: raw.company,
                ip: raw.ip,
            }),
        })
    }
}

impl Fortress {
    /// Submit a flag; returns the API's message
    #[instrument(skip(self, flag), fields(fortress = %self.name))]
    pub async fn submit(&self, flag: &str) -> Result<String> {
        let client = self.session().upgrade()?;
        let body = client
            .post_json(&format!("fortress/{}/flag", self.id()), json!({"flag": flag}))
            .await?;
        submission_result(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::SessionRef;

    fn record() -> Value {
        json!({
            "id": 1,
            "name": "Jet",
            "image": "/storage/companies/3.png",
            "company": {
                "id": 3,
                "name": "Jet",
                "description": "Jet.com",
                "url": "https://jet.com",
                "image": "/storage/companies/3.png",
            },
            "reset_votes": 2,
            "progress_percent": "40",
            "flags": [{"id": 1, "title": "Connect"}, {"id": 2, "title": "Digging in..."}],
            "ip": "10.13.37.10",
        })
    }

    #[test]
    fn full_record_counts_flags() {
        let fortress = Fortress::from_record(record(), false, SessionRef::detached()).unwrap();
        assert_eq!(fortress.num_flags, 2);

        let detail = fortress.loaded_detail().unwrap();
        assert_eq!(detail.progress, 40);
        assert_eq!(detail.company.url, "https://jet.com");
        assert_eq!(detail.ip, "10.13.37.10");
    }

    #[test]
    fn summary_uses_flag_count() {
        let fortress = Fortress::from_record(
            json!({"id": 4, "name": "Akerva", "image": "", "number_of_flags": "8"}),
            true,
            SessionRef::detached(),
        )
        .unwrap();
        assert!(fortress.is_summary());
        assert_eq!(fortress.num_flags, 8);
    }

    #[test]
    fn detailed_fields_match_detail() {
        let fortress = Fortress::from_record(record(), false, SessionRef::detached()).unwrap();
        crate::testing::assert_declared_detail(&fortress);
    }
}
