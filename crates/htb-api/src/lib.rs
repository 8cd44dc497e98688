//! Typed access to the Hack The Box API
//!
//! [`HtbClient`] authenticates through `htb-auth` and hands out entities:
//! machines, challenges, endgames, fortresses, users and teams. Single-item
//! lookups return full records; list, leaderboard and search results are
//! summaries that fetch their remaining fields the first time one is needed.
//!
//! # Example
//!
//! ```no_run
//! use htb_api::HtbClient;
//!
//! # async fn example() -> htb_core::Result<()> {
//! let client = HtbClient::builder()
//!     .email("user@example.com")
//!     .password("hunter2")
//!     .cache("htb_tokens.json")
//!     .connect()
//!     .await?;
//!
//! for machine in client.get_machines(Some(5), false).await? {
//!     // Common fields are always present
//!     println!("{} ({})", machine.name, machine.os);
//!     // Detailed fields hydrate the summary on first access
//!     println!("active: {}", machine.detail().await?.active);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Entities keep a weak handle to the client. Once every clone of the client
//! is dropped, the session tokens are saved to the cache and entity operations
//! that need the network fail with `SessionClosed`.

pub mod challenge;
pub mod client;
pub mod content;
pub mod delta;
pub mod endgame;
pub mod entity;
pub mod factory;
pub mod fields;
pub mod fortress;
pub mod leaderboard;
pub mod machine;
pub mod search;
pub mod solve;
pub mod team;
pub mod user;
pub mod vpn;

// Re-export main types
pub use challenge::{Challenge, ChallengeDetail, ChallengeInfo, DockerEndpoint, DockerInstance};
pub use client::{HtbClient, HtbClientBuilder, SessionRef};
pub use content::Content;
pub use delta::parse_delta;
pub use endgame::{Endgame, EndgameDetail, EndgameInfo};
pub use entity::{EntityKey, EntityKind, LazyEntity, Lookup, Parsed};
pub use fortress::{Company, Fortress, FortressDetail, FortressInfo};
pub use leaderboard::{Country, Leaderboard, Totals, University};
pub use machine::{Machine, MachineDetail, MachineInfo, MachineInstance};
pub use search::Search;
pub use solve::{Solve, SolveKind, SolvedItem};
pub use team::{Team, TeamDetail, TeamInfo};
pub use user::{User, UserDetail, UserInfo};
pub use vpn::VpnServer;

pub use htb_core::{HtbError, Result};

#[cfg(test)]
pub(crate) mod testing {
    use crate::entity::{EntityKind, LazyEntity};

    /// The declared detailed fields are exactly what the detail serializes to
    pub(crate) fn assert_declared_detail<K: EntityKind>(entity: &LazyEntity<K>) {
        let detail = entity
            .loaded_detail()
            .expect("entity should be a full record");
        let value = serde_json::to_value(detail).unwrap();
        let mut keys: Vec<&str> = value
            .as_object()
            .expect("detail serializes to an object")
            .keys()
            .map(String::as_str)
            .collect();
        keys.sort_unstable();

        let mut declared = K::DETAILED_FIELDS.to_vec();
        declared.sort_unstable();
        assert_eq!(keys, declared, "{} detailed fields", K::NAME);
    }
}
