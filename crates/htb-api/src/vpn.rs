use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument, warn};

use htb_core::{ApiRequest, HtbError, Result};

use crate::client::HtbClient;
use crate::fields::{self, number, or_default};

/// A VPN server provided by Hack The Box
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VpnServer {
    #[serde(deserialize_with = "number")]
    pub id: u64,
    /// e.g. `US Free 1`
    pub friendly_name: String,
    #[serde(default, deserialize_with = "number")]
    pub current_clients: u64,
    /// e.g. `US`
    #[serde(default, deserialize_with = "or_default")]
    pub location: String,
}

impl VpnServer {
    /// Switch the authenticated user to this server
    #[instrument(skip(self, client), fields(server = %self.friendly_name))]
    pub async fn switch(&self, client: &HtbClient) -> Result<()> {
        let body = client
            .request(&ApiRequest::post(format!("connections/servers/switch/{}", self.id)))
            .await?
            .into_json()?;

        if body.get("status") == Some(&Value::Bool(true)) {
            info!("Switched to {}", self.friendly_name);
            return Ok(());
        }
        match fields::message(&body) {
            "You must stop your active machine before switching VPN" => {
                Err(HtbError::CannotSwitchWithActive)
            }
            message => Err(HtbError::Vpn(message.to_string())),
        }
    }

    /// Download the OpenVPN pack for this server
    ///
    /// Saved to `path`, or `<friendly_name>.ovpn` in the working directory.
    /// Packs can only be downloaded for the assigned server, so this switches
    /// to the server first if the API refuses.
    pub async fn download(&self, client: &HtbClient, path: Option<&Path>, tcp: bool) -> Result<PathBuf> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => std::env::current_dir()?.join(format!("{}.ovpn", self.friendly_name)),
        };

        let request = ApiRequest::get(self.pack_endpoint(tcp)).binary();
        let mut data = client.request(&request).await?.into_bytes();
        if contains(&data, b"You are not assigned") {
            warn!("Not assigned to {}, switching before download", self.friendly_name);
            self.switch(client).await?;
            data = client.request(&request).await?.into_bytes();
        }

        tokio::fs::write(&path, &data).await?;
        info!("Saved VPN pack to {}", path.display());
        Ok(path)
    }

    fn pack_endpoint(&self, tcp: bool) -> String {
        if tcp {
            format!("access/ovpnfile/{}/0/1", self.id)
        } else {
            format!("access/ovpnfile/{}/0", self.id)
        }
    }
}

impl std::fmt::Display for VpnServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.friendly_name)
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

/// Servers nested as `{location: {role: {"servers": {id: server}}}}`
pub(crate) fn flatten_options(options: &Value) -> Result<Vec<VpnServer>> {
    let mut servers = Vec::new();
    let Some(locations) = options.as_object() else {
        return Ok(servers);
    };
    for roles in locations.values() {
        let Some(roles) = roles.as_object() else {
            continue;
        };
        for role in roles.values() {
            if let Some(listed) = role.get("servers").and_then(Value::as_object) {
                for server in listed.values() {
                    servers.push(VpnServer::deserialize(server)?);
                }
            }
        }
    }
    Ok(servers)
}
