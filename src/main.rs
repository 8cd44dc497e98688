mod logging;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::Value;
use tracing::info;

use htb_api::{HtbClient, Lookup};
use htb_auth::{FileTokenStore, TerminalPrompt};

#[derive(Parser)]
#[command(name = "htb", version, about = "Hack The Box API client")]
struct Cli {
    #[command(flatten)]
    auth: AuthArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct AuthArgs {
    /// API base URL
    #[arg(long, env = "HTB_API_BASE", global = true)]
    api_base: Option<String>,

    /// Token cache file (defaults to the platform config directory)
    #[arg(long, env = "HTB_CACHE", global = true)]
    cache: Option<PathBuf>,

    /// Do not read or write the token cache
    #[arg(long, global = true)]
    no_cache: bool,

    /// App token; skips login and refresh entirely
    #[arg(long, env = "HTB_APP_TOKEN", global = true, hide_env_values = true)]
    app_token: Option<String>,

    #[arg(long, env = "HTB_EMAIL", global = true)]
    email: Option<String>,

    #[arg(long, env = "HTB_PASSWORD", global = true, hide_env_values = true)]
    password: Option<String>,

    /// One-time password for two-factor accounts
    #[arg(long, env = "HTB_OTP", global = true)]
    otp: Option<String>,

    /// Ask for a long-lived token pair
    #[arg(long, global = true)]
    remember: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and show the authenticated user
    Login,
    /// Show a machine by id or name
    Machine { machine: String },
    /// List machines
    Machines {
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        retired: bool,
    },
    /// Show a challenge by id or name
    Challenge { challenge: String },
    /// List challenges
    Challenges {
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        retired: bool,
    },
    /// Show a user and their recent activity
    User { id: u64 },
    /// Show a team
    Team { id: u64 },
    /// Search users, machines, teams and challenges
    Search { term: String },
    /// Show a Hall of Fame
    Hof {
        #[arg(value_enum, default_value_t = Board::Users)]
        board: Board,
    },
    /// Submit a flag
    Submit {
        #[arg(value_enum)]
        kind: SubmitKind,
        /// Id, or name for machines and challenges
        target: String,
        flag: String,
        /// Difficulty rating, 10 to 100 in steps of 10
        #[arg(long, default_value_t = 50)]
        difficulty: u32,
    },
    /// VPN servers
    #[command(subcommand)]
    Vpn(VpnCommand),
}

#[derive(Clone, Copy, ValueEnum)]
enum Board {
    Users,
    Vip,
    Countries,
    Teams,
    Universities,
}

#[derive(Clone, Copy, ValueEnum)]
enum SubmitKind {
    Machine,
    Challenge,
    Endgame,
    Fortress,
}

#[derive(Subcommand)]
enum VpnCommand {
    /// Show the assigned server
    Current {
        #[arg(long)]
        release_arena: bool,
    },
    /// List available servers
    List {
        #[arg(long)]
        release_arena: bool,
    },
    /// Switch to a server
    Switch { id: u64 },
    /// Download the OpenVPN pack for a server
    Download {
        id: u64,
        #[arg(long)]
        path: Option<PathBuf>,
        #[arg(long)]
        tcp: bool,
    },
}

fn lookup(text: &str) -> Lookup {
    match text.parse::<u64>() {
        Ok(id) => Lookup::Id(id),
        Err(_) => Lookup::Name(text.to_string()),
    }
}

fn print(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn connect(auth: AuthArgs) -> Result<HtbClient> {
    let mut builder = HtbClient::builder().prompt(TerminalPrompt).remember(auth.remember);

    if let Some(api_base) = &auth.api_base {
        builder = builder.api_base(api_base)?;
    }
    if !auth.no_cache {
        let cache = match auth.cache {
            Some(path) => path,
            None => FileTokenStore::default_path()?,
        };
        builder = builder.cache(cache);
    }
    if let Some(token) = auth.app_token {
        builder = builder.app_token(token);
    }
    if let Some(email) = auth.email {
        builder = builder.email(email);
    }
    if let Some(password) = auth.password {
        builder = builder.password(password);
    }
    if let Some(otp) = auth.otp {
        builder = builder.otp(otp);
    }

    builder.connect().await.context("Failed to authenticate")
}

async fn run(client: &HtbClient, command: Commands) -> Result<()> {
    match command {
        Commands::Login => {
            let user = client.user().await?;
            info!("Logged in as {}", user.name);
            print(&user.to_json()?)?;
        }
        Commands::Machine { machine } => {
            print(&client.get_machine(lookup(&machine)).await?.to_json()?)?;
        }
        Commands::Machines { limit, retired } => {
            let machines = client.get_machines(limit, retired).await?;
            let list = machines.iter().map(|m| m.to_json()).collect::<htb_api::Result<Vec<_>>>()?;
            print(&Value::Array(list))?;
        }
        Commands::Challenge { challenge } => {
            print(&client.get_challenge(lookup(&challenge)).await?.to_json()?)?;
        }
        Commands::Challenges { limit, retired } => {
            let challenges = client.get_challenges(limit, retired).await?;
            let list = challenges.iter().map(|c| c.to_json()).collect::<htb_api::Result<Vec<_>>>()?;
            print(&Value::Array(list))?;
        }
        Commands::User { id } => {
            let user = client.get_user(id).await?;
            let mut value = user.to_json()?;
            value["activity"] = serde_json::to_value(user.activity().await?)?;
            print(&value)?;
        }
        Commands::Team { id } => {
            let team = client.get_team(id).await?;
            let mut value = team.to_json()?;
            value["ranking"] = team.ranking().await?.into();
            print(&value)?;
        }
        Commands::Search { term } => {
            let search = client.search(&term).await?;
            info!("{}", search);
            let mut value = serde_json::Map::new();
            value.insert("users".into(), names(search.users().await?.iter().map(|u| &u.name)));
            value.insert("machines".into(), names(search.machines().await?.iter().map(|m| &m.name)));
            value.insert("teams".into(), names(search.teams().await?.iter().map(|t| &t.name)));
            value.insert("challenges".into(), names(search.challenges().await?.iter().map(|c| &c.name)));
            print(&Value::Object(value))?;
        }
        Commands::Hof { board } => {
            let value = match board {
                Board::Users | Board::Vip => {
                    let users = client.get_hof(matches!(board, Board::Vip)).await?;
                    Value::Array(users.iter().map(|u| u.to_json()).collect::<htb_api::Result<_>>()?)
                }
                Board::Teams => {
                    let teams = client.get_hof_teams().await?;
                    Value::Array(teams.iter().map(|t| t.to_json()).collect::<htb_api::Result<_>>()?)
                }
                Board::Countries => serde_json::to_value(&*client.get_hof_countries().await?)?,
                Board::Universities => serde_json::to_value(&*client.get_hof_universities().await?)?,
            };
            print(&value)?;
        }
        Commands::Submit {
            kind,
            target,
            flag,
            difficulty,
        } => {
            let message = match kind {
                SubmitKind::Machine => {
                    client.get_machine(lookup(&target)).await?.submit(&flag, difficulty).await?
                }
                SubmitKind::Challenge => {
                    client.get_challenge(lookup(&target)).await?.submit(&flag, difficulty).await?
                }
                SubmitKind::Endgame => {
                    let id = target.parse().context("Endgames are looked up by id")?;
                    client.get_endgame(id).await?.submit(&flag).await?
                }
                SubmitKind::Fortress => {
                    let id = target.parse().context("Fortresses are looked up by id")?;
                    client.get_fortress(id).await?.submit(&flag).await?
                }
            };
            println!("{message}");
        }
        Commands::Vpn(command) => run_vpn(client, command).await?,
    }
    Ok(())
}

async fn run_vpn(client: &HtbClient, command: VpnCommand) -> Result<()> {
    match command {
        VpnCommand::Current { release_arena } => {
            print(&serde_json::to_value(client.get_current_vpn_server(release_arena).await?)?)?;
        }
        VpnCommand::List { release_arena } => {
            print(&serde_json::to_value(client.get_all_vpn_servers(release_arena).await?)?)?;
        }
        VpnCommand::Switch { id } => {
            find_server(client, id).await?.switch(client).await?;
        }
        VpnCommand::Download { id, path, tcp } => {
            let server = find_server(client, id).await?;
            let saved = server.download(client, path.as_deref(), tcp).await?;
            println!("{}", saved.display());
        }
    }
    Ok(())
}

async fn find_server(client: &HtbClient, id: u64) -> Result<htb_api::VpnServer> {
    client
        .get_all_vpn_servers(false)
        .await?
        .into_iter()
        .find(|server| server.id == id)
        .with_context(|| format!("No VPN server with id {id}"))
}

fn names<'a>(items: impl Iterator<Item = &'a String>) -> Value {
    Value::Array(items.map(|name| Value::String(name.clone())).collect())
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();

    let cli = Cli::parse();
    let client = connect(cli.auth).await?;
    run(&client, cli.command).await
}
