use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{error, info};

use gmail_reader::config::Config;
use gmail_reader::GmailClient;

#[derive(Parser)]
#[command(name = "gmail-reader")]
#[command(about = "Lists and reads Gmail messages using an OAuth2 refresh token")]
#[command(version)]
struct Args {
    /// Check the configuration without connecting
    #[arg(long)]
    check_config: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Print the id and thread id of every matching message
    List {
        /// Gmail search query (empty matches the whole mailbox)
        #[arg(short, long, default_value = "")]
        query: String,

        /// Maximum number of messages (0 = unlimited)
        #[arg(short, long, default_value_t = 0)]
        max: i64,
    },
    /// Print one parsed message as JSON
    Read {
        /// Gmail message id
        id: String,
    },
    /// List matching messages and print each of them
    Dump {
        #[arg(short, long, default_value = "")]
        query: String,

        #[arg(short, long, default_value_t = 10)]
        max: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let args = Args::parse();

    env_logger::init();

    let config = Config::from_env().context("Invalid configuration")?;

    if args.check_config {
        println!("✅ Configuration is valid");
        println!("📧 Mailbox: {}", config.gmail.user);
        println!("🔑 Credentials: {}", config.gmail.credentials_path);
        return Ok(());
    }

    let Some(command) = args.command else {
        anyhow::bail!("No command given, see --help");
    };

    let client = GmailClient::connect(
        &config.gmail.user,
        &config.gmail.credentials_path,
        &config.gmail.refresh_token,
    )
    .await
    .context("Unable to connect to Gmail")?;

    let result = match command {
        Command::List { query, max } => list(&client, &query, max).await,
        Command::Read { id } => read(&client, &id).await,
        Command::Dump { query, max } => dump(&client, &query, max).await,
    };

    if let Err(e) = &result {
        error!("❌ {:#}", e);
    }
    result
}

async fn list(client: &GmailClient, query: &str, max: i64) -> Result<()> {
    let rows = client
        .list_messages(query, max)
        .await
        .context("Error searching for emails")?;

    for row in &rows {
        println!("{}\t{}", row.id, row.thread_id);
    }
    info!("{} message(s) listed", rows.len());
    Ok(())
}

async fn read(client: &GmailClient, id: &str) -> Result<()> {
    let message = client
        .read_message(id)
        .await
        .with_context(|| format!("Unable to read message {}", id))?;

    println!("{}", serde_json::to_string_pretty(&message)?);
    Ok(())
}

async fn dump(client: &GmailClient, query: &str, max: i64) -> Result<()> {
    let rows = client
        .list_messages(query, max)
        .await
        .context("Error searching for emails")?;

    println!("# msgs = {}", rows.len());
    for row in &rows {
        println!("-----------------------------------");
        read(client, &row.id).await?;
    }
    Ok(())
}
