mod appointments;
mod availability;
mod booking;
mod credentials;
mod db;
mod handlers;
mod inventory;
mod models;
mod schema;
mod session;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "scheduler-service")]
struct Args {
    /// SQLite database file shared by every scheduler process.
    #[arg(long, env = "DATABASE_URL", default_value = "scheduler.db")]
    database_url: String,

    #[arg(long, env = "SCHEDULER_BUSY_TIMEOUT_MS", default_value = "5000")]
    busy_timeout_ms: u64,

    /// PBKDF2 iterations for new and verified passwords.
    #[arg(long, env = "SCHEDULER_KDF_ROUNDS", default_value = "100000")]
    kdf_rounds: u32,
}

fn main() -> Result<()> {
    // stdout belongs to the interactive prompt
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    info!("Opening scheduler database {}", args.database_url);
    let conn = db::establish(&args.database_url, args.busy_timeout_ms)?;

    let credentials = credentials::CredentialStore::new(args.kdf_rounds);
    let mut handler = handlers::CommandHandler::new(conn, credentials);

    let stdin = std::io::stdin();
    handler.run(stdin.lock(), std::io::stdout())?;

    info!("Scheduler session ended");
    Ok(())
}
