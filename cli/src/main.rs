use clap::{Parser, Subcommand};

mod commands;
mod util;

#[derive(Parser)]
#[command(
    name = "handoff",
    version,
    about = "Handoff CLI: answer questions your agents ask, and operate the broker API"
)]
struct Cli {
    /// API base URL
    #[arg(long, env = "HANDOFF_API_URL", default_value = "http://localhost:3000")]
    api_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check API health
    Health,
    /// Pending questions addressed to you (requires HANDOFF_API_KEY)
    Requests {
        #[command(subcommand)]
        command: commands::requests::RequestCommands,
    },
    /// Agent-runtime calls (requires HANDOFF_INTERNAL_API_TOKEN)
    Internal {
        #[command(subcommand)]
        command: commands::internal::InternalCommands,
    },
    /// Bootstrap users, keys and sessions (requires DATABASE_URL)
    Admin {
        #[command(subcommand)]
        command: commands::admin::AdminCommands,
    },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    // Usage errors exit with 4, not clap's default of 2 (reserved for server errors).
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            std::process::exit(if e.use_stderr() { 4 } else { 0 });
        }
    };
    let api_url = cli.api_url.trim_end_matches('/').to_string();

    let code = match cli.command {
        Commands::Health => commands::health::run(&api_url).await,
        Commands::Requests { command } => commands::requests::run(&api_url, command).await,
        Commands::Internal { command } => commands::internal::run(&api_url, command).await,
        Commands::Admin { command } => commands::admin::run(command).await,
    };

    std::process::exit(code);
}
