mod handlers;

use botvisor_cli::{AnsiStyles, BotvisorArgs, BotvisorCliResult, BotvisorSubcommand};
use botvisor_utils::env;
use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

const DEFAULT_LOG_FILTER: &str = "botvisor=info";

//--------------------------------------------------------------------------------------------------
// Functions: main
//--------------------------------------------------------------------------------------------------

#[tokio::main]
async fn main() -> BotvisorCliResult<()> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    let args = BotvisorArgs::parse();

    handlers::log_level(&args);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    if args.version {
        println!("{}", format!("v{}", env!("CARGO_PKG_VERSION")).literal());
        return Ok(());
    }

    let home = args.home.unwrap_or_else(env::get_botvisor_home_path);

    match args.subcommand {
        Some(BotvisorSubcommand::Serve {
            port,
            key,
            dev_mode,
        }) => {
            handlers::serve_subcommand(home, port, key, dev_mode).await?;
        }
        Some(BotvisorSubcommand::Create { name, credential }) => {
            handlers::create_subcommand(home, &name, &credential).await?;
        }
        Some(BotvisorSubcommand::Start { name }) => {
            handlers::start_subcommand(home, &name).await?;
        }
        Some(BotvisorSubcommand::Stop { name }) => {
            handlers::stop_subcommand(home, &name).await?;
        }
        Some(BotvisorSubcommand::StopAll) => {
            handlers::stop_all_subcommand(home).await?;
        }
        Some(BotvisorSubcommand::List) => {
            handlers::list_subcommand(home).await?;
        }
        Some(BotvisorSubcommand::Reconcile) => {
            handlers::reconcile_subcommand(home).await?;
        }
        None => {
            BotvisorArgs::command().print_help()?;
        }
    }

    Ok(())
}
