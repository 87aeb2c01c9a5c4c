use std::{path::PathBuf, sync::Arc};

use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    Method,
};
use botvisor_cli::{AnsiStyles, BotvisorArgs, BotvisorCliResult};
use botvisor_core::{
    config::SupervisorConfig,
    management::{StopAllOutcome, Supervisor, UnitEvent},
    registry::UnitState,
};
use botvisor_server::{route, state::AppState, Config};
use botvisor_utils::{env::BOTVISOR_API_KEY_ENV_VAR, CHECKMARK, CROSSMARK};
use tokio::sync::broadcast::{self, error::RecvError};
use tower_http::cors::{Any, CorsLayer};

//--------------------------------------------------------------------------------------------------
// Functions: Handlers
//--------------------------------------------------------------------------------------------------

pub fn log_level(args: &BotvisorArgs) {
    let level = if args.trace {
        Some("trace")
    } else if args.debug {
        Some("debug")
    } else if args.info {
        Some("info")
    } else if args.warn {
        Some("warn")
    } else if args.error {
        Some("error")
    } else {
        None
    };

    // Set RUST_LOG environment variable only if a level is specified
    if let Some(level) = level {
        std::env::set_var("RUST_LOG", format!("botvisor={}", level));
    }
}

pub async fn serve_subcommand(
    home: PathBuf,
    port: u16,
    key: Option<String>,
    dev_mode: bool,
) -> BotvisorCliResult<()> {
    let key = key.or_else(|| std::env::var(BOTVISOR_API_KEY_ENV_VAR).ok());
    let config = Arc::new(Config::new(key, port, dev_mode)?);

    if dev_mode {
        tracing::info!("development mode: {}", dev_mode);
        println!(
            "{} Running in {} mode",
            &*CHECKMARK,
            console::style("development").yellow()
        );
    }

    let supervisor = Arc::new(open_supervisor(home).await?);
    spawn_event_printer(supervisor.subscribe());

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([AUTHORIZATION, ACCEPT, CONTENT_TYPE])
        .allow_origin(Any);

    let app = route::create_router(AppState::new(config.clone(), supervisor)).layer(cors);

    tracing::info!("starting server on {}", config.get_addr());
    println!(
        "{} Server listening on {}",
        &*CHECKMARK,
        console::style(config.get_addr()).yellow()
    );

    let listener = tokio::net::TcpListener::bind(config.get_addr()).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down server");
        })
        .await?;

    Ok(())
}

pub async fn create_subcommand(home: PathBuf, name: &str, credential: &str) -> BotvisorCliResult<()> {
    let supervisor = open_supervisor(home).await?;
    let unit = supervisor.create(name, credential).await?;

    println!(
        "{} Created unit {} at {}",
        &*CHECKMARK,
        unit.name.literal(),
        unit.entry_path
    );

    Ok(())
}

pub async fn start_subcommand(home: PathBuf, name: &str) -> BotvisorCliResult<()> {
    let supervisor = open_supervisor(home).await?;
    let pid = supervisor.start(name).await?;

    println!(
        "{} Started unit {} with pid {}",
        &*CHECKMARK,
        name.literal(),
        pid
    );

    Ok(())
}

pub async fn stop_subcommand(home: PathBuf, name: &str) -> BotvisorCliResult<()> {
    let supervisor = open_supervisor(home).await?;
    supervisor.stop(name).await?;

    println!("{} Stopped unit {}", &*CHECKMARK, name.literal());

    Ok(())
}

pub async fn stop_all_subcommand(home: PathBuf) -> BotvisorCliResult<()> {
    let supervisor = open_supervisor(home).await?;

    match supervisor.stop_all().await? {
        StopAllOutcome::NothingRunning => println!("No units are running"),
        StopAllOutcome::Stopped(names) => {
            for name in names {
                println!("{} Stopped unit {}", &*CHECKMARK, name.literal());
            }
        }
    }

    Ok(())
}

pub async fn list_subcommand(home: PathBuf) -> BotvisorCliResult<()> {
    let supervisor = open_supervisor(home).await?;
    let units = supervisor.list().await;

    if units.is_empty() {
        println!("No units");
        return Ok(());
    }

    println!(
        "{}",
        format!("{:<24} {:<10} {:<8} {}", "NAME", "STATE", "PID", "ENTRY").header()
    );
    for unit in units {
        let state = match unit.state {
            UnitState::Running => console::style(unit.state.as_str()).green(),
            UnitState::Starting => console::style(unit.state.as_str()).yellow(),
            UnitState::Stopped => console::style(unit.state.as_str()).dim(),
        };
        let pid = unit.pid.map(|pid| pid.to_string()).unwrap_or_else(|| "-".to_string());

        println!("{:<24} {:<10} {:<8} {}", unit.name, state, pid, unit.entry_path);
    }

    Ok(())
}

pub async fn reconcile_subcommand(home: PathBuf) -> BotvisorCliResult<()> {
    let supervisor = open_supervisor(home).await?;
    let stopped = supervisor.reconcile().await?;

    if stopped.is_empty() {
        println!("{} All running units are alive", &*CHECKMARK);
    }
    for name in stopped {
        println!("{} Unit {} was gone, marked as stopped", &*CROSSMARK, name.literal());
    }

    Ok(())
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

async fn open_supervisor(home: PathBuf) -> BotvisorCliResult<Supervisor> {
    tracing::debug!("using home directory {}", home.display());
    let config = SupervisorConfig::load(home).await?;
    Ok(Supervisor::open(config).await?)
}

fn spawn_event_printer(mut events: broadcast::Receiver<UnitEvent>) {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!("missed {} unit events", missed)
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}

fn print_event(event: &UnitEvent) {
    let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");

    match event {
        UnitEvent::Started { name, pid } => println!(
            "{} {} unit {} started (pid {})",
            now,
            &*CHECKMARK,
            name.literal(),
            pid.map(|pid| pid.to_string()).unwrap_or_else(|| "unknown".to_string())
        ),
        UnitEvent::Stopped { name } => {
            println!("{} {} unit {} stopped", now, &*CHECKMARK, name.literal())
        }
        UnitEvent::Exited {
            name,
            pid,
            exit_code,
        } => println!(
            "{} {} unit {} (pid {}) exited unexpectedly with code {}",
            now,
            &*CROSSMARK,
            name.literal(),
            pid,
            exit_code
                .map(|code| code.to_string())
                .unwrap_or_else(|| "none".to_string())
                .error()
        ),
    }
}
