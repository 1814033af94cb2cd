mod commands;
mod config;
mod server;

use std::path::PathBuf;
use std::process;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::commands::{
    cmd_chart, cmd_delete, cmd_export, cmd_goal_clear, cmd_goal_set, cmd_goal_show,
    cmd_height_clear, cmd_height_set, cmd_height_show, cmd_history, cmd_import, cmd_log,
    cmd_login, cmd_logout, cmd_stats, cmd_units, cmd_whoami, json_error,
};
use crate::config::Config;
use heft_core::auth::AuthSession;
use heft_core::service::WeightService;

#[derive(Parser)]
#[command(
    name = "heft",
    version,
    about = "A simple, local-first weight tracker",
    long_about = "Log your weight, follow the trend, and keep an eye on your goal.\n\
                  Data lives in a local SQLite database (override the location with HEFT_DATA_DIR)."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in with an email address
    Login {
        /// Account email
        email: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Sign out
    Logout {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the signed-in account
    Whoami {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Log a weight entry
    Log {
        /// Weight value (number)
        value: f64,
        /// Unit: kg or lbs (default: your display unit)
        #[arg(short, long)]
        unit: Option<String>,
        /// Date (YYYY-MM-DD, RFC 3339, or today/yesterday/tomorrow, default: now)
        #[arg(long)]
        date: Option<String>,
        /// Optional note
        #[arg(long)]
        note: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show weight history, newest first
    History {
        /// Only show the last N days (default: all)
        #[arg(short, long)]
        days: Option<u32>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a weight entry by ID
    Delete {
        /// Weight entry ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show statistics: current, change, averages, BMI, goal progress
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the weight series with its 7-entry trend
    Chart {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage the goal weight
    Goal {
        #[command(subcommand)]
        command: GoalCommands,
    },
    /// Manage height (used for BMI)
    Height {
        #[command(subcommand)]
        command: HeightCommands,
    },
    /// Set the display unit
    Units {
        /// kg or lbs
        unit: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Export all entries and settings
    Export {
        /// Write a Date,Weight,Unit,Note CSV instead of JSON
        #[arg(long)]
        csv: bool,
        /// Output file (default: stdout)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
        /// Accepted for consistency; export always writes machine-readable output
        #[arg(long)]
        json: bool,
    },
    /// Import a JSON export or a CSV history file
    Import {
        /// Path to the file
        file: PathBuf,
        /// Treat the file as a Date,Weight,Unit,Note CSV
        #[arg(long)]
        csv: bool,
        /// Preview import without making changes
        #[arg(long)]
        dry_run: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Start the REST API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
        /// Disable API key authentication (for development/testing)
        #[arg(long)]
        no_auth: bool,
        /// Accepted for consistency; the server always speaks JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum GoalCommands {
    /// Set the goal weight
    Set {
        /// Goal value (number)
        value: f64,
        /// Unit: kg or lbs (default: your display unit)
        #[arg(short, long)]
        unit: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the goal weight
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Clear the goal weight
    Clear {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum HeightCommands {
    /// Set height in centimetres
    Set {
        /// Height in cm
        cm: f64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show height
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Clear height
    Clear {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Commands {
    fn json(&self) -> bool {
        match self {
            Self::Login { json, .. }
            | Self::Logout { json }
            | Self::Whoami { json }
            | Self::Log { json, .. }
            | Self::History { json, .. }
            | Self::Delete { json, .. }
            | Self::Stats { json }
            | Self::Chart { json }
            | Self::Units { json, .. }
            | Self::Export { json, .. }
            | Self::Import { json, .. }
            | Self::Serve { json, .. } => *json,
            Self::Goal { command } => match command {
                GoalCommands::Set { json, .. }
                | GoalCommands::Show { json }
                | GoalCommands::Clear { json } => *json,
            },
            Self::Height { command } => match command {
                HeightCommands::Set { json, .. }
                | HeightCommands::Show { json }
                | HeightCommands::Clear { json } => *json,
            },
        }
    }
}

fn init_tracing(serving: bool) {
    let default = if serving {
        "heft=info,heft_core=info,tower_http=info"
    } else {
        "warn"
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(matches!(cli.command, Commands::Serve { .. }));
    let json = cli.command.json();

    if let Err(e) = run(cli).await {
        if json {
            println!("{}", json_error(&format!("{e:#}")));
        } else {
            eprintln!("Error: {e:#}");
        }
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let session = AuthSession::new(config.load_session()?);

    // Commands that do not need a signed-in user
    match &cli.command {
        Commands::Login { email, json } => return cmd_login(&config, &session, email, *json),
        Commands::Logout { json } => return cmd_logout(&config, &session, *json),
        Commands::Whoami { json } => return cmd_whoami(&session, *json),
        _ => {}
    }

    let user = session.current().require()?.clone();
    let service = WeightService::open(&config.db_path)?;
    tracing::debug!(user = %user, db = %config.db_path.display(), "opened store");

    match cli.command {
        Commands::Login { .. } | Commands::Logout { .. } | Commands::Whoami { .. } => Ok(()),
        Commands::Log {
            value,
            unit,
            date,
            note,
            json,
        } => cmd_log(&service, &user, value, unit.as_deref(), date, note, json),
        Commands::History { days, json } => cmd_history(&service, &user, days, json),
        Commands::Delete { id, json } => cmd_delete(&service, &user, id, json),
        Commands::Stats { json } => cmd_stats(&service, &user, json),
        Commands::Chart { json } => cmd_chart(&service, &user, json),
        Commands::Goal { command } => match command {
            GoalCommands::Set { value, unit, json } => {
                cmd_goal_set(&service, &user, value, unit.as_deref(), json)
            }
            GoalCommands::Show { json } => cmd_goal_show(&service, &user, json),
            GoalCommands::Clear { json } => cmd_goal_clear(&service, &user, json),
        },
        Commands::Height { command } => match command {
            HeightCommands::Set { cm, json } => cmd_height_set(&service, &user, cm, json),
            HeightCommands::Show { json } => cmd_height_show(&service, &user, json),
            HeightCommands::Clear { json } => cmd_height_clear(&service, &user, json),
        },
        Commands::Units { unit, json } => cmd_units(&service, &user, &unit, json),
        Commands::Export { csv, output, .. } => cmd_export(&service, &user, csv, output.as_deref()),
        Commands::Import {
            file,
            csv,
            dry_run,
            json,
        } => cmd_import(&service, &user, &file, csv, dry_run, json),
        Commands::Serve {
            port,
            bind,
            no_auth,
            ..
        } => {
            let (api_key, new_api_key) = if no_auth {
                (None, false)
            } else {
                let (key, new) = config.load_or_create_api_key()?;
                (Some(key), new)
            };
            server::start_server(service, user, port, &bind, api_key, new_api_key).await
        }
    }
}
