//! `ftk`: command-line front end for the technical incident ledger.
//!
//! Every command opens the workspace database, runs one engine operation and prints
//! the result as JSON on stdout. Logs go to stderr.

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use ftk_core::access::{Actor, ActorRole};

#[derive(Parser)]
#[command(name = "ftk")]
#[command(about = "Technical incident lifecycle and department handoff ledger", long_about = None)]
#[command(version)]
struct Cli {
    /// Workspace database file
    #[arg(long, env = "FTK_DB", global = true, default_value = "ftk.sqlite")]
    db: PathBuf,

    /// Engine configuration (TOML)
    #[arg(long, env = "FTK_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    actor: ActorArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Identity of the caller, already authenticated upstream.
#[derive(Args)]
struct ActorArgs {
    /// Acting username
    #[arg(long, env = "FTK_USER", global = true)]
    user: Option<String>,

    /// Acting user id
    #[arg(long, global = true)]
    user_id: Option<i64>,

    /// Role name as issued by the identity provider
    #[arg(long, env = "FTK_ROLE", global = true)]
    role: Option<String>,

    /// Explicit administrator flag
    #[arg(long, global = true)]
    admin: bool,
}

impl ActorArgs {
    fn to_actor(&self) -> Actor {
        Actor::new(
            self.user_id,
            self.user.clone(),
            ActorRole::from_role_name(self.role.as_deref(), self.admin),
        )
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new workspace database
    Init,

    /// Seed reference catalogs and demo incidents into an empty workspace
    SeedDemo,

    /// Open an incident
    Create(commands::CreateArgs),

    /// Move an open incident to another department
    Reassign {
        id: i64,

        /// New owning department; omit to clear
        #[arg(long)]
        department: Option<String>,

        #[arg(long)]
        note: Option<String>,
    },

    /// Resolve an open incident
    Close {
        id: i64,

        /// Resolution date (YYYY-MM-DD) or combined timestamp
        #[arg(long)]
        date: String,

        /// Resolution time (HH:MM[:SS]) when --date carries only a date
        #[arg(long)]
        time: Option<String>,

        /// Department that resolved the incident
        #[arg(long)]
        department: String,

        #[arg(long)]
        note: String,

        /// User responsible for the resolution
        #[arg(long)]
        responsible: Option<String>,
    },

    /// Delete an incident and its ledger (admins and supervisors)
    Delete { id: i64 },

    /// Show one incident
    Show { id: i64 },

    /// List incidents, newest first
    List,

    /// Department ownership segments
    Timeline { id: i64 },

    /// Incident header, duration, segments and full ledger
    History { id: i64 },

    /// Open-to-resolution duration of a closed incident
    Duration { id: i64 },

    /// Departments, problem types and active users
    Catalogs,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let actor = cli.actor.to_actor();
    let ctx = commands::Context {
        db: cli.db,
        config: cli.config,
        actor,
    };

    let result = match cli.command {
        Commands::Init => commands::init(&ctx),
        Commands::SeedDemo => commands::seed_demo(&ctx),
        Commands::Create(args) => commands::create(&ctx, args),
        Commands::Reassign {
            id,
            department,
            note,
        } => commands::reassign(&ctx, id, department, note),
        Commands::Close {
            id,
            date,
            time,
            department,
            note,
            responsible,
        } => commands::close(&ctx, id, date, time, department, note, responsible),
        Commands::Delete { id } => commands::delete(&ctx, id),
        Commands::Show { id } => commands::show(&ctx, id),
        Commands::List => commands::list(&ctx),
        Commands::Timeline { id } => commands::timeline(&ctx, id),
        Commands::History { id } => commands::history(&ctx, id),
        Commands::Duration { id } => commands::duration(&ctx, id),
        Commands::Catalogs => commands::catalogs(&ctx),
    };

    match result {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            let report = commands::ErrorReport::from_error(err, &ctx.actor);
            println!("{}", report.to_json());
            ExitCode::from(report.exit_code)
        }
    }
}
