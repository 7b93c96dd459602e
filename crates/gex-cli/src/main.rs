use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "gex")]
#[command(about = "Signal gateway operator CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> env -> engine -> risk -> stress...)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Run lifecycle commands
    Run {
        #[command(subcommand)]
        cmd: RunCmd,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,
    Migrate,
}

#[derive(Subcommand)]
enum RunCmd {
    /// Create a new run row in DB and print run_id + hashes.
    Start {
        /// Engine ID (e.g. MAIN, EXP)
        #[arg(long)]
        engine: String,

        /// Mode (PAPER | LIVE)
        #[arg(long)]
        mode: String,

        /// Layered config paths in merge order
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,
    },

    /// Move a run from its start state to ARMED. LIVE runs require
    /// --confirm to match the config-driven confirmation phrase.
    Arm {
        #[arg(long = "run-id")]
        run_id: String,

        #[arg(long)]
        confirm: Option<String>,
    },

    /// Move an ARMED run to RUNNING.
    Begin {
        #[arg(long = "run-id")]
        run_id: String,
    },

    /// Stop a run.
    Stop {
        #[arg(long = "run-id")]
        run_id: String,
    },

    /// Halt a run immediately, recording the given reason.
    Halt {
        #[arg(long = "run-id")]
        run_id: String,

        #[arg(long)]
        reason: String,
    },

    /// Record a liveness heartbeat for a run.
    Heartbeat {
        #[arg(long = "run-id")]
        run_id: String,
    },

    /// Print a run's full DB row.
    Status {
        #[arg(long = "run-id")]
        run_id: String,
    },

    /// Check (without acting on) whether a run's heartbeat has expired.
    DeadmanCheck {
        #[arg(long = "run-id")]
        run_id: String,

        #[arg(long = "ttl-seconds")]
        ttl_seconds: i64,
    },

    /// Check a run's heartbeat and halt it if expired.
    DeadmanEnforce {
        #[arg(long = "run-id")]
        run_id: String,

        #[arg(long = "ttl-seconds")]
        ttl_seconds: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => {
            let pool = gex_store::connect_from_env().await?;
            match cmd {
                DbCmd::Status => {
                    let s = gex_store::status(&pool).await?;
                    println!("db_ok={} has_runs_table={}", s.ok, s.has_runs_table);
                }
                DbCmd::Migrate => {
                    gex_store::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = gex_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Run { cmd } => match cmd {
            RunCmd::Start { engine, mode, config_paths } => {
                commands::run::run_start(engine, mode, config_paths).await?;
            }
            RunCmd::Arm { run_id, confirm } => {
                commands::run::run_arm(run_id, confirm).await?;
            }
            RunCmd::Begin { run_id } => {
                commands::run::run_begin(run_id).await?;
            }
            RunCmd::Stop { run_id } => {
                commands::run::run_stop(run_id).await?;
            }
            RunCmd::Halt { run_id, reason } => {
                commands::run::run_halt(run_id, reason).await?;
            }
            RunCmd::Heartbeat { run_id } => {
                commands::run::run_heartbeat(run_id).await?;
            }
            RunCmd::Status { run_id } => {
                commands::run::run_status(run_id).await?;
            }
            RunCmd::DeadmanCheck { run_id, ttl_seconds } => {
                commands::run::run_deadman_check(run_id, ttl_seconds).await?;
            }
            RunCmd::DeadmanEnforce { run_id, ttl_seconds } => {
                commands::run::run_deadman_enforce(run_id, ttl_seconds).await?;
            }
        },
    }

    Ok(())
}
