//! orgkernel CLI entry point.
//!
//! Provides `genesis`, `run`, `check` and `inspect` subcommands for creating
//! an organization, driving it with a TOML script, answering a permission
//! query and dumping the persisted state.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use uuid::Uuid;

use orgkernel::acl::eval::ChainFacts;
use orgkernel::apps::builtin_catalog;
use orgkernel::audit::AuditLogger;
use orgkernel::config::{config_dir, OrgConfig};
use orgkernel::host::{spawn_node, NodeOptions, Organization};
use orgkernel::kernel::Genesis;
use orgkernel::logging;
use orgkernel::script::{Script, ScriptArg, ScriptRunner, StepStatus};
use orgkernel::store::StateDb;

/// orgkernel: registry and access control for a modular organization.
#[derive(Parser)]
#[command(name = "orgkernel", version, about)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Create a new organization and its state database.
    Genesis {
        /// Replace an existing state database.
        #[arg(long)]
        force: bool,
    },
    /// Run a TOML script against the organization (created if missing).
    Run {
        /// Script path.
        script: PathBuf,
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Answer a permission query. Exits 0 when allowed, 1 when denied.
    Check {
        /// Entity asking.
        #[arg(long)]
        who: String,
        /// Module address, `kernel`, `acl` or a label.
        #[arg(long)]
        app: String,
        /// Role name or `0x` id.
        #[arg(long)]
        role: String,
        /// Call argument; repeat for more.
        #[arg(long = "arg")]
        args: Vec<String>,
    },
    /// Print the persisted state as JSON.
    Inspect,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let config = OrgConfig::load().context("failed to load configuration")?;
    let home = config_dir()?;

    match cli.command {
        Command::Genesis { force } => {
            logging::init_cli(cli.verbose);
            handle_genesis(&config, &home, force).await?;
        }
        Command::Run { script, json } => {
            let _logging_guard = match &config.paths.logs_dir {
                Some(_) => Some(logging::init_production(
                    &config.paths.logs_dir(&home),
                    cli.verbose,
                )?),
                None => {
                    logging::init_cli(cli.verbose);
                    None
                }
            };
            handle_run(&config, &home, &script, json).await?;
        }
        Command::Check {
            who,
            app,
            role,
            args,
        } => {
            logging::init_cli(cli.verbose);
            if !handle_check(&config, &home, &who, &app, &role, &args).await? {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Inspect => {
            logging::init_cli(cli.verbose);
            handle_inspect(&config, &home).await?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Create a fresh organization.
async fn handle_genesis(config: &OrgConfig, home: &Path, force: bool) -> anyhow::Result<()> {
    let db_path = config.paths.state_db(home);
    if db_path.exists() {
        if !force {
            anyhow::bail!(
                "state database {} already exists (use --force to replace it)",
                db_path.display()
            );
        }
        remove_db(&db_path)?;
    }

    let db = StateDb::open(&db_path)
        .await
        .with_context(|| format!("failed to open {}", db_path.display()))?;
    let org = create_org(config, home, &db).await?;

    println!("kernel {}", org.kernel().address());
    println!("acl    {}", org.kernel().acl().address());
    println!("root   {}", config.root());
    Ok(())
}

/// Run a script through a node that audits and persists every commit.
async fn handle_run(
    config: &OrgConfig,
    home: &Path,
    path: &Path,
    json: bool,
) -> anyhow::Result<()> {
    let script =
        Script::load(path).with_context(|| format!("failed to load script {}", path.display()))?;
    let (org, db) = open_org(config, home, true).await?;

    let audit_path = config.paths.audit_log(home);
    let audit = AuditLogger::new(&audit_path)
        .with_context(|| format!("failed to open audit log {}", audit_path.display()))?;

    let (node, task) = spawn_node(
        org,
        NodeOptions {
            audit: Some(Arc::new(audit)),
            db: Some(db),
            block_time_secs: config.chain.block_time_secs,
            auto_mine: config.chain.auto_mine,
            channel_buffer: config.limits.channel_buffer,
        },
    );

    let result = match ScriptRunner::new(&node, config.root()).await {
        Ok(mut runner) => runner.run(&script).await,
        Err(e) => Err(e),
    };

    drop(node);
    let org = task.await.context("node task failed")?;
    info!(block_number = org.facts().block_number, "node stopped");

    let report = result.with_context(|| format!("script {} failed", path.display()))?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    for step in &report.steps {
        let status = match &step.status {
            StepStatus::Committed { events, .. } => format!("committed ({events} events)"),
            StepStatus::Rejected { kind, .. } => format!("rejected ({kind})"),
            StepStatus::Held => "held".to_owned(),
        };
        match &step.output {
            Some(output) => println!("{:>3} {:<26} {status} -> {output}", step.step, step.action),
            None => println!("{:>3} {:<26} {status}", step.step, step.action),
        }
    }
    for (alias, address) in &report.aliases {
        println!("{alias} = {address}");
    }
    Ok(())
}

/// Query the persisted organization.
async fn handle_check(
    config: &OrgConfig,
    home: &Path,
    who: &str,
    app: &str,
    role: &str,
    args: &[String],
) -> anyhow::Result<bool> {
    let (org, _db) = open_org(config, home, false).await?;
    let (node, _task) = spawn_node(
        org,
        NodeOptions {
            channel_buffer: 1,
            ..NodeOptions::default()
        },
    );
    let runner = ScriptRunner::new(&node, config.root()).await?;
    let args: Vec<ScriptArg> = args.iter().map(|a| ScriptArg::parse_cli(a)).collect();
    let allowed = runner.query_permission(who, app, role, &args).await?;
    println!("{}", if allowed { "allowed" } else { "denied" });
    Ok(allowed)
}

/// Print the persisted snapshot.
async fn handle_inspect(config: &OrgConfig, home: &Path) -> anyhow::Result<()> {
    let db_path = config.paths.state_db(home);
    if !db_path.exists() {
        anyhow::bail!("no state at {} (run `orgkernel genesis`)", db_path.display());
    }
    let db = StateDb::open(&db_path).await?;
    let snapshot = db
        .load()
        .await?
        .with_context(|| format!("{} holds no organization", db_path.display()))?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

/// Open the state database and restore the organization, creating it when
/// `create` is set and nothing is stored yet.
async fn open_org(
    config: &OrgConfig,
    home: &Path,
    create: bool,
) -> anyhow::Result<(Organization, StateDb)> {
    let db_path = config.paths.state_db(home);
    if !create && !db_path.exists() {
        anyhow::bail!("no state at {} (run `orgkernel genesis`)", db_path.display());
    }
    let db = StateDb::open(&db_path)
        .await
        .with_context(|| format!("failed to open {}", db_path.display()))?;

    let org = match db.load().await.context("failed to load state")? {
        Some(snapshot) => {
            debug!(path = %db_path.display(), "restoring organization");
            Organization::restore(
                snapshot,
                Arc::new(builtin_catalog()),
                config.host_limits(),
                config.limits.max_params,
            )
            .context("stored state is inconsistent")?
        }
        None if create => create_org(config, home, &db).await?,
        None => anyhow::bail!("{} holds no organization", db_path.display()),
    };
    Ok((org, db))
}

/// Genesis from config, persisted and audited.
async fn create_org(config: &OrgConfig, home: &Path, db: &StateDb) -> anyhow::Result<Organization> {
    let root = config.root();
    let genesis = Genesis::for_root(root, config.limits.max_params);
    let facts = ChainFacts {
        block_number: 0,
        timestamp: config.chain.genesis_timestamp,
    };
    let (org, events) = Organization::genesis(
        &genesis,
        facts,
        Arc::new(builtin_catalog()),
        config.host_limits(),
    )
    .context("genesis failed")?;

    db.save(&org.snapshot())
        .await
        .context("failed to persist genesis state")?;

    let audit_path = config.paths.audit_log(home);
    AuditLogger::new(&audit_path)
        .with_context(|| format!("failed to open audit log {}", audit_path.display()))?
        .log_invocation(Uuid::new_v4(), root, 0, &events)
        .context("failed to audit genesis")?;

    info!(kernel = %genesis.kernel, acl = %genesis.acl, %root, "organization created");
    Ok(org)
}

/// Remove a SQLite database and its WAL side files.
fn remove_db(path: &Path) -> anyhow::Result<()> {
    for suffix in ["", "-wal", "-shm"] {
        let mut target = path.as_os_str().to_owned();
        target.push(suffix);
        match std::fs::remove_file(&target) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e).with_context(|| format!("failed to remove {}", path.display()))
            }
        }
    }
    Ok(())
}
