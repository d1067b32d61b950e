//! Forum Keepalive Helper - daemon
//!
//! Keeps tracked forum threads from going dormant by unarchiving them on a
//! schedule. The remote platform and each tenant's tracked set are loaded
//! from a snapshot file.

#![forbid(unsafe_code)]

mod cooldown;
mod enroll;
mod events;
mod keepalive;
mod permissions;
mod reconcile;
mod scheduler;
mod traversal;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use fkh_common::{
    Directory, FkhConfig, Gateway, InMemoryDirectory, MockSnapshot, ResourceId, TenantId,
    TrackedKind,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use permissions::PermissionChecker;
use reconcile::Reconciler;
use scheduler::{PassScheduler, StatusRefresher};

#[derive(Parser)]
#[command(name = "fkhd")]
#[command(author, version, about = "FKH daemon - keeps forum threads from going dormant")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Snapshot describing the remote platform and tracked resources
    #[arg(short, long, env = "FKH_SNAPSHOT")]
    snapshot: PathBuf,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Run one pass right after startup
    #[arg(long)]
    run_init: bool,

    /// Run a single pass, print the summary and exit
    #[arg(long)]
    once: bool,

    /// Run one tenant on demand and exit
    #[arg(long, value_name = "TENANT")]
    tenant: Option<u64>,

    /// Print the permission report for a tenant and exit
    #[arg(long, value_name = "TENANT")]
    check: Option<u64>,

    /// List a tenant's tracked resources and exit
    #[arg(long, value_name = "TENANT")]
    list: Option<u64>,

    /// Validate and track a resource (not persisted)
    #[arg(long, num_args = 3, value_names = ["TENANT", "KIND", "REF"])]
    track: Option<Vec<String>>,

    /// Stop tracking a resource (not persisted)
    #[arg(long, num_args = 2, value_names = ["TENANT", "REF"])]
    untrack: Option<Vec<String>>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = FkhConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    init_logging(&config, cli.verbose);

    let (gateway, rows) = MockSnapshot::load(&cli.snapshot)?.into_parts()?;
    info!("Loaded snapshot {:?} ({} tracked resources)", cli.snapshot, rows.len());
    let gateway: Arc<dyn Gateway> = Arc::new(gateway);
    let directory: Arc<dyn Directory> = Arc::new(InMemoryDirectory::with_rows(rows));
    let reconciler = Reconciler::new(directory.clone(), gateway.clone(), config.reconcile.clone());

    if cli.once {
        let summary = reconciler.run_pass().await?;
        println!("{summary}");
        return Ok(());
    }
    if let Some(tenant) = cli.tenant {
        let outcome = reconciler.run_tenant(TenantId(tenant)).await?;
        println!("{outcome}");
        return Ok(());
    }
    if let Some(tenant) = cli.check {
        let tenant = TenantId(tenant);
        let tracked = directory.list_tracked(tenant).await?;
        let checker = PermissionChecker::from_config(&config.permissions);
        info!(%tenant, required = checker.required().len(), "Checking permissions");
        for report in checker.check(gateway.as_ref(), tenant, &tracked).await? {
            println!("{report}\n");
        }
        return Ok(());
    }
    if let Some(tenant) = cli.list {
        println!("{}", enroll::listing(directory.as_ref(), TenantId(tenant)).await?);
        return Ok(());
    }
    if let Some(args) = cli.track.as_deref() {
        let [tenant, kind, reference] = args else {
            return Err(anyhow!("--track takes TENANT KIND REF"));
        };
        let tenant = parse_tenant(tenant)?;
        let kind: TrackedKind = kind.parse().map_err(|e: String| anyhow!(e))?;
        let resource = parse_resource(reference)?;
        let outcome =
            enroll::enroll(directory.as_ref(), gateway.as_ref(), tenant, kind, resource).await?;
        println!("{outcome}");
        println!("{}", enroll::listing(directory.as_ref(), tenant).await?);
        return Ok(());
    }
    if let Some(args) = cli.untrack.as_deref() {
        let [tenant, reference] = args else {
            return Err(anyhow!("--untrack takes TENANT REF"));
        };
        let tenant = parse_tenant(tenant)?;
        let outcome = enroll::unenroll(directory.as_ref(), tenant, parse_resource(reference)?).await?;
        println!("{outcome}");
        println!("{}", enroll::listing(directory.as_ref(), tenant).await?);
        return Ok(());
    }

    run_daemon(reconciler, &config, cli.run_init).await
}

async fn run_daemon(reconciler: Reconciler, config: &FkhConfig, run_init: bool) -> Result<()> {
    info!("Starting FKH daemon...");
    let _event_log = reconciler.events().spawn_log_sink();

    let scheduler = PassScheduler::start(reconciler.clone(), &config.schedule).await?;
    let status = StatusRefresher::new(
        reconciler.clone(),
        Duration::from_secs(config.schedule.status_interval_secs),
    );
    let _status_handle = status.start();

    if run_init || config.schedule.run_on_start {
        let reconciler = reconciler.clone();
        tokio::spawn(async move {
            if let Err(e) = reconciler.run_pass().await {
                error!(error = %e, "Startup pass failed");
            }
        });
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutting down ({} scheduled jobs)", scheduler.job_count());
    scheduler.shutdown().await?;
    Ok(())
}

fn init_logging(config: &FkhConfig, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level))
    };
    let json = config.general.log_json;

    tracing_subscriber::registry()
        .with((!json).then(|| fmt::layer().with_writer(std::io::stderr)))
        .with(json.then(|| fmt::layer().json().with_writer(std::io::stderr)))
        .with(filter)
        .init();
}

fn parse_tenant(raw: &str) -> Result<TenantId> {
    raw.trim()
        .parse::<u64>()
        .map(TenantId)
        .with_context(|| format!("Invalid tenant id '{raw}'"))
}

fn parse_resource(raw: &str) -> Result<ResourceId> {
    ResourceId::parse_ref(raw).ok_or_else(|| anyhow!("Invalid resource reference '{raw}' (use <#id> or id)"))
}
