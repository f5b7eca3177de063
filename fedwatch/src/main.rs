use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing_subscriber::EnvFilter;

use health_sqlite::{Db, NodeHealthRecord};
use monitor::{MonitorConfig, ProbePool, Registrar};
use site_probe::{ProbeOptions, Prober};

mod config;

#[derive(Debug, Parser)]
#[command(name = "fedwatch", version, about = "Federation node health monitor")]
struct Cli {
    /// Optional config file (YAML). If omitted, loads ./fedwatch.yaml if present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Database file. Overrides the config file.
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print version information
    Version,
    /// Take note of a site referenced by a URL, registering it if needed
    Notice {
        /// Any URL pointing at the node (profile, post, base URL...)
        url: String,
        /// Also run a health probe when the node is due for one
        #[arg(long, default_value_t = false)]
        probe: bool,
    },
    /// Probe a node now and print its refreshed health record
    Probe {
        url: String,
    },
    /// Show the health record for one node, or all tracked nodes
    Status {
        url: Option<String>,
    },
}

fn fmt_ts(ts: Option<i64>) -> Option<String> {
    ts.and_then(|t| OffsetDateTime::from_unix_timestamp(t).ok())
        .and_then(|t| t.format(&Rfc3339).ok())
}

fn record_json(rec: &NodeHealthRecord) -> serde_json::Value {
    serde_json::json!({
        "id": rec.id,
        "base_url": rec.base_url,
        "health_score": rec.health_score,
        "health": scoring::score_to_label(rec.health_score),
        "dt_first_noticed": fmt_ts(Some(rec.dt_first_noticed)),
        "dt_last_probed": fmt_ts(rec.dt_last_probed),
        "dt_last_seen": fmt_ts(rec.dt_last_seen),
        "name": rec.name,
        "version": rec.version,
        "plugins": rec.plugins.as_deref().map(|p| p.split('\n').collect::<Vec<_>>()),
        "reg_policy": rec.reg_policy,
        "info": rec.info,
        "admin_name": rec.admin_name,
        "admin_profile": rec.admin_profile,
        "ssl_state": rec.ssl_state,
        "no_scrape_url": rec.no_scrape_url,
    })
}

fn monitor_config(cfg: Option<&config::Config>) -> MonitorConfig {
    let defaults = MonitorConfig::default();
    let sh = cfg.and_then(|c| c.site_health.clone()).unwrap_or_default();
    MonitorConfig {
        // minimum of 1 second timeout
        probe_timeout: Duration::from_secs(sh.probe_timeout_s.map_or(
            defaults.probe_timeout.as_secs(),
            |t| t.max(1),
        )),
        min_probe_delay: sh
            .min_probe_delay_s
            .map(Duration::from_secs)
            .unwrap_or(defaults.min_probe_delay),
        workers: sh.workers.unwrap_or(defaults.workers).max(1),
        queue: sh.queue.unwrap_or(defaults.queue).max(1),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let loaded_cfg = config::load_config(cli.config.as_deref());
    let mon_cfg = monitor_config(loaded_cfg.as_ref());

    if let Commands::Version = cli.command {
        println!("fedwatch {} (core {})", env!("CARGO_PKG_VERSION"), fedwatch_core::version());
        return Ok(());
    }

    let db_path = cli
        .db
        .or_else(|| loaded_cfg.as_ref().and_then(|c| c.db.clone()))
        .unwrap_or_else(|| PathBuf::from("fedwatch.db"));
    let db = Arc::new(Db::open_or_create(&db_path)?);

    let probe_opts = ProbeOptions {
        timeout: mon_cfg.probe_timeout,
        redirects: 8,
    };

    let rt = tokio::runtime::Runtime::new()?;
    match cli.command {
        Commands::Version => unreachable!(),
        Commands::Notice { url, probe } => {
            let rec = rt.block_on(async {
                let prober = Arc::new(Prober::new(&probe_opts)?);
                let pool = Arc::new(ProbePool::start(
                    db.clone(),
                    prober,
                    mon_cfg.workers,
                    mon_cfg.queue,
                ));
                let registrar = Registrar::new(db.clone(), pool.clone(), &mon_cfg);
                let rec = registrar.notice_site(&url, probe)?;
                drop(registrar);

                // a one-shot CLI run waits for the queued probe to land
                if let Ok(pool) = Arc::try_unwrap(pool) {
                    pool.shutdown().await;
                }
                anyhow::Ok(db.find_health_by_id(rec.id)?.unwrap_or(rec))
            })?;
            println!("{}", serde_json::to_string(&record_json(&rec))?);
        }
        Commands::Probe { url } => {
            let rec = rt.block_on(async {
                let prober = Arc::new(Prober::new(&probe_opts)?);
                let pool = Arc::new(ProbePool::start(db.clone(), prober.clone(), 1, 1));
                let registrar = Registrar::new(db.clone(), pool, &mon_cfg);
                let rec = registrar.notice_site(&url, false)?;
                let rec = monitor::run_probe(&db, &prober, rec.id).await?;
                anyhow::Ok(rec)
            })?;
            println!("{}", serde_json::to_string(&record_json(&rec))?);
        }
        Commands::Status { url } => match url {
            Some(url) => {
                let base = fedwatch_core::BaseUrl::parse(&url)?;
                let rec = db
                    .find_health_by_base_url(base.as_str())?
                    .ok_or_else(|| anyhow!("unknown node: {base}"))?;
                println!("{}", serde_json::to_string(&record_json(&rec))?);
            }
            None => {
                for rec in db.list_health()? {
                    println!("{}", serde_json::to_string(&record_json(&rec))?);
                }
            }
        },
    }
    Ok(())
}
