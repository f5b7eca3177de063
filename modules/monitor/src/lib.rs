//! Registration and probe orchestration for tracked federation nodes.
//!
//! The registrar turns "some activity referenced this URL" into a tracked
//! node and, when allowed, queues a health probe. Probes themselves run on a
//! bounded worker pool so a slow remote node never stalls whoever noticed it.

mod pool;

use std::sync::Arc;
use std::time::Duration;

use health_sqlite::{Db, NodeHealthRecord, NodeId, NodeMeta, StoreError};
use site_probe::{ProbeOutcome, Prober};
use tracing::{debug, info, warn};

use fedwatch_core::{BaseUrl, InvalidUrl};

pub use pool::ProbePool;

/// Below this score a node is considered in bad health and gets re-checked on
/// any activity, since current activity raises the odds it has recovered.
pub const BAD_HEALTH_THRESHOLD: i64 = -40;

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Total probe request timeout (floor of one second enforced downstream).
    pub probe_timeout: Duration,
    /// Minimum interval between activity-triggered probes of the same node.
    pub min_probe_delay: Duration,
    /// Probe worker count.
    pub workers: usize,
    /// Probe queue capacity.
    pub queue: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            probe_timeout: Duration::from_secs(10),
            min_probe_delay: Duration::from_secs(3600),
            workers: 4,
            queue: 64,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error(transparent)]
    InvalidUrl(#[from] InvalidUrl),
    /// Probe requested for an id the store does not know. Caller error.
    #[error("unknown node id {0}")]
    UnknownNode(NodeId),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub fn now_unix() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}

/// Ensures noticed URLs are tracked and decides when a notice should also
/// trigger a probe. Never does network I/O itself, only enqueues.
pub struct Registrar {
    store: Arc<Db>,
    pool: Arc<ProbePool>,
    min_probe_delay_s: i64,
}

impl Registrar {
    pub fn new(store: Arc<Db>, pool: Arc<ProbePool>, config: &MonitorConfig) -> Self {
        Registrar {
            store,
            pool,
            min_probe_delay_s: config.min_probe_delay.as_secs() as i64,
        }
    }

    /// Take note of the site a URL belongs to, creating its health record on
    /// first sight. With `trigger_probe`, a brand-new node is probed
    /// unconditionally; a known node only when it is due (see [`probe_due`]).
    pub fn notice_site(
        &self,
        url: &str,
        trigger_probe: bool,
    ) -> Result<NodeHealthRecord, MonitorError> {
        let base = BaseUrl::parse(url)?;
        let now = now_unix();

        if let Some(entry) = self.store.find_health_by_base_url(base.as_str())? {
            if trigger_probe && probe_due(&entry, now, self.min_probe_delay_s) {
                self.pool.enqueue(entry.id);
            }
            return Ok(entry);
        }

        let entry = match self.store.create_health(base.as_str(), now) {
            Ok(entry) => {
                info!(base_url = %base, id = entry.id, "tracking new node");
                entry
            }
            // Concurrent notice won the creation race; use their row.
            Err(StoreError::Conflict) => self
                .store
                .find_health_by_base_url(base.as_str())?
                .ok_or(StoreError::Conflict)?,
            Err(e) => return Err(e.into()),
        };

        if trigger_probe {
            self.pool.enqueue(entry.id);
        }
        Ok(entry)
    }
}

/// Whether an activity notice should probe an already-known node now, or
/// leave it to the periodic batch.
fn probe_due(entry: &NodeHealthRecord, now: i64, min_probe_delay_s: i64) -> bool {
    if entry.health_score < BAD_HEALTH_THRESHOLD {
        return true;
    }
    match entry.dt_last_probed {
        None => true,
        Some(last) => now - last > min_probe_delay_s,
    }
}

/// Certificate state after a successful probe: unset over plain HTTP, true
/// for a verified HTTPS response, false when the response only came back once
/// verification was disabled.
fn ssl_state_after(base: &BaseUrl, cert_fallback: bool) -> Option<bool> {
    if base.is_https() {
        Some(!cert_fallback)
    } else {
        None
    }
}

/// Probe one node and fold the outcome into its health record.
///
/// Transport and parse failures are absorbed into the score; only structural
/// problems (unknown id, store trouble) surface as errors. Every attempt
/// moves `dt_last_probed`, so staleness stays observable.
pub async fn run_probe(
    store: &Db,
    prober: &Prober,
    node_id: NodeId,
) -> Result<NodeHealthRecord, MonitorError> {
    let entry = store
        .find_health_by_id(node_id)?
        .ok_or(MonitorError::UnknownNode(node_id))?;
    let base = BaseUrl::parse(&entry.base_url)?;

    let outcome = prober.probe(&base).await;
    let now = now_unix();

    match outcome {
        ProbeOutcome::Success(s) => {
            store.create_probe_record(entry.id, s.elapsed_ms, now)?;

            if s.moved {
                // Redirected off its own base URL; noted, not acted on.
                warn!(base_url = %base, "node redirects to a different base url");
            }

            let ssl_state = ssl_state_after(&base, s.cert_fallback);
            let score = scoring::score_after_probe(
                entry.health_score,
                true,
                Some(s.elapsed_ms),
                Some(&s.info.version),
                s.cert_fallback,
            );
            debug!(
                base_url = %base,
                elapsed_ms = s.elapsed_ms,
                score,
                "probe succeeded"
            );

            let meta = NodeMeta {
                name: s.info.site_name,
                version: s.info.version,
                plugins: s.info.plugins.join("\n"),
                reg_policy: s.info.register_policy,
                info: s.info.info,
                admin_name: s.info.admin_name,
                admin_profile: s.info.admin_profile,
                no_scrape_url: s.info.no_scrape_url,
            };
            Ok(store.update_after_success(entry.id, now, &meta, ssl_state, score)?)
        }
        ProbeOutcome::Transport { cert_issue } => {
            let score = scoring::score_after_probe(entry.health_score, false, None, None, false);
            debug!(base_url = %base, cert_issue, score, "probe failed in transport");
            Ok(store.update_after_failure(entry.id, now, score)?)
        }
        ProbeOutcome::Parse { status, elapsed_ms } => {
            let score = scoring::score_after_probe(entry.health_score, false, None, None, false);
            debug!(base_url = %base, status, elapsed_ms, score, "probe returned unusable document");
            Ok(store.update_after_failure(entry.id, now, score)?)
        }
    }
}
