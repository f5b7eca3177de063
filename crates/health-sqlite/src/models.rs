use serde::{Deserialize, Serialize};

pub type NodeId = i64;
pub type ProbeId = i64;

/// One row per distinct federation node, keyed by normalized base URL.
/// Timestamps are unix seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeHealthRecord {
    pub id: NodeId,
    pub base_url: String,
    pub dt_first_noticed: i64,
    pub dt_last_probed: Option<i64>,
    pub dt_last_seen: Option<i64>,
    pub health_score: i64,
    pub name: Option<String>,
    pub version: Option<String>,
    /// Newline-joined plugin list, as the node reported it.
    pub plugins: Option<String>,
    pub reg_policy: Option<String>,
    pub info: Option<String>,
    pub admin_name: Option<String>,
    pub admin_profile: Option<String>,
    /// `Some(true)` = HTTPS with a valid certificate, `Some(false)` = HTTPS via
    /// the verification fallback, `None` = plain HTTP or never probed.
    pub ssl_state: Option<bool>,
    pub no_scrape_url: Option<String>,
}

/// Append-only latency audit trail, one row per successful probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeRecord {
    pub id: ProbeId,
    pub site_health_id: NodeId,
    pub request_time_ms: i64,
    pub dt_performed: i64,
}

/// Metadata staged for a node row after a successful, parsed probe.
#[derive(Debug, Clone, Default)]
pub struct NodeMeta {
    pub name: String,
    pub version: String,
    pub plugins: String,
    pub reg_policy: String,
    pub info: String,
    pub admin_name: String,
    pub admin_profile: String,
    pub no_scrape_url: Option<String>,
}
