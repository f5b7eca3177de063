use rusqlite::params;

use crate::{Db, NodeHealthRecord, NodeId, NodeMeta, ProbeRecord, StoreError};

impl Db {
    /// Create the health row for a base URL never seen before.
    /// Fails with [`StoreError::Conflict`] when the base URL already exists,
    /// which callers resolve by re-fetching the winning row.
    pub fn create_health(
        &self,
        base_url: &str,
        dt_first_noticed: i64,
    ) -> Result<NodeHealthRecord, StoreError> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO site_health(base_url, dt_first_noticed) VALUES (?,?)",
            params![base_url, dt_first_noticed],
        )?;
        let id = conn.last_insert_rowid();
        drop(conn);
        self.find_health_by_id(id)?
            .ok_or(StoreError::Conflict)
    }

    /// Merge a successful probe into the node row: bump both probe timestamps,
    /// replace the self-reported metadata, set the certificate state and the
    /// new score. `no_scrape_url` is only overwritten when the node reported one.
    pub fn update_after_success(
        &self,
        id: NodeId,
        now: i64,
        meta: &NodeMeta,
        ssl_state: Option<bool>,
        health_score: i64,
    ) -> Result<NodeHealthRecord, StoreError> {
        let conn = self.lock();
        let n = conn.execute(
            "UPDATE site_health SET
               dt_last_probed=?, dt_last_seen=?,
               name=?, version=?, plugins=?, reg_policy=?, info=?,
               admin_name=?, admin_profile=?,
               ssl_state=?, no_scrape_url=COALESCE(?, no_scrape_url),
               health_score=?
             WHERE id=?",
            params![
                now,
                now,
                meta.name,
                meta.version,
                meta.plugins,
                meta.reg_policy,
                meta.info,
                meta.admin_name,
                meta.admin_profile,
                ssl_state,
                meta.no_scrape_url,
                health_score,
                id
            ],
        )?;
        drop(conn);
        if n == 0 {
            return Err(StoreError::Conflict);
        }
        self.find_health_by_id(id)?.ok_or(StoreError::Conflict)
    }

    /// Merge a failed probe attempt: only the attempt timestamp and the score
    /// move; last-known metadata stays as it was.
    pub fn update_after_failure(
        &self,
        id: NodeId,
        now: i64,
        health_score: i64,
    ) -> Result<NodeHealthRecord, StoreError> {
        let conn = self.lock();
        conn.execute(
            "UPDATE site_health SET dt_last_probed=?, health_score=? WHERE id=?",
            params![now, health_score, id],
        )?;
        drop(conn);
        self.find_health_by_id(id)?.ok_or(StoreError::Conflict)
    }

    /// Append one latency sample to the audit trail.
    pub fn create_probe_record(
        &self,
        site_health_id: NodeId,
        request_time_ms: i64,
        dt_performed: i64,
    ) -> Result<ProbeRecord, StoreError> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO site_probe(site_health_id, request_time_ms, dt_performed) VALUES (?,?,?)",
            params![site_health_id, request_time_ms, dt_performed],
        )?;
        let id = conn.last_insert_rowid();
        Ok(ProbeRecord {
            id,
            site_health_id,
            request_time_ms,
            dt_performed,
        })
    }
}
