use rusqlite::{params, OptionalExtension, Row};

use crate::{Db, NodeHealthRecord, NodeId, ProbeRecord, StoreError};

const HEALTH_COLS: &str = "id, base_url, dt_first_noticed, dt_last_probed, dt_last_seen, \
     health_score, name, version, plugins, reg_policy, info, admin_name, \
     admin_profile, ssl_state, no_scrape_url";

fn health_from_row(r: &Row<'_>) -> rusqlite::Result<NodeHealthRecord> {
    Ok(NodeHealthRecord {
        id: r.get(0)?,
        base_url: r.get(1)?,
        dt_first_noticed: r.get(2)?,
        dt_last_probed: r.get(3)?,
        dt_last_seen: r.get(4)?,
        health_score: r.get(5)?,
        name: r.get(6)?,
        version: r.get(7)?,
        plugins: r.get(8)?,
        reg_policy: r.get(9)?,
        info: r.get(10)?,
        admin_name: r.get(11)?,
        admin_profile: r.get(12)?,
        ssl_state: r.get(13)?,
        no_scrape_url: r.get(14)?,
    })
}

impl Db {
    pub fn find_health_by_base_url(
        &self,
        base_url: &str,
    ) -> Result<Option<NodeHealthRecord>, StoreError> {
        let conn = self.lock();
        let rec = conn
            .query_row(
                &format!("SELECT {HEALTH_COLS} FROM site_health WHERE base_url=? ORDER BY id ASC LIMIT 1"),
                params![base_url],
                health_from_row,
            )
            .optional()?;
        Ok(rec)
    }

    pub fn find_health_by_id(&self, id: NodeId) -> Result<Option<NodeHealthRecord>, StoreError> {
        let conn = self.lock();
        let rec = conn
            .query_row(
                &format!("SELECT {HEALTH_COLS} FROM site_health WHERE id=?"),
                params![id],
                health_from_row,
            )
            .optional()?;
        Ok(rec)
    }

    /// All tracked nodes, worst health first. Read surface for listings.
    pub fn list_health(&self) -> Result<Vec<NodeHealthRecord>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {HEALTH_COLS} FROM site_health ORDER BY health_score ASC, base_url ASC"
        ))?;
        let rows = stmt.query_map([], health_from_row)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    /// Probe history for one node, oldest first.
    pub fn list_probes(&self, site_health_id: NodeId) -> Result<Vec<ProbeRecord>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, site_health_id, request_time_ms, dt_performed
             FROM site_probe WHERE site_health_id=? ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![site_health_id], |r| {
            Ok(ProbeRecord {
                id: r.get(0)?,
                site_health_id: r.get(1)?,
                request_time_ms: r.get(2)?,
                dt_performed: r.get(3)?,
            })
        })?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }
}
