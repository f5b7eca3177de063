pub const MIG_0001_INIT: &str = r#"
BEGIN;

CREATE TABLE site_health (
  id                INTEGER PRIMARY KEY AUTOINCREMENT,
  base_url          TEXT NOT NULL UNIQUE,
  dt_first_noticed  INTEGER NOT NULL,
  dt_last_probed    INTEGER,
  dt_last_seen      INTEGER,
  health_score      INTEGER NOT NULL DEFAULT 0
                    CHECK (health_score BETWEEN -100 AND 100),
  name              TEXT,
  version           TEXT,
  plugins           TEXT,
  reg_policy        TEXT,
  info              TEXT,
  admin_name        TEXT,
  admin_profile     TEXT,
  ssl_state         INTEGER CHECK (ssl_state IN (0,1)),
  no_scrape_url     TEXT
);

CREATE TABLE site_probe (
  id                INTEGER PRIMARY KEY AUTOINCREMENT,
  site_health_id    INTEGER NOT NULL REFERENCES site_health(id) ON DELETE CASCADE,
  request_time_ms   INTEGER NOT NULL,
  dt_performed      INTEGER NOT NULL
);

CREATE INDEX idx_probe_site ON site_probe(site_health_id);

COMMIT;
"#;
