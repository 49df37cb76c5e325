//! SQL schema for the engagement SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- One pipeline entry per company.
CREATE TABLE IF NOT EXISTS leads (
    lead_id     TEXT PRIMARY KEY,
    company_id  TEXT NOT NULL UNIQUE,
    stage       TEXT NOT NULL DEFAULT 'new_lead',
    notes       TEXT,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

-- The activity ledger is strictly append-only.
-- No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS activity_log (
    activity_id  TEXT PRIMARY KEY,
    session_id   TEXT,              -- work session, if any
    lead_id      TEXT NOT NULL,
    company_id   TEXT NOT NULL,
    user_name    TEXT NOT NULL,
    action       TEXT NOT NULL,     -- raw client string, known or not
    action_data  TEXT NOT NULL DEFAULT '{}',
    created_at   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS work_sessions (
    session_id       TEXT PRIMARY KEY,
    user_name        TEXT NOT NULL,
    start_time       TEXT NOT NULL,
    end_time         TEXT,
    leads_processed  INTEGER NOT NULL DEFAULT 0,
    calls_made       INTEGER NOT NULL DEFAULT 0,
    contacts_made    INTEGER NOT NULL DEFAULT 0,
    voicemails_left  INTEGER NOT NULL DEFAULT 0
);

-- At most one open session per agent.
CREATE UNIQUE INDEX IF NOT EXISTS work_sessions_open_idx
    ON work_sessions(user_name) WHERE end_time IS NULL;

-- One row per (visitor session, company). Only the tail fields
-- (total_time_seconds, page_interactions, visit_end_time) are ever updated.
CREATE TABLE IF NOT EXISTS visit_sessions (
    visit_id            TEXT PRIMARY KEY,
    session_id          TEXT NOT NULL,
    company_id          TEXT NOT NULL,
    company_slug        TEXT,
    template_key        TEXT NOT NULL,
    user_agent          TEXT,
    referrer            TEXT,
    device_type         TEXT NOT NULL,   -- 'desktop' | 'mobile' | 'tablet'
    browser_name        TEXT NOT NULL,
    total_time_seconds  INTEGER NOT NULL DEFAULT 0,
    page_interactions   INTEGER NOT NULL DEFAULT 1,
    visit_start_time    TEXT NOT NULL,
    visit_end_time      TEXT,
    visit_date          TEXT NOT NULL,   -- YYYY-MM-DD (UTC) of visit_start_time
    is_initial_visit    INTEGER NOT NULL DEFAULT 1,
    UNIQUE (session_id, company_id),
    CHECK  (total_time_seconds BETWEEN 0 AND 1800)
);

CREATE TABLE IF NOT EXISTS daily_analytics (
    company_id          TEXT NOT NULL,
    date                TEXT NOT NULL,
    total_views         INTEGER NOT NULL,
    unique_sessions     INTEGER NOT NULL,
    mobile_percentage   REAL NOT NULL,
    total_time_seconds  INTEGER NOT NULL,
    top_referrer        TEXT,
    updated_at          TEXT NOT NULL,
    PRIMARY KEY (company_id, date)
);

CREATE TABLE IF NOT EXISTS lead_tags (
    tag_id      TEXT PRIMARY KEY,
    lead_id     TEXT NOT NULL REFERENCES leads(lead_id),
    tag_type    TEXT NOT NULL,
    metadata    TEXT NOT NULL DEFAULT '{}',
    created_by  TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    UNIQUE (lead_id, tag_type)
);

CREATE TABLE IF NOT EXISTS sequence_counters (
    company_id   TEXT NOT NULL,
    kind         TEXT NOT NULL,      -- 'invoice' | 'estimate'
    next_number  INTEGER NOT NULL,
    updated_at   TEXT NOT NULL,
    PRIMARY KEY (company_id, kind)
);

CREATE INDEX IF NOT EXISTS activity_lead_idx    ON activity_log(lead_id);
CREATE INDEX IF NOT EXISTS activity_session_idx ON activity_log(session_id);
CREATE INDEX IF NOT EXISTS visit_day_idx        ON visit_sessions(company_id, visit_date);

PRAGMA user_version = 1;
";
