//! SQL schema for the Vigil SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Reference entities. UNIQUE(name_normalized) is the enforcement backstop
-- for concurrent get_or_create calls on the same key.
CREATE TABLE IF NOT EXISTS companies (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    name            TEXT NOT NULL,
    name_normalized TEXT NOT NULL UNIQUE,
    count           INTEGER NOT NULL DEFAULT 1,
    first_seen      TEXT NOT NULL,   -- ISO 8601 date; immutable
    last_seen       TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS skills (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    name            TEXT NOT NULL,
    name_normalized TEXT NOT NULL UNIQUE,
    category        TEXT,
    count           INTEGER NOT NULL DEFAULT 1,
    first_seen      TEXT NOT NULL,
    last_seen       TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS requirements (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    name            TEXT NOT NULL,
    name_normalized TEXT NOT NULL UNIQUE,
    count           INTEGER NOT NULL DEFAULT 1,
    first_seen      TEXT NOT NULL,
    last_seen       TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS benefits (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    name            TEXT NOT NULL,
    name_normalized TEXT NOT NULL UNIQUE,
    count           INTEGER NOT NULL DEFAULT 1,
    first_seen      TEXT NOT NULL,
    last_seen       TEXT NOT NULL
);

-- The active table. At most one row per natural key.
CREATE TABLE IF NOT EXISTS listings (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    source         TEXT NOT NULL,
    source_id      TEXT NOT NULL,
    scope_query    TEXT NOT NULL DEFAULT '',
    scope_location TEXT NOT NULL DEFAULT '',
    url            TEXT,
    title          TEXT,
    company_id     INTEGER REFERENCES companies(id),
    location       TEXT,
    description    TEXT NOT NULL DEFAULT '[]',  -- JSON array of paragraphs
    price          REAL,
    price_m2       REAL,
    deadline       TEXT,             -- ISO 8601 date or NULL
    status         TEXT NOT NULL DEFAULT 'new',
    first_seen_at  TEXT NOT NULL,    -- ISO 8601 UTC; immutable
    last_seen_at   TEXT NOT NULL,
    UNIQUE (source, source_id)
);

-- Archive rows are written once by the archiver and never touched again.
CREATE TABLE IF NOT EXISTS listings_archive (
    id             INTEGER PRIMARY KEY,   -- same id as the active row held
    source         TEXT NOT NULL,
    source_id      TEXT NOT NULL,
    scope_query    TEXT NOT NULL DEFAULT '',
    scope_location TEXT NOT NULL DEFAULT '',
    url            TEXT,
    title          TEXT,
    company_id     INTEGER REFERENCES companies(id),
    location       TEXT,
    description    TEXT NOT NULL DEFAULT '[]',
    price          REAL,
    price_m2       REAL,
    deadline       TEXT,
    status         TEXT NOT NULL,
    first_seen_at  TEXT NOT NULL,
    last_seen_at   TEXT NOT NULL,
    archived_at    TEXT NOT NULL,
    close_reason   TEXT NOT NULL,    -- 'expired'|'closed'|'not_found'|'duplicate'
    lifetime_days  INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS listing_skills (
    listing_id INTEGER NOT NULL REFERENCES listings(id),
    skill_id   INTEGER NOT NULL REFERENCES skills(id),
    PRIMARY KEY (listing_id, skill_id)
);

CREATE TABLE IF NOT EXISTS listing_requirements (
    listing_id     INTEGER NOT NULL REFERENCES listings(id),
    requirement_id INTEGER NOT NULL REFERENCES requirements(id),
    PRIMARY KEY (listing_id, requirement_id)
);

CREATE TABLE IF NOT EXISTS listing_benefits (
    listing_id INTEGER NOT NULL REFERENCES listings(id),
    benefit_id INTEGER NOT NULL REFERENCES benefits(id),
    PRIMARY KEY (listing_id, benefit_id)
);

-- Strictly append-only. Keyed by natural key, not listing id, so the log
-- outlives archival of the listing.
CREATE TABLE IF NOT EXISTS price_history (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    source      TEXT NOT NULL,
    source_id   TEXT NOT NULL,
    price       REAL,
    price_m2    REAL,
    recorded_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS listings_source_idx   ON listings(source, source_id);
CREATE INDEX IF NOT EXISTS listings_status_idx   ON listings(status);
CREATE INDEX IF NOT EXISTS listings_company_idx  ON listings(company_id);
CREATE INDEX IF NOT EXISTS companies_name_idx    ON companies(name_normalized);
CREATE INDEX IF NOT EXISTS skills_name_idx       ON skills(name_normalized);
CREATE INDEX IF NOT EXISTS price_history_key_idx ON price_history(source, source_id);

PRAGMA user_version = 1;
";
