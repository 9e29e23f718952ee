//! SQL schema for the pagefacts SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS schemas (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    name        TEXT NOT NULL UNIQUE,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS schema_pages (
    page_id     INTEGER NOT NULL,
    schema_id   INTEGER NOT NULL REFERENCES schemas(id),
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL,
    PRIMARY KEY (page_id, schema_id)
);

-- One row per concrete path; shared by every page of the schema.
CREATE TABLE IF NOT EXISTS props (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    schema_id     INTEGER NOT NULL REFERENCES schemas(id),
    path          TEXT NOT NULL,
    path_no_index TEXT NOT NULL,
    path_parent   TEXT NOT NULL,   -- concrete path of the owning instance
    table_id      INTEGER NOT NULL, -- storage class, 1..8
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL,
    UNIQUE (schema_id, path)
);

-- One row per property shape.
CREATE TABLE IF NOT EXISTS prop_tables (
    schema_id     INTEGER NOT NULL REFERENCES schemas(id),
    table_id      INTEGER NOT NULL,
    path_no_index TEXT NOT NULL,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL,
    UNIQUE (schema_id, path_no_index)
);

CREATE TABLE IF NOT EXISTS values_text (
    page_id    INTEGER NOT NULL,
    prop_id    INTEGER NOT NULL REFERENCES props(id),
    value      TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS values_textarea (
    page_id    INTEGER NOT NULL,
    prop_id    INTEGER NOT NULL REFERENCES props(id),
    value      TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS values_date (
    page_id    INTEGER NOT NULL,
    prop_id    INTEGER NOT NULL REFERENCES props(id),
    value      TEXT NOT NULL,   -- YYYY-MM-DD
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS values_datetime (
    page_id    INTEGER NOT NULL,
    prop_id    INTEGER NOT NULL REFERENCES props(id),
    value      TEXT NOT NULL,   -- YYYY-MM-DD HH:MM:SS
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS values_time (
    page_id    INTEGER NOT NULL,
    prop_id    INTEGER NOT NULL REFERENCES props(id),
    value      TEXT NOT NULL,   -- HH:MM:SS
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS values_integer (
    page_id    INTEGER NOT NULL,
    prop_id    INTEGER NOT NULL REFERENCES props(id),
    value      INTEGER NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS values_numeric (
    page_id    INTEGER NOT NULL,
    prop_id    INTEGER NOT NULL REFERENCES props(id),
    value      REAL NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS values_boolean (
    page_id    INTEGER NOT NULL,
    prop_id    INTEGER NOT NULL REFERENCES props(id),
    value      INTEGER NOT NULL,  -- 0 | 1
    created_at TEXT NOT NULL
);

-- Generic dependency registrations; schema_id is NULL for a placeholder.
CREATE TABLE IF NOT EXISTS links (
    page_id    INTEGER NOT NULL,
    type       TEXT NOT NULL,     -- 'query' | 'template'
    schema_id  INTEGER REFERENCES schemas(id),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Host mirror: titles and categories used by subject conditions.
CREATE TABLE IF NOT EXISTS pages (
    page_id    INTEGER PRIMARY KEY,
    title      TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS page_categories (
    page_id  INTEGER NOT NULL,
    category TEXT NOT NULL,
    PRIMARY KEY (page_id, category)
);

CREATE INDEX IF NOT EXISTS props_shape_idx       ON props(schema_id, path_no_index);
CREATE INDEX IF NOT EXISTS values_text_idx       ON values_text(page_id, prop_id);
CREATE INDEX IF NOT EXISTS values_textarea_idx   ON values_textarea(page_id, prop_id);
CREATE INDEX IF NOT EXISTS values_date_idx       ON values_date(page_id, prop_id);
CREATE INDEX IF NOT EXISTS values_datetime_idx   ON values_datetime(page_id, prop_id);
CREATE INDEX IF NOT EXISTS values_time_idx       ON values_time(page_id, prop_id);
CREATE INDEX IF NOT EXISTS values_integer_idx    ON values_integer(page_id, prop_id);
CREATE INDEX IF NOT EXISTS values_numeric_idx    ON values_numeric(page_id, prop_id);
CREATE INDEX IF NOT EXISTS values_boolean_idx    ON values_boolean(page_id, prop_id);
CREATE INDEX IF NOT EXISTS links_schema_idx      ON links(schema_id, type);
CREATE INDEX IF NOT EXISTS page_categories_idx   ON page_categories(category);

PRAGMA user_version = 1;
";
