//! SQL schema for the Cetus SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS taxa (
    taxon_id      INTEGER PRIMARY KEY,
    name          TEXT NOT NULL,
    common_names  TEXT NOT NULL DEFAULT '[]',   -- JSON array
    rank          TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS gear_attributes (
    gear_attribute_id INTEGER PRIMARY KEY,
    name              TEXT NOT NULL UNIQUE
);

-- Supertype edges of every hierarchy; `kind` says which node table the ids
-- belong to ('taxon' | 'gear_attribute').
CREATE TABLE IF NOT EXISTS dag_edges (
    kind          TEXT NOT NULL,
    subtype_id    INTEGER NOT NULL,
    supertype_id  INTEGER NOT NULL,
    PRIMARY KEY (kind, subtype_id, supertype_id),
    CHECK (subtype_id != supertype_id)
);

CREATE TABLE IF NOT EXISTS animals (
    animal_id              INTEGER PRIMARY KEY,
    field_number           TEXT UNIQUE,
    name                   TEXT,
    determined_taxon       INTEGER REFERENCES taxa(taxon_id),
    determined_gender      TEXT,           -- 'f' | 'm'
    determined_dead_before TEXT,           -- YYYY-MM-DD
    carcass_disposed       INTEGER,
    partial_necropsy       INTEGER NOT NULL DEFAULT 0,
    necropsy               INTEGER NOT NULL DEFAULT 0,
    cause_of_death         TEXT
);

CREATE TABLE IF NOT EXISTS observations (
    observation_id     INTEGER PRIMARY KEY,
    animal_id          INTEGER NOT NULL REFERENCES animals(animal_id),
    datetime_observed  TEXT NOT NULL,      -- uncertain-datetime sort key
    datetime_reported  TEXT,               -- uncertain-datetime sort key
    taxon_id           INTEGER REFERENCES taxa(taxon_id),
    gender             TEXT,
    animal_description TEXT,
    gear_present       INTEGER,
    gear_retrieved     INTEGER
);

-- Issued yearly numbers. Rows are never updated or deleted.
CREATE TABLE IF NOT EXISTS year_case_numbers (
    entry_id  INTEGER PRIMARY KEY,
    year      INTEGER NOT NULL,
    number    INTEGER NOT NULL,
    case_id   INTEGER NOT NULL,
    UNIQUE (year, number)
);

CREATE TABLE IF NOT EXISTS cases (
    case_id           INTEGER PRIMARY KEY,
    animal_id         INTEGER NOT NULL REFERENCES animals(animal_id),
    case_type         TEXT NOT NULL,       -- discriminant of CaseDetail
    detail_json       TEXT NOT NULL,       -- JSON payload (inner data only)
    validity          TEXT NOT NULL DEFAULT 'suspected',
    happened_after    TEXT,
    human_interaction TEXT NOT NULL DEFAULT 'unk',
    ole_investigation INTEGER,
    si_n_m            TEXT NOT NULL DEFAULT '{}',
    import_notes      TEXT NOT NULL DEFAULT '',
    -- derived
    date              TEXT,                -- uncertain-datetime sort key
    current_year      INTEGER,
    current_number    INTEGER,
    names             TEXT NOT NULL DEFAULT '',
    merged_into       INTEGER REFERENCES cases(case_id),
    FOREIGN KEY (current_year, current_number)
        REFERENCES year_case_numbers(year, number)
);

CREATE TABLE IF NOT EXISTS case_observations (
    case_id        INTEGER NOT NULL REFERENCES cases(case_id),
    observation_id INTEGER NOT NULL REFERENCES observations(observation_id)
                   ON DELETE CASCADE,
    PRIMARY KEY (case_id, observation_id)
);

-- One row per merge, append-only. The source case stays, marked merged_into.
CREATE TABLE IF NOT EXISTS case_merges (
    source_id      INTEGER PRIMARY KEY REFERENCES cases(case_id),
    destination_id INTEGER NOT NULL REFERENCES cases(case_id),
    recorded_at    TEXT NOT NULL,
    CHECK (source_id != destination_id)
);

CREATE INDEX IF NOT EXISTS dag_edges_supertype_idx   ON dag_edges(kind, supertype_id);
CREATE INDEX IF NOT EXISTS observations_animal_idx   ON observations(animal_id);
CREATE INDEX IF NOT EXISTS cases_animal_idx          ON cases(animal_id);
CREATE INDEX IF NOT EXISTS cases_date_idx            ON cases(date);
CREATE INDEX IF NOT EXISTS year_case_numbers_case_idx ON year_case_numbers(case_id);
CREATE INDEX IF NOT EXISTS case_observations_obs_idx ON case_observations(observation_id);
CREATE INDEX IF NOT EXISTS case_merges_dest_idx      ON case_merges(destination_id);

PRAGMA user_version = 1;
";
