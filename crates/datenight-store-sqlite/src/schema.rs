//! SQL schema for the local date-night backend.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Message raised by the member-cap trigger. Clients classify on its text.
pub const COUPLE_FULL_MESSAGE: &str = "couple already has two members";

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS users (
    user_id     TEXT PRIMARY KEY,
    email       TEXT NOT NULL UNIQUE,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS couples (
    couple_id   TEXT PRIMARY KEY,
    created_at  TEXT NOT NULL,
    created_by  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS couple_members (
    couple_id   TEXT NOT NULL REFERENCES couples(couple_id),
    user_id     TEXT NOT NULL,
    joined_at   TEXT NOT NULL,
    UNIQUE (couple_id, user_id)
);

-- Authoritative cap. Re-inserting an existing member is left to the
-- UNIQUE constraint so that it reports as a duplicate, not as full.
CREATE TRIGGER IF NOT EXISTS couple_members_cap
BEFORE INSERT ON couple_members
WHEN (
    SELECT COUNT(*) FROM couple_members
    WHERE couple_id = NEW.couple_id AND user_id != NEW.user_id
) >= 2
BEGIN
    SELECT RAISE(ABORT, 'couple already has two members');
END;

CREATE TABLE IF NOT EXISTS entries (
    entry_id    TEXT PRIMARY KEY,
    couple_id   TEXT NOT NULL REFERENCES couples(couple_id),
    created_at  TEXT NOT NULL,   -- ISO 8601 UTC, noon of the display date
    title       TEXT NOT NULL CHECK (length(trim(title)) > 0),
    photo_path  TEXT,
    created_by  TEXT NOT NULL
);

-- Pending magic-link sign-ins. `auth_code` is minted on verification and
-- consumed by the code exchange.
CREATE TABLE IF NOT EXISTS auth_flows (
    token           TEXT PRIMARY KEY,
    email           TEXT NOT NULL,
    redirect_to     TEXT NOT NULL,
    context         TEXT NOT NULL,
    code_challenge  TEXT NOT NULL,
    created_at      TEXT NOT NULL,
    expires_at      TEXT NOT NULL,
    auth_code       TEXT UNIQUE,
    verified_at     TEXT,
    exchanged_at    TEXT
);

-- Per-browsing-context key/value storage (e.g. the PKCE code verifier).
CREATE TABLE IF NOT EXISTS context_storage (
    context     TEXT NOT NULL,
    key         TEXT NOT NULL,
    value       TEXT NOT NULL,
    PRIMARY KEY (context, key)
);

CREATE TABLE IF NOT EXISTS sessions (
    context       TEXT PRIMARY KEY,
    user_id       TEXT NOT NULL REFERENCES users(user_id),
    access_token  TEXT NOT NULL,
    created_at    TEXT NOT NULL,
    expires_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS photos (
    path          TEXT PRIMARY KEY,
    couple_id     TEXT NOT NULL REFERENCES couples(couple_id),
    content_type  TEXT NOT NULL,
    bytes         BLOB NOT NULL,
    uploaded_by   TEXT NOT NULL,
    created_at    TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS entries_couple_idx ON entries(couple_id, created_at);
CREATE INDEX IF NOT EXISTS members_user_idx   ON couple_members(user_id);

PRAGMA user_version = 1;
";
