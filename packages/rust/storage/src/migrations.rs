//! SQL migration definitions for the local CRM database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: leads, emails, lead_emails",
            sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Leads. `id` is the human-facing number, `record_id` the relation handle.
CREATE TABLE IF NOT EXISTS leads (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    record_id      TEXT NOT NULL UNIQUE,
    name           TEXT,
    profile        TEXT,
    email_address  TEXT,
    source_url     TEXT,
    contact_status TEXT NOT NULL DEFAULT 'New',
    created_at     TEXT NOT NULL,
    updated_at     TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_leads_email ON leads(email_address);
CREATE INDEX IF NOT EXISTS idx_leads_status ON leads(contact_status);

-- Email drafts
CREATE TABLE IF NOT EXISTS emails (
    record_id    TEXT PRIMARY KEY,
    object       TEXT NOT NULL,
    text         TEXT NOT NULL,
    email_type   TEXT NOT NULL,
    email_status TEXT NOT NULL,
    recipient    TEXT NOT NULL REFERENCES leads(record_id),
    created_at   TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_emails_recipient ON emails(recipient);

-- Lead -> email relation, in link order
CREATE TABLE IF NOT EXISTS lead_emails (
    lead_record_id  TEXT NOT NULL REFERENCES leads(record_id) ON DELETE CASCADE,
    email_record_id TEXT NOT NULL REFERENCES emails(record_id) ON DELETE CASCADE,
    position        INTEGER NOT NULL,
    PRIMARY KEY (lead_record_id, email_record_id)
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Lead companies",
            sql: r#"
CREATE TABLE IF NOT EXISTS lead_companies (
    lead_record_id TEXT NOT NULL REFERENCES leads(record_id) ON DELETE CASCADE,
    company        TEXT NOT NULL,
    position       INTEGER NOT NULL,
    PRIMARY KEY (lead_record_id, company)
);

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}
