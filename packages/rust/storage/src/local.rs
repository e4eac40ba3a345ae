//! libSQL-backed CRM store (offline mode).

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database, Row, Value, params};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use onleads_shared::{
    ContactStatus, Email, EmailStatus, EmailType, Lead, LeadId, LeadUpdate, NewEmail, NewLead,
    OnLeadsError, RecordId, Result, StoreError, normalize_email,
};

use crate::migrations;
use crate::{EmailStore, LeadStore, StoreResult};

const LEAD_COLUMNS: &str =
    "id, record_id, name, profile, email_address, source_url, contact_status";

const EMAIL_COLUMNS: &str =
    "record_id, object, text, email_type, email_status, recipient, created_at";

/// CRM store in a local libSQL database file.
pub struct LocalStore {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl LocalStore {
    /// Open or create a database at `path` and apply pending migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| OnLeadsError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(db_err)?;
        let conn = db.connect().map_err(db_err)?;

        let store = Self { db, conn };
        store.run_migrations().await?;
        info!(path = %path.display(), "local store ready");
        Ok(store)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    StoreError::Unavailable(format!(
                        "migration v{} failed: {e}",
                        migration.version
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => match rows.next().await {
                Ok(Some(row)) => row.get::<u32>(0).unwrap_or(0),
                _ => 0,
            },
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Replace the company references of a lead.
    #[cfg(test)]
    pub(crate) async fn set_companies(&self, lead: &RecordId, companies: &[String]) -> StoreResult<()> {
        self.require_lead(lead).await?;
        self.conn
            .execute(
                "DELETE FROM lead_companies WHERE lead_record_id = ?1",
                params![lead.as_str()],
            )
            .await
            .map_err(db_err)?;

        for (position, company) in companies.iter().enumerate() {
            self.conn
                .execute(
                    "INSERT OR IGNORE INTO lead_companies (lead_record_id, company, position)
                     VALUES (?1, ?2, ?3)",
                    params![lead.as_str(), company.as_str(), position as i64],
                )
                .await
                .map_err(db_err)?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Row helpers
    // -----------------------------------------------------------------------

    async fn query_leads(&self, sql: &str, args: Vec<Value>) -> StoreResult<Vec<Lead>> {
        let mut leads = Vec::new();
        {
            let mut rows = self.conn.query(sql, args).await.map_err(db_err)?;
            while let Some(row) = rows.next().await.map_err(db_err)? {
                leads.push(row_to_lead(&row)?);
            }
        }

        for lead in &mut leads {
            lead.emails = self
                .related(
                    "SELECT email_record_id FROM lead_emails WHERE lead_record_id = ?1 ORDER BY position",
                    &lead.record_id,
                )
                .await?;
            lead.company = self
                .related(
                    "SELECT company FROM lead_companies WHERE lead_record_id = ?1 ORDER BY position",
                    &lead.record_id,
                )
                .await?;
        }
        Ok(leads)
    }

    async fn lead_by_record(&self, record: &RecordId) -> StoreResult<Option<Lead>> {
        let sql = format!("SELECT {LEAD_COLUMNS} FROM leads WHERE record_id = ?1");
        let mut leads = self
            .query_leads(&sql, vec![Value::from(record.as_str())])
            .await?;
        Ok(leads.pop())
    }

    async fn require_lead(&self, record: &RecordId) -> StoreResult<Lead> {
        self.lead_by_record(record)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("lead record {record}")))
    }

    async fn related(&self, sql: &str, record: &RecordId) -> StoreResult<Vec<RecordId>> {
        let mut rows = self
            .conn
            .query(sql, params![record.as_str()])
            .await
            .map_err(db_err)?;

        let mut ids = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            ids.push(RecordId(row.get::<String>(0).map_err(db_err)?));
        }
        Ok(ids)
    }

    async fn email_by_record(&self, record: &RecordId) -> StoreResult<Option<Email>> {
        let sql = format!("SELECT {EMAIL_COLUMNS} FROM emails WHERE record_id = ?1");
        let mut rows = self
            .conn
            .query(&sql, params![record.as_str()])
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(Some(row_to_email(&row)?)),
            None => Ok(None),
        }
    }
}

// ---------------------------------------------------------------------------
// LeadStore
// ---------------------------------------------------------------------------

#[async_trait]
impl LeadStore for LocalStore {
    async fn find_lead_by_email(&self, address: &str) -> StoreResult<Option<Lead>> {
        let sql = format!(
            "SELECT {LEAD_COLUMNS} FROM leads WHERE email_address = ?1 ORDER BY id LIMIT 1"
        );
        let mut leads = self
            .query_leads(&sql, vec![Value::from(normalize_email(address))])
            .await?;
        Ok(leads.pop())
    }

    async fn get_lead(&self, id: LeadId) -> StoreResult<Option<Lead>> {
        let Ok(raw) = i64::try_from(id.0) else {
            return Ok(None);
        };
        let sql = format!("SELECT {LEAD_COLUMNS} FROM leads WHERE id = ?1");
        let mut leads = self.query_leads(&sql, vec![Value::from(raw)]).await?;
        Ok(leads.pop())
    }

    async fn list_leads(&self, status: Option<ContactStatus>) -> StoreResult<Vec<Lead>> {
        match status {
            Some(status) => {
                let sql = format!(
                    "SELECT {LEAD_COLUMNS} FROM leads WHERE contact_status = ?1 ORDER BY id"
                );
                self.query_leads(&sql, vec![Value::from(status.as_str())])
                    .await
            }
            None => {
                let sql = format!("SELECT {LEAD_COLUMNS} FROM leads ORDER BY id");
                self.query_leads(&sql, Vec::new()).await
            }
        }
    }

    #[instrument(skip_all)]
    async fn create_lead(&self, lead: NewLead) -> StoreResult<Lead> {
        let record_id = RecordId(Uuid::now_v7().to_string());
        let now = Utc::now().to_rfc3339();
        let status = lead.contact_status.unwrap_or(ContactStatus::New);
        let email_address = lead.email_address.as_deref().map(normalize_email);

        self.conn
            .execute(
                "INSERT INTO leads (record_id, name, profile, email_address, source_url, contact_status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    record_id.as_str(),
                    lead.name.as_deref(),
                    lead.profile.as_deref(),
                    email_address.as_deref(),
                    lead.source_url.as_deref(),
                    status.as_str(),
                    now.as_str(),
                    now.as_str(),
                ],
            )
            .await
            .map_err(db_err)?;

        let created = self.require_lead(&record_id).await?;
        debug!(lead_id = %created.id, "lead created");
        Ok(created)
    }

    #[instrument(skip_all, fields(%record))]
    async fn update_lead(&self, record: &RecordId, update: LeadUpdate) -> StoreResult<Lead> {
        let now = Utc::now().to_rfc3339();
        let changed = self
            .conn
            .execute(
                "UPDATE leads SET
                   name = COALESCE(?1, name),
                   profile = COALESCE(?2, profile),
                   source_url = COALESCE(?3, source_url),
                   contact_status = COALESCE(?4, contact_status),
                   updated_at = ?5
                 WHERE record_id = ?6",
                params![
                    update.name.as_deref(),
                    update.profile.as_deref(),
                    update.source_url.as_deref(),
                    update.contact_status.as_ref().map(ContactStatus::as_str),
                    now.as_str(),
                    record.as_str(),
                ],
            )
            .await
            .map_err(db_err)?;

        if changed == 0 {
            return Err(StoreError::NotFound(format!("lead record {record}")));
        }
        self.require_lead(record).await
    }

    #[instrument(skip_all, fields(%lead, %email))]
    async fn link_email_to_lead(&self, lead: &RecordId, email: &RecordId) -> StoreResult<()> {
        self.require_lead(lead).await?;
        if self.email_by_record(email).await?.is_none() {
            return Err(StoreError::NotFound(format!("email record {email}")));
        }

        self.conn
            .execute(
                "INSERT OR IGNORE INTO lead_emails (lead_record_id, email_record_id, position)
                 VALUES (?1, ?2, (SELECT COALESCE(MAX(position), 0) + 1 FROM lead_emails WHERE lead_record_id = ?1))",
                params![lead.as_str(), email.as_str()],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// EmailStore
// ---------------------------------------------------------------------------

#[async_trait]
impl EmailStore for LocalStore {
    #[instrument(skip_all, fields(recipient = %email.recipient))]
    async fn create_email(&self, email: NewEmail) -> StoreResult<Email> {
        self.require_lead(&email.recipient).await?;

        let record_id = RecordId(Uuid::now_v7().to_string());
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO emails (record_id, object, text, email_type, email_status, recipient, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record_id.as_str(),
                    email.object.as_str(),
                    email.text.as_str(),
                    email.email_type.as_str(),
                    email.email_status.as_str(),
                    email.recipient.as_str(),
                    now.as_str(),
                ],
            )
            .await
            .map_err(db_err)?;

        self.email_by_record(&record_id)
            .await?
            .ok_or_else(|| StoreError::Unavailable(format!("email {record_id} vanished after insert")))
    }

    async fn find_emails_for_lead(
        &self,
        lead: &RecordId,
        email_type: Option<EmailType>,
    ) -> StoreResult<Vec<Email>> {
        let sql = format!(
            "SELECT {EMAIL_COLUMNS} FROM emails
             WHERE recipient = ?1 AND (?2 IS NULL OR email_type = ?2)
             ORDER BY created_at, record_id"
        );
        let mut rows = self
            .conn
            .query(&sql, params![lead.as_str(), email_type.map(|t| t.as_str())])
            .await
            .map_err(db_err)?;

        let mut emails = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            emails.push(row_to_email(&row)?);
        }
        Ok(emails)
    }

    async fn set_email_status(&self, email: &RecordId, status: EmailStatus) -> StoreResult<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE emails SET email_status = ?1 WHERE record_id = ?2",
                params![status.as_str(), email.as_str()],
            )
            .await
            .map_err(db_err)?;

        if changed == 0 {
            return Err(StoreError::NotFound(format!("email record {email}")));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

fn db_err(e: libsql::Error) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

/// Nullable text column.
fn opt_text(row: &Row, idx: i32) -> StoreResult<Option<String>> {
    match row.get_value(idx).map_err(db_err)? {
        Value::Null => Ok(None),
        Value::Text(text) => Ok(Some(text)),
        other => Err(StoreError::SchemaViolation(format!(
            "column {idx}: expected text, got {other:?}"
        ))),
    }
}

/// Lead columns of a row; relations are filled in by the caller.
fn row_to_lead(row: &Row) -> StoreResult<Lead> {
    let id = row.get::<i64>(0).map_err(db_err)?;
    let status_text = row.get::<String>(6).map_err(db_err)?;
    let contact_status = ContactStatus::from_crm(&status_text);

    Ok(Lead {
        id: LeadId(
            u64::try_from(id)
                .map_err(|_| StoreError::SchemaViolation(format!("negative lead id {id}")))?,
        ),
        record_id: RecordId(row.get::<String>(1).map_err(db_err)?),
        name: opt_text(row, 2)?,
        profile: opt_text(row, 3)?,
        email_address: opt_text(row, 4)?,
        source_url: opt_text(row, 5)?,
        contact_status,
        company: Vec::new(),
        emails: Vec::new(),
    })
}

fn row_to_email(row: &Row) -> StoreResult<Email> {
    let id = RecordId(row.get::<String>(0).map_err(db_err)?);
    let type_text = row.get::<String>(3).map_err(db_err)?;
    let status_text = row.get::<String>(4).map_err(db_err)?;
    let created_text = row.get::<String>(6).map_err(db_err)?;

    Ok(Email {
        object: row.get::<String>(1).map_err(db_err)?,
        text: row.get::<String>(2).map_err(db_err)?,
        email_type: EmailType::parse(&type_text).ok_or_else(|| {
            StoreError::SchemaViolation(format!("email {id}: unknown type '{type_text}'"))
        })?,
        email_status: EmailStatus::parse(&status_text).ok_or_else(|| {
            StoreError::SchemaViolation(format!("email {id}: unknown status '{status_text}'"))
        })?,
        recipient: RecordId(row.get::<String>(5).map_err(db_err)?),
        created_at: DateTime::parse_from_rfc3339(&created_text)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn temp_store() -> LocalStore {
        let path = std::env::temp_dir()
            .join(format!("onleads-test-{}", Uuid::now_v7()))
            .join("test.db");
        LocalStore::open(&path).await.unwrap()
    }

    fn new_lead(email: &str) -> NewLead {
        NewLead {
            name: Some("Jane Doe".into()),
            profile: Some("VP of Sales at Acme".into()),
            email_address: Some(email.into()),
            source_url: Some("https://acme.example.com/team".into()),
            contact_status: None,
        }
    }

    fn draft_for(lead: &Lead) -> NewEmail {
        NewEmail {
            object: "Hello".into(),
            text: "Dear Doe, ...".into(),
            email_type: EmailType::FirstContact,
            email_status: EmailStatus::Draft,
            recipient: lead.record_id.clone(),
        }
    }

    #[tokio::test]
    async fn open_creates_database() {
        let store = temp_store().await;
        assert!(store.list_leads(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reopening_keeps_schema_version() {
        let path = std::env::temp_dir()
            .join(format!("onleads-test-{}", Uuid::now_v7()))
            .join("test.db");
        let store = LocalStore::open(&path).await.unwrap();
        store.create_lead(new_lead("jane@example.com")).await.unwrap();
        drop(store);

        let store = LocalStore::open(&path).await.unwrap();
        assert_eq!(store.get_schema_version().await, 2);
        assert_eq!(store.list_leads(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn create_assigns_sequential_ids_and_new_status() {
        let store = temp_store().await;
        let first = store.create_lead(new_lead("a@acme.io")).await.unwrap();
        let second = store.create_lead(new_lead("b@acme.io")).await.unwrap();

        assert_eq!(first.id, LeadId(1));
        assert_eq!(second.id, LeadId(2));
        assert_eq!(first.contact_status, ContactStatus::New);
        assert_ne!(first.record_id, second.record_id);
    }

    #[tokio::test]
    async fn find_by_email_normalizes() {
        let store = temp_store().await;
        store.create_lead(new_lead("Jane@Example.com ")).await.unwrap();

        let found = store.find_lead_by_email("JANE@example.COM").await.unwrap().unwrap();
        assert_eq!(found.email_address.as_deref(), Some("jane@example.com"));
        assert!(store.find_lead_by_email("bob@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_only_touches_set_fields() {
        let store = temp_store().await;
        let lead = store.create_lead(new_lead("jane@example.com")).await.unwrap();

        let updated = store
            .update_lead(
                &lead.record_id,
                LeadUpdate {
                    contact_status: Some(ContactStatus::Contacted),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.contact_status, ContactStatus::Contacted);
        assert_eq!(updated.name.as_deref(), Some("Jane Doe"));
        assert_eq!(updated.profile.as_deref(), Some("VP of Sales at Acme"));
    }

    #[tokio::test]
    async fn update_unknown_record_is_not_found() {
        let store = temp_store().await;
        let err = store
            .update_lead(&RecordId::from("missing"), LeadUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn list_filters_by_status() {
        let store = temp_store().await;
        let a = store.create_lead(new_lead("a@acme.io")).await.unwrap();
        store.create_lead(new_lead("b@acme.io")).await.unwrap();
        store
            .update_lead(
                &a.record_id,
                LeadUpdate {
                    contact_status: Some(ContactStatus::Replied),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let fresh = store.list_leads(Some(ContactStatus::New)).await.unwrap();
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].email_address.as_deref(), Some("b@acme.io"));
        assert_eq!(store.list_leads(None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn unmanaged_status_reads_back_and_filters() {
        let store = temp_store().await;
        let lead = store.create_lead(new_lead("a@acme.io")).await.unwrap();
        store
            .conn
            .execute(
                "UPDATE leads SET contact_status = 'Lost' WHERE record_id = ?1",
                params![lead.record_id.as_str()],
            )
            .await
            .unwrap();

        let lead = store.get_lead(lead.id).await.unwrap().unwrap();
        assert_eq!(lead.contact_status, ContactStatus::Other("Lost".into()));
        let lost = store
            .list_leads(Some(ContactStatus::from_crm("Lost")))
            .await
            .unwrap();
        assert_eq!(lost.len(), 1);
        assert!(store.list_leads(Some(ContactStatus::New)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn emails_are_linked_once_in_order() {
        let store = temp_store().await;
        let lead = store.create_lead(new_lead("jane@example.com")).await.unwrap();
        let first = store.create_email(draft_for(&lead)).await.unwrap();
        let second = store.create_email(draft_for(&lead)).await.unwrap();

        store.link_email_to_lead(&lead.record_id, &first.id).await.unwrap();
        store.link_email_to_lead(&lead.record_id, &second.id).await.unwrap();
        store.link_email_to_lead(&lead.record_id, &first.id).await.unwrap();

        let lead = store.get_lead(lead.id).await.unwrap().unwrap();
        assert_eq!(lead.emails, vec![first.id, second.id]);
    }

    #[tokio::test]
    async fn email_requires_existing_recipient() {
        let store = temp_store().await;
        let err = store
            .create_email(NewEmail {
                object: "Hi".into(),
                text: "Body".into(),
                email_type: EmailType::FirstContact,
                email_status: EmailStatus::Draft,
                recipient: RecordId::from("nobody"),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn find_emails_filters_by_type_and_status_updates() {
        let store = temp_store().await;
        let lead = store.create_lead(new_lead("jane@example.com")).await.unwrap();
        let draft = store.create_email(draft_for(&lead)).await.unwrap();
        assert_eq!(draft.email_status, EmailStatus::Draft);
        assert!(draft.created_at.is_some());

        let first_contacts = store
            .find_emails_for_lead(&lead.record_id, Some(EmailType::FirstContact))
            .await
            .unwrap();
        assert_eq!(first_contacts.len(), 1);
        assert!(
            store
                .find_emails_for_lead(&lead.record_id, Some(EmailType::FollowUp))
                .await
                .unwrap()
                .is_empty()
        );

        store.set_email_status(&draft.id, EmailStatus::Sent).await.unwrap();
        let all = store.find_emails_for_lead(&lead.record_id, None).await.unwrap();
        assert_eq!(all[0].email_status, EmailStatus::Sent);

        let err = store
            .set_email_status(&RecordId::from("missing"), EmailStatus::Sent)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn companies_are_returned_as_names() {
        let store = temp_store().await;
        let lead = store.create_lead(new_lead("jane@example.com")).await.unwrap();
        store
            .set_companies(&lead.record_id, &["Acme".to_string(), "Initech".to_string()])
            .await
            .unwrap();

        let lead = store.get_lead(lead.id).await.unwrap().unwrap();
        assert_eq!(store.company_names(&lead).await.unwrap(), vec!["Acme", "Initech"]);
    }
}
