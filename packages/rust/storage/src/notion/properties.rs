//! Notion page property encoding and decoding.
//!
//! Property names and types are fixed by the CRM databases:
//!
//! | Lead             | type        | Email          | type      |
//! |------------------|-------------|----------------|-----------|
//! | `Name`           | title       | `Object`       | title     |
//! | `Contact_Status` | select      | `Recipient`    | relation  |
//! | `Profile`        | rich_text   | `Text`         | rich_text |
//! | `Linkedin`       | url         | `Email_Status` | select    |
//! | `Company`        | relation    | `Type`         | select    |
//! | `ID`             | unique_id   |                |           |
//! | `Emails`         | relation    |                |           |
//! | `Email_Address`  | email       |                |           |

use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};

use onleads_shared::{
    ContactStatus, Email, EmailStatus, EmailType, Lead, LeadId, LeadUpdate, NewEmail, NewLead,
    RecordId, StoreError, normalize_email,
};

use crate::StoreResult;

pub(crate) const NAME: &str = "Name";
pub(crate) const CONTACT_STATUS: &str = "Contact_Status";
pub(crate) const PROFILE: &str = "Profile";
pub(crate) const LINKEDIN: &str = "Linkedin";
pub(crate) const COMPANY: &str = "Company";
pub(crate) const ID: &str = "ID";
pub(crate) const EMAILS: &str = "Emails";
pub(crate) const EMAIL_ADDRESS: &str = "Email_Address";

pub(crate) const OBJECT: &str = "Object";
pub(crate) const RECIPIENT: &str = "Recipient";
pub(crate) const TEXT: &str = "Text";
pub(crate) const EMAIL_STATUS: &str = "Email_Status";
pub(crate) const TYPE: &str = "Type";

/// Notion's limit on a single rich-text segment.
pub(crate) const MAX_SEGMENT_CHARS: usize = 2000;

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Split `text` into rich-text segments of at most 2000 characters.
pub(crate) fn rich_text_segments(text: &str) -> Value {
    let chars: Vec<char> = text.chars().collect();
    let segments: Vec<Value> = chars
        .chunks(MAX_SEGMENT_CHARS)
        .map(|chunk| json!({ "type": "text", "text": { "content": chunk.iter().collect::<String>() } }))
        .collect();
    Value::Array(segments)
}

fn title(text: &str) -> Value {
    json!({ "title": rich_text_segments(text) })
}

fn rich_text(text: &str) -> Value {
    json!({ "rich_text": rich_text_segments(text) })
}

fn select(name: &str) -> Value {
    json!({ "select": { "name": name } })
}

pub(crate) fn relation(ids: &[RecordId]) -> Value {
    let items: Vec<Value> = ids.iter().map(|id| json!({ "id": id.as_str() })).collect();
    json!({ "relation": items })
}

pub(crate) fn encode_new_lead(lead: &NewLead) -> Value {
    let mut props = Map::new();
    props.insert(
        NAME.into(),
        title(lead.name.as_deref().unwrap_or_default()),
    );
    props.insert(
        CONTACT_STATUS.into(),
        select(lead.contact_status.as_ref().map_or("New", ContactStatus::as_str)),
    );
    if let Some(profile) = lead.profile.as_deref().filter(|p| !p.is_empty()) {
        props.insert(PROFILE.into(), rich_text(profile));
    }
    if let Some(address) = lead.email_address.as_deref() {
        props.insert(EMAIL_ADDRESS.into(), json!({ "email": normalize_email(address) }));
    }
    if let Some(url) = lead.source_url.as_deref() {
        props.insert(LINKEDIN.into(), json!({ "url": url }));
    }
    Value::Object(props)
}

pub(crate) fn encode_lead_update(update: &LeadUpdate) -> Value {
    let mut props = Map::new();
    if let Some(name) = update.name.as_deref() {
        props.insert(NAME.into(), title(name));
    }
    if let Some(profile) = update.profile.as_deref() {
        props.insert(PROFILE.into(), rich_text(profile));
    }
    if let Some(url) = update.source_url.as_deref() {
        props.insert(LINKEDIN.into(), json!({ "url": url }));
    }
    if let Some(status) = &update.contact_status {
        props.insert(CONTACT_STATUS.into(), select(status.as_str()));
    }
    Value::Object(props)
}

pub(crate) fn encode_new_email(email: &NewEmail) -> Value {
    json!({
        OBJECT: title(&email.object),
        TEXT: rich_text(&email.text),
        TYPE: select(email.email_type.as_str()),
        EMAIL_STATUS: select(email.email_status.as_str()),
        RECIPIENT: relation(std::slice::from_ref(&email.recipient)),
    })
}

pub(crate) fn encode_email_status(status: EmailStatus) -> Value {
    json!({ EMAIL_STATUS: select(status.as_str()) })
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

fn page_id(page: &Value) -> StoreResult<RecordId> {
    page.get("id")
        .and_then(Value::as_str)
        .map(RecordId::from)
        .ok_or_else(|| StoreError::SchemaViolation("page has no id".into()))
}

fn properties(page: &Value) -> StoreResult<&Map<String, Value>> {
    page.get("properties")
        .and_then(Value::as_object)
        .ok_or_else(|| StoreError::SchemaViolation("page has no properties".into()))
}

fn property<'a>(props: &'a Map<String, Value>, name: &str) -> StoreResult<&'a Value> {
    props
        .get(name)
        .ok_or_else(|| StoreError::SchemaViolation(format!("missing property '{name}'")))
}

/// Concatenated `plain_text` of a title or rich_text array. Empty → `None`.
fn plain_text(prop: &Value, kind: &str) -> Option<String> {
    let text: String = prop
        .get(kind)?
        .as_array()?
        .iter()
        .filter_map(|seg| {
            seg.get("plain_text")
                .or_else(|| seg.pointer("/text/content"))
                .and_then(Value::as_str)
        })
        .collect();
    (!text.is_empty()).then_some(text)
}

fn select_name(prop: &Value) -> Option<&str> {
    prop.get("select")?.get("name")?.as_str()
}

pub(crate) fn relation_ids(prop: &Value) -> Vec<RecordId> {
    prop.get("relation")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("id").and_then(Value::as_str))
                .map(RecordId::from)
                .collect()
        })
        .unwrap_or_default()
}

/// Related page id of one item in a property-item list response.
pub(crate) fn relation_item_id(item: &Value) -> Option<RecordId> {
    item.pointer("/relation/id")
        .and_then(Value::as_str)
        .map(RecordId::from)
}

fn optional_string(props: &Map<String, Value>, name: &str, kind: &str) -> Option<String> {
    props
        .get(name)
        .and_then(|p| p.get(kind))
        .and_then(Value::as_str)
        .map(str::to_string)
}

pub(crate) fn decode_lead(page: &Value) -> StoreResult<Lead> {
    let record_id = page_id(page)?;
    let props = properties(page)?;

    let id = property(props, ID)?
        .pointer("/unique_id/number")
        .and_then(Value::as_u64)
        .ok_or_else(|| {
            StoreError::SchemaViolation(format!("lead {record_id}: ID is not a unique_id number"))
        })?;

    // An unset status reads as New; options we don't manage are kept as-is.
    let contact_status = props
        .get(CONTACT_STATUS)
        .and_then(select_name)
        .map_or(ContactStatus::New, ContactStatus::from_crm);

    Ok(Lead {
        id: LeadId(id),
        name: props.get(NAME).and_then(|p| plain_text(p, "title")),
        profile: props.get(PROFILE).and_then(|p| plain_text(p, "rich_text")),
        email_address: optional_string(props, EMAIL_ADDRESS, "email").map(|e| normalize_email(&e)),
        source_url: optional_string(props, LINKEDIN, "url"),
        contact_status,
        company: props.get(COMPANY).map(relation_ids).unwrap_or_default(),
        emails: props.get(EMAILS).map(relation_ids).unwrap_or_default(),
        record_id,
    })
}

pub(crate) fn decode_email(page: &Value) -> StoreResult<Email> {
    let id = page_id(page)?;
    let props = properties(page)?;

    let type_name = select_name(property(props, TYPE)?)
        .ok_or_else(|| StoreError::SchemaViolation(format!("email {id}: Type is empty")))?;
    let email_type = EmailType::parse(type_name).ok_or_else(|| {
        StoreError::SchemaViolation(format!("email {id}: unknown Type '{type_name}'"))
    })?;

    let status_name = select_name(property(props, EMAIL_STATUS)?)
        .ok_or_else(|| StoreError::SchemaViolation(format!("email {id}: Email_Status is empty")))?;
    let email_status = EmailStatus::parse(status_name).ok_or_else(|| {
        StoreError::SchemaViolation(format!("email {id}: unknown Email_Status '{status_name}'"))
    })?;

    let recipient = relation_ids(property(props, RECIPIENT)?)
        .into_iter()
        .next()
        .ok_or_else(|| StoreError::SchemaViolation(format!("email {id}: no Recipient")))?;

    Ok(Email {
        object: props
            .get(OBJECT)
            .and_then(|p| plain_text(p, "title"))
            .unwrap_or_default(),
        text: props
            .get(TEXT)
            .and_then(|p| plain_text(p, "rich_text"))
            .unwrap_or_default(),
        email_type,
        email_status,
        recipient,
        created_at: page
            .get("created_time")
            .and_then(Value::as_str)
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .map(|t| t.with_timezone(&Utc)),
        id,
    })
}

/// Title of any page, for resolving relation targets to names.
pub(crate) fn page_title(page: &Value) -> Option<String> {
    page.get("properties")?
        .as_object()?
        .values()
        .find(|prop| prop.get("type").and_then(Value::as_str) == Some("title") || prop.get("title").is_some())
        .and_then(|prop| plain_text(prop, "title"))
}
