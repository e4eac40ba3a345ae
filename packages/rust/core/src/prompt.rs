//! First-contact outreach prompt.

use onleads_shared::Lead;

use crate::generation::GenerationRequest;

const SYSTEM_PROMPT: &str = "You write short, personal B2B outreach emails. \
Answer with a JSON object with exactly two string fields: \"object\" (the email subject) \
and \"body\" (the email text).";

const READY_TO_SEND: &str = "Create a complete, ready-to-send email. Do not include any \
placeholders or template variables. The email must be usable without any modifications.";

/// Compose the generation request for a first-contact email to `lead`.
///
/// `companies` are display names; an empty list reads as "General".
pub fn first_contact_request(lead: &Lead, companies: &[String], operator_prompt: &str) -> GenerationRequest {
    let name = lead.name.as_deref().unwrap_or("the recipient");
    let profile = lead
        .profile
        .as_deref()
        .filter(|p| !p.trim().is_empty())
        .unwrap_or("no profile available");
    let company = if companies.is_empty() {
        "General".to_string()
    } else {
        companies.join(", ")
    };

    let prompt = format!(
        "Write an email to start a conversation with {name}, a person with this profile: {profile}, \
working at {company}.\n\n\
Open the email with their last name only, written with a capital initial and not in uppercase.\n\
If their field of work is not clear from the profile, stay general about how our project can help them.\n\n\
Return the email subject and text. The text must be ready to be sent, already filled in.\n\n\
{operator_prompt}\n\n\
{READY_TO_SEND}",
        operator_prompt = operator_prompt.trim(),
    );

    GenerationRequest {
        system: SYSTEM_PROMPT.to_string(),
        prompt,
    }
}
