//! `contacts/*` — contact listing and vCard 3.0 import/export, backed by a
//! [`ContactsProvider`].

use std::sync::Arc;

use crate::error::AgentError;
use crate::http::request::ParsedRequest;
use crate::http::response::HttpResponse;
use crate::providers::{Contact, LabeledValue};
use crate::router::RoutedPath;
use crate::state::AppState;

pub async fn handle(
    request: &ParsedRequest,
    routed: &RoutedPath,
    state: &Arc<AppState>,
) -> Result<HttpResponse, AgentError> {
    let provider = &state.contacts_provider;

    match routed.action.as_str() {
        "list" => Ok(HttpResponse::ok(&provider.list())),
        "count" => Ok(HttpResponse::ok(&serde_json::json!({"count": provider.count()}))),
        "export-vcf" => {
            let vcf = export_vcf(&provider.list());
            Ok(HttpResponse::binary(200, "text/vcard", vcf.into_bytes())
                .with_header("Content-Disposition", "attachment; filename=\"contacts.vcf\""))
        }
        "import-vcf" => {
            let body = request.body_bytes().await?;
            let text = String::from_utf8(body)
                .map_err(|_| AgentError::ClientInput("vCard body is not valid UTF-8".to_string()))?;
            let contacts = parse_vcf(&text);
            let result = provider.import(contacts);
            Ok(HttpResponse::ok(&result))
        }
        other => Err(AgentError::NotFound(format!("unknown contacts action {other}"))),
    }
}

fn export_vcf(contacts: &[Contact]) -> String {
    let mut out = String::new();
    for contact in contacts {
        out.push_str("BEGIN:VCARD\r\n");
        out.push_str("VERSION:3.0\r\n");
        out.push_str(&format!("FN:{}\r\n", escape_vcf(&contact.name)));
        out.push_str(&format!("N:{};;;;\r\n", escape_vcf(&contact.name)));
        for phone in &contact.phones {
            out.push_str(&format!("TEL;TYPE={}:{}\r\n", phone.label.to_uppercase(), phone.value));
        }
        for email in &contact.emails {
            out.push_str(&format!("EMAIL;TYPE={}:{}\r\n", email.label.to_uppercase(), email.value));
        }
        if let Some(org) = &contact.organization {
            out.push_str(&format!("ORG:{}\r\n", escape_vcf(org)));
        }
        out.push_str("END:VCARD\r\n");
    }
    out
}

fn escape_vcf(value: &str) -> String {
    value.replace('\\', "\\\\").replace(',', "\\,").replace(';', "\\;")
}

/// Parses one or more `VCARD` blocks, reading `FN`, `TEL`, `EMAIL`, and `ORG`
/// lines. Unknown properties are ignored; a block without an `FN` is
/// skipped since [`Contact::name`] is required.
fn parse_vcf(text: &str) -> Vec<Contact> {
    let mut contacts = Vec::new();
    let mut current: Option<Contact> = None;

    for line in text.lines() {
        let line = line.trim_end_matches('\r');
        if line.eq_ignore_ascii_case("BEGIN:VCARD") {
            current = Some(Contact::default());
            continue;
        }
        if line.eq_ignore_ascii_case("END:VCARD") {
            if let Some(contact) = current.take() {
                if !contact.name.is_empty() {
                    contacts.push(contact);
                }
            }
            continue;
        }
        let Some(contact) = current.as_mut() else { continue };
        let Some((key, value)) = line.split_once(':') else { continue };
        let (property, params) = key.split_once(';').unwrap_or((key, ""));

        match property.to_ascii_uppercase().as_str() {
            "FN" => contact.name = value.to_string(),
            "TEL" => contact.phones.push(LabeledValue { label: vcf_label(params), value: value.to_string() }),
            "EMAIL" => contact.emails.push(LabeledValue { label: vcf_label(params), value: value.to_string() }),
            "ORG" => contact.organization = Some(value.to_string()),
            _ => {}
        }
    }

    contacts
}

fn vcf_label(params: &str) -> String {
    params
        .split(';')
        .find_map(|p| p.strip_prefix("TYPE=").map(|t| t.to_lowercase()))
        .unwrap_or_else(|| "other".to_string())
}
