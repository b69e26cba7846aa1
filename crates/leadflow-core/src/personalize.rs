//! Placeholder substitution for outbound content.
//!
//! Templates reference lead fields with `{{token}}` placeholders. Recognized
//! tokens are replaced with the lead's value (empty string when the field is
//! missing); anything else is copied through untouched.

use leadflow_types::lead::Lead;

/// Replace every recognized `{{token}}` in `template` with the lead's value.
///
/// Recognized tokens: `firstName`, `lastName`, `email`, `phone`, `leadName`,
/// `programName`, `city`, `country`, `leadId`. Whitespace inside the braces
/// is ignored. Substituted values are never re-scanned.
pub fn personalize(template: &str, lead: &Lead) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];

        let Some(end) = after_open.find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };

        let token = after_open[..end].trim();
        match resolve(token, lead) {
            Some(value) => out.push_str(&value),
            None => out.push_str(&rest[start..start + 2 + end + 2]),
        }
        rest = &after_open[end + 2..];
    }

    out.push_str(rest);
    out
}

fn resolve(token: &str, lead: &Lead) -> Option<String> {
    let field = |value: &Option<String>| value.clone().unwrap_or_default();
    let value = match token {
        "firstName" => field(&lead.first_name),
        "lastName" => field(&lead.last_name),
        "email" => field(&lead.email),
        "phone" => field(&lead.phone),
        "leadName" => lead.full_name(),
        "programName" => field(&lead.program_interest),
        "city" => field(&lead.city),
        "country" => field(&lead.country),
        "leadId" => lead.id.to_string(),
        _ => return None,
    };
    Some(value)
}
