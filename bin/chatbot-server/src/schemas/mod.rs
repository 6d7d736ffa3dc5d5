//! Request and response bodies.

pub mod auth;
pub mod chat;
pub mod chats;

use validator::ValidationErrors;

/// A single human-readable line for the first failing field.
pub fn validation_message(errors: &ValidationErrors) -> String {
    let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
    fields.sort_by(|a, b| a.0.cmp(&b.0));
    fields
        .into_iter()
        .find_map(|(field, errs)| {
            errs.first().map(|e| {
                e.message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("{field} is invalid"))
            })
        })
        .unwrap_or_else(|| "Invalid request".to_owned())
}
