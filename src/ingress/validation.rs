//! Schema validation for inbound request bodies.
//!
//! Accepted shape:
//!
//! ```json
//! { "title": "non-empty string", "metadata": { "key": "string value" } }
//! ```
//!
//! `metadata` is optional. Unknown top-level fields are ignored.

use serde_json::Value;

use crate::dispatcher::Message;
use crate::utils::error::ValidationError;

/// Checks the invariants a message must satisfy before admission.
pub fn validate(message: &Message) -> Result<(), ValidationError> {
    if message.title.trim().is_empty() {
        return Err(ValidationError::EmptyTitle);
    }
    if let Some(key) = message.metadata.keys().find(|k| k.trim().is_empty()) {
        return Err(ValidationError::InvalidField {
            field: format!("metadata.{key}"),
            reason: "metadata keys must not be empty".to_string(),
        });
    }
    Ok(())
}

/// Builds a [`Message`] from a raw JSON body and validates it.
pub fn parse_message(body: &Value) -> Result<Message, ValidationError> {
    let object = body.as_object().ok_or(ValidationError::NotAnObject)?;

    let title = match object.get("title") {
        None | Some(Value::Null) => return Err(ValidationError::MissingTitle),
        Some(Value::String(title)) => title.clone(),
        Some(other) => {
            return Err(ValidationError::InvalidField {
                field: "title".to_string(),
                reason: format!("expected a string, found {}", type_name(other)),
            });
        }
    };

    let mut message = Message::new(title);

    match object.get("metadata") {
        None | Some(Value::Null) => {}
        Some(Value::Object(entries)) => {
            for (key, value) in entries {
                let Value::String(value) = value else {
                    return Err(ValidationError::InvalidField {
                        field: format!("metadata.{key}"),
                        reason: format!("expected a string, found {}", type_name(value)),
                    });
                };
                message.metadata.insert(key.clone(), value.clone());
            }
        }
        Some(other) => {
            return Err(ValidationError::InvalidField {
                field: "metadata".to_string(),
                reason: format!("expected an object, found {}", type_name(other)),
            });
        }
    }

    validate(&message)?;
    Ok(message)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
