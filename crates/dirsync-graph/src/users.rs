//! Mapping between Graph user JSON and reconciliation records.

use dirsync_reconcile::{AccountUpdate, AttributeValue, DesiredRecord, ObservedRecord};
use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::{json, Map, Value};

use crate::schema::{standard_field, STANDARD_FIELDS};
use crate::{GraphError, GraphResult};

const PASSWORD_LENGTH: usize = 16;
const UPPER: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ";
const LOWER: &[u8] = b"abcdefghijkmnopqrstuvwxyz";
const DIGITS: &[u8] = b"23456789";
const SYMBOLS: &[u8] = b"!@#$%^&*-_=+?";

/// Name of the directory extension property holding a custom field.
///
/// Graph names extensions `extension_{appId without dashes}_{name}`.
#[must_use]
pub fn extension_property_name(app_id: &str, field: &str) -> String {
    let app: String = app_id.chars().filter(|c| *c != '-').collect();
    let name: String = field
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("extension_{app}_{name}")
}

/// Resolves custom field names to extension property names.
#[derive(Debug, Clone, Default)]
pub struct ExtensionMap {
    app_id: Option<String>,
}

impl ExtensionMap {
    #[must_use]
    pub fn new(app_id: Option<String>) -> Self {
        Self { app_id }
    }

    /// Extension property for a custom field.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when no extension application is set.
    pub fn property(&self, field: &str) -> GraphResult<String> {
        match &self.app_id {
            Some(app_id) => Ok(extension_property_name(app_id, field)),
            None => Err(GraphError::Config(format!(
                "Custom field '{field}' requires an extension application id"
            ))),
        }
    }

    /// `(field, property)` pairs for the given custom fields.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when fields are requested without an
    /// extension application.
    pub fn properties(&self, fields: &[String]) -> GraphResult<Vec<(String, String)>> {
        fields
            .iter()
            .map(|f| self.property(f).map(|p| (f.clone(), p)))
            .collect()
    }
}

fn str_field(value: &Value, name: &str) -> Option<String> {
    value
        .get(name)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn attribute_from_json(value: &Value) -> Option<AttributeValue> {
    match value {
        Value::String(s) => Some(AttributeValue::scalar(s.clone())),
        Value::Array(items) => Some(AttributeValue::list(
            items.iter().filter_map(|v| v.as_str()).map(String::from),
        )),
        Value::Number(n) => Some(AttributeValue::scalar(n.to_string())),
        Value::Bool(b) => Some(AttributeValue::scalar(b.to_string())),
        _ => None,
    }
}

/// Maps a Graph user object to an observed record.
///
/// The identity is `mail`, falling back to `userPrincipalName`. Returns `None`
/// for objects without an `id`.
#[must_use]
pub fn map_user(value: &Value, extensions: &[(String, String)]) -> Option<ObservedRecord> {
    let id = str_field(value, "id")?;
    let email = str_field(value, "mail")
        .or_else(|| str_field(value, "userPrincipalName"))
        .unwrap_or_default();

    let mut record = ObservedRecord::new(id, email);
    record.display_name = str_field(value, "displayName");

    for field in STANDARD_FIELDS {
        if let Some(attr) = value.get(field.name).and_then(attribute_from_json) {
            if !attr.is_blank() {
                record.attributes.insert(field.name.to_string(), attr);
            }
        }
    }

    for (field, property) in extensions {
        if let Some(attr) = value.get(property).and_then(attribute_from_json) {
            let text = attr.to_string();
            if !text.trim().is_empty() {
                record.custom.insert(field.clone(), text);
            }
        }
    }

    if let Some(manager) = value.get("manager").filter(|m| m.is_object()) {
        if let Some(manager_id) = str_field(manager, "id") {
            let manager_email =
                str_field(manager, "mail").or_else(|| str_field(manager, "userPrincipalName"));
            record = record.with_manager(manager_id, manager_email.as_deref());
        }
    }

    Some(record)
}

/// JSON for an attribute value. Blank values clear the property.
fn attribute_to_json(name: &str, value: Option<&AttributeValue>) -> Value {
    let multi = standard_field(name).map_or(
        matches!(value, Some(AttributeValue::List(_))),
        |f| f.multi_valued,
    );
    match value {
        Some(v) if !v.is_blank() => {
            if multi {
                json!(v.normalized().into_iter().collect::<Vec<_>>())
            } else {
                json!(v.to_string().trim())
            }
        }
        _ if multi => json!([]),
        _ => Value::Null,
    }
}

fn canonical_name(name: &str) -> &str {
    standard_field(name).map_or(name, |f| f.name)
}

/// Mail nickname derived from the local part of an email.
#[must_use]
pub fn mail_nickname(email: &str) -> String {
    let local = email.split('@').next().unwrap_or(email);
    let nickname: String = local
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .collect();
    if nickname.is_empty() {
        "user".to_string()
    } else {
        nickname
    }
}

/// Random initial password meeting Entra complexity rules.
#[must_use]
pub fn generate_initial_password() -> String {
    let mut rng = rand::thread_rng();
    let classes = [UPPER, LOWER, DIGITS, SYMBOLS];
    let all: Vec<u8> = classes.concat();

    let mut chars: Vec<u8> = classes
        .iter()
        .map(|class| class[rng.gen_range(0..class.len())])
        .collect();
    while chars.len() < PASSWORD_LENGTH {
        chars.push(all[rng.gen_range(0..all.len())]);
    }
    chars.shuffle(&mut rng);
    chars.into_iter().map(char::from).collect()
}

/// Request body for creating a user.
///
/// # Errors
///
/// Returns a configuration error if the record carries custom fields and no
/// extension application is configured.
pub fn create_user_body(record: &DesiredRecord, extensions: &ExtensionMap) -> GraphResult<Value> {
    let email = record.email.trim();
    let nickname = mail_nickname(email);

    let mut body = Map::new();
    body.insert("accountEnabled".into(), json!(true));
    body.insert("userPrincipalName".into(), json!(email));
    body.insert("mail".into(), json!(email));
    body.insert("mailNickname".into(), json!(nickname));
    body.insert(
        "passwordProfile".into(),
        json!({
            "password": generate_initial_password(),
            "forceChangePasswordNextSignIn": true,
        }),
    );

    for (name, value) in &record.attributes {
        if !value.is_blank() {
            body.insert(
                canonical_name(name).to_string(),
                attribute_to_json(name, Some(value)),
            );
        }
    }
    body.insert(
        "displayName".into(),
        json!(record.display_name().unwrap_or_else(|| email.to_string())),
    );

    for (field, value) in &record.custom {
        if !value.trim().is_empty() {
            body.insert(extensions.property(field)?, json!(value.trim()));
        }
    }

    Ok(Value::Object(body))
}

/// PATCH body for an update, containing only the changed properties.
///
/// # Errors
///
/// Returns a configuration error if the update touches custom fields and no
/// extension application is configured.
pub fn update_user_body(update: &AccountUpdate, extensions: &ExtensionMap) -> GraphResult<Value> {
    let mut body = Map::new();

    for (name, value) in &update.attributes {
        body.insert(
            canonical_name(name).to_string(),
            attribute_to_json(name, value.as_ref()),
        );
    }

    for (field, value) in &update.custom {
        let json_value = match value.as_deref().map(str::trim) {
            Some(v) if !v.is_empty() => json!(v),
            _ => Value::Null,
        };
        body.insert(extensions.property(field)?, json_value);
    }

    Ok(Value::Object(body))
}
