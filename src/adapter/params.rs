//! Placeholder resolution for command templates
//!
//! `{name}` tokens in a command are replaced with the flattened value of the
//! source's named parameters. `{s-quote}` becomes a literal single quote.

use crate::settings::{Setting, SettingsProvider};
use crate::source::{ParamKind, SourceParam};
use crate::storage::{QueryExecutor, QueryRow};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::Value;
use tracing::{debug, error, warn};

/// Escape token for a literal single quote in commands and queries.
pub const QUOTE_TOKEN: &str = "{s-quote}";

const PLAIN_TYPES: &[&str] = &[
    "text",
    "string",
    "integer",
    "boolean",
    "password",
    "readonly",
    "integer.select",
    "text.select",
    "integer.checkbox",
];
const LIST_TYPES: &[&str] = &["text.multiselect", "list"];
const ENCODED_LIST_TYPES: &[&str] = &["subnets"];
const TEMPLATE_SUFFIX: &str = ".template";

/// A parameter with its flattened value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedParam {
    pub name: String,
    pub value: String,
}

pub fn unescape_quotes(text: &str) -> String {
    text.replace(QUOTE_TOKEN, "'")
}

/// Render a scalar JSON value as plain text.
fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Join list items with commas.
///
/// A nested list contributes its first element with single quotes removed;
/// anything else contributes its plain text.
pub fn flatten_values(values: &[Value]) -> String {
    values
        .iter()
        .map(|item| match item {
            Value::Array(inner) => inner
                .first()
                .map(scalar_to_string)
                .unwrap_or_default()
                .replace('\'', ""),
            other => scalar_to_string(other),
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Join the first column of each query row with commas.
pub fn flatten_rows(rows: &[QueryRow]) -> String {
    rows.iter()
        .map(|row| {
            row.first()
                .cloned()
                .flatten()
                .unwrap_or_default()
                .replace('\'', "")
        })
        .collect::<Vec<_>>()
        .join(",")
}

fn as_list(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items.clone(),
        Value::Null => Vec::new(),
        other => vec![other.clone()],
    }
}

/// Flatten a setting into text a command can receive.
///
/// Returns `None` for setting types that have no flattening rule.
pub fn flatten_setting(setting: &Setting, sensitive: bool) -> Option<String> {
    let kind = setting.kind.as_str();

    if kind.ends_with(TEMPLATE_SUFFIX) {
        return serde_json::to_string(&setting.value).ok();
    }

    let encode = ENCODED_LIST_TYPES.contains(&kind) || (sensitive && LIST_TYPES.contains(&kind));
    if encode {
        let flat = flatten_values(&as_list(&setting.value));
        return Some(STANDARD.encode(flat.as_bytes()));
    }
    if LIST_TYPES.contains(&kind) {
        return Some(flatten_values(&as_list(&setting.value)));
    }
    if PLAIN_TYPES.contains(&kind) {
        return Some(scalar_to_string(&setting.value));
    }

    error!(setting_type = kind, "no flattening rule for setting type");
    None
}

/// Resolve every parameter; unresolvable ones are logged and left out.
pub fn resolve_params(
    params: &[SourceParam],
    settings: &dyn SettingsProvider,
    queries: &dyn QueryExecutor,
) -> Vec<ResolvedParam> {
    let mut resolved = Vec::with_capacity(params.len());

    for param in params {
        let value = match param.kind {
            ParamKind::Setting => match settings.setting(&param.value) {
                Some(setting) => flatten_setting(&setting, param.sensitive),
                None => {
                    warn!(param = %param.name, setting = %param.value, "setting not found");
                    None
                }
            },
            ParamKind::Sql => match queries.query_rows(&unescape_quotes(&param.value)) {
                Ok(rows) => Some(flatten_rows(&rows)),
                Err(e) => {
                    warn!(param = %param.name, error = %e, "parameter query failed");
                    None
                }
            },
        };

        match value {
            Some(value) => resolved.push(ResolvedParam {
                name: param.name.clone(),
                value,
            }),
            None => warn!(param = %param.name, "parameter resolved to nothing; placeholder left as-is"),
        }
    }

    resolved
}

/// Split a command template into arguments and substitute placeholders in
/// each of them.
pub fn render_command(template: &str, params: &[ResolvedParam]) -> Vec<String> {
    debug!(command = template, "resolving command");
    template
        .split_whitespace()
        .map(|part| {
            let substituted = params.iter().fold(part.to_string(), |acc, p| {
                acc.replace(&format!("{{{}}}", p.name), &p.value)
            });
            unescape_quotes(&substituted)
        })
        .collect()
}
