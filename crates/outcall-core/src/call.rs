//! Call request resolution.
//!
//! Incoming form fields are untyped strings. [`CallRequestResolver`] is the one
//! place where they are coerced, merged with the configured [`CallDefaults`] and
//! checked, producing an immutable [`CallRequest`].
//!
//! # Example
//!
//! ```
//! use std::collections::HashMap;
//! use outcall_core::call::{CallDefaults, CallRequestResolver};
//!
//! let defaults = CallDefaults::default();
//! let mut fields = HashMap::new();
//! fields.insert("channel".to_string(), "SIP/100".to_string());
//! fields.insert("context".to_string(), "from-internal".to_string());
//!
//! let request = CallRequestResolver::new(&defaults).resolve(&fields).unwrap();
//! assert_eq!(request.channel, "SIP/100");
//! ```

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Names of the recognised request fields.
pub mod field {
    pub const TOKEN: &str = "token";
    pub const CHANNEL: &str = "channel";
    pub const CALLER_ID: &str = "caller_id";
    pub const WAIT_TIME: &str = "wait_time";
    pub const MAX_RETRIES: &str = "max_retries";
    pub const RETRY_TIME: &str = "retry_time";
    pub const ACCOUNT: &str = "account";
    pub const APPLICATION: &str = "application";
    pub const DATA: &str = "data";
    pub const CONTEXT: &str = "context";
    pub const EXTENSION: &str = "extension";
    pub const PRIORITY: &str = "priority";
    pub const SET_VAR: &str = "set_var";
    pub const ARCHIVE: &str = "archive";
    pub const SCHEDULE: &str = "schedule";
}

/// Read access to raw request fields.
///
/// A missing field and an empty field are treated the same by the resolver.
pub trait FieldLookup {
    /// Returns the first value submitted for `name`, if any.
    fn field(&self, name: &str) -> Option<&str>;
}

impl FieldLookup for HashMap<String, String> {
    fn field(&self, name: &str) -> Option<&str> {
        self.get(name).map(String::as_str)
    }
}

impl FieldLookup for BTreeMap<String, String> {
    fn field(&self, name: &str) -> Option<&str> {
        self.get(name).map(String::as_str)
    }
}

/// Reasons a request cannot be turned into a call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// No channel, or neither an application nor a context after defaulting.
    #[error("Required options not set")]
    RequiredOptionsNotSet,
}

/// Process-wide call defaults, read once at startup.
///
/// Key names match the configuration file (`default_channel`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallDefaults {
    pub default_channel: String,
    pub default_caller_id: String,
    /// Seconds to wait for an answer (about 5 seconds per ring).
    pub default_wait_time: u64,
    pub default_max_retries: u64,
    pub default_retry_time: u64,
    /// Currently unused: `account` falls back to `default_caller_id`.
    pub default_account: String,
    pub default_application: String,
    pub default_data: String,
    /// Forces `application` and `data` to their defaults for every request.
    pub prevent_api_application: bool,
    pub default_context: String,
    pub default_extension: String,
    pub default_priority: String,
    pub default_set_var: BTreeMap<String, String>,
    pub default_archive: bool,
}

impl Default for CallDefaults {
    fn default() -> Self {
        Self {
            default_channel: String::new(),
            default_caller_id: String::new(),
            default_wait_time: 0,
            default_max_retries: 0,
            default_retry_time: 0,
            default_account: String::new(),
            default_application: String::new(),
            default_data: String::new(),
            prevent_api_application: true,
            default_context: String::new(),
            default_extension: String::new(),
            default_priority: String::new(),
            default_set_var: BTreeMap::new(),
            default_archive: false,
        }
    }
}

/// A fully resolved outbound call.
///
/// Empty strings and zero counts mean "not set" and are left out of the
/// generated call file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CallRequest {
    pub channel: String,
    pub caller_id: String,
    pub wait_time: u64,
    pub max_retries: u64,
    pub retry_time: u64,
    pub account: String,
    pub application: String,
    pub data: String,
    pub context: String,
    pub extension: String,
    pub priority: String,
    pub set_var: BTreeMap<String, String>,
    pub archive: bool,
    /// Free-text schedule; never written to the call file.
    pub schedule: String,
}

impl CallRequest {
    /// Returns true if the request carries enough to place a call.
    pub fn is_complete(&self) -> bool {
        !self.channel.is_empty() && (!self.application.is_empty() || !self.context.is_empty())
    }
}

/// Merges request fields with [`CallDefaults`].
#[derive(Debug, Clone, Copy)]
pub struct CallRequestResolver<'a> {
    defaults: &'a CallDefaults,
}

impl<'a> CallRequestResolver<'a> {
    /// Creates a resolver over the given defaults.
    pub fn new(defaults: &'a CallDefaults) -> Self {
        Self { defaults }
    }

    /// Resolves raw fields into a [`CallRequest`].
    ///
    /// Two behaviours are kept for compatibility with existing callers:
    /// `account` falls back to `default_caller_id`, and `extension` and
    /// `priority` are replaced by their defaults only when the resolved
    /// `context` is empty.
    pub fn resolve<F>(&self, fields: &F) -> Result<CallRequest, ResolveError>
    where
        F: FieldLookup + ?Sized,
    {
        let d = self.defaults;
        let text = |name: &str| fields.field(name).unwrap_or_default();

        let mut application = or_default(text(field::APPLICATION), &d.default_application);
        let mut data = or_default(text(field::DATA), &d.default_data);
        if d.prevent_api_application {
            application = d.default_application.clone();
            data = d.default_data.clone();
        }

        let context = or_default(text(field::CONTEXT), &d.default_context);
        let (extension, priority) = if context.is_empty() {
            (d.default_extension.clone(), d.default_priority.clone())
        } else {
            (text(field::EXTENSION).to_string(), text(field::PRIORITY).to_string())
        };

        let set_var = match text(field::SET_VAR) {
            "" => d.default_set_var.clone(),
            raw => parse_set_var(raw).unwrap_or_else(|| d.default_set_var.clone()),
        };

        let request = CallRequest {
            channel: or_default(text(field::CHANNEL), &d.default_channel),
            caller_id: or_default(text(field::CALLER_ID), &d.default_caller_id),
            wait_time: parse_count(text(field::WAIT_TIME), d.default_wait_time),
            max_retries: parse_count(text(field::MAX_RETRIES), d.default_max_retries),
            retry_time: parse_count(text(field::RETRY_TIME), d.default_retry_time),
            account: or_default(text(field::ACCOUNT), &d.default_caller_id),
            application,
            data,
            context,
            extension,
            priority,
            set_var,
            archive: parse_archive(text(field::ARCHIVE), d.default_archive),
            schedule: text(field::SCHEDULE).to_string(),
        };

        if request.is_complete() {
            Ok(request)
        } else {
            Err(ResolveError::RequiredOptionsNotSet)
        }
    }
}

fn or_default(value: &str, default: &str) -> String {
    let chosen = if value.is_empty() { default } else { value };
    chosen.to_string()
}

fn parse_count(value: &str, default: u64) -> u64 {
    value.parse().unwrap_or(default)
}

fn parse_archive(value: &str, default: bool) -> bool {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" => true,
        "false" | "no" => false,
        _ => default,
    }
}

/// Parses a query-string encoded `key=value&...` mapping.
///
/// Returns `None` if any segment is malformed: it contains `;`, has a bad
/// `%` escape, or does not decode to UTF-8. The first value of a repeated
/// key wins.
///
/// Escapes that decode to invalid UTF-8 (`%ff`) fail the whole mapping and
/// the configured defaults apply, where a byte-preserving query parser would
/// keep the raw bytes.
pub fn parse_set_var(raw: &str) -> Option<BTreeMap<String, String>> {
    let mut vars = BTreeMap::new();
    for (key, value) in parse_form_pairs(raw)? {
        vars.entry(key).or_insert(value);
    }
    Some(vars)
}

/// Splits an `application/x-www-form-urlencoded` string into decoded pairs,
/// in order.
///
/// Empty segments are skipped and a segment without `=` has an empty value.
/// Returns `None` on `;`, on a bad `%` escape, or when a component does not
/// decode to UTF-8.
pub fn parse_form_pairs(raw: &str) -> Option<Vec<(String, String)>> {
    let mut pairs = Vec::new();
    for segment in raw.split('&') {
        if segment.is_empty() {
            continue;
        }
        if segment.contains(';') {
            return None;
        }
        let (key, value) = segment.split_once('=').unwrap_or((segment, ""));
        pairs.push((decode_form_component(key)?, decode_form_component(value)?));
    }
    Some(pairs)
}

/// Decodes one form component: `+` is a space and every `%` must start a
/// two-digit hex escape.
pub fn decode_form_component(component: &str) -> Option<String> {
    let bytes = component.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let valid = bytes
                .get(i + 1..i + 3)
                .is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit));
            if !valid {
                return None;
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    urlencoding::decode(&component.replace('+', " "))
        .ok()
        .map(|decoded| decoded.into_owned())
}
