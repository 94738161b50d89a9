//! Call-file generation.
//!
//! A call file is a line-oriented `Key: value` document that the switch picks
//! up from its outgoing spool directory. Lines appear in a fixed order:
//!
//! ```text
//! Channel, Callerid, WaitTime, MaxRetries, RetryTime, Account,
//! Application, Data, Context, Extension, Priority, Setvar*, Archive
//! ```
//!
//! Unset values (empty strings, zero counts) produce no line. `Archive` is
//! always present. `Setvar` lines are sorted by key.

use std::fmt;

use crate::call::CallRequest;

/// A single `Key: value` directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub key: &'static str,
    pub value: String,
}

impl Directive {
    fn new(key: &'static str, value: impl Into<String>) -> Self {
        Self {
            key,
            value: value.into(),
        }
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.key, self.value)
    }
}

/// The ordered directives of one call file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallFile {
    directives: Vec<Directive>,
}

impl CallFile {
    /// Builds the call file for a resolved request.
    pub fn generate(request: &CallRequest) -> Self {
        let mut directives = Vec::with_capacity(13 + request.set_var.len());

        push_text(&mut directives, "Channel", &request.channel);
        push_text(&mut directives, "Callerid", &request.caller_id);
        for (key, value) in [
            ("WaitTime", request.wait_time),
            ("MaxRetries", request.max_retries),
            ("RetryTime", request.retry_time),
        ] {
            if value != 0 {
                directives.push(Directive::new(key, value.to_string()));
            }
        }
        for (key, value) in [
            ("Account", &request.account),
            ("Application", &request.application),
            ("Data", &request.data),
            ("Context", &request.context),
            ("Extension", &request.extension),
            ("Priority", &request.priority),
        ] {
            push_text(&mut directives, key, value);
        }

        for (key, value) in &request.set_var {
            directives.push(Directive::new("Setvar", format!("{key}={value}")));
        }

        let archive = if request.archive { "yes" } else { "no" };
        directives.push(Directive::new("Archive", archive));

        Self { directives }
    }

    /// Returns the directives in file order.
    pub fn directives(&self) -> &[Directive] {
        &self.directives
    }
}

fn push_text(directives: &mut Vec<Directive>, key: &'static str, value: &str) {
    if !value.is_empty() {
        directives.push(Directive::new(key, value));
    }
}

/// Renders the file with a trailing newline after every line.
impl fmt::Display for CallFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for directive in &self.directives {
            writeln!(f, "{directive}")?;
        }
        Ok(())
    }
}
