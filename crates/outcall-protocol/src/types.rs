//! Request and response types for the outcall API.

use outcall_core::{FieldLookup, parse_form_pairs};
use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, ProtocolResult};

/// Outcome reported in every response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiStatus {
    Ok,
    Error,
}

/// The JSON body returned for every request.
///
/// `error` is empty on success and a short reason otherwise. It never
/// carries paths or configuration values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub status: ApiStatus,
    pub error: String,
}

impl ApiResponse {
    /// Creates a success response.
    pub fn ok() -> Self {
        Self {
            status: ApiStatus::Ok,
            error: String::new(),
        }
    }

    /// Creates an error response with the given reason.
    pub fn error(reason: impl Into<String>) -> Self {
        Self {
            status: ApiStatus::Error,
            error: reason.into(),
        }
    }

    /// Returns true for a success response.
    pub fn is_ok(&self) -> bool {
        self.status == ApiStatus::Ok
    }
}

/// Encodes a response as a JSON line (terminated by `\n`).
pub fn encode_response(response: &ApiResponse) -> ProtocolResult<Vec<u8>> {
    let mut body = serde_json::to_vec(response).map_err(ProtocolError::Serialization)?;
    body.push(b'\n');
    Ok(body)
}

/// Decodes a response body.
pub fn decode_response(bytes: &[u8]) -> ProtocolResult<ApiResponse> {
    serde_json::from_slice(bytes).map_err(ProtocolError::Deserialization)
}

/// Submitted form fields, in arrival order.
///
/// Lookups return the first value for a name, so when body fields are added
/// before query fields the body wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormFields {
    pairs: Vec<(String, String)>,
}

impl FormFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses an `application/x-www-form-urlencoded` string.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MalformedForm`] for a bad `%` escape, a `;`
    /// separator, or input that does not decode to UTF-8.
    pub fn try_from_urlencoded(input: &[u8]) -> ProtocolResult<Self> {
        let mut fields = Self::new();
        fields.try_extend_urlencoded(input)?;
        Ok(fields)
    }

    /// Appends the pairs of an `application/x-www-form-urlencoded` string.
    ///
    /// Nothing is appended when the input is malformed.
    pub fn try_extend_urlencoded(&mut self, input: &[u8]) -> ProtocolResult<()> {
        let raw = std::str::from_utf8(input).map_err(|_| ProtocolError::MalformedForm)?;
        let pairs = parse_form_pairs(raw).ok_or(ProtocolError::MalformedForm)?;
        self.pairs.extend(pairs);
        Ok(())
    }

    /// Appends one field.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((name.into(), value.into()));
    }

    /// Appends all fields of `other` after the existing ones.
    pub fn append(&mut self, other: FormFields) {
        self.pairs.extend(other.pairs);
    }

    /// Returns the first value for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl FieldLookup for FormFields {
    fn field(&self, name: &str) -> Option<&str> {
        self.get(name)
    }
}

impl<K, V> FromIterator<(K, V)> for FormFields
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            pairs: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_response_json() {
        let bytes = encode_response(&ApiResponse::ok()).unwrap();
        assert_eq!(bytes, b"{\"status\":\"ok\",\"error\":\"\"}\n");
    }

    #[test]
    fn error_response_json() {
        let bytes = encode_response(&ApiResponse::error("Required options not set")).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "{\"status\":\"error\",\"error\":\"Required options not set\"}\n"
        );
    }

    #[test]
    fn decode_accepts_trailing_newline() {
        let decoded = decode_response(b"{\"status\":\"error\",\"error\":\"Unauthorized\"}\n").unwrap();
        assert_eq!(decoded, ApiResponse::error("Unauthorized"));
        assert!(!decoded.is_ok());
    }

    #[test]
    fn decode_rejects_unknown_status() {
        let result = decode_response(b"{\"status\":\"maybe\",\"error\":\"\"}");
        assert!(matches!(result, Err(ProtocolError::Deserialization(_))));
    }

    #[test]
    fn form_fields_first_value_wins() {
        let mut fields = FormFields::try_from_urlencoded(b"token=body&channel=SIP%2F100").unwrap();
        fields
            .try_extend_urlencoded(b"token=query&schedule=tomorrow+at+9am")
            .unwrap();

        assert_eq!(fields.get("token"), Some("body"));
        assert_eq!(fields.get("channel"), Some("SIP/100"));
        assert_eq!(fields.get("schedule"), Some("tomorrow at 9am"));
        assert_eq!(fields.get("missing"), None);
        assert_eq!(fields.len(), 4);
    }

    #[test]
    fn form_fields_keep_nested_set_var_encoded_once() {
        let fields = FormFields::try_from_urlencoded(b"set_var=a%3D1%26b%3Dtwo%2Bwords").unwrap();
        assert_eq!(fields.field("set_var"), Some("a=1&b=two+words"));
    }

    #[test]
    fn malformed_forms_are_rejected() {
        for input in [
            &b"data=%zz"[..],
            b"data=%ff",
            b"data=%4",
            b"token=secret;channel=SIP%2F100",
            b"data=\xff",
        ] {
            assert!(
                matches!(
                    FormFields::try_from_urlencoded(input),
                    Err(ProtocolError::MalformedForm)
                ),
                "{input:?}"
            );
        }
    }

    #[test]
    fn malformed_extension_leaves_fields_untouched() {
        let mut fields = FormFields::try_from_urlencoded(b"token=secret").unwrap();
        assert!(fields.try_extend_urlencoded(b"a=1&b=%zz").is_err());
        assert_eq!(fields.len(), 1);
        assert_eq!(fields.get("a"), None);
    }

    #[test]
    fn form_fields_from_pairs() {
        let fields: FormFields = [("a", "1"), ("a", "2")].into_iter().collect();
        assert_eq!(fields.get("a"), Some("1"));
        assert!(!fields.is_empty());
    }
}
