//! Build-tool problem records and the payload parser.
//!
//! The build tool writes exactly one JSON array to stdout:
//!
//! ```json
//! [{"file": "/p/src/Main.hs", "line": 3, "column": 5, "extras": "", "details": ["..."]}]
//! ```

use serde::Deserialize;
use thiserror::Error;

/// One problem reported by the build tool.
///
/// `line` is 1-based and `column` 0-based, exactly as the tool reports them.
/// Both stay signed: findings without a precise location come through as 0
/// or negative, and clamping is the range resolver's job.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ErrorRecord {
    file: String,
    line: i64,
    column: i64,
    #[serde(default)]
    extras: String,
    #[serde(default)]
    details: Vec<String>,
}

impl ErrorRecord {
    #[must_use]
    pub fn new(
        file: impl Into<String>,
        line: i64,
        column: i64,
        extras: impl Into<String>,
        details: Vec<String>,
    ) -> Self {
        Self {
            file: file.into(),
            line,
            column,
            extras: extras.into(),
            details,
        }
    }

    /// Absolute path of the file the problem belongs to.
    #[must_use]
    pub fn file(&self) -> &str {
        &self.file
    }

    /// 1-based line as reported; may be 0 or negative.
    #[must_use]
    pub fn line(&self) -> i64 {
        self.line
    }

    /// 0-based column as reported; may be negative.
    #[must_use]
    pub fn column(&self) -> i64 {
        self.column
    }

    /// Supplementary context line, possibly empty.
    #[must_use]
    pub fn extras(&self) -> &str {
        &self.extras
    }

    /// Raw message lines, still carrying tool log noise.
    #[must_use]
    pub fn details(&self) -> &[String] {
        &self.details
    }
}

/// The build tool broke its output contract.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("output is not valid JSON: {0}")]
    Json(#[source] serde_json::Error),
    #[error("expected a JSON array of error records, found {found}")]
    NotAnArray { found: &'static str },
    #[error("malformed error record: {0}")]
    Record(#[source] serde_json::Error),
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// Parse one complete build-tool payload into records, preserving order.
pub fn parse_error_records(payload: &[u8]) -> Result<Vec<ErrorRecord>, ParseError> {
    let value: serde_json::Value = serde_json::from_slice(payload).map_err(ParseError::Json)?;
    if !value.is_array() {
        return Err(ParseError::NotAnArray {
            found: json_kind(&value),
        });
    }
    serde_json::from_value(value).map_err(ParseError::Record)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_records_in_order() {
        let payload = br#"[
            {"file": "/p/src/Main.hs", "line": 3, "column": 5, "extras": "", "details": ["a"]},
            {"file": "/p/package.yaml", "line": 1, "column": 0, "extras": "ctx", "details": ["b", "c"]}
        ]"#;
        let records = parse_error_records(payload).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].file(), "/p/src/Main.hs");
        assert_eq!(records[0].line(), 3);
        assert_eq!(records[0].column(), 5);
        assert_eq!(records[1].extras(), "ctx");
        assert_eq!(records[1].details(), ["b", "c"]);
    }

    #[test]
    fn empty_array_is_a_clean_build() {
        assert!(parse_error_records(b"[]").unwrap().is_empty());
        assert!(parse_error_records(b"  [ ]\n").unwrap().is_empty());
    }

    #[test]
    fn missing_extras_and_details_default_to_empty() {
        let records =
            parse_error_records(br#"[{"file": "/p/a.hs", "line": 1, "column": 0}]"#).unwrap();
        assert_eq!(records[0].extras(), "");
        assert!(records[0].details().is_empty());
    }

    #[test]
    fn negative_positions_are_kept_for_the_resolver() {
        let records =
            parse_error_records(br#"[{"file": "/p/a.hs", "line": -2, "column": -1}]"#).unwrap();
        assert_eq!(records[0].line(), -2);
        assert_eq!(records[0].column(), -1);
    }

    #[test]
    fn invalid_json_is_rejected() {
        let err = parse_error_records(b"Building HSRest...").unwrap_err();
        assert!(matches!(err, ParseError::Json(_)));
    }

    #[test]
    fn empty_payload_is_rejected() {
        assert!(matches!(
            parse_error_records(b"").unwrap_err(),
            ParseError::Json(_)
        ));
    }

    #[test]
    fn non_array_json_is_rejected() {
        let err = parse_error_records(br#"{"file": "/p/a.hs"}"#).unwrap_err();
        assert!(matches!(err, ParseError::NotAnArray { found: "an object" }));
        assert_eq!(
            err.to_string(),
            "expected a JSON array of error records, found an object"
        );
    }

    #[test]
    fn wrongly_shaped_element_is_rejected() {
        let err = parse_error_records(br#"[{"file": 7, "line": 1, "column": 0}]"#).unwrap_err();
        assert!(matches!(err, ParseError::Record(_)));
    }
}
