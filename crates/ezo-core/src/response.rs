//! Reply grammar for fixed-format ASCII replies.
//!
//! Every query reply has the shape `?<PREFIX>,<field>,<field>...`. A
//! [`ReplyPattern`] declares the prefix token and a typed slot per field;
//! [`ReplyPattern::parse`] either captures every slot or fails, never a
//! partial match.
//!
//! Field grammar (per slot):
//!
//! | Kind | Accepts |
//! |---|---|
//! | `Word` | one or more ASCII letters, digits or `_` |
//! | `NonDigit` | exactly one non-digit character |
//! | `Decimal` | optional `-`, digits, optional `.` and more digits |
//! | `Digit` | exactly one ASCII digit |
//! | `Bit` | `0` or `1` |
//! | `Rest` | everything after the previous comma (must be last) |

use crate::error::{EzoError, Result};
use std::collections::HashMap;
use std::str::FromStr;

/// Grammar of a single reply field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// ASCII letters, digits or `_`.
    Word,
    /// One character that is not a digit.
    NonDigit,
    /// Optionally signed decimal number.
    Decimal,
    /// One ASCII digit.
    Digit,
    /// `0` or `1`.
    Bit,
    /// Remainder of the payload.
    Rest,
}

impl FieldKind {
    fn accepts(self, text: &str) -> bool {
        match self {
            FieldKind::Word => {
                !text.is_empty()
                    && text
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '_')
            }
            FieldKind::NonDigit => {
                let mut chars = text.chars();
                matches!((chars.next(), chars.next()), (Some(c), None) if !c.is_ascii_digit())
            }
            FieldKind::Decimal => is_decimal(text),
            FieldKind::Digit => text.len() == 1 && text.as_bytes()[0].is_ascii_digit(),
            FieldKind::Bit => text == "0" || text == "1",
            FieldKind::Rest => true,
        }
    }

    fn describe(self) -> &'static str {
        match self {
            FieldKind::Word => "word",
            FieldKind::NonDigit => "single non-digit character",
            FieldKind::Decimal => "decimal number",
            FieldKind::Digit => "single digit",
            FieldKind::Bit => "0 or 1",
            FieldKind::Rest => "text",
        }
    }
}

fn is_decimal(text: &str) -> bool {
    let unsigned = text.strip_prefix('-').unwrap_or(text);
    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((i, f)) => (i, f),
        None => (unsigned, ""),
    };
    !int_part.is_empty()
        && int_part.bytes().all(|b| b.is_ascii_digit())
        && frac_part.bytes().all(|b| b.is_ascii_digit())
}

/// Declared shape of a query reply.
#[derive(Debug, Clone, Copy)]
pub struct ReplyPattern {
    /// Token following the leading `?`, e.g. `STATUS`.
    pub prefix: &'static str,
    /// Named field slots in reply order.
    pub fields: &'static [(&'static str, FieldKind)],
}

impl ReplyPattern {
    /// Pattern `?<prefix>` followed by `fields`, comma separated.
    pub const fn new(prefix: &'static str, fields: &'static [(&'static str, FieldKind)]) -> Self {
        Self { prefix, fields }
    }

    /// Match `payload` against this pattern.
    ///
    /// `command` is only used to label the error.
    pub fn parse(&self, command: &str, payload: &str) -> Result<ParsedFields> {
        let fail = |reason: String| EzoError::parse(command, payload, reason);

        let body = payload
            .strip_prefix('?')
            .and_then(|rest| rest.strip_prefix(self.prefix))
            .ok_or_else(|| fail(format!("expected prefix '?{}'", self.prefix)))?;

        let mut rest = match body.strip_prefix(',') {
            Some(rest) => rest,
            None if self.fields.is_empty() && body.is_empty() => "",
            None => return Err(fail("expected ',' after prefix".into())),
        };

        let mut values = HashMap::with_capacity(self.fields.len());
        for (index, (name, kind)) in self.fields.iter().enumerate() {
            let is_last = index + 1 == self.fields.len();
            let text = if *kind == FieldKind::Rest || is_last {
                std::mem::take(&mut rest)
            } else {
                let (head, tail) = rest
                    .split_once(',')
                    .ok_or_else(|| fail(format!("missing field '{name}'")))?;
                rest = tail;
                head
            };

            if !kind.accepts(text) {
                return Err(fail(format!(
                    "field '{name}' = {text:?} is not a {}",
                    kind.describe()
                )));
            }
            values.insert(*name, text.to_string());
        }

        Ok(ParsedFields {
            command: command.to_string(),
            payload: payload.to_string(),
            values,
        })
    }
}

/// Named captures from a matched reply. All declared fields are present.
#[derive(Debug, Clone)]
pub struct ParsedFields {
    command: String,
    payload: String,
    values: HashMap<&'static str, String>,
}

impl ParsedFields {
    /// Raw text of field `name`.
    pub fn get(&self, name: &str) -> Result<&str> {
        self.values
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| self.error(format!("no field named '{name}'")))
    }

    /// Field `name` as `f32`.
    pub fn get_f32(&self, name: &str) -> Result<f32> {
        self.get_parsed(name)
    }

    /// Field `name` as `u32`.
    pub fn get_u32(&self, name: &str) -> Result<u32> {
        self.get_parsed(name)
    }

    /// Bit field `name` as `bool`.
    pub fn get_bool(&self, name: &str) -> Result<bool> {
        match self.get(name)? {
            "1" => Ok(true),
            "0" => Ok(false),
            other => Err(self.error(format!("field '{name}' = {other:?} is not 0 or 1"))),
        }
    }

    fn get_parsed<T: FromStr>(&self, name: &str) -> Result<T>
    where
        T::Err: std::fmt::Display,
    {
        let text = self.get(name)?;
        text.parse::<T>()
            .map_err(|e| self.error(format!("field '{name}' = {text:?}: {e}")))
    }

    fn error(&self, reason: String) -> EzoError {
        EzoError::parse(self.command.as_str(), self.payload.as_str(), reason)
    }
}

/// Parse a bare numeric payload (e.g. the reply to `R`) as `f32`.
pub fn parse_f32(command: &str, payload: &str) -> Result<f32> {
    payload
        .trim()
        .parse::<f32>()
        .map_err(|e| EzoError::parse(command, payload, format!("not a number: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATUS: ReplyPattern = ReplyPattern::new(
        "STATUS",
        &[("restart_code", FieldKind::NonDigit), ("vcc", FieldKind::Decimal)],
    );
    const OUTPUTS: ReplyPattern = ReplyPattern::new("O", &[("params", FieldKind::Rest)]);

    #[test]
    fn parses_status_reply() {
        let fields = STATUS.parse("STATUS", "?STATUS,P,5.038").unwrap();
        assert_eq!(fields.get("restart_code").unwrap(), "P");
        assert!((fields.get_f32("vcc").unwrap() - 5.038).abs() < 1e-6);
        assert!(fields.get("unknown").is_err());
    }

    #[test]
    fn rejects_wrong_prefix() {
        let err = STATUS.parse("STATUS", "?I,pH,1.98").unwrap_err();
        assert!(matches!(err, EzoError::Parse { .. }));
    }

    #[test]
    fn rejects_missing_field() {
        assert!(STATUS.parse("STATUS", "?STATUS,P").is_err());
    }

    #[test]
    fn rejects_digit_restart_code() {
        assert!(STATUS.parse("STATUS", "?STATUS,5,5.038").is_err());
    }

    #[test]
    fn rejects_trailing_fields() {
        assert!(STATUS.parse("STATUS", "?STATUS,P,5.038,9").is_err());
    }

    #[test]
    fn rest_captures_csv() {
        let fields = OUTPUTS.parse("O,?", "?O,EC,TDS,S,SG").unwrap();
        assert_eq!(fields.get("params").unwrap(), "EC,TDS,S,SG");
    }

    #[test]
    fn decimal_grammar() {
        assert!(is_decimal("19"));
        assert!(is_decimal("19.5"));
        assert!(is_decimal("19."));
        assert!(is_decimal("-3.25"));
        assert!(!is_decimal(""));
        assert!(!is_decimal(".5"));
        assert!(!is_decimal("1.2.3"));
        assert!(!is_decimal("abc"));
    }

    #[test]
    fn word_field_is_ascii() {
        const WORD: ReplyPattern = ReplyPattern::new("I", &[("kind", FieldKind::Word)]);
        assert!(WORD.parse("I", "?I,pH").is_ok());
        assert!(WORD.parse("I", "?I,p H").is_err());
        assert!(WORD.parse("I", "?I,").is_err());
    }

    #[test]
    fn bit_and_digit_fields() {
        const LED: ReplyPattern = ReplyPattern::new("L", &[("on", FieldKind::Bit)]);
        const CAL: ReplyPattern = ReplyPattern::new("CAL", &[("count", FieldKind::Digit)]);

        assert!(LED.parse("L,?", "?L,1").unwrap().get_bool("on").unwrap());
        assert!(!LED.parse("L,?", "?L,0").unwrap().get_bool("on").unwrap());
        assert!(LED.parse("L,?", "?L,2").is_err());

        assert_eq!(CAL.parse("CAL,?", "?CAL,3").unwrap().get_u32("count").unwrap(), 3);
        assert!(CAL.parse("CAL,?", "?CAL,12").is_err());
    }

    #[test]
    fn bare_number_payloads() {
        assert!((parse_f32("R", "7.00").unwrap() - 7.0).abs() < f32::EPSILON);
        assert!(parse_f32("R", "seven").is_err());
    }
}
