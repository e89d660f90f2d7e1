//! `<request>=<response>` and `timer:<period>=<response>` lines.

use hex::FromHexError;
use thiserror::Error;

use crate::codec::duration::{format_duration, parse_duration, DurationError};
use crate::domain::interface::{MAX_REQUEST, MAX_RESPONSE};
use crate::domain::pair::PairSpec;

/// Prefix marking the left-hand side of a periodic pair.
pub const TIMER_PREFIX: &str = "timer:";

/// Reasons a pair line fails to parse.
///
/// The `Display` text is the human-readable reason shown to operators.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("empty string")]
    Empty,

    #[error("missing '='")]
    MissingSeparator,

    #[error("empty request")]
    EmptyRequest,

    #[error("request string too long")]
    RequestTooLong,

    #[error("odd number of characters in request string")]
    OddRequest,

    #[error("invalid character in request string")]
    InvalidRequestChar,

    /// The left-hand side looked like a timer but the period is malformed.
    #[error("invalid data definition: {0}")]
    InvalidPeriod(#[from] DurationError),

    #[error("empty response")]
    EmptyResponse,

    #[error("response string too long")]
    ResponseTooLong,

    #[error("odd number of characters in response string")]
    OddResponse,

    #[error("invalid character in response string")]
    InvalidResponseChar,
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Parses one pair line.
///
/// A single trailing `\n` or `\r\n` is ignored.  The `timer:` prefix may be
/// omitted when the left-hand side is clearly a period (starts with a digit
/// and is not pure hex), e.g. `500ms=aa`.
///
/// Either side may also be written as double-quoted text, e.g. `"AT"="OK"`.
/// Its UTF-8 bytes are used as-is and the same size limits apply.
///
/// # Errors
///
/// Returns the first [`CodecError`] found, checking the request side first.
pub fn parse_pair(text: &str) -> Result<PairSpec, CodecError> {
    let line = text
        .strip_suffix("\r\n")
        .or_else(|| text.strip_suffix('\n'))
        .unwrap_or(text);
    if line.is_empty() {
        return Err(CodecError::Empty);
    }

    let (left, right) = split_sides(line).ok_or(CodecError::MissingSeparator)?;

    let period = if let Some(period) = left.strip_prefix(TIMER_PREFIX) {
        Some(parse_duration(period)?)
    } else if left.is_empty() {
        return Err(CodecError::EmptyRequest);
    } else if !is_hex(left) && left.starts_with(|c: char| c.is_ascii_digit()) {
        Some(parse_duration(left)?)
    } else {
        None
    };

    match period {
        Some(period) => Ok(PairSpec::Periodic {
            period,
            response: decode_response(right)?,
        }),
        None => Ok(PairSpec::Sync {
            request: decode_request(left)?,
            response: decode_response(right)?,
        }),
    }
}

/// Renders a pair in canonical form: lower-case hex, canonical period.
pub fn format_pair(spec: &PairSpec) -> String {
    match spec {
        PairSpec::Sync { request, response } => {
            format!("{}={}", hex::encode(request), hex::encode(response))
        }
        PairSpec::Periodic { period, response } => format!(
            "{TIMER_PREFIX}{}={}",
            format_duration(*period),
            hex::encode(response)
        ),
    }
}

// ── Internals ─────────────────────────────────────────────────────────────────

fn is_hex(text: &str) -> bool {
    text.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Splits at the first `=`, or after the closing quote of a quoted request.
fn split_sides(line: &str) -> Option<(&str, &str)> {
    if let Some(rest) = line.strip_prefix('"') {
        if let Some(end) = rest.find("\"=") {
            let eq = end + 2;
            return Some((&line[..eq], &line[eq + 1..]));
        }
    }
    line.split_once('=')
}

fn unquote(text: &str) -> Option<&str> {
    text.strip_prefix('"')?.strip_suffix('"')
}

fn decode_request(text: &str) -> Result<Vec<u8>, CodecError> {
    if let Some(inner) = unquote(text) {
        return match inner.len() {
            0 => Err(CodecError::EmptyRequest),
            n if n > MAX_REQUEST => Err(CodecError::RequestTooLong),
            _ => Ok(inner.as_bytes().to_vec()),
        };
    }
    if text.len() > MAX_REQUEST * 2 {
        return Err(CodecError::RequestTooLong);
    }
    hex::decode(text).map_err(|e| match e {
        FromHexError::OddLength => CodecError::OddRequest,
        _ => CodecError::InvalidRequestChar,
    })
}

fn decode_response(text: &str) -> Result<Vec<u8>, CodecError> {
    if text.is_empty() {
        return Err(CodecError::EmptyResponse);
    }
    if let Some(inner) = unquote(text) {
        return match inner.len() {
            0 => Err(CodecError::EmptyResponse),
            n if n > MAX_RESPONSE => Err(CodecError::ResponseTooLong),
            _ => Ok(inner.as_bytes().to_vec()),
        };
    }
    if text.len() > MAX_RESPONSE * 2 {
        return Err(CodecError::ResponseTooLong);
    }
    hex::decode(text).map_err(|e| match e {
        FromHexError::OddLength => CodecError::OddResponse,
        _ => CodecError::InvalidResponseChar,
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_parse_sync_pair() {
        let spec = parse_pair("deadbeef=cafe").unwrap();
        assert_eq!(
            spec,
            PairSpec::Sync {
                request: vec![0xDE, 0xAD, 0xBE, 0xEF],
                response: vec![0xCA, 0xFE],
            }
        );
    }

    #[test]
    fn test_parse_is_case_insensitive_and_strips_one_newline() {
        let lower = parse_pair("deadbeef=cafe").unwrap();
        assert_eq!(parse_pair("DeAdBeEf=CAFE\n").unwrap(), lower);
        assert_eq!(parse_pair("DEADBEEF=cafe\r\n").unwrap(), lower);
        assert_eq!(parse_pair("deadbeef=cafe\n\n"), Err(CodecError::OddResponse));
    }

    #[test]
    fn test_parse_periodic_pair_with_and_without_prefix() {
        let expected = PairSpec::Periodic {
            period: Duration::from_secs(2),
            response: vec![0x01],
        };
        assert_eq!(parse_pair("timer:2s=01").unwrap(), expected);
        assert_eq!(parse_pair("2s=01").unwrap(), expected);
    }

    #[test]
    fn test_hex_left_side_is_always_a_request() {
        // "10" is valid hex, so it is a request even though it starts with a digit.
        let spec = parse_pair("10=01").unwrap();
        assert_eq!(spec.request(), Some(&[0x10][..]));
    }

    #[test]
    fn test_parse_reports_request_errors() {
        assert_eq!(parse_pair(""), Err(CodecError::Empty));
        assert_eq!(parse_pair("\n"), Err(CodecError::Empty));
        assert_eq!(parse_pair("dead"), Err(CodecError::MissingSeparator));
        assert_eq!(parse_pair("=01"), Err(CodecError::EmptyRequest));
        assert_eq!(parse_pair("abc=01"), Err(CodecError::OddRequest));
        assert_eq!(parse_pair("zz=01"), Err(CodecError::InvalidRequestChar));
        let long = "00".repeat(MAX_REQUEST + 1);
        assert_eq!(parse_pair(&format!("{long}=01")), Err(CodecError::RequestTooLong));
    }

    #[test]
    fn test_parse_reports_response_errors() {
        assert_eq!(parse_pair("01="), Err(CodecError::EmptyResponse));
        assert_eq!(parse_pair("01=abc"), Err(CodecError::OddResponse));
        assert_eq!(parse_pair("01=0g"), Err(CodecError::InvalidResponseChar));
        assert_eq!(parse_pair("01=01=2"), Err(CodecError::InvalidResponseChar));
        let long = "00".repeat(MAX_RESPONSE + 1);
        assert_eq!(parse_pair(&format!("01={long}")), Err(CodecError::ResponseTooLong));
    }

    #[test]
    fn test_parse_reports_period_errors() {
        assert_eq!(
            parse_pair("timer:0s=01"),
            Err(CodecError::InvalidPeriod(DurationError::Zero))
        );
        assert_eq!(
            parse_pair("timer:=01"),
            Err(CodecError::InvalidPeriod(DurationError::Empty))
        );
        assert!(matches!(
            parse_pair("1s2m=01"),
            Err(CodecError::InvalidPeriod(DurationError::UnitOrder(_)))
        ));
    }

    #[test]
    fn test_maximum_sizes_are_accepted() {
        let req = "ab".repeat(MAX_REQUEST);
        let resp = "cd".repeat(MAX_RESPONSE);
        let spec = parse_pair(&format!("{req}={resp}")).unwrap();
        assert_eq!(spec.request().map(<[u8]>::len), Some(MAX_REQUEST));
        assert_eq!(spec.response().len(), MAX_RESPONSE);
    }

    #[test]
    fn test_quoted_text_request_and_response() {
        // Arrange
        let line = "\"AT\"=\"OK\"\r\n";

        // Act
        let spec = parse_pair(line).unwrap();

        // Assert
        assert_eq!(
            spec,
            PairSpec::Sync {
                request: b"AT".to_vec(),
                response: b"OK".to_vec(),
            }
        );
        assert_eq!(format_pair(&spec), "4154=4f4b");
    }

    #[test]
    fn test_quoted_side_mixes_with_hex_and_timer() {
        assert_eq!(
            parse_pair("0d0a=\"ready\"").unwrap().response(),
            b"ready".as_slice()
        );
        assert_eq!(
            parse_pair("\"ping\"=01").unwrap().request(),
            Some(b"ping".as_slice())
        );
        assert_eq!(
            parse_pair("timer:1s=\"tick\"").unwrap(),
            PairSpec::Periodic {
                period: Duration::from_secs(1),
                response: b"tick".to_vec(),
            }
        );
    }

    #[test]
    fn test_quoted_request_may_contain_separator() {
        let spec = parse_pair("\"A=B\"=\"C=D\"").unwrap();

        assert_eq!(spec.request(), Some(b"A=B".as_slice()));
        assert_eq!(spec.response(), b"C=D".as_slice());
    }

    #[test]
    fn test_quoted_text_keeps_size_limits() {
        // Arrange
        let max_req = "r".repeat(MAX_REQUEST);
        let long_req = "r".repeat(MAX_REQUEST + 1);
        let long_resp = "s".repeat(MAX_RESPONSE + 1);

        // Act / Assert
        assert!(parse_pair(&format!("\"{max_req}\"=01")).is_ok());
        assert_eq!(
            parse_pair(&format!("\"{long_req}\"=01")),
            Err(CodecError::RequestTooLong)
        );
        assert_eq!(
            parse_pair(&format!("01=\"{long_resp}\"")),
            Err(CodecError::ResponseTooLong)
        );
        assert_eq!(parse_pair("\"\"=01"), Err(CodecError::EmptyRequest));
        assert_eq!(parse_pair("01=\"\""), Err(CodecError::EmptyResponse));
    }

    #[test]
    fn test_format_is_canonical() {
        assert_eq!(
            format_pair(&parse_pair("DEADBEEF=CAFE").unwrap()),
            "deadbeef=cafe"
        );
        assert_eq!(format_pair(&parse_pair("0m2s=01").unwrap()), "timer:2s=01");
        assert_eq!(
            format_pair(&parse_pair("timer:1h0m0s5ms=FF").unwrap()),
            "timer:1h5ms=ff"
        );
    }

    #[test]
    fn test_error_messages_are_readable() {
        assert_eq!(CodecError::MissingSeparator.to_string(), "missing '='");
        assert_eq!(
            CodecError::InvalidPeriod(DurationError::Zero).to_string(),
            "invalid data definition: zero time value"
        );
    }
}
