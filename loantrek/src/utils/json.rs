//! JSON parsing helpers with consistent warning logs.

use serde::de::DeserializeOwned;
use tracing::warn;

use crate::Result;

#[derive(Debug, Clone, Copy)]
pub enum JsonContext<'a> {
    /// The whole local state file.
    StateFile { path: &'a std::path::Path },
    /// A single value inside the local key-value store.
    StateKey { key: &'a str },
    /// A response body from the loan service.
    ApiResponse { url: &'a str },
}

fn warn_parse_error(
    raw_len: usize,
    error: &serde_json::Error,
    ctx: JsonContext<'_>,
    msg: &'static str,
) {
    match ctx {
        JsonContext::StateFile { path } => {
            warn!(
                path = %path.display(),
                raw_len,
                error = %error,
                "{msg}"
            );
        }
        JsonContext::StateKey { key } => {
            warn!(
                key,
                raw_len,
                error = %error,
                "{msg}"
            );
        }
        JsonContext::ApiResponse { url } => {
            warn!(
                url = %url,
                raw_len,
                error = %error,
                "{msg}"
            );
        }
    }
}

/// Parse `raw`, logging and returning `None` on malformed input.
fn parse_optional<T: DeserializeOwned>(
    raw: Option<&str>,
    ctx: JsonContext<'_>,
    msg: &'static str,
) -> Option<T> {
    let raw = raw?;
    match serde_json::from_str(raw) {
        Ok(parsed) => Some(parsed),
        Err(error) => {
            warn_parse_error(raw.len(), &error, ctx, msg);
            None
        }
    }
}

pub fn parse_optional_or_default<T: DeserializeOwned + Default>(
    raw: Option<&str>,
    ctx: JsonContext<'_>,
    msg: &'static str,
) -> T {
    parse_optional(raw, ctx, msg).unwrap_or_default()
}

/// Parse `raw`, logging malformed input and propagating the error.
pub fn parse_or_warn<T: DeserializeOwned>(
    raw: &str,
    ctx: JsonContext<'_>,
    msg: &'static str,
) -> Result<T> {
    serde_json::from_str(raw).map_err(|error| {
        warn_parse_error(raw.len(), &error, ctx, msg);
        error.into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_optional_or_default_on_garbage() {
        let parsed: Vec<String> = parse_optional_or_default(
            Some("{not json"),
            JsonContext::StateKey { key: "k" },
            "bad value",
        );
        assert!(parsed.is_empty());
    }

    #[test]
    fn test_parse_optional_none_passthrough() {
        let parsed: Option<Vec<String>> =
            parse_optional(None, JsonContext::StateKey { key: "k" }, "bad value");
        assert!(parsed.is_none());
    }

    #[test]
    fn test_parse_or_warn_propagates() {
        let result: Result<u32> = parse_or_warn(
            "\"nope\"",
            JsonContext::ApiResponse { url: "http://x" },
            "bad body",
        );
        assert!(matches!(result, Err(crate::Error::Serialization(_))));
    }
}
