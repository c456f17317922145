use miette::NamedSource;
use miette::SourceSpan;
use reqwest::header::HeaderMap;
use reqwest::header::HeaderName;
use reqwest::header::HeaderValue;
use toml::Value;

use crate::validator::ValidationError;

/// Finds the first occurrence of a key in the source contents.
fn find_key_span(src: Option<&(String, String)>, key: &str) -> Option<SourceSpan> {
    let (_, content) = src?;
    let start = content.find(key)?;
    Some(SourceSpan::new(start.into(), key.len()))
}

fn find_value_span(src: Option<&(String, String)>, value: &str) -> Option<SourceSpan> {
    let (_, content) = src?;
    let start = content.find(value)?;
    Some(SourceSpan::new(start.into(), value.len()))
}

macro_rules! header_err {
    ($src:expr, $field:expr, $message:expr, $span:expr) => {
        ValidationError {
            field: $field.to_string(),
            message: $message,
            src: $src.map(|(name, content)| NamedSource::new(name.clone(), content.clone())),
            span: $span,
        }
    };
}

fn parse_single_header(
    header_map: &mut HeaderMap,
    key: &str,
    value: &Value,
    src: Option<&(String, String)>,
) -> Result<(), ValidationError> {
    let v_str = value.as_str().ok_or_else(|| {
        header_err!(
            src,
            key,
            format!("Header value must be a string, got {value}"),
            find_key_span(src, key)
        )
    })?;

    let name = HeaderName::from_bytes(key.as_bytes()).map_err(|e| {
        header_err!(
            src,
            key,
            format!("Invalid header name `{key}`: {e}"),
            find_key_span(src, key)
        )
    })?;

    let h_value = HeaderValue::from_str(v_str).map_err(|e| {
        header_err!(
            src,
            key,
            format!("Invalid header value for `{key}`: {e}"),
            find_value_span(src, v_str)
        )
    })?;

    header_map.insert(name, h_value);
    Ok(())
}

/// Parses a TOML table of header names to string values. An empty table is
/// valid and yields an empty map.
pub fn parse_header_map(
    value: &Value,
    src: Option<&(String, String)>,
) -> Result<HeaderMap, ValidationError> {
    let map = value.as_table().ok_or_else(|| {
        header_err!(
            src,
            "headers",
            format!("Expected a table for headers, got {value}"),
            None
        )
    })?;

    let mut header_map = HeaderMap::new();

    for (k, v) in map {
        parse_single_header(&mut header_map, k, v, src)?;
    }

    Ok(header_map)
}
