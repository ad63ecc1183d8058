//! Extraction of tokens and embedded state from portal markup.
//!
//! Everything that depends on the shape of the portal's HTML lives here, so a
//! page redesign only touches this module. Every extractor fails with
//! [`Error::MarkupChanged`] when its anchor is missing.

use std::sync::OnceLock;

use regex::Regex;
use serde::de::IgnoredAny;

use crate::{Error, Result};

/// Field name of the login form's anti-forgery input.
pub(crate) const AUTHENTICITY_MARKER: &str = "authenticity_token";

fn authenticity_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"<input[^>]*?(?:name="authenticity_token"[^>]*?value="([^"]*)"|value="([^"]*)"[^>]*?name="authenticity_token")"#,
        )
        .unwrap()
    })
}

fn csrf_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"<meta[^>]*?(?:name="csrf-token"[^>]*?content="([^"]*)"|content="([^"]*)"[^>]*?name="csrf-token")"#,
        )
        .unwrap()
    })
}

fn house_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/houses/(\d+)").unwrap())
}

/// Whether a login page response carries the anti-forgery field at all.
/// Its absence means we did not get the page, not that the page changed.
pub(crate) fn has_login_form(html: &str) -> bool {
    html.contains(AUTHENTICITY_MARKER)
}

fn first_nonempty_capture(re: &Regex, html: &str) -> Option<String> {
    let caps = re.captures(html)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str().to_string())
        .filter(|s| !s.is_empty())
}

pub(crate) fn extract_authenticity_token(html: &str) -> Result<String> {
    first_nonempty_capture(authenticity_regex(), html)
        .ok_or_else(|| Error::MarkupChanged("login form authenticity_token not found".into()))
}

pub(crate) fn extract_csrf_token(html: &str) -> Result<String> {
    first_nonempty_capture(csrf_regex(), html)
        .ok_or_else(|| Error::MarkupChanged("csrf-token meta tag not found".into()))
}

pub(crate) fn extract_house_id(html: &str) -> Result<u64> {
    house_regex()
        .captures(html)
        .and_then(|caps| caps[1].parse().ok())
        .ok_or_else(|| Error::MarkupChanged("house identifier not found".into()))
}

/// Locate the JSON array passed to `Nexia.XXL.run('<anchor>', [...])` and
/// return it as raw text. The array is delimited by parsing it, so brackets
/// inside string values do not confuse the extraction.
pub(crate) fn extract_embedded_array<'a>(markup: &'a str, anchor: &str) -> Result<&'a str> {
    let pattern = format!(
        r#"Nexia\.XXL\.run\(\s*['"]{}['"]\s*,\s*"#,
        regex::escape(anchor)
    );
    let re = Regex::new(&pattern)
        .map_err(|e| Error::MarkupChanged(format!("bad anchor {anchor:?}: {e}")))?;
    let start = re
        .find(markup)
        .ok_or_else(|| Error::MarkupChanged(format!("no Nexia.XXL.run call for house {anchor}")))?
        .end();

    let rest = &markup[start..];
    if !rest.starts_with('[') {
        return Err(Error::MarkupChanged(
            "Nexia.XXL.run argument is not an array".into(),
        ));
    }

    let mut stream = serde_json::Deserializer::from_str(rest).into_iter::<IgnoredAny>();
    match stream.next() {
        Some(Ok(_)) => Ok(&rest[..stream.byte_offset()]),
        Some(Err(e)) => Err(Error::MarkupChanged(format!(
            "embedded array is not valid JSON: {e}"
        ))),
        None => Err(Error::MarkupChanged("embedded array is empty".into())),
    }
}
