//! `scheme:key=value;key=value?opt=value&opt=value` resource URIs.
//!
//! Values in the `;` part take precedence over the `?` part. Both parts are
//! form-urlencoded, so `%3B` and `%26` can be used inside values.

use url::form_urlencoded;

use crate::error::{KmsError, KmsResult};

/// Keys whose values never leave the connector in errors or logs.
const SECRET_KEYS: &[&str] = &["client-secret"];

const MASK: &str = "***";

/// A parsed resource URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uri {
    scheme: String,
    values: Vec<(String, String)>,
    query: Vec<(String, String)>,
}

impl Uri {
    /// Parses a resource URI with any scheme.
    ///
    /// # Errors
    ///
    /// Returns `KmsError::MalformedAddress` if the scheme is missing or not
    /// valid, or if a `;`/`&` separated segment is not a `key=value` pair.
    pub fn parse(raw: &str) -> KmsResult<Self> {
        let Some((scheme, rest)) = raw.split_once(':') else {
            return Err(KmsError::malformed(raw, "scheme is missing"));
        };
        if !is_valid_scheme(scheme) {
            return Err(KmsError::malformed(raw, format!("invalid scheme '{scheme}'")));
        }

        let (opaque, query) = rest.split_once('?').unwrap_or((rest, ""));

        Ok(Self {
            scheme: scheme.to_owned(),
            values: parse_pairs(raw, opaque, ';')?,
            query: parse_pairs(raw, query, '&')?,
        })
    }

    /// Parses a resource URI and checks its scheme, ignoring case.
    ///
    /// # Errors
    ///
    /// Returns `KmsError::MalformedAddress` if the URI cannot be parsed or the
    /// scheme is not the expected one.
    pub fn parse_with_scheme(scheme: &str, raw: &str) -> KmsResult<Self> {
        let uri = Self::parse(raw)?;
        if !uri.scheme.eq_ignore_ascii_case(scheme) {
            return Err(KmsError::malformed(
                raw,
                format!("scheme '{}' is not expected, want '{scheme}'", uri.scheme),
            ));
        }
        Ok(uri)
    }

    /// Builds a URI string with the given scheme and `;` separated values.
    ///
    /// Keys are emitted in sorted order so the result is canonical.
    #[must_use]
    pub fn format(scheme: &str, values: &[(&str, &str)]) -> String {
        let mut sorted = values.to_vec();
        sorted.sort_unstable();

        let encoded = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(sorted)
            .finish();
        format!("{scheme}:{}", encoded.replace('&', ";"))
    }

    /// Returns the scheme as written.
    #[must_use]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Returns the first non-empty value for `key`, looking at the `;` part
    /// first and then at the query.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        lookup(&self.values, key).or_else(|| lookup(&self.query, key))
    }

    /// Returns the boolean value of `key`, or `None` if it is absent.
    ///
    /// `true`, `1`, `yes` and `on` are truthy regardless of case; every other
    /// value is false.
    #[must_use]
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).map(|v| {
            ["true", "1", "yes", "on"]
                .iter()
                .any(|t| v.eq_ignore_ascii_case(t))
        })
    }
}

/// Masks the value of every secret parameter of `raw`, in both the `;` and
/// `?` parts.
///
/// Works on malformed input too, so it can be applied to any string that is
/// about to be stored in an error or a log record.
#[must_use]
pub fn redact(raw: &str) -> String {
    let (scheme, rest) = match raw.split_once(':') {
        Some((scheme, rest)) => (Some(scheme), rest),
        None => (None, raw),
    };
    let (opaque, query) = match rest.split_once('?') {
        Some((opaque, query)) => (opaque, Some(query)),
        None => (rest, None),
    };

    let mut out = String::with_capacity(raw.len());
    if let Some(scheme) = scheme {
        out.push_str(scheme);
        out.push(':');
    }
    out.push_str(&redact_part(opaque, ';'));
    if let Some(query) = query {
        out.push('?');
        out.push_str(&redact_part(query, '&'));
    }
    out
}

fn redact_part(part: &str, separator: char) -> String {
    part.split(separator)
        .map(redact_segment)
        .collect::<Vec<_>>()
        .join(&separator.to_string())
}

fn redact_segment(segment: &str) -> String {
    let Some((key, _)) = segment.split_once('=') else {
        return segment.to_owned();
    };
    let decoded: String = form_urlencoded::parse(key.as_bytes())
        .map(|(k, _)| k.into_owned())
        .collect();
    let secret = decoded.is_empty() || SECRET_KEYS.iter().any(|k| decoded.trim().eq_ignore_ascii_case(k));
    if secret {
        format!("{key}={MASK}")
    } else {
        segment.to_owned()
    }
}

fn lookup<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(k, v)| k == key && !v.is_empty())
        .map(|(_, v)| v.as_str())
}

fn is_valid_scheme(scheme: &str) -> bool {
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

fn parse_pairs(raw: &str, part: &str, separator: char) -> KmsResult<Vec<(String, String)>> {
    let mut pairs = Vec::new();
    for segment in part.split(separator).filter(|s| !s.is_empty()) {
        match segment.split_once('=') {
            Some((key, _)) if !key.is_empty() => {
                pairs.extend(form_urlencoded::parse(segment.as_bytes()).map(|(k, v)| (k.into_owned(), v.into_owned())));
            }
            _ => {
                return Err(KmsError::malformed(
                    raw,
                    format!("segment '{}' is not a key=value pair", redact_segment(segment)),
                ));
            }
        }
    }
    Ok(pairs)
}
