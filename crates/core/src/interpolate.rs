//! `::name::` placeholder substitution for path templates.
//!
//! Matching is strictly bidirectional: every token must have a same-named
//! parameter key, and every parameter key must be used by some token.
//! Unused keys are an error on purpose — they are almost always stale
//! configuration left behind by a renamed placeholder.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::error::ResolveError;
use crate::record::DataFormat;

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"::([A-Za-z_][A-Za-z0-9_]*)::").expect("valid placeholder regex"));

/// Substitute every `::name::` token in `template` from `params`.
///
/// Fails with [`ResolveError::UnresolvedPlaceholder`] for a token with no
/// matching key and [`ResolveError::UnusedParameter`] for a key matching no
/// token. Parameter values must render as scalars; splicing an array or
/// object into a path is a format mismatch.
pub fn interpolate(
    template: &str,
    params: &BTreeMap<String, Value>,
) -> Result<String, ResolveError> {
    let mut used = BTreeSet::new();
    let mut result = String::with_capacity(template.len());
    let mut last_end = 0;

    for caps in PLACEHOLDER_RE.captures_iter(template) {
        let whole = caps.get(0).expect("capture 0 always present");
        let token = &caps[1];

        let value = params
            .get(token)
            .ok_or_else(|| ResolveError::UnresolvedPlaceholder {
                token: token.to_string(),
            })?;
        used.insert(token.to_string());

        result.push_str(&template[last_end..whole.start()]);
        result.push_str(&scalar_to_string(token, value)?);
        last_end = whole.end();
    }
    result.push_str(&template[last_end..]);

    if let Some(stale) = params.keys().find(|key| !used.contains(*key)) {
        return Err(ResolveError::UnusedParameter { key: stale.clone() });
    }

    Ok(result)
}

/// Token names appearing in a template, in order of appearance.
///
/// Used by configuration validation to check token/key symmetry statically,
/// before any stream runs.
pub fn template_tokens(template: &str) -> Vec<String> {
    PLACEHOLDER_RE
        .captures_iter(template)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Render a resolved parameter value for splicing into a path.
fn scalar_to_string(token: &str, value: &Value) -> Result<String, ResolveError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Array(_) => Err(ResolveError::FormatMismatch {
            name: token.to_string(),
            expected: "a scalar path segment",
            actual: DataFormat::List,
        }),
        Value::Null | Value::Object(_) => Err(ResolveError::FormatMismatch {
            name: token.to_string(),
            expected: "a scalar path segment",
            actual: DataFormat::Json,
        }),
    }
}
