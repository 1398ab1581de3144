//! Registry of named zero-argument functions invoked during parameter
//! resolution.
//!
//! A macro computes a value at run time — a school-year string, a date
//! stamp — that configuration references as `"macro:NAME"`. Registration is
//! per process setup; [`MacroRegistry::with_builtins`] ships the macros the
//! stock configurations use.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Datelike, Local};
use serde_json::Value;

use crate::error::ResolveError;

/// A macro body: zero arguments, returns a parameter value or a failure
/// description.
pub type MacroFn = Arc<dyn Fn() -> Result<Value, String> + Send + Sync>;

/// Name → macro function registry.
#[derive(Clone, Default)]
pub struct MacroRegistry {
    macros: BTreeMap<String, MacroFn>,
}

impl MacroRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-loaded with the builtin macros:
    /// `SCHOOL_YEAR`, `YYYYMMDD`, `TIMESTAMP`.
    pub fn with_builtins() -> Self {
        let mut reg = Self::new();
        reg.register("SCHOOL_YEAR", || Ok(Value::from(school_year(Local::now().date_naive()))));
        reg.register("YYYYMMDD", || {
            Ok(Value::from(Local::now().format("%Y%m%d").to_string()))
        });
        reg.register("TIMESTAMP", || {
            Ok(Value::from(Local::now().format("%Y%m%dT%H%M%S").to_string()))
        });
        reg
    }

    /// Register `name`, replacing any previous registration.
    pub fn register<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn() -> Result<Value, String> + Send + Sync + 'static,
    {
        self.macros.insert(name.into(), Arc::new(f));
    }

    /// Whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.macros.contains_key(name)
    }

    /// Invoke the macro named `name`.
    ///
    /// Unregistered names fail with [`ResolveError::MacroNotFound`]; a
    /// failure inside the macro body is wrapped as
    /// [`ResolveError::MacroFailed`], never swallowed.
    pub fn invoke(&self, name: &str) -> Result<Value, ResolveError> {
        let f = self
            .macros
            .get(name)
            .ok_or_else(|| ResolveError::MacroNotFound(name.to_string()))?;
        f().map_err(|message| ResolveError::MacroFailed {
            name: name.to_string(),
            message,
        })
    }
}

impl std::fmt::Debug for MacroRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MacroRegistry")
            .field("names", &self.macros.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// The school year a date falls in: through July it is the calendar year,
/// from August onward it is the next calendar year.
fn school_year(date: chrono::NaiveDate) -> i64 {
    if date.month() <= 7 {
        i64::from(date.year())
    } else {
        i64::from(date.year()) + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::NaiveDate;

    #[test]
    fn school_year_cutoff() {
        let spring = NaiveDate::from_ymd_opt(2025, 3, 15).unwrap();
        let summer = NaiveDate::from_ymd_opt(2025, 7, 31).unwrap();
        let fall = NaiveDate::from_ymd_opt(2025, 8, 1).unwrap();

        assert_eq!(school_year(spring), 2025);
        assert_eq!(school_year(summer), 2025);
        assert_eq!(school_year(fall), 2026);
    }

    #[test]
    fn invoke_registered_macro() {
        let mut reg = MacroRegistry::new();
        reg.register("ANSWER", || Ok(Value::from(42)));
        assert_eq!(reg.invoke("ANSWER").unwrap(), Value::from(42));
    }

    #[test]
    fn unregistered_macro_fails() {
        let reg = MacroRegistry::new();
        let err = reg.invoke("NOPE").unwrap_err();
        assert_matches!(err, ResolveError::MacroNotFound(name) if name == "NOPE");
    }

    #[test]
    fn macro_failure_is_wrapped() {
        let mut reg = MacroRegistry::new();
        reg.register("BROKEN", || Err("clock went backwards".to_string()));
        let err = reg.invoke("BROKEN").unwrap_err();
        assert_matches!(
            err,
            ResolveError::MacroFailed { name, message }
                if name == "BROKEN" && message == "clock went backwards"
        );
    }

    #[test]
    fn builtins_are_registered() {
        let reg = MacroRegistry::with_builtins();
        assert!(reg.contains("SCHOOL_YEAR"));
        assert!(reg.contains("YYYYMMDD"));
        assert!(reg.contains("TIMESTAMP"));
        assert!(reg.invoke("YYYYMMDD").unwrap().is_string());
    }
}
