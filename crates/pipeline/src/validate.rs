//! Structural and referential validation of a stream configuration.
//!
//! Runs once at stream construction, before anything executes. Findings
//! are collected rather than short-circuited so a misconfigured stream can
//! be fixed in one pass; any finding prevents the stream from running at
//! all.
//!
//! `step:` references inside *extract* tasks are checked statically
//! against the outputs of earlier extract tasks (the store is populated in
//! declared order, with no look-ahead). `step:` references inside *load*
//! parameters may also name transform outputs, which are unknown until run
//! time, so those are left to run-time resolution.

use std::collections::BTreeSet;

use databridge_core::interpolate::template_tokens;
use databridge_core::{
    ConfigError, ExtractTask, LoadTask, MacroRegistry, ParamSpec, Protocol, StreamConfig,
};

use crate::transform::FunctionRegistry;

/// Validate `config` against the process-wide registries.
pub fn validate(
    config: &StreamConfig,
    macros: &MacroRegistry,
    functions: &FunctionRegistry,
) -> Result<(), ConfigError> {
    let mut findings = Vec::new();

    for (name, dest) in &config.destinations {
        findings.extend(dest.findings(name));
    }

    let mut declared_outputs: Vec<String> = Vec::new();
    let mut seen_outputs = BTreeSet::new();
    for task in &config.extract {
        check_extract_task(task, config, macros, &declared_outputs, &mut findings);

        if !seen_outputs.insert(task.output.clone()) {
            findings.push(format!(
                "extract task '{}': duplicate output name '{}'",
                task.name, task.output
            ));
        }
        declared_outputs.push(task.output.clone());
    }

    if !functions.has_transform(&config.transform) {
        findings.push(format!(
            "transform '{}' is not registered",
            config.transform
        ));
    }

    for task in &config.load {
        check_load_task(task, config, macros, functions, &mut findings);
    }

    if findings.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Invalid(findings))
    }
}

fn check_extract_task(
    task: &ExtractTask,
    config: &StreamConfig,
    macros: &MacroRegistry,
    earlier_outputs: &[String],
    findings: &mut Vec<String>,
) {
    let ctx = format!("extract task '{}'", task.name);

    if task.name.trim().is_empty() {
        findings.push("extract task with empty name".to_string());
    }
    if task.output.trim().is_empty() {
        findings.push(format!("{ctx}: empty output name"));
    }

    let Some(source) = config.sources.get(&task.source) else {
        findings.push(format!("{ctx}: references undeclared source '{}'", task.source));
        return;
    };

    match source.protocol() {
        Protocol::Sql => {
            match &task.query_file {
                None => findings.push(format!("{ctx}: sql source requires a query_file")),
                Some(path) => {
                    if !path.ends_with(".sql") {
                        findings.push(format!("{ctx}: query_file '{path}' must end with '.sql'"));
                    }
                    check_relative_file(path, &ctx, "query_file", findings);
                }
            }
            if task.remote_file.is_some() {
                findings.push(format!("{ctx}: remote_file is not valid for sql sources"));
            }
        }
        Protocol::Fileshare | Protocol::Sftp | Protocol::GoogleDrive => {
            match &task.remote_file {
                None => findings.push(format!(
                    "{ctx}: {} source requires a remote_file",
                    source.protocol()
                )),
                Some(path) => check_relative_file(path, &ctx, "remote_file", findings),
            }
            if task.query_file.is_some() {
                findings.push(format!(
                    "{ctx}: query_file is only valid for sql sources"
                ));
            }
            if !task.query_params.is_empty() {
                findings.push(format!(
                    "{ctx}: query_params are only valid for sql sources"
                ));
            }
        }
        Protocol::Smtp => {
            findings.push(format!("{ctx}: smtp cannot be used as a source"));
        }
    }

    check_param_refs(&task.query_params, macros, Some(earlier_outputs), &ctx, findings);
    check_param_refs(&task.path_params, macros, Some(earlier_outputs), &ctx, findings);

    let mut tokens = BTreeSet::new();
    if let Some(path) = &task.query_file {
        tokens.extend(template_tokens(path));
    }
    if let Some(path) = &task.remote_file {
        tokens.extend(template_tokens(path));
    }
    check_token_symmetry(&tokens, task.path_params.keys(), &ctx, findings);
}

fn check_load_task(
    task: &LoadTask,
    config: &StreamConfig,
    macros: &MacroRegistry,
    functions: &FunctionRegistry,
    findings: &mut Vec<String>,
) {
    let ctx = format!("load task '{}'", task.name);

    if task.name.trim().is_empty() {
        findings.push("load task with empty name".to_string());
    }

    if task.input.is_empty() {
        findings.push(format!("{ctx}: input list is empty"));
    }
    let mut seen_inputs = BTreeSet::new();
    for input in &task.input {
        if input.trim().is_empty() {
            findings.push(format!("{ctx}: empty input name"));
        } else if !seen_inputs.insert(input.as_str()) {
            findings.push(format!("{ctx}: duplicate input name '{input}'"));
        }
    }

    let Some(dest) = config.destinations.get(&task.destination) else {
        findings.push(format!(
            "{ctx}: references undeclared destination '{}'",
            task.destination
        ));
        return;
    };

    match dest.protocol() {
        Protocol::Smtp => {
            match &task.email_builder {
                None => findings.push(format!("{ctx}: smtp destination requires an email_builder")),
                Some(name) => {
                    if !functions.has_email_builder(name) {
                        findings.push(format!("{ctx}: email builder '{name}' is not registered"));
                    }
                }
            }
            if !task.email_params.contains_key("recipients") {
                findings.push(format!("{ctx}: email_params must include 'recipients'"));
            }
            if task.remote_dir.is_some() {
                findings.push(format!("{ctx}: remote_dir is not valid for smtp destinations"));
            }
        }
        Protocol::Fileshare | Protocol::Sftp | Protocol::GoogleDrive => {
            match &task.remote_dir {
                None => findings.push(format!(
                    "{ctx}: {} destination requires a remote_dir",
                    dest.protocol()
                )),
                Some(path) => {
                    if path.starts_with('/') {
                        findings.push(format!(
                            "{ctx}: remote_dir '{path}' must be a relative path"
                        ));
                    }
                }
            }
            if task.email_builder.is_some() {
                findings.push(format!(
                    "{ctx}: email_builder is only valid for smtp destinations"
                ));
            }
            if !task.email_params.is_empty() {
                findings.push(format!(
                    "{ctx}: email_params are only valid for smtp destinations"
                ));
            }
        }
        Protocol::Sql => {
            findings.push(format!("{ctx}: sql cannot be used as a destination"));
        }
    }

    // Step references in load parameters may name transform outputs, so
    // only macro references are checkable here.
    check_param_refs(&task.path_params, macros, None, &ctx, findings);
    check_param_refs(&task.email_params, macros, None, &ctx, findings);

    let mut tokens = BTreeSet::new();
    if let Some(path) = &task.remote_dir {
        tokens.extend(template_tokens(path));
    }
    check_token_symmetry(&tokens, task.path_params.keys(), &ctx, findings);
}

/// Check `macro:` registration and, when `earlier_outputs` is given,
/// `step:` references against outputs declared by earlier tasks.
fn check_param_refs<'a>(
    params: impl IntoIterator<Item = (&'a String, &'a ParamSpec)>,
    macros: &MacroRegistry,
    earlier_outputs: Option<&[String]>,
    ctx: &str,
    findings: &mut Vec<String>,
) {
    for (key, spec) in params {
        match spec {
            ParamSpec::Static(_) => {}
            ParamSpec::Macro(name) => {
                if !macros.contains(name) {
                    findings.push(format!(
                        "{ctx}: parameter '{key}' references unregistered macro '{name}'"
                    ));
                }
            }
            ParamSpec::Step(name) => {
                if let Some(outputs) = earlier_outputs {
                    if !outputs.iter().any(|o| o == name) {
                        findings.push(format!(
                            "{ctx}: parameter '{key}' references step output '{name}' \
                             not produced by an earlier task"
                        ));
                    }
                }
            }
        }
    }
}

/// The set of `::tokens::` must exactly equal the set of path parameter
/// keys.
fn check_token_symmetry<'a>(
    tokens: &BTreeSet<String>,
    keys: impl Iterator<Item = &'a String>,
    ctx: &str,
    findings: &mut Vec<String>,
) {
    let keys: BTreeSet<&String> = keys.collect();
    for token in tokens {
        if !keys.contains(token) {
            findings.push(format!(
                "{ctx}: placeholder '::{token}::' has no matching path parameter"
            ));
        }
    }
    for key in keys {
        if !tokens.contains(key.as_str()) {
            findings.push(format!(
                "{ctx}: path parameter '{key}' matches no placeholder"
            ));
        }
    }
}

fn check_relative_file(path: &str, ctx: &str, field: &str, findings: &mut Vec<String>) {
    if path.starts_with('/') {
        findings.push(format!("{ctx}: {field} '{path}' must be a relative path"));
    }
    if path.ends_with('/') {
        findings.push(format!(
            "{ctx}: {field} '{path}' must reference a file, not a directory"
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use databridge_core::{DestConfig, SourceConfig, StreamPolicy};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn registries() -> (MacroRegistry, FunctionRegistry) {
        let mut macros = MacroRegistry::new();
        macros.register("SCHOOL_YEAR", || Ok(json!("2025")));
        let mut functions = FunctionRegistry::new();
        functions.register_transform("format_grades", |data| Ok(data));
        functions.register_email_builder(
            "build_report_email",
            |_data: &BTreeMap<String, &databridge_core::StreamData>,
             _params: &BTreeMap<String, serde_json::Value>| {
                Ok(crate::transform::EmailMessage {
                    subject: "s".into(),
                    body: "b".into(),
                    attachments: vec![],
                })
            },
        );
        (macros, functions)
    }

    fn base_config() -> StreamConfig {
        serde_json::from_value(json!({
            "sources": {
                "db1": {
                    "protocol": "sql",
                    "conn_string": "jdbc:openedge://db.district.example:12345",
                    "user": "svc",
                    "password": "secret",
                    "driver_name": "com.ddtek.jdbc.openedge.OpenEdgeDriver",
                },
                "share": {"protocol": "fileshare", "mount_path": "/mnt/exports"},
            },
            "destinations": {
                "sftp_server": {
                    "protocol": "sftp",
                    "host": "files.vendor.example",
                    "user": "svc",
                    "password": "secret",
                },
                "smtp_server": {
                    "protocol": "smtp",
                    "host": "smtp.district.example",
                    "default_sender": "jobs@district.example",
                },
            },
            "extract": [
                {
                    "name": "students",
                    "source": "db1",
                    "output": "students.sql",
                    "query_file": "queries/students.sql",
                },
            ],
            "transform": "format_grades",
            "load": [
                {
                    "name": "upload_grades",
                    "destination": "sftp_server",
                    "input": "formatted_grades.csv",
                    "remote_dir": "inbound/grades",
                },
            ],
        }))
        .unwrap()
    }

    #[test]
    fn valid_config_passes() {
        let (macros, functions) = registries();
        assert!(validate(&base_config(), &macros, &functions).is_ok());
    }

    #[test]
    fn duplicate_output_names_rejected() {
        let (macros, functions) = registries();
        let mut config = base_config();
        let mut dup = config.extract[0].clone();
        dup.name = "students_again".into();
        config.extract.push(dup);

        let ConfigError::Invalid(findings) =
            validate(&config, &macros, &functions).unwrap_err();
        assert!(findings
            .iter()
            .any(|f| f.contains("duplicate output name 'students.sql'")));
    }

    #[test]
    fn undeclared_source_and_dest_rejected() {
        let (macros, functions) = registries();
        let mut config = base_config();
        config.extract[0].source = "db9".into();
        config.load[0].destination = "nowhere".into();

        let ConfigError::Invalid(findings) =
            validate(&config, &macros, &functions).unwrap_err();
        assert!(findings.iter().any(|f| f.contains("undeclared source 'db9'")));
        assert!(findings
            .iter()
            .any(|f| f.contains("undeclared destination 'nowhere'")));
    }

    #[test]
    fn step_ref_must_name_earlier_output() {
        let (macros, functions) = registries();
        let mut config = base_config();
        config.extract[0].query_params.insert(
            "ids".into(),
            ParamSpec::Step("high_achiever_IDs".into()),
        );

        let ConfigError::Invalid(findings) =
            validate(&config, &macros, &functions).unwrap_err();
        assert!(findings
            .iter()
            .any(|f| f.contains("'high_achiever_IDs'") && f.contains("earlier task")));
    }

    #[test]
    fn step_ref_to_earlier_output_accepted() {
        let (macros, functions) = registries();
        let mut config = base_config();
        let mut second = config.extract[0].clone();
        second.name = "parents".into();
        second.output = "parents.sql".into();
        second
            .query_params
            .insert("ids".into(), ParamSpec::Step("students.sql".into()));
        config.extract.push(second);

        assert!(validate(&config, &macros, &functions).is_ok());
    }

    #[test]
    fn token_key_symmetry_enforced_statically() {
        let (macros, functions) = registries();

        // Token without key.
        let mut config = base_config();
        config.extract[0].query_file = Some("queries/students_::year::.sql".into());
        let ConfigError::Invalid(findings) =
            validate(&config, &macros, &functions).unwrap_err();
        assert!(findings.iter().any(|f| f.contains("'::year::'")));

        // Key without token.
        let mut config = base_config();
        config.extract[0]
            .path_params
            .insert("year".into(), ParamSpec::Static(json!("2025")));
        let ConfigError::Invalid(findings) =
            validate(&config, &macros, &functions).unwrap_err();
        assert!(findings
            .iter()
            .any(|f| f.contains("path parameter 'year' matches no placeholder")));
    }

    #[test]
    fn unregistered_macro_and_transform_rejected() {
        let (macros, functions) = registries();
        let mut config = base_config();
        config.transform = "mystery_fn".into();
        config.extract[0].query_file = Some("queries/students_::year::.sql".into());
        config.extract[0]
            .path_params
            .insert("year".into(), ParamSpec::Macro("NOT_A_MACRO".into()));

        let ConfigError::Invalid(findings) =
            validate(&config, &macros, &functions).unwrap_err();
        assert!(findings.iter().any(|f| f.contains("'mystery_fn'")));
        assert!(findings.iter().any(|f| f.contains("'NOT_A_MACRO'")));
    }

    #[test]
    fn smtp_task_requires_builder_and_recipients() {
        let (macros, functions) = registries();
        let mut config = base_config();
        config.load.push(
            serde_json::from_value(json!({
                "name": "notify",
                "destination": "smtp_server",
                "input": [],
            }))
            .unwrap(),
        );

        let ConfigError::Invalid(findings) =
            validate(&config, &macros, &functions).unwrap_err();
        assert!(findings.iter().any(|f| f.contains("requires an email_builder")));
        assert!(findings.iter().any(|f| f.contains("must include 'recipients'")));
        assert!(findings.iter().any(|f| f.contains("input list is empty")));
    }

    #[test]
    fn absolute_and_directory_paths_rejected() {
        let (macros, functions) = registries();
        let mut config = base_config();
        config.extract[0].query_file = Some("/abs/queries/students.sql".into());
        config.load[0].remote_dir = Some("/abs/inbound".into());

        let ConfigError::Invalid(findings) =
            validate(&config, &macros, &functions).unwrap_err();
        assert!(findings
            .iter()
            .any(|f| f.contains("query_file") && f.contains("relative")));
        assert!(findings
            .iter()
            .any(|f| f.contains("remote_dir") && f.contains("relative")));
    }

    #[test]
    fn policy_field_is_config_not_validation_concern() {
        let (macros, functions) = registries();
        let mut config = base_config();
        config.policy = StreamPolicy::default();
        assert!(validate(&config, &macros, &functions).is_ok());
    }
}
