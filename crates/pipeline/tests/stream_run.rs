//! End-to-end stream runs against mock protocol adapters.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use databridge_core::{MacroRegistry, Protocol, StreamData, Table};
use databridge_pipeline::{
    AdapterError, AdapterRegistry, EmailMessage, ExtractAdapter, ExtractContext, FunctionRegistry,
    LoadAdapter, LoadContext, LoadReceipt, RunStatus, Stage, StreamOrchestrator, StreamState,
    TaskStatus, TransformError,
};
use serde_json::{json, Value};

// ---------------------------------------------------------------------------
// Mock adapters
// ---------------------------------------------------------------------------

/// What one extract dispatch looked like, after resolution.
#[derive(Debug, Clone)]
struct ExtractCall {
    task: String,
    query_file: Option<String>,
    remote_file: Option<String>,
    query_params: BTreeMap<String, Value>,
}

#[derive(Default)]
struct MockExtract {
    responses: BTreeMap<String, StreamData>,
    calls: Mutex<Vec<ExtractCall>>,
    fail_next: AtomicU32,
}

impl MockExtract {
    fn respond(mut self, task: &str, record: StreamData) -> Self {
        self.responses.insert(task.to_string(), record);
        self
    }

    fn fail_next(self, count: u32) -> Self {
        self.fail_next.store(count, Ordering::SeqCst);
        self
    }

    fn calls(&self) -> Vec<ExtractCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExtractAdapter for MockExtract {
    async fn extract(&self, ctx: ExtractContext<'_>) -> Result<StreamData, AdapterError> {
        self.calls.lock().unwrap().push(ExtractCall {
            task: ctx.task.to_string(),
            query_file: ctx.query_file.clone(),
            remote_file: ctx.remote_file.clone(),
            query_params: ctx.query_params.clone(),
        });
        if self.fail_next.load(Ordering::SeqCst) > 0 {
            self.fail_next.fetch_sub(1, Ordering::SeqCst);
            return Err(AdapterError::Protocol("connection reset".to_string()));
        }
        match self.responses.get(ctx.task) {
            Some(record) => Ok(record.clone()),
            None => Ok(StreamData::table(Table::new(
                vec!["id".into()],
                vec![vec![json!(1)]],
            ))),
        }
    }
}

/// What one load dispatch looked like, after resolution.
#[derive(Debug, Clone)]
struct Delivery {
    task: String,
    remote_dir: Option<String>,
    record_names: Vec<String>,
    recipients: Vec<String>,
    subject: Option<String>,
}

#[derive(Default)]
struct MockLoad {
    deliveries: Mutex<Vec<Delivery>>,
    fail_tasks: Vec<String>,
}

impl MockLoad {
    fn fail_task(mut self, task: &str) -> Self {
        self.fail_tasks.push(task.to_string());
        self
    }

    fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().unwrap().clone()
    }
}

#[async_trait]
impl LoadAdapter for MockLoad {
    async fn load(&self, ctx: LoadContext<'_>) -> Result<LoadReceipt, AdapterError> {
        if self.fail_tasks.iter().any(|t| t == ctx.task) {
            return Err(AdapterError::Protocol("host unreachable".to_string()));
        }
        self.deliveries.lock().unwrap().push(Delivery {
            task: ctx.task.to_string(),
            remote_dir: ctx.remote_dir.clone(),
            record_names: ctx.records.keys().cloned().collect(),
            recipients: ctx
                .email
                .as_ref()
                .map(|e| e.recipients.clone())
                .unwrap_or_default(),
            subject: ctx.email.as_ref().map(|e| e.message.subject.clone()),
        });
        Ok(LoadReceipt {
            detail: format!("delivered {} record(s)", ctx.records.len()),
            records_processed: Some(ctx.records.len() as u64),
        })
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

struct Harness {
    extract: Arc<MockExtract>,
    load: Arc<MockLoad>,
    adapters: Arc<AdapterRegistry>,
}

impl Harness {
    fn new(extract: MockExtract, load: MockLoad) -> Self {
        let extract = Arc::new(extract);
        let load = Arc::new(load);
        let mut adapters = AdapterRegistry::new();
        for protocol in [Protocol::Sql, Protocol::Fileshare, Protocol::Sftp] {
            adapters.register_extract(protocol, extract.clone());
        }
        for protocol in [Protocol::Fileshare, Protocol::Sftp, Protocol::Smtp] {
            adapters.register_load(protocol, load.clone());
        }
        Self {
            extract,
            load,
            adapters: Arc::new(adapters),
        }
    }
}

fn macros() -> MacroRegistry {
    let mut reg = MacroRegistry::new();
    reg.register("SCHOOL_YEAR", || Ok(json!(2025)));
    reg.register("DAY", || Ok(json!("20250831")));
    reg
}

/// Transform used by most tests: renames the extracted table to the
/// CSV-shaped record the load tasks expect. Also checks that the input is
/// exactly the extraction output, nothing more.
fn format_grades(functions: &mut FunctionRegistry) {
    functions.register_transform("format_grades", |data: BTreeMap<String, StreamData>| {
        if data.len() != 1 {
            return Err(TransformError::new(format!(
                "expected exactly the extraction output, got {} record(s)",
                data.len()
            )));
        }
        let Some(students) = data.get("students.sql") else {
            return Err(TransformError::new("missing 'students.sql'"));
        };
        let mut out = BTreeMap::new();
        out.insert(
            "formatted_grades.csv".to_string(),
            students.clone().with_file_name("formatted_grades.csv"),
        );
        Ok(out)
    });
}

fn base_config() -> databridge_core::StreamConfig {
    serde_json::from_value(json!({
        "sources": {
            "db1": {
                "protocol": "sql",
                "conn_string": "jdbc:openedge://db.district.example:12345",
                "user": "svc",
                "password": "secret",
                "driver_name": "com.ddtek.jdbc.openedge.OpenEdgeDriver",
            },
            "vendor_sftp": {
                "protocol": "sftp",
                "host": "files.vendor.example",
                "user": "svc",
                "password": "secret",
            },
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
                "remote_dir": "archive/::school_year::",
                "path_params": {"school_year": "macro:SCHOOL_YEAR"},
            },
        ],
    }))
    .unwrap()
}

fn orchestrator(
    harness: &Harness,
    config: databridge_core::StreamConfig,
    functions: FunctionRegistry,
) -> StreamOrchestrator {
    StreamOrchestrator::new(
        "grades_export",
        config,
        harness.adapters.clone(),
        macros(),
        Arc::new(functions),
    )
    .unwrap()
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn happy_path_extract_transform_load() {
    let harness = Harness::new(MockExtract::default(), MockLoad::default());
    let mut functions = FunctionRegistry::new();
    format_grades(&mut functions);

    let report = orchestrator(&harness, base_config(), functions)
        .run()
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Success);
    assert_eq!(report.exit_code(), 0);
    assert_eq!(report.stream, "grades_export");
    assert_eq!(report.tasks.len(), 3);
    assert!(report.tasks.iter().all(|t| t.status == TaskStatus::Ok));

    let calls = harness.extract.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].task, "students");
    assert_eq!(calls[0].query_file.as_deref(), Some("queries/students.sql"));

    // The macro value fed the path template before dispatch.
    let deliveries = harness.load.deliveries();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].remote_dir.as_deref(), Some("archive/2025"));
    assert_eq!(deliveries[0].record_names, vec!["formatted_grades.csv"]);
}

#[tokio::test]
async fn unknown_step_reference_fails_before_any_query() {
    let harness = Harness::new(MockExtract::default(), MockLoad::default());
    let mut functions = FunctionRegistry::new();
    format_grades(&mut functions);

    let mut config = base_config();
    config.extract[0].query_params.insert(
        "ids".into(),
        "step:high_achiever_IDs".parse().unwrap(),
    );

    let err = orchestrator(&harness, config, functions)
        .run()
        .await
        .unwrap_err();
    assert!(err.to_string().contains("high_achiever_IDs"));
    assert!(harness.extract.calls().is_empty());
}

#[tokio::test]
async fn successive_query_reads_earlier_output() {
    let extract = MockExtract::default()
        .respond("high_achievers", StreamData::list(vec![json!(11), json!(12)]))
        .respond(
            "parents",
            StreamData::table(Table::new(vec!["email".into()], vec![])),
        );
    let harness = Harness::new(extract, MockLoad::default());

    let mut functions = FunctionRegistry::new();
    functions.register_transform("format_grades", |data: BTreeMap<String, StreamData>| {
        let mut out = BTreeMap::new();
        out.insert(
            "formatted_grades.csv".to_string(),
            data["parents.sql"].clone().with_file_name("formatted_grades.csv"),
        );
        Ok(out)
    });

    let mut config = base_config();
    config.extract[0].name = "high_achievers".into();
    config.extract[0].output = "high_achiever_IDs".into();
    config.extract.push(
        serde_json::from_value(json!({
            "name": "parents",
            "source": "db1",
            "output": "parents.sql",
            "query_file": "queries/parents.sql",
            "query_params": {"ids": "step:high_achiever_IDs"},
        }))
        .unwrap(),
    );

    let report = orchestrator(&harness, config, functions)
        .run()
        .await
        .unwrap();
    assert_eq!(report.status, RunStatus::Success);

    let calls = harness.extract.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(
        calls[1].query_params["ids"],
        json!([11, 12]),
        "second query should see the first task's output"
    );
}

#[tokio::test]
async fn macro_interpolation_in_remote_file() {
    let harness = Harness::new(MockExtract::default(), MockLoad::default());

    let mut functions = FunctionRegistry::new();
    functions.register_transform("format_grades", |data: BTreeMap<String, StreamData>| {
        let mut out = BTreeMap::new();
        out.insert(
            "formatted_grades.csv".to_string(),
            data["vendor_file"].clone().with_file_name("formatted_grades.csv"),
        );
        Ok(out)
    });

    let mut config = base_config();
    config.extract[0] = serde_json::from_value(json!({
        "name": "fetch_vendor_file",
        "source": "vendor_sftp",
        "output": "vendor_file",
        "remote_file": "exports/::day::.csv",
        "path_params": {"day": "macro:DAY"},
    }))
    .unwrap();

    let report = orchestrator(&harness, config, functions)
        .run()
        .await
        .unwrap();
    assert_eq!(report.status, RunStatus::Success);

    let calls = harness.extract.calls();
    assert_eq!(calls[0].remote_file.as_deref(), Some("exports/20250831.csv"));
}

#[tokio::test]
async fn one_failed_load_yields_partial_failure() {
    let harness = Harness::new(
        MockExtract::default(),
        MockLoad::default().fail_task("upload_b"),
    );

    let mut functions = FunctionRegistry::new();
    functions.register_transform("format_grades", |data: BTreeMap<String, StreamData>| {
        let record = data["students.sql"].clone();
        let mut out = BTreeMap::new();
        for name in ["report_a", "report_b", "report_c"] {
            out.insert(name.to_string(), record.clone().with_file_name(name));
        }
        Ok(out)
    });

    let mut config = base_config();
    config.load = ["upload_a", "upload_b", "upload_c"]
        .iter()
        .map(|name| {
            serde_json::from_value(json!({
                "name": name,
                "destination": "sftp_server",
                "input": format!("report_{}", &name[name.len() - 1..]),
                "remote_dir": "inbound",
            }))
            .unwrap()
        })
        .collect();

    let report = orchestrator(&harness, config, functions)
        .run()
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::PartialFailure);
    assert_eq!(report.exit_code(), 2);
    let failed: Vec<_> = report.failed_tasks().map(|t| t.task.as_str()).collect();
    assert_eq!(failed, vec!["upload_b"]);

    // The remaining loads still ran.
    let delivered: Vec<_> = harness
        .load
        .deliveries()
        .iter()
        .map(|d| d.task.clone())
        .collect();
    assert_eq!(delivered, vec!["upload_a", "upload_c"]);
}

#[tokio::test]
async fn transform_failure_aborts_before_loading() {
    let harness = Harness::new(MockExtract::default(), MockLoad::default());

    let mut functions = FunctionRegistry::new();
    functions.register_transform("format_grades", |_: BTreeMap<String, StreamData>| {
        Err(TransformError::new("missing expected column 'grade'"))
    });

    let report = orchestrator(&harness, base_config(), functions)
        .run()
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.exit_code(), 1);
    let failed: Vec<_> = report.failed_tasks().collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].stage, Stage::Transform);
    assert!(failed[0].detail.contains("missing expected column"));
    assert!(harness.load.deliveries().is_empty());
}

#[tokio::test]
async fn transform_output_must_cover_load_inputs() {
    let harness = Harness::new(MockExtract::default(), MockLoad::default());

    // Passthrough: never produces 'formatted_grades.csv'.
    let mut functions = FunctionRegistry::new();
    functions.register_transform("format_grades", |data: BTreeMap<String, StreamData>| Ok(data));

    let report = orchestrator(&harness, base_config(), functions)
        .run()
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Failed);
    let failed: Vec<_> = report.failed_tasks().collect();
    assert_eq!(failed[0].stage, Stage::Transform);
    assert!(failed[0].detail.contains("formatted_grades.csv"));
    assert!(harness.load.deliveries().is_empty());
}

#[tokio::test]
async fn extract_retry_policy_eventually_succeeds() {
    let harness = Harness::new(MockExtract::default().fail_next(2), MockLoad::default());
    let mut functions = FunctionRegistry::new();
    format_grades(&mut functions);

    let mut config = base_config();
    config.policy.extract = databridge_core::ErrorPolicy::Retry {
        attempts: 3,
        backoff_ms: 1,
    };

    let report = orchestrator(&harness, config, functions)
        .run()
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Success);
    assert_eq!(harness.extract.calls().len(), 3);
}

#[tokio::test]
async fn extract_failure_fail_fast_aborts_the_stream() {
    let harness = Harness::new(MockExtract::default().fail_next(10), MockLoad::default());
    let mut functions = FunctionRegistry::new();
    format_grades(&mut functions);

    let report = orchestrator(&harness, base_config(), functions)
        .run()
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.exit_code(), 1);
    let failed: Vec<_> = report.failed_tasks().collect();
    assert_eq!(failed[0].stage, Stage::Extract);
    assert!(failed[0].detail.contains("connection reset"));
    assert_eq!(harness.extract.calls().len(), 1, "fail-fast means one attempt");
    assert!(harness.load.deliveries().is_empty());
}

#[tokio::test]
async fn email_recipients_resolve_from_transform_output() {
    let harness = Harness::new(MockExtract::default(), MockLoad::default());

    let mut functions = FunctionRegistry::new();
    functions.register_transform("format_grades", |data: BTreeMap<String, StreamData>| {
        let mut out = BTreeMap::new();
        out.insert(
            "admin_report".to_string(),
            data["students.sql"].clone().with_file_name("admin_report.csv"),
        );
        out.insert(
            "admin_emails".to_string(),
            StreamData::list(vec![
                json!("principal@district.example"),
                json!("registrar@district.example"),
            ]),
        );
        Ok(out)
    });
    functions.register_email_builder(
        "build_report_email",
        |_data: &BTreeMap<String, &StreamData>, params: &BTreeMap<String, Value>| {
            let subject = params
                .get("subject")
                .and_then(Value::as_str)
                .unwrap_or("Report")
                .to_string();
            Ok(EmailMessage {
                subject,
                body: "Attached.".to_string(),
                attachments: vec![],
            })
        },
    );

    let mut config = base_config();
    config.load = vec![serde_json::from_value(json!({
        "name": "mail_report",
        "destination": "smtp_server",
        "input": "admin_report",
        "email_builder": "build_report_email",
        "email_params": {
            "recipients": "step:admin_emails",
            "subject": "Nightly admin report",
        },
    }))
    .unwrap()];

    let report = orchestrator(&harness, config, functions)
        .run()
        .await
        .unwrap();
    assert_eq!(report.status, RunStatus::Success);

    let deliveries = harness.load.deliveries();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(
        deliveries[0].recipients,
        vec!["principal@district.example", "registrar@district.example"]
    );
    assert_eq!(deliveries[0].subject.as_deref(), Some("Nightly admin report"));
    assert_eq!(deliveries[0].record_names, vec!["admin_report"]);
}

#[tokio::test]
async fn failed_validation_is_terminal() {
    let harness = Harness::new(MockExtract::default(), MockLoad::default());
    // 'format_grades' is never registered, so validation fails.
    let functions = FunctionRegistry::new();

    let mut orch = orchestrator(&harness, base_config(), functions);
    assert!(orch.validate().is_err());
    assert_eq!(orch.state(), StreamState::Failed);

    // A failed stream must refuse to run, not proceed against real sources.
    let err = orch.run().await.unwrap_err();
    assert!(err.to_string().contains("cannot run"));
    assert!(harness.extract.calls().is_empty());
    assert!(harness.load.deliveries().is_empty());
}

#[tokio::test]
async fn invalid_configuration_never_starts() {
    let harness = Harness::new(MockExtract::default(), MockLoad::default());
    let mut functions = FunctionRegistry::new();
    format_grades(&mut functions);

    let mut config = base_config();
    let mut dup = config.extract[0].clone();
    dup.name = "students_again".into();
    config.extract.push(dup);

    let err = orchestrator(&harness, config, functions)
        .run()
        .await
        .unwrap_err();
    assert!(err.to_string().contains("duplicate output name"));
    assert!(harness.extract.calls().is_empty());
    assert!(harness.load.deliveries().is_empty());
}
