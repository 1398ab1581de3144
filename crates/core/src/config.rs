//! Stream configuration model.
//!
//! Sources, destinations, and task descriptors are deserialized from the
//! configuration file, discriminated by their `protocol` field, and never
//! mutated after loading. Referential validation (do referenced sources
//! exist, are output names unique, do templates match their parameter
//! keys) lives in the pipeline crate; this module only models the shape
//! and the per-entry field rules.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use validator::ValidateEmail;

use crate::params::ParamSpec;

/// Default SFTP port.
const DEFAULT_SFTP_PORT: u16 = 22;
/// Default SMTP port (plain relay, matching the original district setup).
const DEFAULT_SMTP_PORT: u16 = 25;

// ---------------------------------------------------------------------------
// Protocols
// ---------------------------------------------------------------------------

/// Wire protocol of a source or destination; the adapter-registry key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    /// Relational database, queried with `.sql` files.
    Sql,
    /// Mounted file share.
    Fileshare,
    /// SFTP server.
    Sftp,
    /// Cloud drive account.
    GoogleDrive,
    /// SMTP relay (destination only).
    Smtp,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Sql => "sql",
            Self::Fileshare => "fileshare",
            Self::Sftp => "sftp",
            Self::GoogleDrive => "google_drive",
            Self::Smtp => "smtp",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Sources / destinations
// ---------------------------------------------------------------------------

/// A configured data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "protocol", rename_all = "snake_case")]
pub enum SourceConfig {
    /// Relational database reached through a JDBC-style connection string.
    Sql {
        /// Connection string, credentials excluded.
        conn_string: String,
        /// Database user.
        user: String,
        /// Database password.
        password: String,
        /// Driver class name.
        driver_name: String,
    },
    /// Locally mounted file share.
    Fileshare {
        /// Absolute path of the mount root.
        mount_path: String,
    },
    /// SFTP server.
    Sftp {
        /// Server host name or address.
        host: String,
        /// Server port.
        #[serde(default = "default_sftp_port")]
        port: u16,
        /// Login user.
        user: String,
        /// Login password.
        password: String,
    },
    /// Cloud drive account.
    GoogleDrive {
        /// Path to the stored access token.
        access_token: String,
    },
}

impl SourceConfig {
    /// The source's wire protocol.
    pub fn protocol(&self) -> Protocol {
        match self {
            Self::Sql { .. } => Protocol::Sql,
            Self::Fileshare { .. } => Protocol::Fileshare,
            Self::Sftp { .. } => Protocol::Sftp,
            Self::GoogleDrive { .. } => Protocol::GoogleDrive,
        }
    }
}

/// A configured data destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "protocol", rename_all = "snake_case")]
pub enum DestConfig {
    /// SMTP relay for email delivery.
    Smtp {
        /// Relay host.
        host: String,
        /// Relay port.
        #[serde(default = "default_smtp_port")]
        port: u16,
        /// Optional login user.
        #[serde(default)]
        user: Option<String>,
        /// Optional login password.
        #[serde(default)]
        password: Option<String>,
        /// Sender address used when a task does not override it.
        default_sender: String,
    },
    /// Locally mounted file share.
    Fileshare {
        /// Absolute path of the mount root.
        mount_path: String,
    },
    /// SFTP server.
    Sftp {
        /// Server host name or address.
        host: String,
        /// Server port.
        #[serde(default = "default_sftp_port")]
        port: u16,
        /// Login user.
        user: String,
        /// Login password.
        password: String,
    },
    /// Cloud drive account.
    GoogleDrive {
        /// Path to the stored access token.
        access_token: String,
    },
}

impl DestConfig {
    /// The destination's wire protocol.
    pub fn protocol(&self) -> Protocol {
        match self {
            Self::Smtp { .. } => Protocol::Smtp,
            Self::Fileshare { .. } => Protocol::Fileshare,
            Self::Sftp { .. } => Protocol::Sftp,
            Self::GoogleDrive { .. } => Protocol::GoogleDrive,
        }
    }

    /// Per-entry field findings (currently: sender address syntax).
    pub fn findings(&self, name: &str) -> Vec<String> {
        let mut findings = Vec::new();
        if let Self::Smtp { default_sender, .. } = self {
            if !default_sender.validate_email() {
                findings.push(format!(
                    "destination '{name}': default_sender '{default_sender}' is not a valid email address"
                ));
            }
        }
        findings
    }
}

fn default_sftp_port() -> u16 {
    DEFAULT_SFTP_PORT
}

fn default_smtp_port() -> u16 {
    DEFAULT_SMTP_PORT
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

/// One configured extract task.
///
/// Immutable once loaded; read by the orchestrator to drive dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractTask {
    /// Task name, used in logs and reports.
    pub name: String,
    /// Name of a declared source.
    pub source: String,
    /// Step Store key this task's record is written under.
    pub output: String,
    /// Local `.sql` query file (sql sources). May contain `::tokens::`.
    #[serde(default)]
    pub query_file: Option<String>,
    /// Query parameter specifications (sql sources).
    #[serde(default)]
    pub query_params: BTreeMap<String, ParamSpec>,
    /// Remote file to fetch (file-transfer sources). May contain
    /// `::tokens::`; must resolve to a file reference.
    #[serde(default)]
    pub remote_file: Option<String>,
    /// Parameters for the task's path template(s).
    #[serde(default)]
    pub path_params: BTreeMap<String, ParamSpec>,
}

/// One configured load task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadTask {
    /// Task name, used in logs and reports.
    pub name: String,
    /// Name of a declared destination.
    pub destination: String,
    /// Transform-output name(s) this task consumes. A single string in
    /// configuration is accepted as a one-element list.
    #[serde(deserialize_with = "one_or_many")]
    pub input: Vec<String>,
    /// Remote directory to write into (file-transfer destinations). May
    /// contain `::tokens::`; must resolve to a directory reference — the
    /// load method determines the final filename.
    #[serde(default)]
    pub remote_dir: Option<String>,
    /// Parameters for the task's path template.
    #[serde(default)]
    pub path_params: BTreeMap<String, ParamSpec>,
    /// Registered email-builder name (smtp destinations).
    #[serde(default)]
    pub email_builder: Option<String>,
    /// Email parameter specifications: `recipients`, `subject`, and any
    /// builder-specific values.
    #[serde(default)]
    pub email_params: BTreeMap<String, ParamSpec>,
}

/// Accept `input: name` and `input: [a, b]` alike.
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(name) => vec![name],
        OneOrMany::Many(names) => names,
    })
}

// ---------------------------------------------------------------------------
// Error policy
// ---------------------------------------------------------------------------

/// How a stage reacts to a task failure.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Abort the stream on the first failure.
    FailFast,
    /// Record the failure and keep going with the remaining tasks.
    Continue,
    /// Retry the failing task before giving up, with linear backoff.
    Retry {
        /// Total attempts, including the first.
        attempts: u32,
        /// Pause between attempts, milliseconds.
        backoff_ms: u64,
    },
}

/// Per-stage error policies for one stream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamPolicy {
    /// Extraction policy. Fail-fast by default: partially-extracted data
    /// is unsafe to transform.
    pub extract: ErrorPolicy,
    /// Load policy. Continue by default: destinations are independent side
    /// effects and partial delivery beats none.
    pub load: ErrorPolicy,
}

impl Default for StreamPolicy {
    fn default() -> Self {
        Self {
            extract: ErrorPolicy::FailFast,
            load: ErrorPolicy::Continue,
        }
    }
}

// ---------------------------------------------------------------------------
// StreamConfig
// ---------------------------------------------------------------------------

/// The aggregate configuration of one stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Declared sources, keyed by name.
    pub sources: BTreeMap<String, SourceConfig>,
    /// Declared destinations, keyed by name.
    pub destinations: BTreeMap<String, DestConfig>,
    /// Extract tasks, run in declared order.
    pub extract: Vec<ExtractTask>,
    /// Registered transform function name.
    pub transform: String,
    /// Load tasks, run in declared order.
    pub load: Vec<LoadTask>,
    /// Per-stage error policies.
    #[serde(default)]
    pub policy: StreamPolicy,
}
