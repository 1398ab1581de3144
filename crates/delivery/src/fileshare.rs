//! Mounted-fileshare adapter: both directions, via `tokio::fs`.
//!
//! Extraction reads `mount_path/remote_file` into a `Bytes` record carrying
//! the file's name. Loading writes each input record's rendered content
//! under `mount_path/remote_dir/<file_name>`, creating the directory as
//! needed; `FilePath` records are copied instead of rendered.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use databridge_core::{DestConfig, RecordValue, SourceConfig, StreamData};
use databridge_pipeline::{
    AdapterError, ExtractAdapter, ExtractContext, LoadAdapter, LoadContext, LoadReceipt,
};

use crate::render::{file_name_for, render_record};

/// Fileshare extract and load over a locally mounted path.
#[derive(Debug, Default)]
pub struct FileshareDelivery;

impl FileshareDelivery {
    /// Create the adapter.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ExtractAdapter for FileshareDelivery {
    async fn extract(&self, ctx: ExtractContext<'_>) -> Result<StreamData, AdapterError> {
        let SourceConfig::Fileshare { mount_path } = ctx.source else {
            return Err(AdapterError::Protocol(
                "fileshare adapter dispatched with a non-fileshare source".to_string(),
            ));
        };
        let Some(remote_file) = &ctx.remote_file else {
            return Err(AdapterError::Protocol(
                "fileshare extraction requires a remote_file".to_string(),
            ));
        };

        let path = Path::new(mount_path).join(remote_file);
        let bytes = tokio::fs::read(&path).await?;

        tracing::debug!(
            stream = %ctx.stream,
            task = %ctx.task,
            path = %path.display(),
            size = bytes.len(),
            "Read file from share",
        );

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| remote_file.clone());
        Ok(StreamData::bytes(bytes).with_file_name(file_name))
    }
}

#[async_trait]
impl LoadAdapter for FileshareDelivery {
    async fn load(&self, ctx: LoadContext<'_>) -> Result<LoadReceipt, AdapterError> {
        let DestConfig::Fileshare { mount_path } = ctx.dest else {
            return Err(AdapterError::Protocol(
                "fileshare adapter dispatched with a non-fileshare destination".to_string(),
            ));
        };
        let Some(remote_dir) = &ctx.remote_dir else {
            return Err(AdapterError::Protocol(
                "fileshare loading requires a remote_dir".to_string(),
            ));
        };

        let dir = Path::new(mount_path).join(remote_dir);
        tokio::fs::create_dir_all(&dir).await?;

        let mut written: Vec<PathBuf> = Vec::with_capacity(ctx.records.len());
        for (name, &record) in &ctx.records {
            let target = dir.join(file_name_for(name, record));
            match &record.value {
                RecordValue::FilePath(source_path) => {
                    tokio::fs::copy(source_path, &target).await?;
                }
                _ => {
                    let content = render_record(name, record)?;
                    tokio::fs::write(&target, content).await?;
                }
            }
            tracing::debug!(
                stream = %ctx.stream,
                task = %ctx.task,
                path = %target.display(),
                "Wrote file to share",
            );
            written.push(target);
        }

        let listed: Vec<String> = written
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        Ok(LoadReceipt {
            detail: format!("wrote {}", listed.join(", ")),
            records_processed: Some(written.len() as u64),
        })
    }
}
