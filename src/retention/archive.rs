//! Archive serialization and file writes
//!
//! Archives are written under `{location}/{tenant}/` as
//! `{entityType}-{timestamp}.{ext}`, atomically (temp file + rename) so
//! a crashed sweep never leaves a partial archive that a later deletion
//! could trust.

use crate::error::{AuditError, Result};
use crate::retention::policy::ArchiveFormat;
use crate::types::{EntityRecord, EntityType};
use chrono::{DateTime, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Serialize and write one entity type's matching record set
///
/// Returns the archive path and the byte size written. Any failure maps
/// to `AuditError::Archive`, which the engine treats as fatal for the
/// policy execution.
pub async fn write_archive(
    location: &str,
    tenant_id: &str,
    entity_type: EntityType,
    format: ArchiveFormat,
    records: &[EntityRecord],
    now: DateTime<Utc>,
) -> Result<(PathBuf, u64)> {
    let dir = Path::new(location).join(tenant_id);
    let file_name = format!(
        "{}-{}.{}",
        entity_type,
        now.format("%Y%m%dT%H%M%S"),
        format.extension()
    );
    let path = dir.join(&file_name);

    let bytes = serialize_records(format, records)?;
    let size = bytes.len() as u64;

    fs::create_dir_all(&dir)
        .await
        .map_err(|e| archive_error(&path, e))?;

    // Atomic write: temp file, flush, then rename
    let tmp_path = path.with_extension("tmp");
    let mut file = fs::File::create(&tmp_path)
        .await
        .map_err(|e| archive_error(&tmp_path, e))?;
    file.write_all(&bytes)
        .await
        .map_err(|e| archive_error(&tmp_path, e))?;
    file.sync_all()
        .await
        .map_err(|e| archive_error(&tmp_path, e))?;
    fs::rename(&tmp_path, &path)
        .await
        .map_err(|e| archive_error(&path, e))?;

    tracing::debug!(
        path = %path.display(),
        records = records.len(),
        size,
        "Archive written"
    );

    Ok((path, size))
}

fn archive_error(path: &Path, e: std::io::Error) -> AuditError {
    AuditError::Archive {
        location: path.display().to_string(),
        reason: e.to_string(),
    }
}

fn serialize_records(format: ArchiveFormat, records: &[EntityRecord]) -> Result<Vec<u8>> {
    match format {
        ArchiveFormat::Json => Ok(serde_json::to_vec_pretty(records)?),
        ArchiveFormat::Csv => Ok(records_to_csv(records).into_bytes()),
        ArchiveFormat::Compressed => {
            let json = serde_json::to_vec(records)?;
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&json).map_err(AuditError::Io)?;
            encoder.finish().map_err(AuditError::Io)
        }
    }
}

/// Render records as delimited tabular text
///
/// Columns are `id`, `createdAt`, then the union of top-level field
/// names across the set, sorted for a stable layout.
fn records_to_csv(records: &[EntityRecord]) -> String {
    let mut columns: Vec<String> = Vec::new();
    for record in records {
        if let Some(map) = record.fields.as_object() {
            for key in map.keys() {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }
    }
    columns.sort();

    let mut out = String::new();
    out.push_str("id,createdAt");
    for column in &columns {
        out.push(',');
        out.push_str(&csv_escape(column));
    }
    out.push('\n');

    for record in records {
        out.push_str(&csv_escape(&record.id));
        out.push(',');
        out.push_str(&record.created_at.to_rfc3339());
        for column in &columns {
            out.push(',');
            let cell = record
                .fields
                .get(column)
                .map(|v| match v {
                    serde_json::Value::Null => String::new(),
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .unwrap_or_default();
            out.push_str(&csv_escape(&cell));
        }
        out.push('\n');
    }

    out
}

/// Quote a CSV cell when it contains a delimiter, quote, or newline
pub(crate) fn csv_escape(cell: &str) -> String {
    if cell.contains(',') || cell.contains('"') || cell.contains('\n') {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}
