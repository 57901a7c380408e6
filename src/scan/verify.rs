//! Database/archive reconciliation

use super::audit::AuditLog;
use super::results::VerificationResults;
use super::settings::{ScanSettings, SCAN_CONNECTION_KEY, SCAN_PROFILE};
use crate::core::error::{DatabaseError, Result};
use crate::core::registry::{ConnectionRegistry, SharedConnection};
use crate::core::table::DataRow;
use regex::{Regex, RegexBuilder};
use std::path::{Path, MAIN_SEPARATOR};
use tracing::{debug, info, warn};

pub const AP_SQL: &str =
    "Select ap.image_ap_id, ap.folder_nm, ap.file_nm from t_image_ap ap order by ap.image_ap_id";
pub const JE_SQL: &str =
    "Select je.image_je_id, je.folder_nm, je.file_nm from t_image_je je order by je.image_je_id";

pub const AP_PATTERN: &str = "AP*.PDF";
pub const JE_PATTERN: &str = "JE*.PDF";

/// Register the scan connection and ping it. `None` when the database is
/// not reachable; the reason is audited.
pub async fn connect(
    registry: &ConnectionRegistry,
    settings: &ScanSettings,
    audit: &mut AuditLog,
) -> Option<SharedConnection> {
    match try_connect(registry, settings).await {
        Ok(connection) => Some(connection),
        Err(e) => {
            audit.banner(&format!("Error: {}", e));
            None
        }
    }
}

async fn try_connect(registry: &ConnectionRegistry, settings: &ScanSettings) -> Result<SharedConnection> {
    let profile = settings
        .profile
        .as_ref()
        .ok_or_else(|| DatabaseError::config(format!("connection profile {} is not configured", SCAN_PROFILE)))?;
    if profile.provider_name.is_empty() {
        return Err(DatabaseError::config(format!(
            "connection profile {} has no providerName",
            SCAN_PROFILE
        )));
    }

    let connection = registry.add_connection(
        SCAN_CONNECTION_KEY,
        &profile.provider_name,
        &profile.connection_string,
        Some(&settings.credentials),
    )?;
    connection.lock().await.ping().await?;
    info!(profile = SCAN_PROFILE, "connected to scan database");
    Ok(connection)
}

/// Case-insensitive matcher for a `*`/`?` file pattern
pub fn glob_regex(pattern: &str) -> Result<Regex> {
    let mut expr = String::from("^");
    for c in pattern.chars() {
        match c {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            c => expr.push_str(&regex::escape(&c.to_string())),
        }
    }
    expr.push('$');
    RegexBuilder::new(&expr)
        .case_insensitive(true)
        .build()
        .map_err(|e| DatabaseError::other(format!("invalid file pattern {}: {}", pattern, e)))
}

/// Names of the files in `folder` matching `pattern`, sorted
pub fn file_list(folder: &str, pattern: &str) -> Result<Vec<String>> {
    let matcher = glob_regex(pattern)?;
    let mut names = Vec::new();
    for entry in std::fs::read_dir(folder)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if matcher.is_match(&name) {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

/// Whether `folder/file` exists as a file
pub fn verify_file(folder: &str, file: &str) -> bool {
    Path::new(folder).join(file).is_file()
}

fn text(row: &DataRow, index: usize) -> String {
    row.get_index(index).map(|v| v.as_string()).unwrap_or_default()
}

/// Check every row of `sql` against the archive; returns
/// `(rows, archived, missing file messages)`
async fn reconcile_table(
    connection: &SharedConnection,
    sql: &str,
    kind: &str,
    audit: &mut AuditLog,
) -> Result<(u64, u64, Vec<String>)> {
    let table = connection.lock().await.get_data_table(sql, Vec::new()).await?;
    let mut archived = 0;
    let mut missing = Vec::new();
    for row in &table {
        let folder = text(row, 1);
        let file = text(row, 2);
        if verify_file(&folder, &file) {
            archived += 1;
        } else {
            let msg = format!("{} File {}{}{} not found.", kind, folder, MAIN_SEPARATOR, file);
            audit.audit(&msg);
            missing.push(msg);
        }
    }
    debug!(kind, rows = table.len(), archived, "table reconciled");
    Ok((table.len() as u64, archived, missing))
}

/// Repository files matching `pattern`; returns `(found, archived, archived names)`
fn reconcile_repository(repository: &str, pattern: &str, archive: &str) -> Result<(u64, u64, Vec<String>)> {
    let files = file_list(repository, pattern)?;
    let mut in_archive = Vec::new();
    for file in &files {
        if verify_file(archive, file) {
            in_archive.push(file.clone());
        }
    }
    Ok((files.len() as u64, in_archive.len() as u64, in_archive))
}

/// Run both scenarios, filling `results`. The first failure stops the run
/// and is audited.
pub async fn verify(
    connection: &SharedConnection,
    settings: &ScanSettings,
    results: &mut VerificationResults,
    audit: &mut AuditLog,
) {
    if let Err(e) = run_scenarios(connection, settings, results, audit).await {
        warn!(error = %e, "verification stopped");
        audit.banner(&format!("Error: {}", e));
    }
}

async fn run_scenarios(
    connection: &SharedConnection,
    settings: &ScanSettings,
    results: &mut VerificationResults,
    audit: &mut AuditLog,
) -> Result<()> {
    let (rows, archived, missing) = reconcile_table(connection, AP_SQL, "AP", audit).await?;
    results.s1_ap_database_ct = rows;
    results.s1_ap_archive_ct = archived;
    results.s1_ap_files = missing;

    let (rows, archived, missing) = reconcile_table(connection, JE_SQL, "JE", audit).await?;
    results.s1_je_database_ct = rows;
    results.s1_je_archive_ct = archived;
    results.s1_je_files = missing;

    let (found, archived, files) =
        reconcile_repository(&settings.file_repository, AP_PATTERN, &settings.ap_folder)?;
    results.s2_ap_file_repository = found;
    results.s2_ap_archive = archived;
    results.s2_ap_files = files;

    let (found, archived, files) =
        reconcile_repository(&settings.file_repository, JE_PATTERN, &settings.je_folder)?;
    results.s2_je_file_repository = found;
    results.s2_je_archive = archived;
    results.s2_je_files = files;

    Ok(())
}
