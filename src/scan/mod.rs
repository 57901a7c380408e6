//! Scan Verifier
//!
//! Nightly check that scanned AP (accounts payable) and JE (journal entry)
//! images are consistent across the image tables, the archive folders and the
//! incoming file repository. The outcome is mailed as an HTML report.

pub mod audit;
pub mod report;
pub mod results;
pub mod settings;
pub mod verify;

pub use audit::AuditLog;
pub use results::VerificationResults;
pub use settings::ScanSettings;

use crate::core::config::Settings;
use crate::core::email::MailTransport;
use crate::core::provider::ProviderCatalog;
use crate::core::registry::ConnectionRegistry;
use chrono::Local;
use std::sync::Arc;
use tracing::debug;

/// One complete verifier run. Never fails: every problem ends up in the
/// audit trail and the report.
pub async fn run(
    settings: &Settings,
    providers: Arc<ProviderCatalog>,
    transport: &dyn MailTransport,
) -> (VerificationResults, AuditLog) {
    let scan = ScanSettings::load(settings);
    let today = Local::now().date_naive();
    let mut audit = AuditLog::new(scan.audit_path(today));
    debug!(
        smtp_server = %scan.smtp_server,
        smtp_port = scan.smtp_port,
        audit_file = ?audit.path(),
        "scan verifier settings loaded"
    );

    let registry = ConnectionRegistry::new(providers);
    let mut results = VerificationResults::default();

    if let Some(connection) = verify::connect(&registry, &scan, &mut audit).await {
        results.connect_to_database = true;
        verify::verify(&connection, &scan, &mut results, &mut audit).await;
        if let Err(e) = connection.lock().await.close().await {
            debug!(error = %e, "closing scan connection failed");
        }
    }

    report::send(&results, &scan, today, transport, &mut audit).await;
    (results, audit)
}
