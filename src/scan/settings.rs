//! Scan Verifier settings

use crate::core::config::{ConnectionProfile, Settings};
use crate::core::connection::Credentials;
use crate::core::convert;
use chrono::{Datelike, NaiveDate};
use std::path::PathBuf;

/// Connection profile holding the scan database connection string
pub const SCAN_PROFILE: &str = "SCANP";

/// Registry key of the scan database connection
pub const SCAN_CONNECTION_KEY: &str = "SCAN";

/// Token in `AuditFile` replaced by the run date
pub const AUDIT_DATE_TOKEN: &str = "[date]";

/// Everything the verifier reads from configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSettings {
    pub ap_folder: String,
    pub je_folder: String,
    pub file_repository: String,
    /// Whether audit lines are written to `audit_file`
    pub audit_enabled: bool,
    /// Audit file path template, may contain `[date]`
    pub audit_file: String,
    pub email_to: String,
    pub smtp_server: String,
    pub smtp_port: u16,
    pub pickup_directory: String,
    pub profile: Option<ConnectionProfile>,
    pub credentials: Credentials,
}

impl ScanSettings {
    pub fn load(settings: &Settings) -> Self {
        let user = settings.read_string("ScanUser", "");
        let password = settings.read_string("ScanPassword", "");
        Self {
            ap_folder: settings.read_string("APFolder", ""),
            je_folder: settings.read_string("JEFolder", ""),
            file_repository: settings.read_string("FileRepository", ""),
            audit_enabled: convert::yn_to_bool(&settings.read_string("AuditStatus", "Y")),
            audit_file: settings.read_string("AuditFile", ""),
            email_to: settings.read_string("EmailTo", ""),
            smtp_server: settings.read_string("SMTPServer", ""),
            smtp_port: settings.read_numeric("SMTPPort", 25),
            pickup_directory: settings.read_string("PickupDirectory", "mail_pickup"),
            profile: settings.connection_profile(SCAN_PROFILE),
            credentials: Credentials {
                user: Some(user).filter(|s| !s.is_empty()),
                password: Some(password).filter(|s| !s.is_empty()),
                context: None,
            },
        }
    }

    /// Audit file for `date`, `None` when auditing to file is off
    pub fn audit_path(&self, date: NaiveDate) -> Option<PathBuf> {
        if !self.audit_enabled || self.audit_file.trim().is_empty() {
            return None;
        }
        let stamp = format!("{}.{}.{}", date.year(), date.month(), date.day());
        Some(PathBuf::from(self.audit_file.replace(AUDIT_DATE_TOKEN, &stamp)))
    }
}
