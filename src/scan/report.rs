//! HTML report and its delivery

use super::audit::AuditLog;
use super::results::VerificationResults;
use super::settings::{ScanSettings, SCAN_PROFILE};
use crate::core::email::{EmailMessage, MailTransport};
use chrono::NaiveDate;
use tracing::{info, warn};

pub const REPORT_SUBJECT: &str = "AP / JE SCAN VERIFIER";

const TEMPLATE: &str = r#"<html>
<head>
    <title>AP / JE Scan Verification</title>
    <style>
        html, body { font-family: Calibri; }
        .good { color: green; }
        .bad { color: red; }
        table { border: 1px solid black; width: 500px; text-align: center; background-color: #111111; padding: 0px; margin: 0px; color: #ffffff; }
        td { border: 1px solid black; padding: 0px; margin: 0px; background-color: #ffffff; color: #000000; }
    </style>
</head>
<body>
    <h1>AP / JE Scan Verifier for [DATE_TIME]</h1>
    <div>Connect to database: <span class='[CONNECT_TO_DATABASE_CLASS]'>[CONNECT_TO_DATABASE]</span> ...</div>
    <hr />
    <h1>Scenario # 1: Compare the 'Database' to the 'AP / JE File Archives'</h1>
    <span>If <span class='bad'>problems</span> are found then this indicates that the 'Database' and the 'AP / JE Archives' are NOT in sync.</span>
    <table>
        <tr><th>Type</th><th>Database Count</th><th>Archive</th><th>Problems ?</th></tr>
        <tr><td>AP</td><td>[S1_AP_DATABASE_CT]</td><td>[S1_AP_ARCHIVE_CT]</td><td class='[S1_AP_PROBLEMS_CLASS]'>[S1_AP_PROBLEMS]</td></tr>
        <tr><td>JE</td><td>[S1_JE_DATABASE_CT]</td><td>[S1_JE_ARCHIVE_CT]</td><td class='[S1_JE_PROBLEMS_CLASS]'>[S1_JE_PROBLEMS]</td></tr>
    </table>
    <hr />
    <h1>Scenario # 2: Compare the 'File Repository' to the 'AP / JE Archive'</h1>
    <span>If <span class='bad'>problems</span> are found then this indicates that there are files in the 'File Repository' that DO exist in the 'AP / JE Archives' and either we encountered a permissions issue, a delete operation failed or some other error ... manual intervention is needed.</span>
    <table>
        <tr><th>Type</th><th>File Repository</th><th>Archive</th><th>Problems ?</th></tr>
        <tr><td>AP</td><td>[S2_AP_REPOSITORY]</td><td>[S2_AP_ARCHIVE]</td><td class='[S2_AP_PROBLEMS_CLASS]'>[S2_AP_PROBLEMS]</td></tr>
        <tr><td>JE</td><td>[S2_JE_REPOSITORY]</td><td>[S2_JE_ARCHIVE]</td><td class='[S2_JE_PROBLEMS_CLASS]'>[S2_JE_PROBLEMS]</td></tr>
    </table>
    <h3>List of 'problem' files in the 'AP File Repository'.</h3>
    [S2_AP_LIST_OF_FILES]
    <h3>List of 'problem' files in the 'JE File Repository'.</h3>
    [S2_JE_LIST_OF_FILES]
    <hr />
    <h1>Sources</h1>
    <table>
        <tr><td>Database</td><td>[DATABASE]</td></tr>
        <tr><td>File </td><td>[FILE_REPOSITORY]</td></tr>
        <tr><td>AP Archive</td><td>[AP_FOLDER]</td></tr>
        <tr><td>JE Archive</td><td>[JE_FOLDER]</td></tr>
    </table>
</body>
</html>
"#;

fn flag(problem: bool) -> (&'static str, &'static str) {
    if problem {
        ("YES", "bad")
    } else {
        ("None", "good")
    }
}

fn file_list(files: &[String]) -> String {
    if files.is_empty() {
        return "-None-".to_string();
    }
    files.iter().map(|f| format!("<div>{}</div>", f)).collect()
}

/// Fill the report template
pub fn render(results: &VerificationResults, settings: &ScanSettings, date: NaiveDate) -> String {
    let (connected, connected_class) = if results.connect_to_database {
        ("Good", "good")
    } else {
        ("NO", "bad")
    };
    let (s1_ap, s1_ap_class) = flag(results.s1_ap_problems());
    let (s1_je, s1_je_class) = flag(results.s1_je_problems());
    let (s2_ap, s2_ap_class) = flag(results.s2_ap_problems());
    let (s2_je, s2_je_class) = flag(results.s2_je_problems());

    let replacements: [(&str, String); 25] = [
        ("[DATE_TIME]", date.format("%m/%d/%Y").to_string()),
        ("[CONNECT_TO_DATABASE_CLASS]", connected_class.to_string()),
        ("[CONNECT_TO_DATABASE]", connected.to_string()),
        ("[S1_AP_DATABASE_CT]", results.s1_ap_database_ct.to_string()),
        ("[S1_AP_ARCHIVE_CT]", results.s1_ap_archive_ct.to_string()),
        ("[S1_AP_PROBLEMS_CLASS]", s1_ap_class.to_string()),
        ("[S1_AP_PROBLEMS]", s1_ap.to_string()),
        ("[S1_JE_DATABASE_CT]", results.s1_je_database_ct.to_string()),
        ("[S1_JE_ARCHIVE_CT]", results.s1_je_archive_ct.to_string()),
        ("[S1_JE_PROBLEMS_CLASS]", s1_je_class.to_string()),
        ("[S1_JE_PROBLEMS]", s1_je.to_string()),
        ("[S2_AP_REPOSITORY]", results.s2_ap_file_repository.to_string()),
        ("[S2_AP_ARCHIVE]", results.s2_ap_archive.to_string()),
        ("[S2_AP_PROBLEMS_CLASS]", s2_ap_class.to_string()),
        ("[S2_AP_PROBLEMS]", s2_ap.to_string()),
        ("[S2_JE_REPOSITORY]", results.s2_je_file_repository.to_string()),
        ("[S2_JE_ARCHIVE]", results.s2_je_archive.to_string()),
        ("[S2_JE_PROBLEMS_CLASS]", s2_je_class.to_string()),
        ("[S2_JE_PROBLEMS]", s2_je.to_string()),
        ("[S2_AP_LIST_OF_FILES]", file_list(&results.s2_ap_files)),
        ("[S2_JE_LIST_OF_FILES]", file_list(&results.s2_je_files)),
        ("[DATABASE]", SCAN_PROFILE.to_string()),
        ("[FILE_REPOSITORY]", settings.file_repository.clone()),
        ("[AP_FOLDER]", settings.ap_folder.clone()),
        ("[JE_FOLDER]", settings.je_folder.clone()),
    ];

    let mut html = TEMPLATE.to_string();
    for (token, value) in &replacements {
        html = html.replace(*token, value);
    }
    html
}

/// Audit the report and hand it to `transport`. Failures are logged only.
pub async fn send(
    results: &VerificationResults,
    settings: &ScanSettings,
    date: NaiveDate,
    transport: &dyn MailTransport,
    audit: &mut AuditLog,
) {
    let html = render(results, settings, date);
    audit.audit(&html);

    let message = EmailMessage::new(&settings.email_to, REPORT_SUBJECT, html)
        .from_address(settings.email_to.as_str())
        .html(true);
    match transport.send(&message).await {
        Ok(()) => info!(to = %settings.email_to, "verification report sent"),
        Err(e) => warn!(error = %e, "sending verification report failed"),
    }
}
