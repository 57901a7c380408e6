use serde::Serialize;

/// Counts and file lists collected by one verifier run.
///
/// Scenario 1 compares the image tables with the archive folders; every row
/// should have its file archived. Scenario 2 lists the PDFs still sitting in
/// the file repository; any of them that is also archived should have been
/// removed from the repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerificationResults {
    pub connect_to_database: bool,

    pub s1_ap_database_ct: u64,
    pub s1_ap_archive_ct: u64,
    pub s1_je_database_ct: u64,
    pub s1_je_archive_ct: u64,
    pub s1_ap_files: Vec<String>,
    pub s1_je_files: Vec<String>,

    pub s2_ap_file_repository: u64,
    pub s2_ap_archive: u64,
    pub s2_je_file_repository: u64,
    pub s2_je_archive: u64,
    pub s2_ap_files: Vec<String>,
    pub s2_je_files: Vec<String>,
}

impl VerificationResults {
    pub fn s1_ap_problems(&self) -> bool {
        self.s1_ap_database_ct != self.s1_ap_archive_ct
    }

    pub fn s1_je_problems(&self) -> bool {
        self.s1_je_database_ct != self.s1_je_archive_ct
    }

    pub fn s2_ap_problems(&self) -> bool {
        self.s2_ap_archive > 0
    }

    pub fn s2_je_problems(&self) -> bool {
        self.s2_je_archive > 0
    }

    pub fn has_problems(&self) -> bool {
        !self.connect_to_database
            || self.s1_ap_problems()
            || self.s1_je_problems()
            || self.s2_ap_problems()
            || self.s2_je_problems()
    }
}
