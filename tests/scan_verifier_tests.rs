//! End-to-end tests for the Scan Verifier
//!
//! A SQLite database stands in for the image tables; archive folders and the
//! file repository live in a temporary directory.

#[cfg(feature = "sqlite")]
mod scan_tests {
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use rust_db_support::backends::{builtin_providers, SqliteProvider};
    use rust_db_support::core::config::{MapSource, Settings};
    use rust_db_support::core::email::{EmailMessage, MailTransport, PickupDirectoryTransport};
    use rust_db_support::core::{DbConnection, Parameter, Result};
    use rust_db_support::scan::{self, report::REPORT_SUBJECT};
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<EmailMessage>>,
    }

    #[async_trait]
    impl MailTransport for RecordingTransport {
        async fn send(&self, message: &EmailMessage) -> Result<()> {
            self.sent.lock().push(message.clone());
            Ok(())
        }
    }

    struct Fixture {
        _dir: TempDir,
        root: PathBuf,
        settings: Settings,
    }

    fn folder(root: &Path, name: &str) -> Result<String> {
        let path = root.join(name);
        std::fs::create_dir_all(&path)?;
        Ok(path.to_string_lossy().into_owned())
    }

    fn touch(folder: &str, name: &str) -> Result<()> {
        std::fs::write(Path::new(folder).join(name), b"%PDF")?;
        Ok(())
    }

    async fn insert_image(conn: &mut DbConnection, table: &str, id: i64, folder: &str, file: &str) -> Result<()> {
        let sql = format!("INSERT INTO {} VALUES (@id, @folder, @file)", table);
        conn.run_sql(
            &sql,
            vec![
                Parameter::new("id", id),
                Parameter::new("folder", folder),
                Parameter::new("file", file),
            ],
        )
        .await?;
        Ok(())
    }

    /// AP: three rows, two archived; repository holds AP1 (archived) and
    /// AP9. JE: one archived row; repository holds JE5.
    async fn fixture() -> Result<Fixture> {
        let dir = TempDir::new()?;
        let root = dir.path().to_path_buf();
        let ap = folder(&root, "ap")?;
        let je = folder(&root, "je")?;
        let repo = folder(&root, "repo")?;
        let db = root.join("scan.db").to_string_lossy().into_owned();

        let mut conn = DbConnection::new(Arc::new(SqliteProvider::new()), &db, None);
        conn.run_sql("CREATE TABLE t_image_ap (image_ap_id INTEGER, folder_nm TEXT, file_nm TEXT)", vec![])
            .await?;
        conn.run_sql("CREATE TABLE t_image_je (image_je_id INTEGER, folder_nm TEXT, file_nm TEXT)", vec![])
            .await?;
        insert_image(&mut conn, "t_image_ap", 1, &ap, "AP1.PDF").await?;
        insert_image(&mut conn, "t_image_ap", 2, &ap, "AP2.PDF").await?;
        insert_image(&mut conn, "t_image_ap", 3, &ap, "AP3.PDF").await?;
        insert_image(&mut conn, "t_image_je", 1, &je, "JE1.PDF").await?;

        touch(&ap, "AP1.PDF")?;
        touch(&ap, "AP2.PDF")?;
        touch(&je, "JE1.PDF")?;
        touch(&repo, "AP1.PDF")?;
        touch(&repo, "AP9.PDF")?;
        touch(&repo, "je5.pdf")?;
        touch(&repo, "readme.txt")?;

        let settings = Settings::new().with_source(
            MapSource::new()
                .with("APFolder", ap)
                .with("JEFolder", je)
                .with("FileRepository", repo)
                .with("AuditStatus", "Y")
                .with("AuditFile", root.join("audit_[date].txt").to_string_lossy())
                .with("EmailTo", "scans@example.com")
                .with("connectionStrings.SCANP.connectionString", db)
                .with("connectionStrings.SCANP.providerName", "sqlite"),
        );
        Ok(Fixture {
            _dir: dir,
            root,
            settings,
        })
    }

    #[tokio::test]
    async fn test_full_run_reports_problems() -> Result<()> {
        let fixture = fixture().await?;
        let transport = RecordingTransport::default();

        let (results, audit) = scan::run(&fixture.settings, Arc::new(builtin_providers()), &transport).await;

        assert!(results.connect_to_database);
        assert_eq!(results.s1_ap_database_ct, 3);
        assert_eq!(results.s1_ap_archive_ct, 2);
        assert_eq!(results.s1_ap_files.len(), 1);
        assert!(results.s1_ap_files[0].starts_with("AP File "));
        assert!(results.s1_ap_files[0].ends_with("AP3.PDF not found."));
        assert_eq!((results.s1_je_database_ct, results.s1_je_archive_ct), (1, 1));

        assert_eq!(results.s2_ap_file_repository, 2);
        assert_eq!(results.s2_ap_archive, 1);
        assert_eq!(results.s2_ap_files, ["AP1.PDF"]);
        assert_eq!((results.s2_je_file_repository, results.s2_je_archive), (1, 0));
        assert!(results.has_problems());

        let sent = transport.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, REPORT_SUBJECT);
        assert_eq!(sent[0].to, ["scans@example.com"]);
        assert!(sent[0].html);
        assert!(sent[0].body.contains("<div>AP1.PDF</div>"));
        assert!(sent[0].body.contains("<span class='good'>Good</span>"));

        let audit_path = audit.path().unwrap();
        assert!(audit_path.starts_with(&fixture.root));
        let written = std::fs::read_to_string(audit_path)?;
        assert!(written.contains("AP3.PDF not found."));
        assert!(written.contains("AP / JE Scan Verifier for"));
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_profile_still_sends_report() {
        let settings = Settings::new().with_source(
            MapSource::new()
                .with("AuditStatus", "N")
                .with("EmailTo", "scans@example.com"),
        );
        let transport = RecordingTransport::default();

        let (results, audit) = scan::run(&settings, Arc::new(builtin_providers()), &transport).await;

        assert!(!results.connect_to_database);
        assert!(audit.path().is_none());
        assert!(audit.lines().iter().any(|l| l.contains("Error: ") && l.contains("SCANP")));
        let sent = transport.sent.lock();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].body.contains("<span class='bad'>NO</span>"));
    }

    #[tokio::test]
    async fn test_missing_repository_stops_verification() -> Result<()> {
        let fixture = fixture().await?;
        std::fs::remove_dir_all(fixture.root.join("repo"))?;
        let transport = RecordingTransport::default();

        let (results, audit) = scan::run(&fixture.settings, Arc::new(builtin_providers()), &transport).await;

        assert!(results.connect_to_database);
        assert_eq!(results.s1_ap_database_ct, 3);
        assert_eq!(results.s1_je_archive_ct, 1);
        assert_eq!(results.s2_ap_file_repository, 0);
        assert!(results.s2_ap_files.is_empty());
        assert!(audit.lines().iter().any(|l| l.contains("Error: ")));
        assert_eq!(transport.sent.lock().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_pickup_directory_delivery() -> Result<()> {
        let fixture = fixture().await?;
        let pickup = fixture.root.join("pickup");
        let transport = PickupDirectoryTransport::new(pickup.clone(), "scans@example.com");

        let (results, _audit) = scan::run(&fixture.settings, Arc::new(builtin_providers()), &transport).await;
        assert!(results.connect_to_database);

        let messages: Vec<_> = std::fs::read_dir(&pickup)?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|x| x == "eml"))
            .collect();
        assert_eq!(messages.len(), 1);
        let eml = std::fs::read_to_string(messages[0].path())?;
        assert!(eml.contains("Subject: AP / JE SCAN VERIFIER"));
        assert!(eml.contains("To: scans@example.com"));
        Ok(())
    }
}
