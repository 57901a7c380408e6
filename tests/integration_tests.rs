//! Integration tests for the connection wrapper, registry and runner
//!
//! These tests drive the public API against file-backed SQLite databases:
//! - Transaction stack behavior
//! - Registry sharing
//! - Sequence generation
//! - Search screens built from the clause builder

#[cfg(feature = "sqlite")]
mod sqlite_tests {
    use rust_db_support::core::table::FromRow;
    use rust_db_support::prelude::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct Order {
        id: i64,
        status: String,
    }

    impl FromRow for Order {
        fn from_row(row: &DataRow) -> Result<Self> {
            Ok(Self {
                id: row.try_get("id")?.as_long().unwrap_or_default(),
                status: row.try_get("status")?.as_string(),
            })
        }
    }

    fn registry() -> ConnectionRegistry {
        ConnectionRegistry::new(Arc::new(builtin_providers()))
    }

    fn db_path(dir: &TempDir) -> String {
        dir.path().join("orders.db").to_string_lossy().into_owned()
    }

    async fn seed(conn: &mut DbConnection) -> Result<()> {
        conn.run_sql(
            "CREATE TABLE orders (id INTEGER PRIMARY KEY, status TEXT, customer TEXT, placed TEXT)",
            vec![],
        )
        .await?;
        let rows = [
            (1, "OPEN", "ACME", "2024-03-01 08:00:00"),
            (2, "OPEN", "Globex", "2024-03-02 17:30:00"),
            (3, "SHIPPED", "ACME Corp", "2024-03-05 12:00:00"),
            (4, "CLOSED", "Initech", "2024-03-09 23:59:00"),
        ];
        for (id, status, customer, placed) in rows {
            conn.run_sql(
                "INSERT INTO orders (id, status, customer, placed) VALUES (@id, @status, @customer, @placed)",
                vec![
                    Parameter::new("id", id),
                    Parameter::new("@status", status),
                    Parameter::new("customer", customer),
                    Parameter::new("placed", placed),
                ],
            )
            .await?;
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_uncommitted_update_is_rolled_back() -> Result<()> {
        let dir = TempDir::new()?;
        let shared = registry().add_connection("ORDERS", "sqlite", &db_path(&dir), None)?;
        let mut conn = shared.lock().await;
        seed(&mut conn).await?;

        conn.transaction_begin().await?;
        let updated = conn
            .run_sql(
                "UPDATE orders SET status = @status WHERE id=@id",
                vec![Parameter::new("status", "VOID"), Parameter::new("id", 1)],
            )
            .await?;
        assert_eq!(updated, 1);
        conn.transaction_rollback().await?;
        assert!(!conn.is_open());

        let row = conn.get_data_row_using_key("orders", "id", 1).await?;
        assert_eq!(row.unwrap().try_get("status")?.as_string(), "OPEN");
        Ok(())
    }

    #[tokio::test]
    async fn test_balanced_transactions_end_closed() -> Result<()> {
        let dir = TempDir::new()?;
        let shared = registry().add_connection("ORDERS", "sqlite", &db_path(&dir), None)?;
        let mut conn = shared.lock().await;
        seed(&mut conn).await?;

        conn.transaction_begin().await?;
        conn.transaction_begin().await?;
        assert_eq!(conn.transaction_count(), 2);
        conn.run_sql("DELETE FROM orders WHERE id=@id", vec![Parameter::new("id", 4)])
            .await?;
        conn.transaction_commit().await?;
        assert!(conn.is_open());
        conn.transaction_commit().await?;

        assert_eq!(conn.transaction_count(), 0);
        assert!(!conn.is_open());
        let count = conn.get_scalar("SELECT COUNT(*) FROM orders", vec![]).await?;
        assert_eq!(count.as_long(), Some(3));
        Ok(())
    }

    #[tokio::test]
    async fn test_unbalanced_commit_fails() -> Result<()> {
        let dir = TempDir::new()?;
        let shared = registry().add_connection("ORDERS", "sqlite", &db_path(&dir), None)?;
        let mut conn = shared.lock().await;

        let err = conn.transaction_commit().await.unwrap_err();
        assert!(err.is_invalid_operation());
        assert!(err.to_string().contains("without a call to Connect/BeginTransaction"));
        Ok(())
    }

    #[tokio::test]
    async fn test_registry_shares_instances() -> Result<()> {
        let dir = TempDir::new()?;
        let path = db_path(&dir);
        let registry = registry();

        let first = registry.add_connection("ORDERS", "sqlite", &path, None)?;
        let again = registry.add_connection("ORDERS", "SQLite", &path, None)?;
        assert!(Arc::ptr_eq(&first, &again));

        let other = dir.path().join("other.db").to_string_lossy().into_owned();
        let replaced = registry.add_connection("ORDERS", "sqlite", &other, None)?;
        assert!(!Arc::ptr_eq(&first, &replaced));
        assert!(Arc::ptr_eq(&replaced, &registry.require("ORDERS")?));

        let err = registry.require("MISSING").unwrap_err();
        assert!(matches!(err, DatabaseError::UnknownConnection(_)));
        Ok(())
    }

    #[tokio::test]
    async fn test_get_list_and_keys() -> Result<()> {
        let dir = TempDir::new()?;
        let shared = registry().add_connection("ORDERS", "sqlite", &db_path(&dir), None)?;
        let mut conn = shared.lock().await;
        seed(&mut conn).await?;

        let open: Vec<Order> = conn
            .get_list(
                "SELECT id, status FROM orders WHERE status = @status ORDER BY id",
                vec![Parameter::new("status", "OPEN")],
            )
            .await?;
        assert_eq!(open.iter().map(|o| o.id).collect::<Vec<_>>(), [1, 2]);
        assert!(open.iter().all(|o| o.status == "OPEN"));
        assert_eq!(conn.transaction_count(), 0);

        let row = conn
            .get_data_row_using_keys("orders", &["status", "customer"], vec!["SHIPPED".into(), "ACME Corp".into()])
            .await?;
        assert_eq!(row.unwrap().try_get("id")?.as_long(), Some(3));

        let err = conn
            .get_data_row_using_keys("orders", &["id", "status"], vec![1.into()])
            .await
            .unwrap_err();
        assert!(err.is_invalid_operation());
        Ok(())
    }

    #[tokio::test]
    async fn test_sequence_numbers() -> Result<()> {
        let dir = TempDir::new()?;
        let shared = registry().add_connection("ORDERS", "sqlite", &db_path(&dir), None)?;
        let mut conn = shared.lock().await;
        conn.run_sql("CREATE TABLE invoices (inv_no TEXT, region TEXT)", vec![]).await?;

        let request = MaxNoRequest::new("invoices", "inv_no", "INV").table_identifier('X');
        let first = conn.get_max_no(&request).await?;
        assert_eq!(first, "INVX000001");

        conn.run_sql(
            "INSERT INTO invoices VALUES (@no, 'EAST'), ('INVX000041', 'WEST')",
            vec![Parameter::new("no", first.as_str())],
        )
        .await?;
        assert_eq!(conn.get_max_no(&request).await?, "INVX000042");

        let east = ClauseBuilder::new()
            .eq(Conjunction::And, "region", "region", "EAST")
            .build(conn.dialect());
        let filtered = request.clone().filter(east);
        assert_eq!(conn.get_max_no(&filtered).await?, "INVX000002");
        Ok(())
    }

    #[tokio::test]
    async fn test_search_screen() -> Result<()> {
        let dir = TempDir::new()?;
        let registry = Arc::new(registry());
        let shared = registry.add_connection("ORDERS", "sqlite", &db_path(&dir), None)?;
        seed(&mut *shared.lock().await).await?;

        let runner = QueryRunner::new(
            Arc::clone(&registry),
            QueryTemplate::new("ORDERS", "SELECT id FROM orders o [WHERE] ORDER BY id"),
        );

        // Form fields as a search screen would pass them; blanks drop out
        let status = "";
        let customer = "ACME*";
        let placed = DateRange::days(None, chrono::NaiveDate::from_ymd_opt(2024, 3, 5));
        let clause = ClauseBuilder::new()
            .eq(Conjunction::Where, "o.status", "status", status)
            .like(Conjunction::And, "o.customer", "customer", customer)
            .date_range(Conjunction::And, "o.placed", "placed_from", "placed_to", placed, false)
            .build(Dialect::Sqlite);
        runner.run_where(clause).await?;

        assert_eq!(runner.status(), RunStatus::Complete);
        let data = runner.data().unwrap();
        let ids: Vec<i64> = data.iter().filter_map(|r| r.get_index(0)?.as_long()).collect();
        assert_eq!(ids, [1, 3]);
        assert_eq!(runner.message_rows_affected(), "Rows Returned: 2");
        Ok(())
    }
}
