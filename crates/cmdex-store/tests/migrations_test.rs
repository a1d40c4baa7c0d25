// Integration tests for the migration runner

#![allow(clippy::unwrap_used, clippy::expect_used)]

use cmdex_core::EngineError;
use cmdex_store::migrations::apply_migrations;
use rusqlite::Connection;

fn setup_test_db() -> Connection {
    Connection::open_in_memory().expect("Failed to create in-memory database")
}

fn table_names(conn: &Connection) -> Vec<String> {
    let mut stmt = conn
        .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
        .unwrap();
    let names = stmt
        .query_map([], |row| row.get(0))
        .unwrap()
        .collect::<rusqlite::Result<Vec<String>>>()
        .unwrap();
    names
}

#[test]
fn test_apply_migrations_on_empty_db() {
    // Given: An empty SQLite database
    let mut conn = setup_test_db();

    // When: Migrations are applied
    let result = apply_migrations(&mut conn);

    // Then: The schema exists
    assert!(result.is_ok(), "Migrations should succeed: {:?}", result.err());
    let tables = table_names(&conn);
    for expected in [
        "schema_version",
        "tasks",
        "users",
        "identity_links",
        "audit_log",
        "sqlite_sequence",
    ] {
        assert!(
            tables.contains(&expected.to_string()),
            "Missing table: {}",
            expected
        );
    }
}

#[test]
fn test_reapplying_migrations_is_a_no_op() {
    // Given: A migrated database
    let mut conn = setup_test_db();
    apply_migrations(&mut conn).unwrap();

    // When: Migrations are applied again
    apply_migrations(&mut conn).unwrap();

    // Then: Each migration is recorded once
    let recorded: i64 = conn
        .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
        .unwrap();
    assert_eq!(recorded, 1);
}

#[test]
fn test_tampered_checksum_is_rejected() {
    // Given: A migrated database whose recorded checksum was altered
    let mut conn = setup_test_db();
    apply_migrations(&mut conn).unwrap();
    conn.execute("UPDATE schema_version SET checksum = 'bogus'", [])
        .unwrap();

    // When: Migrations run again
    let err = apply_migrations(&mut conn).unwrap_err();

    // Then: The mismatch is reported as a persistence failure
    match err {
        EngineError::Persistence { op, message } => {
            assert_eq!(op, "migration_checksum");
            assert!(message.contains("001_initial_schema"));
        }
        other => panic!("expected Persistence, got {other:?}"),
    }
}
