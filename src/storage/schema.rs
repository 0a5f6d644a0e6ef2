//! Table definitions. Tables are created if absent and never dropped or
//! migrated.

use rusqlite::Connection;

/// Names of every table this crate owns.
pub const TABLES: [&str; 2] = ["connection_tests", "speed_tests"];

/// PostgreSQL DDL, one statement per entry.
pub const POSTGRES_SCHEMA: [&str; 2] = [
    "CREATE TABLE IF NOT EXISTS connection_tests (
        conn_test_id SERIAL PRIMARY KEY,
        timestamp TIMESTAMPTZ NOT NULL DEFAULT now(),
        is_connected BOOLEAN NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS speed_tests (
        speed_test_id SERIAL PRIMARY KEY,
        timestamp TIMESTAMPTZ NOT NULL DEFAULT now(),
        download_speed DOUBLE PRECISION NOT NULL,
        upload_speed DOUBLE PRECISION NOT NULL,
        ping DOUBLE PRECISION
    )",
];

/// Create the SQLite tables if they are missing.
pub fn migrate(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS connection_tests (
            conn_test_id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
            is_connected INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS speed_tests (
            speed_test_id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
            download_speed REAL NOT NULL,
            upload_speed REAL NOT NULL,
            ping REAL
        );",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_tables(conn: &Connection) -> Vec<String> {
        let mut stmt = conn
            .prepare(
                "SELECT name FROM sqlite_master
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
                 ORDER BY name",
            )
            .unwrap();
        stmt.query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap()
    }

    #[test]
    fn test_migrate_creates_tables() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();

        assert_eq!(user_tables(&conn), vec!["connection_tests", "speed_tests"]);

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM speed_tests", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        let before: String = conn
            .query_row(
                "SELECT group_concat(sql, ';') FROM sqlite_master WHERE type = 'table'",
                [],
                |row| row.get(0),
            )
            .unwrap();

        migrate(&conn).unwrap();
        let after: String = conn
            .query_row(
                "SELECT group_concat(sql, ';') FROM sqlite_master WHERE type = 'table'",
                [],
                |row| row.get(0),
            )
            .unwrap();

        assert_eq!(user_tables(&conn).len(), TABLES.len());
        assert_eq!(before, after);
    }

    #[test]
    fn test_ping_is_nullable() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        conn.execute(
            "INSERT INTO speed_tests (download_speed, upload_speed, ping) VALUES (0, 0, NULL)",
            [],
        )
        .unwrap();
        let err = conn.execute(
            "INSERT INTO connection_tests (is_connected) VALUES (NULL)",
            [],
        );
        assert!(err.is_err());
    }
}
