use ::duckdb::{params, Connection};

struct Migration {
    version: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: "0001_auth_tokens",
        sql: r"
CREATE SEQUENCE IF NOT EXISTS seq_auth_tokens START 1;

CREATE TABLE IF NOT EXISTS auth_tokens (
    id BIGINT PRIMARY KEY DEFAULT nextval('seq_auth_tokens'),
    api TEXT NOT NULL,
    token TEXT NOT NULL,
    expires_in BIGINT NOT NULL,
    obtained_at BIGINT NOT NULL
);
",
    },
    Migration {
        version: "0002_idr_dnb_dpl",
        sql: r"
CREATE SEQUENCE IF NOT EXISTS seq_idr_dnb_dpl START 1;

CREATE TABLE IF NOT EXISTS idr_dnb_dpl (
    id BIGINT PRIMARY KEY DEFAULT nextval('seq_idr_dnb_dpl'),
    params TEXT NOT NULL,
    params_at BIGINT NOT NULL,
    results TEXT,
    http_status INTEGER,
    obtained_at BIGINT,
    duns TEXT
);
",
    },
    Migration {
        version: "0003_indexes",
        sql: r"
CREATE INDEX IF NOT EXISTS idx_auth_tokens_api_id ON auth_tokens(api, id);
",
    },
];

pub fn apply_migrations(connection: &Connection) -> Result<(), ::duckdb::Error> {
    connection.execute_batch(
        r"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version TEXT PRIMARY KEY,
    applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
",
    )?;

    for migration in MIGRATIONS {
        let applied_count: i64 = connection.query_row(
            "SELECT COUNT(*) FROM schema_migrations WHERE version = ?",
            params![migration.version],
            |row| row.get(0),
        )?;

        if applied_count == 0 {
            tracing::debug!(version = migration.version, "applying warehouse migration");
            connection.execute_batch(migration.sql)?;
            connection.execute(
                "INSERT INTO schema_migrations (version) VALUES (?)",
                params![migration.version],
            )?;
        }
    }

    Ok(())
}
