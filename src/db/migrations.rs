//! Schema versioning through SQLite's `user_version` pragma. Each entry in
//! [`MIGRATIONS`] moves the schema up by exactly one version.

use anyhow::{bail, Context, Result};
use rusqlite::Connection;

const MIGRATIONS: &[(i32, &str)] = &[(1, include_str!("schemas/schema_v1.sql"))];

fn latest_version() -> i32 {
    MIGRATIONS.last().map_or(0, |(version, _)| *version)
}

fn schema_version(conn: &Connection) -> Result<i32> {
    conn.pragma_query_value(None, "user_version", |row| row.get(0))
        .context("failed to read user_version pragma")
}

pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    let current = schema_version(conn)?;
    let latest = latest_version();

    if current > latest {
        bail!("widget store schema v{current} is newer than this build supports (v{latest})");
    }
    if current == latest {
        return Ok(());
    }

    let tx = conn
        .transaction()
        .context("failed to open migration transaction")?;

    for (version, sql) in MIGRATIONS.iter().filter(|(version, _)| *version > current) {
        tx.execute_batch(sql)
            .with_context(|| format!("migration to v{version} failed"))?;
    }

    tx.pragma_update(None, "user_version", latest)
        .context("failed to update user_version pragma")?;
    tx.commit().context("failed to commit migrations")?;

    log::info!("Widget store migrated from v{current} to v{latest}");
    Ok(())
}
