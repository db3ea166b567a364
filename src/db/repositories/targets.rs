use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::warn;
use rusqlite::{params, OptionalExtension, Row};

use crate::{
    db::{
        helpers::{from_column, to_column},
        models::{Target, TargetId},
        Database,
    },
    refresh::TargetStore,
    weather::WeatherPayload,
};

/// Raw column values; decoding happens outside the rusqlite row callback.
struct TargetRow {
    id: TargetId,
    location: Option<String>,
    payload: Option<String>,
    last_refreshed_at: Option<String>,
}

fn read_target_row(row: &Row) -> Result<TargetRow, rusqlite::Error> {
    Ok(TargetRow {
        id: row.get("id")?,
        location: row.get("location")?,
        payload: row.get("payload")?,
        last_refreshed_at: row.get("last_refreshed_at")?,
    })
}

/// Cached fields that no longer decode are logged and dropped. A bad cache
/// only costs that widget its stale data; the next refresh rewrites it.
fn into_target(row: TargetRow) -> Target {
    let cached_result = row.payload.as_deref().and_then(|raw| {
        serde_json::from_str::<WeatherPayload>(raw)
            .map_err(|err| warn!("dropping corrupt cached payload for widget {}: {err}", row.id))
            .ok()
    });

    let last_refreshed_at = from_column(row.last_refreshed_at, "last_refreshed_at")
        .unwrap_or_else(|err| {
            warn!("dropping refresh time for widget {}: {err:#}", row.id);
            None
        });

    Target {
        id: row.id,
        location: row.location,
        last_refreshed_at,
        cached_result,
    }
}

fn ensure_valid_id(target_id: TargetId) -> Result<()> {
    if target_id == 0 {
        bail!("widget id must be positive");
    }
    Ok(())
}

impl Database {
    /// Creates the target if needed and sets its location. Cached weather is
    /// kept; the next refresh overwrites it for the new location.
    pub async fn upsert_target_location(&self, target_id: TargetId, location: String) -> Result<()> {
        ensure_valid_id(target_id)?;
        let now = to_column(Utc::now());

        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO widget_targets (id, location, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?3)
                 ON CONFLICT(id) DO UPDATE SET
                     location = excluded.location,
                     updated_at = excluded.updated_at",
                params![target_id, location, now],
            )
            .with_context(|| format!("failed to save location for widget {target_id}"))?;
            Ok(())
        })
        .await
    }

    pub async fn get_target(&self, target_id: TargetId) -> Result<Option<Target>> {
        let row = self
            .execute(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, location, payload, last_refreshed_at
                     FROM widget_targets
                     WHERE id = ?1",
                )?;

                let row = stmt
                    .query_row(params![target_id], read_target_row)
                    .optional()?;

                Ok(row)
            })
            .await?;

        Ok(row.map(into_target))
    }

    pub async fn list_targets(&self) -> Result<Vec<Target>> {
        let rows = self
            .execute(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, location, payload, last_refreshed_at
                     FROM widget_targets
                     ORDER BY id ASC",
                )?;

                let rows = stmt
                    .query_map([], read_target_row)?
                    .collect::<Result<Vec<_>, _>>()?;

                Ok(rows)
            })
            .await?;

        Ok(rows.into_iter().map(into_target).collect())
    }

    /// Ids and locations only. Enumeration for a refresh never reads the
    /// cached columns, so one widget's stored data cannot block the others.
    pub async fn list_target_locations(&self) -> Result<Vec<Target>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, location FROM widget_targets ORDER BY id ASC",
            )?;

            let targets = stmt
                .query_map([], |row| {
                    Ok(Target {
                        id: row.get("id")?,
                        location: row.get("location")?,
                        last_refreshed_at: None,
                        cached_result: None,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(targets)
        })
        .await
    }

    /// Removes everything stored for a widget. Unknown ids are a no-op.
    pub async fn delete_target(&self, target_id: TargetId) -> Result<()> {
        self.execute(move |conn| {
            conn.execute(
                "DELETE FROM widget_targets WHERE id = ?1",
                params![target_id],
            )
            .with_context(|| format!("failed to delete widget {target_id}"))?;
            Ok(())
        })
        .await
    }

    /// Writes the fetched payload and its timestamp. The widget has to exist:
    /// a refresh racing a deletion must not resurrect the row.
    pub async fn save_target_result(
        &self,
        target_id: TargetId,
        payload: &WeatherPayload,
        refreshed_at: DateTime<Utc>,
    ) -> Result<()> {
        let serialized = serde_json::to_string(payload).context("failed to serialize weather payload")?;
        let refreshed_at = to_column(refreshed_at);

        let updated = self
            .execute(move |conn| {
                let updated = conn
                    .execute(
                        "UPDATE widget_targets
                         SET payload = ?1,
                             last_refreshed_at = ?2,
                             updated_at = ?2
                         WHERE id = ?3",
                        params![serialized, refreshed_at, target_id],
                    )
                    .with_context(|| format!("failed to save weather for widget {target_id}"))?;
                Ok(updated)
            })
            .await?;

        if updated == 0 {
            return Err(anyhow!("widget {target_id} no longer exists"));
        }
        Ok(())
    }

    pub async fn target_location(&self, target_id: TargetId) -> Result<Option<String>> {
        self.execute(move |conn| {
            let location = conn
                .query_row(
                    "SELECT location FROM widget_targets WHERE id = ?1",
                    params![target_id],
                    |row| row.get::<_, Option<String>>(0),
                )
                .optional()?
                .flatten();
            Ok(location)
        })
        .await
    }
}

#[async_trait]
impl TargetStore for Database {
    async fn list_configured_targets(&self) -> Result<Vec<Target>> {
        self.list_target_locations().await
    }

    async fn save_result(
        &self,
        target_id: TargetId,
        payload: &WeatherPayload,
        refreshed_at: DateTime<Utc>,
    ) -> Result<()> {
        self.save_target_result(target_id, payload, refreshed_at).await
    }

    async fn location(&self, target_id: TargetId) -> Result<Option<String>> {
        self.target_location(target_id).await
    }
}
