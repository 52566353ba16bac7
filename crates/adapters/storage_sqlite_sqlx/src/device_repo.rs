//! `SQLite` implementation of [`DeviceRepository`].

use std::str::FromStr;

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};

use lumen_app::ports::DeviceRepository;
use lumen_domain::device::{Device, DeviceKind, DeviceStatus, StatusUpdate};
use lumen_domain::error::{LumenError, NotFoundError};
use lumen_domain::id::DeviceId;
use lumen_domain::time::Timestamp;

use crate::error::StorageError;
use crate::timestamp;

/// Wrapper for converting database rows into domain [`Device`].
struct Wrapper(Device);

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let id: String = row.try_get("id")?;
        let kind: String = row.try_get("kind")?;
        let status: String = row.try_get("status")?;
        let last_seen: Option<String> = row.try_get("last_seen")?;
        let level: Option<i64> = row.try_get("level")?;

        let id = DeviceId::from_str(&id).map_err(|err| sqlx::Error::Decode(Box::new(err)))?;
        let kind = DeviceKind::from_str(&kind).map_err(|err| sqlx::Error::Decode(err.into()))?;
        let status =
            DeviceStatus::from_str(&status).map_err(|err| sqlx::Error::Decode(err.into()))?;
        let level = level
            .map(u8::try_from)
            .transpose()
            .map_err(|err| sqlx::Error::Decode(Box::new(err)))?;

        Ok(Self(Device {
            id,
            name: row.try_get("name")?,
            kind,
            address: row.try_get("address")?,
            status,
            last_seen: timestamp::decode_opt(last_seen)?,
            location: row.try_get("location")?,
            manufacturer: row.try_get("manufacturer")?,
            model: row.try_get("model")?,
            level,
        }))
    }
}

const INSERT: &str = "INSERT INTO devices \
    (id, name, kind, address, status, last_seen, location, manufacturer, model, level) \
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";
const SELECT_BY_ID: &str = "SELECT * FROM devices WHERE id = ?";
const SELECT_ALL: &str = "SELECT * FROM devices ORDER BY id";
const UPDATE: &str = "UPDATE devices SET \
    name = ?, kind = ?, address = ?, location = ?, manufacturer = ?, model = ?, \
    level = COALESCE(?, level) \
    WHERE id = ?";
// Monotonic: an observation never overwrites a newer one.
const RECORD_STATUS: &str = "UPDATE devices SET \
    status = ?, level = COALESCE(?, level), last_seen = ? \
    WHERE id = ? AND (last_seen IS NULL OR last_seen < ?)";
const DELETE_BY_ID: &str = "DELETE FROM devices WHERE id = ?";

/// `SQLite`-backed device repository.
#[derive(Clone)]
pub struct SqliteDeviceRepository {
    pool: SqlitePool,
}

impl SqliteDeviceRepository {
    /// Create a new repository using the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl DeviceRepository for SqliteDeviceRepository {
    async fn create(&self, device: Device) -> Result<Device, LumenError> {
        sqlx::query(INSERT)
            .bind(device.id.as_str())
            .bind(&device.name)
            .bind(device.kind.as_str())
            .bind(&device.address)
            .bind(device.status.as_str())
            .bind(device.last_seen.map(timestamp::encode))
            .bind(&device.location)
            .bind(&device.manufacturer)
            .bind(&device.model)
            .bind(device.level.map(i64::from))
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(device)
    }

    async fn get_by_id(&self, id: &DeviceId) -> Result<Option<Device>, LumenError> {
        let row: Option<Wrapper> = sqlx::query_as(SELECT_BY_ID)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(row.map(|w| w.0))
    }

    async fn get_all(&self) -> Result<Vec<Device>, LumenError> {
        let rows: Vec<Wrapper> = sqlx::query_as(SELECT_ALL)
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(rows.into_iter().map(|w| w.0).collect())
    }

    async fn update(&self, device: Device) -> Result<Device, LumenError> {
        let result = sqlx::query(UPDATE)
            .bind(&device.name)
            .bind(device.kind.as_str())
            .bind(&device.address)
            .bind(&device.location)
            .bind(&device.manufacturer)
            .bind(&device.model)
            .bind(device.level.map(i64::from))
            .bind(device.id.as_str())
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;

        if result.rows_affected() == 0 {
            return Err(NotFoundError {
                entity: "Device",
                id: device.id.to_string(),
            }
            .into());
        }
        Ok(device)
    }

    async fn record_status(
        &self,
        id: &DeviceId,
        update: StatusUpdate,
        at: Timestamp,
    ) -> Result<bool, LumenError> {
        let at = timestamp::encode(at);
        let result = sqlx::query(RECORD_STATUS)
            .bind(update.status.as_str())
            .bind(update.level.map(i64::from))
            .bind(&at)
            .bind(id.as_str())
            .bind(&at)
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: &DeviceId) -> Result<(), LumenError> {
        sqlx::query(DELETE_BY_ID)
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(())
    }
}
