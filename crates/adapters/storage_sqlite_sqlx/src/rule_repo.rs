//! `SQLite` implementation of [`RuleRepository`].
//!
//! Trigger and actions are stored as JSON columns; evaluation state lives in
//! plain columns so the monotonic guard can be expressed in SQL.

use std::str::FromStr;

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};

use lumen_app::ports::RuleRepository;
use lumen_domain::error::{LumenError, NotFoundError};
use lumen_domain::id::{DeviceId, RuleId};
use lumen_domain::rule::{Action, Rule, RuleState, Trigger};

use crate::error::StorageError;
use crate::timestamp;

struct Wrapper(Rule);

fn decode_err(err: impl std::error::Error + Send + Sync + 'static) -> sqlx::Error {
    sqlx::Error::Decode(Box::new(err))
}

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let id: String = row.try_get("id")?;
        let source: String = row.try_get("source_device_id")?;
        let target: String = row.try_get("target_device_id")?;
        let trigger_json: String = row.try_get("trigger_data")?;
        let action_json: String = row.try_get("action_data")?;
        let release_json: Option<String> = row.try_get("release_action_data")?;
        let debounce_secs: i64 = row.try_get("debounce_secs")?;

        let trigger: Trigger = serde_json::from_str(&trigger_json).map_err(decode_err)?;
        let action: Action = serde_json::from_str(&action_json).map_err(decode_err)?;
        let release_action: Option<Action> = release_json
            .map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(decode_err)?;

        Ok(Self(Rule {
            id: RuleId::from_str(&id).map_err(decode_err)?,
            name: row.try_get("name")?,
            source_device_id: DeviceId::from_str(&source).map_err(decode_err)?,
            trigger,
            target_device_id: DeviceId::from_str(&target).map_err(decode_err)?,
            action,
            release_action,
            debounce_secs: u64::try_from(debounce_secs).map_err(decode_err)?,
            enabled: row.try_get("enabled")?,
            state: RuleState {
                engaged: row.try_get("engaged")?,
                last_fired: timestamp::decode_opt(row.try_get("last_fired")?)?,
                last_released: timestamp::decode_opt(row.try_get("last_released")?)?,
            },
        }))
    }
}

struct Columns {
    trigger: String,
    action: String,
    release_action: Option<String>,
    debounce_secs: i64,
}

impl Columns {
    fn encode(rule: &Rule) -> Result<Self, StorageError> {
        Ok(Self {
            trigger: serde_json::to_string(&rule.trigger)?,
            action: serde_json::to_string(&rule.action)?,
            release_action: rule
                .release_action
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
            debounce_secs: i64::try_from(rule.debounce_secs)?,
        })
    }
}

const INSERT: &str = "INSERT INTO rules \
    (id, name, source_device_id, target_device_id, trigger_data, action_data, \
     release_action_data, debounce_secs, enabled, engaged, last_fired, last_released) \
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";
const SELECT_BY_ID: &str = "SELECT * FROM rules WHERE id = ?";
const SELECT_ALL: &str = "SELECT * FROM rules ORDER BY rowid";
const UPDATE: &str = "UPDATE rules SET \
    name = ?, source_device_id = ?, target_device_id = ?, trigger_data = ?, \
    action_data = ?, release_action_data = ?, debounce_secs = ?, enabled = ? \
    WHERE id = ?";
// Firing timestamps only move forward.
const SAVE_STATE: &str = "UPDATE rules SET \
    engaged = ?, \
    last_fired = CASE \
        WHEN ? IS NULL THEN last_fired \
        WHEN last_fired IS NULL OR last_fired < ? THEN ? \
        ELSE last_fired END, \
    last_released = CASE \
        WHEN ? IS NULL THEN last_released \
        WHEN last_released IS NULL OR last_released < ? THEN ? \
        ELSE last_released END \
    WHERE id = ?";
const DELETE_BY_ID: &str = "DELETE FROM rules WHERE id = ?";

/// `SQLite`-backed rule repository.
#[derive(Clone)]
pub struct SqliteRuleRepository {
    pool: SqlitePool,
}

impl SqliteRuleRepository {
    /// Create a new repository backed by the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl RuleRepository for SqliteRuleRepository {
    async fn create(&self, rule: Rule) -> Result<Rule, LumenError> {
        let columns = Columns::encode(&rule)?;
        sqlx::query(INSERT)
            .bind(rule.id.as_str())
            .bind(&rule.name)
            .bind(rule.source_device_id.as_str())
            .bind(rule.target_device_id.as_str())
            .bind(&columns.trigger)
            .bind(&columns.action)
            .bind(&columns.release_action)
            .bind(columns.debounce_secs)
            .bind(rule.enabled)
            .bind(rule.state.engaged)
            .bind(rule.state.last_fired.map(timestamp::encode))
            .bind(rule.state.last_released.map(timestamp::encode))
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(rule)
    }

    async fn get_by_id(&self, id: &RuleId) -> Result<Option<Rule>, LumenError> {
        let row: Option<Wrapper> = sqlx::query_as(SELECT_BY_ID)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(row.map(|w| w.0))
    }

    async fn get_all(&self) -> Result<Vec<Rule>, LumenError> {
        let rows: Vec<Wrapper> = sqlx::query_as(SELECT_ALL)
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(rows.into_iter().map(|w| w.0).collect())
    }

    async fn update(&self, rule: Rule) -> Result<Rule, LumenError> {
        let columns = Columns::encode(&rule)?;
        let result = sqlx::query(UPDATE)
            .bind(&rule.name)
            .bind(rule.source_device_id.as_str())
            .bind(rule.target_device_id.as_str())
            .bind(&columns.trigger)
            .bind(&columns.action)
            .bind(&columns.release_action)
            .bind(columns.debounce_secs)
            .bind(rule.enabled)
            .bind(rule.id.as_str())
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;

        if result.rows_affected() == 0 {
            return Err(NotFoundError {
                entity: "Rule",
                id: rule.id.to_string(),
            }
            .into());
        }
        Ok(rule)
    }

    async fn save_state(&self, id: &RuleId, state: &RuleState) -> Result<(), LumenError> {
        let fired = state.last_fired.map(timestamp::encode);
        let released = state.last_released.map(timestamp::encode);
        sqlx::query(SAVE_STATE)
            .bind(state.engaged)
            .bind(&fired)
            .bind(&fired)
            .bind(&fired)
            .bind(&released)
            .bind(&released)
            .bind(&released)
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(())
    }

    async fn delete(&self, id: &RuleId) -> Result<(), LumenError> {
        sqlx::query(DELETE_BY_ID)
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(())
    }
}
