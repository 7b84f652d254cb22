//! SQLite catalog of managed instances and their saves.
//!
//! Every multi-row change runs in a transaction that is rolled back unless
//! it is explicitly committed.

mod rows;
mod schema;

use std::path::{Path, PathBuf};
use std::str::FromStr;

use backup_core::{Instance, InstanceId, NewInstance, NewSave, Save, SaveId};
use backup_utils::now_millis;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};
use thiserror::Error;
use tracing::debug;

use rows::{InstanceRow, SaveRow};

const INSTANCE_COLUMNS: &str = "id, container_name, description, dir_name, keep_inventory, \
     s3_bucket, prefix, working_path, active, created_at";
const SAVE_COLUMNS: &str = "id, filename, deleted, size, created_at, instance_id";

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("no instance with container name {0}")]
    UnknownInstance(String),

    #[error("an instance with container name {0} already exists")]
    DuplicateInstance(String),
}

#[derive(Debug, Clone)]
pub struct Catalog {
    pool: SqlitePool,
}

impl Catalog {
    /// Opens (creating if needed) the database file and makes sure the
    /// schema exists.
    pub async fn open(path: &Path) -> Result<Self, CatalogError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        Self::with_pool(pool).await
    }

    /// Private in-memory database. A single long-lived connection keeps the
    /// data alive for the lifetime of the pool.
    pub async fn open_in_memory() -> Result<Self, CatalogError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::with_pool(pool).await
    }

    pub async fn with_pool(pool: SqlitePool) -> Result<Self, CatalogError> {
        let catalog = Self { pool };
        catalog.init_schema().await?;
        Ok(catalog)
    }

    async fn init_schema(&self) -> Result<(), CatalogError> {
        for statement in [
            schema::CREATE_INSTANCES,
            schema::CREATE_SAVES,
            schema::CREATE_SAVES_INDEX,
        ] {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// All instances in registry order.
    pub async fn instances(&self) -> Result<Vec<Instance>, CatalogError> {
        let rows = sqlx::query_as::<_, InstanceRow>(&format!(
            "SELECT {INSTANCE_COLUMNS} FROM instances ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Instance::from).collect())
    }

    pub async fn active_instances(&self) -> Result<Vec<Instance>, CatalogError> {
        let rows = sqlx::query_as::<_, InstanceRow>(&format!(
            "SELECT {INSTANCE_COLUMNS} FROM instances WHERE active = TRUE ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Instance::from).collect())
    }

    pub async fn instance_by_container(
        &self,
        container: &str,
    ) -> Result<Option<Instance>, CatalogError> {
        let row = sqlx::query_as::<_, InstanceRow>(&format!(
            "SELECT {INSTANCE_COLUMNS} FROM instances WHERE container_name = ?"
        ))
        .bind(container)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Instance::from))
    }

    pub async fn add_instance(&self, new: NewInstance) -> Result<Instance, CatalogError> {
        let created_at_ms = now_millis();
        let working_path = new.working_path.to_string_lossy().into_owned();
        let result = sqlx::query(
            "INSERT INTO instances (container_name, description, dir_name, keep_inventory, \
             s3_bucket, prefix, working_path, active, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, TRUE, ?)",
        )
        .bind(&new.container)
        .bind(&new.description)
        .bind(&new.dir_name)
        .bind(new.keep_inventory)
        .bind(&new.bucket)
        .bind(&new.prefix)
        .bind(&working_path)
        .bind(created_at_ms)
        .execute(&self.pool)
        .await;

        let result = match result {
            Ok(result) => result,
            Err(sqlx::Error::Database(err)) if err.is_unique_violation() => {
                return Err(CatalogError::DuplicateInstance(new.container));
            }
            Err(err) => return Err(err.into()),
        };

        Ok(Instance {
            id: result.last_insert_rowid(),
            container: new.container,
            description: new.description,
            dir_name: new.dir_name,
            keep_inventory: new.keep_inventory,
            bucket: new.bucket,
            prefix: new.prefix,
            working_path: PathBuf::from(working_path),
            active: true,
            created_at_ms,
        })
    }

    pub async fn set_active(&self, container: &str, active: bool) -> Result<(), CatalogError> {
        let result = sqlx::query("UPDATE instances SET active = ? WHERE container_name = ?")
            .bind(active)
            .bind(container)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(CatalogError::UnknownInstance(container.to_string()));
        }
        Ok(())
    }

    /// Non-deleted saves, newest first.
    pub async fn live_saves(&self, instance_id: InstanceId) -> Result<Vec<Save>, CatalogError> {
        let rows = sqlx::query_as::<_, SaveRow>(&format!(
            "SELECT {SAVE_COLUMNS} FROM saves WHERE instance_id = ? AND deleted = FALSE \
             ORDER BY created_at DESC, id DESC"
        ))
        .bind(instance_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Save::from).collect())
    }

    /// Every save including tombstones, newest first.
    pub async fn saves(&self, instance_id: InstanceId) -> Result<Vec<Save>, CatalogError> {
        let rows = sqlx::query_as::<_, SaveRow>(&format!(
            "SELECT {SAVE_COLUMNS} FROM saves WHERE instance_id = ? \
             ORDER BY created_at DESC, id DESC"
        ))
        .bind(instance_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Save::from).collect())
    }

    /// Whether a save of this instance, live or tombstoned, already uses `filename`.
    pub async fn has_save(&self, instance_id: InstanceId, filename: &str) -> Result<bool, CatalogError> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT id FROM saves WHERE instance_id = ? AND filename = ? LIMIT 1")
                .bind(instance_id)
                .bind(filename)
                .fetch_optional(&self.pool)
                .await?;
        Ok(found.is_some())
    }

    /// Inserts the save in its own transaction; nothing is visible unless the
    /// commit succeeds.
    pub async fn record_save(&self, new: NewSave) -> Result<Save, CatalogError> {
        let created_at_ms = now_millis();
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "INSERT INTO saves (filename, deleted, size, created_at, instance_id) \
             VALUES (?, FALSE, ?, ?, ?)",
        )
        .bind(&new.filename)
        .bind(new.size as i64)
        .bind(created_at_ms)
        .bind(new.instance_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        debug!("recorded save {} for instance {}", new.filename, new.instance_id);
        Ok(Save {
            id: result.last_insert_rowid(),
            instance_id: new.instance_id,
            filename: new.filename,
            size: new.size,
            deleted: false,
            created_at_ms,
        })
    }

    /// Starts an all-or-nothing tombstoning pass.
    pub async fn begin_tombstones(&self) -> Result<TombstoneBatch, CatalogError> {
        Ok(TombstoneBatch {
            tx: self.pool.begin().await?,
            marked: Vec::new(),
        })
    }
}

/// Open transaction marking saves deleted. Dropping it without
/// [`TombstoneBatch::commit`] rolls every mark back.
pub struct TombstoneBatch {
    tx: Transaction<'static, Sqlite>,
    marked: Vec<SaveId>,
}

impl TombstoneBatch {
    pub async fn mark(&mut self, save_id: SaveId) -> Result<(), CatalogError> {
        sqlx::query("UPDATE saves SET deleted = TRUE WHERE id = ? AND deleted = FALSE")
            .bind(save_id)
            .execute(&mut *self.tx)
            .await?;
        self.marked.push(save_id);
        Ok(())
    }

    pub async fn commit(self) -> Result<Vec<SaveId>, CatalogError> {
        self.tx.commit().await?;
        Ok(self.marked)
    }
}
