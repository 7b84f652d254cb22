use std::path::PathBuf;

use backup_core::{Instance, Save};

#[derive(sqlx::FromRow)]
pub(crate) struct InstanceRow {
    id: i64,
    container_name: String,
    description: Option<String>,
    dir_name: String,
    keep_inventory: bool,
    s3_bucket: String,
    prefix: String,
    working_path: String,
    active: bool,
    created_at: i64,
}

impl From<InstanceRow> for Instance {
    fn from(row: InstanceRow) -> Self {
        Self {
            id: row.id,
            container: row.container_name,
            description: row.description,
            dir_name: row.dir_name,
            keep_inventory: row.keep_inventory,
            bucket: row.s3_bucket,
            prefix: row.prefix,
            working_path: PathBuf::from(row.working_path),
            active: row.active,
            created_at_ms: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct SaveRow {
    id: i64,
    filename: String,
    deleted: bool,
    size: i64,
    created_at: i64,
    instance_id: i64,
}

impl From<SaveRow> for Save {
    fn from(row: SaveRow) -> Self {
        Self {
            id: row.id,
            instance_id: row.instance_id,
            filename: row.filename,
            size: row.size.max(0) as u64,
            deleted: row.deleted,
            created_at_ms: row.created_at,
        }
    }
}
