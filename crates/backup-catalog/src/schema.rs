pub(crate) const CREATE_INSTANCES: &str = "CREATE TABLE IF NOT EXISTS instances (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    container_name VARCHAR(255) NOT NULL UNIQUE,
    description TEXT,
    dir_name TEXT NOT NULL,
    keep_inventory BOOLEAN NOT NULL,
    s3_bucket VARCHAR(255) NOT NULL,
    prefix TEXT NOT NULL,
    working_path TEXT NOT NULL,
    active BOOLEAN NOT NULL DEFAULT TRUE,
    created_at BIGINT NOT NULL
)";

pub(crate) const CREATE_SAVES: &str = "CREATE TABLE IF NOT EXISTS saves (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    filename VARCHAR(255) NOT NULL,
    deleted BOOLEAN NOT NULL DEFAULT FALSE,
    size BIGINT NOT NULL,
    created_at BIGINT NOT NULL,
    instance_id INTEGER NOT NULL,
    FOREIGN KEY (instance_id) REFERENCES instances(id)
)";

pub(crate) const CREATE_SAVES_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS saves_instance_live ON saves (instance_id, deleted, created_at)";
