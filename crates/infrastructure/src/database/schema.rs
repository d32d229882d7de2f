//! 表结构初始化，所有语句可重复执行

pub const SQLITE_SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS jobs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        source_ref TEXT NOT NULL,
        task_id TEXT,
        status TEXT NOT NULL,
        satellite TEXT,
        captured_at TEXT,
        retry_count INTEGER NOT NULL DEFAULT 0,
        error_detail TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_jobs_task_id ON jobs(task_id)",
    "CREATE INDEX IF NOT EXISTS idx_jobs_status_updated_at ON jobs(status, updated_at)",
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS ux_jobs_active_identity ON jobs(satellite, captured_at)
    WHERE status IN ('pending', 'running', 'retrying')
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS app_settings (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
];

pub const POSTGRES_SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS jobs (
        id BIGSERIAL PRIMARY KEY,
        name VARCHAR(255) NOT NULL,
        source_ref TEXT NOT NULL,
        task_id VARCHAR(255),
        status VARCHAR(16) NOT NULL,
        satellite VARCHAR(64),
        captured_at TIMESTAMPTZ,
        retry_count INTEGER NOT NULL DEFAULT 0,
        error_detail TEXT,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_jobs_task_id ON jobs(task_id)",
    "CREATE INDEX IF NOT EXISTS idx_jobs_status_updated_at ON jobs(status, updated_at)",
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS ux_jobs_active_identity ON jobs(satellite, captured_at)
    WHERE status IN ('pending', 'running', 'retrying')
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS app_settings (
        key VARCHAR(255) PRIMARY KEY,
        value JSONB NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
];

pub const JOB_COLUMNS: &str = "id, name, source_ref, task_id, status, satellite, captured_at, \
     retry_count, error_detail, created_at, updated_at";
