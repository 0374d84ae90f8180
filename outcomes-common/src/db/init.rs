//! Database initialization
//!
//! Creates the database on first run, applies the base schema with
//! `CREATE TABLE IF NOT EXISTS`, runs versioned migrations and seeds
//! default settings. Every step is idempotent.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Busy timeout used until the settings table has been read
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

/// Per-connection options shared by the bootstrap and production pools
fn connect_options(db_path: &Path, busy_timeout_ms: u64) -> SqliteConnectOptions {
    SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(busy_timeout_ms))
}

/// Initialize database connection and create tables if needed
///
/// Schema work runs on a single-connection bootstrap pool. The returned
/// pool is opened afterwards so every connection carries the
/// `database_busy_timeout_ms` setting.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let bootstrap = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(connect_options(db_path, DEFAULT_BUSY_TIMEOUT_MS))
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&bootstrap).await?;

    crate::db::migrations::run_migrations(&bootstrap).await?;

    init_default_settings(&bootstrap).await?;

    let timeout_ms = load_busy_timeout_ms(&bootstrap).await?;
    bootstrap.close().await;

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .connect_with(connect_options(db_path, timeout_ms))
        .await?;

    info!("Database busy timeout set to {} ms", timeout_ms);

    Ok(pool)
}

/// Read `database_busy_timeout_ms`, falling back to the default when unusable
async fn load_busy_timeout_ms(pool: &SqlitePool) -> Result<u64> {
    let value: Option<Option<String>> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = 'database_busy_timeout_ms'")
            .fetch_optional(pool)
            .await?;

    match value.flatten() {
        Some(raw) => match raw.trim().parse::<u64>() {
            Ok(ms) => Ok(ms),
            Err(_) => {
                warn!("Invalid database_busy_timeout_ms '{}', using {} ms", raw, DEFAULT_BUSY_TIMEOUT_MS);
                Ok(DEFAULT_BUSY_TIMEOUT_MS)
            }
        },
        None => {
            debug!("database_busy_timeout_ms not set, using {} ms", DEFAULT_BUSY_TIMEOUT_MS);
            Ok(DEFAULT_BUSY_TIMEOUT_MS)
        }
    }
}

/// Create every table used by the outcome engine
///
/// Exposed separately so tests can build a schema on an arbitrary pool.
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_schema_version_table(pool).await?;
    create_settings_table(pool).await?;

    // Organisation
    create_departments_table(pool).await?;
    create_students_table(pool).await?;
    create_student_departments_table(pool).await?;

    // Courses and enrollment
    create_courses_table(pool).await?;
    create_course_offerings_table(pool).await?;
    create_enrollments_table(pool).await?;
    create_assessment_components_table(pool).await?;
    create_grades_table(pool).await?;

    // Outcome graph
    create_learning_outcomes_table(pool).await?;
    create_program_outcomes_table(pool).await?;
    create_component_lo_relations_table(pool).await?;
    create_lo_po_relations_table(pool).await?;

    // Derived results
    create_student_program_outcome_scores_table(pool).await?;

    Ok(())
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the settings table
///
/// Stores application configuration key-value pairs.
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Initialize or repair default settings
async fn init_default_settings(pool: &SqlitePool) -> Result<()> {
    ensure_setting(pool, "http_port", "5790").await?;
    ensure_setting(pool, "database_busy_timeout_ms", &DEFAULT_BUSY_TIMEOUT_MS.to_string()).await?;

    info!("Default settings initialized");
    Ok(())
}

/// Ensure a setting exists with the specified default value
///
/// If the setting doesn't exist, it will be created with the default.
/// If the setting exists but has a NULL value, it will be reset to the default.
async fn ensure_setting(pool: &SqlitePool, key: &str, default_value: &str) -> Result<()> {
    let value: Option<Option<String>> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(pool)
            .await?;

    match value {
        None => {
            // INSERT OR IGNORE tolerates concurrent initialization
            sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
                .bind(key)
                .bind(default_value)
                .execute(pool)
                .await?;

            info!("Initialized setting '{}' with default value: {}", key, default_value);
        }
        Some(None) => {
            sqlx::query("UPDATE settings SET value = ?, updated_at = CURRENT_TIMESTAMP WHERE key = ?")
                .bind(default_value)
                .bind(key)
                .execute(pool)
                .await?;

            warn!("Setting '{}' was NULL, reset to default: {}", key, default_value);
        }
        Some(Some(_)) => {}
    }

    Ok(())
}

pub async fn create_departments_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS departments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            code TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_students_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS students (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            student_no TEXT NOT NULL UNIQUE,
            full_name TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Many-to-many: a student may be declared in several departments
pub async fn create_student_departments_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS student_departments (
            student_id INTEGER NOT NULL REFERENCES students(id) ON DELETE CASCADE,
            department_id INTEGER NOT NULL REFERENCES departments(id) ON DELETE CASCADE,
            PRIMARY KEY (student_id, department_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_courses_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS courses (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            code TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            credit REAL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_course_offerings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS course_offerings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            course_id INTEGER NOT NULL REFERENCES courses(id) ON DELETE CASCADE,
            year INTEGER NOT NULL,
            semester TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_offerings_course ON course_offerings(course_id)")
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn create_enrollments_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS enrollments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            student_id INTEGER NOT NULL REFERENCES students(id) ON DELETE CASCADE,
            offering_id INTEGER NOT NULL REFERENCES course_offerings(id) ON DELETE CASCADE,
            status TEXT NOT NULL DEFAULT 'ENROLLED'
                CHECK (status IN ('ENROLLED', 'DROPPED', 'COMPLETED')),
            enrolled_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (student_id, offering_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_enrollments_student ON enrollments(student_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_enrollments_offering ON enrollments(offering_id)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Graded items of an offering (midterm, project, ...)
///
/// `weight` is the nominal share of the course grade. The outcome
/// aggregation does not read it.
pub async fn create_assessment_components_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS assessment_components (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            offering_id INTEGER NOT NULL REFERENCES course_offerings(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            weight REAL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_components_offering ON assessment_components(offering_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// One row per (enrollment, component); NULL score means "not graded yet"
pub async fn create_grades_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS grades (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            enrollment_id INTEGER NOT NULL REFERENCES enrollments(id) ON DELETE CASCADE,
            component_id INTEGER NOT NULL REFERENCES assessment_components(id) ON DELETE CASCADE,
            score REAL,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (enrollment_id, component_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_learning_outcomes_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS learning_outcomes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            course_id INTEGER NOT NULL REFERENCES courses(id) ON DELETE CASCADE,
            code TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            UNIQUE (course_id, code)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_program_outcomes_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS program_outcomes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            department_id INTEGER NOT NULL REFERENCES departments(id) ON DELETE CASCADE,
            code TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (department_id, code)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_program_outcomes_department ON program_outcomes(department_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Component -> learning outcome edges
///
/// `weight` is declared REAL but may hold fractions, percentages or
/// stray text from inconsistent data entry; readers coerce it.
pub async fn create_component_lo_relations_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS component_lo_relations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            component_id INTEGER NOT NULL REFERENCES assessment_components(id) ON DELETE CASCADE,
            learning_outcome_id INTEGER NOT NULL REFERENCES learning_outcomes(id) ON DELETE CASCADE,
            weight REAL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_component_lo_component ON component_lo_relations(component_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Learning outcome -> program outcome edges, unique per pair
pub async fn create_lo_po_relations_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS lo_po_relations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            learning_outcome_id INTEGER NOT NULL REFERENCES learning_outcomes(id) ON DELETE CASCADE,
            program_outcome_id INTEGER NOT NULL REFERENCES program_outcomes(id) ON DELETE CASCADE,
            weight REAL,
            UNIQUE (learning_outcome_id, program_outcome_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_lo_po_learning_outcome ON lo_po_relations(learning_outcome_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Derived `(student, program outcome)` aggregates
///
/// Rows are only ever written by the result writer. The `revision`
/// column is added by migration v1 so older databases pick it up too.
pub async fn create_student_program_outcome_scores_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS student_program_outcome_scores (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            student_id INTEGER NOT NULL REFERENCES students(id) ON DELETE CASCADE,
            program_outcome_id INTEGER NOT NULL REFERENCES program_outcomes(id) ON DELETE CASCADE,
            score REAL NOT NULL DEFAULT 0,
            coverage REAL NOT NULL DEFAULT 0,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (student_id, program_outcome_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
