use sqlx::AnyPool;

pub async fn migrate(pool: &AnyPool) -> anyhow::Result<()> {
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS course_purchases (
  id TEXT PRIMARY KEY,
  student_id TEXT NOT NULL,
  course_id TEXT NOT NULL,
  purchase_tier INTEGER NOT NULL,
  is_active BOOLEAN NOT NULL,
  created_at BIGINT NOT NULL,
  expiry_date BIGINT,
  metadata TEXT NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
CREATE UNIQUE INDEX IF NOT EXISTS idx_purchases_active_unique
  ON course_purchases(student_id, course_id) WHERE is_active;
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS course_levels (
  id TEXT PRIMARY KEY,
  course_id TEXT NOT NULL,
  level_rank INTEGER NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS course_catalog_sessions (
  id TEXT PRIMARY KEY,
  level_id TEXT NOT NULL,
  session_number INTEGER NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS student_progress (
  id TEXT PRIMARY KEY,
  student_id TEXT NOT NULL,
  catalog_session_id TEXT NOT NULL,
  is_unlocked BOOLEAN NOT NULL,
  UNIQUE(student_id, catalog_session_id)
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS trainer_allocations (
  id TEXT PRIMARY KEY,
  student_id TEXT NOT NULL,
  trainer_id TEXT,
  course_id TEXT NOT NULL,
  purchase_id TEXT NOT NULL,
  status TEXT NOT NULL,
  metadata TEXT NOT NULL,
  created_at BIGINT NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
CREATE INDEX IF NOT EXISTS idx_allocations_student_course
  ON trainer_allocations(student_id, course_id);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS tutoring_sessions (
  id TEXT PRIMARY KEY,
  allocation_id TEXT NOT NULL,
  student_id TEXT NOT NULL,
  trainer_id TEXT NOT NULL,
  scheduled_date TEXT NOT NULL,
  scheduled_time TEXT NOT NULL,
  status TEXT NOT NULL,
  session_type TEXT NOT NULL,
  session_number INTEGER NOT NULL,
  metadata TEXT NOT NULL DEFAULT '{}',
  updated_at BIGINT NOT NULL,
  UNIQUE(allocation_id, scheduled_date, scheduled_time)
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
CREATE INDEX IF NOT EXISTS idx_sessions_allocation_future
  ON tutoring_sessions(allocation_id, scheduled_date, status);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS processed_events (
  event_id TEXT PRIMARY KEY,
  event_type TEXT NOT NULL,
  correlation_id TEXT NOT NULL,
  payload TEXT NOT NULL,
  source TEXT NOT NULL,
  version TEXT NOT NULL,
  processed_at BIGINT NOT NULL,
  UNIQUE(correlation_id, event_type)
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS refresh_tokens (
  id TEXT PRIMARY KEY,
  user_id TEXT NOT NULL,
  token_hash TEXT NOT NULL UNIQUE,
  expires_at BIGINT NOT NULL,
  revoked_at BIGINT
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS trainers (
  id TEXT PRIMARY KEY,
  active BOOLEAN NOT NULL,
  franchise_id TEXT NOT NULL,
  home_lat DOUBLE PRECISION NOT NULL,
  home_lng DOUBLE PRECISION NOT NULL,
  rating DOUBLE PRECISION NOT NULL,
  accept_more_allocations BOOLEAN NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS trainer_certifications (
  trainer_id TEXT NOT NULL,
  course_id TEXT NOT NULL,
  UNIQUE(trainer_id, course_id)
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS service_clusters (
  id TEXT PRIMARY KEY,
  city_id TEXT NOT NULL,
  centre_lat DOUBLE PRECISION NOT NULL,
  centre_lng DOUBLE PRECISION NOT NULL,
  radius_km DOUBLE PRECISION NOT NULL,
  active BOOLEAN NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS schedule_slots (
  trainer_id TEXT NOT NULL,
  slot_date TEXT NOT NULL,
  slot_time TEXT NOT NULL,
  UNIQUE(trainer_id, slot_date, slot_time)
);
"#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
