use crate::domain::models::{SharedResult, TestResultRow, TraitScores};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

#[derive(Debug, FromRow)]
pub struct DbUser {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub enc_name: String,
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
}

#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TestResultSummary {
    pub id: Uuid,
    pub trait_scores: Json<TraitScores>,
    pub completed_at: DateTime<Utc>,
    pub share_count: i32,
}

pub async fn create_user(
    pool: &PgPool,
    email: &str,
    password_hash: &str,
    enc_name: &str,
) -> Result<Option<Uuid>, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        INSERT INTO users (id, email, password_hash, enc_name)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (email) DO NOTHING
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(email)
    .bind(password_hash)
    .bind(enc_name)
    .fetch_optional(pool)
    .await
}

pub async fn find_user_by_email(pool: &PgPool, email: &str) -> Result<Option<DbUser>> {
    let user = sqlx::query_as::<_, DbUser>(
        r#"
        SELECT id, email, password_hash, enc_name, created_at, is_active
        FROM users
        WHERE email = $1
          AND is_active = true
        "#,
    )
    .bind(email)
    .fetch_optional(pool)
    .await?;
    Ok(user)
}

pub async fn find_user_by_id(pool: &PgPool, id: Uuid) -> Result<Option<DbUser>> {
    let user = sqlx::query_as::<_, DbUser>(
        r#"
        SELECT id, email, password_hash, enc_name, created_at, is_active
        FROM users
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(user)
}

pub async fn insert_test_result(
    pool: &PgPool,
    user_id: Uuid,
    enc_answers: &str,
    scores: &TraitScores,
    insights: &[String],
    completed_at: DateTime<Utc>,
) -> Result<Uuid, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        INSERT INTO test_results (id, user_id, enc_answers, trait_scores, insights, completed_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(enc_answers)
    .bind(Json(scores))
    .bind(Json(insights))
    .bind(completed_at)
    .fetch_one(pool)
    .await
}

pub async fn get_test_result(pool: &PgPool, id: Uuid) -> Result<Option<TestResultRow>, sqlx::Error> {
    sqlx::query_as::<_, TestResultRow>(
        r#"
        SELECT id, user_id, enc_answers, trait_scores, insights, created_at,
               completed_at, insights_updated_at, share_count
        FROM test_results
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn list_test_results(pool: &PgPool, user_id: Uuid) -> Result<Vec<TestResultSummary>, sqlx::Error> {
    sqlx::query_as::<_, TestResultSummary>(
        r#"
        SELECT id, trait_scores, completed_at, share_count
        FROM test_results
        WHERE user_id = $1
        ORDER BY completed_at DESC
        LIMIT 100
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
}

pub async fn update_insights(pool: &PgPool, id: Uuid, insights: &[String]) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE test_results
        SET insights = $2, insights_updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(Json(insights))
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn find_share_for_test(pool: &PgPool, test_id: Uuid) -> Result<Option<SharedResult>, sqlx::Error> {
    sqlx::query_as::<_, SharedResult>(
        r#"
        SELECT share_id, test_id, created_at, expires_at, view_count
        FROM shared_results
        WHERE test_id = $1
        "#,
    )
    .bind(test_id)
    .fetch_optional(pool)
    .await
}

/// Creates the share row for a test, or replaces it if the existing one has
/// expired. Returns `None` when an unexpired share already exists (a
/// concurrent request won), in which case the caller re-reads it.
pub async fn issue_share(
    pool: &PgPool,
    test_id: Uuid,
    share_id: &str,
    now: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> Result<Option<SharedResult>, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let issued = sqlx::query_as::<_, SharedResult>(
        r#"
        INSERT INTO shared_results (share_id, test_id, created_at, expires_at, view_count)
        VALUES ($1, $2, $3, $4, 0)
        ON CONFLICT (test_id) DO UPDATE
        SET share_id = EXCLUDED.share_id,
            created_at = EXCLUDED.created_at,
            expires_at = EXCLUDED.expires_at,
            view_count = 0
        WHERE shared_results.expires_at <= EXCLUDED.created_at
        RETURNING share_id, test_id, created_at, expires_at, view_count
        "#,
    )
    .bind(share_id)
    .bind(test_id)
    .bind(now)
    .bind(expires_at)
    .fetch_optional(&mut *tx)
    .await?;

    if issued.is_some() {
        sqlx::query("UPDATE test_results SET share_count = share_count + 1 WHERE id = $1")
            .bind(test_id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(issued)
}

/// Counts a view of an unexpired share and returns it. Expired or unknown
/// ids come back as `None`.
pub async fn record_share_view(
    pool: &PgPool,
    share_id: &str,
    now: DateTime<Utc>,
) -> Result<Option<SharedResult>, sqlx::Error> {
    sqlx::query_as::<_, SharedResult>(
        r#"
        UPDATE shared_results
        SET view_count = view_count + 1
        WHERE share_id = $1
          AND expires_at > $2
        RETURNING share_id, test_id, created_at, expires_at, view_count
        "#,
    )
    .bind(share_id)
    .bind(now)
    .fetch_optional(pool)
    .await
}
