//! 用户仓储

use async_trait::async_trait;
use sqlx::PgPool;

use super::traits::UserRepositoryTrait;
use crate::error::{OrderError, Result};
use crate::models::{NewUser, User};

pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create_user(&self, user: &NewUser) -> Result<User> {
        let created = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (name, email, password_hash, is_admin)
            VALUES ($1, $2, $3, $4)
            RETURNING id, name, email, password_hash, is_admin, created_at
            "#,
        )
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.is_admin)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            // 并发注册同一邮箱时由唯一约束兜底
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                OrderError::EmailTaken(user.email.clone())
            }
            other => OrderError::Database(other),
        })?;

        Ok(created)
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, password_hash, is_admin, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, password_hash, is_admin, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }
}

#[async_trait]
impl UserRepositoryTrait for UserRepository {
    async fn create_user(&self, user: &NewUser) -> Result<User> {
        self.create_user(user).await
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>> {
        self.find_by_id(id).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        self.find_by_email(email).await
    }
}
