//! 购物车仓储
//!
//! 购物车行以 (user_id, product_id) 为主键，读取时与商品表关联带出名称和当前价格。

use async_trait::async_trait;
use sqlx::PgPool;

use super::traits::CartRepositoryTrait;
use crate::error::Result;
use crate::models::CartLine;

pub struct CartRepository {
    pool: PgPool,
}

impl CartRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_cart_lines(&self, user_id: i64) -> Result<Vec<CartLine>> {
        let lines = sqlx::query_as::<_, CartLine>(
            r#"
            SELECT c.user_id, c.product_id, c.quantity, p.name, p.price
            FROM cart_items c
            JOIN products p ON p.id = c.product_id
            WHERE c.user_id = $1
            ORDER BY c.product_id ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(lines)
    }

    /// 插入或累加数量，单条语句完成，避免并发加购时丢失更新
    pub async fn add_item(&self, user_id: i64, product_id: i64, quantity: i32) -> Result<CartLine> {
        let line = sqlx::query_as::<_, CartLine>(
            r#"
            WITH upserted AS (
                INSERT INTO cart_items (user_id, product_id, quantity)
                VALUES ($1, $2, $3)
                ON CONFLICT (user_id, product_id)
                DO UPDATE SET quantity = cart_items.quantity + EXCLUDED.quantity
                RETURNING user_id, product_id, quantity
            )
            SELECT u.user_id, u.product_id, u.quantity, p.name, p.price
            FROM upserted u
            JOIN products p ON p.id = u.product_id
            "#,
        )
        .bind(user_id)
        .bind(product_id)
        .bind(quantity)
        .fetch_one(&self.pool)
        .await?;

        Ok(line)
    }

    pub async fn update_item(
        &self,
        user_id: i64,
        product_id: i64,
        quantity: i32,
    ) -> Result<Option<CartLine>> {
        let line = sqlx::query_as::<_, CartLine>(
            r#"
            WITH updated AS (
                UPDATE cart_items
                SET quantity = $3
                WHERE user_id = $1 AND product_id = $2
                RETURNING user_id, product_id, quantity
            )
            SELECT u.user_id, u.product_id, u.quantity, p.name, p.price
            FROM updated u
            JOIN products p ON p.id = u.product_id
            "#,
        )
        .bind(user_id)
        .bind(product_id)
        .bind(quantity)
        .fetch_optional(&self.pool)
        .await?;

        Ok(line)
    }

    pub async fn remove_item(&self, user_id: i64, product_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM cart_items WHERE user_id = $1 AND product_id = $2")
            .bind(user_id)
            .bind(product_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn clear_cart(&self, user_id: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM cart_items WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl CartRepositoryTrait for CartRepository {
    async fn find_cart_lines(&self, user_id: i64) -> Result<Vec<CartLine>> {
        self.find_cart_lines(user_id).await
    }

    async fn add_item(&self, user_id: i64, product_id: i64, quantity: i32) -> Result<CartLine> {
        self.add_item(user_id, product_id, quantity).await
    }

    async fn update_item(
        &self,
        user_id: i64,
        product_id: i64,
        quantity: i32,
    ) -> Result<Option<CartLine>> {
        self.update_item(user_id, product_id, quantity).await
    }

    async fn remove_item(&self, user_id: i64, product_id: i64) -> Result<bool> {
        self.remove_item(user_id, product_id).await
    }

    async fn clear_cart(&self, user_id: i64) -> Result<u64> {
        self.clear_cart(user_id).await
    }
}
