//! 订单仓储
//!
//! 订单与订单行在同一事务中写入；状态更新是条件更新，
//! 只有当前状态属于目标状态的合法前驱时才会生效。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::debug;

use super::traits::OrderRepositoryTrait;
use crate::error::{OrderError, Result};
use crate::models::{NewOrder, Order, OrderItem, OrderStatus};

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: i64,
    user_id: i64,
    total: f64,
    status: OrderStatus,
    created_at: DateTime<Utc>,
}

impl OrderRow {
    fn with_items(self, items: Vec<OrderItem>) -> Order {
        Order {
            id: self.id,
            user_id: self.user_id,
            total: self.total,
            status: self.status,
            created_at: self.created_at,
            items,
        }
    }
}

pub struct OrderRepository {
    pool: PgPool,
}

impl OrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create_order(&self, order: &NewOrder) -> Result<Order> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, OrderRow>(
            r#"
            INSERT INTO orders (user_id, total, status)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, total, status, created_at
            "#,
        )
        .bind(order.user_id)
        .bind(order.total)
        .bind(OrderStatus::Pending)
        .fetch_one(&mut *tx)
        .await?;

        let mut items = Vec::with_capacity(order.items.len());
        for item in &order.items {
            let created = sqlx::query_as::<_, OrderItem>(
                r#"
                INSERT INTO order_items (order_id, product_id, quantity, price)
                VALUES ($1, $2, $3, $4)
                RETURNING id, order_id, product_id, quantity, price
                "#,
            )
            .bind(row.id)
            .bind(item.product_id)
            .bind(item.quantity)
            .bind(item.price)
            .fetch_one(&mut *tx)
            .await?;
            items.push(created);
        }

        tx.commit().await?;

        Ok(row.with_items(items))
    }

    pub async fn find_order(&self, id: i64) -> Result<Option<Order>> {
        let Some(row) = sqlx::query_as::<_, OrderRow>(
            r#"
            SELECT id, user_id, total, status, created_at
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let items = sqlx::query_as::<_, OrderItem>(
            r#"
            SELECT id, order_id, product_id, quantity, price
            FROM order_items
            WHERE order_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(row.with_items(items)))
    }

    pub async fn update_order_status(&self, id: i64, next: OrderStatus) -> Result<()> {
        let allowed: Vec<&str> = OrderStatus::allowed_predecessors(next)
            .iter()
            .map(OrderStatus::as_str)
            .collect();

        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, updated_at = NOW()
            WHERE id = $1 AND status = ANY($3)
            "#,
        )
        .bind(id)
        .bind(next)
        .bind(&allowed)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            debug!(order_id = id, status = %next, "订单状态已更新");
            return Ok(());
        }

        // 未命中：区分订单不存在与状态不允许迁移
        let current: Option<OrderStatus> =
            sqlx::query_scalar("SELECT status FROM orders WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        match current {
            None => Err(OrderError::OrderNotFound(id)),
            Some(from) => Err(OrderError::InvalidTransition {
                order_id: id,
                from,
                to: next,
            }),
        }
    }
}

#[async_trait]
impl OrderRepositoryTrait for OrderRepository {
    async fn create_order(&self, order: &NewOrder) -> Result<Order> {
        self.create_order(order).await
    }

    async fn find_order(&self, id: i64) -> Result<Option<Order>> {
        self.find_order(id).await
    }

    async fn update_order_status(&self, id: i64, next: OrderStatus) -> Result<()> {
        self.update_order_status(id, next).await
    }
}
