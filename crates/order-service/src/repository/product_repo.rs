//! 商品仓储

use async_trait::async_trait;
use sqlx::PgPool;

use super::traits::ProductRepositoryTrait;
use crate::error::Result;
use crate::models::{NewProduct, Product};

pub struct ProductRepository {
    pool: PgPool,
}

impl ProductRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list_products(&self) -> Result<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, name, description, price, created_at
            FROM products
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    pub async fn get_product(&self, id: i64) -> Result<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, name, description, price, created_at
            FROM products
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    pub async fn create_product(&self, product: &NewProduct) -> Result<Product> {
        let created = sqlx::query_as::<_, Product>(
            r#"
            INSERT INTO products (name, description, price)
            VALUES ($1, $2, $3)
            RETURNING id, name, description, price, created_at
            "#,
        )
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }
}

#[async_trait]
impl ProductRepositoryTrait for ProductRepository {
    async fn list_products(&self) -> Result<Vec<Product>> {
        self.list_products().await
    }

    async fn get_product(&self, id: i64) -> Result<Option<Product>> {
        self.get_product(id).await
    }

    async fn create_product(&self, product: &NewProduct) -> Result<Product> {
        self.create_product(product).await
    }
}
