//! 商品目录服务

use std::sync::Arc;

use tracing::{info, instrument};

use bakery_shared::events::{AnalyticsEvent, UserActivityEvent, queues};
use bakery_shared::queue::QueueGateway;

use crate::error::{OrderError, Result};
use crate::models::{NewProduct, Product};
use crate::repository::ProductRepositoryTrait;

pub struct CatalogService {
    product_repo: Arc<dyn ProductRepositoryTrait>,
    gateway: Arc<QueueGateway>,
}

impl CatalogService {
    pub fn new(product_repo: Arc<dyn ProductRepositoryTrait>, gateway: Arc<QueueGateway>) -> Self {
        Self {
            product_repo,
            gateway,
        }
    }

    pub async fn list_products(&self) -> Result<Vec<Product>> {
        self.product_repo.list_products().await
    }

    pub async fn get_product(&self, id: i64) -> Result<Product> {
        self.product_repo
            .get_product(id)
            .await?
            .ok_or(OrderError::ProductNotFound(id))
    }

    /// 创建商品
    ///
    /// 提供操作人时额外发布 create_product 行为与 product_created 分析事件。
    #[instrument(skip(self, product), fields(name = %product.name))]
    pub async fn create_product(
        &self,
        product: NewProduct,
        acting_user_id: Option<i64>,
    ) -> Result<Product> {
        product.validate().map_err(OrderError::Validation)?;

        let created = self.product_repo.create_product(&product).await?;
        info!(product_id = created.id, price = created.price, "商品已创建");

        if let Some(user_id) = acting_user_id {
            self.gateway.publish(
                queues::USER_ACTIVITY,
                &UserActivityEvent::product_created(user_id, created.id),
            );
            self.gateway.publish(
                queues::ANALYTICS_STREAM,
                &AnalyticsEvent::product_created(user_id, created.id, created.price),
            );
        }

        Ok(created)
    }
}
