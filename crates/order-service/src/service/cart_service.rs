//! 购物车服务
//!
//! 每次变更都向 user-activity 与 analytics-stream 发布事件。

use std::sync::Arc;

use tracing::{info, instrument};

use bakery_shared::events::{ActivityAction, AnalyticsEvent, CartAction, UserActivityEvent, queues};
use bakery_shared::queue::QueueGateway;

use crate::error::{OrderError, Result};
use crate::models::CartLine;
use crate::repository::{CartRepositoryTrait, ProductRepositoryTrait, UserRepositoryTrait};

/// 未指定数量时加入购物车的默认数量
pub const DEFAULT_QUANTITY: i32 = 1;

pub struct CartService {
    user_repo: Arc<dyn UserRepositoryTrait>,
    product_repo: Arc<dyn ProductRepositoryTrait>,
    cart_repo: Arc<dyn CartRepositoryTrait>,
    gateway: Arc<QueueGateway>,
}

fn validate_quantity(quantity: i32) -> Result<()> {
    if quantity <= 0 {
        return Err(OrderError::Validation(format!(
            "数量必须为正整数: {quantity}"
        )));
    }
    Ok(())
}

impl CartService {
    pub fn new(
        user_repo: Arc<dyn UserRepositoryTrait>,
        product_repo: Arc<dyn ProductRepositoryTrait>,
        cart_repo: Arc<dyn CartRepositoryTrait>,
        gateway: Arc<QueueGateway>,
    ) -> Self {
        Self {
            user_repo,
            product_repo,
            cart_repo,
            gateway,
        }
    }

    /// 加入购物车，已有该商品时累加数量
    ///
    /// 用户与商品都必须存在。
    #[instrument(skip(self))]
    pub async fn add_to_cart(
        &self,
        user_id: i64,
        product_id: i64,
        quantity: Option<i32>,
    ) -> Result<CartLine> {
        let quantity = quantity.unwrap_or(DEFAULT_QUANTITY);
        validate_quantity(quantity)?;

        if self.user_repo.find_by_id(user_id).await?.is_none() {
            return Err(OrderError::UserNotFound(user_id));
        }
        if self.product_repo.get_product(product_id).await?.is_none() {
            return Err(OrderError::ProductNotFound(product_id));
        }

        let line = self.cart_repo.add_item(user_id, product_id, quantity).await?;
        info!(user_id, product_id, quantity = line.quantity, "商品已加入购物车");

        self.gateway.publish(
            queues::USER_ACTIVITY,
            &UserActivityEvent::cart_changed(ActivityAction::AddToCart, user_id, product_id, None),
        );
        self.gateway.publish(
            queues::ANALYTICS_STREAM,
            &AnalyticsEvent::cart_update(
                user_id,
                product_id,
                CartAction::Add,
                Some(line.quantity),
                Some(line.price),
            ),
        );

        Ok(line)
    }

    pub async fn get_cart(&self, user_id: i64) -> Result<Vec<CartLine>> {
        self.cart_repo.find_cart_lines(user_id).await
    }

    /// 设置购物车行数量
    #[instrument(skip(self))]
    pub async fn update_cart_item(
        &self,
        user_id: i64,
        product_id: i64,
        quantity: i32,
    ) -> Result<CartLine> {
        validate_quantity(quantity)?;

        let line = self
            .cart_repo
            .update_item(user_id, product_id, quantity)
            .await?
            .ok_or(OrderError::CartLineNotFound {
                user_id,
                product_id,
            })?;

        self.gateway.publish(
            queues::USER_ACTIVITY,
            &UserActivityEvent::cart_changed(
                ActivityAction::UpdateCartItem,
                user_id,
                product_id,
                Some(quantity),
            ),
        );
        self.gateway.publish(
            queues::ANALYTICS_STREAM,
            &AnalyticsEvent::cart_update(
                user_id,
                product_id,
                CartAction::Update,
                Some(quantity),
                Some(line.price),
            ),
        );

        Ok(line)
    }

    #[instrument(skip(self))]
    pub async fn remove_from_cart(&self, user_id: i64, product_id: i64) -> Result<()> {
        if !self.cart_repo.remove_item(user_id, product_id).await? {
            return Err(OrderError::CartLineNotFound {
                user_id,
                product_id,
            });
        }

        self.gateway.publish(
            queues::USER_ACTIVITY,
            &UserActivityEvent::cart_changed(
                ActivityAction::RemoveFromCart,
                user_id,
                product_id,
                None,
            ),
        );
        self.gateway.publish(
            queues::ANALYTICS_STREAM,
            &AnalyticsEvent::cart_update(user_id, product_id, CartAction::Remove, None, None),
        );

        Ok(())
    }
}
