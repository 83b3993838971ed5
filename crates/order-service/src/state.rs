//! 应用状态定义

use std::sync::Arc;

use bakery_shared::queue::QueueGateway;

use crate::auth::PasswordHasher;
use crate::repository::{
    CartRepositoryTrait, OrderRepositoryTrait, ProductRepositoryTrait, UserRepositoryTrait,
};
use crate::service::{CartService, CatalogService, OrderService, UserService};

/// 构建 [`AppState`] 所需的仓储与协作者
pub struct Repositories {
    pub users: Arc<dyn UserRepositoryTrait>,
    pub products: Arc<dyn ProductRepositoryTrait>,
    pub carts: Arc<dyn CartRepositoryTrait>,
    pub orders: Arc<dyn OrderRepositoryTrait>,
}

/// Axum 应用共享状态
#[derive(Clone)]
pub struct AppState {
    pub users: Arc<UserService>,
    pub catalog: Arc<CatalogService>,
    pub carts: Arc<CartService>,
    pub orders: Arc<OrderService>,
    /// 健康检查读取连接状态
    pub gateway: Arc<QueueGateway>,
}

impl AppState {
    pub fn new(
        repos: Repositories,
        hasher: Arc<dyn PasswordHasher>,
        gateway: Arc<QueueGateway>,
    ) -> Self {
        Self {
            users: Arc::new(UserService::new(
                repos.users.clone(),
                hasher,
                gateway.clone(),
            )),
            catalog: Arc::new(CatalogService::new(repos.products.clone(), gateway.clone())),
            carts: Arc::new(CartService::new(
                repos.users,
                repos.products,
                repos.carts.clone(),
                gateway.clone(),
            )),
            orders: Arc::new(OrderService::new(repos.carts, repos.orders, gateway.clone())),
            gateway,
        }
    }
}
