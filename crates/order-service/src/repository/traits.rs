//! 仓储 Trait 定义
//!
//! 服务层与订单工作者只依赖这些接口，测试时用 mockall 或内存实现替换。

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{CartLine, NewOrder, NewProduct, NewUser, Order, OrderStatus, Product, User};

/// 用户仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserRepositoryTrait: Send + Sync {
    /// 写入用户；邮箱已存在时返回 `EmailTaken`
    async fn create_user(&self, user: &NewUser) -> Result<User>;
    async fn find_by_id(&self, id: i64) -> Result<Option<User>>;
    /// 按规范化后的邮箱查询
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;
}

/// 商品仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProductRepositoryTrait: Send + Sync {
    async fn list_products(&self) -> Result<Vec<Product>>;
    async fn get_product(&self, id: i64) -> Result<Option<Product>>;
    async fn create_product(&self, product: &NewProduct) -> Result<Product>;
}

/// 购物车仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CartRepositoryTrait: Send + Sync {
    /// 用户全部购物车行，附带商品当前价格，按商品 id 排序
    async fn find_cart_lines(&self, user_id: i64) -> Result<Vec<CartLine>>;

    /// 加入购物车；已存在时数量累加，返回累加后的行
    async fn add_item(&self, user_id: i64, product_id: i64, quantity: i32) -> Result<CartLine>;

    /// 设置数量；行不存在时返回 None
    async fn update_item(
        &self,
        user_id: i64,
        product_id: i64,
        quantity: i32,
    ) -> Result<Option<CartLine>>;

    /// 删除一行，返回是否真的删除了
    async fn remove_item(&self, user_id: i64, product_id: i64) -> Result<bool>;

    /// 清空用户购物车，返回删除行数
    async fn clear_cart(&self, user_id: i64) -> Result<u64>;
}

/// 订单仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderRepositoryTrait: Send + Sync {
    /// 在同一事务中写入订单与订单行，状态为 PENDING
    async fn create_order(&self, order: &NewOrder) -> Result<Order>;

    /// 查询订单及其订单行
    async fn find_order(&self, id: i64) -> Result<Option<Order>>;

    /// 条件更新订单状态
    ///
    /// 仅当当前状态属于 `next` 的合法前驱时更新；订单不存在返回 `OrderNotFound`，
    /// 状态不允许迁移返回 `InvalidTransition`。
    async fn update_order_status(&self, id: i64, next: OrderStatus) -> Result<()>;
}
