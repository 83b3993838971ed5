//! 数据库仓储层
//!
//! 用户、商品、购物车与订单的数据访问，封装 SQL 细节。
//! 仓储只负责持久化，状态迁移的合法性由 `update_order_status` 在 SQL 层守护。

mod cart_repo;
mod order_repo;
mod product_repo;
mod traits;
mod user_repo;

pub use cart_repo::CartRepository;
pub use order_repo::OrderRepository;
pub use product_repo::ProductRepository;
pub use traits::*;
pub use user_repo::UserRepository;
