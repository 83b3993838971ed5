//! 服务层
//!
//! - `order_service`: 下单与订单查询
//! - `cart_service`: 购物车增删改查
//! - `catalog_service`: 商品目录
//! - `user_service`: 注册、登录与用户查询
//!
//! 所有副作用事件都通过 [`QueueGateway`](bakery_shared::queue::QueueGateway) 尽力发布，
//! 发布失败不影响业务结果。

pub mod cart_service;
pub mod catalog_service;
pub mod order_service;
pub mod user_service;

pub use cart_service::CartService;
pub use catalog_service::CatalogService;
pub use order_service::OrderService;
pub use user_service::{Registration, UserService};
