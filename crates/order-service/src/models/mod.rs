//! 领域模型
//!
//! 用户、商品、购物车行与订单。订单状态机定义在共享库中，此处重新导出。

mod cart;
mod order;
mod product;
mod user;

pub use bakery_shared::status::OrderStatus;
pub use cart::CartLine;
pub use order::{NewOrder, NewOrderItem, Order, OrderItem};
pub use product::{NewProduct, Product};
pub use user::{NewUser, User, normalize_email};
