//! HTTP 请求处理器
//!
//! 处理器只做参数提取与响应包装，业务逻辑都在服务层。

pub mod cart;
pub mod health;
pub mod order;
pub mod product;
pub mod user;
