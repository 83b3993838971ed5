//! 下单服务
//!
//! 用户、商品目录、购物车与下单的 HTTP 服务。下单后订单以 PENDING 落库，
//! 并向 order-processing、user-activity、analytics-stream、notifications-stream
//! 四个队列发布事件，由订单工作者异步推进订单状态。

pub mod auth;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod models;
pub mod repository;
pub mod routes;
pub mod service;
pub mod state;
pub mod test_utils;

pub use error::{OrderError, Result};
