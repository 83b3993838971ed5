//! 共享库
//!
//! 包含下单服务与订单工作者共用的配置、错误处理、数据库连接、
//! 订单状态机、事件模型、消息队列网关和可观测性等基础设施代码。

pub mod config;
pub mod database;
pub mod error;
pub mod events;
pub mod kafka;
pub mod observability;
pub mod queue;
pub mod retry;
pub mod status;
pub mod test_utils;
