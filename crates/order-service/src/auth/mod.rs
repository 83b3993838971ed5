//! 认证模块
//!
//! 只负责密码哈希与校验；会话令牌不在本服务签发。

pub mod password;

pub use password::{BcryptHasher, PasswordHasher};
