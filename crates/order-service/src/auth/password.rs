//! 密码处理
//!
//! 提供密码哈希和验证功能，服务层通过 [`PasswordHasher`] 注入具体算法。

use bcrypt::{hash, verify};

use crate::error::{OrderError, Result};

/// 密码哈希接口
///
/// 实现为 CPU 密集的同步调用，服务层放在阻塞线程池中执行。
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, password: &str) -> Result<String>;
    fn verify(&self, password: &str, hash: &str) -> Result<bool>;
}

/// bcrypt 实现
#[derive(Debug, Clone, Copy)]
pub struct BcryptHasher {
    cost: u32,
}

impl BcryptHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }
}

impl PasswordHasher for BcryptHasher {
    fn hash(&self, password: &str) -> Result<String> {
        hash(password, self.cost).map_err(|e| OrderError::Internal(format!("密码哈希失败: {e}")))
    }

    fn verify(&self, password: &str, hash: &str) -> Result<bool> {
        verify(password, hash).map_err(|e| OrderError::Internal(format!("密码验证失败: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hasher = BcryptHasher::new(4);
        let hashed = hasher.hash("croissant-123").unwrap();

        assert_ne!(hashed, "croissant-123");
        assert!(hasher.verify("croissant-123", &hashed).unwrap());
        assert!(!hasher.verify("wrong_password", &hashed).unwrap());
    }

    #[test]
    fn test_invalid_cost_is_internal_error() {
        let err = BcryptHasher::new(2).hash("pw").unwrap_err();
        assert!(matches!(err, OrderError::Internal(_)));
    }

    #[test]
    fn test_verify_against_malformed_hash() {
        let err = BcryptHasher::new(4).verify("pw", "not-a-hash").unwrap_err();
        assert!(matches!(err, OrderError::Internal(_)));
    }
}
