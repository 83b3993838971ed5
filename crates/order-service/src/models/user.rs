use chrono::{DateTime, Utc};
use serde::Serialize;

/// 用户
///
/// 密码哈希只在服务内部使用，序列化时不输出。
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

/// 待写入的用户，密码已哈希
#[derive(Debug, Clone, PartialEq)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub is_admin: bool,
}

/// 邮箱统一小写并去掉首尾空白后再存储与查询
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_hash_never_serialized() {
        let user = User {
            id: 1,
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            password_hash: "$2b$10$secret".to_string(),
            is_admin: false,
            created_at: Utc::now(),
        };

        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["email"], "ada@example.com");
        assert_eq!(json["isAdmin"], false);
        assert!(json.get("passwordHash").is_none());
        assert!(!json.to_string().contains("secret"));
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Ada@Example.COM "), "ada@example.com");
    }
}
