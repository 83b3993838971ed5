//! 用户服务
//!
//! 注册、登录校验与用户查询。注册发布 register / user_registration / welcome
//! 三条事件，登录发布 login / user_login 两条事件。

use std::sync::Arc;

use tracing::{info, instrument, warn};

use bakery_shared::events::{AnalyticsEvent, NotificationEvent, UserActivityEvent, queues};
use bakery_shared::queue::QueueGateway;

use crate::auth::PasswordHasher;
use crate::error::{OrderError, Result};
use crate::models::{NewUser, User, normalize_email};
use crate::repository::UserRepositoryTrait;

/// 注册信息，密码为明文
#[derive(Debug, Clone)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
    pub is_admin: bool,
}

impl Registration {
    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() || self.email.trim().is_empty() || self.password.is_empty()
        {
            return Err(OrderError::Validation(
                "name、email、password 均为必填项".to_string(),
            ));
        }
        if !self.email.contains('@') {
            return Err(OrderError::Validation(format!("邮箱格式无效: {}", self.email)));
        }
        Ok(())
    }
}

pub struct UserService {
    user_repo: Arc<dyn UserRepositoryTrait>,
    hasher: Arc<dyn PasswordHasher>,
    gateway: Arc<QueueGateway>,
}

impl UserService {
    pub fn new(
        user_repo: Arc<dyn UserRepositoryTrait>,
        hasher: Arc<dyn PasswordHasher>,
        gateway: Arc<QueueGateway>,
    ) -> Self {
        Self {
            user_repo,
            hasher,
            gateway,
        }
    }

    /// 注册新用户
    #[instrument(skip(self, registration), fields(email = %registration.email))]
    pub async fn register(&self, registration: Registration) -> Result<User> {
        registration.validate()?;
        let email = normalize_email(&registration.email);

        if self.user_repo.find_by_email(&email).await?.is_some() {
            return Err(OrderError::EmailTaken(email));
        }

        let hasher = self.hasher.clone();
        let password = registration.password;
        let password_hash = blocking(move || hasher.hash(&password)).await?;

        let user = self
            .user_repo
            .create_user(&NewUser {
                name: registration.name.trim().to_string(),
                email,
                password_hash,
                is_admin: registration.is_admin,
            })
            .await?;
        info!(user_id = user.id, is_admin = user.is_admin, "用户已注册");

        self.gateway
            .publish(queues::USER_ACTIVITY, &UserActivityEvent::registered(user.id));
        self.gateway.publish(
            queues::ANALYTICS_STREAM,
            &AnalyticsEvent::user_registration(user.id, user.is_admin),
        );
        self.gateway.publish(
            queues::NOTIFICATIONS_STREAM,
            &NotificationEvent::welcome(user.id, &user.email),
        );

        Ok(user)
    }

    /// 校验邮箱与密码
    ///
    /// 邮箱不存在与密码错误返回同一个错误。
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<User> {
        let Some(user) = self.user_repo.find_by_email(&normalize_email(email)).await? else {
            return Err(OrderError::InvalidCredentials);
        };

        let hasher = self.hasher.clone();
        let password = password.to_string();
        let stored = user.password_hash.clone();
        if !blocking(move || hasher.verify(&password, &stored)).await? {
            warn!(user_id = user.id, "密码校验失败");
            return Err(OrderError::InvalidCredentials);
        }

        info!(user_id = user.id, "用户已登录");
        self.gateway
            .publish(queues::USER_ACTIVITY, &UserActivityEvent::logged_in(user.id));
        self.gateway
            .publish(queues::ANALYTICS_STREAM, &AnalyticsEvent::user_login(user.id));

        Ok(user)
    }

    pub async fn get_user(&self, id: i64) -> Result<User> {
        self.user_repo
            .find_by_id(id)
            .await?
            .ok_or(OrderError::UserNotFound(id))
    }
}

/// 在阻塞线程池中执行密码计算
async fn blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| OrderError::Internal(format!("密码计算任务失败: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::BcryptHasher;
    use crate::repository::MockUserRepositoryTrait;
    use crate::test_utils::InMemoryStore;
    use bakery_shared::test_utils::InMemoryBroker;

    fn registration(email: &str) -> Registration {
        Registration {
            name: "Ada".to_string(),
            email: email.to_string(),
            password: "s3cret".to_string(),
            is_admin: false,
        }
    }

    async fn service(store: &InMemoryStore, broker: &InMemoryBroker) -> UserService {
        UserService::new(
            Arc::new(store.clone()),
            Arc::new(BcryptHasher::new(4)),
            broker.connected_gateway().await,
        )
    }

    #[tokio::test]
    async fn test_register_hashes_password_and_fans_out() {
        let broker = InMemoryBroker::new();
        let store = InMemoryStore::new();
        let service = service(&store, &broker).await;

        let user = service
            .register(registration(" Ada@Example.com "))
            .await
            .unwrap();

        assert_eq!(user.email, "ada@example.com");
        assert_ne!(user.password_hash, "s3cret");
        assert!(BcryptHasher::new(4).verify("s3cret", &user.password_hash).unwrap());

        let activity = broker.published(queues::USER_ACTIVITY);
        assert_eq!(activity.len(), 1);
        assert_eq!(activity[0]["action"], "register");
        assert_eq!(activity[0]["userId"], user.id);

        let analytics = broker.published(queues::ANALYTICS_STREAM);
        assert_eq!(analytics[0]["type"], "user_registration");
        assert_eq!(analytics[0]["isAdmin"], false);

        let notifications = broker.published(queues::NOTIFICATIONS_STREAM);
        assert_eq!(notifications[0]["type"], "welcome");
        assert_eq!(
            notifications[0]["message"],
            "Welcome to our bakery, ada@example.com!"
        );
        assert!(broker.published(queues::ORDER_PROCESSING).is_empty());
    }

    #[tokio::test]
    async fn test_register_duplicate_email() {
        let broker = InMemoryBroker::new();
        let store = InMemoryStore::new();
        store.add_user("ada@example.com");
        let service = service(&store, &broker).await;

        let err = service
            .register(registration("ADA@example.com"))
            .await
            .unwrap_err();

        assert!(matches!(err, OrderError::EmailTaken(_)));
        assert_eq!(store.user_count(), 1);
        assert_eq!(broker.published_total(), 0);
    }

    #[tokio::test]
    async fn test_register_requires_fields() {
        let broker = InMemoryBroker::new();
        let mut user_repo = MockUserRepositoryTrait::new();
        user_repo.expect_find_by_email().never();
        user_repo.expect_create_user().never();
        let service = UserService::new(
            Arc::new(user_repo),
            Arc::new(BcryptHasher::new(4)),
            broker.connected_gateway().await,
        );

        for bad in [
            Registration { name: " ".into(), ..registration("a@example.com") },
            Registration { password: String::new(), ..registration("a@example.com") },
            registration("not-an-email"),
        ] {
            let err = service.register(bad).await.unwrap_err();
            assert!(matches!(err, OrderError::Validation(_)));
        }
        assert_eq!(broker.published_total(), 0);
    }

    #[tokio::test]
    async fn test_register_persistence_failure_publishes_nothing() {
        let broker = InMemoryBroker::new();
        let mut user_repo = MockUserRepositoryTrait::new();
        user_repo.expect_find_by_email().returning(|_| Ok(None));
        user_repo
            .expect_create_user()
            .withf(|user| user.email == "ada@example.com" && user.password_hash != "s3cret")
            .times(1)
            .returning(|_| Err(OrderError::Database(sqlx::Error::PoolTimedOut)));
        let service = UserService::new(
            Arc::new(user_repo),
            Arc::new(BcryptHasher::new(4)),
            broker.connected_gateway().await,
        );

        let err = service
            .register(registration("ada@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::Database(_)));
        assert_eq!(broker.published_total(), 0);
    }

    #[tokio::test]
    async fn test_login_checks_password() {
        let broker = InMemoryBroker::new();
        let store = InMemoryStore::new();
        let service = service(&store, &broker).await;
        let user = service
            .register(registration("ada@example.com"))
            .await
            .unwrap();
        let registered_events = broker.published_total();

        let logged_in = service.login("ADA@example.com", "s3cret").await.unwrap();
        assert_eq!(logged_in.id, user.id);

        let activity = broker.published(queues::USER_ACTIVITY);
        assert_eq!(activity.last().unwrap()["action"], "login");
        let analytics = broker.published(queues::ANALYTICS_STREAM);
        assert_eq!(analytics.last().unwrap()["type"], "user_login");
        assert_eq!(broker.published_total(), registered_events + 2);

        let wrong = service.login("ada@example.com", "nope").await.unwrap_err();
        assert!(matches!(wrong, OrderError::InvalidCredentials));
        let unknown = service.login("bob@example.com", "s3cret").await.unwrap_err();
        assert!(matches!(unknown, OrderError::InvalidCredentials));
        assert_eq!(broker.published_total(), registered_events + 2);
    }

    #[tokio::test]
    async fn test_get_user() {
        let broker = InMemoryBroker::new();
        let store = InMemoryStore::new();
        let existing = store.add_user("ada@example.com");
        let service = service(&store, &broker).await;

        assert_eq!(service.get_user(existing.id).await.unwrap().id, existing.id);
        assert!(matches!(
            service.get_user(404).await.unwrap_err(),
            OrderError::UserNotFound(404)
        ));
    }
}
