//! 下单服务
//!
//! ## 下单流程
//!
//! 1. 读取购物车（带当前价格） -> 2. 空购物车直接失败
//!    -> 3. 快照价格并计算总额 -> 4. 事务写入订单与订单行
//!    -> 5. 向四个队列发布事件（尽力而为） -> 6. 清空购物车（失败只记日志）
//!
//! 同一进程内对同一用户的下单串行执行，
//! 连续两次下单时第二次一定看到已清空的购物车。

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{info, instrument, warn};

use bakery_shared::events::{
    AnalyticsEvent, NotificationEvent, OrderProcessingMessage, UserActivityEvent, queues,
};
use bakery_shared::observability::metrics;
use bakery_shared::queue::QueueGateway;

use crate::error::{OrderError, Result};
use crate::models::{NewOrder, Order};
use crate::repository::{CartRepositoryTrait, OrderRepositoryTrait};

/// 持有某用户下单锁的一个引用
///
/// 释放时（包括 future 被取消）若已无其他持有者，则从锁表中移除该用户的条目。
struct PlacementSlot<'a> {
    locks: &'a DashMap<i64, Arc<Mutex<()>>>,
    user_id: i64,
    lock: Arc<Mutex<()>>,
}

impl<'a> PlacementSlot<'a> {
    fn acquire(locks: &'a DashMap<i64, Arc<Mutex<()>>>, user_id: i64) -> Self {
        let lock = locks.entry(user_id).or_default().value().clone();
        Self {
            locks,
            user_id,
            lock,
        }
    }

    async fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().await
    }
}

impl Drop for PlacementSlot<'_> {
    fn drop(&mut self) {
        // 锁表与本 slot 各持一份引用时即为空闲
        self.locks.remove_if(&self.user_id, |_, lock| {
            Arc::ptr_eq(lock, &self.lock) && Arc::strong_count(lock) == 2
        });
    }
}

pub struct OrderService {
    cart_repo: Arc<dyn CartRepositoryTrait>,
    order_repo: Arc<dyn OrderRepositoryTrait>,
    gateway: Arc<QueueGateway>,
    /// 每个用户一把下单锁，空闲后回收
    placement_locks: DashMap<i64, Arc<Mutex<()>>>,
}

impl OrderService {
    pub fn new(
        cart_repo: Arc<dyn CartRepositoryTrait>,
        order_repo: Arc<dyn OrderRepositoryTrait>,
        gateway: Arc<QueueGateway>,
    ) -> Self {
        Self {
            cart_repo,
            order_repo,
            gateway,
            placement_locks: DashMap::new(),
        }
    }

    /// 用购物车下单
    #[instrument(skip(self))]
    pub async fn place_order(&self, user_id: i64) -> Result<Order> {
        let slot = PlacementSlot::acquire(&self.placement_locks, user_id);
        let _guard = slot.lock().await;
        self.place_order_locked(user_id).await
    }

    async fn place_order_locked(&self, user_id: i64) -> Result<Order> {
        let lines = self.cart_repo.find_cart_lines(user_id).await?;
        if lines.is_empty() {
            return Err(OrderError::EmptyCart { user_id });
        }

        let new_order = NewOrder::from_cart(user_id, &lines);
        let order = self.order_repo.create_order(&new_order).await?;

        info!(
            order_id = order.id,
            user_id,
            total = order.total,
            items = order.items.len(),
            "订单已创建"
        );
        metrics::record_order_placed(order.items.len());

        self.publish_order_created(&order);

        // 订单已落库，清空购物车失败不回滚
        match self.cart_repo.clear_cart(user_id).await {
            Ok(removed) => info!(user_id, removed, "购物车已清空"),
            Err(e) => warn!(user_id, order_id = order.id, error = %e, "清空购物车失败"),
        }

        Ok(order)
    }

    fn publish_order_created(&self, order: &Order) {
        self.gateway.publish(
            queues::ORDER_PROCESSING,
            &OrderProcessingMessage { order_id: order.id },
        );
        self.gateway.publish(
            queues::USER_ACTIVITY,
            &UserActivityEvent::order_created(order.user_id, order.id, order.total),
        );
        self.gateway.publish(
            queues::ANALYTICS_STREAM,
            &AnalyticsEvent::order_placed(order.user_id, order.id, order.total, order.item_count()),
        );
        self.gateway.publish(
            queues::NOTIFICATIONS_STREAM,
            &NotificationEvent::new_order(order.user_id, order.id),
        );
    }

    /// 查询订单（含订单行），不存在返回 None
    #[instrument(skip(self))]
    pub async fn get_order_status(&self, order_id: i64) -> Result<Option<Order>> {
        self.order_repo.find_order(order_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CartLine, OrderItem, OrderStatus};
    use crate::repository::{MockCartRepositoryTrait, MockOrderRepositoryTrait};
    use crate::test_utils::InMemoryStore;
    use bakery_shared::test_utils::InMemoryBroker;
    use chrono::Utc;
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::Notify;

    fn line(product_id: i64, price: f64, quantity: i32) -> CartLine {
        CartLine {
            user_id: 3,
            product_id,
            quantity,
            name: format!("product-{product_id}"),
            price,
        }
    }

    fn order_from(id: i64, order: &NewOrder) -> Order {
        Order {
            id,
            user_id: order.user_id,
            total: order.total,
            status: OrderStatus::Pending,
            created_at: Utc::now(),
            items: order
                .items
                .iter()
                .enumerate()
                .map(|(i, item)| OrderItem {
                    id: i as i64 + 1,
                    order_id: id,
                    product_id: item.product_id,
                    quantity: item.quantity,
                    price: item.price,
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_place_order_snapshots_total_and_clears_cart() {
        let broker = InMemoryBroker::new();
        let gateway = broker.connected_gateway().await;

        let mut cart_repo = MockCartRepositoryTrait::new();
        cart_repo
            .expect_find_cart_lines()
            .withf(|user_id| *user_id == 3)
            .times(1)
            .returning(|_| Ok(vec![line(1, 10.0, 2), line(2, 5.0, 1)]));
        cart_repo
            .expect_clear_cart()
            .withf(|user_id| *user_id == 3)
            .times(1)
            .returning(|_| Ok(2));

        let mut order_repo = MockOrderRepositoryTrait::new();
        order_repo
            .expect_create_order()
            .withf(|order| order.total == 25.0 && order.items.len() == 2)
            .times(1)
            .returning(|order| Ok(order_from(42, order)));

        let service = OrderService::new(Arc::new(cart_repo), Arc::new(order_repo), gateway);
        let order = service.place_order(3).await.unwrap();

        assert_eq!(order.id, 42);
        assert_eq!(order.total, 25.0);
        assert_eq!(order.items.len(), 2);
        assert_eq!(order.status, OrderStatus::Pending);

        assert_eq!(
            broker.published(queues::ORDER_PROCESSING),
            vec![json!({ "orderId": 42 })]
        );

        let activity = broker.published(queues::USER_ACTIVITY);
        assert_eq!(activity.len(), 1);
        assert_eq!(activity[0]["action"], "order_created");
        assert_eq!(activity[0]["orderTotal"], 25.0);
        assert_eq!(activity[0]["userId"], 3);

        let analytics = broker.published(queues::ANALYTICS_STREAM);
        assert_eq!(analytics[0]["type"], "order");
        assert_eq!(analytics[0]["itemCount"], 2);
        assert_eq!(analytics[0]["total"], 25.0);

        let notifications = broker.published(queues::NOTIFICATIONS_STREAM);
        assert_eq!(notifications[0]["type"], "new_order");
        assert_eq!(notifications[0]["orderId"], 42);
    }

    #[tokio::test]
    async fn test_empty_cart_creates_nothing() {
        let broker = InMemoryBroker::new();
        let gateway = broker.connected_gateway().await;

        let mut cart_repo = MockCartRepositoryTrait::new();
        cart_repo
            .expect_find_cart_lines()
            .returning(|_| Ok(vec![]));
        cart_repo.expect_clear_cart().never();

        let mut order_repo = MockOrderRepositoryTrait::new();
        order_repo.expect_create_order().never();

        let service = OrderService::new(Arc::new(cart_repo), Arc::new(order_repo), gateway);
        let err = service.place_order(3).await.unwrap_err();

        assert!(matches!(err, OrderError::EmptyCart { user_id: 3 }));
        assert_eq!(broker.published_total(), 0);
    }

    #[tokio::test]
    async fn test_create_order_failure_publishes_nothing() {
        let broker = InMemoryBroker::new();
        let gateway = broker.connected_gateway().await;

        let mut cart_repo = MockCartRepositoryTrait::new();
        cart_repo
            .expect_find_cart_lines()
            .returning(|_| Ok(vec![line(1, 10.0, 1)]));
        cart_repo.expect_clear_cart().never();

        let mut order_repo = MockOrderRepositoryTrait::new();
        order_repo
            .expect_create_order()
            .returning(|_| Err(OrderError::Database(sqlx::Error::PoolTimedOut)));

        let service = OrderService::new(Arc::new(cart_repo), Arc::new(order_repo), gateway);
        let err = service.place_order(3).await.unwrap_err();

        assert!(matches!(err, OrderError::Database(_)));
        assert_eq!(broker.published_total(), 0);
    }

    #[tokio::test]
    async fn test_clear_cart_failure_keeps_order() {
        let broker = InMemoryBroker::new();
        let gateway = broker.connected_gateway().await;
        let store = InMemoryStore::new();
        let bread = store.add_product("Bread", 4.0);
        store.set_cart_line(5, bread.id, 2);
        store.fail_clear_cart();

        let service = OrderService::new(Arc::new(store.clone()), Arc::new(store.clone()), gateway);
        let order = service.place_order(5).await.unwrap();

        assert_eq!(order.total, 8.0);
        assert!(store.order(order.id).is_some());
        assert_eq!(broker.published(queues::ORDER_PROCESSING).len(), 1);
    }

    #[tokio::test]
    async fn test_publish_skipped_when_broker_not_ready() {
        let broker = InMemoryBroker::new();
        let gateway = Arc::new(QueueGateway::new(
            Arc::new(broker.clone()),
            bakery_shared::retry::RetryPolicy::fixed(1, std::time::Duration::ZERO),
        ));
        let store = InMemoryStore::new();
        let cake = store.add_product("Cake", 12.5);
        store.set_cart_line(9, cake.id, 1);

        let service = OrderService::new(Arc::new(store.clone()), Arc::new(store.clone()), gateway);
        let order = service.place_order(9).await.unwrap();

        assert_eq!(order.total, 12.5);
        assert_eq!(store.cart_len(9), 0);
        assert_eq!(broker.published_total(), 0);
    }

    #[tokio::test]
    async fn test_prices_are_snapshotted() {
        let broker = InMemoryBroker::new();
        let gateway = broker.connected_gateway().await;
        let store = InMemoryStore::new();
        let bread = store.add_product("Bread", 4.0);
        store.set_cart_line(1, bread.id, 3);

        let service = OrderService::new(Arc::new(store.clone()), Arc::new(store.clone()), gateway);
        let order = service.place_order(1).await.unwrap();
        store.set_price(bread.id, 100.0);

        let fetched = service.get_order_status(order.id).await.unwrap().unwrap();
        assert_eq!(fetched.total, 12.0);
        assert_eq!(fetched.items[0].price, 4.0);
    }

    #[tokio::test]
    async fn test_concurrent_placement_second_sees_empty_cart() {
        let broker = InMemoryBroker::new();
        let gateway = broker.connected_gateway().await;
        let store = InMemoryStore::new();
        let bread = store.add_product("Bread", 10.0);
        let roll = store.add_product("Roll", 5.0);
        store.set_cart_line(3, bread.id, 2);
        store.set_cart_line(3, roll.id, 1);

        let service = Arc::new(OrderService::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            gateway,
        ));

        let (first, second) = tokio::join!(service.place_order(3), service.place_order(3));

        let results = [first, second];
        let placed: Vec<&Order> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        let empty = results
            .iter()
            .filter(|r| matches!(r, Err(OrderError::EmptyCart { user_id: 3 })))
            .count();

        assert_eq!(placed.len(), 1);
        assert_eq!(empty, 1);
        assert_eq!(placed[0].total, 25.0);
        assert_eq!(store.order_count(), 1);
        assert!(service.placement_locks.is_empty());
    }

    /// 读取购物车时停住，直到测试放行
    struct GatedCartRepo {
        store: InMemoryStore,
        entered: Arc<Notify>,
        release: Arc<Notify>,
    }

    #[async_trait::async_trait]
    impl CartRepositoryTrait for GatedCartRepo {
        async fn find_cart_lines(&self, user_id: i64) -> Result<Vec<CartLine>> {
            self.entered.notify_one();
            self.release.notified().await;
            self.store.find_cart_lines(user_id).await
        }

        async fn add_item(&self, user_id: i64, product_id: i64, quantity: i32) -> Result<CartLine> {
            self.store.add_item(user_id, product_id, quantity).await
        }

        async fn update_item(
            &self,
            user_id: i64,
            product_id: i64,
            quantity: i32,
        ) -> Result<Option<CartLine>> {
            self.store.update_item(user_id, product_id, quantity).await
        }

        async fn remove_item(&self, user_id: i64, product_id: i64) -> Result<bool> {
            self.store.remove_item(user_id, product_id).await
        }

        async fn clear_cart(&self, user_id: i64) -> Result<u64> {
            self.store.clear_cart(user_id).await
        }
    }

    #[tokio::test]
    async fn test_cancelled_placement_releases_lock_entry() {
        let broker = InMemoryBroker::new();
        let gateway = broker.connected_gateway().await;
        let store = InMemoryStore::new();
        let bread = store.add_product("Bread", 10.0);
        store.set_cart_line(3, bread.id, 1);

        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let cart_repo = GatedCartRepo {
            store: store.clone(),
            entered: entered.clone(),
            release: release.clone(),
        };
        let service = Arc::new(OrderService::new(
            Arc::new(cart_repo),
            Arc::new(store.clone()),
            gateway,
        ));

        let first = tokio::spawn({
            let service = service.clone();
            async move { service.place_order(3).await }
        });
        entered.notified().await;

        {
            // 第二次下单在锁上等待，超时后被丢弃
            let second = service.place_order(3);
            tokio::pin!(second);
            let waited = tokio::time::timeout(Duration::from_millis(10), &mut second).await;
            assert!(waited.is_err());
            assert_eq!(service.placement_locks.len(), 1);
        }

        release.notify_one();
        let order = first.await.unwrap().unwrap();
        assert_eq!(order.total, 10.0);
        assert_eq!(store.order_count(), 1);
        assert!(service.placement_locks.is_empty());
    }

    #[tokio::test]
    async fn test_get_order_status_missing() {
        let broker = InMemoryBroker::new();
        let gateway = broker.connected_gateway().await;
        let store = InMemoryStore::new();

        let service = OrderService::new(Arc::new(store.clone()), Arc::new(store), gateway);

        assert!(service.get_order_status(404).await.unwrap().is_none());
    }
}
