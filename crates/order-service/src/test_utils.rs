//! 测试工具模块
//!
//! 内存版持久化层，同时实现用户、商品、购物车与订单四个仓储接口，
//! 供服务层和订单工作者的端到端测试使用，并支持故障注入。

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use crate::error::{OrderError, Result};
use crate::models::{
    CartLine, NewOrder, NewProduct, NewUser, Order, OrderItem, OrderStatus, Product, User,
};
use crate::repository::{
    CartRepositoryTrait, OrderRepositoryTrait, ProductRepositoryTrait, UserRepositoryTrait,
};

#[derive(Default)]
struct StoreState {
    users: BTreeMap<i64, User>,
    products: BTreeMap<i64, Product>,
    /// (user_id, product_id) -> quantity
    carts: BTreeMap<(i64, i64), i32>,
    orders: BTreeMap<i64, Order>,
    status_history: Vec<(i64, OrderStatus)>,
    next_user_id: i64,
    next_product_id: i64,
    next_order_id: i64,
    next_item_id: i64,
    fail_status_updates: Vec<OrderStatus>,
    fail_clear_cart: bool,
    fail_find_order: bool,
}

/// 内存持久化层
///
/// 克隆后共享同一份状态。状态更新与 PostgreSQL 实现一样按状态机做条件更新。
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<StoreState>>,
}

fn injected_failure() -> OrderError {
    OrderError::Database(sqlx::Error::PoolTimedOut)
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 直接写入一个普通用户，密码哈希为占位值
    pub fn add_user(&self, email: &str) -> User {
        let mut state = self.state.lock();
        state.insert_user(&NewUser {
            name: "tester".to_string(),
            email: email.to_string(),
            password_hash: "unusable".to_string(),
            is_admin: false,
        })
    }

    pub fn user_count(&self) -> usize {
        self.state.lock().users.len()
    }

    pub fn add_product(&self, name: &str, price: f64) -> Product {
        let mut state = self.state.lock();
        state.next_product_id += 1;
        let product = Product {
            id: state.next_product_id,
            name: name.to_string(),
            description: None,
            price,
            created_at: Utc::now(),
        };
        state.products.insert(product.id, product.clone());
        product
    }

    /// 修改商品价格（验证订单价格快照）
    pub fn set_price(&self, product_id: i64, price: f64) {
        if let Some(product) = self.state.lock().products.get_mut(&product_id) {
            product.price = price;
        }
    }

    pub fn set_cart_line(&self, user_id: i64, product_id: i64, quantity: i32) {
        self.state
            .lock()
            .carts
            .insert((user_id, product_id), quantity);
    }

    pub fn cart_len(&self, user_id: i64) -> usize {
        self.state
            .lock()
            .carts
            .keys()
            .filter(|(uid, _)| *uid == user_id)
            .count()
    }

    /// 直接写入一条订单，绕过下单流程
    ///
    /// `items` 为 (product_id, quantity, price)。
    pub fn insert_order(
        &self,
        id: i64,
        user_id: i64,
        status: OrderStatus,
        items: &[(i64, i32, f64)],
    ) -> Order {
        let mut state = self.state.lock();
        let mut order_items = Vec::with_capacity(items.len());
        for &(product_id, quantity, price) in items {
            state.next_item_id += 1;
            order_items.push(OrderItem {
                id: state.next_item_id,
                order_id: id,
                product_id,
                quantity,
                price,
            });
        }
        let order = Order {
            id,
            user_id,
            total: items.iter().map(|&(_, q, p)| f64::from(q) * p).sum(),
            status,
            created_at: Utc::now(),
            items: order_items,
        };
        state.next_order_id = state.next_order_id.max(id);
        state.orders.insert(id, order.clone());
        order
    }

    pub fn order(&self, id: i64) -> Option<Order> {
        self.state.lock().orders.get(&id).cloned()
    }

    pub fn order_count(&self) -> usize {
        self.state.lock().orders.len()
    }

    /// 某订单依次经历的状态更新（不含创建时的 PENDING）
    pub fn status_history(&self, order_id: i64) -> Vec<OrderStatus> {
        self.state
            .lock()
            .status_history
            .iter()
            .filter(|(id, _)| *id == order_id)
            .map(|(_, status)| *status)
            .collect()
    }

    /// 下一次迁移到 `status` 的更新返回数据库错误（一次性）
    pub fn fail_next_status_update_to(&self, status: OrderStatus) {
        self.state.lock().fail_status_updates.push(status);
    }

    pub fn fail_clear_cart(&self) {
        self.state.lock().fail_clear_cart = true;
    }

    pub fn fail_find_order(&self) {
        self.state.lock().fail_find_order = true;
    }
}

#[async_trait]
impl ProductRepositoryTrait for InMemoryStore {
    async fn list_products(&self) -> Result<Vec<Product>> {
        Ok(self.state.lock().products.values().cloned().collect())
    }

    async fn get_product(&self, id: i64) -> Result<Option<Product>> {
        Ok(self.state.lock().products.get(&id).cloned())
    }

    async fn create_product(&self, product: &NewProduct) -> Result<Product> {
        let created = self.add_product(&product.name, product.price);
        let mut state = self.state.lock();
        let stored = state
            .products
            .get_mut(&created.id)
            .ok_or_else(|| OrderError::Internal("商品写入后丢失".to_string()))?;
        stored.description = product.description.clone();
        Ok(stored.clone())
    }
}

impl StoreState {
    fn insert_user(&mut self, user: &NewUser) -> User {
        self.next_user_id += 1;
        let created = User {
            id: self.next_user_id,
            name: user.name.clone(),
            email: user.email.clone(),
            password_hash: user.password_hash.clone(),
            is_admin: user.is_admin,
            created_at: Utc::now(),
        };
        self.users.insert(created.id, created.clone());
        created
    }

    fn cart_line(&self, user_id: i64, product_id: i64) -> Option<CartLine> {
        let quantity = *self.carts.get(&(user_id, product_id))?;
        let product = self.products.get(&product_id)?;
        Some(CartLine {
            user_id,
            product_id,
            quantity,
            name: product.name.clone(),
            price: product.price,
        })
    }
}

#[async_trait]
impl UserRepositoryTrait for InMemoryStore {
    async fn create_user(&self, user: &NewUser) -> Result<User> {
        let mut state = self.state.lock();
        if state.users.values().any(|u| u.email == user.email) {
            return Err(OrderError::EmailTaken(user.email.clone()));
        }
        Ok(state.insert_user(user))
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>> {
        Ok(self.state.lock().users.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self
            .state
            .lock()
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }
}

#[async_trait]
impl CartRepositoryTrait for InMemoryStore {
    async fn find_cart_lines(&self, user_id: i64) -> Result<Vec<CartLine>> {
        let state = self.state.lock();
        Ok(state
            .carts
            .keys()
            .filter(|(uid, _)| *uid == user_id)
            .filter_map(|&(uid, pid)| state.cart_line(uid, pid))
            .collect())
    }

    async fn add_item(&self, user_id: i64, product_id: i64, quantity: i32) -> Result<CartLine> {
        let mut state = self.state.lock();
        // 与外键约束一致
        if !state.users.contains_key(&user_id) {
            return Err(OrderError::UserNotFound(user_id));
        }
        if !state.products.contains_key(&product_id) {
            return Err(OrderError::ProductNotFound(product_id));
        }
        *state.carts.entry((user_id, product_id)).or_insert(0) += quantity;
        state
            .cart_line(user_id, product_id)
            .ok_or(OrderError::ProductNotFound(product_id))
    }

    async fn update_item(
        &self,
        user_id: i64,
        product_id: i64,
        quantity: i32,
    ) -> Result<Option<CartLine>> {
        let mut state = self.state.lock();
        match state.carts.get_mut(&(user_id, product_id)) {
            Some(current) => *current = quantity,
            None => return Ok(None),
        }
        Ok(state.cart_line(user_id, product_id))
    }

    async fn remove_item(&self, user_id: i64, product_id: i64) -> Result<bool> {
        Ok(self
            .state
            .lock()
            .carts
            .remove(&(user_id, product_id))
            .is_some())
    }

    async fn clear_cart(&self, user_id: i64) -> Result<u64> {
        let mut state = self.state.lock();
        if state.fail_clear_cart {
            return Err(injected_failure());
        }
        let before = state.carts.len();
        state.carts.retain(|(uid, _), _| *uid != user_id);
        Ok((before - state.carts.len()) as u64)
    }
}

#[async_trait]
impl OrderRepositoryTrait for InMemoryStore {
    async fn create_order(&self, order: &NewOrder) -> Result<Order> {
        let id = {
            let mut state = self.state.lock();
            state.next_order_id += 1;
            state.next_order_id
        };
        let items: Vec<(i64, i32, f64)> = order
            .items
            .iter()
            .map(|item| (item.product_id, item.quantity, item.price))
            .collect();
        let mut created = self.insert_order(id, order.user_id, OrderStatus::Pending, &items);
        created.total = order.total;
        if let Some(stored) = self.state.lock().orders.get_mut(&id) {
            stored.total = order.total;
        }
        Ok(created)
    }

    async fn find_order(&self, id: i64) -> Result<Option<Order>> {
        let state = self.state.lock();
        if state.fail_find_order {
            return Err(injected_failure());
        }
        Ok(state.orders.get(&id).cloned())
    }

    async fn update_order_status(&self, id: i64, next: OrderStatus) -> Result<()> {
        let mut state = self.state.lock();

        if let Some(pos) = state.fail_status_updates.iter().position(|s| *s == next) {
            state.fail_status_updates.remove(pos);
            return Err(injected_failure());
        }

        let current = state
            .orders
            .get(&id)
            .map(|order| order.status)
            .ok_or(OrderError::OrderNotFound(id))?;
        if !current.can_transition_to(next) {
            return Err(OrderError::InvalidTransition {
                order_id: id,
                from: current,
                to: next,
            });
        }
        if let Some(order) = state.orders.get_mut(&id) {
            order.status = next;
        }
        state.status_history.push((id, next));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_add_item_increments_quantity() {
        let store = InMemoryStore::new();
        let user = store.add_user("a@example.com");
        let bread = store.add_product("Bread", 4.0);

        store.add_item(user.id, bread.id, 1).await.unwrap();
        let line = store.add_item(user.id, bread.id, 2).await.unwrap();

        assert_eq!(line.quantity, 3);
        assert_eq!(line.price, 4.0);

        let err = store.add_item(user.id + 1, bread.id, 1).await.unwrap_err();
        assert!(matches!(err, OrderError::UserNotFound(_)));
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let store = InMemoryStore::new();
        store.add_user("a@example.com");

        let err = store
            .create_user(&NewUser {
                name: "Other".to_string(),
                email: "a@example.com".to_string(),
                password_hash: "x".to_string(),
                is_admin: false,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::EmailTaken(_)));
        assert_eq!(store.user_count(), 1);
    }

    #[tokio::test]
    async fn test_status_update_is_guarded() {
        let store = InMemoryStore::new();
        store.insert_order(42, 1, OrderStatus::Completed, &[(1, 1, 2.0)]);

        let err = store
            .update_order_status(42, OrderStatus::Failed)
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::InvalidTransition { .. }));

        let missing = store
            .update_order_status(7, OrderStatus::Processing)
            .await
            .unwrap_err();
        assert!(matches!(missing, OrderError::OrderNotFound(7)));
    }

    #[tokio::test]
    async fn test_injected_status_failure_is_one_shot() {
        let store = InMemoryStore::new();
        store.insert_order(1, 1, OrderStatus::Pending, &[]);
        store.fail_next_status_update_to(OrderStatus::Processing);

        assert!(store.update_order_status(1, OrderStatus::Processing).await.is_err());
        assert!(store.update_order_status(1, OrderStatus::Processing).await.is_ok());
        assert_eq!(store.status_history(1), vec![OrderStatus::Processing]);
    }
}
