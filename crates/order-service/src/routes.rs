//! 路由配置

use std::time::Duration;

use axum::{
    Router, middleware,
    routing::{get, post, put},
};
use tower_http::timeout::TimeoutLayer;

use bakery_shared::observability::middleware as obs_middleware;

use crate::{handlers, state::AppState};

/// 用户、商品、购物车与订单路由，挂载在 /api 下
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // 用户
        .route("/register", post(handlers::user::register))
        .route("/login", post(handlers::user::login))
        .route("/user/{id}", get(handlers::user::get_user))
        // 商品目录
        .route(
            "/products",
            get(handlers::product::list_products).post(handlers::product::create_product),
        )
        .route("/products/{id}", get(handlers::product::get_product))
        // 购物车
        .route("/cart", post(handlers::cart::add_to_cart))
        .route("/cart/{user_id}", get(handlers::cart::get_cart))
        .route(
            "/cart/{user_id}/{product_id}",
            put(handlers::cart::update_cart_item).delete(handlers::cart::remove_from_cart),
        )
        // 订单
        .route("/orders", post(handlers::order::place_order))
        .route("/orders/{id}", get(handlers::order::get_order))
}

/// 构建完整应用路由，附带请求追踪、请求 ID 与超时
pub fn build_router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .nest("/api", api_routes())
        .route("/health", get(handlers::health::health_check))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(middleware::from_fn(obs_middleware::http_tracing))
        .layer(middleware::from_fn(obs_middleware::request_id))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use bakery_shared::events::queues;
    use bakery_shared::queue::QueueGateway;
    use bakery_shared::retry::RetryPolicy;
    use bakery_shared::test_utils::InMemoryBroker;
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use crate::auth::BcryptHasher;
    use crate::state::Repositories;
    use crate::test_utils::InMemoryStore;

    fn app(store: &InMemoryStore, gateway: Arc<QueueGateway>) -> Router {
        let state = AppState::new(
            Repositories {
                users: Arc::new(store.clone()),
                products: Arc::new(store.clone()),
                carts: Arc::new(store.clone()),
                orders: Arc::new(store.clone()),
            },
            Arc::new(BcryptHasher::new(4)),
            gateway,
        );
        build_router(state, Duration::from_secs(5))
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    #[tokio::test]
    async fn test_health_reports_broker_state() {
        let broker = InMemoryBroker::new();
        let gateway = Arc::new(QueueGateway::new(
            Arc::new(broker.clone()),
            RetryPolicy::fixed(1, Duration::ZERO),
        ));
        let app = app(&InMemoryStore::new(), gateway.clone());

        let (status, body) = send(&app, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["broker"], "DISCONNECTED");

        gateway.connect().await.unwrap();
        let (_, body) = send(&app, Method::GET, "/health", None).await;
        assert_eq!(body["broker"], "READY");
    }

    #[tokio::test]
    async fn test_cart_to_order_flow() {
        let broker = InMemoryBroker::new();
        let store = InMemoryStore::new();
        let app = app(&store, broker.connected_gateway().await);

        let (status, bread) = send(
            &app,
            Method::POST,
            "/api/products",
            Some(json!({ "name": "Bread", "price": 10.0 })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let (_, roll) = send(
            &app,
            Method::POST,
            "/api/products",
            Some(json!({ "name": "Roll", "price": 5.0 })),
        )
        .await;

        let (status, registered) = send(
            &app,
            Method::POST,
            "/api/register",
            Some(json!({ "name": "Ada", "email": "ada@example.com", "password": "s3cret" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let user_id = registered["user"]["id"].as_i64().unwrap();
        let cart_uri = format!("/api/cart/{user_id}");

        let (status, line) = send(
            &app,
            Method::POST,
            "/api/cart",
            Some(json!({ "userId": user_id, "productId": bread["id"], "quantity": 2 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(line["quantity"], 2);
        send(
            &app,
            Method::POST,
            "/api/cart",
            Some(json!({ "userId": user_id, "productId": roll["id"] })),
        )
        .await;

        let (_, cart) = send(&app, Method::GET, &cart_uri, None).await;
        assert_eq!(cart.as_array().unwrap().len(), 2);

        let (status, order) = send(
            &app,
            Method::POST,
            "/api/orders",
            Some(json!({ "userId": user_id })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(order["total"], 25.0);
        assert_eq!(order["status"], "PENDING");
        assert_eq!(order["items"].as_array().unwrap().len(), 2);

        let (_, cart) = send(&app, Method::GET, &cart_uri, None).await;
        assert!(cart.as_array().unwrap().is_empty());

        let uri = format!("/api/orders/{}", order["id"]);
        let (status, fetched) = send(&app, Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["id"], order["id"]);

        assert_eq!(broker.published(queues::ORDER_PROCESSING).len(), 1);
    }

    #[tokio::test]
    async fn test_error_responses() {
        let broker = InMemoryBroker::new();
        let store = InMemoryStore::new();
        let app = app(&store, broker.connected_gateway().await);

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/orders",
            Some(json!({ "userId": 8 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "EMPTY_CART");

        let (status, body) = send(&app, Method::GET, "/api/orders/999", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "ORDER_NOT_FOUND");

        let (status, _) = send(&app, Method::GET, "/api/products/999", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(
            &app,
            Method::PUT,
            "/api/cart/1/1",
            Some(json!({ "quantity": 0 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_register_login_and_fetch_user() {
        let broker = InMemoryBroker::new();
        let store = InMemoryStore::new();
        let app = app(&store, broker.connected_gateway().await);
        let ada = json!({ "name": "Ada", "email": "ada@example.com", "password": "s3cret" });

        let (status, body) = send(&app, Method::POST, "/api/register", Some(ada.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["user"]["email"], "ada@example.com");
        assert_eq!(body["user"]["isAdmin"], false);
        assert!(body["user"].get("passwordHash").is_none());
        let user_id = body["user"]["id"].clone();

        let (status, body) = send(&app, Method::POST, "/api/register", Some(ada)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "EMAIL_TAKEN");

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/register",
            Some(json!({ "name": "", "email": "x@example.com", "password": "pw" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/login",
            Some(json!({ "email": "ada@example.com", "password": "s3cret" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["id"], user_id);

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/login",
            Some(json!({ "email": "ada@example.com", "password": "wrong" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "INVALID_CREDENTIALS");

        let (status, body) = send(&app, Method::GET, &format!("/api/user/{user_id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "Ada");
        assert!(body.get("passwordHash").is_none());

        let (status, body) = send(&app, Method::GET, "/api/user/999", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "USER_NOT_FOUND");

        assert_eq!(broker.published(queues::NOTIFICATIONS_STREAM).len(), 1);
    }

    #[tokio::test]
    async fn test_add_to_cart_for_unknown_user() {
        let broker = InMemoryBroker::new();
        let store = InMemoryStore::new();
        let bread = store.add_product("Bread", 4.0);
        let app = app(&store, broker.connected_gateway().await);

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/cart",
            Some(json!({ "userId": 12345, "productId": bread.id })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "USER_NOT_FOUND");
        assert_eq!(broker.published_total(), 0);
    }

    #[tokio::test]
    async fn test_update_and_remove_cart_line() {
        let broker = InMemoryBroker::new();
        let store = InMemoryStore::new();
        let cake = store.add_product("Cake", 20.0);
        store.set_cart_line(4, cake.id, 1);
        let app = app(&store, broker.connected_gateway().await);

        let uri = format!("/api/cart/4/{}", cake.id);
        let (status, line) = send(&app, Method::PUT, &uri, Some(json!({ "quantity": 3 }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(line["quantity"], 3);

        let (status, _) = send(&app, Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = send(&app, Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
