use std::sync::Arc;

use axum::{middleware, routing::get, Extension, Json, Router};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::{
    handler::{chat::chat_handler, ws::ws_handler},
    middleware::auth,
    AppState,
};

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "message": "Server is running"
    }))
}

pub fn create_router(app_state: Arc<AppState>) -> Router {
    // The socket authenticates in-band, so it sits outside the auth layer.
    let api_route = Router::new()
        .nest("/chat", chat_handler().layer(middleware::from_fn(auth)))
        .route("/ws/chat", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(Extension(app_state));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_route)
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
    };
    use serde_json::Value;
    use tower::ServiceExt;
    use tracing_subscriber::filter::LevelFilter;
    use uuid::Uuid;

    use super::*;
    use crate::{
        config::Config,
        db::memory::MemoryStore,
        dtos::chatdtos::SendMessagePayload,
        service::hub::Hub,
        utils::token,
    };

    const SECRET: &str = "router-test-secret";

    struct TestApp {
        router: Router,
        state: Arc<AppState>,
        store: Arc<MemoryStore>,
        customer: Uuid,
        owner: Uuid,
        listing: Uuid,
    }

    async fn test_app() -> TestApp {
        let store = Arc::new(MemoryStore::new());
        let customer = store.add_user("Ada").await;
        let owner = store.add_user("Bola").await;
        let listing = store.add_listing(owner, "Two-bedroom flat, Lekki").await;

        let config = Config {
            database_url: "postgres://unused".to_string(),
            database_max_connections: 1,
            jwt_secret: SECRET.to_string(),
            port: 0,
            cors_origins: vec![],
            log_level: LevelFilter::OFF,
        };
        let state = Arc::new(AppState::new(config, store.clone(), Arc::new(Hub::new())));

        TestApp {
            router: create_router(state.clone()),
            state,
            store,
            customer,
            owner,
            listing,
        }
    }

    fn bearer(user_id: Uuid) -> String {
        let token = token::create_token(&user_id.to_string(), SECRET.as_bytes(), 60).unwrap();
        format!("Bearer {token}")
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_is_public() {
        let app = test_app().await;
        let response = app
            .router
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_chat_routes_require_a_token() {
        let app = test_app().await;
        let response = app
            .router
            .oneshot(Request::get("/api/chat/chats").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body["status"], "fail");
    }

    #[tokio::test]
    async fn test_user_lookup_failure_is_a_server_error() {
        let app = test_app().await;
        app.store.fail_reads(true);

        let response = app
            .router
            .oneshot(
                Request::get("/api/chat/chats")
                    .header(header::AUTHORIZATION, bearer(app.customer))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await["status"], "error");
    }

    #[tokio::test]
    async fn test_token_cookie_is_accepted() {
        let app = test_app().await;
        let token = token::create_token(&app.customer.to_string(), SECRET.as_bytes(), 60).unwrap();
        let response = app
            .router
            .oneshot(
                Request::get("/api/chat/unread-count")
                    .header(header::COOKIE, format!("token={token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["data"]["unreadCount"], 0);
    }

    #[tokio::test]
    async fn test_rest_send_then_inbox_and_history() {
        let app = test_app().await;
        let payload = serde_json::json!({
            "content": "Is the flat still available?",
            "listingId": app.listing,
            "receiverId": app.owner,
        });

        let response = app
            .router
            .clone()
            .oneshot(
                Request::post("/api/chat/chats/messages")
                    .header(header::AUTHORIZATION, bearer(app.customer))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(payload.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let sent = body_json(response).await;
        let room_id = sent["data"]["roomId"].as_str().unwrap().to_string();

        let response = app
            .router
            .clone()
            .oneshot(
                Request::get("/api/chat/chats")
                    .header(header::AUTHORIZATION, bearer(app.owner))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let inbox = body_json(response).await;
        assert_eq!(inbox["data"].as_array().unwrap().len(), 1);
        assert_eq!(inbox["data"][0]["unreadCount"], 1);

        let response = app
            .router
            .oneshot(
                Request::get(format!("/api/chat/chats/{room_id}/messages?limit=10"))
                    .header(header::AUTHORIZATION, bearer(app.owner))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let history = body_json(response).await;
        assert_eq!(history["data"][0]["content"], "Is the flat still available?");
    }

    #[tokio::test]
    async fn test_outsider_cannot_read_room_history() {
        let app = test_app().await;
        let outsider = app.store.add_user("Chidi").await;
        let message = app
            .state
            .chat_service
            .send_message(
                app.customer,
                SendMessagePayload {
                    room_id: None,
                    content: "hello".to_string(),
                    listing_id: app.listing,
                    receiver_id: app.owner,
                },
            )
            .await
            .unwrap();

        let response = app
            .router
            .oneshot(
                Request::get(format!("/api/chat/chats/{}/messages", message.room_id))
                    .header(header::AUTHORIZATION, bearer(outsider))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["message"], "Access denied");
    }

    #[tokio::test]
    async fn test_delete_routes_are_forbidden() {
        let app = test_app().await;

        for uri in [
            format!("/api/chat/chats/{}", Uuid::now_v7()),
            format!("/api/chat/messages/{}", Uuid::now_v7()),
        ] {
            let response = app
                .router
                .clone()
                .oneshot(
                    Request::delete(uri)
                        .header(header::AUTHORIZATION, bearer(app.customer))
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::FORBIDDEN);
            let body = body_json(response).await;
            assert!(body["message"]
                .as_str()
                .unwrap()
                .starts_with("Chat history is permanent"));
        }
    }

    #[tokio::test]
    async fn test_listing_stats_are_owner_only() {
        let app = test_app().await;
        let uri = format!("/api/chat/stats?listingId={}", app.listing);

        let response = app
            .router
            .clone()
            .oneshot(
                Request::get(&uri)
                    .header(header::AUTHORIZATION, bearer(app.customer))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .router
            .oneshot(
                Request::get(&uri)
                    .header(header::AUTHORIZATION, bearer(app.owner))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["data"]["totalRooms"], 0);
    }
}
