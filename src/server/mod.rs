// Copyright 2023 Remi Bernotavicius

//! The JSON API, served under `/api`.

use crate::config::Config;
use crate::database::Database;
use crate::Result;
use axum::{
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        Method,
    },
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

mod routes;
mod state;

pub use state::AppState;

pub fn build_router(state: AppState) -> Router {
    use routes::*;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(Duration::from_secs(60 * 60));

    let api = Router::new()
        .route("/users/", get(list_users).post(register))
        .route("/users/me/", get(current_user))
        .route("/users/set_password/", post(set_password))
        .route("/users/subscriptions/", get(subscriptions))
        .route("/users/{id}/", get(get_user))
        .route("/users/{id}/subscribe/", post(subscribe).delete(unsubscribe))
        .route("/auth/token/login/", post(login))
        .route("/auth/token/logout/", post(logout))
        .route("/tags/", get(list_tags))
        .route("/tags/{id}/", get(get_tag))
        .route("/ingredients/", get(search_ingredients))
        .route("/ingredients/{id}/", get(get_ingredient))
        .route("/recipes/", get(list_recipes).post(create_recipe))
        .route(
            "/recipes/download_shopping_cart/",
            get(download_shopping_cart),
        )
        .route(
            "/recipes/{id}/",
            get(get_recipe).patch(update_recipe).delete(delete_recipe),
        )
        .route(
            "/recipes/{id}/favorite/",
            post(add_favorite).delete(remove_favorite),
        )
        .route(
            "/recipes/{id}/shopping_cart/",
            post(add_to_shopping_cart).delete(remove_from_shopping_cart),
        );

    Router::new()
        .nest("/api", api)
        .layer(cors)
        .with_state(state)
}

pub async fn start_server(config: Config, database: Database) -> Result<()> {
    let address = config.address;
    let app = build_router(AppState::new(config, database));

    log::info!("Binding to {address}");
    let listener = TcpListener::bind(address).await?;
    log::info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    log::info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => log::info!("Received Ctrl+C, shutting down"),
            Err(error) => {
                log::error!("failed to install Ctrl+C handler: {error}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                log::info!("Received terminate signal, shutting down");
            }
            Err(error) => {
                log::error!("failed to install terminate handler: {error}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{self, NewIngredient, NewTag};
    use crate::database;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt as _;
    use serde_json::{json, Value};
    use tower::ServiceExt as _;

    fn test_app() -> Router {
        let mut conn = database::establish_in_memory().unwrap();
        catalog::add_ingredients(
            &mut conn,
            &[
                NewIngredient {
                    name: "Salt".into(),
                    measurement_unit: "g".into(),
                },
                NewIngredient {
                    name: "Pepper".into(),
                    measurement_unit: "g".into(),
                },
            ],
        )
        .unwrap();
        catalog::add_tag(
            &mut conn,
            &NewTag {
                name: "Breakfast".into(),
                color: "#E26C2D".into(),
                slug: "breakfast".into(),
            },
        )
        .unwrap();

        let config = Config {
            address: "127.0.0.1:0".parse().unwrap(),
            database: ":memory:".into(),
            page_size: 6,
            recipes_limit: 3,
        };
        build_router(AppState::new(config, Database::new(conn)))
    }

    struct Reply {
        status: StatusCode,
        headers: axum::http::HeaderMap,
        body: Vec<u8>,
    }

    impl Reply {
        fn json(&self) -> Value {
            serde_json::from_slice(&self.body).unwrap()
        }

        fn text(&self) -> String {
            String::from_utf8(self.body.clone()).unwrap()
        }
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Reply {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header("authorization", format!("Token {token}"));
        }
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.into_body().collect().await.unwrap().to_bytes().to_vec();
        Reply {
            status,
            headers,
            body,
        }
    }

    /// Registers `username` and returns their id and token.
    async fn sign_up(app: &Router, username: &str) -> (i64, String) {
        let reply = send(
            app,
            "POST",
            "/api/users/",
            None,
            Some(json!({
                "email": format!("{username}@example.com"),
                "username": username,
                "first_name": "First",
                "last_name": "Last",
                "password": "password123",
            })),
        )
        .await;
        assert_eq!(reply.status, StatusCode::CREATED, "{}", reply.text());
        let id = reply.json()["id"].as_i64().unwrap();

        let reply = send(
            app,
            "POST",
            "/api/auth/token/login/",
            None,
            Some(json!({ "username": username, "password": "password123" })),
        )
        .await;
        assert_eq!(reply.status, StatusCode::OK);
        let token = reply.json()["auth_token"].as_str().unwrap().to_owned();
        (id, token)
    }

    async fn post_recipe(app: &Router, token: &str, name: &str, salt: i32) -> i64 {
        let reply = send(
            app,
            "POST",
            "/api/recipes/",
            Some(token),
            Some(json!({
                "name": name,
                "text": "Mix and serve.",
                "cooking_time": 5,
                "image": "data:image/png;base64,AAAA",
                "tags": [1],
                "ingredients": [{"id": 1, "amount": salt}, {"id": 2, "amount": 1}],
            })),
        )
        .await;
        assert_eq!(reply.status, StatusCode::CREATED, "{}", reply.text());
        reply.json()["id"].as_i64().unwrap()
    }

    #[tokio::test]
    async fn token_sessions() {
        let app = test_app();
        let (id, token) = sign_up(&app, "alice").await;

        let reply = send(&app, "GET", "/api/users/me/", Some(&token), None).await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.json()["id"], id);
        assert_eq!(reply.json()["is_subscribed"], false);

        let reply = send(&app, "GET", "/api/users/me/", None, None).await;
        assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
        assert!(reply.json()["errors"].is_string());

        let reply = send(&app, "GET", "/api/users/me/", Some("bogus"), None).await;
        assert_eq!(reply.status, StatusCode::UNAUTHORIZED);

        let reply = send(&app, "POST", "/api/auth/token/logout/", Some(&token), None).await;
        assert_eq!(reply.status, StatusCode::NO_CONTENT);
        let reply = send(&app, "GET", "/api/users/me/", Some(&token), None).await;
        assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn malformed_bodies_are_validation_errors() {
        let app = test_app();
        let (_, token) = sign_up(&app, "alice").await;

        let reply = send(
            &app,
            "POST",
            "/api/recipes/",
            Some(&token),
            Some(json!({ "name": "Soup" })),
        )
        .await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
        assert!(reply.json()["errors"].is_string());

        let reply = send(&app, "GET", "/api/recipes/soup/", None, None).await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn out_of_range_pages_leave_the_server_usable() {
        let app = test_app();
        let huge = i64::MAX;

        for uri in [
            format!("/api/recipes/?page={huge}"),
            format!("/api/users/?page={huge}"),
        ] {
            let reply = send(&app, "GET", &uri, None, None).await;
            assert_eq!(reply.status, StatusCode::BAD_REQUEST, "{uri}");
            assert!(reply.json()["errors"].is_string());
        }

        let reply = send(&app, "GET", "/api/recipes/?page=5", None, None).await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.json()["results"], json!([]));

        let reply = send(&app, "GET", "/api/tags/", None, None).await;
        assert_eq!(reply.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn catalog_routes() {
        let app = test_app();

        let reply = send(&app, "GET", "/api/tags/", None, None).await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.json()[0]["slug"], "breakfast");

        let reply = send(&app, "GET", "/api/ingredients/?name=Pe", None, None).await;
        assert_eq!(reply.json(), json!([{"id": 2, "name": "Pepper", "measurement_unit": "g"}]));

        let reply = send(&app, "GET", "/api/ingredients/9/", None, None).await;
        assert_eq!(reply.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn recipe_lifecycle() {
        let app = test_app();
        let (_, author) = sign_up(&app, "author").await;
        let (_, other) = sign_up(&app, "other").await;
        let recipe = post_recipe(&app, &author, "Porridge", 3).await;
        let uri = format!("/api/recipes/{recipe}/");

        let reply = send(&app, "GET", &uri, None, None).await;
        assert_eq!(reply.status, StatusCode::OK);
        let view = reply.json();
        assert_eq!(view["author"]["username"], "author");
        assert_eq!(view["tags"][0]["slug"], "breakfast");
        assert_eq!(view["ingredients"].as_array().unwrap().len(), 2);
        assert_eq!(view["is_favorited"], false);

        let update = json!({
            "name": "Salty porridge",
            "text": "More salt.",
            "cooking_time": 7,
            "tags": [1],
            "ingredients": [{"id": 1, "amount": 10}],
        });
        let reply = send(&app, "PATCH", &uri, Some(&other), Some(update.clone())).await;
        assert_eq!(reply.status, StatusCode::FORBIDDEN);
        let reply = send(&app, "PATCH", &uri, Some(&author), Some(update)).await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.json()["ingredients"][0]["amount"], 10);
        assert_eq!(reply.json()["image"], "data:image/png;base64,AAAA");

        let reply = send(&app, "GET", "/api/recipes/?tags=breakfast&limit=1", None, None).await;
        assert_eq!(reply.json()["count"], 1);
        assert_eq!(reply.json()["results"][0]["name"], "Salty porridge");
        let reply = send(&app, "GET", "/api/recipes/?tags=dinner", None, None).await;
        assert_eq!(reply.json()["count"], 0);

        let reply = send(&app, "DELETE", &uri, Some(&other), None).await;
        assert_eq!(reply.status, StatusCode::FORBIDDEN);
        let reply = send(&app, "DELETE", &uri, Some(&author), None).await;
        assert_eq!(reply.status, StatusCode::NO_CONTENT);
        let reply = send(&app, "GET", &uri, None, None).await;
        assert_eq!(reply.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn favorites_reject_duplicates() {
        let app = test_app();
        let (_, token) = sign_up(&app, "alice").await;
        let recipe = post_recipe(&app, &token, "Porridge", 3).await;
        let uri = format!("/api/recipes/{recipe}/favorite/");

        let reply = send(&app, "POST", &uri, None, None).await;
        assert_eq!(reply.status, StatusCode::UNAUTHORIZED);

        let reply = send(&app, "POST", &uri, Some(&token), None).await;
        assert_eq!(reply.status, StatusCode::CREATED);
        assert_eq!(reply.json()["name"], "Porridge");

        let reply = send(&app, "POST", &uri, Some(&token), None).await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);

        let reply = send(&app, "GET", "/api/recipes/?is_favorited=1", Some(&token), None).await;
        assert_eq!(reply.json()["count"], 1);

        let reply = send(&app, "DELETE", &uri, Some(&token), None).await;
        assert_eq!(reply.status, StatusCode::NO_CONTENT);
        let reply = send(&app, "DELETE", &uri, Some(&token), None).await;
        assert_eq!(reply.status, StatusCode::NOT_FOUND);

        let reply = send(&app, "POST", "/api/recipes/999/favorite/", Some(&token), None).await;
        assert_eq!(reply.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn download_shopping_cart() {
        let app = test_app();
        let (_, token) = sign_up(&app, "cook").await;
        for (name, salt) in [("Porridge", 3), ("Soup", 7)] {
            let recipe = post_recipe(&app, &token, name, salt).await;
            let uri = format!("/api/recipes/{recipe}/shopping_cart/");
            let reply = send(&app, "POST", &uri, Some(&token), None).await;
            assert_eq!(reply.status, StatusCode::CREATED);
        }

        let uri = "/api/recipes/download_shopping_cart/";
        let reply = send(&app, "GET", uri, None, None).await;
        assert_eq!(reply.status, StatusCode::UNAUTHORIZED);

        let reply = send(&app, "GET", uri, Some(&token), None).await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(
            reply.headers["content-disposition"],
            "attachment; filename=\"shopping_cart.txt\""
        );
        assert_eq!(
            reply.text(),
            "Shopping list for cook\n\nPepper: 2 g\nSalt: 10 g\n"
        );
    }

    #[tokio::test]
    async fn subscriptions() {
        let app = test_app();
        let (alice, alice_token) = sign_up(&app, "alice").await;
        let (bob, bob_token) = sign_up(&app, "bob").await;
        for name in ["One", "Two", "Three"] {
            post_recipe(&app, &bob_token, name, 1).await;
        }

        let reply = send(
            &app,
            "POST",
            &format!("/api/users/{alice}/subscribe/"),
            Some(&alice_token),
            None,
        )
        .await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);

        let uri = format!("/api/users/{bob}/subscribe/?recipes_limit=2");
        let reply = send(&app, "POST", &uri, Some(&alice_token), None).await;
        assert_eq!(reply.status, StatusCode::CREATED);
        assert_eq!(reply.json()["is_subscribed"], true);
        assert_eq!(reply.json()["recipes_count"], 3);
        assert_eq!(reply.json()["recipes"].as_array().unwrap().len(), 2);

        let reply = send(&app, "POST", &uri, Some(&alice_token), None).await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);

        let reply = send(
            &app,
            "GET",
            "/api/users/subscriptions/?recipes_limit=1",
            Some(&alice_token),
            None,
        )
        .await;
        assert_eq!(reply.json()["count"], 1);
        assert_eq!(reply.json()["results"][0]["username"], "bob");
        assert_eq!(reply.json()["results"][0]["recipes"][0]["name"], "Three");

        let uri = format!("/api/users/{bob}/subscribe/");
        let reply = send(&app, "DELETE", &uri, Some(&alice_token), None).await;
        assert_eq!(reply.status, StatusCode::NO_CONTENT);
        let reply = send(&app, "DELETE", &uri, Some(&alice_token), None).await;
        assert_eq!(reply.status, StatusCode::NOT_FOUND);
    }
}
