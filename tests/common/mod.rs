#![allow(dead_code)]

use std::net::TcpListener;
use std::sync::Arc;

use clinic_auth::configuration::JwtSettings;
use clinic_auth::startup::{run, AppServices};
use clinic_auth::store::{InMemoryStore, Repositories};
use serde_json::{json, Value};

pub struct TestApp {
    pub address: String,
    pub store: Arc<InMemoryStore>,
    pub client: reqwest::Client,
}

pub fn jwt_settings() -> JwtSettings {
    JwtSettings {
        access_token_secret: "integration-access-secret-0123456789".to_string(),
        refresh_token_secret: "integration-refresh-secret-0123456789".to_string(),
        access_token_ttl_minutes: 15,
        refresh_token_ttl_hours: 24,
    }
}

pub fn spawn_app() -> TestApp {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    let store = Arc::new(InMemoryStore::new());
    let services = AppServices::new(&Repositories::from_shared(store.clone()), &jwt_settings())
        .expect("Failed to build services");
    let server = run(listener, services).expect("Failed to bind address");
    let _ = tokio::spawn(server);

    TestApp {
        address: format!("http://127.0.0.1:{}", port),
        store,
        client: reqwest::Client::new(),
    }
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}/api/v0/users{}", self.address, path)
    }

    pub async fn register(&self, email: &str, password: &str) -> reqwest::Response {
        self.client
            .post(self.url("/auth/register"))
            .json(&json!({
                "email": email,
                "first_name": "Alice",
                "last_name": "Liddell",
                "password": password,
                "password_confirmation": password,
            }))
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn login(&self, email: &str, password: &str) -> reqwest::Response {
        self.client
            .post(self.url("/auth/login"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn renew(&self, refresh_token: &str) -> reqwest::Response {
        self.client
            .post(self.url("/auth/renew"))
            .json(&json!({ "refresh_token": refresh_token }))
            .send()
            .await
            .expect("Failed to execute request.")
    }

    /// Register and return the parsed auth response
    pub async fn registered(&self, email: &str, password: &str) -> Value {
        let response = self.register(email, password).await;
        assert_eq!(201, response.status().as_u16());
        response.json().await.expect("Failed to parse response")
    }
}
