use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use isp_nexus::config::AppConfig;
use isp_nexus::database::tables;
use isp_nexus::{router, AppState};
use reqwest::StatusCode;
use serde_json::{json, Value};

pub const PASSWORD: &str = "secret1";

pub struct TestServer {
    pub base_url: String,
    pub state: AppState,
}

impl TestServer {
    async fn spawn() -> Result<Self> {
        // Pick an unused port for isolation
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let base_url = format!("http://127.0.0.1:{}", port);

        let mut config = AppConfig::development();
        config.server.port = port;
        config.server.enable_request_logging = false;
        let state = AppState::in_memory(config);

        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
            .await
            .context("failed to bind test listener")?;
        let app = router(state.clone());
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self { base_url, state })
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let client = reqwest::Client::new();
        let deadline = Instant::now() + timeout;
        loop {
            if Instant::now() > deadline {
                break;
            }
            if let Ok(resp) = client.get(self.url("/health")).send().await {
                if resp.status() == StatusCode::OK {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        anyhow::bail!("server did not become ready on {} within {:?}", self.base_url, timeout)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Register an account through the gateway and return its user id
    pub async fn register(&self, email: &str) -> Result<String> {
        let res = client()?
            .post(self.url("/auth/register"))
            .json(&json!({ "email": email, "password": PASSWORD }))
            .send()
            .await?;
        anyhow::ensure!(res.status() == StatusCode::CREATED, "register failed: {}", res.status());
        let body: Value = res.json().await?;
        body["data"]["user_id"]
            .as_str()
            .map(str::to_string)
            .context("register response missing user_id")
    }

    /// Sign in and return the full login payload
    pub async fn login(&self, email: &str) -> Result<Value> {
        let res = client()?
            .post(self.url("/auth/login"))
            .json(&json!({ "email": email, "password": PASSWORD }))
            .send()
            .await?;
        anyhow::ensure!(res.status() == StatusCode::OK, "login failed: {}", res.status());
        let body: Value = res.json().await?;
        Ok(body["data"].clone())
    }

    pub async fn customer_token(&self, email: &str) -> Result<String> {
        self.register(email).await?;
        token_of(&self.login(email).await?)
    }

    /// Register, then promote the profile to admin directly in the store
    pub async fn admin_token(&self, email: &str) -> Result<String> {
        let user_id = self.register(email).await?;
        self.state
            .store
            .update(tables::PROFILES, &user_id, json!({ "role": "admin" }))
            .await?;
        token_of(&self.login(email).await?)
    }
}

pub fn token_of(login: &Value) -> Result<String> {
    login["access_token"]
        .as_str()
        .map(str::to_string)
        .context("login response missing access_token")
}

/// Client that surfaces redirects instead of following them
pub fn client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()?)
}

pub async fn start_server() -> Result<TestServer> {
    let server = TestServer::spawn().await?;
    server.wait_ready(Duration::from_secs(5)).await?;
    Ok(server)
}
