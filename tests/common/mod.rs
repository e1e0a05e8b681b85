use std::process::{Child, Command, Stdio};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use reqwest::StatusCode;

pub const TEST_API_KEY: &str = "integration-test-key";

static SERVER: OnceLock<TestServer> = OnceLock::new();

pub struct TestServer {
    pub port: u16,
    pub base_url: String,
    #[allow(dead_code)]
    child: Child,
}

impl TestServer {
    fn spawn() -> Result<Self> {
        // Pick an unused port for isolation
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let base_url = format!("http://127.0.0.1:{}", port);

        // The database points at a closed port: these tests cover the HTTP
        // surface and authorization gates, not persistence.
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_pr-bubble-api"));
        cmd.arg("serve")
            .env("APP_ENV", "development")
            .env("HOST", "127.0.0.1")
            .env("PORT", port.to_string())
            .env("DATABASE_URL", "postgres://pr:pr@127.0.0.1:1/pr_bubbles")
            .env("DATABASE_RUN_MIGRATIONS", "false")
            .env("DATABASE_CONNECT_TIMEOUT_SECS", "1")
            .env("API_KEY", TEST_API_KEY)
            .env("SECRET_KEY", "integration-secret")
            .env("CF_ACCESS_TEAM_DOMAIN", "")
            .env("CF_ACCESS_AUDIENCE", "")
            .env("CF_ACCESS_DEV_BYPASS", "false")
            .env("RUST_LOG", "warn")
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        let child = cmd.spawn().context("failed to spawn server binary")?;

        Ok(Self { port, base_url, child })
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let client = reqwest::Client::new();
        let deadline = Instant::now() + timeout;
        loop {
            if Instant::now() > deadline {
                break;
            }
            let url = format!("{}/api/health", self.base_url);
            if let Ok(resp) = client.get(&url).send().await {
                // Listening is enough; the database is expected to be down.
                if resp.status() == StatusCode::OK || resp.status() == StatusCode::SERVICE_UNAVAILABLE {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(150)).await;
        }
        anyhow::bail!("server did not become ready on {} within {:?}", self.base_url, timeout)
    }
}

pub async fn ensure_server() -> Result<&'static TestServer> {
    let server = SERVER.get_or_init(|| TestServer::spawn().expect("failed to spawn server binary"));
    server.wait_ready(Duration::from_secs(15)).await?;
    Ok(server)
}
