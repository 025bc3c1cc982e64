use serde_json::Value;
use std::time::Duration;

pub const DEFAULT_DAEMON_URL: &str = "http://127.0.0.1:57480";

#[derive(Debug, Clone)]
pub struct DaemonClient {
    client: reqwest::Client,
    /// `stop --wait` can take the full stop timeout plus the collector join
    long_client: reqwest::Client,
    base_url: String,
}

impl DaemonClient {
    pub fn new(base_url: Option<&str>) -> anyhow::Result<Self> {
        let base_url = base_url
            .unwrap_or(DEFAULT_DAEMON_URL)
            .trim_end_matches('/')
            .to_string();

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;

        let long_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self { client, long_client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // ─── 내부 헬퍼 ───

    async fn read_response(response: reqwest::Response) -> anyhow::Result<Value> {
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await?;
            // 데몬은 {"error": ..., "error_code": ...} 형태로 에러를 돌려줌
            let detail = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
                .unwrap_or(text);
            anyhow::bail!("Server returned {}: {}", status, detail);
        }
        Ok(response.json().await?)
    }

    async fn get_json(&self, path: &str) -> anyhow::Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        Self::read_response(self.client.get(&url).send().await?).await
    }

    async fn post_json(&self, path: &str, body: &Value) -> anyhow::Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        Self::read_response(self.client.post(&url).json(body).send().await?).await
    }

    async fn post_empty_long(&self, path: &str) -> anyhow::Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        Self::read_response(self.long_client.post(&url).send().await?).await
    }

    /// POST /api/start — returns "started" or "already_running"
    pub async fn start(&self, config: &str) -> anyhow::Result<String> {
        let body = serde_json::json!({ "config": config });
        let data = self.post_json("/api/start", &body).await?;
        Ok(result_field(&data))
    }

    /// POST /api/stop[?wait=true]
    pub async fn stop(&self, wait: bool) -> anyhow::Result<Value> {
        let path = if wait { "/api/stop?wait=true" } else { "/api/stop" };
        self.post_empty_long(path).await
    }

    /// GET /api/logs — drains the daemon-side buffer
    pub async fn drain_logs(&self) -> anyhow::Result<String> {
        let data = self.get_json("/api/logs").await?;
        Ok(data
            .get("logs")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string())
    }

    /// GET /api/status
    pub async fn status(&self) -> anyhow::Result<Value> {
        self.get_json("/api/status").await
    }
}

fn result_field(data: &Value) -> String {
    data.get("result")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string()
}
