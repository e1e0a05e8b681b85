mod common;

use anyhow::Result;
use reqwest::StatusCode;

#[tokio::test]
async fn root_reports_name_and_version() -> Result<()> {
    let server = common::ensure_server().await?;
    let res = reqwest::get(format!("{}/", server.base_url)).await?;
    assert_eq!(res.status(), StatusCode::OK);

    let body = res.json::<serde_json::Value>().await?;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["name"], "PR Bubble API");
    Ok(())
}

#[tokio::test]
async fn health_reports_unavailable_database() -> Result<()> {
    let server = common::ensure_server().await?;
    let res = reqwest::get(format!("{}/api/health", server.base_url)).await?;
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);

    let body = res.json::<serde_json::Value>().await?;
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "SERVICE_UNAVAILABLE");
    Ok(())
}

#[tokio::test]
async fn readiness_reports_configuration() -> Result<()> {
    let server = common::ensure_server().await?;
    let res = reqwest::get(format!("{}/api/readiness", server.base_url)).await?;
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);

    let body = res.json::<serde_json::Value>().await?;
    assert_eq!(body["data"]["ready"], false);
    assert_eq!(body["data"]["storage_configured"], false);
    assert_eq!(body["data"]["access_configured"], false);
    Ok(())
}
