mod common;

use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde_json::{json, Value};

async fn open_ticket(server: &common::TestServer, token: &str, title: &str) -> Result<Value> {
    let res = common::client()?
        .post(server.url("/api/tickets"))
        .bearer_auth(token)
        .json(&json!({ "title": title, "description": "No signal since morning", "priority": "high" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: Value = res.json().await?;
    Ok(body["data"].clone())
}

#[tokio::test]
async fn customer_opens_and_lists_own_tickets() -> Result<()> {
    let server = common::start_server().await?;
    let ana = server.customer_token("ana@example.com").await?;
    let budi = server.customer_token("budi@example.com").await?;

    let ticket = open_ticket(&server, &ana, "Internet down").await?;
    assert_eq!(ticket["status"], json!("open"));
    assert_eq!(ticket["priority"], json!("high"));
    open_ticket(&server, &budi, "Slow connection").await?;

    let res = common::client()?.get(server.url("/api/tickets")).bearer_auth(&ana).send().await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await?;
    let titles: Vec<&str> = body["data"]
        .as_array()
        .context("tickets should be an array")?
        .iter()
        .filter_map(|t| t["title"].as_str())
        .collect();
    assert_eq!(titles, vec!["Internet down"]);
    Ok(())
}

#[tokio::test]
async fn ticket_title_is_required() -> Result<()> {
    let server = common::start_server().await?;
    let token = server.customer_token("ana@example.com").await?;

    let res = common::client()?
        .post(server.url("/api/tickets"))
        .bearer_auth(&token)
        .json(&json!({ "title": "   " }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn admin_triages_tickets() -> Result<()> {
    let server = common::start_server().await?;
    let customer = server.customer_token("ana@example.com").await?;
    let admin = server.admin_token("boss@example.com").await?;
    let client = common::client()?;

    let first = open_ticket(&server, &customer, "Router broken").await?;
    open_ticket(&server, &customer, "Billing question").await?;
    let id = first["id"].as_str().context("ticket id")?;

    let res = client
        .patch(server.url(&format!("/api/admin/tickets/{}", id)))
        .bearer_auth(&admin)
        .json(&json!({ "status": "in_progress" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await?;
    assert_eq!(body["data"]["status"], json!("in_progress"));

    let res = client
        .get(server.url("/api/admin/tickets?status=in_progress"))
        .bearer_auth(&admin)
        .send()
        .await?;
    let body: Value = res.json().await?;
    assert_eq!(body["data"].as_array().map(Vec::len), Some(1));

    let res = client
        .get(server.url("/api/admin/tickets?status=all"))
        .bearer_auth(&admin)
        .send()
        .await?;
    let body: Value = res.json().await?;
    assert_eq!(body["data"].as_array().map(Vec::len), Some(2));

    let res = client
        .get(server.url("/api/admin/tickets?status=closed"))
        .bearer_auth(&admin)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn updating_missing_ticket_is_not_found() -> Result<()> {
    let server = common::start_server().await?;
    let admin = server.admin_token("boss@example.com").await?;

    let res = common::client()?
        .patch(server.url("/api/admin/tickets/does-not-exist"))
        .bearer_auth(&admin)
        .json(&json!({ "status": "resolved" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn customers_cannot_change_ticket_status() -> Result<()> {
    let server = common::start_server().await?;
    let customer = server.customer_token("ana@example.com").await?;
    let ticket = open_ticket(&server, &customer, "Router broken").await?;
    let id = ticket["id"].as_str().context("ticket id")?;

    let res = common::client()?
        .patch(server.url(&format!("/api/admin/tickets/{}", id)))
        .bearer_auth(&customer)
        .json(&json!({ "status": "resolved" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    Ok(())
}
