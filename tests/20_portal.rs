mod common;

use anyhow::Result;
use reqwest::{header, StatusCode};
use serde_json::{json, Value};

fn location(res: &reqwest::Response) -> Option<&str> {
    res.headers().get(header::LOCATION).and_then(|v| v.to_str().ok())
}

#[tokio::test]
async fn anonymous_visitor_is_sent_to_sign_in() -> Result<()> {
    let server = common::start_server().await?;
    let client = common::client()?;

    for path in ["/portal/dashboard", "/portal/dashboard/tickets", "/portal/admin/dashboard"] {
        let res = client.get(server.url(path)).send().await?;
        assert_eq!(res.status(), StatusCode::TEMPORARY_REDIRECT, "path {}", path);
        assert_eq!(location(&res), Some("/login"), "path {}", path);
    }
    Ok(())
}

#[tokio::test]
async fn public_pages_render_for_everyone() -> Result<()> {
    let server = common::start_server().await?;
    let client = common::client()?;

    let res = client.get(server.url("/portal/login")).send().await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await?;
    assert_eq!(body["data"]["path"], json!("/login"));
    assert_eq!(body["data"]["scope"], json!("public"));

    // A broken token on a public page still renders
    let res = client
        .get(server.url("/portal/register"))
        .bearer_auth("not-a-jwt")
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn customer_renders_dashboard_but_not_admin() -> Result<()> {
    let server = common::start_server().await?;
    let token = server.customer_token("cust@example.com").await?;
    let client = common::client()?;

    let res = client.get(server.url("/portal/dashboard")).bearer_auth(&token).send().await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await?;
    assert_eq!(body["data"]["scope"], json!("authenticated"));
    assert_eq!(body["data"]["profile"]["role"], json!("customer"));

    let res = client.get(server.url("/portal/admin/tickets")).bearer_auth(&token).send().await?;
    assert_eq!(res.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&res), Some("/dashboard"));
    Ok(())
}

#[tokio::test]
async fn admin_renders_admin_pages() -> Result<()> {
    let server = common::start_server().await?;
    let token = server.admin_token("boss@example.com").await?;

    let res = common::client()?
        .get(server.url("/portal/admin/users"))
        .bearer_auth(&token)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);

    let body: Value = res.json().await?;
    assert_eq!(body["data"]["scope"], json!("admin"));
    let active: Vec<&str> = body["data"]["navigation"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter(|i| i["active"] == json!(true))
                .filter_map(|i| i["path"].as_str())
                .collect()
        })
        .unwrap_or_default();
    assert_eq!(active, vec!["/admin/users"]);
    Ok(())
}

#[tokio::test]
async fn me_requires_a_session() -> Result<()> {
    let server = common::start_server().await?;
    let client = common::client()?;

    let res = client.get(server.url("/api/me")).send().await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client.get(server.url("/api/me")).bearer_auth("garbage").send().await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn admin_api_is_forbidden_for_customers() -> Result<()> {
    let server = common::start_server().await?;
    let customer = server.customer_token("cust@example.com").await?;
    let admin = server.admin_token("boss@example.com").await?;
    let client = common::client()?;

    for path in ["/api/admin/tickets", "/api/admin/payments", "/api/admin/customers"] {
        let res = client.get(server.url(path)).bearer_auth(&customer).send().await?;
        assert_eq!(res.status(), StatusCode::FORBIDDEN, "path {}", path);

        let res = client.get(server.url(path)).bearer_auth(&admin).send().await?;
        assert_eq!(res.status(), StatusCode::OK, "path {}", path);
    }
    Ok(())
}
