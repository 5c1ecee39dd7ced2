use std::sync::Arc;

use reqwest::StatusCode;
use serde_json::json;

use trustgate_api::app::{build_app, AppServices};
use trustgate_core::{ItemKind, ItemRef, StaffId};
use trustgate_engine::AccessEngine;
use trustgate_infra::{InMemoryAccessStore, InMemoryCatalog};
use trustgate_notify::RecordingNotifier;

struct TestServer {
    base_url: String,
    catalog: Arc<InMemoryCatalog>,
    notifier: Arc<RecordingNotifier>,
    gated: ItemRef,
    public: ItemRef,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        let (catalog, gated) = InMemoryCatalog::new().with_item(ItemKind::Resource, true);
        let (catalog, public) = catalog.with_item(ItemKind::Article, false);
        let catalog = Arc::new(catalog);
        let notifier = Arc::new(RecordingNotifier::new());

        let engine = AccessEngine::builder(Arc::new(InMemoryAccessStore::new()), catalog.clone())
            .notifier(notifier.clone())
            .build();
        let app = build_app(AppServices::new(Arc::new(engine)));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            catalog,
            notifier,
            gated,
            public,
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn item_path(item: ItemRef) -> String {
        format!("{}/{}", item.kind().as_str(), item.id())
    }

    fn last_token(&self, kind: &str) -> String {
        self.notifier
            .last_of(kind)
            .and_then(|n| n.token().map(str::to_string))
            .unwrap_or_else(|| panic!("no {kind} notification"))
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

trait StaffAuth {
    fn staff(self, roles: &str) -> Self;
    fn portal(self, email: &str, token: &str) -> Self;
}

impl StaffAuth for reqwest::RequestBuilder {
    fn staff(self, roles: &str) -> Self {
        self.header("x-staff-id", StaffId::new().to_string())
            .header("x-staff-roles", roles)
    }

    fn portal(self, email: &str, token: &str) -> Self {
        self.header("x-access-email", email).header("x-access-token", token)
    }
}

#[tokio::test]
async fn staff_routes_require_staff_headers() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client.get(srv.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client.get(srv.url("/admin/whoami")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .get(srv.url("/admin/whoami"))
        .staff("reviewer")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert!(body["roles"].as_array().unwrap().iter().any(|r| r == "reviewer"));
}

#[tokio::test]
async fn portal_request_lifecycle() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/portal/requests"))
        .json(&json!({ "email": "ada@example.com", "name": "Ada" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: serde_json::Value = res.json().await.unwrap();
    let id = body["request"]["id"].as_str().unwrap().to_string();

    let res = client
        .post(srv.url(&format!("/admin/portal/requests/{id}/approve")))
        .staff("reviewer")
        .json(&json!({ "full_access": true }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert!(body.get("token").is_none());
    assert_eq!(body["request"]["status"], "approved");

    let token = srv.last_token("portal_approved");
    let gated = TestServer::item_path(srv.gated);
    let res = client
        .get(srv.url(&format!("/items/{gated}/access")))
        .portal("ada@example.com", &token)
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["has_access"], true);

    let res = client
        .post(srv.url(&format!("/admin/portal/requests/{id}/approve")))
        .staff("reviewer")
        .json(&json!({ "full_access": true }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let res = client
        .post(srv.url(&format!("/admin/portal/requests/{id}/revoke")))
        .staff("reviewer")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .post(srv.url("/tokens/verify"))
        .portal("ada@example.com", &token)
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["valid"], false);

    let res = client
        .get(srv.url(&format!("/items/{gated}/download")))
        .portal("ada@example.com", &token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn anonymous_callers_see_public_items_only() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let public = TestServer::item_path(srv.public);
    let res = client
        .get(srv.url(&format!("/items/{public}/download")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let gated = TestServer::item_path(srv.gated);
    let res = client
        .get(srv.url(&format!("/items/{gated}/access")))
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["has_access"], false);

    let res = client
        .get(srv.url("/items/video/123/access"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn trust_center_approval_grants_items() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let agreement_id = srv.catalog.add_agreement("Mutual NDA", "v3", true);

    let res = client
        .post(srv.url("/trust/requests"))
        .header("x-forwarded-for", "203.0.113.5")
        .json(&json!({
            "email": "grace@example.com",
            "name": "Grace",
            "agreement_id": agreement_id,
            "accepted_nda": false,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .post(srv.url("/trust/requests"))
        .header("x-forwarded-for", "203.0.113.5")
        .json(&json!({
            "email": "grace@example.com",
            "name": "Grace",
            "agreement_id": agreement_id,
            "accepted_nda": true,
            "items": [srv.gated, srv.public],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: serde_json::Value = res.json().await.unwrap();
    let id = body["request"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["request"]["requested_items"].as_array().unwrap().len(), 1);

    let res = client
        .get(srv.url("/admin/trust/requests?status=pending"))
        .staff("reviewer")
        .send()
        .await
        .unwrap();
    let pending: serde_json::Value = res.json().await.unwrap();
    assert_eq!(pending.as_array().unwrap().len(), 1);

    let res = client
        .post(srv.url(&format!("/admin/trust/requests/{id}/approve")))
        .staff("reviewer")
        .json(&json!({ "grant_expiry_days": 30 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["grants"].as_array().unwrap().len(), 1);

    let token = srv.last_token("trust_approved");
    let res = client
        .get(srv.url("/items"))
        .portal("grace@example.com", &token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let items: serde_json::Value = res.json().await.unwrap();
    assert!(items
        .as_array()
        .unwrap()
        .iter()
        .all(|i| i["has_access"] == true));

    let res = client
        .post(srv.url("/admin/trust/requests/bulk-reject"))
        .staff("reviewer")
        .json(&json!({ "ids": [id], "reason": "late" }))
        .send()
        .await
        .unwrap();
    let outcome: serde_json::Value = res.json().await.unwrap();
    assert_eq!(outcome["succeeded"].as_array().unwrap().len(), 0);
    assert_eq!(outcome["failed"][0]["code"], "conflict");
}

#[tokio::test]
async fn bundle_codes_redeem_up_to_their_cap() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/admin/bundles"))
        .staff("reviewer")
        .json(&json!({ "name": "Launch kit", "items": [srv.gated] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = client
        .post(srv.url("/admin/bundles"))
        .staff("catalog_manager")
        .json(&json!({ "name": "Launch kit", "items": [srv.gated] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let bundle: serde_json::Value = res.json().await.unwrap();
    let bundle_id = bundle["id"].as_str().unwrap().to_string();

    let res = client
        .post(srv.url(&format!("/admin/bundles/{bundle_id}/codes")))
        .staff("catalog_manager")
        .json(&json!({ "code": "launch-2026", "max_redemptions": 1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = client
        .post(srv.url("/redeem"))
        .json(&json!({ "code": "LAUNCH-2026", "email": "a@example.com" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let redeemed: serde_json::Value = res.json().await.unwrap();
    assert_eq!(redeemed["first_redemption"], true);
    assert!(redeemed.get("token").is_none());

    let token = srv.last_token("bundle_redeemed");
    let gated = TestServer::item_path(srv.gated);
    let res = client
        .get(srv.url(&format!("/items/{gated}/download")))
        .portal("a@example.com", &token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .post(srv.url("/redeem"))
        .json(&json!({ "code": "launch-2026", "email": "b@example.com" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let res = client
        .post(srv.url("/redeem"))
        .json(&json!({ "code": "no-such-code", "email": "b@example.com" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}
