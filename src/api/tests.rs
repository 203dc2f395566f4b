//! Request pipeline tests against a mock RT3 server.
//!
//! Uses wiremock to record call order, headers and bodies.

#[cfg(test)]
mod pipeline_tests {
    use std::sync::Arc;

    use reqwest::Method;
    use serde_json::json;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    use crate::api::client::ApiClient;
    use crate::api::error::ApiError;
    use crate::api::request::{MultipartForm, RequestBody, RequestDescriptor, RequestOptions};
    use crate::api::token::{MemoryTokenStore, TokenStore};
    use crate::api::urls::ApiUrls;
    use crate::api::{session, uploads};

    // ── Helpers ──────────────────────────────────────────────────────────

    const TOKEN: &str = "tok-123";

    async fn setup(token: Option<&str>) -> (MockServer, Arc<MemoryTokenStore>, ApiClient) {
        let server = MockServer::start().await;
        let store = Arc::new(match token {
            Some(t) => MemoryTokenStore::with_token(t),
            None => MemoryTokenStore::new(),
        });
        let client = ApiClient::new(ApiUrls::new(&server.uri()), store.clone());
        (server, store, client)
    }

    async fn mount_verify(server: &MockServer, status: u16) {
        Mock::given(method("GET"))
            .and(path("/api/team-roster/me"))
            .respond_with(ResponseTemplate::new(status).set_body_json(json!({"id": 1})))
            .mount(server)
            .await;
    }

    async fn requests(server: &MockServer) -> Vec<Request> {
        server.received_requests().await.unwrap_or_default()
    }

    fn content_type(req: &Request) -> Option<String> {
        req.headers
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    // ── send() ───────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_no_token_issues_no_calls() {
        let (server, _store, client) = setup(None).await;

        let err = client
            .send(&RequestDescriptor::get("/team-roster/"))
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::NoToken));
        assert_eq!(err.to_string(), "No authentication token found");
        assert!(requests(&server).await.is_empty());
    }

    #[tokio::test]
    async fn test_verification_precedes_main_call() {
        let (server, _store, client) = setup(Some(TOKEN)).await;
        mount_verify(&server, 200).await;
        Mock::given(method("POST"))
            .and(path("/api/missions"))
            .and(header("Authorization", "Bearer tok-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 9})))
            .expect(1)
            .mount(&server)
            .await;

        let payload = json!({"name": "Op \"Nightfall\"", "operators": [1, 2], "active": true});
        let options = RequestOptions::new(Method::POST).json_value(payload.clone());
        let body = client.request("/missions/", options).await.unwrap();
        assert_eq!(body, json!({"id": 9}));

        let recorded = requests(&server).await;
        assert_eq!(recorded.len(), 2);
        assert_eq!(recorded[0].url.path(), "/api/team-roster/me");
        assert_eq!(recorded[0].method.as_str(), "GET");
        assert_eq!(recorded[1].url.path(), "/api/missions");

        let sent = String::from_utf8(recorded[1].body.clone()).unwrap();
        assert_eq!(sent, serde_json::to_string(&payload).unwrap());
        assert_eq!(content_type(&recorded[1]).as_deref(), Some("application/json"));
    }

    #[tokio::test]
    async fn test_verification_401_clears_token_and_skips_main_call() {
        let (server, store, client) = setup(Some(TOKEN)).await;
        mount_verify(&server, 401).await;
        Mock::given(path("/api/missions"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = client
            .send(&RequestDescriptor::post("/missions").with_body(
                crate::api::request::RequestBody::Json(json!({"a": 1})),
            ))
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::AuthExpired));
        assert_eq!(store.get(), None);
        assert_eq!(requests(&server).await.len(), 1);
    }

    #[tokio::test]
    async fn test_verification_failure_keeps_token() {
        let (server, store, client) = setup(Some(TOKEN)).await;
        mount_verify(&server, 500).await;

        let err = client
            .send(&RequestDescriptor::get("/missions"))
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::VerificationFailed));
        assert_eq!(err.to_string(), "Failed to fetch user data");
        assert_eq!(store.get().as_deref(), Some(TOKEN));
        assert_eq!(requests(&server).await.len(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_verification_keeps_token() {
        // Reserve a port, then free it so nothing is listening there.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let store = Arc::new(MemoryTokenStore::with_token(TOKEN));
        let client = ApiClient::new(ApiUrls::new(&format!("http://{}", addr)), store.clone());

        let err = client
            .send(&RequestDescriptor::post("/missions").with_body(RequestBody::Json(json!({}))))
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::VerificationFailed));
        assert_eq!(store.get().as_deref(), Some(TOKEN));
    }

    #[tokio::test]
    async fn test_main_call_401_clears_token() {
        let (server, store, client) = setup(Some(TOKEN)).await;
        mount_verify(&server, 200).await;
        Mock::given(method("GET"))
            .and(path("/api/missions"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = client
            .send(&RequestDescriptor::get("/missions"))
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::AuthExpired));
        assert_eq!(store.get(), None);
    }

    #[tokio::test]
    async fn test_failure_message_from_body_or_status() {
        let (server, store, client) = setup(Some(TOKEN)).await;
        mount_verify(&server, 200).await;
        Mock::given(path("/api/missions"))
            .respond_with(ResponseTemplate::new(400).set_body_string("Mission name taken"))
            .mount(&server)
            .await;
        Mock::given(path("/api/reports"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = client
            .send(&RequestDescriptor::get("/missions"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Mission name taken");

        let err = client
            .send(&RequestDescriptor::get("/reports"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::RequestFailed(ref m) if m == "Not Found"));

        assert_eq!(store.get().as_deref(), Some(TOKEN));
    }

    #[tokio::test]
    async fn test_multipart_skips_verification_and_is_sent_untouched() {
        let (server, _store, client) = setup(Some(TOKEN)).await;
        Mock::given(method("POST"))
            .and(path("/api/images/dashboard/upload"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let data = vec![0u8, 159, 146, 150, 255, 10, 13];
        let form = MultipartForm::new().file("file", "blob.bin", "application/octet-stream", data.clone());
        let options = RequestOptions::new(Method::POST)
            .multipart(form)
            .header("Content-Type", "application/json")
            .unwrap();

        client
            .request("/images/dashboard/upload", options)
            .await
            .unwrap();

        let recorded = requests(&server).await;
        assert_eq!(recorded.len(), 1);
        let ct = content_type(&recorded[0]).unwrap();
        assert!(ct.starts_with("multipart/form-data"), "got {}", ct);
        assert!(!ct.contains("json"));
        assert!(contains(&recorded[0].body, &data));
    }

    #[tokio::test]
    async fn test_text_body_passes_through() {
        let (server, _store, client) = setup(Some(TOKEN)).await;
        mount_verify(&server, 200).await;
        Mock::given(method("PUT"))
            .and(path("/api/missions/3"))
            .and(body_string("{\"raw\":  true}"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let options = RequestOptions::new(Method::PUT).text("{\"raw\":  true}");
        client.request("/missions/3", options).await.unwrap();
    }

    #[tokio::test]
    async fn test_authorization_cannot_be_overridden() {
        let (server, _store, client) = setup(Some(TOKEN)).await;
        mount_verify(&server, 200).await;
        Mock::given(method("GET"))
            .and(path("/api/missions"))
            .and(header("Authorization", "Bearer tok-123"))
            .and(header("X-Trace", "abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let options = RequestOptions::default()
            .header("Authorization", "Bearer forged")
            .unwrap()
            .header("X-Trace", "abc")
            .unwrap();
        client.request("/missions", options).await.unwrap();

        let recorded = requests(&server).await;
        let auth: Vec<_> = recorded[1].headers.get_all("authorization").iter().collect();
        assert_eq!(auth.len(), 1);
    }

    #[tokio::test]
    async fn test_json_body_replaces_content_type_override() {
        let (server, _store, client) = setup(Some(TOKEN)).await;
        mount_verify(&server, 200).await;
        Mock::given(method("POST"))
            .and(path("/api/missions"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 9})))
            .expect(1)
            .mount(&server)
            .await;

        let options = RequestOptions::new(Method::POST)
            .json_value(json!({"name": "Recon"}))
            .header("Content-Type", "text/plain")
            .unwrap();
        client.request("/missions", options).await.unwrap();

        let recorded = requests(&server).await;
        let types: Vec<_> = recorded[1]
            .headers
            .get_all("content-type")
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        assert_eq!(types, vec!["application/json".to_string()]);
    }

    #[tokio::test]
    async fn test_empty_success_body_is_null() {
        let (server, _store, client) = setup(Some(TOKEN)).await;
        mount_verify(&server, 200).await;
        Mock::given(method("DELETE"))
            .and(path("/api/missions/3"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let body = client
            .send(&RequestDescriptor::delete("/missions/3"))
            .await
            .unwrap();
        assert!(body.is_null());
    }

    // ── Derived operations ───────────────────────────────────────────────

    #[tokio::test]
    async fn test_fetch_roster_skips_verification() {
        let (server, _store, client) = setup(Some(TOKEN)).await;
        Mock::given(method("GET"))
            .and(path("/api/team-roster"))
            .and(header("Authorization", "Bearer tok-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": 1, "operator_handle": "ghost"},
                {"id": 2, "operator_handle": "wraith", "team_role": "ADMIN"}
            ])))
            .mount(&server)
            .await;

        let roster = client.fetch_roster().await.unwrap();
        assert_eq!(roster.len(), 2);
        assert_eq!(roster[1].handle(), Some("wraith"));
        assert!(roster[1].is_admin());
        assert_eq!(requests(&server).await.len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_roster_accepts_null_handle() {
        let (server, _store, client) = setup(Some(TOKEN)).await;
        Mock::given(method("GET"))
            .and(path("/api/team-roster"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": 1, "operator_handle": "ghost", "team_role": "OPERATOR", "avatar": null},
                {"id": 2, "operator_handle": null, "team_role": null, "avatar": null}
            ])))
            .mount(&server)
            .await;

        let roster = client.fetch_roster().await.unwrap();
        assert_eq!(roster.len(), 2);
        assert_eq!(roster[0].handle(), Some("ghost"));
        assert_eq!(roster[1].id, Some(2));
        assert_eq!(roster[1].handle(), None);
        assert!(!roster[1].is_admin());
    }

    #[tokio::test]
    async fn test_fetch_roster_401_clears_token() {
        let (server, store, client) = setup(Some(TOKEN)).await;
        Mock::given(path("/api/team-roster"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = client.fetch_roster().await.unwrap_err();
        assert!(matches!(err, ApiError::AuthExpired));
        assert_eq!(store.get(), None);
    }

    #[tokio::test]
    async fn test_derived_failure_messages() {
        let (server, _store, client) = setup(Some(TOKEN)).await;
        Mock::given(path("/api/team-roster"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(path("/api/jqr/items"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = client.fetch_roster().await.unwrap_err();
        assert_eq!(err.to_string(), "API request failed: Service Unavailable");

        let err = client.fetch_tracker_items().await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to fetch JQR items");
    }

    #[tokio::test]
    async fn test_upload_tracker_item() {
        let (server, _store, client) = setup(Some(TOKEN)).await;
        Mock::given(method("POST"))
            .and(path("/api/jqr/tracker"))
            .and(header("Authorization", "Bearer tok-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 4})))
            .expect(1)
            .mount(&server)
            .await;

        let form = MultipartForm::new()
            .text("item_id", "4")
            .file("file", "proof.pdf", "application/pdf", b"%PDF-1.4".to_vec());
        let body = uploads::upload_tracker_item(&client, &form).await.unwrap();
        assert_eq!(body, json!({"id": 4}));
        assert_eq!(requests(&server).await.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_image_is_rejected_locally() {
        let (server, _store, client) = setup(Some(TOKEN)).await;
        let file = uploads::ImageFile {
            file_name: "notes.txt".into(),
            mime: "text/plain".into(),
            data: b"hello".to_vec(),
        };

        let err = uploads::upload_image(&client, uploads::ImageKind::Avatar, &file)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidUpload(_)));
        assert!(requests(&server).await.is_empty());
    }

    #[tokio::test]
    async fn test_delete_avatar_is_verified() {
        let (server, _store, client) = setup(Some(TOKEN)).await;
        mount_verify(&server, 200).await;
        Mock::given(method("DELETE"))
            .and(path("/api/team-roster/me/avatar"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"deleted": true})))
            .expect(1)
            .mount(&server)
            .await;

        uploads::delete_image(&client, uploads::ImageKind::Avatar, None)
            .await
            .unwrap();

        let recorded = requests(&server).await;
        assert_eq!(recorded[0].url.path(), "/api/team-roster/me");
        assert_eq!(recorded[1].method.as_str(), "DELETE");
    }

    #[tokio::test]
    async fn test_fetch_image_bytes() {
        let (server, _store, client) = setup(Some(TOKEN)).await;
        Mock::given(method("GET"))
            .and(path("/uploads/ghost/me.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![137u8, 80, 78, 71]))
            .mount(&server)
            .await;

        let bytes = uploads::fetch_image(&client, "/uploads/ghost/me.png").await.unwrap();
        assert_eq!(bytes, vec![137u8, 80, 78, 71]);
    }

    // ── Session ──────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_login_stores_token() {
        let (server, store, client) = setup(None).await;
        Mock::given(method("POST"))
            .and(path("/api/team-roster/login"))
            .and(body_string("username=ghost&password=s3cret"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"access_token": "fresh", "token_type": "bearer"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/team-roster/me"))
            .and(header("Authorization", "Bearer fresh"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"id": 1, "operator_handle": "ghost"})),
            )
            .mount(&server)
            .await;

        let user = session::login(&client, "ghost", "s3cret").await.unwrap();
        assert_eq!(user.handle(), Some("ghost"));
        assert_eq!(store.get().as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn test_login_failure() {
        let (server, store, client) = setup(None).await;
        Mock::given(path("/api/team-roster/login"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = session::login(&client, "ghost", "wrong").await.unwrap_err();
        assert_eq!(err.to_string(), "Login failed");
        assert_eq!(store.get(), None);
    }

    #[tokio::test]
    async fn test_check_auth() {
        let (server, store, client) = setup(Some(TOKEN)).await;
        mount_verify(&server, 401).await;

        assert!(!session::check_auth(&client).await);
        assert_eq!(store.get(), None);

        // No token: no call at all
        assert!(!session::check_auth(&client).await);
        assert_eq!(requests(&server).await.len(), 1);

        store.set(TOKEN).unwrap();
        session::logout(&client);
        assert_eq!(store.get(), None);
    }
}
