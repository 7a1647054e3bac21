use bytes::Bytes;
use devportal_client::api::models::{CredentialRequest, CredentialType};
use devportal_client::{DevPortalApi, HttpTransport, Identity, Role, SessionStore, SessionedClient};
use mockito::{Matcher, Server, ServerGuard};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const CREDS: &str = "/api/envs/e1/projects/p1/credentials";

fn admin_api(server: &ServerGuard) -> DevPortalApi {
    let transport = HttpTransport::new(server.url(), Duration::from_secs(5)).expect("http client");
    let store = SessionStore::with_identity(Identity {
        email: "admin@example.com".into(),
        role: Role::Admin,
    });
    DevPortalApi::new(SessionedClient::new(Arc::new(transport), store))
}

fn request(key: &str, value: &str) -> CredentialRequest {
    CredentialRequest {
        key: key.into(),
        value: value.into(),
        credential_type: Some(CredentialType::Secret),
        description: None,
    }
}

#[tokio::test]
async fn create_posts_the_credential_body() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", CREDS)
        .match_header("content-type", Matcher::Regex("application/json".into()))
        .match_body(Matcher::Json(json!({"key": "DB_URL", "value": "postgres://db", "type": "SECRET"})))
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id":"c1","projectId":"p1","key":"DB_URL","value":"****","type":"SECRET"}"#)
        .expect(1)
        .create_async()
        .await;

    let created = admin_api(&server)
        .create_credential("e1", "p1", &request("DB_URL", "postgres://db"))
        .await
        .unwrap()
        .expect("created credential");

    assert_eq!(created.id, "c1");
    assert_eq!(created.credential_type, Some(CredentialType::Secret));
    mock.assert_async().await;
}

#[tokio::test]
async fn update_puts_to_the_credential_path() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("PUT", format!("{CREDS}/c1").as_str())
        .match_body(Matcher::Json(json!({"key": "DB_URL", "value": "rotated", "type": "SECRET"})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id":"c1","projectId":"p1","key":"DB_URL","value":"****","type":"SECRET"}"#)
        .expect(1)
        .create_async()
        .await;

    let updated = admin_api(&server)
        .update_credential("e1", "p1", "c1", &request("DB_URL", "rotated"))
        .await
        .unwrap();

    assert_eq!(updated.map(|c| c.id).as_deref(), Some("c1"));
    mock.assert_async().await;
}

#[tokio::test]
async fn delete_accepts_no_content() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("DELETE", format!("{CREDS}/c1").as_str())
        .with_status(204)
        .expect(1)
        .create_async()
        .await;

    admin_api(&server).delete_credential("e1", "p1", "c1").await.unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn reveal_returns_the_plain_value() {
    let mut server = Server::new_async().await;
    let _reveal = server
        .mock("GET", format!("{CREDS}/c1/reveal").as_str())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id":"c1","projectId":"p1","key":"DB_URL","value":"postgres://db"}"#)
        .create_async()
        .await;
    let _empty = server
        .mock("GET", format!("{CREDS}/c2/reveal").as_str())
        .with_status(204)
        .create_async()
        .await;

    let api = admin_api(&server);
    let revealed = api.reveal_credential("e1", "p1", "c1").await.unwrap().expect("credential");
    assert_eq!(revealed.value, "postgres://db");

    assert!(api.reveal_credential("e1", "p1", "c2").await.unwrap().is_none());
}

#[tokio::test]
async fn import_uploads_csv_as_multipart() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", format!("{CREDS}/import").as_str())
        .match_header("content-type", Matcher::Regex("^multipart/form-data; boundary=".into()))
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex(r#"name="file"; filename="creds.csv""#.into()),
            Matcher::Regex("(?i)content-type: text/csv".into()),
            Matcher::Regex("DB_URL,postgres://db".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body("4")
        .expect(1)
        .create_async()
        .await;

    let csv = Bytes::from_static(b"key,value\nDB_URL,postgres://db\nA,1\nB,2\nC,3\n");
    let imported = admin_api(&server)
        .import_credentials("e1", "p1", "creds.csv", csv)
        .await
        .unwrap();

    assert_eq!(imported, 4);
    mock.assert_async().await;
}

#[tokio::test]
async fn admin_listings_decode() {
    let mut server = Server::new_async().await;
    let _users = server
        .mock("GET", "/api/admin/users")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!([
                {"id": "u1", "name": "Ada", "email": "ada@example.com", "role": "ADMIN", "active": true},
                {"id": "u2", "name": "Bob", "email": "bob@example.com", "role": "DEVELOPER", "active": false}
            ])
            .to_string(),
        )
        .create_async()
        .await;
    let _logs = server
        .mock("GET", "/api/admin/audit-logs")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!([{
                "id": "a1",
                "action": "REVEAL",
                "credentialKey": "DB_URL",
                "createdAt": "2024-05-01T10:00:00Z",
                "user": {"email": "ada@example.com"}
            }])
            .to_string(),
        )
        .create_async()
        .await;

    let api = admin_api(&server);
    let users = api.users().await.unwrap();
    assert_eq!(users.len(), 2);
    assert_eq!(users[0].role, Role::Admin);
    assert!(!users[1].active);

    let logs = api.audit_logs().await.unwrap();
    assert_eq!(logs[0].credential_key.as_deref(), Some("DB_URL"));
    assert_eq!(logs[0].user.as_ref().and_then(|u| u.email.as_deref()), Some("ada@example.com"));
}
