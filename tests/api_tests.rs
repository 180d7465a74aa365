use bucketgate_cli::{AppState, BackendKind, GatewayConfig, routes};
use reqwest::{Client, StatusCode, multipart};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

// Helper to spawn a memory-backed server on a random port
async fn spawn_server() -> String {
    spawn_server_with(|_| {}).await
}

async fn spawn_server_with(configure: impl FnOnce(&mut GatewayConfig)) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let base_url = format!("http://{}", addr);

    let mut config = GatewayConfig {
        host: "127.0.0.1".to_string(),
        port: addr.port(),
        public_url: Some(base_url.clone()),
        backend: BackendKind::Memory,
        retry_base_delay_ms: 1,
        retry_max_delay_ms: 10,
        ..Default::default()
    };
    configure(&mut config);

    let state = Arc::new(AppState::new(config).await.unwrap());
    let app = routes::create_router(state);

    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .unwrap();
    });

    base_url
}

async fn create_bucket(client: &Client, base_url: &str, name: &str) -> Value {
    let res = client
        .post(format!("{}/buckets?name={}", base_url, name))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    res.json().await.unwrap()
}

async fn upload(client: &Client, base_url: &str, bucket: &str, folder: &str, filename: &str, body: &'static str) {
    let part = multipart::Part::text(body).file_name(filename.to_string());
    let form = multipart::Form::new().part("file", part);
    let res = client
        .post(format!("{}/buckets/{}/objects?folder={}", base_url, bucket, folder))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_health() {
    let base_url = spawn_server().await;
    let res = Client::new().get(format!("{}/health", base_url)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn test_bucket_lifecycle() {
    let base_url = spawn_server().await;
    let client = Client::new();
    let bucket_name = "lifecycle-bucket";

    // 1. List buckets (should be empty)
    let res = client.get(format!("{}/buckets", base_url)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let buckets: Value = res.json().await.unwrap();
    assert_eq!(buckets.as_array().unwrap().len(), 0);

    // 2. Create bucket
    let body = create_bucket(&client, &base_url, bucket_name).await;
    assert_eq!(body["bucket"], bucket_name);
    assert_eq!(body["status"], "created");

    // 3. Creating it again is not an error
    let body = create_bucket(&client, &base_url, bucket_name).await;
    assert_eq!(body["status"], "already_exists");

    // 4. List buckets (should contain it)
    let buckets: Value = client
        .get(format!("{}/buckets", base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(buckets[0]["name"], bucket_name);

    // 5. Delete bucket
    let res = client
        .delete(format!("{}/buckets/{}", base_url, bucket_name))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "deleted");

    // 6. Deleting a missing bucket succeeds
    let res = client
        .delete(format!("{}/buckets/{}", base_url, bucket_name))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_create_bucket_validation() {
    let base_url = spawn_server().await;
    let client = Client::new();

    let res = client.post(format!("{}/buckets", base_url)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["code"], "InvalidRequest");

    let res = client
        .post(format!("{}/buckets?name=Bad_Bucket", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["code"], "InvalidBucketName");

    // Alias used by older clients
    let res = client
        .post(format!("{}/buckets?bucketName=alias-bucket", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_upload_and_list_with_share_links() {
    let base_url = spawn_server().await;
    let client = Client::new();
    let bucket = "docs";

    create_bucket(&client, &base_url, bucket).await;

    // Empty folder is flagged as empty
    let res = client
        .get(format!("{}/buckets/{}/objects?folder=reports", base_url, bucket))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let listing: Value = res.json().await.unwrap();
    assert_eq!(listing["empty"], true);
    assert_eq!(listing["items"].as_array().unwrap().len(), 0);

    upload(&client, &base_url, bucket, "reports", "q1.txt", "first quarter").await;
    upload(&client, &base_url, bucket, "reports", "q2.txt", "second quarter").await;
    upload(&client, &base_url, bucket, "archive", "old.txt", "old").await;

    let res = client
        .get(format!("{}/buckets/{}/objects?folderName=reports", base_url, bucket))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let listing: Value = res.json().await.unwrap();
    assert_eq!(listing["bucket"], bucket);
    assert_eq!(listing["folder"], "reports");
    assert_eq!(listing["empty"], false);

    let items = listing["items"].as_array().unwrap();
    let names: Vec<&str> = items.iter().map(|i| i["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["reports/q1.txt", "reports/q2.txt"]);
    for item in items {
        let url = item["url"].as_str().unwrap();
        assert!(url.starts_with(&format!("{}/share/docs/reports/", base_url)));
        assert!(url.contains("signature="));
        assert!(item["expires_at"].is_string());
    }
    assert!(listing.get("failures").is_none());
}

#[tokio::test]
async fn test_share_link_serves_object() {
    let base_url = spawn_server().await;
    let client = Client::new();

    create_bucket(&client, &base_url, "shared").await;
    upload(&client, &base_url, "shared", "photos", "cat.txt", "meow").await;

    let listing: Value = client
        .get(format!("{}/buckets/shared/objects?folder=photos", base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let url = listing["items"][0]["url"].as_str().unwrap().to_string();

    let res = client.get(&url).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "meow");

    // Tampered signature
    let tampered = format!("{}0", url);
    let res = client.get(&tampered).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["code"], "InvalidSignature");

    // Expired link
    let res = client
        .get(format!("{}/share/shared/photos/cat.txt?expires=1&signature=00", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["code"], "LinkExpired");
}

#[tokio::test]
async fn test_object_download_and_delete() {
    let base_url = spawn_server().await;
    let client = Client::new();

    create_bucket(&client, &base_url, "files").await;
    upload(&client, &base_url, "files", "notes", "todo.txt", "buy milk").await;

    let res = client
        .get(format!("{}/buckets/files/download/notes/todo.txt", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "buy milk");

    let res = client
        .delete(format!("{}/buckets/files/objects/notes/todo.txt", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["key"], "notes/todo.txt");
    assert_eq!(body["status"], "deleted");

    // Deleting again is still a success
    let res = client
        .delete(format!("{}/buckets/files/objects/notes/todo.txt", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .get(format!("{}/buckets/files/download/notes/todo.txt", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["code"], "NoSuchKey");
}

#[tokio::test]
async fn test_missing_bucket_errors() {
    let base_url = spawn_server().await;
    let client = Client::new();

    let res = client
        .get(format!("{}/buckets/ghost/objects", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let request_id = res
        .headers()
        .get("x-request-id")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["code"], "NoSuchBucket");
    assert_eq!(body["request_id"], request_id.as_str());

    let res = client
        .delete(format!("{}/buckets/ghost/objects/a.txt", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let part = multipart::Part::text("data").file_name("a.txt");
    let res = client
        .post(format!("{}/buckets/ghost/objects", base_url))
        .multipart(multipart::Form::new().part("file", part))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_upload_requires_file_field() {
    let base_url = spawn_server().await;
    let client = Client::new();

    create_bucket(&client, &base_url, "uploads").await;

    let form = multipart::Form::new().text("note", "no file here");
    let res = client
        .post(format!("{}/buckets/uploads/objects", base_url))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["code"], "InvalidRequest");
}

#[tokio::test]
async fn test_request_id_header() {
    let base_url = spawn_server().await;
    let res = Client::new().get(format!("{}/health", base_url)).send().await.unwrap();
    let id = res.headers().get("x-request-id").unwrap().to_str().unwrap();
    assert_eq!(id.len(), 36);
}

#[tokio::test]
async fn test_rate_limit_ignores_spoofed_forwarded_for() {
    let base_url = spawn_server_with(|config| config.rate_limit_rps = 1).await;
    let client = Client::new();

    let mut statuses = Vec::new();
    for i in 0..5 {
        let res = client
            .get(format!("{}/health", base_url))
            .header("x-forwarded-for", format!("198.51.100.{}", i))
            .send()
            .await
            .unwrap();
        statuses.push(res.status());
    }

    assert_eq!(statuses[0], StatusCode::OK);
    assert!(statuses[1..].contains(&StatusCode::TOO_MANY_REQUESTS));
}

#[tokio::test]
async fn test_rate_limit_trusts_proxy_when_enabled() {
    let base_url = spawn_server_with(|config| {
        config.rate_limit_rps = 1;
        config.trust_proxy = true;
    })
    .await;
    let client = Client::new();

    for i in 0..3 {
        let res = client
            .get(format!("{}/health", base_url))
            .header("x-forwarded-for", format!("198.51.100.{}", i))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }
}
