use serde_json::{Value, json};
use taxii2_feed::Taxii2FeedClient;
use taxii2_feed::commands::{reset_fetch_command, run_fetch_cycle};
use taxii2_feed::config::ClientConfig;
use taxii2_feed::storage::{ContextStore, JsonFileStore, JsonLinesSink};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const COLLECTION: &str = "91a7b528-80eb-42ed-a74d-c6fbd5a26116";

async fn mount_api_root(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api1/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"title": "API Root"})))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api1/collections/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "collections": [{"id": COLLECTION, "title": "Indicators", "can_read": true}]
        })))
        .mount(server)
        .await;
}

fn objects_path() -> String {
    format!("/api1/collections/{}/objects/", COLLECTION)
}

async fn client(server: &MockServer) -> Taxii2FeedClient {
    let mut config = ClientConfig::new(format!("{}/api1/", server.uri()));
    config.feed_tags = vec!["partner".into()];
    config.tlp_color = Some("AMBER".into());
    let mut client = Taxii2FeedClient::new(config).unwrap();
    client.initialise().await.unwrap();
    client
}

#[tokio::test]
async fn cycle_writes_indicators_and_resumes_from_cursor() {
    let server = MockServer::start().await;
    mount_api_root(&server).await;

    Mock::given(method("GET"))
        .and(path(objects_path()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "more": false,
            "objects": [
                {
                    "type": "indicator",
                    "id": "indicator--a",
                    "created": "2024-01-02T00:00:00.000Z",
                    "modified": "2024-01-02T00:00:00.000Z",
                    "labels": ["malicious-activity"],
                    "pattern": "[domain-name:value = 'Bad.Example'] OR [ipv4-addr:value = '203.0.113.9']",
                },
                {
                    "type": "indicator",
                    "id": "indicator--b",
                    "created": "2024-01-03T08:00:00.000Z",
                    "pattern": "[url:value = 'https://Phish.Example/login']",
                },
            ],
        })))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(objects_path()))
        .and(query_param("added_after", "2024-01-03T08:00:00.000Z"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"more": false, "objects": []})))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStore::new(dir.path().join("context.json"));
    let out = dir.path().join("indicators.jsonl");
    let sink = JsonLinesSink::file(&out);
    let client = client(&server).await;

    let created = run_fetch_cycle(&client, &store, &sink, "24 hours", -1)
        .await
        .unwrap();
    assert_eq!(created, 3);
    assert_eq!(
        store.load().await.unwrap().get(COLLECTION),
        Some("2024-01-03T08:00:00.000Z")
    );

    let lines: Vec<Value> = std::fs::read_to_string(&out)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0]["value"], "bad.example");
    assert_eq!(lines[0]["type"], "Domain");
    assert_eq!(lines[0]["rawJSON"]["id"], "indicator--a");
    assert_eq!(lines[0]["fields"]["tags"], json!(["malicious-activity", "partner"]));
    assert_eq!(lines[0]["fields"]["trafficlightprotocol"], "AMBER");
    assert_eq!(lines[1]["value"], "203.0.113.9");
    assert_eq!(lines[1]["type"], "IP");
    assert_eq!(lines[2]["value"], "https://phish.example/login");
    assert_eq!(lines[2]["type"], "URL");

    // Nothing new: the cursor is kept and nothing is written
    let created = run_fetch_cycle(&client, &store, &sink, "24 hours", -1)
        .await
        .unwrap();
    assert_eq!(created, 0);
    assert_eq!(
        store.load().await.unwrap().get(COLLECTION),
        Some("2024-01-03T08:00:00.000Z")
    );
    assert_eq!(std::fs::read_to_string(&out).unwrap().lines().count(), 3);
}

#[tokio::test]
async fn cycle_after_reset_starts_every_collection_from_the_initial_interval() {
    const OTHER: &str = "52892447-4d7e-4f70-b94d-d7f22742ff63";
    const INITIAL: &str = "2024-01-01T00:00:00.000000Z";

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api1/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"title": "API Root"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api1/collections/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "collections": [
                {"id": COLLECTION, "title": "Indicators", "can_read": true},
                {"id": OTHER, "title": "Other", "can_read": true},
            ]
        })))
        .mount(&server)
        .await;
    for id in [COLLECTION, OTHER] {
        Mock::given(method("GET"))
            .and(path(format!("/api1/collections/{}/objects/", id)))
            .and(query_param("added_after", INITIAL))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"more": false, "objects": []})),
            )
            .expect(1)
            .mount(&server)
            .await;
    }

    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStore::new(dir.path().join("context.json"));
    store
        .save(
            &[
                (COLLECTION, "2024-03-01T00:00:00.000Z"),
                (OTHER, "2024-03-02T00:00:00.000Z"),
            ]
            .into_iter()
            .collect(),
        )
        .await
        .unwrap();

    let output = reset_fetch_command(&store).await.unwrap();
    assert!(output.readable().starts_with("Fetch was reset successfully"));
    assert!(store.load().await.unwrap().is_empty());

    let sink = JsonLinesSink::file(dir.path().join("indicators.jsonl"));
    let client = client(&server).await;
    let created = run_fetch_cycle(&client, &store, &sink, "2024-01-01T00:00:00Z", -1)
        .await
        .unwrap();

    assert_eq!(created, 0);
    let cursor = store.load().await.unwrap();
    assert_eq!(cursor.get(COLLECTION), Some(INITIAL));
    assert_eq!(cursor.get(OTHER), Some(INITIAL));
}
