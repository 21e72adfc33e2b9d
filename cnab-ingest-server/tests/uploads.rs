mod common;

use cnab_ingest_entity::sea_orm_active_enums::FileUploadStatus;
use common::{cnab_line, spawn_server, test_db, test_settings, upload_form};
use pretty_assertions::assert_eq;
use serde_json::Value;

#[tokio::test]
#[ignore = "needs postgres and an s3-compatible object store"]
async fn upload_then_list_then_get_round_trip() {
    let db = test_db("cnab_ingest_server_upload_round_trip").await;
    let (settings, base) = test_settings(&db, |settings| {
        settings.object_store.create_bucket = true;
        settings.ingest.synchronous_processing = true;
        settings.ingest.checkpoint_interval = 1;
    });
    spawn_server(settings, &base).await;

    let contents = format!(
        "{}\n{}\n",
        cnab_line(1, 10_000, "11111111111"),
        cnab_line(2, 5_000, "22222222222"),
    );

    let client = reqwest::Client::new();
    let response = client
        .post(base.join("/api/v1/transactions/upload").unwrap())
        .multipart(upload_form("statement.txt", contents))
        .send()
        .await
        .expect("upload request failed");

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["transaction_count"], 2);
    assert_eq!(body["failed_line_count"], 0);
    assert_eq!(body["skipped_line_count"], 0);
    assert_eq!(body["upload"]["status"], "success");

    let upload_id = body["upload"]["id"].as_str().unwrap().to_string();

    let list: Value = client
        .get(base.join("/api/v1/transactions/uploads").unwrap())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list["total_items"], 1);
    assert_eq!(list["items"][0]["id"], upload_id);

    let fetched: Value = client
        .get(
            base.join(&format!("/api/v1/transactions/uploads/{upload_id}"))
                .unwrap(),
        )
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(fetched["id"], upload_id);
    assert_eq!(fetched["processed_line_count"], 2);
    assert_eq!(fetched["status"], serde_json::to_value(FileUploadStatus::Success).unwrap());
}

#[tokio::test]
#[ignore = "needs postgres and an s3-compatible object store"]
async fn upload_missing_file_field_is_rejected() {
    let db = test_db("cnab_ingest_server_upload_missing_field").await;
    let (settings, base) = test_settings(&db, |_| {});
    spawn_server(settings, &base).await;

    let form = reqwest::multipart::Form::new().text("not_file", "irrelevant");
    let response = reqwest::Client::new()
        .post(base.join("/api/v1/transactions/upload").unwrap())
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    let problem: Value = response.json().await.unwrap();
    assert_eq!(problem["status"], 400);
}

#[tokio::test]
#[ignore = "needs postgres and an s3-compatible object store"]
async fn upload_with_wrong_extension_is_rejected_as_unsupported_media_type() {
    let db = test_db("cnab_ingest_server_upload_bad_extension").await;
    let (settings, base) = test_settings(&db, |_| {});
    spawn_server(settings, &base).await;

    let response = reqwest::Client::new()
        .post(base.join("/api/v1/transactions/upload").unwrap())
        .multipart(upload_form("statement.csv", cnab_line(1, 100, "11111111111")))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::UNSUPPORTED_MEDIA_TYPE);
}
