mod common;

use std::time::{Duration, Instant};

use reqwest::StatusCode;

use braincheck::db;
use braincheck::db::predictions::PredictionPatch;

async fn predict(
    app: &common::TestApp,
    token: &str,
    fields: &[(&str, &str)],
) -> (serde_json::Value, StatusCode) {
    app.upload(
        "/api/v1/predictions",
        token,
        "scan.jpg",
        "image/jpeg",
        common::jpeg_bytes(),
        fields,
    )
    .await
}

// ── Create ──────────────────────────────────────────────────────

#[tokio::test]
async fn prediction_from_jpeg() {
    let app = common::spawn_app().await;
    let token = app.doctor("doc@clinic.test").await;
    let patient = app.create_patient(&token, "Anna Smirnova").await;
    let patient_id = patient["id"].as_str().unwrap();

    let (body, status) = predict(
        &app,
        &token,
        &[("patient_id", patient_id), ("notes", "follow-up scan")],
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["confidence"], 0.82);
    assert_eq!(body["has_tumor"], true);
    assert_eq!(body["notes"], "follow-up scan");
    assert_eq!(body["patient"]["full_name"], "Anna Smirnova");
    assert_eq!(body["owner"]["email"], "doc@clinic.test");
    assert!(body["segmentation_mask"].is_null());

    let image_id = body["image_id"].as_str().unwrap();
    let (image, status) = app.get_auth(&format!("/api/v1/images/{image_id}"), &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(image["content_type"], "image/jpeg");
    assert_eq!(image["filename"], "scan.jpg");

    let id = body["id"].as_str().unwrap();
    let (read, status) = app.get_auth(&format!("/api/v1/predictions/{id}"), &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(read["conclusions"], body["conclusions"]);

    common::cleanup(app).await;
}

#[tokio::test]
async fn prediction_without_patient() {
    let app = common::spawn_app().await;
    let token = app.doctor("doc@clinic.test").await;

    let (body, status) = predict(&app, &token, &[]).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert!(body["patient_id"].is_null());
    assert!(body["patient"].is_null());

    common::cleanup(app).await;
}

#[tokio::test]
async fn non_image_upload_changes_nothing() {
    let app = common::spawn_app().await;
    let token = app.doctor("doc@clinic.test").await;

    let (_, status) = app
        .upload(
            "/api/v1/predictions",
            &token,
            "scan.txt",
            "text/plain",
            b"patient notes".to_vec(),
            &[],
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(app.count("images").await, 0);
    assert_eq!(app.count("predictions").await, 0);

    common::cleanup(app).await;
}

#[tokio::test]
async fn unknown_patient_is_not_found() {
    let app = common::spawn_app().await;
    let token = app.doctor("doc@clinic.test").await;
    let missing = uuid::Uuid::new_v4().to_string();

    let (_, status) = predict(&app, &token, &[("patient_id", &missing)]).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(app.count("images").await, 0);

    let (_, status) = predict(&app, &token, &[("patient_id", "not-a-uuid")]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    common::cleanup(app).await;
}

#[tokio::test]
async fn malformed_reply_keeps_image_but_no_prediction() {
    let app = common::spawn_app().await;
    let token = app.doctor("doc@clinic.test").await;
    app.vision.reply_with("I am unable to analyze this image.");

    let (_, status) = predict(&app, &token, &[]).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(db::images::count(&app.pool).await.unwrap(), 1);
    assert_eq!(db::predictions::count(&app.pool).await.unwrap(), 0);

    common::cleanup(app).await;
}

#[tokio::test]
async fn slow_analysis_times_out_and_keeps_image() {
    let app = common::spawn_app_with_analysis_timeout(Duration::from_secs(1)).await;
    let token = app.doctor("doc@clinic.test").await;
    app.vision.delay_by(Duration::from_secs(3));

    let started = Instant::now();
    let (body, status) = predict(&app, &token, &[]).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR, "{body}");
    assert_eq!(body["error"], "Image analysis failed");
    assert!(started.elapsed() < Duration::from_secs(3));

    assert_eq!(db::images::count(&app.pool).await.unwrap(), 1);
    assert_eq!(db::predictions::count(&app.pool).await.unwrap(), 0);

    common::cleanup(app).await;
}

#[tokio::test]
async fn out_of_range_confidence_is_rejected() {
    let app = common::spawn_app().await;
    let token = app.doctor("doc@clinic.test").await;
    app.vision.reply_with(
        r#"{"description":"d","conclusions":"c","recommendations":"r","medical_context":"m","confidence":1.5,"has_tumor":false}"#,
    );

    let (_, status) = predict(&app, &token, &[]).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(app.count("predictions").await, 0);

    common::cleanup(app).await;
}

#[tokio::test]
async fn vision_failure_is_server_error() {
    let app = common::spawn_app().await;
    let token = app.doctor("doc@clinic.test").await;
    app.vision.fail_with("upstream returned 502");

    let (body, status) = predict(&app, &token, &[]).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!body.to_string().contains("502"), "{body}");

    common::cleanup(app).await;
}

#[tokio::test]
async fn referenced_rows_cannot_be_deleted() {
    let app = common::spawn_app().await;
    let token = app.doctor("doc@clinic.test").await;
    let patient = app.create_patient(&token, "Boris Orlov").await;
    let patient_id = patient["id"].as_str().unwrap();

    let (body, _) = predict(&app, &token, &[("patient_id", patient_id)]).await;
    let image_id = body["image_id"].as_str().unwrap();

    let (_, status) = app
        .delete_auth(&format!("/api/v1/patients/{patient_id}"), &token)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (_, status) = app.delete_auth(&format!("/api/v1/images/{image_id}"), &token).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let id = body["id"].as_str().unwrap();
    let (_, status) = app.delete_auth(&format!("/api/v1/predictions/{id}"), &token).await;
    assert_eq!(status, StatusCode::OK);

    let (_, status) = app
        .delete_auth(&format!("/api/v1/patients/{patient_id}"), &token)
        .await;
    assert_eq!(status, StatusCode::OK);

    common::cleanup(app).await;
}

// ── Ownership ───────────────────────────────────────────────────

#[tokio::test]
async fn doctors_only_see_their_own_predictions() {
    let app = common::spawn_app().await;
    let admin = app.superuser().await;
    let alice = app.doctor("alice@clinic.test").await;
    let bob = app.doctor("bob@clinic.test").await;

    let (alice_pred, _) = predict(&app, &alice, &[]).await;
    predict(&app, &bob, &[]).await;
    predict(&app, &bob, &[]).await;

    let (body, _) = app.get_auth("/api/v1/predictions", &alice).await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["items"][0]["id"], alice_pred["id"]);

    let (body, _) = app.get_auth("/api/v1/predictions", &bob).await;
    assert_eq!(body["total"], 2);

    let (body, _) = app.get_auth("/api/v1/predictions", &admin).await;
    assert_eq!(body["total"], 3);

    let alice_owner = alice_pred["owner_id"].as_str().unwrap();
    let (body, _) = app
        .get_auth(&format!("/api/v1/predictions?owner_id={alice_owner}"), &admin)
        .await;
    assert_eq!(body["total"], 1);

    let (_, status) = app
        .get_auth(&format!("/api/v1/predictions?owner_id={alice_owner}"), &bob)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let path = format!("/api/v1/predictions/{}", alice_pred["id"].as_str().unwrap());
    let (_, status) = app.get_auth(&path, &bob).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (_, status) = app.delete_auth(&path, &bob).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (_, status) = app.get_auth(&path, &admin).await;
    assert_eq!(status, StatusCode::OK);

    common::cleanup(app).await;
}

// ── Listing filters ─────────────────────────────────────────────

#[tokio::test]
async fn listing_filters_and_order() {
    let app = common::spawn_app().await;
    let token = app.doctor("doc@clinic.test").await;
    let patient = app.create_patient(&token, "Anton Ivanov").await;
    let patient_id = patient["id"].as_str().unwrap();

    let (first, _) = predict(&app, &token, &[("patient_id", patient_id)]).await;
    app.vision.reply_with(
        r#"{"description":"d","conclusions":"c","recommendations":"r","medical_context":"m","confidence":0.1,"has_tumor":false}"#,
    );
    let (second, _) = predict(&app, &token, &[]).await;

    let (body, _) = app.get_auth("/api/v1/predictions", &token).await;
    assert_eq!(body["total"], 2);
    assert_eq!(body["items"][0]["id"], second["id"]);
    assert_eq!(body["items"][1]["id"], first["id"]);

    let (body, _) = app.get_auth("/api/v1/predictions?has_tumor=true", &token).await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["items"][0]["id"], first["id"]);

    let (body, _) = app
        .get_auth(&format!("/api/v1/predictions?patient_id={patient_id}"), &token)
        .await;
    assert_eq!(body["total"], 1);

    let today = chrono::Utc::now().date_naive().to_string();
    let (body, status) = app
        .get_auth(
            &format!("/api/v1/predictions?created_from={today}&created_to={today}"),
            &token,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);

    let (body, _) = app
        .get_auth("/api/v1/predictions?created_to=2000-01-01", &token)
        .await;
    assert_eq!(body["total"], 0);

    common::cleanup(app).await;
}

#[tokio::test]
async fn invalid_date_range_is_bad_request() {
    let app = common::spawn_app().await;
    let token = app.doctor("doc@clinic.test").await;

    let (_, status) = app
        .get_auth(
            "/api/v1/predictions?created_from=2024-03-02&created_to=2024-03-01",
            &token,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, status) = app
        .get_auth("/api/v1/predictions?created_from=last-week", &token)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    common::cleanup(app).await;
}

// ── Repository ──────────────────────────────────────────────────

#[tokio::test]
async fn repository_update_patches_fields() {
    let app = common::spawn_app().await;
    let token = app.doctor("doc@clinic.test").await;
    let (body, _) = predict(&app, &token, &[("notes", "initial")]).await;
    let id: uuid::Uuid = body["id"].as_str().unwrap().parse().unwrap();

    let updated = db::predictions::update(
        &app.pool,
        id,
        &PredictionPatch {
            conclusions: Some("Revised after review".to_string()),
            confidence: Some(0.5),
            ..Default::default()
        },
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(updated.conclusions, "Revised after review");
    assert_eq!(updated.confidence, 0.5);
    assert_eq!(updated.notes.as_deref(), Some("initial"));
    assert!(updated.has_tumor);
    assert!(updated.updated_at > updated.created_at);

    let cleared = db::predictions::update(
        &app.pool,
        id,
        &PredictionPatch {
            notes: Some(None),
            ..Default::default()
        },
    )
    .await
    .unwrap()
    .unwrap();
    assert!(cleared.notes.is_none());
    assert_eq!(cleared.conclusions, "Revised after review");

    let missing = db::predictions::update(&app.pool, uuid::Uuid::new_v4(), &PredictionPatch::default())
        .await
        .unwrap();
    assert!(missing.is_none());

    assert_eq!(db::predictions::count(&app.pool).await.unwrap(), 1);

    common::cleanup(app).await;
}
