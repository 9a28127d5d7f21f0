#![allow(dead_code)]

use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use braincheck::analysis::{VisionAnalyzer, VisionModel};
use braincheck::auth::password;
use braincheck::config::{AnalysisConfig, Config};
use braincheck::db;
use braincheck::db::users::NewUser;
use braincheck::email::{EmailTemplate, Mailer};

pub const PASSWORD: &str = "password123";

/// The flat structured reply a well-behaved model returns.
pub const TUMOR_REPLY: &str = r#"```json
{
  "description": "Axial T1 slice with a hyperintense lesion",
  "conclusions": "Findings consistent with a mass in the left temporal lobe",
  "recommendations": "Contrast-enhanced MRI and neurosurgical consult",
  "medical_context": "Space-occupying lesion",
  "confidence": 0.82,
  "has_tumor": true,
}
```"#;

/// A vision model whose reply the test controls.
#[derive(Clone)]
pub struct ScriptedVision {
    reply: Arc<Mutex<Result<String, String>>>,
    delay: Arc<Mutex<Option<Duration>>>,
}

impl ScriptedVision {
    pub fn new() -> Self {
        Self {
            reply: Arc::new(Mutex::new(Ok(TUMOR_REPLY.to_string()))),
            delay: Arc::new(Mutex::new(None)),
        }
    }

    /// Sleep this long before replying.
    pub fn delay_by(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn reply_with(&self, text: &str) {
        *self.reply.lock().unwrap() = Ok(text.to_string());
    }

    pub fn fail_with(&self, error: &str) {
        *self.reply.lock().unwrap() = Err(error.to_string());
    }
}

#[async_trait]
impl VisionModel for ScriptedVision {
    async fn complete(&self, _prompt: &str, _image: &[u8], _ct: &str) -> Result<String, String> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.reply.lock().unwrap().clone()
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

#[derive(Debug, Clone)]
pub struct SentEmail {
    pub to: String,
    pub template: EmailTemplate,
    pub vars: Vec<(String, String)>,
}

impl SentEmail {
    /// The `token` query parameter of the first link in the email.
    pub fn token(&self) -> String {
        self.vars
            .iter()
            .find_map(|(_, v)| v.split_once("token=").map(|(_, t)| t.to_string()))
            .expect("email carries no token link")
    }
}

/// Records every email instead of sending it.
#[derive(Clone, Default)]
pub struct RecordingMailer {
    pub sent: Arc<Mutex<Vec<SentEmail>>>,
}

impl RecordingMailer {
    pub fn last_to(&self, to: &str) -> Option<SentEmail> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|m| m.to == to)
            .cloned()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(
        &self,
        to: &str,
        template: EmailTemplate,
        vars: &[(&str, &str)],
    ) -> Result<(), String> {
        self.sent.lock().unwrap().push(SentEmail {
            to: to.to_string(),
            template,
            vars: vars
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        });
        Ok(())
    }
}

/// A running test server instance with a dedicated test database.
pub struct TestApp {
    pub addr: std::net::SocketAddr,
    pub pool: PgPool,
    pub client: Client,
    pub db_name: String,
    pub vision: ScriptedVision,
    pub mailer: RecordingMailer,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn into_pair(resp: reqwest::Response) -> (Value, StatusCode) {
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    pub async fn register(&self, email: &str, password: &str) -> (Value, StatusCode) {
        let resp = self
            .client
            .post(self.url("/api/v1/auth/register"))
            .json(&json!({ "email": email, "password": password, "full_name": "Test User" }))
            .send()
            .await
            .expect("register request failed");
        Self::into_pair(resp).await
    }

    /// OAuth2-style password login.
    pub async fn login(&self, email: &str, password: &str) -> (Value, StatusCode) {
        let resp = self
            .client
            .post(self.url("/api/v1/auth/login"))
            .form(&[("username", email), ("password", password), ("grant_type", "password")])
            .send()
            .await
            .expect("login request failed");
        Self::into_pair(resp).await
    }

    pub async fn token_for(&self, email: &str, password: &str) -> String {
        let (body, status) = self.login(email, password).await;
        assert_eq!(status, StatusCode::OK, "login failed: {body}");
        body["access_token"].as_str().unwrap().to_string()
    }

    /// Insert a user directly and return an access token for it.
    pub async fn create_user(&self, email: &str, is_active: bool, is_superuser: bool) -> String {
        let hash = password::hash(PASSWORD).unwrap();
        db::users::create(
            &self.pool,
            &NewUser {
                email,
                password_hash: Some(&hash),
                full_name: Some("Seeded User"),
                is_active,
                is_superuser,
            },
        )
        .await
        .expect("seed user failed");
        self.token_for(email, PASSWORD).await
    }

    pub async fn superuser(&self) -> String {
        self.create_user("admin@clinic.test", true, true).await
    }

    pub async fn doctor(&self, email: &str) -> String {
        self.create_user(email, true, false).await
    }

    pub async fn get_auth(&self, path: &str, token: &str) -> (Value, StatusCode) {
        let resp = self
            .client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .expect("get request failed");
        Self::into_pair(resp).await
    }

    pub async fn post_auth(&self, path: &str, token: &str, body: &Value) -> (Value, StatusCode) {
        let resp = self
            .client
            .post(self.url(path))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .expect("post request failed");
        Self::into_pair(resp).await
    }

    pub async fn post_json(&self, path: &str, body: &Value) -> (Value, StatusCode) {
        let resp = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .expect("post request failed");
        Self::into_pair(resp).await
    }

    pub async fn put_auth(&self, path: &str, token: &str, body: &Value) -> (Value, StatusCode) {
        let resp = self
            .client
            .put(self.url(path))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .expect("put request failed");
        Self::into_pair(resp).await
    }

    pub async fn delete_auth(&self, path: &str, token: &str) -> (Value, StatusCode) {
        let resp = self
            .client
            .delete(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .expect("delete request failed");
        Self::into_pair(resp).await
    }

    /// POST a multipart body with a `file` part and extra text fields.
    pub async fn upload(
        &self,
        path: &str,
        token: &str,
        filename: &str,
        content_type: &str,
        data: Vec<u8>,
        fields: &[(&str, &str)],
    ) -> (Value, StatusCode) {
        let part = Part::bytes(data)
            .file_name(filename.to_string())
            .mime_str(content_type)
            .unwrap();
        let mut form = Form::new().part("file", part);
        for (name, value) in fields {
            form = form.text(name.to_string(), value.to_string());
        }

        let resp = self
            .client
            .post(self.url(path))
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await
            .expect("upload request failed");
        Self::into_pair(resp).await
    }

    pub async fn create_patient(&self, token: &str, full_name: &str) -> Value {
        let (body, status) = self
            .post_auth(
                "/api/v1/patients",
                token,
                &json!({ "full_name": full_name, "birth_date": "1980-01-15" }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create patient failed: {body}");
        body
    }

    pub async fn count(&self, table: &str) -> i64 {
        sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&self.pool)
            .await
            .unwrap()
    }
}

/// A small valid JPEG.
pub fn jpeg_bytes() -> Vec<u8> {
    let img = image::RgbImage::from_fn(16, 16, |x, y| image::Rgb([(x * 16) as u8, (y * 16) as u8, 128]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Jpeg).unwrap();
    out.into_inner()
}

fn admin_url(base_url: &str) -> String {
    base_url
        .rsplit_once('/')
        .map(|(base, _)| format!("{base}/postgres"))
        .unwrap_or_else(|| base_url.to_string())
}

/// Spawn a test app with a fresh temporary database.
pub async fn spawn_app() -> TestApp {
    spawn_app_with_analysis_timeout(Duration::from_secs(5)).await
}

/// Like `spawn_app`, with the given bound on each analysis call.
pub async fn spawn_app_with_analysis_timeout(analysis_timeout: Duration) -> TestApp {
    let _ = dotenvy::dotenv();

    let base_url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set for tests");

    let db_name = format!("braincheck_test_{}", Uuid::now_v7().to_string().replace('-', ""));

    let admin_pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&admin_url(&base_url))
        .await
        .expect("Failed to connect to postgres for test DB creation");

    sqlx::query(&format!("CREATE DATABASE \"{db_name}\""))
        .execute(&admin_pool)
        .await
        .expect("Failed to create test database");

    admin_pool.close().await;

    let test_url = base_url
        .rsplit_once('/')
        .map(|(base, _)| format!("{base}/{db_name}"))
        .unwrap_or_else(|| base_url.clone());

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&test_url)
        .await
        .expect("Failed to connect to test database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations on test database");

    let config = Config {
        database_url: test_url,
        jwt_secret: "test-jwt-secret-that-is-long-enough".to_string(),
        host: "127.0.0.1".parse().unwrap(),
        port: 0,
        base_url: "http://localhost:0".to_string(),
        max_upload_size: 10 * 1024 * 1024,
        allowed_origins: vec!["http://localhost:3000".to_string()],
        access_token_ttl: Duration::from_secs(60 * 60),
        log_level: "warn".to_string(),
        analysis: AnalysisConfig {
            api_url: "http://127.0.0.1:9".to_string(),
            api_key: String::new(),
            model: "scripted".to_string(),
            timeout: analysis_timeout,
            http_referer: None,
            x_title: None,
        },
        smtp: None,
        first_superuser: None,
    };

    let vision = ScriptedVision::new();
    let mailer = RecordingMailer::default();

    let app = braincheck::build_app(
        pool.clone(),
        config,
        Arc::new(VisionAnalyzer::new(vision.clone())),
        Some(Arc::new(mailer.clone())),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind to random port");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Server failed");
    });

    let client = Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap();

    TestApp {
        addr,
        pool,
        client,
        db_name,
        vision,
        mailer,
    }
}

/// Drop the test database after tests complete.
pub async fn cleanup(app: TestApp) {
    let db_name = app.db_name.clone();
    app.pool.close().await;

    let base_url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set for tests");

    let admin_pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&admin_url(&base_url))
        .await
        .expect("Failed to connect for cleanup");

    let _ = sqlx::query(&format!("DROP DATABASE IF EXISTS \"{db_name}\" WITH (FORCE)"))
        .execute(&admin_pool)
        .await;

    admin_pool.close().await;
}
