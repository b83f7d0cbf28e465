//! 测试公共模块
//! 提供内存后端、假上传器与测试配置

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use secrecy::{ExposeSecret, Secret};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use wfh_client::{
    api::{HttpMethod, HttpRequest, HttpResponse, HttpTransport},
    auth::{MemoryTokenStore, TokenStore},
    config::{
        ApiConfig, AttendanceConfig, ClientConfig, LoggingConfig, SessionConfig, SummaryConfig,
        UploadConfig,
    },
    error::{ClientError, Result},
    services::{ImageUploader, PhotoFile, UploadedImage},
    WfhClient,
};

pub const BASE_URL: &str = "http://backend.test/api";
pub const VALID_TOKEN: &str = "token-abc-123";
pub const PASSWORD: &str = "secret";

/// 创建测试配置
pub fn create_test_config() -> ClientConfig {
    ClientConfig {
        api: ApiConfig {
            base_url: BASE_URL.to_string(),
            timeout_secs: 5,
        },
        upload: UploadConfig {
            cloud_name: Some("demo".to_string()),
            upload_preset: Some(Secret::new("unsigned".to_string())),
            folder: "employee-photos".to_string(),
            endpoint: "http://images.test/v1_1".to_string(),
        },
        session: SessionConfig { token_path: None },
        attendance: AttendanceConfig {
            poll_interval_secs: 30,
        },
        summary: SummaryConfig {
            page_size: 10,
            stale_secs: 30,
        },
        logging: LoggingConfig {
            level: "debug".to_string(),
            format: "compact".to_string(),
        },
    }
}

/// 后端收到的一次请求
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: HttpMethod,
    pub path: String,
    pub query: Option<String>,
    pub bearer: Option<String>,
    pub body: Option<Value>,
}

/// 预置的一次性响应，优先于正常处理
#[derive(Debug, Clone)]
pub enum Reply {
    Json(u16, Value),
    Raw(u16, &'static str),
    NetworkError,
}

/// 后端数据
#[derive(Debug, Clone)]
pub struct BackendState {
    pub valid_token: String,
    pub today: NaiveDate,
    pub today_record: Option<Value>,
    pub history: Vec<Value>,
    pub profile: Value,
    pub password: String,
    pub next_id: u64,
}

/// 内存中的假后端，实现 HttpTransport
pub struct FakeBackend {
    pub state: Mutex<BackendState>,
    calls: Mutex<Vec<RecordedCall>>,
    replies: Mutex<VecDeque<Reply>>,
    delay: Mutex<Option<Duration>>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(BackendState {
                valid_token: VALID_TOKEN.to_string(),
                today: Utc::now().date_naive(),
                today_record: None,
                history: Vec::new(),
                profile: json!({
                    "name": "Siti Rahma",
                    "email": "siti@corp.test",
                    "position": "Engineer",
                    "phone": "0811000",
                    "photo_url": null
                }),
                password: PASSWORD.to_string(),
                next_id: 1000,
            }),
            calls: Mutex::new(Vec::new()),
            replies: Mutex::new(VecDeque::new()),
            delay: Mutex::new(None),
        })
    }

    /// 生成 n 条历史记录（按日期倒序，从昨天开始）
    pub fn with_history(self: Arc<Self>, n: usize) -> Arc<Self> {
        {
            let mut state = self.state.lock().unwrap();
            let today = state.today;
            state.history = (1..=n)
                .map(|i| {
                    let date = today - ChronoDuration::days(i as i64);
                    json!({
                        "id": i,
                        "date": date.format("%Y-%m-%d").to_string(),
                        "check_in": format!("{}T01:00:00Z", date.format("%Y-%m-%d")),
                        "check_out": format!("{}T09:00:00Z", date.format("%Y-%m-%d")),
                    })
                })
                .collect();
        }
        self
    }

    pub fn push_reply(&self, reply: Reply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_to(&self, method: HttpMethod, path: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.method == method && c.path == path)
            .count()
    }

    pub fn reset_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// 将今日记录直接置为已打卡
    pub fn set_checked_in(&self) {
        let mut state = self.state.lock().unwrap();
        let date = state.today.format("%Y-%m-%d").to_string();
        state.today_record = Some(json!({
            "id": 999,
            "date": date,
            "check_in": Utc::now().to_rfc3339(),
            "check_out": null
        }));
    }

    fn handle(&self, call: &RecordedCall) -> (u16, Value) {
        let mut state = self.state.lock().unwrap();

        if call.path == "/auth/login" {
            let body = call.body.clone().unwrap_or(Value::Null);
            let email = body["email"].as_str().unwrap_or_default();
            let password = body["password"].as_str().unwrap_or_default();
            if email == state.profile["email"].as_str().unwrap_or_default()
                && password == state.password
            {
                return ok(json!({ "access_token": state.valid_token }));
            }
            return fail(401, "Invalid email or password");
        }

        if call.bearer.as_deref() != Some(state.valid_token.as_str()) {
            return fail(401, "Unauthorized");
        }

        match (call.method, call.path.as_str()) {
            (HttpMethod::Get, "/staff/attendance/today") => {
                let (can_in, can_out) = match &state.today_record {
                    None => (true, false),
                    Some(r) => (false, r["check_out"].is_null()),
                };
                ok(json!({
                    "attendance": state.today_record,
                    "can_check_in": can_in,
                    "can_check_out": can_out,
                }))
            }
            (HttpMethod::Post, "/staff/attendance/check-in") => {
                if state.today_record.is_some() {
                    return fail(400, "Already checked in today");
                }
                state.next_id += 1;
                let record = json!({
                    "id": state.next_id,
                    "date": state.today.format("%Y-%m-%d").to_string(),
                    "check_in": Utc::now().to_rfc3339(),
                    "check_out": null,
                });
                state.today_record = Some(record.clone());
                ok(record)
            }
            (HttpMethod::Post, "/staff/attendance/check-out") => {
                let Some(record) = state.today_record.as_mut() else {
                    return fail(400, "You have not checked in today");
                };
                if !record["check_out"].is_null() {
                    return fail(400, "Already checked out today");
                }
                record["check_out"] = json!(Utc::now().to_rfc3339());
                ok(record.clone())
            }
            (HttpMethod::Get, "/staff/attendance/summary") => summary(&state, call),
            (HttpMethod::Get, "/staff/profile") => ok(state.profile.clone()),
            (HttpMethod::Patch, "/staff/profile") => {
                let body = call.body.clone().unwrap_or(Value::Null);
                for field in ["phone", "photo_url"] {
                    if let Some(value) = body.get(field) {
                        state.profile[field] = value.clone();
                    }
                }
                if let Some(password) = body.get("password").and_then(Value::as_str) {
                    state.password = password.to_string();
                }
                ok(Value::Null)
            }
            _ => fail(404, "Not found"),
        }
    }
}

fn ok(data: Value) -> (u16, Value) {
    (200, json!({ "success": true, "message": "OK", "data": data }))
}

fn fail(status: u16, message: &str) -> (u16, Value) {
    (status, json!({ "success": false, "message": message, "data": null }))
}

fn summary(state: &BackendState, call: &RecordedCall) -> (u16, Value) {
    let params: Vec<(String, String)> = call
        .query
        .as_deref()
        .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default();
    let param = |name: &str| {
        params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
    };

    let page: usize = param("page").and_then(|p| p.parse().ok()).unwrap_or(1);
    let limit: usize = param("limit").and_then(|p| p.parse().ok()).unwrap_or(10);
    let start = param("start_date").unwrap_or_default();
    let end = param("end_date").unwrap_or_else(|| "9999-12-31".to_string());

    let mut records: Vec<Value> = state.history.clone();
    if let Some(today) = &state.today_record {
        records.insert(0, today.clone());
    }
    let filtered: Vec<Value> = records
        .into_iter()
        .filter(|r| {
            let date = r["date"].as_str().unwrap_or_default();
            date >= start.as_str() && date <= end.as_str()
        })
        .collect();

    let total = filtered.len();
    let total_pages = total.div_ceil(limit);
    let items: Vec<Value> = filtered
        .into_iter()
        .skip((page - 1) * limit)
        .take(limit)
        .collect();

    (
        200,
        json!({
            "success": true,
            "message": "OK",
            "data": items,
            "meta": { "total": total, "page": page, "limit": limit, "total_pages": total_pages }
        }),
    )
}

#[async_trait]
impl HttpTransport for FakeBackend {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let url = url::Url::parse(&request.url).map_err(|e| ClientError::Network(e.to_string()))?;
        let path = url
            .path()
            .strip_prefix("/api")
            .unwrap_or(url.path())
            .to_string();
        let call = RecordedCall {
            method: request.method,
            path,
            query: url.query().map(str::to_string),
            bearer: request.bearer.as_ref().map(|t| t.expose_secret().clone()),
            body: request.body.clone(),
        };
        self.calls.lock().unwrap().push(call.clone());

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let reply = self.replies.lock().unwrap().pop_front();
        let (status, body) = match reply {
            Some(Reply::NetworkError) => {
                return Err(ClientError::Network("connection reset".to_string()))
            }
            Some(Reply::Raw(status, body)) => {
                return Ok(HttpResponse {
                    status,
                    body: body.as_bytes().to_vec(),
                })
            }
            Some(Reply::Json(status, body)) => (status, body),
            None => self.handle(&call),
        };

        Ok(HttpResponse {
            status,
            body: serde_json::to_vec(&body).unwrap(),
        })
    }
}

/// 假上传器
pub struct FakeUploader {
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
}

impl FakeUploader {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
        })
    }

    pub fn failing() -> Arc<Self> {
        let uploader = Self::new();
        uploader.fail.store(true, Ordering::SeqCst);
        uploader
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageUploader for FakeUploader {
    async fn upload(&self, photo: &PhotoFile) -> Result<UploadedImage> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail.load(Ordering::SeqCst) {
            return Err(ClientError::upload("Upload failed with status 500"));
        }
        Ok(UploadedImage {
            secure_url: format!("https://images.test/employee-photos/{}-{}", n, photo.file_name),
            public_id: Some(format!("employee-photos/{}", n)),
        })
    }
}

pub fn test_photo() -> PhotoFile {
    PhotoFile::new("avatar.png", "image/png", vec![0x89, 0x50, 0x4e, 0x47])
}

/// 测试装配结果
pub struct TestClient {
    pub client: WfhClient,
    pub backend: Arc<FakeBackend>,
    pub store: Arc<MemoryTokenStore>,
    pub uploader: Arc<FakeUploader>,
}

/// 以给定后端与上传器装配客户端，令牌预先登录（可选）
pub async fn build_client(
    backend: Arc<FakeBackend>,
    uploader: Arc<FakeUploader>,
    logged_in: bool,
) -> TestClient {
    let store = Arc::new(if logged_in {
        MemoryTokenStore::with_token(VALID_TOKEN)
    } else {
        MemoryTokenStore::new()
    });
    let token_store: Arc<dyn TokenStore> = store.clone();
    let client = WfhClient::with_parts(
        create_test_config(),
        token_store,
        backend.clone(),
        uploader.clone(),
    );
    client.restore().await.expect("Failed to restore session");

    TestClient {
        client,
        backend,
        store,
        uploader,
    }
}

/// 已登录的默认客户端
pub async fn logged_in_client() -> TestClient {
    build_client(FakeBackend::new(), FakeUploader::new(), true).await
}

/// axum 模拟后端收到的请求头
#[derive(Debug, Clone, Default)]
pub struct SeenHeaders {
    pub authorization: Option<String>,
    pub request_id: Option<String>,
    pub content_type: Option<String>,
}

#[derive(Clone, Default)]
struct MockServerState {
    checked_in: Arc<Mutex<bool>>,
    seen: Arc<Mutex<Vec<SeenHeaders>>>,
}

/// 通过真实 HTTP 访问的模拟后端
pub struct MockServer {
    pub base_url: String,
    state: MockServerState,
}

impl MockServer {
    pub fn seen(&self) -> Vec<SeenHeaders> {
        self.state.seen.lock().unwrap().clone()
    }
}

fn header(headers: &axum::http::HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// 在 127.0.0.1 随机端口启动模拟后端（含图床上传接口）
pub async fn spawn_mock_server() -> MockServer {
    use axum::{
        extract::State,
        http::{HeaderMap, StatusCode},
        routing::{get, post},
        Json, Router,
    };

    type Response = (StatusCode, Json<Value>);

    fn authorized(state: &MockServerState, headers: &HeaderMap) -> bool {
        state.seen.lock().unwrap().push(SeenHeaders {
            authorization: header(headers, "authorization"),
            request_id: header(headers, "x-request-id"),
            content_type: header(headers, "content-type"),
        });
        header(headers, "authorization") == Some(format!("Bearer {}", VALID_TOKEN))
    }

    fn unauthorized() -> Response {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"success": false, "message": "Unauthorized", "data": null})),
        )
    }

    async fn login(Json(body): Json<Value>) -> Response {
        if body["password"] == PASSWORD {
            (
                StatusCode::OK,
                Json(json!({"success": true, "message": "OK", "data": {"access_token": VALID_TOKEN}})),
            )
        } else {
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({"success": false, "message": "Invalid email or password", "data": null})),
            )
        }
    }

    async fn today(State(state): State<MockServerState>, headers: HeaderMap) -> Response {
        if !authorized(&state, &headers) {
            return unauthorized();
        }
        let checked_in = *state.checked_in.lock().unwrap();
        let attendance = checked_in.then(|| {
            json!({"id": 7, "date": Utc::now().format("%Y-%m-%d").to_string(), "check_in": "2024-01-02 08:00:00"})
        });
        (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "message": "OK",
                "data": {"attendance": attendance, "can_check_in": !checked_in, "can_check_out": checked_in}
            })),
        )
    }

    async fn check_in(State(state): State<MockServerState>, headers: HeaderMap) -> Response {
        if !authorized(&state, &headers) {
            return unauthorized();
        }
        let mut checked_in = state.checked_in.lock().unwrap();
        if *checked_in {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"success": false, "message": "Already checked in today", "data": null})),
            );
        }
        *checked_in = true;
        (
            StatusCode::CREATED,
            Json(json!({
                "success": true,
                "message": "Checked in",
                "data": {"id": 7, "date": Utc::now().format("%Y-%m-%d").to_string(), "check_in": Utc::now().to_rfc3339()}
            })),
        )
    }

    async fn upload(headers: HeaderMap, body: axum::body::Bytes) -> Response {
        let is_multipart = header(&headers, "content-type")
            .is_some_and(|ct| ct.starts_with("multipart/form-data"));
        let text = String::from_utf8_lossy(&body);
        if !is_multipart || !text.contains("unsigned") || !text.contains("employee-photos") {
            return (StatusCode::BAD_REQUEST, Json(json!({"error": {"message": "bad upload"}})));
        }
        (
            StatusCode::OK,
            Json(json!({"secure_url": "https://images.test/employee-photos/me.png", "public_id": "employee-photos/me"})),
        )
    }

    let state = MockServerState::default();
    let app = Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/staff/attendance/today", get(today))
        .route("/api/staff/attendance/check-in", post(check_in))
        .route("/upload/demo/image/upload", post(upload))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind mock server");
    let addr = listener.local_addr().expect("Failed to read local address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Mock server failed");
    });

    MockServer {
        base_url: format!("http://{}", addr),
        state,
    }
}
