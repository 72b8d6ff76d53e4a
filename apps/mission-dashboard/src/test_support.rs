use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::geo::FeatureCollection;
use crate::map::geolocation::Alerter;

#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub method: Method,
    pub path: String,
    pub csrf_header: Option<String>,
    pub cookie_header: Option<String>,
    pub body: String,
}

impl SeenRequest {
    pub fn json(&self) -> JsonValue {
        serde_json::from_str(&self.body).expect("request body is JSON")
    }
}

#[derive(Debug, Clone)]
struct ScriptedResponse {
    status: StatusCode,
    body: String,
    content_type: &'static str,
    set_cookie: Option<String>,
}

/// In-process HTTP backend answering canned responses per `(method, path)`
/// and recording every request it sees. Unknown routes answer 404.
#[derive(Clone, Default)]
pub struct ScriptedBackend {
    routes: Arc<Mutex<HashMap<(Method, String), ScriptedResponse>>>,
    seen: Arc<Mutex<Vec<SeenRequest>>>,
}

impl ScriptedBackend {
    pub fn respond_json(self, method: Method, path: &str, status: StatusCode, body: JsonValue) -> Self {
        self.insert(
            method,
            path,
            ScriptedResponse {
                status,
                body: body.to_string(),
                content_type: "application/json",
                set_cookie: None,
            },
        )
    }

    pub fn respond_raw(self, method: Method, path: &str, status: StatusCode, body: &str) -> Self {
        self.insert(
            method,
            path,
            ScriptedResponse {
                status,
                body: body.to_string(),
                content_type: "text/html",
                set_cookie: None,
            },
        )
    }

    /// Like `respond_json`, also setting a cookie on the response.
    pub fn respond_json_with_cookie(
        self,
        method: Method,
        path: &str,
        status: StatusCode,
        body: JsonValue,
        cookie: &str,
    ) -> Self {
        self.insert(
            method,
            path,
            ScriptedResponse {
                status,
                body: body.to_string(),
                content_type: "application/json",
                set_cookie: Some(cookie.to_string()),
            },
        )
    }

    fn insert(self, method: Method, path: &str, response: ScriptedResponse) -> Self {
        self.routes
            .lock()
            .expect("routes lock")
            .insert((method, path.to_string()), response);
        self
    }

    pub async fn spawn(&self) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind scripted backend");
        let addr = listener.local_addr().expect("local addr");
        let app = Router::new().fallback(dispatch).with_state(self.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });
        format!("http://{addr}")
    }

    pub fn requests(&self) -> Vec<SeenRequest> {
        self.seen.lock().expect("seen lock").clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<SeenRequest> {
        self.requests()
            .into_iter()
            .filter(|request| request.path == path)
            .collect()
    }
}

async fn dispatch(
    State(backend): State<ScriptedBackend>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> Response {
    let header_value = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    };
    backend.seen.lock().expect("seen lock").push(SeenRequest {
        method: method.clone(),
        path: uri.path().to_string(),
        csrf_header: header_value("x-csrftoken"),
        cookie_header: header_value("cookie"),
        body,
    });

    let scripted = backend
        .routes
        .lock()
        .expect("routes lock")
        .get(&(method, uri.path().to_string()))
        .cloned();
    let Some(scripted) = scripted else {
        return (StatusCode::NOT_FOUND, json!({"error": "not found"}).to_string()).into_response();
    };

    let mut response = Response::new(Body::from(scripted.body));
    *response.status_mut() = scripted.status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(scripted.content_type),
    );
    if let Some(cookie) = scripted.set_cookie {
        response.headers_mut().insert(
            header::SET_COOKIE,
            HeaderValue::from_str(&cookie).expect("cookie header"),
        );
    }
    response
}

/// Origin that refuses connections: a port that was bound and released.
pub fn unreachable_origin() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    format!("http://{addr}")
}

/// One Point at (10, 20) and one Polygon with vertices (0,0), (0,30), (40,0).
pub fn sample_missions() -> JsonValue {
    json!({
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "geometry": {"type": "Point", "coordinates": [10.0, 20.0]},
                "properties": {"name": "Buoy <7>", "depth": 42}
            },
            {
                "type": "Feature",
                "geometry": {"type": "Polygon", "coordinates": [[[0.0, 0.0], [0.0, 30.0], [40.0, 0.0], [0.0, 0.0]]]},
                "properties": {"name": "Survey block", "depth": 120}
            }
        ]
    })
}

pub fn sample_collection() -> FeatureCollection {
    serde_json::from_value(sample_missions()).expect("sample collection")
}

/// Alerter that remembers every message instead of showing it.
#[derive(Debug, Default)]
pub struct RecordingAlerter {
    messages: Mutex<Vec<String>>,
}

impl RecordingAlerter {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().expect("alerts lock").clone()
    }
}

impl Alerter for RecordingAlerter {
    fn alert(&self, message: &str) {
        self.messages
            .lock()
            .expect("alerts lock")
            .push(message.to_string());
    }
}
