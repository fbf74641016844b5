//! End-to-end dispatch through `Application::handle`, no sockets involved.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use http_body_util::BodyExt;
use serde::Deserialize;
use serde_json::{Value, json};
use teeth_rest::{
    Application, Component, Json, JsonEncoder, Location, Request, Response, RestError,
    SerializationView, Serializable, health,
};
use uuid::Uuid;

#[derive(Clone)]
struct Node {
    id: Uuid,
    name: String,
    secret: String,
}

impl Serializable for Node {
    fn serialize(&self, view: SerializationView) -> Value {
        json!({ "id": Serializable::serialize(&self.id, view), "name": self.name })
    }
}

#[derive(Deserialize)]
struct NewNode {
    name: String,
}

type Store = Arc<Mutex<BTreeMap<Uuid, Node>>>;

fn nodes(store: Store) -> Component {
    let (s1, s2, s3, s4) = (store.clone(), store.clone(), store.clone(), store);
    Component::new("nodes")
        .route(Method::GET, "/", "list", move |req: Request| {
            let store = s1.clone();
            async move { list_nodes(&store, &req) }
        })
        .route(Method::POST, "/", "create", move |req: Request| {
            let store = s2.clone();
            async move { create_node(&store, &req) }
        })
        .route(Method::GET, "/<uuid:id>", "get", move |req: Request| {
            let store = s3.clone();
            async move { get_node(&store, &req) }
        })
        .route(Method::DELETE, "/<uuid:id>", "delete", move |req: Request| {
            let store = s4.clone();
            async move { delete_node(&store, &req) }
        })
}

fn node_not_found(id: Uuid) -> RestError {
    RestError::custom(
        "NodeNotFoundError",
        StatusCode::NOT_FOUND,
        "Node not found",
        format!("No node with id {id}"),
    )
}

fn list_nodes(store: &Store, req: &Request) -> Result<Response, RestError> {
    let limit: usize = match req.query_param("limit") {
        Some(raw) => {
            raw.parse().map_err(|_| RestError::invalid_content("limit must be a number"))?
        }
        None => 2,
    };
    let marker = req.query_param("marker").and_then(|m| Uuid::parse_str(&m).ok());

    let store = store.lock().map_err(|_| anyhow::anyhow!("store poisoned"))?;
    let page: Vec<Node> = store
        .values()
        .filter(|n| marker.is_none_or(|m| n.id > m))
        .take(limit + 1)
        .cloned()
        .collect();
    let (items, next) = if page.len() > limit {
        let items = page[..limit].to_vec();
        let next = items.last().map(|n| n.id.to_string());
        (items, next)
    } else {
        (page, None)
    };
    Ok(Response::paginated(items, next))
}

fn create_node(store: &Store, req: &Request) -> Result<Response, RestError> {
    let new: NewNode = req.parse_content()?;
    if new.name.is_empty() {
        return Err(RestError::invalid_content("name must not be empty"));
    }
    let node = Node { id: Uuid::new_v4(), name: new.name, secret: "hunter2".into() };
    let id = node.id;
    store.lock().map_err(|_| anyhow::anyhow!("store poisoned"))?.insert(id, node);
    Ok(Response::created(Location::endpoint("nodes.get", [("id", id)])))
}

fn get_node(store: &Store, req: &Request) -> Result<Response, RestError> {
    let id = req.uuid("id").ok_or_else(RestError::not_found)?;
    let store = store.lock().map_err(|_| anyhow::anyhow!("store poisoned"))?;
    let node = store.get(&id).cloned().ok_or_else(|| node_not_found(id))?;
    Ok(Response::item(node))
}

fn delete_node(store: &Store, req: &Request) -> Result<Response, RestError> {
    let id = req.uuid("id").ok_or_else(RestError::not_found)?;
    let mut store = store.lock().map_err(|_| anyhow::anyhow!("store poisoned"))?;
    store.remove(&id).ok_or_else(|| node_not_found(id))?;
    Ok(Response::deleted())
}

async fn explode(_req: Request) -> Response {
    panic!("kaboom")
}

async fn database_down(_req: Request) -> Result<Response, RestError> {
    Err(anyhow::anyhow!("connection refused (os error 111)").into())
}

async fn broken_location(_req: Request) -> Response {
    Response::created(Location::endpoint("nodes.nope", [("id", "1")]))
}

async fn relative_location(_req: Request) -> Response {
    Response::created(Location::path("nodes/7"))
}

async fn unencodable(_req: Request) -> Response {
    Response::ok(Json(HashMap::from([((1, 2), "pair")])))
}

async fn put_label(req: Request) -> Response {
    let name = req.param("name").unwrap_or_default().to_owned();
    let location = Location::endpoint("labels.put", [("name", name.clone())]);
    Response::created_with(json!({ "name": name }), location)
}

async fn get_port(req: Request) -> Response {
    Response::ok(json!({ "index": req.int("n") }))
}

async fn get_file(req: Request) -> Response {
    Response::ok(json!({ "path": req.param("rest") }))
}

fn app() -> (Application, Store) {
    let store = Store::default();
    let faults = Component::new("faults")
        .get("/panic", "panic", explode)
        .get("/anyhow", "anyhow", database_down)
        .get("/location", "location", broken_location)
        .get("/relative", "relative", relative_location)
        .get("/unencodable", "unencodable", unencodable);
    let labels = Component::new("labels").put("/<name>", "put", put_label);
    let ports = Component::new("ports").get("/<int:n>", "get", get_port);
    let files = Component::new("files").get("/<path:rest>", "get", get_file);

    let app = Application::new()
        .with_encoder(JsonEncoder::new(SerializationView::Public))
        .mount("/", health::component())
        .unwrap()
        .mount("/v1/nodes", nodes(store.clone()))
        .unwrap()
        .mount("/faults", faults)
        .unwrap()
        .mount("/labels", labels)
        .unwrap()
        .mount("/v1/ports", ports)
        .unwrap()
        .mount("/files", files)
        .unwrap();
    (app, store)
}

struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: String,
}

impl Reply {
    fn json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap()
    }
}

async fn send(
    app: &Application,
    method: Method,
    uri: &str,
    content_type: Option<&str>,
    body: &str,
) -> Reply {
    let mut builder =
        http::Request::builder().method(method).uri(uri).header("host", "api.test");
    if let Some(ct) = content_type {
        builder = builder.header("content-type", ct);
    }
    let res = app.handle(builder.body(Bytes::from(body.to_owned())).unwrap()).await;
    let (parts, body) = res.into_parts();
    let bytes = body.collect().await.unwrap().to_bytes();
    let body = String::from_utf8(bytes.to_vec()).unwrap();
    Reply { status: parts.status, headers: parts.headers, body }
}

fn error_body(kind: &str, code: u16, message: &str, details: &str) -> Value {
    json!({ "type": kind, "code": code, "message": message, "details": details })
}

#[tokio::test]
async fn create_then_fetch_node() {
    let (app, _) = app();

    let body = r#"{"name":"n1"}"#;
    let created = send(&app, Method::POST, "/v1/nodes/", Some("application/json"), body).await;
    assert_eq!(created.status, StatusCode::CREATED);
    let location = created.headers["location"].to_str().unwrap().to_owned();
    let path = location.strip_prefix("http://api.test").expect("absolute location");
    assert!(path.starts_with("/v1/nodes/"));

    let fetched = send(&app, Method::GET, path, None, "").await;
    assert_eq!(fetched.status, StatusCode::OK);
    assert_eq!(fetched.headers["content-type"], "application/json");
    let body = fetched.json();
    assert_eq!(body["name"], "n1");
    assert!(body.get("secret").is_none());
    assert_eq!(format!("/v1/nodes/{}", body["id"].as_str().unwrap()), path);
}

#[tokio::test]
async fn uuid_in_any_form_reaches_the_same_node() {
    let (app, store) = app();
    let id = Uuid::new_v4();
    store.lock().unwrap().insert(id, Node { id, name: "n".into(), secret: String::new() });

    let simple = format!("/v1/nodes/{}", id.simple().to_string().to_uppercase());
    let reply = send(&app, Method::GET, &simple, None, "").await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.json()["id"], id.to_string());
}

#[tokio::test]
async fn unsupported_content_type_is_400() {
    let (app, _) = app();
    let content_type = Some("text/plain; charset=utf-8");
    let reply = send(&app, Method::POST, "/v1/nodes/", content_type, "n1").await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        reply.json(),
        error_body(
            "UnsupportedContentTypeError",
            400,
            "Unsupported Content-Type",
            r#"Content-Type "text/plain" is not supported"#
        )
    );
}

#[tokio::test]
async fn unparseable_body_is_400() {
    let (app, _) = app();
    let reply = send(&app, Method::POST, "/v1/nodes/", None, "{").await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    let body = reply.json();
    assert_eq!(body["type"], "InvalidContentError");
    assert_eq!(body["message"], "Invalid request body");
}

#[tokio::test]
async fn error_body_fields_are_in_order() {
    let (app, _) = app();
    let reply = send(&app, Method::POST, "/v1/nodes/", None, r#"{"name":""}"#).await;
    assert_eq!(
        reply.body,
        r#"{"type":"InvalidContentError","code":400,"message":"Invalid request body","details":"name must not be empty"}"#
    );
}

#[tokio::test]
async fn unknown_routes_are_404() {
    let (app, _) = app();
    let reply = send(&app, Method::GET, "/v2/anything", None, "").await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert_eq!(
        reply.json(),
        error_body("NotFound", 404, "Not found", "The requested resource could not be found.")
    );
}

#[tokio::test]
async fn malformed_uuid_does_not_match() {
    let (app, _) = app();
    let reply = send(&app, Method::GET, "/v1/nodes/not-a-uuid", None, "").await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert_eq!(reply.json()["type"], "NotFound");
}

#[tokio::test]
async fn missing_node_uses_handler_error() {
    let (app, _) = app();
    let id = Uuid::new_v4();
    let reply = send(&app, Method::DELETE, &format!("/v1/nodes/{id}"), None, "").await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert_eq!(
        reply.json(),
        error_body("NodeNotFoundError", 404, "Node not found", &format!("No node with id {id}"))
    );
}

#[tokio::test]
async fn wrong_method_is_405_with_allow() {
    let (app, _) = app();
    let reply = send(&app, Method::PUT, "/v1/nodes/", None, "{}").await;
    assert_eq!(reply.status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(reply.headers["allow"], "GET, HEAD, POST");
    assert_eq!(reply.json()["type"], "MethodNotAllowed");
}

#[tokio::test]
async fn delete_is_204_and_empty() {
    let (app, store) = app();
    let id = Uuid::new_v4();
    store.lock().unwrap().insert(id, Node { id, name: "n".into(), secret: String::new() });

    let reply = send(&app, Method::DELETE, &format!("/v1/nodes/{id}"), None, "").await;
    assert_eq!(reply.status, StatusCode::NO_CONTENT);
    assert!(reply.body.is_empty());
    assert!(store.lock().unwrap().is_empty());
}

#[tokio::test]
async fn listing_pages_through_markers() {
    let (app, store) = app();
    for name in ["a", "b", "c"] {
        let id = Uuid::new_v4();
        store.lock().unwrap().insert(id, Node { id, name: name.into(), secret: String::new() });
    }

    let first = send(&app, Method::GET, "/v1/nodes/?limit=2", None, "").await.json();
    assert_eq!(first["items"].as_array().unwrap().len(), 2);
    let next = first["links"][0]["href"].as_str().unwrap().to_owned();
    assert_eq!(first["links"][0]["rel"], "next");
    assert!(next.starts_with("http://api.test/v1/nodes/?limit=2&marker="));

    let next = next.strip_prefix("http://api.test").unwrap();
    let second = send(&app, Method::GET, next, None, "").await.json();
    assert_eq!(second["items"].as_array().unwrap().len(), 1);
    assert_eq!(second["links"], json!([]));
}

#[tokio::test]
async fn panics_are_masked_as_500() {
    let (app, _) = app();
    let reply = send(&app, Method::GET, "/faults/panic", None, "").await;
    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        reply.json(),
        error_body(
            "RESTError",
            500,
            "An error occurred",
            "An unexpected error occurred. Please try back later."
        )
    );
}

#[tokio::test]
async fn unexpected_errors_do_not_leak() {
    let (app, _) = app();
    let reply = send(&app, Method::GET, "/faults/anyhow", None, "").await;
    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(reply.json()["type"], "RESTError");
    assert!(!reply.body.contains("refused"));
}

#[tokio::test]
async fn unresolvable_location_is_500() {
    let (app, _) = app();
    let reply = send(&app, Method::GET, "/faults/location", None, "").await;
    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(reply.json()["type"], "RESTError");
}

#[tokio::test]
async fn health_probes_answer() {
    let (app, _) = app();
    let liveness = send(&app, Method::GET, "/healthz", None, "").await;
    assert_eq!(liveness.json(), json!({ "status": "ok" }));
    let readiness = send(&app, Method::GET, "/readyz", None, "").await;
    assert_eq!(readiness.json(), json!({ "status": "ready" }));
}

#[tokio::test]
async fn default_encoder_pretty_prints() {
    let app = Application::new().mount("/", health::component()).unwrap();
    let reply = send(&app, Method::GET, "/healthz", None, "").await;
    assert_eq!(reply.body, "{\n    \"status\": \"ok\"\n}\n");
}

#[tokio::test]
async fn unencodable_body_is_500() {
    let (app, _) = app();
    let reply = send(&app, Method::GET, "/faults/unencodable", None, "").await;
    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(reply.json()["type"], "RESTError");
}

#[tokio::test]
async fn relative_location_is_rooted_at_the_host() {
    let (app, _) = app();
    let reply = send(&app, Method::GET, "/faults/relative", None, "").await;
    assert_eq!(reply.status, StatusCode::CREATED);
    assert_eq!(reply.headers["location"], "http://api.test/nodes/7");
}

#[tokio::test]
async fn path_parameters_are_decoded_and_locations_encoded() {
    let (app, _) = app();
    let reply = send(&app, Method::PUT, "/labels/rack%201%3Fa%23b", None, "").await;
    assert_eq!(reply.status, StatusCode::CREATED);
    assert_eq!(reply.json(), json!({ "name": "rack 1?a#b" }));
    assert_eq!(reply.headers["location"], "http://api.test/labels/rack%201%3Fa%23b");
}

#[tokio::test]
async fn int_parameters_route_and_convert() {
    let (app, _) = app();
    let reply = send(&app, Method::GET, "/v1/ports/0042", None, "").await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.json(), json!({ "index": 42 }));

    let reply = send(&app, Method::GET, "/v1/ports/forty-two", None, "").await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn path_parameters_take_the_rest_of_the_path() {
    let (app, _) = app();
    let reply = send(&app, Method::GET, "/files/etc/teeth/app%20config.json", None, "").await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.json(), json!({ "path": "etc/teeth/app config.json" }));
}

#[tokio::test]
async fn head_is_served_by_the_get_route() {
    let (app, _) = app();
    let reply = send(&app, Method::HEAD, "/healthz", None, "").await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.headers["content-type"], "application/json");

    let reply = send(&app, Method::HEAD, "/labels/x", None, "").await;
    assert_eq!(reply.status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(reply.headers["allow"], "PUT");
}

#[test]
fn url_for_builds_mounted_paths() {
    let (app, _) = app();
    let id = Uuid::nil();
    assert_eq!(
        app.url_for("nodes.get", [("id", id)]).unwrap(),
        "/v1/nodes/00000000-0000-0000-0000-000000000000"
    );
    assert_eq!(app.url_for("health.liveness", Vec::<(String, String)>::new()).unwrap(), "/healthz");
    assert!(app.url_for("nodes.get", Vec::<(String, String)>::new()).is_err());
}
