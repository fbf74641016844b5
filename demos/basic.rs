//! A small in-memory node registry on teeth-rest.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic
//!
//! Try:
//!   curl -i -X POST http://localhost:3000/v1/nodes/ \
//!        -H 'content-type: application/json' -d '{"name":"rack-1"}'
//!   curl http://localhost:3000/v1/nodes/
//!   curl http://localhost:3000/v1/nodes/<id>
//!   curl -X DELETE http://localhost:3000/v1/nodes/<id>
//!   curl http://localhost:3000/healthz
//!
//! The listen address comes from `TEETH_REST_ADDR` (default `0.0.0.0:3000`).

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::Deserialize;
use serde_json::{Value, json};
use teeth_rest::{
    Application, Component, Location, Request, Response, RestError, SerializationView, Serializable,
    Server, health,
};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Clone)]
struct Node {
    id: Uuid,
    name: String,
}

impl Serializable for Node {
    fn serialize(&self, view: SerializationView) -> Value {
        json!({ "id": self.id.serialize(view), "name": self.name })
    }
}

#[derive(Deserialize)]
struct NewNode {
    name: String,
}

type Registry = Arc<RwLock<HashMap<Uuid, Node>>>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let addr = std::env::var("TEETH_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_owned());
    let registry = Registry::default();

    let app = Application::new()
        .mount("/", health::component())?
        .mount("/v1/nodes", nodes(registry))?;

    Server::bind(&addr)?.serve(app).await?;
    Ok(())
}

fn nodes(registry: Registry) -> Component {
    let (list, create) = (registry.clone(), registry.clone());
    let (get, delete) = (registry.clone(), registry);
    Component::new("nodes")
        .get("/", "list", move |_req: Request| {
            let registry = list.clone();
            async move {
                let nodes = registry.read().map_err(|_| anyhow::anyhow!("registry poisoned"))?;
                Ok::<_, RestError>(Response::paginated(nodes.values().cloned().collect(), None))
            }
        })
        .post("/", "create", move |req: Request| {
            let registry = create.clone();
            async move {
                let new: NewNode = req.parse_content()?;
                let node = Node { id: Uuid::new_v4(), name: new.name };
                let id = node.id;
                let mut nodes = registry.write().map_err(|_| anyhow::anyhow!("registry poisoned"))?;
                nodes.insert(id, node);
                Ok::<_, RestError>(Response::created(Location::endpoint("nodes.get", [("id", id)])))
            }
        })
        .get("/<uuid:id>", "get", move |req: Request| {
            let registry = get.clone();
            async move {
                let id = req.uuid("id").ok_or_else(RestError::not_found)?;
                let nodes = registry.read().map_err(|_| anyhow::anyhow!("registry poisoned"))?;
                let node = nodes.get(&id).cloned().ok_or_else(RestError::not_found)?;
                Ok::<_, RestError>(Response::item(node))
            }
        })
        .delete("/<uuid:id>", "delete", move |req: Request| {
            let registry = delete.clone();
            async move {
                let id = req.uuid("id").ok_or_else(RestError::not_found)?;
                let mut nodes = registry.write().map_err(|_| anyhow::anyhow!("registry poisoned"))?;
                nodes.remove(&id).ok_or_else(RestError::not_found)?;
                Ok::<_, RestError>(Response::deleted())
            }
        })
}
