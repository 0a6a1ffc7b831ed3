#![deny(warnings)]

//! Request surface for Todo Mine.
//!
//! Requests and responses are plain values (method, path, JSON body, status
//! code) so the same routing serves any transport. Status codes follow HTTP.

use std::sync::Arc;

use mine_core::{GameStatsUpdate, TaskDraft, TaskId, TaskPatch, UserId};
use mine_econ::EngineError;
use mine_runtime::{Clock, ServiceError, Services};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, error};

pub mod transport;

pub const API_NAME: &str = "Todo Mining Game API";
pub const API_VERSION: &str = "1.0.0";
const PREFIX: &str = "/api";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub method: Method,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl Request {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Option<Value>) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            body,
        }
    }

    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Put,
            path: path.into(),
            body: Some(body),
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            method: Method::Delete,
            path: path.into(),
            body: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub status: u16,
    pub body: Value,
}

impl Response {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A failed request: status code plus `detail` message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{status}: {detail}")]
pub struct ApiError {
    pub status: u16,
    pub detail: String,
}

impl ApiError {
    pub fn new(status: u16, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    fn not_found() -> Self {
        Self::new(404, "Not Found")
    }

    fn method_not_allowed() -> Self {
        Self::new(405, "Method Not Allowed")
    }

    fn into_response(self) -> Response {
        Response {
            status: self.status,
            body: json!({ "detail": self.detail }),
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        let status = match &e {
            ServiceError::TaskNotFound(_) => 404,
            ServiceError::Engine(EngineError::UpgradeNotFound(_)) => 404,
            ServiceError::Engine(EngineError::MaxLevelReached { .. })
            | ServiceError::Engine(EngineError::InsufficientFunds { .. }) => 400,
            ServiceError::Engine(EngineError::Invalid(_)) | ServiceError::Invalid(_) => 422,
            ServiceError::Conflict(_) => 409,
            ServiceError::Store(_) => 500,
        };
        if status == 500 {
            error!(error = %e, "request failed");
        }
        Self::new(status, e.to_string())
    }
}

/// Parsed route. Path segments are taken after the `/api` prefix.
#[derive(Clone, Debug, PartialEq, Eq)]
enum Route {
    Root,
    Health,
    Todos,
    Todo(TaskId),
    Stats,
    Upgrades,
    Upgrade(String),
    AutoMine,
}

impl Route {
    fn parse(path: &str) -> Option<Route> {
        let path = path.split('?').next().unwrap_or_default();
        let rest = path.strip_prefix(PREFIX)?;
        if !(rest.is_empty() || rest.starts_with('/')) {
            return None;
        }
        let segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();
        let route = match segments.as_slice() {
            [] => Route::Root,
            ["health"] => Route::Health,
            ["todos"] => Route::Todos,
            ["todos", id] => Route::Todo(TaskId(id.to_string())),
            ["game", "stats"] => Route::Stats,
            ["game", "upgrades"] => Route::Upgrades,
            ["game", "upgrade", id] => Route::Upgrade(id.to_string()),
            ["game", "auto-mine"] => Route::AutoMine,
            _ => return None,
        };
        Some(route)
    }
}

/// Routes requests to the services on behalf of one user.
#[derive(Clone)]
pub struct Api {
    services: Services,
    user: UserId,
    clock: Arc<dyn Clock>,
}

impl Api {
    pub fn new(services: Services, user: UserId, clock: Arc<dyn Clock>) -> Self {
        Self {
            services,
            user,
            clock,
        }
    }

    pub fn user(&self) -> &UserId {
        &self.user
    }

    pub async fn handle(&self, req: Request) -> Response {
        debug!(method = ?req.method, path = %req.path, "request");
        let out = match Route::parse(&req.path) {
            Some(route) => self.dispatch(route, req.method, req.body).await,
            None => Err(ApiError::not_found()),
        };
        let resp = match out {
            Ok(body) => Response { status: 200, body },
            Err(e) => e.into_response(),
        };
        debug!(status = resp.status, "response");
        resp
    }

    async fn dispatch(&self, route: Route, method: Method, body: Option<Value>) -> Result<Value, ApiError> {
        let svc = &self.services;
        let user = &self.user;
        match (route, method) {
            (Route::Root, Method::Get) => Ok(json!({ "message": API_NAME, "version": API_VERSION })),
            (Route::Health, Method::Get) => {
                Ok(json!({ "status": "healthy", "timestamp": self.clock.now() }))
            }
            (Route::Todos, Method::Get) => to_value(svc.tasks.list().await?),
            (Route::Todos, Method::Post) => {
                let draft: TaskDraft = parse_body(body)?;
                to_value(svc.tasks.create(draft).await?)
            }
            (Route::Todo(id), Method::Put) => {
                let patch: TaskPatch = parse_body(body)?;
                to_value(svc.tasks.update(user, &id, patch).await?)
            }
            (Route::Todo(id), Method::Delete) => {
                svc.tasks.delete(&id).await?;
                Ok(json!({ "message": "Todo deleted successfully" }))
            }
            (Route::Stats, Method::Get) => to_value(svc.game.stats(user).await?),
            (Route::Stats, Method::Post) => {
                let update: GameStatsUpdate = parse_body(body)?;
                to_value(svc.game.update_stats(user, &update).await?)
            }
            (Route::Upgrades, Method::Get) => to_value(svc.game.upgrades(user).await?),
            (Route::Upgrade(id), Method::Post) => to_value(svc.game.purchase_upgrade(user, &id).await?),
            (Route::AutoMine, Method::Post) => to_value(svc.game.auto_mine(user).await?),
            _ => Err(ApiError::method_not_allowed()),
        }
    }
}

fn parse_body<T: DeserializeOwned>(body: Option<Value>) -> Result<T, ApiError> {
    let body = body.ok_or_else(|| ApiError::new(422, "request body required"))?;
    serde_json::from_value(body).map_err(|e| ApiError::new(422, format!("invalid body: {e}")))
}

fn to_value<T: Serialize>(v: T) -> Result<Value, ApiError> {
    serde_json::to_value(v).map_err(|e| ApiError::new(500, format!("failed to encode response: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use mine_runtime::{FixedClock, RuntimeConfig};
    use persistence::{MemoryGameStateStore, MemoryTaskStore};

    pub(crate) fn api() -> Api {
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 7, 1, 9, 0, 0).unwrap(),
        ));
        let services = Services::new(
            Arc::new(MemoryTaskStore::new()),
            Arc::new(MemoryGameStateStore::new()),
            clock.clone(),
            RuntimeConfig::default(),
        );
        Api::new(services, UserId::default(), clock)
    }

    #[test]
    fn routes_parse() {
        assert_eq!(Route::parse("/api"), Some(Route::Root));
        assert_eq!(Route::parse("/api/"), Some(Route::Root));
        assert_eq!(Route::parse("/api/health"), Some(Route::Health));
        assert_eq!(
            Route::parse("/api/todos/abc"),
            Some(Route::Todo(TaskId("abc".into())))
        );
        assert_eq!(
            Route::parse("/api/game/upgrade/efficiency"),
            Some(Route::Upgrade("efficiency".into()))
        );
        assert_eq!(Route::parse("/api/game/auto-mine?x=1"), Some(Route::AutoMine));
        assert_eq!(Route::parse("/apiary"), None);
        assert_eq!(Route::parse("/todos"), None);
        assert_eq!(Route::parse("/api/game"), None);
    }

    #[tokio::test]
    async fn root_and_health() {
        let api = api();
        let r = api.handle(Request::get("/api/")).await;
        assert_eq!(r.status, 200);
        assert_eq!(r.body, json!({"message": "Todo Mining Game API", "version": "1.0.0"}));
        let r = api.handle(Request::get("/api/health")).await;
        assert_eq!(r.body["status"], "healthy");
        assert_eq!(r.body["timestamp"], "2024-07-01T09:00:00Z");
    }

    #[tokio::test]
    async fn todo_lifecycle_and_rewards() {
        let api = api();
        let created = api
            .handle(Request::post(
                "/api/todos",
                Some(json!({"title": "Ship it", "priority": "high", "category": "work"})),
            ))
            .await;
        assert_eq!(created.status, 200);
        assert_eq!(created.body["completed"], false);
        assert_eq!(created.body["description"], "");
        let id = created.body["id"].as_str().unwrap().to_string();

        let done = api
            .handle(Request::put(format!("/api/todos/{id}"), json!({"completed": true})))
            .await;
        assert_eq!(done.status, 200);
        assert_eq!(done.body["completed_at"], "2024-07-01T09:00:00Z");

        let again = api
            .handle(Request::put(format!("/api/todos/{id}"), json!({"completed": true})))
            .await;
        assert_eq!(again.status, 200);

        let stats = api.handle(Request::get("/api/game/stats")).await;
        assert_eq!(stats.body["coins"], 50);
        assert_eq!(stats.body["total_todos_completed"], 1);
        assert_eq!(stats.body["current_streak"], 1);
        assert_eq!(stats.body["best_streak"], 1);
        assert_eq!(stats.body["level"], 1);

        let list = api.handle(Request::get("/api/todos")).await;
        assert_eq!(list.body.as_array().unwrap().len(), 1);

        let del = api.handle(Request::delete(format!("/api/todos/{id}"))).await;
        assert_eq!(del.body["message"], "Todo deleted successfully");
        let del = api.handle(Request::delete(format!("/api/todos/{id}"))).await;
        assert_eq!(del.status, 404);
        assert_eq!(del.body["detail"], "Todo not found");
    }

    #[tokio::test]
    async fn upgrade_flow_and_error_codes() {
        let api = api();
        let ups = api.handle(Request::get("/api/game/upgrades")).await;
        let first = &ups.body[0];
        assert_eq!(first["id"], "mining_power");
        assert_eq!(first["cost"], 100);
        assert_eq!(first["current_level"], 0);
        assert_eq!(first["effect"], "mining_power");
        assert_eq!(ups.body[1]["effect"], "auto_mining");

        let poor = api.handle(Request::post("/api/game/upgrade/mining_power", None)).await;
        assert_eq!(poor.status, 400);
        assert_eq!(poor.body["detail"], "Not enough coins");

        let missing = api.handle(Request::post("/api/game/upgrade/drill", None)).await;
        assert_eq!(missing.status, 404);
        assert_eq!(missing.body["detail"], "Upgrade not found");

        let set = api
            .handle(Request::post("/api/game/stats", Some(json!({"coins": 100}))))
            .await;
        assert_eq!(set.body["coins"], 100);

        let bought = api.handle(Request::post("/api/game/upgrade/mining_power", None)).await;
        assert_eq!(bought.status, 200);
        assert_eq!(
            bought.body,
            json!({"message": "Upgrade Better Pickaxe purchased successfully", "cost": 100, "new_level": 1})
        );

        let maxed = api
            .handle(Request::post("/api/game/stats", Some(json!({"coins": 1_000_000, "mining_power": 11}))))
            .await;
        assert_eq!(maxed.status, 200);
        let r = api.handle(Request::post("/api/game/upgrade/mining_power", None)).await;
        assert_eq!(r.status, 400);
        assert_eq!(r.body["detail"], "Upgrade already at max level");
        let stats = api.handle(Request::get("/api/game/stats")).await;
        assert_eq!(stats.body["coins"], 1_000_000);
    }

    #[tokio::test]
    async fn auto_mine_endpoint() {
        let api = api();
        let idle = api.handle(Request::post("/api/game/auto-mine", None)).await;
        assert_eq!(idle.body, json!({"coins_earned": 0, "new_total": 0}));
        api.handle(Request::post("/api/game/stats", Some(json!({"auto_miners": 3}))))
            .await;
        let tick = api.handle(Request::post("/api/game/auto-mine", None)).await;
        assert_eq!(tick.body, json!({"coins_earned": 3, "new_total": 3}));
    }

    #[tokio::test]
    async fn bad_requests() {
        let api = api();
        let r = api.handle(Request::get("/api/nowhere")).await;
        assert_eq!(r.status, 404);
        let r = api.handle(Request::delete("/api/game/stats")).await;
        assert_eq!(r.status, 405);
        let r = api.handle(Request::post("/api/todos", Some(json!({"priority": "high"})))).await;
        assert_eq!(r.status, 422);
        let r = api.handle(Request::post("/api/todos", Some(json!({"title": "  "})))).await;
        assert_eq!(r.status, 422);
        let r = api.handle(Request::post("/api/todos", None)).await;
        assert_eq!(r.status, 422);
        let r = api
            .handle(Request::post("/api/game/stats", Some(json!({"mining_power": 0}))))
            .await;
        assert_eq!(r.status, 422);
        let r = api
            .handle(Request::put("/api/todos/ghost", json!({"completed": true})))
            .await;
        assert_eq!(r.status, 404);
    }

    #[tokio::test]
    async fn coin_override_beyond_signed_range_is_rejected() {
        let api = api();
        let r = api
            .handle(Request::post(
                "/api/game/stats",
                Some(json!({"coins": 9_223_372_036_854_775_808u64})),
            ))
            .await;
        assert_eq!(r.status, 422);
        let stats = api.handle(Request::get("/api/game/stats")).await;
        assert_eq!(stats.body["coins"], 0);
    }
}
