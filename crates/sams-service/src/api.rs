//! HTTP and WebSocket surface of the acquisition service.

use axum::{
	extract::{
		rejection::JsonRejection,
		ws::{Message, WebSocket, WebSocketUpgrade},
		State,
	},
	http::StatusCode,
	response::{Json, Response},
	routing::{get, post},
	Router,
};
use futures::{SinkExt, StreamExt};
use sams_core::Controller;
use sams_types::{PayMethod, SessionConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info, instrument, warn};

/// API server exposing the control surface
pub struct ApiServer {
	host: String,
	port: u16,
	controller: Arc<Controller>,
}

impl ApiServer {
	pub fn new(host: impl Into<String>, port: u16, controller: Arc<Controller>) -> Self {
		Self {
			host: host.into(),
			port,
			controller,
		}
	}

	#[instrument(skip(self))]
	pub async fn run(self) -> anyhow::Result<()> {
		let app = router(self.controller);

		let listener = tokio::net::TcpListener::bind(format!("{}:{}", self.host, self.port)).await?;

		info!("API server listening on {}:{}", self.host, self.port);

		axum::serve(listener, app).await?;

		Ok(())
	}
}

#[derive(Clone)]
struct AppState {
	controller: Arc<Controller>,
}

pub fn router(controller: Arc<Controller>) -> Router {
	Router::new()
		.route("/api/config", post(configure))
		.route("/api/start", post(start))
		.route("/api/stop", post(stop))
		.route("/api/status", get(status))
		.route("/api/logs", get(logs))
		.route("/ws", get(websocket))
		.with_state(AppState { controller })
		.layer(TraceLayer::new_for_http())
		.layer(CorsLayer::permissive())
}

/// Response envelope shared by every endpoint.
#[derive(Debug, Serialize)]
pub struct ApiResponse {
	pub success: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub message: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub data: Option<serde_json::Value>,
}

type Reply = (StatusCode, Json<ApiResponse>);

fn ok(message: Option<&str>, data: Option<serde_json::Value>) -> Reply {
	(
		StatusCode::OK,
		Json(ApiResponse {
			success: true,
			message: message.map(str::to_string),
			data,
		}),
	)
}

fn bad_request(message: impl Into<String>) -> Reply {
	(
		StatusCode::BAD_REQUEST,
		Json(ApiResponse {
			success: false,
			message: Some(message.into()),
			data: None,
		}),
	)
}

/// Configuration form as posted by the web client.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigRequest {
	pub auth_token: String,
	pub bark_id: String,
	pub floor_id: i64,
	pub delivery_type: i64,
	pub longitude: String,
	pub latitude: String,
	pub device_id: String,
	pub track_info: String,
	/// Comma-separated coupon ids.
	pub promotion_id: String,
	pub address_id: String,
	/// 1 = wechat, 2 = alipay.
	pub pay_method: i64,
	/// Require free delivery.
	pub delivery_fee: bool,
	/// Store preload file.
	pub store_conf: String,
	/// Only buy ticked items.
	pub is_selected: bool,
}

fn non_empty(value: String) -> Option<String> {
	let trimmed = value.trim();
	if trimmed.is_empty() {
		None
	} else {
		Some(trimmed.to_string())
	}
}

impl From<ConfigRequest> for SessionConfig {
	fn from(req: ConfigRequest) -> Self {
		SessionConfig {
			promotion_ids: SessionConfig::parse_promotion_ids(&req.promotion_id),
			auth_token: req.auth_token,
			floor_id: req.floor_id,
			delivery_type: req.delivery_type,
			longitude: req.longitude,
			latitude: req.latitude,
			device_id: req.device_id,
			track_info: req.track_info,
			address_id: non_empty(req.address_id),
			pay_method: PayMethod::from_code(req.pay_method),
			require_free_delivery: req.delivery_fee,
			only_selected: req.is_selected,
			store_preload: non_empty(req.store_conf).map(PathBuf::from),
			push_id: non_empty(req.bark_id),
		}
	}
}

async fn configure(
	State(state): State<AppState>,
	payload: Result<Json<ConfigRequest>, JsonRejection>,
) -> Reply {
	let Json(request) = match payload {
		Ok(request) => request,
		Err(rejection) => return bad_request(format!("Invalid request: {}", rejection.body_text())),
	};

	match state.controller.configure(request.into()).await {
		Ok((selected, addresses)) => ok(
			Some("configured"),
			Some(serde_json::json!({
				"addressList": addresses,
				"selectedAddress": selected,
			})),
		),
		Err(e) => bad_request(e.to_string()),
	}
}

async fn start(State(state): State<AppState>) -> Reply {
	match state.controller.start().await {
		Ok(()) => ok(Some("started"), None),
		Err(e) => {
			debug!("start rejected: {}", e);
			bad_request(e.to_string())
		}
	}
}

async fn stop(State(state): State<AppState>) -> Reply {
	state.controller.stop().await;
	ok(Some("stopped"), None)
}

async fn status(State(state): State<AppState>) -> Reply {
	let status = state.controller.status().await;
	ok(None, serde_json::to_value(status).ok())
}

/// Takes the buffered log history.
async fn logs(State(state): State<AppState>) -> Reply {
	let entries = state.controller.hub().drain_logs();
	ok(None, serde_json::to_value(entries).ok())
}

async fn websocket(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
	ws.on_upgrade(move |socket| relay(socket, state.controller))
}

/// Relays hub messages to one client until either side goes away.
async fn relay(socket: WebSocket, controller: Arc<Controller>) {
	let (mut sender, mut receiver) = socket.split();
	let mut subscription = controller.subscribe().await;
	debug!(
		observers = controller.hub().observer_count(),
		"observer connected"
	);

	loop {
		tokio::select! {
			message = subscription.next() => {
				let Some(message) = message else { break };
				let text = match serde_json::to_string(&message) {
					Ok(text) => text,
					Err(e) => {
						warn!("failed to encode hub message: {}", e);
						continue;
					}
				};
				if sender.send(Message::Text(text.into())).await.is_err() {
					break;
				}
			}
			// Client frames are ignored; only a close ends the relay
			incoming = receiver.next() => match incoming {
				Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
				Some(Ok(_)) => {}
			},
		}
	}

	drop(subscription);
	debug!(
		observers = controller.hub().observer_count(),
		"observer disconnected"
	);
}

#[cfg(test)]
mod tests {
	use super::*;
	use axum::body::Body;
	use axum::http::Request;
	use sams_config::HubConfig;
	use sams_core::{vendor_factory, EngineSettings, Hub};
	use tower::ServiceExt;

	fn app() -> Router {
		let controller = Controller::new(
			vendor_factory("sandbox").unwrap(),
			toml::Value::Table(toml::map::Map::new()),
			Hub::new(&HubConfig::default()),
			EngineSettings::default(),
		);
		router(Arc::new(controller))
	}

	async fn call(
		app: &Router,
		method: &str,
		uri: &str,
		body: Option<&str>,
	) -> (StatusCode, serde_json::Value) {
		let request = Request::builder()
			.method(method)
			.uri(uri)
			.header("content-type", "application/json")
			.body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
			.unwrap();

		let response = app.clone().oneshot(request).await.unwrap();
		let status = response.status();
		let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
			.await
			.unwrap();
		(status, serde_json::from_slice(&bytes).unwrap())
	}

	#[test]
	fn test_config_request_conversion() {
		let request: ConfigRequest = serde_json::from_str(
			r#"{"authToken":"t","barkId":" ","floorId":1,"deliveryType":2,
			"promotionId":"a, b,,c","addressId":"addr","payMethod":2,
			"deliveryFee":true,"storeConf":"stores.json","isSelected":true}"#,
		)
		.unwrap();

		let config = SessionConfig::from(request);
		assert_eq!(config.promotion_ids, vec!["a", "b", "c"]);
		assert_eq!(config.pay_method, PayMethod::Alipay);
		assert_eq!(config.address_id.as_deref(), Some("addr"));
		assert_eq!(config.push_id, None);
		assert_eq!(config.store_preload, Some(PathBuf::from("stores.json")));
		assert!(config.require_free_delivery);
		assert!(config.only_selected);
	}

	#[tokio::test]
	async fn test_status_before_configure() {
		let app = app();
		let (code, body) = call(&app, "GET", "/api/status", None).await;
		assert_eq!(code, StatusCode::OK);
		assert_eq!(body["success"], true);
		assert_eq!(body["data"]["step"], "idle");
		assert_eq!(body["data"]["status"], "stopped");
	}

	#[tokio::test]
	async fn test_start_requires_configuration() {
		let app = app();
		let (code, body) = call(&app, "POST", "/api/start", None).await;
		assert_eq!(code, StatusCode::BAD_REQUEST);
		assert_eq!(body["success"], false);
		assert_eq!(body["message"], "not configured");
	}

	#[tokio::test]
	async fn test_configure_validation() {
		let app = app();

		let (code, body) = call(&app, "POST", "/api/config", Some(r#"{"authToken":""}"#)).await;
		assert_eq!(code, StatusCode::BAD_REQUEST);
		assert_eq!(body["success"], false);

		let (code, _) = call(&app, "POST", "/api/config", Some("{not json")).await;
		assert_eq!(code, StatusCode::BAD_REQUEST);
	}

	#[tokio::test]
	async fn test_configure_start_stop() {
		let app = app();

		let (code, body) = call(
			&app,
			"POST",
			"/api/config",
			Some(r#"{"authToken":"token","floorId":1,"deliveryType":2}"#),
		)
		.await;
		assert_eq!(code, StatusCode::OK);
		assert_eq!(body["data"]["selectedAddress"]["addressId"], "address-001");
		assert_eq!(body["data"]["addressList"].as_array().map(Vec::len), Some(1));

		let (code, _) = call(&app, "POST", "/api/start", None).await;
		assert_eq!(code, StatusCode::OK);

		let (code, body) = call(&app, "POST", "/api/stop", None).await;
		assert_eq!(code, StatusCode::OK);
		assert_eq!(body["message"], "stopped");

		let (code, body) = call(&app, "GET", "/api/logs", None).await;
		assert_eq!(code, StatusCode::OK);
		let logs = body["data"].as_array().cloned().unwrap_or_default();
		assert!(logs.iter().any(|entry| entry["level"] == "success"));
	}
}
