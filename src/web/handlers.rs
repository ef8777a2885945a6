//! HTTP handlers for API endpoints.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, Json};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;

use crate::config::ReloadSignal;
use crate::hw::{NetworkPresence, WifiNetwork};
use crate::runtime::round_to;
use crate::state::SharedState;
use crate::store::{now_ts, EventRow, Store};

/// Shared handles every handler works against.
pub struct ApiContext {
    pub state: Arc<SharedState>,
    pub store: Arc<Store>,
    pub reload: ReloadSignal,
    pub network: Arc<dyn NetworkPresence>,
}

/// Query parameters for the history endpoint.
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_metric")]
    pub metric: String,
    #[serde(default = "default_window_minutes")]
    pub minutes: i64,
}

/// Query parameters for the events endpoint.
#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    #[serde(default = "default_window_minutes")]
    pub minutes: i64,
}

/// Request body for joining a Wi-Fi network.
#[derive(Debug, Deserialize)]
pub struct ConnectRequest {
    pub ssid: String,
    #[serde(default)]
    pub password: String,
}

fn default_metric() -> String {
    "battery".to_string()
}

fn default_window_minutes() -> i64 {
    180
}

/// Current readings, rounded for display.
pub async fn get_stats(State(ctx): State<Arc<ApiContext>>) -> Json<serde_json::Value> {
    let snap = ctx.state.snapshot();
    Json(json!({
        "distance_m": snap.distance_m.map(|v| round_to(v, 1)),
        "battery_pct": snap.battery_pct,
        "bus_voltage_v": snap.bus_voltage_v.map(|v| round_to(v, 2)),
        "current_a": snap.current_a.map(|v| round_to(v, 2)),
        "power_w": snap.power_w.map(|v| round_to(v, 2)),
        "wifi_signal": snap.wifi_signal,
        "cpu_temp_c": snap.cpu_temp_c.map(|v| round_to(v, 1)),
        "load_1": snap.load_1.map(|v| round_to(v, 2)),
        "led_mode": snap.led_mode,
    }))
}

/// Minute-rollup history for one metric. Unknown metric names yield an
/// empty series rather than an error.
pub async fn get_history(
    State(ctx): State<Arc<ApiContext>>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let since = now_ts() - query.minutes.max(0).saturating_mul(60);
    let rows = match query.metric.as_str() {
        "battery" => rows_to_json(ctx.store.battery_history(since))?,
        "distance" => rows_to_json(ctx.store.distance_history(since))?,
        _ => serde_json::Value::Array(Vec::new()),
    };
    Ok(Json(rows))
}

fn rows_to_json<T: Serialize>(
    rows: crate::error::Result<Vec<T>>,
) -> Result<serde_json::Value, StatusCode> {
    let rows = rows.map_err(|e| {
        error!("history query failed: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    serde_json::to_value(rows).map_err(|e| {
        error!("failed to serialize history rows: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

/// Events recorded within the requested window, oldest first.
pub async fn get_events(
    State(ctx): State<Arc<ApiContext>>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<Vec<EventRow>>, StatusCode> {
    let since = now_ts() - query.minutes.max(0).saturating_mul(60);
    match ctx.store.events_since(since) {
        Ok(events) => Ok(Json(events)),
        Err(e) => {
            error!("event query failed: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Dump every setting as stored.
pub async fn get_settings(
    State(ctx): State<Arc<ApiContext>>,
) -> Result<Json<HashMap<String, String>>, StatusCode> {
    match ctx.store.kv_all() {
        Ok(settings) => Ok(Json(settings)),
        Err(e) => {
            error!("settings read failed: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Bulk-update settings and request a runtime reload.
///
/// Values arrive as arbitrary JSON and are stored as strings; the typed
/// config layer re-parses them on the next reload.
pub async fn update_settings(
    State(ctx): State<Arc<ApiContext>>,
    Json(body): Json<HashMap<String, serde_json::Value>>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let pairs: HashMap<String, String> = body
        .into_iter()
        .map(|(key, value)| {
            let text = match value {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            (key, text)
        })
        .collect();

    if let Err(e) = ctx.store.kv_set_many(&pairs) {
        error!("settings write failed: {}", e);
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }
    ctx.reload.set();
    Ok(Json(json!({ "ok": true })))
}

/// Trigger a Wi-Fi rescan and list visible networks.
pub async fn wifi_scan(
    State(ctx): State<Arc<ApiContext>>,
) -> Result<Json<Vec<WifiNetwork>>, StatusCode> {
    let network = Arc::clone(&ctx.network);
    // a rescan can take several seconds, keep it off the async workers
    match tokio::task::spawn_blocking(move || network.scan()).await {
        Ok(Ok(networks)) => Ok(Json(networks)),
        Ok(Err(e)) => {
            error!("wifi scan failed: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
        Err(e) => {
            error!("wifi scan task failed: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Join a Wi-Fi network.
pub async fn wifi_connect(
    State(ctx): State<Arc<ApiContext>>,
    Json(request): Json<ConnectRequest>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let network = Arc::clone(&ctx.network);
    let joined =
        tokio::task::spawn_blocking(move || network.connect(&request.ssid, &request.password))
            .await;
    match joined {
        Ok(Ok(())) => Ok(Json(json!({ "ok": true }))),
        Ok(Err(e)) => {
            error!("wifi connect failed: {}", e);
            Ok(Json(json!({ "ok": false })))
        }
        Err(e) => {
            error!("wifi connect task failed: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Health check endpoint.
pub async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "pi_sentry",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Serve the built-in status page.
pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// Built-in dashboard, polled over the REST API.
const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Pi Sentry</title>
    <style>
        * {
            margin: 0;
            padding: 0;
            box-sizing: border-box;
        }

        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, Oxygen, Ubuntu, Cantarell, sans-serif;
            background: linear-gradient(135deg, #1f2b52 0%, #4a3b78 100%);
            color: #333;
            min-height: 100vh;
            padding: 20px;
        }

        .container {
            max-width: 1000px;
            margin: 0 auto;
        }

        .header {
            text-align: center;
            margin-bottom: 40px;
            color: white;
        }

        .header h1 {
            font-size: 3rem;
            margin-bottom: 10px;
            text-shadow: 2px 2px 4px rgba(0,0,0,0.3);
        }

        .header p {
            font-size: 1.2rem;
            opacity: 0.9;
        }

        .dashboard {
            display: grid;
            grid-template-columns: repeat(auto-fit, minmax(280px, 1fr));
            gap: 20px;
            margin-bottom: 40px;
        }

        .card {
            background: white;
            border-radius: 15px;
            padding: 25px;
            box-shadow: 0 10px 30px rgba(0,0,0,0.1);
        }

        .card h3 {
            color: #4a3b78;
            margin-bottom: 15px;
            font-size: 1.5rem;
        }

        .metric {
            display: flex;
            justify-content: space-between;
            align-items: center;
            padding: 10px 0;
            border-bottom: 1px solid #eee;
        }

        .metric:last-child {
            border-bottom: none;
        }

        .metric-label {
            font-weight: 600;
            color: #666;
        }

        .metric-value {
            font-weight: bold;
            color: #333;
        }

        .status {
            text-align: center;
            color: white;
            padding: 20px;
            background: rgba(255,255,255,0.1);
            border-radius: 10px;
        }

        .error {
            color: #ff6b6b;
        }
    </style>
</head>
<body>
    <div class="container">
        <div class="header">
            <h1>Pi Sentry</h1>
            <p>Proximity and battery monitor</p>
        </div>

        <div class="dashboard">
            <div class="card">
                <h3>Proximity</h3>
                <div class="metric">
                    <span class="metric-label">Distance</span>
                    <span class="metric-value" id="distance">--</span>
                </div>
                <div class="metric">
                    <span class="metric-label">Ring</span>
                    <span class="metric-value" id="led-mode">--</span>
                </div>
            </div>

            <div class="card">
                <h3>Battery</h3>
                <div class="metric">
                    <span class="metric-label">Charge</span>
                    <span class="metric-value" id="battery">--</span>
                </div>
                <div class="metric">
                    <span class="metric-label">Bus voltage</span>
                    <span class="metric-value" id="voltage">--</span>
                </div>
                <div class="metric">
                    <span class="metric-label">Current</span>
                    <span class="metric-value" id="current">--</span>
                </div>
                <div class="metric">
                    <span class="metric-label">Power</span>
                    <span class="metric-value" id="power">--</span>
                </div>
            </div>

            <div class="card">
                <h3>Host</h3>
                <div class="metric">
                    <span class="metric-label">CPU temperature</span>
                    <span class="metric-value" id="cpu-temp">--</span>
                </div>
                <div class="metric">
                    <span class="metric-label">Load (1 min)</span>
                    <span class="metric-value" id="load">--</span>
                </div>
                <div class="metric">
                    <span class="metric-label">Wi-Fi signal</span>
                    <span class="metric-value" id="wifi">--</span>
                </div>
            </div>

            <div class="card">
                <h3>Recent events</h3>
                <div id="events">
                    <div class="metric">
                        <span class="metric-label">None yet</span>
                    </div>
                </div>
            </div>
        </div>

        <div class="status" id="status">Connecting...</div>
    </div>

    <script>
        function setText(id, text) {
            document.getElementById(id).textContent = text;
        }

        function fmt(value, suffix) {
            return value === null || value === undefined ? '--' : value + suffix;
        }

        async function refreshStats() {
            try {
                const res = await fetch('/api/stats');
                const data = await res.json();
                setText('distance', fmt(data.distance_m, ' m'));
                setText('led-mode', data.led_mode);
                setText('battery', fmt(data.battery_pct, '%'));
                setText('voltage', fmt(data.bus_voltage_v, ' V'));
                setText('current', fmt(data.current_a, ' A'));
                setText('power', fmt(data.power_w, ' W'));
                setText('cpu-temp', fmt(data.cpu_temp_c, ' °C'));
                setText('load', fmt(data.load_1, ''));
                setText('wifi', fmt(data.wifi_signal, '%'));
                setText('status', 'Live');
                document.getElementById('status').classList.remove('error');
            } catch (e) {
                setText('status', 'Connection lost, retrying...');
                document.getElementById('status').classList.add('error');
            }
        }

        async function refreshEvents() {
            try {
                const res = await fetch('/api/events?minutes=180');
                const events = await res.json();
                const list = document.getElementById('events');
                if (events.length === 0) {
                    return;
                }
                list.innerHTML = '';
                events.slice(-8).reverse().forEach(ev => {
                    const row = document.createElement('div');
                    row.className = 'metric';
                    const when = new Date(ev.ts * 1000).toLocaleTimeString();
                    const label = document.createElement('span');
                    label.className = 'metric-label';
                    label.textContent = when;
                    const value = document.createElement('span');
                    value.className = 'metric-value';
                    value.textContent = ev.kind;
                    row.appendChild(label);
                    row.appendChild(value);
                    list.appendChild(row);
                });
            } catch (e) {
                console.error('Failed to fetch events:', e);
            }
        }

        refreshStats();
        refreshEvents();
        setInterval(refreshStats, 1000);
        setInterval(refreshEvents, 30000);
    </script>
</body>
</html>"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw::sim::SimNetwork;

    fn test_context() -> Arc<ApiContext> {
        let store = Arc::new(Store::open_in_memory().unwrap());
        Arc::new(ApiContext {
            state: Arc::new(SharedState::new()),
            store,
            reload: ReloadSignal::new(),
            network: Arc::new(SimNetwork::new(true)),
        })
    }

    #[tokio::test]
    async fn stats_are_rounded_for_display() {
        let ctx = test_context();
        ctx.state.set_distance(1.2345);
        let Json(body) = get_stats(State(ctx)).await;
        assert_eq!(body["distance_m"], json!(1.2));
        assert_eq!(body["battery_pct"], serde_json::Value::Null);
        assert_eq!(body["led_mode"], json!("off"));
    }

    #[tokio::test]
    async fn unknown_history_metric_yields_empty_list() {
        let ctx = test_context();
        let query = HistoryQuery {
            metric: "humidity".to_string(),
            minutes: 60,
        };
        let Json(body) = get_history(State(ctx), Query(query)).await.unwrap();
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn settings_update_persists_and_requests_reload() {
        let ctx = test_context();
        let mut body = HashMap::new();
        body.insert("led.master_on".to_string(), json!(false));
        body.insert("warn.distance_threshold_m".to_string(), json!(2.5));

        let Json(reply) = update_settings(State(Arc::clone(&ctx)), Json(body))
            .await
            .unwrap();
        assert_eq!(reply["ok"], json!(true));
        assert!(ctx.reload.is_set());
        assert_eq!(
            ctx.store.kv_get("led.master_on").unwrap().as_deref(),
            Some("false")
        );
        assert_eq!(
            ctx.store
                .kv_get("warn.distance_threshold_m")
                .unwrap()
                .as_deref(),
            Some("2.5")
        );
    }

    #[tokio::test]
    async fn events_window_filters_old_rows() {
        let ctx = test_context();
        let now = now_ts();
        ctx.store
            .insert_event(now - 3600, "wifi_ap", &json!({}))
            .unwrap();
        ctx.store
            .insert_event(now, "distance_warn", &json!({"distance_m": 0.4}))
            .unwrap();

        let query = EventsQuery { minutes: 10 };
        let Json(events) = get_events(State(ctx), Query(query)).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, "distance_warn");
    }

    #[tokio::test]
    async fn scan_returns_simulated_networks() {
        let ctx = test_context();
        let Json(networks) = wifi_scan(State(ctx)).await.unwrap();
        assert!(!networks.is_empty());
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let Json(body) = health_check().await;
        assert_eq!(body["status"], json!("ok"));
        assert_eq!(body["service"], json!("pi_sentry"));
    }
}
