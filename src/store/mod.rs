//! Local SQLite persistence: settings, telemetry samples, minute rollups,
//! and events.
//!
//! A single connection behind a mutex is plenty at this scale (one writer
//! loop at 1 Hz plus occasional API reads). Every operation commits
//! independently so a crash loses at most one tick of data.

mod migrations;

pub use migrations::SCHEMA_VERSION;

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::error::Result;

/// Epoch seconds now.
pub fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Floor a timestamp to its minute boundary.
pub fn minute_floor(ts: i64) -> i64 {
    ts - ts.rem_euclid(60)
}

/// One telemetry row, written once per telemetry tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Sample {
    pub ts: i64,
    pub distance_m: Option<f64>,
    /// Reserved for ambient light readings; always absent in this revision.
    pub ambient_rate: Option<f64>,
    pub bus_voltage_v: Option<f64>,
    pub shunt_voltage_v: Option<f64>,
    pub current_a: Option<f64>,
    pub power_w: Option<f64>,
}

/// Latest-known readings for one minute, upserted at minute boundaries.
#[derive(Debug, Clone, Copy, Default)]
pub struct MinuteRollup {
    pub minute_ts: i64,
    pub battery_pct: Option<f64>,
    pub bus_voltage_v: Option<f64>,
    pub current_a: Option<f64>,
    pub power_w: Option<f64>,
    pub distance_m: Option<f64>,
}

/// Battery history row served by the API.
#[derive(Debug, Clone, Serialize)]
pub struct BatteryMinute {
    pub minute_ts: i64,
    pub battery_pct: Option<f64>,
    pub bus_voltage_v: Option<f64>,
    pub current_a: Option<f64>,
    pub power_w: Option<f64>,
}

/// Distance history row served by the API.
#[derive(Debug, Clone, Serialize)]
pub struct DistanceMinute {
    pub minute_ts: i64,
    pub distance_m: Option<f64>,
}

/// Recorded event row.
#[derive(Debug, Clone, Serialize)]
pub struct EventRow {
    pub ts: i64,
    pub kind: String,
    pub payload: Option<serde_json::Value>,
}

/// Handle to the appliance database.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (creating if needed) the database at `path` and run migrations.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }
        Self::init(Connection::open(path)?)
    }

    /// In-memory database for tests and ephemeral runs.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        // journal_mode returns a result row, so it cannot go through execute().
        let _mode: String =
            conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        migrations::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Recorded schema version.
    pub fn schema_version(&self) -> Result<i64> {
        let conn = self.conn();
        let version = conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(version.unwrap_or(0))
    }

    /// Look up a single setting.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn();
        let value = conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Upsert a batch of settings in one transaction.
    pub fn kv_set_many(&self, pairs: &HashMap<String, String>) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO settings (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            )?;
            for (key, value) in pairs {
                stmt.execute(params![key, value])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// All settings as a key-value map.
    pub fn kv_all(&self) -> Result<HashMap<String, String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT key, value FROM settings")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut map = HashMap::new();
        for row in rows {
            let (key, value) = row?;
            map.insert(key, value);
        }
        Ok(map)
    }

    /// Append one telemetry sample.
    pub fn insert_sample(&self, sample: &Sample) -> Result<()> {
        self.conn().execute(
            "INSERT INTO samples
                 (ts, distance_m, ambient_rate, bus_voltage_v, shunt_voltage_v, current_a, power_w)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                sample.ts,
                sample.distance_m,
                sample.ambient_rate,
                sample.bus_voltage_v,
                sample.shunt_voltage_v,
                sample.current_a,
                sample.power_w,
            ],
        )?;
        Ok(())
    }

    /// Samples at or after `since_ts`, oldest first.
    pub fn samples_since(&self, since_ts: i64) -> Result<Vec<Sample>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT ts, distance_m, ambient_rate, bus_voltage_v, shunt_voltage_v, current_a, power_w
             FROM samples WHERE ts >= ?1 ORDER BY ts ASC",
        )?;
        let rows = stmt.query_map(params![since_ts], |row| {
            Ok(Sample {
                ts: row.get(0)?,
                distance_m: row.get(1)?,
                ambient_rate: row.get(2)?,
                bus_voltage_v: row.get(3)?,
                shunt_voltage_v: row.get(4)?,
                current_a: row.get(5)?,
                power_w: row.get(6)?,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// Append one event with a JSON payload.
    pub fn insert_event(&self, ts: i64, kind: &str, payload: &serde_json::Value) -> Result<()> {
        self.conn().execute(
            "INSERT INTO events (ts, kind, payload) VALUES (?1, ?2, ?3)",
            params![ts, kind, payload.to_string()],
        )?;
        Ok(())
    }

    /// Events at or after `since_ts`, oldest first.
    pub fn events_since(&self, since_ts: i64) -> Result<Vec<EventRow>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT ts, kind, payload FROM events WHERE ts >= ?1 ORDER BY ts ASC")?;
        let rows = stmt.query_map(params![since_ts], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
            ))
        })?;
        let mut events = Vec::new();
        for row in rows {
            let (ts, kind, raw) = row?;
            let payload = raw.map(|s| {
                serde_json::from_str(&s).unwrap_or_else(|_| serde_json::Value::String(s))
            });
            events.push(EventRow { ts, kind, payload });
        }
        Ok(events)
    }

    /// Upsert both per-minute rollup tables for one minute.
    pub fn rollup_minute(&self, rollup: &MinuteRollup) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO metrics_battery_minute
                 (minute_ts, battery_pct, bus_voltage_v, current_a, power_w)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(minute_ts) DO UPDATE SET
                 battery_pct = excluded.battery_pct,
                 bus_voltage_v = excluded.bus_voltage_v,
                 current_a = excluded.current_a,
                 power_w = excluded.power_w",
            params![
                rollup.minute_ts,
                rollup.battery_pct,
                rollup.bus_voltage_v,
                rollup.current_a,
                rollup.power_w,
            ],
        )?;
        tx.execute(
            "INSERT INTO metrics_distance_minute (minute_ts, distance_m)
             VALUES (?1, ?2)
             ON CONFLICT(minute_ts) DO UPDATE SET distance_m = excluded.distance_m",
            params![rollup.minute_ts, rollup.distance_m],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Battery rollup rows at or after `since_ts`, oldest first.
    pub fn battery_history(&self, since_ts: i64) -> Result<Vec<BatteryMinute>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT minute_ts, battery_pct, bus_voltage_v, current_a, power_w
             FROM metrics_battery_minute WHERE minute_ts >= ?1 ORDER BY minute_ts ASC",
        )?;
        let rows = stmt.query_map(params![since_ts], |row| {
            Ok(BatteryMinute {
                minute_ts: row.get(0)?,
                battery_pct: row.get(1)?,
                bus_voltage_v: row.get(2)?,
                current_a: row.get(3)?,
                power_w: row.get(4)?,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// Distance rollup rows at or after `since_ts`, oldest first.
    pub fn distance_history(&self, since_ts: i64) -> Result<Vec<DistanceMinute>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT minute_ts, distance_m
             FROM metrics_distance_minute WHERE minute_ts >= ?1 ORDER BY minute_ts ASC",
        )?;
        let rows = stmt.query_map(params![since_ts], |row| {
            Ok(DistanceMinute {
                minute_ts: row.get(0)?,
                distance_m: row.get(1)?,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_are_seeded() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(
            store.kv_get("battery.voltage_full").unwrap().as_deref(),
            Some("4.2")
        );
        assert_eq!(
            store.kv_get("wifi.ap_ssid").unwrap().as_deref(),
            Some("PiSentry-AP")
        );
        assert!(store.kv_all().unwrap().len() >= 20);
        assert_eq!(store.schema_version().unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn kv_set_many_overwrites() {
        let store = Store::open_in_memory().unwrap();
        let mut pairs = HashMap::new();
        pairs.insert("warn.enabled".to_string(), "false".to_string());
        pairs.insert("custom.key".to_string(), "7".to_string());
        store.kv_set_many(&pairs).unwrap();
        assert_eq!(store.kv_get("warn.enabled").unwrap().as_deref(), Some("false"));
        assert_eq!(store.kv_get("custom.key").unwrap().as_deref(), Some("7"));
        assert!(store.kv_get("missing").unwrap().is_none());
    }

    #[test]
    fn samples_roundtrip_in_window() {
        let store = Store::open_in_memory().unwrap();
        store
            .insert_sample(&Sample {
                ts: 100,
                distance_m: Some(1.5),
                bus_voltage_v: Some(3.8),
                ..Default::default()
            })
            .unwrap();
        store
            .insert_sample(&Sample {
                ts: 200,
                distance_m: None,
                ..Default::default()
            })
            .unwrap();

        let all = store.samples_since(0).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].distance_m, Some(1.5));
        assert!(all[1].distance_m.is_none());

        let late = store.samples_since(150).unwrap();
        assert_eq!(late.len(), 1);
        assert_eq!(late[0].ts, 200);
    }

    #[test]
    fn rollup_upsert_is_idempotent() {
        let store = Store::open_in_memory().unwrap();
        let minute = minute_floor(now_ts());
        store
            .rollup_minute(&MinuteRollup {
                minute_ts: minute,
                battery_pct: Some(50.0),
                distance_m: Some(2.0),
                ..Default::default()
            })
            .unwrap();
        store
            .rollup_minute(&MinuteRollup {
                minute_ts: minute,
                battery_pct: Some(49.5),
                distance_m: Some(1.9),
                ..Default::default()
            })
            .unwrap();

        let battery = store.battery_history(minute).unwrap();
        assert_eq!(battery.len(), 1);
        assert_eq!(battery[0].battery_pct, Some(49.5));

        let distance = store.distance_history(minute).unwrap();
        assert_eq!(distance.len(), 1);
        assert_eq!(distance[0].distance_m, Some(1.9));
    }

    #[test]
    fn events_roundtrip_with_payload() {
        let store = Store::open_in_memory().unwrap();
        store
            .insert_event(500, "distance_warn", &json!({"distance_m": 1.2}))
            .unwrap();
        store.insert_event(600, "wifi_ap", &json!({"ssid": "x"})).unwrap();

        let events = store.events_since(0).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, "distance_warn");
        assert_eq!(events[0].payload.as_ref().unwrap()["distance_m"], 1.2);

        let recent = store.events_since(550).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].kind, "wifi_ap");
    }

    #[test]
    fn minute_floor_rounds_down() {
        assert_eq!(minute_floor(0), 0);
        assert_eq!(minute_floor(59), 0);
        assert_eq!(minute_floor(60), 60);
        assert_eq!(minute_floor(61), 60);
        assert_eq!(minute_floor(1_700_000_123), 1_700_000_100);
    }
}
