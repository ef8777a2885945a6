//! Schema definition and default settings seeding.

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;

/// Current schema version, recorded in the `schema_version` table.
pub const SCHEMA_VERSION: i64 = 1;

const DDL: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS settings (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS samples (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        ts INTEGER NOT NULL,
        distance_m REAL,
        ambient_rate REAL,
        bus_voltage_v REAL,
        shunt_voltage_v REAL,
        current_a REAL,
        power_w REAL
    )",
    "CREATE TABLE IF NOT EXISTS metrics_battery_minute (
        minute_ts INTEGER PRIMARY KEY,
        battery_pct REAL,
        bus_voltage_v REAL,
        current_a REAL,
        power_w REAL
    )",
    "CREATE TABLE IF NOT EXISTS metrics_distance_minute (
        minute_ts INTEGER PRIMARY KEY,
        distance_m REAL
    )",
    "CREATE TABLE IF NOT EXISTS events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        ts INTEGER NOT NULL,
        kind TEXT NOT NULL,
        payload TEXT
    )",
    "CREATE TABLE IF NOT EXISTS schema_version (
        version INTEGER NOT NULL
    )",
];

/// Every recognized setting, seeded once; existing values are never
/// overwritten.
const DEFAULT_SETTINGS: &[(&str, &str)] = &[
    ("battery.voltage_full", "4.2"),
    ("battery.voltage_empty", "3.3"),
    ("battery.internal_resistance_ohm", "0.15"),
    ("battery.shutdown_voltage", "0"),
    ("distance.min_m", "0.2"),
    ("distance.max_m", "4.0"),
    ("warn.enabled", "true"),
    ("warn.distance_threshold_m", "1.5"),
    ("warn.freq_min_hz", "0.1"),
    ("warn.freq_max_hz", "20.0"),
    ("led.master_on", "true"),
    ("led.brightness", "0.3"),
    ("led.color_white", "#FFFFFF"),
    ("led.color_warn", "#FF0000"),
    ("wifi.try_seconds", "30"),
    ("wifi.ap_ssid", "PiSentry-AP"),
    ("wifi.ap_password", "change-me-1234"),
    ("ina219.shunt_ohms", "0.1"),
    ("tof.timing_budget_ms", "20"),
    ("tof.distance_mode", "1"),
    ("tof.smoothing_alpha", "0.7"),
];

/// Create missing tables, seed default settings, and stamp the schema
/// version. Safe to run on every startup.
pub fn migrate(conn: &Connection) -> Result<()> {
    for ddl in DDL {
        conn.execute(ddl, [])?;
    }

    let mut seed = conn.prepare("INSERT OR IGNORE INTO settings (key, value) VALUES (?1, ?2)")?;
    for (key, value) in DEFAULT_SETTINGS {
        seed.execute(params![key, value])?;
    }
    drop(seed);

    let recorded: Option<i64> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .optional()?;
    match recorded {
        None => {
            conn.execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                params![SCHEMA_VERSION],
            )?;
        }
        Some(v) if v < SCHEMA_VERSION => {
            conn.execute(
                "UPDATE schema_version SET version = ?1",
                params![SCHEMA_VERSION],
            )?;
        }
        Some(_) => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrate_seeds_defaults_once() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();

        conn.execute(
            "UPDATE settings SET value = '9.9' WHERE key = 'battery.voltage_full'",
            [],
        )
        .unwrap();

        // A second run must not clobber user-set values.
        migrate(&conn).unwrap();
        let value: String = conn
            .query_row(
                "SELECT value FROM settings WHERE key = 'battery.voltage_full'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(value, "9.9");

        let version: i64 = conn
            .query_row("SELECT version FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }
}
