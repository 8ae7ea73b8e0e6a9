use anyhow::Result;
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// A position older than this is no longer LIVE (ms).
    pub live_window_ms: i64,
    /// Fixed sampling cadence for the position publisher (ms).
    pub sample_interval_ms: u64,
    /// Minimum displacement that forces a sample between ticks (meters).
    pub min_displacement_m: f64,
    /// Coarse re-evaluation tick for staleness decay (ms).
    pub reconcile_tick_ms: u64,
    /// Per-query bound on merged inbox snapshots.
    pub message_window: usize,
    pub log_level: String,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        dotenv().ok();

        let live_window_ms = env::var("LIVE_WINDOW_MS")
            .unwrap_or_else(|_| "60000".to_string())
            .parse()
            .unwrap_or(60_000);
        let sample_interval_ms = env::var("SAMPLE_INTERVAL_MS")
            .unwrap_or_else(|_| "15000".to_string())
            .parse()
            .unwrap_or(15_000);
        let min_displacement_m = env::var("MIN_DISPLACEMENT_M")
            .unwrap_or_else(|_| "20".to_string())
            .parse()
            .unwrap_or(20.0);
        let reconcile_tick_ms = env::var("RECONCILE_TICK_MS")
            .unwrap_or_else(|_| "5000".to_string())
            .parse()
            .unwrap_or(5_000);
        let message_window = env::var("MESSAGE_WINDOW")
            .unwrap_or_else(|_| "80".to_string())
            .parse()
            .unwrap_or(80);

        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            live_window_ms,
            sample_interval_ms,
            min_displacement_m,
            reconcile_tick_ms,
            message_window,
            log_level,
        })
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            live_window_ms: 60_000,
            sample_interval_ms: 15_000,
            min_displacement_m: 20.0,
            reconcile_tick_ms: 5_000,
            message_window: 80,
            log_level: "info".to_string(),
        }
    }
}
