use crate::event_log::DEFAULT_LOG_CAP;
use crate::link::LinkConfig;
use crate::map::{GeoPoint, DEFAULT_PATH_CAP};
use crate::pipeline::{GatePolicy, PipelineConfig, DEFAULT_HISTORY_CAP};
use crate::sequences::DEFAULT_COUNTDOWN;
use std::str::FromStr;
use std::time::Duration;

pub const LAUNCH_SITE: GeoPoint = GeoPoint {
    lat: 18.7291,
    lng: 73.4642,
};

const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Everything tunable about the ground station, read from `GS_*` variables.
#[derive(Clone, Debug)]
pub struct GroundConfig {
    pub bind_addr: String,
    pub db_path: String,
    pub pipeline: PipelineConfig,
    pub log_cap: usize,
    pub map_path_cap: usize,
    pub launch_site: GeoPoint,
    pub sim_period: Duration,
    pub sim_autostart: bool,
    pub save_period: Duration,
    pub countdown: Duration,
    pub link: LinkConfig,
}

impl GroundConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let parse = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());
        let millis = |key: &str, default: u64| Duration::from_millis(parse(key).unwrap_or(default));
        // timer periods must be non-zero
        let period = |key: &str, default: u64| millis(key, default).max(MIN_PERIOD);
        let flag = |key: &str| lookup(key).is_some_and(|v| v.trim() != "0" && !v.trim().is_empty());
        let float = |key: &str, default: f64| {
            lookup(key)
                .and_then(|v| f64::from_str(v.trim()).ok())
                .unwrap_or(default)
        };

        Self {
            bind_addr: lookup("GS_BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
            db_path: lookup("GS_DB_PATH")
                .unwrap_or_else(|| "./data/mission_control.db".to_string()),
            pipeline: PipelineConfig {
                history_cap: parse("GS_HISTORY_CAP")
                    .map(|v| v as usize)
                    .unwrap_or(DEFAULT_HISTORY_CAP),
                gate: GatePolicy {
                    require_connected: flag("GS_REQUIRE_CONNECTED"),
                    require_link: flag("GS_REQUIRE_LINK"),
                },
            },
            log_cap: parse("GS_LOG_CAP")
                .map(|v| v as usize)
                .unwrap_or(DEFAULT_LOG_CAP),
            map_path_cap: parse("GS_MAP_PATH_CAP")
                .map(|v| v as usize)
                .unwrap_or(DEFAULT_PATH_CAP),
            launch_site: GeoPoint {
                lat: float("GS_LAUNCH_LAT", LAUNCH_SITE.lat),
                lng: float("GS_LAUNCH_LON", LAUNCH_SITE.lng),
            },
            sim_period: period("GS_SIM_PERIOD_MS", 500),
            sim_autostart: flag("GS_SIM_AUTOSTART"),
            save_period: period("GS_SAVE_PERIOD_MS", 2_000),
            countdown: parse("GS_COUNTDOWN_SECS")
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_COUNTDOWN),
            link: LinkConfig {
                retries: parse("GS_LINK_RETRIES")
                    .and_then(|v| u32::try_from(v).ok())
                    .unwrap_or(3),
                retry_delay: millis("GS_LINK_RETRY_DELAY_MS", 1_000),
                sensor_init_delay: millis("GS_SENSOR_INIT_MS", 500),
            },
        }
    }
}
