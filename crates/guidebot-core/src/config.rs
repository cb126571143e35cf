use std::{env, fs, path::Path, time::Duration};

use crate::{domain::UserId, entities::Coordinates, errors::Error, Result};

/// Typed configuration, read from the environment (plus an optional `.env`).
#[derive(Clone, Debug)]
pub struct Config {
    // Core
    pub bot_token: String,
    pub admin_ids: Vec<UserId>,
    pub database_path: String,

    // Third-party services; `None` turns the provider off.
    pub yandex_weather_api_key: Option<String>,
    pub yandex_maps_api_key: Option<String>,
    pub yandex_taxi_api_key: Option<String>,

    // Outbox delivery
    pub dispatch_interval: Duration,

    // Rate limiting
    pub rate_limit_enabled: bool,
    pub rate_limit_requests: u32,
    pub rate_limit_window: Duration,

    /// Starting point assumed for travelers (routes, taxi quotes).
    pub default_user_location: Coordinates,
}

/// Central Moscow.
const DEFAULT_LAT: f64 = 55.7558;
const DEFAULT_LON: f64 = 37.6173;

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(env_str)
    }

    /// Build from an arbitrary key lookup. `load` uses the process env.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let bot_token = get("BOT_TOKEN").and_then(non_empty).ok_or_else(|| {
            Error::Config("BOT_TOKEN environment variable is required".to_string())
        })?;

        let admin_ids = parse_csv_i64(get("ADMIN_IDS"))
            .into_iter()
            .map(UserId)
            .collect();
        let database_path = get("DATABASE_PATH")
            .and_then(non_empty)
            .unwrap_or_else(|| "guidebot.sqlite".to_string());

        let yandex_weather_api_key = get("YANDEX_WEATHER_API_KEY").and_then(non_empty);
        let yandex_maps_api_key = get("YANDEX_MAPS_API_KEY").and_then(non_empty);
        let yandex_taxi_api_key = get("YANDEX_TAXI_API_KEY").and_then(non_empty);

        let dispatch_interval =
            Duration::from_secs(parse_u64(get("DISPATCH_INTERVAL_SECS")).unwrap_or(10).max(1));

        let rate_limit_enabled = parse_bool(get("RATE_LIMIT_ENABLED")).unwrap_or(true);
        let rate_limit_requests = parse_u64(get("RATE_LIMIT_REQUESTS"))
            .map(|n| n.min(u32::MAX as u64) as u32)
            .unwrap_or(20);
        let rate_limit_window = Duration::from_secs(parse_u64(get("RATE_LIMIT_WINDOW")).unwrap_or(60));

        let default_user_location = Coordinates {
            lat: parse_f64(get("DEFAULT_USER_LAT")).unwrap_or(DEFAULT_LAT),
            lon: parse_f64(get("DEFAULT_USER_LON")).unwrap_or(DEFAULT_LON),
        };

        Ok(Self {
            bot_token,
            admin_ids,
            database_path,
            yandex_weather_api_key,
            yandex_maps_api_key,
            yandex_taxi_api_key,
            dispatch_interval,
            rate_limit_enabled,
            rate_limit_requests,
            rate_limit_window,
            default_user_location,
        })
    }

    pub fn is_admin(&self, user: UserId) -> bool {
        self.admin_ids.contains(&user)
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn parse_bool(v: Option<String>) -> Option<bool> {
    v.map(|s| {
        matches!(
            s.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn parse_u64(v: Option<String>) -> Option<u64> {
    v.and_then(|s| s.trim().parse::<u64>().ok())
}

fn parse_f64(v: Option<String>) -> Option<f64> {
    v.and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|f| f.is_finite())
}

fn parse_csv_i64(v: Option<String>) -> Vec<i64> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<i64>().ok())
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s.trim().to_string())
    }
}
