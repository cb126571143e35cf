//! Yandex adapters for the travel-info ports (weather, walking routes, taxi).
//!
//! Every provider degrades to `Lookup::Unavailable` on any failure; the
//! reason is logged here and never reaches the user.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize};

use guidebot_core::{
    config::Config,
    entities::Coordinates,
    errors::Error,
    ports::{
        Lookup, Offline, Providers, Route, RouteProvider, TaxiProvider, TaxiQuote, Weather,
        WeatherProvider,
    },
    Result,
};

const WEATHER_URL: &str = "https://api.weather.yandex.ru/v2/forecast";
const ROUTE_URL: &str = "https://api.routing.yandex.net/v2/route";
const TAXI_URL: &str = "https://taxi-routeinfo.taxi.yandex.net/route_info";
const TAXI_CLASS: &str = "econom";

/// Shared HTTP client with a short timeout: a slow provider must not hold
/// up a booking confirmation.
#[derive(Clone, Debug)]
struct Http {
    client: reqwest::Client,
}

impl Http {
    fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "reqwest client build failed; using defaults");
                reqwest::Client::new()
            });
        Self { client }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        service: &'static str,
        req: reqwest::RequestBuilder,
    ) -> Result<T> {
        let resp = req
            .send()
            .await
            .map_err(|e| Error::External(format!("{service} request error: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::External(format!(
                "{service} failed: {status} {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        resp.json()
            .await
            .map_err(|e| Error::External(format!("{service} json error: {e}")))
    }
}

fn degrade<T>(service: &'static str, res: Result<T>) -> Lookup<T> {
    match res {
        Ok(v) => Lookup::Found(v),
        Err(e) => {
            tracing::warn!(service, error = %e, "lookup unavailable");
            Lookup::Unavailable
        }
    }
}

// ============== Weather ==============

#[derive(Deserialize)]
struct ForecastResponse {
    fact: Fact,
}

#[derive(Deserialize)]
struct Fact {
    temp: f64,
    condition: String,
}

impl From<ForecastResponse> for Weather {
    fn from(r: ForecastResponse) -> Self {
        Self {
            temp_c: r.fact.temp,
            condition: r.fact.condition,
        }
    }
}

pub struct YandexWeather {
    api_key: String,
    http: Http,
}

impl YandexWeather {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            http: Http::new(),
        }
    }

    async fn fetch(&self, at: Coordinates) -> Result<Weather> {
        let req = self
            .http
            .client
            .get(WEATHER_URL)
            .header("X-Yandex-API-Key", &self.api_key)
            .query(&[
                ("lat", at.lat.to_string()),
                ("lon", at.lon.to_string()),
                ("limit", "1".to_string()),
            ]);
        let resp: ForecastResponse = self.http.get_json("yandex weather", req).await?;
        Ok(resp.into())
    }
}

#[async_trait]
impl WeatherProvider for YandexWeather {
    async fn forecast(&self, at: Coordinates) -> Lookup<Weather> {
        degrade("yandex weather", self.fetch(at).await)
    }
}

// ============== Walking routes ==============

#[derive(Deserialize)]
struct RouteResponse {
    #[serde(default)]
    routes: Vec<RouteLeg>,
}

#[derive(Deserialize)]
struct RouteLeg {
    /// Seconds.
    duration: f64,
}

impl RouteResponse {
    fn minutes(&self) -> Option<u32> {
        let secs = self.routes.first()?.duration;
        (secs.is_finite() && secs >= 0.0).then(|| (secs / 60.0).round() as u32)
    }
}

pub fn walking_map_link(from: Coordinates, to: Coordinates) -> String {
    format!(
        "https://yandex.ru/maps/?rtext={},{}~{},{}&rtt=pd",
        from.lat, from.lon, to.lat, to.lon
    )
}

pub struct YandexRoutes {
    api_key: String,
    http: Http,
}

impl YandexRoutes {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            http: Http::new(),
        }
    }

    async fn fetch(&self, from: Coordinates, to: Coordinates) -> Result<Route> {
        let req = self.http.client.get(ROUTE_URL).query(&[
            (
                "waypoints",
                format!("{},{}|{},{}", from.lat, from.lon, to.lat, to.lon),
            ),
            ("mode", "walking".to_string()),
            ("apikey", self.api_key.clone()),
        ]);
        let resp: RouteResponse = self.http.get_json("yandex routing", req).await?;
        let minutes = resp
            .minutes()
            .ok_or_else(|| Error::External("yandex routing returned no routes".to_string()))?;
        Ok(Route {
            minutes,
            map_link: walking_map_link(from, to),
        })
    }
}

#[async_trait]
impl RouteProvider for YandexRoutes {
    async fn walking_route(&self, from: Coordinates, to: Coordinates) -> Lookup<Route> {
        degrade("yandex routing", self.fetch(from, to).await)
    }
}

// ============== Taxi ==============

#[derive(Deserialize)]
struct RouteInfoResponse {
    #[serde(default)]
    options: Vec<TaxiOption>,
}

#[derive(Deserialize)]
struct TaxiOption {
    price: f64,
}

pub fn taxi_order_url(from: Coordinates, to: Coordinates) -> String {
    format!(
        "https://taxi.yandex.ru/order?cl={TAXI_CLASS}&from={},{}&to={},{}",
        from.lat, from.lon, to.lat, to.lon
    )
}

pub struct YandexTaxi {
    api_key: String,
    http: Http,
}

impl YandexTaxi {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            http: Http::new(),
        }
    }

    async fn fetch(&self, from: Coordinates, to: Coordinates) -> Result<TaxiQuote> {
        // route_info takes lon,lat pairs.
        let req = self.http.client.get(TAXI_URL).query(&[
            ("cl", TAXI_CLASS.to_string()),
            (
                "rll",
                format!("{},{}~{},{}", from.lon, from.lat, to.lon, to.lat),
            ),
            ("apikey", self.api_key.clone()),
        ]);
        let resp: RouteInfoResponse = self.http.get_json("yandex taxi", req).await?;
        let price = resp
            .options
            .first()
            .map(|o| o.price)
            .ok_or_else(|| Error::External("yandex taxi returned no options".to_string()))?;
        Ok(TaxiQuote {
            price,
            order_url: taxi_order_url(from, to),
        })
    }
}

#[async_trait]
impl TaxiProvider for YandexTaxi {
    async fn quote(&self, from: Coordinates, to: Coordinates) -> Lookup<TaxiQuote> {
        degrade("yandex taxi", self.fetch(from, to).await)
    }
}

// ============== Wiring ==============

/// Providers for the configured keys. A missing key swaps in [`Offline`]
/// and is reported once, here.
pub fn providers_from(cfg: &Config) -> Providers {
    let offline = |name: &str| {
        tracing::warn!(provider = name, "API key not set; provider disabled");
        Arc::new(Offline)
    };

    Providers {
        weather: match &cfg.yandex_weather_api_key {
            Some(key) => Arc::new(YandexWeather::new(key.clone())),
            None => offline("weather"),
        },
        routes: match &cfg.yandex_maps_api_key {
            Some(key) => Arc::new(YandexRoutes::new(key.clone())),
            None => offline("routes"),
        },
        taxi: match &cfg.yandex_taxi_api_key {
            Some(key) => Arc::new(YandexTaxi::new(key.clone())),
            None => offline("taxi"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KAZAN: Coordinates = Coordinates {
        lat: 55.79,
        lon: 49.12,
    };
    const MOSCOW: Coordinates = Coordinates {
        lat: 55.7558,
        lon: 37.6173,
    };

    #[test]
    fn decodes_forecast_fact() {
        let body = r#"{"now": 1700000000, "fact": {"temp": -2, "feels_like": -7, "condition": "light-snow"}}"#;
        let w: Weather = serde_json::from_str::<ForecastResponse>(body).unwrap().into();
        assert_eq!(w.temp_c, -2.0);
        assert_eq!(w.condition, "light-snow");
    }

    #[test]
    fn route_minutes_from_first_route() {
        let r: RouteResponse =
            serde_json::from_str(r#"{"routes": [{"duration": 1530}, {"duration": 99999}]}"#).unwrap();
        assert_eq!(r.minutes(), Some(26));

        let empty: RouteResponse = serde_json::from_str(r#"{"routes": []}"#).unwrap();
        assert_eq!(empty.minutes(), None);
        let missing: RouteResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(missing.minutes(), None);
    }

    #[test]
    fn taxi_options_and_links() {
        let r: RouteInfoResponse = serde_json::from_str(
            r#"{"currency": "RUB", "options": [{"class_name": "econom", "price": 412.0}]}"#,
        )
        .unwrap();
        assert_eq!(r.options[0].price, 412.0);

        assert_eq!(
            taxi_order_url(MOSCOW, KAZAN),
            "https://taxi.yandex.ru/order?cl=econom&from=55.7558,37.6173&to=55.79,49.12"
        );
        assert_eq!(
            walking_map_link(MOSCOW, KAZAN),
            "https://yandex.ru/maps/?rtext=55.7558,37.6173~55.79,49.12&rtt=pd"
        );
    }

    #[tokio::test]
    async fn missing_keys_mean_offline_providers() {
        let cfg = Config::from_lookup(|k| (k == "BOT_TOKEN").then(|| "t".to_string())).unwrap();
        let p = providers_from(&cfg);
        assert_eq!(p.weather.forecast(KAZAN).await, Lookup::Unavailable);
        assert_eq!(p.routes.walking_route(MOSCOW, KAZAN).await, Lookup::Unavailable);
        assert_eq!(p.taxi.quote(MOSCOW, KAZAN).await, Lookup::Unavailable);
    }
}
