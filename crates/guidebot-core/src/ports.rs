//! Ports for the third-party travel services (weather, routing, taxi).
//!
//! Adapters never fail loudly: anything that goes wrong on their side
//! (missing key, HTTP error, unexpected payload) comes back as
//! [`Lookup::Unavailable`] and the caller degrades the message.

use std::{fmt, sync::Arc};

use async_trait::async_trait;

use crate::entities::Coordinates;

#[derive(Clone, Debug, PartialEq)]
pub enum Lookup<T> {
    Found(T),
    Unavailable,
}

impl<T> Lookup<T> {
    pub fn found(self) -> Option<T> {
        match self {
            Self::Found(v) => Some(v),
            Self::Unavailable => None,
        }
    }

    pub fn as_ref(&self) -> Lookup<&T> {
        match self {
            Self::Found(v) => Lookup::Found(v),
            Self::Unavailable => Lookup::Unavailable,
        }
    }
}

impl<T> From<Option<T>> for Lookup<T> {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Unavailable, Self::Found)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Weather {
    pub temp_c: f64,
    /// Provider condition code, e.g. `clear`, `light-rain`, `overcast`.
    pub condition: String,
}

impl fmt::Display for Weather {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.0}°C, {}", self.temp_c, self.condition)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Route {
    pub minutes: u32,
    pub map_link: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TaxiQuote {
    pub price: f64,
    pub order_url: String,
}

#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn forecast(&self, at: Coordinates) -> Lookup<Weather>;
}

#[async_trait]
pub trait RouteProvider: Send + Sync {
    async fn walking_route(&self, from: Coordinates, to: Coordinates) -> Lookup<Route>;
}

#[async_trait]
pub trait TaxiProvider: Send + Sync {
    async fn quote(&self, from: Coordinates, to: Coordinates) -> Lookup<TaxiQuote>;
}

#[derive(Clone)]
pub struct Providers {
    pub weather: Arc<dyn WeatherProvider>,
    pub routes: Arc<dyn RouteProvider>,
    pub taxi: Arc<dyn TaxiProvider>,
}

/// Always `Unavailable`. Stands in for a provider with no API key.
#[derive(Clone, Copy, Debug, Default)]
pub struct Offline;

#[async_trait]
impl WeatherProvider for Offline {
    async fn forecast(&self, _at: Coordinates) -> Lookup<Weather> {
        Lookup::Unavailable
    }
}

#[async_trait]
impl RouteProvider for Offline {
    async fn walking_route(&self, _from: Coordinates, _to: Coordinates) -> Lookup<Route> {
        Lookup::Unavailable
    }
}

#[async_trait]
impl TaxiProvider for Offline {
    async fn quote(&self, _from: Coordinates, _to: Coordinates) -> Lookup<TaxiQuote> {
        Lookup::Unavailable
    }
}

impl Providers {
    pub fn offline() -> Self {
        Self {
            weather: Arc::new(Offline),
            routes: Arc::new(Offline),
            taxi: Arc::new(Offline),
        }
    }
}
