//! REST Data Provider
//!
//! Builds the dashboard views from the parking backend's REST API:
//!
//! - `GET /espacios` - occupancy counts and the available-space list
//! - `GET /tickets` - active vehicles and the active-ticket list
//! - `GET /detalle-pago` - revenue for today and this month
//! - `GET /secciones/with-espacios` - per-section breakdown

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

use super::types::revenue_windows;
use super::{
    DataProvider, ProviderError, ProviderResult, SectionOccupancy, Snapshot, SpaceDetail, Ticket,
};

/// Data provider backed by the parking REST API
pub struct RestProvider {
    client: Client,
    base_url: String,
}

/// Payment record as served by `/detalle-pago`
#[derive(Debug, Deserialize)]
struct PaymentDetail {
    #[serde(default, alias = "fecha_pago", rename = "fechaPago")]
    paid_at: String,
    #[serde(default, alias = "pago_total", rename = "pagoTotal")]
    total: f64,
}

impl RestProvider {
    /// Create a provider for the given base URL
    pub fn new(base_url: &str, timeout: Duration) -> ProviderResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ProviderResult<T> {
        let url = format!("{}{}", self.base_url, path);

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ProviderError::Decode(format!("{}: {}", path, e)))
    }

    /// Count of tickets without an exit time; a failing endpoint counts as zero
    async fn active_vehicle_count(&self) -> u32 {
        match self.get_json::<Vec<serde_json::Value>>("/tickets").await {
            Ok(tickets) => count_active(&tickets),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to fetch tickets, reporting 0 active vehicles");
                0
            }
        }
    }

    /// Revenue for today and this month; a failing endpoint counts as zero
    async fn revenue(&self) -> (f64, f64) {
        match self.get_json::<Vec<PaymentDetail>>("/detalle-pago").await {
            Ok(payments) => sum_revenue(&payments, Local::now()),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to fetch payments, reporting 0 revenue");
                (0.0, 0.0)
            }
        }
    }
}

#[async_trait]
impl DataProvider for RestProvider {
    fn name(&self) -> &str {
        "rest"
    }

    async fn fetch_snapshot(&self) -> ProviderResult<Snapshot> {
        let spaces: Vec<serde_json::Value> = self.get_json("/espacios").await?;

        let total = spaces.len() as u32;
        let available = spaces
            .iter()
            .filter(|s| s.get("estado").and_then(|v| v.as_bool()) == Some(true))
            .count() as u32;

        let active = self.active_vehicle_count().await;
        let (today, month) = self.revenue().await;

        Ok(Snapshot::new(available, total - available, total)
            .revenue(today, month)
            .active_vehicles(active))
    }

    async fn fetch_section_breakdown(&self) -> ProviderResult<Vec<SectionOccupancy>> {
        self.get_json("/secciones/with-espacios").await
    }

    async fn fetch_available_spaces(&self) -> ProviderResult<Vec<SpaceDetail>> {
        let spaces: Vec<SpaceDetail> = self.get_json("/espacios").await?;
        Ok(spaces.into_iter().filter(|s| s.estado).collect())
    }

    async fn fetch_active_tickets(&self) -> ProviderResult<Vec<Ticket>> {
        let tickets: Vec<Ticket> = self.get_json("/tickets").await?;
        Ok(tickets.into_iter().filter(Ticket::is_active).collect())
    }

    async fn health_check(&self) -> ProviderResult<()> {
        let url = format!("{}/", self.base_url);
        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() || e.is_connect() {
                ProviderError::Unavailable(e.to_string())
            } else {
                ProviderError::Http(e)
            }
        })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(ProviderError::Status {
                status: response.status().as_u16(),
                body: String::new(),
            })
        }
    }
}

fn count_active(tickets: &[serde_json::Value]) -> u32 {
    tickets
        .iter()
        .filter(|t| {
            let exit = t.get("fechaSalida").or_else(|| t.get("fecha_salida"));
            exit.map_or(true, |v| v.is_null())
        })
        .count() as u32
}

fn sum_revenue(payments: &[PaymentDetail], now: DateTime<Local>) -> (f64, f64) {
    let (start_of_day, start_of_month) = revenue_windows(now);
    let mut today = 0.0;
    let mut month = 0.0;

    for payment in payments {
        let Some(paid_at) = parse_payment_date(&payment.paid_at) else {
            tracing::warn!(date = %payment.paid_at, "Unrecognized payment date, skipping");
            continue;
        };

        if paid_at >= start_of_month {
            month += payment.total;
            if paid_at >= start_of_day {
                today += payment.total;
            }
        }
    }

    (today, month)
}

/// Parse the date formats the backend is known to emit
fn parse_payment_date(value: &str) -> Option<DateTime<Local>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Local));
    }

    // Naive timestamps are taken as UTC, matching the backend's storage
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(chrono::Utc.from_utc_datetime(&naive).with_timezone(&Local));
        }
    }

    // Bare dates belong to the local calendar
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .and_then(|naive| Local.from_local_datetime(&naive).earliest())
}
