//! Parking Data Types
//!
//! Immutable values produced by a [`DataProvider`](super::DataProvider) on
//! every fetch. Field names on the wire follow the parking backend's
//! vocabulary so existing dashboards keep working.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

/// Aggregate dashboard snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Spaces currently free
    #[serde(rename = "espacios_disponibles")]
    pub available: u32,
    /// Spaces currently taken
    #[serde(rename = "espacios_ocupados")]
    pub occupied: u32,
    /// All spaces in the lot
    #[serde(rename = "total_espacios")]
    pub total: u32,
    /// Revenue collected since local midnight
    #[serde(rename = "dinero_recaudado_hoy")]
    pub revenue_today: f64,
    /// Revenue collected since the first of the month
    #[serde(rename = "dinero_recaudado_mes")]
    pub revenue_month: f64,
    /// Vehicles holding an open ticket
    #[serde(rename = "vehiculos_activos")]
    pub active_vehicles: u32,
    /// When the snapshot was taken
    pub timestamp: DateTime<Utc>,
}

impl Snapshot {
    /// Build a snapshot stamped with the current time
    pub fn new(available: u32, occupied: u32, total: u32) -> Self {
        Self {
            available,
            occupied,
            total,
            revenue_today: 0.0,
            revenue_month: 0.0,
            active_vehicles: 0,
            timestamp: Utc::now(),
        }
    }

    /// Set revenue totals
    pub fn revenue(mut self, today: f64, month: f64) -> Self {
        self.revenue_today = today;
        self.revenue_month = month;
        self
    }

    /// Set the active vehicle count
    pub fn active_vehicles(mut self, count: u32) -> Self {
        self.active_vehicles = count;
        self
    }
}

/// A single parking space with occupancy details
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpaceDetail {
    pub id: String,
    pub numero: String,
    /// `true` when the space is free
    pub estado: bool,
    #[serde(default, alias = "seccionLetra")]
    pub seccion_letra: String,
    #[serde(
        default,
        alias = "vehiculoPlaca",
        skip_serializing_if = "Option::is_none"
    )]
    pub vehiculo_placa: Option<String>,
    #[serde(
        default,
        alias = "horaIngreso",
        skip_serializing_if = "Option::is_none"
    )]
    pub hora_ingreso: Option<String>,
}

/// Occupancy breakdown for one section of the lot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionOccupancy {
    #[serde(alias = "seccionLetra", alias = "letra_seccion")]
    pub seccion_letra: String,
    #[serde(default, alias = "totalEspacios")]
    pub total_espacios: u32,
    #[serde(default, alias = "espaciosDisponibles")]
    pub espacios_disponibles: u32,
    #[serde(default, alias = "espaciosOcupados")]
    pub espacios_ocupados: u32,
    #[serde(default)]
    pub espacios: Vec<SpaceDetail>,
}

impl SectionOccupancy {
    /// Group spaces under a section letter, deriving the counters
    pub fn from_spaces(letter: impl Into<String>, espacios: Vec<SpaceDetail>) -> Self {
        let available = espacios.iter().filter(|e| e.estado).count() as u32;
        let total = espacios.len() as u32;

        Self {
            seccion_letra: letter.into(),
            total_espacios: total,
            espacios_disponibles: available,
            espacios_ocupados: total - available,
            espacios,
        }
    }
}

/// A parking ticket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: String,
    #[serde(alias = "fechaIngreso")]
    pub fecha_ingreso: DateTime<Utc>,
    #[serde(
        default,
        alias = "fechaSalida",
        skip_serializing_if = "Option::is_none"
    )]
    pub fecha_salida: Option<DateTime<Utc>>,
    #[serde(default, alias = "vehiculoId")]
    pub vehiculo_id: String,
    #[serde(default, alias = "espacioId")]
    pub espacio_id: String,
    #[serde(
        default,
        alias = "detallePagoId",
        skip_serializing_if = "Option::is_none"
    )]
    pub detalle_pago_id: Option<String>,
}

impl Ticket {
    /// A ticket is active until the vehicle leaves
    pub fn is_active(&self) -> bool {
        self.fecha_salida.is_none()
    }
}

/// Emitted when a vehicle takes a space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpaceOccupiedEvent {
    pub espacio_id: String,
    pub numero: String,
    pub vehiculo_placa: String,
    pub hora_ingreso: DateTime<Utc>,
}

/// Emitted when a vehicle leaves and pays
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpaceFreedEvent {
    pub espacio_id: String,
    pub numero: String,
    pub monto_pagado: f64,
    pub hora_salida: DateTime<Utc>,
}

/// Start of the current local day and month, used for revenue windows
pub(crate) fn revenue_windows(now: DateTime<Local>) -> (DateTime<Local>, DateTime<Local>) {
    use chrono::{Datelike, TimeZone};

    let day = now.date_naive();
    let start_of_day = day
        .and_hms_opt(0, 0, 0)
        .unwrap_or_else(|| now.naive_local());
    let start_of_month = day
        .with_day(1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or(start_of_day);

    let to_local = |naive: chrono::NaiveDateTime| {
        Local
            .from_local_datetime(&naive)
            .earliest()
            .unwrap_or(now)
    };

    (to_local(start_of_day), to_local(start_of_month))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_snapshot_wire_names() {
        let snapshot = Snapshot::new(5, 3, 8).revenue(12.5, 300.0).active_vehicles(3);
        let json = serde_json::to_value(&snapshot).unwrap();

        assert_eq!(json["espacios_disponibles"], 5);
        assert_eq!(json["espacios_ocupados"], 3);
        assert_eq!(json["total_espacios"], 8);
        assert_eq!(json["dinero_recaudado_hoy"], 12.5);
        assert_eq!(json["dinero_recaudado_mes"], 300.0);
        assert_eq!(json["vehiculos_activos"], 3);
    }

    #[test]
    fn test_section_from_spaces() {
        let space = |id: &str, free: bool| SpaceDetail {
            id: id.to_string(),
            numero: id.to_string(),
            estado: free,
            seccion_letra: "A".to_string(),
            vehiculo_placa: None,
            hora_ingreso: None,
        };

        let section = SectionOccupancy::from_spaces(
            "A",
            vec![space("1", true), space("2", false), space("3", true)],
        );

        assert_eq!(section.total_espacios, 3);
        assert_eq!(section.espacios_disponibles, 2);
        assert_eq!(section.espacios_ocupados, 1);
    }

    #[test]
    fn test_ticket_accepts_backend_camel_case() {
        let json = r#"{
            "id": "t1",
            "fechaIngreso": "2026-10-17T08:00:00Z",
            "fechaSalida": null,
            "vehiculoId": "v1",
            "espacioId": "e1"
        }"#;
        let ticket: Ticket = serde_json::from_str(json).unwrap();

        assert!(ticket.is_active());
        assert_eq!(ticket.vehiculo_id, "v1");
        assert_eq!(ticket.espacio_id, "e1");
    }

    #[test]
    fn test_space_detail_omits_empty_vehicle() {
        let space = SpaceDetail {
            id: "e1".to_string(),
            numero: "A-01".to_string(),
            estado: true,
            seccion_letra: "A".to_string(),
            vehiculo_placa: None,
            hora_ingreso: None,
        };
        let json = serde_json::to_string(&space).unwrap();
        assert!(!json.contains("vehiculo_placa"));
        assert!(!json.contains("hora_ingreso"));
    }

    #[test]
    fn test_revenue_windows() {
        let now = Local.with_ymd_and_hms(2026, 10, 17, 15, 30, 0).unwrap();
        let (day, month) = revenue_windows(now);

        assert_eq!(day, Local.with_ymd_and_hms(2026, 10, 17, 0, 0, 0).unwrap());
        assert_eq!(month, Local.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap());
    }
}
