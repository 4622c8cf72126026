//! Wire models of the loan service.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// An equipment checkout whose expected return date has passed.
///
/// Produced by the service and replaced wholesale on every poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverdueLoan {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub borrower_name: String,
    #[serde(default)]
    pub borrower_email: String,
    /// ISO-8601 timestamp as sent by the service.
    #[serde(default)]
    pub expected_return_date: String,
    #[serde(default)]
    pub days_overdue: i64,
    #[serde(default)]
    pub status: String,
}

impl OverdueLoan {
    /// Parsed expected return date. Offset-less timestamps are read as UTC.
    pub fn expected_return(&self) -> Option<DateTime<Utc>> {
        let raw = self.expected_return_date.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }
}

#[cfg(test)]
impl OverdueLoan {
    pub(crate) fn sample(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: format!("Equipment {id}"),
            model: "Generic".to_string(),
            borrower_name: "Borrower".to_string(),
            borrower_email: "borrower@example.com".to_string(),
            expected_return_date: "2024-01-01T00:00:00+00:00".to_string(),
            days_overdue: 1,
            status: "Atrasado".to_string(),
        }
    }
}

/// Settings document served by `GET /settings`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Hours between overdue checks. Fractions are allowed (0.25 = 15 min).
    #[serde(default)]
    pub check_interval_hours: Option<f64>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// Body of `PUT /settings`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SettingsUpdate {
    pub check_interval_hours: f64,
}

/// Response of `PUT /settings`.
#[derive(Debug, Clone, Deserialize)]
pub struct SettingsUpdateResponse {
    #[serde(default)]
    pub message: Option<String>,
    pub settings: Settings,
}

/// Dashboard counters served by `GET /stats`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardStats {
    #[serde(default)]
    pub total_equipment: u64,
    #[serde(default)]
    pub available: u64,
    #[serde(default)]
    pub on_loan: u64,
    #[serde(default)]
    pub maintenance: u64,
    #[serde(default)]
    pub overdue: u64,
}
