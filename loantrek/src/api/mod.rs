//! Client side of the loan service REST API.

pub mod client;
pub mod models;

pub use client::{ApiClient, ApiEndpoints, install_rustls_provider};
pub use models::{DashboardStats, OverdueLoan, Settings, SettingsUpdate};
