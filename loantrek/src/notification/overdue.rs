//! Source of overdue loan records.

use std::sync::Arc;

use async_trait::async_trait;

use crate::Result;
use crate::api::{ApiClient, OverdueLoan};

/// Fetches the current list of overdue loans.
///
/// One attempt per call. Callers treat a failure as "no change".
#[async_trait]
pub trait OverdueQuery: Send + Sync {
    async fn fetch(&self) -> Result<Vec<OverdueLoan>>;
}

/// [`OverdueQuery`] over the loan service REST API.
pub struct HttpOverdueQuery {
    client: Arc<ApiClient>,
}

impl HttpOverdueQuery {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl OverdueQuery for HttpOverdueQuery {
    async fn fetch(&self) -> Result<Vec<OverdueLoan>> {
        self.client.overdue_loans().await
    }
}
