//! Server state.

use reportwatch_core::ReportService;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// The report operations behind every route.
    pub service: Arc<ReportService>,
}

impl AppState {
    /// Create new app state.
    pub fn new(service: Arc<ReportService>) -> Self {
        Self { service }
    }
}
