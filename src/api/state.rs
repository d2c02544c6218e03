use std::sync::Arc;

use tokio::sync::Mutex;

use crate::ledger::Ledger;
use crate::models::PointsFormula;
use crate::storage::SessionStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SessionStore>,
    pub ledger: Ledger,
    pub default_formula: PointsFormula,
    pub cors_origin: String,
    /// Held across every read-modify-write of the store.
    pub write_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(store: SessionStore, ledger: Ledger, default_formula: PointsFormula) -> Self {
        Self {
            store: Arc::new(store),
            ledger,
            default_formula,
            cors_origin: "*".to_string(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn with_cors_origin(mut self, origin: String) -> Self {
        self.cors_origin = origin;
        self
    }
}
