use std::sync::Arc;

use crate::registry::Registry;
use crate::relay::{Relay, SenderPolicy};

// Shared by every handler and connection task
#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<Relay>,
}

impl AppState {
    pub fn new(policy: SenderPolicy) -> Self {
        AppState {
            relay: Arc::new(Relay::new(Arc::new(Registry::new()), policy)),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        self.relay.registry()
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(SenderPolicy::default())
    }
}
