use std::sync::Arc;

use crate::actor::SessionHandle;
use crate::collaborator::ParseBackend;

#[derive(Clone)]
pub struct AppState {
    pub session: SessionHandle,
}

impl AppState {
    pub fn new(backend: Arc<dyn ParseBackend>) -> Self {
        Self {
            session: SessionHandle::spawn(backend),
        }
    }
}
