use std::sync::Arc;

use crate::providers::Translate;
use crate::settings::Settings;

#[derive(Clone)]
pub struct ServerState {
    pub(crate) settings: Settings,
    pub(crate) translator: Arc<dyn Translate>,
}

impl ServerState {
    pub fn new(settings: Settings, translator: Arc<dyn Translate>) -> Self {
        Self {
            settings,
            translator,
        }
    }
}
