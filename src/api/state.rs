use std::sync::Arc;
use crate::{
    config::Settings,
    notifications::NotificationDispatcher,
    service::ServiceContext,
};

#[derive(Clone)]
pub struct AppState {
    pub service_context: Arc<ServiceContext>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(
        service_context: Arc<ServiceContext>,
        dispatcher: Arc<NotificationDispatcher>,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            service_context,
            dispatcher,
            settings,
        }
    }
}
