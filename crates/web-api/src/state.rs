use std::sync::Arc;

use application::{HubHandle, PersistenceGateway};
use config::ServerConfig;

use crate::JwtService;

#[derive(Clone)]
pub struct AppState {
    pub hub: HubHandle,
    pub gateway: Arc<dyn PersistenceGateway>,
    pub jwt_service: Arc<JwtService>,
    /// 允许的 Origin，为空表示不限制
    pub allowed_origins: Arc<[String]>,
}

impl AppState {
    pub fn new(
        hub: HubHandle,
        gateway: Arc<dyn PersistenceGateway>,
        jwt_service: Arc<JwtService>,
        server: &ServerConfig,
    ) -> Self {
        Self {
            hub,
            gateway,
            jwt_service,
            allowed_origins: server.allowed_origins.clone().into(),
        }
    }

    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        self.allowed_origins.is_empty() || self.allowed_origins.iter().any(|allowed| allowed == origin)
    }
}
