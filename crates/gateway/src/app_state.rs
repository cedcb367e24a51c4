use std::sync::Arc;

use auth::TokenConfig;
use hub::Hub;

use crate::{session::SessionAuth, ws::HeartbeatConfig};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) tokens: TokenConfig,
    pub(crate) hub: Arc<Hub>,
    pub(crate) session_auth: Arc<dyn SessionAuth>,
    pub(crate) heartbeat: HeartbeatConfig,
}
