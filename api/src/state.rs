use std::sync::Arc;

use sqlx::PgPool;

use crate::auth::InternalToken;
use crate::broker::BrokerService;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub broker: Arc<BrokerService>,
    pub internal_token: InternalToken,
}
