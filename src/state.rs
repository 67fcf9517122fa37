use crate::{
    config::AppConfig,
    db::{DbPool, OrmConn, orm_from_pool},
    middleware::auth::JwtSettings,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub orm: OrmConn,
    pub jwt: JwtSettings,
}

impl AppState {
    pub fn new(pool: DbPool, config: &AppConfig) -> Self {
        let orm = orm_from_pool(&pool);
        Self {
            pool,
            orm,
            jwt: JwtSettings::new(&config.jwt_secret, config.jwt_ttl_hours),
        }
    }
}
