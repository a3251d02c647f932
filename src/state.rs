use std::sync::Arc;

use sqlx::PgPool;

use super::{config::Config, db::init_postgres, telegram::Telegram};

pub struct AppState {
    pub config: Config,
    pub db: PgPool,
    pub telegram: Telegram,
}

impl AppState {
    pub async fn new() -> Arc<Self> {
        let config = Config::load();

        let db = init_postgres(&config.database_url).await;
        let telegram = Telegram::new(&config.bot_token, &config.chat_id);

        Arc::new(Self {
            config,
            db,
            telegram,
        })
    }
}
