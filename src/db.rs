use deadpool_postgres::{Manager, ManagerConfig, RecyclingMethod, Runtime};

pub use deadpool_postgres::{GenericClient, Object, Pool};

use crate::config;
use crate::error;

pub fn build_pool(config: &config::Db) -> error::Result<Pool> {
    let mut pg_config = tokio_postgres::Config::new();
    pg_config.user(&config.user);
    pg_config.host(&config.host);
    pg_config.port(config.port);
    pg_config.dbname(&config.dbname);

    if let Some(password) = &config.password {
        pg_config.password(password);
    }

    let manager = Manager::from_config(
        pg_config,
        tokio_postgres::NoTls,
        ManagerConfig {
            recycling_method: RecyclingMethod::Fast
        }
    );

    Ok(Pool::builder(manager)
        .max_size(config.pool_size)
        .runtime(Runtime::Tokio1)
        .build()?)
}
