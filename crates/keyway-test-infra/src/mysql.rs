use crate::Result;
use testcontainers::core::{IntoContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::ImageExt;
use testcontainers::{ContainerAsync, GenericImage};
use typed_builder::TypedBuilder;

const MYSQL_PORT: u16 = 3306;

/// Credentials and image tag of a test MySQL server.
#[derive(Debug, Clone, TypedBuilder)]
pub struct MysqlConfig {
    #[builder(default = "keyway".to_string())]
    database: String,
    #[builder(default = "keyway".to_string())]
    username: String,
    #[builder(default = "keyway".to_string())]
    password: String,
    #[builder(default = "8.4".to_string())]
    tag: String,
}

/// A disposable MySQL server holding one empty database.
///
/// The container is removed when the value is dropped. The server may still
/// be finishing its startup when `new` returns, so callers should retry
/// their first connection.
pub struct MySqlServer {
    container: ContainerAsync<GenericImage>,
    config: MysqlConfig,
}

impl MySqlServer {
    pub async fn new(config: MysqlConfig) -> Result<Self> {
        let container = GenericImage::new("mysql", config.tag.as_str())
            .with_exposed_port(MYSQL_PORT.tcp())
            .with_wait_for(WaitFor::message_on_stderr("ready for connections"))
            .with_env_var("MYSQL_DATABASE", config.database.as_str())
            .with_env_var("MYSQL_USER", config.username.as_str())
            .with_env_var("MYSQL_PASSWORD", config.password.as_str())
            .with_env_var("MYSQL_ROOT_PASSWORD", config.password.as_str())
            .start()
            .await?;
        Ok(Self { container, config })
    }

    /// `mysql://` URL of the test database, as accepted by sqlx.
    pub async fn database_url(&self) -> Result<String> {
        let host = self.container.get_host().await?;
        let port = self.container.get_host_port_ipv4(MYSQL_PORT).await?;
        let MysqlConfig {
            database,
            username,
            password,
            ..
        } = &self.config;
        Ok(format!(
            "mysql://{username}:{password}@{host}:{port}/{database}"
        ))
    }
}
