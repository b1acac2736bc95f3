use serde::de::DeserializeOwned;

use crate::environment::Environment;

/// Directory containing configuration files relative to the application root.
const CONFIGURATION_DIR: &str = "configuration";

/// Base configuration file loaded for all environments.
const BASE_CONFIG_FILE: &str = "base.yaml";

/// Prefix for environment variable configuration overrides.
const ENV_PREFIX: &str = "SQLEXPORT";

/// Separator between the environment variable prefix and key segments.
const ENV_PREFIX_SEPARATOR: &str = "_";

/// Separator for nested configuration keys in environment variables.
///
/// Example: `SQLEXPORT_CONNECTION__HOST` sets the `connection.host` field.
const ENV_SEPARATOR: &str = "__";

/// Loads hierarchical configuration from YAML files and environment variables.
///
/// Sources are applied in this order, later ones overriding earlier ones:
/// 1. Base configuration from `configuration/base.yaml`
/// 2. Environment-specific file from `configuration/{environment}.yaml`
/// 3. Environment variable overrides prefixed with `SQLEXPORT`
///
/// Nested keys use double underscores: `SQLEXPORT_CONNECTION__HOST` →
/// `connection.host`.
pub fn load_config<T>() -> Result<T, config::ConfigError>
where
    T: DeserializeOwned,
{
    let base_path = std::env::current_dir()
        .map_err(|err| config::ConfigError::Message(err.to_string()))?;
    let configuration_directory = base_path.join(CONFIGURATION_DIR);

    // Detect the running environment, defaulting to `prod` if unspecified.
    let environment =
        Environment::load().map_err(|err| config::ConfigError::Message(err.to_string()))?;

    let environment_filename = format!("{environment}.yaml");

    let environment_source = config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator(ENV_PREFIX_SEPARATOR)
        .separator(ENV_SEPARATOR);

    let settings = config::Config::builder()
        .add_source(config::File::from(
            configuration_directory.join(BASE_CONFIG_FILE),
        ))
        .add_source(config::File::from(
            configuration_directory.join(environment_filename),
        ))
        .add_source(environment_source)
        .build()?;

    settings.try_deserialize::<T>()
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;
    use crate::shared::PipelineConfig;

    #[test]
    fn environment_file_overrides_base_file() {
        let dir = tempfile::tempdir().unwrap();
        let configuration = dir.path().join(CONFIGURATION_DIR);
        std::fs::create_dir(&configuration).unwrap();

        std::fs::write(
            configuration.join(BASE_CONFIG_FILE),
            concat!(
                "id: 4\n",
                "connection:\n",
                "  host: \"db.internal\"\n",
                "  port: 1433\n",
                "  database: \"exports\"\n",
                "  username: \"exporter\"\n",
                "  password: \"hunter2\"\n",
                "export:\n",
                "  row_event_interval: 100\n",
                "  auto_enable_change_tracking: true\n",
            ),
        )
        .unwrap();
        std::fs::write(
            configuration.join("prod.yaml"),
            concat!(
                "export:\n",
                "  row_event_interval: 500\n",
                "  auto_enable_change_tracking: false\n",
            ),
        )
        .unwrap();

        Environment::Prod.set();
        std::env::set_current_dir(dir.path()).unwrap();

        let config: PipelineConfig = load_config().unwrap();

        assert_eq!(config.id, 4);
        assert_eq!(config.connection.host, "db.internal");
        assert_eq!(
            config.connection.password.unwrap().expose_secret(),
            "hunter2"
        );
        assert_eq!(config.export.row_event_interval, 500);
        assert!(!config.export.auto_enable_change_tracking);
    }
}
