use serde::Deserialize;

/// Application settings read from `Rocket.toml` or `ROCKET_*` environment
/// variables alongside Rocket's own configuration.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    #[serde(default = "default_database_path")]
    pub database_path: String,
    /// Honour the `is_admin` flag on the registration form.
    #[serde(default)]
    pub allow_staff_registration: bool,
}

fn default_database_path() -> String {
    "rtracker.db".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            database_path: default_database_path(),
            allow_staff_registration: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rocket::figment::Figment;

    #[test]
    fn defaults_apply_when_keys_are_missing() {
        let config: AppConfig = Figment::new().extract().unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn explicit_keys_override_defaults() {
        let config: AppConfig = Figment::new()
            .merge(("database_path", ":memory:"))
            .merge(("allow_staff_registration", true))
            .extract()
            .unwrap();

        assert_eq!(config.database_path, ":memory:");
        assert!(config.allow_staff_registration);
    }
}
