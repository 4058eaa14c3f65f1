pub mod config {
    use serde::Deserialize;

    #[derive(Deserialize, Debug, Clone)]
    pub struct Config {
        pub db_url: String,
        #[serde(default = "default_port")]
        pub port: u16,
        pub jwt_secret: String,
    }

    impl Config {
        /// Loads configuration from environment variables.
        pub fn from_env() -> anyhow::Result<Self> {
            let settings = config::Config::builder()
                .add_source(config::Environment::default())
                .build()?;

            let config: Config = settings.try_deserialize()?;
            Ok(config)
        }
    }

    fn default_port() -> u16 {
        8080
    }
}

pub mod validation {
    use std::collections::BTreeMap;
    use std::fmt;

    /// Accumulated field validation errors, serialized as a
    /// field -> messages map.
    #[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
    #[serde(transparent)]
    pub struct ValidationErrors {
        errors: BTreeMap<String, Vec<String>>,
    }

    impl ValidationErrors {
        pub fn new() -> Self {
            Self::default()
        }

        /// Records a message against a field. Fields keep their messages in
        /// the order they were added.
        pub fn add(&mut self, field: &str, message: impl Into<String>) {
            self.errors
                .entry(field.to_string())
                .or_default()
                .push(message.into());
        }

        pub fn is_empty(&self) -> bool {
            self.errors.is_empty()
        }

        /// Flattens the map into "field: message" lines for template
        /// rendering.
        pub fn messages(&self) -> Vec<String> {
            self.errors
                .iter()
                .flat_map(|(field, messages)| {
                    messages.iter().map(move |m| format!("{}: {}", field, m))
                })
                .collect()
        }
    }

    impl fmt::Display for ValidationErrors {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.messages().join("; "))
        }
    }

}

pub mod auth;
pub mod entities;
pub mod task;
pub mod user;
pub mod web;
