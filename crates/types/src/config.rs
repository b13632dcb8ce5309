//! Streams application configuration.
//!
//! [`StreamsConfig`] collects the settings the topology needs at construction
//! time: application identity, the (external) broker and schema registry
//! locations, and the names of the topics the topology reads and writes.
//! Broker and registry addresses are carried for the external collaborators
//! only; the engine itself never opens a connection.

use crate::{
    constants::{
        DEFAULT_APPLICATION_ID, DEFAULT_REPLICATION_FACTOR, DEFAULT_STATE_DIR,
        RATED_MOVIES_TOPIC_NAME, RAW_MOVIES_TOPIC_NAME, RAW_RATINGS_TOPIC_NAME,
    },
    error::ConfigError,
};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, path::PathBuf};

/// Top-level configuration of a streams application.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamsConfig {
    /// Application identifier.  Used as a prefix for state directories.
    pub application_id: String,

    /// Broker bootstrap servers, `host:port[,host:port...]`.
    pub bootstrap_servers: String,

    /// Schema registry URL handed to value codecs that need one.
    pub schema_registry_url: String,

    /// Replication factor for internal topics.
    pub replication_factor: u16,

    /// Number of stream worker threads.
    ///
    /// The synchronous test driver ignores this setting.  The sharded driver
    /// starts this many workers.
    pub num_stream_threads: usize,

    /// Directory for local state.  Only used to derive per-run paths; the
    /// in-memory stores never write to it.
    pub state_dir: PathBuf,

    /// Topic names.
    pub topics: TopicsConfig,
}

impl Default for StreamsConfig {
    fn default() -> Self {
        Self {
            application_id: DEFAULT_APPLICATION_ID.to_string(),
            bootstrap_servers: "localhost:9092".to_string(),
            schema_registry_url: "http://localhost:8081".to_string(),
            replication_factor: DEFAULT_REPLICATION_FACTOR,
            num_stream_threads: 1,
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
            topics: TopicsConfig::default(),
        }
    }
}

impl StreamsConfig {
    /// Configuration for the given broker and schema registry, with all other
    /// settings at their defaults.
    pub fn new(
        bootstrap_servers: impl Into<String>,
        schema_registry_url: impl Into<String>,
    ) -> Self {
        Self {
            bootstrap_servers: bootstrap_servers.into(),
            schema_registry_url: schema_registry_url.into(),
            ..Self::default()
        }
    }

    pub fn with_state_dir(mut self, state_dir: impl Into<PathBuf>) -> Self {
        self.state_dir = state_dir.into();
        self
    }

    pub fn with_stream_threads(mut self, num_stream_threads: usize) -> Self {
        self.num_stream_threads = num_stream_threads;
        self
    }

    pub fn from_yaml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file.  Files with a `.json` extension are
    /// parsed as JSON, everything else as YAML.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|error| ConfigError::Io {
            path: path.to_path_buf(),
            error,
        })?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&contents),
            _ => Self::from_yaml_str(&contents),
        }
    }

    /// Check the invariants that deserialization alone cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.application_id.trim().is_empty() {
            return Err(ConfigError::invalid("application_id", "must not be empty"));
        }
        if self.bootstrap_servers.trim().is_empty() {
            return Err(ConfigError::invalid("bootstrap_servers", "must not be empty"));
        }
        if self.num_stream_threads == 0 {
            return Err(ConfigError::invalid("num_stream_threads", "must be at least 1"));
        }
        if self.replication_factor == 0 {
            return Err(ConfigError::invalid("replication_factor", "must be at least 1"));
        }
        self.topics.validate()
    }

    /// Per-application state directory, `<state_dir>/<application_id>`.
    pub fn application_state_dir(&self) -> PathBuf {
        self.state_dir.join(&self.application_id)
    }
}

/// Names of the topics read and written by the rated-movies topology.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicsConfig {
    pub raw_movies: String,
    pub raw_ratings: String,
    pub rated_movies: String,
}

impl Default for TopicsConfig {
    fn default() -> Self {
        Self {
            raw_movies: RAW_MOVIES_TOPIC_NAME.to_string(),
            raw_ratings: RAW_RATINGS_TOPIC_NAME.to_string(),
            rated_movies: RATED_MOVIES_TOPIC_NAME.to_string(),
        }
    }
}

impl TopicsConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let topics = [
            ("topics.raw_movies", &self.raw_movies),
            ("topics.raw_ratings", &self.raw_ratings),
            ("topics.rated_movies", &self.rated_movies),
        ];

        for (i, (field, topic)) in topics.iter().enumerate() {
            if topic.trim().is_empty() {
                return Err(ConfigError::invalid(*field, "must not be empty"));
            }
            if topics[..i].iter().any(|(_, other)| other == topic) {
                return Err(ConfigError::DuplicateTopic {
                    topic: topic.to_string(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::{StreamsConfig, TopicsConfig};
    use crate::ConfigError;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn defaults() {
        let config = StreamsConfig::new("broker:9092", "http://registry:8081");
        assert_eq!(config.application_id, "kafka-films");
        assert_eq!(config.bootstrap_servers, "broker:9092");
        assert_eq!(config.topics, TopicsConfig::default());
        assert_eq!(config.topics.rated_movies, "rated-movies");
        config.validate().unwrap();
    }

    #[test]
    fn partial_yaml() {
        let config = StreamsConfig::from_yaml_str(
            r#"
bootstrap_servers: "kafka:9092"
num_stream_threads: 4
topics:
  rated_movies: "movies-with-ratings"
"#,
        )
        .unwrap();

        assert_eq!(config.bootstrap_servers, "kafka:9092");
        assert_eq!(config.num_stream_threads, 4);
        assert_eq!(config.topics.raw_movies, "raw-movies");
        assert_eq!(config.topics.rated_movies, "movies-with-ratings");
    }

    #[test]
    fn json_round_trip() {
        let config = StreamsConfig::new("a:1", "http://b:2").with_stream_threads(2);
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(StreamsConfig::from_json_str(&json).unwrap(), config);
    }

    #[test]
    fn rejects_zero_threads() {
        let err = StreamsConfig::from_yaml_str("num_stream_threads: 0").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidField {
                field: "num_stream_threads",
                ..
            }
        ));
    }

    #[test]
    fn rejects_shared_topic() {
        let err = StreamsConfig::from_yaml_str(
            r#"
topics:
  raw_ratings: "raw-movies"
"#,
        )
        .unwrap_err();
        assert_eq!(err.error_code(), "DuplicateTopic");
    }

    #[test]
    fn from_path() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "application_id: films-test").unwrap();
        let config = StreamsConfig::from_path(file.path()).unwrap();
        assert_eq!(config.application_id, "films-test");
        assert_eq!(
            config.application_state_dir(),
            config.state_dir.join("films-test")
        );

        let missing = StreamsConfig::from_path(&file.path().with_extension("missing"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }
}
