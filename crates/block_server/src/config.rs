use figment::{
    providers::{Format, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::cache::DEFAULT_CACHE_BYTES;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Address the gRPC server binds.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Object store backend: `local`, `amazon`, `google`, or `microsoft`.
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Root directory for the `local` backend.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Read cache capacity in bytes.
    #[serde(default = "default_cache_bytes")]
    pub cache_bytes: u64,
}

fn default_listen_addr() -> String {
    "0.0.0.0:650".to_string()
}

fn default_backend() -> String {
    "local".to_string()
}

fn default_data_dir() -> String {
    "./river-blocks".to_string()
}

fn default_cache_bytes() -> u64 {
    DEFAULT_CACHE_BYTES
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listen_addr: default_listen_addr(),
            backend: default_backend(),
            data_dir: default_data_dir(),
            cache_bytes: default_cache_bytes(),
        }
    }
}

impl Config {
    pub fn from_path(path: &str) -> anyhow::Result<Config> {
        let config: Config = Figment::new().merge(Yaml::file(path)).extract()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_serve_local_blocks() {
        let config = Config::default();
        assert_eq!(config.backend, "local");
        assert_eq!(config.listen_addr, "0.0.0.0:650");
        assert_eq!(config.cache_bytes, DEFAULT_CACHE_BYTES);
    }

    #[test]
    fn yaml_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "backend: amazon\ncache_bytes: 1048576\n",
        )
        .unwrap();

        let config = Config::from_path(path.to_str().unwrap()).unwrap();
        assert_eq!(config.backend, "amazon");
        assert_eq!(config.cache_bytes, 1_048_576);
        assert_eq!(config.listen_addr, "0.0.0.0:650");
    }
}
