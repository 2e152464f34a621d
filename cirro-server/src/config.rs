use cirro_core::{CirroError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OriginConfig {
    /// Address the origin node listens on.
    #[serde(default = "default_origin_listen")]
    pub listen_addr: String,
    /// Directory served by the origin node.
    #[serde(default = "default_serve_dir")]
    pub serve_dir: PathBuf,
    /// File suffixes the origin always serves itself instead of redirecting
    /// to an edge node. Usually `.html` pages, so a client's address bar
    /// keeps showing the origin's address.
    #[serde(default)]
    pub self_served: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeConfig {
    /// Address the edge node listens on.
    #[serde(default = "default_edge_listen")]
    pub listen_addr: String,
    /// Address clients can reach this edge node at; sent to the origin
    /// verbatim at registration.
    #[serde(default = "default_advertise_addr")]
    pub advertise_addr: String,
    /// Base address of the origin node to mirror.
    #[serde(default = "default_origin_addr")]
    pub origin_addr: String,
}

fn default_origin_listen() -> String {
    "0.0.0.0:8192".to_string()
}

fn default_serve_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_edge_listen() -> String {
    "0.0.0.0:8193".to_string()
}

fn default_advertise_addr() -> String {
    "http://localhost:8193".to_string()
}

fn default_origin_addr() -> String {
    "http://localhost:8192".to_string()
}

impl OriginConfig {
    pub fn load(path: Option<&str>) -> Result<Self> {
        load_config(path, "CIRRO_ORIGIN")
    }
}

impl EdgeConfig {
    pub fn load(path: Option<&str>) -> Result<Self> {
        load_config(path, "CIRRO_EDGE")
    }
}

fn load_config<T: serde::de::DeserializeOwned>(path: Option<&str>, env_prefix: &str) -> Result<T> {
    let mut builder = ::config::Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(::config::File::with_name(path));
    }

    let settings = builder
        .add_source(::config::Environment::with_prefix(env_prefix))
        .build()
        .map_err(|error| CirroError::Config(error.to_string()))?;

    settings
        .try_deserialize()
        .map_err(|error| CirroError::Config(error.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_config_file() {
        let origin = OriginConfig::load(None).unwrap();
        assert_eq!(origin.listen_addr, "0.0.0.0:8192");
        assert_eq!(origin.serve_dir, PathBuf::from("."));
        assert!(origin.self_served.is_empty());

        let edge = EdgeConfig::load(None).unwrap();
        assert_eq!(edge.listen_addr, "0.0.0.0:8193");
        assert_eq!(edge.origin_addr, "http://localhost:8192");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("origin.yaml");
        std::fs::write(
            &path,
            "listen_addr: 127.0.0.1:9000\nserve_dir: /srv/www\nself_served:\n  - .html\n  - .htm\n",
        )
        .unwrap();

        let origin = OriginConfig::load(path.to_str()).unwrap();
        assert_eq!(origin.listen_addr, "127.0.0.1:9000");
        assert_eq!(origin.serve_dir, PathBuf::from("/srv/www"));
        assert_eq!(origin.self_served, vec![".html", ".htm"]);
    }
}
