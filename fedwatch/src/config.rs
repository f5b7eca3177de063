use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Deserialize, Clone)]
pub struct SiteHealthConfig {
    pub probe_timeout_s: Option<u64>,
    pub min_probe_delay_s: Option<u64>,
    pub workers: Option<usize>,
    pub queue: Option<usize>,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct Config {
    pub db: Option<PathBuf>,
    pub site_health: Option<SiteHealthConfig>,
}

pub fn load_config(path: Option<&Path>) -> Option<Config> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let p = Path::new("fedwatch.yaml");
            if p.exists() { p.to_path_buf() } else { return None; }
        }
    };
    let s = fs::read_to_string(path).ok()?;
    serde_yaml::from_str(&s).ok()
}
