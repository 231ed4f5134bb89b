#![allow(dead_code)]
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Deserialize, Clone)]
pub struct ScanSection {
    pub ports: Option<String>,
    pub quick: Option<bool>,
    pub timeout_ms: Option<u64>,
    pub format: Option<String>,
    pub history: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct ServeSection {
    pub bind: Option<String>,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct Config {
    pub scan: Option<ScanSection>,
    pub serve: Option<ServeSection>,
}

pub fn load_config(path: Option<&Path>) -> Option<Config> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let p = Path::new("ipsweep.yaml");
            if p.exists() { p.to_path_buf() } else { return None; }
        }
    };
    let s = fs::read_to_string(path).ok()?;
    serde_yaml::from_str(&s).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_both_sections() {
        let cfg: Config = serde_yaml::from_str(
            "scan:\n  ports: \"22,80,443\"\n  quick: false\n  timeout_ms: 500\nserve:\n  bind: \"0.0.0.0:8787\"\n",
        )
        .unwrap();
        let scan = cfg.scan.unwrap();
        assert_eq!(scan.ports.as_deref(), Some("22,80,443"));
        assert_eq!(scan.quick, Some(false));
        assert_eq!(cfg.serve.unwrap().bind.as_deref(), Some("0.0.0.0:8787"));
    }

    #[test]
    fn missing_file_is_none() {
        assert!(load_config(Some(Path::new("/definitely/not/here.yaml"))).is_none());
    }
}
