use crate::acl::PermissionGrant;
use config::{Config as SettingsLoader, Environment};
use serde::Deserialize;
use std::{
    collections::HashMap,
    net::SocketAddr,
    path::{Path, PathBuf},
};

const DEFAULT_BIND: &str = "127.0.0.1:9292";
const DEFAULT_MAX_BODY_SIZE: usize = 50 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind: SocketAddr,
    pub data_dir: PathBuf,
    pub log_level: String,
    /// Grants every caller the anonymous identity and every permission.
    /// Never inferred; only an explicit `open_access: true` (or
    /// `GEMGATE_OPEN_ACCESS=true`) enables it.
    pub open_access: bool,
    pub max_body_size: usize,
    pub users: HashMap<String, String>,
    pub grants: Vec<PermissionGrant>,
}

impl Config {
    pub fn defaults() -> Self {
        Self {
            bind: DEFAULT_BIND.parse().expect("default bind address"),
            data_dir: PathBuf::from("./data"),
            log_level: "info".to_string(),
            open_access: false,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            users: HashMap::new(),
            grants: default_grants(),
        }
    }

    pub fn from_env() -> Result<Self, String> {
        let env_cfg = load_gemgate_env()?;
        let mut cfg = Self::defaults();
        cfg.apply_env_overrides(&env_cfg)?;
        Ok(cfg)
    }

    pub fn from_env_with_config_file(config_path: PathBuf) -> Result<Self, String> {
        let env_cfg = load_gemgate_env()?;
        let mut cfg = Self::from_yaml_file(&config_path)?;
        cfg.apply_env_overrides(&env_cfg)?;
        Ok(cfg)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self, String> {
        let text = std::fs::read_to_string(path)
            .map_err(|err| format!("failed to read {}: {err}", path.display()))?;
        Self::from_yaml_str(&path.display().to_string(), &text)
    }

    pub fn from_yaml_str(source: &str, text: &str) -> Result<Self, String> {
        let parsed: YamlConfig = serde_yaml::from_str(text)
            .map_err(|err| format!("failed to parse {source}: {err}"))?;
        let mut cfg = Self::defaults();

        if let Some(bind) = parsed.bind {
            cfg.bind = bind
                .parse()
                .map_err(|err| format!("invalid bind address `{bind}`: {err}"))?;
        }
        if let Some(data_dir) = parsed.data_dir {
            cfg.data_dir = PathBuf::from(data_dir);
        }
        if let Some(log_level) = parsed.log_level {
            cfg.log_level = log_level;
        }
        if let Some(open_access) = parsed.open_access {
            cfg.open_access = open_access;
        }
        if let Some(max_body_size) = parsed.max_body_size {
            cfg.max_body_size = max_body_size;
        }
        if let Some(users) = parsed.users {
            cfg.users = users;
        }
        if let Some(permissions) = parsed.permissions {
            cfg.grants = permissions
                .into_iter()
                .map(|(permission, principals)| PermissionGrant {
                    permission,
                    principals,
                })
                .collect();
        }
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self, env_cfg: &RawEnvConfig) -> Result<(), String> {
        if let Some(bind) = env_cfg.bind.as_deref() {
            self.bind = bind
                .parse()
                .map_err(|err| format!("invalid GEMGATE_BIND `{bind}`: {err}"))?;
        }
        if let Some(data_dir) = env_cfg.data_dir.as_deref() {
            self.data_dir = PathBuf::from(data_dir);
        }
        if let Some(log_level) = env_cfg.log_level.as_deref() {
            self.log_level = log_level.to_string();
        }
        if let Some(open_access) = parse_env_value::<bool>(env_cfg.open_access.as_deref()) {
            self.open_access = open_access;
        }
        if let Some(max_body_size) = parse_env_value::<usize>(env_cfg.max_body_size.as_deref()) {
            self.max_body_size = max_body_size;
        }
        Ok(())
    }
}

fn default_grants() -> Vec<PermissionGrant> {
    vec![
        PermissionGrant {
            permission: crate::app::PERMISSION_PUSH.to_string(),
            principals: vec!["$authenticated".to_string()],
        },
        PermissionGrant {
            permission: crate::app::PERMISSION_INSTALL.to_string(),
            principals: vec!["$authenticated".to_string()],
        },
    ]
}

#[derive(Debug, Default, Deserialize)]
struct YamlConfig {
    bind: Option<String>,
    data_dir: Option<String>,
    log_level: Option<String>,
    open_access: Option<bool>,
    max_body_size: Option<usize>,
    users: Option<HashMap<String, String>>,
    permissions: Option<HashMap<String, Vec<String>>>,
}

#[derive(Debug, Default)]
struct RawEnvConfig {
    bind: Option<String>,
    data_dir: Option<String>,
    log_level: Option<String>,
    open_access: Option<String>,
    max_body_size: Option<String>,
}

fn load_gemgate_env() -> Result<RawEnvConfig, String> {
    let settings = SettingsLoader::builder()
        .add_source(Environment::with_prefix("GEMGATE").try_parsing(false))
        .build()
        .map_err(|err| format!("failed to load GEMGATE_* environment: {err}"))?;

    Ok(RawEnvConfig {
        bind: env_value(&settings, "bind"),
        data_dir: env_value(&settings, "data_dir"),
        log_level: env_value(&settings, "log_level"),
        open_access: env_value(&settings, "open_access"),
        max_body_size: env_value(&settings, "max_body_size"),
    })
}

fn env_value(settings: &SettingsLoader, key: &str) -> Option<String> {
    settings
        .get_string(key)
        .ok()
        .or_else(|| settings.get_string(&key.to_ascii_uppercase()).ok())
}

fn parse_env_value<T>(raw: Option<&str>) -> Option<T>
where
    T: std::str::FromStr,
{
    raw.and_then(|value| value.parse::<T>().ok())
}
