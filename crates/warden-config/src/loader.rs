use notify::{Event as NotifyEvent, EventKind, RecursiveMode, Watcher};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::schema::WardenConfig;

/// Loads and optionally hot-reloads the Warden configuration.
pub struct ConfigLoader {
    config: Arc<RwLock<WardenConfig>>,
    config_path: PathBuf,
}

impl ConfigLoader {
    /// Resolve the config path: explicit path > WARDEN_CONFIG env >
    /// ~/.warden/warden.toml
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(p) = explicit {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var("WARDEN_CONFIG") {
            return PathBuf::from(p);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".warden")
            .join("warden.toml")
    }

    /// Load the config from disk, falling back to defaults when the file
    /// does not exist. A file that exists but fails to parse or validate is
    /// a hard error — Warden does not start on a partial configuration.
    pub fn load(path: Option<&Path>) -> warden_core::Result<Self> {
        let config_path = Self::resolve_path(path);
        let config = if config_path.exists() {
            info!(?config_path, "loading configuration");
            let raw = std::fs::read_to_string(&config_path)?;
            toml::from_str::<WardenConfig>(&raw).map_err(|e| {
                warden_core::WardenError::Config(format!(
                    "failed to parse {}: {}",
                    config_path.display(),
                    e
                ))
            })?
        } else {
            warn!(?config_path, "config file not found, using defaults");
            WardenConfig::default()
        };

        let config = Self::apply_env_overrides(config);

        match config.validate() {
            Ok(warnings) => {
                for w in &warnings {
                    warn!("{}", w);
                }
            }
            Err(e) => {
                return Err(warden_core::WardenError::Config(e));
            }
        }

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_path,
        })
    }

    /// Get a read snapshot of the current config.
    pub fn get(&self) -> WardenConfig {
        self.config.read().clone()
    }

    /// Get a shared reference for subscription.
    pub fn shared(&self) -> Arc<RwLock<WardenConfig>> {
        Arc::clone(&self.config)
    }

    /// Path being watched.
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Rule file path, resolved against the config file's directory when
    /// relative.
    pub fn rules_path(&self) -> PathBuf {
        let rules = self.config.read().policy.rules_path.clone();
        if rules.is_absolute() {
            return rules;
        }
        self.config_path
            .parent()
            .unwrap_or(Path::new("."))
            .join(rules)
    }

    /// Apply env var overrides (WARDEN_RULES, WARDEN_MAX_WORKERS, ...).
    fn apply_env_overrides(mut config: WardenConfig) -> WardenConfig {
        if let Ok(v) = std::env::var("WARDEN_RULES") {
            config.policy.rules_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("WARDEN_MAX_WORKERS") {
            if let Ok(workers) = v.parse::<usize>() {
                config.scheduler.max_workers = workers;
            }
        }
        if let Ok(v) = std::env::var("WARDEN_APPROVAL_TIMEOUT_SECS") {
            if let Ok(secs) = v.parse::<u64>() {
                config.approval.timeout_secs = secs;
            }
        }
        config
    }

    /// Reload the config from disk. A file with errors keeps the current
    /// snapshot in place.
    pub fn reload(&self) -> warden_core::Result<()> {
        if !self.config_path.exists() {
            return Err(warden_core::WardenError::Config(format!(
                "config file not found: {}",
                self.config_path.display()
            )));
        }
        let raw = std::fs::read_to_string(&self.config_path)?;
        let new_config = toml::from_str::<WardenConfig>(&raw).map_err(|e| {
            warden_core::WardenError::Config(format!(
                "failed to parse {}: {}",
                self.config_path.display(),
                e
            ))
        })?;
        let new_config = Self::apply_env_overrides(new_config);
        match new_config.validate() {
            Ok(warnings) => {
                for w in &warnings {
                    warn!("{}", w);
                }
            }
            Err(e) => return Err(warden_core::WardenError::Config(e)),
        }
        *self.config.write() = new_config;
        info!("configuration reloaded");
        Ok(())
    }

    /// Start a background file watcher that reloads when the config file
    /// changes. Returns the watcher handle (must be kept alive for watching
    /// to continue).
    pub fn watch(&self) -> warden_core::Result<notify::RecommendedWatcher> {
        let config = Arc::clone(&self.config);
        let config_path = self.config_path.clone();

        info!(?config_path, "starting config file watcher");

        let path_for_event = config_path.clone();
        let mut watcher =
            notify::recommended_watcher(move |res: Result<NotifyEvent, notify::Error>| {
                match res {
                    Ok(event) => {
                        match event.kind {
                            EventKind::Modify(_) | EventKind::Create(_) => {
                                let is_our_file = event
                                    .paths
                                    .iter()
                                    .any(|p| p.file_name() == path_for_event.file_name());
                                if !is_our_file {
                                    return;
                                }

                                info!("config file changed, reloading");
                                match std::fs::read_to_string(&path_for_event) {
                                    Ok(raw) => match toml::from_str::<WardenConfig>(&raw) {
                                        Ok(new_config) => {
                                            let new_config =
                                                ConfigLoader::apply_env_overrides(new_config);
                                            match new_config.validate() {
                                                Ok(_) => {
                                                    *config.write() = new_config;
                                                    info!("configuration hot-reloaded");
                                                }
                                                Err(e) => {
                                                    warn!(error = %e, "config file invalid, keeping current config");
                                                }
                                            }
                                        }
                                        Err(e) => {
                                            warn!(error = %e, "config file has errors, keeping current config");
                                        }
                                    },
                                    Err(e) => {
                                        warn!(error = %e, "failed to read config file during hot-reload");
                                    }
                                }
                            }
                            _ => {}
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "file watcher error");
                    }
                }
            })
            .map_err(|e| {
                warden_core::WardenError::Config(format!("failed to create file watcher: {}", e))
            })?;

        // Watch the parent directory (some editors create temp files + rename)
        let watch_path = self.config_path.parent().unwrap_or(Path::new("."));
        watcher
            .watch(watch_path, RecursiveMode::NonRecursive)
            .map_err(|e| {
                warden_core::WardenError::Config(format!("failed to watch config directory: {}", e))
            })?;

        Ok(watcher)
    }
}
