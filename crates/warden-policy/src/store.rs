use notify::{Event as NotifyEvent, EventKind, RecursiveMode, Watcher};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::rule::{PolicyRule, RuleDefaults, RuleFile};

/// An immutable, validated snapshot of the rule file. Evaluations hold an
/// `Arc<RuleSet>` so a reload never partially applies to an evaluation in
/// flight.
#[derive(Debug)]
pub struct RuleSet {
    pub defaults: RuleDefaults,
    pub rules: Vec<PolicyRule>,
}

impl RuleSet {
    /// Compile and validate a parsed rule file. Any malformed rule rejects
    /// the whole set — the engine refuses to run on a partial rule list.
    pub fn compile(file: RuleFile) -> warden_core::Result<Self> {
        let rules = file
            .rules
            .iter()
            .map(|raw| raw.compile())
            .collect::<warden_core::Result<Vec<_>>>()?;
        Ok(Self {
            defaults: file.defaults,
            rules,
        })
    }

    /// First rule matching the tool name, in file order.
    pub fn match_rule(&self, tool: &str) -> Option<&PolicyRule> {
        self.rules.iter().find(|r| r.matcher.matches(tool))
    }
}

/// Holds the active rule snapshot and swaps it atomically on reload.
pub struct RuleStore {
    snapshot: Arc<RwLock<Arc<RuleSet>>>,
    path: Option<PathBuf>,
}

impl RuleStore {
    /// Load and validate the rule file. Fails closed: a file that does not
    /// parse or validate means no store.
    pub fn from_file(path: impl AsRef<Path>) -> warden_core::Result<Self> {
        let path = path.as_ref();
        let set = load_rule_set(path)?;
        info!(?path, rules = set.rules.len(), "loaded policy rules");
        Ok(Self {
            snapshot: Arc::new(RwLock::new(Arc::new(set))),
            path: Some(path.to_path_buf()),
        })
    }

    /// Build a store from an in-memory rule file (tests, embedded config).
    pub fn from_rules(file: RuleFile) -> warden_core::Result<Self> {
        let set = RuleSet::compile(file)?;
        Ok(Self {
            snapshot: Arc::new(RwLock::new(Arc::new(set))),
            path: None,
        })
    }

    /// The snapshot active right now. Callers keep the `Arc` for the whole
    /// evaluation.
    pub fn snapshot(&self) -> Arc<RuleSet> {
        Arc::clone(&self.snapshot.read())
    }

    /// Re-read the rule file and swap the snapshot. An invalid file keeps
    /// the current snapshot in place.
    pub fn reload(&self) -> warden_core::Result<()> {
        let Some(ref path) = self.path else {
            return Err(warden_core::WardenError::Config(
                "rule store was built from in-memory rules, nothing to reload".into(),
            ));
        };
        let set = load_rule_set(path)?;
        info!(?path, rules = set.rules.len(), "policy rules reloaded");
        *self.snapshot.write() = Arc::new(set);
        Ok(())
    }

    /// Watch the rule file and hot-reload on change. Returns the watcher
    /// handle (must be kept alive for watching to continue).
    pub fn watch(&self) -> warden_core::Result<notify::RecommendedWatcher> {
        let Some(ref path) = self.path else {
            return Err(warden_core::WardenError::Config(
                "rule store was built from in-memory rules, nothing to watch".into(),
            ));
        };
        let snapshot = Arc::clone(&self.snapshot);
        let rule_path = path.clone();

        info!(?rule_path, "starting rule file watcher");

        let path_for_event = rule_path.clone();
        let mut watcher =
            notify::recommended_watcher(move |res: Result<NotifyEvent, notify::Error>| match res {
                Ok(event) => match event.kind {
                    EventKind::Modify(_) | EventKind::Create(_) => {
                        let is_our_file = event
                            .paths
                            .iter()
                            .any(|p| p.file_name() == path_for_event.file_name());
                        if !is_our_file {
                            return;
                        }
                        info!("rule file changed, reloading");
                        match load_rule_set(&path_for_event) {
                            Ok(set) => {
                                *snapshot.write() = Arc::new(set);
                                info!("policy rules hot-reloaded");
                            }
                            Err(e) => {
                                warn!(error = %e, "rule file invalid, keeping current rules");
                            }
                        }
                    }
                    _ => {}
                },
                Err(e) => {
                    warn!(error = %e, "rule file watcher error");
                }
            })
            .map_err(|e| {
                warden_core::WardenError::Config(format!("failed to create rule watcher: {}", e))
            })?;

        let watch_path = rule_path.parent().unwrap_or(Path::new("."));
        watcher
            .watch(watch_path, RecursiveMode::NonRecursive)
            .map_err(|e| {
                warden_core::WardenError::Config(format!("failed to watch rule directory: {}", e))
            })?;

        Ok(watcher)
    }
}

fn load_rule_set(path: &Path) -> warden_core::Result<RuleSet> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        warden_core::WardenError::Config(format!("failed to read {}: {}", path.display(), e))
    })?;
    let file = toml::from_str::<RuleFile>(&raw).map_err(|e| {
        warden_core::WardenError::Config(format!("failed to parse {}: {}", path.display(), e))
    })?;
    RuleSet::compile(file)
}
