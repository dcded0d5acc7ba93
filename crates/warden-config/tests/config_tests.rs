#[cfg(test)]
mod tests {
    use std::io::Write;
    use warden_config::{ConfigLoader, WardenConfig};

    fn write_config(dir: &tempfile::TempDir, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join("warden.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    // ── Schema & defaults ──────────────────────────────────────

    mod schema {
        use super::*;

        #[test]
        fn test_defaults_validate() {
            let config = WardenConfig::default();
            assert!(config.validate().is_ok());
            assert_eq!(config.scheduler.max_workers, 4);
            assert_eq!(config.approval.timeout_secs, 300);
            assert_eq!(config.guardrails.anomaly.repeated_failures, 3);
        }

        #[test]
        fn test_parse_full_config() {
            let raw = r#"
                [policy]
                rules_path = "/etc/warden/rules.toml"

                [approval]
                timeout_secs = 120

                [scheduler]
                max_workers = 8
                tick_secs = 2

                [guardrails.confidence]
                auto_execute = 0.9
                approval = 0.4

                [guardrails.budgets]
                cpu_percent_max = 70.0

                [[guardrails.budgets.scopes]]
                scope = "restart_service"
                window_secs = 3600
                max_operations = 3

                [guardrails.safe_mode]
                auto_trip_severity = "critical"
                requires_manual_resume = false
                cooldown_secs = 60
            "#;
            let config: WardenConfig = toml::from_str(raw).unwrap();
            assert_eq!(config.scheduler.max_workers, 8);
            assert_eq!(config.guardrails.budgets.scopes.len(), 1);
            assert_eq!(config.guardrails.budgets.scopes[0].max_operations, 3);
            assert!(!config.guardrails.safe_mode.requires_manual_resume);
            assert!(config.validate().is_ok());
        }

        #[test]
        fn test_zero_workers_rejected() {
            let mut config = WardenConfig::default();
            config.scheduler.max_workers = 0;
            assert!(config.validate().is_err());
        }

        #[test]
        fn test_inverted_confidence_rejected() {
            let mut config = WardenConfig::default();
            config.guardrails.confidence.approval = 0.99;
            config.guardrails.confidence.auto_execute = 0.5;
            assert!(config.validate().is_err());
        }

        #[test]
        fn test_zero_width_scope_window_rejected() {
            let raw = r#"
                [[guardrails.budgets.scopes]]
                scope = "restart_service"
                window_secs = 0
                max_operations = 3
            "#;
            let config: WardenConfig = toml::from_str(raw).unwrap();
            assert!(config.validate().is_err());
        }

        #[test]
        fn test_bad_error_rate_rejected() {
            let mut config = WardenConfig::default();
            config.guardrails.anomaly.error_rate = 1.5;
            assert!(config.validate().is_err());
        }

        #[test]
        fn test_short_approval_timeout_warns() {
            let mut config = WardenConfig::default();
            config.approval.timeout_secs = 5;
            let warnings = config.validate().unwrap();
            assert!(!warnings.is_empty());
        }
    }

    // ── Loader ─────────────────────────────────────────────────

    mod loader {
        use super::*;

        #[test]
        fn test_load_missing_file_uses_defaults() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("warden.toml");
            let loader = ConfigLoader::load(Some(&path)).unwrap();
            assert_eq!(loader.get().scheduler.max_workers, 4);
        }

        #[test]
        fn test_load_from_file() {
            let dir = tempfile::tempdir().unwrap();
            let path = write_config(&dir, "[scheduler]\nmax_workers = 2\n");
            let loader = ConfigLoader::load(Some(&path)).unwrap();
            assert_eq!(loader.get().scheduler.max_workers, 2);
        }

        #[test]
        fn test_malformed_file_fails_closed() {
            let dir = tempfile::tempdir().unwrap();
            let path = write_config(&dir, "[scheduler\nmax_workers = ");
            assert!(ConfigLoader::load(Some(&path)).is_err());
        }

        #[test]
        fn test_invalid_file_fails_closed() {
            let dir = tempfile::tempdir().unwrap();
            let path = write_config(&dir, "[scheduler]\nmax_workers = 0\n");
            assert!(ConfigLoader::load(Some(&path)).is_err());
        }

        #[test]
        fn test_reload_picks_up_changes() {
            let dir = tempfile::tempdir().unwrap();
            let path = write_config(&dir, "[approval]\ntimeout_secs = 100\n");
            let loader = ConfigLoader::load(Some(&path)).unwrap();
            assert_eq!(loader.get().approval.timeout_secs, 100);

            write_config(&dir, "[approval]\ntimeout_secs = 250\n");
            loader.reload().unwrap();
            assert_eq!(loader.get().approval.timeout_secs, 250);
        }

        #[test]
        fn test_reload_rejects_invalid_and_keeps_current() {
            let dir = tempfile::tempdir().unwrap();
            let path = write_config(&dir, "[approval]\ntimeout_secs = 100\n");
            let loader = ConfigLoader::load(Some(&path)).unwrap();

            write_config(&dir, "[scheduler]\nmax_workers = 0\n");
            assert!(loader.reload().is_err());
            assert_eq!(loader.get().approval.timeout_secs, 100);
        }

        #[test]
        fn test_rules_path_resolves_relative_to_config_dir() {
            let dir = tempfile::tempdir().unwrap();
            let path = write_config(&dir, "[policy]\nrules_path = \"rules.toml\"\n");
            let loader = ConfigLoader::load(Some(&path)).unwrap();
            assert_eq!(loader.rules_path(), dir.path().join("rules.toml"));
        }
    }
}
