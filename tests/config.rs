// ABOUTME: Integration tests for configuration parsing and validation.
// ABOUTME: Tests YAML parsing, duration fields, env var references, and discovery.

use slipway::config::*;
use std::collections::BTreeMap;
use std::time::Duration;

mod parsing {
    use super::*;

    #[test]
    fn parse_minimal_config() {
        let yaml = r#"
sites:
  - name: blog
    repo: https://github.com/example/blog.git
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.sites.len(), 1);

        let site = config.site("blog").unwrap();
        assert_eq!(site.branch, "main");
        assert!(!site.persistent_storage);
        assert_eq!(config.proxy.domain, "localhost");
        assert_eq!(config.sessions.max_per_user, 3);
        assert_eq!(config.sessions.expiration, Duration::from_secs(3 * 60 * 60));
        assert_eq!(config.deploy.base_port, 4000);
    }

    #[test]
    fn parse_full_config() {
        let yaml = r#"
paths:
  sites_root: /data/sites
  logs_dir: /data/logs
  state_file: /data/state.json

proxy:
  domain: preview.example.com
  scheme: http
  routes_file: /etc/slipway/routes.json
  route_ttl: 12h

deploy:
  health_timeout: 90s
  health_interval: 500ms
  health_path: /healthz
  stop_timeout: 5s
  base_port: 8000

sessions:
  max_per_user: 5
  expiration: 45m
  cleanup_interval: 1m
  preview_base_port: 6000
  default_branch_base: draft
  teardown_timeout: 10s

sites:
  - name: blog
    repo: https://github.com/example/blog.git
    branch: production
    persistent_storage: true
    env:
      NODE_ENV: production
      DATABASE_URL:
        env: BLOG_DATABASE_URL
        default: postgres://localhost/blog
  - name: shop
    repo: git@github.com:example/shop.git
"#;
        let config = Config::from_yaml(yaml).unwrap();

        assert_eq!(config.sites.len(), 2);
        assert_eq!(config.proxy.route_ttl, Duration::from_secs(12 * 60 * 60));

        let deploy = config.container_settings();
        assert_eq!(deploy.health_timeout, Duration::from_secs(90));
        assert_eq!(deploy.health_interval, Duration::from_millis(500));
        assert_eq!(deploy.health_path, "/healthz");
        assert_eq!(deploy.base_port, 8000);

        let sessions = config.session_settings();
        assert_eq!(sessions.max_sessions_per_user, 5);
        assert_eq!(sessions.expiration, Duration::from_secs(45 * 60));
        assert_eq!(sessions.preview_base_port, 6000);
        assert_eq!(sessions.default_branch_base, "draft");
        assert_eq!(sessions.domain, "preview.example.com");
        assert_eq!(sessions.scheme, "http");

        let blog = config.site("blog").unwrap();
        assert_eq!(blog.branch, "production");
        assert!(blog.persistent_storage);
        assert_eq!(
            blog.env.get("DATABASE_URL"),
            Some(&EnvValue::FromEnv {
                var: "BLOG_DATABASE_URL".to_string(),
                default: Some("postgres://localhost/blog".to_string()),
            })
        );

        let settings = config.deploy_settings();
        assert_eq!(settings.sites_root, std::path::PathBuf::from("/data/sites"));
        assert_eq!(
            config.site_path(&blog.name),
            std::path::PathBuf::from("/data/sites/blog")
        );
    }
}

mod validation {
    use super::*;

    #[test]
    fn empty_site_list_is_rejected() {
        let err = Config::from_yaml("sites: []\n").unwrap_err();
        assert!(err.to_string().contains("at least one site"));
    }

    #[test]
    fn duplicate_site_names_are_rejected() {
        let yaml = r#"
sites:
  - name: blog
    repo: a
  - name: blog
    repo: b
"#;
        let err = Config::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("duplicate site name"));
    }

    #[test]
    fn invalid_site_name_is_rejected() {
        let yaml = r#"
sites:
  - name: Not_A_Label
    repo: a
"#;
        assert!(Config::from_yaml(yaml).is_err());
    }

    #[test]
    fn zero_session_cap_is_rejected() {
        let yaml = r#"
sessions:
  max_per_user: 0
sites:
  - name: blog
    repo: a
"#;
        let err = Config::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("max_per_user"));
    }
}

mod env_values {
    use super::*;

    #[test]
    fn reference_reads_process_environment() {
        temp_env::with_var("SLIPWAY_TEST_DB", Some("postgres://db/prod"), || {
            let value = EnvValue::FromEnv {
                var: "SLIPWAY_TEST_DB".to_string(),
                default: Some("unused".to_string()),
            };
            assert_eq!(value.resolve().unwrap(), "postgres://db/prod");
        });
    }

    #[test]
    fn reference_falls_back_to_default() {
        temp_env::with_var_unset("SLIPWAY_TEST_DB", || {
            let value = EnvValue::FromEnv {
                var: "SLIPWAY_TEST_DB".to_string(),
                default: Some("postgres://localhost/dev".to_string()),
            };
            assert_eq!(value.resolve().unwrap(), "postgres://localhost/dev");
        });
    }

    #[test]
    fn missing_reference_fails_resolution() {
        temp_env::with_var_unset("SLIPWAY_TEST_SECRET", || {
            let mut map = BTreeMap::new();
            map.insert("MODE".to_string(), EnvValue::Literal("prod".to_string()));
            map.insert(
                "SECRET".to_string(),
                EnvValue::FromEnv {
                    var: "SLIPWAY_TEST_SECRET".to_string(),
                    default: None,
                },
            );

            let err = resolve_env_map(&map).unwrap_err();
            assert!(err.to_string().contains("SLIPWAY_TEST_SECRET"));
        });
    }
}

mod discovery {
    use super::*;

    #[test]
    fn discovers_alternate_filename() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILENAME_ALT),
            "sites:\n  - name: blog\n    repo: a\n",
        )
        .unwrap();

        let config = Config::discover(dir.path()).unwrap();
        assert!(config.site("blog").is_some());
    }

    #[test]
    fn missing_config_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::discover(dir.path()).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn init_template_parses_back() {
        let dir = tempfile::tempdir().unwrap();
        init_config(dir.path(), Some("docs"), Some("https://example.com/docs.git"), false).unwrap();

        let config = Config::discover(dir.path()).unwrap();
        let site = config.site("docs").unwrap();
        assert_eq!(site.repo, "https://example.com/docs.git");
        assert_eq!(config.proxy.domain, "sites.example.com");
    }
}
