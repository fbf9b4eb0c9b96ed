use std::sync::Mutex;

use tempfile::{Builder, NamedTempFile};

use pose_anchor::config::PipelineConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "POSE_ANCHOR_CONFIG",
        "POSE_ANCHOR_DIRECTORY_URL",
        "POSE_ANCHOR_SERVICE_NAME",
        "POSE_ANCHOR_POSE_PATH",
        "POSE_ANCHOR_SCALE_FACTOR",
        "POSE_ANCHOR_TIMEOUT_SECS",
        "POSE_ANCHOR_JPEG_QUALITY",
        "POSE_ANCHOR_VARIANTS",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let dump_path = file.path().with_extension("jpg");
    let json = format!(
        r#"{{
            "directory": {{
                "url": "http://dyndns.example:5000/lookup",
                "service_name": "colmap",
                "result_envelope": true
            }},
            "service": {{
                "path": "localize",
                "timeout_secs": 12,
                "location_query": true
            }},
            "capture": {{
                "jpeg_quality": 90,
                "mirror_y": true,
                "dump_path": "{}"
            }},
            "placement": {{
                "scale_factor": 2.5,
                "variants": ["1900", "1950", "today"]
            }}
        }}"#,
        dump_path.display()
    );
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("POSE_ANCHOR_CONFIG", file.path());
    std::env::set_var("POSE_ANCHOR_SERVICE_NAME", "colmap-eu");
    std::env::set_var("POSE_ANCHOR_TIMEOUT_SECS", "20");
    std::env::set_var("POSE_ANCHOR_VARIANTS", "day, night");

    let cfg = PipelineConfig::load().expect("load config");

    assert_eq!(cfg.directory.url, "http://dyndns.example:5000/lookup");
    assert_eq!(cfg.directory.service_name, "colmap-eu");
    assert!(cfg.directory.result_envelope);
    assert_eq!(cfg.service.path, "/localize");
    assert_eq!(cfg.service.timeout.as_secs(), 20);
    assert!(cfg.service.location_query);
    assert_eq!(cfg.capture.jpeg_quality, 90);
    assert!(cfg.capture.mirror_y);
    assert_eq!(cfg.capture.dump_path.as_deref(), Some(dump_path.as_path()));
    assert_eq!(cfg.placement.scale_factor, 2.5);
    assert_eq!(cfg.placement.variants, vec!["day", "night"]);

    let settings = cfg.client_settings();
    assert_eq!(settings.locator.service_name, "colmap-eu");
    assert_eq!(settings.pose_path, "/localize");

    clear_env();
}

#[test]
fn defaults_apply_without_file() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();

    let cfg = PipelineConfig::load().expect("load defaults");
    assert_eq!(cfg.directory.service_name, "colmap");
    assert!(!cfg.directory.result_envelope);
    assert_eq!(cfg.service.path, "/");
    assert_eq!(cfg.service.timeout.as_secs(), 30);
    assert_eq!(cfg.capture.jpeg_quality, 75);
    assert_eq!(cfg.placement.scale_factor, 5.0);
    assert!(!cfg.placement.variants.is_empty());
}

#[test]
fn loads_toml_by_extension() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();

    let mut file = Builder::new().suffix(".toml").tempfile().expect("temp config");
    let toml = r#"
[directory]
url = "https://directory.example/services"

[placement]
scale_factor = 1.5
variants = ["a", "b"]
"#;
    std::io::Write::write_all(&mut file, toml.as_bytes()).expect("write config");

    let cfg = PipelineConfig::load_from(file.path()).expect("load toml");
    assert_eq!(cfg.directory.url, "https://directory.example/services");
    assert_eq!(cfg.placement.scale_factor, 1.5);
    assert_eq!(cfg.placement.variants, vec!["a", "b"]);
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();

    std::env::set_var("POSE_ANCHOR_TIMEOUT_SECS", "soon");
    assert!(PipelineConfig::load().is_err());
    clear_env();

    std::env::set_var("POSE_ANCHOR_TIMEOUT_SECS", "0");
    assert!(PipelineConfig::load().is_err());
    clear_env();

    std::env::set_var("POSE_ANCHOR_SCALE_FACTOR", "0.01");
    assert!(PipelineConfig::load().is_err());
    clear_env();

    std::env::set_var("POSE_ANCHOR_JPEG_QUALITY", "0");
    assert!(PipelineConfig::load().is_err());
    clear_env();

    std::env::set_var("POSE_ANCHOR_DIRECTORY_URL", "ftp://directory.example/");
    assert!(PipelineConfig::load().is_err());
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, b"{ not json").expect("write config");
    std::env::set_var("POSE_ANCHOR_CONFIG", file.path());
    assert!(PipelineConfig::load().is_err());
    clear_env();
}
