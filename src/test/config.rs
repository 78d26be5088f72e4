use std::io::Write;

use crate::arq::StopAndWaitConfig;
use crate::config::{ConfigError, ConfigSource, Params};
use crate::sim::SimTime;

#[test]
fn typed_getters() {
    let p = Params::from_json_str(
        r#"{"windowSize": 8, "resendTimeout": 0.25, "name": "link", "ratio": 1.5}"#,
    )
    .expect("json");
    assert_eq!(p.get::<u32>("windowSize").expect("u32"), 8);
    assert_eq!(p.get::<String>("name").expect("string"), "link");
    assert_eq!(p.get_secs("resendTimeout").expect("secs"), SimTime::from_millis(250));
    assert_eq!(p.get_count("windowSize").expect("count"), 8);
    assert_eq!(p.get_or("missing", 3u8).expect("default"), 3);
    assert!(p.contains("ratio"));
    assert!(!p.contains("missing"));
}

#[test]
fn bad_values_fail_fast() {
    let p = Params::new()
        .with("negative", -1.0)
        .with("zero", 0)
        .with("text", "abc");

    assert!(matches!(p.get_secs("negative"), Err(ConfigError::Invalid { .. })));
    assert!(matches!(p.get_count("zero"), Err(ConfigError::Invalid { .. })));
    assert!(matches!(
        p.get::<u64>("text"),
        Err(ConfigError::Malformed { key, .. }) if key == "text"
    ));
    assert!(matches!(
        p.get_or("text", 1u64),
        Err(ConfigError::Malformed { .. })
    ));
    assert!(matches!(p.get::<u64>("absent"), Err(ConfigError::Missing(key)) if key == "absent"));
}

#[test]
fn only_objects_are_configurations() {
    assert!(matches!(Params::from_json_str("[1, 2]"), Err(ConfigError::NotAnObject)));
    assert!(matches!(Params::from_json_str("{"), Err(ConfigError::Parse(_))));
    assert!(matches!(
        Params::from_json_file(std::path::Path::new("/nonexistent/arq.json")),
        Err(ConfigError::Io(_))
    ));
}

#[test]
fn merge_and_sections() {
    let mut base = Params::new().with("windowSize", 4).with("resendTimeout", 1.0);
    base.merge(&Params::new().with("windowSize", 16));
    assert_eq!(base.get::<u32>("windowSize").expect("merged"), 16);
    assert_eq!(base.keys().collect::<Vec<_>>(), ["resendTimeout", "windowSize"]);

    let p = Params::from_json_str(r#"{"decoder": {"name": "threshold"}, "flat": 1}"#).expect("json");
    let section = p.section("decoder").expect("section");
    assert_eq!(section.get::<String>("name").expect("name"), "threshold");
    assert!(matches!(p.section("flat"), Err(ConfigError::Malformed { .. })));
    assert!(matches!(p.section("none"), Err(ConfigError::Missing(_))));
}

#[test]
fn engine_config_from_file() {
    let path = std::env::temp_dir().join(format!("arq-config-{}.json", std::process::id()));
    {
        let mut f = std::fs::File::create(&path).expect("create");
        writeln!(f, r#"{{"resendTimeout": 2}}"#).expect("write");
    }
    let p = Params::from_json_file(&path).expect("file");
    std::fs::remove_file(&path).ok();

    let cfg = StopAndWaitConfig::from_source(&p).expect("config");
    assert_eq!(cfg.resend_timeout, SimTime::from_secs(2));
}
