use serde_json::{json, Value};
use tapedeck::config::load_config;
use tapedeck::logging::clear_event_log;
use tapedeck::runtime::ProductionFileSystem;
use tapedeck::store::FileCassetteStore;
use tapedeck::{with_cassette, InterceptionSpec, RecordMode, Target, TapedeckError};

fn events(path: &std::path::Path) -> Vec<Value> {
    std::fs::read_to_string(path)
        .expect("read event log")
        .lines()
        .map(|line| serde_json::from_str(line).expect("event json"))
        .collect()
}

// Single test: the event log is process-wide.
#[test]
fn configured_event_log_receives_session_lifecycle() {
    let dir = tempfile::tempdir().expect("tempdir");
    let log_path = dir.path().join("logs").join("events.jsonl");
    let config_path = dir.path().join("tapedeck.toml");
    std::fs::write(
        &config_path,
        format!(
            "[cassettes]\ndir = {:?}\n\n[logging]\nevent_log = {:?}\n",
            dir.path().join("cassettes").display().to_string(),
            log_path.display().to_string()
        ),
    )
    .expect("write config");

    let cfg = load_config(Some(config_path.as_path()), &ProductionFileSystem).expect("config");
    assert_eq!(cfg.recording.mode, RecordMode::Once);
    cfg.init_event_log();

    let store = FileCassetteStore::new(cfg.cassettes.dir.clone());
    let target = Target::new("weather::today", |_args: Vec<Value>| Ok(json!("sunny")));
    let run = |body_calls: usize| -> Result<Vec<Value>, TapedeckError> {
        let t = target.clone();
        with_cassette(
            &store,
            ":weather",
            [InterceptionSpec::for_target(target.clone())],
            &cfg.harness_options(),
            move || (0..body_calls).map(|_| t.call(vec![json!("paris")])).collect(),
        )
    };

    assert_eq!(run(1).expect("record"), vec![json!("sunny")]);
    assert!(dir.path().join("cassettes").join("weather.json").exists());
    assert_eq!(run(1).expect("replay"), vec![json!("sunny")]);
    assert!(matches!(
        run(2),
        Err(TapedeckError::ExhaustedCassette { .. })
    ));
    clear_event_log();

    let kinds: Vec<String> = events(&log_path)
        .iter()
        .map(|e| e["event_type"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(
        kinds,
        vec![
            "session_start",
            "session_end",
            "cassette_written",
            "session_start",
            "session_end",
            "session_start",
            "cassette_exhausted",
            "session_end",
        ]
    );
    let all = events(&log_path);
    assert_eq!(all[0]["payload"]["mode"], "recording");
    assert_eq!(all[3]["payload"]["mode"], "replaying");
    assert_eq!(all[6]["level"], "error");
    assert_eq!(all[7]["payload"]["ok"], false);
}
