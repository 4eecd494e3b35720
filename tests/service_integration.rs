use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use lamco_input_pipeline::config::{AbilityLaunchConfig, Config};
use lamco_input_pipeline::dispatch::{ChannelDispatcher, LaunchSource, RecordingDispatcher};
use lamco_input_pipeline::input::keycodes::{KEYCODE_POWER, KEYCODE_VOLUME_UP};
use lamco_input_pipeline::input::{KeyAction, KeyboardState};
use lamco_input_pipeline::replay::{parse_script, ScriptRunner};
use lamco_input_pipeline::resample::ResampleKind;
use lamco_input_pipeline::service::{spawn_service, InputService, ServiceEvent, ServiceOutput};
use lamco_input_pipeline::timer::ManualTimerService;
use lamco_input_pipeline::InputError;
use tempfile::NamedTempFile;
use tokio::sync::mpsc;

const ABILITIES: &str = r#"{
    "Shortcuts": [
        { "preKey": [], "finalKey": 18, "triggerType": "key_down",
          "ability": { "bundleName": "com.example.power", "abilityName": "MainAbility" } }
    ],
    "SingleKnuckleGesture": {
        "ability": { "bundleName": "com.example.screenshot", "abilityName": "MainAbility" }
    }
}"#;

fn write_temp(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[tokio::test]
async fn test_launch_reaches_channel_dispatcher() {
    let (dispatcher, mut launches) = ChannelDispatcher::new(8);
    let (out_tx, mut out_rx) = mpsc::channel(8);
    let handle = spawn_service(
        &Config::default_config(),
        AbilityLaunchConfig::parse(ABILITIES),
        Vec::new(),
        Arc::new(dispatcher),
        out_tx,
    );

    let mut keyboard = KeyboardState::new();
    handle
        .send(ServiceEvent::Key(keyboard.handle_key_down(KEYCODE_POWER, 0)))
        .await
        .unwrap();
    handle
        .send(ServiceEvent::Key(keyboard.handle_key_down(KEYCODE_VOLUME_UP, 1_000)))
        .await
        .unwrap();

    let launch = tokio::time::timeout(Duration::from_secs(1), launches.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(launch.ability.bundle_name, "com.example.power");
    assert_eq!(launch.source, LaunchSource::Shortcut);

    // The consumed power key never reaches downstream
    match tokio::time::timeout(Duration::from_secs(1), out_rx.recv()).await.unwrap() {
        Some(ServiceOutput::Key(event)) => assert_eq!(event.key_code, KEYCODE_VOLUME_UP),
        other => panic!("unexpected output: {other:?}"),
    }

    let stats = handle.shutdown().await.unwrap();
    assert_eq!(stats.events, 2);
    assert_eq!(stats.keys_consumed, 1);
}

#[tokio::test]
async fn test_try_send_reports_full_queue() {
    let mut config = Config::default_config();
    config.service.event_queue_capacity = 1;
    let (out_tx, _out_rx) = mpsc::channel(8);
    let handle = spawn_service(
        &config,
        AbilityLaunchConfig::parse(ABILITIES),
        Vec::new(),
        Arc::new(RecordingDispatcher::new()),
        out_tx,
    );

    // The loop cannot run before this task yields
    handle.try_send(ServiceEvent::Frame { frame_time: 0 }).unwrap();
    let err = handle
        .try_send(ServiceEvent::Frame { frame_time: 16_000 })
        .unwrap_err();
    assert!(matches!(err, InputError::EventQueueFull));

    let stats = handle.shutdown().await.unwrap();
    assert_eq!(stats.events, 1);
}

#[test]
fn test_configuration_files_drive_the_service() {
    let toml = write_temp(
        r#"
[resample]
latency_us = 4000

[service]
timer_capacity = 8
"#,
    );
    let abilities = write_temp(ABILITIES);

    let config = Config::load(toml.path().to_str().unwrap()).unwrap();
    assert_eq!(config.resample.latency_us, 4_000);

    let launch = AbilityLaunchConfig::load(abilities.path()).unwrap();
    assert_eq!(launch.patterns.shortcuts.len(), 1);
    assert!(launch.gestures.single_knuckle.is_some());

    let dispatcher = Arc::new(RecordingDispatcher::new());
    let mut service = InputService::new(
        &config,
        ManualTimerService::with_capacity(config.service.timer_capacity),
        dispatcher.clone(),
    );
    service.load_abilities(Ok(launch), Vec::new());

    let mut keyboard = KeyboardState::new();
    assert!(service
        .process(ServiceEvent::Key(keyboard.handle_key_down(KEYCODE_POWER, 0)))
        .is_empty());
    assert_eq!(dispatcher.bundles(), vec!["com.example.power"]);
}

#[test]
fn test_missing_ability_file_falls_back_to_pass_through() {
    let result = AbilityLaunchConfig::load("/nonexistent/ability_launch_config.json");
    assert!(matches!(result, Err(InputError::ConfigRead { .. })));

    let dispatcher = Arc::new(RecordingDispatcher::new());
    let mut service = InputService::new(&Config::default_config(), ManualTimerService::new(), dispatcher.clone());
    service.load_abilities(result, Vec::new());

    let mut keyboard = KeyboardState::new();
    let outputs = service.process(ServiceEvent::Key(keyboard.handle_key_down(KEYCODE_POWER, 0)));
    assert!(matches!(&outputs[..], [ServiceOutput::Key(event)] if event.action == KeyAction::Down));
    assert_eq!(dispatcher.count(), 0);
}

#[test]
fn test_replay_mixed_script() {
    let script = r#"
# finger swipe sampled at 250 Hz, rendered at 60 Hz
{"type":"touch","time_us":0,"pointer_id":0,"action":"down","x":0.0,"y":0.0}
{"type":"touch","time_us":4000,"pointer_id":0,"action":"move","x":4.0,"y":4.0}
{"type":"touch","time_us":8000,"pointer_id":0,"action":"move","x":8.0,"y":8.0}
{"type":"touch","time_us":12000,"pointer_id":0,"action":"move","x":12.0,"y":12.0}
{"type":"frame","time_us":14000}
{"type":"touch","time_us":16000,"pointer_id":0,"action":"move","x":16.0,"y":16.0}
{"type":"frame","time_us":30000}
{"type":"touch","time_us":31000,"pointer_id":0,"action":"up","x":16.0,"y":16.0}
{"type":"key","time_us":40000,"code":18,"action":"down"}
{"type":"key","time_us":90000,"code":18,"action":"up"}
"#;
    let records = parse_script(script).unwrap();

    let dispatcher = Arc::new(RecordingDispatcher::new());
    let mut service = InputService::new(&Config::default_config(), ManualTimerService::new(), dispatcher.clone());
    service.load_abilities(AbilityLaunchConfig::parse(ABILITIES), Vec::new());
    let report = ScriptRunner::new(service, dispatcher).run(&records);

    let kinds: Vec<ResampleKind> = report
        .outputs
        .iter()
        .filter_map(|output| match output {
            ServiceOutput::Touch(event) => Some(event.kind),
            _ => None,
        })
        .collect();
    assert_eq!(
        kinds,
        vec![
            ResampleKind::Passthrough,
            ResampleKind::Interpolated,
            ResampleKind::Extrapolated,
            ResampleKind::Passthrough,
        ]
    );

    let interpolated = report
        .outputs
        .iter()
        .find_map(|output| match output {
            ServiceOutput::Touch(event) if event.kind == ResampleKind::Interpolated => Some(*event),
            _ => None,
        })
        .unwrap();
    assert_eq!(interpolated.action_time, 9_000);
    assert!((interpolated.display_x - 9.0).abs() < 1e-9);

    assert_eq!(report.launches.len(), 1);
    assert_eq!(report.late_records, 0);
}
