mod common;

use common::*;
use tacklebox::engine::{Engine, EngineEvent};
use tacklebox::error::EngineError;
use tacklebox::lifecycle::ToggleOutcome;

fn open_engine() -> (tempfile::TempDir, Engine, std::path::PathBuf) {
    let (temp, data_dir, game_path, _store) = setup_env();
    let engine = Engine::open(data_dir).unwrap();
    let path = game_path.clone();
    engine
        .update_settings(|settings| settings.game_path = Some(path))
        .unwrap();
    (temp, engine, game_path)
}

#[test]
fn engine_install_toggle_uninstall() {
    let (_temp, engine, game_path) = open_engine();
    let url = serve_once(make_zip_bytes("fish-plus", "1.0.0"));
    engine.set_catalog(vec![catalog_entry("Fishing+", &url)]);

    let report = engine.install_titles(&["Fishing+".to_string()]).unwrap();
    assert_eq!(report.succeeded, vec!["Fishing+".to_string()]);
    assert!(report.failed.is_empty());

    let installed = engine.installed();
    assert_eq!(installed.len(), 1);
    assert_eq!(installed[0].id, "fish-plus");

    assert_eq!(engine.disable("fish-plus").unwrap(), ToggleOutcome::Changed);
    assert!(!tacklebox::store::game_mod_dir(&game_path, "fish-plus").exists());
    assert_eq!(engine.enable("fish-plus").unwrap(), ToggleOutcome::Changed);
    assert!(tacklebox::store::game_mod_dir(&game_path, "fish-plus").exists());

    engine.uninstall("fish-plus").unwrap();
    assert!(engine.installed().is_empty());
}

#[test]
fn batch_continues_past_failures() {
    let (_temp, engine, _game_path) = open_engine();
    let url = serve_once(make_zip_bytes("fish-plus", "1.0.0"));
    engine.set_catalog(vec![catalog_entry("Fishing+", &url)]);

    let report = engine
        .install_titles(&["NotInTheCatalog".to_string(), "Fishing+".to_string()])
        .unwrap();

    assert_eq!(report.succeeded, vec!["Fishing+".to_string()]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "NotInTheCatalog");
}

#[test]
fn operations_refuse_to_run_without_a_game_path() {
    let (_temp, data_dir, _game_path, _store) = setup_env();
    let engine = Engine::open(data_dir).unwrap();

    assert!(matches!(engine.absorb(), Err(EngineError::GamePathUnset)));
    assert!(matches!(
        engine.enable("anything"),
        Err(EngineError::GamePathUnset)
    ));
}

#[test]
fn manual_sweep_reports_through_the_event_channel() {
    let (_temp, engine, _game_path) = open_engine();
    engine.set_catalog(Vec::new());

    engine.run_sweep_now();

    let events = engine.drain_events();
    assert!(events
        .iter()
        .any(|event| matches!(event, EngineEvent::SweepFinished { .. })));
}

#[test]
fn async_install_reports_through_the_event_channel() {
    let (_temp, engine, _game_path) = open_engine();
    let url = serve_once(make_zip_bytes("fish-plus", "1.0.0"));
    engine.set_catalog(vec![catalog_entry("Fishing+", &url)]);

    engine.install_title_async("Fishing+").unwrap();

    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(10);
    let mut finished = false;
    while !finished {
        assert!(
            std::time::Instant::now() < deadline,
            "worker never reported the install"
        );
        for event in engine.drain_events() {
            if let EngineEvent::InstallFinished { outcome, .. } = event {
                assert_eq!(outcome.unwrap(), "fish-plus");
                finished = true;
            }
        }
        std::thread::sleep(std::time::Duration::from_millis(25));
    }
    assert_eq!(engine.installed().len(), 1);
}

#[test]
fn settings_survive_reopen() {
    let (_temp, data_dir, game_path, _store) = setup_env();
    {
        let engine = Engine::open(data_dir.clone()).unwrap();
        engine
            .update_settings(|settings| {
                settings.game_path = Some(game_path.clone());
                settings.auto_update = false;
            })
            .unwrap();
    }
    let engine = Engine::open(data_dir).unwrap();
    let settings = engine.settings();
    assert_eq!(settings.game_path.as_deref(), Some(game_path.as_path()));
    assert!(!settings.auto_update);
}
