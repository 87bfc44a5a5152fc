mod common;

use std::fs;

use common::*;
use tacklebox::error::EngineError;
use tacklebox::library::{find_installed, installed_mods, load_descriptor};
use tacklebox::lifecycle::{
    self, apply_pack, disable, enable, import_package, install, install_extracted, uninstall,
    ToggleOutcome,
};
use tacklebox::store::{game_mod_dir, Scope};

#[test]
fn fresh_install_materializes_store_and_game_copies() {
    let (_temp, data_dir, game_path, store) = setup_env();
    let url = serve_once(make_zip_bytes("fish-plus", "1.0.0"));
    let entry = catalog_entry("Fishing+", &url);

    let descriptor = install(&store, &data_dir, &game_path, &entry, None).unwrap();

    assert_eq!(descriptor.id, "fish-plus");
    assert!(descriptor.enabled);
    assert!(!descriptor.third_party);

    let store_dir = store.mod_dir("fish-plus", Scope::Managed);
    assert!(store_dir.join("mod_info.json").exists());
    assert!(store_dir.join("manifest.json").exists());

    let game_dir = game_mod_dir(&game_path, "fish-plus");
    assert!(game_dir.join("manifest.json").exists());
    assert!(game_dir.join("main.gd").exists());

    let reloaded = load_descriptor(&store_dir).unwrap().unwrap();
    assert_eq!(reloaded.version, "1.0.0");
    assert_eq!(reloaded.download.as_deref(), Some(url.as_str()));
}

#[test]
fn install_over_third_party_conflicts_and_touches_nothing() {
    let (temp, data_dir, game_path, store) = setup_env();

    let archive = temp.path().join("import.zip");
    write_zip_file(&archive, "fish-plus", "0.9.0");
    import_package(&store, &data_dir, &game_path, &archive).unwrap();

    let third_party_dir = store.mod_dir("fish-plus", Scope::ThirdParty);
    let before_store = dir_snapshot(&third_party_dir);
    let before_game = dir_snapshot(&game_mod_dir(&game_path, "fish-plus"));

    let package = make_package_dir(temp.path(), "fish-plus", "2.0.0");
    let entry = catalog_entry("Fishing+", "https://example.invalid/fish.zip");
    let err = install_extracted(&store, &data_dir, &game_path, &package, &entry, None)
        .unwrap_err();

    assert!(matches!(
        err,
        EngineError::Conflict {
            existing: Scope::ThirdParty,
            ..
        }
    ));
    assert!(!store.mod_exists("fish-plus", Scope::Managed));
    assert_eq!(dir_snapshot(&third_party_dir), before_store);
    assert_eq!(
        dir_snapshot(&game_mod_dir(&game_path, "fish-plus")),
        before_game
    );
}

#[test]
fn reinstall_over_managed_mod_is_an_implicit_update() {
    let (temp, data_dir, game_path, store) = setup_env();
    let entry = catalog_entry("Fishing+", "https://example.invalid/fish.zip");

    let v1 = make_package_dir(temp.path(), "fish-plus", "1.0.0");
    install_extracted(&store, &data_dir, &game_path, &v1, &entry, None).unwrap();

    let v2 = temp.path().join("pkg_v2");
    fs::create_dir_all(&v2).unwrap();
    fs::write(v2.join("manifest.json"), manifest_json("fish-plus", "2.0.0")).unwrap();
    fs::write(v2.join("rewritten.gd"), "# new payload").unwrap();
    install_extracted(&store, &data_dir, &game_path, &v2, &entry, None).unwrap();

    let store_dir = store.mod_dir("fish-plus", Scope::Managed);
    assert!(store_dir.join("rewritten.gd").exists());
    assert!(!store_dir.join("main.gd").exists());

    let game_dir = game_mod_dir(&game_path, "fish-plus");
    assert!(game_dir.join("rewritten.gd").exists());
    assert!(!game_dir.join("main.gd").exists());

    let descriptor = load_descriptor(&store_dir).unwrap().unwrap();
    assert_eq!(descriptor.version, "2.0.0");
}

#[test]
fn enable_disable_round_trip_restores_game_copy_exactly() {
    let (temp, data_dir, game_path, store) = setup_env();
    let entry = catalog_entry("Fishing+", "https://example.invalid/fish.zip");
    let package = make_package_dir(temp.path(), "fish-plus", "1.0.0");
    install_extracted(&store, &data_dir, &game_path, &package, &entry, None).unwrap();

    let game_dir = game_mod_dir(&game_path, "fish-plus");
    let before = dir_snapshot(&game_dir);
    assert!(!before.is_empty());

    assert_eq!(
        disable(&store, &data_dir, &game_path, "fish-plus").unwrap(),
        ToggleOutcome::Changed
    );
    assert!(!game_dir.exists());
    assert!(
        !find_installed(&store, "fish-plus").unwrap().unwrap().enabled,
        "disable must persist through the descriptor"
    );

    assert_eq!(
        enable(&store, &data_dir, &game_path, "fish-plus").unwrap(),
        ToggleOutcome::Changed
    );
    assert_eq!(dir_snapshot(&game_dir), before);
}

#[test]
fn enable_of_enabled_mod_is_a_reported_noop() {
    let (temp, data_dir, game_path, store) = setup_env();
    let entry = catalog_entry("Fishing+", "https://example.invalid/fish.zip");
    let package = make_package_dir(temp.path(), "fish-plus", "1.0.0");
    install_extracted(&store, &data_dir, &game_path, &package, &entry, None).unwrap();

    assert_eq!(
        enable(&store, &data_dir, &game_path, "fish-plus").unwrap(),
        ToggleOutcome::NoOp
    );
}

#[test]
fn import_lands_in_third_party_subtree_enabled() {
    let (temp, data_dir, game_path, store) = setup_env();
    let archive = temp.path().join("mod.zip");
    write_zip_file(&archive, "borderless-fix", "1.1.0");

    let descriptor = import_package(&store, &data_dir, &game_path, &archive).unwrap();

    assert!(descriptor.third_party);
    assert!(descriptor.enabled);
    assert!(descriptor.download.is_none());
    assert!(store.mod_exists("borderless-fix", Scope::ThirdParty));
    assert!(!store.mod_exists("borderless-fix", Scope::Managed));
    assert!(game_mod_dir(&game_path, "borderless-fix").exists());
}

#[test]
fn import_conflicts_with_either_scope() {
    let (temp, data_dir, game_path, store) = setup_env();
    let entry = catalog_entry("Fishing+", "https://example.invalid/fish.zip");
    let package = make_package_dir(temp.path(), "fish-plus", "1.0.0");
    install_extracted(&store, &data_dir, &game_path, &package, &entry, None).unwrap();

    let archive = temp.path().join("dup.zip");
    write_zip_file(&archive, "fish-plus", "9.9.9");
    let err = import_package(&store, &data_dir, &game_path, &archive).unwrap_err();

    assert!(matches!(
        err,
        EngineError::Conflict {
            existing: Scope::Managed,
            ..
        }
    ));
    // the managed copy is untouched
    let descriptor = find_installed(&store, "fish-plus").unwrap().unwrap();
    assert_eq!(descriptor.version, "1.0.0");
}

#[test]
fn import_without_manifest_fails_before_touching_stores() {
    let (temp, data_dir, game_path, store) = setup_env();
    let archive = temp.path().join("junk.zip");
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        use std::io::Write;
        let mut writer = zip::ZipWriter::new(&mut cursor);
        writer
            .start_file("readme.txt", zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"not a mod").unwrap();
        writer.finish().unwrap();
    }
    fs::write(&archive, cursor.into_inner()).unwrap();

    let err = import_package(&store, &data_dir, &game_path, &archive).unwrap_err();
    assert!(matches!(err, EngineError::ManifestMissing));
    assert!(installed_mods(&store).is_empty());
}

#[test]
fn uninstall_removes_both_copies_and_tolerates_absence() {
    let (temp, data_dir, game_path, store) = setup_env();
    let entry = catalog_entry("Fishing+", "https://example.invalid/fish.zip");
    let package = make_package_dir(temp.path(), "fish-plus", "1.0.0");
    install_extracted(&store, &data_dir, &game_path, &package, &entry, None).unwrap();

    // game copy already gone: still a clean uninstall
    fs::remove_dir_all(game_mod_dir(&game_path, "fish-plus")).unwrap();
    uninstall(&store, &data_dir, &game_path, "fish-plus").unwrap();
    assert!(!store.mod_exists("fish-plus", Scope::Managed));

    let err = uninstall(&store, &data_dir, &game_path, "fish-plus").unwrap_err();
    assert!(matches!(err, EngineError::NotInstalled(_)));
}

#[test]
fn apply_pack_disables_everything_then_enables_members() {
    let (temp, data_dir, game_path, store) = setup_env();

    let sprint = make_package_dir(temp.path(), "sprint-toggle", "1.0.0");
    install_extracted(
        &store,
        &data_dir,
        &game_path,
        &sprint,
        &catalog_entry("SprintToggle", "https://example.invalid/sprint.zip"),
        None,
    )
    .unwrap();
    let gamble = make_package_dir(temp.path(), "quick-gamble", "1.0.0");
    install_extracted(
        &store,
        &data_dir,
        &game_path,
        &gamble,
        &catalog_entry("QuickGamble", "https://example.invalid/gamble.zip"),
        None,
    )
    .unwrap();

    // the third member is not installed yet and comes from the catalog
    let url = serve_once(make_zip_bytes("event-alert", "1.0.0"));
    let catalog = vec![catalog_entry("EventAlert", &url)];

    let report = apply_pack(
        &store,
        &data_dir,
        &game_path,
        "Test Pack",
        &["EventAlert"],
        &catalog,
    );

    assert_eq!(report.disabled, 2);
    assert_eq!(report.members.succeeded, vec!["EventAlert".to_string()]);
    assert!(report.members.failed.is_empty());

    assert!(!game_mod_dir(&game_path, "sprint-toggle").exists());
    assert!(!game_mod_dir(&game_path, "quick-gamble").exists());
    assert!(game_mod_dir(&game_path, "event-alert").exists());

    let alert = find_installed(&store, "event-alert").unwrap().unwrap();
    assert!(alert.enabled);
    let sprint = find_installed(&store, "sprint-toggle").unwrap().unwrap();
    assert!(!sprint.enabled);
}

#[test]
fn apply_pack_reports_missing_members_and_continues() {
    let (temp, data_dir, game_path, store) = setup_env();
    let package = make_package_dir(temp.path(), "sprint-toggle", "1.0.0");
    install_extracted(
        &store,
        &data_dir,
        &game_path,
        &package,
        &catalog_entry("SprintToggle", "https://example.invalid/sprint.zip"),
        None,
    )
    .unwrap();

    let report = apply_pack(
        &store,
        &data_dir,
        &game_path,
        "Test Pack",
        &["NoSuchMod", "SprintToggle"],
        &[],
    );

    assert_eq!(report.members.succeeded, vec!["SprintToggle".to_string()]);
    assert_eq!(report.members.failed.len(), 1);
    assert_eq!(report.members.failed[0].0, "NoSuchMod");
    assert!(game_mod_dir(&game_path, "sprint-toggle").exists());
}

#[test]
fn sync_replaces_stale_game_copy_wholesale() {
    let (temp, data_dir, game_path, store) = setup_env();
    let entry = catalog_entry("Fishing+", "https://example.invalid/fish.zip");
    let package = make_package_dir(temp.path(), "fish-plus", "1.0.0");
    let descriptor =
        install_extracted(&store, &data_dir, &game_path, &package, &entry, None).unwrap();

    // plant a stray file in the game copy; a resync must not preserve it
    let game_dir = game_mod_dir(&game_path, "fish-plus");
    fs::write(game_dir.join("stale.tmp"), "junk").unwrap();

    lifecycle::sync_to_game(&store, &game_path, &descriptor).unwrap();
    assert!(!game_dir.join("stale.tmp").exists());
    assert_eq!(
        dir_snapshot(&game_dir),
        dir_snapshot(&store.mod_dir("fish-plus", Scope::Managed))
    );
}
