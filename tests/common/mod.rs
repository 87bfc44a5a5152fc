#![allow(dead_code)]

use std::{
    collections::BTreeMap,
    fs,
    io::{Cursor, Read, Write},
    net::TcpListener,
    path::{Path, PathBuf},
    thread,
};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

use tacklebox::catalog::CatalogEntry;
use tacklebox::store::ModStore;

/// Temp environment with an app data dir, a mod store, and a fake game
/// installation (the plugin directory is created on demand by sync).
pub fn setup_env() -> (TempDir, PathBuf, PathBuf, ModStore) {
    let temp = tempfile::tempdir().unwrap();
    let data_dir = temp.path().join("data");
    let game_path = temp.path().join("game");
    fs::create_dir_all(&data_dir).unwrap();
    fs::create_dir_all(&game_path).unwrap();
    let store = ModStore::open(&data_dir).unwrap();
    (temp, data_dir, game_path, store)
}

pub fn manifest_json(id: &str, version: &str) -> String {
    format!(
        r#"{{"Id": "{id}", "Name": "{id}", "Author": "test", "Description": "a test mod", "Version": "{version}"}}"#
    )
}

/// Lays out an extracted-package directory: manifest.json plus a payload file.
pub fn make_package_dir(root: &Path, id: &str, version: &str) -> PathBuf {
    let dir = root.join(format!("pkg_{id}"));
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("manifest.json"), manifest_json(id, version)).unwrap();
    fs::write(dir.join("main.gd"), format!("# {id} {version}")).unwrap();
    dir
}

/// Builds a mod package zip in memory, payload nested under a folder the way
/// real releases ship.
pub fn make_zip_bytes(id: &str, version: &str) -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut cursor);
        let options = SimpleFileOptions::default();
        writer.add_directory(format!("{id}/"), options).unwrap();
        writer
            .start_file(format!("{id}/manifest.json"), options)
            .unwrap();
        writer
            .write_all(manifest_json(id, version).as_bytes())
            .unwrap();
        writer.start_file(format!("{id}/main.gd"), options).unwrap();
        writer
            .write_all(format!("# {id} {version}").as_bytes())
            .unwrap();
        writer.finish().unwrap();
    }
    cursor.into_inner()
}

pub fn write_zip_file(path: &Path, id: &str, version: &str) {
    fs::write(path, make_zip_bytes(id, version)).unwrap();
}

/// Serves `body` for a single HTTP request on a private port and returns the
/// URL. The accept loop lives on a detached thread; the listener closes once
/// the response is written.
pub fn serve_once(body: Vec<u8>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        if let Ok((mut stream, _)) = listener.accept() {
            let mut buf = [0u8; 4096];
            let _ = stream.read(&mut buf);
            let header = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            let _ = stream.write_all(header.as_bytes());
            let _ = stream.write_all(&body);
        }
    });
    format!("http://{addr}/package.zip")
}

pub fn catalog_entry(title: &str, download: &str) -> CatalogEntry {
    serde_json::from_str(&format!(
        r#"{{"title": "{title}", "download": "{download}", "author": "test"}}"#
    ))
    .unwrap()
}

/// Relative-path → contents map for byte-identity comparisons.
pub fn dir_snapshot(root: &Path) -> BTreeMap<String, Vec<u8>> {
    let mut snapshot = BTreeMap::new();
    if !root.exists() {
        return snapshot;
    }
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in fs::read_dir(&dir).unwrap() {
            let entry = entry.unwrap();
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                let rel = path.strip_prefix(root).unwrap().to_string_lossy().to_string();
                snapshot.insert(rel, fs::read(&path).unwrap());
            }
        }
    }
    snapshot
}
