//! Archive fixtures, mock HTTP routes and orchestrator setup

use bundle_dl::{Config, SpaceProbe, TaskOrchestrator};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Free-space probe reporting a fixed number of bytes
pub struct FixedProbe(pub u64);

impl SpaceProbe for FixedProbe {
    fn available_space(&self, _path: &Path) -> std::io::Result<u64> {
        Ok(self.0)
    }
}

/// Orchestrator writing under a fresh temp dir, with unlimited free space
pub fn create_test_orchestrator() -> (TaskOrchestrator, TempDir) {
    create_orchestrator_with_space(u64::MAX)
}

/// Orchestrator writing under a fresh temp dir, reporting `available` free bytes
pub fn create_orchestrator_with_space(available: u64) -> (TaskOrchestrator, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.download.base_download_path = temp_dir.path().to_path_buf();

    let orchestrator = TaskOrchestrator::new(config)
        .unwrap()
        .with_space_probe(Arc::new(FixedProbe(available)));
    (orchestrator, temp_dir)
}

/// ZIP archive bytes; names ending in '/' become directory entries
pub fn zip_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options =
        zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    for (name, content) in files {
        if name.ends_with('/') {
            writer.add_directory(*name, options).unwrap();
        } else {
            writer.start_file(*name, options).unwrap();
            writer.write_all(content).unwrap();
        }
    }
    writer.finish().unwrap().into_inner()
}

/// Deterministic payload of `len` bytes
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 256) as u8).collect()
}

/// Serve `body` at `route`, expecting exactly `times` requests
pub async fn serve_file(server: &MockServer, route: &str, body: Vec<u8>, times: u64) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .expect(times)
        .mount(server)
        .await;
}

/// Serve `status` with an empty body at `route`
pub async fn serve_status(server: &MockServer, route: &str, status: u16) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}
