//! Shared helpers for tests: local HTTP fixtures and fake probe tools.

use std::path::PathBuf;

use axum::Router;

/// Serve `router` on an ephemeral localhost port and return its base URL.
pub(crate) async fn spawn_fixture(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind fixture listener");
    let addr = listener.local_addr().expect("fixture address");

    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });

    format!("http://{}", addr)
}

/// A localhost base URL with nothing listening on it.
pub(crate) async fn closed_port_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind probe listener");
    let addr = listener.local_addr().expect("probe address");
    drop(listener);
    format!("http://{}", addr)
}

/// Write an executable shell script standing in for ffprobe.
///
/// `body` is the script after the shebang. It receives the real ffprobe
/// arguments, with the URL last (`$9`), and may read them.
#[cfg(unix)]
pub(crate) fn fake_probe(dir: &tempfile::TempDir, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.path().join("ffprobe");
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).expect("write fake probe");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .expect("chmod fake probe");
    path
}
