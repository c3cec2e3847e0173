#![allow(dead_code)]

use axum::body::Body;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use std::net::SocketAddr;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use vidrelay_core::{Topology, TransferConfig};
use vidrelay_storage::{LocalStorage, ObjectStorage, ObjectSummary};

pub const PAYLOAD_LEN: usize = 300 * 1024;

pub fn payload() -> Vec<u8> {
    (0..PAYLOAD_LEN).map(|i| (i % 253) as u8).collect()
}

/// Behaviour of the stand-in transcoder
#[derive(Debug, Clone, Copy)]
pub enum FakeTranscoder {
    /// Copies input to output and reports progress. URL inputs are
    /// recorded instead of fetched.
    Copy,
    /// Exits 1 with an ffmpeg-style stream map error
    Fail,
    /// Reports some progress, then sleeps until killed
    Hang,
}

const COPY_SCRIPT: &str = r#"#!/bin/sh
input=""
output=""
prev=""
for arg in "$@"; do
  if [ "$prev" = "-i" ]; then input="$arg"; fi
  prev="$arg"
  output="$arg"
done
printf '%s\n' "$@" > "$(dirname "$0")/ffmpeg.args"
echo "Input #0, mov,mp4,m4a,3gp,3g2,mj2, from '$input':" >&2
printf '  Metadata:\n    title           : Caf\351\n' >&2
echo "  Duration: 00:00:10.00, start: 0.000000, bitrate: 1 kb/s" >&2
echo "total_size=0" >&2
echo "out_time_us=0" >&2
echo "progress=continue" >&2
case "$input" in
  http://*|https://*)
    # Network inputs are not fetched; the output names what was requested
    printf 'fetched %s\n' "$input" > "$output" || exit 1
    ;;
  pipe:0)
    if [ "$output" = "pipe:1" ]; then cat; else cat > "$output"; fi || exit 1
    ;;
  *)
    if [ "$output" = "pipe:1" ]; then cat "$input"; else cat "$input" > "$output"; fi || exit 1
    ;;
esac
echo "total_size=1024" >&2
echo "out_time_us=10000000" >&2
echo "progress=end" >&2
exit 0
"#;

const FAIL_SCRIPT: &str = r#"#!/bin/sh
echo "Stream map '0:a:m:language:eng' matches no streams." >&2
echo "To ignore this, add a trailing '?' to the map." >&2
exit 1
"#;

/// Write the stand-in transcoder into `dir` and return its path.
///
/// The hang variant records its pid in `dir/ffmpeg.pid`.
pub fn fake_ffmpeg(dir: &Path, behavior: FakeTranscoder) -> PathBuf {
    let script = match behavior {
        FakeTranscoder::Copy => COPY_SCRIPT.to_string(),
        FakeTranscoder::Fail => FAIL_SCRIPT.to_string(),
        FakeTranscoder::Hang => format!(
            "#!/bin/sh\n\
             echo $$ > '{}'\n\
             echo \"  Duration: 00:10:00.00, start: 0.000000, bitrate: 1 kb/s\" >&2\n\
             echo \"total_size=10\" >&2\n\
             echo \"out_time_us=1000000\" >&2\n\
             echo \"progress=continue\" >&2\n\
             exec sleep 30\n",
            pid_file(dir).display()
        ),
    };
    let path = dir.join("fake-ffmpeg.sh");
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Arguments the copy transcoder was last started with, one per line
pub fn recorded_args(dir: &Path) -> Vec<String> {
    std::fs::read_to_string(dir.join("ffmpeg.args"))
        .map(|s| s.lines().map(str::to_string).collect())
        .unwrap_or_default()
}

pub fn pid_file(dir: &Path) -> PathBuf {
    dir.join("ffmpeg.pid")
}

pub fn recorded_pid(dir: &Path) -> Option<u32> {
    std::fs::read_to_string(pid_file(dir))
        .ok()
        .and_then(|s| s.trim().parse().ok())
}

/// Serve `/video`, `/missing` (404) and `/broken` (drops mid-body).
pub async fn serve_media() -> SocketAddr {
    let app = Router::new()
        .route("/video", get(|| async { payload() }))
        .route("/missing", get(|| async { StatusCode::NOT_FOUND }))
        .route(
            "/broken",
            get(|| async {
                let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
                    Ok(Bytes::from(vec![1u8; 64 * 1024])),
                    Err(std::io::Error::other("connection dropped")),
                ];
                Body::from_stream(futures::stream::iter(chunks))
            }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

pub fn test_config(root: &Path, ffmpeg: &Path, topology: Topology) -> TransferConfig {
    let mut config = TransferConfig::for_local_storage(root.join("bucket"));
    config.ffmpeg_path = ffmpeg.display().to_string();
    config.topology = topology;
    config.temp_dir = root.join("scratch");
    config.part_size_bytes = 64 * 1024;
    config.upload_concurrency = 2;
    config.source_connect_timeout_secs = 2;
    config
}

pub async fn local_bucket(root: &Path) -> Arc<LocalStorage> {
    Arc::new(LocalStorage::new(root.join("bucket")).await.unwrap())
}

pub async fn objects(storage: &LocalStorage) -> Vec<ObjectSummary> {
    storage.list_objects_page(None, 1000).await.unwrap().objects
}

/// Entries in a directory; a missing directory counts as empty.
pub fn entry_count(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}

/// Run artifacts left in the scratch dir plus uploads left staged in the bucket
pub fn leftovers(root: &Path) -> (usize, usize) {
    (
        entry_count(&root.join("scratch")),
        entry_count(&root.join("bucket").join(".multipart")),
    )
}
