use std::io::ErrorKind;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;
use std::task::Poll::{Pending, Ready};
use std::time::Duration;
use std::time::Instant;

use bytes::Bytes;
use futures_util::TryStreamExt;
use http_body_util::BodyExt;
use http_body_util::Empty;
use http_body_util::Full;
use http_body_util::StreamBody;
use http_body_util::combinators::BoxBody;
use hyper::HeaderMap;
use hyper::Method;
use hyper::Request;
use hyper::Response;
use hyper::StatusCode;
use hyper::body::Body;
use hyper::body::Frame;
use hyper::body::Incoming;
use hyper::body::SizeHint;
use hyper::header::CONTENT_LENGTH;
use hyper::header::HeaderValue;
use hyper::header::RANGE;
use hyper::header::SERVER;
use log::{debug, error, info, warn};
use rand::Rng;
use rand::SeedableRng;
use rand::distr::Alphanumeric;
use rand::rngs::SmallRng;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;

use crate::APP_NAME;
use crate::State;
use crate::config::MirrorRule;
use crate::error::RemirrorError;
use crate::global_config;
use crate::headers;
use crate::humanfmt::HumanFmt;
use crate::registry;
use crate::registry::DownloadHandle;
use crate::registry::DoneSignal;
use crate::registry::Registry;
use crate::registry::RegistryGuard;
use crate::rules;
use crate::transport::Client;
use crate::warn_once_or_info;

const BUF_SIZE: usize = 64 * 1024;
const CHANNEL_DEPTH: usize = 64;
pub(crate) const TMP_PREFIX: &str = "remirror_tmp_";

/// Poll cadence of a tailing reader while the writer makes no progress.
const TAIL_TICK: Duration = Duration::from_secs(1);
/// A tailer abandons the download after this much time without new bytes.
const TAIL_STALL: Duration = Duration::from_secs(60);

#[must_use]
pub(crate) fn empty() -> BoxBody<Bytes, RemirrorError> {
    Empty::<Bytes>::new().map_err(|never| match never {}).boxed()
}

#[must_use]
pub(crate) fn full<T: Into<Bytes>>(chunk: T) -> BoxBody<Bytes, RemirrorError> {
    Full::new(chunk.into())
        .map_err(|never| match never {})
        .boxed()
}

#[must_use]
pub(crate) fn quick_response<T: Into<Bytes>>(
    status: StatusCode,
    message: T,
) -> Response<BoxBody<Bytes, RemirrorError>> {
    Response::builder()
        .status(status)
        .header(SERVER, HeaderValue::from_static(APP_NAME))
        .body(full(message))
        .expect("response is valid")
}

#[must_use]
pub(crate) fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers.get(CONTENT_LENGTH)?.to_str().ok()?.parse().ok()
}

/// Filesystem location an artifact is cached at. The cache mirrors the
/// client-facing URL space, not the upstream layout.
#[must_use]
pub(crate) fn cache_key(data: &Path, request_path: &str) -> PathBuf {
    let cleaned = rules::clean_path(request_path);
    data.join(cleaned.trim_start_matches('/'))
}

/// Response body fed from the channel a writer task pushes chunks into.
struct ChannelBody {
    receiver: tokio::sync::mpsc::Receiver<Result<Bytes, RemirrorError>>,
    remaining: Option<u64>,
    complete: bool,
}

impl ChannelBody {
    #[must_use]
    fn new(
        receiver: tokio::sync::mpsc::Receiver<Result<Bytes, RemirrorError>>,
        content_length: Option<u64>,
    ) -> Self {
        Self {
            receiver,
            remaining: content_length,
            complete: false,
        }
    }
}

impl Body for ChannelBody {
    type Data = Bytes;
    type Error = RemirrorError;

    fn is_end_stream(&self) -> bool {
        self.complete
    }

    fn size_hint(&self) -> SizeHint {
        match self.remaining {
            Some(size) => SizeHint::with_exact(size),
            None => SizeHint::default(),
        }
    }

    fn poll_frame(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        if self.complete {
            return Ready(None);
        }

        match self.receiver.poll_recv(cx) {
            Pending => Pending,
            Ready(None) => {
                self.complete = true;
                Ready(None)
            }
            Ready(Some(Ok(data))) => {
                if let Some(remaining) = &mut self.remaining {
                    *remaining = remaining.saturating_sub(data.len() as u64);
                }
                Ready(Some(Ok(Frame::data(data))))
            }
            Ready(Some(Err(err))) => {
                self.complete = true;
                Ready(Some(Err(err)))
            }
        }
    }
}

/// Creates an exclusive temporary file directly under `dir` so the final
/// rename stays on one filesystem.
async fn create_tmp_file(dir: &Path) -> Result<(tokio::fs::File, PathBuf), tokio::io::Error> {
    const MAX_TRIES: u32 = 10;

    let mut rng = SmallRng::from_os_rng();
    let mut tries = 0;

    loop {
        let suffix: String = (&mut rng)
            .sample_iter(Alphanumeric)
            .take(10)
            .map(char::from)
            .collect();

        let path = dir.join(format!("{TMP_PREFIX}{suffix}"));

        match tokio::fs::File::options()
            .create_new(true)
            .write(true)
            .mode(0o644)
            .open(&path)
            .await
        {
            Ok(file) => return Ok((file, path)),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                tries += 1;
                if tries > MAX_TRIES {
                    return Err(err);
                }
            }
            Err(err) => return Err(err),
        }
    }
}

/// Entry point for every request that is not a discovery-host request.
pub(crate) async fn serve_mirror_request(
    client_addr: SocketAddr,
    req: Request<Incoming>,
    state: State,
) -> Response<BoxBody<Bytes, RemirrorError>> {
    let config = global_config();
    let path = req.uri().path().to_owned();
    let query = req.uri().query().map(str::to_owned);

    let Some((rule_index, rule)) = rules::find_rule(&config.mirrors, &path) else {
        warn_once_or_info!("No mirror rule matches path `{path}`");
        return quick_response(StatusCode::NOT_FOUND, "No mirror configured for path");
    };

    if let Some(local_root) = &rule.local {
        return serve_local_file(rule, local_root, &path).await;
    }

    let is_cacheable = rules::cacheable(rule, &path);

    if is_cacheable {
        let key = cache_key(&config.data, &path);

        match tokio::fs::File::open(&key).await {
            Ok(file) => {
                debug!("Cache hit for `{}`", key.display());
                return serve_ready_file(file, &key).await;
            }
            Err(err) if err.kind() == ErrorKind::NotFound => (),
            Err(err) => {
                error!("Error opening cached file `{}`:  {err}", key.display());
                return quick_response(StatusCode::INTERNAL_SERVER_ERROR, "Cache access failure");
            }
        }

        if !req.headers().contains_key(RANGE) {
            let mut guard = state.registry.lock().await;

            if let Some(handle) = guard.get(&key).cloned() {
                /* Open under the lock: the writer cannot unregister (and
                 * therefore cannot rename) until we release it. */
                let file = match tokio::fs::File::open(&handle.tmp_path).await {
                    Ok(f) => f,
                    Err(err) => {
                        drop(guard);
                        error!(
                            "Error opening in-flight file `{}`:  {err}",
                            handle.tmp_path.display()
                        );
                        return quick_response(
                            StatusCode::INTERNAL_SERVER_ERROR,
                            "Cache access failure",
                        );
                    }
                };
                drop(guard);

                info!(
                    "Tailing in-flight download of `{path}` for client {}",
                    client_addr.ip()
                );
                return serve_tailed_file(file, &handle);
            }

            return fetch_and_cache(
                guard,
                &state,
                rule_index,
                rule,
                req.headers(),
                &path,
                query.as_deref(),
                key,
                client_addr,
            )
            .await;
        }
    }

    forward_uncached(
        &state,
        rule_index,
        rule,
        req.headers(),
        &path,
        query.as_deref(),
    )
    .await
}

enum FetchOutcome {
    Response(Response<Incoming>),
    /// Every configured upstream answered 404/500/503.
    Exhausted,
    Failed(RemirrorError),
}

/// Issues the upstream request, walking the rule's upstream list on
/// transient failure statuses.
async fn fetch_with_failover(
    client: &Client,
    rule: &MirrorRule,
    req_headers: &HeaderMap,
    path: &str,
    query: Option<&str>,
) -> FetchOutcome {
    let total = rule.upstream_uris.len();

    for (pos, base) in rule.upstream_uris.iter().enumerate() {
        let url = match rules::compose_upstream_url(rule, base, path, query) {
            Ok(u) => u,
            Err(err) => return FetchOutcome::Failed(err),
        };

        let mut fwd_request = match Request::builder()
            .method(Method::GET)
            .uri(url.clone())
            .body(empty())
        {
            Ok(r) => r,
            Err(err) => return FetchOutcome::Failed(err.into()),
        };
        headers::copy_request_headers(req_headers, fwd_request.headers_mut());

        debug!("--> {url}");

        match client.request(fwd_request).await {
            Ok(response) => {
                let status = response.status();
                if matches!(status.as_u16(), 404 | 500 | 503) {
                    if pos + 1 < total {
                        warn!("Upstream {url} answered {status}, trying next upstream");
                        continue;
                    }
                    info!("Upstream {url} answered {status}, no upstreams left");
                    return FetchOutcome::Exhausted;
                }
                return FetchOutcome::Response(response);
            }
            Err(err) => {
                warn!("Request to upstream {url} failed:  {err}");
                return FetchOutcome::Failed(err.into());
            }
        }
    }

    FetchOutcome::Exhausted
}

#[must_use]
fn forward_response(response: Response<Incoming>) -> Response<BoxBody<Bytes, RemirrorError>> {
    let (mut parts, body) = response.into_parts();
    headers::scrub_response_headers(&mut parts.headers);
    Response::from_parts(parts, body.map_err(RemirrorError::Hyper).boxed())
}

/// Cacheable miss: fetch from upstream while registered as the single
/// in-flight download for the cache key, teeing the body into a temporary
/// file that is atomically promoted on full success.
///
/// The registry guard is held from the caller's lookup through handle
/// registration and released before any body bytes flow.
#[expect(clippy::too_many_arguments)]
async fn fetch_and_cache(
    mut guard: RegistryGuard<'_>,
    state: &State,
    rule_index: usize,
    rule: &MirrorRule,
    req_headers: &HeaderMap,
    path: &str,
    query: Option<&str>,
    key: PathBuf,
    client_addr: SocketAddr,
) -> Response<BoxBody<Bytes, RemirrorError>> {
    let client = state.transports.for_rule(rule_index);

    let response = match fetch_with_failover(client, rule, req_headers, path, query).await {
        FetchOutcome::Response(r) => r,
        FetchOutcome::Exhausted => {
            drop(guard);
            return quick_response(StatusCode::NOT_FOUND, "All upstreams failed");
        }
        FetchOutcome::Failed(err) => {
            drop(guard);
            return quick_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Upstream request failed: {err}"),
            );
        }
    };

    if response.status() != StatusCode::OK {
        drop(guard);
        return forward_response(response);
    }

    let (mut parts, body) = response.into_parts();

    let (tmp_file, tmp_path) = match create_tmp_file(&global_config().data).await {
        Ok(pair) => pair,
        Err(err) => {
            drop(guard);
            error!("Error creating temporary file for `{path}`:  {err}");
            return quick_response(StatusCode::INTERNAL_SERVER_ERROR, "Cache access failure");
        }
    };

    let (done_signal, done) = registry::done_channel();
    registry::register(
        &mut guard,
        key.clone(),
        DownloadHandle {
            status: parts.status,
            headers: parts.headers.clone(),
            tmp_path: tmp_path.clone(),
            done,
        },
    );
    drop(guard);

    info!(
        "Downloading `{path}` for client {}...",
        client_addr.ip()
    );

    let expected = content_length(&parts.headers);
    let (tx, rx) = tokio::sync::mpsc::channel(CHANNEL_DEPTH);

    tokio::task::spawn(write_and_tee(
        state.registry.clone(),
        body,
        tmp_file,
        tmp_path,
        key,
        expected,
        done_signal,
        tx,
    ));

    headers::scrub_response_headers(&mut parts.headers);
    Response::from_parts(parts, BoxBody::new(ChannelBody::new(rx, expected)))
}

/// The single writer of an in-flight download. Streams upstream body frames
/// into the temporary file and to the requesting client; the download
/// outlives the client on disconnect since tailers may still consume it.
#[expect(clippy::too_many_arguments)]
async fn write_and_tee(
    registry: Registry,
    mut body: Incoming,
    tmp_file: tokio::fs::File,
    tmp_path: PathBuf,
    key: PathBuf,
    expected: Option<u64>,
    done_signal: DoneSignal,
    tx: tokio::sync::mpsc::Sender<Result<Bytes, RemirrorError>>,
) {
    let start = Instant::now();
    let mut writer = tokio::io::BufWriter::with_capacity(BUF_SIZE, tmp_file);
    let mut received: u64 = 0;
    let mut connected = true;
    let mut failure: Option<RemirrorError> = None;

    loop {
        match body.frame().await {
            None => break,
            Some(Err(err)) => {
                failure = Some(err.into());
                break;
            }
            Some(Ok(frame)) => {
                let Ok(data) = frame.into_data() else {
                    continue;
                };

                received += data.len() as u64;

                if let Err(err) = writer.write_all(&data).await {
                    failure = Some(err.into());
                    break;
                }

                if connected && tx.send(Ok(data)).await.is_err() {
                    /* client went away; finish for the cache and any tailers */
                    debug!("Client disconnected during download of `{}`", key.display());
                    connected = false;
                }
            }
        }
    }

    if failure.is_none() {
        if let Err(err) = writer.flush().await {
            failure = Some(err.into());
        }
    }

    if failure.is_none() {
        if let Some(expected_len) = expected {
            if expected_len != received {
                failure = Some(RemirrorError::LengthMismatch {
                    expected: expected_len,
                    received,
                });
            }
        }
    }

    /* Close the file before signaling done so tailers read a true EOF. */
    drop(writer);

    if let Some(err) = failure {
        warn!(
            "Download for `{}` failed after {}:  {err}",
            key.display(),
            HumanFmt::Size(received)
        );
        if connected {
            let _ = tx.send(Err(err)).await;
        }
        registry.unregister(&key).await;
        done_signal.signal();
        remove_tmp(&tmp_path).await;
        return;
    }

    /* Unregister before the rename: the next request must either tail this
     * download or see the complete cache file, never both. */
    registry.unregister(&key).await;
    done_signal.signal();

    if let Some(parent) = key.parent() {
        if let Err(err) = tokio::fs::create_dir_all(parent).await {
            error!("Failed to create directory `{}`:  {err}", parent.display());
            remove_tmp(&tmp_path).await;
            return;
        }
    }

    match tokio::fs::rename(&tmp_path, &key).await {
        Ok(()) => {
            let elapsed = start.elapsed();
            info!(
                "Cached `{}` ({} in {}, {})",
                key.display(),
                HumanFmt::Size(received),
                HumanFmt::Time(elapsed),
                HumanFmt::Rate(received, elapsed)
            );
        }
        Err(err) => {
            error!(
                "Failed to rename `{}` to `{}`:  {err}",
                tmp_path.display(),
                key.display()
            );
            remove_tmp(&tmp_path).await;
        }
    }
}

async fn remove_tmp(tmp_path: &Path) {
    if let Err(err) = tokio::fs::remove_file(tmp_path).await {
        warn!(
            "Failed to remove temporary file `{}`:  {err}",
            tmp_path.display()
        );
    }
}

/// Serves a client from another request's in-progress temporary file.
#[must_use]
fn serve_tailed_file(
    file: tokio::fs::File,
    handle: &DownloadHandle,
) -> Response<BoxBody<Bytes, RemirrorError>> {
    let expected = content_length(&handle.headers);
    let (tx, rx) = tokio::sync::mpsc::channel(CHANNEL_DEPTH);

    tokio::task::spawn(tail_stream(
        file,
        handle.tmp_path.clone(),
        handle.done.clone(),
        tx,
    ));

    let mut headers = handle.headers.clone();
    headers::scrub_response_headers(&mut headers);

    let mut response = Response::builder()
        .status(handle.status)
        .body(BoxBody::new(ChannelBody::new(rx, expected)))
        .expect("response is valid");
    *response.headers_mut() = headers;

    response
}

/// Copies the writer's temporary file to the client as it grows. The writer
/// does not announce individual appends, so zero-byte reads poll on a
/// one-second tick until `done` fires or the stall bound is hit. Errors
/// terminate the body short; they are never turned into an HTTP error since
/// the status line is long gone.
async fn tail_stream(
    mut file: tokio::fs::File,
    tmp_path: PathBuf,
    mut done: tokio::sync::watch::Receiver<bool>,
    tx: tokio::sync::mpsc::Sender<Result<Bytes, RemirrorError>>,
) {
    let mut finished = *done.borrow_and_update();
    let mut last_progress = Instant::now();

    loop {
        /* copy everything between the current position and current EOF */
        let mut progressed = false;
        loop {
            let mut buf = bytes::BytesMut::with_capacity(BUF_SIZE);
            match file.read_buf(&mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    progressed = true;
                    if tx.send(Ok(buf.freeze())).await.is_err() {
                        return;
                    }
                }
                Err(err) => {
                    warn!("Error tailing `{}`:  {err}", tmp_path.display());
                    return;
                }
            }
        }

        if progressed {
            last_progress = Instant::now();
        }

        if finished {
            /* the post-done copy above reached the true EOF */
            return;
        }

        tokio::select! {
            changed = done.changed() => {
                /* done fired, or the writer died; one final copy either way */
                let _ = changed;
                finished = true;
            }
            () = tokio::time::sleep(TAIL_TICK) => {
                if last_progress.elapsed() > TAIL_STALL {
                    warn!(
                        "Writer of `{}` made no progress for {}, abandoning tail",
                        tmp_path.display(),
                        HumanFmt::Time(last_progress.elapsed())
                    );
                    return;
                }
            }
        }
    }
}

/// Streams a complete file from disk: a cache hit or a `local` rule entry.
async fn serve_ready_file(
    file: tokio::fs::File,
    path: &Path,
) -> Response<BoxBody<Bytes, RemirrorError>> {
    let metadata = match file.metadata().await {
        Ok(md) => md,
        Err(err) => {
            error!("Error inspecting file `{}`:  {err}", path.display());
            return quick_response(StatusCode::INTERNAL_SERVER_ERROR, "Cache access failure");
        }
    };

    if metadata.is_dir() {
        return quick_response(StatusCode::NOT_FOUND, "Not a file");
    }

    let reader = tokio_util::io::ReaderStream::with_capacity(file, BUF_SIZE);
    let body = StreamBody::new(reader.map_ok(Frame::data).map_err(RemirrorError::Io));

    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_LENGTH, HeaderValue::from(metadata.len()))
        .header(SERVER, HeaderValue::from_static(APP_NAME))
        .body(body.boxed())
        .expect("response is valid")
}

async fn serve_local_file(
    rule: &MirrorRule,
    local_root: &Path,
    path: &str,
) -> Response<BoxBody<Bytes, RemirrorError>> {
    let remainder = path.strip_prefix(rule.prefix.as_str()).unwrap_or(path);
    let cleaned = rules::clean_path(remainder);
    let full_path = local_root.join(cleaned.trim_start_matches('/'));

    match tokio::fs::File::open(&full_path).await {
        Ok(file) => serve_ready_file(file, &full_path).await,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            quick_response(StatusCode::NOT_FOUND, "File not found")
        }
        Err(err) => {
            error!("Error opening local file `{}`:  {err}", full_path.display());
            quick_response(StatusCode::INTERNAL_SERVER_ERROR, "Local file access failure")
        }
    }
}

async fn forward_uncached(
    state: &State,
    rule_index: usize,
    rule: &MirrorRule,
    req_headers: &HeaderMap,
    path: &str,
    query: Option<&str>,
) -> Response<BoxBody<Bytes, RemirrorError>> {
    let client = state.transports.for_rule(rule_index);

    match fetch_with_failover(client, rule, req_headers, path, query).await {
        FetchOutcome::Response(response) => forward_response(response),
        FetchOutcome::Exhausted => quick_response(StatusCode::NOT_FOUND, "All upstreams failed"),
        FetchOutcome::Failed(err) => quick_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Upstream request failed: {err}"),
        ),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_cache_key_mirrors_url_space() {
        let data = Path::new("/var/remirror");

        assert_eq!(
            cache_key(data, "/archlinux/x/foo.pkg.tar.xz"),
            PathBuf::from("/var/remirror/archlinux/x/foo.pkg.tar.xz")
        );
        assert_eq!(
            cache_key(data, "/centos//7/../7/os/pkg.rpm"),
            PathBuf::from("/var/remirror/centos/7/os/pkg.rpm")
        );
        /* traversal cannot escape the data root */
        assert_eq!(
            cache_key(data, "/../../etc/passwd"),
            PathBuf::from("/var/remirror/etc/passwd")
        );
    }

    #[test]
    fn test_content_length() {
        let mut headers = HeaderMap::new();
        assert_eq!(content_length(&headers), None);

        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("1024"));
        assert_eq!(content_length(&headers), Some(1024));

        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("junk"));
        assert_eq!(content_length(&headers), None);
    }

    #[tokio::test]
    async fn test_create_tmp_file_is_exclusive() {
        let dir = std::env::temp_dir();

        let (_file_a, path_a) = create_tmp_file(&dir).await.unwrap();
        let (_file_b, path_b) = create_tmp_file(&dir).await.unwrap();

        assert_ne!(path_a, path_b);
        assert!(
            path_a
                .file_name()
                .unwrap()
                .to_str()
                .unwrap()
                .starts_with(TMP_PREFIX)
        );

        tokio::fs::remove_file(&path_a).await.unwrap();
        tokio::fs::remove_file(&path_b).await.unwrap();
    }

    #[tokio::test]
    async fn test_channel_body_collects_chunks() {
        let (tx, rx) = tokio::sync::mpsc::channel(4);
        let body = ChannelBody::new(rx, Some(10));

        tx.send(Ok(Bytes::from_static(b"hello "))).await.unwrap();
        tx.send(Ok(Bytes::from_static(b"world"))).await.unwrap();
        drop(tx);

        let collected = body.collect().await.unwrap().to_bytes();
        assert_eq!(collected.as_ref(), b"hello world");
    }

    #[tokio::test]
    async fn test_channel_body_propagates_error() {
        let (tx, rx) = tokio::sync::mpsc::channel(4);
        let body = ChannelBody::new(rx, None);

        tx.send(Ok(Bytes::from_static(b"partial"))).await.unwrap();
        tx.send(Err(RemirrorError::LengthMismatch {
            expected: 100,
            received: 7,
        }))
        .await
        .unwrap();
        drop(tx);

        assert!(body.collect().await.is_err());
    }

    #[tokio::test]
    async fn test_tail_stream_follows_writer() {
        let dir = std::env::temp_dir();
        let (mut tmp, tmp_path) = create_tmp_file(&dir).await.unwrap();

        tmp.write_all(b"first-").await.unwrap();
        tmp.flush().await.unwrap();

        let reader = tokio::fs::File::open(&tmp_path).await.unwrap();
        let (done_signal, done) = registry::done_channel();
        let (tx, mut rx) = tokio::sync::mpsc::channel(8);

        let tail = tokio::task::spawn(tail_stream(reader, tmp_path.clone(), done, tx));

        let first = rx.recv().await.unwrap().unwrap();
        assert_eq!(first.as_ref(), b"first-");

        tmp.write_all(b"second").await.unwrap();
        tmp.flush().await.unwrap();
        drop(tmp);
        done_signal.signal();

        let mut rest = Vec::new();
        while let Some(chunk) = rx.recv().await {
            rest.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(rest.as_slice(), b"second");

        tail.await.unwrap();
        tokio::fs::remove_file(&tmp_path).await.unwrap();
    }

    #[tokio::test]
    async fn test_tail_stream_unblocks_on_writer_death() {
        let dir = std::env::temp_dir();
        let (tmp, tmp_path) = create_tmp_file(&dir).await.unwrap();
        drop(tmp);

        let reader = tokio::fs::File::open(&tmp_path).await.unwrap();
        let (done_signal, done) = registry::done_channel();
        let (tx, mut rx) = tokio::sync::mpsc::channel(8);

        let tail = tokio::task::spawn(tail_stream(reader, tmp_path.clone(), done, tx));

        /* writer dropping its signal without firing must terminate the tail */
        drop(done_signal);

        assert!(rx.recv().await.is_none());
        tail.await.unwrap();
        tokio::fs::remove_file(&tmp_path).await.unwrap();
    }
}
