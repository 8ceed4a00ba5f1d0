use std::borrow::Cow;

use bytes::Bytes;
use http_body_util::BodyExt;
use http_body_util::combinators::BoxBody;
use hyper::Method;
use hyper::Request;
use hyper::Response;
use hyper::StatusCode;
use hyper::Uri;
use hyper::body::Incoming;
use hyper::header::CONTENT_TYPE;
use hyper::header::HeaderValue;
use hyper::header::SERVER;
use hyper::header::USER_AGENT;
use log::error;
use log::info;
use log::warn;

use crate::APP_NAME;
use crate::APP_USER_AGENT;
use crate::State;
use crate::error::RemirrorError;
use crate::global_config;
use crate::headers;
use crate::metalink;
use crate::proxy::{empty, full, quick_response};
use crate::warn_once_or_info;

/// Hosts whose mirror-discovery responses are rewritten to advertise this
/// proxy. Clients reach them here through DNS pointed at the cache.
pub(crate) const FEDORA_HOST: &str = "mirrors.fedoraproject.org";
pub(crate) const CENTOS_HOST: &str = "mirrorlist.centos.org";

/// The name advertised in rewritten mirror lists. The request's own Host is
/// one of the intercepted mirror names and would route clients right back
/// into these handlers, so only the configured proxy name is usable.
fn advertised_host() -> Option<&'static str> {
    global_config().host.as_deref()
}

#[must_use]
fn host_not_configured() -> Response<BoxBody<Bytes, RemirrorError>> {
    warn_once_or_info!("Cannot rewrite mirror list: no `host` configured to advertise");
    quick_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        "Proxy host not configured",
    )
}

fn query_param<'a>(query: &'a str, name: &str) -> Option<Cow<'a, str>> {
    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == name).then(|| urlencoding::decode(value).unwrap_or(Cow::Borrowed(value)))
    })
}

/// Proxies a Fedora metalink request to the real `mirrors.fedoraproject.org`
/// and rewrites the response so this proxy is the preferred mirror.
pub(crate) async fn fedora_metalink(
    req: Request<Incoming>,
    state: &State,
) -> Response<BoxBody<Bytes, RemirrorError>> {
    let query = req.uri().query().unwrap_or("");

    let Some(arch) = query_param(query, "arch").map(Cow::into_owned) else {
        warn!("Metalink request without arch parameter: {}", req.uri());
        return quick_response(StatusCode::NOT_FOUND, "Missing arch parameter");
    };

    let Some(local_host) = advertised_host() else {
        return host_not_configured();
    };

    let path_and_query = req
        .uri()
        .path_and_query()
        .map_or_else(|| String::from("/"), |pq| pq.as_str().to_owned());

    let upstream_uri = match Uri::builder()
        .scheme("https")
        .authority(FEDORA_HOST)
        .path_and_query(path_and_query)
        .build()
    {
        Ok(u) => u,
        Err(err) => {
            error!("Error composing metalink upstream URL:  {err}");
            return quick_response(StatusCode::INTERNAL_SERVER_ERROR, "Invalid metalink URL");
        }
    };

    info!("Fetching metalink from {upstream_uri}...");

    let mut fwd_request = match Request::builder()
        .method(Method::GET)
        .uri(upstream_uri)
        .body(empty())
    {
        Ok(r) => r,
        Err(err) => {
            error!("Error building metalink request:  {err}");
            return quick_response(StatusCode::INTERNAL_SERVER_ERROR, "Invalid metalink request");
        }
    };
    headers::copy_request_headers(req.headers(), fwd_request.headers_mut());
    /* after the copy, so the client's own agent string is replaced */
    fwd_request
        .headers_mut()
        .insert(USER_AGENT, HeaderValue::from_static(APP_USER_AGENT));

    let response = match state.transports.default_client().request(fwd_request).await {
        Ok(r) => r,
        Err(err) => {
            warn!("Metalink request to {FEDORA_HOST} failed:  {err}");
            return quick_response(StatusCode::INTERNAL_SERVER_ERROR, "Metalink fetch failed");
        }
    };

    if response.status() != StatusCode::OK {
        warn!("Metalink upstream answered {}", response.status());
        return quick_response(response.status(), "Metalink fetch failed");
    }

    let content_type = response.headers().get(CONTENT_TYPE).cloned();

    let body = match response.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(err) => {
            warn!("Error reading metalink body:  {err}");
            return quick_response(StatusCode::INTERNAL_SERVER_ERROR, "Metalink fetch failed");
        }
    };

    let input = match String::from_utf8(body.to_vec()) {
        Ok(s) => s,
        Err(err) => {
            warn!("Metalink body is not valid UTF-8:  {err}");
            return quick_response(StatusCode::INTERNAL_SERVER_ERROR, "Invalid metalink body");
        }
    };

    let local_url = local_repomd_url(local_host, &arch);

    let rewritten = match metalink::rewrite(&input, &local_url) {
        Ok(doc) => doc,
        Err(err) => {
            error!("Error rewriting metalink:  {err}");
            return quick_response(StatusCode::INTERNAL_SERVER_ERROR, "Metalink rewrite failed");
        }
    };

    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header(SERVER, HeaderValue::from_static(APP_NAME))
        .body(full(rewritten))
        .expect("response is valid");

    if let Some(ct) = content_type {
        response.headers_mut().insert(CONTENT_TYPE, ct);
    }

    response
}

#[must_use]
fn local_repomd_url(host: &str, arch: &str) -> String {
    format!("http://{host}/fedora-epel/7/{arch}/repodata/repomd.xml")
}

/// Answers a CentOS mirrorlist query with a single mirror: this proxy.
pub(crate) async fn centos_mirrorlist(
    req: Request<Incoming>,
) -> Response<BoxBody<Bytes, RemirrorError>> {
    let Some(host) = advertised_host() else {
        return host_not_configured();
    };
    let line = mirrorlist_line(
        req.uri().query().unwrap_or(""),
        host,
        &global_config().centos_release,
    );

    info!("Answering mirrorlist query with `{line}`");

    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, HeaderValue::from_static("text/plain"))
        .header(SERVER, HeaderValue::from_static(APP_NAME))
        .body(full(line))
        .expect("response is valid")
}

/// Mirrorlist clients send a bare major release; the advertised path needs
/// the point release the tree is actually laid out under.
#[must_use]
fn mirrorlist_line(query: &str, host: &str, point_release: &str) -> String {
    let release = query_param(query, "release").unwrap_or_default();
    let repo = query_param(query, "repo").unwrap_or_default();
    let arch = query_param(query, "arch").unwrap_or_default();

    let release = if release == "7" {
        Cow::Borrowed(point_release)
    } else {
        release
    };

    format!("http://{host}/centos/{release}/{repo}/{arch}/")
}
