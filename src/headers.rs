use hyper::HeaderMap;
use hyper::header::ACCEPT_RANGES;
use hyper::header::CONNECTION;
use hyper::header::HOST;
use hyper::header::HeaderName;
use hyper::header::HeaderValue;
use hyper::header::PROXY_AUTHENTICATE;
use hyper::header::PROXY_AUTHORIZATION;
use hyper::header::RANGE;
use hyper::header::SERVER;
use hyper::header::TE;
use hyper::header::TRAILER;
use hyper::header::TRANSFER_ENCODING;
use hyper::header::UPGRADE;

const PROXY_CONNECTION: HeaderName = HeaderName::from_static("proxy-connection");
const KEEP_ALIVE: HeaderName = HeaderName::from_static("keep-alive");

/// Hop-by-hop headers, dropped when forwarding a client request upstream.
/// `Range` is in the set although it is end-to-end: a stripped range makes
/// upstream answer 200 with the full body, which is what the cache tee needs.
const HOP_HEADERS: [HeaderName; 10] = [
    CONNECTION,
    PROXY_CONNECTION,
    KEEP_ALIVE,
    PROXY_AUTHENTICATE,
    PROXY_AUTHORIZATION,
    TE,
    TRAILER,
    TRANSFER_ENCODING,
    UPGRADE,
    RANGE,
];

#[must_use]
pub(crate) fn is_hop_header(name: &HeaderName) -> bool {
    /* HeaderName is stored lowercased, so equality is case-insensitive */
    HOP_HEADERS.contains(name)
}

/// Copies client request headers onto an upstream request, dropping the
/// hop-by-hop set. `Host` is dropped as well; the outbound client derives it
/// from the composed upstream URL.
pub(crate) fn copy_request_headers(src: &HeaderMap, dst: &mut HeaderMap) {
    for (name, value) in src {
        if is_hop_header(name) || *name == HOST {
            continue;
        }
        dst.append(name.clone(), value.clone());
    }
}

/// Prepares upstream response headers for the client: the proxy does not
/// guarantee range support on its served objects and identifies itself.
pub(crate) fn scrub_response_headers(headers: &mut HeaderMap) {
    headers.remove(ACCEPT_RANGES);
    headers.insert(SERVER, HeaderValue::from_static(crate::APP_NAME));
}
