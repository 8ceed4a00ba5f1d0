use std::time::Duration;

use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use hyper::Uri;
use hyper_tls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use tower_service::Service;

use crate::config::Config;
use crate::error::RemirrorError;

pub(crate) type Client = hyper_util::client::legacy::Client<
    hyper_timeout::TimeoutConnector<ProxiedConnector<HttpsConnector<HttpConnector>>>,
    BoxBody<Bytes, RemirrorError>,
>;

/// Connector that optionally dials every connection through a forward
/// proxy instead of the request's own authority. Requests keep their
/// absolute-form target, which is exactly what an HTTP proxy expects.
#[derive(Clone, Debug)]
pub(crate) struct ProxiedConnector<C> {
    inner: C,
    proxy: Option<Uri>,
}

impl<C> Service<Uri> for ProxiedConnector<C>
where
    C: Service<Uri>,
{
    type Response = C::Response;
    type Error = C::Error;
    type Future = C::Future;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, dst: Uri) -> Self::Future {
        match self.proxy.clone() {
            Some(proxy) => self.inner.call(proxy),
            None => self.inner.call(dst),
        }
    }
}

/// Long-lived outbound clients: one shared default client plus one client
/// per mirror rule that configures a forward proxy. Connection pools live
/// for the process lifetime.
pub(crate) struct Transports {
    default_client: Client,
    per_rule: Vec<Option<Client>>,
}

impl Transports {
    #[must_use]
    pub(crate) fn new(config: &Config) -> Self {
        let per_rule = config
            .mirrors
            .iter()
            .map(|rule| {
                rule.proxy_uri
                    .clone()
                    .map(|proxy| build_client(Some(proxy), config.http_timeout))
            })
            .collect();

        Self {
            default_client: build_client(None, config.http_timeout),
            per_rule,
        }
    }

    #[must_use]
    pub(crate) fn for_rule(&self, rule_index: usize) -> &Client {
        self.per_rule
            .get(rule_index)
            .and_then(Option::as_ref)
            .unwrap_or(&self.default_client)
    }

    #[must_use]
    pub(crate) fn default_client(&self) -> &Client {
        &self.default_client
    }
}

fn build_client(proxy: Option<Uri>, timeout: Duration) -> Client {
    let connector = ProxiedConnector {
        inner: HttpsConnector::new(),
        proxy,
    };

    let timeout = (!timeout.is_zero()).then_some(timeout);
    let mut timeout_connector = hyper_timeout::TimeoutConnector::new(connector);
    timeout_connector.set_connect_timeout(timeout);
    timeout_connector.set_read_timeout(timeout);
    timeout_connector.set_write_timeout(timeout);

    hyper_util::client::legacy::Client::builder(TokioExecutor::new()).build(timeout_connector)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Arc;
    use std::sync::Mutex;

    #[derive(Clone)]
    struct Recorder(Arc<Mutex<Vec<Uri>>>);

    impl Service<Uri> for Recorder {
        type Response = ();
        type Error = std::convert::Infallible;
        type Future = std::future::Ready<Result<(), Self::Error>>;

        fn poll_ready(
            &mut self,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<Result<(), Self::Error>> {
            std::task::Poll::Ready(Ok(()))
        }

        fn call(&mut self, dst: Uri) -> Self::Future {
            self.0.lock().unwrap().push(dst);
            std::future::ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_direct_connector_keeps_destination() {
        let dialed = Arc::new(Mutex::new(Vec::new()));
        let mut connector = ProxiedConnector {
            inner: Recorder(dialed.clone()),
            proxy: None,
        };

        let dst: Uri = "https://mirrors.kernel.org/archlinux/".parse().unwrap();
        connector.call(dst.clone()).await.unwrap();

        assert_eq!(*dialed.lock().unwrap(), vec![dst]);
    }

    #[tokio::test]
    async fn test_proxied_connector_dials_proxy() {
        let dialed = Arc::new(Mutex::new(Vec::new()));
        let proxy: Uri = "http://proxy.internal:3128".parse().unwrap();
        let mut connector = ProxiedConnector {
            inner: Recorder(dialed.clone()),
            proxy: Some(proxy.clone()),
        };

        connector
            .call("http://mirrors.kernel.org/archlinux/".parse().unwrap())
            .await
            .unwrap();
        connector
            .call("http://mirrors.xmission.com/centos/".parse().unwrap())
            .await
            .unwrap();

        assert_eq!(*dialed.lock().unwrap(), vec![proxy.clone(), proxy]);
    }
}
