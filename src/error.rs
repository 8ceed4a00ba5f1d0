#[derive(Debug)]
#[non_exhaustive]
pub(crate) enum RemirrorError {
    Io(std::io::Error),
    Hyper(hyper::Error),
    Client(hyper_util::client::legacy::Error),
    Http(hyper::http::Error),
    Xml(quick_xml::DeError),
    XmlWrite(quick_xml::SeError),
    Utf8(std::string::FromUtf8Error),
    /// A metalink document that parsed but cannot be rewritten.
    Metalink(String),
    /// Upstream advertised a Content-Length the body did not honor.
    LengthMismatch { expected: u64, received: u64 },
}

impl std::fmt::Display for RemirrorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => e.fmt(f),
            Self::Hyper(e) => e.fmt(f),
            Self::Client(e) => e.fmt(f),
            Self::Http(e) => e.fmt(f),
            Self::Xml(e) => e.fmt(f),
            Self::XmlWrite(e) => e.fmt(f),
            Self::Utf8(e) => e.fmt(f),
            Self::Metalink(msg) => write!(f, "Invalid metalink document: {msg}"),
            Self::LengthMismatch { expected, received } => {
                write!(
                    f,
                    "Upstream body of {received} bytes differs from announced content length {expected}"
                )
            }
        }
    }
}

impl std::error::Error for RemirrorError {}

impl From<std::io::Error> for RemirrorError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<hyper::Error> for RemirrorError {
    fn from(value: hyper::Error) -> Self {
        Self::Hyper(value)
    }
}

impl From<hyper_util::client::legacy::Error> for RemirrorError {
    fn from(value: hyper_util::client::legacy::Error) -> Self {
        Self::Client(value)
    }
}

impl From<hyper::http::Error> for RemirrorError {
    fn from(value: hyper::http::Error) -> Self {
        Self::Http(value)
    }
}

impl From<quick_xml::DeError> for RemirrorError {
    fn from(value: quick_xml::DeError) -> Self {
        Self::Xml(value)
    }
}

impl From<quick_xml::SeError> for RemirrorError {
    fn from(value: quick_xml::SeError) -> Self {
        Self::XmlWrite(value)
    }
}

impl From<std::string::FromUtf8Error> for RemirrorError {
    fn from(value: std::string::FromUtf8Error) -> Self {
        Self::Utf8(value)
    }
}
