use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context as _;
use anyhow::anyhow;
use anyhow::bail;
use hyper::Uri;
use serde::Deserialize;
use serde::Deserializer;

pub(crate) const DEFAULT_LISTEN: &str = ":80";
pub(crate) const DEFAULT_DATA_DIR: &str = "/var/remirror";
pub(crate) const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);
pub(crate) const DEFAULT_CENTOS_RELEASE: &str = "7.2.1511";

pub(crate) const CONFIG_FILE_NAME: &str = "remirror.toml";

/// A `(prefix, suffix, skip)` triple overriding the default cacheability
/// policy of the rule that carries it. The first entry whose prefix and
/// suffix both match decides.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct MatchRule {
    #[serde(default)]
    pub(crate) prefix: String,
    #[serde(default)]
    pub(crate) suffix: String,
    #[serde(default)]
    pub(crate) skip: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct MirrorRule {
    /// URL-path prefix this rule claims. Rules are evaluated in file order,
    /// first matching prefix wins.
    pub(crate) prefix: String,

    /// Single upstream base URL. Tried before any `upstreams` entries.
    pub(crate) upstream: Option<String>,

    /// Further upstream base URLs, tried in order on 404/500/503.
    #[serde(default)]
    pub(crate) upstreams: Vec<String>,

    /// Local directory served directly. Mutually exclusive with upstreams.
    pub(crate) local: Option<PathBuf>,

    /// Cacheability overrides for this rule.
    #[serde(default)]
    pub(crate) matches: Vec<MatchRule>,

    /// Forward proxy for outbound requests of this rule.
    pub(crate) proxy: Option<String>,

    #[serde(skip)]
    pub(crate) upstream_uris: Vec<Uri>,

    #[serde(skip)]
    pub(crate) proxy_uri: Option<Uri>,
}

impl MirrorRule {
    fn validate(&mut self) -> anyhow::Result<()> {
        if !self.prefix.starts_with('/') {
            bail!(
                "Invalid mirror prefix `{}`: must start with `/`",
                self.prefix
            );
        }

        let upstream_count = usize::from(self.upstream.is_some()) + self.upstreams.len();

        if self.local.is_some() && upstream_count != 0 {
            bail!(
                "Mirror rule `{}` has both `local` and upstream(s)",
                self.prefix
            );
        }
        if self.local.is_none() && upstream_count == 0 {
            bail!(
                "Mirror rule `{}` has neither `local` nor upstream(s)",
                self.prefix
            );
        }

        self.upstream_uris = self
            .upstream
            .iter()
            .chain(self.upstreams.iter())
            .map(|base| parse_base_url(base))
            .collect::<anyhow::Result<_>>()
            .with_context(|| format!("Invalid upstream in mirror rule `{}`", self.prefix))?;

        self.proxy_uri = self
            .proxy
            .as_deref()
            .map(parse_base_url)
            .transpose()
            .with_context(|| format!("Invalid proxy in mirror rule `{}`", self.prefix))?;

        Ok(())
    }
}

fn parse_base_url(base: &str) -> anyhow::Result<Uri> {
    let uri: Uri = base
        .parse()
        .map_err(|err| anyhow!("Failed to parse URL `{base}`: {err}"))?;

    match uri.scheme_str() {
        Some("http" | "https") => (),
        Some(other) => bail!("Unsupported scheme `{other}` in URL `{base}`"),
        None => bail!("Missing scheme in URL `{base}`"),
    }

    if uri.authority().is_none() {
        bail!("Missing host in URL `{base}`");
    }

    Ok(uri)
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct Config {
    /// Address to listen on. A bare `:port` binds all addresses.
    #[serde(default = "default_listen", deserialize_with = "from_listen_addr")]
    pub(crate) listen: SocketAddr,

    /// Filesystem root for cached artifacts and temporary files.
    /// Must be a single filesystem so the tmp-to-final rename is atomic.
    #[serde(default = "default_data_dir")]
    pub(crate) data: PathBuf,

    /// Name this proxy is reachable as from clients. Mirror-discovery
    /// responses advertise URLs under this name, so it must resolve to the
    /// proxy and not to one of the intercepted mirror hosts.
    pub(crate) host: Option<String>,

    /// Timeout for outbound connect/read/write operations.
    #[serde(default = "default_http_timeout", deserialize_with = "from_secs_f32")]
    pub(crate) http_timeout: Duration,

    /// Point release advertised when a CentOS client asks for `release=7`.
    #[serde(default = "default_centos_release")]
    pub(crate) centos_release: String,

    #[serde(default)]
    pub(crate) mirrors: Vec<MirrorRule>,
}

fn from_listen_addr<'de, D>(deserializer: D) -> Result<SocketAddr, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error as _;
    let s: String = Deserialize::deserialize(deserializer)?;

    parse_listen_addr(&s).map_err(D::Error::custom)
}

fn parse_listen_addr(s: &str) -> anyhow::Result<SocketAddr> {
    let full;
    let addr = if s.starts_with(':') {
        full = format!("[::]{s}");
        full.as_str()
    } else {
        s
    };

    addr.parse()
        .map_err(|err| anyhow!("Invalid listen address `{s}`: {err}"))
}

fn from_secs_f32<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error as _;
    let s: f32 = Deserialize::deserialize(deserializer)?;

    Duration::try_from_secs_f32(s).map_err(D::Error::custom)
}

fn default_listen() -> SocketAddr {
    parse_listen_addr(DEFAULT_LISTEN).expect("default listen address is valid")
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(DEFAULT_DATA_DIR)
}

const fn default_http_timeout() -> Duration {
    DEFAULT_HTTP_TIMEOUT
}

fn default_centos_release() -> String {
    String::from(DEFAULT_CENTOS_RELEASE)
}

impl Config {
    pub(crate) fn parse(content: &str) -> anyhow::Result<Self> {
        let mut config: Self = toml::from_str(content).context("Failed to parse configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Loads the configuration from `path` if given, otherwise from the first
    /// of `./remirror.toml`, `$HOME/.remirror.toml`, `/etc/remirror.toml`.
    pub(crate) fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => search_paths()
                .into_iter()
                .find(|p| p.is_file())
                .ok_or_else(|| anyhow!("No configuration file `{CONFIG_FILE_NAME}` found"))?,
        };

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read file `{}`", path.display()))?;

        Self::parse(&content).with_context(|| format!("In file `{}`", path.display()))
    }

    fn validate(&mut self) -> anyhow::Result<()> {
        if self.http_timeout > Duration::from_secs(360) {
            bail!(
                "Invalid http_timeout value of {}: must be less or equal to 360s",
                self.http_timeout.as_secs_f32()
            );
        }

        for mirror in &mut self.mirrors {
            mirror.validate()?;
        }

        Ok(())
    }
}

fn search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(CONFIG_FILE_NAME)];

    if let Some(home) = std::env::var_os("HOME") {
        let mut hidden = PathBuf::from(home);
        hidden.push(format!(".{CONFIG_FILE_NAME}"));
        paths.push(hidden);
    }

    paths.push(["/etc", CONFIG_FILE_NAME].iter().collect());

    paths
}
