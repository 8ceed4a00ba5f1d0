use hyper::Uri;

use crate::config::MirrorRule;
use crate::error::RemirrorError;

/// Suffixes of durable artifacts admitted by the default policy.
const ARCHIVE_SUFFIXES: [&str; 10] = [
    ".xz", ".gz", ".bz2", ".zip", ".tgz", ".rpm", "-rpm.bin", ".deb", ".jar", ".xz.sig",
];

/// Volatile distribution indexes that change in place and must always be
/// revalidated against upstream.
const INDEX_SUFFIXES: [&str; 6] = [
    "/Packages.gz",
    "/Sources.gz",
    ".abs.tar.gz",
    ".db.tar.gz",
    ".files.tar.gz",
    ".links.tar.gz",
];

/// Decides whether the bytes behind `path` are a durable cacheable artifact.
///
/// A rule with a custom match list overrides the default policy entirely:
/// the first entry whose prefix and suffix both match decides, no match
/// rejects.
#[must_use]
pub(crate) fn cacheable(rule: &MirrorRule, path: &str) -> bool {
    if !rule.matches.is_empty() {
        return rule
            .matches
            .iter()
            .find(|m| path.starts_with(&m.prefix) && path.ends_with(&m.suffix))
            .is_some_and(|m| !m.skip);
    }

    if INDEX_SUFFIXES.iter().any(|s| path.ends_with(s)) {
        return false;
    }

    if path.starts_with("/archlinux/") {
        return path.ends_with(".pkg.tar.xz") || path.ends_with(".pkg.tar.xz.sig");
    }

    ARCHIVE_SUFFIXES.iter().any(|s| path.ends_with(s))
}

/// Lexically normalizes an absolute URL path: collapses repeated slashes,
/// resolves `.` and `..`, never escapes the root. The result always starts
/// with `/` and carries no trailing slash (except the root itself).
#[must_use]
pub(crate) fn clean_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => (),
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }

    if segments.is_empty() {
        return String::from("/");
    }

    let mut cleaned = String::with_capacity(path.len());
    for segment in segments {
        cleaned.push('/');
        cleaned.push_str(segment);
    }

    cleaned
}

/// Returns the first configured rule whose prefix matches the request path,
/// together with its position (the transport layer keys clients by it).
#[must_use]
pub(crate) fn find_rule<'a>(
    mirrors: &'a [MirrorRule],
    path: &str,
) -> Option<(usize, &'a MirrorRule)> {
    mirrors
        .iter()
        .enumerate()
        .find(|(_, rule)| path.starts_with(&rule.prefix))
}

/// Composes the concrete upstream URL for a request.
///
/// An upstream base with an empty path receives the cleaned request path
/// unchanged; a base with a path has the rule prefix stripped from the
/// request and the remainder appended. `+` is percent-encoded so mirrors
/// behind strict decoders do not mistake it for a space.
pub(crate) fn compose_upstream_url(
    rule: &MirrorRule,
    base: &Uri,
    request_path: &str,
    query: Option<&str>,
) -> Result<Uri, RemirrorError> {
    let base_path = base.path();

    let path = if base_path.is_empty() || base_path == "/" {
        clean_path(request_path)
    } else {
        let remainder = request_path
            .strip_prefix(rule.prefix.as_str())
            .unwrap_or(request_path);
        clean_path(&format!("{base_path}/{remainder}"))
    };

    let mut path_and_query = path.replace('+', "%2B");
    if let Some(q) = query {
        path_and_query.push('?');
        path_and_query.push_str(q);
    }

    let mut builder = Uri::builder().path_and_query(path_and_query);
    if let Some(scheme) = base.scheme() {
        builder = builder.scheme(scheme.clone());
    }
    if let Some(authority) = base.authority() {
        builder = builder.authority(authority.clone());
    }

    builder.build().map_err(RemirrorError::Http)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::Config;

    fn rule(toml: &str) -> MirrorRule {
        let mut config = Config::parse(toml).unwrap();
        config.mirrors.remove(0)
    }

    fn arch_rule() -> MirrorRule {
        rule(
            r#"
[[mirrors]]
prefix = "/archlinux/"
upstream = "https://mirrors.kernel.org"
"#,
        )
    }

    #[test]
    fn test_default_policy_archives() {
        let r = rule(
            r#"
[[mirrors]]
prefix = "/centos/"
upstream = "https://mirrors.xmission.com"
"#,
        );

        assert!(cacheable(&r, "/centos/7/os/x86_64/Packages/zlib.rpm"));
        assert!(cacheable(&r, "/fedora/updates/foo.xz"));
        assert!(cacheable(&r, "/debian/pool/main/b/bash/bash_5.2_amd64.deb"));
        assert!(cacheable(&r, "/maven/org/foo/foo-1.0.jar"));
        assert!(cacheable(&r, "/google/chrome-rpm.bin"));
        assert!(cacheable(&r, "/fedora/repodata/primary.xml.gz"));

        assert!(!cacheable(&r, "/centos/7/os/x86_64/repodata/repomd.xml"));
        assert!(!cacheable(&r, "/debian/dists/sid/main/binary-amd64/Packages.gz"));
        assert!(!cacheable(&r, "/debian/dists/sid/main/source/Sources.gz"));
        assert!(!cacheable(&r, "/archive/core.db.tar.gz"));
        assert!(!cacheable(&r, "/archive/core.files.tar.gz"));
        assert!(!cacheable(&r, "/archive/core.links.tar.gz"));
        assert!(!cacheable(&r, "/archive/core.abs.tar.gz"));
    }

    #[test]
    fn test_default_policy_archlinux() {
        let r = arch_rule();

        assert!(cacheable(&r, "/archlinux/extra/os/x86_64/vim.pkg.tar.xz"));
        assert!(cacheable(&r, "/archlinux/extra/os/x86_64/vim.pkg.tar.xz.sig"));

        /* plain .xz would be cacheable anywhere else */
        assert!(!cacheable(&r, "/archlinux/iso/arch.tar.xz"));
        assert!(!cacheable(&r, "/archlinux/extra/os/x86_64/extra.db.tar.gz"));
        assert!(!cacheable(&r, "/archlinux/lastupdate"));
    }

    #[test]
    fn test_custom_matches() {
        let r = rule(
            r#"
[[mirrors]]
prefix = "/debian/"
upstream = "https://deb.debian.org"

[[mirrors.matches]]
prefix = "/debian/pool/"
suffix = ".deb"

[[mirrors.matches]]
prefix = "/debian/pool/"
suffix = ""
skip = true
"#,
        );

        assert!(cacheable(&r, "/debian/pool/main/b/bash/bash.deb"));
        /* first-match wins: the catch-all skip covers the rest of pool */
        assert!(!cacheable(&r, "/debian/pool/main/b/bash/bash.dsc"));
        /* custom list replaces the default policy: no match means reject */
        assert!(!cacheable(&r, "/debian/other/file.rpm"));
    }

    #[test]
    fn test_clean_path() {
        assert_eq!(clean_path("/"), "/");
        assert_eq!(clean_path(""), "/");
        assert_eq!(clean_path("/a/b/c"), "/a/b/c");
        assert_eq!(clean_path("/a//b///c"), "/a/b/c");
        assert_eq!(clean_path("/a/./b/."), "/a/b");
        assert_eq!(clean_path("/a/b/../c"), "/a/c");
        assert_eq!(clean_path("/../../a"), "/a");
        assert_eq!(clean_path("/a/b/"), "/a/b");
        assert_eq!(clean_path("a/b"), "/a/b");
    }

    #[test]
    fn test_find_rule_order() {
        let config = Config::parse(
            r#"
[[mirrors]]
prefix = "/fedora-epel/"
upstream = "https://mirrors.xmission.com"

[[mirrors]]
prefix = "/fedora/"
upstream = "https://mirrors.kernel.org"
"#,
        )
        .unwrap();

        let (idx, r) = find_rule(&config.mirrors, "/fedora-epel/7/x86_64/foo.rpm").unwrap();
        assert_eq!(idx, 0);
        assert_eq!(r.prefix, "/fedora-epel/");

        let (idx, r) = find_rule(&config.mirrors, "/fedora/39/x86_64/foo.rpm").unwrap();
        assert_eq!(idx, 1);
        assert_eq!(r.prefix, "/fedora/");

        assert!(find_rule(&config.mirrors, "/centos/7/os/foo.rpm").is_none());
    }

    #[test]
    fn test_compose_with_empty_base_path() {
        let r = arch_rule();
        let base = &r.upstream_uris[0];

        let url =
            compose_upstream_url(&r, base, "/archlinux/extra/os/x86_64/vim.pkg.tar.xz", None)
                .unwrap();

        assert_eq!(
            url.to_string(),
            "https://mirrors.kernel.org/archlinux/extra/os/x86_64/vim.pkg.tar.xz"
        );
    }

    #[test]
    fn test_compose_with_base_path_strips_prefix() {
        let r = rule(
            r#"
[[mirrors]]
prefix = "/debian/"
upstream = "https://ftp.de.debian.org/debian-mirror/"
"#,
        );
        let base = &r.upstream_uris[0];

        let url = compose_upstream_url(&r, base, "/debian/pool/main/b/bash.deb", None).unwrap();

        assert_eq!(
            url.to_string(),
            "https://ftp.de.debian.org/debian-mirror/pool/main/b/bash.deb"
        );
    }

    #[test]
    fn test_compose_escapes_plus() {
        let r = arch_rule();
        let base = &r.upstream_uris[0];

        let url = compose_upstream_url(
            &r,
            base,
            "/archlinux/extra/os/x86_64/vim-9.0+git-1.pkg.tar.xz",
            None,
        )
        .unwrap();

        assert_eq!(
            url.path(),
            "/archlinux/extra/os/x86_64/vim-9.0%2Bgit-1.pkg.tar.xz"
        );
    }

    #[test]
    fn test_compose_keeps_query() {
        let r = arch_rule();
        let base = &r.upstream_uris[0];

        let url = compose_upstream_url(&r, base, "/archlinux/lastsync", Some("ts=1")).unwrap();

        assert_eq!(
            url.to_string(),
            "https://mirrors.kernel.org/archlinux/lastsync?ts=1"
        );
    }
}
