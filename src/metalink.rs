use serde::Deserialize;
use serde::Serialize;

use crate::error::RemirrorError;

/// Metalink v3 document (`http://www.metalinker.org/`), modeled only as deep
/// as the rewrite needs. Unknown elements are dropped on re-serialization;
/// the fields below cover what mirrormanager emits.
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename = "metalink")]
pub(crate) struct Metalink {
    #[serde(rename = "@version")]
    version: String,

    #[serde(rename = "@xmlns")]
    xmlns: String,

    #[serde(rename = "@type", skip_serializing_if = "Option::is_none")]
    kind: Option<String>,

    #[serde(rename = "@pubdate", skip_serializing_if = "Option::is_none")]
    pubdate: Option<String>,

    #[serde(rename = "@generator", skip_serializing_if = "Option::is_none")]
    generator: Option<String>,

    #[serde(rename = "@xmlns:mm0", skip_serializing_if = "Option::is_none")]
    xmlns_mm0: Option<String>,

    files: Files,
}

#[derive(Debug, Deserialize, Serialize)]
struct Files {
    #[serde(rename = "file", default)]
    file: Vec<MetaFile>,
}

#[derive(Debug, Deserialize, Serialize)]
struct MetaFile {
    #[serde(rename = "@name")]
    name: String,

    #[serde(rename = "mm0:timestamp", skip_serializing_if = "Option::is_none")]
    timestamp: Option<Timestamp>,

    #[serde(skip_serializing_if = "Option::is_none")]
    size: Option<Size>,

    #[serde(skip_serializing_if = "Option::is_none")]
    verification: Option<Verification>,

    #[serde(rename = "resources", default)]
    resources: Vec<Resources>,
}

#[derive(Debug, Deserialize, Serialize)]
struct Timestamp {
    #[serde(rename = "$text")]
    value: String,
}

#[derive(Debug, Deserialize, Serialize)]
struct Size {
    #[serde(rename = "$text")]
    value: String,
}

#[derive(Debug, Deserialize, Serialize)]
struct Verification {
    #[serde(rename = "hash", default)]
    hash: Vec<Hash>,
}

#[derive(Debug, Deserialize, Serialize)]
struct Hash {
    #[serde(rename = "@type")]
    kind: String,

    #[serde(rename = "$text")]
    value: String,
}

#[derive(Debug, Deserialize, Serialize)]
struct Resources {
    #[serde(rename = "@maxconnections", skip_serializing_if = "Option::is_none")]
    maxconnections: Option<String>,

    #[serde(rename = "url", default)]
    url: Vec<UrlEntry>,
}

#[derive(Debug, Deserialize, Serialize)]
struct UrlEntry {
    #[serde(rename = "@type", skip_serializing_if = "Option::is_none")]
    kind: Option<String>,

    #[serde(rename = "@protocol", skip_serializing_if = "Option::is_none")]
    protocol: Option<String>,

    #[serde(rename = "@location", skip_serializing_if = "Option::is_none")]
    location: Option<String>,

    #[serde(rename = "@preference", skip_serializing_if = "Option::is_none")]
    preference: Option<String>,

    #[serde(rename = "$text")]
    link: String,
}

/// Rewrites a metalink document so `mirror_url` becomes the preferred
/// mirror: every existing `<url>` preference is decremented by one (floor
/// of 1), then one entry with preference 100 is appended per `<resources>`.
pub(crate) fn rewrite(input: &str, mirror_url: &str) -> Result<String, RemirrorError> {
    /* line breaks would survive as literal whitespace inside re-indented
     * elements, so flatten them before parsing */
    let flattened: String = input
        .chars()
        .map(|c| if c == '\r' || c == '\n' { ' ' } else { c })
        .collect();

    let mut metalink: Metalink = quick_xml::de::from_str(&flattened)?;

    for file in &mut metalink.files.file {
        for resources in &mut file.resources {
            for url in &mut resources.url {
                if let Some(preference) = &mut url.preference {
                    let value: i64 = preference.trim().parse().map_err(|_| {
                        RemirrorError::Metalink(format!("invalid preference `{preference}`"))
                    })?;

                    if value > 1 {
                        *preference = (value - 1).to_string();
                    }
                }
            }

            resources.url.push(UrlEntry {
                kind: Some(String::from("http")),
                protocol: Some(String::from("http")),
                location: Some(String::from("US")),
                preference: Some(String::from("100")),
                link: String::from(mirror_url),
            });
        }
    }

    let mut output = String::new();
    let mut serializer = quick_xml::se::Serializer::new(&mut output);
    serializer.indent(' ', 2);
    metalink.serialize(serializer)?;

    Ok(output)
}

#[cfg(test)]
mod test {
    use super::*;

    const INPUT: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<metalink version="3.0" xmlns="http://www.metalinker.org/" type="dynamic"
 pubdate="Mon, 01 Jan 2024 00:00:00 GMT" generator="mirrormanager"
 xmlns:mm0="http://fedorahosted.org/mirrormanager">
  <files>
    <file name="repomd.xml">
      <mm0:timestamp>1700000000</mm0:timestamp>
      <size>3160</size>
      <verification>
        <hash type="sha256">52e1e00bd7e452300b2d561a1a46eeb418cba6fc69e4c4820929f9d60f2ee3c3</hash>
      </verification>
      <resources maxconnections="1">
        <url protocol="https" type="https" location="US" preference="100">https://mirror-a.example.org/epel/7/x86_64/repodata/repomd.xml</url>
        <url protocol="http" type="http" location="DE" preference="50">http://mirror-b.example.org/epel/7/x86_64/repodata/repomd.xml</url>
        <url protocol="http" type="http" location="JP" preference="10">http://mirror-c.example.org/epel/7/x86_64/repodata/repomd.xml</url>
      </resources>
    </file>
  </files>
</metalink>
"#;

    #[test]
    fn test_rewrite_injects_local_mirror() {
        let local = "http://cache.lan/fedora-epel/7/x86_64/repodata/repomd.xml";
        let output = rewrite(INPUT, local).unwrap();

        let reparsed: Metalink = quick_xml::de::from_str(&output).unwrap();
        assert_eq!(reparsed.version, "3.0");
        assert_eq!(reparsed.xmlns, "http://www.metalinker.org/");

        let urls = &reparsed.files.file[0].resources[0].url;
        assert_eq!(urls.len(), 4);

        let preferences: Vec<&str> = urls
            .iter()
            .map(|u| u.preference.as_deref().unwrap())
            .collect();
        assert_eq!(preferences, ["99", "49", "9", "100"]);

        let added = urls.last().unwrap();
        assert_eq!(added.link, local);
        assert_eq!(added.kind.as_deref(), Some("http"));
        assert_eq!(added.protocol.as_deref(), Some("http"));
        assert_eq!(added.location.as_deref(), Some("US"));
    }

    #[test]
    fn test_rewrite_preserves_verification() {
        let output = rewrite(INPUT, "http://cache.lan/repomd.xml").unwrap();

        let reparsed: Metalink = quick_xml::de::from_str(&output).unwrap();
        let verification = reparsed.files.file[0].verification.as_ref().unwrap();
        assert_eq!(verification.hash[0].kind, "sha256");
        assert!(verification.hash[0].value.starts_with("52e1e00b"));

        assert_eq!(reparsed.files.file[0].size.as_ref().unwrap().value, "3160");
    }

    #[test]
    fn test_rewrite_is_indented() {
        let output = rewrite(INPUT, "http://cache.lan/repomd.xml").unwrap();

        assert!(output.contains("\n  <files>"));
        assert!(output.contains("\n    <file"));
    }

    #[test]
    fn test_preference_floor() {
        let input = r#"<metalink version="3.0" xmlns="http://www.metalinker.org/">
  <files>
    <file name="repomd.xml">
      <resources>
        <url preference="1">http://a.example.org/x</url>
        <url preference="2">http://b.example.org/x</url>
      </resources>
    </file>
  </files>
</metalink>"#;

        let output = rewrite(input, "http://cache.lan/x").unwrap();
        let reparsed: Metalink = quick_xml::de::from_str(&output).unwrap();

        let urls = &reparsed.files.file[0].resources[0].url;
        assert_eq!(urls[0].preference.as_deref(), Some("1"));
        assert_eq!(urls[1].preference.as_deref(), Some("1"));
    }

    #[test]
    fn test_bad_preference() {
        let input = r#"<metalink version="3.0" xmlns="http://www.metalinker.org/">
  <files>
    <file name="repomd.xml">
      <resources>
        <url preference="soon">http://a.example.org/x</url>
      </resources>
    </file>
  </files>
</metalink>"#;

        assert!(matches!(
            rewrite(input, "http://cache.lan/x"),
            Err(RemirrorError::Metalink(_))
        ));
    }
}
