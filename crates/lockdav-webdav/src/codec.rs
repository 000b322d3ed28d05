//! Client text-encoding detection and request path conversion.
//!
//! Older WebDAV clients send path bytes in their platform's legacy encoding
//! rather than UTF-8. [`RequestCodec`] guesses the client encoding from a
//! handful of weighted signals and converts percent-decoded path bytes to
//! Rust strings before any path resolution happens. Responses always carry
//! percent-encoded UTF-8 hrefs.

use encoding_rs::{EUC_JP, Encoding, SHIFT_JIS, UTF_8};
use std::borrow::Cow;
use std::collections::BTreeMap;
use tracing::{trace, warn};

const UTF8: &str = "UTF-8";

/// Encoding names assumed for each client family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecConfig {
    pub default_client: String,
    pub windows_client: String,
    pub mac_client: String,
    pub unix_client: String,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            default_client: UTF8.to_string(),
            windows_client: "CP932".to_string(),
            mac_client: UTF8.to_string(),
            unix_client: "EUC-JP".to_string(),
        }
    }
}

/// Platform naming conventions for character encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Solaris,
    Aix,
    Other,
}

impl Platform {
    /// The platform this binary was built for.
    pub fn current() -> Self {
        if cfg!(any(target_os = "solaris", target_os = "illumos")) {
            Platform::Solaris
        } else if cfg!(target_os = "aix") {
            Platform::Aix
        } else {
            Platform::Other
        }
    }
}

/// Scored encoding guesser and path converter.
#[derive(Debug, Clone)]
pub struct RequestCodec {
    config: CodecConfig,
    platform: Platform,
}

impl Default for RequestCodec {
    fn default() -> Self {
        Self::new(CodecConfig::default())
    }
}

impl RequestCodec {
    pub fn new(config: CodecConfig) -> Self {
        Self {
            config,
            platform: Platform::current(),
        }
    }

    #[must_use]
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Per-candidate scores for a request.
    ///
    /// `raw` holds the percent-decoded bytes of the request path and, when
    /// present, the `Destination` path.
    pub fn scores(&self, user_agent: Option<&str>, raw: &[&[u8]]) -> BTreeMap<String, i32> {
        let mut scores = BTreeMap::new();
        let mut add = |name: &str, score: i32| {
            *scores.entry(name.to_string()).or_insert(0) += score;
        };

        add(&self.config.default_client, 20);

        if raw.iter().all(|bytes| std::str::from_utf8(bytes).is_ok()) {
            add(UTF8, 40);
        } else {
            add(UTF8, -500);
        }

        let ua = user_agent.unwrap_or("");
        if ua.contains("Microsoft Data Access Internet Publishing") {
            add(&self.config.windows_client, 70);
            add(UTF8, 30);
        } else if ua.starts_with("gnome-vfs") {
            add(UTF8, 90);
        } else if ua.starts_with("WebDAVFS") {
            add(&self.config.mac_client, 80);
        } else if ua.contains("Konqueror") {
            add(&self.config.unix_client, 60);
            add(UTF8, 40);
        }

        let lower = ua.to_ascii_lowercase();
        if lower.contains("microsoft") || lower.contains("windows") {
            add(&self.config.windows_client, 10);
        } else if lower.contains("unix") || lower.contains("x11") {
            add(&self.config.unix_client, 10);
        } else if ua.contains("darwin") || ua.contains("MacOSX") {
            add(UTF8, 20);
        }

        scores
    }

    /// Name of the winning encoding, before platform aliasing.
    ///
    /// Ties go to the lexicographically greatest name.
    pub fn guess(&self, user_agent: Option<&str>, raw: &[&[u8]]) -> String {
        let scores = self.scores(user_agent, raw);
        trace!(?scores, "codec scores");
        scores
            .into_iter()
            .max_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)))
            .map_or_else(|| UTF8.to_string(), |(name, _)| name)
    }

    /// Platform-specific name of an encoding.
    pub fn alias(&self, name: &str) -> String {
        let aliased = match (self.platform, name.to_ascii_uppercase().as_str()) {
            (Platform::Solaris, "CP932") => "MS932",
            (Platform::Solaris, "EUC-JP") => "eucJP",
            (Platform::Aix, "CP932") => "IBM-932",
            (Platform::Aix, "EUC-JP") => "IBM-eucJP",
            _ => name,
        };
        aliased.to_string()
    }

    /// Detect the encoding a request was sent in.
    pub fn detect(&self, user_agent: Option<&str>, raw: &[&[u8]]) -> &'static Encoding {
        let name = self.alias(&self.guess(user_agent, raw));
        resolve_label(&name)
    }

    /// Decode `raw` with `encoding`, keeping the lossy UTF-8 reading on failure.
    pub fn decode<'a>(&self, raw: &'a [u8], encoding: &'static Encoding) -> Cow<'a, str> {
        match encoding.decode_without_bom_handling_and_without_replacement(raw) {
            Some(text) => text,
            None => {
                warn!(
                    encoding = encoding.name(),
                    bytes = raw.len(),
                    "code conversion failed, keeping original bytes"
                );
                String::from_utf8_lossy(raw)
            }
        }
    }

    /// Turn a percent-encoded request path into a normalized resource path.
    pub fn resource_path(&self, encoded: &str, encoding: &'static Encoding) -> String {
        let raw = percent_decode(encoded);
        let decoded = self.decode(&raw, encoding);
        let path = normalize(&decoded);
        trace!(encoded = %encoded, path = %path, "resolved request path");
        path
    }
}

/// Percent-decode a URI path into raw bytes.
pub fn percent_decode(encoded: &str) -> Vec<u8> {
    urlencoding::decode_binary(encoded.as_bytes()).into_owned()
}

/// Map an encoding name, including platform aliases, to an `encoding_rs` encoding.
pub fn resolve_label(name: &str) -> &'static Encoding {
    if let Some(encoding) = Encoding::for_label(name.as_bytes()) {
        return encoding;
    }
    match name.to_ascii_uppercase().as_str() {
        "CP932" | "MS932" | "IBM-932" | "WINDOWS-31J" => SHIFT_JIS,
        "EUCJP" | "EUC-JP" | "IBM-EUCJP" => EUC_JP,
        _ => {
            warn!(encoding = %name, "unknown encoding, using UTF-8");
            UTF_8
        }
    }
}

/// Collapse slashes and dot segments; never escapes the root.
pub fn normalize(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", segments.join("/"))
    }
}

/// Percent-encoded href for a resource path. Collections end with `/`.
pub fn href(prefix: &str, path: &str, collection: bool) -> String {
    let mut out = prefix.trim_end_matches('/').to_string();
    for segment in lockdav_vfs::path::segments(path) {
        out.push('/');
        out.push_str(&urlencoding::encode(segment));
    }
    if collection || out.is_empty() {
        out.push('/');
    }
    out
}
