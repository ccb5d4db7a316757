//! Channels are the sources from which packages are downloaded. This module
//! turns the many ways users write them (bare names, urls, local paths,
//! multi-channel aliases) into a canonical [`Channel`] with per-platform
//! urls.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::{ParsePlatformError, Platform};

const DEFAULT_CHANNEL_ALIAS: &str = "https://conda.anaconda.org";

/// Configuration that is required to resolve a channel string to a url.
///
/// Users mostly refer to channels by name (`conda-forge`). The configuration
/// supplies the server those names live on, explicit overrides for individual
/// names, spelled-out multi-channels, and the migration tables that rewrite
/// urls of servers that moved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// The url that bare channel names are joined to. Defaults to
    /// `https://conda.anaconda.org`.
    pub channel_alias: Url,

    /// Explicit name → base-url overrides, consulted before the alias.
    #[serde(default)]
    pub custom_channels: HashMap<String, Url>,

    /// Names that expand to several other channels (e.g. `defaults`).
    #[serde(default)]
    pub custom_multichannels: HashMap<String, Vec<String>>,

    /// Aliases this installation migrated away from. A url that starts with
    /// one of these is rewritten to the current `channel_alias`, keeping the
    /// relative channel name.
    #[serde(default)]
    pub migrated_channel_aliases: Vec<Url>,

    /// Channel names whose location moved. Maps the name to the old base url;
    /// a url matching `<old base>/<name>` is rewritten to the current home of
    /// `<name>`.
    #[serde(default)]
    pub migrated_custom_channels: HashMap<String, Url>,

    /// The directory relative paths are resolved against.
    pub root_dir: PathBuf,
}

impl ChannelConfig {
    /// Creates a new `ChannelConfig` with default values and the given root
    /// directory.
    pub fn default_with_root_dir(root_dir: PathBuf) -> Self {
        Self {
            channel_alias: Url::from_str(DEFAULT_CHANNEL_ALIAS)
                .expect("could not parse default channel alias"),
            custom_channels: HashMap::new(),
            custom_multichannels: HashMap::new(),
            migrated_channel_aliases: Vec::new(),
            migrated_custom_channels: HashMap::new(),
            root_dir,
        }
    }

    /// Returns the canonical name for a channel with the given base url: the
    /// part relative to the alias when the url lives under it, the full url
    /// otherwise.
    pub fn canonical_name(&self, base_url: &Url) -> String {
        match base_url.as_str().strip_prefix(self.channel_alias.as_str()) {
            Some(stripped) => stripped.trim_matches('/').to_string(),
            None => base_url.as_str().trim_end_matches('/').to_string(),
        }
    }

    /// Resolves a user supplied channel string to one or more channels,
    /// expanding multi-channels.
    pub fn resolve(&self, value: &str) -> Result<Vec<Channel>, ParseChannelError> {
        if let Some(members) = self.custom_multichannels.get(value) {
            return members
                .iter()
                .map(|member| Channel::from_str(member, self))
                .collect();
        }
        Ok(vec![Channel::from_str(value, self)?])
    }
}

/// A channel name or a fully spelled out base url.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum NamedChannelOrUrl {
    /// A named channel, resolved through the [`ChannelConfig`].
    Name(String),
    /// An explicit base url.
    Url(Url),
}

impl Display for NamedChannelOrUrl {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            NamedChannelOrUrl::Name(name) => f.write_str(name),
            NamedChannelOrUrl::Url(url) => f.write_str(url.as_str().trim_end_matches('/')),
        }
    }
}

/// A canonicalized source of packages.
#[derive(Debug, Clone, Serialize, Eq, PartialEq, Hash)]
pub struct Channel {
    /// The platforms the user restricted this channel to, or `None` for the
    /// defaults.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platforms: Option<Vec<Platform>>,

    /// The base url of the channel. Per-platform urls are relative to this.
    /// Never contains an embedded `t/<token>/` segment.
    pub base_url: Url,

    /// The canonical name of the channel.
    pub name: Option<String>,

    /// An access token recognized in the url (`/t/<token>/`), if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Channel {
    /// Parses a [`Channel`] from a string and a channel configuration.
    ///
    /// Normalization applies the following rules in order: an explicit url is
    /// taken as-is (after running the migration tables), a filesystem path is
    /// converted to a `file://` url, a name in `custom_channels` resolves to
    /// its configured base, and any other name is joined to the
    /// `channel_alias`.
    pub fn from_str(
        value: impl AsRef<str>,
        config: &ChannelConfig,
    ) -> Result<Self, ParseChannelError> {
        let value = value.as_ref();
        let (platforms, value) = parse_platforms(value)?;

        let channel = if parse_scheme(value).is_some() {
            let url = Url::parse(value)?;
            Channel {
                platforms,
                ..Channel::from_url(migrate_url(url, config), config)
            }
        } else if is_path(value) {
            let path = absolute_path(value, &config.root_dir);
            let url = Url::from_directory_path(&path)
                .map_err(|()| ParseChannelError::InvalidPath(value.to_owned()))?;
            Channel {
                platforms,
                base_url: url,
                name: Some(value.to_owned()),
                token: None,
            }
        } else {
            Channel {
                platforms,
                ..Channel::from_name(value, config)
            }
        };

        Ok(channel)
    }

    /// Constructs a new [`Channel`] from a base url. The `t/<token>/` segment
    /// is recognized anywhere in the path and moved out of the url.
    pub fn from_url(url: Url, config: &ChannelConfig) -> Self {
        let (url, token) = extract_token(url);

        // The base url always ends in a `/` so joins behave like directories.
        let path = url.path().trim_end_matches('/').to_owned();
        let mut base_url = url.clone();
        base_url.set_path(&format!("{path}/"));

        let name = if base_url.scheme() == "http" || base_url.scheme() == "https" {
            Some(config.canonical_name(&base_url))
        } else {
            let name = path.rsplit_once('/').map_or(path.as_str(), |(_, n)| n);
            (!name.is_empty()).then(|| name.to_owned())
        };

        Self {
            platforms: None,
            base_url,
            name,
            token,
        }
    }

    /// Constructs a channel from a bare name and the configuration.
    pub fn from_name(name: &str, config: &ChannelConfig) -> Self {
        let trimmed = name.trim_end_matches('/');

        // `custom_channels` keys match the first path component of the name.
        let head = trimmed.split('/').next().unwrap_or(trimmed);
        if let Some(base) = config.custom_channels.get(head) {
            let (base, token) = extract_token(base.clone());
            let mut url = add_trailing_slash(&base);
            if let Some(rest) = trimmed.strip_prefix(head) {
                let rest = rest.trim_start_matches('/');
                if !rest.is_empty() {
                    url = url.join(&format!("{rest}/")).expect("name is a valid url part");
                }
            }
            return Self {
                platforms: None,
                base_url: url,
                name: Some(trimmed.to_owned()),
                token,
            };
        }

        let dir_name: Cow<'_, str> = if name.ends_with('/') {
            Cow::Borrowed(name)
        } else {
            Cow::Owned(format!("{name}/"))
        };

        Self {
            platforms: None,
            base_url: config
                .channel_alias
                .join(dir_name.as_ref())
                .expect("name is not a valid url"),
            name: (!trimmed.is_empty()).then(|| trimmed.to_owned()),
            token: None,
        }
    }

    /// Constructs a channel from a local directory.
    pub fn from_directory(path: &Path) -> Self {
        let url = Url::from_directory_path(path).expect("path is not absolute");
        Self {
            platforms: None,
            base_url: url,
            name: None,
            token: None,
        }
    }

    /// Returns the base url of the channel. This does not include the
    /// platform part.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Returns the name of the channel, falling back to its base url.
    pub fn name(&self) -> &str {
        match self.base_url.scheme() {
            "http" | "https" => self
                .name
                .as_deref()
                .unwrap_or_else(|| self.base_url.as_str()),
            _ => self.base_url.as_str(),
        }
    }

    /// Returns the canonical name of the channel, used to identify it in
    /// records.
    pub fn canonical_name(&self) -> String {
        self.base_url.to_string()
    }

    /// Returns the base url, optionally with auth and token restored.
    ///
    /// With `with_credentials` set to false any username/password and the
    /// `t/<token>/` segment are elided.
    pub fn base_url_with_credentials(&self, with_credentials: bool) -> Url {
        let mut url = self.base_url.clone();
        if !with_credentials {
            let _ = url.set_username("");
            let _ = url.set_password(None);
            return url;
        }
        if let Some(token) = &self.token {
            // The token always canonicalizes to the first path segment.
            let path = format!("t/{token}{}", url.path());
            url.set_path(&path);
        }
        url
    }

    /// Returns the url of a platform subdirectory of this channel.
    pub fn platform_url(&self, platform: Platform) -> Url {
        // The trailing slash marks the url as a directory.
        self.base_url
            .join(&format!("{}/", platform.as_str()))
            .expect("platform is a valid url fragment")
    }

    /// Returns urls for all platforms of this channel, always including
    /// `noarch`.
    pub fn platforms_url(&self) -> Vec<(Platform, Url)> {
        self.platforms_or_default()
            .iter()
            .map(|&platform| (platform, self.platform_url(platform)))
            .collect()
    }

    /// Returns the platforms explicitly set on the channel or the defaults
    /// for the current system.
    pub fn platforms_or_default(&self) -> &[Platform] {
        match &self.platforms {
            Some(platforms) => platforms.as_slice(),
            None => default_platforms(),
        }
    }
}

/// An error that can occur when parsing a channel.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum ParseChannelError {
    /// The platform restriction could not be parsed.
    #[error("could not parse the platforms")]
    ParsePlatformError(#[source] ParsePlatformError),

    /// The url could not be parsed.
    #[error("could not parse url")]
    ParseUrlError(#[source] url::ParseError),

    /// The path is not usable as a channel.
    #[error("invalid path '{0}'")]
    InvalidPath(String),
}

impl From<ParsePlatformError> for ParseChannelError {
    fn from(err: ParsePlatformError) -> Self {
        ParseChannelError::ParsePlatformError(err)
    }
}

impl From<url::ParseError> for ParseChannelError {
    fn from(err: url::ParseError) -> Self {
        ParseChannelError::ParseUrlError(err)
    }
}

/// Extracts an explicit platform restriction (`channel[linux-64, noarch]`)
/// from a channel string.
#[allow(clippy::type_complexity)]
fn parse_platforms(channel: &str) -> Result<(Option<Vec<Platform>>, &str), ParsePlatformError> {
    if channel.rfind(']').is_some() {
        if let Some(start_platform_idx) = channel.find('[') {
            let platform_part = &channel[start_platform_idx + 1..channel.len() - 1];
            let platforms: Vec<Platform> = platform_part
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(FromStr::from_str)
                .collect::<Result<_, _>>()?;
            let platforms = (!platforms.is_empty()).then_some(platforms);
            return Ok((platforms, &channel[0..start_platform_idx]));
        }
    }
    Ok((None, channel))
}

/// Rewrites a url through the migration tables of the configuration.
fn migrate_url(url: Url, config: &ChannelConfig) -> Url {
    // A url under a migrated alias moves to the current alias, keeping the
    // relative channel name.
    for migrated in &config.migrated_channel_aliases {
        if let Some(rest) = url.as_str().strip_prefix(migrated.as_str()) {
            if let Ok(rewritten) = config.channel_alias.join(rest.trim_start_matches('/')) {
                return rewritten;
            }
        }
    }

    // A url pointing at the old location of a migrated custom channel moves
    // to the channel's current home.
    for (name, old_base) in &config.migrated_custom_channels {
        let old_url = add_trailing_slash(old_base)
            .join(&format!("{name}/"))
            .ok();
        if old_url.as_ref().map(Url::as_str) == Some(add_trailing_slash(&url).as_str()) {
            if let Some(new_base) = config.custom_channels.get(name) {
                if let Ok(rewritten) = add_trailing_slash(new_base).join(&format!("{name}/")) {
                    return rewritten;
                }
            }
            if let Ok(rewritten) = config.channel_alias.join(&format!("{name}/")) {
                return rewritten;
            }
        }
    }

    url
}

/// Recognizes a `t/<token>/` segment anywhere in the url path, removes it,
/// and returns it separately.
fn extract_token(url: Url) -> (Url, Option<String>) {
    let segments: Vec<&str> = url.path().split('/').filter(|s| !s.is_empty()).collect();
    let Some(pos) = segments.iter().position(|&s| s == "t") else {
        return (url, None);
    };
    let Some(token) = segments.get(pos + 1).map(|s| (*s).to_owned()) else {
        return (url, None);
    };

    let mut remaining = segments.clone();
    remaining.drain(pos..=pos + 1);
    let mut stripped = url.clone();
    let path = format!("/{}", remaining.join("/"));
    stripped.set_path(&path);
    (stripped, Some(token))
}

fn add_trailing_slash(url: &Url) -> Url {
    let path = url.path();
    if path.ends_with('/') {
        url.clone()
    } else {
        let mut url = url.clone();
        url.set_path(&format!("{path}/"));
        url
    }
}

/// Returns true if the string looks like a filesystem path rather than a
/// channel name.
pub(crate) fn is_path(path: &str) -> bool {
    // Starts with ./, ../, ~/, /, X:/ or \\ (or their backslash variants).
    let path = path.replace('\\', "/");
    path.starts_with("./")
        || path.starts_with("../")
        || path.starts_with("~/")
        || path.starts_with('/')
        || (path.len() >= 3 && path.as_bytes()[1] == b':' && path.as_bytes()[2] == b'/')
        || path == "." || path == ".."
}

/// Returns the scheme of a url-like string, if it has one.
pub(crate) fn parse_scheme(value: &str) -> Option<&str> {
    let (scheme, _) = value.split_once("://")?;
    if scheme.is_empty() || scheme.len() > 11 {
        return None;
    }
    let mut chars = scheme.chars();
    let first = chars.next()?;
    if !first.is_ascii_alphabetic() {
        return None;
    }
    chars
        .all(|c| c.is_ascii_alphanumeric())
        .then_some(scheme)
}

fn absolute_path(path: &str, root_dir: &Path) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        return normalize_path(path);
    }
    normalize_path(&root_dir.join(path))
}

/// Lexically normalizes `.` and `..` components of a path.
fn normalize_path(path: &Path) -> PathBuf {
    use std::path::Component;
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                result.pop();
            }
            component => result.push(component.as_os_str()),
        }
    }
    result
}

/// Returns the default platforms: the current one plus `noarch`.
pub(crate) const fn default_platforms() -> &'static [Platform] {
    const CURRENT_PLATFORMS: [Platform; 2] = [Platform::current(), Platform::NoArch];
    &CURRENT_PLATFORMS
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use url::Url;

    fn config() -> ChannelConfig {
        ChannelConfig::default_with_root_dir(std::env::current_dir().unwrap())
    }

    #[test]
    fn parse_by_name() {
        let channel = Channel::from_str("conda-forge", &config()).unwrap();
        assert_eq!(
            channel.base_url,
            Url::from_str("https://conda.anaconda.org/conda-forge/").unwrap()
        );
        assert_eq!(channel.name.as_deref(), Some("conda-forge"));
        assert_eq!(channel.name(), "conda-forge");
        assert_eq!(channel.platforms, None);
    }

    #[test]
    fn parse_from_url() {
        let channel =
            Channel::from_str("https://conda.anaconda.org/conda-forge/", &config()).unwrap();
        assert_eq!(
            channel.base_url,
            Url::from_str("https://conda.anaconda.org/conda-forge/").unwrap()
        );
        assert_eq!(channel.name(), "conda-forge");
    }

    #[test]
    fn parse_url_only() {
        let channel = Channel::from_str("http://localhost:1234", &config()).unwrap();
        assert_eq!(
            channel.base_url,
            Url::from_str("http://localhost:1234/").unwrap()
        );
        let noarch_url = channel.platform_url(Platform::NoArch);
        assert_eq!(noarch_url.to_string(), "http://localhost:1234/noarch/");

        assert!(matches!(
            Channel::from_str("http://1000.0000.0001.294", &config()),
            Err(ParseChannelError::ParseUrlError(_))
        ));
    }

    #[test]
    fn parse_platform_restriction() {
        let channel = Channel::from_str(
            "https://conda.anaconda.org/conda-forge[linux-64, noarch]",
            &config(),
        )
        .unwrap();
        assert_eq!(
            channel.platforms,
            Some(vec![Platform::Linux64, Platform::NoArch])
        );
        assert_eq!(channel.name.as_deref(), Some("conda-forge"));

        assert!(matches!(
            Channel::from_str("conda-forge[notaplatform]", &config()),
            Err(ParseChannelError::ParsePlatformError(_))
        ));
    }

    #[test]
    fn parse_token() {
        let channel = Channel::from_str(
            "https://conda.anaconda.org/t/s3cr3t/conda-forge",
            &config(),
        )
        .unwrap();
        assert_eq!(channel.token.as_deref(), Some("s3cr3t"));
        assert_eq!(
            channel.base_url,
            Url::from_str("https://conda.anaconda.org/conda-forge/").unwrap()
        );
        assert_eq!(
            channel.base_url_with_credentials(true).as_str(),
            "https://conda.anaconda.org/t/s3cr3t/conda-forge/"
        );
        assert_eq!(
            channel.base_url_with_credentials(false).as_str(),
            "https://conda.anaconda.org/conda-forge/"
        );
    }

    #[test]
    fn custom_channels() {
        let mut config = config();
        config.custom_channels.insert(
            "internal".to_owned(),
            Url::from_str("https://packages.example.com/prod").unwrap(),
        );
        let channel = Channel::from_str("internal", &config).unwrap();
        assert_eq!(
            channel.base_url,
            Url::from_str("https://packages.example.com/prod/").unwrap()
        );
        assert_eq!(channel.name.as_deref(), Some("internal"));

        // A label below a custom channel stays relative to it.
        let channel = Channel::from_str("internal/label/dev", &config).unwrap();
        assert_eq!(
            channel.base_url,
            Url::from_str("https://packages.example.com/prod/label/dev/").unwrap()
        );
    }

    #[test]
    fn multichannels() {
        let mut config = config();
        config.custom_multichannels.insert(
            "defaults".to_owned(),
            vec!["main".to_owned(), "r".to_owned()],
        );
        let channels = config.resolve("defaults").unwrap();
        assert_eq!(channels.len(), 2);
        assert_eq!(channels[0].name.as_deref(), Some("main"));
        assert_eq!(channels[1].name.as_deref(), Some("r"));

        let channels = config.resolve("conda-forge").unwrap();
        assert_eq!(channels.len(), 1);
    }

    #[test]
    fn migrated_alias() {
        let mut config = config();
        config
            .migrated_channel_aliases
            .push(Url::from_str("https://repo.continuum.io/pkgs").unwrap());
        let channel = Channel::from_str("https://repo.continuum.io/pkgs/free", &config).unwrap();
        assert_eq!(
            channel.base_url,
            Url::from_str("https://conda.anaconda.org/free/").unwrap()
        );
    }

    #[test]
    fn parse_from_path() {
        let channel = Channel::from_str("file:///var/channels/conda-forge", &config()).unwrap();
        assert_eq!(
            channel.base_url,
            Url::from_str("file:///var/channels/conda-forge/").unwrap()
        );
        assert_eq!(channel.name.as_deref(), Some("conda-forge"));

        let channel = Channel::from_str("/var/channels/conda-forge", &config()).unwrap();
        assert_eq!(
            channel.base_url,
            Url::from_str("file:///var/channels/conda-forge/").unwrap()
        );
    }

    #[test]
    fn is_path_heuristics() {
        assert!(is_path("./foo"));
        assert!(is_path("/foo"));
        assert!(is_path("~/foo"));
        assert!(is_path("../foo"));
        assert!(is_path("C:/foo"));
        assert!(!is_path("conda-forge/label/rust_dev"));
    }

    #[test]
    fn parse_scheme_heuristics() {
        assert_eq!(parse_scheme("https://google.com"), Some("https"));
        assert_eq!(parse_scheme("google.com"), None);
        assert_eq!(parse_scheme(""), None);
        assert_eq!(parse_scheme("waytoolongscheme://"), None);
        assert_eq!(parse_scheme("1nv4l1d://"), None);
    }

    #[test]
    fn canonical_name_roundtrip() {
        let config = config();
        let channel = Channel::from_str("conda-forge", &config).unwrap();
        let roundtripped = Channel::from_str(channel.base_url.as_str(), &config).unwrap();
        assert_eq!(channel, roundtripped);
    }
}
