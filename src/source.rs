use url::Url;

const DEFAULT_MEDIA_TYPE: &str = "mp4";

/// A media source handed to [`crate::PlayerSession::load`].
///
/// Sources are transient: the session forwards them to the decoder and keeps
/// nothing beyond what the `load-start` event reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub uri: String,
    pub media_type: String,
    pub is_network: bool,
    pub is_asset: bool,
}

impl Source {
    /// Builds a source from a raw uri the way script callers pass it.
    ///
    /// Absolute paths become `file://` uris, `http(s)` uris are network sources
    /// and `file`/`assets-library` uris are local assets.
    pub fn from_uri(uri: &str, media_type: Option<&str>) -> Self {
        let uri = if uri.starts_with('/') {
            format!("file://{uri}")
        } else {
            uri.to_string()
        };

        let scheme = uri
            .split_once(':')
            .map(|(scheme, _)| scheme.to_ascii_lowercase())
            .unwrap_or_default();
        let is_network = matches!(scheme.as_str(), "http" | "https");
        let is_asset = matches!(scheme.as_str(), "file" | "assets-library");

        Self {
            uri,
            media_type: media_type
                .filter(|t| !t.is_empty())
                .unwrap_or(DEFAULT_MEDIA_TYPE)
                .to_string(),
            is_network,
            is_asset,
        }
    }

    /// Parses the uri, rejecting sources that are neither network nor asset.
    pub fn url(&self) -> Result<Url, crate::Error> {
        if !self.is_network && !self.is_asset {
            return Err(crate::Error::SourceLoad {
                uri: self.uri.clone(),
                reason: "source is neither a network stream nor a local asset".into(),
            });
        }

        Url::parse(&self.uri).map_err(|e| crate::Error::SourceLoad {
            uri: self.uri.clone(),
            reason: e.to_string(),
        })
    }
}
