//! Front-end asset delivery mode.
//!
//! Sessions need a client bundle from somewhere: the public CDN pinned to
//! this crate's version, the local static route, or a caller-supplied base
//! URL. Validation has two postures. The unattended bootstrap treats an
//! unusable default CDN as fatal; embedders who control their own hosting
//! get a logged fallback to local assets instead.

use thiserror::Error;
use tracing::warn;

/// Root of the public asset CDN. Artifacts are tagged per released crate
/// version so an old front-end can never be served against a new backend.
const CDN_ROOT: &str = "https://cdn.jsdelivr.net/gh/utkarshpriyadarshi/gantry-assets";

const CRATE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Raised when the default CDN cannot serve this build.
#[derive(Debug, Error)]
pub enum CdnError {
    /// Pre-release builds have no tagged CDN artifacts.
    #[error("no CDN assets are published for version {version}; pass an explicit asset URL or disable the CDN")]
    Unpublished { version: String },
}

/// Where session front-end assets are loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cdn {
    /// The public CDN at the path tagged with this crate's version.
    Default,
    /// Assets are served locally through the wildcard static route.
    Disabled,
    /// An explicit base URL, normalized to end with a slash.
    Custom(String),
}

impl From<bool> for Cdn {
    fn from(enabled: bool) -> Self {
        if enabled { Self::Default } else { Self::Disabled }
    }
}

impl From<&str> for Cdn {
    fn from(url: &str) -> Self {
        Self::Custom(url.to_owned())
    }
}

impl From<String> for Cdn {
    fn from(url: String) -> Self {
        Self::Custom(url)
    }
}

impl Cdn {
    /// The asset base URL, always slash-terminated, or `None` when assets
    /// are locally hosted.
    pub fn base_url(&self) -> Option<String> {
        match self {
            Self::Default => Some(format!("{CDN_ROOT}@v{CRATE_VERSION}/")),
            Self::Disabled => None,
            Self::Custom(url) => {
                if url.ends_with('/') {
                    Some(url.clone())
                } else {
                    Some(format!("{url}/"))
                }
            }
        }
    }

    /// Fatal validation for the bootstrap path.
    ///
    /// # Errors
    ///
    /// [`CdnError::Unpublished`] for [`Cdn::Default`] on a build with no
    /// tagged assets.
    pub fn ensure_usable(self) -> Result<Self, CdnError> {
        self.ensure_usable_at(CRATE_VERSION)
    }

    /// Lenient validation for embedders: an unusable default degrades to
    /// [`Cdn::Disabled`] with a warning.
    pub fn or_local(self) -> Self {
        self.or_local_at(CRATE_VERSION)
    }

    fn ensure_usable_at(self, version: &str) -> Result<Self, CdnError> {
        if matches!(self, Self::Default) && !has_published_assets(version) {
            return Err(CdnError::Unpublished {
                version: version.to_owned(),
            });
        }
        Ok(self)
    }

    fn or_local_at(self, version: &str) -> Self {
        if matches!(self, Self::Default) && !has_published_assets(version) {
            warn!(version, "default CDN has no assets for this build; serving assets locally");
            return Self::Disabled;
        }
        self
    }
}

// Release tags exist for every published version; a semver pre-release
// marker means this build was never published.
fn has_published_assets(version: &str) -> bool {
    !version.contains('-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_conversions() {
        assert_eq!(Cdn::from(true), Cdn::Default);
        assert_eq!(Cdn::from(false), Cdn::Disabled);
    }

    #[test]
    fn url_conversions_produce_custom() {
        assert_eq!(
            Cdn::from("https://assets.example.com/gantry"),
            Cdn::Custom("https://assets.example.com/gantry".to_owned())
        );
    }

    #[test]
    fn custom_base_url_is_slash_terminated() {
        let cdn = Cdn::from("https://assets.example.com/gantry");
        assert_eq!(
            cdn.base_url().as_deref(),
            Some("https://assets.example.com/gantry/")
        );

        let already = Cdn::from("https://assets.example.com/gantry/");
        assert_eq!(
            already.base_url().as_deref(),
            Some("https://assets.example.com/gantry/")
        );
    }

    #[test]
    fn default_base_url_pins_the_crate_version() {
        let url = Cdn::Default.base_url().unwrap();
        assert!(url.starts_with(CDN_ROOT));
        assert!(url.contains(CRATE_VERSION));
        assert!(url.ends_with('/'));
    }

    #[test]
    fn disabled_has_no_base_url() {
        assert_eq!(Cdn::Disabled.base_url(), None);
    }

    #[test]
    fn prerelease_builds_have_no_published_assets() {
        assert!(has_published_assets("1.2.0"));
        assert!(has_published_assets("0.1.0"));
        assert!(!has_published_assets("0.2.0-rc.1"));
        assert!(!has_published_assets("1.0.0-dev"));
    }

    #[test]
    fn fatal_validation_rejects_default_on_prerelease() {
        let err = Cdn::Default.ensure_usable_at("0.2.0-rc.1").unwrap_err();
        assert!(matches!(err, CdnError::Unpublished { .. }));

        assert!(Cdn::Default.ensure_usable_at("0.2.0").is_ok());
        assert!(Cdn::Disabled.ensure_usable_at("0.2.0-rc.1").is_ok());
    }

    #[test]
    fn lenient_validation_falls_back_to_local() {
        assert_eq!(Cdn::Default.or_local_at("0.2.0-rc.1"), Cdn::Disabled);
        assert_eq!(Cdn::Default.or_local_at("0.2.0"), Cdn::Default);

        let custom = Cdn::from("https://assets.example.com/");
        assert_eq!(custom.clone().or_local_at("0.2.0-rc.1"), custom);
    }
}
