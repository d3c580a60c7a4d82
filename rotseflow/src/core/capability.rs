//! Capability tags describing what a stage consumes and produces.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of data exchanged between stages.
///
/// Two stages can be chained when the upstream output capability equals the
/// downstream input capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// The run request itself: nights, telescope, field.
    Request,
    /// Preprocessed images with their prod catalogs.
    Images,
    /// Coadded images.
    Coadds,
    /// Source catalogs extracted from coadds.
    Catalogs,
    /// Subimages centred on the target.
    Subimages,
    /// Difference images.
    Differences,
    /// Photometry light curve.
    LightCurve,
}

impl Capability {
    /// Returns true if data tagged `offered` can be fed to a stage accepting `self`.
    #[must_use]
    pub fn accepts(self, offered: Self) -> bool {
        self == offered
    }

    /// All capabilities, in pipeline order.
    #[must_use]
    pub fn all() -> &'static [Self] {
        &[
            Self::Request,
            Self::Images,
            Self::Coadds,
            Self::Catalogs,
            Self::Subimages,
            Self::Differences,
            Self::LightCurve,
        ]
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request => write!(f, "request"),
            Self::Images => write!(f, "images"),
            Self::Coadds => write!(f, "coadds"),
            Self::Catalogs => write!(f, "catalogs"),
            Self::Subimages => write!(f, "subimages"),
            Self::Differences => write!(f, "differences"),
            Self::LightCurve => write!(f, "light_curve"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_is_equality() {
        assert!(Capability::Coadds.accepts(Capability::Coadds));
        assert!(!Capability::Coadds.accepts(Capability::Images));
    }

    #[test]
    fn test_display_matches_serde() {
        for cap in Capability::all() {
            let json = serde_json::to_string(cap).unwrap();
            assert_eq!(json, format!("\"{cap}\""));
        }
    }
}
