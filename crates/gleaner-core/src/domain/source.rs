//! External platforms that crawl tasks collect data from.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A supported external source.
///
/// The set is closed: adding a platform means adding a variant, and every
/// per-source `match` in the crate has to handle it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Amazon,
    Ebay,
    Etsy,
    Walmart,
}

impl Source {
    /// Every source, in a fixed order.
    pub const ALL: [Source; 4] = [Source::Amazon, Source::Ebay, Source::Etsy, Source::Walmart];

    pub fn as_str(self) -> &'static str {
        match self {
            Source::Amazon => "amazon",
            Source::Ebay => "ebay",
            Source::Etsy => "etsy",
            Source::Walmart => "walmart",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown source '{0}' (expected one of: amazon, ebay, etsy, walmart)")]
pub struct ParseSourceError(pub String);

impl FromStr for Source {
    type Err = ParseSourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Source::ALL
            .into_iter()
            .find(|source| source.as_str() == wanted)
            .ok_or_else(|| ParseSourceError(s.to_string()))
    }
}
