//! Quality tiers assigned to indexed records

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Content tier, 0 (lowest) to 4
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ContentTier {
    #[serde(rename = "0")]
    T0,
    #[serde(rename = "1")]
    T1,
    #[serde(rename = "2")]
    T2,
    #[serde(rename = "3")]
    T3,
    #[serde(rename = "4")]
    T4,
}

/// Metadata tier, 0 (lowest) then A to D
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MetadataTier {
    #[serde(rename = "0")]
    T0,
    A,
    B,
    C,
    D,
}

impl ContentTier {
    pub const LOWEST: ContentTier = ContentTier::T0;

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentTier::T0 => "0",
            ContentTier::T1 => "1",
            ContentTier::T2 => "2",
            ContentTier::T3 => "3",
            ContentTier::T4 => "4",
        }
    }
}

impl MetadataTier {
    pub const LOWEST: MetadataTier = MetadataTier::T0;

    pub fn as_str(&self) -> &'static str {
        match self {
            MetadataTier::T0 => "0",
            MetadataTier::A => "A",
            MetadataTier::B => "B",
            MetadataTier::C => "C",
            MetadataTier::D => "D",
        }
    }
}

impl fmt::Display for ContentTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for MetadataTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "0" => Ok(ContentTier::T0),
            "1" => Ok(ContentTier::T1),
            "2" => Ok(ContentTier::T2),
            "3" => Ok(ContentTier::T3),
            "4" => Ok(ContentTier::T4),
            other => Err(format!("Unknown content tier: {}", other)),
        }
    }
}

impl FromStr for MetadataTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "0" => Ok(MetadataTier::T0),
            "A" => Ok(MetadataTier::A),
            "B" => Ok(MetadataTier::B),
            "C" => Ok(MetadataTier::C),
            "D" => Ok(MetadataTier::D),
            other => Err(format!("Unknown metadata tier: {}", other)),
        }
    }
}

/// Tier classification written once per indexed record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierContext {
    pub content_tier: ContentTier,
    pub metadata_tier: MetadataTier,
}

/// One record's stored tiers, as listed in the records-tiers report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordTiers {
    pub record_id: String,
    pub content_tier: ContentTier,
    pub metadata_tier: MetadataTier,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers_order_lowest_first() {
        assert!(ContentTier::T0 < ContentTier::T4);
        assert!(MetadataTier::T0 < MetadataTier::A);
        assert!(MetadataTier::A < MetadataTier::D);
    }

    #[test]
    fn tiers_serialize_as_scale_labels() {
        let ctx = TierContext {
            content_tier: ContentTier::T3,
            metadata_tier: MetadataTier::T0,
        };
        let json = serde_json::to_value(ctx).unwrap();
        assert_eq!(json["content_tier"], "3");
        assert_eq!(json["metadata_tier"], "0");
    }

    #[test]
    fn storage_labels_parse() {
        assert_eq!("4".parse::<ContentTier>().unwrap(), ContentTier::T4);
        assert_eq!("B".parse::<MetadataTier>().unwrap(), MetadataTier::B);
        assert!("E".parse::<MetadataTier>().is_err());
        assert!("5".parse::<ContentTier>().is_err());
    }
}
