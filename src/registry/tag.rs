use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Semantic class of scene geometry.
///
/// The set is closed; configuration refers to tags by name and unknown names
/// are rejected by [`SemanticTag::from_str`].
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    JsonSchema,
)]
pub enum SemanticTag {
    /// Passenger vehicles.
    Car,
    /// Drivable road surface.
    Road,
    /// Pedestrian walkways.
    Sidewalk,
    /// Trees, bushes, grass.
    Vegetation,
    /// Static obstacles (barriers, cones).
    Obstacle,
    /// Traffic light housings.
    TrafficLight,
    /// Buildings and walls.
    Building,
    /// Traffic signs.
    Sign,
    /// Road shoulder.
    Shoulder,
    /// Pedestrians.
    Pedestrian,
    /// Curbs.
    Curb,
}

impl SemanticTag {
    /// Number of tags.
    pub const COUNT: usize = 11;

    /// Every tag, in declaration order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::Car,
        Self::Road,
        Self::Sidewalk,
        Self::Vegetation,
        Self::Obstacle,
        Self::TrafficLight,
        Self::Building,
        Self::Sign,
        Self::Shoulder,
        Self::Pedestrian,
        Self::Curb,
    ];

    /// Position in [`SemanticTag::ALL`].
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Configuration name of the tag.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Car => "Car",
            Self::Road => "Road",
            Self::Sidewalk => "Sidewalk",
            Self::Vegetation => "Vegetation",
            Self::Obstacle => "Obstacle",
            Self::TrafficLight => "TrafficLight",
            Self::Building => "Building",
            Self::Sign => "Sign",
            Self::Shoulder => "Shoulder",
            Self::Pedestrian => "Pedestrian",
            Self::Curb => "Curb",
        }
    }
}

impl fmt::Display for SemanticTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A tag name that is not part of the closed tag set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownTag(pub String);

impl fmt::Display for UnknownTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown semantic tag '{}'", self.0)
    }
}

impl std::error::Error for UnknownTag {}

impl FromStr for SemanticTag {
    type Err = UnknownTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Self::ALL
            .into_iter()
            .find(|tag| tag.name().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| UnknownTag(trimmed.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for tag in SemanticTag::ALL {
            assert_eq!(tag.name().parse::<SemanticTag>(), Ok(tag));
        }
    }

    #[test]
    fn parsing_ignores_case_and_whitespace() {
        assert_eq!(" trafficlight ".parse(), Ok(SemanticTag::TrafficLight));
        assert_eq!(
            "Sky".parse::<SemanticTag>(),
            Err(UnknownTag("Sky".to_owned()))
        );
    }

    #[test]
    fn index_matches_declaration_order() {
        for (i, tag) in SemanticTag::ALL.iter().enumerate() {
            assert_eq!(tag.index(), i);
        }
    }
}
