//! Static per-tier feature limit tables.
//!
//! Every gated feature in the product has exactly one entry per tier: either a
//! daily quota, the unlimited sentinel, or a boolean tier-membership switch.
//! The `Feature` enum is closed, so an unknown feature key can only enter the
//! system at the HTTP boundary, where `Feature::from_key` rejects it.

use serde::{Deserialize, Serialize};
use serde::ser::Serializer;

/// Subscription tier. `expires_at` handling lives on the subscription row;
/// code past that point only ever sees the *effective* tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Pro,
}

/// A gated product feature. Metered features consume daily quota under the
/// free tier; boolean features gate on tier membership alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    CareerAnalysis,
    ProjectIdeas,
    JobSearch,
    AiSearch,
    EditRoadmaps,
    Export,
    AdvancedJobs,
    EnhanceResume,
    MindMaps,
}

impl Feature {
    pub const ALL: [Feature; 9] = [
        Feature::CareerAnalysis,
        Feature::ProjectIdeas,
        Feature::JobSearch,
        Feature::AiSearch,
        Feature::EditRoadmaps,
        Feature::Export,
        Feature::AdvancedJobs,
        Feature::EnhanceResume,
        Feature::MindMaps,
    ];

    /// The feature key as stored in the usage ledger and accepted over HTTP.
    pub fn key(&self) -> &'static str {
        match self {
            Feature::CareerAnalysis => "career_analysis",
            Feature::ProjectIdeas => "project_ideas",
            Feature::JobSearch => "job_search",
            Feature::AiSearch => "ai_search",
            Feature::EditRoadmaps => "edit_roadmaps",
            Feature::Export => "export",
            Feature::AdvancedJobs => "advanced_jobs",
            Feature::EnhanceResume => "enhance_resume",
            Feature::MindMaps => "mind_maps",
        }
    }

    /// Parses a feature key. `None` means the key is not in the limit tables.
    pub fn from_key(key: &str) -> Option<Feature> {
        Feature::ALL.iter().copied().find(|f| f.key() == key)
    }

    /// Human-readable name for user-facing denial messages.
    pub fn display_name(&self) -> &'static str {
        match self {
            Feature::CareerAnalysis => "career analyses",
            Feature::ProjectIdeas => "project ideas",
            Feature::JobSearch => "job searches",
            Feature::AiSearch => "AI searches",
            Feature::EditRoadmaps => "Roadmap editing",
            Feature::Export => "Exporting",
            Feature::AdvancedJobs => "Advanced job matching",
            Feature::EnhanceResume => "Resume enhancement",
            Feature::MindMaps => "Mind maps",
        }
    }
}

/// The limit for one (tier, feature) cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureLimit {
    /// Metered: at most N uses per UTC calendar day.
    Daily(u32),
    /// Metered feature with no cap.
    Unlimited,
    /// Boolean feature available on this tier.
    Enabled,
    /// Boolean feature not available on this tier.
    Disabled,
}

// Serialized for the entitlements endpoint the way the UI consumes limits:
// a number for daily quotas, "unlimited" for the sentinel, a bool for switches.
impl Serialize for FeatureLimit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FeatureLimit::Daily(n) => serializer.serialize_u32(*n),
            FeatureLimit::Unlimited => serializer.serialize_str("unlimited"),
            FeatureLimit::Enabled => serializer.serialize_bool(true),
            FeatureLimit::Disabled => serializer.serialize_bool(false),
        }
    }
}

/// Looks up the limit for a feature under a tier.
/// Total over `Feature`, so there is no missing-key case at this level.
pub fn limit_for(tier: Tier, feature: Feature) -> FeatureLimit {
    match tier {
        Tier::Free => match feature {
            Feature::CareerAnalysis => FeatureLimit::Daily(3),
            Feature::ProjectIdeas => FeatureLimit::Daily(10),
            Feature::JobSearch => FeatureLimit::Daily(5),
            Feature::AiSearch => FeatureLimit::Daily(5),
            Feature::EditRoadmaps
            | Feature::Export
            | Feature::AdvancedJobs
            | Feature::EnhanceResume
            | Feature::MindMaps => FeatureLimit::Disabled,
        },
        Tier::Pro => match feature {
            Feature::CareerAnalysis
            | Feature::ProjectIdeas
            | Feature::JobSearch
            | Feature::AiSearch => FeatureLimit::Unlimited,
            Feature::EditRoadmaps
            | Feature::Export
            | Feature::AdvancedJobs
            | Feature::EnhanceResume
            | Feature::MindMaps => FeatureLimit::Enabled,
        },
    }
}
