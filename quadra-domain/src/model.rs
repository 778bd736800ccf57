use std::fmt;

pub use quadra_construction::{Category, QuartetMetrics};

/// Stable identity of a roster participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ParticipantId(pub u64);

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A roster entry: identity, score and composition category.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Participant {
    pub id: ParticipantId,
    pub score: f64,
    pub category: Category,
}

/// A participant as placed into a quartet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacedMember {
    pub id: ParticipantId,
    pub score: f64,
}

/// One planned group. Four members from the optimization core; residual
/// placement may have appended more.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedQuartet {
    pub members: Vec<PlacedMember>,
}

impl PlannedQuartet {
    pub fn score_sum(&self) -> f64 {
        self.members.iter().map(|member| member.score).sum()
    }
}

/// Result of a successful planning run.
///
/// `metrics` describes the core assignment; when the roster was not a
/// multiple of four, quartets additionally hold the placed residuals while
/// the metrics keep their pre-placement values. Quartet order matches the
/// per-group entries of `metrics`.
#[derive(Debug, Clone, PartialEq)]
pub struct QuartetPlan {
    pub quartets: Vec<PlannedQuartet>,
    pub metrics: QuartetMetrics,
}
