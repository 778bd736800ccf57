use thiserror::Error;

use crate::model::{Participant, ParticipantId, PlacedMember, PlannedQuartet, QuartetPlan};
use quadra_construction::{
    BuildOptions, GROUP_SIZE, QuartetFormationError, SolveOptions, build_quartets,
};

/// Caller-facing options for one planning run.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlanOptions {
    /// Non-negative tie-break weight for the max-minus-min range term.
    pub range_weight: f64,
    /// Wall-clock limit forwarded to the solver backend.
    pub time_limit_seconds: Option<f64>,
    /// Seed for the residual-placement shuffle; `None` draws one from the OS.
    pub placement_seed: Option<u64>,
}

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("Roster must have at least {GROUP_SIZE} participants (found {0})")]
    RosterTooSmall(usize),
    #[error("Roster size must be a positive multiple of {GROUP_SIZE} (found {0})")]
    RosterSizeNotMultipleOfFour(usize),
    #[error("Roster exceeds the supported model size (participants={participants}, max={max})")]
    RosterTooLarge { participants: usize, max: usize },
    #[error("Participant {0} appears more than once in the roster")]
    DuplicateParticipant(ParticipantId),
    #[error("Participant {0} has a non-finite score")]
    NonFiniteScore(ParticipantId),
    #[error("Range weight must be finite and non-negative (found {0})")]
    InvalidRangeWeight(f64),
    #[error("Exclusion pair ({a}, {b}) references a participant missing from the roster")]
    UnknownExclusionParticipant { a: ParticipantId, b: ParticipantId },
    #[error("Exclusion pair ({0}, {0}) pairs a participant with itself")]
    SelfExclusion(ParticipantId),
    #[error(
        "No optimal grouping exists; exclusions or the category mix may be unsatisfiable for this roster"
    )]
    Infeasible,
    #[error("Solver backend failed: {0}")]
    SolverBackend(String),
    #[error("Solver returned a grouping that failed verification")]
    AssignmentInconsistent,
    #[error("Residual participant {0} cannot be placed without violating an exclusion")]
    ResidualPlacementFailed(ParticipantId),
}

impl From<QuartetFormationError> for PlanError {
    fn from(err: QuartetFormationError) -> Self {
        match err {
            QuartetFormationError::RosterTooSmall(found) => PlanError::RosterTooSmall(found),
            QuartetFormationError::RosterSizeNotMultipleOfFour(found) => {
                PlanError::RosterSizeNotMultipleOfFour(found)
            }
            QuartetFormationError::RosterTooLarge { participants, max } => {
                PlanError::RosterTooLarge { participants, max }
            }
            QuartetFormationError::DuplicateParticipant(id) => {
                PlanError::DuplicateParticipant(ParticipantId(id))
            }
            QuartetFormationError::NonFiniteScore(id) => {
                PlanError::NonFiniteScore(ParticipantId(id))
            }
            QuartetFormationError::InvalidRangeWeight(weight) => {
                PlanError::InvalidRangeWeight(weight)
            }
            QuartetFormationError::UnknownExclusionId { a, b } => {
                PlanError::UnknownExclusionParticipant {
                    a: ParticipantId(a),
                    b: ParticipantId(b),
                }
            }
            QuartetFormationError::SelfExclusion(id) => PlanError::SelfExclusion(ParticipantId(id)),
            QuartetFormationError::Infeasible => PlanError::Infeasible,
            QuartetFormationError::SolverBackend(message) => PlanError::SolverBackend(message),
            QuartetFormationError::AssignmentInconsistent => PlanError::AssignmentInconsistent,
            QuartetFormationError::ResidualPlacementFailed { id } => {
                PlanError::ResidualPlacementFailed(ParticipantId(id))
            }
        }
    }
}

/// Quartet-planning service for roster assignment flows.
pub struct QuartetPlanner;

impl QuartetPlanner {
    /// Plan balanced quartets for the given roster and exclusion list.
    ///
    /// Input is taken as immutable per call; exclusion state is never
    /// accumulated across invocations. Either a complete plan is returned
    /// or a typed error; no partial output.
    pub fn plan(
        &self,
        roster: &[Participant],
        exclusions: &[(ParticipantId, ParticipantId)],
        options: PlanOptions,
    ) -> Result<QuartetPlan, PlanError> {
        let records: Vec<quadra_construction::Participant> = roster
            .iter()
            .map(|participant| quadra_construction::Participant {
                id: participant.id.0,
                score: participant.score,
                category: participant.category,
            })
            .collect();
        let pairs: Vec<(u64, u64)> = exclusions.iter().map(|&(a, b)| (a.0, b.0)).collect();

        let residual_count = roster.len() % GROUP_SIZE;
        tracing::debug!(
            roster_size = roster.len(),
            group_count = roster.len() / GROUP_SIZE,
            residual_count,
            exclusion_count = pairs.len(),
            range_weight = options.range_weight,
            "Quartet planning started"
        );

        let build = BuildOptions {
            range_weight: options.range_weight,
            solve: SolveOptions {
                time_limit_seconds: options.time_limit_seconds,
            },
            placement_seed: options.placement_seed,
        };

        let (quartets, metrics) = build_quartets(records, &pairs, build)?;

        if residual_count > 0 {
            // Metrics are intentionally left at their pre-placement values;
            // surfaced here so callers notice the asymmetry.
            tracing::warn!(
                residual_count,
                "Residual participants placed after optimization; metrics describe the pre-placement quartets only"
            );
        }

        // Quartet order must stay aligned with the per-group metrics, so
        // only members are sorted for stable presentation.
        let quartets: Vec<PlannedQuartet> = quartets
            .into_iter()
            .map(|quartet| {
                let mut members: Vec<PlacedMember> = quartet
                    .members
                    .into_iter()
                    .map(|member| PlacedMember {
                        id: ParticipantId(member.id),
                        score: member.score,
                    })
                    .collect();
                members.sort_unstable_by_key(|member| member.id);
                PlannedQuartet { members }
            })
            .collect();

        tracing::debug!(
            group_count = quartets.len(),
            objective = metrics.objective_value,
            target_average = metrics.target_average,
            "Quartet planning finished"
        );

        Ok(QuartetPlan { quartets, metrics })
    }
}
