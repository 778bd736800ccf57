#![warn(clippy::uninlined_format_args)]

mod model;

use std::collections::{HashMap, HashSet};

use good_lp::{
    Expression, ResolutionError, Solution, SolverModel, Variable, default_solver, variable,
    variables,
};
use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};
use thiserror::Error;

pub use model::{Category, Participant, Quartet, QuartetMember, QuartetMetrics};

#[derive(Debug, Error)]
pub enum QuartetFormationError {
    #[error("Roster must have at least {GROUP_SIZE} participants (found {0})")]
    RosterTooSmall(usize),
    #[error("Roster size must be a positive multiple of {GROUP_SIZE} (found {0})")]
    RosterSizeNotMultipleOfFour(usize),
    #[error("Roster too large for the assignment model (participants={participants}, max={max})")]
    RosterTooLarge { participants: usize, max: usize },
    #[error("Participant {0} appears more than once in the roster")]
    DuplicateParticipant(u64),
    #[error("Participant {0} has a non-finite score")]
    NonFiniteScore(u64),
    #[error("Range weight must be finite and non-negative (found {0})")]
    InvalidRangeWeight(f64),
    #[error("Exclusion pair ({a}, {b}) references an id missing from the roster")]
    UnknownExclusionId { a: u64, b: u64 },
    #[error("Exclusion pair ({0}, {0}) pairs a participant with itself")]
    SelfExclusion(u64),
    #[error(
        "No optimal assignment exists; exclusions or the category mix may be unsatisfiable for this roster"
    )]
    Infeasible,
    #[error("Solver backend failed: {0}")]
    SolverBackend(String),
    #[error("Solver returned an assignment that failed verification")]
    AssignmentInconsistent,
    #[error("Residual participant {id} cannot be placed without violating an exclusion")]
    ResidualPlacementFailed { id: u64 },
}

pub const GROUP_SIZE: usize = 4;

const MAX_MODEL_PARTICIPANTS: usize = 200;
const MEMBERSHIP_THRESHOLD: f64 = 0.5;
const OBJECTIVE_TOLERANCE: f64 = 1e-4;

/// Options forwarded to the MIP backend.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SolveOptions {
    /// Wall-clock limit handed to the CBC backend (`coin_cbc` feature only).
    /// A solve stopped by the limit is reported as `SolverBackend`, never as
    /// a success: only certified-optimal outcomes are accepted.
    pub time_limit_seconds: Option<f64>,
}

/// Options for the full quartet-construction pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BuildOptions {
    /// Non-negative weight for the `(max_sum - min_sum)` tie-break term.
    /// Zero omits the term and minimizes total absolute deviation alone.
    pub range_weight: f64,
    pub solve: SolveOptions,
    /// Seed for the residual-placement shuffle. `None` seeds from the OS.
    /// Ignored when the roster is an exact multiple of four.
    pub placement_seed: Option<u64>,
}

impl BuildOptions {
    pub fn with_range_weight(mut self, range_weight: f64) -> Self {
        self.range_weight = range_weight;
        self
    }

    pub fn with_solve(mut self, solve: SolveOptions) -> Self {
        self.solve = solve;
        self
    }

    pub fn with_placement_seed(mut self, seed: u64) -> Self {
        self.placement_seed = Some(seed);
        self
    }
}

/// Partitions a multiple-of-four roster into quartets minimizing total
/// absolute deviation of group sums from the target average.
///
/// Exclusion validation is strict: pairs referencing unknown ids are
/// rejected, not ignored.
pub fn form_balanced_quartets(
    participants: impl IntoIterator<Item = Participant>,
    exclusions: &[(u64, u64)],
    options: BuildOptions,
) -> Result<(Vec<Quartet>, QuartetMetrics), QuartetFormationError> {
    let participants: Vec<Participant> = participants.into_iter().collect();
    if participants.is_empty() || participants.len() % GROUP_SIZE != 0 {
        return Err(QuartetFormationError::RosterSizeNotMultipleOfFour(
            participants.len(),
        ));
    }
    let index_by_id = validate_roster(&participants, exclusions, &options)?;
    solve_core(&participants, exclusions, &index_by_id, &options)
}

/// Full pipeline: splits a non-multiple-of-four roster into a core handled
/// by the solver and a residual tail placed greedily afterwards.
///
/// The returned metrics describe the core assignment only; residual members
/// appended by placement are not reflected in the sums or deviations.
pub fn build_quartets(
    participants: impl IntoIterator<Item = Participant>,
    exclusions: &[(u64, u64)],
    options: BuildOptions,
) -> Result<(Vec<Quartet>, QuartetMetrics), QuartetFormationError> {
    let participants: Vec<Participant> = participants.into_iter().collect();
    if participants.len() < GROUP_SIZE {
        return Err(QuartetFormationError::RosterTooSmall(participants.len()));
    }
    validate_roster(&participants, exclusions, &options)?;

    let residual_count = participants.len() % GROUP_SIZE;
    if residual_count == 0 {
        return form_balanced_quartets(participants, exclusions, options);
    }

    let mut ranked = participants;
    // Ties broken by id so the core/residual split is deterministic.
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.id.cmp(&b.id)));
    let (core, residuals) = ranked.split_at(ranked.len() - residual_count);

    let core_ids: HashSet<u64> = core.iter().map(|participant| participant.id).collect();
    let core_exclusions: Vec<(u64, u64)> = exclusions
        .iter()
        .copied()
        .filter(|(a, b)| core_ids.contains(a) && core_ids.contains(b))
        .collect();

    let (mut quartets, metrics) =
        form_balanced_quartets(core.iter().copied(), &core_exclusions, options)?;

    let mut rng = match options.placement_seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    place_residuals_with_rng(&mut quartets, residuals, exclusions, &mut rng)?;

    Ok((quartets, metrics))
}

/// Greedily inserts residual participants into existing quartets.
///
/// Quartets are visited in a shuffled order so the first groups are not
/// systematically loaded. Quartets still at canonical size are preferred;
/// when every such quartet holds an excluded partner the scan falls back to
/// any quartet the exclusions allow, so capacity alone never strands a
/// participant. Placement fails only when every quartet contains an
/// excluded partner of the participant being placed. The category mix is
/// not re-validated for residual members.
pub fn place_residuals(
    quartets: &mut [Quartet],
    residuals: &[Participant],
    exclusions: &[(u64, u64)],
    seed: Option<u64>,
) -> Result<(), QuartetFormationError> {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    place_residuals_with_rng(quartets, residuals, exclusions, &mut rng)
}

fn place_residuals_with_rng(
    quartets: &mut [Quartet],
    residuals: &[Participant],
    exclusions: &[(u64, u64)],
    rng: &mut StdRng,
) -> Result<(), QuartetFormationError> {
    let mut visit_order: Vec<usize> = (0..quartets.len()).collect();
    visit_order.shuffle(rng);

    for residual in residuals {
        let blocked: HashSet<u64> = exclusions
            .iter()
            .filter_map(|&(a, b)| {
                if a == residual.id {
                    Some(b)
                } else if b == residual.id {
                    Some(a)
                } else {
                    None
                }
            })
            .collect();

        let admits = |quartet: &Quartet| {
            quartet
                .members
                .iter()
                .all(|member| !blocked.contains(&member.id))
        };
        let slot = visit_order
            .iter()
            .copied()
            .find(|&index| {
                quartets[index].members.len() <= GROUP_SIZE && admits(&quartets[index])
            })
            .or_else(|| {
                visit_order
                    .iter()
                    .copied()
                    .find(|&index| admits(&quartets[index]))
            });

        let Some(index) = slot else {
            return Err(QuartetFormationError::ResidualPlacementFailed { id: residual.id });
        };
        quartets[index].members.push(QuartetMember {
            id: residual.id,
            score: residual.score,
        });
    }

    Ok(())
}

fn validate_roster(
    participants: &[Participant],
    exclusions: &[(u64, u64)],
    options: &BuildOptions,
) -> Result<HashMap<u64, usize>, QuartetFormationError> {
    if !options.range_weight.is_finite() || options.range_weight < 0.0 {
        return Err(QuartetFormationError::InvalidRangeWeight(
            options.range_weight,
        ));
    }
    if participants.len() > MAX_MODEL_PARTICIPANTS {
        return Err(QuartetFormationError::RosterTooLarge {
            participants: participants.len(),
            max: MAX_MODEL_PARTICIPANTS,
        });
    }

    let mut index_by_id = HashMap::with_capacity(participants.len());
    for (index, participant) in participants.iter().enumerate() {
        if !participant.score.is_finite() {
            return Err(QuartetFormationError::NonFiniteScore(participant.id));
        }
        if index_by_id.insert(participant.id, index).is_some() {
            return Err(QuartetFormationError::DuplicateParticipant(participant.id));
        }
    }

    for &(a, b) in exclusions {
        if a == b {
            return Err(QuartetFormationError::SelfExclusion(a));
        }
        if !index_by_id.contains_key(&a) || !index_by_id.contains_key(&b) {
            return Err(QuartetFormationError::UnknownExclusionId { a, b });
        }
    }

    Ok(index_by_id)
}

fn solve_core(
    participants: &[Participant],
    exclusions: &[(u64, u64)],
    index_by_id: &HashMap<u64, usize>,
    options: &BuildOptions,
) -> Result<(Vec<Quartet>, QuartetMetrics), QuartetFormationError> {
    let n = participants.len();
    let group_count = n / GROUP_SIZE;

    // Necessary condition for the category constraint; saves the backend a
    // round trip on rosters that cannot possibly mix.
    let count_a = participants
        .iter()
        .filter(|participant| participant.category == Category::A)
        .count();
    if count_a < group_count || n - count_a < group_count {
        return Err(QuartetFormationError::Infeasible);
    }

    let total_score: f64 = participants.iter().map(|participant| participant.score).sum();
    let target = total_score / group_count as f64;

    let mut vars = variables!();

    // Binary indicator per (participant, group) pair.
    let mut assign: Vec<Vec<Variable>> = Vec::with_capacity(n);
    for _ in 0..n {
        let row: Vec<Variable> = (0..group_count)
            .map(|_| vars.add(variable().binary()))
            .collect();
        assign.push(row);
    }

    // Per-group absolute deviation from the target average, and the bounds
    // used by the optional range tie-break.
    let deviation: Vec<Variable> = (0..group_count)
        .map(|_| vars.add(variable().min(0.0)))
        .collect();
    let max_sum = vars.add(variable());
    let min_sum = vars.add(variable());

    let mut objective = Expression::with_capacity(group_count + 2);
    for dev in &deviation {
        objective.add_mul(1.0, *dev);
    }
    if options.range_weight > 0.0 {
        objective.add_mul(options.range_weight, max_sum);
        objective.add_mul(-options.range_weight, min_sum);
    }

    let mut problem = vars.minimise(objective).using(default_solver);
    #[cfg(feature = "coin_cbc")]
    {
        problem.set_parameter("log", "0");
        if let Some(limit) = options.solve.time_limit_seconds {
            problem.set_parameter("sec", &limit.to_string());
        }
    }

    // Each participant assigned to exactly one group.
    for row in &assign {
        let mut membership = Expression::with_capacity(group_count);
        for var in row {
            membership.add_mul(1.0, *var);
        }
        problem = problem.with(membership.eq(1.0));
    }

    for group in 0..group_count {
        let mut size = Expression::with_capacity(n);
        let mut category_a = Expression::default();
        let mut category_b = Expression::default();
        let mut score_sum = Expression::with_capacity(n);
        for (index, participant) in participants.iter().enumerate() {
            size.add_mul(1.0, assign[index][group]);
            match participant.category {
                Category::A => category_a.add_mul(1.0, assign[index][group]),
                Category::B => category_b.add_mul(1.0, assign[index][group]),
            }
            score_sum.add_mul(participant.score, assign[index][group]);
        }
        problem = problem
            .with(size.eq(GROUP_SIZE as f64))
            .with(category_a.geq(1.0))
            .with(category_b.geq(1.0))
            // deviation >= |score_sum - target|, modeled as two inequalities
            .with((score_sum.clone() - deviation[group]).leq(target))
            .with((score_sum.clone() + deviation[group]).geq(target))
            .with((score_sum.clone() - max_sum).leq(0.0))
            .with((score_sum - min_sum).geq(0.0));
    }

    // Exclusion pairs: never both indicators in the same group.
    for &(a, b) in exclusions {
        let index_a = index_by_id[&a];
        let index_b = index_by_id[&b];
        for group in 0..group_count {
            problem = problem.with((assign[index_a][group] + assign[index_b][group]).leq(1.0));
        }
    }

    let solution = match problem.solve() {
        Ok(solution) => solution,
        Err(ResolutionError::Infeasible) => return Err(QuartetFormationError::Infeasible),
        Err(err) => return Err(QuartetFormationError::SolverBackend(err.to_string())),
    };

    let mut quartets = Vec::with_capacity(group_count);
    for group in 0..group_count {
        let members: Vec<QuartetMember> = participants
            .iter()
            .enumerate()
            .filter(|(index, _)| solution.value(assign[*index][group]) > MEMBERSHIP_THRESHOLD)
            .map(|(_, participant)| QuartetMember {
                id: participant.id,
                score: participant.score,
            })
            .collect();
        quartets.push(Quartet { members });
    }

    let metrics = QuartetMetrics::for_quartets(&quartets, options.range_weight);

    let mut reported_objective: f64 = deviation.iter().map(|var| solution.value(*var)).sum();
    if options.range_weight > 0.0 {
        reported_objective +=
            options.range_weight * (solution.value(max_sum) - solution.value(min_sum));
    }

    if !is_assignment_consistent(participants, exclusions, &quartets) {
        return Err(QuartetFormationError::AssignmentInconsistent);
    }
    let tolerance = OBJECTIVE_TOLERANCE * metrics.objective_value.abs().max(1.0);
    if (reported_objective - metrics.objective_value).abs() > tolerance {
        return Err(QuartetFormationError::AssignmentInconsistent);
    }

    Ok((quartets, metrics))
}

fn is_assignment_consistent(
    participants: &[Participant],
    exclusions: &[(u64, u64)],
    quartets: &[Quartet],
) -> bool {
    let category_by_id: HashMap<u64, Category> = participants
        .iter()
        .map(|participant| (participant.id, participant.category))
        .collect();

    let mut seen: HashSet<u64> = HashSet::with_capacity(participants.len());
    for quartet in quartets {
        if quartet.members.len() != GROUP_SIZE {
            return false;
        }

        let mut has_a = false;
        let mut has_b = false;
        for member in &quartet.members {
            if !seen.insert(member.id) {
                return false;
            }
            match category_by_id.get(&member.id) {
                Some(Category::A) => has_a = true,
                Some(Category::B) => has_b = true,
                None => return false,
            }
        }
        if !has_a || !has_b {
            return false;
        }

        let ids: HashSet<u64> = quartet.members.iter().map(|member| member.id).collect();
        for &(a, b) in exclusions {
            if ids.contains(&a) && ids.contains(&b) {
                return false;
            }
        }
    }

    seen.len() == participants.len()
}
