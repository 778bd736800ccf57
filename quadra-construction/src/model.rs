/// Binary composition attribute of a participant.
///
/// Every canonical quartet must contain at least one member of each category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    A,
    B,
}

/// A roster entry handed to the solver. Immutable input record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Participant<Id = u64> {
    pub id: Id,
    pub score: f64,
    pub category: Category,
}

/// Output projection of a placed participant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuartetMember<Id = u64> {
    pub id: Id,
    pub score: f64,
}

/// One formed group. Canonically four members; residual placement may
/// append further members afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Quartet<Id = u64> {
    pub members: Vec<QuartetMember<Id>>,
}

impl<Id> Quartet<Id> {
    pub fn score_sum(&self) -> f64 {
        self.members.iter().map(|member| member.score).sum()
    }
}

/// Summary of a core (multiple-of-four) assignment.
///
/// These numbers describe the quartets as returned by the solver. Residual
/// placement appends members afterwards and does not update them.
#[derive(Debug, Clone, PartialEq)]
pub struct QuartetMetrics {
    /// Total score divided by the number of quartets.
    pub target_average: f64,
    /// Score sum per quartet, in quartet order.
    pub group_sums: Vec<f64>,
    /// Absolute deviation of each quartet's sum from the target average.
    pub absolute_deviations: Vec<f64>,
    /// Largest group sum minus smallest group sum.
    pub range: f64,
    /// Sum of absolute deviations, plus the weighted range term when a
    /// positive range weight was supplied.
    pub objective_value: f64,
}

impl QuartetMetrics {
    /// Recomputes the full metrics record from a set of quartets.
    ///
    /// Pure function of the assignment: calling it twice on the same
    /// quartets yields identical values.
    pub fn for_quartets<Id>(quartets: &[Quartet<Id>], range_weight: f64) -> Self {
        if quartets.is_empty() {
            return Self {
                target_average: 0.0,
                group_sums: Vec::new(),
                absolute_deviations: Vec::new(),
                range: 0.0,
                objective_value: 0.0,
            };
        }

        let group_sums: Vec<f64> = quartets.iter().map(Quartet::score_sum).collect();
        let total: f64 = group_sums.iter().sum();
        let target_average = total / group_sums.len() as f64;
        let absolute_deviations: Vec<f64> = group_sums
            .iter()
            .map(|sum| (sum - target_average).abs())
            .collect();
        let max_sum = group_sums.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let min_sum = group_sums.iter().copied().fold(f64::INFINITY, f64::min);
        let range = max_sum - min_sum;

        let mut objective_value: f64 = absolute_deviations.iter().sum();
        if range_weight > 0.0 {
            objective_value += range_weight * range;
        }

        Self {
            target_average,
            group_sums,
            absolute_deviations,
            range,
            objective_value,
        }
    }
}
