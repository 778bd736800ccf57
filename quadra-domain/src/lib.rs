#![warn(clippy::uninlined_format_args)]

pub mod model;
pub mod services;

pub use model::{
    Category, Participant, ParticipantId, PlacedMember, PlannedQuartet, QuartetMetrics,
    QuartetPlan,
};
pub use services::{PlanError, PlanOptions, QuartetPlanner};
