pub mod quartet_planner;

pub use quartet_planner::{PlanError, PlanOptions, QuartetPlanner};
