pub mod executor;
pub mod planner;
pub mod reviewer;

pub use executor::{PlanOutput, PlanPipeline};
pub use planner::{generate_default_plan, PlanGenerator};
pub use reviewer::PlanReviewer;
