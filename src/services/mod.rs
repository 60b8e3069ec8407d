//! Evaluation services.
//!
//! - [`CatalogService`]: projects, test cases and examples
//! - [`DesignService`]: metric proposal and confirmation
//! - [`EvaluationService`]: scoring, commits and run history
//! - [`ReportService`]: run comparisons and project roll-ups
//! - [`DashboardService`]: score series and latest-run summaries
//!
//! All services share storage and the LLM provider via [`ServiceCore`].

mod catalog;
mod core;
mod dashboard;
mod design;
mod evaluation;
mod report;
pub mod scoring;

pub use catalog::*;
pub use core::*;
pub use dashboard::*;
pub use design::*;
pub use evaluation::*;
pub use report::*;
