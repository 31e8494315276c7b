pub mod business_day;
pub mod calc_waiter;
pub mod engine_file;
pub mod extraction;
pub mod file_utils;
pub mod operation_plan;

pub use business_day::{is_business_day, previous_business_day};
pub use calc_waiter::{wait_for_calculations, WaitOutcome};
pub use engine_file::{backup_engine_file, find_engine_file};
pub use extraction::ExtractOutcome;
pub use operation_plan::{build_operations, SOURCE_SHEET};
