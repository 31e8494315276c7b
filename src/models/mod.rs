pub mod cell;
pub mod grid;
pub mod operation;
pub mod progress;
pub mod task;

pub use cell::CellValue;
pub use grid::Grid;
pub use operation::{
    CellRange, ColumnOffset, DateStamp, Operation, OperationKind, Pattern, PivotRef, TableRef,
};
pub use progress::{ProgressEvent, ProgressReporter, ProgressSink, UiEvent};
pub use task::{Credentials, RunCredentials, RunState, RunSummary, TaskKind, TaskOutcome};
