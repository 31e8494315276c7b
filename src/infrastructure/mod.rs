pub mod js_executor;
pub mod memory_workbook;
pub mod session_lock;
pub mod snapshot_engine;
pub mod workbook;
pub mod xls_convert;

pub use js_executor::JsExecutor;
pub use memory_workbook::{MemoryPivot, MemorySheet, MemoryTable, MemoryWorkbook};
pub use session_lock::{SessionGuard, SessionLock, DEFAULT_LOCK_TIMEOUT};
pub use snapshot_engine::SnapshotEngine;
pub use workbook::{CalculationHandle, CalculationState, PivotRegion, SpreadsheetEngine, Workbook};
