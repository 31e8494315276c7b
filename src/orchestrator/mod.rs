//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责任务调度与结果汇总，是整个系统的"指挥中心"。
//!
//! ## 层次关系
//!
//! ```text
//! task_orchestrator (TaskKind → RunSummary)
//!     ↓                         ↓
//! producers (PDBS / SAP)    workflow::ReportPipeline (一次报表更新)
//!     ↓                         ↓
//! services (工作日 / 文件 / 提取 / 操作计划)
//!     ↓
//! infrastructure (Workbook / SessionLock / JsExecutor)
//! ```
//!
//! ## 设计原则
//!
//! 1. **后台执行**：每次运行一个后台任务，前端只接收进度与最终结果
//! 2. **向下依赖**：编排层 → workflow / producers → services → infrastructure
//! 3. **无业务逻辑**：只做调度和结果合并

pub mod task_orchestrator;

pub use task_orchestrator::{TaskOrchestrator, SAP_STAGGER};
