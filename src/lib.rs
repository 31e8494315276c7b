//! # AMS Orders
//!
//! 每日订单报表自动化：从 PDBS 门户和 SAP 下载数据，刷新并更新 Excel 报表工作簿
//!
//! ## 架构设计
//!
//! 本系统采用四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有外部资源，只暴露能力
//! - `Workbook` / `SpreadsheetEngine` - 电子表格引擎抽象（`MemoryWorkbook`、`SnapshotEngine`）
//! - `SessionLock` - 进程内唯一的外部会话锁
//! - `JsExecutor` - 门户页面的脚本执行
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"
//! - `business_day` - 工作日计算
//! - `calc_waiter` - 异步计算等待
//! - `extraction` - A–F 六种提取模式
//! - `operation_plan` - 固定的 19 个操作
//! - `engine_file` / `file_utils` - 工作簿查找备份、下载目录管理
//!
//! ### ③ 流程层（Workflow / Producers）
//! - `workflow::ReportPipeline` - 一次报表更新的完整流程
//! - `producers/` - PDBS 与 SAP 两个下载生产者
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator::TaskOrchestrator` - 单任务与组合任务调度，汇总最终结果
//!
//! ## 模块结构

pub mod browser;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod logger;
pub mod models;
pub mod orchestrator;
pub mod producers;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult};
pub use infrastructure::{SessionLock, SnapshotEngine, SpreadsheetEngine, Workbook};
pub use models::{ProgressSink, RunCredentials, RunState, RunSummary, TaskKind, UiEvent};
pub use orchestrator::TaskOrchestrator;
pub use producers::{DownloadProducer, PdbsProducer, SapProducer};
pub use workflow::{PipelineReport, ReportPipeline, ReportTask};
