pub mod report_pipeline;

pub use report_pipeline::{PipelineReport, PipelineState, ReportPipeline, ReportTask};
