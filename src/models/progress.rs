//! 进度事件通道
//!
//! 进度不走全局日志处理器，而是作为显式参数传入每个组件。
//! 每条消息都是一个完整的 `String`，并发子任务的输出只会按行交错。

use tokio::sync::mpsc;

/// 发往前端的事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    /// 一行进度文本
    Line(String),
    /// 最终结果
    Finished { success: bool, message: String },
}

/// 进度事件 (百分比, 阶段)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub percent: u8,
    pub stage: String,
}

impl ProgressEvent {
    pub fn line(&self) -> String {
        format!("[{}%] {}", self.percent, self.stage)
    }
}

/// 进度接收端的发送句柄
#[derive(Debug, Clone, Default)]
pub struct ProgressSink {
    tx: Option<mpsc::UnboundedSender<UiEvent>>,
}

impl ProgressSink {
    /// 创建通道
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<UiEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// 丢弃所有事件
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// 发送一行文本
    pub fn line(&self, text: impl Into<String>) {
        self.send(UiEvent::Line(text.into()));
    }

    /// 发送进度事件
    pub fn progress(&self, event: &ProgressEvent) {
        self.line(event.line());
    }

    /// 发送最终结果
    pub fn finished(&self, success: bool, message: impl Into<String>) {
        self.send(UiEvent::Finished {
            success,
            message: message.into(),
        });
    }

    fn send(&self, event: UiEvent) {
        if let Some(tx) = &self.tx {
            // 前端已关闭时丢弃
            let _ = tx.send(event);
        }
    }
}

/// 单次流水线运行内的进度报告器，保证百分比单调不减
#[derive(Debug)]
pub struct ProgressReporter {
    sink: ProgressSink,
    last_percent: u8,
}

impl ProgressReporter {
    pub fn new(sink: ProgressSink) -> Self {
        Self {
            sink,
            last_percent: 0,
        }
    }

    pub fn emit(&mut self, percent: u8, stage: impl Into<String>) -> ProgressEvent {
        let percent = percent.min(100).max(self.last_percent);
        self.last_percent = percent;
        let event = ProgressEvent {
            percent,
            stage: stage.into(),
        };
        tracing::info!("{}", event.line());
        self.sink.progress(&event);
        event
    }
}
