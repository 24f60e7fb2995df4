//! 审计 receipt：类型定义与落点（tracing / 内存 / JSONL）

pub mod sink;
pub mod types;

pub use sink::{JsonlReceiptSink, MemoryReceiptSink, ReceiptSink, TracingReceiptSink};
pub use types::{
    GuardrailEvent, GuardrailModule, GuardrailOutcome, GuardrailStage, Receipt, ReviewPacket,
};
