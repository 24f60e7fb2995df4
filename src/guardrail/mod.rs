//! 护栏层：输入扫描（shield）、看门狗（watchdog）、包校验（logician）
//!
//! 三者互不依赖，由 pipeline 组合使用。

pub mod scanner;
pub mod validator;
pub mod watchdog;

pub use scanner::{assert_safe, scan_untrusted_input, ShieldBlocked, ShieldMatch, ShieldReason, ShieldVerdict};
pub use validator::{
    validate_completion_packet, validate_completion_value, validate_verification_packet,
    validate_verification_value, PacketRejection,
};
pub use watchdog::{
    RestartContext, RestartHook, Watchdog, WatchdogCode, WatchdogError, WatchdogOptions,
    WatchdogSettings,
};
