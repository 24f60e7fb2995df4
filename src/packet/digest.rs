//! 执行摘要 digest：outputSummary 的 SHA-256（小写十六进制，64 位）

use std::sync::OnceLock;

use regex::Regex;
use sha2::{Digest, Sha256};

/// outputSummary 去除首尾空白后允许的最大字符数
pub const MAX_OUTPUT_SUMMARY_CHARS: usize = 4000;

static DIGEST_RE: OnceLock<Regex> = OnceLock::new();

/// 计算 outputSummary 的确定性 digest（对原文计算，不做 trim）
pub fn compute_execution_digest(output_summary: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(output_summary.as_bytes());
    hex::encode(hasher.finalize())
}

/// digest 是否符合 64 位小写十六进制格式
pub fn is_digest_shaped(value: &str) -> bool {
    let re = DIGEST_RE.get_or_init(|| Regex::new(r"^[a-f0-9]{64}$").unwrap());
    re.is_match(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_is_stable_and_shaped() {
        let a = compute_execution_digest("v20.0.0");
        let b = compute_execution_digest("v20.0.0");
        assert_eq!(a, b);
        assert!(is_digest_shaped(&a));
        assert_ne!(a, compute_execution_digest("v20.0.1"));
    }

    #[test]
    fn test_known_digest() {
        assert_eq!(
            compute_execution_digest(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_digest_shape_rejects_uppercase_and_short() {
        assert!(!is_digest_shaped(&"F".repeat(64)));
        assert!(!is_digest_shaped(&"a".repeat(63)));
        assert!(is_digest_shaped(&"0".repeat(64)));
    }
}
