use crate::error::JudgeError;
use crate::rules;

/// Maximum accepted submission size in bytes.
pub const MAX_SOURCE_BYTES: usize = 50 * 1024;

/// Statically screens a submission before any process is spawned.
///
/// This is a pure function over the source text. It enforces the size
/// ceiling and, unless `allow_restricted` is set, rejects the first
/// denylisted instruction pattern it finds. An empty or whitespace-only
/// source passes screening; the assembler rejects it downstream with a
/// proper diagnostic.
pub fn screen(source: &str, allow_restricted: bool) -> Result<(), JudgeError> {
    if source.len() > MAX_SOURCE_BYTES {
        return Err(JudgeError::CodeTooLarge {
            actual: source.len(),
            limit: MAX_SOURCE_BYTES,
        });
    }

    if !allow_restricted {
        if let Some(rule) = rules::find_violation(source) {
            return Err(JudgeError::DisallowedInstruction {
                pattern: rule.pattern,
                message: rule.message,
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oversized_source_rejected() {
        let big = "nop\n".repeat(MAX_SOURCE_BYTES);
        match screen(&big, false) {
            Err(JudgeError::CodeTooLarge { actual, limit }) => {
                assert!(actual > limit);
            }
            other => panic!("expected CodeTooLarge, got {other:?}"),
        }
    }

    #[test]
    fn test_denylisted_instruction_rejected() {
        let err = screen("    hlt\n", false).unwrap_err();
        assert!(err.is_security_violation());
        match err {
            JudgeError::DisallowedInstruction { pattern, .. } => assert_eq!(pattern, "hlt"),
            other => panic!("expected DisallowedInstruction, got {other:?}"),
        }
    }

    #[test]
    fn test_allow_restricted_bypasses_denylist() {
        assert!(screen("    hlt\n", true).is_ok());
        // The size ceiling still applies.
        let big = "nop\n".repeat(MAX_SOURCE_BYTES);
        assert!(screen(&big, true).is_err());
    }

    #[test]
    fn test_empty_source_passes_screening() {
        assert!(screen("", false).is_ok());
        assert!(screen("   \n\t\n", false).is_ok());
    }
}
