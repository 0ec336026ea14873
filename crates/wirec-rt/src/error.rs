use thiserror::Error;

/// Data-format errors raised by generated `decode` routines.
///
/// Every variant names the member (or collection) that triggered it so a
/// payload failure can be traced without re-running the decoder.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("unexpected end of input reading {what}: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEof {
        what: &'static str,
        needed: usize,
        remaining: usize,
    },

    #[error("member {field} is not valid UTF-8")]
    InvalidText { field: &'static str },

    #[error("unknown tag {tag} for polymorphic member {member}")]
    UnknownTag { member: &'static str, tag: i64 },

    #[error("unknown value {value} for enum {name}")]
    UnknownEnumValue { name: &'static str, value: i64 },

    #[error("negative count {count} for collection {member}")]
    NegativeCount { member: &'static str, count: i64 },
}

/// Invalid-operation errors raised by generated `encode` routines.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EncodeError {
    #[error("collection {member} must have exactly {expected} elements but has {actual}")]
    FixedCountMismatch {
        member: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("collection {member} element {index} does not match the sequence's leading variant")]
    HeterogeneousSequence { member: &'static str, index: usize },

    #[error("collection {member} has {count} elements, more than its count field can carry (max {max})")]
    CountOverflow {
        member: &'static str,
        count: usize,
        max: u64,
    },
}
