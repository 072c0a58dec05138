//! Error types for decoding, encoding and merging row values.

use thiserror::Error;

/// Errors raised by the codec and the merge operator.
///
/// Inconsistent equal-timestamp ties are not errors; the merge engine
/// resolves them deterministically and only counts them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MergeError {
    /// Bytes could not be decoded into a row value.
    #[error("Malformed row value at byte {offset}: {reason}")]
    MalformedInput { offset: usize, reason: &'static str },

    /// A row value exceeds a length limit of the binary format.
    #[error("Row value too large to encode: {0}")]
    Oversized(&'static str),

    /// One fragment handed over by the host failed to decode.
    #[error("Operand {index} rejected: {source}")]
    Operand {
        index: OperandIndex,
        #[source]
        source: Box<MergeError>,
    },
}

impl MergeError {
    pub(crate) fn malformed(offset: usize, reason: &'static str) -> Self {
        MergeError::MalformedInput { offset, reason }
    }

    pub(crate) fn at_operand(self, index: OperandIndex) -> Self {
        MergeError::Operand {
            index,
            source: Box::new(self),
        }
    }

    /// True when the failure was caused by undecodable input bytes.
    pub fn is_malformed(&self) -> bool {
        match self {
            MergeError::MalformedInput { .. } => true,
            MergeError::Oversized(_) => false,
            MergeError::Operand { source, .. } => source.is_malformed(),
        }
    }
}

/// Position of a fragment within one merge call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandIndex {
    /// The existing (base) value of a full merge.
    Existing,
    /// The n-th operand, zero based.
    Operand(usize),
}

impl std::fmt::Display for OperandIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperandIndex::Existing => write!(f, "existing"),
            OperandIndex::Operand(i) => write!(f, "#{i}"),
        }
    }
}
