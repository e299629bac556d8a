//! Engine status codes.
//!
//! Every call into the engine that can fail reports one of these codes. The
//! numeric values are part of the engine's ABI and must not be reordered.

use std::fmt;

/// Status code reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Status {
    /// Success.
    Success = 0,
    /// No data, can't proceed.
    NoData = 1,
    /// Not enough memory.
    NoMem = 2,
    /// Device is busy.
    Busy = 3,
    /// Can't find result.
    NotFound = 4,
    /// Bad argument.
    BadArg = 5,
    /// Overflow error.
    Overflow = 6,
    /// The supplied data is invalid.
    BadData = 7,
    /// Error, no details available.
    General = 8,
    /// Late write error.
    LateWrite = 9,
    /// Not implemented error.
    NotImplemented = 10,
    /// Invalid query.
    QueryParsingError = 11,
    /// Anomaly detector doesn't support negative values.
    AnomalyNegVal = 12,
    /// Stale data in sequencer, merge to disk required.
    MergeRequired = 13,
    /// Operation can't be completed because the device was closed.
    Closed = 14,
    /// Timeout detected.
    Timeout = 15,
    /// Retry required.
    Retry = 16,
    /// Access denied.
    Access = 17,
    /// Operation not permitted.
    NotPermitted = 18,
    /// Resource is not available.
    Unavailable = 19,
    /// Query doesn't support high cardinality.
    HighCardinality = 20,
    /// Query doesn't support irregular series.
    RegularExpected = 21,
    /// Function can't handle missing values.
    MissingDataNotSupported = 22,
    /// I/O error.
    Io = 23,
}

impl Status {
    /// Creates a Status from its numeric code.
    pub fn from_code(code: i32) -> Option<Self> {
        let status = match code {
            0 => Self::Success,
            1 => Self::NoData,
            2 => Self::NoMem,
            3 => Self::Busy,
            4 => Self::NotFound,
            5 => Self::BadArg,
            6 => Self::Overflow,
            7 => Self::BadData,
            8 => Self::General,
            9 => Self::LateWrite,
            10 => Self::NotImplemented,
            11 => Self::QueryParsingError,
            12 => Self::AnomalyNegVal,
            13 => Self::MergeRequired,
            14 => Self::Closed,
            15 => Self::Timeout,
            16 => Self::Retry,
            17 => Self::Access,
            18 => Self::NotPermitted,
            19 => Self::Unavailable,
            20 => Self::HighCardinality,
            21 => Self::RegularExpected,
            22 => Self::MissingDataNotSupported,
            23 => Self::Io,
            _ => return None,
        };
        Some(status)
    }

    /// Returns the numeric code.
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Returns true for [`Status::Success`].
    pub fn is_success(self) -> bool {
        self == Self::Success
    }

    /// Human readable description used by the engine.
    pub fn message(self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::NoData => "No data, can't proceed",
            Self::NoMem => "Not enough memory",
            Self::Busy => "Device is busy",
            Self::NotFound => "Can't find result",
            Self::BadArg => "Bad argument",
            Self::Overflow => "Overflow error",
            Self::BadData => "The supplied data is invalid",
            Self::General => "Error, no details available",
            Self::LateWrite => "Late write error",
            Self::NotImplemented => "Not implemented error",
            Self::QueryParsingError => "Invalid query",
            Self::AnomalyNegVal => "Anomaly detector doesn't support negative values",
            Self::MergeRequired => "Stale data in sequencer, merge to disk required",
            Self::Closed => "Operation on device can't be completed because device was closed",
            Self::Timeout => "Timeout detected",
            Self::Retry => "Retry required",
            Self::Access => "Access denied",
            Self::NotPermitted => "Operation not permitted",
            Self::Unavailable => "Resource is not available",
            Self::HighCardinality => "Query doesn't support high cardinality",
            Self::RegularExpected => "Query doesn't support irregular series",
            Self::MissingDataNotSupported => "Function can't handle missing values",
            Self::Io => "I/O error",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message(), self.code())
    }
}
