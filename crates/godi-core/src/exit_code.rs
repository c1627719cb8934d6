//! Process exit codes for a finished run.
//!
//! Mirrors, at a much smaller scale, how upstream rsync's `errcode.h` maps
//! transfer outcomes onto exit statuses: callers should never invent ad hoc
//! integers, they should go through this enum.

/// Exit code returned by a completed `seal`, `sealed-copy`, or `verify` run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ExitCode {
    /// No errors, not cancelled.
    Ok = 0,
    /// Command-line usage error.
    Usage = 1,
    /// A source or destination tree could not be selected or read.
    FileSelect = 3,
    /// The run was cancelled before completion.
    Cancelled = 20,
    /// The run completed but one or more files reported an error.
    PartialError = 23,
}

impl ExitCode {
    /// Returns the raw `i32` process exit status.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    /// Derives the exit code from a run's error count and cancellation flag.
    #[must_use]
    pub const fn from_outcome(error_count: u64, cancelled: bool) -> Self {
        if cancelled {
            Self::Cancelled
        } else if error_count > 0 {
            Self::PartialError
        } else {
            Self::Ok
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_run_is_ok() {
        assert_eq!(ExitCode::from_outcome(0, false), ExitCode::Ok);
    }

    #[test]
    fn errors_outrank_success() {
        assert_eq!(ExitCode::from_outcome(2, false), ExitCode::PartialError);
    }

    #[test]
    fn cancellation_outranks_errors() {
        assert_eq!(ExitCode::from_outcome(1, true), ExitCode::Cancelled);
    }
}
