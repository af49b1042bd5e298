// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 medflow contributors

//! Output sentinels of the remote tooling
//!
//! Every remote outcome is read from plain substrings of ssh and scp output,
//! or from the exit marker the supervisor appends. An OpenSSH release that
//! rewords these messages breaks state detection without any error.

use crate::process::exit_marker;

/// Printed by the initialization commands once the shell is usable
pub const CONNECTION_ESTABLISHED: &str = "Festive Connection Established!";
/// scp message when an upload drops
pub const LOST_CONNECTION: &str = "lost connection";
/// scp message when a download source is missing
pub const NO_SUCH_FILE: &str = "No such file or directory";

/// What the log says about an operation so far
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Succeeded,
    Failed,
    Pending,
}

/// Success and failure substrings of one remote operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sentinels {
    pub success: String,
    pub failure: String,
}

impl Sentinels {
    /// The connection sentinel, or the shell exiting
    pub fn connect(shell: &str) -> Self {
        Self {
            success: CONNECTION_ESTABLISHED.into(),
            failure: exit_marker(shell),
        }
    }

    pub fn upload(copy: &str) -> Self {
        Self {
            success: exit_marker(copy),
            failure: LOST_CONNECTION.into(),
        }
    }

    pub fn download(copy: &str) -> Self {
        Self {
            success: exit_marker(copy),
            failure: NO_SUCH_FILE.into(),
        }
    }

    /// Scan `text`. Failure wins when both appear: a failed copy still exits
    /// and leaves its exit marker behind.
    pub fn scan(&self, text: &str) -> Verdict {
        if text.contains(&self.failure) {
            Verdict::Failed
        } else if text.contains(&self.success) {
            Verdict::Succeeded
        } else {
            Verdict::Pending
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_sentinels() {
        let s = Sentinels::connect("ssh");
        assert_eq!(s.scan("Welcome\n"), Verdict::Pending);
        assert_eq!(s.scan("\n\nFestive Connection Established!\n"), Verdict::Succeeded);
        assert_eq!(s.scan("Permission denied\nssh Completed!\n"), Verdict::Failed);
    }

    #[test]
    fn test_failed_download_still_has_exit_marker() {
        let s = Sentinels::download("scp");
        let log = "scp: ~/CEMRG-GPUReconstruction/out.nii: No such file or directory\nscp Completed!\n";
        assert_eq!(s.scan(log), Verdict::Failed);
        assert_eq!(s.scan("scp Completed!\n"), Verdict::Succeeded);
    }

    #[test]
    fn test_upload_lost_connection() {
        let s = Sentinels::upload("scp");
        assert_eq!(s.scan("lost connection\n"), Verdict::Failed);
        assert_eq!(s.scan("Transfer 100%\n"), Verdict::Pending);
    }
}
