//! Shell completions generation.

use clap::CommandFactory;
use clap_complete::Shell;

use crate::cli::args::Cli;
use crate::error::SyncqError;

/// Generate the completion script for `shell`.
///
/// # Errors
///
/// Returns an error if the generated script is not valid UTF-8.
pub fn completions(shell: Shell) -> Result<String, SyncqError> {
    let mut cmd = Cli::command();
    let mut buf = Vec::new();
    clap_complete::generate(shell, &mut cmd, "syncq", &mut buf);
    String::from_utf8(buf).map_err(|e| SyncqError::Config(format!("UTF-8 error: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_bash() {
        let script = completions(Shell::Bash).unwrap();
        assert!(script.contains("syncq"));
        assert!(script.contains("drain"));
    }

    #[test]
    fn test_generate_fish() {
        assert!(!completions(Shell::Fish).unwrap().is_empty());
    }
}
