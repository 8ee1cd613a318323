use std::path::Path;
use std::process::{Command, Output};

/// Builds a command that runs `command_str` through the host shell.
pub fn shell_command(command_str: &str, cwd: &Path) -> Command {
    let mut cmd = if cfg!(windows) {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", command_str]);
        cmd
    } else {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", command_str]);
        cmd
    };
    cmd.current_dir(cwd);
    cmd
}

/// Short human-readable reason for a failed process.
pub fn describe_failure(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    let status = match output.status.code() {
        Some(code) => format!("exit code {}", code),
        None => "terminated by signal".to_string(),
    };
    if stderr.is_empty() {
        status
    } else {
        // Last line usually carries the actual error
        let last = stderr.lines().last().unwrap_or(stderr);
        format!("{}: {}", status, last)
    }
}

/// Quotes a path for interpolation into a shell command line.
pub fn shell_quote(path: &Path) -> String {
    let raw = path.to_string_lossy();
    if !raw.chars().any(|c| c.is_whitespace() || "'\"$`&;|<>()".contains(c)) {
        return raw.into_owned();
    }
    if cfg!(windows) {
        format!("\"{}\"", raw)
    } else {
        format!("'{}'", raw.replace('\'', r"'\''"))
    }
}
