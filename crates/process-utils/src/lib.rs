//! Helpers for spawning the external tools the pipeline drives
//! (ffmpeg, ffprobe, processor and content-filter commands).

use std::ffi::OsStr;
use std::process::ExitStatus;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Apply the Windows `CREATE_NO_WINDOW` flag to child processes.
///
/// On non-Windows targets this is a no-op.
pub trait NoWindowExt {
    fn no_window(&mut self);
}

impl NoWindowExt for std::process::Command {
    fn no_window(&mut self) {
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            self.creation_flags(CREATE_NO_WINDOW);
        }
    }
}

#[cfg(feature = "tokio")]
impl NoWindowExt for tokio::process::Command {
    fn no_window(&mut self) {
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            self.as_std_mut().creation_flags(CREATE_NO_WINDOW);
        }
    }
}

/// Create a `tokio::process::Command` for a headless tool invocation.
///
/// The child gets no window on Windows, a null stdin, piped stdout/stderr,
/// the `C` locale (so numeric output parses the same everywhere) and is
/// killed when the handle is dropped.
#[cfg(feature = "tokio")]
pub fn tool_command(program: impl AsRef<OsStr>) -> tokio::process::Command {
    use std::process::Stdio;

    let mut cmd = tokio::process::Command::new(program);
    cmd.no_window();
    cmd.env("LC_ALL", "C")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    cmd
}

/// Render a program and its arguments as a single loggable line.
///
/// Arguments containing whitespace are quoted. The result is for humans,
/// not for re-parsing by a shell.
pub fn command_line<I, S>(program: impl AsRef<OsStr>, args: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut line = program.as_ref().to_string_lossy().into_owned();
    for arg in args {
        let arg = arg.as_ref().to_string_lossy();
        line.push(' ');
        if arg.is_empty() || arg.chars().any(char::is_whitespace) {
            line.push('"');
            line.push_str(&arg);
            line.push('"');
        } else {
            line.push_str(&arg);
        }
    }
    line
}

/// Describe how a process exited, e.g. `exit code 1` or `terminated by signal`.
pub fn describe_exit(status: &ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exit code {code}"),
        None => "terminated by signal".to_string(),
    }
}
