//! Centralized command execution with consistent error handling.
//!
//! Every provisioning command goes through [`execute`]. A non-zero exit is
//! always an error: there is no allow-fail mode, and the last lines of
//! stderr are carried in the error so the operator sees why.

use std::collections::VecDeque;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::Command;

use crate::error::{Error, Result};

/// Number of stderr lines kept for [`Error::ProcessFailure`].
pub const STDERR_TAIL_LINES: usize = 20;

/// Shell used for run-as commands and shell-mode scripts.
const SHELL: &str = "/bin/sh";

/// How the command line is interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecMode {
    /// Program plus argument vector, no shell involved.
    Direct { program: String, args: Vec<String> },
    /// A script handed to `sh -c`.
    Shell { script: String },
}

/// What happens to the child's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Drop stdout. Stderr is still kept for the error tail.
    Discard,
    /// Collect stdout and stderr into the [`CommandResult`].
    Capture,
    /// Pass stdout through to the console and echo stderr line by line.
    #[default]
    Stream,
}

/// An immutable description of one command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    mode: ExecMode,
    output: OutputMode,
    run_as: Option<String>,
    current_dir: Option<PathBuf>,
}

impl CommandSpec {
    /// A direct invocation of `program`.
    pub fn new(program: impl AsRef<str>) -> Self {
        Self::from_mode(ExecMode::Direct {
            program: program.as_ref().to_string(),
            args: Vec::new(),
        })
    }

    /// A script interpreted by `/bin/sh -c`.
    pub fn shell(script: impl AsRef<str>) -> Self {
        Self::from_mode(ExecMode::Shell {
            script: script.as_ref().to_string(),
        })
    }

    /// Split a command prefix such as `["pacman", "-q", "--needed"]`.
    ///
    /// Returns `None` for an empty prefix.
    pub fn from_argv<I, S>(argv: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut argv = argv.into_iter();
        let program = argv.next()?;
        Some(Self::new(program).args(argv))
    }

    fn from_mode(mode: ExecMode) -> Self {
        Self {
            mode,
            output: OutputMode::default(),
            run_as: None,
            current_dir: None,
        }
    }

    /// Add a single argument. Ignored in shell mode.
    pub fn arg(mut self, arg: impl AsRef<str>) -> Self {
        if let ExecMode::Direct { args, .. } = &mut self.mode {
            args.push(arg.as_ref().to_string());
        }
        self
    }

    /// Add multiple arguments. Ignored in shell mode.
    pub fn args<I, S>(mut self, new_args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if let ExecMode::Direct { args, .. } = &mut self.mode {
            args.extend(new_args.into_iter().map(|a| a.as_ref().to_string()));
        }
        self
    }

    /// Add a path as an argument.
    pub fn arg_path(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy())
    }

    /// Run the command as `user` through `runuser --login`.
    pub fn run_as(mut self, user: impl AsRef<str>) -> Self {
        self.run_as = Some(user.as_ref().to_string());
        self
    }

    /// Set the working directory.
    pub fn dir(mut self, dir: &Path) -> Self {
        self.current_dir = Some(dir.to_path_buf());
        self
    }

    pub fn output(mut self, output: OutputMode) -> Self {
        self.output = output;
        self
    }

    /// Shorthand for [`OutputMode::Capture`].
    pub fn capture(self) -> Self {
        self.output(OutputMode::Capture)
    }

    pub fn mode(&self) -> &ExecMode {
        &self.mode
    }

    pub fn run_as_user(&self) -> Option<&str> {
        self.run_as.as_deref()
    }

    /// Resolve the spec into the program and argument vector actually spawned.
    ///
    /// Run-as commands become a single script for `runuser`. Direct-mode
    /// arguments are quoted individually, never interpolated raw.
    pub fn argv(&self) -> (String, Vec<String>) {
        match (&self.run_as, &self.mode) {
            (None, ExecMode::Direct { program, args }) => (program.clone(), args.clone()),
            (None, ExecMode::Shell { script }) => {
                (SHELL.to_string(), vec!["-c".to_string(), script.clone()])
            }
            (Some(user), mode) => {
                let body = match mode {
                    ExecMode::Direct { program, args } => std::iter::once(program)
                        .chain(args)
                        .map(|a| shell_quote(a))
                        .collect::<Vec<_>>()
                        .join(" "),
                    ExecMode::Shell { script } => script.clone(),
                };
                let script = match &self.current_dir {
                    Some(dir) => format!("cd {} && {}", shell_quote(&dir.to_string_lossy()), body),
                    None => body,
                };
                (
                    "runuser".to_string(),
                    vec![
                        "--login".to_string(),
                        "--shell".to_string(),
                        SHELL.to_string(),
                        "--command".to_string(),
                        script,
                        user.clone(),
                    ],
                )
            }
        }
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(user) = &self.run_as {
            write!(f, "[{}] ", user)?;
        }
        match &self.mode {
            ExecMode::Direct { program, args } => {
                write!(f, "{}", program)?;
                for arg in args {
                    write!(f, " {}", shell_quote(arg))?;
                }
                Ok(())
            }
            ExecMode::Shell { script } => write!(f, "sh -c {}", shell_quote(script)),
        }
    }
}

/// Result of a command execution.
#[derive(Debug, Clone)]
pub struct CommandResult {
    /// Exit code, or -1 if terminated by signal.
    pub exit_code: i32,
    /// Captured stdout (empty unless [`OutputMode::Capture`]).
    pub stdout: String,
    /// Captured stderr.
    pub stderr: String,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Get stdout, trimmed of whitespace.
    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }

    /// Get stderr, trimmed of whitespace.
    pub fn stderr_trimmed(&self) -> &str {
        self.stderr.trim()
    }
}

/// Run one command to completion.
///
/// # Errors
/// [`Error::Spawn`] if the program cannot be started,
/// [`Error::ProcessFailure`] on any non-zero exit.
pub async fn execute(spec: &CommandSpec) -> Result<CommandResult> {
    let (program, args) = spec.argv();
    let mut cmd = Command::new(&program);
    cmd.args(&args);
    cmd.stdin(Stdio::null());
    cmd.stderr(Stdio::piped());
    cmd.stdout(match spec.output {
        OutputMode::Discard => Stdio::null(),
        OutputMode::Capture => Stdio::piped(),
        OutputMode::Stream => Stdio::inherit(),
    });

    // runuser --login resets the cwd; the cd is part of its script instead.
    if spec.run_as.is_none() {
        if let Some(dir) = &spec.current_dir {
            cmd.current_dir(dir);
        }
    }

    tracing::debug!(command = %spec, "executing");

    let spawn_err = |source| Error::Spawn {
        program: program.clone(),
        source,
    };
    let mut child = cmd.spawn().map_err(spawn_err)?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let forward = spec.output == OutputMode::Stream;

    let (status, stdout, stderr) = tokio::try_join!(
        child.wait(),
        read_all(stdout),
        collect_stderr(stderr, forward),
    )
    .map_err(spawn_err)?;

    let result = CommandResult {
        exit_code: status.code().unwrap_or(-1),
        stdout,
        stderr,
    };

    if !result.success() {
        return Err(Error::ProcessFailure {
            program: spec.to_string(),
            exit_code: result.exit_code,
            stderr_tail: tail_lines(&result.stderr, STDERR_TAIL_LINES),
        });
    }

    Ok(result)
}

/// Run commands strictly in order, stopping at the first failure.
///
/// Commands after the failing one are never started.
pub async fn execute_sequence(specs: &[CommandSpec]) -> Result<()> {
    for spec in specs {
        execute(spec).await?;
    }
    Ok(())
}

async fn read_all<R: AsyncRead + Unpin>(pipe: Option<R>) -> std::io::Result<String> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

async fn collect_stderr<R: AsyncRead + Unpin>(
    pipe: Option<R>,
    forward: bool,
) -> std::io::Result<String> {
    let Some(pipe) = pipe else {
        return Ok(String::new());
    };
    let mut collected = String::new();
    let mut lines = BufReader::new(pipe).lines();
    while let Some(line) = lines.next_line().await? {
        if forward {
            eprintln!("{}", line);
        }
        collected.push_str(&line);
        collected.push('\n');
    }
    Ok(collected)
}

fn tail_lines(text: &str, n: usize) -> String {
    let mut tail = VecDeque::with_capacity(n);
    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        if tail.len() == n {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    tail.into_iter().collect::<Vec<_>>().join("\n")
}

/// Quote a word for a POSIX shell.
///
/// Words made only of safe characters are returned unchanged; everything
/// else is wrapped in single quotes with embedded quotes escaped.
pub fn shell_quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_@%+=:,./-~".contains(c));
    if safe && !word.starts_with('~') {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

/// Check if a program exists in PATH.
///
/// Returns the full path if found, None otherwise.
pub fn which(program: &str) -> Option<String> {
    which::which(program)
        .ok()
        .map(|path| path.display().to_string())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_execute_captures_stdout() {
        let result = execute(&CommandSpec::new("echo").arg("hello").capture())
            .await
            .unwrap();
        assert!(result.success());
        assert_eq!(result.stdout_trimmed(), "hello");
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_process_failure() {
        let err = execute(&CommandSpec::new("false")).await.unwrap_err();
        match err {
            Error::ProcessFailure { exit_code, .. } => assert_eq!(exit_code, 1),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_failure_carries_stderr_tail() {
        let spec = CommandSpec::shell("echo first >&2; echo boom >&2; exit 3").capture();
        let err = execute(&spec).await.unwrap_err();
        match err {
            Error::ProcessFailure {
                exit_code,
                stderr_tail,
                ..
            } => {
                assert_eq!(exit_code, 3);
                assert_eq!(stderr_tail, "first\nboom");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let err = execute(&CommandSpec::new("nonexistent_program_12345"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_shell_mode() {
        let result = execute(&CommandSpec::shell("echo hello && echo world").capture())
            .await
            .unwrap();
        assert!(result.stdout.contains("hello"));
        assert!(result.stdout.contains("world"));
    }

    #[tokio::test]
    async fn test_run_in_directory() {
        let result = execute(&CommandSpec::new("pwd").dir(Path::new("/tmp")).capture())
            .await
            .unwrap();
        assert!(result.stdout_trimmed().contains("tmp"));
    }

    #[tokio::test]
    async fn test_sequence_stops_at_first_failure() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ran");
        let specs = [
            CommandSpec::new("true"),
            CommandSpec::new("false"),
            CommandSpec::new("touch").arg_path(&marker),
        ];

        let err = execute_sequence(&specs).await.unwrap_err();
        assert!(matches!(err, Error::ProcessFailure { .. }));
        assert!(!marker.exists(), "command after the failure must not run");
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("base-devel"), "base-devel");
        assert_eq!(shell_quote("/usr/bin/fish"), "/usr/bin/fish");
        assert_eq!(shell_quote(""), "''");
        assert_eq!(shell_quote("a b"), "'a b'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote("$(reboot)"), "'$(reboot)'");
        assert_eq!(shell_quote("~/.asdf"), "'~/.asdf'");
    }

    #[test]
    fn test_run_as_direct_quotes_every_argument() {
        let spec = CommandSpec::new("paru")
            .args(["-S", "vim; rm -rf /"])
            .run_as("alice");
        let (program, args) = spec.argv();
        assert_eq!(program, "runuser");
        assert_eq!(
            args,
            vec!["--login", "--shell", "/bin/sh", "--command", "paru -S 'vim; rm -rf /'", "alice"]
        );
    }

    #[test]
    fn test_run_as_with_dir_prefixes_cd() {
        let spec = CommandSpec::new("makepkg")
            .arg("-si")
            .dir(Path::new("/tmp/install aur"))
            .run_as("alice");
        let (_, args) = spec.argv();
        assert_eq!(args[4], "cd '/tmp/install aur' && makepkg -si");
    }

    #[test]
    fn test_run_as_shell_keeps_script() {
        let spec = CommandSpec::shell("mkdir -p ~/.config && echo ok").run_as("bob");
        let (_, args) = spec.argv();
        assert_eq!(args[4], "mkdir -p ~/.config && echo ok");
        assert_eq!(args[5], "bob");
    }

    #[test]
    fn test_from_argv() {
        let spec = CommandSpec::from_argv(["pacman", "-q", "--needed"])
            .unwrap()
            .args(["-S", "git"]);
        assert_eq!(spec.to_string(), "pacman -q --needed -S git");
        assert!(CommandSpec::from_argv(Vec::<String>::new()).is_none());
    }

    #[test]
    fn test_tail_lines_keeps_last() {
        let text = (1..=30).map(|i| i.to_string()).collect::<Vec<_>>().join("\n");
        let tail = tail_lines(&text, 3);
        assert_eq!(tail, "28\n29\n30");
    }

    #[test]
    fn test_which() {
        assert!(which("sh").is_some());
        assert!(which("nonexistent_program_12345").is_none());
    }
}
