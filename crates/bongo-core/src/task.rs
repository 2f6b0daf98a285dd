use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("scheduled task '{0}' does not exist")]
    NotFound(String),
    #[error("invalid scheduled task name {0:?}")]
    InvalidName(String),
    #[error("failed to launch the scheduler shell: {0}")]
    Spawn(#[from] io::Error),
    #[error("{action} failed (exit code {code:?}): {stderr}")]
    CommandFailed {
        action: &'static str,
        code: Option<i32>,
        stderr: String,
    },
}

/// Captured result of one shell command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Runs scheduler scripts. Abstracted so tests can script the OS.
pub trait CommandRunner: Send + Sync {
    fn run(&self, script: &str) -> io::Result<CommandOutput>;
}

/// Switches the console to UTF-8 so output does not arrive in the OEM
/// code page.
const UTF8_PREAMBLE: &str = "[Console]::OutputEncoding = [System.Text.Encoding]::UTF8; ";

fn utf8_script(script: &str) -> String {
    format!("{}{}", UTF8_PREAMBLE, script)
}

/// Runs scripts through `powershell -NoProfile -NonInteractive -Command`,
/// with console output forced to UTF-8.
#[derive(Debug, Default, Clone, Copy)]
pub struct PowerShellRunner;

impl CommandRunner for PowerShellRunner {
    fn run(&self, script: &str) -> io::Result<CommandOutput> {
        let script = utf8_script(script);
        let mut cmd = std::process::Command::new("powershell");
        cmd.args(["-NoProfile", "-NonInteractive", "-Command", &script]);

        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            const CREATE_NO_WINDOW: u32 = 0x0800_0000;
            cmd.creation_flags(CREATE_NO_WINDOW);
        }

        let out = cmd.output()?;
        Ok(CommandOutput {
            success: out.status.success(),
            code: out.status.code(),
            stdout: decode_output(&out.stdout),
            stderr: decode_output(&out.stderr),
        })
    }
}

/// Decode console output: BOM if present, else UTF-8. Anything else is a
/// script that failed before the UTF-8 switch; the nearest single-byte page
/// encoding_rs offers is used for it.
pub fn decode_output(bytes: &[u8]) -> String {
    if let Some((enc, bom_len)) = encoding_rs::Encoding::for_bom(bytes) {
        let (text, _) = enc.decode_without_bom_handling(&bytes[bom_len..]);
        return text.into_owned();
    }
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (text, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            text.into_owned()
        }
    }
}

/// Parse `Key : Value` lines as printed by `Format-List`.
/// Lines without a colon are ignored; the first colon splits.
pub fn parse_key_values(text: &str) -> HashMap<String, String> {
    text.lines()
        .filter_map(|line| {
            let (k, v) = line.split_once(':')?;
            let k = k.trim();
            if k.is_empty() {
                return None;
            }
            Some((k.to_string(), v.trim().to_string()))
        })
        .collect()
}

/// PowerShell single-quote characters, including the typographic ones the
/// parser also accepts.
const PS_SINGLE_QUOTES: [char; 5] = ['\'', '\u{2018}', '\u{2019}', '\u{201A}', '\u{201B}'];

/// Render `s` as a verbatim PowerShell string literal. Single-quoted
/// strings do no `$` or backtick expansion; embedded quotes are doubled.
pub fn ps_quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        if PS_SINGLE_QUOTES.contains(&c) {
            out.push(c);
        }
        out.push(c);
    }
    out.push('\'');
    out
}

pub fn is_valid_task_name(name: &str) -> bool {
    !name.trim().is_empty() && !name.chars().any(|c| c == '"' || c == '`' || c.is_control())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    Ready,
    Running,
    Disabled,
    Queued,
    Unknown(String),
}

impl TaskState {
    fn parse(s: &str) -> Self {
        match s.trim() {
            "Ready" => TaskState::Ready,
            "Running" => TaskState::Running,
            "Disabled" => TaskState::Disabled,
            "Queued" => TaskState::Queued,
            other => TaskState::Unknown(other.to_string()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, TaskState::Disabled)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskState::Ready => f.write_str("Ready"),
            TaskState::Running => f.write_str("Running"),
            TaskState::Disabled => f.write_str("Disabled"),
            TaskState::Queued => f.write_str("Queued"),
            TaskState::Unknown(s) => f.write_str(s),
        }
    }
}

/// Handle to a named Windows scheduled task.
///
/// A handle can only be obtained for a task that exists at construction.
pub struct ScheduledTask {
    name: String,
    folder: String,
    debug: bool,
    runner: Arc<dyn CommandRunner>,
}

impl fmt::Debug for ScheduledTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("name", &self.name)
            .field("folder", &self.folder)
            .field("debug", &self.debug)
            .finish()
    }
}

impl ScheduledTask {
    pub fn open(name: &str, runner: Arc<dyn CommandRunner>) -> Result<Self, TaskError> {
        if !is_valid_task_name(name) {
            return Err(TaskError::InvalidName(name.to_string()));
        }
        let folder = query_folder(runner.as_ref(), name)?
            .ok_or_else(|| TaskError::NotFound(name.to_string()))?;
        debug!("Found scheduled task {}{}", folder, name);
        Ok(Self {
            name: name.to_string(),
            folder,
            debug: false,
            runner,
        })
    }

    /// Log task commands at info level instead of debug.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Scheduler folder the task lives in, e.g. `\` or `\BongoCat\`.
    pub fn folder(&self) -> &str {
        &self.folder
    }

    pub fn full_path(&self) -> String {
        format!("{}{}", self.folder, self.name)
    }

    /// Re-query the scheduler.
    pub fn exists(&self) -> Result<bool, TaskError> {
        Ok(query_folder(self.runner.as_ref(), &self.name)?.is_some())
    }

    pub fn state(&self) -> Result<TaskState, TaskError> {
        let out = self.runner.run(&format!(
            "Get-ScheduledTask -TaskName {} -TaskPath {} | Format-List TaskPath,State",
            ps_quote(&self.name),
            ps_quote(&self.folder)
        ))?;
        if !out.success {
            return Err(TaskError::NotFound(self.name.clone()));
        }
        let attrs = parse_key_values(&out.stdout);
        Ok(attrs
            .get("State")
            .map(|s| TaskState::parse(s))
            .unwrap_or_else(|| TaskState::Unknown(String::new())))
    }

    /// Enable or disable the task. Failures are logged and returned.
    pub fn set_enabled(&self, enabled: bool) -> Result<(), TaskError> {
        let action = if enabled {
            "Enable-ScheduledTask"
        } else {
            "Disable-ScheduledTask"
        };
        self.log(&format!("{} {}", action, self.full_path()));

        let out = match self.runner.run(&format!(
            "{} -TaskName {} -TaskPath {}",
            action,
            ps_quote(&self.name),
            ps_quote(&self.folder)
        )) {
            Ok(out) => out,
            Err(e) => {
                warn!("{} could not run: {}", action, e);
                return Err(e.into());
            }
        };

        if out.success {
            self.log(&format!(
                "Task {} {}",
                self.full_path(),
                if enabled { "enabled" } else { "disabled" }
            ));
            Ok(())
        } else {
            let stderr = out.stderr.trim().to_string();
            if self.debug {
                warn!("{} failed for {}: {}", action, self.full_path(), stderr);
            } else {
                debug!("{} failed for {}: {}", action, self.full_path(), stderr);
            }
            Err(TaskError::CommandFailed {
                action,
                code: out.code,
                stderr,
            })
        }
    }

    fn log(&self, msg: &str) {
        if self.debug {
            info!("{}", msg);
        } else {
            debug!("{}", msg);
        }
    }
}

/// `Some(folder)` if the task exists, `None` if the scheduler says it does not.
fn query_folder(runner: &dyn CommandRunner, name: &str) -> Result<Option<String>, TaskError> {
    let out = runner.run(&format!("Get-ScheduledTaskInfo -TaskName {}", ps_quote(name)))?;
    if !out.success {
        return Ok(None);
    }
    let attrs = parse_key_values(&out.stdout);
    Ok(Some(
        attrs.get("TaskPath").cloned().unwrap_or_else(|| "\\".to_string()),
    ))
}
