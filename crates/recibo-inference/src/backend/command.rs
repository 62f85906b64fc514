//! Backend that runs an external VLM command line per generation.
//!
//! The default argument template targets `python3 -m mlx_vlm.generate`, whose
//! stdout wraps the generated text in `==========` separators and appends
//! `Generation: N tokens, X tokens-per-sec` / `Peak memory: Y GB` lines.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Mutex;
use std::time::Instant;

use tracing::{debug, info};

use crate::error::InferenceError;
use crate::generation::{Generation, GenerationStats};
use crate::{Result, VisionBackend};

/// Bytes of stderr kept in failure messages.
const STDERR_TAIL: usize = 512;

/// How to launch the model runtime.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// Model identifier substituted for `{model}`.
    pub model_id: String,
    /// Program to execute (absolute path or name looked up in `PATH`).
    pub program: String,
    /// Argument template. `{model}`, `{image}`, `{prompt}` and `{max_tokens}`
    /// are replaced on every call.
    pub args: Vec<String>,
    /// Arguments for a check run once by [`CommandBackend::load`]; only
    /// `{model}` is replaced. Empty skips the check.
    pub load_args: Vec<String>,
}

/// Backend driving a command-line model runtime.
pub struct CommandBackend {
    spec: CommandSpec,
    program: PathBuf,
    /// The runtime is not assumed to tolerate concurrent invocations.
    gate: Mutex<()>,
}

impl CommandBackend {
    /// Resolve the program and run the load check.
    ///
    /// The backend is only returned once the runtime has shown it can load
    /// the model, so a broken install never reports ready.
    pub fn load(spec: CommandSpec) -> Result<Self> {
        let program = resolve_program(&spec.program).ok_or_else(|| {
            InferenceError::ModelLoad(format!("program not found: {}", spec.program))
        })?;

        info!(
            "Using {} for model {}",
            program.display(),
            spec.model_id
        );

        if !spec.load_args.is_empty() {
            let vars = [("model", spec.model_id.as_str())];
            let args: Vec<OsString> = spec
                .load_args
                .iter()
                .map(|arg| OsString::from(render(arg, &vars)))
                .collect();

            debug!("Checking model load with {} args", args.len());
            let output = Command::new(&program)
                .args(&args)
                .stdin(Stdio::null())
                .output()
                .map_err(|e| {
                    InferenceError::ModelLoad(format!("failed to run {}: {}", spec.program, e))
                })?;

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(InferenceError::ModelLoad(format!(
                    "load check for {} exited with {}: {}",
                    spec.model_id,
                    output.status,
                    tail(stderr.trim(), STDERR_TAIL)
                )));
            }
        }

        Ok(Self {
            spec,
            program,
            gate: Mutex::new(()),
        })
    }

    fn render_args(&self, image: &Path, prompt: &str, max_tokens: u32) -> Vec<OsString> {
        let image = image.to_string_lossy();
        let max_tokens = max_tokens.to_string();
        let vars = [
            ("model", self.spec.model_id.as_str()),
            ("image", image.as_ref()),
            ("prompt", prompt),
            ("max_tokens", max_tokens.as_str()),
        ];

        self.spec
            .args
            .iter()
            .map(|arg| OsString::from(render(arg, &vars)))
            .collect()
    }
}

impl VisionBackend for CommandBackend {
    fn generate(&self, image: &Path, prompt: &str, max_tokens: u32) -> Result<Generation> {
        let _guard = self.gate.lock().unwrap_or_else(|e| e.into_inner());

        let args = self.render_args(image, prompt, max_tokens);
        debug!("Running {} with {} args", self.program.display(), args.len());

        let start = Instant::now();
        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .output()?;
        let elapsed = start.elapsed().as_secs_f64();

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(InferenceError::InferenceFailed(format!(
                "{} exited with {}: {}",
                self.spec.program,
                output.status,
                tail(stderr.trim(), STDERR_TAIL)
            )));
        }

        let stdout = String::from_utf8(output.stdout)
            .map_err(|e| InferenceError::OutputExtraction(e.to_string()))?;

        let split = split_output(&stdout);
        debug!(
            "Generated {} chars in {:.2}s",
            split.text.len(),
            elapsed
        );

        Ok(Generation {
            text: split.text,
            stats: GenerationStats::new(
                elapsed,
                split.tokens_per_second.unwrap_or(0.0),
                split.peak_memory_gb.unwrap_or(0.0),
            ),
        })
    }

    fn model_id(&self) -> &str {
        &self.spec.model_id
    }
}

/// Generated text and runtime statistics recovered from stdout.
#[derive(Debug, Default, PartialEq)]
struct SplitOutput {
    text: String,
    tokens_per_second: Option<f64>,
    peak_memory_gb: Option<f64>,
}

/// Separate the generated text from the runtime's banner and stats lines.
///
/// Only the leading `Files:`/`Prompt:` banner and the trailing stats block
/// are removed; separator lines inside the generated text are kept.
fn split_output(stdout: &str) -> SplitOutput {
    let mut out = SplitOutput::default();
    let lines: Vec<&str> = stdout.lines().collect();

    let mut end = lines.len();
    let mut stats_lines = 0;
    while end > 0 {
        let line = lines[end - 1].trim();
        if line.is_empty() {
            end -= 1;
        } else if record_stat(line, &mut out) {
            stats_lines += 1;
            end -= 1;
        } else {
            break;
        }
    }
    if stats_lines > 0 && end > 0 && is_separator(lines[end - 1].trim()) {
        end -= 1;
    }

    let start = banner_end(&lines[..end]).unwrap_or(0);
    out.text = lines[start..end].join("\n").trim().to_string();
    out
}

/// Index of the first line after a leading `==========` banner that frames
/// the `Files:`/`Prompt:` echo.
fn banner_end(lines: &[&str]) -> Option<usize> {
    let open = lines.iter().position(|l| !l.trim().is_empty())?;
    if !is_separator(lines[open].trim()) {
        return None;
    }

    let close = open + 1 + lines[open + 1..]
        .iter()
        .position(|l| is_separator(l.trim()))?;
    let echoed = lines[open + 1..close].iter().any(|l| {
        let l = l.trim_start();
        l.starts_with("Files:") || l.starts_with("Prompt:")
    });
    echoed.then_some(close + 1)
}

/// Record a trailing statistics line. Returns `false` for anything else.
fn record_stat(line: &str, out: &mut SplitOutput) -> bool {
    if let Some(rest) = line.strip_prefix("Generation:") {
        if rest.contains("tokens-per-sec") {
            if out.tokens_per_second.is_none() {
                out.tokens_per_second = number_before(rest, "tokens-per-sec");
            }
            return true;
        }
    }
    if let Some(rest) = line.strip_prefix("Prompt:") {
        return rest.contains("tokens-per-sec");
    }
    if let Some(rest) = line.strip_prefix("Peak memory:") {
        if rest.contains("GB") {
            if out.peak_memory_gb.is_none() {
                out.peak_memory_gb = number_before(rest, "GB");
            }
            return true;
        }
    }
    false
}

fn is_separator(line: &str) -> bool {
    line.len() >= 3 && line.chars().all(|c| c == '=')
}

/// Parse the last number appearing before `unit` in `text`.
fn number_before(text: &str, unit: &str) -> Option<f64> {
    let head = &text[..text.find(unit)?];
    head.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
        .last()?
        .parse()
        .ok()
}

/// Single-pass `{name}` substitution; unknown braces are kept verbatim.
fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;

    'scan: while let Some(open) = rest.find('{') {
        rendered.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        for (name, value) in vars {
            if let Some(tail) = after.strip_prefix(name).and_then(|t| t.strip_prefix('}')) {
                rendered.push_str(value);
                rest = tail;
                continue 'scan;
            }
        }

        rendered.push('{');
        rest = after;
    }

    rendered.push_str(rest);
    rendered
}

fn tail(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut start = text.len() - max;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}

fn resolve_program(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 || candidate.is_absolute() {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }

    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(program))
        .find(|p| p.is_file())
}
