//! Signal configuration files (`*.scfg`).
//!
//! A small Verilog-flavoured format, one statement per line:
//!
//! ```text
//! parameter SAMPLE_RATE_MHZ = 20.000;
//! parameter VIEWER_ARGS = --rcvar 'fontname_signals Monospace 10';
//! wire[3:0] buttons;
//! add_trigger_condition(posedge buttons[2]);
//! ```

use crate::signal_registry::{RegistryError, SignalRegistry, TriggerCondition};
use crate::waveform::{SampleRate, TraceError};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum SessionFileError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("Line {line}: {source}")]
    Registry {
        line: usize,
        #[source]
        source: RegistryError,
    },

    #[error("Line {line}: {source}")]
    SampleRate {
        line: usize,
        #[source]
        source: TraceError,
    },
}

/// Everything a session file carries.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionConfig {
    pub registry: SignalRegistry,
    pub sample_rate: SampleRate,
    /// Extra command line arguments for the external viewer.
    pub viewer_args: String,
}

fn syntax(line: usize, message: impl Into<String>) -> SessionFileError {
    SessionFileError::Syntax {
        line,
        message: message.into(),
    }
}

/// Splits `name[bit]` into its parts.
fn parse_bit_ref(text: &str, line: usize) -> Result<(&str, usize), SessionFileError> {
    let text = text.trim();
    let open = text
        .find('[')
        .ok_or_else(|| syntax(line, format!("expected name[bit], got '{text}'")))?;
    let bit = text[open + 1..]
        .strip_suffix(']')
        .and_then(|b| b.trim().parse().ok())
        .ok_or_else(|| syntax(line, format!("bad bit index in '{text}'")))?;
    Ok((text[..open].trim(), bit))
}

fn parse_condition(body: &str, line: usize) -> Result<(&str, usize, TriggerCondition), SessionFileError> {
    let body = body.trim();

    if let Some(rest) = body.strip_prefix('!') {
        let (name, bit) = parse_bit_ref(rest, line)?;
        return Ok((name, bit, TriggerCondition::Low));
    }

    let clauses: Vec<&str> = body.split(" or ").map(str::trim).collect();
    match clauses.as_slice() {
        [single] => {
            if let Some(rest) = single.strip_prefix("posedge ") {
                let (name, bit) = parse_bit_ref(rest, line)?;
                Ok((name, bit, TriggerCondition::Rising))
            } else if let Some(rest) = single.strip_prefix("negedge ") {
                let (name, bit) = parse_bit_ref(rest, line)?;
                Ok((name, bit, TriggerCondition::Falling))
            } else {
                let (name, bit) = parse_bit_ref(single, line)?;
                Ok((name, bit, TriggerCondition::High))
            }
        }
        [first, second] => {
            let pos = first.strip_prefix("posedge ");
            let neg = second.strip_prefix("negedge ");
            let (Some(pos), Some(neg)) = (pos, neg) else {
                return Err(syntax(line, "only 'posedge x or negedge x' may be combined"));
            };
            let rising = parse_bit_ref(pos, line)?;
            let falling = parse_bit_ref(neg, line)?;
            if rising != falling {
                return Err(syntax(line, "both edges must name the same bit"));
            }
            Ok((rising.0, rising.1, TriggerCondition::Change))
        }
        _ => Err(syntax(line, format!("unsupported trigger expression '{body}'"))),
    }
}

/// Text of a statement after `keyword`, without the trailing `;`.
fn statement_body<'a>(text: &'a str, keyword: &str, line: usize) -> Result<&'a str, SessionFileError> {
    text[keyword.len()..]
        .trim()
        .strip_suffix(';')
        .ok_or_else(|| syntax(line, "missing ';'"))
}

impl SessionConfig {
    pub fn parse(text: &str) -> Result<Self, SessionFileError> {
        let mut config = Self::default();

        for (index, raw) in text.lines().enumerate() {
            let line = index + 1;
            let statement = raw.trim();
            if statement.is_empty() || statement.starts_with("//") {
                continue;
            }

            let keyword_len = statement
                .find(|c: char| !(c.is_ascii_lowercase() || c == '_'))
                .unwrap_or(statement.len());
            let keyword = &statement[..keyword_len];

            match keyword {
                "parameter" => config.parse_parameter(statement, line)?,
                "wire" => config.parse_wire(statement, line)?,
                "add_trigger_condition" => config.parse_trigger(statement, line)?,
                other => log::warn!("Line {}: unrecognized keyword \"{}\"", line, other),
            }
        }

        log::debug!(
            "Loaded {} signals and {} triggers",
            config.registry.signals().len(),
            config.registry.triggers().len()
        );
        Ok(config)
    }

    fn parse_parameter(&mut self, statement: &str, line: usize) -> Result<(), SessionFileError> {
        let body = statement_body(statement, "parameter", line)?;
        let (name, value) = body
            .split_once('=')
            .ok_or_else(|| syntax(line, "expected 'parameter NAME = VALUE;'"))?;
        let (name, value) = (name.trim(), value.trim());

        match name {
            "SAMPLE_RATE_MHZ" => {
                let mhz: f64 = value
                    .parse()
                    .map_err(|_| syntax(line, format!("bad sample rate '{value}'")))?;
                self.sample_rate = SampleRate::from_mhz(mhz)
                    .map_err(|source| SessionFileError::SampleRate { line, source })?;
            }
            "VIEWER_ARGS" => self.viewer_args = value.to_string(),
            other => log::warn!("Line {}: unrecognized parameter \"{}\"", line, other),
        }
        Ok(())
    }

    fn parse_wire(&mut self, statement: &str, line: usize) -> Result<(), SessionFileError> {
        let body = statement_body(statement, "wire", line)?;
        let (width, name) = if let Some(range) = body.strip_prefix('[') {
            let (range, name) = range
                .split_once(']')
                .ok_or_else(|| syntax(line, "unterminated bit range"))?;
            let max_bit: usize = range
                .strip_suffix(":0")
                .and_then(|m| m.trim().parse().ok())
                .ok_or_else(|| syntax(line, format!("expected [N:0], got [{range}]")))?;
            (max_bit + 1, name.trim())
        } else {
            (1, body.trim())
        };

        self.registry
            .add_signal(name, width)
            .map_err(|source| SessionFileError::Registry { line, source })
    }

    fn parse_trigger(&mut self, statement: &str, line: usize) -> Result<(), SessionFileError> {
        let body = statement_body(statement, "add_trigger_condition", line)?;
        let inner = body
            .trim()
            .strip_prefix('(')
            .and_then(|b| b.strip_suffix(')'))
            .ok_or_else(|| syntax(line, "expected add_trigger_condition( ... );"))?;

        let (name, bit, condition) = parse_condition(inner, line)?;
        self.registry
            .add_trigger(name, bit, condition)
            .map_err(|source| SessionFileError::Registry { line, source })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SessionFileError> {
        let path = path.as_ref();
        log::debug!("Loading signal configuration from {}", path.display());
        Self::parse(&fs::read_to_string(path)?)
    }

    /// Renders the configuration. `DontCare` triggers have no textual form and are skipped.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "parameter SAMPLE_RATE_MHZ = {:.3};", self.sample_rate.mhz());
        let _ = writeln!(out, "parameter VIEWER_ARGS = {};", self.viewer_args);

        for signal in self.registry.signals() {
            let _ = writeln!(out, "wire[{}:0] {};", signal.width - 1, signal.name);
        }

        for trigger in self.registry.triggers() {
            let target = format!("{}[{}]", trigger.signal, trigger.bit);
            let expr = match trigger.condition {
                TriggerCondition::Low => format!("!{target}"),
                TriggerCondition::High => target,
                TriggerCondition::Rising => format!("posedge {target}"),
                TriggerCondition::Falling => format!("negedge {target}"),
                TriggerCondition::Change => format!("posedge {target} or negedge {target}"),
                TriggerCondition::DontCare => continue,
            };
            let _ = writeln!(out, "add_trigger_condition({expr});");
        }
        out
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SessionFileError> {
        let path = path.as_ref();
        log::debug!("Saving signal configuration to {}", path.display());
        fs::write(path, self.render())?;
        Ok(())
    }
}
