use crate::error::{Result, TopupError};
use serde_json::Value;
use std::io::BufRead;

/// One non-empty script line, parsed as JSON but not yet bound to a command.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptLine {
    pub line: usize,
    pub value: Value,
}

/// Reads a JSON-lines command script.
///
/// Blank lines and lines starting with `#` are skipped. Lines are read lazily,
/// so a long script streams instead of being loaded whole.
pub struct CommandReader<R: BufRead> {
    source: R,
}

impl<R: BufRead> CommandReader<R> {
    pub fn new(source: R) -> Self {
        Self { source }
    }

    pub fn lines(self) -> impl Iterator<Item = Result<ScriptLine>> {
        self.source
            .lines()
            .enumerate()
            .filter_map(|(index, line)| {
                let line_no = index + 1;
                match line {
                    Err(e) => Some(Err(TopupError::from(e))),
                    Ok(text) => {
                        let trimmed = text.trim();
                        if trimmed.is_empty() || trimmed.starts_with('#') {
                            return None;
                        }
                        Some(
                            serde_json::from_str(trimmed)
                                .map(|value| ScriptLine {
                                    line: line_no,
                                    value,
                                })
                                .map_err(|e| {
                                    TopupError::InvalidRequest(format!("line {line_no}: {e}"))
                                }),
                        )
                    }
                }
            })
    }
}
