//! Interactive terminal pieces: line editing, colors and the wait spinner.

use std::io::Write;

use colored::*;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use spinners::{Spinner, Spinners};

use super::{Labels, LineReader, Progress};
use crate::error::LLMError;

/// Reads operator input through rustyline, keeping sent lines in history.
pub struct EditorReader {
    editor: DefaultEditor,
}

impl EditorReader {
    pub fn new() -> Result<Self, LLMError> {
        let editor = DefaultEditor::new()
            .map_err(|e| LLMError::IoError(format!("Failed to start line editor: {e}")))?;
        Ok(Self { editor })
    }
}

impl LineReader for EditorReader {
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>, LLMError> {
        match self.editor.readline(prompt) {
            Ok(line) => Ok(Some(line)),
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => Ok(None),
            Err(err) => Err(LLMError::IoError(format!("{err:?}"))),
        }
    }

    fn remember(&mut self, line: &str) {
        let _ = self.editor.add_history_entry(line);
    }
}

/// Labels with ANSI colors. The prompt stays plain so the editor can
/// measure it.
pub fn colored_labels() -> Labels {
    Labels {
        user: "You: ".to_string(),
        assistant: format!("{} ", "Assistant:".bright_green()),
        error: format!("{} ", "Error:".bright_red()),
        farewell: "Goodbye!".bright_cyan().to_string(),
    }
}

/// "Thinking..." spinner shown until the provider answers.
#[derive(Default)]
pub struct SpinnerProgress {
    spinner: Option<Spinner>,
}

impl SpinnerProgress {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Progress for SpinnerProgress {
    fn start(&mut self) {
        self.spinner = Some(Spinner::new(
            Spinners::Dots12,
            "Thinking...".bright_magenta().to_string(),
        ));
    }

    fn stop(&mut self) {
        if let Some(mut sp) = self.spinner.take() {
            sp.stop();
            print!("\r\x1B[K");
            let _ = std::io::stdout().flush();
        }
    }
}
