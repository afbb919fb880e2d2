//! The interaction loop.
//!
//! Each iteration reads one line, classifies it, and either stops, skips, or
//! sends exactly one [`ConversationTurn`]. A failed turn is printed and the
//! loop keeps going; only console I/O failures end [`ChatLoop::run`] early.

use std::io::{BufRead, Write};

use futures::StreamExt;

use crate::{chat::ConversationTurn, config::SessionConfig, error::LLMError, session::Session};

#[cfg(feature = "cli")]
pub mod terminal;

/// What the operator asked for with one line of input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `quit` or `exit`, any case
    Quit,
    /// Nothing but whitespace
    Skip,
    /// Trimmed text to send as the user message
    Send(String),
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        if trimmed.eq_ignore_ascii_case("quit") || trimmed.eq_ignore_ascii_case("exit") {
            Command::Quit
        } else if trimmed.is_empty() {
            Command::Skip
        } else {
            Command::Send(trimmed.to_string())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    AwaitingInput,
    Terminated,
}

/// How a single submitted turn ended.
#[derive(Debug)]
pub enum TurnOutcome {
    /// The full reply text that was printed
    Replied(String),
    /// The reason the turn failed; already reported to the operator
    Failed(LLMError),
}

impl TurnOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, TurnOutcome::Failed(_))
    }
}

/// Source of operator input.
pub trait LineReader {
    /// Shows `prompt` and reads one line. `Ok(None)` means the input was
    /// closed (end of file or interrupt).
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>, LLMError>;

    /// Called with every line that was sent as a turn.
    fn remember(&mut self, _line: &str) {}
}

/// Line reader over any buffered input, writing prompts to `prompt_out`.
pub struct PlainReader<R, W> {
    input: R,
    prompt_out: W,
}

impl<R: BufRead, W: Write> PlainReader<R, W> {
    pub fn new(input: R, prompt_out: W) -> Self {
        Self { input, prompt_out }
    }
}

impl<R: BufRead, W: Write> LineReader for PlainReader<R, W> {
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>, LLMError> {
        write!(self.prompt_out, "{prompt}")?;
        self.prompt_out.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line))
    }
}

/// Fixed console labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Labels {
    pub user: String,
    pub assistant: String,
    pub error: String,
    pub farewell: String,
}

impl Default for Labels {
    fn default() -> Self {
        Self {
            user: "You: ".to_string(),
            assistant: "Assistant: ".to_string(),
            error: "Error: ".to_string(),
            farewell: "Goodbye!".to_string(),
        }
    }
}

/// Feedback shown while waiting on the provider.
pub trait Progress {
    fn start(&mut self) {}
    fn stop(&mut self) {}
}

/// No feedback at all.
pub struct Silent;

impl Progress for Silent {}

/// Prints the greeting shown before the first prompt.
pub fn write_banner<W: Write>(out: &mut W) -> Result<(), LLMError> {
    writeln!(out, "\nWelcome to the Simple Console Chatbot!")?;
    writeln!(out, "Type 'quit' or 'exit' to end the conversation")?;
    writeln!(out, "{}", "-".repeat(50))?;
    out.flush()?;
    Ok(())
}

/// Builds the session from a resolved configuration and greets the operator.
///
/// A missing credential is reported on `out` and gives `Ok(None)`; the loop
/// must not be entered then. Any other configuration error is returned.
pub fn start_session<W: Write>(
    config: Result<SessionConfig, LLMError>,
    out: &mut W,
) -> Result<Option<Session>, LLMError> {
    let config = match config {
        Ok(config) => config,
        Err(e @ LLMError::AbsentCredential(_)) => {
            writeln!(out, "Error: {e}")?;
            out.flush()?;
            return Ok(None);
        }
        Err(e) => return Err(e),
    };
    let session = Session::new(config)?;
    write_banner(out)?;
    Ok(Some(session))
}

pub struct ChatLoop {
    session: Session,
    labels: Labels,
    progress: Box<dyn Progress>,
    state: LoopState,
    turns_sent: usize,
}

impl ChatLoop {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            labels: Labels::default(),
            progress: Box::new(Silent),
            state: LoopState::AwaitingInput,
            turns_sent: 0,
        }
    }

    pub fn labels(mut self, labels: Labels) -> Self {
        self.labels = labels;
        self
    }

    pub fn progress(mut self, progress: Box<dyn Progress>) -> Self {
        self.progress = progress;
        self
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Number of turns submitted to the provider so far.
    pub fn turns_sent(&self) -> usize {
        self.turns_sent
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Runs until the operator quits or closes the input.
    pub async fn run<R, W>(&mut self, input: &mut R, out: &mut W) -> Result<(), LLMError>
    where
        R: LineReader,
        W: Write,
    {
        while self.state == LoopState::AwaitingInput {
            self.step(input, out).await?;
        }
        Ok(())
    }

    /// Reads and handles a single line.
    pub async fn step<R, W>(&mut self, input: &mut R, out: &mut W) -> Result<LoopState, LLMError>
    where
        R: LineReader,
        W: Write,
    {
        if self.state == LoopState::Terminated {
            return Ok(self.state);
        }

        writeln!(out)?;
        out.flush()?;
        let Some(line) = input.read_line(&self.labels.user)? else {
            return self.terminate(out);
        };

        match Command::parse(&line) {
            Command::Quit => self.terminate(out),
            Command::Skip => Ok(self.state),
            Command::Send(message) => {
                input.remember(&message);
                let turn = self.session.turn(message);
                self.submit(&turn, out).await?;
                Ok(self.state)
            }
        }
    }

    /// Sends one turn, prints the reply or the failure, and reports which it was.
    pub async fn submit<W: Write>(
        &mut self,
        turn: &ConversationTurn,
        out: &mut W,
    ) -> Result<TurnOutcome, LLMError> {
        self.turns_sent += 1;
        log::debug!("submitting turn {}", self.turns_sent);

        let outcome = if self.session.config().stream {
            self.stream_reply(turn, out).await?
        } else {
            self.complete_reply(turn, out).await?
        };

        if let TurnOutcome::Failed(e) = &outcome {
            log::warn!("turn {} failed: {e}", self.turns_sent);
            writeln!(out, "\n{}{e}", self.labels.error)?;
        }
        out.flush()?;
        Ok(outcome)
    }

    async fn complete_reply<W: Write>(
        &mut self,
        turn: &ConversationTurn,
        out: &mut W,
    ) -> Result<TurnOutcome, LLMError> {
        self.progress.start();
        let result = self.session.complete(turn).await;
        self.progress.stop();

        match result {
            Ok(text) => {
                writeln!(out, "\n{}{text}", self.labels.assistant)?;
                Ok(TurnOutcome::Replied(text))
            }
            Err(e) => Ok(TurnOutcome::Failed(e)),
        }
    }

    async fn stream_reply<W: Write>(
        &mut self,
        turn: &ConversationTurn,
        out: &mut W,
    ) -> Result<TurnOutcome, LLMError> {
        self.progress.start();
        let opened = self.session.stream(turn).await;
        self.progress.stop();

        let mut stream = match opened {
            Ok(stream) => stream,
            Err(e) => return Ok(TurnOutcome::Failed(e)),
        };

        write!(out, "\n{}", self.labels.assistant)?;
        out.flush()?;
        let mut reply = String::new();
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(text) => {
                    write!(out, "{text}")?;
                    out.flush()?;
                    reply.push_str(&text);
                }
                Err(e) => {
                    writeln!(out)?;
                    return Ok(TurnOutcome::Failed(e));
                }
            }
        }
        writeln!(out)?;
        Ok(TurnOutcome::Replied(reply))
    }

    fn terminate<W: Write>(&mut self, out: &mut W) -> Result<LoopState, LLMError> {
        writeln!(out, "\n{}", self.labels.farewell)?;
        out.flush()?;
        self.state = LoopState::Terminated;
        Ok(self.state)
    }
}
