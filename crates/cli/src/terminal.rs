use anyhow::Result;
use crossterm::{
    execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
};
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};

use rx_agent::RouteResponse;
use rx_tool_runtime::TokenSink;

/// Color scheme for terminal output.
struct Colors;

impl Colors {
    const USER_PROMPT: Color = Color::Green;
    const ASSISTANT_TEXT: Color = Color::Cyan;
    const ERROR: Color = Color::Red;
    const DIM: Color = Color::DarkGrey;
    const HEADER: Color = Color::Magenta;
}

/// Manages terminal I/O for the interactive REPL.
///
/// Also serves as the token sink for streaming agents, so streamed replies
/// appear as they arrive instead of after the turn.
pub struct Terminal {
    /// Set when any token was streamed since the last [`Terminal::reset_stream`].
    streamed: AtomicBool,
}

impl Terminal {
    pub fn new() -> Self {
        Self {
            streamed: AtomicBool::new(false),
        }
    }

    pub fn reset_stream(&self) {
        self.streamed.store(false, Ordering::SeqCst);
    }

    pub fn has_streamed(&self) -> bool {
        self.streamed.load(Ordering::SeqCst)
    }

    /// Print the startup banner.
    pub fn print_banner(&self, profile: &str, model: &str, targets: &[String]) -> Result<()> {
        let mut stdout = io::stdout();
        execute!(
            stdout,
            SetForegroundColor(Colors::HEADER),
            Print("rx"),
            ResetColor,
            Print(" - agent router\n"),
            SetForegroundColor(Colors::DIM),
            Print(format!("Profile: {} | Model: {}\n", profile, model)),
            Print(format!("Agents: {}\n", targets.join(", "))),
            Print("Type 'exit' or 'quit' to end.\n"),
            Print("---\n"),
            ResetColor,
        )?;
        stdout.flush()?;
        Ok(())
    }

    /// Read a line of user input with prompt.
    /// Returns None on EOF or when the user wants to exit.
    pub fn read_input(&self) -> Result<Option<String>> {
        let mut stdout = io::stdout();
        execute!(
            stdout,
            Print("\n"),
            SetForegroundColor(Colors::USER_PROMPT),
            Print("you> "),
            ResetColor,
        )?;
        stdout.flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            return Ok(None);
        }
        Ok(parse_input(&input))
    }

    /// Print a routed reply. Streamed replies were already printed token by token.
    pub fn print_response(&self, response: &RouteResponse) -> Result<()> {
        let mut stdout = io::stdout();
        if self.has_streamed() {
            execute!(stdout, Print("\n"))?;
        } else {
            execute!(
                stdout,
                SetForegroundColor(Colors::ASSISTANT_TEXT),
                Print(format_reply(response)),
                ResetColor,
                Print("\n"),
            )?;
        }
        execute!(
            stdout,
            SetForegroundColor(Colors::DIM),
            Print(format!(
                "({} in {} ms)\n",
                response.agents_used.join(", "),
                response.execution_time_ms
            )),
            ResetColor,
        )?;
        stdout.flush()?;
        Ok(())
    }

    /// Print an error message.
    pub fn print_error(&self, msg: &str) -> Result<()> {
        let mut stdout = io::stdout();
        execute!(
            stdout,
            SetForegroundColor(Colors::ERROR),
            Print(format!("Error: {}\n", msg)),
            ResetColor,
        )?;
        stdout.flush()?;
        Ok(())
    }

    /// Print an info message.
    pub fn print_info(&self, msg: &str) -> Result<()> {
        let mut stdout = io::stdout();
        execute!(
            stdout,
            SetForegroundColor(Colors::DIM),
            Print(format!("{}\n", msg)),
            ResetColor,
        )?;
        stdout.flush()?;
        Ok(())
    }
}

impl TokenSink for Terminal {
    fn on_token(&self, _agent: &str, token: &str) {
        self.streamed.store(true, Ordering::SeqCst);
        let mut stdout = io::stdout();
        // A broken stdout must not abort the turn.
        execute!(
            stdout,
            SetForegroundColor(Colors::ASSISTANT_TEXT),
            Print(token),
            ResetColor,
        )
        .ok();
        stdout.flush().ok();
    }
}

/// `None` for exit commands, otherwise the trimmed line (possibly empty).
fn parse_input(line: &str) -> Option<String> {
    let trimmed = line.trim();
    match trimmed {
        "exit" | "quit" | "/exit" | "/quit" => None,
        _ => Some(trimmed.to_string()),
    }
}

fn format_reply(response: &RouteResponse) -> String {
    format!("[{}] {}", response.agent_name, response.output)
}
