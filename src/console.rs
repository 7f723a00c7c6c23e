use std::io::{self, BufRead, IsTerminal, Write};

use owo_colors::{OwoColorize, Style};

/// Terminal-facing side of a session: prompts and status lines.
pub trait Console {
    /// Asks for one line. A blank answer yields `default` when one is given.
    ///
    /// Returns `None` once input is exhausted.
    fn prompt(&mut self, label: &str, default: Option<&str>) -> Option<String>;

    fn info(&mut self, message: &str);

    fn success(&mut self, message: &str);

    fn error(&mut self, message: &str);

    /// Starts an assistant reply; fragments follow on the same line.
    fn assistant_start(&mut self);

    fn fragment(&mut self, text: &str);

    fn assistant_end(&mut self);

    fn assistant(&mut self, content: &str) {
        self.assistant_start();
        self.fragment(content);
        self.assistant_end();
    }
}

/// [`Console`] over stdin/stdout with ANSI colors when attached to a terminal.
pub struct TerminalConsole<R> {
    input: R,
    color: bool,
}

impl TerminalConsole<io::StdinLock<'static>> {
    pub fn stdio() -> Self {
        let color = io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none();
        Self::new(io::stdin().lock(), color)
    }
}

impl<R: BufRead> TerminalConsole<R> {
    pub fn new(input: R, color: bool) -> Self {
        Self { input, color }
    }

    fn paint(&self, text: &str, style: Style) -> String {
        if self.color {
            text.style(style).to_string()
        } else {
            text.to_string()
        }
    }

    fn line(&self, text: &str, style: Style) {
        let mut stdout = io::stdout().lock();
        let _ = writeln!(stdout, "{}", self.paint(text, style));
    }
}

impl<R: BufRead> Console for TerminalConsole<R> {
    fn prompt(&mut self, label: &str, default: Option<&str>) -> Option<String> {
        let shown = match default {
            Some(value) if !value.is_empty() => format!("{label} [{value}]: "),
            _ => format!("{label}: "),
        };
        loop {
            {
                let mut stdout = io::stdout().lock();
                let _ = write!(stdout, "{}", self.paint(&shown, Style::new().yellow()));
                let _ = stdout.flush();
            }

            let mut line = String::new();
            match self.input.read_line(&mut line) {
                Ok(0) => {
                    println!();
                    return None;
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(error = %err, "failed to read from stdin");
                    return None;
                }
            }

            let answer = line.trim_end_matches(['\r', '\n']);
            if !answer.trim().is_empty() {
                return Some(answer.to_string());
            }
            if let Some(value) = default {
                return Some(value.to_string());
            }
        }
    }

    fn info(&mut self, message: &str) {
        self.line(message, Style::new().cyan());
    }

    fn success(&mut self, message: &str) {
        self.line(message, Style::new().green());
    }

    fn error(&mut self, message: &str) {
        self.line(message, Style::new().red());
    }

    fn assistant_start(&mut self) {
        let mut stdout = io::stdout().lock();
        let _ = write!(stdout, "\n{}", self.paint("ASSISTANT: ", Style::new().blue()));
        let _ = stdout.flush();
    }

    fn fragment(&mut self, text: &str) {
        let mut stdout = io::stdout().lock();
        let _ = write!(stdout, "{text}");
        let _ = stdout.flush();
    }

    fn assistant_end(&mut self) {
        println!("\n");
    }
}
