//! Interactive input used by login, `sudo`, `ssh` and the user commands.

use std::collections::VecDeque;

/// Source of interactive answers. `None` means input was closed.
pub trait Prompt {
    fn read_line(&mut self, prompt: &str) -> Option<String>;

    /// Read without echo.
    fn read_secret(&mut self, prompt: &str) -> Option<String>;

    fn confirm(&mut self, prompt: &str) -> bool;

    /// Show an out-of-band message, such as a retry notice.
    fn message(&mut self, text: &str);
}

/// Answers queued in advance. Used by tests and scripted sessions.
#[derive(Debug, Default)]
pub struct ScriptedPrompt {
    answers: VecDeque<String>,
    /// Every prompt and message shown, in order.
    pub transcript: Vec<String>,
}

impl ScriptedPrompt {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: answers.into_iter().map(Into::into).collect(),
            transcript: Vec::new(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.answers.len()
    }

    fn next(&mut self, prompt: &str) -> Option<String> {
        self.transcript.push(prompt.to_string());
        self.answers.pop_front()
    }
}

impl Prompt for ScriptedPrompt {
    fn read_line(&mut self, prompt: &str) -> Option<String> {
        self.next(prompt)
    }

    fn read_secret(&mut self, prompt: &str) -> Option<String> {
        self.next(prompt)
    }

    fn confirm(&mut self, prompt: &str) -> bool {
        self.next(prompt)
            .is_some_and(|a| matches!(a.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
    }

    fn message(&mut self, text: &str) {
        self.transcript.push(text.to_string());
    }
}
