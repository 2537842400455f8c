// Operator input
// Prompts go through a trait so validation loops can run without a terminal

use std::collections::VecDeque;
use std::io::IsTerminal;
use std::sync::Mutex;

use dialoguer::{Input, Select};

use crate::error::{AuthError, Result};

/// Source of operator input
pub trait Prompter: Send + Sync {
    /// Whether a human can answer prompts
    fn is_interactive(&self) -> bool;

    /// Read one line of text. Empty answers are returned as-is.
    fn input(&self, prompt: &str) -> Result<String>;

    /// Pick one of `items`, returning its zero-based index
    fn select(&self, prompt: &str, items: &[String]) -> Result<usize>;

    /// Show a message to the operator
    fn notify(&self, message: &str);
}

/// Prompts on the attached terminal
#[derive(Debug, Default, Clone)]
pub struct TerminalPrompter;

impl TerminalPrompter {
    fn require_terminal(&self, prompt: &str) -> Result<()> {
        if self.is_interactive() {
            Ok(())
        } else {
            Err(AuthError::NotInteractive(format!(
                "cannot ask \"{prompt}\" without a terminal; run interactively once or pass the value via the config file"
            )))
        }
    }
}

impl Prompter for TerminalPrompter {
    fn is_interactive(&self) -> bool {
        std::io::stdin().is_terminal() && std::io::stderr().is_terminal()
    }

    fn input(&self, prompt: &str) -> Result<String> {
        self.require_terminal(prompt)?;
        let value: String = Input::new()
            .with_prompt(prompt)
            .allow_empty(true)
            .interact_text()
            .map_err(|e| AuthError::Internal(anyhow::anyhow!("Failed to read input: {e}")))?;
        Ok(value.trim().to_string())
    }

    fn select(&self, prompt: &str, items: &[String]) -> Result<usize> {
        self.require_terminal(prompt)?;
        Select::new()
            .with_prompt(prompt)
            .items(items)
            .default(0)
            .interact()
            .map_err(|e| AuthError::Internal(anyhow::anyhow!("Failed to read selection: {e}")))
    }

    fn notify(&self, message: &str) {
        eprintln!("{message}");
    }
}

/// Answers prompts from a fixed script
///
/// Useful for automation and for driving the credential flows in tests.
/// An exhausted script behaves like a detached terminal.
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    interactive: bool,
    answers: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
    messages: Mutex<Vec<String>>,
}

impl ScriptedPrompter {
    /// A prompter that answers with `answers` in order
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            interactive: true,
            answers: Mutex::new(answers.into_iter().map(Into::into).collect()),
            prompts: Mutex::new(Vec::new()),
            messages: Mutex::new(Vec::new()),
        }
    }

    /// A prompter with no terminal attached
    pub fn non_interactive() -> Self {
        Self::default()
    }

    /// Prompts that were asked so far
    pub fn prompts(&self) -> Vec<String> {
        lock(&self.prompts).clone()
    }

    /// Messages shown so far
    pub fn messages(&self) -> Vec<String> {
        lock(&self.messages).clone()
    }

    fn next_answer(&self, prompt: &str) -> Result<String> {
        if !self.interactive {
            return Err(AuthError::NotInteractive(format!(
                "cannot ask \"{prompt}\" without a terminal"
            )));
        }
        lock(&self.prompts).push(prompt.to_string());
        lock(&self.answers).pop_front().ok_or_else(|| {
            AuthError::NotInteractive(format!("no scripted answer left for \"{prompt}\""))
        })
    }
}

impl Prompter for ScriptedPrompter {
    fn is_interactive(&self) -> bool {
        self.interactive
    }

    fn input(&self, prompt: &str) -> Result<String> {
        self.next_answer(prompt)
    }

    fn select(&self, prompt: &str, items: &[String]) -> Result<usize> {
        let answer = self.next_answer(prompt)?;
        answer
            .trim()
            .parse::<usize>()
            .ok()
            .filter(|n| (1..=items.len()).contains(n))
            .map(|n| n - 1)
            .ok_or_else(|| AuthError::InvalidInput(format!("invalid selection: {answer}")))
    }

    fn notify(&self, message: &str) {
        lock(&self.messages).push(message.to_string());
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
