//! Console model for terminal front-ends.
//!
//! Renders exec stream output into lines, edits the local input line and
//! decides which request a keystroke turns into. Nothing here does I/O; a
//! front-end feeds keys and stream messages in and performs the returned
//! [`ConsoleAction`]s.

use std::collections::VecDeque;

use termbridge_core::{ExecutionId, Meta, OutputMessage};

/// Default number of finished lines kept.
pub const DEFAULT_SCROLLBACK: usize = 2000;

const TAB_WIDTH: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Escape {
    None,
    /// Saw ESC.
    Start,
    /// Inside `ESC [ ...`, waiting for the final byte.
    Csi,
    /// Inside `ESC ] ...`, waiting for BEL or ESC.
    Osc,
}

/// Line-oriented view of terminal output.
///
/// Handles `\n`, `\r` (return to column 0 and overwrite) and backspace.
/// ANSI escape sequences are dropped, even when split across chunks.
#[derive(Debug, Clone)]
pub struct Scrollback {
    lines: VecDeque<String>,
    current: Vec<char>,
    column: usize,
    escape: Escape,
    capacity: usize,
}

impl Default for Scrollback {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_SCROLLBACK)
    }
}

impl Scrollback {
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            current: Vec::new(),
            column: 0,
            escape: Escape::None,
            capacity: capacity.max(1),
        }
    }

    /// Append raw output text.
    pub fn push_str(&mut self, text: &str) {
        for c in text.chars() {
            self.push_char(c);
        }
    }

    fn push_char(&mut self, c: char) {
        match self.escape {
            Escape::Start => {
                self.escape = match c {
                    '[' => Escape::Csi,
                    ']' => Escape::Osc,
                    _ => Escape::None,
                };
                return;
            }
            Escape::Csi => {
                if ('\u{40}'..='\u{7e}').contains(&c) {
                    self.escape = Escape::None;
                }
                return;
            }
            Escape::Osc => {
                match c {
                    '\x07' => self.escape = Escape::None,
                    '\x1b' => self.escape = Escape::Start,
                    _ => {}
                }
                return;
            }
            Escape::None => {}
        }

        match c {
            '\x1b' => self.escape = Escape::Start,
            '\n' => self.newline(),
            '\r' => self.column = 0,
            '\x08' => self.column = self.column.saturating_sub(1),
            '\t' => {
                let spaces = TAB_WIDTH - self.column % TAB_WIDTH;
                for _ in 0..spaces {
                    self.put(' ');
                }
            }
            c if c.is_control() => {}
            c => self.put(c),
        }
    }

    fn put(&mut self, c: char) {
        if self.column < self.current.len() {
            self.current[self.column] = c;
        } else {
            self.current.resize(self.column, ' ');
            self.current.push(c);
        }
        self.column += 1;
    }

    fn newline(&mut self) {
        let line: String = self.current.drain(..).collect();
        self.lines.push_back(line);
        self.column = 0;
        while self.lines.len() > self.capacity {
            self.lines.pop_front();
        }
    }

    /// Finish a partial line, if any, so the next text starts on a new line.
    pub fn ensure_line_start(&mut self) {
        if !self.current.is_empty() {
            self.newline();
        }
        self.column = 0;
    }

    /// Finished lines followed by the partial line, if it has content.
    pub fn lines(&self) -> impl Iterator<Item = String> + '_ {
        let partial = (!self.current.is_empty()).then(|| self.current.iter().collect());
        self.lines.iter().cloned().chain(partial)
    }

    /// The partial line currently being written.
    #[must_use]
    pub fn partial(&self) -> String {
        self.current.iter().collect()
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.current.clear();
        self.column = 0;
        self.escape = Escape::None;
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len() + usize::from(!self.current.is_empty())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Single-line input editor with history.
#[derive(Debug, Clone, Default)]
pub struct LineEditor {
    buffer: Vec<char>,
    cursor: usize,
    history: Vec<String>,
    /// Position while browsing history; `None` when editing a fresh line.
    browsing: Option<usize>,
    draft: String,
}

impl LineEditor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn text(&self) -> String {
        self.buffer.iter().collect()
    }

    #[must_use]
    pub const fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn insert(&mut self, c: char) {
        self.buffer.insert(self.cursor, c);
        self.cursor += 1;
    }

    pub fn backspace(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            self.buffer.remove(self.cursor);
        }
    }

    pub fn delete(&mut self) {
        if self.cursor < self.buffer.len() {
            self.buffer.remove(self.cursor);
        }
    }

    pub const fn left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.buffer.len());
    }

    pub const fn home(&mut self) {
        self.cursor = 0;
    }

    pub fn end(&mut self) {
        self.cursor = self.buffer.len();
    }

    /// Recall the previous history entry.
    pub fn history_prev(&mut self) {
        if self.history.is_empty() {
            return;
        }
        let index = match self.browsing {
            None => {
                self.draft = self.text();
                self.history.len() - 1
            }
            Some(0) => 0,
            Some(i) => i - 1,
        };
        self.browsing = Some(index);
        let entry = self.history[index].clone();
        self.set(&entry);
    }

    /// Move towards the newest entry, ending at the line being drafted.
    pub fn history_next(&mut self) {
        let Some(index) = self.browsing else {
            return;
        };
        if index + 1 < self.history.len() {
            self.browsing = Some(index + 1);
            let entry = self.history[index + 1].clone();
            self.set(&entry);
        } else {
            self.browsing = None;
            let draft = std::mem::take(&mut self.draft);
            self.set(&draft);
        }
    }

    /// Take the line for submission and record it in history.
    pub fn submit(&mut self) -> String {
        let line = self.take();
        if !line.trim().is_empty() && self.history.last() != Some(&line) {
            self.history.push(line.clone());
        }
        line
    }

    /// Take the line without recording it.
    pub fn take(&mut self) -> String {
        let line = self.text();
        self.clear();
        line
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
        self.cursor = 0;
        self.browsing = None;
        self.draft.clear();
    }

    #[must_use]
    pub fn history(&self) -> &[String] {
        &self.history
    }

    fn set(&mut self, text: &str) {
        self.buffer = text.chars().collect();
        self.cursor = self.buffer.len();
    }
}

/// Keys the console understands, independent of the terminal library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleKey {
    Char(char),
    Enter,
    Backspace,
    Delete,
    Left,
    Right,
    Home,
    End,
    Up,
    Down,
    /// Ctrl-C.
    Interrupt,
    /// Ctrl-D.
    EndOfInput,
    /// Ctrl-L.
    ClearScreen,
}

/// Request a front-end should make.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleAction {
    Exec(String),
    Stdin {
        process_id: ExecutionId,
        input: String,
    },
    Interrupt(ExecutionId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Phase {
    Idle,
    /// A command was submitted; the id is known once the opening meta arrives.
    Running(Option<ExecutionId>),
}

/// Idle/running state machine tying scrollback, editor and requests together.
#[derive(Debug, Clone)]
pub struct ConsoleState {
    scrollback: Scrollback,
    editor: LineEditor,
    phase: Phase,
    cwd: String,
    user: String,
}

impl Default for ConsoleState {
    fn default() -> Self {
        Self::new("~", "")
    }
}

impl ConsoleState {
    #[must_use]
    pub fn new(cwd: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            scrollback: Scrollback::default(),
            editor: LineEditor::new(),
            phase: Phase::Idle,
            cwd: cwd.into(),
            user: user.into(),
        }
    }

    #[must_use]
    pub const fn scrollback(&self) -> &Scrollback {
        &self.scrollback
    }

    #[must_use]
    pub const fn editor(&self) -> &LineEditor {
        &self.editor
    }

    #[must_use]
    pub const fn is_running(&self) -> bool {
        matches!(self.phase, Phase::Running(_))
    }

    /// Id of the running execution, once known.
    #[must_use]
    pub fn process_id(&self) -> Option<&ExecutionId> {
        match &self.phase {
            Phase::Running(id) => id.as_ref(),
            Phase::Idle => None,
        }
    }

    /// Prompt shown before the input line; empty while a command runs.
    #[must_use]
    pub fn prompt(&self) -> String {
        if self.is_running() {
            String::new()
        } else if self.user.is_empty() {
            format!("{}$ ", self.cwd)
        } else {
            format!("{}:{}$ ", self.user, self.cwd)
        }
    }

    /// Replace the prompt details (from a session lookup).
    pub fn set_prompt(&mut self, cwd: impl Into<String>, user: impl Into<String>) {
        self.cwd = cwd.into();
        self.user = user.into();
    }

    /// Handle a keystroke, returning the request it triggers, if any.
    pub fn handle_key(&mut self, key: ConsoleKey) -> Option<ConsoleAction> {
        match key {
            ConsoleKey::Char(c) => self.editor.insert(c),
            ConsoleKey::Backspace => self.editor.backspace(),
            ConsoleKey::Delete => self.editor.delete(),
            ConsoleKey::Left => self.editor.left(),
            ConsoleKey::Right => self.editor.right(),
            ConsoleKey::Home => self.editor.home(),
            ConsoleKey::End => self.editor.end(),
            ConsoleKey::Up if !self.is_running() => self.editor.history_prev(),
            ConsoleKey::Down if !self.is_running() => self.editor.history_next(),
            ConsoleKey::Up | ConsoleKey::Down => {}
            ConsoleKey::ClearScreen => self.scrollback.clear(),
            ConsoleKey::Enter => return self.submit(),
            ConsoleKey::Interrupt => return self.interrupt(),
            ConsoleKey::EndOfInput => {
                let id = self.process_id()?.clone();
                return Some(ConsoleAction::Stdin {
                    process_id: id,
                    input: "\x04".to_string(),
                });
            }
        }
        None
    }

    fn submit(&mut self) -> Option<ConsoleAction> {
        match &self.phase {
            Phase::Idle => {
                let prompt = self.prompt();
                let line = self.editor.submit();
                self.scrollback.ensure_line_start();
                self.scrollback.push_str(&format!("{prompt}{line}\n"));
                if line.trim().is_empty() {
                    return None;
                }
                self.phase = Phase::Running(None);
                Some(ConsoleAction::Exec(line))
            }
            Phase::Running(None) => None,
            Phase::Running(Some(id)) => {
                let id = id.clone();
                let line = self.editor.take();
                self.scrollback.push_str(&format!("{line}\n"));
                Some(ConsoleAction::Stdin {
                    process_id: id,
                    input: format!("{line}\n"),
                })
            }
        }
    }

    fn interrupt(&mut self) -> Option<ConsoleAction> {
        if let Phase::Running(id) = &self.phase {
            return id.clone().map(ConsoleAction::Interrupt);
        }
        let prompt = self.prompt();
        let line = self.editor.take();
        self.scrollback.ensure_line_start();
        self.scrollback.push_str(&format!("{prompt}{line}^C\n"));
        None
    }

    /// Apply one message from the exec stream.
    pub fn apply(&mut self, message: &OutputMessage) {
        match message {
            OutputMessage::Output { data } => self.scrollback.push_str(data),
            OutputMessage::Meta(Meta::Started { process_id }) => {
                self.phase = Phase::Running(Some(process_id.clone()));
            }
            OutputMessage::Meta(Meta::Finished { cwd, user, .. }) => {
                self.set_prompt(cwd.clone(), user.clone());
                self.finish();
            }
            OutputMessage::Error { data } => {
                self.scrollback.ensure_line_start();
                self.scrollback.push_str(&format!("Error: {data}\n"));
                self.finish();
            }
        }
    }

    /// The stream ended or failed without a closing message.
    pub fn stream_ended(&mut self, error: Option<&str>) {
        if let Some(error) = error {
            self.scrollback.ensure_line_start();
            self.scrollback.push_str(&format!("Error: {error}\n"));
        }
        self.finish();
    }

    fn finish(&mut self) {
        self.scrollback.ensure_line_start();
        self.phase = Phase::Idle;
        self.editor.clear();
    }
}
