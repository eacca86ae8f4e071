//! Terminal client for a termbridge server, built on ratatui.
//!
//! Run with: cargo run -p termbridge-tui -- --server http://127.0.0.1:3000 --token <token>
//!
//! Type commands at the prompt. While a command runs, Enter sends the line to
//! its stdin and Ctrl+C interrupts it. Esc or Ctrl+Q quits.

use std::{io, time::Duration};

use anyhow::Context as _;
use clap::Parser;
use crossterm::{
    event, execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use futures::StreamExt;
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
};
use termbridge_core::OutputMessage;
use termbridge_transport::{
    ConsoleAction, ConsoleState, client::TerminalClient, protocol::SessionInfo, tui,
};
use tokio::sync::mpsc;

#[derive(Debug, Parser)]
#[command(name = "termbridge-tui", about = "Terminal client for a termbridge server")]
struct Args {
    /// Server base URL.
    #[arg(long, env = "TERMBRIDGE_SERVER", default_value = "http://127.0.0.1:3000")]
    server: String,
    /// Bearer token.
    #[arg(long, env = "TERMBRIDGE_TOKEN")]
    token: String,
    /// Project whose workspace the session runs in.
    #[arg(long)]
    project: Option<String>,
}

/// Results of background requests, fed back into the UI loop.
enum AppEvent {
    Message(OutputMessage),
    StreamEnded(Option<String>),
    Prompt(SessionInfo),
    Notice(String),
}

struct App {
    console: ConsoleState,
    client: TerminalClient,
    project: Option<String>,
    status: String,
    /// Lines scrolled back from the bottom.
    scroll_back: u16,
    events: mpsc::UnboundedSender<AppEvent>,
}

impl App {
    fn perform(&self, action: ConsoleAction) {
        let client = self.client.clone();
        let events = self.events.clone();
        match action {
            ConsoleAction::Exec(command) => {
                let project = self.project.clone();
                tokio::spawn(async move {
                    match client.exec(&command, project.as_deref()).await {
                        Ok(mut stream) => {
                            while let Some(item) = stream.next().await {
                                let event = match item {
                                    Ok(message) => AppEvent::Message(message),
                                    Err(e) => AppEvent::Notice(e.to_string()),
                                };
                                if events.send(event).is_err() {
                                    return;
                                }
                            }
                            let _ = events.send(AppEvent::StreamEnded(None));
                        }
                        Err(e) => {
                            let _ = events.send(AppEvent::StreamEnded(Some(e.to_string())));
                        }
                    }
                });
            }
            ConsoleAction::Stdin { process_id, input } => {
                tokio::spawn(async move {
                    if let Err(e) = client.stdin(&process_id, &input).await {
                        let _ = events.send(AppEvent::Notice(format!("stdin: {e}")));
                    }
                });
            }
            ConsoleAction::Interrupt(process_id) => {
                tokio::spawn(async move {
                    if let Err(e) = client.interrupt(&process_id).await {
                        let _ = events.send(AppEvent::Notice(format!("interrupt: {e}")));
                    }
                });
            }
        }
    }

    fn apply(&mut self, event: AppEvent) {
        match event {
            AppEvent::Message(message) => {
                self.console.apply(&message);
                if !message.is_heartbeat() {
                    self.scroll_back = 0;
                }
            }
            AppEvent::StreamEnded(error) => {
                // A stream that ended after its closing message leaves the
                // console idle already.
                if self.console.is_running() || error.is_some() {
                    self.console.stream_ended(error.as_deref());
                }
            }
            AppEvent::Prompt(info) => {
                self.status = format!("Connected as {}", info.user);
                self.console.set_prompt(info.cwd, info.user);
            }
            AppEvent::Notice(text) => self.status = text,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    enable_raw_mode().context("failed to enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, args).await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    args: Args,
) -> anyhow::Result<()> {
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let mut app = App {
        console: ConsoleState::default(),
        client: TerminalClient::new(args.server.clone(), args.token),
        project: args.project,
        status: format!("Connecting to {}...", args.server),
        scroll_back: 0,
        events: events_tx.clone(),
    };

    {
        let client = app.client.clone();
        let project = app.project.clone();
        tokio::spawn(async move {
            let event = match client.session(project.as_deref()).await {
                Ok(info) => AppEvent::Prompt(info),
                Err(e) => AppEvent::Notice(format!("Failed: {e}")),
            };
            let _ = events_tx.send(event);
        });
    }

    loop {
        while let Ok(event) = events_rx.try_recv() {
            app.apply(event);
        }

        terminal.draw(|f| ui(f, &app))?;

        if !event::poll(Duration::from_millis(50))? {
            continue;
        }
        let event = event::read()?;
        if let event::Event::Key(key) = &event {
            if tui::is_quit(key) {
                return Ok(());
            }
            match key.code {
                event::KeyCode::PageUp => {
                    app.scroll_back = app.scroll_back.saturating_add(10);
                    continue;
                }
                event::KeyCode::PageDown => {
                    app.scroll_back = app.scroll_back.saturating_sub(10);
                    continue;
                }
                _ => {}
            }
        }
        if let Some(action) = tui::event_key(&event).and_then(|k| app.console.handle_key(k)) {
            app.perform(action);
        }
    }
}

fn ui(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(3),    // Output
            Constraint::Length(3), // Input
            Constraint::Length(1), // Status
        ])
        .split(f.area());

    let lines: Vec<Line> = app.console.scrollback().lines().map(Line::from).collect();
    let visible = chunks[0].height.saturating_sub(2);
    let total = u16::try_from(lines.len()).unwrap_or(u16::MAX);
    let top = total
        .saturating_sub(visible)
        .saturating_sub(app.scroll_back);
    let output = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("Output"))
        .scroll((top, 0));
    f.render_widget(output, chunks[0]);

    let prompt = app.console.prompt();
    let text = app.console.editor().text();
    let input = Paragraph::new(Line::from(vec![
        Span::styled(prompt.clone(), Style::default().fg(Color::Green)),
        Span::styled(text, Style::default().fg(Color::Yellow)),
    ]))
    .block(Block::default().borders(Borders::ALL).title(if app.console.is_running() {
        "Input (stdin)"
    } else {
        "Command"
    }));
    f.render_widget(input, chunks[1]);

    let cursor = prompt.chars().count() + app.console.editor().cursor();
    f.set_cursor_position((
        chunks[1]
            .x
            .saturating_add(u16::try_from(cursor).unwrap_or(u16::MAX))
            .saturating_add(1),
        chunks[1].y + 1,
    ));

    let status_style = if app.status.starts_with("Connected") {
        Style::default().fg(Color::Green)
    } else if app.status.starts_with("Failed") {
        Style::default().fg(Color::Red)
    } else {
        Style::default().fg(Color::Yellow)
    };
    let status = Paragraph::new(Line::from(vec![
        Span::raw(" "),
        Span::styled(&app.status, status_style),
        Span::raw(" | "),
        Span::styled("Ctrl+C", Style::default().fg(Color::Yellow)),
        Span::raw(" interrupt | "),
        Span::styled("Esc", Style::default().fg(Color::Yellow)),
        Span::raw(" quit | "),
        Span::styled("PgUp/PgDn", Style::default().fg(Color::Yellow)),
        Span::raw(" scroll "),
    ]));
    f.render_widget(status, chunks[2]);
}
