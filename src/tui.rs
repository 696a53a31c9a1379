#![cfg(feature = "tui")]

use crate::app;
use anyhow::Context;
use crossterm::event::{Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use gptchat::driver::{Driver, Host, Phase, TICK_INTERVAL};
use gptchat::Severity;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Text};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::Terminal;
use std::io;
use std::time::Duration;
use tokio::sync::mpsc;

/// Tick and cancel flags and last notice, as requested by the driver.
#[derive(Debug, Default)]
struct TuiHost {
    ticking: bool,
    cancel_armed: bool,
    status: Option<(Severity, String)>,
}

impl Host for TuiHost {
    fn register_tick(&mut self, _interval: Duration) {
        self.ticking = true;
    }

    fn unregister_tick(&mut self) {
        self.ticking = false;
    }

    fn register_cancel(&mut self) {
        self.cancel_armed = true;
    }

    fn unregister_cancel(&mut self) {
        self.cancel_armed = false;
    }

    fn notify(&mut self, severity: Severity, message: &str) {
        self.status = Some((severity, message.to_string()));
    }
}

struct View {
    settings: app::Settings,
    input: String,
}

pub async fn run_tui(settings: app::Settings) -> anyhow::Result<()> {
    let transport = app::build_transport(&settings).context("failed to set up transport")?;
    let mut driver = Driver::new(transport, settings.keys.clone());
    let mut host = TuiHost::default();
    let mut view = View {
        settings,
        input: String::new(),
    };

    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("enter alt screen")?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;

    let (ev_tx, mut ev_rx) = mpsc::unbounded_channel::<Event>();
    std::thread::spawn(move || loop {
        match crossterm::event::read() {
            Ok(ev) => {
                if ev_tx.send(ev).is_err() {
                    break;
                }
            }
            Err(_) => break,
        }
    });

    let mut redraw = tokio::time::interval(Duration::from_millis(33));
    let mut driver_tick = tokio::time::interval(TICK_INTERVAL);

    let res = loop {
        tokio::select! {
            _ = redraw.tick() => {
                if let Err(e) = draw(&mut terminal, &view, &driver, &host) {
                    break Err(e);
                }
            }
            _ = driver_tick.tick(), if host.ticking => {
                driver.tick(&mut host);
            }
            Some(ev) = ev_rx.recv() => {
                if let Event::Key(key) = ev {
                    if handle_key(key, &mut view, &mut driver, &mut host) {
                        break Ok(());
                    }
                }
            }
        }
    };

    // Cancel any in-flight request before restoring the terminal.
    driver.cancel(&mut host);

    disable_raw_mode().ok();
    execute!(terminal.backend_mut(), LeaveAlternateScreen).ok();
    terminal.show_cursor().ok();

    res
}

/// Returns true when the UI should exit.
fn handle_key(key: KeyEvent, view: &mut View, driver: &mut Driver, host: &mut TuiHost) -> bool {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return true;
    }

    match key.code {
        KeyCode::Esc => {
            if host.cancel_armed {
                driver.cancel(host);
            } else {
                return true;
            }
        }
        KeyCode::Char(c) => view.input.push(c),
        KeyCode::Backspace => {
            view.input.pop();
        }
        KeyCode::Up => {
            if let Some(p) = driver.history_mut().select_previous() {
                view.input = p.to_string();
            }
        }
        KeyCode::Down => {
            if let Some(p) = driver.history_mut().select_next() {
                view.input = p.to_string();
            }
        }
        KeyCode::Enter => {
            let msg = view.input.trim().to_string();

            if msg == "/quit" {
                return true;
            }
            if let Some(rest) = msg.strip_prefix("/model ") {
                view.settings.model = rest.trim().to_string();
                host.notify(Severity::Info, &format!("model set to: {}", view.settings.model));
                view.input.clear();
                return false;
            }

            // Rejections are reported through the host status line.
            if driver.submit(host, view.settings.submission(msg)).is_ok() {
                view.input.clear();
            }
        }
        _ => {}
    }

    false
}

fn draw(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    view: &View,
    driver: &Driver,
    host: &TuiHost,
) -> anyhow::Result<()> {
    terminal.draw(|f| {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(1), Constraint::Length(1), Constraint::Length(3)])
            .split(f.area());

        let response_style = match driver.phase() {
            Phase::Failed => Style::default().fg(Color::Red),
            _ => Style::default(),
        };
        let response = Paragraph::new(Text::styled(driver.response().to_string(), response_style))
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(format!("gptchat - model: {} - {:?}", view.settings.model, driver.phase())),
            )
            .wrap(Wrap { trim: false });

        let status = match &host.status {
            Some((sev, msg)) => {
                let style = match sev {
                    Severity::Info => Style::default(),
                    Severity::Warning => Style::default().fg(Color::Yellow),
                    Severity::Error => Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
                };
                Line::styled(msg.clone(), style)
            }
            None => Line::from("Enter: send  Esc: cancel/quit  Up/Down: history  /model <name>"),
        };

        let history_pos = match driver.history().selected_index() {
            Some(i) => format!("prompt [{}/{}]", i + 1, driver.history().len()),
            None => "prompt".to_string(),
        };
        let input_w = Paragraph::new(view.input.clone())
            .block(Block::default().borders(Borders::ALL).title(history_pos));

        f.render_widget(response, chunks[0]);
        f.render_widget(Paragraph::new(status), chunks[1]);
        f.render_widget(input_w, chunks[2]);

        let x = chunks[2].x + 1 + view.input.chars().count() as u16;
        let y = chunks[2].y + 1;
        f.set_cursor_position((x.min(chunks[2].x + chunks[2].width.saturating_sub(2)), y));
    })?;
    Ok(())
}
