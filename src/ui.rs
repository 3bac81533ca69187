//! `ratatui` front-end: a pre-call screen (your address, peer input) and an
//! in-call screen (remote pane, local pip with mic meter, captions).
//!
//! Drawing is a pure function of `App` state; every key press delegates to a
//! session-controller method.

use crate::log_debug;
use crate::session::{App, CallPhase};
use crate::terminal_restore::TerminalRestoreGuard;
use anyhow::Result;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use crossterm::event;
use crossterm::event::{Event, KeyCode, KeyEvent, KeyModifiers};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, BorderType, Borders, Gauge, Paragraph},
    Terminal,
};
use std::io::{self, Write};
use std::time::Duration;
use unicode_width::UnicodeWidthChar;
use unicode_width::UnicodeWidthStr;

// Theme colors - cool teal
const ACCENT: Color = Color::Rgb(64, 200, 190);
const TITLE: Color = Color::Rgb(90, 220, 210);
const DIM_BORDER: Color = Color::Rgb(50, 105, 100);
const BODY_TEXT: Color = Color::Rgb(205, 210, 208);
const INPUT_TEXT: Color = Color::Rgb(255, 220, 100);
const STATUS_TEXT: Color = Color::Rgb(150, 160, 158);

/// Configure the terminal, run the drawing loop, and tear everything down.
pub fn run_app(app: &mut App) -> Result<()> {
    let terminal_guard = TerminalRestoreGuard::new();
    terminal_guard.enable_raw_mode()?;
    let mut stdout = io::stdout();
    terminal_guard.enter_alt_screen(&mut stdout)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = app_loop(&mut terminal, app);

    drop(terminal);
    terminal_guard.restore();

    result
}

/// Core event/render loop.
fn app_loop(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &mut App) -> Result<()> {
    // Initial render so the UI appears immediately on startup.
    terminal.draw(|frame| draw(frame, app))?;

    loop {
        app.poll_broker_events();
        app.poll_caption_events();
        app.tick();

        let busy = app.has_active_work();
        let poll_duration = if busy {
            Duration::from_millis(50)
        } else {
            Duration::from_millis(100)
        };

        let mut should_draw = app.take_redraw_request() || busy;
        let mut should_quit = false;

        if event::poll(poll_duration)? {
            match event::read()? {
                Event::Key(key) => {
                    // Handle the key before drawing to avoid input lag.
                    should_quit = handle_key_event(app, key)?;
                    should_draw = true;
                }
                Event::Resize(_, _) => {
                    should_draw = true;
                }
                _ => {}
            }
        }

        if should_draw {
            terminal.draw(|frame| draw(frame, app))?;
        }

        if should_quit {
            app.shutdown();
            break;
        }
    }
    Ok(())
}

/// Interpret keystrokes into session-controller calls.
fn handle_key_event(app: &mut App, key: KeyEvent) -> Result<bool> {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return Ok(true);
    }

    let in_call = matches!(app.phase(), CallPhase::Connecting | CallPhase::Active);
    if in_call {
        match key.code {
            KeyCode::Char('m') => app.toggle_mic(),
            KeyCode::Char('c') => app.toggle_camera(),
            KeyCode::Char('l') => app.cycle_language(),
            KeyCode::Char('e') | KeyCode::Esc => app.end_call(),
            _ => {}
        }
        return Ok(false);
    }

    match key.code {
        KeyCode::Char('y') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            if let Some(address) = app.copy_address() {
                copy_to_clipboard(&address);
            }
        }
        KeyCode::Enter => app.start_call(),
        KeyCode::Backspace => app.backspace_address(),
        KeyCode::Esc => app.clear_address(),
        KeyCode::Char(c) => {
            if !key.modifiers.contains(KeyModifiers::CONTROL) {
                app.push_address_char(c);
            }
        }
        KeyCode::Delete => app.clear_address(),
        _ => {}
    }

    Ok(false)
}

/// OSC 52: hand the address to the hosting terminal's clipboard (local or
/// over SSH).
fn copy_to_clipboard(text: &str) {
    let payload = BASE64.encode(text.as_bytes());
    let mut stdout = io::stdout();
    if write!(stdout, "\x1b]52;c;{payload}\x07").is_err() || stdout.flush().is_err() {
        log_debug("failed to emit clipboard escape");
    }
}

pub fn draw(frame: &mut ratatui::Frame<'_>, app: &App) {
    match app.phase() {
        CallPhase::Connecting | CallPhase::Active => draw_call_screen(frame, app),
        CallPhase::Idle | CallPhase::Ended => draw_precall_screen(frame, app),
    }
}

fn draw_precall_screen(frame: &mut ratatui::Frame<'_>, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4), // header
            Constraint::Length(3), // status
            Constraint::Length(3), // own address
            Constraint::Length(3), // peer input
            Constraint::Min(2),    // footer hint
        ])
        .split(frame.size());

    let header = Paragraph::new(Text::from(vec![
        Line::from(Span::styled(
            "🎥 BabelCall",
            Style::default().fg(TITLE).add_modifier(Modifier::BOLD),
        )),
        Line::from(Span::styled(
            "Connect with anyone, translate everything",
            Style::default().fg(STATUS_TEXT),
        )),
    ]))
    .block(bordered_block(" Video Call Translator ", ACCENT));
    frame.render_widget(header, chunks[0]);

    frame.render_widget(status_paragraph(app), chunks[1]);

    let address = app.my_address().unwrap_or("Generating...");
    let own = Paragraph::new(Line::from(vec![
        Span::styled(address, Style::default().fg(BODY_TEXT)),
        Span::raw("   "),
        Span::styled("Ctrl+Y", Style::default().fg(INPUT_TEXT)),
        Span::styled(" copy", Style::default().fg(DIM_BORDER)),
    ]))
    .block(bordered_block(" Your address ", DIM_BORDER));
    frame.render_widget(own, chunks[2]);

    let input = Paragraph::new(app.address_input())
        .style(Style::default().fg(INPUT_TEXT))
        .block(bordered_block(" Call a friend (paste address, Enter) ", ACCENT));
    frame.render_widget(input, chunks[3]);

    let footer = Paragraph::new(
        "Share your address and wait for a call, or paste a friend's address and press Enter.",
    )
    .style(Style::default().fg(STATUS_TEXT));
    frame.render_widget(footer, chunks[4]);

    // Cursor in the address input.
    let inner_width = chunks[3].width.saturating_sub(2);
    let input_width =
        UnicodeWidthStr::width(app.address_input()).min(u16::MAX as usize) as u16;
    let cursor_x = chunks[3]
        .x
        .saturating_add(1)
        .saturating_add(input_width.min(inner_width));
    frame.set_cursor(cursor_x, chunks[3].y + 1);
}

fn draw_call_screen(frame: &mut ratatui::Frame<'_>, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(8),    // video panes
            Constraint::Length(3), // captions
            Constraint::Length(3), // status + controls
        ])
        .split(frame.size());

    let panes = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(70), Constraint::Percentage(30)])
        .split(chunks[0]);

    draw_remote_pane(frame, app, panes[0]);
    draw_local_pane(frame, app, panes[1]);

    let caption_width = usize::from(chunks[1].width.saturating_sub(2));
    let caption = Paragraph::new(fit_to_width(app.caption(), caption_width))
        .style(Style::default().fg(BODY_TEXT))
        .block(bordered_block(
            &format!(" Captions (to {}, l to change) ", app.target_lang().label()),
            ACCENT,
        ));
    frame.render_widget(caption, chunks[1]);

    let controls = Line::from(vec![
        Span::styled(" m ", key_style()),
        Span::styled(
            if app.mic_enabled() { "mic 🎤  " } else { "mic 🔇  " },
            Style::default().fg(DIM_BORDER),
        ),
        Span::styled(" c ", key_style()),
        Span::styled(
            if app.camera_enabled() { "cam 📷  " } else { "cam 📹  " },
            Style::default().fg(DIM_BORDER),
        ),
        Span::styled(" e ", key_style()),
        Span::styled("end call  ", Style::default().fg(DIM_BORDER)),
        Span::styled(app.status_text(), Style::default().fg(STATUS_TEXT)),
    ]);
    let status = Paragraph::new(controls).block(bordered_block(" Status ", DIM_BORDER));
    frame.render_widget(status, chunks[2]);
}

fn draw_remote_pane(frame: &mut ratatui::Frame<'_>, app: &App, area: Rect) {
    let peer = app.remote_address().unwrap_or("…");
    let lines = match app.remote_stream() {
        Some(stream) => {
            let video = if stream.video_enabled {
                Line::from(Span::styled(
                    "● video live",
                    Style::default().fg(ACCENT),
                ))
            } else {
                Line::from(Span::styled(
                    "📹 camera off",
                    Style::default().fg(STATUS_TEXT),
                ))
            };
            let audio = if stream.audio_enabled {
                Line::from(Span::styled("🎤 mic open", Style::default().fg(ACCENT)))
            } else {
                Line::from(Span::styled(
                    "🔇 muted",
                    Style::default().fg(STATUS_TEXT),
                ))
            };
            vec![Line::from(""), video, audio]
        }
        None => vec![
            Line::from(""),
            Line::from(Span::styled(
                "Waiting for the peer's stream...",
                Style::default().fg(STATUS_TEXT),
            )),
        ],
    };
    let pane = Paragraph::new(Text::from(lines))
        .block(bordered_block(&format!(" Partner ({peer}) "), ACCENT));
    frame.render_widget(pane, area);
}

fn draw_local_pane(frame: &mut ratatui::Frame<'_>, app: &App, area: Rect) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(3)])
        .split(area);

    let state = Line::from(vec![
        Span::styled(
            if app.mic_enabled() { "🎤 " } else { "🔇 " },
            Style::default().fg(BODY_TEXT),
        ),
        Span::styled(
            if app.camera_enabled() { "📷 " } else { "📹 " },
            Style::default().fg(BODY_TEXT),
        ),
        Span::styled(
            if app.captions_listening() {
                "captions on"
            } else {
                "captions off"
            },
            Style::default().fg(STATUS_TEXT),
        ),
    ]);
    let pip = Paragraph::new(Text::from(vec![Line::from(""), state]))
        .block(bordered_block(" You ", DIM_BORDER));
    frame.render_widget(pip, rows[0]);

    // Map the meter's -60..0 dB range onto the gauge.
    let db = app.mic_meter().level_db().clamp(-60.0, 0.0);
    let ratio = f64::from((db + 60.0) / 60.0);
    let meter = Gauge::default()
        .block(bordered_block(" Mic ", DIM_BORDER))
        .gauge_style(Style::default().fg(ACCENT))
        .ratio(ratio)
        .label(format!("{db:.0} dB"));
    frame.render_widget(meter, rows[1]);
}

fn status_paragraph<'a>(app: &'a App) -> Paragraph<'a> {
    Paragraph::new(app.status_text())
        .style(Style::default().fg(STATUS_TEXT))
        .block(bordered_block(" Status ", DIM_BORDER))
}

fn bordered_block(title: &str, border: Color) -> Block<'static> {
    Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(border))
        .title(Span::styled(
            title.to_string(),
            Style::default().fg(TITLE).add_modifier(Modifier::BOLD),
        ))
}

fn key_style() -> Style {
    Style::default().fg(INPUT_TEXT).add_modifier(Modifier::BOLD)
}

/// Truncate to the pane width on character boundaries, appending an ellipsis
/// when something was cut. Zero-width and control characters never reach
/// here; captions are plain service/recognizer text.
fn fit_to_width(text: &str, max_columns: usize) -> String {
    if max_columns == 0 {
        return String::new();
    }
    if UnicodeWidthStr::width(text) <= max_columns {
        return text.to_string();
    }
    let budget = max_columns.saturating_sub(1);
    let mut used = 0usize;
    let mut out = String::new();
    for ch in text.chars() {
        let w = ch.width().unwrap_or(0);
        if used + w > budget {
            break;
        }
        used += w;
        out.push(ch);
    }
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_to_width_passes_short_text_through() {
        assert_eq!(fit_to_width("hola", 10), "hola");
    }

    #[test]
    fn fit_to_width_truncates_with_ellipsis() {
        let fitted = fit_to_width("a very long caption indeed", 10);
        assert!(UnicodeWidthStr::width(fitted.as_str()) <= 10);
        assert!(fitted.ends_with('…'));
    }

    #[test]
    fn fit_to_width_respects_wide_characters() {
        let fitted = fit_to_width("こんにちは世界", 6);
        assert!(UnicodeWidthStr::width(fitted.as_str()) <= 6);
        assert!(fitted.ends_with('…'));
    }

    #[test]
    fn fit_to_width_handles_zero_columns() {
        assert_eq!(fit_to_width("anything", 0), "");
    }
}
