//! Rendering
//!
//! Pure presentation: reads `App` state, draws widgets, decides nothing.

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, Wrap},
    Frame,
};
use unicode_width::UnicodeWidthStr;

use crate::tui::app::{App, ChatMessage, Focus, LogEntry, LogLevel};
use crate::tui::state::Modal;

const ACCENT: Color = Color::Cyan;
const DIM: Color = Color::DarkGray;

const HELP_TEXT: &str = "\
Keybindings

  1-5    Switch resource kind
  j/k    Move selection
  d      Describe selected resource
  y      Show YAML for selected resource
  l      Logs for selected resource
  s      Shell into selected resource
  c      Focus copilot chat input
  Space  Toggle copilot panel
  :      Command mode
  /      Filter resources
  ?      Toggle this help
  Esc    Back to resource table
  q      Quit

Commands
  :pods :svc :deploy :ns :nodes
  :ns <name>      Switch namespace
  :ctx [<name>]   List or switch contexts
  :<anything>     Run as external command";

pub fn render(frame: &mut Frame, app: &App) {
    let bar_open = matches!(app.view.active_modal, Modal::CommandBar | Modal::FilterBar);
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(5),
            Constraint::Length(7),
            Constraint::Length(if bar_open { 1 } else { 0 }),
        ])
        .split(frame.area());

    render_header(frame, app, chunks[0]);
    render_main(frame, app, chunks[1]);
    render_audit_log(frame, app, chunks[2]);
    if bar_open {
        render_input_bar(frame, app, chunks[3]);
    }
    if app.view.active_modal == Modal::Help {
        render_help(frame, chunks[1]);
    }
}

fn render_header(frame: &mut Frame, app: &App, area: Rect) {
    let mut spans = vec![
        Span::styled(" kopilot ", Style::default().fg(ACCENT).add_modifier(Modifier::BOLD)),
        Span::styled(
            format!(
                " {} | ctx: {} | ns: {} ",
                app.cluster_info.cluster_name, app.cluster_info.context_name, app.view.namespace
            ),
            Style::default().fg(Color::White),
        ),
    ];
    if app.view.turn_in_flight {
        spans.push(Span::styled(
            " [copilot working] ",
            Style::default().fg(Color::Yellow),
        ));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_main(frame: &mut Frame, app: &App, area: Rect) {
    if app.view.copilot_visible {
        let halves = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(area);
        render_table(frame, app, halves[0]);
        render_copilot(frame, app, halves[1]);
    } else {
        render_table(frame, app, area);
    }
}

fn render_table(frame: &mut Frame, app: &App, area: Rect) {
    let rows = app.visible_rows();
    let title = if app.view.filter_text.is_empty() {
        format!(" {} ({}) ", app.view.resource_kind.title(), rows.len())
    } else {
        format!(
            " {} ({}) /{} ",
            app.view.resource_kind.title(),
            rows.len(),
            app.view.filter_text
        )
    };

    let widths = column_widths(&app.table.headers, &rows);
    let header = Row::new(
        app.table
            .headers
            .iter()
            .map(|h| Cell::from(h.as_str()).style(Style::default().fg(ACCENT))),
    );
    let body = rows.iter().enumerate().map(|(index, row)| {
        let style = if index == app.selected {
            Style::default().add_modifier(Modifier::REVERSED)
        } else {
            Style::default()
        };
        Row::new(row.iter().map(|cell| Cell::from(cell.as_str()))).style(style)
    });

    let table = Table::new(body, widths).header(header).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(DIM))
            .title(title),
    );
    frame.render_widget(table, area);
}

fn column_widths(headers: &[String], rows: &[&Vec<String>]) -> Vec<Constraint> {
    headers
        .iter()
        .enumerate()
        .map(|(col, header)| {
            let widest = rows
                .iter()
                .filter_map(|row| row.get(col))
                .map(|cell| cell.width())
                .chain(std::iter::once(header.width()))
                .max()
                .unwrap_or(4);
            Constraint::Length(widest.min(40) as u16)
        })
        .collect()
}

fn render_copilot(frame: &mut Frame, app: &App, area: Rect) {
    let parts = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(3)])
        .split(area);

    let mut lines: Vec<Line> = Vec::new();
    for message in &app.transcript {
        lines.extend(transcript_lines(message));
    }
    // Keep the tail in view.
    let visible = parts[0].height.saturating_sub(2) as usize;
    let skip = lines.len().saturating_sub(visible);
    let transcript = Paragraph::new(lines.split_off(skip.min(lines.len())))
        .wrap(Wrap { trim: false })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(DIM))
                .title(" Copilot "),
        );
    frame.render_widget(transcript, parts[0]);

    let input_style = if app.focus == Focus::Chat {
        Style::default().fg(ACCENT)
    } else {
        Style::default().fg(DIM)
    };
    let input = Paragraph::new(app.chat_input.as_str()).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(input_style)
            .title(" Ask (c to focus, Enter to send) "),
    );
    frame.render_widget(input, parts[1]);
}

fn transcript_lines(message: &ChatMessage) -> Vec<Line<'_>> {
    match message {
        ChatMessage::User(text) => vec![Line::styled(
            format!("> {}", text),
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
        )],
        ChatMessage::Assistant(text) => text
            .lines()
            .map(|line| Line::raw(line.to_string()))
            .collect(),
        ChatMessage::Thinking(text) => vec![Line::styled(
            format!("[thinking] {}", first_line(text, 100)),
            Style::default().fg(DIM),
        )],
        ChatMessage::ToolCall { name, input } => vec![Line::styled(
            format!("tool: {} {}", name, first_line(input, 80)),
            Style::default().fg(Color::Yellow),
        )],
        ChatMessage::ToolResult { body, is_error } => {
            let color = if *is_error { Color::Red } else { Color::Green };
            vec![Line::styled(
                format!("  -> {}", first_line(body, 120)),
                Style::default().fg(color),
            )]
        }
        ChatMessage::Error(text) => vec![Line::styled(
            format!("error: {}", text),
            Style::default().fg(Color::Red),
        )],
        ChatMessage::Status(text) => {
            vec![Line::styled(text.clone(), Style::default().fg(DIM))]
        }
        ChatMessage::Separator => vec![Line::styled(
            "─".repeat(24),
            Style::default().fg(DIM),
        )],
    }
}

fn render_audit_log(frame: &mut Frame, app: &App, area: Rect) {
    let visible = area.height.saturating_sub(2) as usize;
    let start = app.audit_log.len().saturating_sub(visible);
    let lines: Vec<Line> = app.audit_log[start..].iter().map(log_line).collect();
    let log = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(DIM))
            .title(" Log "),
    );
    frame.render_widget(log, area);
}

fn log_line(entry: &LogEntry) -> Line<'_> {
    let (tag, color) = match entry.level {
        LogLevel::Info => ("info", Color::White),
        LogLevel::Tool => ("tool", Color::Yellow),
        LogLevel::Ok => (" ok ", Color::Green),
        LogLevel::Error => ("err ", Color::Red),
    };
    Line::from(vec![
        Span::styled(
            format!("{} ", entry.at.format("%H:%M:%S")),
            Style::default().fg(DIM),
        ),
        Span::styled(format!("[{}] ", tag), Style::default().fg(color)),
        Span::styled(format!("{}: ", entry.source), Style::default().fg(ACCENT)),
        Span::raw(entry.text.as_str()),
    ])
}

fn render_input_bar(frame: &mut Frame, app: &App, area: Rect) {
    let (prefix, color) = match app.view.active_modal {
        Modal::CommandBar => (":", ACCENT),
        Modal::FilterBar => ("/", Color::Yellow),
        _ => return,
    };
    let bar = Paragraph::new(format!("{}{}", prefix, app.modal_input))
        .style(Style::default().fg(color));
    frame.render_widget(bar, area);
}

fn render_help(frame: &mut Frame, area: Rect) {
    let width = area.width.min(46);
    let height = area.height.min(24);
    let popup = Rect {
        x: area.x + (area.width.saturating_sub(width)) / 2,
        y: area.y + (area.height.saturating_sub(height)) / 2,
        width,
        height,
    };
    frame.render_widget(Clear, popup);
    let help = Paragraph::new(HELP_TEXT).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(ACCENT))
            .title(" Help "),
    );
    frame.render_widget(help, popup);
}

fn first_line(text: &str, max: usize) -> String {
    let line = text.lines().next().unwrap_or_default();
    if line.chars().count() <= max {
        line.to_string()
    } else {
        let clipped: String = line.chars().take(max).collect();
        format!("{}...", clipped)
    }
}
