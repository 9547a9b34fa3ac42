/// dashboard.rs – ratatui live terminal view of the feed.
///
/// Layout (3 panels):
///  ┌─ Header ──────────────────────────────────────────────────────────┐
///  │ Live Trades │ Unrealised P&L │ Today / Target │ Activity │ Uptime  │
///  ├─ Open Positions ──────────────────┬─ Logs ────────────────────────┤
///  │ symbol, side, progress, P&L       │ timestamped log lines         │
///  └───────────────────────────────────┴───────────────────────────────┘
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture, Event, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction as LayoutDirection, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, List, ListItem, Paragraph, Row, Table},
    Frame, Terminal,
};
use std::io::{self, Stdout};

use crate::models::{AggregateSnapshot, Direction, FeedState};

pub type CrossTerm = Terminal<CrosstermBackend<Stdout>>;

const PROGRESS_BAR_WIDTH: usize = 10;

// ---------------------------------------------------------------------------
// Setup / teardown
// ---------------------------------------------------------------------------

pub fn setup_terminal() -> anyhow::Result<CrossTerm> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    Ok(Terminal::new(backend)?)
}

pub fn teardown_terminal(terminal: &mut CrossTerm) -> anyhow::Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Key event handling
// ---------------------------------------------------------------------------

/// Returns `true` when the user requests quit (q or Ctrl-C).
pub fn handle_event(event: &Event) -> bool {
    matches!(
        event,
        Event::Key(k)
            if k.code == KeyCode::Char('q')
            || k.code == KeyCode::Char('Q')
            || (k.code == KeyCode::Char('c')
                && k.modifiers.contains(crossterm::event::KeyModifiers::CONTROL))
    )
}

// ---------------------------------------------------------------------------
// Formatting helpers
// ---------------------------------------------------------------------------

/// Text progress bar, e.g. `[######    ]  60%`.
pub fn progress_bar(progress: f64) -> String {
    let p = progress.clamp(0.0, 1.0);
    let filled = (p * PROGRESS_BAR_WIDTH as f64).round() as usize;
    format!(
        "[{}{}] {:>3.0}%",
        "#".repeat(filled),
        " ".repeat(PROGRESS_BAR_WIDTH - filled),
        p * 100.0
    )
}

fn pnl_color(v: f64) -> Color {
    if v >= 0.0 {
        Color::Green
    } else {
        Color::Red
    }
}

// ---------------------------------------------------------------------------
// Render
// ---------------------------------------------------------------------------

pub fn render(frame: &mut Frame, state: &FeedState, aggregate: &AggregateSnapshot) {
    let area = frame.size();

    let outer = Layout::default()
        .direction(LayoutDirection::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)])
        .split(area);

    render_header(frame, outer[0], state, aggregate);

    let body = Layout::default()
        .direction(LayoutDirection::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(outer[1]);

    render_positions(frame, body[0], state);
    render_logs(frame, body[1], state);
}

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

fn render_header(frame: &mut Frame, area: Rect, state: &FeedState, agg: &AggregateSnapshot) {
    let activity = match &state.live_activity {
        Some(a) if a.has_activity => {
            let today = a
                .todays_trades
                .as_ref()
                .map(|t| format!(" {} today {:+.2}", t.count, t.total_profit))
                .unwrap_or_default();
            Span::styled(format!("LIVE●{today}"), Style::default().fg(Color::Green))
        }
        Some(_) => Span::styled("IDLE○", Style::default().fg(Color::DarkGray)),
        None if !state.has_credentials => {
            Span::styled("NO TOKEN", Style::default().fg(Color::Yellow))
        }
        None => Span::styled("…", Style::default().fg(Color::DarkGray)),
    };

    let uptime = state
        .started_at
        .map(|t| {
            let secs = (chrono::Utc::now() - t).num_seconds();
            format!("{}h{:02}m", secs / 3600, (secs % 3600) / 60)
        })
        .unwrap_or_else(|| "—".into());

    let target = if agg.daily_target > 0.0 {
        format!(
            "Today: {:+.2} / {:.2} ({:.0}%)  │ ",
            agg.daily_pl,
            agg.daily_target,
            agg.target_progress() * 100.0
        )
    } else {
        format!("Today: {:+.2}  │ ", agg.daily_pl)
    };

    let line = Line::from(vec![
        Span::styled(
            "  📈 Live Trades  │ ",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            format!("Unreal. P&L: {:+.2}  │ ", agg.unrealized_pl),
            Style::default()
                .fg(pnl_color(agg.unrealized_pl))
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(format!("Open: {}  │ ", agg.open_positions)),
        Span::raw(target),
        activity,
        Span::raw(format!("  │ Up: {uptime}")),
        Span::styled("  [q] quit", Style::default().fg(Color::DarkGray)),
    ]);

    let header = Paragraph::new(line).block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!(
                " Live Trading Feed {} ",
                &state.session_id[..state.session_id.len().min(8)]
            )),
    );
    frame.render_widget(header, area);
}

// ---------------------------------------------------------------------------
// Open positions table
// ---------------------------------------------------------------------------

fn render_positions(frame: &mut Frame, area: Rect, state: &FeedState) {
    let refreshed = state
        .last_refresh
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "never".into());
    let title = format!(
        " Open Positions ({}/{}) – catalog {} @ {} ",
        state.positions.len(),
        state.capacity,
        state.catalog_size,
        refreshed
    );

    if state.is_idle() {
        let idle = Paragraph::new(Line::from(Span::styled(
            "No activity today",
            Style::default().fg(Color::DarkGray),
        )))
        .block(Block::default().borders(Borders::ALL).title(title));
        frame.render_widget(idle, area);
        return;
    }

    let header_cells = ["Symbol", "Side", "Opened", "Progress", "P&L", "Final"]
        .iter()
        .map(|h| Cell::from(*h).style(Style::default().add_modifier(Modifier::BOLD)));
    let header = Row::new(header_cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1);

    let rows: Vec<Row> = state
        .positions
        .iter()
        .map(|view| {
            let trade = &view.position.trade;
            let pl = view.state.simulated_pl;
            Row::new(vec![
                Cell::from(trade.symbol.clone()),
                Cell::from(trade.direction.to_string()).style(Style::default().fg(
                    match trade.direction {
                        Direction::Long => Color::Green,
                        Direction::Short => Color::Red,
                    },
                )),
                Cell::from(view.position.opened_at.format("%H:%M:%S").to_string()),
                Cell::from(progress_bar(view.state.progress)),
                Cell::from(format!("{:+.2}", pl))
                    .style(Style::default().fg(pnl_color(pl)).add_modifier(Modifier::BOLD)),
                Cell::from(format!("{:+.2}", trade.final_pl))
                    .style(Style::default().fg(Color::DarkGray)),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(10),
            Constraint::Length(6),
            Constraint::Length(9),
            Constraint::Length(18),
            Constraint::Length(9),
            Constraint::Min(8),
        ],
    )
    .header(header)
    .block(Block::default().borders(Borders::ALL).title(title));

    frame.render_widget(table, area);
}

// ---------------------------------------------------------------------------
// Logs panel
// ---------------------------------------------------------------------------

fn render_logs(frame: &mut Frame, area: Rect, state: &FeedState) {
    let items: Vec<ListItem> = state
        .logs
        .iter()
        .take(area.height as usize)
        .map(|line| {
            let color = if line.contains("failed") {
                Color::Red
            } else if line.contains("Opened") {
                Color::Green
            } else {
                Color::Gray
            };
            ListItem::new(Line::from(Span::styled(
                line.clone(),
                Style::default().fg(color),
            )))
        })
        .collect();

    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(" Logs "))
        .style(Style::default().fg(Color::White));

    frame.render_widget(list, area);
}
