use crate::background::Background;
use crate::config::Settings;
use crate::matcher::find_matching_rule;
use crate::models::{BlockMode, Database};
use crate::pomodoro::{PomodoroAction, PomodoroPhase};
use crate::protocol::{Message, Response};
use crate::stats::{calculate_stats, categorize};
use crate::utils::{format_clock, format_duration, format_expiry};
use anyhow::Result;
use chrono::{DateTime, Duration, Local};
use crossterm::{
    event::{self, Event, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, Paragraph},
    Frame, Terminal,
};
use std::io;
use std::time::Duration as StdDuration;

const NOTICE_SECS: i64 = 8;
const TICK_MILLIS: u64 = 1000;

/// Everything one frame needs, read once per loop iteration.
struct Snapshot {
    now: DateTime<Local>,
    db: Database,
    settings: Settings,
    notice: Option<String>,
}

pub fn run_tui(background: &mut Background) -> Result<()> {
    // setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_loop(&mut terminal, background);

    // restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen,)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("{:?}", err)
    }

    Ok(())
}

fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    background: &mut Background,
) -> Result<()> {
    let mut notice: Option<(String, DateTime<Local>)> = None;
    let mut last_tick = Local::now() - Duration::seconds(1);

    loop {
        let now = Local::now();
        if now - last_tick >= Duration::milliseconds(TICK_MILLIS as i64) {
            let report = background.tick(now)?;
            last_tick = now;
            if let Some(change) = report.phase_change {
                if background.settings().pomodoro.notifications_enabled {
                    notice = Some((change.message().to_string(), now));
                }
            }
            if report.daily_reset {
                notice = Some(("New day, pomodoro count reset".to_string(), now));
            }
        }
        if notice
            .as_ref()
            .is_some_and(|(_, at)| now - *at > Duration::seconds(NOTICE_SECS))
        {
            notice = None;
        }

        let snapshot = Snapshot {
            now,
            db: background.storage().load()?,
            settings: background.settings().clone(),
            notice: notice.as_ref().map(|(text, _)| text.clone()),
        };
        terminal.draw(|f| draw(f, &snapshot))?;

        if event::poll(StdDuration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                let action = match key.code {
                    KeyCode::Char('q') => return Ok(()),
                    KeyCode::Char('s') => Some(PomodoroAction::Start),
                    KeyCode::Char('p') => Some(PomodoroAction::Pause),
                    KeyCode::Char('k') => Some(PomodoroAction::Skip),
                    KeyCode::Char('r') => Some(PomodoroAction::Reset),
                    _ => None,
                };
                if let Some(action) = action {
                    if let Response::Error { error } =
                        background.handle(Message::PomodoroAction { action })
                    {
                        notice = Some((error, Local::now()));
                    }
                }
            }
        }
    }
}

fn draw(frame: &mut Frame, snapshot: &Snapshot) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),  // Header
            Constraint::Length(12), // Pomodoro, usage, bypasses
            Constraint::Min(0),     // Chart
            Constraint::Length(3),  // Footer
        ])
        .split(frame.size());

    draw_header(frame, chunks[0], snapshot);
    draw_panels(frame, chunks[1], snapshot);
    draw_chart(frame, chunks[2], snapshot);
    draw_footer(frame, chunks[3]);
}

fn phase_color(phase: PomodoroPhase) -> Color {
    match phase {
        PomodoroPhase::Work => Color::Red,
        PomodoroPhase::ShortBreak | PomodoroPhase::LongBreak => Color::Green,
        PomodoroPhase::Idle => Color::Gray,
    }
}

fn draw_header(frame: &mut Frame, area: Rect, snapshot: &Snapshot) {
    let pomodoro = &snapshot.db.pomodoro_state;

    let status_text = if !snapshot.settings.enabled {
        Span::styled(
            "BLOCKING OFF",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        )
    } else if pomodoro.phase == PomodoroPhase::Work && pomodoro.is_running {
        Span::styled(
            "IN FOCUS",
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        )
    } else if pomodoro.phase.is_break() {
        Span::styled(
            "ON BREAK",
            Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
        )
    } else {
        Span::styled(
            "BLOCKING ON",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        )
    };

    let mut header_spans = vec![
        Span::styled(
            " FocusFlow ",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" | "),
        status_text,
        Span::raw(" | "),
        Span::raw(snapshot.now.format("%Y-%m-%d %H:%M:%S").to_string()),
    ];

    if let Some(notice) = &snapshot.notice {
        header_spans.push(Span::raw(" | "));
        header_spans.push(Span::styled(
            notice.clone(),
            Style::default().fg(Color::Magenta).add_modifier(Modifier::BOLD),
        ));
    }

    let header = Paragraph::new(Line::from(header_spans)).block(Block::default().borders(Borders::ALL));
    frame.render_widget(header, area);
}

fn draw_panels(frame: &mut Frame, area: Rect, snapshot: &Snapshot) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(30),
            Constraint::Percentage(40),
            Constraint::Percentage(30),
        ])
        .split(area);

    draw_pomodoro(frame, chunks[0], snapshot);
    draw_usage(frame, chunks[1], snapshot);
    draw_bypasses(frame, chunks[2], snapshot);
}

fn titled(title: &str) -> Block<'_> {
    Block::default()
        .title(Span::styled(
            title,
            Style::default().add_modifier(Modifier::BOLD),
        ))
        .borders(Borders::ALL)
}

fn draw_pomodoro(frame: &mut Frame, area: Rect, snapshot: &Snapshot) {
    let state = &snapshot.db.pomodoro_state;
    let cfg = &snapshot.settings.pomodoro;
    let block = titled(" POMODORO ");
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(1)])
        .split(inner);

    let color = phase_color(state.phase);
    let lines = vec![
        Line::from(vec![
            Span::raw("  Phase:    "),
            Span::styled(
                state.phase.label(),
                Style::default().fg(color).add_modifier(Modifier::BOLD),
            ),
        ]),
        Line::from(vec![
            Span::raw("  Time:     "),
            Span::styled(
                format_clock(state.time_remaining_seconds),
                Style::default().add_modifier(Modifier::BOLD),
            ),
            Span::raw(if state.is_running { "  running" } else { "  paused" }),
        ]),
        Line::raw(format!("  Today:    {} pomodoros", state.today_pomodoros)),
        Line::raw(format!(
            "  Session:  {}/{}",
            state.sessions_completed % cfg.long_break_every(),
            cfg.long_break_every()
        )),
        Line::raw(format!(
            "  Cycle:    {}m / {}m / {}m",
            cfg.work_duration_minutes, cfg.short_break_minutes, cfg.long_break_minutes
        )),
    ];
    frame.render_widget(Paragraph::new(lines), rows[0]);

    let total = match state.phase {
        PomodoroPhase::Work | PomodoroPhase::Idle => cfg.work_seconds(),
        PomodoroPhase::ShortBreak => cfg.short_break_seconds(),
        PomodoroPhase::LongBreak => cfg.long_break_seconds(),
    };
    let ratio = if total == 0 || state.phase == PomodoroPhase::Idle {
        0.0
    } else {
        1.0 - (state.time_remaining_seconds.min(total) as f64 / total as f64)
    };
    frame.render_widget(
        Gauge::default().gauge_style(Style::default().fg(color)).ratio(ratio),
        rows[1],
    );
}

fn draw_usage(frame: &mut Frame, area: Rect, snapshot: &Snapshot) {
    let stats = calculate_stats(&snapshot.db.time_stats, snapshot.now);
    let mut lines = Vec::new();

    if stats.today_summary.top_domains.is_empty() {
        lines.push(Line::raw("  Nothing tracked today"));
    }
    for (domain, seconds) in &stats.today_summary.top_domains {
        let url = format!("https://{}/", domain);
        let limit = find_matching_rule(&url, &snapshot.settings.site_categories)
            .filter(|rule| rule.mode == BlockMode::TimeLimit)
            .and_then(|rule| rule.daily_limit_minutes);

        let mut spans = vec![
            Span::raw(format!("  {:<20} ", domain)),
            Span::raw(format_duration(*seconds as i64)),
        ];
        if let Some(minutes) = limit {
            let limit_secs = u64::from(minutes) * 60;
            let color = if *seconds >= limit_secs {
                Color::Red
            } else if limit_secs - seconds < 300 {
                Color::Yellow
            } else {
                Color::Green
            };
            spans.push(Span::styled(
                format!(" / {}m", minutes),
                Style::default().fg(color),
            ));
        }
        spans.push(Span::styled(
            format!("  {}", categorize(domain).label()),
            Style::default().fg(Color::DarkGray),
        ));
        lines.push(Line::from(spans));
    }

    lines.push(Line::raw(""));
    lines.push(Line::raw(format!(
        "  Today: {} | Week: {}",
        format_duration(stats.today_summary.total.num_seconds()),
        format_duration(stats.week_summary.total.num_seconds())
    )));

    frame.render_widget(Paragraph::new(lines).block(titled(" TODAY ")), area);
}

fn draw_bypasses(frame: &mut Frame, area: Rect, snapshot: &Snapshot) {
    let now_ms = snapshot.now.timestamp_millis();
    let live: Vec<_> = snapshot
        .db
        .active_bypasses
        .iter()
        .filter(|bypass| bypass.expires_at > now_ms)
        .collect();

    let mut lines = Vec::new();
    if live.is_empty() {
        lines.push(Line::raw("  None"));
    }
    for bypass in live {
        let left = (bypass.expires_at - now_ms) / 1000;
        lines.push(Line::from(vec![
            Span::styled(
                format!("  {:<18}", bypass.domain),
                Style::default().fg(Color::Yellow),
            ),
            Span::raw(format!(
                " {} (until {})",
                format_clock(left.max(0) as u64),
                format_expiry(bypass.expires_at)
            )),
        ]));
    }

    frame.render_widget(Paragraph::new(lines).block(titled(" BYPASSES ")), area);
}

fn draw_chart(frame: &mut Frame, area: Rect, snapshot: &Snapshot) {
    let stats = calculate_stats(&snapshot.db.time_stats, snapshot.now);

    let chart_block = Block::default()
        .title(" Browsing Time - Current Week ")
        .borders(Borders::ALL);
    let inner_area = chart_block.inner(area);
    frame.render_widget(chart_block, area);

    if inner_area.height < 2 || inner_area.width < 14 {
        return;
    }

    // Get current week (Monday to Sunday)
    let mut days_data = Vec::new();
    let mut max_total_secs = 1;

    for i in 0..7 {
        let date = stats.week_start + Duration::days(i);
        let total_secs = stats
            .daily_stats
            .get(&date)
            .map_or(0, |day| day.total.num_seconds());
        if total_secs > max_total_secs {
            max_total_secs = total_secs;
        }
        days_data.push((date.format("%a").to_string(), total_secs, date == stats.today));
    }

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(14); 7])
        .split(inner_area);

    for (i, (label, total, is_today)) in days_data.into_iter().enumerate() {
        let col_area = columns[i];

        let bar_label_split = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(0), Constraint::Length(1)])
            .split(col_area);

        let bar_area = bar_label_split[0];
        let label_area = bar_label_split[1];

        // Center the bar horizontally within the column
        let bar_width = 5.min(bar_area.width);
        let bar_x_offset = (bar_area.width - bar_width) / 2;
        let centered_bar_area = Rect::new(
            bar_area.x + bar_x_offset,
            bar_area.y,
            bar_width,
            bar_area.height,
        );

        let label_style = if is_today {
            Style::default().add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };
        frame.render_widget(
            Paragraph::new(Span::styled(label, label_style)).alignment(Alignment::Center),
            label_area,
        );

        if centered_bar_area.height > 0 {
            let total_height = centered_bar_area.height as i64;
            let bar_height = (total * total_height / max_total_secs) as u16;

            let bar_chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([
                    Constraint::Length(centered_bar_area.height.saturating_sub(bar_height)),
                    Constraint::Length(bar_height),
                ])
                .split(centered_bar_area);

            if bar_height > 0 {
                let color = if is_today { Color::Cyan } else { Color::Blue };
                frame.render_widget(Block::default().bg(color), bar_chunks[1]);
            }
        }
    }
}

fn draw_footer(frame: &mut Frame, area: Rect) {
    let help = Paragraph::new(
        "'s' start | 'p' pause | 'k' skip | 'r' reset | 'q' quit",
    )
    .block(Block::default().borders(Borders::ALL))
    .alignment(Alignment::Center);
    frame.render_widget(help, area);
}
