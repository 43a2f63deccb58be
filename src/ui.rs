use lapclock::{
    clock::Clock,
    format::{format_duration, format_timestamp},
    persistence::BlobStore,
    scheduler::Scheduler,
    settings::SettingsField,
    timer::ButtonStates,
};
use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, Widget, Wrap},
};
use unicode_width::UnicodeWidthStr;

use crate::{App, Screen};

const HORIZONTAL_MARGIN: u16 = 5;
const VERTICAL_MARGIN: u16 = 1;
const ALERT_WIDTH: u16 = 50;

impl<C: Clock, S: Scheduler, B: BlobStore> Widget for &App<C, S, B> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        match self.screen() {
            Screen::Settings => render_settings(self, area, buf),
            Screen::Clock => render_clock(self, area, buf),
        }

        if let Some(message) = &self.alert {
            render_alert(message, area, buf);
        }
    }
}

fn bold() -> Style {
    Style::default().add_modifier(Modifier::BOLD)
}

fn dim() -> Style {
    Style::default().add_modifier(Modifier::DIM)
}

fn render_settings<C: Clock, S: Scheduler, B: BlobStore>(
    app: &App<C, S, B>,
    area: Rect,
    buf: &mut Buffer,
) {
    let form = &app.form;

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .horizontal_margin(HORIZONTAL_MARGIN)
        .vertical_margin(VERTICAL_MARGIN)
        .constraints([
            Constraint::Min(0),
            Constraint::Length(4), // countdown group
            Constraint::Length(1),
            Constraint::Length(4), // threshold group
            Constraint::Min(0),
            Constraint::Length(1), // shortcuts
        ])
        .split(area);

    let fields = SettingsField::ALL;
    let groups = [
        ("Countdown Timer", &fields[..3], form.target_error()),
        ("Threshold", &fields[3..], form.threshold_error()),
    ];

    for ((title, fields, error), chunk) in groups.into_iter().zip([chunks[1], chunks[3]]) {
        let mut inputs: Vec<Span> = Vec::new();
        let mut labels: Vec<Span> = Vec::new();
        for (idx, field) in fields.iter().enumerate() {
            if idx > 0 {
                inputs.push(Span::styled(" : ", bold()));
                labels.push(Span::raw("   "));
            }
            let style = if *field == form.focused() {
                bold().fg(Color::Black).bg(Color::Cyan)
            } else {
                bold()
            };
            inputs.push(Span::styled(format!("{:>2}", form.text(*field)), style));
            labels.push(Span::styled(unit_hint(*field), dim()));
        }

        let mut lines = vec![
            Line::from(Span::styled(title, bold().fg(Color::Cyan))),
            Line::from(inputs),
            Line::from(labels),
        ];
        if let Some(error) = error {
            lines.push(Line::from(Span::styled(error, Style::default().fg(Color::Red))));
        }

        Paragraph::new(lines)
            .alignment(Alignment::Center)
            .render(chunk, buf);
    }

    Paragraph::new(Span::styled(
        "(enter) start  (tab) next field  (esc) quit",
        Style::default().fg(Color::Gray).add_modifier(Modifier::ITALIC),
    ))
    .alignment(Alignment::Center)
    .render(chunks[5], buf);
}

fn unit_hint(field: SettingsField) -> &'static str {
    match field.label() {
        "Hours" => "hh",
        "Minutes" => "mm",
        _ => "ss",
    }
}

fn render_clock<C: Clock, S: Scheduler, B: BlobStore>(
    app: &App<C, S, B>,
    area: Rect,
    buf: &mut Buffer,
) {
    let timer = app.session.timer();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .horizontal_margin(HORIZONTAL_MARGIN)
        .vertical_margin(VERTICAL_MARGIN)
        .constraints([
            Constraint::Length(3), // display
            Constraint::Length(1), // buttons
            Constraint::Length(1),
            Constraint::Length(1), // params
            Constraint::Length(1),
            Constraint::Min(3), // laps
            Constraint::Length(1), // shortcuts
        ])
        .split(area);

    let display_style = if timer.is_beyond_threshold() {
        bold().fg(Color::Red)
    } else {
        bold()
    };
    Paragraph::new(vec![
        Line::from(Span::styled(timer.state().to_string(), dim())),
        Line::from(Span::styled(timer.display(), display_style)),
    ])
    .alignment(Alignment::Center)
    .render(chunks[0], buf);

    Paragraph::new(Line::from(button_spans(&timer.button_states())))
        .alignment(Alignment::Center)
        .render(chunks[1], buf);

    let params = timer.clock_params();
    let summary = format!(
        "Timer Value {}   Threshold {}   Current Lap {}",
        params.target, params.threshold, params.current_lap
    );
    let summary_width = summary.width() as u16;
    let summary_area = centered(
        chunks[3],
        summary_width.min(chunks[3].width),
        chunks[3].height.min(1),
    );
    Paragraph::new(Span::styled(summary, Style::default().fg(Color::Cyan)))
        .render(summary_area, buf);

    render_laps(app, chunks[5], buf);

    Paragraph::new(Span::styled(
        "(p)ause/resume  (space) split  (backspace) undo  (r)eset  (b)ack  (esc) quit",
        Style::default().fg(Color::Gray).add_modifier(Modifier::ITALIC),
    ))
    .alignment(Alignment::Center)
    .wrap(Wrap { trim: true })
    .render(chunks[6], buf);
}

fn button_spans(buttons: &ButtonStates) -> Vec<Span<'static>> {
    let entries = [
        (buttons.pause_label, buttons.pause_enabled),
        ("Split", buttons.split_enabled),
        ("Undo", buttons.undo_enabled),
        ("Reset", buttons.reset_enabled),
        ("Back", true),
    ];

    let mut spans = Vec::new();
    for (idx, (label, enabled)) in entries.into_iter().enumerate() {
        if idx > 0 {
            spans.push(Span::raw("  "));
        }
        let style = if enabled {
            bold().fg(Color::Green)
        } else {
            dim()
        };
        spans.push(Span::styled(format!("[{label}]"), style));
    }
    spans
}

fn render_laps<C: Clock, S: Scheduler, B: BlobStore>(
    app: &App<C, S, B>,
    area: Rect,
    buf: &mut Buffer,
) {
    let timer = app.session.timer();
    let block = Block::default().borders(Borders::ALL).title(" Laps ");

    if timer.laps().is_empty() {
        Paragraph::new(Span::styled("No Laps yet", dim()))
            .alignment(Alignment::Center)
            .block(block)
            .render(area, buf);
        return;
    }

    let threshold = timer.snapshot().threshold_time;
    let header = Row::new(vec!["#", "Start", "End", "Duration"]).style(bold());

    // keep the most recent laps visible when the table overflows
    let visible = area.height.saturating_sub(3) as usize;
    let skip = timer.laps().len().saturating_sub(visible);

    let rows = timer.laps().iter().skip(skip).map(|lap| {
        let style = if lap.is_beyond_threshold(threshold) {
            Style::default().fg(Color::Red)
        } else {
            Style::default()
        };
        Row::new(vec![
            Cell::from(lap.sequence_number.to_string()),
            Cell::from(format_timestamp(lap.start_time)),
            Cell::from(format_timestamp(lap.end_time)),
            Cell::from(format_duration(lap.duration_ms, true)),
        ])
        .style(style)
    });

    Table::new(
        rows,
        [
            Constraint::Length(4),
            Constraint::Length(10),
            Constraint::Length(10),
            Constraint::Min(12),
        ],
    )
    .header(header)
    .block(block)
    .render(area, buf);
}

fn render_alert(message: &str, area: Rect, buf: &mut Buffer) {
    let width = ALERT_WIDTH.min(area.width);
    let popup = centered(area, width, 5.min(area.height));

    Clear.render(popup, buf);
    Paragraph::new(vec![
        Line::from(Span::styled(message, bold().fg(Color::Yellow))),
        Line::from(""),
        Line::from(Span::styled("press any key", dim())),
    ])
    .alignment(Alignment::Center)
    .wrap(Wrap { trim: true })
    .block(Block::default().borders(Borders::ALL))
    .render(popup, buf);
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    Rect {
        x: area.x + area.width.saturating_sub(width) / 2,
        y: area.y + area.height.saturating_sub(height) / 2,
        width,
        height,
    }
}
