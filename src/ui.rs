use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Widget, Wrap},
};
use typetest::{
    runtime::TimeSource,
    session::{FinalResults, MetricsSnapshot, Phase, TypingSession},
    store::ScoreStore,
};
use unicode_width::UnicodeWidthStr;

use crate::App;

const HORIZONTAL_MARGIN: u16 = 5;
const VERTICAL_MARGIN: u16 = 2;

pub fn phase_label<S: ScoreStore, T: TimeSource>(session: &TypingSession<S, T>) -> String {
    if session.is_armed() {
        "READY".to_string()
    } else {
        session.phase().to_string().to_uppercase()
    }
}

pub fn stats_line(snapshot: &MetricsSnapshot, best_wpm: u32) -> String {
    format!(
        "time {}s   wpm {}   accuracy {}%   chars {}   best {}",
        snapshot.time_remaining_secs,
        snapshot.wpm,
        snapshot.accuracy_percent,
        snapshot.typed_char_count,
        best_wpm
    )
}

pub fn help_line<S: ScoreStore, T: TimeSource>(session: &TypingSession<S, T>) -> &'static str {
    match session.phase() {
        Phase::Idle if session.is_armed() => "start typing, the clock starts on your first key",
        Phase::Idle => "enter to start · tab to change duration · esc to quit",
        Phase::Running => "ctrl+r to restart · esc to quit",
        Phase::Finished => "enter for a new test · tab to change duration · esc to quit",
    }
}

fn results_lines(results: &FinalResults) -> Vec<Line<'static>> {
    let bold = Style::default().add_modifier(Modifier::BOLD);
    let mut best = vec![Span::styled(format!("best {} wpm", results.best_wpm), bold)];
    if results.new_best {
        best.push(Span::styled(
            "  new best!",
            Style::default().patch(bold).fg(Color::Magenta),
        ));
    }

    vec![
        Line::from(Span::styled(
            format!(
                "{} wpm   {}% acc   {} chars",
                results.metrics.wpm,
                results.metrics.accuracy_percent,
                results.metrics.typed_char_count
            ),
            bold,
        )),
        Line::from(best),
    ]
}

impl<S: ScoreStore, T: TimeSource> Widget for &App<S, T> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let session = &self.session;
        // styles
        let bold_style = Style::default().add_modifier(Modifier::BOLD);

        let green_bold_style = Style::default().patch(bold_style).fg(Color::Green);
        let red_bold_style = Style::default().patch(bold_style).fg(Color::Red);

        let dim_bold_style = Style::default()
            .patch(bold_style)
            .add_modifier(Modifier::DIM);

        let underlined_dim_bold_style = Style::default()
            .patch(dim_bold_style)
            .add_modifier(Modifier::UNDERLINED);

        let italic_style = Style::default().add_modifier(Modifier::ITALIC);

        let reference = session.reference_text();
        let max_chars_per_line = area
            .width
            .saturating_sub(HORIZONTAL_MARGIN * 2)
            .max(1);
        let prompt_occupied_lines = if reference.width() <= max_chars_per_line as usize {
            1
        } else {
            ((reference.width() as f64 / max_chars_per_line as f64).ceil() + 1.0) as u16
        };

        let results = session.results();
        let results_height = if results.is_some() { 4 } else { 0 };

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .horizontal_margin(HORIZONTAL_MARGIN)
            .vertical_margin(VERTICAL_MARGIN)
            .constraints([
                Constraint::Length(1), // header
                Constraint::Length(1), // live stats
                Constraint::Length(1), // padding
                Constraint::Min(prompt_occupied_lines),
                Constraint::Length(results_height),
                Constraint::Length(1), // help
            ])
            .split(area);

        let header = Paragraph::new(Span::styled(
            format!(
                "typetest · {}s · {}",
                session.config().duration_secs,
                phase_label(session)
            ),
            dim_bold_style,
        ))
        .alignment(Alignment::Center);
        header.render(chunks[0], buf);

        let stats = Paragraph::new(Span::styled(
            stats_line(&session.metrics_snapshot(), session.best_wpm()),
            bold_style,
        ))
        .alignment(Alignment::Center);
        stats.render(chunks[1], buf);

        let typed: Vec<char> = session.typed_text().chars().collect();
        let cursor_visible = session.accepts_input();

        let mut spans = reference
            .chars()
            .enumerate()
            .map(|(idx, expected)| match typed.get(idx) {
                Some(&actual) if actual == expected => {
                    Span::styled(expected.to_string(), green_bold_style)
                }
                Some(&actual) => Span::styled(
                    match actual {
                        ' ' => "·".to_owned(),
                        c => c.to_string(),
                    },
                    red_bold_style,
                ),
                None if idx == typed.len() && cursor_visible => {
                    Span::styled(expected.to_string(), underlined_dim_bold_style)
                }
                None => Span::styled(expected.to_string(), dim_bold_style),
            })
            .collect::<Vec<Span>>();

        // overflow past the end of the reference is always wrong
        let overflow: String = typed.iter().skip(reference.chars().count()).collect();
        if !overflow.is_empty() {
            spans.push(Span::styled(overflow, red_bold_style));
        }

        let widget = Paragraph::new(Line::from(spans))
            .alignment(if prompt_occupied_lines == 1 {
                // when the prompt is small enough to fit on one line
                // centering the text gives a nice zen feeling
                Alignment::Center
            } else {
                Alignment::Left
            })
            .wrap(Wrap { trim: true });
        widget.render(chunks[3], buf);

        if let Some(results) = results {
            let panel = Paragraph::new(results_lines(&results))
                .block(Block::default().borders(Borders::ALL).title("results"))
                .alignment(Alignment::Center);
            panel.render(chunks[4], buf);
        }

        let help = Paragraph::new(Span::styled(help_line(session), italic_style))
            .alignment(Alignment::Center);
        help.render(chunks[5], buf);
    }
}
