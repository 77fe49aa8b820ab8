use std::io::{self, Stdout};
use std::time::{Duration, Instant};

use chrono::Local;
use crossterm::event::{self, Event, KeyCode, KeyModifiers, MouseButton, MouseEventKind};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, TableState, Wrap};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::{info, warn};

use super::api::Review;
use super::config::Settings;
use super::data_io::{default_export_path, detect_data_format, export_reviews};
use super::poller::PollControl;
use super::runtime::{ExportTarget, Viewer};
use super::types::{FocusPane, ReviewSortMode, SortDirection, ViewerEvent};
use super::ui_utils::{
    average_rating_style, centered_rect, point_in_rect, rating_style, stars,
    table_row_index_at, truncate_chars,
};

const PAGE_JUMP_STEP: usize = 10;

pub(crate) fn draw_loop(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    mut viewer: Viewer,
    settings: &Settings,
    control_tx: &UnboundedSender<PollControl>,
    export: &ExportTarget,
    rx: &mut UnboundedReceiver<ViewerEvent>,
) -> io::Result<()> {
    let mut last_tick = Instant::now();
    let tick_rate = Duration::from_millis(120);
    let mut focus = FocusPane::Apps;
    let mut sort_mode = ReviewSortMode::Newest;
    let mut sort_direction = SortDirection::Desc;
    let mut filter_input = String::new();
    let mut filter_mode = false;
    let mut help_mode = false;
    let mut paused = false;
    let mut selected_app_idx = 0usize;
    let mut selected_review_idx = 0usize;
    let mut app_table_state = TableState::default();
    let mut review_table_state = TableState::default();
    let mut apps_area: Option<Rect> = None;
    let mut reviews_area: Option<Rect> = None;
    let mut visible_reviews = 0usize;
    let mut synced_cursor: Option<(Option<String>, usize)> = None;

    loop {
        while let Ok(event) = rx.try_recv() {
            viewer.handle_event(event);
        }

        // Follow the opened app with the cursor whenever it changes outside
        // of the apps pane (history navigation, catalog reload).
        let cursor_key = (viewer.state.selected_app.clone(), viewer.state.apps.len());
        if synced_cursor.as_ref() != Some(&cursor_key) {
            if let Some(idx) = cursor_key
                .0
                .as_deref()
                .and_then(|id| viewer.state.app_index(id))
            {
                selected_app_idx = idx;
            }
            synced_cursor = Some(cursor_key);
        }

        let active_filter = if filter_mode {
            filter_input.clone()
        } else {
            viewer.filter.clone()
        };

        terminal.draw(|f| {
            apps_area = None;
            reviews_area = None;

            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([
                    Constraint::Length(5),
                    Constraint::Min(10),
                    Constraint::Length(5),
                ])
                .split(f.area());

            let header = Paragraph::new(header_lines(
                &viewer,
                settings,
                &active_filter,
                filter_mode,
                sort_mode,
                sort_direction,
                paused,
            ))
            .block(
                Block::default()
                    .title("reviewdeck (press ? for help, q to quit)")
                    .borders(Borders::ALL),
            );
            f.render_widget(header, chunks[0]);

            let body = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(32), Constraint::Percentage(68)])
                .split(chunks[1]);

            let apps = &viewer.state.apps;
            if apps.is_empty() {
                selected_app_idx = 0;
                app_table_state.select(None);
            } else {
                selected_app_idx = selected_app_idx.min(apps.len() - 1);
                app_table_state.select(Some(selected_app_idx));
            }
            let app_rows = apps.iter().map(|app| {
                let open = viewer.state.selected_app.as_deref() == Some(app.id.as_str());
                Row::new(vec![
                    Cell::from(if open { "●" } else { " " })
                        .style(Style::default().fg(Color::Cyan)),
                    Cell::from(app.name.clone()),
                    Cell::from(app.developer.clone().unwrap_or_default())
                        .style(Style::default().fg(Color::Gray)),
                ])
            });
            let apps_title = if viewer.state.apps_loaded {
                format!("Apps ({})", apps.len())
            } else {
                "Apps (loading...)".to_string()
            };
            let apps_table = Table::new(
                app_rows,
                [
                    Constraint::Length(1),
                    Constraint::Min(12),
                    Constraint::Length(16),
                ],
            )
            .header(
                Row::new(vec!["", "Name", "Developer"])
                    .style(Style::default().add_modifier(Modifier::BOLD)),
            )
            .row_highlight_style(
                Style::default()
                    .bg(Color::DarkGray)
                    .add_modifier(Modifier::BOLD),
            )
            .block(
                Block::default()
                    .title(apps_title)
                    .borders(Borders::ALL)
                    .border_style(pane_border_style(focus == FocusPane::Apps)),
            )
            .column_spacing(1);
            apps_area = Some(body[0]);
            f.render_stateful_widget(apps_table, body[0], &mut app_table_state);

            let review_chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Min(6), Constraint::Length(9)])
                .split(body[1]);

            let reviews = viewer
                .state
                .filtered_reviews(&active_filter, sort_mode, sort_direction);
            visible_reviews = reviews.len();
            if reviews.is_empty() {
                selected_review_idx = 0;
                review_table_state.select(None);
            } else {
                selected_review_idx = selected_review_idx.min(reviews.len() - 1);
                review_table_state.select(Some(selected_review_idx));
            }
            let review_rows = reviews.iter().map(|review| {
                let is_new = viewer.state.new_review_ids.contains(&review.id);
                Row::new(vec![
                    Cell::from(if is_new { "NEW" } else { "" }).style(
                        Style::default()
                            .fg(Color::Yellow)
                            .add_modifier(Modifier::BOLD),
                    ),
                    Cell::from(stars(review.rating)).style(rating_style(review.rating)),
                    Cell::from(
                        review
                            .submitted_at
                            .with_timezone(&Local)
                            .format("%Y-%m-%d %H:%M")
                            .to_string(),
                    ),
                    Cell::from(truncate_chars(&review.author, 16)),
                    Cell::from(review_headline(review)),
                ])
            });
            let reviews_title = match viewer.state.selected_app_entry() {
                Some(app) => format!(
                    "Reviews: {} ({}/{}){}",
                    app.name,
                    reviews.len(),
                    viewer.state.reviews.len(),
                    if viewer.state.loading_reviews {
                        " refreshing..."
                    } else {
                        ""
                    }
                ),
                None => "Reviews (select an app)".to_string(),
            };
            let reviews_table = Table::new(
                review_rows,
                [
                    Constraint::Length(3),
                    Constraint::Length(5),
                    Constraint::Length(16),
                    Constraint::Length(16),
                    Constraint::Min(20),
                ],
            )
            .header(
                Row::new(vec!["", "Stars", "Submitted", "Author", "Title"])
                    .style(Style::default().add_modifier(Modifier::BOLD)),
            )
            .row_highlight_style(
                Style::default()
                    .bg(Color::DarkGray)
                    .add_modifier(Modifier::BOLD),
            )
            .block(
                Block::default()
                    .title(reviews_title)
                    .borders(Borders::ALL)
                    .border_style(pane_border_style(focus == FocusPane::Reviews)),
            )
            .column_spacing(1);
            reviews_area = Some(review_chunks[0]);
            f.render_stateful_widget(reviews_table, review_chunks[0], &mut review_table_state);

            let detail = match reviews.get(selected_review_idx) {
                Some(review) => review_detail_lines(
                    review,
                    viewer.state.new_review_ids.contains(&review.id),
                ),
                None => vec![Line::from(Span::styled(
                    if viewer.state.selected_app.is_some() {
                        "No reviews match."
                    } else {
                        "Open an app with enter or a click to see its reviews."
                    },
                    Style::default().fg(Color::DarkGray),
                ))],
            };
            f.render_widget(
                Paragraph::new(detail)
                    .block(Block::default().title("Review").borders(Borders::ALL))
                    .wrap(Wrap { trim: true }),
                review_chunks[1],
            );

            let footer_border_style = if viewer.state.error.is_some() {
                Style::default().fg(Color::Red)
            } else {
                Style::default().fg(Color::DarkGray)
            };
            let footer = Paragraph::new(footer_lines(&viewer))
                .block(
                    Block::default()
                        .title("Status")
                        .borders(Borders::ALL)
                        .border_style(footer_border_style),
                )
                .wrap(Wrap { trim: true });
            f.render_widget(footer, chunks[2]);

            if help_mode {
                let area = centered_rect(70, 70, f.area());
                f.render_widget(Clear, area);
                f.render_widget(
                    Paragraph::new(help_lines())
                        .block(
                            Block::default()
                                .title("Help")
                                .borders(Borders::ALL)
                                .border_style(Style::default().fg(Color::Yellow)),
                        )
                        .wrap(Wrap { trim: true }),
                    area,
                );
            }
        })?;

        let timeout = tick_rate.saturating_sub(last_tick.elapsed());
        if event::poll(timeout)? {
            match event::read()? {
                Event::Key(key) => {
                    if help_mode {
                        match key.code {
                            KeyCode::Esc | KeyCode::Enter | KeyCode::Char('?') => {
                                help_mode = false;
                            }
                            _ => {}
                        }
                    } else if filter_mode {
                        match key.code {
                            KeyCode::Esc => filter_mode = false,
                            KeyCode::Enter => {
                                filter_mode = false;
                                viewer.commit_filter(&filter_input);
                                selected_review_idx = 0;
                            }
                            KeyCode::Backspace => {
                                filter_input.pop();
                            }
                            KeyCode::Char('u')
                                if key.modifiers.contains(KeyModifiers::CONTROL) =>
                            {
                                filter_input.clear();
                            }
                            KeyCode::Char(ch) => {
                                if !key
                                    .modifiers
                                    .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT)
                                {
                                    filter_input.push(ch);
                                }
                            }
                            _ => {}
                        }
                    } else {
                        match key.code {
                            KeyCode::Char('q') => break,
                            KeyCode::Char('c')
                                if key.modifiers.contains(KeyModifiers::CONTROL) =>
                            {
                                break;
                            }
                            KeyCode::Tab | KeyCode::BackTab => focus = focus.cycle(),
                            KeyCode::Char('?') => help_mode = true,
                            KeyCode::Char('/') => {
                                filter_input = viewer.filter.clone();
                                filter_mode = true;
                            }
                            KeyCode::Char('s') => sort_mode = sort_mode.cycle(),
                            KeyCode::Char('d') => sort_direction = sort_direction.toggle(),
                            KeyCode::Char('b') | KeyCode::Left => {
                                if viewer.back() {
                                    selected_review_idx = 0;
                                } else {
                                    viewer.push_status("no earlier location".to_string());
                                }
                            }
                            KeyCode::Char('f') | KeyCode::Right => {
                                if viewer.forward() {
                                    selected_review_idx = 0;
                                } else {
                                    viewer.push_status("no later location".to_string());
                                }
                            }
                            KeyCode::Char('r') => {
                                send_control(&mut viewer, control_tx, PollControl::RefreshNow);
                            }
                            KeyCode::Char('R') => {
                                send_control(&mut viewer, control_tx, PollControl::ReloadApps);
                            }
                            KeyCode::Char(' ') => {
                                paused = !paused;
                                send_control(
                                    &mut viewer,
                                    control_tx,
                                    PollControl::SetPaused(paused),
                                );
                            }
                            KeyCode::Char('e') => export_visible(
                                &mut viewer,
                                export,
                                sort_mode,
                                sort_direction,
                            ),
                            KeyCode::Enter => {
                                if focus == FocusPane::Apps {
                                    open_app_at(&mut viewer, selected_app_idx);
                                    selected_review_idx = 0;
                                }
                            }
                            KeyCode::Up | KeyCode::Char('k') => match focus {
                                FocusPane::Apps => {
                                    selected_app_idx = selected_app_idx.saturating_sub(1);
                                }
                                FocusPane::Reviews => {
                                    selected_review_idx = selected_review_idx.saturating_sub(1);
                                }
                            },
                            KeyCode::Down | KeyCode::Char('j') => match focus {
                                FocusPane::Apps => {
                                    selected_app_idx = selected_app_idx.saturating_add(1);
                                }
                                FocusPane::Reviews => {
                                    selected_review_idx = selected_review_idx.saturating_add(1);
                                }
                            },
                            KeyCode::PageUp => match focus {
                                FocusPane::Apps => {
                                    selected_app_idx =
                                        selected_app_idx.saturating_sub(PAGE_JUMP_STEP);
                                }
                                FocusPane::Reviews => {
                                    selected_review_idx =
                                        selected_review_idx.saturating_sub(PAGE_JUMP_STEP);
                                }
                            },
                            KeyCode::PageDown => match focus {
                                FocusPane::Apps => {
                                    selected_app_idx =
                                        selected_app_idx.saturating_add(PAGE_JUMP_STEP);
                                }
                                FocusPane::Reviews => {
                                    selected_review_idx =
                                        selected_review_idx.saturating_add(PAGE_JUMP_STEP);
                                }
                            },
                            KeyCode::Home | KeyCode::Char('g') => match focus {
                                FocusPane::Apps => selected_app_idx = 0,
                                FocusPane::Reviews => selected_review_idx = 0,
                            },
                            KeyCode::End | KeyCode::Char('G') => match focus {
                                FocusPane::Apps => {
                                    selected_app_idx = viewer.state.apps.len().saturating_sub(1);
                                }
                                FocusPane::Reviews => {
                                    selected_review_idx = visible_reviews.saturating_sub(1);
                                }
                            },
                            _ => {}
                        }
                    }
                }
                Event::Mouse(mouse) => {
                    if help_mode || filter_mode {
                        continue;
                    }
                    let over_apps =
                        apps_area.filter(|area| point_in_rect(mouse.column, mouse.row, *area));
                    let over_reviews =
                        reviews_area.filter(|area| point_in_rect(mouse.column, mouse.row, *area));
                    match mouse.kind {
                        MouseEventKind::Down(MouseButton::Left) => {
                            if let Some(area) = over_apps
                                && let Some(row_idx) =
                                    table_row_index_at(area, mouse.row, app_table_state.offset())
                                && row_idx < viewer.state.apps.len()
                            {
                                focus = FocusPane::Apps;
                                selected_app_idx = row_idx;
                                open_app_at(&mut viewer, row_idx);
                                selected_review_idx = 0;
                            } else if let Some(area) = over_reviews
                                && let Some(row_idx) = table_row_index_at(
                                    area,
                                    mouse.row,
                                    review_table_state.offset(),
                                )
                                && row_idx < visible_reviews
                            {
                                focus = FocusPane::Reviews;
                                selected_review_idx = row_idx;
                            }
                        }
                        MouseEventKind::ScrollDown => {
                            if over_apps.is_some() {
                                selected_app_idx = selected_app_idx.saturating_add(1);
                            } else if over_reviews.is_some() {
                                selected_review_idx = selected_review_idx.saturating_add(1);
                            }
                        }
                        MouseEventKind::ScrollUp => {
                            if over_apps.is_some() {
                                selected_app_idx = selected_app_idx.saturating_sub(1);
                            } else if over_reviews.is_some() {
                                selected_review_idx = selected_review_idx.saturating_sub(1);
                            }
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
        }

        if last_tick.elapsed() >= tick_rate {
            last_tick = Instant::now();
        }
    }

    info!(location = %viewer.location(), "viewer closed");
    Ok(())
}

fn open_app_at(viewer: &mut Viewer, idx: usize) {
    let Some(app_id) = viewer.state.apps.get(idx).map(|app| app.id.clone()) else {
        return;
    };
    viewer.select_app(&app_id);
}

fn send_control(
    viewer: &mut Viewer,
    control_tx: &UnboundedSender<PollControl>,
    control: PollControl,
) {
    if control_tx.send(control).is_err() {
        warn!(?control, "poller control channel is closed");
        viewer
            .state
            .push_error("poller control channel is closed".to_string());
    }
}

fn export_visible(
    viewer: &mut Viewer,
    export: &ExportTarget,
    sort_mode: ReviewSortMode,
    sort_direction: SortDirection,
) {
    if viewer.state.selected_app_entry().is_none() {
        viewer
            .state
            .push_error("open an app before exporting".to_string());
        return;
    }
    let outcome = {
        let Some(app) = viewer.state.selected_app_entry() else {
            return;
        };
        let path = export
            .path
            .clone()
            .unwrap_or_else(|| default_export_path(&app.id, export.format));
        let format = detect_data_format(&path, export.format);
        let reviews = viewer
            .state
            .filtered_reviews(&viewer.filter, sort_mode, sort_direction);
        export_reviews(&path, format, app, reviews).map(|written| (path, written))
    };
    match outcome {
        Ok((path, written)) => {
            info!(path = %path, written, "reviews exported");
            viewer.push_status(format!("exported {written} reviews to {path}"));
        }
        Err(err) => {
            warn!(error = %err, "export failed");
            viewer.state.push_error(format!("export failed: {err}"));
        }
    }
}

fn pane_border_style(focused: bool) -> Style {
    if focused {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default().fg(Color::DarkGray)
    }
}

fn review_headline(review: &Review) -> String {
    let text = if review.title.trim().is_empty() {
        review.content.lines().next().unwrap_or_default()
    } else {
        review.title.as_str()
    };
    truncate_chars(text.trim(), 80)
}

fn header_lines(
    viewer: &Viewer,
    settings: &Settings,
    filter: &str,
    filter_mode: bool,
    sort_mode: ReviewSortMode,
    sort_direction: SortDirection,
    paused: bool,
) -> Vec<Line<'static>> {
    let label = Style::default().fg(Color::Gray);
    let sep = Span::styled("  |  ", Style::default().fg(Color::DarkGray));
    let summary = viewer.state.rating_summary();
    let (history_pos, history_len) = viewer.history.position();

    let mut histogram = vec![Span::styled("  ", label)];
    for stars_idx in (0..5).rev() {
        let rating = stars_idx as u8 + 1;
        histogram.push(Span::styled(format!("{rating}★ "), rating_style(rating)));
        histogram.push(Span::raw(format!("{}  ", summary.histogram[stars_idx])));
    }

    let poll_state = if paused {
        Span::styled("paused", Style::default().fg(Color::Yellow))
    } else if viewer.state.loading_reviews {
        Span::styled("refreshing", Style::default().fg(Color::Cyan))
    } else {
        Span::styled("live", Style::default().fg(Color::Green))
    };

    let mut summary_line = vec![
        Span::styled("App ", label),
        Span::styled(
            viewer
                .state
                .selected_app_entry()
                .map(|app| match &app.platform {
                    Some(platform) => format!("{} [{platform}]", app.name),
                    None => app.name.clone(),
                })
                .unwrap_or_else(|| "none".to_string()),
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        ),
        sep.clone(),
        Span::styled("Reviews ", label),
        Span::styled(
            summary.count.to_string(),
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        sep.clone(),
        Span::styled("Avg ", label),
        Span::styled(
            if summary.count == 0 {
                "-".to_string()
            } else {
                format!("{:.2}", summary.average)
            },
            average_rating_style(summary.average),
        ),
    ];
    summary_line.extend(histogram);

    vec![
        Line::from(vec![
            Span::styled("Location ", label),
            Span::styled(
                viewer.location().to_path(),
                Style::default().fg(Color::LightCyan),
            ),
            Span::styled(format!("  ({history_pos}/{history_len})"), label),
            sep.clone(),
            Span::styled("API ", label),
            Span::raw(settings.api_url.clone()),
        ]),
        Line::from(summary_line),
        Line::from(vec![
            Span::styled("Last refresh ", label),
            Span::raw(
                viewer
                    .state
                    .last_refresh
                    .map(|at| at.with_timezone(&Local).format("%H:%M:%S").to_string())
                    .unwrap_or_else(|| "never".to_string()),
            ),
            Span::styled(format!(" every {}s ", settings.poll_interval.as_secs()), label),
            poll_state,
            Span::styled(format!(" ({} polls)", viewer.state.poll_count), label),
            sep.clone(),
            Span::styled("Sort ", label),
            Span::raw(format!("{} {}", sort_mode.title(), sort_direction.label())),
            sep,
            Span::styled("Filter ", label),
            Span::styled(
                if filter_mode {
                    format!("{filter}▏")
                } else if filter.is_empty() {
                    "none".to_string()
                } else {
                    filter.to_string()
                },
                if filter_mode {
                    Style::default()
                        .fg(Color::Yellow)
                        .add_modifier(Modifier::BOLD)
                } else {
                    Style::default().fg(Color::White)
                },
            ),
        ]),
    ]
}

fn footer_lines(viewer: &Viewer) -> Vec<Line<'static>> {
    let error_line = match &viewer.state.error {
        Some(err) => Line::from(vec![
            Span::styled(
                "Error ",
                Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            ),
            Span::styled(err.clone(), Style::default().fg(Color::LightRed)),
        ]),
        None => Line::from(Span::styled("No errors", Style::default().fg(Color::Green))),
    };
    vec![
        error_line,
        Line::from(Span::styled(
            viewer
                .state
                .status_messages
                .front()
                .cloned()
                .unwrap_or_default(),
            Style::default().fg(Color::Gray),
        )),
        Line::from(Span::styled(
            "enter open  b/f back/forward  / filter  s sort  d direction  r refresh  R reload apps  space pause  e export",
            Style::default().fg(Color::DarkGray),
        )),
    ]
}

fn review_detail_lines(review: &Review, is_new: bool) -> Vec<Line<'static>> {
    let label = Style::default().fg(Color::Gray);
    let mut meta = vec![
        Span::styled(stars(review.rating), rating_style(review.rating)),
        Span::raw("  "),
        Span::styled(
            review.author.clone(),
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            format!(
                "  {}",
                review
                    .submitted_at
                    .with_timezone(&Local)
                    .format("%Y-%m-%d %H:%M")
            ),
            label,
        ),
    ];
    if let Some(version) = &review.version {
        meta.push(Span::styled(format!("  v{version}"), label));
    }
    if is_new {
        meta.push(Span::styled(
            "  NEW",
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ));
    }

    let mut lines = vec![Line::from(meta)];
    if !review.title.is_empty() {
        lines.push(Line::from(Span::styled(
            review.title.clone(),
            Style::default().add_modifier(Modifier::BOLD),
        )));
    }
    lines.extend(review.content.lines().map(|line| Line::from(line.to_string())));
    lines
}

fn help_lines() -> Vec<Line<'static>> {
    vec![
        Line::from(Span::styled(
            "Navigation",
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from("  up/down or j/k: move selection, pgup/pgdn: jump by 10"),
        Line::from("  g/G or home/end: first/last row, tab: switch pane"),
        Line::from("  enter or click: open the app under the cursor"),
        Line::from("  b/f or left/right: back/forward through visited locations"),
        Line::from(""),
        Line::from(Span::styled(
            "Actions",
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from("  s: cycle sort mode, d: sort direction"),
        Line::from("  /: edit filter (enter applies, esc cancels, ctrl+u clears)"),
        Line::from("  r: refresh now, R: reload the catalog, space: pause polling"),
        Line::from("  e: export the visible reviews"),
        Line::from(""),
        Line::from(Span::styled(
            "Filter syntax",
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from("  Free text: crash on start"),
        Line::from("  rating:<=2  stars:5  author:ann  title:sync  version:2.1  new"),
        Line::from("  Negate terms with ! or - (example: rating:<3 -version:1.0)"),
        Line::from(""),
        Line::from("Press ? or Esc to close."),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn review(title: &str, content: &str) -> Review {
        Review {
            id: "r1".to_string(),
            author: "ann".to_string(),
            rating: 2,
            title: title.to_string(),
            content: content.to_string(),
            version: Some("3.1".to_string()),
            submitted_at: Utc
                .with_ymd_and_hms(2026, 10, 1, 8, 0, 0)
                .single()
                .expect("valid timestamp"),
        }
    }

    fn line_text(line: &Line<'_>) -> String {
        line.spans.iter().map(|span| span.content.as_ref()).collect()
    }

    #[test]
    fn headline_prefers_title_then_first_content_line() {
        assert_eq!(review_headline(&review("Crashes", "body")), "Crashes");
        assert_eq!(review_headline(&review("  ", "first\nsecond")), "first");
    }

    #[test]
    fn detail_lists_meta_title_and_content_lines() {
        let lines = review_detail_lines(&review("Crashes", "one\ntwo"), true);
        let first = line_text(&lines[0]);
        assert!(first.starts_with("★★☆☆☆  ann"));
        assert!(first.contains("v3.1"));
        assert!(first.ends_with("NEW"));
        assert_eq!(line_text(&lines[1]), "Crashes");
        assert_eq!(lines.len(), 4);
    }
}
