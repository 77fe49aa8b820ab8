use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};

pub(crate) fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

pub(crate) fn point_in_rect(x: u16, y: u16, rect: Rect) -> bool {
    let right = rect.x.saturating_add(rect.width);
    let bottom = rect.y.saturating_add(rect.height);
    x >= rect.x && x < right && y >= rect.y && y < bottom
}

/// Maps a terminal row onto a data row of a bordered table with a one-line
/// header. `offset` is the first visible row of the table state.
pub(crate) fn table_row_index_at(area: Rect, mouse_row: u16, offset: usize) -> Option<usize> {
    if area.height <= 3 {
        return None;
    }
    let first_data_row = area.y.saturating_add(2);
    let last_data_row = area.y + area.height - 1;
    if mouse_row >= first_data_row && mouse_row < last_data_row {
        Some(usize::from(mouse_row - first_data_row) + offset)
    } else {
        None
    }
}

pub(crate) fn stars(rating: u8) -> String {
    let filled = usize::from(rating.min(5));
    format!("{}{}", "★".repeat(filled), "☆".repeat(5 - filled))
}

pub(crate) fn rating_style(rating: u8) -> Style {
    match rating {
        5 => Style::default()
            .fg(Color::Green)
            .add_modifier(Modifier::BOLD),
        4 => Style::default().fg(Color::LightGreen),
        3 => Style::default().fg(Color::Yellow),
        2 => Style::default().fg(Color::LightRed),
        _ => Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
    }
}

pub(crate) fn average_rating_style(average: f64) -> Style {
    if average <= 0.0 {
        Style::default().fg(Color::DarkGray)
    } else {
        rating_style(average.round().clamp(1.0, 5.0) as u8)
    }
}

/// Cuts `text` to at most `max` characters, marking the cut with an ellipsis.
pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out = text.chars().take(max.saturating_sub(1)).collect::<String>();
    out.push('…');
    out
}
