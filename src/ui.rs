use crate::app::{App, AppMode};
use csv_editor::SortDir;
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table},
};

const HELP: &[(&str, &str)] = &[
    ("arrows / hjkl", "move selection"),
    ("PgUp / PgDn", "page"),
    ("g / G", "first / last row"),
    ("e / Enter", "edit cell"),
    ("a", "append empty row"),
    ("w / Ctrl-s", "save"),
    ("/", "filter rows by regex"),
    ("Esc", "clear filter"),
    ("s", "cycle sort on column"),
    ("q", "quit"),
];

pub fn draw(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Length(1),
                Constraint::Min(3),
                Constraint::Length(2),
            ]
            .as_ref(),
        )
        .split(f.size());

    draw_filter(f, chunks[0], app);
    draw_data(f, chunks[1], app);
    draw_status(f, chunks[2], app);
    if app.show_help {
        draw_help(f, f.size());
    }
}

fn draw_filter(f: &mut Frame, area: Rect, app: &App) {
    let label = Span::styled("Filter: ", Style::default().fg(Color::Cyan));
    let text = match app.mode {
        AppMode::Filtering => Span::raw(format!("{}_", app.filter_input)),
        _ => match app.view.active() {
            Some(filter) => Span::raw(filter.pattern().to_string()),
            None => Span::styled("(none, press /)", Style::default().fg(Color::DarkGray)),
        },
    };
    f.render_widget(Paragraph::new(Line::from(vec![label, text])), area);
}

fn draw_status(f: &mut Frame, area: Rect, app: &App) {
    let mode = match app.mode {
        AppMode::Normal => "NORMAL",
        AppMode::Editing { .. } => "EDIT",
        AppMode::Filtering => "FILTER",
    };
    let mut spans = vec![Span::styled(
        format!("[{mode}] "),
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD),
    )];
    if app.save_enabled {
        spans.push(Span::styled("[+] ", Style::default().fg(Color::Yellow)));
    }
    spans.push(Span::raw(format!(
        "{}/{} rows ",
        app.visible.len(),
        app.model.row_count()
    )));
    spans.push(Span::raw(&app.status));
    if let AppMode::Editing { .. } = app.mode {
        spans.push(Span::raw(format!(" | {}", app.edit_buffer)));
    }
    let p = Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::TOP));
    f.render_widget(p, area);
}

fn draw_data(f: &mut Frame, area: Rect, app: &mut App) {
    let title = format!(" {} ", app.path.display());
    let block = Block::default().borders(Borders::ALL).title(title);
    if app.model.column_count() == 0 {
        let p = Paragraph::new("Empty file: no header line").block(block);
        f.render_widget(p, area);
        return;
    }

    // borders and header row
    app.set_viewport_rows(area.height.saturating_sub(3).max(1) as usize);
    let app = &*app;

    let sort = app.view.sort();
    let header = Row::new(app.model.columns().iter().enumerate().map(|(idx, name)| {
        let marker = match sort {
            Some((col, SortDir::Asc)) if col == idx => " ▲",
            Some((col, SortDir::Desc)) if col == idx => " ▼",
            _ => "",
        };
        Cell::from(format!("{name}{marker}"))
    }))
    .style(
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD),
    );

    let columns = app.model.column_count();
    let rows: Vec<Row> = app
        .visible
        .iter()
        .enumerate()
        .skip(app.scroll)
        .take(app.viewport_rows)
        .map(|(pos, &model_row)| {
            let cells = (0..columns).map(move |col| {
                let selected = pos == app.sel_row && col == app.sel_col;
                match app.mode {
                    AppMode::Editing { row, col: ecol, .. }
                        if row == model_row && ecol == col =>
                    {
                        Cell::from(format!("{}_", app.edit_buffer))
                            .style(Style::default().bg(Color::Yellow).fg(Color::Black))
                    }
                    _ => {
                        let text = app.model.get_cell(model_row, col).unwrap_or("");
                        let cell = Cell::from(text.to_string());
                        if selected {
                            cell.style(Style::default().bg(Color::Blue).fg(Color::Black))
                        } else {
                            cell
                        }
                    }
                }
            });
            Row::new(cells)
        })
        .collect();

    let table = Table::new(rows, column_widths(area.width, columns))
        .header(header)
        .block(block)
        .column_spacing(1);

    f.render_widget(table, area);
}

fn draw_help(f: &mut Frame, screen: Rect) {
    let width = 44.min(screen.width);
    let height = (HELP.len() as u16 + 2).min(screen.height);
    let area = Rect {
        x: screen.x + (screen.width - width) / 2,
        y: screen.y + (screen.height - height) / 2,
        width,
        height,
    };
    let lines: Vec<Line> = HELP
        .iter()
        .map(|(keys, what)| {
            Line::from(vec![
                Span::styled(format!("{keys:<16}"), Style::default().fg(Color::Yellow)),
                Span::raw(*what),
            ])
        })
        .collect();
    let p = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Keys"));
    f.render_widget(Clear, area);
    f.render_widget(p, area);
}

fn column_widths(total_width: u16, cols: usize) -> Vec<Constraint> {
    if cols == 0 {
        return vec![];
    }
    // Evenly divide; borders and spacing come off the top
    let cols_u16 = u16::try_from(cols).unwrap_or(u16::MAX);
    let w = total_width.saturating_sub(cols_u16.saturating_sub(1).saturating_add(2));
    let per = (w / cols_u16.max(1)).max(1);
    (0..cols).map(|_| Constraint::Length(per)).collect()
}
