use std::cmp::min;
use std::path::PathBuf;

use crossbeam_channel::{Receiver, unbounded};
use tracing::debug;

use csv_editor::{FilterView, ModelEvent, SortDir, TableModel};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    Normal,
    Editing {
        row: usize,    // model row index
        col: usize,
        cursor: usize, // byte offset in edit buffer
    },
    Filtering,
}

pub struct App {
    pub should_quit: bool,

    // UI state
    pub mode: AppMode,
    pub status: String,
    pub show_help: bool,

    // Table
    pub model: TableModel,
    pub path: PathBuf,
    pub delimiter: String,
    pub view: FilterView,
    /// Model row indices in display order
    pub visible: Vec<usize>,

    // Cell selection; `sel_row` indexes into `visible`
    pub sel_row: usize,
    pub sel_col: usize,
    /// First visible entry of `visible` in the viewport
    pub scroll: usize,
    /// Data rows that fit in the viewport; set by the renderer
    pub viewport_rows: usize,

    // Editing
    pub edit_buffer: String,

    // Filter
    pub filter_input: String,

    /// Mirrors whether the model has changes worth saving
    pub save_enabled: bool,
    quit_armed: bool,

    events: Receiver<ModelEvent>,
}

impl App {
    pub fn new(mut model: TableModel, path: PathBuf, delimiter: String) -> Self {
        let (tx, rx) = unbounded();
        model.subscribe(move |event| {
            let _ = tx.send(event.clone());
        });
        let view = FilterView::new();
        let visible = view.visible_rows(&model);
        Self {
            should_quit: false,
            mode: AppMode::Normal,
            status: format!(
                "{}: {} rows, {} columns. Press ? for help",
                path.display(),
                model.row_count(),
                model.column_count()
            ),
            show_help: false,
            model,
            path,
            delimiter,
            view,
            visible,
            sel_row: 0,
            sel_col: 0,
            scroll: 0,
            viewport_rows: 20,
            edit_buffer: String::new(),
            filter_input: String::new(),
            save_enabled: false,
            quit_armed: false,
            events: rx,
        }
    }

    /// Drain model notifications. Returns true if anything changed.
    pub fn pump_events(&mut self) -> bool {
        let mut changed = false;
        while let Ok(event) = self.events.try_recv() {
            debug!(?event, "model changed");
            changed = true;
        }
        if changed {
            self.save_enabled = true;
            self.refresh_view();
        }
        changed
    }

    pub fn refresh_view(&mut self) {
        self.visible = self.view.visible_rows(&self.model);
        self.sel_row = min(self.sel_row, self.visible.len().saturating_sub(1));
        self.sel_col = min(self.sel_col, self.model.column_count().saturating_sub(1));
        self.ensure_visible();
    }

    pub fn selected_model_row(&self) -> Option<usize> {
        self.visible.get(self.sel_row).copied()
    }

    fn ensure_visible(&mut self) {
        let height = self.viewport_rows.max(1);
        if self.sel_row < self.scroll {
            self.scroll = self.sel_row;
        } else if self.sel_row >= self.scroll + height {
            self.scroll = self.sel_row + 1 - height;
        }
        self.scroll = min(self.scroll, self.visible.len().saturating_sub(height));
    }

    pub fn set_viewport_rows(&mut self, rows: usize) {
        if self.viewport_rows != rows {
            self.viewport_rows = rows;
            self.ensure_visible();
        }
    }

    // ===== Navigation =====

    pub fn move_cell_up(&mut self) {
        self.sel_row = self.sel_row.saturating_sub(1);
        self.ensure_visible();
    }

    pub fn move_cell_down(&mut self) {
        self.sel_row = min(self.sel_row + 1, self.visible.len().saturating_sub(1));
        self.ensure_visible();
    }

    pub fn move_cell_left(&mut self) {
        self.sel_col = self.sel_col.saturating_sub(1);
    }

    pub fn move_cell_right(&mut self) {
        self.sel_col = min(self.sel_col + 1, self.model.column_count().saturating_sub(1));
    }

    pub fn page_up(&mut self) {
        self.sel_row = self.sel_row.saturating_sub(self.viewport_rows.max(1));
        self.ensure_visible();
    }

    pub fn page_down(&mut self) {
        self.sel_row = min(
            self.sel_row + self.viewport_rows.max(1),
            self.visible.len().saturating_sub(1),
        );
        self.ensure_visible();
    }

    pub fn move_to_first_row(&mut self) {
        self.sel_row = 0;
        self.ensure_visible();
    }

    pub fn move_to_last_row(&mut self) {
        self.sel_row = self.visible.len().saturating_sub(1);
        self.ensure_visible();
    }

    pub fn toggle_help(&mut self) {
        self.show_help = !self.show_help;
    }

    // ===== Rows =====

    pub fn append_row(&mut self) {
        self.model.append_empty_row();
        self.pump_events();
        let new_row = self.model.row_count() - 1;
        match self.visible.iter().position(|&r| r == new_row) {
            Some(pos) => {
                self.sel_row = pos;
                self.ensure_visible();
                self.status = format!("Added row {}", new_row + 1);
            }
            None => {
                self.status = format!("Added row {} (hidden by filter)", new_row + 1);
            }
        }
    }

    // ===== Save / quit =====

    pub fn save(&mut self) {
        if !self.model.is_dirty() {
            self.status = "No changes to save".into();
            return;
        }
        match self.model.save(&self.path, &self.delimiter) {
            Ok(()) => {
                self.save_enabled = false;
                self.status = format!(
                    "Saved {} rows to {}",
                    self.model.row_count(),
                    self.path.display()
                );
            }
            Err(e) => {
                self.status = format!("Save failed: {e}");
            }
        }
    }

    /// Quit, asking once for confirmation while unsaved changes exist.
    pub fn request_quit(&mut self) {
        if self.model.is_dirty() && !self.quit_armed {
            self.quit_armed = true;
            self.status = "Unsaved changes: press q again to quit, w to save".into();
            return;
        }
        self.should_quit = true;
    }

    pub fn disarm_quit(&mut self) {
        self.quit_armed = false;
    }

    // ===== Sort =====

    // Cycle sort for the currently selected column: None -> ASC -> DESC -> None
    pub fn sort_cycle_on_selection(&mut self) {
        if self.model.column_count() == 0 {
            return;
        }
        let col = self.sel_col;
        let next = match self.view.sort() {
            Some((c, SortDir::Asc)) if c == col => Some((col, SortDir::Desc)),
            Some((c, SortDir::Desc)) if c == col => None,
            _ => Some((col, SortDir::Asc)),
        };
        self.view.set_sort(next);
        self.refresh_view();
        let name = self.model.columns().get(col).cloned().unwrap_or_default();
        self.status = match next {
            Some((_, SortDir::Asc)) => format!("Sort: {name} ascending"),
            Some((_, SortDir::Desc)) => format!("Sort: {name} descending"),
            None => "Sort: file order".into(),
        };
    }

    // ===== Filter =====

    pub fn begin_filter_input(&mut self) {
        self.filter_input = self
            .view
            .active()
            .map(|f| f.pattern().to_string())
            .unwrap_or_default();
        self.mode = AppMode::Filtering;
        self.status = "Filter: type a regex, Enter to keep, Esc to clear".into();
    }

    pub fn update_filter_input_char(&mut self, c: char) {
        self.filter_input.push(c);
        self.apply_filter_input();
    }

    pub fn backspace_filter_input(&mut self) {
        self.filter_input.pop();
        self.apply_filter_input();
    }

    /// Recompile the filter from the input buffer; an invalid pattern keeps the previous filter.
    fn apply_filter_input(&mut self) {
        match self.view.set_pattern(&self.filter_input) {
            Ok(()) => {
                self.sel_row = 0;
                self.refresh_view();
                self.status = format!(
                    "Filter: {} ({} of {} rows)",
                    self.filter_input,
                    self.visible.len(),
                    self.model.row_count()
                );
            }
            Err(e) => {
                self.status = format!("Invalid pattern: {}", e.source);
            }
        }
    }

    pub fn finish_filter_input(&mut self) {
        self.mode = AppMode::Normal;
        self.status = match self.view.active() {
            Some(f) => format!("Filter applied: {}", f.pattern()),
            None => "Filter cleared".into(),
        };
    }

    pub fn clear_filter(&mut self) {
        self.filter_input.clear();
        self.view.clear();
        self.mode = AppMode::Normal;
        self.refresh_view();
        self.status = "Filter cleared".into();
    }

    // ===== Editing =====

    pub fn begin_edit_cell(&mut self) {
        let Some(row) = self.selected_model_row() else {
            self.status = "No row selected; press a to add one".into();
            return;
        };
        let col = self.sel_col;
        let current = match self.model.get_cell(row, col) {
            Ok(text) => text.to_string(),
            Err(e) => {
                self.status = format!("Cannot edit: {e}");
                return;
            }
        };
        self.edit_buffer = current;
        self.mode = AppMode::Editing {
            row,
            col,
            cursor: self.edit_buffer.len(),
        };
        self.status = "Editing: Enter to save, Esc to cancel".into();
    }

    pub fn cancel_edit_cell(&mut self) {
        self.mode = AppMode::Normal;
        self.status = "Edit cancelled".into();
    }

    pub fn submit_cell_edit(&mut self) {
        let AppMode::Editing { row, col, .. } = self.mode else {
            return;
        };
        self.mode = AppMode::Normal;
        let value = std::mem::take(&mut self.edit_buffer);
        match self.model.set_cell(row, col, value) {
            Ok(()) => {
                self.pump_events();
                self.status = "Cell updated".into();
            }
            Err(e) => {
                self.status = format!("Update failed: {e}");
            }
        }
    }

    // Editing buffer ops
    pub fn edit_input_insert(&mut self, ch: char) {
        if let AppMode::Editing { ref mut cursor, .. } = self.mode {
            self.edit_buffer.insert(*cursor, ch);
            *cursor += ch.len_utf8();
        }
    }
    pub fn edit_input_backspace(&mut self) {
        if let AppMode::Editing { ref mut cursor, .. } = self.mode
            && *cursor > 0
        {
            let new_cursor = prev_char_boundary(&self.edit_buffer, *cursor);
            self.edit_buffer.drain(new_cursor..*cursor);
            *cursor = new_cursor;
        }
    }
    pub fn edit_input_delete(&mut self) {
        if let AppMode::Editing { ref mut cursor, .. } = self.mode
            && *cursor < self.edit_buffer.len()
        {
            let next = next_char_boundary(&self.edit_buffer, *cursor);
            self.edit_buffer.drain(*cursor..next);
        }
    }
    pub fn edit_input_left(&mut self) {
        if let AppMode::Editing { ref mut cursor, .. } = self.mode {
            *cursor = prev_char_boundary(&self.edit_buffer, *cursor);
        }
    }
    pub fn edit_input_right(&mut self) {
        if let AppMode::Editing { ref mut cursor, .. } = self.mode {
            *cursor = next_char_boundary(&self.edit_buffer, *cursor);
        }
    }
    pub fn edit_input_home(&mut self) {
        if let AppMode::Editing { ref mut cursor, .. } = self.mode {
            *cursor = 0;
        }
    }
    pub fn edit_input_end(&mut self) {
        if let AppMode::Editing { ref mut cursor, .. } = self.mode {
            *cursor = self.edit_buffer.len();
        }
    }
}

fn prev_char_boundary(s: &str, idx: usize) -> usize {
    s[..idx].char_indices().next_back().map_or(0, |(i, _)| i)
}

fn next_char_boundary(s: &str, idx: usize) -> usize {
    s[idx..].chars().next().map_or(idx, |c| idx + c.len_utf8())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn app_with(text: &str) -> (tempfile::TempDir, App) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inventory.csv");
        fs::write(&path, text).unwrap();
        let model = TableModel::open(&path, ",").unwrap();
        (dir, App::new(model, path, ",".into()))
    }

    #[test]
    fn save_enabled_follows_model_changes() {
        let (_dir, mut app) = app_with("name,qty\nwidget,5\n");
        assert!(!app.save_enabled);

        app.append_row();
        assert!(app.save_enabled);
        assert_eq!(app.selected_model_row(), Some(1));

        app.save();
        assert!(!app.save_enabled);
        assert!(!app.model.is_dirty());
        let saved = fs::read_to_string(&app.path).unwrap();
        assert_eq!(
            saved,
            "name,qty\nwidget,5\n,\n".replace('\n', csv_editor::LINE_ENDING)
        );
    }

    #[test]
    fn save_follows_model_dirty_flag() {
        let (_dir, mut app) = app_with("name,qty\nwidget,5\n");
        app.save();
        assert_eq!(app.status, "No changes to save");

        // mutate without draining notifications
        app.model.set_cell(0, 1, "7").unwrap();
        assert!(!app.save_enabled);
        app.save();
        assert!(!app.model.is_dirty());
        let saved = fs::read_to_string(&app.path).unwrap();
        assert!(saved.contains("widget,7"));
    }

    #[test]
    fn edit_commits_through_model() {
        let (_dir, mut app) = app_with("name,qty\nwidget,5\n");
        app.sel_col = 1;
        app.begin_edit_cell();
        app.edit_input_backspace();
        for c in "12".chars() {
            app.edit_input_insert(c);
        }
        app.submit_cell_edit();
        assert_eq!(app.model.get_cell(0, 1), Ok("12"));
        assert!(app.save_enabled);
        assert_eq!(app.mode, AppMode::Normal);
    }

    #[test]
    fn edit_cursor_steps_over_multibyte_chars() {
        let (_dir, mut app) = app_with("name\ncafé\n");
        app.begin_edit_cell();
        app.edit_input_left();
        app.edit_input_delete();
        app.edit_input_insert('e');
        app.submit_cell_edit();
        assert_eq!(app.model.get_cell(0, 0), Ok("cafe"));
    }

    #[test]
    fn invalid_filter_keeps_previous_rows() {
        let (_dir, mut app) = app_with("fruit\napple\nbanana\ngrape\n");
        app.begin_filter_input();
        for c in "an".chars() {
            app.update_filter_input_char(c);
        }
        assert_eq!(app.visible, vec![1]);

        app.update_filter_input_char('[');
        assert_eq!(app.visible, vec![1]);
        assert!(app.status.starts_with("Invalid pattern"));

        app.clear_filter();
        assert_eq!(app.visible, vec![0, 1, 2]);
    }

    #[test]
    fn appended_row_hidden_by_filter() {
        let (_dir, mut app) = app_with("fruit\napple\n");
        app.begin_filter_input();
        app.update_filter_input_char('p');
        app.finish_filter_input();
        app.append_row();
        assert_eq!(app.visible, vec![0]);
        assert!(app.status.contains("hidden by filter"));
        assert!(app.save_enabled);
    }

    #[test]
    fn quit_with_unsaved_changes_needs_confirmation() {
        let (_dir, mut app) = app_with("a\n1\n");
        app.append_row();
        app.request_quit();
        assert!(!app.should_quit);
        app.request_quit();
        assert!(app.should_quit);
    }

    #[test]
    fn sort_cycles_per_column() {
        let (_dir, mut app) = app_with("k\nb\na\nc\n");
        app.sort_cycle_on_selection();
        assert_eq!(app.visible, vec![1, 0, 2]);
        app.sort_cycle_on_selection();
        assert_eq!(app.visible, vec![2, 0, 1]);
        app.sort_cycle_on_selection();
        assert_eq!(app.visible, vec![0, 1, 2]);
    }

    #[test]
    fn selection_scrolls_viewport() {
        let text: String = std::iter::once("n".to_string())
            .chain((0..50).map(|i| i.to_string()))
            .collect::<Vec<_>>()
            .join("\n");
        let (_dir, mut app) = app_with(&text);
        app.set_viewport_rows(10);
        app.move_to_last_row();
        assert_eq!(app.sel_row, 49);
        assert_eq!(app.scroll, 40);
        app.page_up();
        assert_eq!(app.sel_row, 39);
        assert_eq!(app.scroll, 39);
    }
}
