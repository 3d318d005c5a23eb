use regex::Regex;
use tracing::{debug, warn};

use crate::error::InvalidPatternError;
use crate::table::TableModel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDir {
    Asc,
    Desc,
}

/// A user pattern compiled for row matching.
#[derive(Debug, Clone)]
pub struct CompiledFilter {
    pattern: String,
    regex: Regex,
}

impl CompiledFilter {
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// True when any cell in the header's columns contains a match.
    pub fn matches_row(&self, model: &TableModel, row: usize) -> bool {
        (0..model.column_count()).any(|col| {
            model
                .get_cell(row, col)
                .is_ok_and(|text| self.regex.is_match(text))
        })
    }
}

pub fn compile(pattern: &str) -> Result<CompiledFilter, InvalidPatternError> {
    let regex = Regex::new(pattern).map_err(|source| InvalidPatternError {
        pattern: pattern.to_string(),
        source,
    })?;
    Ok(CompiledFilter {
        pattern: pattern.to_string(),
        regex,
    })
}

/// Indices of visible rows in original order. `None` shows every row.
pub fn apply(model: &TableModel, filter: Option<&CompiledFilter>) -> Vec<usize> {
    let all = 0..model.row_count();
    match filter {
        Some(f) if !f.pattern.is_empty() => all.filter(|&row| f.matches_row(model, row)).collect(),
        _ => all.collect(),
    }
}

/// Active filter and sort over a [`TableModel`].
///
/// The view holds no row state of its own; [`FilterView::visible_rows`] is
/// recomputed from the current grid on every call.
#[derive(Debug, Clone, Default)]
pub struct FilterView {
    active: Option<CompiledFilter>,
    sort: Option<(usize, SortDir)>,
}

impl FilterView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile and activate `pattern`. An empty pattern removes the filter.
    ///
    /// On error the previously active filter stays in effect.
    pub fn set_pattern(&mut self, pattern: &str) -> Result<(), InvalidPatternError> {
        if pattern.is_empty() {
            self.active = None;
            return Ok(());
        }
        match compile(pattern) {
            Ok(filter) => {
                debug!(pattern, "filter active");
                self.active = Some(filter);
                Ok(())
            }
            Err(e) => {
                warn!(pattern, error = %e.source, "filter pattern rejected");
                Err(e)
            }
        }
    }

    pub fn clear(&mut self) {
        self.active = None;
    }

    pub fn active(&self) -> Option<&CompiledFilter> {
        self.active.as_ref()
    }

    pub fn sort(&self) -> Option<(usize, SortDir)> {
        self.sort
    }

    pub fn set_sort(&mut self, sort: Option<(usize, SortDir)>) {
        self.sort = sort;
    }

    pub fn visible_rows(&self, model: &TableModel) -> Vec<usize> {
        let mut rows = apply(model, self.active.as_ref());
        if let Some((col, dir)) = self.sort
            && col < model.column_count()
        {
            // stable: equal keys keep insertion order
            rows.sort_by(|&a, &b| {
                let ka = model.get_cell(a, col).unwrap_or("");
                let kb = model.get_cell(b, col).unwrap_or("");
                match dir {
                    SortDir::Asc => ka.cmp(kb),
                    SortDir::Desc => kb.cmp(ka),
                }
            });
        }
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fruit() -> TableModel {
        TableModel::parse("fruit,n\napple,1\nbanana,2\ngrape,3", ",")
    }

    #[test]
    fn substring_search_semantics() {
        let model = fruit();
        let f = compile("an").unwrap();
        assert_eq!(apply(&model, Some(&f)), vec![1]);
    }

    #[test]
    fn any_column_can_match() {
        let model = fruit();
        let f = compile("^3$").unwrap();
        assert_eq!(apply(&model, Some(&f)), vec![2]);
    }

    #[test]
    fn no_filter_and_empty_pattern_show_everything() {
        let model = fruit();
        assert_eq!(apply(&model, None), vec![0, 1, 2]);
        let f = compile("").unwrap();
        assert_eq!(apply(&model, Some(&f)), vec![0, 1, 2]);
    }

    #[test]
    fn header_is_never_matched() {
        let model = fruit();
        let f = compile("fruit").unwrap();
        assert!(apply(&model, Some(&f)).is_empty());
    }

    #[test]
    fn invalid_pattern_keeps_previous_filter() {
        let model = fruit();
        let mut view = FilterView::new();
        view.set_pattern("ap").unwrap();

        let err = view.set_pattern("[").unwrap_err();
        assert_eq!(err.pattern, "[");
        assert_eq!(view.active().map(CompiledFilter::pattern), Some("ap"));
        assert_eq!(view.visible_rows(&model), vec![0, 2]);
    }

    #[test]
    fn invalid_pattern_from_no_filter_stays_unfiltered() {
        let mut view = FilterView::new();
        assert!(view.set_pattern("(").is_err());
        assert!(view.active().is_none());
    }

    #[test]
    fn empty_pattern_clears() {
        let mut view = FilterView::new();
        view.set_pattern("a").unwrap();
        view.set_pattern("").unwrap();
        assert!(view.active().is_none());
    }

    #[test]
    fn view_tracks_grid_changes() {
        let mut model = fruit();
        let mut view = FilterView::new();
        view.set_pattern("berry").unwrap();
        assert!(view.visible_rows(&model).is_empty());

        model.append_empty_row();
        model.set_cell(3, 0, "blueberry").unwrap();
        assert_eq!(view.visible_rows(&model), vec![3]);
    }

    #[test]
    fn sort_orders_visible_rows_only() {
        let model = TableModel::parse("k\nb\na\nc\na", ",");
        let mut view = FilterView::new();
        view.set_sort(Some((0, SortDir::Asc)));
        assert_eq!(view.visible_rows(&model), vec![1, 3, 0, 2]);

        view.set_sort(Some((0, SortDir::Desc)));
        assert_eq!(view.visible_rows(&model), vec![2, 0, 1, 3]);

        view.set_pattern("[ab]").unwrap();
        assert_eq!(view.visible_rows(&model), vec![0, 1, 3]);
        assert_eq!(model.rows(), [vec!["b"], vec!["a"], vec!["c"], vec!["a"]]);
    }

    #[test]
    fn sort_on_missing_column_is_ignored() {
        let model = fruit();
        let mut view = FilterView::new();
        view.set_sort(Some((7, SortDir::Desc)));
        assert_eq!(view.visible_rows(&model), vec![0, 1, 2]);
    }
}
