//! The 24×80 cell grid and its dirty-extent bookkeeping

use twinax_charmap::EBCDIC_SPACE;

/// Screen height in rows, excluding the status row.
pub const ROWS: u16 = 24;

/// Screen width in columns.
pub const COLS: u16 = 80;

/// Display attributes of one cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Attr {
    pub bright: bool,
    pub reverse: bool,
    pub underline: bool,
    pub blink: bool,
    pub nondisplay: bool,
    pub column_separator: bool,
}

/// One character cell: an EBCDIC code plus its attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    pub code: u8,
    pub attr: Attr,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            code: EBCDIC_SPACE,
            attr: Attr::default(),
        }
    }
}

/// A pending run of modified cells on one row, columns inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirtySpan {
    pub row: u16,
    pub first: u16,
    pub last: u16,
}

/// The session screen.
///
/// All cursor-moving operations clamp so the cursor never leaves the grid.
/// Mutations record dirty spans; spans on the same row whose column ranges
/// touch or overlap are combined so the engine can write them as one burst.
#[derive(Debug, Clone)]
pub struct Screen {
    cells: Vec<Cell>,
    row: u16,
    col: u16,
    saved: (u16, u16),
    attr: Attr,
    dirty: Vec<DirtySpan>,
}

impl Default for Screen {
    fn default() -> Self {
        Self::new()
    }
}

impl Screen {
    pub fn new() -> Self {
        Self {
            cells: vec![Cell::default(); (ROWS * COLS) as usize],
            row: 0,
            col: 0,
            saved: (0, 0),
            attr: Attr::default(),
            dirty: Vec::new(),
        }
    }

    pub fn cursor(&self) -> (u16, u16) {
        (self.row, self.col)
    }

    pub fn cell(&self, row: u16, col: u16) -> Option<&Cell> {
        if row >= ROWS || col >= COLS {
            return None;
        }
        self.cells.get((row * COLS + col) as usize)
    }

    pub fn attr(&self) -> Attr {
        self.attr
    }

    pub fn set_attr(&mut self, attr: Attr) {
        self.attr = attr;
    }

    /// Write one EBCDIC code at the cursor with the current attribute.
    ///
    /// The cursor advances one column but never wraps: at column 79 further
    /// writes overwrite the last cell, which is the VT52 contract the child
    /// application is given.
    pub fn put(&mut self, code: u8) {
        let (row, col) = (self.row, self.col);
        self.cells[(row * COLS + col) as usize] = Cell {
            code,
            attr: self.attr,
        };
        self.mark(row, col, col);
        if self.col + 1 < COLS {
            self.col += 1;
        }
    }

    pub fn set_cursor(&mut self, row: u16, col: u16) {
        self.row = row.min(ROWS - 1);
        self.col = col.min(COLS - 1);
    }

    pub fn cursor_up(&mut self) {
        self.row = self.row.saturating_sub(1);
    }

    pub fn cursor_down(&mut self) {
        self.row = (self.row + 1).min(ROWS - 1);
    }

    pub fn cursor_left(&mut self) {
        self.col = self.col.saturating_sub(1);
    }

    pub fn cursor_right(&mut self) {
        self.col = (self.col + 1).min(COLS - 1);
    }

    pub fn cursor_home(&mut self) {
        self.row = 0;
        self.col = 0;
    }

    pub fn save_cursor(&mut self) {
        self.saved = (self.row, self.col);
    }

    pub fn restore_cursor(&mut self) {
        let (row, col) = self.saved;
        self.set_cursor(row, col);
    }

    /// Line feed: down one row, scrolling the screen when already on the
    /// bottom row. The column is kept.
    pub fn line_feed(&mut self) {
        if self.row + 1 == ROWS {
            self.scroll_up();
        } else {
            self.row += 1;
        }
    }

    /// Reverse line feed: up one row, scrolling down when already on top.
    pub fn reverse_line_feed(&mut self) {
        if self.row == 0 {
            self.scroll_down();
        } else {
            self.row -= 1;
        }
    }

    pub fn carriage_return(&mut self) {
        self.col = 0;
    }

    /// Advance to the next 8-column tab stop, clamped to the last column.
    pub fn tab(&mut self) {
        self.col = (self.col / 8 + 1) * 8;
        if self.col >= COLS {
            self.col = COLS - 1;
        }
    }

    /// Scroll up one line; the top row is discarded.
    pub fn scroll_up(&mut self) {
        self.cells.rotate_left(COLS as usize);
        self.blank_row(ROWS - 1, Attr::default());
        self.mark_all();
    }

    /// Scroll down one line; the bottom row is discarded.
    pub fn scroll_down(&mut self) {
        self.cells.rotate_right(COLS as usize);
        self.blank_row(0, Attr::default());
        self.mark_all();
    }

    /// Insert a blank line at the cursor row, pushing lower rows down.
    pub fn insert_line(&mut self) {
        let start = (self.row * COLS) as usize;
        self.cells[start..].rotate_right(COLS as usize);
        self.blank_row(self.row, Attr::default());
        for row in self.row..ROWS {
            self.mark(row, 0, COLS - 1);
        }
    }

    /// Delete the cursor row, pulling lower rows up.
    pub fn delete_line(&mut self) {
        let start = (self.row * COLS) as usize;
        self.cells[start..].rotate_left(COLS as usize);
        self.blank_row(ROWS - 1, Attr::default());
        for row in self.row..ROWS {
            self.mark(row, 0, COLS - 1);
        }
    }

    /// Clear the whole screen to (space, default attribute) and home the
    /// cursor.
    pub fn clear(&mut self) {
        self.cells.fill(Cell::default());
        self.cursor_home();
        self.mark_all();
    }

    /// Erase from the cursor to the end of the screen with the current
    /// attribute.
    pub fn erase_to_end_of_screen(&mut self) {
        self.erase_to_end_of_line();
        for row in self.row + 1..ROWS {
            self.blank_row(row, self.attr);
            self.mark(row, 0, COLS - 1);
        }
    }

    /// Erase from the cursor to the end of the current line.
    pub fn erase_to_end_of_line(&mut self) {
        let blank = Cell {
            code: EBCDIC_SPACE,
            attr: self.attr,
        };
        for col in self.col..COLS {
            self.cells[(self.row * COLS + col) as usize] = blank;
        }
        self.mark(self.row, self.col, COLS - 1);
    }

    /// Erase from the start of the current line through the cursor.
    pub fn erase_to_start_of_line(&mut self) {
        let blank = Cell {
            code: EBCDIC_SPACE,
            attr: self.attr,
        };
        for col in 0..=self.col {
            self.cells[(self.row * COLS + col) as usize] = blank;
        }
        self.mark(self.row, 0, self.col);
    }

    /// Erase from the top of the screen through the cursor.
    pub fn erase_to_start_of_screen(&mut self) {
        for row in 0..self.row {
            self.blank_row(row, self.attr);
            self.mark(row, 0, COLS - 1);
        }
        self.erase_to_start_of_line();
    }

    /// Erase the whole cursor line.
    pub fn erase_line(&mut self) {
        self.blank_row(self.row, self.attr);
        self.mark(self.row, 0, COLS - 1);
        self.col = 0;
    }

    /// Take the accumulated dirty spans, ordered by row then column. The
    /// set is consumed atomically; marking resumes from empty.
    pub fn take_dirty(&mut self) -> Vec<DirtySpan> {
        let mut spans = std::mem::take(&mut self.dirty);
        spans.sort_by_key(|s| (s.row, s.first));
        spans
    }

    pub fn has_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// EBCDIC bytes of one dirty span, ready for a write-data frame.
    pub fn span_bytes(&self, span: &DirtySpan) -> Vec<u8> {
        (span.first..=span.last)
            .map(|col| self.cells[(span.row * COLS + col) as usize].code)
            .collect()
    }

    fn blank_row(&mut self, row: u16, attr: Attr) {
        let blank = Cell {
            code: EBCDIC_SPACE,
            attr,
        };
        let start = (row * COLS) as usize;
        self.cells[start..start + COLS as usize].fill(blank);
    }

    fn mark_all(&mut self) {
        self.dirty.clear();
        for row in 0..ROWS {
            self.dirty.push(DirtySpan {
                row,
                first: 0,
                last: COLS - 1,
            });
        }
    }

    fn mark(&mut self, row: u16, first: u16, last: u16) {
        // combine with an existing span on the same row when the column
        // ranges touch or overlap
        for span in &mut self.dirty {
            if span.row == row && first <= span.last + 1 && span.first <= last + 1 {
                span.first = span.first.min(first);
                span.last = span.last.max(last);
                return;
            }
        }
        self.dirty.push(DirtySpan { row, first, last });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_advances_without_wrap() {
        let mut screen = Screen::new();
        screen.set_cursor(0, 78);
        screen.put(0xC1);
        screen.put(0xC2);
        screen.put(0xC3);
        assert_eq!(screen.cursor(), (0, 79));
        // the last cell was overwritten in place
        assert_eq!(screen.cell(0, 79).unwrap().code, 0xC3);
        assert_eq!(screen.cell(0, 78).unwrap().code, 0xC1);
    }

    #[test]
    fn test_line_feed_scrolls_at_bottom() {
        let mut screen = Screen::new();
        screen.put(0xC1);
        screen.set_cursor(23, 5);
        screen.line_feed();
        assert_eq!(screen.cursor(), (23, 5));
        // the top row content was discarded
        assert_eq!(screen.cell(0, 0).unwrap().code, EBCDIC_SPACE);
    }

    #[test]
    fn test_clear_resets_everything() {
        let mut screen = Screen::new();
        let mut attr = Attr::default();
        attr.reverse = true;
        screen.set_attr(attr);
        screen.set_cursor(10, 10);
        screen.put(0xC1);
        screen.clear();

        assert_eq!(screen.cursor(), (0, 0));
        for row in 0..ROWS {
            for col in 0..COLS {
                assert_eq!(*screen.cell(row, col).unwrap(), Cell::default());
            }
        }
    }

    #[test]
    fn test_erase_uses_current_attr() {
        let mut screen = Screen::new();
        let mut attr = Attr::default();
        attr.reverse = true;
        screen.set_attr(attr);
        screen.set_cursor(3, 40);
        screen.erase_to_end_of_line();
        assert!(screen.cell(3, 60).unwrap().attr.reverse);
        assert!(!screen.cell(3, 10).unwrap().attr.reverse);
    }

    #[test]
    fn test_dirty_spans_combine_on_touch() {
        let mut screen = Screen::new();
        screen.set_cursor(2, 10);
        screen.put(0xC1);
        screen.put(0xC2);
        screen.set_cursor(2, 12);
        screen.put(0xC3);

        let spans = screen.take_dirty();
        assert_eq!(
            spans,
            vec![DirtySpan {
                row: 2,
                first: 10,
                last: 12
            }]
        );
        assert!(!screen.has_dirty());
    }

    #[test]
    fn test_dirty_spans_stay_separate_across_rows_and_gaps() {
        let mut screen = Screen::new();
        screen.set_cursor(2, 10);
        screen.put(0xC1);
        screen.set_cursor(2, 40);
        screen.put(0xC2);
        screen.set_cursor(5, 10);
        screen.put(0xC3);

        let spans = screen.take_dirty();
        assert_eq!(spans.len(), 3);
    }

    #[test]
    fn test_insert_and_delete_line() {
        let mut screen = Screen::new();
        screen.set_cursor(0, 0);
        screen.put(0xC1);
        screen.set_cursor(1, 0);
        screen.put(0xC2);

        screen.set_cursor(0, 0);
        screen.insert_line();
        assert_eq!(screen.cell(0, 0).unwrap().code, EBCDIC_SPACE);
        assert_eq!(screen.cell(1, 0).unwrap().code, 0xC1);
        assert_eq!(screen.cell(2, 0).unwrap().code, 0xC2);

        screen.delete_line();
        assert_eq!(screen.cell(0, 0).unwrap().code, 0xC1);
        assert_eq!(screen.cell(1, 0).unwrap().code, 0xC2);
    }

    #[test]
    fn test_cursor_clamping() {
        let mut screen = Screen::new();
        screen.cursor_up();
        screen.cursor_left();
        assert_eq!(screen.cursor(), (0, 0));
        screen.set_cursor(99, 99);
        assert_eq!(screen.cursor(), (23, 79));
        screen.cursor_down();
        screen.cursor_right();
        assert_eq!(screen.cursor(), (23, 79));
    }
}
