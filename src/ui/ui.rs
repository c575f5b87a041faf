use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, Paragraph},
};
use ratatui_image::{Resize, StatefulImage, picker::Picker, protocol::StatefulProtocol};
use std::collections::HashMap;

use crate::backend::library::ItemStore;
use crate::backend::storage::PROGRESS_SCALE;
use crate::list::binder::{LoadEvent, Slot, SlotBinder};
use crate::list::binding::SlotId;
use crate::list::selection::Selection;

const ROW_HEIGHT: u16 = 4;
const COVER_WIDTH: u16 = 8;
// Header and footer blocks plus the list border.
const CHROME_HEIGHT: u16 = 3 + 3 + 2;

/// Number of slots that fit in a terminal `height` rows tall.
pub fn rows_for_height(height: u16) -> usize {
    (height.saturating_sub(CHROME_HEIGHT) / ROW_HEIGHT) as usize
}

pub struct App {
    pub store: ItemStore,
    pub selection: Selection,
    pub binder: SlotBinder,
    pub cursor: usize,
    pub offset: usize,
    pub visible_rows: usize,
    pub picker: Option<Picker>,
    cover_states: HashMap<SlotId, (u64, StatefulProtocol)>,
}

impl App {
    pub fn new(store: ItemStore, binder: SlotBinder, picker: Option<Picker>) -> Self {
        Self {
            store,
            selection: Selection::new(),
            binder,
            cursor: 0,
            offset: 0,
            visible_rows: 0,
            picker,
            cover_states: HashMap::new(),
        }
    }

    pub fn set_viewport(&mut self, rows: usize) {
        if rows == self.visible_rows {
            return;
        }
        self.visible_rows = rows;
        self.scroll_to_cursor();
        self.sync_slots();
    }

    /// Binds each visible row's slot to the item now under it. Slots whose
    /// item did not change keep their state and in-flight fetches.
    pub fn sync_slots(&mut self) {
        for slot_id in 0..self.visible_rows {
            let index = self.offset + slot_id;
            let wanted = self.store.get(index).map(|item| item.id);
            let shown = self.binder.slot(slot_id).map(|s| (s.index, s.item_id));

            match wanted {
                Some(id) if shown != Some((index, id)) => {
                    self.binder.bind(slot_id, index, &self.store, &self.selection);
                }
                Some(_) => {}
                None => self.release(slot_id),
            }
        }

        for slot_id in self.binder.slot_ids() {
            if slot_id >= self.visible_rows {
                self.release(slot_id);
            }
        }
    }

    fn release(&mut self, slot_id: SlotId) {
        self.binder.release(slot_id);
        self.cover_states.remove(&slot_id);
    }

    fn scroll_to_cursor(&mut self) {
        if self.cursor < self.offset {
            self.offset = self.cursor;
        } else if self.visible_rows > 0 && self.cursor >= self.offset + self.visible_rows {
            self.offset = self.cursor + 1 - self.visible_rows;
        }
    }

    pub fn move_cursor(&mut self, delta: isize) {
        if self.store.is_empty() {
            return;
        }
        let last = self.store.count() - 1;
        self.cursor = self.cursor.saturating_add_signed(delta).min(last);
        self.scroll_to_cursor();
        self.sync_slots();
    }

    pub fn toggle_checked(&mut self) {
        if let Some(item) = self.store.get(self.cursor) {
            self.selection.toggle(item.id);
        }
    }

    pub fn toggle_drag(&mut self) {
        let on = !self.selection.drag_mode();
        self.selection.set_drag_mode(on);
    }

    pub fn uncheck_all(&mut self) {
        self.selection.uncheck_all();
    }

    pub fn handle_load(&mut self, event: LoadEvent) {
        self.binder.apply(event, &mut self.store);
    }

    pub fn refresh_if_needed(&mut self) {
        if self.selection.take_refresh() {
            self.binder.refresh(&self.store, &self.selection);
        }
    }

    /// Keeps one image protocol per slot, rebuilt when the slot's cover
    /// changes.
    fn prepare_covers(&mut self) {
        let Some(picker) = self.picker.as_ref() else {
            return;
        };

        for slot_id in self.binder.slot_ids() {
            let Some(slot) = self.binder.slot(slot_id) else {
                continue;
            };
            let cached = self.cover_states.get(&slot_id).map(|(rev, _)| *rev);
            if cached == Some(slot.cover_revision) {
                continue;
            }
            match &slot.cover {
                Some(cover) => {
                    let protocol = picker.new_resize_protocol(cover.clone());
                    self.cover_states.insert(slot_id, (slot.cover_revision, protocol));
                }
                None => {
                    self.cover_states.remove(&slot_id);
                }
            }
        }
    }
}

pub fn ui(f: &mut Frame, app: &mut App) {
    app.prepare_covers();

    let area = f.area();
    let root = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // header
            Constraint::Min(ROW_HEIGHT + 2),
            Constraint::Length(3), // footer
        ])
        .split(area);

    draw_header(f, root[0], app);
    draw_list(f, root[1], app);
    draw_footer(f, root[2], app);
}

fn draw_header(f: &mut Frame, area: Rect, app: &App) {
    let mut spans = vec![Span::styled(
        format!("{} books", app.store.count()),
        Style::default().fg(Color::White),
    )];
    if app.selection.drag_mode() {
        spans.push(Span::raw("  "));
        spans.push(Span::styled(
            "reorder mode",
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ));
    }

    let header = Paragraph::new(Line::from(spans)).block(
        Block::default()
            .borders(Borders::ALL)
            .title("Bookshelf")
            .border_style(Style::default().fg(Color::Cyan)),
    );
    f.render_widget(header, area);
}

fn draw_list(f: &mut Frame, area: Rect, app: &mut App) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::White));
    let inner = block.inner(area);
    f.render_widget(block, area);

    if app.store.is_empty() {
        let empty = Paragraph::new("Library is empty. Add books with `bookshelf-tui add <name>`.")
            .alignment(Alignment::Center)
            .style(Style::default().fg(Color::DarkGray));
        f.render_widget(empty, inner);
        return;
    }

    for slot_id in 0..app.visible_rows {
        let y = inner.y + slot_id as u16 * ROW_HEIGHT;
        if y + ROW_HEIGHT > inner.y + inner.height {
            break;
        }
        let Some(slot) = app.binder.slot(slot_id) else {
            continue;
        };
        let row = Rect::new(inner.x, y, inner.width, ROW_HEIGHT);
        let selected = slot.index == app.cursor;
        draw_slot(
            f,
            row,
            slot,
            selected,
            app.cover_states.get_mut(&slot_id).map(|(_, state)| state),
        );
    }
}

fn draw_slot(
    f: &mut Frame,
    area: Rect,
    slot: &Slot,
    selected: bool,
    cover_state: Option<&mut StatefulProtocol>,
) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Length(COVER_WIDTH),
            Constraint::Min(10),
            Constraint::Length(3), // drag handle
        ])
        .split(area);

    if let Some(state) = cover_state {
        let image_widget = StatefulImage::new().resize(Resize::Scale(None));
        f.render_stateful_widget(image_widget, columns[0], state);
    } else {
        // Placeholder while the cover is loading.
        let placeholder = Paragraph::new(vec![Line::from(""), Line::from("📚")])
            .alignment(Alignment::Center)
            .style(Style::default().fg(Color::Magenta));
        f.render_widget(placeholder, columns[0]);
    }

    let text_rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // title
            Constraint::Length(1), // progress
            Constraint::Min(0),
        ])
        .split(columns[1]);

    let marker = if slot.checked { "[x] " } else { "[ ] " };
    let title_style = if selected {
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::White)
    };
    let width = text_rows[0].width.saturating_sub(marker.len() as u16) as usize;
    let title = Line::from(vec![
        Span::styled(marker, Style::default().fg(Color::Yellow)),
        Span::styled(truncate_text(&slot.title, width), title_style),
    ]);
    f.render_widget(Paragraph::new(title), text_rows[0]);

    let gauge = Gauge::default()
        .gauge_style(Style::default().fg(Color::Cyan).bg(Color::Black))
        .ratio(progress_ratio(slot.progress))
        .label(format!("{:.1}%", progress_ratio(slot.progress) * 100.0));
    f.render_widget(gauge, text_rows[1]);

    if slot.drag_handle_visible {
        let handle = Paragraph::new(vec![Line::from(""), Line::from("≡")])
            .alignment(Alignment::Center)
            .style(Style::default().fg(Color::DarkGray));
        f.render_widget(handle, columns[2]);
    }
}

fn progress_ratio(progress: u32) -> f64 {
    (progress.min(PROGRESS_SCALE) as f64) / PROGRESS_SCALE as f64
}

fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        text.to_string()
    } else {
        format!(
            "{}...",
            text.chars()
                .take(max_len.saturating_sub(3))
                .collect::<String>()
        )
    }
}

fn draw_footer(f: &mut Frame, area: Rect, app: &App) {
    let text = Line::from(vec![
        Span::styled("↑/↓", Style::default().fg(Color::Yellow)),
        Span::raw(": move  "),
        Span::styled("Space", Style::default().fg(Color::Yellow)),
        Span::raw(": check  "),
        Span::styled("u", Style::default().fg(Color::Yellow)),
        Span::raw(": uncheck all  "),
        Span::styled("d", Style::default().fg(Color::Yellow)),
        Span::raw(": reorder mode  "),
        Span::styled("q", Style::default().fg(Color::Yellow)),
        Span::raw(format!(
            ": quit   {} checked",
            app.selection.checked_items(&app.store).len()
        )),
    ]);

    let p = Paragraph::new(text)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan)),
        )
        .alignment(Alignment::Center);
    f.render_widget(p, area);
}
