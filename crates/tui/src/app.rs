use std::{io, mem, path::PathBuf, sync::Arc, thread, time::Duration};

use anyhow::{Context, Result};
use cardadmin_core::{
    error::ApiError,
    models::{Card, CardId, ImageAttachment},
    resource::{Dialog, DialogMode, ResourceManager},
    session::{GuardDecision, Location, Redirect, SessionGuard, SessionProvider},
    AppConfig,
};
use chrono::Local;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, TableState, Wrap},
    Frame, Terminal,
};
use tokio::{spawn, sync::mpsc};
use tracing::{error, info};

const TICK_RATE: Duration = Duration::from_millis(250);
const MAX_TEXT_LEN: usize = 256;

#[derive(Debug, Clone)]
struct Theme {
    primary_fg: Color,
    accent: Color,
    muted: Color,
    selection_bg: Color,
    success: Color,
    warning: Color,
    danger: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            primary_fg: Color::White,
            accent: Color::Cyan,
            muted: Color::DarkGray,
            selection_bg: Color::DarkGray,
            success: Color::Green,
            warning: Color::Yellow,
            danger: Color::Red,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Screen {
    Login,
    Cards,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Name,
    Description,
    UpgradeCost,
    Image,
}

impl Field {
    const ALL: [Field; 4] = [
        Field::Name,
        Field::Description,
        Field::UpgradeCost,
        Field::Image,
    ];

    fn label(self) -> &'static str {
        match self {
            Field::Name => "Name",
            Field::Description => "Description",
            Field::UpgradeCost => "Upgrade cost",
            Field::Image => "Image file",
        }
    }

    fn step(self, delta: isize) -> Field {
        let len = Field::ALL.len() as isize;
        let idx = Field::ALL.iter().position(|f| *f == self).unwrap_or(0) as isize;
        Field::ALL[(idx + delta).rem_euclid(len) as usize]
    }
}

/// Dialog inputs that live outside the draft itself.
#[derive(Debug, Clone)]
struct FormState {
    focus: Field,
    image_path: String,
}

impl Default for FormState {
    fn default() -> Self {
        Self {
            focus: Field::Name,
            image_path: String::new(),
        }
    }
}

enum AppEvent {
    Input(Event),
    Tick,
    Listed(Result<Vec<Card>, ApiError>),
    Saved(Result<(), ApiError>),
    Deleted(CardId, Result<(), ApiError>),
}

/// Terminal console composing the session gate and the card manager.
pub struct CardAdminApp {
    guard: SessionGuard<Arc<dyn SessionProvider>>,
    manager: ResourceManager,
    session_file: PathBuf,
    cards_location: Location,
    login_path: String,
    screen: Screen,
    redirect: Option<Redirect>,
    state: UiState,
    form: FormState,
    pending_list: bool,
    relist_queued: bool,
    event_tx: Option<mpsc::Sender<AppEvent>>,
    theme: Theme,
}

impl CardAdminApp {
    pub fn new(
        guard: SessionGuard<Arc<dyn SessionProvider>>,
        manager: ResourceManager,
        config: &AppConfig,
    ) -> Self {
        Self {
            guard,
            manager,
            session_file: config.session_file.clone(),
            cards_location: Location::new(config.cards_path.clone()),
            login_path: config.login_path.clone(),
            screen: Screen::Login,
            redirect: None,
            state: UiState::default(),
            form: FormState::default(),
            pending_list: false,
            relist_queued: false,
            event_tx: None,
            theme: Theme::default(),
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        let mut stdout = io::stdout();
        enable_raw_mode().context("failed to enter raw mode")?;
        execute!(stdout, EnterAlternateScreen).context("failed to enter alternate screen")?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend).context("failed to create terminal")?;
        terminal.hide_cursor()?;
        terminal.clear()?;

        let (event_tx, mut event_rx) = mpsc::channel::<AppEvent>(128);
        spawn_input_thread(event_tx.clone());
        self.event_tx = Some(event_tx);

        let location = self.cards_location.clone();
        self.navigate(location);

        loop {
            terminal.draw(|frame| self.draw(frame))?;
            if self.state.should_quit {
                break;
            }

            let maybe_event = event_rx.recv().await;
            if !self.process_app_event(maybe_event) {
                break;
            }

            if self.state.should_quit {
                break;
            }
        }

        restore_terminal(&mut terminal)?;
        self.event_tx = None;
        Ok(())
    }

    fn navigate(&mut self, location: Location) {
        if location.path == self.login_path {
            self.screen = Screen::Login;
            return;
        }

        match self.guard.check(Screen::Cards, &location) {
            GuardDecision::Render(screen) => {
                info!(location = %location, "Opening protected view");
                self.redirect = None;
                self.screen = screen;
                self.request_refresh();
            }
            GuardDecision::Redirect(redirect) => {
                info!(from = %redirect.from, to = %redirect.to, "No session; showing login");
                self.screen = Screen::Login;
                self.state
                    .set_status(format!("Sign-in required for {}", redirect.from));
                self.redirect = Some(redirect);
            }
        }
    }

    fn retry_login(&mut self) {
        let target = self
            .redirect
            .as_ref()
            .map(|redirect| redirect.from.clone())
            .unwrap_or_else(|| self.cards_location.clone());
        if !self.guard.is_authenticated() {
            self.state
                .set_status("Still no session token found".to_string());
            return;
        }
        self.navigate(target);
    }

    fn process_app_event(&mut self, maybe_event: Option<AppEvent>) -> bool {
        match maybe_event {
            Some(AppEvent::Input(Event::Key(key))) => {
                if let Err(err) = self.handle_key(key) {
                    self.state.set_status(format!("Error: {err}"));
                }
                true
            }
            Some(AppEvent::Input(_)) | Some(AppEvent::Tick) => true,
            Some(AppEvent::Listed(result)) => {
                self.pending_list = false;
                if mem::take(&mut self.relist_queued) {
                    // Started before the latest change landed; fetch again.
                    self.request_refresh();
                    return true;
                }
                match self.manager.apply_listing(result) {
                    Ok(()) => {
                        self.state.clamp_cursor(self.manager.cards().len());
                        self.state
                            .set_status(format!("Loaded {} cards", self.manager.cards().len()));
                    }
                    Err(err) => self.state.set_status(format!("Refresh failed: {err}")),
                }
                true
            }
            Some(AppEvent::Saved(result)) => {
                match self.manager.finish_save(result) {
                    Ok(()) => {
                        self.form = FormState::default();
                        self.state.set_status("Card saved".to_string());
                        self.request_refresh();
                    }
                    Err(err) => self.state.set_status(format!("Save failed: {err}")),
                }
                true
            }
            Some(AppEvent::Deleted(id, result)) => {
                match self.manager.finish_delete(&id, result) {
                    Ok(()) => {
                        self.state.set_status(format!("Deleted card {id}"));
                        self.request_refresh();
                    }
                    Err(err) => self.state.set_status(format!("Delete failed: {err}")),
                }
                true
            }
            None => false,
        }
    }

    fn request_refresh(&mut self) {
        if self.pending_list {
            self.relist_queued = true;
            return;
        }
        let Some(sender) = self.event_tx.clone() else {
            self.state
                .set_status("Internal error: event channel unavailable".to_string());
            error!("event_channel_missing");
            return;
        };
        self.pending_list = true;
        let api = self.manager.api();
        spawn(async move {
            let result = api.list().await;
            let _ = sender.send(AppEvent::Listed(result)).await;
        });
    }

    fn submit_dialog(&mut self) -> Result<()> {
        let Some(sender) = self.event_tx.clone() else {
            self.state
                .set_status("Internal error: event channel unavailable".to_string());
            error!("event_channel_missing");
            return Ok(());
        };
        self.attach_image()?;
        let request = match self.manager.begin_save() {
            Ok(request) => request,
            Err(err) => {
                self.state.set_status(format!("Cannot save: {err}"));
                return Ok(());
            }
        };
        self.state.set_status("Saving…".to_string());
        let api = self.manager.api();
        spawn(async move {
            let result = request.execute(api.as_ref()).await;
            let _ = sender.send(AppEvent::Saved(result)).await;
        });
        Ok(())
    }

    fn attach_image(&mut self) -> Result<()> {
        let path = self.form.image_path.trim();
        let attachment = if path.is_empty() {
            None
        } else {
            Some(ImageAttachment::from_path(expand_home(path))?)
        };
        self.manager.draft_mut()?.image = attachment;
        Ok(())
    }

    fn delete_current(&mut self) {
        let Some(card) = self.current_card().cloned() else {
            self.state.set_status("No card selected".to_string());
            return;
        };
        let Some(sender) = self.event_tx.clone() else {
            self.state
                .set_status("Internal error: event channel unavailable".to_string());
            error!("event_channel_missing");
            return;
        };
        let request = match self.manager.begin_delete(&card.id) {
            Ok(request) => request,
            Err(err) => {
                self.state.set_status(err.to_string());
                return;
            }
        };
        self.state.set_status(format!("Deleting {}…", card.name));
        let api = self.manager.api();
        spawn(async move {
            let result = request.execute(api.as_ref()).await;
            let _ = sender.send(AppEvent::Deleted(request.id, result)).await;
        });
    }

    fn current_card(&self) -> Option<&Card> {
        self.manager.cards().get(self.state.cursor)
    }

    fn handle_key(&mut self, key: KeyEvent) -> Result<()> {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.state.should_quit = true;
            return Ok(());
        }
        match self.screen {
            Screen::Login => self.handle_login_key(key),
            Screen::Cards if self.manager.dialog().is_visible() => self.handle_dialog_key(key),
            Screen::Cards => self.handle_cards_key(key),
        }
    }

    fn handle_login_key(&mut self, key: KeyEvent) -> Result<()> {
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => self.state.should_quit = true,
            KeyCode::Char('r') | KeyCode::Enter => self.retry_login(),
            _ => {}
        }
        Ok(())
    }

    fn handle_cards_key(&mut self, key: KeyEvent) -> Result<()> {
        let total = self.manager.cards().len();
        match key.code {
            KeyCode::Char('q') => self.state.should_quit = true,
            KeyCode::Up | KeyCode::Char('k') => self.state.move_cursor(-1, total),
            KeyCode::Down | KeyCode::Char('j') => self.state.move_cursor(1, total),
            KeyCode::PageUp => self.state.move_cursor(-(self.state.page() as isize), total),
            KeyCode::PageDown => self.state.move_cursor(self.state.page() as isize, total),
            KeyCode::Home => self.state.cursor = 0,
            KeyCode::End => self.state.cursor = total.saturating_sub(1),
            KeyCode::Char('a') => {
                self.manager.open_create()?;
                self.form = FormState::default();
            }
            KeyCode::Char('e') | KeyCode::Enter => {
                let Some(card) = self.current_card().cloned() else {
                    self.state.set_status("No card selected".to_string());
                    return Ok(());
                };
                self.manager.open_edit(&card)?;
                self.form = FormState::default();
            }
            KeyCode::Char('d') | KeyCode::Delete => self.delete_current(),
            KeyCode::Char('r') => {
                self.state.set_status("Refreshing…".to_string());
                self.request_refresh();
            }
            _ => {}
        }
        Ok(())
    }

    fn handle_dialog_key(&mut self, key: KeyEvent) -> Result<()> {
        if self.manager.dialog().is_saving() {
            if key.code == KeyCode::Esc {
                self.state
                    .set_status("Save in progress; waiting for the server".to_string());
            }
            return Ok(());
        }

        match key.code {
            KeyCode::Esc => {
                self.manager.cancel()?;
                self.form = FormState::default();
                self.state.set_status("Edit cancelled".to_string());
            }
            KeyCode::Enter => self.submit_dialog()?,
            KeyCode::Tab | KeyCode::Down => self.form.focus = self.form.focus.step(1),
            KeyCode::BackTab | KeyCode::Up => self.form.focus = self.form.focus.step(-1),
            KeyCode::Backspace => self.erase_char()?,
            KeyCode::Char(ch) => self.input_char(ch)?,
            _ => {}
        }
        Ok(())
    }

    fn input_char(&mut self, ch: char) -> Result<()> {
        if ch.is_control() {
            return Ok(());
        }
        match self.form.focus {
            Field::Name => push_text(&mut self.manager.draft_mut()?.name, ch),
            Field::Description => push_text(&mut self.manager.draft_mut()?.description, ch),
            Field::UpgradeCost => {
                let draft = self.manager.draft_mut()?;
                draft.upgrade_cost = push_digit(draft.upgrade_cost, ch);
            }
            Field::Image => push_text(&mut self.form.image_path, ch),
        }
        Ok(())
    }

    fn erase_char(&mut self) -> Result<()> {
        match self.form.focus {
            Field::Name => {
                self.manager.draft_mut()?.name.pop();
            }
            Field::Description => {
                self.manager.draft_mut()?.description.pop();
            }
            Field::UpgradeCost => {
                let draft = self.manager.draft_mut()?;
                draft.upgrade_cost = pop_digit(draft.upgrade_cost);
            }
            Field::Image => {
                self.form.image_path.pop();
            }
        }
        Ok(())
    }

    fn draw(&mut self, frame: &mut Frame) {
        match self.screen {
            Screen::Login => self.draw_login(frame),
            Screen::Cards => self.draw_cards(frame),
        }
    }

    fn draw_login(&self, frame: &mut Frame) {
        let area = frame.size();
        let popup = centered_rect(70, 11, area);
        let target = self
            .redirect
            .as_ref()
            .map(|redirect| redirect.from.to_string())
            .unwrap_or_else(|| self.cards_location.to_string());
        let lines = vec![
            Line::from(Span::styled(
                "No active session",
                Style::default()
                    .fg(self.theme.warning)
                    .add_modifier(Modifier::BOLD),
            )),
            Line::from(""),
            Line::from("Sign in with the admin login flow, which stores the token in:"),
            Line::from(Span::styled(
                self.session_file.display().to_string(),
                Style::default().fg(self.theme.accent),
            )),
            Line::from(format!("You will be returned to {target}.")),
            Line::from(""),
            Line::from(vec![
                Span::styled("r", Style::default().add_modifier(Modifier::BOLD)),
                Span::raw(" check again  "),
                Span::styled("q", Style::default().add_modifier(Modifier::BOLD)),
                Span::raw(" quit"),
            ]),
            Line::from(Span::styled(
                self.state.status.clone(),
                Style::default().fg(self.theme.muted),
            )),
        ];
        let paragraph = Paragraph::new(lines)
            .block(Block::default().borders(Borders::ALL).title("Login"))
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, popup);
    }

    fn draw_cards(&mut self, frame: &mut Frame) {
        let size = frame.size();
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(5),
                Constraint::Length(4),
            ])
            .split(size);

        self.render_header(frame, chunks[0]);
        self.render_card_table(frame, chunks[1]);
        self.render_status(frame, chunks[2]);
        if self.manager.dialog().is_visible() {
            self.render_dialog(frame);
        }
    }

    fn render_header(&self, frame: &mut Frame, area: Rect) {
        let key = |label: &'static str| {
            Span::styled(
                label,
                Style::default()
                    .fg(self.theme.accent)
                    .add_modifier(Modifier::BOLD),
            )
        };
        let line = Line::from(vec![
            key("a"),
            Span::raw(" add  "),
            key("e"),
            Span::raw(" edit  "),
            key("d"),
            Span::raw(" delete  "),
            key("r"),
            Span::raw(" refresh  "),
            key("q"),
            Span::raw(" quit"),
        ]);
        let paragraph = Paragraph::new(line)
            .block(Block::default().borders(Borders::ALL).title("Card management"));
        frame.render_widget(paragraph, area);
    }

    fn render_card_table(&mut self, frame: &mut Frame, area: Rect) {
        self.state.list_height = area.height.saturating_sub(3) as usize;
        let cards = self.manager.cards();
        self.state.clamp_cursor(cards.len());

        let header = Row::new(vec!["ID", "Name", "Description", "Upgrade cost", "Image"]).style(
            Style::default()
                .fg(self.theme.accent)
                .add_modifier(Modifier::BOLD),
        );
        let rows: Vec<Row> = cards
            .iter()
            .map(|card| {
                let style = if self.manager.is_deleting(&card.id) {
                    Style::default().fg(self.theme.muted)
                } else {
                    Style::default().fg(self.theme.primary_fg)
                };
                Row::new(vec![
                    Cell::from(card.id.to_string()),
                    Cell::from(card.name.clone()),
                    Cell::from(card.description.clone()),
                    Cell::from(card.upgrade_cost.to_string()),
                    Cell::from(card.image.clone().unwrap_or_default()),
                ])
                .style(style)
            })
            .collect();

        let title = match self.manager.synced_at() {
            Some(at) => format!(
                "Cards ({}) · synced {}",
                cards.len(),
                at.with_timezone(&Local).format("%H:%M:%S")
            ),
            None => "Cards".to_string(),
        };
        let table = Table::new(
            rows,
            [
                Constraint::Length(8),
                Constraint::Percentage(20),
                Constraint::Percentage(40),
                Constraint::Length(14),
                Constraint::Min(10),
            ],
        )
        .header(header)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(Style::default().bg(self.theme.selection_bg))
        .highlight_symbol("▶ ");

        let mut table_state = TableState::default();
        if !cards.is_empty() {
            table_state.select(Some(self.state.cursor));
        }
        frame.render_stateful_widget(table, area, &mut table_state);
    }

    fn render_status(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default().borders(Borders::ALL).title("Status");
        let mut lines = vec![Line::from(self.state.status.clone())];
        match self.manager.last_error() {
            Some(message) => lines.push(Line::from(Span::styled(
                message.to_string(),
                Style::default().fg(self.theme.danger),
            ))),
            None if self.pending_list => lines.push(Line::from(Span::styled(
                "Refreshing…",
                Style::default().fg(self.theme.muted),
            ))),
            None => {}
        }
        let paragraph = Paragraph::new(lines).block(block).wrap(Wrap { trim: true });
        frame.render_widget(paragraph, area);
    }

    fn render_dialog(&self, frame: &mut Frame) {
        let dialog = self.manager.dialog();
        let (Some(mode), Some(draft)) = (dialog.mode(), dialog.draft()) else {
            return;
        };
        let area = centered_rect(64, 12, frame.size());
        frame.render_widget(Clear, area);

        let title = match mode {
            DialogMode::Creating => "Add card".to_string(),
            DialogMode::Editing(id) => format!("Edit card #{id}"),
        };
        let cost = draft
            .upgrade_cost
            .map(|value| value.to_string())
            .unwrap_or_default();
        let values = [
            draft.name.as_str(),
            draft.description.as_str(),
            cost.as_str(),
            self.form.image_path.as_str(),
        ];

        let mut lines: Vec<Line> = Field::ALL
            .iter()
            .zip(values)
            .map(|(field, value)| {
                let focused = *field == self.form.focus;
                let marker = if focused { "▶ " } else { "  " };
                let label_style = if focused {
                    Style::default()
                        .fg(self.theme.accent)
                        .add_modifier(Modifier::BOLD)
                } else {
                    Style::default().fg(self.theme.muted)
                };
                Line::from(vec![
                    Span::styled(format!("{marker}{:<13}", field.label()), label_style),
                    Span::raw(value.to_string()),
                ])
            })
            .collect();

        lines.push(Line::from(""));
        if let Dialog::Saving { .. } = dialog {
            lines.push(Line::from(Span::styled(
                "Saving…",
                Style::default().fg(self.theme.warning),
            )));
        } else {
            let action = match mode {
                DialogMode::Creating => " add card  ",
                DialogMode::Editing(_) => " save changes  ",
            };
            lines.push(Line::from(vec![
                Span::styled("Enter", Style::default().add_modifier(Modifier::BOLD)),
                Span::raw(action),
                Span::styled("Tab", Style::default().add_modifier(Modifier::BOLD)),
                Span::raw(" next field  "),
                Span::styled("Esc", Style::default().add_modifier(Modifier::BOLD)),
                Span::raw(" cancel"),
            ]));
        }
        if let Some(message) = self.manager.last_error() {
            lines.push(Line::from(Span::styled(
                message.to_string(),
                Style::default().fg(self.theme.danger),
            )));
        } else if draft.image.is_some() {
            lines.push(Line::from(Span::styled(
                "Image attached",
                Style::default().fg(self.theme.success),
            )));
        }

        let paragraph = Paragraph::new(lines)
            .block(Block::default().borders(Borders::ALL).title(title))
            .wrap(Wrap { trim: false });
        frame.render_widget(paragraph, area);
    }
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    disable_raw_mode().context("failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("failed to leave alternate screen")?;
    terminal.show_cursor()?;
    Ok(())
}

fn spawn_input_thread(sender: mpsc::Sender<AppEvent>) {
    thread::spawn(move || loop {
        match event::poll(TICK_RATE) {
            Ok(true) => match event::read() {
                Ok(evt) => {
                    if sender.blocking_send(AppEvent::Input(evt)).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            },
            Ok(false) => {
                if sender.blocking_send(AppEvent::Tick).is_err() {
                    break;
                }
            }
            Err(_) => break,
        }
    });
}

struct UiState {
    cursor: usize,
    list_height: usize,
    status: String,
    should_quit: bool,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            cursor: 0,
            list_height: 1,
            status: "Ready".to_string(),
            should_quit: false,
        }
    }
}

impl UiState {
    fn set_status(&mut self, message: String) {
        self.status = message;
    }

    fn page(&self) -> usize {
        self.list_height.max(1)
    }

    fn move_cursor(&mut self, delta: isize, total: usize) {
        if total == 0 {
            self.cursor = 0;
            return;
        }
        let max = total as isize - 1;
        self.cursor = (self.cursor as isize + delta).clamp(0, max) as usize;
    }

    fn clamp_cursor(&mut self, total: usize) {
        if self.cursor >= total {
            self.cursor = total.saturating_sub(1);
        }
    }
}

fn push_text(target: &mut String, ch: char) {
    if target.chars().count() < MAX_TEXT_LEN {
        target.push(ch);
    }
}

fn push_digit(current: Option<u64>, ch: char) -> Option<u64> {
    let Some(digit) = ch.to_digit(10) else {
        return current;
    };
    match current {
        None => Some(u64::from(digit)),
        Some(value) => Some(
            value
                .checked_mul(10)
                .and_then(|value| value.checked_add(u64::from(digit)))
                .unwrap_or(value),
        ),
    }
}

fn pop_digit(current: Option<u64>) -> Option<u64> {
    match current {
        Some(value) if value >= 10 => Some(value / 10),
        _ => None,
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}

fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width, height)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cardadmin_core::{models::CardForm, resource::CardApi, session::MemorySessionStore};
    use std::sync::Mutex;

    struct StaticApi(Vec<Card>);

    #[async_trait]
    impl CardApi for StaticApi {
        async fn list(&self) -> Result<Vec<Card>, ApiError> {
            Ok(self.0.clone())
        }

        async fn create(&self, _form: &CardForm) -> Result<(), ApiError> {
            Ok(())
        }

        async fn update(&self, _id: &CardId, _form: &CardForm) -> Result<(), ApiError> {
            Ok(())
        }

        async fn delete(&self, _id: &CardId) -> Result<(), ApiError> {
            Ok(())
        }
    }

    /// Server whose listing follows the writes it has accepted.
    #[derive(Default)]
    struct LiveApi {
        cards: Mutex<Vec<Card>>,
    }

    #[async_trait]
    impl CardApi for LiveApi {
        async fn list(&self) -> Result<Vec<Card>, ApiError> {
            Ok(self.cards.lock().unwrap().clone())
        }

        async fn create(&self, form: &CardForm) -> Result<(), ApiError> {
            let mut cards = self.cards.lock().unwrap();
            let id = CardId::new((cards.len() + 100).to_string());
            cards.push(Card {
                id,
                name: form.name.clone(),
                description: form.description.clone(),
                upgrade_cost: form.upgrade_cost,
                image: None,
            });
            Ok(())
        }

        async fn update(&self, _id: &CardId, _form: &CardForm) -> Result<(), ApiError> {
            Ok(())
        }

        async fn delete(&self, id: &CardId) -> Result<(), ApiError> {
            self.cards.lock().unwrap().retain(|card| &card.id != id);
            Ok(())
        }
    }

    fn fireball() -> Card {
        Card {
            id: CardId::new("1"),
            name: "Fireball".to_string(),
            description: "Deals damage".to_string(),
            upgrade_cost: 100,
            image: None,
        }
    }

    fn app_with(store: MemorySessionStore, api: Arc<dyn CardApi>) -> CardAdminApp {
        let config = AppConfig::default();
        let provider: Arc<dyn SessionProvider> = Arc::new(store);
        let guard = SessionGuard::new(provider, config.login_path.clone());
        CardAdminApp::new(guard, ResourceManager::new(api), &config)
    }

    fn app(store: MemorySessionStore) -> CardAdminApp {
        app_with(store, Arc::new(StaticApi(vec![fireball()])))
    }

    /// App on the cards screen with `cards` loaded and an event channel attached.
    async fn live_app(cards: Vec<Card>) -> (CardAdminApp, mpsc::Receiver<AppEvent>) {
        let api = Arc::new(LiveApi {
            cards: Mutex::new(cards),
        });
        let mut app = app_with(MemorySessionStore::with_token("token"), api);
        let (tx, rx) = mpsc::channel(8);
        app.event_tx = Some(tx);
        app.screen = Screen::Cards;
        app.manager.refresh().await.unwrap();
        (app, rx)
    }

    fn names(app: &CardAdminApp) -> Vec<String> {
        app.manager
            .cards()
            .iter()
            .map(|card| card.name.clone())
            .collect()
    }

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn digits_build_and_shrink_cost() {
        assert_eq!(push_digit(Some(0), '5'), Some(5));
        assert_eq!(push_digit(Some(12), '3'), Some(123));
        assert_eq!(push_digit(None, '7'), Some(7));
        assert_eq!(push_digit(Some(4), 'x'), Some(4));
        assert_eq!(push_digit(Some(u64::MAX), '9'), Some(u64::MAX));
        assert_eq!(pop_digit(Some(123)), Some(12));
        assert_eq!(pop_digit(Some(7)), None);
        assert_eq!(pop_digit(None), None);
    }

    #[test]
    fn focus_wraps_around_fields() {
        assert_eq!(Field::Name.step(1), Field::Description);
        assert_eq!(Field::Image.step(1), Field::Name);
        assert_eq!(Field::Name.step(-1), Field::Image);
    }

    #[test]
    fn cursor_stays_within_list() {
        let mut state = UiState::default();
        state.move_cursor(5, 3);
        assert_eq!(state.cursor, 2);
        state.move_cursor(-10, 3);
        assert_eq!(state.cursor, 0);
        state.cursor = 4;
        state.clamp_cursor(2);
        assert_eq!(state.cursor, 1);
    }

    #[test]
    fn missing_session_shows_login_with_return_location() {
        let mut app = app(MemorySessionStore::default());
        let location = app.cards_location.clone();
        app.navigate(location.clone());

        assert_eq!(app.screen, Screen::Login);
        let redirect = app.redirect.clone().unwrap();
        assert_eq!(redirect.to, "/login");
        assert_eq!(redirect.from, location);
    }

    #[tokio::test]
    async fn session_appearing_returns_to_cards() {
        let store = MemorySessionStore::default();
        let mut app = app(store.clone());
        let (tx, mut rx) = mpsc::channel(8);
        app.event_tx = Some(tx);

        let location = app.cards_location.clone();
        app.navigate(location);
        assert_eq!(app.screen, Screen::Login);

        store.set(Some("token".to_string()));
        app.handle_key(press(KeyCode::Char('r'))).unwrap();
        assert_eq!(app.screen, Screen::Cards);
        assert!(app.redirect.is_none());

        let event = rx.recv().await;
        assert!(app.process_app_event(event));
        assert_eq!(app.manager.cards().len(), 1);
    }

    #[tokio::test]
    async fn dialog_keys_edit_draft_and_cancel() {
        let mut app = app(MemorySessionStore::with_token("token"));
        app.manager.refresh().await.unwrap();
        app.screen = Screen::Cards;

        app.handle_key(press(KeyCode::Char('a'))).unwrap();
        for ch in "Shield".chars() {
            app.handle_key(press(KeyCode::Char(ch))).unwrap();
        }
        app.handle_key(press(KeyCode::Tab)).unwrap();
        app.handle_key(press(KeyCode::Tab)).unwrap();
        app.handle_key(press(KeyCode::Char('5'))).unwrap();
        app.handle_key(press(KeyCode::Char('0'))).unwrap();

        let draft = app.manager.dialog().draft().unwrap().clone();
        assert_eq!(draft.name, "Shield");
        assert_eq!(draft.upgrade_cost, Some(50));

        app.handle_key(press(KeyCode::Esc)).unwrap();
        assert_eq!(app.manager.dialog(), &Dialog::Closed);
        assert_eq!(app.manager.cards().len(), 1);
    }

    #[tokio::test]
    async fn invalid_draft_stays_open_on_enter() {
        let mut app = app(MemorySessionStore::with_token("token"));
        let (tx, _rx) = mpsc::channel(8);
        app.event_tx = Some(tx);
        app.screen = Screen::Cards;

        app.handle_key(press(KeyCode::Char('a'))).unwrap();
        app.handle_key(press(KeyCode::Enter)).unwrap();

        assert!(matches!(app.manager.dialog(), Dialog::Open { .. }));
        assert!(app.state.status.contains("name is required"));
    }
    #[tokio::test]
    async fn delete_during_pending_list_still_relists() {
        let shield = Card {
            id: CardId::new("2"),
            name: "Shield".to_string(),
            ..fireball()
        };
        let (mut app, mut rx) = live_app(vec![fireball(), shield]).await;

        app.request_refresh();
        let stale = rx.recv().await;
        assert!(app.pending_list);

        app.handle_key(press(KeyCode::Char('d'))).unwrap();
        let deleted = rx.recv().await;
        assert!(matches!(deleted, Some(AppEvent::Deleted(_, Ok(())))));
        assert!(app.process_app_event(deleted));

        // The listing served before the delete is not shown as current.
        assert!(app.process_app_event(stale));
        assert_eq!(names(&app), vec!["Fireball", "Shield"]);
        assert!(app.pending_list);

        let fresh = rx.recv().await;
        assert!(app.process_app_event(fresh));
        assert_eq!(names(&app), vec!["Shield"]);
        assert!(!app.pending_list);
        assert!(!app.relist_queued);
    }

    #[tokio::test]
    async fn save_during_pending_list_still_relists() {
        let (mut app, mut rx) = live_app(vec![fireball()]).await;

        app.request_refresh();
        let stale = rx.recv().await;

        app.handle_key(press(KeyCode::Char('a'))).unwrap();
        for ch in "Shield".chars() {
            app.handle_key(press(KeyCode::Char(ch))).unwrap();
        }
        app.handle_key(press(KeyCode::Tab)).unwrap();
        for ch in "Blocks".chars() {
            app.handle_key(press(KeyCode::Char(ch))).unwrap();
        }
        app.handle_key(press(KeyCode::Enter)).unwrap();
        assert!(app.manager.dialog().is_saving());

        let saved = rx.recv().await;
        assert!(matches!(saved, Some(AppEvent::Saved(Ok(())))));
        assert!(app.process_app_event(saved));
        assert_eq!(app.manager.dialog(), &Dialog::Closed);

        assert!(app.process_app_event(stale));
        let fresh = rx.recv().await;
        assert!(app.process_app_event(fresh));
        assert_eq!(names(&app), vec!["Fireball", "Shield"]);
        assert!(!app.pending_list);
    }

    #[tokio::test]
    async fn delete_without_pending_list_relists_once() {
        let (mut app, mut rx) = live_app(vec![fireball()]).await;

        app.handle_key(press(KeyCode::Char('d'))).unwrap();
        let deleted = rx.recv().await;
        assert!(app.process_app_event(deleted));
        assert!(app.pending_list);

        let fresh = rx.recv().await;
        assert!(matches!(fresh, Some(AppEvent::Listed(_))));
        assert!(app.process_app_event(fresh));
        assert!(app.manager.cards().is_empty());
        assert!(!app.pending_list);
        assert!(!app.relist_queued);
    }
}
