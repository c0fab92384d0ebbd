//! Application orchestration and the main event loop
//!
//! `App` is the only mutator of [`ViewState`]. Four input classes feed it:
//! keyboard input, copilot turn events, completed resource fetches, and the
//! periodic refresh tick. The turn task and fetch tasks run on the runtime
//! and report back over channels, so each incoming input is applied
//! atomically by the loop.

use std::io::{self, Stdout};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::{DateTime, Local};
use crossterm::{
    event::{self as cevent, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tokio::sync::mpsc;

use crate::agent::{AgentEvent, TurnEngine};
use crate::exec::{CommandExecutor, DEFAULT_TIMEOUT};
use crate::kube::{ClusterInfo, ContextRegistry, ResourceBackend, ResourceKind, ResourceTable};

use super::commands::{route, Action};
use super::state::{Modal, ViewState};
use super::ui;

/// Default interval between background refreshes of the resource table.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(5);

/// Copilot transcript entries.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatMessage {
    User(String),
    Assistant(String),
    Thinking(String),
    ToolCall { name: String, input: String },
    ToolResult { body: String, is_error: bool },
    Error(String),
    Status(String),
    Separator,
}

/// Severity of an audit-log line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LogLevel {
    Info,
    Tool,
    Ok,
    Error,
}

/// One line in the command/audit log.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub level: LogLevel,
    pub source: String,
    pub text: String,
    pub at: DateTime<Local>,
}

/// Selection-triggered convenience prompts for the highlighted row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SelectionAction {
    Describe,
    Yaml,
    Logs,
    ShellInfo,
}

/// Results of spawned side effects reported back to the loop.
#[derive(Debug)]
pub enum SideEffect {
    ExecFinished {
        command: String,
        output: String,
        failed: bool,
    },
    ContextsListed(Vec<crate::kube::ContextEntry>),
    ContextSwitched {
        name: String,
        ok: bool,
    },
}

/// Which pane receives plain keyboard input when no modal is open.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Focus {
    Table,
    Chat,
}

pub struct App {
    pub view: ViewState,
    pub cluster_info: ClusterInfo,
    pub table: ResourceTable,
    pub selected: usize,
    pub transcript: Vec<ChatMessage>,
    pub audit_log: Vec<LogEntry>,
    pub focus: Focus,
    pub chat_input: String,
    pub modal_input: String,
    pub should_quit: bool,

    engine: Arc<TurnEngine>,
    backend: Arc<dyn ResourceBackend>,
    contexts: Arc<dyn ContextRegistry>,
    executor: CommandExecutor,

    current_tool: String,
    fetch_in_flight: bool,
    refresh_pending: bool,
    refresh_interval: Duration,
    copilot_available: bool,

    agent_tx: mpsc::UnboundedSender<AgentEvent>,
    agent_rx: mpsc::UnboundedReceiver<AgentEvent>,
    fetch_tx: mpsc::UnboundedSender<(ResourceKind, ResourceTable)>,
    fetch_rx: mpsc::UnboundedReceiver<(ResourceKind, ResourceTable)>,
    side_tx: mpsc::UnboundedSender<SideEffect>,
    side_rx: mpsc::UnboundedReceiver<SideEffect>,
}

impl App {
    pub fn new(
        view: ViewState,
        engine: Arc<TurnEngine>,
        backend: Arc<dyn ResourceBackend>,
        contexts: Arc<dyn ContextRegistry>,
        executor: CommandExecutor,
        cluster_info: ClusterInfo,
    ) -> Self {
        let (agent_tx, agent_rx) = mpsc::unbounded_channel();
        let (fetch_tx, fetch_rx) = mpsc::unbounded_channel();
        let (side_tx, side_rx) = mpsc::unbounded_channel();
        Self {
            view,
            cluster_info,
            table: ResourceTable::default(),
            selected: 0,
            transcript: Vec::new(),
            audit_log: Vec::new(),
            focus: Focus::Table,
            chat_input: String::new(),
            modal_input: String::new(),
            should_quit: false,
            engine,
            backend,
            contexts,
            executor,
            current_tool: String::new(),
            fetch_in_flight: false,
            refresh_pending: false,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            copilot_available: true,
            agent_tx,
            agent_rx,
            fetch_tx,
            fetch_rx,
            side_tx,
            side_rx,
        }
    }

    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    pub fn with_copilot_available(mut self, available: bool) -> Self {
        self.copilot_available = available;
        self
    }

    // ── Terminal lifecycle ──────────────────────────────────────

    pub async fn run(mut self) -> Result<()> {
        let mut terminal = Self::setup_terminal()?;
        self.log_startup();
        self.request_refresh();
        let result = self.event_loop(&mut terminal).await;
        Self::restore_terminal(&mut terminal)?;
        result
    }

    fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        Ok(Terminal::new(CrosstermBackend::new(stdout))?)
    }

    fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        disable_raw_mode()?;
        execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
        terminal.show_cursor()?;
        Ok(())
    }

    fn log_startup(&mut self) {
        if self.cluster_info.context_name.is_empty() {
            self.log(LogLevel::Error, "kube", "Not connected to any cluster");
        } else {
            let text = format!(
                "Connected to cluster: {} (ctx: {})",
                self.cluster_info.cluster_name, self.cluster_info.context_name
            );
            self.log(LogLevel::Info, "kube", text);
        }
        if !self.copilot_available {
            self.log(
                LogLevel::Error,
                "copilot",
                "ANTHROPIC_API_KEY not set -- the copilot requires it",
            );
        }
    }

    async fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        let mut last_refresh = Instant::now();
        while !self.should_quit {
            terminal.draw(|frame| ui::render(frame, self))?;

            if cevent::poll(Duration::from_millis(100))? {
                if let cevent::Event::Key(key) = cevent::read()? {
                    if key.kind == KeyEventKind::Press {
                        self.on_key(key);
                    }
                }
            }

            while let Ok(event) = self.agent_rx.try_recv() {
                self.on_agent_event(event);
            }
            while let Ok((kind, table)) = self.fetch_rx.try_recv() {
                self.on_fetch_result(kind, table);
            }
            while let Ok(effect) = self.side_rx.try_recv() {
                self.on_side_effect(effect);
            }

            if last_refresh.elapsed() >= self.refresh_interval {
                last_refresh = Instant::now();
                self.on_tick();
            }
        }
        Ok(())
    }

    // ── Input: keyboard ─────────────────────────────────────────

    pub fn on_key(&mut self, key: KeyEvent) {
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            self.quit();
            return;
        }
        match self.view.active_modal {
            Modal::CommandBar => self.key_line_input(key, LineTarget::Command),
            Modal::FilterBar => self.key_line_input(key, LineTarget::Filter),
            Modal::Help => {
                if matches!(key.code, KeyCode::Esc | KeyCode::Char('?')) {
                    self.view.close_modal();
                }
            }
            Modal::None => match self.focus {
                Focus::Chat => self.key_chat(key),
                Focus::Table => self.key_table(key),
            },
        }
    }

    fn key_table(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('q') => self.quit(),
            KeyCode::Char(c @ '1'..='5') => {
                let index = c as usize - '1' as usize;
                self.apply_action(Action::SwitchResource(ResourceKind::ALL[index]));
            }
            KeyCode::Char('c') => self.focus = Focus::Chat,
            KeyCode::Char(':') => {
                self.modal_input.clear();
                self.view.open_modal(Modal::CommandBar);
            }
            KeyCode::Char('/') => {
                self.modal_input.clear();
                self.view.open_modal(Modal::FilterBar);
            }
            KeyCode::Char('?') => self.view.open_modal(Modal::Help),
            KeyCode::Char(' ') => self.view.set_copilot_visible(!self.view.copilot_visible),
            KeyCode::Up | KeyCode::Char('k') => self.move_selection(-1),
            KeyCode::Down | KeyCode::Char('j') => self.move_selection(1),
            KeyCode::Char('d') => self.selection_prompt(SelectionAction::Describe),
            KeyCode::Char('y') => self.selection_prompt(SelectionAction::Yaml),
            KeyCode::Char('l') => self.selection_prompt(SelectionAction::Logs),
            KeyCode::Char('s') => self.selection_prompt(SelectionAction::ShellInfo),
            _ => {}
        }
    }

    fn key_chat(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => self.focus = Focus::Table,
            KeyCode::Enter => {
                let prompt = std::mem::take(&mut self.chat_input);
                self.submit_prompt(&prompt);
            }
            KeyCode::Backspace => {
                self.chat_input.pop();
            }
            KeyCode::Char(c) => self.chat_input.push(c),
            _ => {}
        }
    }

    fn key_line_input(&mut self, key: KeyEvent, target: LineTarget) {
        match key.code {
            KeyCode::Esc => {
                self.modal_input.clear();
                self.view.close_modal();
            }
            KeyCode::Enter => {
                let input = std::mem::take(&mut self.modal_input);
                match target {
                    LineTarget::Command => self.submit_command(&input),
                    LineTarget::Filter => self.submit_filter(&input),
                }
            }
            KeyCode::Backspace => {
                self.modal_input.pop();
            }
            KeyCode::Char(c) => self.modal_input.push(c),
            _ => {}
        }
    }

    // ── Input: submitted prompt ─────────────────────────────────

    /// Starts a copilot turn, unless one is already in flight (silent no-op).
    pub fn submit_prompt(&mut self, prompt: &str) {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return;
        }
        if self.view.begin_turn().is_err() {
            tracing::debug!("prompt rejected: turn already in flight");
            return;
        }
        self.current_tool.clear();
        self.transcript.push(ChatMessage::User(prompt.to_string()));
        self.transcript
            .push(ChatMessage::Status("Copilot is thinking...".to_string()));
        self.log(
            LogLevel::Info,
            "copilot",
            format!("query: {}", clip(prompt, 80)),
        );

        let engine = Arc::clone(&self.engine);
        let tx = self.agent_tx.clone();
        let prompt = prompt.to_string();
        tokio::spawn(async move {
            engine.run(&prompt, &tx).await;
        });
    }

    /// Applies one turn event to the transcript, audit log, and view state.
    pub fn on_agent_event(&mut self, event: AgentEvent) {
        match event {
            AgentEvent::Text { body } => self.transcript.push(ChatMessage::Assistant(body)),
            AgentEvent::Thinking { body } => self.transcript.push(ChatMessage::Thinking(body)),
            AgentEvent::ToolUse {
                tool_name,
                tool_input,
                ..
            } => {
                self.current_tool = tool_name.clone();
                self.log(LogLevel::Tool, &tool_name, clip(&tool_input, 100));
                self.transcript.push(ChatMessage::ToolCall {
                    name: tool_name,
                    input: tool_input,
                });
            }
            AgentEvent::ToolResult { body, is_error, .. } => {
                let name = if self.current_tool.is_empty() {
                    "tool".to_string()
                } else {
                    self.current_tool.clone()
                };
                let level = if is_error { LogLevel::Error } else { LogLevel::Ok };
                self.log(level, &name, clip(&body, 100));
                self.transcript
                    .push(ChatMessage::ToolResult { body, is_error });
                // The tool may have mutated cluster state.
                self.request_refresh_or_queue();
            }
            AgentEvent::Error { body } => {
                self.log(LogLevel::Error, "copilot", clip(&body, 100));
                self.transcript.push(ChatMessage::Error(body));
            }
            AgentEvent::Done => {
                self.view.end_turn();
                self.transcript.push(ChatMessage::Separator);
            }
        }
    }

    // ── Input: periodic tick & fetches ──────────────────────────

    /// Background refresh trigger; dropped while a fetch is outstanding.
    pub fn on_tick(&mut self) {
        self.request_refresh();
    }

    /// Spawns a fetch of the current kind unless one is already in flight.
    pub fn request_refresh(&mut self) {
        if self.fetch_in_flight {
            tracing::trace!("refresh dropped: fetch already in flight");
            return;
        }
        self.spawn_fetch();
    }

    /// Like [`Self::request_refresh`], but a collision with an outstanding
    /// fetch queues one follow-up instead of dropping the request. Used for
    /// tool results, which must always be followed by a re-fetch.
    fn request_refresh_or_queue(&mut self) {
        if self.fetch_in_flight {
            self.refresh_pending = true;
            return;
        }
        self.spawn_fetch();
    }

    fn spawn_fetch(&mut self) {
        self.fetch_in_flight = true;
        let backend = Arc::clone(&self.backend);
        let kind = self.view.resource_kind;
        let namespace = self.view.namespace.clone();
        let tx = self.fetch_tx.clone();
        tokio::spawn(async move {
            let table = backend.list(kind, &namespace).await;
            let _ = tx.send((kind, table));
        });
    }

    /// Applies a completed fetch; stale kinds trigger one follow-up fetch,
    /// as does a refresh queued while this fetch was outstanding.
    pub fn on_fetch_result(&mut self, kind: ResourceKind, table: ResourceTable) {
        self.fetch_in_flight = false;
        if kind != self.view.resource_kind {
            self.refresh_pending = false;
            self.request_refresh();
            return;
        }
        self.table = table;
        let visible = self.visible_rows().len();
        if self.selected >= visible {
            self.selected = visible.saturating_sub(1);
        }
        if self.refresh_pending {
            self.refresh_pending = false;
            self.spawn_fetch();
        }
    }

    /// Receives one completed fetch from the channel and applies it.
    ///
    /// The event loop drains the channel itself; this is the deterministic
    /// path for integration tests.
    pub async fn next_fetch(&mut self) -> bool {
        match self.fetch_rx.recv().await {
            Some((kind, table)) => {
                self.on_fetch_result(kind, table);
                true
            }
            None => false,
        }
    }

    /// Receives one pending agent event, if any.
    pub async fn next_agent_event(&mut self) -> Option<AgentEvent> {
        self.agent_rx.recv().await
    }

    /// Receives one completed side effect, if any.
    pub async fn next_side_effect(&mut self) -> Option<SideEffect> {
        self.side_rx.recv().await
    }

    pub fn fetch_in_flight(&self) -> bool {
        self.fetch_in_flight
    }

    // ── Input: command/filter submission ────────────────────────

    /// Routes submitted command-bar text and applies the resulting action.
    pub fn submit_command(&mut self, input: &str) {
        self.view.close_modal();
        let input = input.trim();
        if input.is_empty() {
            return;
        }
        self.apply_action(route(input));
    }

    /// Applies submitted filter-bar text to subsequent row rendering.
    pub fn submit_filter(&mut self, input: &str) {
        self.view.close_modal();
        self.view.set_filter(input.trim());
        self.selected = 0;
        self.request_refresh();
    }

    fn apply_action(&mut self, action: Action) {
        match action {
            Action::SwitchResource(kind) => {
                self.view.set_resource_kind(kind);
                self.selected = 0;
                self.request_refresh();
            }
            Action::SwitchNamespace(namespace) => {
                self.view.set_namespace(namespace.clone());
                self.engine.set_namespace(&namespace);
                self.log(
                    LogLevel::Info,
                    "cmd",
                    format!("Switched namespace to: {}", namespace),
                );
                self.request_refresh();
            }
            Action::SwitchContext(name) => {
                let contexts = Arc::clone(&self.contexts);
                let tx = self.side_tx.clone();
                tokio::spawn(async move {
                    let ok = contexts.switch_context(&name).await;
                    let _ = tx.send(SideEffect::ContextSwitched { name, ok });
                });
            }
            Action::ListContexts => {
                let contexts = Arc::clone(&self.contexts);
                let tx = self.side_tx.clone();
                tokio::spawn(async move {
                    let entries = contexts.list_contexts().await;
                    let _ = tx.send(SideEffect::ContextsListed(entries));
                });
            }
            Action::Quit => self.quit(),
            Action::PassThrough(command) => {
                self.log(LogLevel::Tool, "exec", command.clone());
                let executor = self.executor.clone();
                let tx = self.side_tx.clone();
                tokio::spawn(async move {
                    let argv: Vec<String> =
                        command.split_whitespace().map(str::to_string).collect();
                    let result = executor.execute(&argv, DEFAULT_TIMEOUT).await;
                    let _ = tx.send(SideEffect::ExecFinished {
                        command,
                        output: result.output,
                        failed: result.failed,
                    });
                });
            }
        }
    }

    /// Applies a completed side effect to the audit log and view.
    pub fn on_side_effect(&mut self, effect: SideEffect) {
        match effect {
            SideEffect::ExecFinished {
                command,
                output,
                failed,
            } => {
                let source = command
                    .split_whitespace()
                    .next()
                    .unwrap_or("exec")
                    .to_string();
                let level = if failed { LogLevel::Error } else { LogLevel::Ok };
                self.log(level, &source, clip(&output, 200));
            }
            SideEffect::ContextsListed(entries) => {
                if entries.is_empty() {
                    self.log(LogLevel::Error, "ctx", "no contexts found");
                    return;
                }
                let listing = entries
                    .iter()
                    .map(|entry| {
                        if entry.is_active {
                            format!("{} (active)", entry.name)
                        } else {
                            entry.name.clone()
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                self.log(LogLevel::Info, "ctx", listing);
            }
            SideEffect::ContextSwitched { name, ok } => {
                if ok {
                    self.cluster_info.context_name = name.clone();
                    self.engine
                        .set_cluster(&self.cluster_info.cluster_name, &name);
                    self.log(LogLevel::Info, "ctx", format!("Switched context to: {}", name));
                    self.request_refresh();
                } else {
                    self.log(LogLevel::Error, "ctx", format!("failed to switch to: {}", name));
                }
            }
        }
    }

    // ── Selection ───────────────────────────────────────────────

    /// Rows that pass the active filter, in table order.
    pub fn visible_rows(&self) -> Vec<&Vec<String>> {
        self.table
            .rows
            .iter()
            .filter(|row| self.view.row_matches(row))
            .collect()
    }

    fn move_selection(&mut self, delta: isize) {
        let len = self.visible_rows().len();
        if len == 0 {
            self.selected = 0;
            return;
        }
        let current = self.selected as isize;
        self.selected = (current + delta).clamp(0, len as isize - 1) as usize;
    }

    /// Synthesizes a prompt from the highlighted row and submits it through
    /// the ordinary prompt path.
    pub fn selection_prompt(&mut self, action: SelectionAction) {
        let Some(name) = self
            .visible_rows()
            .get(self.selected)
            .and_then(|row| row.first())
            .cloned()
        else {
            return;
        };
        let kind = self.view.resource_kind.kubectl_name();
        let namespace = self.view.namespace.clone();
        let prompt = match action {
            SelectionAction::Describe => format!(
                "Describe {} {} in namespace {} and summarize its state.",
                kind, name, namespace
            ),
            SelectionAction::Yaml => format!(
                "Show the YAML for {} {} in namespace {} and point out anything unusual.",
                kind, name, namespace
            ),
            SelectionAction::Logs => format!(
                "Show recent logs for {} {} in namespace {} and call out errors or warnings.",
                kind, name, namespace
            ),
            SelectionAction::ShellInfo => format!(
                "Explain how to open a shell into {} {} in namespace {}, including the exact kubectl command.",
                kind, name, namespace
            ),
        };
        self.submit_prompt(&prompt);
    }

    // ── Misc ────────────────────────────────────────────────────

    pub fn quit(&mut self) {
        self.engine.cancel();
        self.should_quit = true;
    }

    fn log(&mut self, level: LogLevel, source: &str, text: impl Into<String>) {
        self.audit_log.push(LogEntry {
            level,
            source: source.to_string(),
            text: text.into(),
            at: Local::now(),
        });
    }
}

#[derive(Clone, Copy)]
enum LineTarget {
    Command,
    Filter,
}

/// Clips to `max` characters for log display.
fn clip(text: &str, max: usize) -> String {
    let cleaned = text.replace('\n', " ");
    if cleaned.chars().count() <= max {
        cleaned
    } else {
        cleaned.chars().take(max).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{Transport, TransportMessage, TurnConfig, TurnOptions};
    use async_trait::async_trait;
    use futures::stream::BoxStream;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    struct SilentTransport;

    #[async_trait]
    impl Transport for SilentTransport {
        async fn stream(
            &self,
            _prompt: &str,
            _options: &TurnOptions,
        ) -> Result<BoxStream<'static, Result<TransportMessage>>> {
            Ok(Box::pin(futures::stream::empty()))
        }
    }

    /// Backend that counts list calls and can hold them open.
    struct CountingBackend {
        calls: AtomicUsize,
        gate: Option<Arc<Notify>>,
    }

    #[async_trait]
    impl ResourceBackend for CountingBackend {
        async fn list(&self, kind: ResourceKind, _namespace: &str) -> ResourceTable {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            ResourceTable::new(
                &["NAME"],
                vec![vec![format!("{}-row", kind.kubectl_name())]],
            )
        }
    }

    struct NoContexts;

    #[async_trait]
    impl crate::kube::ContextRegistry for NoContexts {
        async fn list_contexts(&self) -> Vec<crate::kube::ContextEntry> {
            Vec::new()
        }
        async fn switch_context(&self, _name: &str) -> bool {
            false
        }
    }

    fn test_app(backend: Arc<CountingBackend>) -> App {
        let engine = Arc::new(TurnEngine::new(
            Arc::new(SilentTransport),
            TurnConfig::default(),
        ));
        App::new(
            ViewState::new("default"),
            engine,
            backend,
            Arc::new(NoContexts),
            CommandExecutor::new(),
            ClusterInfo::default(),
        )
    }

    fn counting_backend() -> Arc<CountingBackend> {
        Arc::new(CountingBackend {
            calls: AtomicUsize::new(0),
            gate: None,
        })
    }

    #[tokio::test]
    async fn test_tool_result_triggers_exactly_one_refresh() {
        let backend = counting_backend();
        let mut app = test_app(Arc::clone(&backend));
        app.on_agent_event(AgentEvent::ToolUse {
            tool_name: "kubectl_exec".to_string(),
            tool_input: "{}".to_string(),
            tool_id: "toolu_01".to_string(),
        });
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
        app.on_agent_event(AgentEvent::ToolResult {
            tool_id: "toolu_01".to_string(),
            body: "3 rows".to_string(),
            is_error: false,
        });
        assert!(app.next_fetch().await);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert_eq!(app.table.rows[0][0], "pod-row");
    }

    #[tokio::test]
    async fn test_tick_dropped_while_fetch_outstanding() {
        let gate = Arc::new(Notify::new());
        let backend = Arc::new(CountingBackend {
            calls: AtomicUsize::new(0),
            gate: Some(Arc::clone(&gate)),
        });
        let mut app = test_app(Arc::clone(&backend));

        app.on_tick();
        assert!(app.fetch_in_flight());
        // Let the fetch task reach the gate.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);

        // Second tick while the first fetch is still outstanding: dropped.
        app.on_tick();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);

        // The first fetch's result is not lost.
        gate.notify_one();
        assert!(app.next_fetch().await);
        assert!(!app.fetch_in_flight());
        assert_eq!(app.table.rows.len(), 1);

        app.on_tick();
        tokio::time::sleep(Duration::from_millis(20)).await;
        gate.notify_one();
        assert!(app.next_fetch().await);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_tool_result_refresh_queued_behind_outstanding_tick_fetch() {
        let gate = Arc::new(Notify::new());
        let backend = Arc::new(CountingBackend {
            calls: AtomicUsize::new(0),
            gate: Some(Arc::clone(&gate)),
        });
        let mut app = test_app(Arc::clone(&backend));

        app.on_tick();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);

        // Tool result lands while the tick fetch is still outstanding.
        app.on_agent_event(AgentEvent::ToolResult {
            tool_id: "toolu_01".to_string(),
            body: "deleted pod web-0".to_string(),
            is_error: false,
        });
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);

        // Completing the tick fetch starts the queued follow-up.
        gate.notify_one();
        assert!(app.next_fetch().await);
        assert!(app.fetch_in_flight());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);

        gate.notify_one();
        assert!(app.next_fetch().await);
        assert!(!app.fetch_in_flight());
    }

    #[tokio::test]
    async fn test_missing_api_key_noted_at_startup() {
        let mut app = test_app(counting_backend()).with_copilot_available(false);
        app.log_startup();
        assert!(app
            .audit_log
            .iter()
            .any(|entry| entry.level == LogLevel::Error
                && entry.text.contains("ANTHROPIC_API_KEY")));
    }

    #[tokio::test]
    async fn test_prompt_rejected_while_turn_in_flight() {
        let mut app = test_app(counting_backend());
        app.view.begin_turn().unwrap();
        let transcript_len = app.transcript.len();
        app.submit_prompt("second prompt");
        assert_eq!(app.transcript.len(), transcript_len);
        assert!(app.view.turn_in_flight);
    }

    #[tokio::test]
    async fn test_done_ends_turn() {
        let mut app = test_app(counting_backend());
        app.view.begin_turn().unwrap();
        app.on_agent_event(AgentEvent::Done);
        assert!(!app.view.turn_in_flight);
        assert_eq!(app.transcript.last(), Some(&ChatMessage::Separator));
    }

    #[tokio::test]
    async fn test_error_event_does_not_end_turn() {
        let mut app = test_app(counting_backend());
        app.view.begin_turn().unwrap();
        app.on_agent_event(AgentEvent::Error {
            body: "transport failed".to_string(),
        });
        assert!(app.view.turn_in_flight);
        assert_eq!(app.audit_log.last().unwrap().level, LogLevel::Error);
    }

    #[tokio::test]
    async fn test_switch_resource_refetches_new_kind() {
        let backend = counting_backend();
        let mut app = test_app(Arc::clone(&backend));
        app.submit_command("svc");
        assert_eq!(app.view.resource_kind, ResourceKind::Services);
        assert!(app.next_fetch().await);
        assert_eq!(app.table.rows[0][0], "service-row");
    }

    #[tokio::test]
    async fn test_stale_kind_fetch_is_refetched() {
        let backend = counting_backend();
        let mut app = test_app(Arc::clone(&backend));
        app.on_tick(); // fetch for Pods
        app.view.set_resource_kind(ResourceKind::Nodes);
        assert!(app.next_fetch().await); // stale Pods result: dropped, refetched
        assert!(app.table.rows.is_empty());
        assert!(app.next_fetch().await);
        assert_eq!(app.table.rows[0][0], "node-row");
    }

    #[tokio::test]
    async fn test_namespace_switch_updates_engine_and_refetches() {
        let mut app = test_app(counting_backend());
        app.submit_command("ns staging");
        assert_eq!(app.view.namespace, "staging");
        assert!(app.fetch_in_flight());
        assert!(app
            .audit_log
            .iter()
            .any(|entry| entry.text.contains("staging")));
    }

    #[tokio::test]
    async fn test_selection_prompt_uses_row_name_and_namespace() {
        let mut app = test_app(counting_backend());
        app.table = ResourceTable::new(
            &["NAME", "STATUS"],
            vec![
                vec!["web-0".to_string(), "Running".to_string()],
                vec!["db-0".to_string(), "Pending".to_string()],
            ],
        );
        app.selected = 1;
        app.selection_prompt(SelectionAction::Describe);
        let Some(ChatMessage::User(prompt)) = app
            .transcript
            .iter()
            .find(|m| matches!(m, ChatMessage::User(_)))
        else {
            panic!("no user message recorded");
        };
        assert!(prompt.contains("db-0"));
        assert!(prompt.contains("pod"));
        assert!(prompt.contains("default"));
        assert!(app.view.turn_in_flight);
    }

    #[tokio::test]
    async fn test_selection_respects_filter() {
        let mut app = test_app(counting_backend());
        app.table = ResourceTable::new(
            &["NAME", "STATUS"],
            vec![
                vec!["web-0".to_string(), "Running".to_string()],
                vec!["db-0".to_string(), "Pending".to_string()],
            ],
        );
        app.view.set_filter("pending");
        app.selected = 0;
        app.selection_prompt(SelectionAction::Logs);
        let Some(ChatMessage::User(prompt)) = app.transcript.first() else {
            panic!("no user message recorded");
        };
        assert!(prompt.contains("db-0"));
    }

    #[tokio::test]
    async fn test_quit_cancels_turn() {
        let mut app = test_app(counting_backend());
        app.submit_command("q");
        assert!(app.should_quit);
    }

    #[tokio::test]
    async fn test_pass_through_output_lands_in_audit_log_only() {
        let mut app = test_app(counting_backend());
        app.submit_command("echo from-pass-through");
        let effect = app.side_rx.recv().await.unwrap();
        app.on_side_effect(effect);
        assert!(app
            .audit_log
            .iter()
            .any(|entry| entry.text.contains("from-pass-through")));
        assert!(app.table.rows.is_empty());
    }

    #[tokio::test]
    async fn test_modal_open_close_via_keys() {
        let mut app = test_app(counting_backend());
        let press = |code| KeyEvent::new(code, KeyModifiers::NONE);
        app.on_key(press(KeyCode::Char(':')));
        assert_eq!(app.view.active_modal, Modal::CommandBar);
        app.on_key(press(KeyCode::Char('?')));
        // Command bar consumes the '?' as text; close it first.
        app.on_key(press(KeyCode::Esc));
        assert_eq!(app.view.active_modal, Modal::None);
        app.on_key(press(KeyCode::Char('?')));
        assert_eq!(app.view.active_modal, Modal::Help);
    }
}
