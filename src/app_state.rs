use crate::commands::AppCommand;
use crate::form::FormState;
use crate::storage::repository::{JobRecord, JobStats};
use crate::summary::model::{MODEL_IMPLEMENTATIONS, MODEL_LEVERAGES, UNIVERSE_OPTIONS};
use crossterm::event::KeyCode;
use ratatui::widgets::ListState;
use std::str::FromStr;
use tokio::sync::mpsc;

#[derive(PartialEq, Debug, Clone)]
pub enum ViewMode {
    Form,
    Examples,
    Jobs,
    JobDetail,
}

#[derive(PartialEq, Debug, Clone)]
pub enum InputMode {
    Normal,
    Command,
}

#[derive(PartialEq, Debug, Clone)]
pub enum FocusArea {
    Menu,     // 焦点在左侧菜单
    MainView, // 焦点在主视图
}

pub const MENU_ITEMS: [&str; 4] = ["配置表单", "模板示例", "任务列表", "任务详情"];

#[derive(Debug)]
pub enum AppEvent {
    Log(String),
    Message(String),
    Error(String),
    Form(FormState),
    Examples(Vec<String>),
    Jobs(Vec<JobRecord>),
    Stats(JobStats),
    Job(JobRecord),
}

pub struct App {
    pub view_mode: ViewMode,
    pub input_mode: InputMode,
    pub focus_area: FocusArea,
    pub menu_selected_index: usize,
    pub form: FormState,
    pub examples: Vec<String>,
    pub jobs: Vec<JobRecord>,
    pub selected_index: usize,
    pub job_list_state: ListState,
    pub selected_job: Option<JobRecord>,
    pub job_stats: JobStats,
    pub detail_scroll: u16,
    pub command_input: String,
    pub command_cursor: usize,
    pub command_history: Vec<String>,
    pub command_history_index: Option<usize>,
    pub log_messages: Vec<String>,
    pub cmd_tx: mpsc::UnboundedSender<AppCommand>,
    pub evt_rx: Option<mpsc::UnboundedReceiver<AppEvent>>,
}

impl App {
    pub fn new(
        startup_info: Vec<String>,
        cmd_tx: mpsc::UnboundedSender<AppCommand>,
        evt_rx: mpsc::UnboundedReceiver<AppEvent>,
    ) -> App {
        let mut log_messages = vec!["应用已启动".to_string()];
        log_messages.extend(startup_info);

        App {
            view_mode: ViewMode::Form,
            input_mode: InputMode::Normal,
            focus_area: FocusArea::Menu,
            menu_selected_index: 0,
            form: FormState::default(),
            examples: Vec::new(),
            jobs: Vec::new(),
            selected_index: 0,
            job_list_state: {
                let mut s = ListState::default();
                s.select(Some(0));
                s
            },
            selected_job: None,
            job_stats: JobStats::default(),
            detail_scroll: 0,
            command_input: String::new(),
            command_cursor: 0,
            command_history: Vec::new(),
            command_history_index: None,
            log_messages,
            cmd_tx,
            evt_rx: Some(evt_rx),
        }
    }

    pub fn add_log(&mut self, msg: String) {
        self.log_messages.push(msg);
    }

    pub fn apply_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::Log(msg) | AppEvent::Message(msg) | AppEvent::Error(msg) => {
                self.add_log(msg)
            }
            AppEvent::Form(form) => self.form = form,
            AppEvent::Examples(list) => self.examples = list,
            AppEvent::Jobs(list) => {
                self.jobs = list;
                self.clamp_selection();
            }
            AppEvent::Stats(stats) => self.job_stats = stats,
            AppEvent::Job(job) => self.selected_job = Some(job),
        }
    }

    /// 获取当前的补全建议
    pub fn get_completion_hint(&self) -> Option<String> {
        let commands = [
            "env", "table", "user", "universe", "years", "version", "cluster", "template",
            "model", "point", "show", "examples", "run", "jobs", "job", "reset", "help", "quit",
        ];
        let input = self.command_input.trim();
        if input.is_empty() {
            return None;
        }

        let parts: Vec<&str> = input.split_whitespace().collect();
        match parts.as_slice() {
            [first] => complete(first, &commands),
            ["model", sub] | ["point", sub] => complete(sub, &["add", "rm"]),
            ["run", sub] => complete(sub, &["merge", "overwrite"]),
            ["env", sub] => complete(sub, &["dev", "rsch_dev", "rsch", "prd"]),
            ["universe", .., last] => {
                complete(last.rsplit(',').next().unwrap_or(""), &UNIVERSE_OPTIONS)
            }
            ["model", "add", imp] => complete(imp, &MODEL_IMPLEMENTATIONS),
            ["model", "add", _, .., lev] => {
                complete(lev.split('=').next().unwrap_or(""), &MODEL_LEVERAGES)
            }
            _ => None,
        }
    }

    pub fn clamp_selection(&mut self) {
        if self.selected_index >= self.jobs.len() {
            self.selected_index = self.jobs.len().saturating_sub(1);
        }
        self.job_list_state.select(Some(self.selected_index));
    }

    /// 请求当前选中任务的详情
    pub fn request_detail(&mut self) {
        if let Some(job) = self.jobs.get(self.selected_index) {
            self.detail_scroll = 0;
            let _ = self.cmd_tx.send(AppCommand::Job(Some(job.job_id.clone())));
        }
    }

    fn request_examples(&mut self) {
        let _ = self.cmd_tx.send(AppCommand::Examples);
    }

    fn reset_input(&mut self) {
        self.command_input.clear();
        self.command_cursor = 0;
        self.input_mode = InputMode::Normal;
    }

    pub fn handle_key_event(&mut self, key: KeyCode) -> bool {
        if self.input_mode == InputMode::Command {
            match key {
                KeyCode::Enter => {
                    let cmd_owned = self.command_input.trim().to_string();
                    if cmd_owned.is_empty() || cmd_owned == "q" {
                        self.reset_input();
                        return false;
                    }

                    let app_cmd = AppCommand::from_str(&cmd_owned)
                        .unwrap_or_else(|_| AppCommand::Unknown(cmd_owned.clone()));
                    if app_cmd == AppCommand::Quit {
                        return true;
                    }
                    let _ = self.cmd_tx.send(app_cmd);

                    self.command_history.push(cmd_owned);
                    self.command_history_index = None;
                    self.reset_input();
                    return false;
                }
                KeyCode::Esc => {
                    self.reset_input();
                    return false;
                }
                KeyCode::Tab => {
                    if let Some(hint) = self.get_completion_hint() {
                        let insert = format!("{} ", hint);
                        self.command_input.insert_str(self.command_cursor, &insert);
                        self.command_cursor += insert.len();
                    }
                    return false;
                }
                KeyCode::Up => {
                    if self.command_history.is_empty() {
                        return false;
                    }
                    let next = match self.command_history_index {
                        None => self.command_history.len().saturating_sub(1),
                        Some(i) => i.saturating_sub(1),
                    };
                    self.command_history_index = Some(next);
                    if let Some(cmd) = self.command_history.get(next) {
                        self.command_input = cmd.clone();
                        self.command_cursor = self.command_input.len();
                    }
                    return false;
                }
                KeyCode::Down => {
                    let Some(i) = self.command_history_index else {
                        return false;
                    };
                    let n = i + 1;
                    if n >= self.command_history.len() {
                        self.command_history_index = None;
                        self.command_input.clear();
                        self.command_cursor = 0;
                        return false;
                    }
                    self.command_history_index = Some(n);
                    if let Some(cmd) = self.command_history.get(n) {
                        self.command_input = cmd.clone();
                        self.command_cursor = self.command_input.len();
                    }
                    return false;
                }
                KeyCode::Backspace => {
                    if self.command_cursor > 0 {
                        let idx = prev_boundary(&self.command_input, self.command_cursor);
                        self.command_input.remove(idx);
                        self.command_cursor = idx;
                    }
                    return false;
                }
                KeyCode::Delete => {
                    if self.command_cursor < self.command_input.len() {
                        self.command_input.remove(self.command_cursor);
                    }
                    return false;
                }
                KeyCode::Left => {
                    if self.command_cursor > 0 {
                        self.command_cursor = prev_boundary(&self.command_input, self.command_cursor);
                    }
                    return false;
                }
                KeyCode::Right => {
                    if let Some(c) = self.command_input[self.command_cursor..].chars().next() {
                        self.command_cursor += c.len_utf8();
                    }
                    return false;
                }
                KeyCode::Home => {
                    self.command_cursor = 0;
                    return false;
                }
                KeyCode::End => {
                    self.command_cursor = self.command_input.len();
                    return false;
                }
                KeyCode::Char(c) => {
                    self.command_input.insert(self.command_cursor, c);
                    self.command_cursor += c.len_utf8();
                    return false;
                }
                _ => return false,
            }
        }

        // 正常模式下的按键处理
        match key {
            KeyCode::Char('/') => {
                self.input_mode = InputMode::Command;
                self.command_input.clear();
                self.command_cursor = 0;
                false
            }
            KeyCode::Char('q') => true,
            KeyCode::Left => {
                self.focus_area = FocusArea::Menu;
                false
            }
            KeyCode::Right => {
                self.focus_area = FocusArea::MainView;
                false
            }
            KeyCode::Up => {
                if self.focus_area == FocusArea::Menu {
                    self.menu_selected_index = self.menu_selected_index.saturating_sub(1);
                } else if self.view_mode == ViewMode::JobDetail {
                    self.detail_scroll = self.detail_scroll.saturating_sub(1);
                } else if self.view_mode == ViewMode::Jobs && self.selected_index > 0 {
                    self.selected_index -= 1;
                }
                false
            }
            KeyCode::Down => {
                if self.focus_area == FocusArea::Menu {
                    if self.menu_selected_index < MENU_ITEMS.len() - 1 {
                        self.menu_selected_index += 1;
                    }
                } else if self.view_mode == ViewMode::JobDetail {
                    self.detail_scroll = self.detail_scroll.saturating_add(1);
                } else if self.view_mode == ViewMode::Jobs
                    && self.selected_index < self.jobs.len().saturating_sub(1)
                {
                    self.selected_index += 1;
                }
                false
            }
            KeyCode::Enter | KeyCode::Char('c') => {
                if self.focus_area == FocusArea::Menu {
                    match self.menu_selected_index {
                        0 => self.view_mode = ViewMode::Form,
                        1 => {
                            self.view_mode = ViewMode::Examples;
                            self.request_examples();
                        }
                        2 => self.view_mode = ViewMode::Jobs,
                        3 => {
                            self.view_mode = ViewMode::JobDetail;
                            self.request_detail();
                        }
                        _ => {}
                    }
                    self.focus_area = FocusArea::MainView;
                } else if self.view_mode == ViewMode::Jobs && !self.jobs.is_empty() {
                    self.view_mode = ViewMode::JobDetail;
                    self.menu_selected_index = 3;
                    self.request_detail();
                }
                false
            }
            KeyCode::Char('x') => {
                if self.focus_area == FocusArea::MainView && self.view_mode == ViewMode::JobDetail {
                    self.view_mode = ViewMode::Jobs;
                    self.menu_selected_index = 2;
                }
                false
            }
            _ => false,
        }
    }
}

fn complete(cur: &str, options: &[&str]) -> Option<String> {
    options
        .iter()
        .find(|o| o.starts_with(cur) && **o != cur)
        .map(|o| o[cur.len()..].to_string())
}

fn prev_boundary(s: &str, cursor: usize) -> usize {
    s[..cursor]
        .char_indices()
        .next_back()
        .map(|(i, _)| i)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summary::model::Environment;

    fn app() -> (App, mpsc::UnboundedReceiver<AppCommand>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (_evt_tx, evt_rx) = mpsc::unbounded_channel();
        (App::new(Vec::new(), cmd_tx, evt_rx), cmd_rx)
    }

    fn type_line(app: &mut App, line: &str) -> bool {
        app.handle_key_event(KeyCode::Char('/'));
        for c in line.chars() {
            app.handle_key_event(KeyCode::Char(c));
        }
        app.handle_key_event(KeyCode::Enter)
    }

    #[test]
    fn typed_command_is_sent_to_background() {
        let (mut app, mut rx) = app();
        assert!(!type_line(&mut app, "env prd"));
        assert_eq!(rx.try_recv().unwrap(), AppCommand::SetEnvironment(Environment::Prd));
        assert_eq!(app.command_history, vec!["env prd"]);
        assert_eq!(app.input_mode, InputMode::Normal);
    }

    #[test]
    fn quit_command_exits() {
        let (mut app, _rx) = app();
        assert!(type_line(&mut app, "quit"));
    }

    #[test]
    fn completion_hints() {
        let (mut app, _rx) = app();
        app.command_input = "temp".into();
        assert_eq!(app.get_completion_hint().as_deref(), Some("late"));
        app.command_input = "run me".into();
        assert_eq!(app.get_completion_hint().as_deref(), Some("rge"));
        app.command_input = "model add BL".into();
        assert_eq!(app.get_completion_hint().as_deref(), Some("S"));
        app.command_input = "model add RC EDI AEPP".into();
        assert_eq!(app.get_completion_hint().as_deref(), Some("P"));
        app.command_input = "universe SPX,GL".into();
        assert_eq!(app.get_completion_hint().as_deref(), Some("OBAL"));
        app.command_input = "table omni".into();
        assert_eq!(app.get_completion_hint(), None);
    }

    #[test]
    fn non_ascii_input_edits_cleanly() {
        let (mut app, _rx) = app();
        app.handle_key_event(KeyCode::Char('/'));
        for c in "表a".chars() {
            app.handle_key_event(KeyCode::Char(c));
        }
        app.handle_key_event(KeyCode::Left);
        app.handle_key_event(KeyCode::Backspace);
        assert_eq!(app.command_input, "a");
        assert_eq!(app.command_cursor, 0);
    }

    #[test]
    fn events_update_state() {
        let (mut app, _rx) = app();
        app.apply_event(AppEvent::Form(FormState::default().with_table("t")));
        app.apply_event(AppEvent::Error("✗ boom".into()));
        assert_eq!(app.form.db_table, "t");
        assert_eq!(app.log_messages.last().unwrap(), "✗ boom");
    }
}
