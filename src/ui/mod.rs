use crate::app_state::{App, FocusArea, InputMode, ViewMode, MENU_ITEMS};
use crate::dispatch::model::JobStatus;
use crate::summary::model::CombinationStatus;
use chrono::{Local, TimeZone};
use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph, Wrap},
    Frame,
};

pub fn draw(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(ratatui::layout::Direction::Vertical)
        .constraints([
            Constraint::Length(3), // 顶部标题栏
            Constraint::Min(0),    // 中间内容区域
            Constraint::Min(8),    // 底部命令/日志区域
        ])
        .split(f.size());

    render_top_bar(f, chunks[0]);

    let middle_chunks = Layout::default()
        .direction(ratatui::layout::Direction::Horizontal)
        .constraints([
            Constraint::Length(20),
            Constraint::Min(0),
            Constraint::Length(36),
        ])
        .split(chunks[1]);

    render_left_menu(f, middle_chunks[0], app);
    render_main_view(f, middle_chunks[1], app);
    render_sidebar(f, middle_chunks[2], app);
    render_bottom_bar(f, chunks[2], app);
}

fn focus_style(active: bool) -> Style {
    if active {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default().fg(Color::White)
    }
}

fn heading(text: &str) -> Line<'static> {
    Line::from(vec![Span::styled(
        text.to_string(),
        Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD),
    )])
}

fn field<'a>(label: &'a str, value: String) -> Line<'a> {
    Line::from(vec![
        Span::styled(
            format!("{:<14}", label),
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Span::styled(value, Style::default().fg(Color::Cyan)),
    ])
}

fn format_millis(ms: i64) -> String {
    Local
        .timestamp_millis_opt(ms)
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ms.to_string())
}

fn status_style(status: JobStatus) -> (&'static str, Color) {
    match status {
        JobStatus::Completed => ("✓", Color::Green),
        JobStatus::Failed => ("✗", Color::Red),
        JobStatus::Running => ("▶", Color::Cyan),
        JobStatus::Starting => ("○", Color::Yellow),
    }
}

fn render_top_bar(f: &mut Frame, area: Rect) {
    let title = Block::default()
        .borders(Borders::ALL)
        .style(Style::default().fg(Color::Cyan));

    let title_text = Line::from(vec![
        Span::styled(
            " Omni Summary 配置工具 ",
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" - Terminal TUI"),
    ]);

    let paragraph = Paragraph::new(title_text)
        .block(title)
        .alignment(ratatui::layout::Alignment::Center);

    f.render_widget(paragraph, area);
}

fn render_left_menu(f: &mut Frame, area: Rect, app: &App) {
    let menu_items: Vec<ListItem> = MENU_ITEMS
        .iter()
        .enumerate()
        .map(|(i, text)| {
            let is_selected = i == app.menu_selected_index;
            let is_active = matches!(
                (i, &app.view_mode),
                (0, ViewMode::Form)
                    | (1, ViewMode::Examples)
                    | (2, ViewMode::Jobs)
                    | (3, ViewMode::JobDetail)
            );

            let style = if is_selected {
                if app.focus_area == FocusArea::Menu {
                    Style::default()
                        .fg(Color::Black)
                        .bg(Color::Magenta)
                        .add_modifier(Modifier::BOLD)
                } else {
                    Style::default()
                        .fg(Color::Magenta)
                        .add_modifier(Modifier::BOLD)
                }
            } else if is_active {
                Style::default().fg(Color::Yellow)
            } else {
                Style::default().fg(Color::White)
            };

            let prefix = if is_active { "● " } else { "○ " };
            ListItem::new(format!("{}{}", prefix, text)).style(style)
        })
        .collect();

    let title = if app.focus_area == FocusArea::Menu {
        "菜单 (Enter/c 确认)"
    } else {
        "菜单 (← 切换)"
    };

    let menu = List::new(menu_items).block(
        Block::default()
            .borders(Borders::ALL)
            .title(title)
            .style(focus_style(app.focus_area == FocusArea::Menu)),
    );

    f.render_widget(menu, area);
}

fn render_main_view(f: &mut Frame, area: Rect, app: &mut App) {
    let focused = app.focus_area == FocusArea::MainView;
    match app.view_mode {
        ViewMode::Form => {
            let form = &app.form;
            let mut lines = vec![
                heading("--- 当前配置 ---"),
                Line::from(""),
                field("environment", form.environment.to_string()),
                field("db_table", or_unset(&form.db_table)),
                field("backtest_user", or_unset(&form.backtest_user)),
                field("universe", or_unset(&form.universe.join(", "))),
                field("start_years", form.years.to_string()),
                field("version", form.version.to_string()),
                field("cluster", form.run_on_cluster.to_string()),
                field("template", form.template.clone()),
                Line::from(""),
                heading("--- 模型配置 ---"),
            ];
            if form.model_selections.is_empty() {
                lines.push(Line::from("  (无) 使用 `model add <impl> <LEV[=fee]>...` 添加"));
            }
            for (i, sel) in form.model_selections.iter().enumerate() {
                lines.push(Line::from(format!(
                    "  #{} {} [{}]",
                    i,
                    sel.implementation,
                    sel.leverages.join(", ")
                )));
            }
            lines.push(Line::from(""));
            lines.push(heading("--- Model keys ---"));
            lines.push(Line::from(format!("  {}", or_unset(&form.model_keys().join(", ")))));

            let title = if focused {
                "配置表单 (/ 输入命令, ← 切换菜单)"
            } else {
                "配置表单"
            };
            let paragraph = Paragraph::new(lines)
                .block(
                    Block::default()
                        .borders(Borders::ALL)
                        .title(title)
                        .style(focus_style(focused)),
                )
                .wrap(Wrap { trim: false });
            f.render_widget(paragraph, area);
        }
        ViewMode::Examples => {
            let mut lines = vec![
                heading("--- 模板示例 ---"),
                Line::from(format!("模板: {}", app.form.template)),
                Line::from(""),
            ];
            if app.examples.is_empty() {
                lines.push(Line::from("需要至少一个 universe 和一个模型配置"));
            }
            for ex in &app.examples {
                lines.push(Line::from(vec![
                    Span::raw("  • "),
                    Span::styled(ex.clone(), Style::default().fg(Color::Green)),
                ]));
            }
            let paragraph = Paragraph::new(lines).block(
                Block::default()
                    .borders(Borders::ALL)
                    .title("模板示例")
                    .style(focus_style(focused)),
            );
            f.render_widget(paragraph, area);
        }
        ViewMode::Jobs => {
            let items: Vec<ListItem> = app
                .jobs
                .iter()
                .map(|job| {
                    let (symbol, color) = status_style(job.status);
                    ListItem::new(Line::from(vec![
                        Span::styled(format!("{} ", symbol), Style::default().fg(color)),
                        Span::styled(
                            format!("{:<10}", job.status.as_str()),
                            Style::default().fg(color),
                        ),
                        Span::raw(format!("{}  ", job.job_id)),
                        Span::styled(
                            job.config_file.clone(),
                            Style::default().fg(Color::Gray),
                        ),
                    ]))
                })
                .collect();

            let stats = &app.job_stats;
            let title = format!(
                "任务列表 [总计 {} | 启动 {} | 运行 {} | 完成 {} | 失败 {}]{}",
                stats.total,
                stats.starting,
                stats.running,
                stats.completed,
                stats.failed,
                if focused { " (Enter/c 详情)" } else { "" }
            );

            let list = List::new(items)
                .block(
                    Block::default()
                        .borders(Borders::ALL)
                        .title(title)
                        .style(focus_style(focused)),
                )
                .highlight_style(
                    Style::default()
                        .fg(Color::Black)
                        .bg(Color::White)
                        .add_modifier(Modifier::BOLD),
                )
                .highlight_symbol(">> ");
            app.job_list_state.select(Some(app.selected_index));
            f.render_stateful_widget(list, area, &mut app.job_list_state);
        }
        ViewMode::JobDetail => {
            let content = if let Some(ref job) = app.selected_job {
                let (_, color) = status_style(job.status);
                let mut lines = vec![
                    field("job_id", job.job_id.clone()),
                    Line::from(vec![
                        Span::styled(
                            format!("{:<14}", "status"),
                            Style::default().add_modifier(Modifier::BOLD),
                        ),
                        Span::styled(job.status.as_str(), Style::default().fg(color)),
                    ]),
                    field("config_file", job.config_file.clone()),
                    field("start_time", format_millis(job.start_time)),
                    field(
                        "end_time",
                        job.end_time.map(format_millis).unwrap_or_else(|| "-".into()),
                    ),
                ];
                if let Some(err) = &job.error {
                    lines.push(Line::from(vec![
                        Span::styled("error         ", Style::default().add_modifier(Modifier::BOLD)),
                        Span::styled(err.clone(), Style::default().fg(Color::Red)),
                    ]));
                }

                lines.push(Line::from(""));
                lines.push(heading("--- 组合 ---"));
                for c in &job.combinations {
                    let color = match c.status {
                        CombinationStatus::Completed => Color::Green,
                        CombinationStatus::Failed => Color::Red,
                        CombinationStatus::Processing => Color::Cyan,
                        CombinationStatus::Pending => Color::Yellow,
                    };
                    lines.push(Line::from(vec![
                        Span::raw(format!("  • {:<28}: ", c.key)),
                        Span::styled(c.status.as_str(), Style::default().fg(color)),
                    ]));
                }

                lines.push(Line::from(""));
                lines.push(heading("--- 结果 ---"));
                match &job.results {
                    Some(v) => {
                        let pretty =
                            serde_json::to_string_pretty(v).unwrap_or_else(|_| v.to_string());
                        lines.extend(pretty.lines().map(|l| Line::from(l.to_string())));
                    }
                    None => lines.push(Line::from("  (暂无)")),
                }
                lines
            } else {
                vec![Line::from("在任务列表中选择一个任务，或输入 `job <id>`")]
            };

            let title = if focused {
                "任务详情 (↑↓ 滚动, x 返回列表)"
            } else {
                "任务详情"
            };
            let paragraph = Paragraph::new(content)
                .block(
                    Block::default()
                        .borders(Borders::ALL)
                        .title(title)
                        .style(focus_style(focused)),
                )
                .scroll((app.detail_scroll, 0));
            f.render_widget(paragraph, area);
        }
    }
}

fn or_unset(s: &str) -> String {
    if s.is_empty() {
        "(未设置)".to_string()
    } else {
        s.to_string()
    }
}

/// 右侧摘要：每个实现的杠杆与费率、frontier points、组合总数
fn render_sidebar(f: &mut Frame, area: Rect, app: &App) {
    let form = &app.form;
    let mut lines = vec![heading("模型 / 费率")];
    for sel in &form.model_selections {
        lines.push(Line::from(Span::styled(
            sel.implementation.clone(),
            Style::default().fg(Color::Cyan),
        )));
        for lev in &sel.leverages {
            let fee = sel.fees.get(lev).copied().unwrap_or_default();
            lines.push(Line::from(format!("  {:<6} {:>7.2}%", lev, fee * 100.0)));
        }
    }

    lines.push(Line::from(""));
    lines.push(heading("Frontier points"));
    for point in &form.frontier_points {
        lines.push(Line::from(vec![
            Span::styled(format!("{}: ", point.key), Style::default().fg(Color::Cyan)),
            Span::raw(point.points.join(", ")),
        ]));
    }

    lines.push(Line::from(""));
    lines.push(Line::from(vec![
        Span::styled("组合总数: ", Style::default().add_modifier(Modifier::BOLD)),
        Span::styled(
            form.total_combinations().to_string(),
            Style::default().fg(Color::Green),
        ),
    ]));

    let paragraph = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("摘要"))
        .wrap(Wrap { trim: true });
    f.render_widget(paragraph, area);
}

fn render_bottom_bar(f: &mut Frame, area: Rect, app: &App) {
    let bottom_chunks = Layout::default()
        .direction(ratatui::layout::Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)])
        .split(area);

    let command_prompt = if app.input_mode == InputMode::Command {
        let mut spans = vec![Span::styled(
            "命令: ",
            Style::default()
                .fg(Color::Green)
                .add_modifier(Modifier::BOLD),
        )];
        let cur = app.command_cursor.min(app.command_input.len());
        let (left, right) = app.command_input.split_at(cur);
        spans.push(Span::raw(left));
        spans.push(Span::styled("_", Style::default().fg(Color::Yellow)));
        spans.push(Span::raw(right));

        if let Some(hint) = app.get_completion_hint() {
            spans.push(Span::styled(hint, Style::default().fg(Color::DarkGray)));
        }

        vec![
            Line::from(spans),
            Line::from("Enter执行 Esc取消 Tab补全 ←→光标 Home/End ↑历史 ↓下一条"),
        ]
    } else {
        vec![
            Line::from(vec![
                Span::styled("命令: ", Style::default().fg(Color::Yellow)),
                Span::raw("(按 / 进入命令模式，help 查看命令)"),
            ]),
            Line::from("/命令 ←→切换 ↑↓导航 Enter/c确认 x返回 q退出"),
        ]
    };
    let command_paragraph = Paragraph::new(command_prompt).block(
        Block::default()
            .borders(Borders::ALL)
            .title(if app.input_mode == InputMode::Command {
                "命令输入模式"
            } else {
                "命令输入"
            })
            .style(if app.input_mode == InputMode::Command {
                Style::default().fg(Color::Green)
            } else {
                Style::default().fg(Color::White)
            }),
    );
    f.render_widget(command_paragraph, bottom_chunks[0]);

    // 日志区域：最新的在顶部，最多 20 条
    let log_items: Vec<ListItem> = app
        .log_messages
        .iter()
        .rev()
        .take(20)
        .map(|msg| {
            let style = if msg.starts_with('✓') {
                Style::default().fg(Color::Green)
            } else if msg.starts_with('✗') {
                Style::default().fg(Color::Red)
            } else if msg.starts_with('⚠') {
                Style::default().fg(Color::Yellow)
            } else {
                Style::default().fg(Color::White)
            };
            ListItem::new(msg.as_str()).style(style)
        })
        .collect();

    let log = List::new(log_items).block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!("日志 (共 {} 条)", app.log_messages.len()))
            .style(Style::default().fg(Color::White)),
    );
    f.render_widget(log, bottom_chunks[1]);
}
