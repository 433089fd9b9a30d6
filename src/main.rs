mod app_service;
mod app_state;
mod commands;
mod dispatch;
mod form;
mod settings;
mod storage;
mod summary;
mod ui;

use anyhow::Context;
use chrono::Local;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use log::info;
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

use crate::app_service::{follow_config, refresh_ui};
use crate::app_state::{App, AppEvent};
use crate::commands::{AppCommand, HELP};
use crate::dispatch::{DirectoryWatcher, DispatchService, SummaryRunner};
use crate::form::FormState;
use crate::settings::Settings;
use crate::storage::repository::JobRepository;
use crate::storage::ConfigStore;
use crate::summary::model::format_config;
use crate::ui::draw;

fn init_logging(prefix: &str) -> io::Result<PathBuf> {
    let ts = Local::now().format("%Y%m%d-%H%M%S").to_string();
    let log_dir = PathBuf::from("logs");
    std::fs::create_dir_all(&log_dir)?;
    let log_path = log_dir.join(format!("{}-{}.log", prefix, ts));
    let log_file = std::fs::File::create(&log_path)?;
    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(Box::new(log_file))) // 输出重定向到文件
        .filter_level(log::LevelFilter::Warn)
        .filter_module("omnisum", log::LevelFilter::Info)
        .filter_module("sqlx", log::LevelFilter::Error)
        .filter_module("sea_orm", log::LevelFilter::Error)
        .init();
    Ok(log_path)
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let mode = std::env::args().nth(1).unwrap_or_default();
    let prefix = if mode == "watch" { "watcher" } else { "app" };
    let log_path = init_logging(prefix).context("无法创建日志文件")?;

    // 加载环境变量
    let mut startup_info = Vec::new();
    match dotenv::dotenv() {
        Ok(path) => startup_info.push(format!("✓ 已加载 .env: {}", path.display())),
        Err(_) => startup_info.push("⚠ 未找到 .env 文件，使用系统环境变量".to_string()),
    }
    let settings = Settings::from_env().context("环境变量配置有误")?;
    startup_info.push(format!("日志文件: {}", log_path.display()));

    match mode.as_str() {
        "watch" => run_watcher(settings).await,
        "" | "tui" => run_tui(settings, startup_info).await,
        other => anyhow::bail!("未知模式: {} (可用: tui | watch)", other),
    }
}

/// 后台调度进程：watcher 任务 + 单消费者
async fn run_watcher(settings: Settings) -> anyhow::Result<()> {
    let db = storage::establish_connection(&settings.database_url)
        .await
        .with_context(|| format!("数据库连接失败: {}", settings.database_url))?;
    let db = Arc::new(db);

    let runner: Arc<dyn SummaryRunner> = Arc::new(settings.runner().context("runner 未配置")?);
    let service = DispatchService::new(db.clone(), runner, settings.runner_timeout);
    service.recover().await;

    let mut watcher = DirectoryWatcher::new(&settings.watch_dir);
    let existing = watcher
        .prime()
        .with_context(|| format!("无法读取目录 {}", settings.watch_dir.display()))?;
    info!(
        "watching {} ({} existing files ignored)",
        settings.watch_dir.display(),
        existing
    );
    println!(
        "omnisum watcher: 监听 {}，日志见 logs/ 目录，Ctrl-C 退出",
        settings.watch_dir.display()
    );

    let (queue_tx, queue_rx) = mpsc::unbounded_channel();
    let (stop_tx, stop_rx) = watch::channel(false);
    let watch_task = tokio::spawn(watcher.run(settings.poll_interval, queue_tx, stop_rx.clone()));
    let consume_task = tokio::spawn(service.run(queue_rx, stop_rx));

    tokio::signal::ctrl_c().await.context("无法监听 Ctrl-C")?;
    info!("shutdown requested");
    let _ = stop_tx.send(true);
    let _ = watch_task.await;
    let _ = consume_task.await;
    Ok(())
}

async fn run_tui(settings: Settings, mut startup_info: Vec<String>) -> anyhow::Result<()> {
    startup_info.push("正在初始化数据库...".to_string());
    let db = storage::establish_connection(&settings.database_url)
        .await
        .with_context(|| format!("数据库连接失败: {}", settings.database_url))?;
    let db = Arc::new(db);
    startup_info.push("✓ 数据库连接成功".to_string());
    let store = ConfigStore::new(settings.archive_dir.clone());
    startup_info.push(format!("配置归档目录: {}", store.archive_dir().display()));

    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<AppCommand>();
    let (evt_tx, evt_rx) = mpsc::unbounded_channel::<AppEvent>();

    // 单后台任务模型 (Actor)：持有表单状态，串行处理命令
    let db_bg = Arc::clone(&db);
    let evt_tx_bg = evt_tx.clone();
    tokio::spawn(async move {
        // 周期性刷新任务列表
        {
            let dbc = db_bg.clone();
            let txc = evt_tx_bg.clone();
            tokio::spawn(async move {
                loop {
                    refresh_ui(&dbc, &txc).await;
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            });
        }

        let mut form = FormState::default();
        let mut last_saved: Option<PathBuf> = None;

        while let Some(cmd) = cmd_rx.recv().await {
            if let Some(result) = commands::form::apply(&form, &cmd) {
                match result {
                    Ok((next, msg)) => {
                        form = next;
                        let _ = evt_tx_bg.send(AppEvent::Form(form.clone()));
                        let _ = evt_tx_bg.send(AppEvent::Examples(
                            form.examples().unwrap_or_default(),
                        ));
                        let _ = evt_tx_bg.send(AppEvent::Message(format!("✓ {}", msg)));
                    }
                    Err(e) => {
                        let _ = evt_tx_bg.send(AppEvent::Error(format!("✗ {}", e)));
                    }
                }
                continue;
            }

            match cmd {
                AppCommand::Show => {
                    for line in format_config(&form.snapshot()).lines() {
                        let _ = evt_tx_bg.send(AppEvent::Log(line.to_string()));
                    }
                }
                AppCommand::Examples => match form.examples() {
                    Ok(list) => {
                        for ex in &list {
                            let _ = evt_tx_bg.send(AppEvent::Log(format!("示例: {}", ex)));
                        }
                        let _ = evt_tx_bg.send(AppEvent::Examples(list));
                    }
                    Err(e) => {
                        let _ = evt_tx_bg.send(AppEvent::Error(format!("✗ 模板错误: {}", e)));
                    }
                },
                AppCommand::Run(policy) => {
                    if let Some(path) = commands::run::run(&form, &store, policy, &evt_tx_bg) {
                        last_saved = Some(path.clone());
                        tokio::spawn(follow_config(
                            db_bg.clone(),
                            path.display().to_string(),
                            evt_tx_bg.clone(),
                            Duration::from_secs(1),
                            3600,
                        ));
                    }
                }
                AppCommand::Job(Some(id)) => match JobRepository::get(&db_bg, &id).await {
                    Ok(Some(job)) => {
                        let _ = evt_tx_bg.send(AppEvent::Job(job));
                    }
                    Ok(None) => {
                        let _ = evt_tx_bg.send(AppEvent::Error(format!("✗ 未找到任务 {}", id)));
                    }
                    Err(e) => {
                        let _ = evt_tx_bg.send(AppEvent::Error(format!("✗ 查询失败: {}", e)));
                    }
                },
                AppCommand::Job(None) => {
                    let Some(path) = last_saved.as_ref() else {
                        let _ = evt_tx_bg
                            .send(AppEvent::Error("✗ 尚未提交配置，请使用 job <id>".to_string()));
                        continue;
                    };
                    match JobRepository::latest_for_config(&db_bg, &path.display().to_string())
                        .await
                    {
                        Ok(Some(job)) => {
                            let _ = evt_tx_bg.send(AppEvent::Log(app_service::describe(&job)));
                            let _ = evt_tx_bg.send(AppEvent::Job(job));
                        }
                        Ok(None) => {
                            let _ = evt_tx_bg.send(AppEvent::Message(
                                "⚠ 任务尚未创建，watcher 是否在运行？".to_string(),
                            ));
                        }
                        Err(e) => {
                            let _ = evt_tx_bg.send(AppEvent::Error(format!("✗ 查询失败: {}", e)));
                        }
                    }
                }
                AppCommand::Jobs => refresh_ui(&db_bg, &evt_tx_bg).await,
                AppCommand::Help => {
                    let _ = evt_tx_bg.send(AppEvent::Message(HELP.to_string()));
                }
                AppCommand::Quit => {
                    let _ = evt_tx_bg.send(AppEvent::Message("收到退出命令".to_string()));
                }
                AppCommand::Unknown(msg) => {
                    let _ = evt_tx_bg.send(AppEvent::Error(format!("✗ {}", msg)));
                }
                // 表单命令已在上面处理
                _ => {}
            }
        }
    });

    // TUI 初始化
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(startup_info, cmd_tx, evt_rx);
    let res = match app.evt_rx.take() {
        Some(rx) => run_app_loop(&mut terminal, &mut app, rx).await,
        None => Ok(()),
    };

    // 恢复终端
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    res.map_err(Into::into)
}

async fn run_app_loop<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    mut evt_rx: mpsc::UnboundedReceiver<AppEvent>,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| draw(f, app))?;

        while let Ok(event) = evt_rx.try_recv() {
            app.apply_event(event);
        }

        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press && app.handle_key_event(key.code) {
                    return Ok(());
                }
            }
        }
    }
}
