// clash-settings 命令行入口

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::sync::Arc;

use clash_settings::atoms::{ApiConfig, ClashApiClient, LogLevel};
use clash_settings::coordinator::{BackendOverride, SettingsCoordinator, resolve_backend};
use clash_settings::logger;
use clash_settings::molecules::settings_form::LATENCY_TEST_URL_FIELD;
use clash_settings::molecules::{Commit, DelayResult, FieldChange, PreferenceStore, SettingsForm};
use clash_settings::services::path_service;

#[derive(Parser, Debug)]
#[command(name = "clash-settings", version)]
#[command(about = "Edit the running configuration of a Clash core", long_about = None)]
struct Cli {
    /// External controller address, e.g. http://127.0.0.1:9090
    #[arg(long, global = true, env = "CLASH_API_URL")]
    api: Option<String>,

    /// External controller secret
    #[arg(long, global = true, env = "CLASH_API_SECRET", hide_env_values = true)]
    secret: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the rendered settings form
    Show,
    /// Change an immediate control (mode, log-level, allow-lan, sniffing, tun-enable, tun-stack)
    Set { field: String, value: String },
    /// Commit a text field (ports, "device name", "interface name", latencyTestUrl)
    Edit { field: String, value: String },
    /// Reload the config file
    Reload,
    /// Update GEO databases
    UpdateGeo,
    /// Flush the fake-ip pool
    FlushFakeip,
    /// Manage saved backends
    Backend {
        #[command(subcommand)]
        command: BackendCommand,
    },
    /// Change the UI language (zh, en)
    Lang { code: String },
    /// Select the traffic chart style
    ChartStyle { index: usize },
    /// Test proxy latency with the configured latency test URL
    Delay {
        #[arg(required = true)]
        proxies: Vec<String>,
        #[arg(long, default_value_t = 5000)]
        timeout: u32,
        #[arg(long, default_value_t = 8)]
        concurrency: usize,
    },
    /// Follow the core log stream
    Logs {
        #[arg(long)]
        level: Option<LogLevel>,
    },
}

#[derive(Subcommand, Debug)]
enum BackendCommand {
    /// List saved backends
    List,
    /// Save a backend
    Add {
        url: String,
        #[arg(long = "with-secret")]
        secret: Option<String>,
    },
    /// Select a saved backend
    Use { index: usize },
    /// Clear the selected backend
    Switch,
}

#[tokio::main]
async fn main() -> Result<()> {
    logger::init_logger();

    let cli = Cli::parse();
    let preferences_path = path_service::preferences_file();
    let preferences = Arc::new(
        PreferenceStore::load(&preferences_path)
            .with_context(|| format!("读取偏好设置失败：{}", preferences_path.display()))?,
    );
    let explicit = BackendOverride {
        base_url: cli.api,
        secret: cli.secret,
    };

    match cli.command {
        Command::Backend { command } => run_backend(command, preferences, &explicit).await,
        Command::Lang { code } => {
            if !offline_form(preferences, &explicit)?.change_language(&code) {
                bail!("未知的语言代码：{}", code);
            }
            Ok(())
        }
        Command::ChartStyle { index } => {
            if !offline_form(preferences, &explicit)?.select_chart_style(index) {
                bail!("图表样式索引越界：{}", index);
            }
            Ok(())
        }
        // 延迟测试地址属于偏好设置，无需连接核心
        Command::Edit { field, value } if field == LATENCY_TEST_URL_FIELD => {
            let mut form = offline_form(preferences, &explicit)?;
            if form.on_blur(&field, &value).await? == Commit::Rejected {
                log::debug!("延迟测试地址未通过校验，已忽略");
            }
            Ok(())
        }
        command => run_online(command, preferences, &explicit).await,
    }
}

// 只修改偏好设置的命令不需要连接核心
fn offline_form(
    preferences: Arc<PreferenceStore>,
    explicit: &BackendOverride,
) -> Result<SettingsForm> {
    let client = ClashApiClient::new(resolve_backend(&preferences, explicit))?;
    Ok(SettingsForm::new(Arc::new(client), preferences))
}

async fn run_backend(
    command: BackendCommand,
    preferences: Arc<PreferenceStore>,
    explicit: &BackendOverride,
) -> Result<()> {
    match command {
        BackendCommand::List => {
            let selected = preferences.snapshot().selected_backend;
            for (index, backend) in preferences.backends().iter().enumerate() {
                let marker = if selected == Some(index) { "*" } else { " " };
                println!("{} {} {}", marker, index, backend.base_url);
            }
        }
        BackendCommand::Add { url, secret } => {
            let backend = ApiConfig::new(url, secret);
            backend.url("/")?;
            let index = preferences.add_backend(backend);
            println!("{}", index);
        }
        BackendCommand::Use { index } => {
            let backend = preferences.select_backend(index)?;
            println!("{}", backend.base_url);
        }
        BackendCommand::Switch => {
            offline_form(preferences, explicit)?
                .switch_backend()
                .await
                .context("切换后端失败")?;
        }
    }
    Ok(())
}

async fn run_online(
    command: Command,
    preferences: Arc<PreferenceStore>,
    explicit: &BackendOverride,
) -> Result<()> {
    let mut session = SettingsCoordinator::connect(preferences, explicit)
        .await
        .context("连接 Clash 外部控制器失败")?;

    match command {
        Command::Show => print!("{}", session.form().view()),
        Command::Set { field, value } => {
            let change = FieldChange::parse(&field, &value)?;
            let patch = session.form_mut().on_change(change).await?;
            println!("{}", patch);
        }
        Command::Edit { field, value } => {
            match session.form_mut().on_blur(&field, &value).await {
                Ok(Commit::Dispatched(patch)) => println!("{}", patch),
                Ok(Commit::Preference) | Ok(Commit::Unchanged) => {}
                Ok(Commit::Rejected) => log::debug!("输入未通过校验，已忽略"),
                // 未知字段名同样以非零状态退出
                Err(e) => return Err(e.into()),
            }
        }
        Command::Reload => {
            session.form().reload_config().await?;
            session.refresh().await?;
        }
        Command::UpdateGeo => session.form().update_geo_databases().await?,
        Command::FlushFakeip => session.form().flush_fakeip_pool().await?,
        Command::Delay {
            proxies,
            timeout,
            concurrency,
        } => {
            let tester = session
                .delay_tester()
                .with_timeout(timeout)
                .with_concurrency(concurrency);
            tester
                .test_batch(proxies, Arc::new(print_delay))
                .await;
        }
        Command::Logs { level } => {
            let stream = session.attach_log_stream(|entry| {
                println!("[{}] {}", entry.log_type, entry.payload);
            })?;
            if let Some(level) = level {
                stream.start(level)?;
            }
            tokio::signal::ctrl_c().await?;
            stream.stop();
        }
        Command::Backend { .. } | Command::Lang { .. } | Command::ChartStyle { .. } => {
            bail!("偏好设置命令无需连接核心")
        }
    }

    Ok(())
}

fn print_delay(result: &DelayResult) {
    match result.delay_ms {
        Some(delay) => println!("{}\t{}ms", result.proxy_name, delay),
        None => println!("{}\ttimeout", result.proxy_name),
    }
}
