//! 居家办公考勤客户端命令行入口

use anyhow::Context;
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tokio::signal;

use wfh_client::{
    auth::SessionEvent,
    config::ClientConfig,
    models::attendance::AttendanceRecord,
    services::{avatar_url, PhotoFile, ProfileDraft, SummaryPage, SummaryQuery, TodayStatus},
    telemetry, ClientError, WfhClient,
};

/// wfh-client - 居家办公考勤客户端
#[derive(Parser, Debug)]
#[command(name = "wfh-client")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Log in and store the access token
    Login {
        #[arg(short, long)]
        email: String,

        /// Read from stdin when omitted
        #[arg(short, long)]
        password: Option<String>,
    },

    /// Forget the stored access token
    Logout,

    /// Show today's attendance status
    Status,

    /// Check in for today
    CheckIn,

    /// Check out for today
    CheckOut,

    /// Perform whichever of check-in/check-out is currently allowed
    Toggle,

    /// Poll today's status until interrupted
    Watch {
        /// Poll interval in seconds (defaults to configuration)
        #[arg(short, long)]
        interval: Option<u64>,
    },

    /// List attendance records in a date range
    Summary {
        /// First day, YYYY-MM-DD (defaults to the first of this month)
        #[arg(long)]
        start: Option<NaiveDate>,

        /// Last day, YYYY-MM-DD (defaults to today)
        #[arg(long)]
        end: Option<NaiveDate>,

        #[arg(long, default_value = "1")]
        page: u32,

        #[arg(long)]
        limit: Option<u32>,
    },

    /// Profile management
    #[command(subcommand)]
    Profile(ProfileCommands),
}

#[derive(Subcommand, Debug)]
enum ProfileCommands {
    /// Show the current profile
    Show,

    /// Update phone, password and/or photo
    Update {
        #[arg(long)]
        phone: Option<String>,

        #[arg(long)]
        password: Option<String>,

        /// Image file to upload as the new photo
        #[arg(long)]
        photo: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 加载 .env 文件（开发环境）
    if let Ok(env) = std::env::var("WFH_ENV") {
        dotenv::from_filename(format!(".env.{}", env)).ok();
    } else {
        dotenv::from_filename(".env.local").ok();
        dotenv::dotenv().ok();
    }

    // 1. 加载配置
    let config = ClientConfig::from_env().context("Failed to load configuration")?;

    // 2. 初始化日志
    telemetry::init_telemetry(&config);

    // 3. 装配客户端并恢复会话
    let client = WfhClient::from_config(config)?;
    let mut events = client.session.subscribe();

    let outcome = match client.restore().await {
        Ok(_) => run(&client, cli.command).await,
        Err(e) => Err(e),
    };

    if let Err(e) = outcome {
        eprintln!("Error: {}", e.user_message());
        if matches!(events.try_recv(), Ok(SessionEvent::Expired)) || e.is_auth() {
            eprintln!("Your session has ended. Run `wfh-client login --email <EMAIL>` to sign in again.");
        }
        tracing::debug!(error = %e, "Command failed");
        std::process::exit(1);
    }

    Ok(())
}

async fn run(client: &WfhClient, command: Commands) -> wfh_client::Result<()> {
    match command {
        Commands::Login { email, password } => {
            let password = match password {
                Some(p) => p,
                None => prompt("Password: ")?,
            };
            client.auth.login(&email, &password).await?;
            println!("Logged in as {}", email.trim());
        }
        Commands::Logout => {
            client.auth.logout().await?;
            println!("Logged out");
        }
        Commands::Status => {
            require_login(client).await?;
            let status = client.attendance.fetch_today().await?;
            print_status(&status);
        }
        Commands::CheckIn => {
            require_login(client).await?;
            let record = client.attendance.check_in().await?;
            println!("Checked in at {}", format_time(&record.check_in));
        }
        Commands::CheckOut => {
            require_login(client).await?;
            let record = client.attendance.check_out().await?;
            println!("Checked out at {}", format_time(&record.check_out));
        }
        Commands::Toggle => {
            require_login(client).await?;
            let (action, record) = client.attendance.toggle().await?;
            println!("Done: {}", action);
            print_record(&record);
        }
        Commands::Watch { interval } => {
            require_login(client).await?;
            watch(client, interval).await?;
        }
        Commands::Summary {
            start,
            end,
            page,
            limit,
        } => {
            require_login(client).await?;
            let today = Local::now().date_naive();
            let default = SummaryQuery::current_month(
                limit.unwrap_or(client.config.summary.page_size),
                today,
            );
            let query = SummaryQuery::new(
                page,
                default.page_size,
                start.unwrap_or(default.start_date),
                end.unwrap_or(default.end_date),
            );
            let result = client.summary.fetch(&query).await?;
            print_summary(&query, &result);
        }
        Commands::Profile(ProfileCommands::Show) => {
            require_login(client).await?;
            let profile = client.profile.load_profile().await?;
            println!("Name:     {}", profile.name);
            println!("Email:    {}", profile.email);
            println!("Position: {}", profile.position);
            println!("Phone:    {}", profile.phone.as_deref().unwrap_or("-"));
            println!("Photo:    {}", avatar_url(&profile));
        }
        Commands::Profile(ProfileCommands::Update {
            phone,
            password,
            photo,
        }) => {
            require_login(client).await?;
            let profile = client.profile.load_profile().await?;
            let mut draft = ProfileDraft::begin(&profile);
            if let Some(phone) = phone {
                draft.set_phone(phone);
            }
            if let Some(password) = password {
                draft.set_password(password);
            }
            if let Some(path) = photo {
                draft.select_photo(PhotoFile::from_path(&path).await?);
            }

            if !draft.has_changes() {
                println!("Nothing to update");
                return Ok(());
            }
            let updated = client.profile.save_profile(&mut draft).await?;
            println!("Profile updated");
            println!("Phone: {}", updated.phone.as_deref().unwrap_or("-"));
            println!("Photo: {}", avatar_url(&updated));
        }
    }
    Ok(())
}

async fn require_login(client: &WfhClient) -> wfh_client::Result<()> {
    if client.session.is_authenticated().await {
        Ok(())
    } else {
        Err(ClientError::Auth)
    }
}

async fn watch(client: &WfhClient, interval: Option<u64>) -> wfh_client::Result<()> {
    let interval = interval
        .map(std::time::Duration::from_secs)
        .unwrap_or_else(|| client.config.poll_interval());

    let mut updates = client.attendance.subscribe();
    let mut session_events = client.session.subscribe();
    let poller = client.attendance.spawn_poller(interval);

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                tracing::info!("Stopping watch");
                break;
            }
            event = session_events.recv() => {
                if matches!(event, Ok(SessionEvent::Expired | SessionEvent::LoggedOut)) {
                    poller.shutdown().await;
                    return Err(ClientError::Auth);
                }
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                if let Some(status) = updates.borrow_and_update().clone() {
                    println!("[{}]", Local::now().format("%H:%M:%S"));
                    print_status(&status);
                }
            }
        }
    }

    poller.shutdown().await;
    Ok(())
}

fn prompt(label: &str) -> wfh_client::Result<String> {
    print!("{}", label);
    io::stdout()
        .flush()
        .map_err(|e| ClientError::Validation(e.to_string()))?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .map_err(|e| ClientError::Validation(e.to_string()))?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn format_time(value: &Option<chrono::DateTime<chrono::Utc>>) -> String {
    value
        .map(|t| t.with_timezone(&Local).format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn print_record(record: &AttendanceRecord) {
    println!(
        "{}  in: {}  out: {}",
        record.date,
        format_time(&record.check_in),
        format_time(&record.check_out)
    );
}

fn print_status(status: &TodayStatus) {
    match &status.record {
        Some(record) => print_record(record),
        None => println!("No attendance recorded today"),
    }
    println!("State: {}", status.state());
    match status.next_action() {
        Some(action) => println!("Next:  {}", action),
        None => println!("Next:  nothing left to do today"),
    }
}

fn print_summary(query: &SummaryQuery, page: &SummaryPage) {
    println!(
        "{} .. {}  (page {}/{}, {} records)",
        query.start_date,
        query.end_date,
        page.page,
        page.total_pages.max(1),
        page.total
    );
    if page.items.is_empty() {
        println!("No attendance records");
        return;
    }
    for record in &page.items {
        print_record(record);
    }
}
