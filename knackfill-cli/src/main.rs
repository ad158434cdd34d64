use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use knackfill::runner::{default_sheets, run_parallel, run_sequential};
use knackfill::sheet::{self, CsvWorkbook, GoogleSheets, ServiceAccountKey, Spreadsheet};
use knackfill::{
    BrowserConfig, ChromeDriver, FormLayout, FormTiming, KnackForm, WebDriverLauncher,
    WorkerConfig, WorkerReport, WorkerTiming,
};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Submit worker-sheet rows into a Knack stock-in form"
)]
struct Cli {
    /// Google spreadsheet holding the worker sheets
    #[arg(long, env = "GSHEET_URL", global = true)]
    sheet_url: Option<String>,

    /// Service-account JSON key used for the Sheets API
    #[arg(long, env = "GSHEET_JSON", global = true)]
    credentials: Option<PathBuf>,

    /// Read and write `<sheet>.csv` files in this directory instead of Google Sheets
    #[arg(long, global = true)]
    csv_dir: Option<PathBuf>,

    /// Knack page with the login and the stock-in form
    #[arg(long, env = "FORM_URL", global = true)]
    form_url: Option<String>,

    /// WebDriver server the browsers are started through
    #[arg(long, env = "WEBDRIVER_URL", default_value = "http://localhost:9515", global = true)]
    webdriver_url: String,

    /// Start this chromedriver binary instead of using a running server
    #[arg(long, global = true)]
    chromedriver: Option<PathBuf>,

    /// Port for the spawned chromedriver
    #[arg(long, default_value_t = 9515, global = true)]
    chromedriver_port: u16,

    /// Show the browser windows
    #[arg(long, global = true)]
    headed: bool,

    /// Worker sheets to process, comma separated (default Worker-1..Worker-5)
    #[arg(long, env = "WORKERS", value_delimiter = ',', global = true)]
    workers: Vec<String>,

    /// Layout YAML replacing the bundled view_1726 locators
    #[arg(long, global = true)]
    layout: Option<PathBuf>,

    /// Seconds between passes over a sheet
    #[arg(long, global = true)]
    poll_secs: Option<u64>,

    /// Directory for log.txt
    #[arg(long, default_value = "logs_worker", global = true)]
    log_dir: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
enum Command {
    /// One browser per worker sheet, all in parallel (default)
    Run,
    /// One shared browser cycling through the worker sheets
    Sweep,
    /// List the rows that would be submitted, without a browser
    Pending {
        #[arg(long, default_value = "Worker-1")]
        sheet: String,
    },
    /// Print the effective layout and the mapped locations
    Layout,
}

#[derive(Debug, Clone, Copy)]
enum Mode {
    Parallel,
    Sequential,
}

/// Console plus `<log_dir>/log.txt`. The level comes from LOG_LEVEL, RUST_LOG refines it.
fn init_logging(log_dir: &Path) -> Result<()> {
    use tracing_appender::rolling;

    let log_level = std::env::var("LOG_LEVEL")
        .map(|level| match level.to_lowercase().as_str() {
            "error" => Level::ERROR,
            "warn" => Level::WARN,
            "info" => Level::INFO,
            "debug" => Level::DEBUG,
            _ => Level::INFO,
        })
        .unwrap_or(Level::INFO);

    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("creating log directory {}", log_dir.display()))?;
    let file_appender = rolling::never(log_dir, "log.txt");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_appender)
                .with_ansi(false)
                .with_target(true),
        )
        .try_init()
        .context("installing tracing subscriber")?;
    Ok(())
}

fn load_layout(path: Option<&Path>) -> Result<FormLayout> {
    match path {
        Some(path) => Ok(FormLayout::from_file(path)?),
        None => FormLayout::bundled().context("bundled layout is invalid"),
    }
}

fn open_spreadsheet(cli: &Cli) -> Result<Arc<dyn Spreadsheet>> {
    if let Some(dir) = &cli.csv_dir {
        info!("📁 Using CSV worker sheets in {}", dir.display());
        return Ok(Arc::new(CsvWorkbook::new(dir)));
    }
    let url = cli
        .sheet_url
        .as_deref()
        .context("--sheet-url (GSHEET_URL) is required unless --csv-dir is given")?;
    let credentials = cli
        .credentials
        .as_deref()
        .context("--credentials (GSHEET_JSON) is required unless --csv-dir is given")?;
    let key = ServiceAccountKey::from_file(credentials)
        .with_context(|| format!("reading service account key {}", credentials.display()))?;
    let sheets = GoogleSheets::open_by_url(url, key)?;
    info!("📊 Using Google spreadsheet {}", sheets.spreadsheet_id());
    Ok(Arc::new(sheets))
}

fn selected_sheets(cli: &Cli) -> Vec<String> {
    let chosen: Vec<String> = cli
        .workers
        .iter()
        .map(|w| w.trim().to_string())
        .filter(|w| !w.is_empty())
        .collect();
    if chosen.is_empty() {
        default_sheets()
    } else {
        chosen
    }
}

/// Cancel on Ctrl-C, or when `q` is entered on stdin. A second Ctrl-C exits at once.
fn spawn_stop_listeners(cancel: CancellationToken) {
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("🛑 Ctrl-C received, stopping workers (press again to exit now)");
            on_signal.cancel();
        }
        if tokio::signal::ctrl_c().await.is_ok() {
            error!("🛑 Second Ctrl-C, exiting without waiting for workers");
            std::process::exit(130);
        }
    });

    // Plain thread, so an idle stdin never holds up runtime shutdown
    let spawned = std::thread::Builder::new()
        .name("stdin-quit".to_string())
        .spawn(move || watch_for_quit(std::io::stdin().lock(), &cancel));
    if let Err(e) = spawned {
        warn!("Could not listen for 'q' on stdin: {}", e);
    }
}

/// Cancel once a line reading `q` arrives. Returns at end of input.
fn watch_for_quit(input: impl BufRead, cancel: &CancellationToken) {
    for line in input.lines() {
        let Ok(line) = line else { break };
        if line.trim().eq_ignore_ascii_case("q") {
            warn!("🛑 'q' received, stopping workers");
            cancel.cancel();
            break;
        }
    }
}

fn print_reports(reports: &[WorkerReport]) {
    println!();
    println!("{:<12} {:>9} {:>7}  stopped", "sheet", "submitted", "failed");
    for report in reports {
        println!(
            "{:<12} {:>9} {:>7}  {}",
            report.sheet, report.submitted, report.failed, report.stopped
        );
    }
}

async fn drive(cli: &Cli, mode: Mode) -> Result<()> {
    let Some(form_url) = cli.form_url.clone() else {
        bail!("--form-url (FORM_URL) is required to run workers");
    };
    let layout = load_layout(cli.layout.as_deref())?;
    let spreadsheet = open_spreadsheet(cli)?;

    let mut timing = WorkerTiming::default();
    if let Some(secs) = cli.poll_secs {
        timing.poll_interval = Duration::from_secs(secs);
    }

    let driver = match &cli.chromedriver {
        Some(binary) => Some(
            ChromeDriver::spawn(binary, cli.chromedriver_port)
                .await
                .with_context(|| format!("starting {}", binary.display()))?,
        ),
        None => None,
    };
    let webdriver_url = driver
        .as_ref()
        .map(|d| d.url().to_string())
        .unwrap_or_else(|| cli.webdriver_url.clone());

    let launcher = Arc::new(WebDriverLauncher::new(BrowserConfig {
        webdriver_url,
        headless: !cli.headed,
        ..BrowserConfig::default()
    }));
    let config = WorkerConfig {
        form_url,
        form: KnackForm::new(Arc::new(layout), FormTiming::default()),
        timing,
        profile_root: None,
    };
    let sheets = selected_sheets(cli);

    let cancel = CancellationToken::new();
    spawn_stop_listeners(cancel.clone());
    info!("⌨️ Type 'q' + Enter or press Ctrl-C to stop");

    let result = match mode {
        Mode::Parallel => run_parallel(&config, spreadsheet, launcher, &sheets, &cancel).await,
        Mode::Sequential => run_sequential(&config, spreadsheet, launcher, &sheets, &cancel).await,
    };

    if let Some(driver) = driver {
        driver.shutdown().await;
    }

    let reports = result?;
    print_reports(&reports);
    Ok(())
}

async fn list_pending(cli: &Cli, sheet_name: &str) -> Result<()> {
    let spreadsheet = open_spreadsheet(cli)?;
    let ws = spreadsheet.worksheet_or_create(sheet_name).await?;
    let account = sheet::knack_account(ws.as_ref()).await?;
    let rows = sheet::records(ws.as_ref()).await?;
    let pending: Vec<_> = rows.iter().filter(|r| r.is_pending()).collect();

    println!(
        "{}: account {}, {} of {} rows pending",
        sheet_name,
        if account.is_complete() {
            account.email.as_str()
        } else {
            "<missing>"
        },
        pending.len(),
        rows.len()
    );
    for row in pending {
        let last = if row.logs.is_empty() { "-" } else { row.logs.as_str() };
        println!(
            "  row {:>4}  {:<18} {:<8} {:<24} {}",
            row.row_index, row.imei, row.status, row.location, last
        );
    }
    Ok(())
}

fn print_layout(path: Option<&Path>) -> Result<()> {
    let layout = load_layout(path)?;
    print!("{}", serde_yaml::to_string(&layout)?);
    println!("# {} mapped locations", layout.locations.len());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Values in config/.env only fill variables that are not already set
    if let Err(e) = dotenvy::from_path("config/.env") {
        if !e.not_found() {
            eprintln!("Ignoring config/.env: {e}");
        }
    }
    let cli = Cli::parse();
    init_logging(&cli.log_dir)?;

    let outcome = match cli.command.clone().unwrap_or(Command::Run) {
        Command::Run => drive(&cli, Mode::Parallel).await,
        Command::Sweep => drive(&cli, Mode::Sequential).await,
        Command::Pending { sheet } => list_pending(&cli, &sheet).await,
        Command::Layout => print_layout(cli.layout.as_deref()),
    };
    if let Err(e) = &outcome {
        error!("❌ {:#}", e);
    }
    outcome
}
