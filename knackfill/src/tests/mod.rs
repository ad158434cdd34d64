mod sheet_tests;

use crate::browser::{Browser, BrowserLauncher};
use crate::errors::SheetError;
use crate::sheet::{Spreadsheet, Worksheet};
use crate::webdriver::{BrowserEngine, ElementRef, Key};
use crate::{AutomationError, Selector};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// Initialize tracing for tests
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A page where every selector matches one visible element unless told otherwise.
///
/// Element references are the selector's prefixed form; scoped lookups join the
/// root and the selector with `>`. Actions are recorded in order.
#[derive(Default)]
pub struct FakeEngine {
    calls: Mutex<Vec<String>>,
    missing: Mutex<HashSet<String>>,
    hidden_polls: Mutex<HashMap<String, usize>>,
    stale_clicks: Mutex<HashMap<String, usize>>,
    quit: AtomicBool,
}

impl FakeEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Nothing matches `selector`
    pub fn missing(&self, selector: &Selector) {
        self.missing.lock().unwrap().insert(selector.to_string());
    }

    /// `selector` reports hidden for the first `polls` visibility checks
    pub fn hidden_for(&self, selector: &Selector, polls: usize) {
        self.hidden_polls
            .lock()
            .unwrap()
            .insert(selector.to_string(), polls);
    }

    /// The first `times` clicks on `selector` fail with a stale element
    pub fn stale_clicks(&self, selector: &Selector, times: usize) {
        self.stale_clicks
            .lock()
            .unwrap()
            .insert(selector.to_string(), times);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    pub fn was_quit(&self) -> bool {
        self.quit.load(Ordering::SeqCst)
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait::async_trait]
impl BrowserEngine for FakeEngine {
    async fn navigate(&self, url: &str) -> Result<(), AutomationError> {
        self.record(format!("navigate {url}"));
        Ok(())
    }

    async fn find_elements(
        &self,
        selector: &Selector,
        root: Option<&ElementRef>,
    ) -> Result<Vec<ElementRef>, AutomationError> {
        let key = selector.to_string();
        if self.missing.lock().unwrap().contains(&key) {
            return Ok(Vec::new());
        }
        let id = match root {
            Some(root) => format!("{}>{}", root.0, key),
            None => key,
        };
        Ok(vec![ElementRef(id)])
    }

    async fn is_displayed(&self, element: &ElementRef) -> Result<bool, AutomationError> {
        let mut hidden = self.hidden_polls.lock().unwrap();
        match hidden.get_mut(&element.0) {
            Some(left) if *left > 0 => {
                *left -= 1;
                Ok(false)
            }
            _ => Ok(true),
        }
    }

    async fn click(&self, element: &ElementRef) -> Result<(), AutomationError> {
        {
            let mut stale = self.stale_clicks.lock().unwrap();
            if let Some(left) = stale.get_mut(&element.0) {
                if *left > 0 {
                    *left -= 1;
                    return Err(AutomationError::StaleElement(element.0.clone()));
                }
            }
        }
        self.record(format!("click {}", element.0));
        Ok(())
    }

    async fn clear(&self, element: &ElementRef) -> Result<(), AutomationError> {
        self.record(format!("clear {}", element.0));
        Ok(())
    }

    async fn send_keys(&self, element: &ElementRef, text: &str) -> Result<(), AutomationError> {
        self.record(format!("type {} {}", element.0, text));
        Ok(())
    }

    async fn active_element(&self) -> Result<Option<ElementRef>, AutomationError> {
        Ok(Some(ElementRef("active".to_string())))
    }

    async fn execute_script(
        &self,
        script: &str,
        _args: &[ElementRef],
    ) -> Result<Value, AutomationError> {
        self.record(format!("script {script}"));
        Ok(Value::Null)
    }

    async fn press_key(&self, key: Key) -> Result<(), AutomationError> {
        self.record(format!("key {key:?}"));
        Ok(())
    }

    async fn set_window_size(&self, _width: u32, _height: u32) -> Result<(), AutomationError> {
        Ok(())
    }

    async fn quit(&self) -> Result<(), AutomationError> {
        self.quit.store(true, Ordering::SeqCst);
        self.record("quit".to_string());
        Ok(())
    }
}

/// Hands out browsers backed by one shared [`FakeEngine`]
pub struct FakeLauncher {
    pub engine: Arc<FakeEngine>,
    fail: bool,
    launches: AtomicUsize,
    profiles: Mutex<Vec<PathBuf>>,
}

impl FakeLauncher {
    pub fn new(engine: Arc<FakeEngine>) -> Arc<Self> {
        Arc::new(Self {
            engine,
            fail: false,
            launches: AtomicUsize::new(0),
            profiles: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            engine: FakeEngine::new(),
            fail: true,
            launches: AtomicUsize::new(0),
            profiles: Mutex::new(Vec::new()),
        })
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn profiles(&self) -> Vec<PathBuf> {
        self.profiles.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self, profile_dir: &Path) -> Result<Browser, AutomationError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        self.profiles.lock().unwrap().push(profile_dir.to_path_buf());
        assert!(profile_dir.is_dir(), "profile dir must exist at launch");
        if self.fail {
            return Err(AutomationError::SessionNotCreated(
                "chrome not reachable".to_string(),
            ));
        }
        Ok(Browser::from_engine(self.engine.clone()))
    }
}

pub fn grid(rows: &[&[&str]]) -> Vec<Vec<String>> {
    rows.iter()
        .map(|r| r.iter().map(|c| c.to_string()).collect())
        .collect()
}

/// A worksheet held in memory
pub struct MemorySheet {
    title: String,
    grid: Mutex<Vec<Vec<String>>>,
    writes: AtomicUsize,
    /// Row whose writes fail, and how many more times
    failing_row: Mutex<Option<(usize, usize)>>,
}

impl MemorySheet {
    pub fn new(title: &str, rows: Vec<Vec<String>>) -> Arc<Self> {
        Arc::new(Self {
            title: title.to_string(),
            grid: Mutex::new(rows),
            writes: AtomicUsize::new(0),
            failing_row: Mutex::new(None),
        })
    }

    /// Make the next `times` writes into `row` fail with a 503
    pub fn fail_writes_to(&self, row: usize, times: usize) {
        *self.failing_row.lock().unwrap() = Some((row, times));
    }

    pub fn value(&self, row: usize, col: usize) -> String {
        self.grid
            .lock()
            .unwrap()
            .get(row - 1)
            .and_then(|r| r.get(col - 1))
            .cloned()
            .unwrap_or_default()
    }

    /// Number of update calls received
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Worksheet for MemorySheet {
    fn title(&self) -> &str {
        &self.title
    }

    async fn all_values(&self) -> Result<Vec<Vec<String>>, SheetError> {
        Ok(self.grid.lock().unwrap().clone())
    }

    async fn update_cell(&self, row: usize, col: usize, value: &str) -> Result<(), SheetError> {
        self.update_range(row, col, &[value.to_string()]).await
    }

    async fn update_range(
        &self,
        row: usize,
        first_col: usize,
        values: &[String],
    ) -> Result<(), SheetError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if let Some((failing, left)) = self.failing_row.lock().unwrap().as_mut() {
            if *failing == row && *left > 0 {
                *left -= 1;
                return Err(SheetError::Api {
                    status: 503,
                    body: "The service is currently unavailable.".to_string(),
                });
            }
        }
        let mut grid = self.grid.lock().unwrap();
        if grid.len() < row {
            grid.resize_with(row, Vec::new);
        }
        let cells = &mut grid[row - 1];
        if cells.len() < first_col - 1 + values.len() {
            cells.resize(first_col - 1 + values.len(), String::new());
        }
        for (i, value) in values.iter().enumerate() {
            cells[first_col - 1 + i] = value.clone();
        }
        Ok(())
    }
}

/// A spreadsheet of [`MemorySheet`]s
#[derive(Default)]
pub struct MemoryBook {
    sheets: Mutex<HashMap<String, Arc<MemorySheet>>>,
}

impl MemoryBook {
    pub fn with(sheets: Vec<Arc<MemorySheet>>) -> Arc<Self> {
        Arc::new(Self {
            sheets: Mutex::new(
                sheets
                    .into_iter()
                    .map(|s| (s.title.clone(), s))
                    .collect(),
            ),
        })
    }

    pub fn sheet(&self, title: &str) -> Option<Arc<MemorySheet>> {
        self.sheets.lock().unwrap().get(title).cloned()
    }
}

#[async_trait::async_trait]
impl Spreadsheet for MemoryBook {
    async fn worksheet_or_create(&self, title: &str) -> Result<Arc<dyn Worksheet>, SheetError> {
        let sheet = self
            .sheets
            .lock()
            .unwrap()
            .entry(title.to_string())
            .or_insert_with(|| MemorySheet::new(title, Vec::new()))
            .clone();
        Ok(sheet as Arc<dyn Worksheet>)
    }
}

/// Header row with the Knack login in I1 and K1
pub fn header_with_account(email: &str, password: &str) -> Vec<String> {
    let mut header: Vec<String> = ["IMEI", "Status", "Location", "Logs", "TimeStamp"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    header.resize(11, String::new());
    header[8] = email.to_string();
    header[10] = password.to_string();
    header
}
