//! Knack form automation fed from worker spreadsheets
//!
//! Each worker sheet holds a Knack login and a list of devices (IMEI, status,
//! location). A worker drives its own Chrome session over WebDriver, submits the
//! stock-in form once per pending row and writes the outcome back into the sheet.
//! The browser API follows Playwright's model: a [`Browser`] hands out
//! [`Locator`]s that wait for [`WebElement`]s.

pub mod browser;
pub mod element;
pub mod errors;
pub mod form;
pub mod locator;
pub mod retry;
pub mod runner;
pub mod selector;
pub mod sheet;
#[cfg(test)]
mod tests;
pub mod types;
pub mod webdriver;
pub mod worker;

pub use browser::{Browser, BrowserConfig, BrowserLauncher, WebDriverLauncher};
pub use element::WebElement;
pub use errors::{AutomationError, SheetError};
pub use form::{FormLayout, FormTiming, KnackForm};
pub use locator::Locator;
pub use runner::{run_parallel, run_sequential};
pub use selector::Selector;
pub use sheet::{CsvWorkbook, GoogleSheets, ServiceAccountKey, Spreadsheet, Worksheet};
pub use types::{Account, Row, RowOutcome, Status};
pub use webdriver::{BrowserEngine, ChromeDriver, WebDriverEngine};
pub use worker::{StopReason, Worker, WorkerConfig, WorkerError, WorkerReport, WorkerTiming};
