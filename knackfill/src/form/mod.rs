//! The Knack stock-in form workflow
//!
//! Every locator the workflow touches comes from a [`FormLayout`]; the code only
//! knows the order of the steps. The layout for the production view ships as
//! `layouts/view_1726.yaml` and can be replaced with a file of the same shape.

use crate::{AutomationError, Selector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

mod actions;
mod login;
mod submit;

pub use actions::{click_suggestion, force_input, select_chosen_option, select_dropdown_by_value};

const BUNDLED_LAYOUT: &str = include_str!("../../layouts/view_1726.yaml");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginLayout {
    pub email: Selector,
    pub password: Selector,
    pub submit_candidates: Vec<Selector>,
    /// Appears once the Knack app has rendered a view after login
    pub view_ready: Selector,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormLayout {
    pub login: LoginLayout,
    pub location_dropdown: Selector,
    /// Location name as written in the sheet → option inside the chosen dropdown
    pub locations: BTreeMap<String, Selector>,
    pub status_select: Selector,
    pub imei_trigger: Selector,
    pub imei_suggestion: Selector,
    pub submit_button: Selector,
    /// CSS selector for a chosen result still open after the IMEI pick
    pub open_result: String,
}

impl FormLayout {
    /// The layout for the production stock-in view
    pub fn bundled() -> Result<Self, serde_yaml::Error> {
        Self::from_yaml_str(BUNDLED_LAYOUT)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    pub fn from_file(path: &Path) -> Result<Self, AutomationError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AutomationError::InvalidArgument(format!(
                "Cannot read layout {}: {e}",
                path.display()
            ))
        })?;
        Self::from_yaml_str(&raw).map_err(|e| {
            AutomationError::InvalidArgument(format!("Invalid layout {}: {e}", path.display()))
        })
    }

    pub fn location_selector(&self, name: &str) -> Result<&Selector, AutomationError> {
        self.locations
            .get(name.trim())
            .ok_or_else(|| AutomationError::UnknownLocation(name.to_string()))
    }
}

/// Pauses between form interactions. The defaults match what the live form needs
/// to settle; tests zero them.
#[derive(Debug, Clone)]
pub struct FormTiming {
    /// Wait for any single element to become visible
    pub element_timeout: Duration,
    /// After opening a chosen dropdown, before looking for the option
    pub dropdown_open: Duration,
    /// Between attempts of a multi-step selection
    pub retry_delay: Duration,
    /// After typing the IMEI and pressing the suggestion key
    pub after_typing: Duration,
    /// After closing a leftover dropdown result
    pub after_close: Duration,
}

impl Default for FormTiming {
    fn default() -> Self {
        Self {
            element_timeout: Duration::from_secs(15),
            dropdown_open: Duration::from_millis(500),
            retry_delay: Duration::from_secs(1),
            after_typing: Duration::from_secs(1),
            after_close: Duration::from_millis(500),
        }
    }
}

impl FormTiming {
    /// No pauses and short waits, for fakes that answer instantly
    pub fn immediate() -> Self {
        Self {
            element_timeout: Duration::from_millis(50),
            dropdown_open: Duration::ZERO,
            retry_delay: Duration::ZERO,
            after_typing: Duration::ZERO,
            after_close: Duration::ZERO,
        }
    }
}

/// The form workflow bound to a layout
#[derive(Debug, Clone)]
pub struct KnackForm {
    layout: Arc<FormLayout>,
    timing: FormTiming,
}

impl KnackForm {
    pub fn new(layout: Arc<FormLayout>, timing: FormTiming) -> Self {
        Self { layout, timing }
    }

    pub fn layout(&self) -> &FormLayout {
        &self.layout
    }

    pub fn timing(&self) -> &FormTiming {
        &self.timing
    }
}
