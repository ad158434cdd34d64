use super::FormTiming;
use crate::retry::{retry_on_stale, DEFAULT_ATTEMPTS};
use crate::{AutomationError, Browser, Selector, WebElement};
use tracing::{info, instrument, warn};

const CHOSEN_ATTEMPTS: usize = 3;

/// Pick an option from a chosen dropdown: open the dropdown, then click the option.
///
/// Up to three attempts. A missing dropdown or option, a stale element or any
/// other failure only costs one attempt.
#[instrument(skip(browser, dropdown, option, timing))]
pub async fn select_chosen_option(
    browser: &Browser,
    dropdown: &Selector,
    option: &Selector,
    label: &str,
    timing: &FormTiming,
) -> Result<(), AutomationError> {
    for attempt in 1..=CHOSEN_ATTEMPTS {
        match open_and_pick(browser, dropdown, option, label, attempt, timing).await {
            Ok(true) => {
                info!("✅ {} selected", label);
                return Ok(());
            }
            Ok(false) => {}
            Err(e) if e.is_stale() => {
                warn!("⚠️ Stale element while selecting {}, retrying", label);
            }
            Err(e) => {
                warn!("❌ Failed to select {} (attempt {}): {}", label, attempt, e);
            }
        }
        if attempt < CHOSEN_ATTEMPTS {
            tokio::time::sleep(timing.retry_delay).await;
        }
    }
    Err(AutomationError::StepFailed(format!("select {label}")))
}

async fn open_and_pick(
    browser: &Browser,
    dropdown: &Selector,
    option: &Selector,
    label: &str,
    attempt: usize,
    timing: &FormTiming,
) -> Result<bool, AutomationError> {
    let Some(dropdown_el) = browser
        .locator(dropdown.clone())
        .try_wait_visible(Some(timing.element_timeout))
        .await?
    else {
        warn!("⚠️ Dropdown for {} not found (attempt {})", label, attempt);
        return Ok(false);
    };
    dropdown_el.click().await?;
    tokio::time::sleep(timing.dropdown_open).await;

    let Some(option_el) = browser
        .locator(option.clone())
        .try_wait_visible(Some(timing.element_timeout))
        .await?
    else {
        warn!("⚠️ Option for {} not found (attempt {})", label, attempt);
        return Ok(false);
    };
    option_el.click().await?;
    Ok(true)
}

/// Choose `value` in a native `<select>`, retrying when the element goes stale
#[instrument(skip(browser, select, timing))]
pub async fn select_dropdown_by_value(
    browser: &Browser,
    select: &Selector,
    value: &str,
    label: &str,
    timing: &FormTiming,
) -> Result<(), AutomationError> {
    let timeout = timing.element_timeout;
    retry_on_stale(DEFAULT_ATTEMPTS, timing.retry_delay, label, move || async move {
        let element = browser
            .locator(select.clone())
            .wait_visible(Some(timeout))
            .await?;
        element.select_by_value(value).await
    })
    .await?;
    info!("✅ {} selected: {}", label, value);
    Ok(())
}

/// Type into an input the way autocomplete widgets expect, then fire the events
/// frameworks listen for.
pub async fn force_input(
    element: &WebElement,
    value: &str,
    label: &str,
) -> Result<(), AutomationError> {
    element.click().await?;
    element.clear().await?;
    element.type_chars(value).await?;
    element.dispatch_events(&["input", "change", "blur"]).await?;
    info!("⌨️ {} typed: {}", label, value);
    Ok(())
}

/// Click the first autocomplete suggestion once it shows up
pub async fn click_suggestion(
    browser: &Browser,
    suggestion: &Selector,
    timing: &FormTiming,
) -> Result<(), AutomationError> {
    let timeout = timing.element_timeout;
    retry_on_stale(
        DEFAULT_ATTEMPTS,
        timing.retry_delay,
        "IMEI suggestion",
        move || async move {
            let element = browser
                .locator(suggestion.clone())
                .wait_visible(Some(timeout))
                .await?;
            element.click().await
        },
    )
    .await?;
    info!("✅ IMEI suggestion clicked");
    Ok(())
}
