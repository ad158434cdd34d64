use super::actions::{click_suggestion, force_input, select_chosen_option, select_dropdown_by_value};
use super::KnackForm;
use crate::types::{Row, Status};
use crate::webdriver::Key;
use crate::{AutomationError, Browser};
use tracing::{info, instrument, warn};

impl KnackForm {
    /// Fill in and submit the stock-in form for one row.
    ///
    /// Location and status are resolved before the page is touched, so a row
    /// with an unmapped location or unknown status fails without side effects.
    #[instrument(skip(self, browser, row), fields(row = row.row_index, imei = %row.imei))]
    pub async fn submit_row(&self, browser: &Browser, row: &Row) -> Result<(), AutomationError> {
        let layout = self.layout();
        let timing = self.timing();
        let timeout = Some(timing.element_timeout);

        let location = row.location.trim();
        let location_option = layout.location_selector(location)?;
        let status: Status = row.status.parse()?;
        info!("Mapping location '{}' → {}", location, location_option);

        select_chosen_option(
            browser,
            &layout.location_dropdown,
            location_option,
            &format!("Location: {location}"),
            timing,
        )
        .await?;

        select_dropdown_by_value(
            browser,
            &layout.status_select,
            status.option_value(),
            &format!("Status: {status}"),
            timing,
        )
        .await
        .map_err(|e| AutomationError::StepFailed(format!("select Status: {status}: {e}")))?;

        let trigger = browser
            .locator(layout.imei_trigger.clone())
            .try_wait_visible(timeout)
            .await?
            .ok_or_else(|| AutomationError::StepFailed("IMEI input not found".to_string()))?;
        trigger.click().await?;
        info!("🖱️ IMEI trigger clicked");

        let input = browser.active_element().await?.ok_or_else(|| {
            AutomationError::StepFailed("No active element to type the IMEI into".to_string())
        })?;
        force_input(&input, row.imei.trim(), "IMEI").await?;
        browser.press_key(Key::F12).await?;
        info!("🎹 F12 sent after IMEI input to open suggestions");
        tokio::time::sleep(timing.after_typing).await;

        click_suggestion(browser, &layout.imei_suggestion, timing)
            .await
            .map_err(|e| AutomationError::StepFailed(format!("click IMEI suggestion: {e}")))?;

        self.close_open_result(browser).await;

        let submit = browser
            .locator(layout.submit_button.clone())
            .try_wait_visible(timeout)
            .await?
            .ok_or_else(|| AutomationError::StepFailed("Submit button not found".to_string()))?;
        submit.scroll_into_view().await?;
        submit.js_click().await?;
        info!("🚀 Submit clicked, row {} done", row.row_index);
        Ok(())
    }

    /// Collapse a chosen result left open by the IMEI pick. Failures are only logged.
    async fn close_open_result(&self, browser: &Browser) {
        let css = self.layout().open_result.replace('\'', "\\'");
        let script =
            format!("const active = document.querySelector('{css}'); if (active) active.click();");
        match browser.execute_script(&script).await {
            Ok(_) => info!("🧹 Open dropdown result closed"),
            Err(e) => warn!("⚠️ No open dropdown result to close: {}", e),
        }
        tokio::time::sleep(self.timing().after_close).await;
    }
}
