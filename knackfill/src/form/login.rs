use super::KnackForm;
use crate::types::Account;
use crate::{AutomationError, Browser};
use tracing::{debug, info, instrument, warn};

impl KnackForm {
    /// Sign in to the Knack app at `url` and wait for its first view to render.
    ///
    /// Every failure is reported as [`AutomationError::LoginFailed`].
    #[instrument(skip(self, browser, account), fields(email = %account.email))]
    pub async fn login(
        &self,
        browser: &Browser,
        url: &str,
        account: &Account,
    ) -> Result<(), AutomationError> {
        self.try_login(browser, url, account).await.map_err(|e| match e {
            AutomationError::LoginFailed(_) => e,
            other => AutomationError::LoginFailed(other.to_string()),
        })
    }

    async fn try_login(
        &self,
        browser: &Browser,
        url: &str,
        account: &Account,
    ) -> Result<(), AutomationError> {
        let layout = &self.layout().login;
        let timeout = Some(self.timing().element_timeout);

        browser.goto(url).await?;
        info!("🔄 Opened Knack login page");

        let email = browser.locator(layout.email.clone()).wait_visible(timeout).await?;
        email.send_keys(&account.email).await?;
        let password = browser.locator(layout.password.clone()).first(timeout).await?;
        password.send_keys(&account.password).await?;
        info!("📧 Email and password typed");

        let mut submitted = false;
        for candidate in &layout.submit_candidates {
            let clicked = match browser.locator(candidate.clone()).all().await {
                Ok(found) => match found.first() {
                    Some(button) => button.click().await.is_ok(),
                    None => false,
                },
                Err(_) => false,
            };
            if clicked {
                info!("✅ Login submitted via {}", candidate);
                submitted = true;
                break;
            }
            debug!("Login candidate {} not clickable", candidate);
        }
        if !submitted {
            warn!("No login button could be clicked, waiting for the view anyway");
        }

        match browser
            .locator(layout.view_ready.clone())
            .try_wait_visible(timeout)
            .await?
        {
            Some(_) => {
                info!("✅ Login succeeded, Knack view ready");
                Ok(())
            }
            None => Err(AutomationError::LoginFailed(
                "Knack view did not appear after login".to_string(),
            )),
        }
    }
}
