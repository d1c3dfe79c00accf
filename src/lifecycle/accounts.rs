//! Cleaner payout accounts

use uuid::Uuid;

use super::{JobLifecycle, LifecycleError, LifecycleResult};
use crate::domain::{ConnectAccount, CreateConnectAccountInput, OnboardingLink, OnboardingLinkInput};

fn check_country(country: &str) -> LifecycleResult<String> {
    let country = country.trim().to_ascii_uppercase();
    if country.len() != 2 || !country.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(LifecycleError::validation(
            "country must be a two-letter ISO code",
        ));
    }
    Ok(country)
}

fn check_email(email: &str) -> LifecycleResult<&str> {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(LifecycleError::validation("email address is not valid")),
    }
}

impl JobLifecycle {
    /// Open a payout account for the cleaner, or return the one they have.
    pub async fn create_connect_account(
        &self,
        cleaner_id: Uuid,
        input: CreateConnectAccountInput,
    ) -> LifecycleResult<ConnectAccount> {
        if let Some(existing) = self.store.get_connect_account(cleaner_id).await? {
            return Ok(existing);
        }

        let email = check_email(&input.email)?;
        let country = check_country(&input.country)?;

        let status = self
            .gateway
            .create_connect_account(cleaner_id, email, &country)
            .await?;

        let now = self.clock.now();
        let account = ConnectAccount {
            cleaner_id,
            account_id: status.account_id.clone(),
            country,
            charges_enabled: status.charges_enabled,
            payouts_enabled: status.payouts_enabled,
            details_submitted: status.details_submitted,
            disabled_reason: status.disabled_reason.clone(),
            created_at: now,
            updated_at: now,
        };
        self.store.upsert_connect_account(&account).await?;

        tracing::info!(
            cleaner_id = %cleaner_id,
            account_id = %account.account_id,
            "Connect account created"
        );

        Ok(account)
    }

    pub async fn get_connect_account(&self, cleaner_id: Uuid) -> LifecycleResult<ConnectAccount> {
        self.store
            .get_connect_account(cleaner_id)
            .await?
            .ok_or(LifecycleError::NotFound("payout account"))
    }

    /// Hosted onboarding link for the cleaner's account.
    pub async fn onboarding_link(
        &self,
        cleaner_id: Uuid,
        input: OnboardingLinkInput,
    ) -> LifecycleResult<OnboardingLink> {
        let account = self.get_connect_account(cleaner_id).await?;
        let return_url = input
            .return_url
            .as_deref()
            .unwrap_or(&self.config.connect_return_url);

        let link = self
            .gateway
            .onboarding_link(&account.account_id, return_url, &self.config.connect_refresh_url)
            .await?;

        tracing::debug!(cleaner_id = %cleaner_id, account_id = %account.account_id, "Onboarding link issued");
        Ok(link)
    }

    /// Pull the account's capabilities from the processor and mirror them.
    pub async fn refresh_account_status(&self, cleaner_id: Uuid) -> LifecycleResult<ConnectAccount> {
        let mut account = self.get_connect_account(cleaner_id).await?;
        let status = self.gateway.account_status(&account.account_id).await?;

        if account.payouts_enabled != status.payouts_enabled
            || account.disabled_reason != status.disabled_reason
        {
            tracing::info!(
                cleaner_id = %cleaner_id,
                account_id = %account.account_id,
                payouts_enabled = status.payouts_enabled,
                disabled_reason = ?status.disabled_reason,
                "Connect account status changed"
            );
        }

        account.apply_status(&status, self.clock.now());
        self.store.upsert_connect_account(&account).await?;
        Ok(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn country_is_normalized() {
        assert_eq!(check_country(" no ").unwrap(), "NO");
        assert!(check_country("NOR").is_err());
        assert!(check_country("1A").is_err());
    }

    #[test]
    fn email_needs_local_part_and_domain() {
        assert!(check_email("kari@example.no").is_ok());
        assert!(check_email("@example.no").is_err());
        assert!(check_email("kari@localhost").is_err());
    }
}
