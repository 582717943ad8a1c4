//! Alerts derived from session and ledger state.
//!
//! Derivation keeps no memory of what it produced before; repeated alerts
//! collapse in the notification center through `(title, category)` keys.

use chrono::{DateTime, Duration, Utc};

use crate::config::NotificationSettings;
use crate::entities::{
    NotificationCategory, NotificationDraft, NotificationKind, SessionSnapshot, TokenAccount,
};

pub const LOW_BALANCE_TITLE: &str = "Low Token Balance";
pub const NO_TOKENS_TITLE: &str = "No Tokens Available";
pub const HIGH_BALANCE_TITLE: &str = "Great Token Balance";
pub const WELCOME_TITLE: &str = "Welcome to LabelKit!";
pub const SUPER_ADMIN_TITLE: &str = "Super Admin Access";
pub const PASSWORD_REMINDER_TITLE: &str = "Security Reminder";

const TOKENS_URL: &str = "/tokens";
const PROFILE_URL: &str = "/profile";

pub fn derive_alerts(
    session: &SessionSnapshot,
    account: Option<&TokenAccount>,
    now: DateTime<Utc>,
    settings: &NotificationSettings,
) -> Vec<NotificationDraft> {
    let mut drafts = Vec::new();

    if let Some(account) = account {
        drafts.extend(balance_alert(account.balance, settings));
    }

    let Some(user) = session.user.as_ref().filter(|_| session.is_authenticated()) else {
        return drafts;
    };

    // An out-of-range window never closes
    let account_age = now.signed_duration_since(user.created_at);
    if Duration::try_hours(settings.welcome_window_hours).map_or(true, |window| account_age < window)
    {
        drafts.push(NotificationDraft::new(
            NotificationKind::Info,
            NotificationCategory::System,
            WELCOME_TITLE,
            format!(
                "Hi {}, your account is ready. Upload a data file or design a label template to generate your first barcodes.",
                user.display_name()
            ),
        ));
    }

    if user.is_super_admin {
        drafts.push(NotificationDraft::new(
            NotificationKind::Info,
            NotificationCategory::System,
            SUPER_ADMIN_TITLE,
            "You have super admin privileges, including payment and user management.",
        ));
    }

    if let Some(last_login) = user.last_login {
        let overdue = Duration::try_days(settings.password_rotation_days)
            .is_some_and(|rotation| now.signed_duration_since(last_login) > rotation);
        if overdue {
            drafts.push(
                NotificationDraft::new(
                    NotificationKind::Warning,
                    NotificationCategory::Security,
                    PASSWORD_REMINDER_TITLE,
                    format!(
                        "Your last login was more than {} days ago. Consider updating your password.",
                        settings.password_rotation_days
                    ),
                )
                .with_action_url(PROFILE_URL),
            );
        }
    }

    drafts
}

fn balance_alert(balance: u64, settings: &NotificationSettings) -> Option<NotificationDraft> {
    let draft = if balance == 0 {
        NotificationDraft::new(
            NotificationKind::Error,
            NotificationCategory::Token,
            NO_TOKENS_TITLE,
            "You have run out of tokens. Purchase more to keep generating barcodes.",
        )
    } else if balance < settings.low_balance_threshold {
        NotificationDraft::new(
            NotificationKind::Warning,
            NotificationCategory::Token,
            LOW_BALANCE_TITLE,
            format!(
                "You have {} tokens remaining. Consider purchasing more to avoid interruptions.",
                balance
            ),
        )
    } else if balance >= settings.high_balance_threshold {
        NotificationDraft::new(
            NotificationKind::Success,
            NotificationCategory::Token,
            HIGH_BALANCE_TITLE,
            format!("You have {} tokens available. Happy generating!", balance),
        )
    } else {
        return None;
    };

    Some(draft.with_action_url(TOKENS_URL))
}
