use clap::{Parser, Subcommand};
use dialoguer::{Confirm, Input};
use labelkit_adapters::network::build_api_client;
use labelkit_adapters::{configuration, paths, telemetry};
use labelkit_adapters::{
    ConfiguredCredentialStore, FileNotificationStore, HttpAuthApi, HttpBillingApi,
};
use labelkit_core::entities::{
    Credentials, Notification, PaymentProvider, PurchaseRequest, Registration, SessionSnapshot,
    SignOutReason, TokenAccount,
};
use labelkit_core::use_cases::{ControlPlane, RefreshOutcome, VerifyOutcome};
use serde_json::json;
use tracing::error;
use uuid::Uuid;

type Plane = ControlPlane<ConfiguredCredentialStore, HttpAuthApi, HttpBillingApi, FileNotificationStore>;

#[derive(Parser)]
#[command(name = "labelkit", author, version, about, long_about = None)]
struct Cli {
    /// Print results as JSON
    #[arg(long, global = true, default_value = "false")]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    // --- Session commands ---
    /// Log in with email or username
    Login {
        /// Email address or username
        identifier: Option<String>,
    },

    /// Create an account and log in
    Register {
        #[arg(short, long)]
        email: String,

        #[arg(short, long)]
        username: String,

        #[arg(long)]
        full_name: Option<String>,
    },

    /// Log out and forget the stored session
    Logout,

    /// Show the current session and balance
    Status,

    /// Check the stored access token with the server
    Verify,

    /// Exchange the refresh token for a new access token
    Refresh,

    // --- Ledger commands ---
    /// Fetch the token balance
    Balance,

    /// Buy tokens with mobile money
    Purchase {
        /// Amount in UGX
        amount: u64,

        /// Payment provider (mtn or airtel)
        #[arg(short, long)]
        provider: PaymentProvider,

        /// Mobile money phone number
        #[arg(long)]
        phone: String,

        /// Skip confirmation prompt
        #[arg(short, long, default_value = "false")]
        yes: bool,
    },

    // --- Notification commands ---
    /// Show or manage notifications
    Notifications {
        #[command(subcommand)]
        action: Option<NotificationCommand>,
    },
}

#[derive(Subcommand)]
enum NotificationCommand {
    /// List notifications, newest first
    List,
    /// Mark one notification as read
    Read { id: Uuid },
    /// Mark every notification as read
    ReadAll,
    /// Remove a notification and stop it from coming back
    Dismiss { id: Uuid },
    /// Remove every notification
    Clear,
    /// Allow dismissed notifications to appear again
    ResetSuppressed,
}

fn build_plane(settings: &labelkit_core::config::Settings) -> anyhow::Result<Plane> {
    let client = build_api_client(&settings.api)?;
    let data_dir = paths::data_dir(settings);

    Ok(ControlPlane::new(
        ConfiguredCredentialStore::from_settings(settings).into(),
        HttpAuthApi::new(client.clone(), settings.api.base_url.clone()).into(),
        HttpBillingApi::new(client, settings.api.base_url.clone()).into(),
        FileNotificationStore::new(data_dir).into(),
        settings.notifications,
    ))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = match configuration::get_configuration() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("failed to load configuration: {}", e);
            return Err(anyhow::anyhow!("configuration loading failed"));
        }
    };

    let _guard = telemetry::init_subscriber("labelkit", &settings.log_level);

    let cli = Cli::parse();
    let plane = build_plane(&settings)?;
    plane.boot().await;

    if let Err(e) = run(&cli, &plane).await {
        match e.downcast_ref::<labelkit_core::Error>() {
            Some(core) => {
                error!(category = %core.category(), "{}", core);
                eprintln!("{} failed: {}", core.category(), core);
            }
            None => {
                error!(?e, "command failed");
                eprintln!("error: {}", e);
            }
        }
        std::process::exit(1);
    }

    Ok(())
}

async fn run(cli: &Cli, plane: &Plane) -> anyhow::Result<()> {
    match &cli.command {
        // --- Session commands ---
        Commands::Login { identifier } => {
            let identifier = match identifier {
                Some(identifier) => identifier.clone(),
                None => Input::new()
                    .with_prompt("Email or username")
                    .interact_text()?,
            };
            let password = rpassword::prompt_password("Password: ")?;

            let user = plane
                .login(&Credentials::new(identifier, password))
                .await?;

            println!("Logged in as {}", user.display_name());
            print_balance(plane.ledger().snapshot().as_ref(), cli.json)?;
            print_unread(plane);
        }

        Commands::Register {
            email,
            username,
            full_name,
        } => {
            let password = rpassword::prompt_password("Password: ")?;
            let confirmation = rpassword::prompt_password("Confirm password: ")?;
            if password != confirmation {
                anyhow::bail!("passwords do not match");
            }

            let outcome = plane
                .register(&Registration {
                    email: email.clone(),
                    username: username.clone(),
                    password,
                    full_name: full_name.clone(),
                })
                .await?;

            println!("Welcome, {}!", outcome.user.display_name());
            if outcome.welcome_tokens > 0 {
                println!("{} welcome tokens were added to your account", outcome.welcome_tokens);
            }
            print_balance(plane.ledger().snapshot().as_ref(), cli.json)?;
        }

        Commands::Logout => {
            plane.logout().await;
            println!("Logged out");
        }

        Commands::Status => {
            let session = plane.session().snapshot();
            let account = plane.ledger().snapshot();
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&status_json(&session, account.as_ref()))?);
            } else {
                print_status(&session, account.as_ref());
                print_unread(plane);
            }
        }

        Commands::Verify => match plane.verify_session().await {
            VerifyOutcome::NoSession => println!("Not logged in"),
            VerifyOutcome::Valid => println!("Session is valid"),
            VerifyOutcome::Refreshed => println!("Session was expired and has been renewed"),
            VerifyOutcome::SignedOut => println!("Session expired, please log in again"),
            VerifyOutcome::Unreachable => println!("Server unreachable, session kept"),
        },

        Commands::Refresh => match plane.refresh_session().await {
            RefreshOutcome::Refreshed | RefreshOutcome::AlreadyRefreshed => {
                println!("Session renewed")
            }
            RefreshOutcome::SessionEnded => println!("Session expired, please log in again"),
        },

        // --- Ledger commands ---
        Commands::Balance => {
            require_session(plane)?;
            let account = plane.refresh_balance().await?;
            print_balance(account.as_ref(), cli.json)?;
        }

        Commands::Purchase {
            amount,
            provider,
            phone,
            yes,
        } => {
            let request = PurchaseRequest::new(*amount, *provider, phone);
            request.validate()?;

            if !yes {
                let confirmed = Confirm::new()
                    .with_prompt(format!(
                        "Charge {} UGX to {} number {}?",
                        request.amount_ugx, request.provider, request.phone
                    ))
                    .default(false)
                    .interact()?;
                if !confirmed {
                    println!("Purchase cancelled");
                    return Ok(());
                }
            }

            let outcome = plane.purchase_tokens(&request).await?;

            if cli.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&json!({
                        "transaction_id": outcome.receipt.transaction_id,
                        "status": outcome.receipt.status,
                        "message": outcome.receipt.message,
                        "tokens_added": outcome.receipt.tokens_added,
                        "account": outcome.account,
                    }))?
                );
            } else {
                println!(
                    "Purchase accepted: {}",
                    outcome
                        .receipt
                        .message
                        .as_deref()
                        .or(outcome.receipt.status.as_deref())
                        .unwrap_or("ok")
                );
                if let Some(id) = &outcome.receipt.transaction_id {
                    println!("- Transaction: {}", id);
                }
                match &outcome.account {
                    Some(account) => println!("- New balance: {} tokens", account.balance),
                    None => println!("- Balance could not be refreshed, run `labelkit balance`"),
                }
            }
        }

        // --- Notification commands ---
        Commands::Notifications { action } => {
            let center = plane.notifications();
            match action.as_ref().unwrap_or(&NotificationCommand::List) {
                NotificationCommand::List => {
                    print_notifications(&center.notifications(), cli.json)?;
                }
                NotificationCommand::Read { id } => {
                    if !center.mark_as_read(*id).await? {
                        anyhow::bail!("no notification with id {}", id);
                    }
                    println!("Marked as read");
                }
                NotificationCommand::ReadAll => {
                    let changed = center.mark_all_as_read().await?;
                    println!("Marked {} notifications as read", changed);
                }
                NotificationCommand::Dismiss { id } => {
                    if !center.remove_notification(*id).await? {
                        anyhow::bail!("no notification with id {}", id);
                    }
                    println!("Notification dismissed");
                }
                NotificationCommand::Clear => {
                    let removed = center.clear_all().await?;
                    println!("Removed {} notifications", removed);
                }
                NotificationCommand::ResetSuppressed => {
                    center.clear_suppressed().await?;
                    println!("Dismissed notifications may appear again");
                }
            }
        }
    }

    Ok(())
}

fn require_session(plane: &Plane) -> Result<(), labelkit_core::Error> {
    if plane.session().is_authenticated() {
        Ok(())
    } else {
        Err(labelkit_core::Error::NotAuthenticated)
    }
}

fn status_json(session: &SessionSnapshot, account: Option<&TokenAccount>) -> serde_json::Value {
    json!({
        "state": session.state.to_string(),
        "authenticated": session.is_authenticated(),
        "user": session.user,
        "account": account,
        "signed_out": session.signed_out.map(|reason| match reason {
            SignOutReason::UserRequested => "user_requested",
            SignOutReason::SessionExpired => "session_expired",
        }),
    })
}

fn print_status(session: &SessionSnapshot, account: Option<&TokenAccount>) {
    match (&session.user, session.is_authenticated()) {
        (Some(user), true) => {
            println!("Logged in as {} <{}>", user.display_name(), user.email);
            if user.is_super_admin {
                println!("- Role: super admin");
            } else if user.is_admin {
                println!("- Role: admin");
            }
            if let Some(account) = account {
                println!("- Balance: {} tokens", account.balance);
                println!("- Purchased: {}, used: {}", account.total_purchased, account.total_used);
            }
        }
        _ => {
            if session.signed_out == Some(SignOutReason::SessionExpired) {
                println!("Session expired, please log in again");
            } else {
                println!("Not logged in");
            }
        }
    }
}

fn print_balance(account: Option<&TokenAccount>, as_json: bool) -> anyhow::Result<()> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(&account)?);
        return Ok(());
    }

    match account {
        Some(account) => println!("Balance: {} tokens", account.balance),
        None => println!("Balance unavailable"),
    }
    Ok(())
}

fn print_unread(plane: &Plane) {
    let unread = plane.notifications().unread_count();
    if unread > 0 {
        println!("You have {} unread notifications (see `labelkit notifications`)", unread);
    }
}

fn print_notifications(notifications: &[Notification], as_json: bool) -> anyhow::Result<()> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(notifications)?);
        return Ok(());
    }

    if notifications.is_empty() {
        println!("No notifications");
        return Ok(());
    }

    for n in notifications {
        println!(
            "{} [{}] {} ({}, {})",
            if n.read { " " } else { "*" },
            n.kind,
            n.title,
            n.category,
            n.timestamp.format("%Y-%m-%d %H:%M")
        );
        println!("    {}", n.message);
        if let Some(url) = &n.action_url {
            println!("    -> {}", url);
        }
        println!("    id: {}", n.id);
    }
    Ok(())
}
