//! CLI tool for managing two-factor methods
//!
//! # Usage
//!
//! ```bash
//! # Generate an encryption key for storage.encryption_key
//! twofactor-admin keygen
//!
//! # Show a new TOTP secret, then enroll it with a code from the app
//! twofactor-admin setup alice@example.com
//! twofactor-admin enroll-totp alice "Phone" JBSWY3DPEHPK3PXP 123456
//!
//! # Enroll a YubiKey by touching it
//! twofactor-admin enroll-yubikey alice "Work key" cccccc...
//!
//! # List, verify, manage
//! twofactor-admin list alice
//! twofactor-admin verify alice 123456
//! twofactor-admin disable alice <method-id>
//! ```

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use twofactor_rs::config::{Config, LoggingConfig, ENCRYPTION_KEY_ENV};
use twofactor_rs::mfa::{MemorySession, MethodId, MethodPatch, MfaManager, TotpService, Verification};
use twofactor_rs::storage::SecretCipher;

#[derive(Parser)]
#[command(name = "twofactor-admin")]
#[command(about = "Manage two-factor authentication methods", long_about = None)]
struct Cli {
    /// Configuration file. When missing, development defaults are used and
    /// only keygen, setup and code work unless TWOFACTOR_ENCRYPTION_KEY is set
    #[arg(short, long, default_value = "twofactor.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a base64 AES-256 key for storage.encryption_key
    Keygen,
    /// Generate a TOTP secret and provisioning URI
    Setup {
        /// Account label shown in the authenticator app
        account: String,
    },
    /// Enroll an authenticator app
    EnrollTotp {
        user: String,
        name: String,
        /// Base32 secret
        secret: String,
        /// Current code from the app
        code: String,
    },
    /// Enroll a YubiKey with one OTP
    EnrollYubikey {
        user: String,
        name: String,
        otp: String,
    },
    /// List a user's methods
    List { user: String },
    /// Check a code against a user's enabled methods
    Verify { user: String, code: String },
    /// Rename a method
    Rename {
        user: String,
        method: String,
        name: String,
    },
    /// Enable a method
    Enable { user: String, method: String },
    /// Disable a method
    Disable { user: String, method: String },
    /// Remove a method
    Remove { user: String, method: String },
    /// Remove all methods of a user
    Purge { user: String },
    /// Print the current code for a secret (clock drift diagnosis)
    Code { secret: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (config, from_file) = load_config(&cli.config)?;
    init_logging(&config.logging);

    match cli.command {
        Commands::Keygen => {
            println!("{}", SecretCipher::generate_key()?);
        }
        Commands::Setup { account } => {
            let totp = TotpService::new(config.totp.clone());
            let setup = totp.setup(&account)?;
            println!("Secret:           {}", setup.secret);
            println!("Provisioning URI: {}", setup.provisioning_uri);
        }
        Commands::Code { secret } => {
            let totp = TotpService::new(config.totp.clone());
            println!("{}", totp.generate_current(&secret)?);
        }
        command => {
            if let Some(message) = missing_key_message(&config, &cli.config, from_file) {
                fail(&message);
            }
            let manager = MfaManager::from_config(&config).await?;
            run(&manager, command).await?;
        }
    }

    Ok(())
}

async fn run(manager: &MfaManager, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::EnrollTotp {
            user,
            name,
            secret,
            code,
        } => match manager.enroll_time_based(&user, &name, &secret, &code).await {
            Ok(method) => println!("✓ Enrolled TOTP method {} ({})", method.name, method.id),
            Err(e) => fail(e.user_message()),
        },
        Commands::EnrollYubikey { user, name, otp } => {
            match manager.enroll_hardware_token(&user, &name, &otp).await {
                Ok(method) => println!("✓ Enrolled YubiKey {} ({})", method.name, method.id),
                Err(e) => fail(e.user_message()),
            }
        }
        Commands::List { user } => {
            let methods = manager.list_methods(&user).await?;
            if methods.is_empty() {
                println!("No two-factor methods for {}", user);
            } else {
                println!("Two-factor methods for {} ({}):", user, methods.len());
                for method in methods {
                    let state = if method.enabled { "enabled" } else { "disabled" };
                    println!("  {}  {:<8} {:<9} {}", method.id, method.kind().to_string(), state, method.name);
                }
            }
        }
        Commands::Verify { user, code } => {
            let mut session = MemorySession::new();
            match manager.complete_challenge(&user, &code, &mut session).await? {
                Verification::Matched(id) => println!("✓ Code accepted by method {}", id),
                Verification::NoMatch => fail("This OTP is not valid."),
            }
        }
        Commands::Rename { user, method, name } => {
            update(manager, &user, &method, MethodPatch::rename(name)).await;
        }
        Commands::Enable { user, method } => {
            update(manager, &user, &method, MethodPatch::enabled(true)).await;
        }
        Commands::Disable { user, method } => {
            update(manager, &user, &method, MethodPatch::enabled(false)).await;
        }
        Commands::Remove { user, method } => {
            match manager.remove_method(&user, &MethodId::from(method)).await {
                Ok(()) => println!("✓ Method removed"),
                Err(e) => fail(e.user_message()),
            }
        }
        Commands::Purge { user } => {
            let removed = manager.remove_all_for_user(&user).await?;
            println!("✓ Removed {} method(s) of {}", removed, user);
        }
        Commands::Keygen | Commands::Setup { .. } | Commands::Code { .. } => {}
    }

    Ok(())
}

async fn update(manager: &MfaManager, user: &str, method: &str, patch: MethodPatch) {
    match manager
        .update_method(user, &MethodId::from(method), patch)
        .await
    {
        Ok(method) => {
            let state = if method.enabled { "enabled" } else { "disabled" };
            println!("✓ Method {} is now \"{}\" ({})", method.id, method.name, state);
        }
        Err(e) => fail(e.user_message()),
    }
}

/// Returns the config and whether it was read from `path`
fn load_config(path: &Path) -> anyhow::Result<(Config, bool)> {
    if path.exists() {
        Ok((Config::from_file(path)?, true))
    } else {
        Ok((Config::development(), false))
    }
}

fn missing_key_message(config: &Config, path: &Path, from_file: bool) -> Option<String> {
    if from_file || !config.storage.encryption_key.is_empty() {
        return None;
    }
    Some(format!(
        "{} not found: development defaults only support keygen, setup and code. \
         Create it with storage.encryption_key set, or export {} (see `twofactor-admin keygen`)",
        path.display(),
        ENCRYPTION_KEY_ENV
    ))
}

fn init_logging(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("twofactor_rs={0},twofactor={0}", logging.level).into());

    // Command output goes to stdout, logs to stderr
    let registry = tracing_subscriber::registry().with(filter);
    let layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
    match logging.format.as_str() {
        "json" => registry.with(layer.json()).init(),
        "compact" => registry.with(layer.compact()).init(),
        _ => registry.with(layer).init(),
    }

    info!("twofactor-admin v{}", env!("CARGO_PKG_VERSION"));
}

fn fail(message: &str) -> ! {
    eprintln!("✗ {}", message);
    process::exit(1);
}
