//! Medcard operator CLI
//!
//! Provisions the master secret, registers user keys, and encrypts/decrypts
//! files for a user from the command line. Wrapped keys and client salts live
//! in a JSON store in the data directory.
//!
//! The master secret is always read from `MASTER_ENCRYPTION_KEY`; it is never
//! accepted as a flag so it does not end up in shell history.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use commands::Context;
use medcard_core::config::{self, Settings};
use medcard_core::CryptoConfig;

/// Medcard - per-user envelope encryption for health records
#[derive(Parser, Debug)]
#[command(name = "medcard")]
#[command(version)]
#[command(about = "Medcard - per-user envelope encryption for health records")]
struct Args {
    /// Directory holding the key/salt store and settings.json
    #[arg(long, env = "MEDCARD_DATA_DIR", global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print a fresh hex master secret for MASTER_ENCRYPTION_KEY
    GenerateSecret,

    /// Create and store a wrapped key for a new user
    Register { user_id: String },

    /// Encrypt a file for a user with their server-side key
    Encrypt {
        user_id: String,
        input: PathBuf,
        output: PathBuf,
    },

    /// Decrypt a file produced by `encrypt`
    Decrypt {
        user_id: String,
        input: PathBuf,
        output: PathBuf,
    },

    /// Choose a client-side encryption password for a user
    ClientSetup {
        user_id: String,
        #[arg(long, env = "MEDCARD_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Encrypt a file with the user's client-side password
    ClientEncrypt {
        user_id: String,
        input: PathBuf,
        output: PathBuf,
        #[arg(long, env = "MEDCARD_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Decrypt a file produced by `client-encrypt`
    ClientDecrypt {
        user_id: String,
        input: PathBuf,
        output: PathBuf,
        #[arg(long, env = "MEDCARD_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Check a client-side password against an existing encrypted file
    ClientVerify {
        user_id: String,
        /// Encrypted file to test the password against
        #[arg(long)]
        probe: Option<PathBuf>,
        #[arg(long, env = "MEDCARD_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Command::GenerateSecret = args.command {
        println!("{}", commands::generate_secret());
        return Ok(());
    }

    let data_dir = match args.data_dir {
        Some(dir) => dir,
        None => config::default_data_dir()?,
    };
    let settings = Settings::load(&data_dir.join("settings.json"))?;
    let data_dir = settings.data_dir.clone().unwrap_or(data_dir);

    // Fatal at startup: no master secret, no service
    let crypto = CryptoConfig::from_env()?;

    let ctx = Context::open(&crypto, &data_dir).await?;

    match args.command {
        // handled before configuration is loaded
        Command::GenerateSecret => {}
        Command::Register { user_id } => {
            ctx.register(&user_id).await?;
            eprintln!("Registered key for {}", user_id);
        }
        Command::Encrypt {
            user_id,
            input,
            output,
        } => ctx.encrypt_file(&user_id, &input, &output).await?,
        Command::Decrypt {
            user_id,
            input,
            output,
        } => ctx.decrypt_file(&user_id, &input, &output).await?,
        Command::ClientSetup { user_id, password } => {
            let password = match password {
                Some(p) => p,
                None => prompt_new_password()?,
            };
            ctx.client_setup(&user_id, &password).await?;
            eprintln!("Client encryption set up for {}", user_id);
        }
        Command::ClientEncrypt {
            user_id,
            input,
            output,
            password,
        } => {
            let password = password_or_prompt(password)?;
            ctx.client_encrypt_file(&user_id, &password, &input, &output)
                .await?
        }
        Command::ClientDecrypt {
            user_id,
            input,
            output,
            password,
        } => {
            let password = password_or_prompt(password)?;
            ctx.client_decrypt_file(&user_id, &password, &input, &output)
                .await?
        }
        Command::ClientVerify {
            user_id,
            probe,
            password,
        } => {
            let password = password_or_prompt(password)?;
            let verified = ctx
                .client_verify(&user_id, &password, probe.as_deref())
                .await?;
            if verified {
                eprintln!("Password verified");
            } else {
                eprintln!("Nothing to verify against - password will be treated as new");
            }
        }
    }

    Ok(())
}

fn password_or_prompt(password: Option<String>) -> anyhow::Result<String> {
    match password {
        Some(p) => Ok(p),
        None => Ok(rpassword::prompt_password("Encryption password: ")?),
    }
}

fn prompt_new_password() -> anyhow::Result<String> {
    let first = rpassword::prompt_password("New encryption password: ")?;
    let second = rpassword::prompt_password("Repeat password: ")?;
    if first != second {
        anyhow::bail!("Passwords do not match");
    }
    if first.is_empty() {
        anyhow::bail!("Password must not be empty");
    }
    Ok(first)
}
