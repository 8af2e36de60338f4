//! Subcommand handlers.
//!
//! Each handler returns `anyhow::Result<()>` and writes its result to
//! stdout; diagnostics go through `tracing` to stderr.

use std::cell::OnceCell;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use passenger_vault::{TokenStatus, TokenStore, VaultError};
use tracing::info;

use crate::api::ApiClient;
use crate::cli::AccountArgs;
use crate::config::{self, Config};
use crate::prompt;
use crate::schemas::{Account, CreateAccountRequest, ImportResponse, UpdateAccountRequest};
use crate::table;

/// Everything a handler needs: settings plus the session-token store.
/// The store is opened on first use, so commands that never touch the
/// session (such as `server`) work without a usable storage directory.
pub struct AppContext {
    pub config: Config,
    store: OnceCell<TokenStore>,
}

impl AppContext {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            store: OnceCell::new(),
        }
    }

    /// Context around an already opened store.
    #[cfg(test)]
    pub fn with_store(config: Config, store: TokenStore) -> Self {
        Self {
            config,
            store: OnceCell::from(store),
        }
    }

    fn store(&self) -> Result<&TokenStore> {
        if let Some(store) = self.store.get() {
            return Ok(store);
        }
        let store = TokenStore::open_default().context("failed to open session storage")?;
        tracing::debug!(?store, "session storage opened");
        Ok(self.store.get_or_init(|| store))
    }

    fn client(&self) -> Result<ApiClient> {
        Ok(ApiClient::new(&self.config)?)
    }

    fn authenticated(&self) -> Result<ApiClient> {
        Ok(ApiClient::authenticated(&self.config, self.store()?)?)
    }
}

// ---------------------------------------------------------------------------
// Setup & session
// ---------------------------------------------------------------------------

pub fn cmd_server(ctx: &mut AppContext, url: &str) -> Result<()> {
    set_server(ctx, url, &config::default_path()?)
}

fn set_server(ctx: &mut AppContext, url: &str, path: &Path) -> Result<()> {
    // Validate before saving.
    let api_base = config::api_base_url(url)?;

    ctx.config.server_url = Some(url.trim().trim_end_matches('/').to_owned());
    ctx.config.save_to(path)?;

    info!(api = %api_base, "server URL updated");
    println!("Server set to {} (saved to {})", api_base, path.display());
    Ok(())
}

pub async fn cmd_status(ctx: &AppContext) -> Result<()> {
    let initialized = ctx.client()?.status().await?;
    if initialized {
        println!("Server: initialized");
    } else {
        println!("Server: not initialized, run `passenger register`");
    }

    let session = match ctx.store() {
        Ok(store) => describe_session(store.status()),
        Err(e) => format!("unavailable ({e:#})"),
    };
    println!("Session: {session}");
    Ok(())
}

fn describe_session(status: passenger_vault::Result<TokenStatus>) -> String {
    match status {
        Ok(TokenStatus::Missing) => "not logged in".to_owned(),
        Ok(TokenStatus::Valid { expires_at, .. }) => {
            let left = (expires_at - Utc::now()).num_seconds().max(0);
            format!("active, expires in {}m{:02}s", left / 60, left % 60)
        }
        Ok(TokenStatus::Expired { expired_at }) => {
            format!("expired at {}", expired_at.format("%H:%M:%S UTC"))
        }
        Err(VaultError::Crypto { .. }) => "unreadable, run `passenger login` again".to_owned(),
        Err(e) => format!("unavailable ({e})"),
    }
}

pub async fn cmd_register(ctx: &AppContext) -> Result<()> {
    let client = ctx.client()?;
    if client.status().await? {
        bail!("server is already initialized");
    }

    let passphrase = prompt::secret("Master passphrase")?;
    let confirm = prompt::secret("Confirm master passphrase")?;
    if *passphrase != *confirm {
        bail!("passphrases do not match");
    }

    let recovery = client.register(&passphrase).await?;
    println!("Server initialized.");
    println!();
    println!("Recovery key: {recovery}");
    println!();
    println!("Store it somewhere safe, then confirm it with `passenger validate`.");
    Ok(())
}

pub async fn cmd_validate(ctx: &AppContext, recovery: Option<String>) -> Result<()> {
    let recovery = prompt::secret_when_none("Recovery key", recovery)?;
    ctx.client()?.validate(recovery.trim()).await?;
    println!("Recovery key confirmed.");
    Ok(())
}

pub async fn cmd_login(ctx: &AppContext) -> Result<()> {
    let client = ctx.client()?;
    if !client.status().await? {
        bail!("server is not initialized, run `passenger register` first");
    }

    let passphrase = prompt::secret("Master passphrase")?;
    let token = client.login(&passphrase).await?;

    ctx.store()?
        .store_token(&token)
        .context("failed to cache session token")?;

    println!(
        "Logged in. The session expires in {} minutes.",
        passenger_vault::TOKEN_TTL.num_minutes()
    );
    Ok(())
}

pub fn cmd_logout(ctx: &AppContext) -> Result<()> {
    ctx.store()?
        .clear_token()
        .context("failed to clear session token")?;
    println!("Logged out.");
    Ok(())
}

pub async fn cmd_master_passphrase(ctx: &AppContext) -> Result<()> {
    let client = ctx.authenticated()?;

    let passphrase = prompt::secret("New master passphrase")?;
    let confirm = prompt::secret("Confirm new master passphrase")?;
    if *passphrase != *confirm {
        bail!("passphrases do not match");
    }

    client.change_master_passphrase(&passphrase).await?;
    ctx.store()?.clear_token()?;
    println!("Master passphrase changed. Log in again with `passenger login`.");
    Ok(())
}

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

const ACCOUNT_HEADERS: [&str; 5] = ["ID", "Platform", "Identifier", "URL", "Strength"];

fn account_row(account: &Account) -> Vec<String> {
    vec![
        account.id.clone(),
        account.platform.clone(),
        account.identifier.clone(),
        account.url.clone(),
        account.strength.to_string(),
    ]
}

pub async fn cmd_list(ctx: &AppContext) -> Result<()> {
    let accounts = ctx.authenticated()?.accounts().await?;
    let rows: Vec<Vec<String>> = accounts.iter().map(account_row).collect();
    table::print(&ACCOUNT_HEADERS, &rows);
    Ok(())
}

pub async fn cmd_get(ctx: &AppContext, id: &str) -> Result<()> {
    let passphrase = ctx.authenticated()?.account_passphrase(id).await?;
    println!("{}", passphrase.as_str());
    Ok(())
}

pub async fn cmd_create(ctx: &AppContext, args: AccountArgs) -> Result<()> {
    let client = ctx.authenticated()?;

    let request = CreateAccountRequest {
        platform: prompt::required_text_when_none("Platform", args.platform)?,
        identifier: prompt::required_text_when_none("Identifier", args.identifier)?,
        url: prompt::text_when_none("URL", args.url)?,
        notes: prompt::text_when_none("Notes", args.notes)?,
        passphrase: prompt::secret("Passphrase")?.to_string(),
    };

    let account = client.create_account(&request).await?;
    println!("Created account {} ({}).", account.id, account.platform);
    Ok(())
}

pub async fn cmd_update(
    ctx: &AppContext,
    id: &str,
    fields: AccountArgs,
    change_passphrase: bool,
) -> Result<()> {
    let mut request = UpdateAccountRequest {
        platform: fields.platform,
        identifier: fields.identifier,
        url: fields.url,
        notes: fields.notes,
        passphrase: None,
    };
    let client = ctx.authenticated()?;

    if change_passphrase {
        request.passphrase = Some(prompt::secret("New passphrase")?.to_string());
    }
    if request.is_empty() {
        bail!("nothing to update, pass at least one field or --change-passphrase");
    }

    let account = client.update_account(id, &request).await?;
    println!("Updated account {} ({}).", account.id, account.platform);
    Ok(())
}

pub async fn cmd_delete(ctx: &AppContext, id: &str) -> Result<()> {
    ctx.authenticated()?.delete_account(id).await?;
    println!("Deleted account {id}.");
    Ok(())
}

// ---------------------------------------------------------------------------
// Generators
// ---------------------------------------------------------------------------

pub async fn cmd_generate(ctx: &AppContext, length: u32) -> Result<()> {
    if length == 0 {
        bail!("length must be at least 1");
    }
    let generated = ctx.authenticated()?.generate(length).await?;
    println!("{generated}");
    Ok(())
}

pub async fn cmd_alternate(ctx: &AppContext, passphrase: &str) -> Result<()> {
    let alternative = ctx.authenticated()?.alternate(passphrase).await?;
    println!("{alternative}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Import / export
// ---------------------------------------------------------------------------

pub async fn cmd_import(ctx: &AppContext, file: &Path) -> Result<()> {
    if !file.is_file() {
        bail!("{} is not a file", file.display());
    }

    let result = ctx.authenticated()?.import_csv(file).await?;
    println!("Imported {} accounts.", result.success_count);
    if !result.failed_ones.is_empty() {
        eprintln!("{} rows could not be imported:", result.failed_ones.len());
        eprint!("{}", failed_import_table(&result));
    }
    Ok(())
}

fn failed_import_table(result: &ImportResponse) -> String {
    let rows: Vec<Vec<String>> = result
        .failed_ones
        .iter()
        .map(|f| vec![f.platform.clone(), f.identifier.clone(), f.url.clone()])
        .collect();
    table::render(&["Platform", "Identifier", "URL"], &rows, table::terminal_width())
}

pub async fn cmd_export(ctx: &AppContext, output: Option<&Path>) -> Result<()> {
    let csv = ctx.authenticated()?.export_csv().await?;

    match output {
        Some(path) => {
            write_private(path, &csv)?;
            println!("Exported to {}.", path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&csv)?;
            stdout.flush()?;
        }
    }
    Ok(())
}

/// Write `bytes` to `path` readable by the owner only.
fn write_private(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    file.write_all(bytes)
        .with_context(|| format!("failed to write {}", path.display()))?;
    file.sync_all()?;
    Ok(())
}
