//! The `gitusr` command line tool.
//!
//! Adds, lists, switches, updates and removes Git/SSH identities kept in the
//! encrypted store, and reports what is currently in effect.

use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};

use gitusr::sshkey::KeyRecovery;
use gitusr::{
    resolve, EnvKeyProvider, GitCli, GuardedAgent, IdentityField, IdentityStore, ListedIdentity,
    Selector, SshAgentCli, StatusReport, StoreConfig, Switcher,
};

type Store = IdentityStore<EnvKeyProvider>;

/// Width of the shortened id shown in listings. Any unique prefix is
/// accepted by `--id`.
const SHORT_ID_LEN: usize = 8;

// ── CLI structure ─────────────────────────────────────────────────────────────

/// Switch between Git and SSH identities.
#[derive(Parser, Debug)]
#[command(
    name = "gitusr",
    about = "Switch between Git and SSH identities",
    version,
    long_about = "gitusr manages several Git/SSH identities on one machine.\n\nIdentities are stored encrypted in ~/.gitusr/users.encrypted. Switching\nupdates the global Git user.name/user.email and loads the SSH key\ninto the running agent."
)]
struct Cli {
    /// Use this store file instead of ~/.gitusr/users.encrypted
    #[arg(long, global = true, value_name = "FILE")]
    store: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Exactly one way of naming an identity.
#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct SelectorArgs {
    /// Identity id (or a unique prefix of it)
    #[arg(long)]
    id: Option<String>,

    /// Email address; fails if several identities share it
    #[arg(long)]
    email: Option<String>,

    /// Nickname
    #[arg(long)]
    nickname: Option<String>,
}

impl SelectorArgs {
    fn selector(self) -> Selector {
        match (self.id, self.email, self.nickname) {
            (Some(id), _, _) => Selector::Id(id),
            (None, Some(email), _) => Selector::Email(email),
            (None, None, Some(nickname)) => Selector::Nickname(nickname),
            // clap enforces that one of the three is present
            (None, None, None) => Selector::Id(String::new()),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Add a new identity and make it active
    Add {
        /// Full name used for Git commits
        #[arg(long)]
        name: String,

        /// Email used for Git commits
        #[arg(long)]
        email: String,

        /// Path to the SSH private key
        #[arg(long, value_name = "PATH")]
        key: PathBuf,

        /// Short name to select the identity by
        #[arg(long)]
        nickname: Option<String>,

        /// Free-form description
        #[arg(long)]
        description: Option<String>,

        /// Only store the identity, do not switch to it
        #[arg(long)]
        no_activate: bool,
    },

    /// List all identities
    List {
        /// Show full ids, key paths and descriptions
        #[arg(long)]
        details: bool,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Make an identity active (Git config + SSH agent)
    Switch {
        #[command(flatten)]
        target: SelectorArgs,

        /// Remove every other key from the agent before loading this one
        #[arg(long)]
        exclusive: bool,
    },

    /// Delete an identity
    Remove {
        #[command(flatten)]
        target: SelectorArgs,
    },

    /// Change one field of an identity
    Update {
        #[command(flatten)]
        target: SelectorArgs,

        /// Field to change: name, email, nickname, description or key
        field: String,

        /// New value; omit to clear nickname or description
        value: Option<String>,
    },

    /// Show the active identity, Git config and SSH agent state
    Status {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Check that every identity's SSH key is present and unmodified
    Verify {
        /// Save recovered key locations
        #[arg(long)]
        fix: bool,

        /// Delete records that cannot be decrypted on this machine
        #[arg(long)]
        drop_unreadable: bool,
    },
}

// ── Main entry point ──────────────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = open_store(cli.store.clone()).and_then(|mut store| match cli.command {
        Commands::Add {
            name,
            email,
            key,
            nickname,
            description,
            no_activate,
        } => cmd_add(
            &mut store,
            &name,
            &email,
            key,
            nickname.as_deref(),
            description.as_deref(),
            !no_activate,
        ),
        Commands::List { details, json } => cmd_list(&store, details, json),
        Commands::Switch { target, exclusive } => {
            cmd_switch(&mut store, target.selector(), exclusive)
        }
        Commands::Remove { target } => cmd_remove(&mut store, target.selector()),
        Commands::Update {
            target,
            field,
            value,
        } => cmd_update(&mut store, target.selector(), &field, value.as_deref()),
        Commands::Status { json } => cmd_status(&store, json),
        Commands::Verify {
            fix,
            drop_unreadable,
        } => cmd_verify(&mut store, fix, drop_unreadable),
    });

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

/// `RUST_LOG` wins; otherwise only errors, or debug output with `-v`.
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "error" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp(None)
        .init();
}

fn open_store(path: Option<PathBuf>) -> Result<Store> {
    let config = match path {
        Some(path) => StoreConfig::with_store_file(path),
        None => StoreConfig::from_env().context("cannot locate the identity store")?,
    };
    log::debug!("using store {}", config.store_path.display());
    let store = IdentityStore::load(config, EnvKeyProvider);

    let report = store.load_report();
    if let Some(ref e) = report.file_error {
        eprintln!("warning: store file ignored: {e}");
    }
    if !report.skipped.is_empty() {
        eprintln!(
            "warning: {} identities could not be decrypted on this machine (see `gitusr verify`)",
            report.skipped.len()
        );
    }
    Ok(store)
}

fn switcher(exclusive: bool) -> Result<Switcher<'static, GitCli, SshAgentCli>> {
    let recovery = KeyRecovery::from_env().context("cannot search for moved SSH keys")?;
    Ok(Switcher::new(GitCli, GuardedAgent::new(SshAgentCli), recovery).exclusive(exclusive))
}

fn print_warnings(warnings: &[String]) {
    for warning in warnings {
        eprintln!("warning: {warning}");
    }
}

fn short_id(id: &str) -> &str {
    id.get(..SHORT_ID_LEN).unwrap_or(id)
}

// ── Command implementations ───────────────────────────────────────────────────

/// `gitusr add --name NAME --email EMAIL --key PATH [--nickname N] [--description D] [--no-activate]`
fn cmd_add(
    store: &mut Store,
    name: &str,
    email: &str,
    key: PathBuf,
    nickname: Option<&str>,
    description: Option<&str>,
    activate: bool,
) -> Result<()> {
    let added = store
        .add_identity_checked(name, email, &key, description, nickname)
        .context("failed to add identity")?;
    if let Some(ref warning) = added.permission_warning {
        eprintln!("warning: {warning}");
    }
    let identity = added.identity;

    println!("Added identity '{}'", identity.label());
    println!("  ID:    {}", identity.id);
    println!("  Name:  {}", identity.name);
    println!("  Email: {}", identity.email);
    println!("  Key:   {}", identity.ssh_key_path.display());

    if activate {
        let outcome = switcher(false)?.activate(store, identity.id.as_str())?;
        print_warnings(&outcome.warnings);
        println!("Switched to '{}'", outcome.identity.label());
    }
    Ok(())
}

/// `gitusr list [--details] [--json]`
fn cmd_list(store: &Store, details: bool, json: bool) -> Result<()> {
    let listed = store.list_identities();

    if json {
        let out = serde_json::to_string_pretty(&listed).context("failed to serialize list")?;
        println!("{out}");
        return Ok(());
    }

    if listed.is_empty() {
        println!("No identities found. Add one with `gitusr add`.");
        return Ok(());
    }

    println!("   {:<10} {:<16} {:<30} NAME", "ID", "NICKNAME", "EMAIL");
    println!("{}", "-".repeat(72));
    for entry in &listed {
        print_listed(entry, details);
    }
    Ok(())
}

fn print_listed(entry: &ListedIdentity, details: bool) {
    let marker = if entry.is_active { "*" } else { " " };
    println!(
        " {marker} {:<10} {:<16} {:<30} {}",
        short_id(entry.id.as_str()),
        entry.nickname.as_deref().unwrap_or("-"),
        entry.email,
        entry.name
    );
    if details {
        println!("     id:  {}", entry.id);
        println!("     key: {}", entry.ssh_key_path.display());
        if let Some(ref description) = entry.description {
            println!("     description: {description}");
        }
    }
}

/// `gitusr switch (--id ID | --email EMAIL | --nickname N) [--exclusive]`
fn cmd_switch(store: &mut Store, selector: Selector, exclusive: bool) -> Result<()> {
    let id = resolve(store, &selector)?.id.clone();
    let outcome = switcher(exclusive)?.activate(store, id.as_str())?;

    if outcome.already_active {
        println!("'{}' is already active", outcome.identity.label());
        return Ok(());
    }
    if let Some(ref path) = outcome.relocated_key {
        println!("SSH key found at new location: {}", path.display());
    }
    print_warnings(&outcome.warnings);

    let identity = &outcome.identity;
    println!("Switched to '{}'", identity.label());
    println!("  user.name  = {}", identity.name);
    println!("  user.email = {}", identity.email);
    println!("  key        = {}", identity.ssh_key_path.display());
    Ok(())
}

/// `gitusr remove (--id ID | --email EMAIL | --nickname N)`
fn cmd_remove(store: &mut Store, selector: Selector) -> Result<()> {
    let id = resolve(store, &selector)?.id.clone();
    let outcome = switcher(false)?.remove(store, id.as_str())?;
    print_warnings(&outcome.warnings);
    println!(
        "Removed identity '{}' <{}>",
        outcome.identity.label(),
        outcome.identity.email
    );
    Ok(())
}

/// `gitusr update (--id ID | --email EMAIL | --nickname N) FIELD [VALUE]`
fn cmd_update(store: &mut Store, selector: Selector, field: &str, value: Option<&str>) -> Result<()> {
    let id = resolve(store, &selector)?.id.clone();

    let changed = if field.eq_ignore_ascii_case("key") {
        let path = value.ok_or_else(|| anyhow!("a new key path is required"))?;
        store
            .update_ssh_key_path(id.as_str(), path)
            .context("failed to update SSH key")?
    } else {
        let field: IdentityField = field.parse()?;
        if field.is_required() && value.map(str::trim).unwrap_or_default().is_empty() {
            bail!("{field} cannot be empty");
        }
        store
            .update_field(id.as_str(), field, value)
            .with_context(|| format!("failed to update {field}"))?
    };

    if !changed {
        bail!("identity {id} was not updated");
    }
    let updated = store
        .get_identity(id.as_str())
        .ok_or_else(|| anyhow!("identity {id} disappeared"))?;
    println!("Updated '{}'", updated.label());

    if store.active_id() == Some(&updated.id) {
        println!("  This identity is active; run `gitusr switch` again to apply the change.");
    }
    Ok(())
}

/// `gitusr status [--json]`
fn cmd_status(store: &Store, json: bool) -> Result<()> {
    let report = StatusReport::collect(store, &GitCli, &SshAgentCli);

    if json {
        let out = serde_json::to_string_pretty(&report).context("failed to serialize status")?;
        println!("{out}");
        return Ok(());
    }

    println!("Status:");
    match report.active {
        Some(ref active) => {
            println!("  Active identity: {}", active.nickname.as_deref().unwrap_or(&active.name));
            println!("    ID:    {}", active.id);
            println!("    Name:  {}", active.name);
            println!("    Email: {}", active.email);
            println!("    Key:   {}", active.ssh_key_path.display());
        }
        None => println!("  Active identity: none"),
    }

    println!("  Git global config:");
    match report.git {
        Some(ref git) => {
            println!("    user.name  = {}", git.name.as_deref().unwrap_or("not set"));
            println!("    user.email = {}", git.email.as_deref().unwrap_or("not set"));
            if report.active.is_some() && !report.git_matches_active() {
                println!("    (does not match the active identity)");
            }
        }
        None => println!("    git is not available"),
    }

    println!("  SSH agent:");
    if report.agent.running {
        println!("    running, {} key(s) loaded", report.agent.loaded_keys.len());
        for label in &report.agent.loaded_keys {
            println!("      {label}");
        }
    } else {
        println!("    not running");
    }
    if let Some(ref socket) = report.agent.socket {
        println!("    socket: {}", socket.display());
    }

    println!("  Identities: {}", report.identity_count);
    if report.unreadable_count > 0 {
        println!("  Unreadable records: {}", report.unreadable_count);
    }
    Ok(())
}

/// `gitusr verify [--fix] [--drop-unreadable]`
fn cmd_verify(store: &mut Store, fix: bool, drop_unreadable: bool) -> Result<()> {
    let recovery = KeyRecovery::from_env().context("cannot search for moved SSH keys")?;

    let reports: Vec<_> = store
        .identities()
        .map(|identity| (identity.id.clone(), identity.label().to_string(), recovery.verify_integrity(identity)))
        .collect();

    if reports.is_empty() && store.unreadable_count() == 0 {
        println!("No identities to verify.");
        return Ok(());
    }

    let mut problems = 0;
    for (id, label, report) in &reports {
        let status = if report.valid { "ok" } else { "FAIL" };
        println!("{status:<5} {:<10} {label}: {}", short_id(id.as_str()), report.message);
        if !report.valid {
            problems += 1;
        }
        if let (true, Some(new_path)) = (fix, report.new_path.as_ref()) {
            store
                .update_ssh_key_path(id.as_str(), new_path)
                .with_context(|| format!("failed to save new key location for {label}"))?;
            println!("      saved new location {}", new_path.display());
        } else if report.new_path.is_some() {
            println!("      run with --fix to save the new location");
        }
    }

    let unreadable = store.unreadable_count();
    if unreadable > 0 {
        if drop_unreadable {
            let dropped = store.discard_unreadable()?;
            println!("Dropped {dropped} unreadable record(s).");
        } else {
            problems += unreadable;
            println!("{unreadable} record(s) cannot be decrypted on this machine; --drop-unreadable deletes them.");
        }
    }

    if problems > 0 {
        bail!("{problems} problem(s) found");
    }
    Ok(())
}
