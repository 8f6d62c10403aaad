//! Interactive login onto a machine.

use hackshell_types::config::ShellConfig;
use hackshell_types::error::{Result, ShellError};
use hackshell_vfs::password::{hash_password, verify_password};
use hackshell_vfs::{Journal, MachineStore, UserRecord, path};

use crate::prompt::Prompt;
use crate::session::Session;

/// Name and password of the account created on a machine without users.
pub const DEFAULT_ROOT: (&str, &str) = ("root", "password");

/// Create the default root account when `machine_id` has no users.
/// Returns whether an account was created.
pub fn ensure_default_root(
    store: &dyn MachineStore,
    config: &ShellConfig,
    machine_id: &str,
) -> Result<bool> {
    let mut machine = store.load(machine_id);
    if !machine.meta_data.users.is_empty() {
        return Ok(false);
    }
    let (name, password) = DEFAULT_ROOT;
    machine
        .meta_data
        .users
        .insert(name.to_string(), UserRecord::root(hash_password(password)));
    store.save(machine_id, &machine)?;
    log::info!("created default root account on {machine_id}");
    Journal::new(store, machine_id, config.log).log_system(
        "DEFAULT_USER_CREATED",
        &format!("{name} with the default password"),
    );
    Ok(true)
}

/// Prompt for credentials until one pair verifies or the attempts run out.
pub fn login(
    store: &dyn MachineStore,
    config: &ShellConfig,
    machine_id: &str,
    prompt: &mut dyn Prompt,
) -> Result<Session> {
    if ensure_default_root(store, config, machine_id)? {
        let (name, password) = DEFAULT_ROOT;
        prompt.message(&format!(
            "No accounts found. Log in as '{name}' with password '{password}' and change it with passwd."
        ));
    }
    let journal = Journal::new(store, machine_id, config.log);
    let attempts = config.login_attempts.max(1);
    for attempt in 1..=attempts {
        let Some(user) = prompt.read_line("login: ") else {
            break;
        };
        let user = user.trim().to_string();
        let password = prompt.read_secret("Password: ").unwrap_or_default();
        let machine = store.load(machine_id);
        let verified = machine
            .user(&user)
            .filter(|record| verify_password(&password, &record.password));
        if let Some(record) = verified {
            journal.log_login(&user, true, None);
            let home = path::resolve(&record.home, "/");
            let cwd = if !record.home.is_empty() && machine.file_system.is_dir(&home) {
                path::display(&home)
            } else {
                config.start_dir.clone()
            };
            return Ok(Session::new(
                machine_id,
                &user,
                record.is_root,
                &cwd,
                machine.meta_data.clone(),
            ));
        }
        journal.log_login(&user, false, None);
        if attempt < attempts {
            prompt.message("Login incorrect");
        }
    }
    Err(ShellError::AuthFailure(format!(
        "too many failed login attempts on {machine_id}"
    )))
}
