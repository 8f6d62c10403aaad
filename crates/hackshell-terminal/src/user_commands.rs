//! Account commands: whoami, groups, users, useradd, userdel, passwd.

use hackshell_types::error::{Result, ShellError};
use hackshell_vfs::UserRecord;
use hackshell_vfs::password::{hash_password, verify_password};

use crate::interpreter::{Command, CommandOutput, CommandRegistry, Environment};
use crate::prompt::Prompt;

pub fn register_user_commands(reg: &mut CommandRegistry) -> Result<()> {
    reg.register(Box::new(WhoamiCmd));
    reg.register(Box::new(GroupsCmd));
    reg.register(Box::new(UsersCmd));
    reg.register(Box::new(UseraddCmd));
    reg.register(Box::new(UserdelCmd));
    reg.register(Box::new(PasswdCmd));
    Ok(())
}

fn require_root(env: &Environment<'_>, action: &str) -> Result<()> {
    if env.is_root {
        Ok(())
    } else {
        Err(ShellError::Unauthorized(format!("only root can {action}")))
    }
}

/// Ask for a new password twice. Both answers must match and be non-empty.
fn read_new_password(prompt: &mut dyn Prompt) -> Result<String> {
    let first = prompt
        .read_secret("New password: ")
        .ok_or_else(|| ShellError::AuthFailure("no password given".to_string()))?;
    if first.is_empty() {
        return Err(ShellError::Command("password cannot be empty".to_string()));
    }
    let second = prompt
        .read_secret("Retype new password: ")
        .ok_or_else(|| ShellError::AuthFailure("no password given".to_string()))?;
    if first != second {
        return Err(ShellError::AuthFailure("passwords do not match".to_string()));
    }
    Ok(first)
}

fn valid_username(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 32
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        && !name.starts_with('-')
}

// ---------------------------------------------------------------------------
// whoami / groups / users
// ---------------------------------------------------------------------------

struct WhoamiCmd;
impl Command for WhoamiCmd {
    fn name(&self) -> &str {
        "whoami"
    }
    fn description(&self) -> &str {
        "Print the current user"
    }
    fn usage(&self) -> &str {
        "whoami"
    }
    fn category(&self) -> &str {
        "users"
    }
    fn execute(&self, _args: &[&str], env: &mut Environment<'_>) -> Result<CommandOutput> {
        Ok(CommandOutput::Text(env.user().to_string()))
    }
}

struct GroupsCmd;
impl Command for GroupsCmd {
    fn name(&self) -> &str {
        "groups"
    }
    fn description(&self) -> &str {
        "Print a user's group"
    }
    fn usage(&self) -> &str {
        "groups [user]"
    }
    fn category(&self) -> &str {
        "users"
    }
    fn execute(&self, args: &[&str], env: &mut Environment<'_>) -> Result<CommandOutput> {
        let user = args.first().copied().unwrap_or(env.user());
        if user != env.user() && !env.is_root {
            return Err(ShellError::Unauthorized(format!(
                "cannot view groups of {user}"
            )));
        }
        let record = env
            .session
            .meta
            .users
            .get(user)
            .ok_or_else(|| ShellError::NotFound(format!("user {user}")))?;
        Ok(CommandOutput::Text(format!("{user} : {}", record.group)))
    }
}

struct UsersCmd;
impl Command for UsersCmd {
    fn name(&self) -> &str {
        "users"
    }
    fn description(&self) -> &str {
        "List accounts on this machine"
    }
    fn usage(&self) -> &str {
        "users"
    }
    fn category(&self) -> &str {
        "users"
    }
    fn execute(&self, _args: &[&str], env: &mut Environment<'_>) -> Result<CommandOutput> {
        let names: Vec<&str> = env.session.meta.users.keys().map(String::as_str).collect();
        Ok(CommandOutput::Text(names.join("\n")))
    }
}

// ---------------------------------------------------------------------------
// useradd / userdel
// ---------------------------------------------------------------------------

struct UseraddCmd;
impl Command for UseraddCmd {
    fn name(&self) -> &str {
        "useradd"
    }
    fn description(&self) -> &str {
        "Create an account"
    }
    fn usage(&self) -> &str {
        "useradd <name> [--root]"
    }
    fn category(&self) -> &str {
        "users"
    }
    fn execute(&self, args: &[&str], env: &mut Environment<'_>) -> Result<CommandOutput> {
        require_root(env, "add users")?;
        let (name, root) = match args {
            [name] => (*name, false),
            [name, "--root"] | ["--root", name] => (*name, true),
            _ => return Err(ShellError::Command(format!("usage: {}", self.usage()))),
        };
        if !valid_username(name) {
            return Err(ShellError::Command(format!("invalid user name '{name}'")));
        }
        let mut fs = env.fs();
        if fs.machine().user(name).is_some() {
            return Err(ShellError::AlreadyExists(format!("user {name}")));
        }
        let password = read_new_password(env.prompt)?;
        let id = 1000 + u32::try_from(fs.machine().meta_data.users.len()).unwrap_or(0);
        let record = UserRecord::regular(name, hash_password(&password), id, root);
        let home = hackshell_vfs::path::resolve(&record.home, "/");
        let machine = fs.machine_mut();
        machine.meta_data.users.insert(name.to_string(), record);
        machine.file_system.ensure_dir(&home)?;
        fs.flush()?;
        env.journal().log_system("USER_CREATED", &format!("{name} by {}", env.user()));
        Ok(CommandOutput::Text(format!("User {name} created")))
    }
}

struct UserdelCmd;
impl Command for UserdelCmd {
    fn name(&self) -> &str {
        "userdel"
    }
    fn description(&self) -> &str {
        "Delete an account"
    }
    fn usage(&self) -> &str {
        "userdel <name>"
    }
    fn category(&self) -> &str {
        "users"
    }
    fn execute(&self, args: &[&str], env: &mut Environment<'_>) -> Result<CommandOutput> {
        require_root(env, "delete users")?;
        let [name] = args else {
            return Err(ShellError::Command(format!("usage: {}", self.usage())));
        };
        if *name == env.user() {
            return Err(ShellError::Command("cannot delete the current user".to_string()));
        }
        let mut fs = env.fs();
        if fs.machine().user(name).is_none() {
            return Err(ShellError::NotFound(format!("user {name}")));
        }
        if !env.prompt.confirm(&format!("Delete user {name}? [y/N] ")) {
            return Ok(CommandOutput::Text("Aborted".to_string()));
        }
        fs.machine_mut().meta_data.users.remove(*name);
        fs.flush()?;
        env.journal().log_system("USER_DELETED", &format!("{name} by {}", env.user()));
        Ok(CommandOutput::Text(format!("User {name} deleted")))
    }
}

// ---------------------------------------------------------------------------
// passwd
// ---------------------------------------------------------------------------

struct PasswdCmd;
impl Command for PasswdCmd {
    fn name(&self) -> &str {
        "passwd"
    }
    fn description(&self) -> &str {
        "Change a password"
    }
    fn usage(&self) -> &str {
        "passwd [user]"
    }
    fn category(&self) -> &str {
        "users"
    }
    fn execute(&self, args: &[&str], env: &mut Environment<'_>) -> Result<CommandOutput> {
        let target = args.first().copied().unwrap_or(env.user()).to_string();
        if target != env.user() && !env.is_root {
            return Err(ShellError::Unauthorized(format!(
                "cannot change the password of {target}"
            )));
        }
        let mut fs = env.fs();
        let current = fs
            .machine()
            .user(&target)
            .map(|r| r.password.clone())
            .ok_or_else(|| ShellError::NotFound(format!("user {target}")))?;
        if !env.is_root {
            let given = env.prompt.read_secret("Current password: ").unwrap_or_default();
            if !verify_password(&given, &current) {
                env.journal().log_auth(&target, "PASSWD", false);
                return Err(ShellError::AuthFailure("incorrect password".to_string()));
            }
        }
        let password = read_new_password(env.prompt)?;
        if let Some(record) = fs.machine_mut().meta_data.users.get_mut(&target) {
            record.password = hash_password(&password);
        }
        fs.flush()?;
        env.journal().log_auth(&target, "PASSWD", true);
        Ok(CommandOutput::Text(format!("Password updated for {target}")))
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::{ALICE_PW, ROOT_PW, fail, run, shell};
    use hackshell_vfs::password::verify_password;

    #[test]
    fn whoami_groups_users() {
        let mut sh = shell("alice", &[]);
        assert_eq!(run(&mut sh, "whoami"), "alice");
        assert_eq!(run(&mut sh, "groups"), "alice : users");
        assert!(fail(&mut sh, "groups root").contains("permission denied"));
        assert_eq!(run(&mut sh, "users"), "alice\nroot");
    }

    #[test]
    fn useradd_creates_record_and_home() {
        let mut sh = shell("root", &["pw1", "pw1"]);
        assert_eq!(run(&mut sh, "useradd bob"), "User bob created");
        let machine = sh.store().load("local");
        let bob = machine.user("bob").unwrap();
        assert_eq!(bob.home, "/home/bob");
        assert_eq!(bob.group, "users");
        assert_eq!(bob.uid, 1002);
        assert_eq!(bob.permissions, vec!["home", "public"]);
        assert!(verify_password("pw1", &bob.password));
        assert!(machine.file_system.is_dir(&["home", "bob"]));
        // Session metadata is refreshed after the command.
        assert_eq!(run(&mut sh, "users"), "alice\nbob\nroot");
    }

    #[test]
    fn useradd_root_flag_and_failures() {
        let mut sh = shell("root", &["x", "y", "z", "z"]);
        assert!(fail(&mut sh, "useradd carol").contains("do not match"));
        assert_eq!(run(&mut sh, "useradd carol --root"), "User carol created");
        let carol = sh.store().load("local").user("carol").cloned().unwrap();
        assert!(carol.is_root);
        assert_eq!(carol.permissions, vec!["all"]);
        assert!(fail(&mut sh, "useradd alice").contains("already exists"));
        assert!(fail(&mut sh, "useradd ../x").contains("invalid user name"));
    }

    #[test]
    fn useradd_requires_root() {
        let mut sh = shell("alice", &[]);
        assert!(fail(&mut sh, "useradd mallory").contains("only root"));
    }

    #[test]
    fn userdel_confirms() {
        let mut sh = shell("root", &["n", "y"]);
        assert_eq!(run(&mut sh, "userdel alice"), "Aborted");
        assert_eq!(run(&mut sh, "userdel alice"), "User alice deleted");
        assert!(sh.store().load("local").user("alice").is_none());
        assert!(fail(&mut sh, "userdel root").contains("current user"));
        assert!(fail(&mut sh, "userdel ghost").contains("not found"));
    }

    #[test]
    fn passwd_own_needs_current() {
        let mut sh = shell("alice", &["wrong", ALICE_PW, "new", "new"]);
        assert!(fail(&mut sh, "passwd").contains("incorrect password"));
        assert_eq!(run(&mut sh, "passwd"), "Password updated for alice");
        let alice = sh.store().load("local").user("alice").cloned().unwrap();
        assert!(verify_password("new", &alice.password));
        assert!(fail(&mut sh, "passwd root").contains("permission denied"));
    }

    #[test]
    fn root_sets_any_password() {
        let mut sh = shell("root", &["fresh", "fresh"]);
        assert_eq!(run(&mut sh, "passwd alice"), "Password updated for alice");
        let alice = sh.store().load("local").user("alice").cloned().unwrap();
        assert!(verify_password("fresh", &alice.password));
        let root = sh.store().load("local").user("root").cloned().unwrap();
        assert!(verify_password(ROOT_PW, &root.password));
    }
}
