//! First-run machine setup.

use hackshell_types::error::Result;
use hackshell_vfs::password::hash_password;
use hackshell_vfs::{Machine, MachineFs, MachineStore, Node, UserRecord, path};

/// Address of the web host installed next to the local machine.
pub const TARGET_IP: &str = "10.10.10.10";

/// Build a record with the given directories and `/bin` markers.
fn skeleton(name: &str, ip: &str, dirs: &[&str], commands: &[&str]) -> Result<Machine> {
    let mut machine = Machine::new(name, ip);
    let tree = &mut machine.file_system;
    for dir in dirs {
        tree.ensure_dir(&path::resolve(dir, "/"))?;
    }
    let bin = tree.ensure_dir(&["bin"])?;
    for command in commands {
        bin.insert(command.to_string(), Node::Command);
    }
    Ok(machine)
}

/// Save `machine` under `id` and write its files.
fn install_machine(
    store: &dyn MachineStore,
    id: &str,
    machine: &Machine,
    files: &[(&str, &str)],
) -> Result<()> {
    store.save(id, machine)?;
    let mut fs = MachineFs::open(store, id);
    for (file, text) in files {
        fs.write(&path::resolve(file, "/"), text)?;
    }
    log::info!("installed {id} ({} files)", files.len());
    Ok(())
}

/// Install the local machine under `local_id` and the web host at
/// [`TARGET_IP`]. Existing records are overwritten.
///
/// The local machine starts without accounts, so the first login creates
/// the default root account.
pub fn install(store: &dyn MachineStore, local_id: &str, commands: &[&str]) -> Result<()> {
    let local = skeleton(
        "devbox",
        "192.168.1.100",
        &[
            "/etc",
            "/home/public",
            "/root",
            "/tmp",
            "/usr/share",
            "/var/log",
        ],
        commands,
    )?;
    install_machine(
        store,
        local_id,
        &local,
        &[
            ("/etc/hostname", "devbox"),
            (
                "/home/public/README.txt",
                "Welcome to devbox.\nType 'help' to list the commands installed in /bin.",
            ),
            (
                "/root/todo.txt",
                "- scan the 10.10.10.0/24 range\n- ask the web team why admin never changed the default password",
            ),
        ],
    )?;

    let mut web = skeleton(
        "webserver",
        TARGET_IP,
        &[
            "/etc",
            "/home/admin",
            "/home/public",
            "/root",
            "/tmp",
            "/var/log",
            "/var/www/html",
        ],
        commands,
    )?;
    web.meta_data.ports = vec![22, 80, 443];
    let users = &mut web.meta_data.users;
    users.insert(
        "root".to_string(),
        UserRecord::root(hash_password("w3bR00t!2024")),
    );
    users.insert(
        "admin".to_string(),
        UserRecord::regular("admin", hash_password("admin123"), 1000, false),
    );
    install_machine(
        store,
        TARGET_IP,
        &web,
        &[
            ("/etc/hostname", "webserver"),
            (
                "/var/www/html/index.html",
                "<html>\n<!-- TODO: rotate the admin123 credentials before launch -->\n<body>Under construction</body>\n</html>",
            ),
            (
                "/home/admin/notes.txt",
                "Backups run nightly from /root.\nflag{welcome_to_the_webserver}",
            ),
            ("/root/backup.key", "flag{root_of_all_evil}"),
        ],
    )?;
    Ok(())
}
