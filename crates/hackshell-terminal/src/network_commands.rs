//! Simulated network commands: nmap, ssh.
//!
//! Hosts are machine records addressed by id. Nothing here touches a real
//! network; both commands leave traces in the audit journals of the
//! scanning and the scanned machine.

use hackshell_types::error::{Result, ShellError};
use hackshell_vfs::password::verify_password;
use hackshell_vfs::{Machine, path};

use crate::interpreter::{Command, CommandOutput, CommandRegistry, Environment};
use crate::style;

pub fn register_network_commands(reg: &mut CommandRegistry) -> Result<()> {
    reg.register(Box::new(NmapCmd));
    reg.register(Box::new(SshCmd));
    Ok(())
}

/// Well-known service name for `port`.
pub fn service_name(port: u16) -> &'static str {
    match port {
        21 => "ftp",
        22 => "ssh",
        23 => "telnet",
        25 => "smtp",
        53 => "domain",
        80 => "http",
        110 => "pop3",
        143 => "imap",
        443 => "https",
        3306 => "mysql",
        3389 => "ms-wbt-server",
        5432 => "postgresql",
        8080 => "http-proxy",
        _ => "unknown",
    }
}

/// Load a host that exists in the store.
fn find_host(env: &Environment<'_>, ip: &str) -> Option<Machine> {
    env.store.exists(ip).then(|| env.store.load(ip))
}

/// Address the local machine presents to other hosts.
fn local_ip(env: &Environment<'_>) -> String {
    if env.session.meta.ip.is_empty() {
        env.machine_id().to_string()
    } else {
        env.session.meta.ip.clone()
    }
}

// ---------------------------------------------------------------------------
// nmap
// ---------------------------------------------------------------------------

struct NmapCmd;
impl Command for NmapCmd {
    fn name(&self) -> &str {
        "nmap"
    }
    fn description(&self) -> &str {
        "Scan a host for open ports"
    }
    fn usage(&self) -> &str {
        "nmap <ip> [-f|--file]"
    }
    fn category(&self) -> &str {
        "network"
    }
    fn execute(&self, args: &[&str], env: &mut Environment<'_>) -> Result<CommandOutput> {
        let save = args.iter().any(|a| matches!(*a, "-f" | "--file"));
        let targets: Vec<&str> = args.iter().copied().filter(|a| !a.starts_with('-')).collect();
        let [ip] = targets.as_slice() else {
            return Err(ShellError::Command(format!("usage: {}", self.usage())));
        };
        let host = find_host(env, ip)
            .ok_or_else(|| ShellError::Command(format!("Host {ip} seems down")))?;

        let mut ports = host.meta_data.ports.clone();
        ports.sort_unstable();
        ports.dedup();
        let source = local_ip(env);
        env.journal().log_network(&source, ip, "SCAN", &ports);
        if *ip != env.machine_id() {
            env.journal_for(ip).log_network(&source, ip, "SCAN", &ports);
        }

        let mut report = vec![format!("Nmap scan report for {} ({ip})", host.meta_data.name)];
        if ports.is_empty() {
            report.push("All scanned ports are closed".to_string());
        } else {
            report.push(format!("{:<10}{:<7}SERVICE", "PORT", "STATE"));
            for port in &ports {
                report.push(format!(
                    "{:<10}{:<7}{}",
                    format!("{port}/tcp"),
                    "open",
                    service_name(*port)
                ));
            }
        }
        let plain_report = report.join("\n");

        let plain = env.plain();
        let mut out = report
            .iter()
            .enumerate()
            .map(|(i, line)| {
                if i == 1 && !ports.is_empty() {
                    style::header(line, plain)
                } else {
                    line.clone()
                }
            })
            .collect::<Vec<_>>()
            .join("\n");
        if save {
            let file = env.resolve(&format!("nmap_scan_{ip}.txt"));
            env.fs().write(&file, &plain_report)?;
            if !plain {
                out.push_str(&format!("\nResults saved to {}", path::display(&file)));
            }
        }
        Ok(CommandOutput::Text(out))
    }
}

// ---------------------------------------------------------------------------
// ssh
// ---------------------------------------------------------------------------

struct SshCmd;
impl Command for SshCmd {
    fn name(&self) -> &str {
        "ssh"
    }
    fn description(&self) -> &str {
        "Log in to a remote host"
    }
    fn usage(&self) -> &str {
        "ssh [user@]<ip>"
    }
    fn category(&self) -> &str {
        "network"
    }
    fn execute(&self, args: &[&str], env: &mut Environment<'_>) -> Result<CommandOutput> {
        let [target] = args else {
            return Err(ShellError::Command(format!("usage: {}", self.usage())));
        };
        let (user, ip) = match target.split_once('@') {
            Some((user, ip)) if !user.is_empty() && !ip.is_empty() => (user.to_string(), ip),
            Some(_) => return Err(ShellError::Command(format!("usage: {}", self.usage()))),
            None => (env.user().to_string(), *target),
        };
        let host = find_host(env, ip).ok_or_else(|| {
            ShellError::Command(format!("connect to host {ip} port 22: No route to host"))
        })?;
        if !host.has_port(22) {
            return Err(ShellError::Command(format!(
                "connect to host {ip} port 22: Connection refused"
            )));
        }
        let record = host.user(&user);
        let expected = record
            .map(|r| r.password.clone())
            .or_else(|| host.meta_data.password.clone())
            .unwrap_or_default();
        let source = local_ip(env);
        let remote = env.journal_for(ip);

        let attempts = env.config.ssh_attempts.max(1);
        let mut granted = false;
        for attempt in 1..=attempts {
            let Some(answer) = env.prompt.read_secret(&format!("{user}@{ip}'s password: ")) else {
                break;
            };
            if verify_password(&answer, &expected) {
                granted = true;
                break;
            }
            remote.log_login(&user, false, Some(&source));
            if attempt < attempts {
                env.prompt.message("Permission denied, please try again.");
            }
        }
        if !granted {
            return Err(ShellError::AuthFailure(format!("{user}@{ip}: permission denied")));
        }

        remote.log_login(&user, true, Some(&source));
        remote.log_network(&source, ip, "CONNECT", &[22]);
        env.journal().log_network(&source, ip, "CONNECT", &[22]);
        Ok(CommandOutput::Connect {
            machine_id: ip.to_string(),
            user,
            is_root: record.is_some_and(|r| r.is_root),
        })
    }
}
