//! Pure renderers for the files the trust configurator writes remotely.

use std::borrow::Cow;
use std::collections::BTreeSet;

use shell_escape::unix::escape;

use super::ClusterNode;

/// Quotes `value` for a POSIX shell.
pub(crate) fn quote(value: &str) -> String {
    escape(Cow::Borrowed(value)).into_owned()
}

/// Rewrites a hosts file so every cluster hostname resolves to its private
/// address.
///
/// Lines mapping any cluster hostname are dropped; every other line,
/// including comments and blank lines, is kept in place. One
/// `private_ip<TAB>hostname` entry per node is appended.
#[must_use]
pub fn rewrite_hosts(existing: &str, nodes: &[ClusterNode]) -> String {
    let names: BTreeSet<&str> = nodes.iter().map(|node| node.hostname.as_str()).collect();
    let mut lines: Vec<&str> = existing
        .lines()
        .filter(|line| !maps_any(line, &names))
        .collect();
    while lines.last().is_some_and(|line| line.trim().is_empty()) {
        lines.pop();
    }

    let mut rendered = String::new();
    for line in lines {
        rendered.push_str(line);
        rendered.push('\n');
    }
    for node in nodes {
        rendered.push_str(&format!("{}\t{}\n", node.private_ip, node.hostname));
    }
    rendered
}

fn maps_any(line: &str, names: &BTreeSet<&str>) -> bool {
    let content = line.split_once('#').map_or(line, |(head, _)| head);
    let mut fields = content.split_whitespace();
    fields.next().is_some() && fields.any(|field| names.contains(field))
}

/// Returns the new `authorized_keys` contents with `key` appended, or `None`
/// when the key is already present.
#[must_use]
pub fn merge_authorized_key(existing: &str, key: &str) -> Option<String> {
    let trimmed = key.trim();
    if existing.contains(trimmed) {
        return None;
    }
    let mut updated = existing.to_owned();
    if !updated.is_empty() && !updated.ends_with('\n') {
        updated.push('\n');
    }
    updated.push_str(trimmed);
    updated.push('\n');
    Some(updated)
}

/// Client configuration that makes intra-cluster SSH non-interactive and
/// uses the cluster key.
#[must_use]
pub fn ssh_client_config(remote_key_name: &str) -> String {
    format!(
        "Host *\n    StrictHostKeyChecking no\n    UserKnownHostsFile /dev/null\n    LogLevel ERROR\n    ConnectTimeout 5\n    IdentityFile ~/.ssh/{remote_key_name}\n"
    )
}

/// Shell command that replaces `path` with `contents` through `tee`,
/// optionally with `sudo`, then applies `mode` when given.
#[must_use]
pub fn write_file_command(path: &str, contents: &str, mode: Option<&str>, sudo: bool) -> String {
    let elevate = if sudo { "sudo " } else { "" };
    let lines: Vec<String> = contents.lines().map(quote).collect();
    let producer = if lines.is_empty() {
        String::from("printf ''")
    } else {
        format!("printf '%s\\n' {}", lines.join(" "))
    };
    let target = quote(path);
    let mut command = format!("{producer} | {elevate}tee {target} >/dev/null");
    if let Some(bits) = mode {
        command.push_str(&format!(" && {elevate}chmod {bits} {target}"));
    }
    command
}
