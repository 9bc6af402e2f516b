//! Approval and registration commands.

use crate::error::{self, ConsoleError};
use keygate_core::DirectoryUserId;
use keygate_directory::{DirectoryClient, DirectoryEntry, NewAccount};
use tracing::info;

pub async fn pending(client: &DirectoryClient) -> keygate_core::Result<(), ConsoleError> {
    let entries = client.pending_approvals().await.map_err(error::directory)?;
    if entries.is_empty() {
        println!("No accounts are awaiting approval.");
        return Ok(());
    }
    println!("{}", render_entries(&entries));
    Ok(())
}

pub async fn approve(
    client: &DirectoryClient,
    user_id: &DirectoryUserId,
) -> keygate_core::Result<(), ConsoleError> {
    let user = client.get_user(user_id).await.map_err(error::directory)?;
    if user.enabled {
        println!("{} is already enabled.", user.username);
        return Ok(());
    }
    let approved = client.approve_user(&user).await.map_err(error::directory)?;
    info!(user_id = %approved.id, "approved from console");
    println!("Approved {}.", approved.username);
    Ok(())
}

pub async fn register(
    client: &DirectoryClient,
    account: &NewAccount,
) -> keygate_core::Result<(), ConsoleError> {
    let id = client
        .register_user(account)
        .await
        .map_err(error::directory)?;
    println!("Registered {} ({id}).", account.phone_number);
    if !account.enabled {
        println!("The account stays disabled until an administrator approves it.");
    }
    Ok(())
}

fn render_entries(entries: &[DirectoryEntry]) -> String {
    let width = entries
        .iter()
        .map(|entry| entry.username.len())
        .max()
        .unwrap_or(0);
    entries
        .iter()
        .map(|entry| {
            let groups = entry
                .groups
                .iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(", ");
            format!("{:<width$}  {}  [{groups}]", entry.username, entry.id)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_render_one_per_line_with_groups() {
        let mut first = DirectoryEntry::new("u1".parse().expect("id"), "9876543210", false);
        first.groups.insert("Guest".to_string());
        first.groups.insert("South".to_string());
        let second = DirectoryEntry::new("u2".parse().expect("id"), "42", false);

        let rendered = render_entries(&[first, second]);

        assert_eq!(
            rendered,
            "9876543210  u1  [Guest, South]\n42          u2  []"
        );
    }
}
