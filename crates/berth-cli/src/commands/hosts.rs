use std::time::Duration;

use serde::Serialize;

use berth_cluster::{Member, MemberStatus, MembershipManager};
use berth_state::{HostMode, SnapshotStore};

#[derive(Debug, Serialize)]
struct HostRow<'a> {
    id: &'a str,
    host_name: &'a str,
    address: String,
    mode: &'static str,
    status: &'static str,
    last_heartbeat: u64,
}

pub fn hosts(store: &SnapshotStore, dead_timeout: Duration, format: &str) -> anyhow::Result<()> {
    let members = MembershipManager::new(store.clone())
        .with_dead_timeout(dead_timeout)
        .list_members()?;
    println!("{}", render_hosts(&members, format)?);
    Ok(())
}

fn render_hosts(members: &[Member], format: &str) -> anyhow::Result<String> {
    let rows: Vec<_> = members
        .iter()
        .map(|m| HostRow {
            id: &m.host.id,
            host_name: &m.host.host_name,
            address: format!("{}:{}", m.host.address, m.host.port),
            mode: match m.host.mode {
                HostMode::Leader => "leader",
                HostMode::Follower => "follower",
            },
            status: match m.status {
                MemberStatus::Ready => "ready",
                MemberStatus::Dead => "dead",
            },
            last_heartbeat: m.host.last_heartbeat,
        })
        .collect();

    if format == "json" {
        return Ok(serde_json::to_string_pretty(&rows)?);
    }
    let mut lines = vec![format!(
        "{:<18} {:<20} {:<21} {:<9} {:<6}",
        "ID", "NAME", "ADDRESS", "MODE", "STATUS"
    )];
    for row in &rows {
        lines.push(format!(
            "{:<18} {:<20} {:<21} {:<9} {:<6}",
            row.id, row.host_name, row.address, row.mode, row.status
        ));
    }
    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use berth_state::HostInfo;

    fn member(id: &str, mode: HostMode, status: MemberStatus) -> Member {
        Member {
            host: HostInfo {
                id: id.to_string(),
                host_name: format!("{id}.local"),
                address: "10.0.0.1".to_string(),
                port: 2666,
                mode,
                labels: BTreeMap::new(),
                last_heartbeat: 1000,
            },
            status,
        }
    }

    #[test]
    fn renders_mode_and_liveness() {
        let members = vec![
            member("host-a", HostMode::Leader, MemberStatus::Ready),
            member("host-b", HostMode::Follower, MemberStatus::Dead),
        ];

        let text = render_hosts(&members, "text").unwrap();
        let rows: Vec<_> = text.lines().skip(1).collect();
        assert!(rows[0].contains("leader") && rows[0].contains("ready"));
        assert!(rows[1].contains("follower") && rows[1].contains("dead"));
        assert!(rows[0].contains("10.0.0.1:2666"));

        let json: serde_json::Value =
            serde_json::from_str(&render_hosts(&members, "json").unwrap()).unwrap();
        assert_eq!(json[1]["status"], "dead");
    }
}
