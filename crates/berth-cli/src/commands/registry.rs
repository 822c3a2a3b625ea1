use anyhow::{anyhow, bail};
use serde::Serialize;

use berth_state::{ContainerStatus, Snapshot, SnapshotStore};

#[derive(Debug, Default, Serialize, PartialEq, Eq)]
struct StatusCounts {
    unloaded: usize,
    loading: usize,
    loaded: usize,
}

#[derive(Debug, Serialize)]
struct Summary<'a> {
    cluster_id: Option<&'a str>,
    applications: usize,
    containers: StatusCounts,
}

pub fn show(store: &SnapshotStore, format: &str) -> anyhow::Result<()> {
    println!("{}", render_show(&store.read_snapshot()?, format)?);
    Ok(())
}

pub fn apps(store: &SnapshotStore, format: &str) -> anyhow::Result<()> {
    println!("{}", render_apps(&store.read_snapshot()?, format)?);
    Ok(())
}

pub fn containers(store: &SnapshotStore, application: &str, format: &str) -> anyhow::Result<()> {
    println!(
        "{}",
        render_containers(&store.read_snapshot()?, application, format)?
    );
    Ok(())
}

pub fn cluster_id(store: &SnapshotStore) -> anyhow::Result<()> {
    let id = store
        .cluster_id()?
        .ok_or_else(|| anyhow!("cluster id not generated yet"))?;
    println!("{id}");
    Ok(())
}

fn render_show(snapshot: &Snapshot, format: &str) -> anyhow::Result<String> {
    let mut counts = StatusCounts::default();
    for container in snapshot.applications.values().flat_map(|a| &a.containers) {
        match container.status {
            ContainerStatus::Unloaded => counts.unloaded += 1,
            ContainerStatus::Loading => counts.loading += 1,
            ContainerStatus::Loaded => counts.loaded += 1,
        }
    }
    let summary = Summary {
        cluster_id: snapshot.cluster_id.as_deref(),
        applications: snapshot.applications.len(),
        containers: counts,
    };

    if format == "json" {
        return Ok(serde_json::to_string_pretty(&summary)?);
    }
    let c = &summary.containers;
    Ok(format!(
        "cluster id:    {}\napplications:  {}\ncontainers:    {} (loaded {}, loading {}, unloaded {})",
        summary.cluster_id.unwrap_or("(none)"),
        summary.applications,
        c.loaded + c.loading + c.unloaded,
        c.loaded,
        c.loading,
        c.unloaded,
    ))
}

fn render_apps(snapshot: &Snapshot, format: &str) -> anyhow::Result<String> {
    if format == "json" {
        return Ok(serde_json::to_string_pretty(&snapshot.applications)?);
    }
    let mut lines = vec![format!(
        "{:<24} {:>6} {:>10} {:>10}",
        "NAME", "PORT", "DISCOVERY", "CONTAINERS"
    )];
    for app in snapshot.applications.values() {
        lines.push(format!(
            "{:<24} {:>6} {:>10} {:>10}",
            app.id,
            app.port.map_or_else(|| "-".to_string(), |p| p.to_string()),
            app.discovery_port,
            app.containers.len(),
        ));
    }
    Ok(lines.join("\n"))
}

fn render_containers(snapshot: &Snapshot, application: &str, format: &str) -> anyhow::Result<String> {
    let Some(app) = snapshot.applications.get(application) else {
        bail!("application not found: {application}");
    };
    if format == "json" {
        return Ok(serde_json::to_string_pretty(&app.containers)?);
    }
    let port = |p: Option<u16>| p.map_or_else(|| "-".to_string(), |p| p.to_string());
    let mut lines = vec![format!(
        "{:<38} {:<20} {:<9} {:>9} {:>9}",
        "ID", "HOST", "STATUS", "HOST_PORT", "CTR_PORT"
    )];
    for container in &app.containers {
        lines.push(format!(
            "{:<38} {:<20} {:<9} {:>9} {:>9}",
            container.id,
            container.host.as_deref().unwrap_or("-"),
            container.status.to_string(),
            port(container.host_port),
            port(container.container_port),
        ));
    }
    Ok(lines.join("\n"))
}
