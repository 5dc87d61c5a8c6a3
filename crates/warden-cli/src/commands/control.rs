use warden_core::WardenConfig;

pub async fn start(config: WardenConfig, service: &str) -> anyhow::Result<()> {
    let supervisor = super::open(config)?;
    if supervisor.start_service(service).await? {
        println!("✓ {service} started");
        Ok(())
    } else {
        anyhow::bail!("failed to start {service}")
    }
}

pub async fn stop(config: WardenConfig, service: &str) -> anyhow::Result<()> {
    let supervisor = super::open(config)?;
    if supervisor.stop_service(service).await? {
        println!("✓ {service} stopped");
        Ok(())
    } else {
        anyhow::bail!("failed to stop {service}")
    }
}

pub async fn restart(config: WardenConfig, service: &str) -> anyhow::Result<()> {
    let supervisor = super::open(config)?;
    let outcome = supervisor.restart_service(service).await?;
    for event in &outcome.events {
        println!("  {:<16} {}", event.kind.as_str(), event.details);
    }
    if outcome.recovered() {
        println!("✓ {service} restarted and healthy");
        Ok(())
    } else {
        anyhow::bail!("{service} is still unhealthy after restart")
    }
}
