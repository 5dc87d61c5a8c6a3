use warden_core::WardenConfig;
use warden_state::format_timestamp;

pub fn silence(config: WardenConfig, service: &str, hours: u64) -> anyhow::Result<()> {
    let supervisor = super::open(config)?;
    let until = supervisor.silence(service, hours)?;
    println!("✓ {service} silenced until {}", format_timestamp(until));
    Ok(())
}

pub fn unsilence(config: WardenConfig, service: &str) -> anyhow::Result<()> {
    let supervisor = super::open(config)?;
    if supervisor.unsilence(service)? {
        println!("✓ {service} unsilenced");
    } else {
        println!("{service} was not silenced");
    }
    Ok(())
}
