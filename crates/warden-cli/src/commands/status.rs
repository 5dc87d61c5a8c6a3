use clap::ValueEnum;
use warden_core::WardenConfig;
use warden_state::{HealthState, format_timestamp};
use warden_supervisor::{FleetStatus, ServiceStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Text,
    Json,
}

pub fn status(config: WardenConfig, service: Option<&str>, format: Format) -> anyhow::Result<()> {
    let supervisor = super::open(config)?;
    let status = supervisor.status(service)?;

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&status)?),
        Format::Text => print!("{}", render(&status, service.is_some())),
    }
    Ok(())
}

fn render(status: &FleetStatus, detailed: bool) -> String {
    let mut out = String::new();
    for svc in &status.services {
        out.push_str(&summary_line(svc, status.generated_at));
        out.push('\n');
        if detailed {
            out.push_str(&details(svc, status.generated_at));
        }
    }

    out.push_str(&format!("\nalerts sent: {}", status.total_alerts_sent));
    match status.last_cleanup {
        Some(ts) => out.push_str(&format!(" · last cleanup: {}\n", format_timestamp(ts))),
        None => out.push_str(" · last cleanup: never\n"),
    }
    out
}

fn summary_line(svc: &ServiceStatus, now: u64) -> String {
    let mark = match svc.state {
        HealthState::Healthy => "✓",
        HealthState::Unhealthy => "✗",
        HealthState::Unknown => "?",
    };
    let mut line = format!("{mark} {:<20} {:<9} {:<9}", svc.service, svc.priority.to_string(), svc.state.to_string());
    if let Some(minutes) = svc.downtime_minutes {
        line.push_str(&format!(" down {minutes}m"));
    }
    if svc.silenced {
        if let Some(until) = svc.alert_state.as_ref().and_then(|a| a.silenced_until) {
            line.push_str(&format!(" · silenced {}h", until.saturating_sub(now).div_ceil(3600)));
        }
    }
    if svc.alerts_this_hour > 0 {
        line.push_str(&format!(" · {} alert(s) this hour", svc.alerts_this_hour));
    }
    if let Some(cert) = &svc.certificate {
        line.push_str(&format!(" · cert {}d", cert.days_remaining));
    }
    line
}

fn details(svc: &ServiceStatus, now: u64) -> String {
    let mut out = String::new();
    if let Some(sample) = &svc.last_sample {
        out.push_str(&format!(
            "    last check:  {} (port {}, process {}, http {})\n",
            format_timestamp(sample.timestamp),
            yes_no(sample.port_listening),
            yes_no(sample.process_running),
            yes_no(sample.http_responding),
        ));
        if let Some(error) = &sample.error {
            out.push_str(&format!("    issues:      {error}\n"));
        }
    }

    let history = &svc.failure_history;
    out.push_str(&format!("    failures/24h: {}", history.failure_count));
    if let (Some(first), Some(last)) = (history.first_failure, history.last_failure) {
        out.push_str(&format!(
            " (first {}, last {})",
            format_timestamp(first),
            format_timestamp(last)
        ));
    }
    out.push('\n');

    if let Some(alert) = &svc.alert_state {
        if let Some(until) = alert.silenced_until.filter(|until| *until > now) {
            out.push_str(&format!("    silenced until: {}\n", format_timestamp(until)));
        }
        if let Some(level) = alert.escalation_level {
            out.push_str(&format!("    last alert level: {level}\n"));
        }
    }
    if let Some(cert) = &svc.certificate {
        out.push_str(&format!(
            "    certificate: {} expires in {} days\n",
            cert.domain, cert.days_remaining
        ));
    }

    if !svc.recent_events.is_empty() {
        out.push_str("    recent events:\n");
        for event in &svc.recent_events {
            out.push_str(&format!(
                "      {}  {:<16} {}\n",
                format_timestamp(event.timestamp),
                event.kind.as_str(),
                event.details
            ));
        }
    }
    out
}

fn yes_no(value: bool) -> &'static str {
    if value { "ok" } else { "FAIL" }
}
