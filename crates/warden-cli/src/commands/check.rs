use warden_core::WardenConfig;
use warden_supervisor::ServiceReport;

pub async fn check(config: WardenConfig, service: Option<&str>) -> anyhow::Result<()> {
    let supervisor = super::open(config)?;
    let reports = match service {
        Some(id) => vec![supervisor.check_service(id).await?],
        None => supervisor.sweep_once().await.services,
    };

    for report in &reports {
        println!("{}", render(report));
    }
    let unhealthy = reports.iter().filter(|r| !r.busy && !r.healthy).count();
    if unhealthy > 0 {
        anyhow::bail!("{unhealthy} service(s) unhealthy");
    }
    Ok(())
}

fn render(report: &ServiceReport) -> String {
    let mark = if report.busy {
        "…"
    } else if report.healthy {
        "✓"
    } else {
        "✗"
    };
    let mut line = format!("{mark} {}", report.service);
    for kind in &report.transitions {
        line.push_str(&format!(" [{kind}]"));
    }
    if let Some(outcome) = &report.remediation {
        match outcome.skipped {
            Some(reason) => line.push_str(&format!(" · restart skipped ({reason})")),
            None if outcome.recovered() => line.push_str(" · restarted"),
            None => line.push_str(" · restart failed"),
        }
    }
    if let Some(alert) = &report.alert {
        line.push_str(&format!(" · alert {alert:?}"));
    }
    for error in &report.errors {
        line.push_str(&format!(" · error: {error}"));
    }
    line
}
