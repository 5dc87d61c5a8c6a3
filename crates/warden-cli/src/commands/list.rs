use warden_core::{ProcessIdentity, WardenConfig};

pub fn list(config: &WardenConfig) -> anyhow::Result<()> {
    print!("{}", render(config));
    Ok(())
}

fn render(config: &WardenConfig) -> String {
    let mut out = format!(
        "{:<20} {:<9} {:>5}  {:<28} {}\n",
        "SERVICE", "PRIORITY", "PORT", "PROCESS", "AUTO-RESTART"
    );
    for svc in &config.services {
        let process = match &svc.process {
            ProcessIdentity::Unit(unit) => unit.clone(),
            ProcessIdentity::PidFile(path) => format!("pid:{}", path.display()),
        };
        let restart = if svc.remediation.auto_restart {
            format!(
                "yes ({}/day, {}m apart)",
                svc.remediation.max_restarts_per_day, svc.remediation.min_restart_interval_minutes
            )
        } else {
            "no".to_string()
        };
        out.push_str(&format!(
            "{:<20} {:<9} {:>5}  {:<28} {}\n",
            svc.id,
            config.priority_for(svc).to_string(),
            svc.port,
            process,
            restart
        ));
    }
    out
}
