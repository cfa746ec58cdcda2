use crate::domain::{Cmp, Condition, Observation, Rule, SendReason, Watch};

/// Render the alert text delivered to the subscriber. Rendering lives
/// here so notifier adapters stay pure transports.
pub fn render_alert(watch: &Watch, rule: &Rule, obs: &Observation, reason: SendReason) -> String {
    let mut lines = vec![];

    let headline = match reason {
        SendReason::SignificantChange => "⚠️ Conditions worsened",
        _ => "🪂 Conditions alert",
    };
    lines.push(format!("{} at {}", headline, watch.location.name));
    lines.push(format!("Rule: {}", rule.id));

    lines.push(format!(
        "Wind: {:.1} m/s from {}°",
        obs.wind_speed_ms, obs.wind_direction_deg
    ));
    if let Some(gust) = obs.wind_gust_ms {
        lines.push(format!("Gusts: {:.1} m/s", gust));
    }
    lines.push(format!(
        "Precipitation chance: {:.0}%",
        obs.precip_probability * 100.0
    ));
    if let Some(t) = obs.temperature_c {
        lines.push(format!("Temperature: {:.1}°C", t));
    }
    if let Some(base) = obs.cloud_base_m {
        lines.push(format!("Cloud base: {:.0} m", base));
    }
    if let Some(fog) = obs.fog_probability {
        if fog > 0.0 {
            lines.push(format!("Fog chance: {:.0}%", fog * 100.0));
        }
    }

    lines.push(format!("Triggered: {}", describe_conditions(rule)));

    lines.join("\n")
}

/// One-time notice sent when a watch is deactivated because its
/// location is rejected by the weather provider.
pub fn render_invalid_location(watch: &Watch) -> String {
    format!(
        "❌ Watch {} disabled: the weather provider rejected location \"{}\" ({:.4}, {:.4}). \
         Re-create the watch with valid coordinates.",
        watch.id,
        watch.location.name,
        watch.location.coords.lat(),
        watch.location.coords.lon()
    )
}

fn describe_conditions(rule: &Rule) -> String {
    let parts: Vec<String> = rule
        .conditions
        .iter()
        .map(|c| match c {
            Condition::Threshold { field, op, value } => {
                let op = match op {
                    Cmp::Gt => ">",
                    Cmp::Ge => ">=",
                    Cmp::Lt => "<",
                    Cmp::Le => "<=",
                };
                format!("{:?} {} {}", field, op, value)
            }
            Condition::DirectionArc { from_deg, to_deg } => {
                format!("direction in [{}°, {}°]", from_deg, to_deg)
            }
        })
        .collect();
    parts.join(" and ")
}
