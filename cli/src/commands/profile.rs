use anyhow::Result;

use heft_core::auth::UserId;
use heft_core::service::WeightService;
use heft_core::units::{WeightUnit, format_weight};

use super::helpers::print_json;

pub(crate) fn cmd_goal_set(
    service: &WeightService,
    user: &UserId,
    value: f64,
    unit: Option<&str>,
    json: bool,
) -> Result<()> {
    let current = service.settings(user)?;
    let unit = match unit {
        Some(u) => u.parse::<WeightUnit>()?,
        None => current.units,
    };
    let settings = service.set_goal_weight(user, value, unit)?;

    if json {
        print_json(&settings)
    } else {
        println!(
            "Goal weight set to {}",
            format_weight(settings.goal_weight_kg, settings.units)
        );
        Ok(())
    }
}

pub(crate) fn cmd_goal_show(service: &WeightService, user: &UserId, json: bool) -> Result<()> {
    let settings = service.settings(user)?;
    if json {
        println!(
            "{}",
            serde_json::json!({ "goal_weight_kg": settings.goal_weight_kg })
        );
    } else if settings.goal_weight_kg.is_some() {
        println!(
            "Goal weight: {}",
            format_weight(settings.goal_weight_kg, settings.units)
        );
    } else {
        eprintln!("No goal set. Use `heft goal set <value>` to set one.");
    }
    Ok(())
}

pub(crate) fn cmd_goal_clear(service: &WeightService, user: &UserId, json: bool) -> Result<()> {
    let cleared = service.clear_goal_weight(user)?;
    if json {
        println!("{}", serde_json::json!({ "cleared": cleared }));
    } else if cleared {
        println!("Goal weight cleared");
    } else {
        eprintln!("No goal was set");
    }
    Ok(())
}

pub(crate) fn cmd_height_set(
    service: &WeightService,
    user: &UserId,
    cm: f64,
    json: bool,
) -> Result<()> {
    let settings = service.set_height_cm(user, cm)?;
    if json {
        print_json(&settings)
    } else {
        println!("Height set to {cm:.1} cm");
        Ok(())
    }
}

pub(crate) fn cmd_height_show(service: &WeightService, user: &UserId, json: bool) -> Result<()> {
    let settings = service.settings(user)?;
    if json {
        println!("{}", serde_json::json!({ "height_m": settings.height_m }));
    } else if let Some(h) = settings.height_m {
        println!("Height: {:.1} cm", h * 100.0);
    } else {
        eprintln!("No height set. Use `heft height set <cm>` to enable BMI.");
    }
    Ok(())
}

pub(crate) fn cmd_height_clear(service: &WeightService, user: &UserId, json: bool) -> Result<()> {
    let cleared = service.clear_height(user)?;
    if json {
        println!("{}", serde_json::json!({ "cleared": cleared }));
    } else if cleared {
        println!("Height cleared");
    } else {
        eprintln!("No height was set");
    }
    Ok(())
}

pub(crate) fn cmd_units(
    service: &WeightService,
    user: &UserId,
    unit: &str,
    json: bool,
) -> Result<()> {
    let unit = unit.parse::<WeightUnit>()?;
    let settings = service.set_units(user, unit)?;
    if json {
        print_json(&settings)
    } else {
        println!("Display unit set to {}", settings.units);
        Ok(())
    }
}
