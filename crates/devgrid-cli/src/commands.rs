use std::path::Path;

use anyhow::Context;
use serde::Serialize;
use tracing::debug;

use devgrid_core::{Capabilities, NodeConfig};
use devgrid_node::{CapabilityMatcher, MatchPolicy};

/// Verdict for one slot in a dry run.
#[derive(Debug, Serialize)]
pub struct SlotVerdict {
    pub slot: usize,
    pub udid: Option<String>,
    pub matches: bool,
    pub managed_device: bool,
}

fn load(path: &str) -> anyhow::Result<NodeConfig> {
    NodeConfig::from_file(Path::new(path)).with_context(|| format!("loading {path}"))
}

pub fn check(path: &str) -> anyhow::Result<()> {
    let config = load(path)?;

    println!(
        "✓ node '{}' — {} slot(s), max {} session(s)",
        config.node.id,
        config.slots.len(),
        config.node.max_sessions
    );
    if config.device_farm.enabled {
        println!(
            "  device farm: enabled (marker '{}', timeout {})",
            config.device_farm.marker_capability,
            config.device_farm.call_timeout.as_deref().unwrap_or("none")
        );
    } else {
        println!("  device farm: disabled");
    }

    for (index, slot) in config.slots.iter().enumerate() {
        let mut keys: Vec<_> = slot
            .capabilities
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        keys.sort();
        println!("  [{index}] {}", keys.join(", "));
    }

    Ok(())
}

pub fn dry_run(path: &str, request: &str, format: &str) -> anyhow::Result<()> {
    let config = load(path)?;
    let request = Capabilities::from_json(request).context("request must be a JSON object of scalars")?;
    let verdicts = evaluate(&config, &request);
    debug!(slots = verdicts.len(), "dry run evaluated");

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&verdicts)?),
        _ => {
            for v in &verdicts {
                let mark = if v.matches { "✓" } else { "✗" };
                let device = match (&v.udid, v.managed_device) {
                    (Some(udid), true) => format!(" (farm-managed {udid})"),
                    (Some(udid), false) => format!(" (device {udid})"),
                    (None, _) => String::new(),
                };
                println!("{mark} slot {}{device}", v.slot);
            }
        }
    }

    Ok(())
}

pub fn evaluate(config: &NodeConfig, request: &Capabilities) -> Vec<SlotVerdict> {
    let matcher = CapabilityMatcher::new(MatchPolicy::from_config(config));
    config
        .slots
        .iter()
        .enumerate()
        .map(|(slot, s)| SlotVerdict {
            slot,
            udid: s.capabilities.udid().map(str::to_string),
            matches: matcher.matches(&s.capabilities, request),
            managed_device: matcher.requires_managed_device(&s.capabilities, request),
        })
        .collect()
}
