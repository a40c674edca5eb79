//! Show command - displays information.

use std::sync::Arc;

use anyhow::Result;

use crate::config::Config;
use crate::context::ProvisioningContext;
use crate::steps;

/// Show target for the show command.
pub enum ShowTarget {
    /// Show configuration
    Config,
    /// Show the step graph in a valid execution order
    Plan { user_name: String },
}

/// Execute the show command.
pub fn cmd_show(target: ShowTarget, config: &Config) -> Result<()> {
    match target {
        ShowTarget::Config => config.print(),
        ShowTarget::Plan { user_name } => {
            let ctx = ProvisioningContext::new(&user_name, std::env::consts::ARCH, config)?;
            let graph = steps::build_graph(Arc::new(ctx));
            let order = graph.validate()?;

            println!("=== Provisioning plan for '{}' ===\n", user_name);
            for (i, id) in order.iter().enumerate() {
                let prerequisites = graph.prerequisites(id).unwrap_or_default();
                if prerequisites.is_empty() {
                    println!("  {:>2}. {}", i + 1, id);
                } else {
                    println!("  {:>2}. {}  (after: {})", i + 1, id, prerequisites.join(", "));
                }
            }
            println!("\n{} step(s)", order.len());
        }
    }
    Ok(())
}
