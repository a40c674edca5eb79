//! The provisioned user account and passwordless sudo for `wheel`.

use std::sync::Arc;

use anyhow::Result;

use crate::common::write_file_mode;
use crate::context::{ProvisioningContext, UserSpec};
use crate::process::{self, CommandSpec};

pub const SUDOERS_FILE: &str = "10-wheel";
pub const SUDOERS_RULE: &str = "%wheel ALL=(ALL) NOPASSWD: ALL\n";

/// sudo ignores drop-ins that are group or world writable.
const SUDOERS_MODE: u32 = 0o440;

pub async fn write_sudoers(ctx: Arc<ProvisioningContext>) -> Result<()> {
    let path = ctx.paths.sudoers_dir.join(SUDOERS_FILE);
    write_file_mode(&path, SUDOERS_RULE, true, SUDOERS_MODE)?;
    tracing::info!(path = %path.display(), "sudoers drop-in written");
    Ok(())
}

/// `groupadd`, `useradd` and root's `chsh`, in that order.
pub fn account_commands(user: &UserSpec, root_shell: &str) -> Vec<CommandSpec> {
    vec![
        CommandSpec::new("groupadd")
            .arg("--gid")
            .arg(user.gid.to_string())
            .arg(&user.name),
        CommandSpec::new("useradd")
            .arg("--uid")
            .arg(user.uid.to_string())
            .arg("--gid")
            .arg(user.gid.to_string())
            .arg("-m")
            .arg("-G")
            .arg(user.groups.join(","))
            .arg("-s")
            .arg(&user.shell)
            .arg(&user.name),
        CommandSpec::new("chsh").arg("-s").arg(root_shell),
    ]
}

pub async fn add_user(ctx: Arc<ProvisioningContext>) -> Result<()> {
    process::execute_sequence(&account_commands(&ctx.user, &ctx.config.root_shell)).await?;
    tracing::info!(user = %ctx.user.name, uid = ctx.user.uid, "user created");
    Ok(())
}
