//! makepkg build flags.

use std::sync::Arc;

use anyhow::Result;

use crate::common::{modify_file, EditOutcome, Transform};
use crate::context::ProvisioningContext;

/// Replace the `MAKEFLAGS=` line, commented out or not, with `makeflags`.
pub fn makeflags_transform(makeflags: &str) -> Transform<'static> {
    let line = format!("MAKEFLAGS=\"{}\"", makeflags);
    Transform::line(move |current| {
        let uncommented = current.strip_prefix('#').unwrap_or(current);
        (uncommented.starts_with("MAKEFLAGS=") && current != line).then(|| line.clone())
    })
}

pub async fn adjust_makeconf(ctx: Arc<ProvisioningContext>) -> Result<()> {
    let transform = makeflags_transform(&ctx.config.makeflags);
    if modify_file(&ctx.paths.makepkg_conf, &transform)? == EditOutcome::Changed {
        tracing::info!(makeflags = %ctx.config.makeflags, "makepkg.conf updated");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_makeflags_uncommented() {
        let t = makeflags_transform("-j16");
        let input = "CFLAGS=\"-O2\"\n#MAKEFLAGS=\"-j2\"\nDEBUG_CFLAGS=\"-g\"\n";
        assert_eq!(
            t.apply(input),
            "CFLAGS=\"-O2\"\nMAKEFLAGS=\"-j16\"\nDEBUG_CFLAGS=\"-g\"\n"
        );
    }

    #[test]
    fn test_makeflags_replaces_existing_value() {
        let t = makeflags_transform("-j4");
        assert_eq!(t.apply("MAKEFLAGS=\"-j16\""), "MAKEFLAGS=\"-j4\"");
    }

    #[test]
    fn test_makeflags_leaves_other_lines() {
        let t = makeflags_transform("-j16");
        let input = "# MAKEFLAGS controls parallel builds\nBUILDENV=(!distcc color)\n";
        assert_eq!(t.apply(input), input);
    }

    #[test]
    fn test_makeconf_edit_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("makepkg.conf");
        fs::write(&path, "#MAKEFLAGS=\"-j2\"\n").unwrap();

        let t = makeflags_transform("-j16");
        assert_eq!(modify_file(&path, &t).unwrap(), EditOutcome::Changed);
        assert_eq!(modify_file(&path, &t).unwrap(), EditOutcome::Unchanged);
        assert_eq!(fs::read_to_string(&path).unwrap(), "MAKEFLAGS=\"-j16\"\n");
    }
}
