//! The provisioning steps for the Arch Linux base image.
//!
//! [`build_graph`] is the single place that says which step waits for
//! which. Each step module only knows how to do its own work.
//!
//! ```text
//! write-pacman-conf ─┐
//! handle-locale ─────┤
//! write-mirrorlist ──┤
//! adjust-makeconf ───┼─> install-initial-packages ─┐
//! pacman-cache-hook ─┤                              ├─> add-user ─> install-aur-helper ─┬─> install-aur-packages ─────────────┐
//! install-tini ──────┘           write-sudoers ─────┘                                   └─> setup-{spacevim,asdf,fisher} ─┐  │
//!                                                                                          post-user-setup <─────────────┘  │
//!                                                                                                 └──────> cleanup <─────────┘
//! ```

pub mod aur;
pub mod locale;
pub mod makepkg;
pub mod pacman;
pub mod tini;
pub mod user_setup;
pub mod users;

use std::future::Future;
use std::sync::Arc;

use anyhow::Result;

use crate::context::ProvisioningContext;
use crate::task::{RunReport, Step, TaskGraph};

pub const WRITE_PACMAN_CONF: &str = "write-pacman-conf";
pub const HANDLE_LOCALE: &str = "handle-locale";
pub const WRITE_MIRRORLIST: &str = "write-mirrorlist";
pub const ADJUST_MAKECONF: &str = "adjust-makeconf";
pub const PACMAN_CACHE_HOOK: &str = "pacman-cache-hook";
pub const INSTALL_TINI: &str = "install-tini";
pub const WRITE_SUDOERS: &str = "write-sudoers";
pub const INSTALL_INITIAL_PACKAGES: &str = "install-initial-packages";
pub const ADD_USER: &str = "add-user";
pub const INSTALL_AUR_HELPER: &str = "install-aur-helper";
pub const INSTALL_AUR_PACKAGES: &str = "install-aur-packages";
pub const SETUP_SPACEVIM: &str = "setup-spacevim";
pub const SETUP_ASDF: &str = "setup-asdf";
pub const SETUP_FISHER: &str = "setup-fisher";
pub const POST_USER_SETUP: &str = "post-user-setup";
pub const CLEANUP: &str = "cleanup";

/// Register a step whose action receives its own handle on the context.
fn register<F, Fut>(
    graph: &mut TaskGraph,
    ctx: &Arc<ProvisioningContext>,
    id: &str,
    prerequisites: &[&str],
    action: F,
) where
    F: FnOnce(Arc<ProvisioningContext>) -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let ctx = Arc::clone(ctx);
    graph.step(id, prerequisites, move || action(ctx));
}

/// Declare the full step graph for this image.
pub fn build_graph(ctx: Arc<ProvisioningContext>) -> TaskGraph {
    let mut graph = TaskGraph::new();
    let g = &mut graph;

    // System configuration, all independent of each other.
    register(g, &ctx, WRITE_PACMAN_CONF, &[], pacman::write_pacman_conf);
    register(g, &ctx, HANDLE_LOCALE, &[], locale::handle_locale);
    register(g, &ctx, WRITE_MIRRORLIST, &[], pacman::write_mirrorlist);
    register(g, &ctx, ADJUST_MAKECONF, &[], makepkg::adjust_makeconf);
    register(g, &ctx, PACMAN_CACHE_HOOK, &[], pacman::write_cache_hook);
    register(g, &ctx, INSTALL_TINI, &[], tini::install_tini);
    register(g, &ctx, WRITE_SUDOERS, &[], users::write_sudoers);

    register(
        g,
        &ctx,
        INSTALL_INITIAL_PACKAGES,
        &[
            WRITE_PACMAN_CONF,
            HANDLE_LOCALE,
            WRITE_MIRRORLIST,
            ADJUST_MAKECONF,
            PACMAN_CACHE_HOOK,
            INSTALL_TINI,
        ],
        pacman::install_initial_packages,
    );
    register(g, &ctx, ADD_USER, &[INSTALL_INITIAL_PACKAGES, WRITE_SUDOERS], users::add_user);
    register(g, &ctx, INSTALL_AUR_HELPER, &[ADD_USER], aur::install_aur_helper);
    register(g, &ctx, INSTALL_AUR_PACKAGES, &[INSTALL_AUR_HELPER], aur::install_aur_packages);

    // Per-user setup once the account and the AUR helper exist.
    let user_ready = [ADD_USER, INSTALL_AUR_HELPER];
    register(g, &ctx, SETUP_SPACEVIM, &user_ready, user_setup::setup_spacevim);
    register(g, &ctx, SETUP_ASDF, &user_ready, user_setup::setup_asdf);
    register(g, &ctx, SETUP_FISHER, &user_ready, user_setup::setup_fisher);
    register(
        g,
        &ctx,
        POST_USER_SETUP,
        &[SETUP_SPACEVIM, SETUP_ASDF, SETUP_FISHER],
        user_setup::post_user_setup,
    );

    let everything = graph.ids();
    let cleanup_ctx = Arc::clone(&ctx);
    graph.add(Step::new(CLEANUP, &[], move || pacman::cleanup(cleanup_ctx)).after(everything));

    graph
}

/// Build and run the step graph for `ctx`.
pub async fn provision(ctx: ProvisioningContext) -> crate::error::Result<RunReport> {
    tracing::info!(user = %ctx.user.name, arch = %ctx.arch, "provisioning image");
    build_graph(Arc::new(ctx)).run().await
}
