use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::flows::{
    format_restore_summary_lines, format_versions_lines, run_restore_command, run_versions_command,
    RestoreOverrides,
};
use crate::render::TerminalRenderer;
use crate::{Cli, Commands};

/// Runs one command. Returns whether it succeeded; failed restores are not
/// errors because their diagnostics were already printed.
pub(crate) async fn run_cli(cli: Cli) -> Result<bool> {
    let token = CancellationToken::new();
    let interrupt = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling restore");
            interrupt.cancel();
        }
    });

    let renderer = TerminalRenderer::current();
    match cli.command {
        Commands::Restore {
            spec,
            sources,
            force,
            locked_mode,
            disable_parallel,
            max_parallel,
            validate_runtime_assets,
            dry_run,
            warnings_as_errors,
            no_warn,
        } => {
            let overrides = RestoreOverrides {
                sources,
                force,
                locked_mode,
                disable_parallel,
                max_parallel,
                validate_runtime_assets,
                dry_run,
                warnings_as_errors,
                no_warn,
            };
            let outcome =
                run_restore_command(&spec, cli.settings.as_deref(), overrides, token).await?;
            renderer.print_section("restore");
            for (status, line) in format_restore_summary_lines(&outcome) {
                renderer.print_status(status, &line);
            }
            Ok(outcome.summary.success())
        }
        Commands::Versions { id, sources } => {
            let listings =
                run_versions_command(&id, &sources, cli.settings.as_deref(), &token).await?;
            renderer.print_lines(&format_versions_lines(&id, &listings));
            Ok(true)
        }
    }
}
