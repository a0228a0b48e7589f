//! Register command - account creation through the identity provider.

use anyhow::Result;
use clap::Args;

use super::Context;
use super::login::{browser_flow, report};

/// Arguments for the register command.
#[derive(Args, Debug)]
pub struct RegisterArgs {}

/// Run the register command.
pub async fn run(_args: RegisterArgs, ctx: &Context) -> Result<()> {
    let session = ctx.session()?;
    let identity = browser_flow(ctx, &session, true).await?;
    report(ctx, &identity)
}
