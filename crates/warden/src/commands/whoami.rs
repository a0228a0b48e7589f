//! Whoami command - shows the signed-in identity.

use anyhow::{Result, anyhow};
use clap::Args;
use console::Style;

use super::Context;
use super::login::IdentityOutput;
use super::print_identity;

/// Arguments for the whoami command.
#[derive(Args, Debug)]
pub struct WhoamiArgs {}

/// Run the whoami command.
pub async fn run(_args: WhoamiArgs, ctx: &Context) -> Result<()> {
    let session = ctx.signed_in().await?;
    let identity = session
        .current_user()
        .ok_or_else(|| anyhow!("Not signed in. Run 'warden login' first."))?;

    if ctx.json_output {
        println!(
            "{}",
            serde_json::to_string_pretty(&IdentityOutput::new(&identity))?
        );
        return Ok(());
    }

    print_identity(&identity, true)?;
    if ctx.verbose {
        let dim = Style::new().dim();
        println!("  {} {}", dim.apply_to("Subject:"), identity.subject_id);
        println!("  {} {}", dim.apply_to("Server:"), session.client().base_url());
        println!();
    }
    Ok(())
}
