//! Logout command - ends the session locally and at the backend.

use anyhow::Result;
use clap::Args;
use console::Style;
use serde::Serialize;

use super::Context;

/// Arguments for the logout command.
#[derive(Args, Debug)]
pub struct LogoutArgs {}

#[derive(Debug, Serialize)]
struct LogoutOutput {
    signed_out: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    identity_provider_logout_url: Option<String>,
}

/// Run the logout command.
pub async fn run(_args: LogoutArgs, ctx: &Context) -> Result<()> {
    let session = ctx.session()?;

    // Restore so the backend call carries the stored credentials; a stale
    // session is cleared by the restore itself.
    if let Err(e) = session.restore().await {
        tracing::debug!(error = %e, "No usable session to sign out of");
    }
    session.sign_out().await?;

    let logout_url = session.pkce().and_then(|p| p.logout_url().ok());

    if ctx.json_output {
        let output = LogoutOutput {
            signed_out: true,
            identity_provider_logout_url: logout_url,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    println!("Signed out.");
    if let Some(url) = logout_url {
        println!();
        println!("{}", dim.apply_to("To end the identity-provider session too, open:"));
        println!("  {}", url);
    }
    Ok(())
}
