//! Login command - direct-grant or browser sign-in.

use anyhow::{Result, anyhow};
use clap::Args;
use console::{Style, style};
use serde::Serialize;
use warden_auth::{AuthError, CallbackListener, Identity, SessionManager, parse_callback};

use super::{Context, open_url, print_identity, prompt_line};

/// Arguments for the login command.
#[derive(Args, Debug)]
pub struct LoginArgs {
    /// Account email (prompted if omitted)
    #[arg(short, long)]
    pub email: Option<String>,

    /// One-time code from the authenticator app
    #[arg(long)]
    pub otp: Option<String>,

    /// Sign in through the identity provider in a browser
    #[arg(long, conflicts_with_all = ["email", "otp"])]
    pub browser: bool,
}

/// Identity printed for `--json`.
#[derive(Debug, Serialize)]
pub(crate) struct IdentityOutput<'a> {
    #[serde(flatten)]
    identity: &'a Identity,
    capabilities: warden_auth::Capabilities,
}

impl<'a> IdentityOutput<'a> {
    pub(crate) fn new(identity: &'a Identity) -> Self {
        Self {
            identity,
            capabilities: identity.capabilities(),
        }
    }
}

/// Run the login command.
pub async fn run(args: LoginArgs, ctx: &Context) -> Result<()> {
    let session = ctx.session()?;

    let identity = if args.browser {
        browser_flow(ctx, &session, false).await?
    } else {
        direct_flow(args, &session).await?
    };

    report(ctx, &identity)
}

async fn direct_flow(args: LoginArgs, session: &SessionManager) -> Result<Identity> {
    let email = match args.email {
        Some(email) => email,
        None => prompt_line("Email: ")?,
    };
    if email.is_empty() {
        return Err(anyhow!("No email provided"));
    }
    let password = rpassword::prompt_password("Password: ")?;

    match session.sign_in(&email, &password, args.otp.as_deref()).await {
        Ok(identity) => Ok(identity),
        Err(e) if e.needs_second_factor() && args.otp.is_none() => {
            let dim = Style::new().dim();
            println!("{}", dim.apply_to(e.user_message()));
            let otp = prompt_line("One-time code: ")?;
            if otp.is_empty() {
                return Err(anyhow!("No one-time code provided"));
            }
            session
                .sign_in(&email, &password, Some(&otp))
                .await
                .map_err(login_failed)
        }
        Err(e) => Err(login_failed(e)),
    }
}

/// Authorization-code + PKCE sign-in through the loopback callback listener.
pub async fn browser_flow(
    ctx: &Context,
    session: &SessionManager,
    register: bool,
) -> Result<Identity> {
    let redirect_uri = ctx.config.identity_provider()?.redirect_uri;
    let pkce = session
        .pkce()
        .ok_or_else(|| anyhow!("identity provider is not configured"))?;

    // Bind before handing out the URL so the redirect cannot beat us.
    let listener = match CallbackListener::bind(&redirect_uri).await {
        Ok(listener) => Some(listener),
        Err(e) => {
            tracing::warn!(error = %e, "Could not start callback listener, falling back to paste");
            None
        }
    };

    let url = if register {
        pkce.register_url().await?
    } else {
        pkce.login_url().await?
    };

    let title = if register { "Create an account" } else { "Sign in" };
    println!();
    println!("{}", style(title).bold());
    println!();
    println!("Open this URL in your browser:");
    println!();
    println!("  {}", url);
    println!();
    if open_url(&url).is_err() {
        println!("(Could not open browser automatically)");
        println!();
    }

    let code = match listener {
        Some(listener) => {
            println!("Waiting for the browser to return...");
            tokio::select! {
                code = listener.wait() => code?,
                _ = tokio::signal::ctrl_c() => return Err(anyhow!("Sign-in cancelled")),
            }
        }
        None => {
            println!("After signing in, paste the address you were redirected to:");
            parse_callback(&prompt_line("redirect> ")?)?
        }
    };

    session.complete_callback(&code).await.map_err(login_failed)
}

fn login_failed(e: AuthError) -> anyhow::Error {
    anyhow!("Sign-in failed: {}", e.user_message())
}

pub(crate) fn report(ctx: &Context, identity: &Identity) -> Result<()> {
    if ctx.json_output {
        println!(
            "{}",
            serde_json::to_string_pretty(&IdentityOutput::new(identity))?
        );
        return Ok(());
    }

    let green = Style::new().green();
    println!();
    println!("{}", green.apply_to("Signed in."));
    print_identity(identity, ctx.verbose)
}
