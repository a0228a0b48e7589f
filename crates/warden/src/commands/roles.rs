//! Roles command - role-promotion requests and their review.

use std::sync::Arc;

use anyhow::{Result, anyhow};
use clap::{Args, Subcommand};
use console::{Style, style};
use futures::future::try_join_all;
use serde::Serialize;
use warden_auth::{PendingApprovalPoller, RoleRequests};
use warden_client::{RequestableRole, RoleRequest, RoleRequestStatus};

use super::Context;

/// Arguments for the roles command.
#[derive(Args, Debug)]
pub struct RolesArgs {
    #[command(subcommand)]
    pub command: RolesCommand,
}

#[derive(Subcommand, Debug)]
pub enum RolesCommand {
    /// Ask to be promoted (analyst or manager)
    Request {
        /// Role to request
        role: RequestableRole,
    },

    /// List role requests (admin)
    List {
        /// Only show requests with this status (pending, approved, rejected)
        #[arg(long)]
        status: Option<RoleRequestStatus>,
    },

    /// Approve a request (admin)
    Approve {
        /// Request id
        id: i64,
    },

    /// Reject a request (admin)
    Reject {
        /// Request id
        id: i64,

        /// Reason shown to the requester
        #[arg(long)]
        comment: Option<String>,
    },

    /// Show how many requests await review (admin)
    Pending {
        /// Keep running and print the count whenever it changes
        #[arg(short, long)]
        watch: bool,
    },
}

#[derive(Debug, Serialize)]
struct CountOutput {
    pending: u64,
}

/// Run the roles command.
pub async fn run(args: RolesArgs, ctx: &Context) -> Result<()> {
    let session = ctx.signed_in().await?;

    if let RolesCommand::Pending { watch: true } = args.command {
        let identity = session.subscribe();
        let poller = PendingApprovalPoller::start(
            Arc::new(session.role_requests()?),
            identity,
            ctx.config.poll_interval(),
        )
        .ok_or_else(|| anyhow!("Only admins can review role requests"))?;
        return watch_pending(ctx, poller).await;
    }

    let requests = session.role_requests()?;
    match args.command {
        RolesCommand::Request { role } => {
            let created = requests.submit(role).await?;
            print_requests(ctx, std::slice::from_ref(&created))
        }
        RolesCommand::List { status } => {
            let listed = list(&requests, status).await?;
            print_requests(ctx, &listed)
        }
        RolesCommand::Approve { id } => {
            let updated = requests.approve(id).await?;
            print_requests(ctx, std::slice::from_ref(&updated))
        }
        RolesCommand::Reject { id, comment } => {
            let updated = requests.reject(id, comment.as_deref()).await?;
            print_requests(ctx, std::slice::from_ref(&updated))
        }
        RolesCommand::Pending { .. } => {
            let pending = requests.pending_count().await?;
            print_count(ctx, pending)
        }
    }
}

/// One status, or all of them fetched together.
async fn list(
    requests: &RoleRequests,
    status: Option<RoleRequestStatus>,
) -> Result<Vec<RoleRequest>> {
    let statuses = match status {
        Some(status) => vec![status],
        None => vec![
            RoleRequestStatus::Pending,
            RoleRequestStatus::Approved,
            RoleRequestStatus::Rejected,
        ],
    };
    let pages = try_join_all(statuses.into_iter().map(|s| requests.list(s))).await?;
    let mut all: Vec<RoleRequest> = pages.into_iter().flatten().collect();
    all.sort_by_key(|r| r.id);
    Ok(all)
}

async fn watch_pending(ctx: &Context, poller: PendingApprovalPoller) -> Result<()> {
    let mut counts = poller.subscribe();
    if !ctx.json_output {
        let dim = Style::new().dim();
        println!("{}", dim.apply_to("Watching pending role requests (Ctrl-C to stop)"));
    }

    loop {
        tokio::select! {
            changed = counts.changed() => {
                if changed.is_err() || poller.is_stopped() {
                    break;
                }
                let count = *counts.borrow_and_update();
                if let Some(count) = count {
                    print_count(ctx, count)?;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    poller.shutdown().await;
    Ok(())
}

fn print_count(ctx: &Context, pending: u64) -> Result<()> {
    if ctx.json_output {
        println!("{}", serde_json::to_string(&CountOutput { pending })?);
    } else {
        let highlight = if pending > 0 {
            Style::new().yellow().bold()
        } else {
            Style::new().dim()
        };
        println!("{} pending", highlight.apply_to(pending));
    }
    Ok(())
}

fn print_requests(ctx: &Context, requests: &[RoleRequest]) -> Result<()> {
    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(requests)?);
        return Ok(());
    }

    if requests.is_empty() {
        println!("{}", Style::new().dim().apply_to("No role requests."));
        return Ok(());
    }

    let dim = Style::new().dim();
    println!();
    println!(
        "  {:>6}  {:>8}  {:<10}  {:<9}  {}",
        style("ID").bold(),
        style("USER").bold(),
        style("ROLE").bold(),
        style("STATUS").bold(),
        style("COMMENT").bold()
    );
    for request in requests {
        let status = match request.status {
            RoleRequestStatus::Pending => Style::new().yellow(),
            RoleRequestStatus::Approved => Style::new().green(),
            RoleRequestStatus::Rejected => Style::new().red(),
        };
        println!(
            "  {:>6}  {:>8}  {:<10}  {:<9}  {}",
            request.id,
            request.user_id,
            request.requested_role,
            status.apply_to(request.status),
            dim.apply_to(request.comment.as_deref().unwrap_or(""))
        );
    }
    println!();
    Ok(())
}
