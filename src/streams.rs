// streams.rs - Stream Management Commands
// Server status for everyone, plus the admin-only moderation commands.
// Admin means the invoking member holds a role named like the configured
// ADMIN_ROLE (case-insensitive).
//
// Used by: main.rs (command registration)

use serenity::{
    client::Context,
    framework::standard::{macros::command, Args, CommandResult},
    model::channel::Message,
};

use crate::args::{parse_block_args, parse_username};

/// True if any of `role_names` equals `admin_role`, ignoring case.
pub fn role_matches<'a>(role_names: impl IntoIterator<Item = &'a str>, admin_role: &str) -> bool {
    role_names
        .into_iter()
        .any(|name| name.trim().eq_ignore_ascii_case(admin_role.trim()))
}

async fn has_admin_role(ctx: &Context, msg: &Message, admin_role: &str) -> bool {
    let guild_id = match msg.guild_id {
        Some(id) => id,
        None => return false,
    };
    let member = match guild_id.member(ctx, msg.author.id).await {
        Ok(member) => member,
        Err(e) => {
            log::warn!("[ADMIN] Could not fetch member {}: {}", msg.author.id, e);
            return false;
        }
    };
    let roles = match guild_id.roles(&ctx.http).await {
        Ok(roles) => roles,
        Err(e) => {
            log::warn!("[ADMIN] Could not fetch roles of guild {}: {}", guild_id, e);
            return false;
        }
    };
    role_matches(
        member
            .roles
            .iter()
            .filter_map(|id| roles.get(id))
            .map(|role| role.name.as_str()),
        admin_role,
    )
}

/// Reply with an access-denied notice unless the author is an admin.
async fn require_admin(ctx: &Context, msg: &Message, admin_role: &str) -> CommandResult<bool> {
    if has_admin_role(ctx, msg, admin_role).await {
        return Ok(true);
    }
    log::info!(
        "[ADMIN] Denied admin command from {} ({}) without the '{}' role",
        msg.author.name,
        msg.author.id,
        admin_role
    );
    msg.reply(ctx, "❌ **Access Denied**\nThis command requires the admin role.")
        .await?;
    Ok(false)
}

#[command]
/// Show active stream and user counts
pub async fn status(ctx: &Context, msg: &Message, _args: Args) -> CommandResult {
    let services = crate::services(ctx).await.ok_or("VOD services are not initialised")?;

    match services.dispatcher.api().status().await {
        Ok(status) => {
            let pickers = services.dispatcher.open_pickers().await;
            msg.reply(
                ctx,
                format!(
                    "📊 **Server Status**\nActive streams: {}\nActive users: {}\nOpen pickers: {}",
                    status.active_streams, status.active_users, pickers
                ),
            )
            .await?;
        }
        Err(e) => {
            log::error!("[STATUS] Status request failed: {}", e);
            msg.reply(ctx, "❌ Could not fetch server status. Please try again later.")
                .await?;
        }
    }
    Ok(())
}

#[command]
#[aliases("kick")]
/// Disconnect a user's active streams (admin only)
pub async fn disconnect(ctx: &Context, msg: &Message, args: Args) -> CommandResult {
    let services = crate::services(ctx).await.ok_or("VOD services are not initialised")?;
    if !require_admin(ctx, msg, &services.config.admin_role).await? {
        return Ok(());
    }

    let username = match parse_username(args.rest()) {
        Ok(username) => username,
        Err(e) => {
            msg.reply(ctx, format!("❌ {}\nUsage: `{}disconnect <username>`", e, services.config.prefix))
                .await?;
            return Ok(());
        }
    };

    match services.dispatcher.api().disconnect_user(&username).await {
        Ok(()) => {
            log::info!("[ADMIN] {} disconnected user '{}'", msg.author.name, username);
            msg.reply(ctx, format!("✅ Disconnected **{}**.", username)).await?;
        }
        Err(e) => {
            log::error!("[ADMIN] Disconnect of '{}' failed: {}", username, e);
            msg.reply(ctx, format!("❌ Could not disconnect **{}**.", username))
                .await?;
        }
    }
    Ok(())
}

#[command]
/// Block a user from streaming for a number of minutes (admin only)
pub async fn block(ctx: &Context, msg: &Message, args: Args) -> CommandResult {
    let services = crate::services(ctx).await.ok_or("VOD services are not initialised")?;
    if !require_admin(ctx, msg, &services.config.admin_role).await? {
        return Ok(());
    }

    let (username, minutes) = match parse_block_args(args.rest()) {
        Ok(parsed) => parsed,
        Err(e) => {
            msg.reply(
                ctx,
                format!("❌ {}\nUsage: `{}block <username> <minutes>`", e, services.config.prefix),
            )
            .await?;
            return Ok(());
        }
    };

    match services.dispatcher.api().block_user(&username, minutes).await {
        Ok(()) => {
            log::info!("[ADMIN] {} blocked user '{}' for {} minute(s)", msg.author.name, username, minutes);
            msg.reply(ctx, format!("🚫 Blocked **{}** for {} minute(s).", username, minutes))
                .await?;
        }
        Err(e) => {
            log::error!("[ADMIN] Block of '{}' failed: {}", username, e);
            msg.reply(ctx, format!("❌ Could not block **{}**.", username)).await?;
        }
    }
    Ok(())
}
