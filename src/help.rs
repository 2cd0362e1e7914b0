use serenity::{
    client::Context,
    framework::standard::{macros::command, Args, CommandResult},
    model::channel::Message,
};

pub fn help_text(prefix: &str) -> String {
    format!(
        "**VOD Bot**\n\n\
        **Search & Download:**\n\
        • `{p}search <query>` - Pick a title from a dropdown (alias: `{p}s`)\n\
        • `{p}shows <query>` - Browse show → season → episode (alias: `{p}browse`)\n\
        • `{p}find <query>` - Top 10 results, pick with number reactions (alias: `{p}f`)\n\
        • Add `s2e4` (or `s2 e4`) to a query to narrow to one episode\n\n\
        **Caching:**\n\
        • `{p}cache <days> <query>` - Keep the picked title cached for 1-14 days\n\
        • Progress is updated in place until the cache is ready\n\n\
        **Server:**\n\
        • `{p}status` - Active streams and users\n\
        • `{p}disconnect <user>` - Disconnect a user (admin, alias: `{p}kick`)\n\
        • `{p}block <user> <minutes>` - Block a user (admin)\n\n\
        Only the person who ran a search can use its picker. Pickers expire after a few minutes.",
        p = prefix
    )
}

#[command]
#[aliases("h")]
pub async fn help(ctx: &Context, msg: &Message, _args: Args) -> CommandResult {
    let prefix = match crate::services(ctx).await {
        Some(services) => services.config.prefix.clone(),
        None => "!".to_string(),
    };
    msg.reply(ctx, help_text(&prefix)).await?;
    Ok(())
}
