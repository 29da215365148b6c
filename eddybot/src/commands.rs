use std::time::Duration;

use eddybot_common::utils::parse_duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    AddTwitter(String),
    SetWallet(String),
    SetPost(String),
    SetDuration(String),
    StartRaid(Option<String>),
    StopRaid,
    Submit(String),
    GenerateComment,
    Points,
    Leaderboard,
    ResetPoints,
}

/// Parses a `/command args` message. `/command@BotName` is accepted too.
/// Returns `None` for messages that aren't one of our commands.
pub fn parse_command(text: &str) -> Option<Command> {
    let text = text.trim();
    let (head, args) = match text.split_once(char::is_whitespace) {
        Some((head, args)) => (head, args.trim()),
        None => (text, ""),
    };
    let name = head.strip_prefix('/')?;
    let name = name.split_once('@').map_or(name, |(name, _bot)| name);
    let args = args.to_string();

    Some(match name.to_lowercase().as_str() {
        "start" => Command::Start,
        "help" => Command::Help,
        "add_twitter" => Command::AddTwitter(args),
        "set_wallet" => Command::SetWallet(args),
        "set_post" => Command::SetPost(args),
        "set_duration" => Command::SetDuration(args),
        "start_raid" => Command::StartRaid(Some(args).filter(|args| !args.is_empty())),
        "stop_raid" => Command::StopRaid,
        "submit" => Command::Submit(args),
        "generate_comment" => Command::GenerateComment,
        "points" => Command::Points,
        "leaderboard" => Command::Leaderboard,
        "reset_points" => Command::ResetPoints,
        _ => return None,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetPostArgs {
    pub link: String,
    pub hashtags: String,
    pub keywords: String,
    pub comment_sample: String,
}

/// `<link> | <hashtags> | <keywords> [| <comment sample>]`
pub fn parse_set_post_args(args: &str) -> Option<SetPostArgs> {
    let mut parts = args.splitn(4, '|').map(str::trim);
    let link = parts.next().filter(|link| !link.is_empty())?;
    let hashtags = parts.next()?;
    let keywords = parts.next()?;
    let comment_sample = parts.next().unwrap_or_default();
    Some(SetPostArgs {
        link: link.to_string(),
        hashtags: hashtags.to_string(),
        keywords: keywords.to_string(),
        comment_sample: comment_sample.to_string(),
    })
}

/// `None` means the default duration, `Some(Err)` is a malformed argument.
pub fn parse_raid_duration(args: Option<&str>) -> Option<Result<Duration, String>> {
    let args = args?;
    Some(parse_duration(args).ok_or_else(|| args.to_string()))
}

pub const HELP_TEXT: &str = "*Eddy raid bot*

/add\\_twitter `<handle>` \\- link your X account
/set\\_wallet `<address>` \\- your Ethereum address for rewards
/generate\\_comment \\- get a reply suggestion for the raid post
/submit `<link>` \\- submit your reply to the running raid
/points \\- your points
/leaderboard \\- top raiders

*Admins*
/set\\_post `<link> | <hashtags> | <keywords> [| <sample>]` \\- set the post to raid
/set\\_duration `<duration>` \\- default length of the next raids
/start\\_raid `[duration]` \\- start a raid, e\\.g\\. `/start_raid 30m`
/stop\\_raid \\- end the raid now and count the points
/reset\\_points \\- reset everyone's points";
