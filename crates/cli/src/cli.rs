use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use rx_agent::TeamDispatch;

/// Interactive agent router.
///
/// Each line read from stdin is classified and answered by the best-suited
/// agent; posting requests go to the credentialed X team.
#[derive(Parser, Debug)]
#[command(name = "rx", about = "Route requests to specialised LLM agents")]
pub struct CliArgs {
    /// Directory of agent definition (.md) files
    #[arg(long, env = "RX_AGENTS_DIR")]
    pub agents_dir: Option<PathBuf>,

    /// Do not authenticate or start the posting team
    #[arg(long)]
    pub no_team: bool,

    /// User id to store history under (random when unset)
    #[arg(long)]
    pub user_id: Option<String>,

    /// How requests routed to the team are answered
    #[arg(long, value_enum, default_value_t = DispatchArg::Broadcast)]
    pub team_dispatch: DispatchArg,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum DispatchArg {
    Broadcast,
    RoundRobin,
}

impl From<DispatchArg> for TeamDispatch {
    fn from(arg: DispatchArg) -> Self {
        match arg {
            DispatchArg::Broadcast => TeamDispatch::Broadcast,
            DispatchArg::RoundRobin => TeamDispatch::RoundRobin,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = CliArgs::try_parse_from(["rx"]).unwrap();
        assert!(!args.no_team);
        assert!(args.user_id.is_none());
        assert_eq!(args.team_dispatch, DispatchArg::Broadcast);
    }

    #[test]
    fn test_flags() {
        let args = CliArgs::try_parse_from([
            "rx",
            "--agents-dir",
            "/tmp/agents",
            "--no-team",
            "--user-id",
            "alice",
            "--team-dispatch",
            "round-robin",
        ])
        .unwrap();
        assert_eq!(args.agents_dir, Some(PathBuf::from("/tmp/agents")));
        assert!(args.no_team);
        assert_eq!(args.user_id.as_deref(), Some("alice"));
        assert_eq!(TeamDispatch::from(args.team_dispatch), TeamDispatch::RoundRobin);
    }
}
