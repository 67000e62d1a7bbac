use std::path::PathBuf;
use std::str::FromStr;

use clap::Parser;

/// Window used by `read` / `read-no-checkpoint` when no seconds are given.
pub const DEFAULT_READ_SECONDS: &str = "1";

#[derive(Parser, Debug)]
#[command(name = "eventstream-services")]
#[command(about = "Publish to and read from an event hub, one step at a time")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Extra .env file loaded before the process environment is read
    #[arg(long)]
    pub env_file: Option<PathBuf>,

    /// Step to run, in order: publish:<count>, request:<user>,<request>,<type>[,<param>...],
    /// read[:<seconds>], read-no-checkpoint[:<seconds>]
    #[arg(long = "step", value_name = "STEP", required = true)]
    pub steps: Vec<Step>,
}

/// One request against the services. Arguments are kept raw so that bad
/// values turn into a 400 reply instead of a usage error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Publish { count: String },
    Request(RequestArgs),
    Read { seconds: String },
    ReadNoCheckpoint { seconds: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestArgs {
    pub user_id: String,
    pub request_id: String,
    pub request_type: String,
    pub parameters: Vec<String>,
}

impl FromStr for RequestArgs {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let mut parts = raw.split(',').map(str::to_string);
        Ok(Self {
            user_id: parts.next().unwrap_or_default(),
            request_id: parts.next().unwrap_or_default(),
            request_type: parts.next().unwrap_or_default(),
            parameters: parts.collect(),
        })
    }
}

impl FromStr for Step {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let (kind, arg) = match raw.split_once(':') {
            Some((kind, arg)) => (kind, Some(arg)),
            None => (raw, None),
        };
        let seconds = || arg.unwrap_or(DEFAULT_READ_SECONDS).to_string();
        match kind.trim() {
            "publish" => Ok(Step::Publish {
                count: arg.unwrap_or_default().to_string(),
            }),
            "request" => RequestArgs::from_str(arg.unwrap_or_default()).map(Step::Request),
            "read" => Ok(Step::Read { seconds: seconds() }),
            "read-no-checkpoint" => Ok(Step::ReadNoCheckpoint { seconds: seconds() }),
            other => Err(format!(
                "unknown step '{other}', expected publish, request, read or read-no-checkpoint"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_step_kind() {
        assert_eq!(
            "publish:25".parse::<Step>().unwrap(),
            Step::Publish { count: "25".into() }
        );
        assert_eq!(
            "read".parse::<Step>().unwrap(),
            Step::Read { seconds: "1".into() }
        );
        assert_eq!(
            "read-no-checkpoint:3".parse::<Step>().unwrap(),
            Step::ReadNoCheckpoint { seconds: "3".into() }
        );
        assert_eq!(
            "request:u1,r1,sell,AAPL,10".parse::<Step>().unwrap(),
            Step::Request(RequestArgs {
                user_id: "u1".into(),
                request_id: "r1".into(),
                request_type: "sell".into(),
                parameters: vec!["AAPL".into(), "10".into()],
            })
        );
    }

    #[test]
    fn incomplete_request_keeps_blanks_for_validation() {
        let Step::Request(args) = "request:u1".parse::<Step>().unwrap() else {
            panic!("expected a request step");
        };
        assert_eq!(args.user_id, "u1");
        assert!(args.request_id.is_empty());
        assert!(args.request_type.is_empty());
    }

    #[test]
    fn unknown_step_is_a_usage_error() {
        assert!("subscribe:1".parse::<Step>().is_err());
    }

    #[test]
    fn cli_collects_steps_in_order() {
        let cli = Cli::try_parse_from([
            "eventstream-services",
            "--step",
            "publish:2",
            "--step",
            "read:1",
        ])
        .unwrap();
        assert_eq!(cli.steps.len(), 2);
        assert!(matches!(cli.steps[0], Step::Publish { .. }));
        assert!(cli.env_file.is_none());

        assert!(Cli::try_parse_from(["eventstream-services"]).is_err());
    }
}
