use log::{debug, info, warn};

use poll_tally::service::PollService;
use poll_tally::*;
use snafu::{prelude::*, ErrorCompat, Snafu};

use std::fs;
use std::path::Path;

use serde_json::Value as JSValue;
use text_diff::print_diff;

use crate::args::{Args, Command};
use crate::polls::config_reader::*;
use crate::polls::file_store::JsonFileStore;
use crate::polls::io_election::*;

pub mod config_reader;
pub mod file_store;
pub mod io_election;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum VerdictError {
    #[snafu(display("Error opening file {path}: {source}"))]
    OpeningJson {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing JSON file {path}: {source}"))]
    ParsingJson {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("Error serializing the result: {source}"))]
    WritingJson { source: serde_json::Error },
    #[snafu(display("Error writing the output to {path}: {source}"))]
    WritingOutput {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("{source}"))]
    Tally { source: TallyError },
    #[snafu(display("Difference detected between the computed result and the reference {path}"))]
    ReferenceMismatch { path: String },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type VerdictResult<T> = Result<T, VerdictError>;

/// 2 when the input given to the program was wrong, 1 for any other failure.
pub fn exit_code(e: &VerdictError) -> i32 {
    match e {
        VerdictError::Tally { source } if source.kind() == ErrorKind::Validation => 2,
        VerdictError::ParsingJson { .. } | VerdictError::Whatever { .. } => 2,
        _ => 1,
    }
}

pub fn report_error(e: &VerdictError) {
    warn!("Error occured {:?}", e);
    eprintln!("An error occured: {}", e);
    if let Some(bt) = ErrorCompat::backtrace(e) {
        eprintln!("trace: {}", bt);
    }
}

fn write_output(out: &Option<String>, contents: &str) -> VerdictResult<()> {
    match out.as_deref() {
        None | Some("") | Some("stdout") => {
            println!("{}", contents);
            Ok(())
        }
        Some(path) => {
            info!("Writing output to {:?}", path);
            fs::write(path, contents).context(WritingOutputSnafu { path })
        }
    }
}

fn to_pretty_json<T: serde::Serialize>(x: &T) -> VerdictResult<String> {
    serde_json::to_string_pretty(x).context(WritingJsonSnafu)
}

pub fn read_summary(path: &str) -> VerdictResult<JSValue> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    debug!("read_summary: content: {:?}", contents);
    serde_json::from_str(&contents).context(ParsingJsonSnafu { path })
}

/// Tallies an election file and, if given, compares the result with a reference summary.
pub fn run_election(
    input: &str,
    reference: Option<&str>,
    out: &Option<String>,
    rules: &TallyRules,
) -> VerdictResult<TallyResult> {
    let election = read_election(input)?;
    let result = tally_election(&election, rules)?;
    info!("res {:?}", result);

    let pretty_js_stats = to_pretty_json(&result)?;
    write_output(out, &pretty_js_stats)?;

    // The reference summary, if provided for comparison
    if let Some(summary_p) = reference {
        let summary_ref = read_summary(summary_p)?;
        let pretty_js_summary_ref = to_pretty_json(&summary_ref)?;
        // Round trip through JSValue so that both sides use the same formatting.
        let result_js = serde_json::to_value(&result).context(WritingJsonSnafu)?;
        let pretty_js_stats = to_pretty_json(&result_js)?;
        if pretty_js_summary_ref != pretty_js_stats {
            warn!("Found differences with the reference string");
            print_diff(
                pretty_js_summary_ref.as_str(),
                pretty_js_stats.as_ref(),
                "\n",
            );
            return ReferenceMismatchSnafu { path: summary_p }.fail();
        }
    }
    Ok(result)
}

/// Runs one command of the program.
pub fn run(args: &Args) -> VerdictResult<()> {
    let config = load_config(args)?;
    let rules = validate_rules(&config)?;
    let data_path = data_file(&config);

    match &args.command {
        Command::Tally {
            input,
            reference,
            out,
        } => {
            run_election(input, reference.as_deref(), out, &rules)?;
            Ok(())
        }
        command => {
            let service = PollService::new(JsonFileStore::new(Path::new(&data_path)), &rules);
            run_poll_command(&service, command)
        }
    }
}

fn run_poll_command(service: &PollService<JsonFileStore>, command: &Command) -> VerdictResult<()> {
    match command {
        Command::CreatePoll { prompt, choices } => {
            let poll = service.create_poll(prompt, choices).context(TallySnafu)?;
            write_output(&None, &to_pretty_json(&poll)?)
        }
        Command::Cast { poll, voter, ranks } => {
            let ballot = service
                .submit_ballot(poll, voter.as_deref(), ranks)
                .context(TallySnafu)?;
            write_output(&None, &to_pretty_json(&ballot)?)
        }
        Command::Show { poll } => {
            let poll = service.get_poll(poll).context(TallySnafu)?;
            write_output(&None, &to_pretty_json(&poll)?)
        }
        Command::Result { poll, out } => {
            let result = service.get_result(poll).context(TallySnafu)?;
            write_output(out, &to_pretty_json(&result)?)
        }
        Command::Tally { .. } => whatever!("Cannot run a tally against the data file"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn args(data: &Path, command: &[&str]) -> Args {
        let mut v = vec![
            "verdict".to_string(),
            "--data".to_string(),
            data.display().to_string(),
            "--seed".to_string(),
            "3".to_string(),
        ];
        v.extend(command.iter().map(|s| s.to_string()));
        Args::parse_from(v)
    }

    #[test]
    fn poll_lifecycle() {
        let _ = env_logger::try_init();
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("verdict.json");
        let a = args(
            &data,
            &["create-poll", "--prompt", "Best?", "--choice", "a", "--choice", "b"],
        );
        let config = load_config(&a).unwrap();
        let rules = validate_rules(&config).unwrap();
        assert_eq!(rules.tiebreak_mode, TieBreakMode::Random(3));
        run(&a).unwrap();

        let store = JsonFileStore::new(&data);
        let service = PollService::new(store, &rules);
        let stored: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&data).unwrap()).unwrap();
        let poll_id = stored["polls"][0]["pollId"].as_str().unwrap().to_string();

        run(&args(&data, &["cast", "--poll", &poll_id, "--ranks", "1,0"])).unwrap();
        let cast_v2 = |ranks: &str| {
            run(&args(
                &data,
                &["cast", "--poll", &poll_id, "--voter", "v2", "--ranks", ranks],
            ))
        };
        cast_v2("1,0").unwrap();
        let err = cast_v2("0,1").unwrap_err();
        assert_eq!(exit_code(&err), 2);
        let err = run(&args(&data, &["cast", "--poll", &poll_id, "--ranks", "-1,0"])).unwrap_err();
        assert_eq!(exit_code(&err), 2);

        let out = dir.path().join("result.json");
        run(&args(
            &data,
            &["result", "--poll", &poll_id, "--out", out.to_str().unwrap()],
        ))
        .unwrap();
        let res: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(res["winningChoice"], "b");
        assert_eq!(res["totalVotes"], 2);
        assert_eq!(service.get_result(&poll_id).unwrap().winning_votes, 2);
    }

    #[test]
    fn unknown_poll() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("verdict.json");
        let err = run(&args(&data, &["show", "--poll", "nope"])).unwrap_err();
        assert!(matches!(
            err,
            VerdictError::Tally {
                source: TallyError::PollNotFound { .. }
            }
        ));
        assert_eq!(exit_code(&err), 2);
    }

    #[test]
    fn election_with_reference() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("election.json");
        fs::write(
            &input,
            r#"{"prompt": "Best?", "choices": ["a", "b"],
                "ballots": [{"ranking": ["a", "b"], "count": 3}, {"ranking": ["b", "a"]}]}"#,
        )
        .unwrap();
        let rules = TallyRules {
            tiebreak_mode: TieBreakMode::UseChoiceOrder,
        };
        let out = Some(dir.path().join("out.json").display().to_string());
        let res = run_election(input.to_str().unwrap(), None, &out, &rules).unwrap();
        assert_eq!(res.winning_choice, "a");

        // The output of a run is a valid reference for the next one.
        let reference = dir.path().join("out.json");
        run_election(input.to_str().unwrap(), reference.to_str(), &out, &rules).unwrap();

        let wrong = dir.path().join("wrong.json");
        fs::write(&wrong, r#"{"winningChoice": "b"}"#).unwrap();
        let err = run_election(input.to_str().unwrap(), wrong.to_str(), &out, &rules).unwrap_err();
        assert!(matches!(err, VerdictError::ReferenceMismatch { .. }));
        assert_eq!(exit_code(&err), 1);
    }
}
