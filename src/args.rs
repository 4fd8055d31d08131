use clap::{Parser, Subcommand};

/// Creates polls, records ranked ballots and computes instant-runoff winners.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path, optional) A JSON configuration file. See the manual of poll_tally for the
    /// available fields.
    #[clap(short, long, value_parser)]
    pub config: Option<String>,

    /// (file path, default verdict.json) The file holding the polls and the ballots. Setting this
    /// option overrides the path that may be specified with the --config option.
    #[clap(short, long, value_parser)]
    pub data: Option<String>,

    /// (integer, optional) Seed for the tie-break source. Implies the random tie-break mode,
    /// unless the configuration asks for the hashed mode.
    #[clap(long, value_parser)]
    pub seed: Option<String>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(short, long, takes_value = false)]
    pub verbose: bool,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Creates a poll and prints it in JSON format.
    CreatePoll {
        #[clap(short, long, value_parser)]
        prompt: String,
        /// A choice of the poll. Repeat the option for each choice, in order.
        #[clap(short, long = "choice", value_parser)]
        choices: Vec<String>,
    },
    /// Records the ballot of a voter.
    Cast {
        #[clap(short, long, value_parser)]
        poll: String,
        /// (optional) The identifier of the voter. A random one is used if missing.
        #[clap(long, value_parser)]
        voter: Option<String>,
        /// (list of comma-separated indices) The choices, most preferred first.
        #[clap(
            short,
            long,
            value_parser,
            use_value_delimiter = true,
            allow_hyphen_values = true
        )]
        ranks: Vec<i64>,
    },
    /// Prints a poll in JSON format.
    Show {
        #[clap(short, long, value_parser)]
        poll: String,
    },
    /// Computes the result of a poll with the ballots recorded so far.
    Result {
        #[clap(short, long, value_parser)]
        poll: String,
        /// (file path, 'stdout' or empty) Where to write the result in JSON format.
        #[clap(short, long, value_parser)]
        out: Option<String>,
    },
    /// Tallies an election file, without touching the data file.
    Tally {
        /// (file path) The election: prompt, choices and ballots in JSON format.
        #[clap(short, long, value_parser)]
        input: String,
        /// (file path) A reference file containing the outcome of the election in JSON format.
        /// If provided, verdict will check that the computed result matches the reference.
        #[clap(short, long, value_parser)]
        reference: Option<String>,
        /// (file path, 'stdout' or empty) Where to write the result in JSON format.
        #[clap(short, long, value_parser)]
        out: Option<String>,
    },
}
