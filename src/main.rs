use clap::Parser;
use log::{debug, LevelFilter};

mod args;
mod polls;

use crate::args::Args;

fn main() {
    let args = Args::parse();

    let mut builder = env_logger::Builder::from_default_env();
    if args.verbose {
        builder.filter_level(LevelFilter::Debug);
    }
    builder.init();
    debug!("args: {:?}", args);

    if let Err(e) = polls::run(&args) {
        polls::report_error(&e);
        std::process::exit(polls::exit_code(&e));
    }
}
