use clap::Parser;
use log::{debug, warn};

use leaderboard::args::VerifyArgs;
use leaderboard::board::config_reader::read_config;
use leaderboard::board::{report_error, run_verification};

fn main() {
    let args = VerifyArgs::parse();
    leaderboard::init_logging(args.verbose);
    debug!("args: {:?}", args);

    let res = read_config(args.config.clone()).and_then(|config| run_verification(&args.input, &config));

    match res {
        Ok(verification) if args.strict && !verification.is_ordered() => {
            warn!(
                "{} rows are out of order",
                verification.violations.len()
            );
            std::process::exit(2);
        }
        Ok(_) => {}
        Err(e) => {
            report_error(&e);
            std::process::exit(1);
        }
    }
}
