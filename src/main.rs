use clap::Parser;
use log::{debug, info};

use leaderboard::args::RankArgs;
use leaderboard::board::config_reader::read_config;
use leaderboard::board::{report_error, run_ranking};

fn main() {
    let args = RankArgs::parse();
    leaderboard::init_logging(args.verbose);
    debug!("args: {:?}", args);

    let res = read_config(args.config.clone()).and_then(|config| {
        info!("config: {:?}", config);
        run_ranking(
            &args.input,
            &args.out,
            &config,
            args.summary.as_deref(),
            args.reference.as_deref(),
        )
    });

    if let Err(e) = res {
        report_error(&e);
        std::process::exit(1);
    }
}
