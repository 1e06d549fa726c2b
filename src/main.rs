use anyhow::Context;
use bluesky_feed::config::Config;
use bluesky_feed::credentials::Credentials;
use bluesky_feed::deploy::{self, Deploy, Options, Outcome, Skip};
use bluesky_feed::post::parse_posts;
use bluesky_feed::xrpc::Client;
use clap::Parser;
use log::{debug, error, info, LevelFilter};
use std::path::PathBuf;
use std::process::ExitCode;

/// Announces the newest post of a site on Bluesky. Reads the account from
/// BLUESKY_HANDLE and BLUESKY_APP_PASSWORD, which may also be set in a
/// `.env` file.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// The project directory (or any directory beneath it)
    #[arg(long, default_value = ".")]
    project: PathBuf,

    /// Don't post anything
    #[arg(long)]
    skip_bluesky: bool,

    /// Link to this URL instead of the latest post's URL
    #[arg(long, value_name = "URL")]
    post_url: Option<String>,

    /// Exit with an error status if posting fails
    #[arg(long)]
    strict: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(log_level(cli.verbose, cli.quiet))
        .format_timestamp(None)
        .init();

    let result = run(&cli);
    match &result {
        Ok(Ok(Outcome::Published(record))) => println!("{}", record.uri),
        Ok(Ok(Outcome::Skipped(_))) => {}
        Ok(Err(e)) => error!("{}", e),
        Err(e) => error!("{:#}", e),
    }
    if failed(&result, cli.strict) {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn log_level(verbose: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::Error;
    }
    match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// A project that can't be loaded always fails; a failed deploy only fails
/// with `--strict`.
fn failed(result: &anyhow::Result<deploy::Result<Outcome>>, strict: bool) -> bool {
    match result {
        Err(_) => true,
        Ok(Err(_)) => strict,
        Ok(Ok(_)) => false,
    }
}

/// Loads the project and runs the deploy. The outer error is a project that
/// couldn't be loaded, the inner one a deploy that failed.
fn run(cli: &Cli) -> anyhow::Result<deploy::Result<Outcome>> {
    // nothing is read when skipping
    if cli.skip_bluesky {
        info!("Skipping Bluesky update: {}", Skip::Requested);
        return Ok(Ok(Outcome::Skipped(Skip::Requested)));
    }

    let config = Config::from_directory(&cli.project)?;
    let posts = parse_posts(&config.posts_source_directory).with_context(|| {
        format!(
            "reading posts from `{}`",
            config.posts_source_directory.display()
        )
    })?;

    // Variables already in the environment win over both files, and the
    // project's `.env` wins over the working directory's.
    let _ = dotenvy::from_path(config.root_directory.join(".env"));
    let _ = dotenvy::dotenv();
    let credentials = Credentials::from_env();

    let options = Options {
        skip: false,
        post_url: cli.post_url.clone(),
    };
    let deploy = Deploy {
        feed: &config.feed,
        site_root: config.site_root.as_ref(),
        credentials: credentials.as_ref(),
        options: &options,
    };
    let client = Client::new(config.feed.service.clone());
    debug!("Using XRPC service {}", client.service());
    Ok(deploy.run(&client, &posts, chrono::Utc::now()))
}
