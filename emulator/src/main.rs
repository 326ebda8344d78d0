mod session;

use std::env;
use std::fs;
use std::process;
use std::time::Duration;

use detect_core::config::DetectConfig;
use session::{HELP_TEXT, Session, SessionOptions, TraceProfile, parse_entries};

enum TraceSource {
    Profile(TraceProfile),
    File(String),
}

struct Args {
    source: TraceSource,
    options: SessionOptions,
}

fn main() {
    let args = parse_args().unwrap_or_else(|err| {
        eprintln!("{err}");
        eprintln!("{HELP_TEXT}");
        process::exit(2);
    });

    let entries = match &args.source {
        TraceSource::Profile(profile) => profile.entries(),
        TraceSource::File(path) => fs::read_to_string(path)
            .map_err(|err| format!("{path}: {err}"))
            .and_then(|text| parse_entries(&text).map_err(|err| format!("{path}: {err}"))),
    }
    .unwrap_or_else(|err| {
        eprintln!("{err}");
        process::exit(2);
    });

    let mut session = Session::new(&entries, args.options);
    let result = session.run();
    println!("{}", session.summary(&result));

    if let Err(error) = result {
        session.halt(error);
    }
}

fn parse_args() -> Result<Args, String> {
    let mut source = TraceSource::Profile(TraceProfile::Mariko);
    let mut options = SessionOptions {
        echo: true,
        ..SessionOptions::default()
    };
    let mut attempts = options.config.max_attempts;

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        let (flag, inline) = match arg.split_once('=') {
            Some((flag, value)) => (flag.to_string(), Some(value.to_string())),
            None => (arg, None),
        };
        let mut value = || {
            inline
                .clone()
                .or_else(|| args.next())
                .ok_or_else(|| format!("Expected value after {flag}"))
        };

        match flag.as_str() {
            "--profile" => source = TraceSource::Profile(TraceProfile::from_tag(&value()?)?),
            "--trace" => source = TraceSource::File(value()?),
            "--timeout-ms" => {
                let millis = value()?
                    .parse::<u64>()
                    .map_err(|err| format!("Invalid --timeout-ms: {err}"))?;
                options.timeout = Duration::from_millis(millis);
            }
            "--attempts" => {
                attempts = value()?
                    .parse::<u8>()
                    .map_err(|err| format!("Invalid --attempts: {err}"))?;
            }
            "--quiet" => options.echo = false,
            "-h" | "--help" => {
                println!("{HELP_TEXT}");
                process::exit(0);
            }
            other => source = TraceSource::Profile(TraceProfile::from_tag(other)?),
        }
    }

    options.config = DetectConfig::DEFAULT.with_max_attempts(attempts);
    Ok(Args { source, options })
}
