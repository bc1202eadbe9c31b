mod session;

use std::env;
use std::io::{self, Write};
use std::process;

use ignition_core::config::Config;
use ignition_core::rpm::Rpm;
use session::{DEFAULT_CYCLES, Session, TranscriptProfile};

const USAGE: &str = "Usage: emulator [--profile <cruise|sweep|overrev|dropout>] \
                     [--rev-limit <rpm>] [--cycles <n>]";

struct Options {
    profile: TranscriptProfile,
    rev_limit: Option<u16>,
    cycles: usize,
}

fn main() -> io::Result<()> {
    let options = parse_options(env::args().skip(1)).unwrap_or_else(|err| exit_usage(&err));

    let mut builder = Config::builder();
    if let Some(limit) = options.rev_limit {
        builder = builder.rev_limit(Rpm(limit));
    }
    let config = builder
        .build()
        .unwrap_or_else(|err| exit_usage(&format!("invalid configuration: {err}")));

    let stdout = io::stdout();
    let mut writer = stdout.lock();
    writeln!(
        writer,
        "Ignition emulator: profile `{}`, rev limit {} rpm, {} cycles per phase",
        options.profile.tag(),
        config.rev_limit(),
        options.cycles
    )?;

    let mut session = Session::new(options.profile, config, options.cycles)?;
    let (lines, summary) = session.run()?;
    for line in lines {
        writeln!(writer, "{line}")?;
    }

    writeln!(
        writer,
        "{} cycles: {} sparks, {} cuts, {} skipped, {} faults. Transcript: {}",
        summary.cycles,
        summary.sparks,
        summary.cuts,
        summary.skipped,
        summary.faults,
        options.profile.log_path()
    )?;
    Ok(())
}

fn exit_usage(message: &str) -> ! {
    eprintln!("{message}");
    eprintln!("{USAGE}");
    process::exit(2);
}

fn parse_options(mut args: impl Iterator<Item = String>) -> Result<Options, String> {
    let mut options = Options {
        profile: TranscriptProfile::Cruise,
        rev_limit: None,
        cycles: DEFAULT_CYCLES,
    };

    while let Some(arg) = args.next() {
        let (flag, inline) = match arg.split_once('=') {
            Some((flag, value)) => (flag.to_string(), Some(value.to_string())),
            None => (arg, None),
        };
        let mut value = |name: &str| {
            inline
                .clone()
                .or_else(|| args.next())
                .ok_or_else(|| format!("Expected value after {name}"))
        };

        match flag.as_str() {
            "--profile" => options.profile = TranscriptProfile::from_tag(&value("--profile")?)?,
            "--rev-limit" => {
                let raw = value("--rev-limit")?;
                options.rev_limit = Some(
                    raw.parse()
                        .map_err(|_| format!("Invalid rev limit `{raw}`"))?,
                );
            }
            "--cycles" => {
                let raw = value("--cycles")?;
                options.cycles = raw
                    .parse()
                    .map_err(|_| format!("Invalid cycle count `{raw}`"))?;
            }
            other if !other.starts_with("--") => {
                options.profile = TranscriptProfile::from_tag(other)?;
            }
            other => return Err(format!("Unknown option `{other}`")),
        }
    }

    Ok(options)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Options, String> {
        parse_options(args.iter().map(ToString::to_string))
    }

    #[test]
    fn defaults_to_cruise() {
        let options = parse(&[]).expect("empty args parse");
        assert_eq!(options.profile, TranscriptProfile::Cruise);
        assert_eq!(options.rev_limit, None);
        assert_eq!(options.cycles, DEFAULT_CYCLES);
    }

    #[test]
    fn accepts_separate_and_inline_values() {
        let options = parse(&["--profile", "overrev", "--rev-limit=9000", "--cycles", "3"])
            .expect("valid args parse");
        assert_eq!(options.profile, TranscriptProfile::Overrev);
        assert_eq!(options.rev_limit, Some(9_000));
        assert_eq!(options.cycles, 3);

        let options = parse(&["dropout"]).expect("bare profile parses");
        assert_eq!(options.profile, TranscriptProfile::Dropout);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse(&["--cycles"]).is_err());
        assert!(parse(&["--rev-limit", "fast"]).is_err());
        assert!(parse(&["--verbose"]).is_err());
    }
}
