use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::debug;

use tamc::check::{check, dump_dot, Options, Outcome};
use tamc::kripke::Dead;
use tamc::ltl::Formula;
use tamc::model::Model;

#[derive(Parser)]
#[command(name = "tamc")]
#[command(about = "LTL model checking for timed automata over the zone graph")]
struct Args {
    /// System declaration file
    model: PathBuf,

    /// LTL property to check; without one, list the propositions the model
    /// offers
    formula: Option<String>,

    /// Print the state space as DOT instead of text output
    #[arg(short = 'D', long)]
    dot: bool,

    /// Treatment of deadlocked states: "ignore", "allow", or a proposition
    /// name to mark dead self-loops with
    #[arg(long, default_value = "allow")]
    dead: String,

    /// log2 of the state pool capacity
    #[arg(long, default_value_t = 20)]
    pool_bits: usize,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> color_eyre::Result<ExitCode> {
    color_eyre::install()?;
    let args = Args::parse();

    let level = match args.verbose {
        0 => simplelog::LevelFilter::Warn,
        1 => simplelog::LevelFilter::Info,
        2 => simplelog::LevelFilter::Debug,
        _ => simplelog::LevelFilter::Trace,
    };
    simplelog::TermLogger::init(
        level,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    match run(&args) {
        Ok(code) => Ok(code),
        Err(e) => {
            eprintln!("error: {}", e);
            Ok(ExitCode::from(2))
        }
    }
}

fn run(args: &Args) -> tamc::Result<ExitCode> {
    let model = Model::from_file(&args.model)?;
    debug!("loaded model `{}`", model.name);

    let opts = Options {
        dead: match args.dead.as_str() {
            "ignore" => Dead::Ignore,
            "allow" => Dead::Allow,
            name => Dead::Named(name.to_string()),
        },
        pool_bits: args.pool_bits,
    };

    let Some(text) = &args.formula else {
        if args.dot {
            let name = args.model.display().to_string();
            dump_dot(&mut std::io::stdout().lock(), model, None, &opts, &name)?;
        } else {
            let mut out = String::new();
            model
                .dump_info(&mut out)
                .expect("writing to a string does not fail");
            print!("{}", out);
        }
        return Ok(ExitCode::SUCCESS);
    };

    let formula = Formula::parse(text)?;

    if args.dot {
        let name = format!("{}\ncounterexample for {}", args.model.display(), formula);
        let violated = dump_dot(&mut std::io::stdout().lock(), model, Some(&formula), &opts, &name)?;
        return Ok(if violated {
            ExitCode::from(1)
        } else {
            ExitCode::SUCCESS
        });
    }

    match check(model, &formula, &opts)? {
        Outcome::Verified => {
            println!("formula is verified");
            Ok(ExitCode::SUCCESS)
        }
        Outcome::Violated(cex) => {
            println!("formula is violated by the following run:");
            print!("{}", cex);
            Ok(ExitCode::from(1))
        }
    }
}
