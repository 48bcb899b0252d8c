use std::io::{self, Read};

use clap::{Parser as ClapParser, Subcommand};
use querypipe::cli::{self, CompileCliOptions, CompileCliResult, ValidateCliOptions};

#[derive(ClapParser)]
#[command(name = "querypipe")]
#[command(about = "Compiles a filter/annotation tree into a staged aggregation pipeline")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a filter tree request (JSON) into a pipeline
    Compile {
        /// Request JSON (reads from stdin if not provided)
        #[arg(short, long)]
        input: Option<String>,

        /// Append the annotations stage built from the request's projectionFields
        #[arg(long)]
        with_projection: bool,

        /// Emit `{pipeline, diagnostics}` instead of the bare pipeline
        #[arg(long)]
        report: bool,

        /// Pretty-print the output
        #[arg(short, long)]
        pretty: bool,
    },

    /// Validate a previously-compiled pipeline (JSON array of stages)
    Validate {
        /// Pipeline JSON (reads from stdin if not provided)
        #[arg(short, long)]
        input: Option<String>,
    },
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Compile {
            input,
            with_projection,
            report,
            pretty,
        } => run_compile(input, with_projection, report, pretty),
        Commands::Validate { input } => run_validate(input),
    };

    if let Err(e) = result {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

fn read_input(input: Option<String>) -> Result<String, cli::CliError> {
    match input {
        Some(s) => Ok(s),
        None if !atty::is(atty::Stream::Stdin) => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer).map_err(cli::CliError::Io)?;
            Ok(buffer)
        }
        None => Err(cli::CliError::NoInput),
    }
}

fn run_compile(
    input: Option<String>,
    with_projection: bool,
    report: bool,
    pretty: bool,
) -> Result<(), cli::CliError> {
    let text = read_input(input)?;
    let request: serde_json::Value = serde_json::from_str(&text)?;

    let options = CompileCliOptions {
        request,
        with_projection,
        report,
    };

    match cli::execute_compile(&options)? {
        CompileCliResult::Pipeline(pipeline) => print_json(&pipeline_to_value(&pipeline), pretty),
        CompileCliResult::Report { pipeline, diagnostics } => {
            let diagnostics: Vec<String> = diagnostics.iter().map(ToString::to_string).collect();
            let out = serde_json::json!({
                "pipeline": pipeline_to_value(&pipeline),
                "diagnostics": diagnostics,
            });
            print_json(&out, pretty);
        }
    }
    Ok(())
}

fn run_validate(input: Option<String>) -> Result<(), cli::CliError> {
    let text = read_input(input)?;
    let pipeline: serde_json::Value = serde_json::from_str(&text)?;

    let valid = cli::execute_validate(&ValidateCliOptions { pipeline })?;
    println!("{valid}");
    if valid {
        Ok(())
    } else {
        std::process::exit(1);
    }
}

fn pipeline_to_value(pipeline: &[serde_json::Value]) -> serde_json::Value {
    serde_json::Value::Array(pipeline.to_vec())
}

fn print_json(value: &serde_json::Value, pretty: bool) {
    if pretty {
        println!("{}", querypipe::format_value(value));
    } else {
        println!("{}", value);
    }
}
