//! adaf CLI entry point.

use std::process::ExitCode;

fn main() -> ExitCode {
    let mut argv: Vec<String> = std::env::args().skip(1).collect();
    if argv.is_empty() {
        print!("{}", adaf_cli::help_text());
        return ExitCode::from(2);
    }

    let command = argv.remove(0);
    if command == "help" || command == "-h" || command == "--help" {
        print!("{}", adaf_cli::help_text());
        return ExitCode::SUCCESS;
    }

    match adaf_cli::dispatch(&command, argv) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}
