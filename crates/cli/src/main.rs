use std::process::ExitCode;

fn main() -> ExitCode {
    intentchain_cli::run()
}
